//! Scripted take: record a short scene, save it, replay it and fly a camera.
//!
//! Everything runs against the in-memory host, so the example needs no game.
//! Set `RUST_LOG=debug` to see the recorder and playback at work.
//!
//! Run with: `cargo run --example scripted_take`

use std::sync::Arc;

use anyhow::Context;
use cinereel_engine::prelude::*;

// ---------------------------------------------------------------------------
// Recording
// ---------------------------------------------------------------------------

/// Record a player walking past a sheep, sneaking and swapping items.
fn record_scene() -> Result<Take, anyhow::Error> {
    let mut host = MemoryHost::new();
    let player = host.insert(ObservedState::new(
        ObjectCategory::Actor,
        Pose::at(0.0, 64.0, 0.0),
    ));
    let sheep = host.insert(ObservedState::new(
        ObjectCategory::Creature,
        Pose::at(3.0, 64.0, 1.0),
    ));

    let mut studio = StudioLoop::new(host, TickConfig::default());
    studio.start_recording(player)?;

    for tick in 0..120u64 {
        let host = studio.host_mut();
        if let Some(state) = host.object_mut(player) {
            state.pose.x += 0.2;
            state.pose.yaw = (tick as f32 * 3.0) % 360.0;
            match tick {
                30 => state.posture = Posture::Sneaking,
                60 => state.posture = Posture::Standing,
                75 => {
                    state
                        .equipment
                        .set(EquipmentSlot::MainHand, Some(ItemStack::new("shears", 1)));
                }
                _ => {}
            }
        }
        if tick == 90 {
            if let Some(state) = host.object_mut(sheep) {
                state.posture = Posture::Sitting;
            }
        }
        studio.tick();
    }

    let take = studio
        .save_recording("sheep_walk")?
        .context("recording stopped before it could be saved")?;
    tracing::info!(
        streams = take.streams.len(),
        ticks = take.total_ticks,
        actions = take.action_count(),
        "take recorded"
    );
    Ok(take)
}

// ---------------------------------------------------------------------------
// Playback
// ---------------------------------------------------------------------------

fn replay(take: Arc<Take>) -> Result<(), anyhow::Error> {
    let mut host = MemoryHost::new();
    let mut session = PlaybackSession::new(Arc::clone(&take), PlaybackConfig::default());
    session.start(&mut host);

    for target in [100, 20, take.total_ticks.saturating_sub(1), 0] {
        let report = session.seek(&mut host, target);
        println!(
            "seek {:>3} -> {:>3}: executed {:>3}, rewound {:>3}, skipped {}, {} objects live",
            report.from,
            report.to,
            report.executed,
            report.rewound,
            report.skipped,
            host.object_count(),
        );
    }

    let player = session
        .resolve(&mut host, LogicalId::MASTER)
        .context("player should be present at tick 0")?;
    if let Some(state) = host.observe(player) {
        println!(
            "player at tick 0: ({:.1}, {:.1}, {:.1}) {:?}",
            state.pose.x, state.pose.y, state.pose.z, state.posture
        );
    }

    session.stop(&mut host);
    println!("after stop: {} objects live", host.object_count());
    Ok(())
}

// ---------------------------------------------------------------------------
// Cutscene
// ---------------------------------------------------------------------------

fn fly_camera() -> Result<(), anyhow::Error> {
    let mut timeline = KeyframeTimeline::new();
    let orbit = timeline.add_group();
    let smooth = KeyframeTiming::path(20).with_easing(Easing::SmoothInOut);
    timeline.add_keyframe(
        orbit,
        CameraPose::at(-6.0, 70.0, 0.0).looking(-90.0, 20.0),
        KeyframeTiming::default(),
    )?;
    timeline.add_keyframe(orbit, CameraPose::at(0.0, 72.0, 6.0).looking(180.0, 25.0), smooth)?;
    timeline.add_keyframe(orbit, CameraPose::at(6.0, 70.0, 0.0).looking(90.0, 20.0), smooth)?;
    timeline.add_keyframe(
        orbit,
        CameraPose::at(0.0, 72.0, -6.0).looking(0.0, 25.0),
        smooth.with_transition_delay(10),
    )?;
    let closeup = timeline.add_group();
    timeline.add_keyframe(
        closeup,
        CameraPose::at(1.0, 66.0, 1.0).looking(45.0, 10.0),
        KeyframeTiming::path(15).with_easing(Easing::EaseOut),
    )?;

    println!("timeline lasts {} ticks", timeline.duration());

    let mut studio = StudioLoop::new(MemoryHost::new(), TickConfig::default());
    studio.set_cutscene(CutscenePlayback::new(timeline, CutsceneConfig::default()));
    studio.play_cutscene()?;

    let mut frames = 0u64;
    while studio.cutscene().is_some_and(CutscenePlayback::is_playing) {
        for partial in [0.0, 0.5] {
            if let Some(pose) = studio.render_camera(partial) {
                frames += 1;
                if frames % 20 == 0 {
                    println!(
                        "frame {frames:>3}: ({:.2}, {:.2}, {:.2}) yaw {:.1}",
                        pose.x, pose.y, pose.z, pose.yaw
                    );
                }
            }
        }
        studio.tick();
    }

    println!(
        "rendered {} camera frames, camera locked: {}",
        studio.host().camera_frames(),
        studio.host().camera_locked()
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let take = record_scene()?;
    take.verify()?;

    let json = take.to_json_string()?;
    let (loaded, report) = Take::from_json_lenient(&json)?;
    println!(
        "saved {} bytes, reload clean: {}, hash verified: {}",
        json.len(),
        report.is_clean(),
        report.hash_verified
    );

    replay(Arc::new(loaded))?;
    fly_camera()?;
    Ok(())
}
