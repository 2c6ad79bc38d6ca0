//! Fixed-timestep driver for recording, playback and cutscenes.
//!
//! The [`StudioLoop`] owns the host and every session running against it.
//! Each tick runs three phases in a fixed order:
//!
//! 1. **Recording.** Objects driven by an in-flight playback are marked "do
//!    not save", then the recording samples the world.
//! 2. **Playback.** Every playback session advances one tick.
//! 3. **Cutscene.** The active cutscene advances its segment counter.
//!
//! Render frames call [`StudioLoop::sample_camera`] or
//! [`StudioLoop::render_camera`] with the sub-tick `partial`; sampling reads
//! state only.
//!
//! # Example
//!
//! ```
//! use cinereel_engine::tick::{StudioLoop, TickConfig};
//! use cinereel_log::prelude::*;
//!
//! let mut host = MemoryHost::new();
//! let actor = host.insert(ObservedState::new(ObjectCategory::Actor, Pose::default()));
//!
//! let mut studio = StudioLoop::new(host, TickConfig::default());
//! studio.start_recording(actor).unwrap();
//! for _ in 0..40 {
//!     studio.tick();
//! }
//! let take = studio.save_recording("idle").unwrap().unwrap();
//! assert_eq!(take.total_ticks, 40);
//! assert!((studio.sim_time() - 2.0).abs() < 1e-9);
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use cinereel_capture::recording::{RecordingConfig, RecordingError, RecordingSession};
use cinereel_log::host::{CameraHost, HostWorld, ObjectHandle};
use cinereel_log::pose::CameraPose;

use crate::cutscene::CutscenePlayback;
use crate::playback::{PlaybackConfig, PlaybackSession, SeekReport};
use crate::take::Take;
use crate::timeline::TimelineError;

// ---------------------------------------------------------------------------
// TickConfig
// ---------------------------------------------------------------------------

/// Configuration for the fixed-timestep loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TickConfig {
    /// Fixed time step in seconds per tick. Must be positive and finite.
    pub fixed_dt: f64,
}

impl Default for TickConfig {
    /// Defaults to 20 Hz, the host's simulation rate.
    fn default() -> Self {
        Self {
            fixed_dt: 1.0 / 20.0,
        }
    }
}

impl TickConfig {
    pub fn is_valid(&self) -> bool {
        self.fixed_dt > 0.0 && self.fixed_dt.is_finite()
    }
}

// ---------------------------------------------------------------------------
// TickDiagnostics
// ---------------------------------------------------------------------------

/// Timing diagnostics for the last tick.
#[derive(Debug, Clone, Default)]
pub struct TickDiagnostics {
    /// Wall-clock time per phase, in order of execution.
    pub phase_times: Vec<(String, Duration)>,
    pub total_time: Duration,
    /// Playback actions passed over this tick.
    pub skipped_actions: usize,
}

// ---------------------------------------------------------------------------
// StudioLoop
// ---------------------------------------------------------------------------

/// Index of a playback session inside a [`StudioLoop`].
pub type PlaybackSlot = usize;

pub struct StudioLoop<H: HostWorld + CameraHost> {
    host: H,
    config: TickConfig,
    tick_counter: u64,
    recording: Option<RecordingSession>,
    recording_config: RecordingConfig,
    playbacks: Vec<Option<PlaybackSession>>,
    cutscene: Option<CutscenePlayback>,
    last_diagnostics: TickDiagnostics,
}

impl<H: HostWorld + CameraHost> StudioLoop<H> {
    /// # Panics
    ///
    /// Panics if `config.fixed_dt` is not positive and finite.
    pub fn new(host: H, config: TickConfig) -> Self {
        assert!(
            config.is_valid(),
            "fixed_dt must be positive and finite, got {}",
            config.fixed_dt
        );
        Self {
            host,
            config,
            tick_counter: 0,
            recording: None,
            recording_config: RecordingConfig::default(),
            playbacks: Vec::new(),
            cutscene: None,
            last_diagnostics: TickDiagnostics::default(),
        }
    }

    pub fn with_recording_config(mut self, config: RecordingConfig) -> Self {
        self.recording_config = config;
        self
    }

    /// Execute one simulation tick.
    pub fn tick(&mut self) {
        let tick_start = Instant::now();
        let mut phase_times = Vec::with_capacity(3);
        let mut skipped_actions = 0;

        // Phase 1: recording.
        let phase_start = Instant::now();
        if let Some(recording) = self.recording.as_mut().filter(|r| r.is_recording()) {
            let driven: Vec<ObjectHandle> = self
                .playbacks
                .iter()
                .flatten()
                .flat_map(PlaybackSession::live_objects)
                .collect();
            recording.set_playback_driven(driven);
            if let Err(e) = recording.tick(&mut self.host) {
                tracing::warn!(tick = self.tick_counter, error = %e, "recording tick failed");
            }
        }
        phase_times.push(("recording".to_owned(), phase_start.elapsed()));

        // Phase 2: playbacks.
        let phase_start = Instant::now();
        for playback in self.playbacks.iter_mut().flatten() {
            if let Some(report) = playback.advance(&mut self.host) {
                skipped_actions += report.skipped;
            }
        }
        phase_times.push(("playback".to_owned(), phase_start.elapsed()));

        // Phase 3: cutscene.
        let phase_start = Instant::now();
        if let Some(cutscene) = self.cutscene.as_mut() {
            cutscene.tick(&mut self.host);
        }
        phase_times.push(("cutscene".to_owned(), phase_start.elapsed()));

        self.tick_counter += 1;
        self.last_diagnostics = TickDiagnostics {
            phase_times,
            total_time: tick_start.elapsed(),
            skipped_actions,
        };
    }

    /// Run `count` ticks in sequence.
    pub fn run_ticks(&mut self, count: u64) {
        for _ in 0..count {
            self.tick();
        }
    }

    // -- recording --------------------------------------------------------

    pub fn start_recording(&mut self, master: ObjectHandle) -> Result<(), RecordingError> {
        let mut session = RecordingSession::new(self.recording_config.clone());
        session.start(&self.host, master)?;
        self.recording = Some(session);
        Ok(())
    }

    pub fn stop_recording(&mut self) -> Result<(), RecordingError> {
        let recording = self.recording.as_mut().ok_or(RecordingError::NotRecording)?;
        if recording.is_recording() {
            recording.stop(&mut self.host)?;
        }
        Ok(())
    }

    /// Stop the recording if needed and seal it into a take.
    ///
    /// Returns `Ok(None)` when there was nothing to save.
    pub fn save_recording(&mut self, name: &str) -> Result<Option<Take>, RecordingError> {
        if self.recording.is_none() {
            return Ok(None);
        }
        self.stop_recording()?;
        let Some(mut recording) = self.recording.take() else {
            return Ok(None);
        };
        let mut take = Take::new(name);
        Ok(recording.save(&mut take).then_some(take))
    }

    pub fn recording(&self) -> Option<&RecordingSession> {
        self.recording.as_ref()
    }

    // -- playback ---------------------------------------------------------

    /// Start playing `take` alongside anything already running.
    pub fn add_playback(&mut self, take: Arc<Take>, config: PlaybackConfig) -> PlaybackSlot {
        let mut session = PlaybackSession::new(take, config);
        session.start(&mut self.host);
        self.playbacks.push(Some(session));
        self.playbacks.len() - 1
    }

    pub fn playback(&self, slot: PlaybackSlot) -> Option<&PlaybackSession> {
        self.playbacks.get(slot).and_then(Option::as_ref)
    }

    /// Seek one playback directly, outside the tick order.
    pub fn seek_playback(&mut self, slot: PlaybackSlot, to: u64) -> Option<SeekReport> {
        let session = self.playbacks.get_mut(slot)?.as_mut()?;
        Some(session.seek(&mut self.host, to))
    }

    pub fn stop_playback(&mut self, slot: PlaybackSlot) -> bool {
        match self.playbacks.get_mut(slot).and_then(Option::take) {
            Some(mut session) => {
                session.stop(&mut self.host);
                true
            }
            None => false,
        }
    }

    // -- cutscene ---------------------------------------------------------

    /// Replace the active cutscene, stopping the previous one.
    pub fn set_cutscene(&mut self, cutscene: CutscenePlayback) {
        self.clear_cutscene();
        self.cutscene = Some(cutscene);
    }

    pub fn clear_cutscene(&mut self) {
        if let Some(mut previous) = self.cutscene.take() {
            previous.stop(&mut self.host);
        }
    }

    pub fn cutscene(&self) -> Option<&CutscenePlayback> {
        self.cutscene.as_ref()
    }

    pub fn cutscene_mut(&mut self) -> Option<&mut CutscenePlayback> {
        self.cutscene.as_mut()
    }

    /// Start the active cutscene from its first keyframe.
    pub fn play_cutscene(&mut self) -> Result<(), TimelineError> {
        match self.cutscene.as_mut() {
            Some(cutscene) => cutscene.play_from_start(&mut self.host),
            None => Err(TimelineError::TooFewKeyframes(0)),
        }
    }

    /// Camera pose for a render frame, without touching the host.
    pub fn sample_camera(&self, partial: f64) -> Option<CameraPose> {
        self.cutscene.as_ref()?.sample(partial)
    }

    /// Sample the camera and apply it to the host.
    pub fn render_camera(&mut self, partial: f64) -> Option<CameraPose> {
        let cutscene = self.cutscene.as_ref()?;
        cutscene.render(&mut self.host, partial)
    }

    // -- accessors --------------------------------------------------------

    pub fn tick_count(&self) -> u64 {
        self.tick_counter
    }

    /// Computed as `tick_count * fixed_dt` to avoid drift.
    pub fn sim_time(&self) -> f64 {
        self.tick_counter as f64 * self.config.fixed_dt
    }

    pub fn config(&self) -> &TickConfig {
        &self.config
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Direct host access for scene setup and tests.
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn last_diagnostics(&self) -> &TickDiagnostics {
        &self.last_diagnostics
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cutscene::CutsceneConfig;
    use crate::keyframe::KeyframeTiming;
    use crate::timeline::KeyframeTimeline;
    use cinereel_log::prelude::*;

    fn studio() -> (StudioLoop<MemoryHost>, ObjectHandle) {
        let mut host = MemoryHost::new();
        let actor = host.insert(ObservedState::new(ObjectCategory::Actor, Pose::at(0.0, 64.0, 0.0)));
        (StudioLoop::new(host, TickConfig::default()), actor)
    }

    #[test]
    #[should_panic(expected = "fixed_dt must be positive and finite")]
    fn zero_dt_panics() {
        StudioLoop::new(MemoryHost::new(), TickConfig { fixed_dt: 0.0 });
    }

    #[test]
    #[should_panic(expected = "fixed_dt must be positive and finite")]
    fn infinity_dt_panics() {
        StudioLoop::new(MemoryHost::new(), TickConfig { fixed_dt: f64::INFINITY });
    }

    #[test]
    fn empty_ticks_advance_counter_and_time() {
        let (mut studio, _) = studio();
        studio.run_ticks(10);
        assert_eq!(studio.tick_count(), 10);
        assert!((studio.sim_time() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn diagnostics_list_phases_in_order() {
        let (mut studio, _) = studio();
        studio.tick();
        let names: Vec<&str> = studio
            .last_diagnostics()
            .phase_times
            .iter()
            .map(|(n, _)| n.as_str())
            .collect();
        assert_eq!(names, vec!["recording", "playback", "cutscene"]);
    }

    #[test]
    fn playback_objects_are_not_saved_into_a_new_recording() {
        let (mut studio, actor) = studio();
        studio.start_recording(actor).unwrap();
        for _ in 0..20 {
            studio.host_mut().object_mut(actor).unwrap().pose.x += 0.5;
            studio.tick();
        }
        let first = Arc::new(studio.save_recording("first").unwrap().unwrap());

        let slot = studio.add_playback(Arc::clone(&first), PlaybackConfig::default());
        studio.start_recording(actor).unwrap();
        studio.run_ticks(10);
        let second = studio.save_recording("second").unwrap().unwrap();

        assert_eq!(second.streams.len(), 1);
        assert!(studio.stop_playback(slot));
        assert!(!studio.stop_playback(slot));
    }

    #[test]
    fn render_applies_the_cutscene_camera() {
        let (mut studio, _) = studio();
        let mut timeline = KeyframeTimeline::new();
        let g = timeline.add_group();
        timeline
            .add_keyframe(g, CameraPose::at(0.0, 70.0, 0.0), KeyframeTiming::default())
            .unwrap();
        timeline
            .add_keyframe(g, CameraPose::at(8.0, 70.0, 0.0), KeyframeTiming::path(8))
            .unwrap();
        studio.set_cutscene(CutscenePlayback::new(timeline, CutsceneConfig::default()));
        studio.play_cutscene().unwrap();
        studio.run_ticks(4);

        assert!((studio.sample_camera(0.0).unwrap().x - 4.0).abs() < 1e-9);
        studio.render_camera(0.5).unwrap();
        assert!((studio.host().camera().unwrap().x - 4.5).abs() < 1e-9);

        studio.clear_cutscene();
        assert!(!studio.host().camera_locked());
    }
}
