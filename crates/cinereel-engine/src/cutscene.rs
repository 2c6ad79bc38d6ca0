//! Tick-driven camera playback over a [`KeyframeTimeline`].
//!
//! A [`CutscenePlayback`] moves through `Idle -> Armed(a, b) -> Playing` and,
//! when the segment from `a` to `b` completes, either arms the next adjacent
//! pair or ends. Simulation ticks advance the segment counter; render frames
//! read the camera pose with a sub-tick `partial` and never mutate.
//!
//! Each segment starts with a hold span, `b.tick - a.tick - b.path_tick`
//! ticks during which the camera stays at `a`. The remaining `path_tick`
//! ticks travel towards `b`. The final keyframe's transition delay extends
//! the last segment so the camera rests on it before the lock is released.
//!
//! # Example
//!
//! ```
//! use cinereel_engine::cutscene::{CutsceneConfig, CutscenePlayback};
//! use cinereel_engine::keyframe::KeyframeTiming;
//! use cinereel_engine::timeline::KeyframeTimeline;
//! use cinereel_log::prelude::*;
//!
//! let mut timeline = KeyframeTimeline::new();
//! let g = timeline.add_group();
//! timeline.add_keyframe(g, CameraPose::at(0.0, 80.0, 0.0), KeyframeTiming::default()).unwrap();
//! timeline.add_keyframe(g, CameraPose::at(20.0, 80.0, 0.0), KeyframeTiming::path(20)).unwrap();
//!
//! let mut camera = MemoryHost::new();
//! let mut cutscene = CutscenePlayback::new(timeline, CutsceneConfig::default());
//! cutscene.play_from_start(&mut camera).unwrap();
//! for _ in 0..10 {
//!     cutscene.tick(&mut camera);
//! }
//! assert!((cutscene.sample(0.0).unwrap().x - 10.0).abs() < 1e-9);
//! ```

use serde::{Deserialize, Serialize};

use cinereel_log::host::CameraHost;
use cinereel_log::pose::CameraPose;

use crate::keyframe::{Easing, KeyframeId};
use crate::spline::ARC_LENGTH_SAMPLES;
use crate::timeline::{segment_progress, KeyframeTimeline, SegmentPath, TimelineError};

// ---------------------------------------------------------------------------
// CutsceneConfig
// ---------------------------------------------------------------------------

/// Playback options for cutscenes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CutsceneConfig {
    /// Arc-length table resolution per spline segment.
    pub arc_length_samples: usize,
    /// Take the host camera lock while playing.
    pub lock_camera: bool,
}

impl Default for CutsceneConfig {
    fn default() -> Self {
        Self {
            arc_length_samples: ARC_LENGTH_SAMPLES,
            lock_camera: true,
        }
    }
}

// ---------------------------------------------------------------------------
// CutsceneState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutsceneState {
    Idle,
    /// A pair is set up but has not been ticked yet.
    Armed,
    Playing,
}

/// The pair being played with everything render frames need precomputed.
#[derive(Debug, Clone)]
struct ActiveSegment {
    from: KeyframeId,
    to: KeyframeId,
    from_pose: CameraPose,
    from_tick: u64,
    hold: u64,
    path_tick: u64,
    /// Ticks until the next pair is armed.
    span: u64,
    easing: Easing,
    path: SegmentPath,
}

// ---------------------------------------------------------------------------
// CutscenePlayback
// ---------------------------------------------------------------------------

pub struct CutscenePlayback {
    config: CutsceneConfig,
    timeline: KeyframeTimeline,
    state: CutsceneState,
    segment: Option<ActiveSegment>,
    /// Ticks since the current pair was armed.
    segment_tick: u64,
    /// Ticks spent travelling in the current pair, past the hold.
    elapsed_ticks: u64,
    camera_locked: bool,
    finished: bool,
}

impl CutscenePlayback {
    pub fn new(timeline: KeyframeTimeline, config: CutsceneConfig) -> Self {
        Self {
            config,
            timeline,
            state: CutsceneState::Idle,
            segment: None,
            segment_tick: 0,
            elapsed_ticks: 0,
            camera_locked: false,
            finished: false,
        }
    }

    pub fn config(&self) -> &CutsceneConfig {
        &self.config
    }

    pub fn timeline(&self) -> &KeyframeTimeline {
        &self.timeline
    }

    /// Edit the timeline. Edits apply from the next armed pair on.
    pub fn timeline_mut(&mut self) -> &mut KeyframeTimeline {
        &mut self.timeline
    }

    pub fn state(&self) -> CutsceneState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state != CutsceneState::Idle
    }

    pub fn current_pair(&self) -> Option<(KeyframeId, KeyframeId)> {
        self.segment.as_ref().map(|s| (s.from, s.to))
    }

    pub fn segment_tick(&self) -> u64 {
        self.segment_tick
    }

    pub fn elapsed_ticks(&self) -> u64 {
        self.elapsed_ticks
    }

    /// Fraction of the whole timeline played, in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        let Some(seg) = &self.segment else {
            return if self.finished { 1.0 } else { 0.0 };
        };
        let start = self.timeline.first().map_or(0, |kf| kf.tick);
        let total = self.timeline.end_tick().saturating_sub(start);
        if total == 0 {
            return 1.0;
        }
        let played = seg.from_tick.saturating_sub(start) + self.segment_tick;
        (played as f64 / total as f64).clamp(0.0, 1.0)
    }

    // -- control ----------------------------------------------------------

    /// Play the whole timeline from its first keyframe.
    pub fn play_from_start(&mut self, camera: &mut dyn CameraHost) -> Result<(), TimelineError> {
        let len = self.timeline.len();
        if len < 2 {
            return Err(TimelineError::TooFewKeyframes(len));
        }
        let (a, b) = match (self.timeline.first(), self.timeline.first().and_then(|kf| self.timeline.next_after(kf.id))) {
            (Some(a), Some(b)) => (a.id, b.id),
            _ => return Err(TimelineError::TooFewKeyframes(len)),
        };
        self.setup_and_play(camera, a, b)
    }

    /// Arm the segment from `a` to `b` and take the camera.
    ///
    /// A refused camera lock is logged and playback continues without it.
    pub fn setup_and_play(
        &mut self,
        camera: &mut dyn CameraHost,
        a: KeyframeId,
        b: KeyframeId,
    ) -> Result<(), TimelineError> {
        self.arm(a, b)?;
        self.finished = false;
        if self.config.lock_camera && !self.camera_locked {
            self.camera_locked = camera.acquire_camera();
            if !self.camera_locked {
                tracing::warn!(from = %a, to = %b, "camera lock refused, playing unlocked");
            }
        }
        Ok(())
    }

    fn arm(&mut self, a: KeyframeId, b: KeyframeId) -> Result<(), TimelineError> {
        let from = self
            .timeline
            .keyframe(a)
            .ok_or(TimelineError::UnknownKeyframe(a))?;
        let to = self
            .timeline
            .keyframe(b)
            .ok_or(TimelineError::UnknownKeyframe(b))?;
        let is_last = self.timeline.next_after(b).is_none();

        let distance = to.tick.saturating_sub(from.tick);
        let hold = distance.saturating_sub(to.timing.path_tick);
        let path_tick = distance - hold;
        let span = if is_last {
            distance + to.timing.transition_delay_tick
        } else {
            distance
        };
        let (from_pose, from_tick, easing) = (from.pose, from.tick, to.timing.easing);
        let path = self
            .timeline
            .segment_path(a, b, self.config.arc_length_samples)?;

        self.segment = Some(ActiveSegment {
            from: a,
            to: b,
            from_pose,
            from_tick,
            hold,
            path_tick,
            span,
            easing,
            path,
        });
        self.segment_tick = 0;
        self.elapsed_ticks = 0;
        self.state = CutsceneState::Armed;
        tracing::debug!(from = %a, to = %b, hold, path_tick, "cutscene segment armed");
        Ok(())
    }

    /// Advance one simulation tick.
    pub fn tick(&mut self, camera: &mut dyn CameraHost) {
        let Some(seg) = &self.segment else {
            return;
        };
        let (to, hold, span) = (seg.to, seg.hold, seg.span);

        self.state = CutsceneState::Playing;
        self.segment_tick += 1;
        if self.segment_tick > hold {
            self.elapsed_ticks += 1;
        }
        if self.segment_tick < span {
            return;
        }

        let next = self.timeline.next_after(to).map(|kf| kf.id);
        match next.map(|n| self.arm(to, n)) {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                tracing::warn!(error = %e, "could not arm next cutscene segment");
                self.finish(camera);
            }
            None => self.finish(camera),
        }
    }

    /// Camera pose for the current render frame.
    ///
    /// `partial` is the fraction of the next tick already elapsed. Returns
    /// `None` when nothing is playing.
    pub fn sample(&self, partial: f64) -> Option<CameraPose> {
        let seg = self.segment.as_ref()?;
        let time = self.segment_tick as f64 + partial.clamp(0.0, 1.0);
        if time < seg.hold as f64 {
            return Some(seg.from_pose);
        }
        let t = segment_progress(time - seg.hold as f64, seg.path_tick as f64);
        Some(seg.path.pose_at(seg.easing.apply(t)))
    }

    /// Camera pose at absolute timeline `tick + partial`, independent of the
    /// playhead, at the configured arc-length resolution.
    pub fn preview(&self, tick: u64, partial: f64) -> Option<CameraPose> {
        self.timeline
            .sample_with(tick, partial, self.config.arc_length_samples)
    }

    /// Sample and push the pose to the host camera.
    pub fn render(&self, camera: &mut dyn CameraHost, partial: f64) -> Option<CameraPose> {
        let pose = self.sample(partial)?;
        camera.set_camera(&pose);
        Some(pose)
    }

    /// Stop playback and release the camera lock.
    pub fn stop(&mut self, camera: &mut dyn CameraHost) {
        if self.is_playing() {
            tracing::debug!("cutscene stopped");
        }
        self.segment = None;
        self.state = CutsceneState::Idle;
        self.release(camera);
    }

    fn finish(&mut self, camera: &mut dyn CameraHost) {
        tracing::debug!("cutscene finished");
        self.segment = None;
        self.state = CutsceneState::Idle;
        self.finished = true;
        self.release(camera);
    }

    fn release(&mut self, camera: &mut dyn CameraHost) {
        if self.camera_locked {
            camera.release_camera();
            self.camera_locked = false;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyframe::KeyframeTiming;
    use cinereel_log::sandbox::MemoryHost;

    // -- helpers ----------------------------------------------------------

    /// k1 at 0, k2 at 15 (5 hold + 10 path), k3 at 25 resting 4 ticks.
    fn three_keyframes() -> (KeyframeTimeline, [KeyframeId; 3]) {
        let mut t = KeyframeTimeline::new();
        let g = t.add_group();
        let k1 = t
            .add_keyframe(g, CameraPose::at(0.0, 64.0, 0.0), KeyframeTiming::default())
            .unwrap();
        let k2 = t
            .add_keyframe(g, CameraPose::at(10.0, 64.0, 0.0), KeyframeTiming::path(10).with_start_delay(5))
            .unwrap();
        let k3 = t
            .add_keyframe(
                g,
                CameraPose::at(10.0, 64.0, 10.0),
                KeyframeTiming::path(10).with_transition_delay(4),
            )
            .unwrap();
        (t, [k1, k2, k3])
    }

    fn ticks(cutscene: &mut CutscenePlayback, host: &mut MemoryHost, n: u32) {
        for _ in 0..n {
            cutscene.tick(host);
        }
    }

    // -- tests ------------------------------------------------------------

    #[test]
    fn hold_then_travel_then_next_pair() {
        let (timeline, [k1, k2, k3]) = three_keyframes();
        let mut host = MemoryHost::new();
        let mut cutscene = CutscenePlayback::new(timeline, CutsceneConfig::default());
        cutscene.play_from_start(&mut host).unwrap();
        assert_eq!(cutscene.state(), CutsceneState::Armed);
        assert_eq!(cutscene.current_pair(), Some((k1, k2)));

        ticks(&mut cutscene, &mut host, 3);
        assert_eq!(cutscene.state(), CutsceneState::Playing);
        assert_eq!(cutscene.sample(0.5).unwrap().x, 0.0);
        assert_eq!(cutscene.elapsed_ticks(), 0);

        ticks(&mut cutscene, &mut host, 7);
        assert!((cutscene.sample(0.0).unwrap().x - 5.0).abs() < 1e-9);
        assert!((cutscene.sample(0.5).unwrap().x - 5.5).abs() < 1e-9);
        assert_eq!(cutscene.elapsed_ticks(), 5);

        ticks(&mut cutscene, &mut host, 5);
        assert_eq!(cutscene.current_pair(), Some((k2, k3)));
        assert_eq!(cutscene.segment_tick(), 0);
        assert_eq!(cutscene.sample(0.0).unwrap().z, 0.0);
    }

    #[test]
    fn last_keyframe_rests_for_its_transition_delay() {
        let (timeline, _) = three_keyframes();
        let mut host = MemoryHost::new();
        let mut cutscene = CutscenePlayback::new(timeline, CutsceneConfig::default());
        cutscene.play_from_start(&mut host).unwrap();
        assert!(host.camera_locked());

        ticks(&mut cutscene, &mut host, 25);
        assert!(cutscene.is_playing());
        assert_eq!(cutscene.sample(0.0).unwrap().z, 10.0);

        ticks(&mut cutscene, &mut host, 4);
        assert!(!cutscene.is_playing());
        assert!(!host.camera_locked());
        assert_eq!(cutscene.progress(), 1.0);
        assert!(cutscene.sample(0.0).is_none());
    }

    #[test]
    fn stop_releases_the_camera() {
        let (timeline, _) = three_keyframes();
        let mut host = MemoryHost::new();
        let mut cutscene = CutscenePlayback::new(timeline, CutsceneConfig::default());
        cutscene.play_from_start(&mut host).unwrap();
        ticks(&mut cutscene, &mut host, 12);
        cutscene.render(&mut host, 0.0).unwrap();
        assert!(host.camera().is_some());

        cutscene.stop(&mut host);
        assert!(!host.camera_locked());
        assert_eq!(cutscene.state(), CutsceneState::Idle);
        assert_eq!(cutscene.progress(), 0.0);
    }

    #[test]
    fn refused_lock_still_plays() {
        let (timeline, _) = three_keyframes();
        let mut host = MemoryHost::new();
        host.refuse_camera(true);
        let mut cutscene = CutscenePlayback::new(timeline, CutsceneConfig::default());
        cutscene.play_from_start(&mut host).unwrap();
        ticks(&mut cutscene, &mut host, 10);
        assert!(cutscene.is_playing());
        assert!(!host.camera_locked());
    }

    #[test]
    fn too_few_keyframes_is_an_error() {
        let mut timeline = KeyframeTimeline::new();
        let g = timeline.add_group();
        timeline
            .add_keyframe(g, CameraPose::default(), KeyframeTiming::default())
            .unwrap();
        let mut host = MemoryHost::new();
        let mut cutscene = CutscenePlayback::new(timeline, CutsceneConfig::default());
        assert_eq!(
            cutscene.play_from_start(&mut host),
            Err(TimelineError::TooFewKeyframes(1))
        );
        assert!(!host.camera_locked());
    }

    #[test]
    fn zero_path_segment_snaps_to_target() {
        let mut timeline = KeyframeTimeline::new();
        let g = timeline.add_group();
        let a = timeline
            .add_keyframe(g, CameraPose::at(0.0, 0.0, 0.0), KeyframeTiming::default())
            .unwrap();
        let b = timeline
            .add_keyframe(g, CameraPose::at(3.0, 0.0, 0.0), KeyframeTiming::path(0).with_start_delay(2))
            .unwrap();
        let mut host = MemoryHost::new();
        let mut cutscene = CutscenePlayback::new(timeline, CutsceneConfig::default());
        cutscene.setup_and_play(&mut host, a, b).unwrap();
        assert_eq!(cutscene.sample(0.9).unwrap().x, 0.0);
        ticks(&mut cutscene, &mut host, 1);
        let pose = cutscene.sample(0.99).unwrap();
        assert!(pose.is_finite());
        assert_eq!(pose.x, 0.0);
        ticks(&mut cutscene, &mut host, 1);
        assert!(!cutscene.is_playing());
    }
}
