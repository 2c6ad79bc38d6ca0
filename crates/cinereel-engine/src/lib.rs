//! Cinereel Engine -- takes, replay and camera cutscenes.
//!
//! This crate builds on [`cinereel_log`] and [`cinereel_capture`] to provide
//! everything that happens after a take is recorded: sealing it into a
//! [`Take`](take::Take), replaying it bidirectionally with a
//! [`PlaybackSession`](playback::PlaybackSession), and flying the camera
//! along authored keyframes with a
//! [`CutscenePlayback`](cutscene::CutscenePlayback). The
//! [`StudioLoop`](tick::StudioLoop) drives all of them in a fixed order.
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use cinereel_engine::prelude::*;
//!
//! let mut host = MemoryHost::new();
//! let actor = host.insert(ObservedState::new(ObjectCategory::Actor, Pose::at(0.0, 64.0, 0.0)));
//!
//! let mut studio = StudioLoop::new(host, TickConfig::default());
//! studio.start_recording(actor).unwrap();
//! for _ in 0..20 {
//!     studio.host_mut().object_mut(actor).unwrap().pose.z += 0.25;
//!     studio.tick();
//! }
//! let take = Arc::new(studio.save_recording("stroll").unwrap().unwrap());
//! take.verify().unwrap();
//!
//! let slot = studio.add_playback(take, PlaybackConfig::default());
//! studio.run_ticks(5);
//! assert_eq!(studio.playback(slot).unwrap().current_tick(), 5);
//! ```

#![deny(unsafe_code)]

pub mod config;
pub mod cutscene;
pub mod keyframe;
pub mod playback;
pub mod spline;
pub mod take;
pub mod tick;
pub mod timeline;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

/// Re-export the log crate for convenience.
pub use cinereel_log;

/// Re-export the capture crate for convenience.
pub use cinereel_capture;

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use cinereel_capture::prelude::*;
    pub use cinereel_log::prelude::*;

    pub use crate::config::StudioConfig;
    pub use crate::cutscene::{CutsceneConfig, CutscenePlayback, CutsceneState};
    pub use crate::keyframe::{Easing, Keyframe, KeyframeGroup, KeyframeId, KeyframeTiming};
    pub use crate::playback::{PlaybackConfig, PlaybackError, PlaybackSession, SeekReport};
    pub use crate::spline::{ArcLengthTable, CameraSpline, ARC_LENGTH_SAMPLES};
    pub use crate::take::{LoadReport, Take};
    pub use crate::tick::{StudioLoop, TickConfig, TickDiagnostics};
    pub use crate::timeline::{KeyframeTimeline, SegmentPath, TimelineCursor, TimelineError};
}
