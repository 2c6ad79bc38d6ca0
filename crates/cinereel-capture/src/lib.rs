//! Cinereel Capture -- turning a live world into a take.
//!
//! The [`RecordingSession`](recording::RecordingSession) discovers objects
//! around a master, allocates their logical ids, and runs a
//! [`StateSampler`](sampler::StateSampler) per object every tick. The result
//! is a set of [`ActionStream`](cinereel_log::stream::ActionStream)s handed
//! to a [`SaveTarget`](recording::SaveTarget) on save.
//!
//! # Modules
//!
//! - [`sampler`]: delta encoding of observed state into actions.
//! - [`recording`]: the recording state machine, id allocation and
//!   host-reported events.

#![deny(unsafe_code)]

pub mod recording;
pub mod sampler;

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::recording::{
        IdAllocator, ObjectEvent, RecordingConfig, RecordingError, RecordingSession,
        RecordingState, SaveTarget,
    };
    pub use crate::sampler::StateSampler;
}
