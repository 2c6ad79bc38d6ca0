//! Cinereel Log -- the replayable record of a take.
//!
//! This crate defines what a recording *is*: per-object [`ActionStream`]s
//! made of a dense pose timeline plus a sparse, typed list of [`Action`]s,
//! and the [`HostWorld`] capability trait through which those actions are
//! applied to (and undone on) a live game world.
//!
//! # Modules
//!
//! - [`pose`]: per-tick object pose and free camera pose.
//! - [`state`]: observable object state, the read side of the host boundary.
//! - [`block`]: world cells and two-cell structure resolution.
//! - [`host`]: the [`HostWorld`] and [`CameraHost`] capability traits.
//! - [`action`]: the closed set of recorded mutations with `execute`/`rewind`.
//! - [`stream`]: [`ActionStream`] and its invariant.
//! - [`sandbox`]: [`MemoryHost`], a deterministic in-memory host.
//!
//! # Quick Start
//!
//! ```
//! use cinereel_log::prelude::*;
//!
//! let mut stream = ActionStream::new(LogicalId(1), 0, ObjectSnapshot::default());
//! for x in 0..10 {
//!     stream.push_pose(Pose::at(x as f64, 64.0, 0.0));
//! }
//! stream
//!     .push_action(Action::new(4, ActionKind::Swing { hand: Hand::Main }))
//!     .unwrap();
//!
//! assert_eq!(stream.end_tick(), 10);
//! assert_eq!(stream.actions_at(4).len(), 1);
//! assert!(stream.validate().is_ok());
//! ```
//!
//! [`ActionStream`]: stream::ActionStream
//! [`Action`]: action::Action
//! [`HostWorld`]: host::HostWorld
//! [`CameraHost`]: host::CameraHost
//! [`MemoryHost`]: sandbox::MemoryHost

#![deny(unsafe_code)]

pub mod action;
pub mod block;
pub mod host;
pub mod pose;
pub mod sandbox;
pub mod state;
pub mod stream;

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::action::{
        Action, ActionContext, ActionError, ActionKind, ActionOutcome, Bindings, Reversibility,
    };
    pub use crate::block::{BlockPos, BlockState, CellEdit, AIR};
    pub use crate::host::{CameraHost, HostError, HostWorld, ObjectEffect, ObjectHandle};
    pub use crate::pose::{CameraPose, Pose};
    pub use crate::sandbox::MemoryHost;
    pub use crate::state::{
        Equipment, EquipmentSlot, GameMode, Hand, ItemStack, ObjectCategory, ObjectSnapshot,
        ObservedState, Posture, StateFlags,
    };
    pub use crate::stream::{ActionStream, LogicalId, StreamError};
}
