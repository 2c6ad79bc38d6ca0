//! The host capability boundary.
//!
//! The core never reaches into the game engine. Everything it reads or
//! writes goes through [`HostWorld`], which the embedding engine implements
//! over its own entity and world primitives. Handles are plain numeric ids
//! owned by the host; the core only stores and passes them back.
//!
//! # Design
//!
//! - **Reads are immediate:** [`HostWorld::observe`] returns a full
//!   [`ObservedState`] for one object, [`HostWorld::nearby_objects`]
//!   enumerates candidates for tracking.
//! - **Writes are per-field:** every reversible [`Action`](crate::action::Action)
//!   maps to exactly one setter, so `execute` and `rewind` are symmetric.
//! - **Failures are values:** setters return [`HostError`]; the replay engine
//!   treats them as skippable, never fatal.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::block::{BlockPos, BlockState};
use crate::pose::{CameraPose, Pose};
use crate::state::{
    EquipmentSlot, GameMode, Hand, ItemStack, ObjectSnapshot, ObservedState, Posture, StateFlags,
};

// ---------------------------------------------------------------------------
// ObjectHandle
// ---------------------------------------------------------------------------

/// Host-assigned handle of a live object.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectHandle(pub u64);

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectHandle({})", self.0)
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ObjectEffect
// ---------------------------------------------------------------------------

/// A one-shot visual effect. Effects are fire-and-forget: there is nothing to
/// undo, so the actions carrying them rewind as no-ops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ObjectEffect {
    Swing(Hand),
    Hurt,
    UseItem(Hand),
    RightClickBlock { pos: BlockPos, hand: Hand },
}

// ---------------------------------------------------------------------------
// HostError
// ---------------------------------------------------------------------------

/// Errors reported by a [`HostWorld`] implementation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HostError {
    /// The handle does not refer to a live object.
    #[error("object {0} does not exist")]
    NoSuchObject(ObjectHandle),

    /// The host could not recreate an object from its snapshot.
    #[error("spawn from snapshot failed: {0}")]
    SpawnFailed(String),

    /// The host refused the mutation (wrong category, protected object...).
    #[error("host rejected mutation on {object}: {reason}")]
    Rejected {
        /// The object the mutation targeted.
        object: ObjectHandle,
        /// Host-provided explanation.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// HostWorld
// ---------------------------------------------------------------------------

/// Capabilities the core consumes from the host engine.
pub trait HostWorld {
    /// Objects whose position lies within `radius` of `center`.
    fn nearby_objects(&self, center: &Pose, radius: f64) -> Vec<ObjectHandle>;

    /// Current observable state of an object, or `None` if it is gone.
    fn observe(&self, object: ObjectHandle) -> Option<ObservedState>;

    /// Full serialized state of an object, used to respawn it later.
    fn snapshot(&self, object: ObjectHandle) -> Option<ObjectSnapshot>;

    /// Whether the handle refers to a live object.
    fn exists(&self, object: ObjectHandle) -> bool {
        self.observe(object).is_some()
    }

    /// Recreate an object from a snapshot at `pose`.
    fn spawn(&mut self, snapshot: &ObjectSnapshot, pose: &Pose) -> Result<ObjectHandle, HostError>;

    /// Remove an object. Returns `false` if it did not exist.
    fn despawn(&mut self, object: ObjectHandle) -> bool;

    /// Serialized state of the cell at `pos`.
    fn block_at(&self, pos: BlockPos) -> BlockState;

    /// Overwrite the cell at `pos`.
    fn set_block(&mut self, pos: BlockPos, state: &BlockState);

    /// Move an object to `pose` without interpolation.
    fn teleport(&mut self, object: ObjectHandle, pose: &Pose) -> Result<(), HostError>;

    fn set_posture(&mut self, object: ObjectHandle, posture: Posture) -> Result<(), HostError>;

    fn set_flags(&mut self, object: ObjectHandle, flags: StateFlags) -> Result<(), HostError>;

    fn set_equipment(
        &mut self,
        object: ObjectHandle,
        slot: EquipmentSlot,
        stack: Option<&ItemStack>,
    ) -> Result<(), HostError>;

    fn set_vehicle_data(&mut self, object: ObjectHandle, data: &[u8]) -> Result<(), HostError>;

    fn set_game_mode(&mut self, object: ObjectHandle, mode: GameMode) -> Result<(), HostError>;

    /// Put `rider` on `vehicle`.
    fn mount(&mut self, rider: ObjectHandle, vehicle: ObjectHandle) -> Result<(), HostError>;

    /// Take `rider` off whatever it rides. Not riding is not an error.
    fn dismount(&mut self, rider: ObjectHandle) -> Result<(), HostError>;

    /// Play a one-shot effect on an object.
    fn play_effect(&mut self, object: ObjectHandle, effect: &ObjectEffect);

    /// Play the pickup of `stack` by `object`, removing the matching dropped
    /// item from the world if the host tracks one.
    fn take_item(&mut self, object: ObjectHandle, stack: &ItemStack) -> Result<(), HostError>;

    /// Put a dropped `stack` into the world at `pose`.
    fn drop_item(&mut self, pose: &Pose, stack: &ItemStack) -> Result<(), HostError>;
}

// ---------------------------------------------------------------------------
// CameraHost
// ---------------------------------------------------------------------------

/// Camera control consumed by cutscene playback.
///
/// The lock models the host's "controller" reference: while a cutscene holds
/// it, player input does not move the camera. Releasing must always hand
/// control back, even when playback is stopped mid-segment.
pub trait CameraHost {
    /// Take the camera lock. Returns `false` if the host refuses.
    fn acquire_camera(&mut self) -> bool;

    /// Give the camera lock back. Releasing an unheld lock is a no-op.
    fn release_camera(&mut self);

    /// Apply a camera pose for the current render frame.
    fn set_camera(&mut self, pose: &CameraPose);
}
