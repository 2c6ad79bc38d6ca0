//! Recorded world-mutation events with forward and backward semantics.
//!
//! An [`Action`] is one entry of an [`ActionStream`](crate::stream::ActionStream):
//! a tick plus an [`ActionKind`] payload. The kind set is closed, so replay
//! dispatch is an exhaustive `match` rather than dynamic lookup.
//!
//! # Reversibility
//!
//! Every kind is listed below with what [`Action::rewind`] does. The table is
//! authoritative; there is deliberately no uniform rule.
//!
//! | Kind | `rewind` |
//! |------|----------|
//! | `PlaceBlock`, `BreakBlock` | restores both cells' `before` states |
//! | `PostureChange`, `FlagsChange`, `VehicleDataChange` | restores `old` |
//! | `EquipmentChange` | restores `old_item` in the slot |
//! | `GameModeChange` | restores `old`; no-op when the change was the initial snapshot |
//! | `MountStart` / `MountStop` | dismounts / remounts |
//! | `Spawn`, `Respawn` | despawns the object |
//! | `Despawn`, `Death` | respawns the object from the carried snapshot |
//! | `TakeItem` | drops the stack back into the world (the pickup animation is not undone) |
//! | `Hurt`, `Swing`, `UseItem`, `RightClickBlock` | no-op |
//!
//! # Example
//!
//! ```
//! use cinereel_log::prelude::*;
//!
//! let mut host = MemoryHost::new();
//! let actor = host.insert(ObservedState::new(ObjectCategory::Actor, Pose::default()));
//!
//! let action = Action::new(3, ActionKind::PostureChange {
//!     old: Posture::Standing,
//!     new: Posture::Sneaking,
//! });
//!
//! let bindings = Bindings::new();
//! let snapshot = ObjectSnapshot::default();
//! let mut ctx = ActionContext::new(&mut host, Some(actor), &snapshot, Pose::default(), &bindings);
//! action.execute(&mut ctx).unwrap();
//! assert_eq!(host.observe(actor).unwrap().posture, Posture::Sneaking);
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::block::{BlockPos, CellEdit};
use crate::host::{HostError, HostWorld, ObjectEffect, ObjectHandle};
use crate::pose::Pose;
use crate::state::{
    EquipmentSlot, GameMode, Hand, ItemStack, ObjectSnapshot, Posture, StateFlags,
};
use crate::stream::LogicalId;

/// Resolution table from logical ids to live handles.
pub type Bindings = HashMap<LogicalId, ObjectHandle>;

// ---------------------------------------------------------------------------
// ActionKind
// ---------------------------------------------------------------------------

/// The payload of an [`Action`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActionKind {
    /// A cell (and possibly its partner cell) was placed.
    PlaceBlock {
        anchor: CellEdit,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        partner: Option<CellEdit>,
    },
    /// A cell (and possibly its partner cell) was broken.
    BreakBlock {
        anchor: CellEdit,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        partner: Option<CellEdit>,
    },
    PostureChange {
        old: Posture,
        new: Posture,
    },
    FlagsChange {
        old: StateFlags,
        new: StateFlags,
    },
    EquipmentChange {
        slot: EquipmentSlot,
        new_item: Option<ItemStack>,
        old_item: Option<ItemStack>,
    },
    /// The object started riding the object recorded under `vehicle`.
    MountStart {
        vehicle: LogicalId,
    },
    /// The object stopped riding the object recorded under `vehicle`.
    MountStop {
        vehicle: LogicalId,
    },
    VehicleDataChange {
        old: Vec<u8>,
        new: Vec<u8>,
    },
    /// Game mode of a controllable actor. `old` is `None` for the snapshot
    /// emitted when recording starts.
    GameModeChange {
        old: Option<GameMode>,
        new: GameMode,
    },
    /// Tracking of the object began; it must exist from this tick on.
    Spawn,
    /// The object left the world.
    Despawn {
        snapshot: ObjectSnapshot,
    },
    /// The object died.
    Death {
        snapshot: ObjectSnapshot,
    },
    /// The object came back after a death.
    Respawn,
    TakeItem {
        stack: ItemStack,
    },
    Hurt,
    Swing {
        hand: Hand,
    },
    UseItem {
        hand: Hand,
    },
    RightClickBlock {
        pos: BlockPos,
        hand: Hand,
    },
}

/// How much of an action [`Action::rewind`] can undo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reversibility {
    /// Rewind restores the prior value exactly.
    Full,
    /// Rewind reconstructs the world-side effect but not the animation.
    Partial,
    /// Rewind is a documented no-op.
    None,
}

impl ActionKind {
    /// Short stable name, used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::PlaceBlock { .. } => "place_block",
            ActionKind::BreakBlock { .. } => "break_block",
            ActionKind::PostureChange { .. } => "posture_change",
            ActionKind::FlagsChange { .. } => "flags_change",
            ActionKind::EquipmentChange { .. } => "equipment_change",
            ActionKind::MountStart { .. } => "mount_start",
            ActionKind::MountStop { .. } => "mount_stop",
            ActionKind::VehicleDataChange { .. } => "vehicle_data_change",
            ActionKind::GameModeChange { .. } => "game_mode_change",
            ActionKind::Spawn => "spawn",
            ActionKind::Despawn { .. } => "despawn",
            ActionKind::Death { .. } => "death",
            ActionKind::Respawn => "respawn",
            ActionKind::TakeItem { .. } => "take_item",
            ActionKind::Hurt => "hurt",
            ActionKind::Swing { .. } => "swing",
            ActionKind::UseItem { .. } => "use_item",
            ActionKind::RightClickBlock { .. } => "right_click_block",
        }
    }

    pub fn reversibility(&self) -> Reversibility {
        match self {
            ActionKind::Hurt
            | ActionKind::Swing { .. }
            | ActionKind::UseItem { .. }
            | ActionKind::RightClickBlock { .. } => Reversibility::None,
            ActionKind::TakeItem { .. } => Reversibility::Partial,
            _ => Reversibility::Full,
        }
    }

    /// Whether the action mutates world cells rather than its object.
    pub fn is_world_mutation(&self) -> bool {
        matches!(
            self,
            ActionKind::PlaceBlock { .. } | ActionKind::BreakBlock { .. }
        )
    }

    /// The object's alive state after this action, for lifecycle kinds.
    pub fn alive_after(&self) -> Option<bool> {
        match self {
            ActionKind::Spawn | ActionKind::Respawn => Some(true),
            ActionKind::Despawn { .. } | ActionKind::Death { .. } => Some(false),
            _ => None,
        }
    }

    /// Another stream this action needs resolved before it can apply.
    pub fn referent(&self) -> Option<LogicalId> {
        match self {
            ActionKind::MountStart { vehicle } | ActionKind::MountStop { vehicle } => {
                Some(*vehicle)
            }
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// ActionContext / ActionOutcome / ActionError
// ---------------------------------------------------------------------------

/// Everything an action needs to apply itself.
pub struct ActionContext<'a> {
    /// The host world.
    pub host: &'a mut dyn HostWorld,
    /// Live handle of the stream's object, `None` if it is not in the world.
    pub target: Option<ObjectHandle>,
    /// State to rebuild the object from, used by `Spawn` and `Respawn`:
    /// the spawn snapshot, or the snapshot of the latest death for a respawn.
    pub snapshot: &'a ObjectSnapshot,
    /// The recorded pose at the action's tick.
    pub pose: Pose,
    /// Live handles of other streams, for actions with a referent.
    pub bindings: &'a Bindings,
}

impl<'a> ActionContext<'a> {
    pub fn new(
        host: &'a mut dyn HostWorld,
        target: Option<ObjectHandle>,
        snapshot: &'a ObjectSnapshot,
        pose: Pose,
        bindings: &'a Bindings,
    ) -> Self {
        Self {
            host,
            target,
            snapshot,
            pose,
            bindings,
        }
    }

    fn live_target(&self, tick: u64) -> Result<ObjectHandle, ActionError> {
        match self.target {
            Some(handle) if self.host.exists(handle) => Ok(handle),
            _ => Err(ActionError::MissingTarget { tick }),
        }
    }

    fn referent(&self, id: LogicalId) -> Result<ObjectHandle, ActionError> {
        self.bindings
            .get(&id)
            .copied()
            .filter(|h| self.host.exists(*h))
            .ok_or(ActionError::MissingReferent(id))
    }

    fn target_is_live(&self) -> bool {
        self.target.is_some_and(|h| self.host.exists(h))
    }
}

/// What applying an action did to the stream's object binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The action changed state.
    Applied,
    /// Nothing to do (irreversible rewind, already in the target state).
    NoOp,
    /// The object was (re)created under a new handle.
    Spawned(ObjectHandle),
    /// The object was removed from the world.
    Despawned,
}

/// Errors produced while applying an action. All of them are recoverable:
/// replay skips the action and continues.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    /// The stream's object is not live and the action needs it.
    #[error("action at tick {tick} targets an object that is not in the world")]
    MissingTarget {
        /// Tick of the skipped action.
        tick: u64,
    },

    /// The action references another stream whose object is not live.
    #[error("referenced stream {0} has no live object")]
    MissingReferent(LogicalId),

    /// The host refused the mutation.
    #[error(transparent)]
    Host(#[from] HostError),
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// A single recorded mutation at a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub tick: u64,
    pub kind: ActionKind,
}

impl Action {
    pub fn new(tick: u64, kind: ActionKind) -> Self {
        Self { tick, kind }
    }

    /// Apply the action going forward in time.
    ///
    /// Idempotent at its own tick: applying twice leaves the same state.
    pub fn execute(&self, ctx: &mut ActionContext<'_>) -> Result<ActionOutcome, ActionError> {
        let tick = self.tick;
        match &self.kind {
            ActionKind::PlaceBlock { anchor, partner } | ActionKind::BreakBlock { anchor, partner } => {
                ctx.host.set_block(anchor.pos, &anchor.after);
                if let Some(partner) = partner {
                    ctx.host.set_block(partner.pos, &partner.after);
                }
                Ok(ActionOutcome::Applied)
            }
            ActionKind::PostureChange { new, .. } => {
                let target = ctx.live_target(tick)?;
                ctx.host.set_posture(target, *new)?;
                Ok(ActionOutcome::Applied)
            }
            ActionKind::FlagsChange { new, .. } => {
                let target = ctx.live_target(tick)?;
                ctx.host.set_flags(target, *new)?;
                Ok(ActionOutcome::Applied)
            }
            ActionKind::EquipmentChange { slot, new_item, .. } => {
                let target = ctx.live_target(tick)?;
                ctx.host.set_equipment(target, *slot, new_item.as_ref())?;
                Ok(ActionOutcome::Applied)
            }
            ActionKind::MountStart { vehicle } => {
                let target = ctx.live_target(tick)?;
                let vehicle = ctx.referent(*vehicle)?;
                ctx.host.mount(target, vehicle)?;
                Ok(ActionOutcome::Applied)
            }
            ActionKind::MountStop { .. } => {
                let target = ctx.live_target(tick)?;
                ctx.host.dismount(target)?;
                Ok(ActionOutcome::Applied)
            }
            ActionKind::VehicleDataChange { new, .. } => {
                let target = ctx.live_target(tick)?;
                ctx.host.set_vehicle_data(target, new)?;
                Ok(ActionOutcome::Applied)
            }
            ActionKind::GameModeChange { new, .. } => {
                let target = ctx.live_target(tick)?;
                ctx.host.set_game_mode(target, *new)?;
                Ok(ActionOutcome::Applied)
            }
            ActionKind::Spawn | ActionKind::Respawn => {
                if ctx.target_is_live() {
                    return Ok(ActionOutcome::NoOp);
                }
                let handle = ctx.host.spawn(ctx.snapshot, &ctx.pose)?;
                Ok(ActionOutcome::Spawned(handle))
            }
            ActionKind::Despawn { .. } | ActionKind::Death { .. } => match ctx.target {
                Some(handle) if ctx.host.despawn(handle) => Ok(ActionOutcome::Despawned),
                _ => Ok(ActionOutcome::NoOp),
            },
            ActionKind::TakeItem { stack } => {
                let target = ctx.live_target(tick)?;
                ctx.host.take_item(target, stack)?;
                Ok(ActionOutcome::Applied)
            }
            ActionKind::Hurt => self.play(ctx, ObjectEffect::Hurt),
            ActionKind::Swing { hand } => self.play(ctx, ObjectEffect::Swing(*hand)),
            ActionKind::UseItem { hand } => self.play(ctx, ObjectEffect::UseItem(*hand)),
            ActionKind::RightClickBlock { pos, hand } => self.play(
                ctx,
                ObjectEffect::RightClickBlock {
                    pos: *pos,
                    hand: *hand,
                },
            ),
        }
    }

    /// Undo the action going backward in time. See the module table for
    /// what each kind restores.
    pub fn rewind(&self, ctx: &mut ActionContext<'_>) -> Result<ActionOutcome, ActionError> {
        let tick = self.tick;
        match &self.kind {
            ActionKind::PlaceBlock { anchor, partner } | ActionKind::BreakBlock { anchor, partner } => {
                if let Some(partner) = partner {
                    ctx.host.set_block(partner.pos, &partner.before);
                }
                ctx.host.set_block(anchor.pos, &anchor.before);
                Ok(ActionOutcome::Applied)
            }
            ActionKind::PostureChange { old, .. } => {
                let target = ctx.live_target(tick)?;
                ctx.host.set_posture(target, *old)?;
                Ok(ActionOutcome::Applied)
            }
            ActionKind::FlagsChange { old, .. } => {
                let target = ctx.live_target(tick)?;
                ctx.host.set_flags(target, *old)?;
                Ok(ActionOutcome::Applied)
            }
            ActionKind::EquipmentChange { slot, old_item, .. } => {
                let target = ctx.live_target(tick)?;
                ctx.host.set_equipment(target, *slot, old_item.as_ref())?;
                Ok(ActionOutcome::Applied)
            }
            ActionKind::MountStart { .. } => {
                let target = ctx.live_target(tick)?;
                ctx.host.dismount(target)?;
                Ok(ActionOutcome::Applied)
            }
            ActionKind::MountStop { vehicle } => {
                let target = ctx.live_target(tick)?;
                let vehicle = ctx.referent(*vehicle)?;
                ctx.host.mount(target, vehicle)?;
                Ok(ActionOutcome::Applied)
            }
            ActionKind::VehicleDataChange { old, .. } => {
                let target = ctx.live_target(tick)?;
                ctx.host.set_vehicle_data(target, old)?;
                Ok(ActionOutcome::Applied)
            }
            ActionKind::GameModeChange { old, .. } => match old {
                Some(old) => {
                    let target = ctx.live_target(tick)?;
                    ctx.host.set_game_mode(target, *old)?;
                    Ok(ActionOutcome::Applied)
                }
                None => Ok(ActionOutcome::NoOp),
            },
            ActionKind::Spawn | ActionKind::Respawn => match ctx.target {
                Some(handle) if ctx.host.despawn(handle) => Ok(ActionOutcome::Despawned),
                _ => Ok(ActionOutcome::NoOp),
            },
            ActionKind::Despawn { snapshot } | ActionKind::Death { snapshot } => {
                if ctx.target_is_live() {
                    return Ok(ActionOutcome::NoOp);
                }
                let handle = ctx.host.spawn(snapshot, &ctx.pose)?;
                Ok(ActionOutcome::Spawned(handle))
            }
            ActionKind::TakeItem { stack } => {
                ctx.host.drop_item(&ctx.pose, stack)?;
                Ok(ActionOutcome::Applied)
            }
            ActionKind::Hurt
            | ActionKind::Swing { .. }
            | ActionKind::UseItem { .. }
            | ActionKind::RightClickBlock { .. } => Ok(ActionOutcome::NoOp),
        }
    }

    fn play(
        &self,
        ctx: &mut ActionContext<'_>,
        effect: ObjectEffect,
    ) -> Result<ActionOutcome, ActionError> {
        let target = ctx.live_target(self.tick)?;
        ctx.host.play_effect(target, &effect);
        Ok(ActionOutcome::Applied)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockState;
    use crate::sandbox::MemoryHost;
    use crate::state::{ObjectCategory, ObservedState};

    // -- helpers ------------------------------------------------------------

    fn actor(host: &mut MemoryHost) -> ObjectHandle {
        host.insert(ObservedState::new(ObjectCategory::Actor, Pose::at(0.0, 64.0, 0.0)))
    }

    fn run(
        host: &mut MemoryHost,
        target: Option<ObjectHandle>,
        bindings: &Bindings,
        action: &Action,
        forward: bool,
    ) -> Result<ActionOutcome, ActionError> {
        let snapshot = ObjectSnapshot(serde_json::json!({"category": "Actor"}));
        let mut ctx = ActionContext::new(host, target, &snapshot, Pose::at(1.0, 64.0, 1.0), bindings);
        if forward {
            action.execute(&mut ctx)
        } else {
            action.rewind(&mut ctx)
        }
    }

    // -- block mutations ----------------------------------------------------

    #[test]
    fn door_place_and_rewind_touch_both_cells() {
        let mut host = MemoryHost::new();
        let lower_pos = BlockPos::new(0, 64, 0);
        let lower = BlockState::new("minecraft:oak_door").with("half", "lower");
        let (upper_pos, upper) = lower.partner(lower_pos).unwrap();
        host.set_block(upper_pos, &BlockState::new("minecraft:tall_grass"));

        let action = Action::new(
            5,
            ActionKind::PlaceBlock {
                anchor: CellEdit::new(lower_pos, BlockState::air(), lower.clone()),
                partner: Some(CellEdit::new(
                    upper_pos,
                    BlockState::new("minecraft:tall_grass"),
                    upper.clone(),
                )),
            },
        );
        let bindings = Bindings::new();

        run(&mut host, None, &bindings, &action, true).unwrap();
        assert_eq!(host.block_at(lower_pos), lower);
        assert_eq!(host.block_at(upper_pos), upper);

        run(&mut host, None, &bindings, &action, false).unwrap();
        assert!(host.block_at(lower_pos).is_air());
        assert_eq!(host.block_at(upper_pos), BlockState::new("minecraft:tall_grass"));
    }

    // -- object state -------------------------------------------------------

    #[test]
    fn equipment_change_round_trips() {
        let mut host = MemoryHost::new();
        let a = actor(&mut host);
        let bindings = Bindings::new();
        let sword = ItemStack::new("minecraft:iron_sword", 1)
            .with_extra(serde_json::json!({"damage": 3}));
        let action = Action::new(
            1,
            ActionKind::EquipmentChange {
                slot: EquipmentSlot::MainHand,
                new_item: Some(sword.clone()),
                old_item: None,
            },
        );

        run(&mut host, Some(a), &bindings, &action, true).unwrap();
        assert_eq!(
            host.observe(a).unwrap().equipment.get(EquipmentSlot::MainHand),
            Some(&sword)
        );
        run(&mut host, Some(a), &bindings, &action, false).unwrap();
        assert!(host.observe(a).unwrap().equipment.get(EquipmentSlot::MainHand).is_none());
    }

    #[test]
    fn missing_target_is_reported_not_panicked() {
        let mut host = MemoryHost::new();
        let bindings = Bindings::new();
        let action = Action::new(
            9,
            ActionKind::PostureChange {
                old: Posture::Standing,
                new: Posture::Sitting,
            },
        );
        let err = run(&mut host, Some(ObjectHandle(42)), &bindings, &action, true).unwrap_err();
        assert!(matches!(err, ActionError::MissingTarget { tick: 9 }));
    }

    #[test]
    fn mount_needs_resolved_vehicle() {
        let mut host = MemoryHost::new();
        let rider = actor(&mut host);
        let boat = host.insert(ObservedState::new(ObjectCategory::Vehicle, Pose::default()));
        let action = Action::new(2, ActionKind::MountStart { vehicle: LogicalId(7) });

        let empty = Bindings::new();
        let err = run(&mut host, Some(rider), &empty, &action, true).unwrap_err();
        assert!(matches!(err, ActionError::MissingReferent(LogicalId(7))));

        let mut bindings = Bindings::new();
        bindings.insert(LogicalId(7), boat);
        run(&mut host, Some(rider), &bindings, &action, true).unwrap();
        assert_eq!(host.observe(rider).unwrap().mount, Some(boat));

        run(&mut host, Some(rider), &bindings, &action, false).unwrap();
        assert_eq!(host.observe(rider).unwrap().mount, None);
    }

    // -- lifecycle ----------------------------------------------------------

    #[test]
    fn death_despawns_and_rewind_respawns() {
        let mut host = MemoryHost::new();
        let a = actor(&mut host);
        let bindings = Bindings::new();
        let snapshot = host.snapshot(a).unwrap();
        let action = Action::new(20, ActionKind::Death { snapshot });

        let out = run(&mut host, Some(a), &bindings, &action, true).unwrap();
        assert_eq!(out, ActionOutcome::Despawned);
        assert!(!host.exists(a));

        let out = run(&mut host, Some(a), &bindings, &action, false).unwrap();
        let ActionOutcome::Spawned(again) = out else {
            panic!("expected respawn, got {out:?}");
        };
        assert!(host.exists(again));
        assert_eq!(host.observe(again).unwrap().pose, Pose::at(1.0, 64.0, 1.0));
    }

    #[test]
    fn spawn_is_idempotent_on_live_target() {
        let mut host = MemoryHost::new();
        let a = actor(&mut host);
        let bindings = Bindings::new();
        let action = Action::new(0, ActionKind::Spawn);
        assert_eq!(
            run(&mut host, Some(a), &bindings, &action, true).unwrap(),
            ActionOutcome::NoOp
        );
        assert_eq!(host.object_count(), 1);
    }

    // -- irreversible -------------------------------------------------------

    #[test]
    fn irreversible_kinds_rewind_as_noop() {
        let mut host = MemoryHost::new();
        let a = actor(&mut host);
        let bindings = Bindings::new();
        for kind in [
            ActionKind::Hurt,
            ActionKind::Swing { hand: Hand::Main },
            ActionKind::UseItem { hand: Hand::Off },
            ActionKind::RightClickBlock {
                pos: BlockPos::new(1, 2, 3),
                hand: Hand::Main,
            },
        ] {
            assert_eq!(kind.reversibility(), Reversibility::None);
            let action = Action::new(4, kind);
            run(&mut host, Some(a), &bindings, &action, true).unwrap();
            let before = host.observe(a);
            assert_eq!(
                run(&mut host, Some(a), &bindings, &action, false).unwrap(),
                ActionOutcome::NoOp
            );
            assert_eq!(host.observe(a), before);
        }
        assert_eq!(host.effects().len(), 4);
    }

    #[test]
    fn take_item_rewind_drops_the_stack() {
        let mut host = MemoryHost::new();
        let a = actor(&mut host);
        let bindings = Bindings::new();
        let action = Action::new(
            6,
            ActionKind::TakeItem {
                stack: ItemStack::new("minecraft:apple", 3),
            },
        );
        run(&mut host, Some(a), &bindings, &action, true).unwrap();
        assert_eq!(action.kind.reversibility(), Reversibility::Partial);

        let before = host.object_count();
        run(&mut host, Some(a), &bindings, &action, false).unwrap();
        assert_eq!(host.object_count(), before + 1);
    }

    #[test]
    fn json_shape_is_externally_tagged() {
        let action = Action::new(
            12,
            ActionKind::FlagsChange {
                old: StateFlags(0),
                new: StateFlags(StateFlags::ON_FIRE),
            },
        );
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["tick"], 12);
        assert_eq!(json["kind"]["FlagsChange"]["new"], 1);
        let back: Action = serde_json::from_value(json).unwrap();
        assert_eq!(back, action);
    }
}
