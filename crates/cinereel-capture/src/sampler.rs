//! Per-object delta encoder.
//!
//! A [`StateSampler`] caches the last observed value of every tracked field
//! and turns tick-over-tick differences into [`Action`]s. Absence of an
//! action at tick T means the field was unchanged from T-1.
//!
//! # Example
//!
//! ```
//! use cinereel_capture::sampler::StateSampler;
//! use cinereel_log::prelude::*;
//!
//! let mut sampler = StateSampler::new();
//! let mut state = ObservedState::new(ObjectCategory::Creature, Pose::default());
//! let no_mounts = |_: ObjectHandle| None;
//!
//! // The first observation only primes the cache.
//! assert!(sampler.sample(0, &state, &no_mounts).is_empty());
//!
//! state.posture = Posture::Sitting;
//! let actions = sampler.sample(1, &state, &no_mounts);
//! assert_eq!(actions.len(), 1);
//! assert_eq!(actions[0].tick, 1);
//! ```

use cinereel_log::action::{Action, ActionKind};
use cinereel_log::host::ObjectHandle;
use cinereel_log::state::{Equipment, EquipmentSlot, GameMode, ObservedState, Posture, StateFlags};
use cinereel_log::stream::LogicalId;

/// The subset of [`ObservedState`] that is delta-encoded.
#[derive(Debug, Clone, PartialEq)]
struct Cached {
    flags: StateFlags,
    posture: Posture,
    equipment: Equipment,
    mount: Option<ObjectHandle>,
    vehicle_data: Vec<u8>,
    game_mode: Option<GameMode>,
}

impl From<&ObservedState> for Cached {
    fn from(state: &ObservedState) -> Self {
        Self {
            flags: state.flags,
            posture: state.posture,
            equipment: state.equipment.clone(),
            mount: state.mount,
            vehicle_data: state.vehicle_data.clone(),
            game_mode: state.game_mode,
        }
    }
}

/// Diffs successive observations of one object into actions.
#[derive(Debug, Default)]
pub struct StateSampler {
    cache: Option<Cached>,
}

impl StateSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the sampler has seen at least one observation.
    pub fn is_primed(&self) -> bool {
        self.cache.is_some()
    }

    /// Seed the cache with the state an object was tracked in.
    pub fn prime(&mut self, state: &ObservedState) {
        self.cache = Some(Cached::from(state));
    }

    /// Diff `state` against the cache and return the actions for `tick`.
    ///
    /// `vehicle_id` maps a mount handle to the logical id of its stream.
    /// Mount changes whose vehicle has no stream are dropped with a warning.
    /// The cache is refreshed unconditionally.
    pub fn sample(
        &mut self,
        tick: u64,
        state: &ObservedState,
        vehicle_id: &dyn Fn(ObjectHandle) -> Option<LogicalId>,
    ) -> Vec<Action> {
        let current = Cached::from(state);
        let Some(previous) = self.cache.replace(current.clone()) else {
            return Vec::new();
        };
        if previous == current {
            return Vec::new();
        }

        let mut out = Vec::new();
        let mut push = |kind: ActionKind| out.push(Action::new(tick, kind));

        if previous.flags != current.flags {
            push(ActionKind::FlagsChange {
                old: previous.flags,
                new: current.flags,
            });
        }
        if previous.posture != current.posture {
            push(ActionKind::PostureChange {
                old: previous.posture,
                new: current.posture,
            });
        }
        for slot in EquipmentSlot::ALL {
            let old_item = previous.equipment.get(slot);
            let new_item = current.equipment.get(slot);
            if old_item != new_item {
                push(ActionKind::EquipmentChange {
                    slot,
                    new_item: new_item.cloned(),
                    old_item: old_item.cloned(),
                });
            }
        }
        if previous.mount != current.mount {
            if let Some(old) = previous.mount {
                match vehicle_id(old) {
                    Some(vehicle) => push(ActionKind::MountStop { vehicle }),
                    None => tracing::warn!(tick, vehicle = %old, "dismount from untracked vehicle"),
                }
            }
            if let Some(new) = current.mount {
                match vehicle_id(new) {
                    Some(vehicle) => push(ActionKind::MountStart { vehicle }),
                    None => tracing::warn!(tick, vehicle = %new, "mount on untracked vehicle"),
                }
            }
        }
        if previous.vehicle_data != current.vehicle_data {
            push(ActionKind::VehicleDataChange {
                old: previous.vehicle_data,
                new: current.vehicle_data,
            });
        }
        if let (old, Some(new)) = (previous.game_mode, current.game_mode) {
            if old != Some(new) {
                push(ActionKind::GameModeChange { old, new });
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
