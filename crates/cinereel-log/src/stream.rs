//! Per-object recorded history.
//!
//! An [`ActionStream`] holds everything recorded about one tracked object:
//! a dense pose timeline (one [`Pose`] per observed tick, starting at
//! `spawn_tick`), a sparse list of [`Action`]s, and the snapshot blob used to
//! recreate the object from nothing.
//!
//! # Invariant
//!
//! Every action tick lies in `[spawn_tick, spawn_tick + positions.len())` and
//! actions are stored in non-decreasing tick order. [`ActionStream::push_action`]
//! enforces this on the write path, [`ActionStream::validate`] checks it after
//! deserialization.

use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::action::{Action, ActionKind};
use crate::pose::Pose;
use crate::state::ObjectSnapshot;

// ---------------------------------------------------------------------------
// LogicalId
// ---------------------------------------------------------------------------

/// Session-stable identity of a tracked object.
///
/// Allocated monotonically per recording; the master object is always `0`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LogicalId(pub u32);

impl LogicalId {
    /// The id of the master object of a recording.
    pub const MASTER: LogicalId = LogicalId(0);
}

impl fmt::Debug for LogicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LogicalId({})", self.0)
    }
}

impl fmt::Display for LogicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// StreamError
// ---------------------------------------------------------------------------

/// Violations of the stream invariant.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StreamError {
    /// An action tick lies outside the observed window.
    #[error("stream {logical_id}: action at tick {tick} outside observed window {start}..{end}")]
    OutOfWindow {
        logical_id: LogicalId,
        tick: u64,
        start: u64,
        end: u64,
    },

    /// An action was appended with a tick earlier than the last one.
    #[error("stream {logical_id}: action at tick {tick} after an action at tick {last}")]
    OutOfOrder {
        logical_id: LogicalId,
        tick: u64,
        last: u64,
    },

    /// A persisted stream is missing a required field.
    #[error("malformed stream: {0}")]
    Malformed(String),
}

// ---------------------------------------------------------------------------
// ActionStream
// ---------------------------------------------------------------------------

fn keep_default() -> bool {
    true
}

/// Recorded history of one tracked object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionStream {
    pub logical_id: LogicalId,
    /// Recording tick at which tracking of the object began.
    pub spawn_tick: u64,
    /// Full object state captured when tracking began.
    pub snapshot: ObjectSnapshot,
    positions: Vec<Pose>,
    actions: Vec<Action>,
    /// Session policy: `false` marks a stream as "do not save".
    #[serde(skip, default = "keep_default")]
    keep: bool,
}

impl ActionStream {
    /// An empty stream whose first pose will belong to `spawn_tick`.
    pub fn new(logical_id: LogicalId, spawn_tick: u64, snapshot: ObjectSnapshot) -> Self {
        Self {
            logical_id,
            spawn_tick,
            snapshot,
            positions: Vec::new(),
            actions: Vec::new(),
            keep: true,
        }
    }

    // -- write path -------------------------------------------------------

    /// Append the pose for the next observed tick.
    pub fn push_pose(&mut self, pose: Pose) {
        self.positions.push(pose);
    }

    /// Append an action. Its tick must already be covered by a pose and must
    /// not precede the last stored action.
    pub fn push_action(&mut self, action: Action) -> Result<(), StreamError> {
        let window = self.window();
        if !window.contains(&action.tick) {
            return Err(StreamError::OutOfWindow {
                logical_id: self.logical_id,
                tick: action.tick,
                start: window.start,
                end: window.end,
            });
        }
        if let Some(last) = self.actions.last() {
            if action.tick < last.tick {
                return Err(StreamError::OutOfOrder {
                    logical_id: self.logical_id,
                    tick: action.tick,
                    last: last.tick,
                });
            }
        }
        self.actions.push(action);
        Ok(())
    }

    pub fn keep(&self) -> bool {
        self.keep
    }

    pub fn set_keep(&mut self, keep: bool) {
        self.keep = keep;
    }

    // -- queries ----------------------------------------------------------

    pub fn positions(&self) -> &[Pose] {
        &self.positions
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Number of observed ticks.
    pub fn len_ticks(&self) -> u64 {
        self.positions.len() as u64
    }

    /// One past the last observed tick.
    pub fn end_tick(&self) -> u64 {
        self.spawn_tick + self.len_ticks()
    }

    /// Ticks for which a pose exists.
    pub fn window(&self) -> Range<u64> {
        self.spawn_tick..self.end_tick()
    }

    pub fn covers(&self, tick: u64) -> bool {
        self.window().contains(&tick)
    }

    /// Recorded pose at an absolute recording tick.
    pub fn pose_at(&self, tick: u64) -> Option<&Pose> {
        let offset = tick.checked_sub(self.spawn_tick)?;
        self.positions.get(usize::try_from(offset).ok()?)
    }

    /// The pose at `tick`, clamped to the observed window.
    pub fn nearest_pose(&self, tick: u64) -> Option<&Pose> {
        if tick < self.spawn_tick {
            self.positions.first()
        } else {
            self.pose_at(tick).or_else(|| self.positions.last())
        }
    }

    /// All actions stamped with exactly `tick`, in insertion order.
    pub fn actions_at(&self, tick: u64) -> &[Action] {
        let lo = self.actions.partition_point(|a| a.tick < tick);
        let hi = self.actions.partition_point(|a| a.tick <= tick);
        &self.actions[lo..hi]
    }

    /// Actions with `after < tick <= through`.
    pub fn actions_between(&self, after: u64, through: u64) -> &[Action] {
        let lo = self.actions.partition_point(|a| a.tick <= after);
        let hi = self.actions.partition_point(|a| a.tick <= through);
        if lo >= hi {
            return &[];
        }
        &self.actions[lo..hi]
    }

    /// Whether the object is alive after all actions at `tick` applied.
    ///
    /// Death and despawn make it dead, respawn and spawn make it alive.
    /// Without any lifecycle action the object counts as alive.
    pub fn alive_at(&self, tick: u64) -> bool {
        let hi = self.actions.partition_point(|a| a.tick <= tick);
        self.actions[..hi]
            .iter()
            .rev()
            .find_map(|a| a.kind.alive_after())
            .unwrap_or(true)
    }

    /// Whether the object should exist in the world at `tick`.
    pub fn present_at(&self, tick: u64) -> bool {
        self.covers(tick) && self.alive_at(tick)
    }

    /// Snapshot to rebuild the object from at `tick`.
    ///
    /// That is the state carried by the latest death before `tick`, so a
    /// respawned object comes back as it died, or the spawn snapshot when it
    /// never died.
    pub fn snapshot_at(&self, tick: u64) -> &ObjectSnapshot {
        let hi = self.actions.partition_point(|a| a.tick < tick);
        self.actions[..hi]
            .iter()
            .rev()
            .find_map(|a| match &a.kind {
                ActionKind::Death { snapshot } => Some(snapshot),
                _ => None,
            })
            .unwrap_or(&self.snapshot)
    }

    /// Check the positions/actions invariant.
    pub fn validate(&self) -> Result<(), StreamError> {
        let window = self.window();
        let mut last = None;
        for action in &self.actions {
            if !window.contains(&action.tick) {
                return Err(StreamError::OutOfWindow {
                    logical_id: self.logical_id,
                    tick: action.tick,
                    start: window.start,
                    end: window.end,
                });
            }
            if let Some(last) = last {
                if action.tick < last {
                    return Err(StreamError::OutOfOrder {
                        logical_id: self.logical_id,
                        tick: action.tick,
                        last,
                    });
                }
            }
            last = Some(action.tick);
        }
        Ok(())
    }

    // -- lenient decoding -------------------------------------------------

    /// Decode a stream from JSON, dropping actions that fail to parse or
    /// violate the invariant instead of failing the whole stream.
    ///
    /// Returns the stream and the number of dropped actions. The stream
    /// itself fails only when its identity or pose timeline is unusable.
    pub fn from_value_lenient(value: &serde_json::Value) -> Result<(Self, usize), StreamError> {
        let field = |name: &str| {
            value
                .get(name)
                .ok_or_else(|| StreamError::Malformed(format!("missing `{name}`")))
        };

        let logical_id: LogicalId = serde_json::from_value(field("logical_id")?.clone())
            .map_err(|e| StreamError::Malformed(format!("logical_id: {e}")))?;
        let spawn_tick: u64 = serde_json::from_value(field("spawn_tick")?.clone())
            .map_err(|e| StreamError::Malformed(format!("spawn_tick: {e}")))?;
        let positions: Vec<Pose> = serde_json::from_value(field("positions")?.clone())
            .map_err(|e| StreamError::Malformed(format!("positions: {e}")))?;
        let snapshot = value
            .get("snapshot")
            .cloned()
            .map(ObjectSnapshot)
            .unwrap_or_default();

        let mut dropped = 0;
        let mut actions = Vec::new();
        if let Some(raw) = value.get("actions").and_then(|a| a.as_array()) {
            for (index, entry) in raw.iter().enumerate() {
                match serde_json::from_value::<Action>(entry.clone()) {
                    Ok(action) => actions.push(action),
                    Err(e) => {
                        tracing::warn!(%logical_id, index, error = %e, "dropping malformed action");
                        dropped += 1;
                    }
                }
            }
        }
        actions.sort_by_key(|a| a.tick);

        let mut stream = Self::new(logical_id, spawn_tick, snapshot);
        stream.positions = positions;
        for action in actions {
            if let Err(e) = stream.push_action(action) {
                tracing::warn!(%logical_id, error = %e, "dropping action outside stream window");
                dropped += 1;
            }
        }
        Ok((stream, dropped))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Posture;

    fn posture(tick: u64) -> Action {
        Action::new(
            tick,
            ActionKind::PostureChange {
                old: Posture::Standing,
                new: Posture::Sneaking,
            },
        )
    }

    fn stream_with(spawn: u64, len: usize) -> ActionStream {
        let mut s = ActionStream::new(LogicalId(1), spawn, ObjectSnapshot::default());
        for i in 0..len {
            s.push_pose(Pose::at(i as f64, 64.0, 0.0));
        }
        s
    }

    #[test]
    fn push_action_enforces_window_and_order() {
        let mut s = stream_with(10, 5);
        assert!(s.push_action(posture(12)).is_ok());
        assert!(matches!(
            s.push_action(posture(9)),
            Err(StreamError::OutOfWindow { tick: 9, .. })
        ));
        assert!(matches!(
            s.push_action(posture(15)),
            Err(StreamError::OutOfWindow { tick: 15, end: 15, .. })
        ));
        assert!(matches!(
            s.push_action(posture(11)),
            Err(StreamError::OutOfOrder { tick: 11, last: 12, .. })
        ));
        assert!(s.push_action(posture(12)).is_ok());
        assert!(s.validate().is_ok());
    }

    #[test]
    fn pose_lookup_is_relative_to_spawn() {
        let s = stream_with(10, 5);
        assert!(s.pose_at(9).is_none());
        assert_eq!(s.pose_at(10).unwrap().x, 0.0);
        assert_eq!(s.pose_at(14).unwrap().x, 4.0);
        assert!(s.pose_at(15).is_none());
        assert_eq!(s.nearest_pose(100).unwrap().x, 4.0);
        assert_eq!(s.nearest_pose(0).unwrap().x, 0.0);
    }

    #[test]
    fn range_queries() {
        let mut s = stream_with(0, 20);
        for t in [3, 5, 5, 9] {
            s.push_action(posture(t)).unwrap();
        }
        assert_eq!(s.actions_at(5).len(), 2);
        assert!(s.actions_at(4).is_empty());
        assert_eq!(s.actions_between(3, 9).len(), 3);
        assert_eq!(s.actions_between(0, 3).len(), 1);
        assert!(s.actions_between(9, 3).is_empty());
    }

    #[test]
    fn death_and_respawn_drive_presence() {
        let mut s = stream_with(0, 30);
        s.push_action(Action::new(10, ActionKind::Death { snapshot: ObjectSnapshot::default() }))
            .unwrap();
        s.push_action(Action::new(20, ActionKind::Respawn)).unwrap();
        assert!(s.present_at(9));
        assert!(!s.present_at(10));
        assert!(!s.present_at(19));
        assert!(s.present_at(20));
        assert!(!s.present_at(30));
    }

    #[test]
    fn keep_flag_is_not_persisted() {
        let mut s = stream_with(0, 2);
        s.set_keep(false);
        let json = serde_json::to_string(&s).unwrap();
        let back: ActionStream = serde_json::from_str(&json).unwrap();
        assert!(back.keep());
    }

    #[test]
    fn lenient_decode_drops_bad_actions() {
        let mut s = stream_with(0, 10);
        s.push_action(posture(2)).unwrap();
        s.push_action(posture(4)).unwrap();
        let mut json = serde_json::to_value(&s).unwrap();
        let actions = json["actions"].as_array_mut().unwrap();
        actions.push(serde_json::json!({"tick": 5, "kind": {"Teleport": {}}}));
        actions.push(serde_json::json!({"tick": 50, "kind": "Hurt"}));

        let (decoded, dropped) = ActionStream::from_value_lenient(&json).unwrap();
        assert_eq!(dropped, 2);
        assert_eq!(decoded.actions().len(), 2);
        assert_eq!(decoded.positions().len(), 10);
    }

    #[test]
    fn lenient_decode_requires_positions() {
        let json = serde_json::json!({"logical_id": 3, "spawn_tick": 0});
        assert!(matches!(
            ActionStream::from_value_lenient(&json),
            Err(StreamError::Malformed(_))
        ));
    }

    #[test]
    fn snapshot_at_follows_the_latest_death() {
        let at_death = ObjectSnapshot(serde_json::json!({ "saddled": true }));
        let mut s = stream_with(0, 40);
        s.push_action(Action::new(0, ActionKind::Spawn)).unwrap();
        s.push_action(Action::new(10, ActionKind::Death { snapshot: at_death.clone() }))
            .unwrap();
        s.push_action(Action::new(20, ActionKind::Respawn)).unwrap();

        assert_eq!(s.snapshot_at(0), &ObjectSnapshot::default());
        assert_eq!(s.snapshot_at(10), &ObjectSnapshot::default());
        assert_eq!(s.snapshot_at(11), &at_death);
        assert_eq!(s.snapshot_at(20), &at_death);
        assert_eq!(s.snapshot_at(39), &at_death);
    }
}
