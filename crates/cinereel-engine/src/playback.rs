//! Bidirectional replay of a [`Take`] into a live world.
//!
//! A [`PlaybackSession`] owns a playhead over a shared take and a binding
//! table from logical ids to the live handles it spawned. Seeking is
//! synchronous and runs in two phases:
//!
//! 1. **Apply the range.** Going forward, every action with a tick in
//!    `(from, to]` is executed in ascending tick order. Going backward, every
//!    action in `(to, from]` is rewound in exactly the reverse order. Within
//!    a tick, spawns and respawns come first and deaths and despawns last,
//!    so a rider's mount change always finds its vehicle. Otherwise streams
//!    are visited in logical id order and actions in insertion order.
//! 2. **Reconcile presence.** Each stream that should exist at `to` is
//!    spawned if needed and posed at its recorded pose; every other bound
//!    object is despawned.
//!
//! Objects are rebuilt from [`ActionStream::snapshot_at`], so an object that
//! respawns comes back in the state it died in. Actions whose object or
//! referent cannot be resolved are skipped and counted in the
//! [`SeekReport`]; a seek never aborts halfway.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use cinereel_capture::prelude::*;
//! use cinereel_engine::playback::{PlaybackConfig, PlaybackSession};
//! use cinereel_engine::take::Take;
//! use cinereel_log::prelude::*;
//!
//! let mut stage = MemoryHost::new();
//! let actor = stage.insert(ObservedState::new(ObjectCategory::Actor, Pose::at(0.0, 64.0, 0.0)));
//! let mut session = RecordingSession::new(RecordingConfig::default());
//! session.start(&stage, actor).unwrap();
//! for _ in 0..20 {
//!     stage.object_mut(actor).unwrap().pose.x += 1.0;
//!     session.tick(&mut stage).unwrap();
//! }
//! session.stop(&mut stage).unwrap();
//! let mut take = Take::new("walk");
//! session.save(&mut take);
//!
//! let mut world = MemoryHost::new();
//! let mut playback = PlaybackSession::new(Arc::new(take), PlaybackConfig::default());
//! playback.seek(&mut world, 9);
//! let handle = playback.resolve(&mut world, LogicalId::MASTER).unwrap();
//! assert_eq!(world.observe(handle).unwrap().pose.x, 10.0);
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use cinereel_log::action::{Action, ActionContext, ActionOutcome, Bindings};
use cinereel_log::host::{HostError, HostWorld, ObjectHandle};
use cinereel_log::stream::{ActionStream, LogicalId};

use crate::take::Take;

// ---------------------------------------------------------------------------
// PlaybackConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Remove every object the session spawned when it stops.
    pub despawn_on_stop: bool,
    /// Clamp seek targets to the last recorded tick.
    pub clamp_to_length: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            despawn_on_stop: true,
            clamp_to_length: true,
        }
    }
}

// ---------------------------------------------------------------------------
// PlaybackError / SeekReport
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("take has no stream {0}")]
    UnknownStream(LogicalId),

    /// The stream's object is dead or outside its window at this tick.
    #[error("stream {logical_id} is not present at tick {tick}")]
    NotPresent { logical_id: LogicalId, tick: u64 },

    #[error(transparent)]
    Host(#[from] HostError),
}

/// What a seek did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeekReport {
    pub from: u64,
    pub to: u64,
    pub executed: usize,
    pub rewound: usize,
    /// Actions that could not be applied and were passed over.
    pub skipped: usize,
}

impl SeekReport {
    fn merge(&mut self, other: SeekReport) {
        self.executed += other.executed;
        self.rewound += other.rewound;
        self.skipped += other.skipped;
    }
}

/// One action scheduled by a seek, in application order.
#[derive(Debug, Clone, Copy)]
pub struct PlannedStep<'a> {
    pub stream_index: usize,
    pub logical_id: LogicalId,
    pub action: &'a Action,
}

/// Position of a lifecycle kind within its tick.
fn lifecycle_rank(action: &Action) -> u8 {
    match action.kind.alive_after() {
        Some(true) => 0,
        None => 1,
        Some(false) => 2,
    }
}

/// Actions a seek from `from` to `to` applies, in the order it applies them.
fn plan_steps(take: &Take, from: u64, to: u64) -> Vec<PlannedStep<'_>> {
    let (after, through) = if to >= from { (from, to) } else { (to, from) };
    let mut steps: Vec<PlannedStep<'_>> = take
        .streams
        .iter()
        .enumerate()
        .flat_map(|(stream_index, stream)| {
            stream
                .actions_between(after, through)
                .iter()
                .map(move |action| PlannedStep {
                    stream_index,
                    logical_id: stream.logical_id,
                    action,
                })
        })
        .collect();
    // Stable: insertion order survives within a (tick, rank, stream) bucket.
    steps.sort_by_key(|s| (s.action.tick, lifecycle_rank(s.action), s.stream_index));
    if to < from {
        steps.reverse();
    }
    steps
}

// ---------------------------------------------------------------------------
// PlaybackSession
// ---------------------------------------------------------------------------

pub struct PlaybackSession {
    config: PlaybackConfig,
    take: Arc<Take>,
    current_tick: u64,
    bindings: Bindings,
    index: HashMap<LogicalId, usize>,
    started: bool,
}

impl PlaybackSession {
    pub fn new(take: Arc<Take>, config: PlaybackConfig) -> Self {
        let index = take
            .streams
            .iter()
            .enumerate()
            .map(|(i, s)| (s.logical_id, i))
            .collect();
        Self {
            config,
            take,
            current_tick: 0,
            bindings: Bindings::new(),
            index,
            started: false,
        }
    }

    pub fn take(&self) -> &Arc<Take> {
        &self.take
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    pub fn current_tick(&self) -> u64 {
        self.current_tick
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Whether the playhead sits on the last recorded tick.
    pub fn is_finished(&self) -> bool {
        self.current_tick + 1 >= self.take.total_ticks
    }

    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    /// Handles of every object this session currently drives.
    pub fn live_objects(&self) -> impl Iterator<Item = ObjectHandle> + '_ {
        self.bindings.values().copied()
    }

    /// The order in which a seek between the two ticks would apply actions.
    pub fn plan(&self, from: u64, to: u64) -> Vec<PlannedStep<'_>> {
        plan_steps(&self.take, from, to)
    }

    // -- playhead ---------------------------------------------------------

    /// Place the playhead on tick 0, executing the actions recorded there.
    pub fn start(&mut self, host: &mut dyn HostWorld) -> SeekReport {
        let take = Arc::clone(&self.take);
        let mut report = SeekReport::default();
        let mut steps: Vec<PlannedStep<'_>> = take
            .streams
            .iter()
            .enumerate()
            .flat_map(|(stream_index, stream)| {
                stream.actions_at(0).iter().map(move |action| PlannedStep {
                    stream_index,
                    logical_id: stream.logical_id,
                    action,
                })
            })
            .collect();
        steps.sort_by_key(|s| (lifecycle_rank(s.action), s.stream_index));
        for step in &steps {
            self.apply(host, &take.streams[step.stream_index], step.action, true, &mut report);
        }

        self.current_tick = 0;
        self.started = true;
        self.reconcile(host, &take, 0);
        tracing::debug!(take = %take.name, executed = report.executed, "playback started");
        report
    }

    /// Move the playhead to `to`, forward or backward.
    pub fn seek(&mut self, host: &mut dyn HostWorld, to: u64) -> SeekReport {
        let mut report = SeekReport::default();
        if !self.started {
            report.merge(self.start(host));
        }
        let to = if self.config.clamp_to_length {
            to.min(self.take.total_ticks.saturating_sub(1))
        } else {
            to
        };
        let from = self.current_tick;
        report.from = from;
        report.to = to;

        let take = Arc::clone(&self.take);
        let forward = to >= from;
        for step in plan_steps(&take, from, to) {
            self.apply(host, &take.streams[step.stream_index], step.action, forward, &mut report);
        }

        self.current_tick = to;
        self.reconcile(host, &take, to);
        report
    }

    /// Advance one tick. Returns `None` once the take is exhausted.
    pub fn advance(&mut self, host: &mut dyn HostWorld) -> Option<SeekReport> {
        if !self.started {
            return Some(self.start(host));
        }
        if self.is_finished() {
            return None;
        }
        Some(self.seek(host, self.current_tick + 1))
    }

    /// Live handle for `logical_id` at the current tick, spawning it if the
    /// stream is present but not yet in the world.
    pub fn resolve(
        &mut self,
        host: &mut dyn HostWorld,
        logical_id: LogicalId,
    ) -> Result<ObjectHandle, PlaybackError> {
        let index = *self
            .index
            .get(&logical_id)
            .ok_or(PlaybackError::UnknownStream(logical_id))?;
        let take = Arc::clone(&self.take);
        let tick = self.current_tick;
        self.ensure_live(host, &take.streams[index], tick)?
            .ok_or(PlaybackError::NotPresent { logical_id, tick })
    }

    /// End playback. Spawned objects are removed when configured.
    pub fn stop(&mut self, host: &mut dyn HostWorld) {
        if self.config.despawn_on_stop {
            for (_, handle) in self.bindings.drain() {
                host.despawn(handle);
            }
        } else {
            self.bindings.clear();
        }
        self.started = false;
        tracing::debug!(take = %self.take.name, tick = self.current_tick, "playback stopped");
    }

    // -- internals --------------------------------------------------------

    fn live_binding(&self, host: &dyn HostWorld, id: LogicalId) -> Option<ObjectHandle> {
        self.bindings.get(&id).copied().filter(|h| host.exists(*h))
    }

    /// Bound handle of the stream, spawning it when the stream is present at
    /// `tick`. `Ok(None)` means the object should not exist.
    fn ensure_live(
        &mut self,
        host: &mut dyn HostWorld,
        stream: &ActionStream,
        tick: u64,
    ) -> Result<Option<ObjectHandle>, HostError> {
        if let Some(handle) = self.live_binding(host, stream.logical_id) {
            return Ok(Some(handle));
        }
        if !stream.present_at(tick) {
            return Ok(None);
        }
        let pose = stream.nearest_pose(tick).copied().unwrap_or_default();
        let handle = host.spawn(stream.snapshot_at(tick), &pose)?;
        self.bindings.insert(stream.logical_id, handle);
        tracing::debug!(logical_id = %stream.logical_id, %handle, tick, "playback spawned object");
        Ok(Some(handle))
    }

    fn apply(
        &mut self,
        host: &mut dyn HostWorld,
        stream: &ActionStream,
        action: &Action,
        forward: bool,
        report: &mut SeekReport,
    ) {
        let id = stream.logical_id;
        let tick = action.tick;
        let kind = &action.kind;

        let target = if kind.alive_after().is_some() {
            self.live_binding(host, id)
        } else if kind.is_world_mutation() {
            None
        } else {
            match self.ensure_live(host, stream, tick) {
                Ok(handle) => handle,
                Err(e) => {
                    tracing::warn!(logical_id = %id, tick, error = %e, "could not spawn action target");
                    report.skipped += 1;
                    return;
                }
            }
        };

        if let Some(referent) = kind.referent() {
            if let Some(&index) = self.index.get(&referent) {
                let take = Arc::clone(&self.take);
                if let Err(e) = self.ensure_live(host, &take.streams[index], tick) {
                    tracing::warn!(logical_id = %referent, tick, error = %e, "could not spawn referent");
                }
            }
        }

        let pose = stream.nearest_pose(tick).copied().unwrap_or_default();
        let result = {
            let snapshot = stream.snapshot_at(tick);
            let mut ctx = ActionContext::new(&mut *host, target, snapshot, pose, &self.bindings);
            if forward {
                action.execute(&mut ctx)
            } else {
                action.rewind(&mut ctx)
            }
        };

        match result {
            Ok(outcome) => {
                match outcome {
                    ActionOutcome::Spawned(handle) => {
                        self.bindings.insert(id, handle);
                    }
                    ActionOutcome::Despawned => {
                        self.bindings.remove(&id);
                    }
                    ActionOutcome::Applied | ActionOutcome::NoOp => {}
                }
                if forward {
                    report.executed += 1;
                } else {
                    report.rewound += 1;
                }
            }
            Err(e) => {
                tracing::warn!(
                    logical_id = %id,
                    tick,
                    kind = kind.name(),
                    forward,
                    error = %e,
                    "skipping action"
                );
                report.skipped += 1;
            }
        }
    }

    /// Make the world's objects match the take at `tick`.
    fn reconcile(&mut self, host: &mut dyn HostWorld, take: &Take, tick: u64) {
        for stream in &take.streams {
            let id = stream.logical_id;
            let bound = self.live_binding(host, id);
            match (stream.present_at(tick), bound) {
                (true, Some(handle)) => {
                    let pose = stream.nearest_pose(tick).copied().unwrap_or_default();
                    if let Err(e) = host.teleport(handle, &pose) {
                        tracing::warn!(logical_id = %id, tick, error = %e, "could not pose object");
                    }
                }
                (true, None) => {
                    if let Err(e) = self.ensure_live(host, stream, tick) {
                        tracing::warn!(logical_id = %id, tick, error = %e, "could not spawn present object");
                    }
                }
                (false, Some(handle)) => {
                    host.despawn(handle);
                    self.bindings.remove(&id);
                    tracing::debug!(logical_id = %id, %handle, tick, "playback despawned object");
                }
                (false, None) => {
                    self.bindings.remove(&id);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use cinereel_log::action::ActionKind;
    use cinereel_log::pose::Pose;
    use cinereel_log::sandbox::MemoryHost;
    use cinereel_log::state::{ObjectCategory, ObservedState, Posture};

    // -- helpers ----------------------------------------------------------

    fn actor_snapshot() -> cinereel_log::state::ObjectSnapshot {
        let state = ObservedState::new(ObjectCategory::Actor, Pose::default());
        cinereel_log::state::ObjectSnapshot(serde_json::to_value(state).unwrap())
    }

    /// One actor walking +x for `len` ticks, sneaking over `[10, 20)`.
    fn sneaking_take(len: u64) -> Take {
        let mut stream = ActionStream::new(LogicalId::MASTER, 0, actor_snapshot());
        for x in 0..len {
            stream.push_pose(Pose::at(x as f64, 64.0, 0.0));
        }
        stream.push_action(Action::new(0, ActionKind::Spawn)).unwrap();
        stream
            .push_action(Action::new(
                10,
                ActionKind::PostureChange {
                    old: Posture::Standing,
                    new: Posture::Sneaking,
                },
            ))
            .unwrap();
        stream
            .push_action(Action::new(
                20,
                ActionKind::PostureChange {
                    old: Posture::Sneaking,
                    new: Posture::Standing,
                },
            ))
            .unwrap();
        let mut take = Take::new("sneak");
        cinereel_capture::recording::SaveTarget::store(&mut take, len, vec![stream]);
        take
    }

    fn posture(host: &MemoryHost, playback: &PlaybackSession) -> Posture {
        let handle = playback.bindings()[&LogicalId::MASTER];
        host.observe(handle).unwrap().posture
    }

    // -- tests ------------------------------------------------------------

    #[test]
    fn start_spawns_and_poses_the_master() {
        let mut host = MemoryHost::new();
        let mut playback = PlaybackSession::new(Arc::new(sneaking_take(30)), PlaybackConfig::default());
        let report = playback.start(&mut host);
        assert_eq!(report.executed, 1);
        assert_eq!(host.object_count(), 1);
        assert_eq!(posture(&host, &playback), Posture::Standing);
    }

    #[test]
    fn seek_forward_and_back_toggles_posture() {
        let mut host = MemoryHost::new();
        let mut playback = PlaybackSession::new(Arc::new(sneaking_take(30)), PlaybackConfig::default());

        let report = playback.seek(&mut host, 15);
        assert_eq!(report.executed, 2);
        assert_eq!(posture(&host, &playback), Posture::Sneaking);

        let report = playback.seek(&mut host, 25);
        assert_eq!((report.from, report.to, report.executed), (15, 25, 1));
        assert_eq!(posture(&host, &playback), Posture::Standing);

        let report = playback.seek(&mut host, 5);
        assert_eq!(report.rewound, 2);
        assert_eq!(posture(&host, &playback), Posture::Standing);
        let handle = playback.bindings()[&LogicalId::MASTER];
        assert_eq!(host.observe(handle).unwrap().pose.x, 5.0);
    }

    #[test]
    fn seek_clamps_to_the_last_tick() {
        let mut host = MemoryHost::new();
        let mut playback = PlaybackSession::new(Arc::new(sneaking_take(30)), PlaybackConfig::default());
        let report = playback.seek(&mut host, 1_000);
        assert_eq!(report.to, 29);
        assert!(playback.is_finished());
        assert!(playback.advance(&mut host).is_none());
        assert_eq!(host.object_count(), 1);
    }

    #[test]
    fn resolve_reports_unknown_streams() {
        let mut host = MemoryHost::new();
        let mut playback = PlaybackSession::new(Arc::new(sneaking_take(5)), PlaybackConfig::default());
        assert!(matches!(
            playback.resolve(&mut host, LogicalId(9)),
            Err(PlaybackError::UnknownStream(LogicalId(9)))
        ));
        let handle = playback.resolve(&mut host, LogicalId::MASTER).unwrap();
        assert!(host.exists(handle));
    }

    #[test]
    fn stop_despawns_what_playback_spawned() {
        let mut host = MemoryHost::new();
        let mut playback = PlaybackSession::new(Arc::new(sneaking_take(10)), PlaybackConfig::default());
        playback.seek(&mut host, 4);
        assert_eq!(host.object_count(), 1);
        playback.stop(&mut host);
        assert_eq!(host.object_count(), 0);
        assert_eq!(playback.live_objects().count(), 0);
    }

    #[test]
    fn plan_reverses_exactly_when_going_back() {
        let playback = PlaybackSession::new(Arc::new(sneaking_take(30)), PlaybackConfig::default());
        let forward: Vec<u64> = playback.plan(0, 29).iter().map(|s| s.action.tick).collect();
        let backward: Vec<u64> = playback.plan(29, 0).iter().map(|s| s.action.tick).collect();
        assert_eq!(forward, vec![10, 20]);
        assert_eq!(backward, vec![20, 10]);
    }
}
