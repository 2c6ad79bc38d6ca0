//! Recording sessions: discover, sample, and log a take.
//!
//! A [`RecordingSession`] is an explicit `Idle -> Recording -> Idle` state
//! machine owned by the caller. While recording, [`RecordingSession::tick`]
//! runs once per simulation tick in a fixed order:
//!
//! 1. **Discover** untracked objects near the master (and the vehicles that
//!    tracked objects ride) and open a stream for each.
//! 2. **Sample** every tracked object: append its pose, flush the
//!    host-reported events buffered since the last tick, then diff its state.
//!    An object that vanished gets a `Despawn` carrying the snapshot from the
//!    last tick it was observed.
//! 3. **Advance** the tick counter.
//!
//! One-shot events the sampler cannot see by diffing (swings, block edits,
//! deaths...) are reported by the host through
//! [`RecordingSession::record_event`] and stamped with the tick they are
//! flushed in, so every action tick is always covered by a pose.
//!
//! # Example
//!
//! ```
//! use cinereel_capture::prelude::*;
//! use cinereel_log::prelude::*;
//!
//! let mut host = MemoryHost::new();
//! let player = host.insert(ObservedState::new(ObjectCategory::Actor, Pose::at(0.0, 64.0, 0.0)));
//!
//! let mut session = RecordingSession::new(RecordingConfig::default());
//! session.start(&host, player).unwrap();
//! for _ in 0..20 {
//!     session.tick(&mut host).unwrap();
//! }
//! session.stop(&mut host).unwrap();
//!
//! let mut streams: Vec<ActionStream> = Vec::new();
//! assert!(session.save(&mut streams));
//! assert_eq!(streams[0].positions().len(), 20);
//! ```

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use cinereel_log::action::{Action, ActionContext, ActionKind, Bindings};
use cinereel_log::block::{BlockPos, BlockState, CellEdit};
use cinereel_log::host::{HostWorld, ObjectHandle};
use cinereel_log::pose::Pose;
use cinereel_log::state::{Hand, ItemStack, ObjectCategory, ObjectSnapshot};
use cinereel_log::stream::{ActionStream, LogicalId};

use crate::sampler::StateSampler;

// ---------------------------------------------------------------------------
// RecordingConfig
// ---------------------------------------------------------------------------

/// Tracking policy for a recording session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Radius around the master inside which objects start being tracked.
    pub scan_radius: f64,
    /// Categories that are never tracked.
    pub excluded_categories: Vec<ObjectCategory>,
    /// Track the vehicle a tracked object rides even outside the radius.
    pub track_vehicles: bool,
    /// Stop recording on its own after this many ticks.
    pub max_ticks: Option<u64>,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            scan_radius: 32.0,
            excluded_categories: vec![ObjectCategory::Projectile],
            track_vehicles: true,
            max_ticks: None,
        }
    }
}

// ---------------------------------------------------------------------------
// IdAllocator
// ---------------------------------------------------------------------------

/// Monotonic [`LogicalId`] source, reset per recording.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self) -> LogicalId {
        let id = LogicalId(self.next);
        self.next += 1;
        id
    }

    /// Number of ids handed out since the last reset.
    pub fn allocated(&self) -> u32 {
        self.next
    }

    pub fn reset(&mut self) {
        self.next = 0;
    }
}

// ---------------------------------------------------------------------------
// ObjectEvent
// ---------------------------------------------------------------------------

/// A one-shot event the host reports for a tracked object.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectEvent {
    Swing {
        hand: Hand,
    },
    Hurt,
    UseItem {
        hand: Hand,
    },
    RightClickBlock {
        pos: BlockPos,
        hand: Hand,
    },
    TakeItem {
        stack: ItemStack,
    },
    Death,
    Respawn,
    /// The object placed `after` at `pos`, replacing `before`.
    /// `partner_before` is the prior state of the second cell of a two-cell
    /// structure; air is assumed when absent.
    BlockPlaced {
        pos: BlockPos,
        before: BlockState,
        after: BlockState,
        partner_before: Option<BlockState>,
    },
    /// The object broke the cell at `pos`, which held `before`.
    BlockBroken {
        pos: BlockPos,
        before: BlockState,
    },
}

// ---------------------------------------------------------------------------
// RecordingError
// ---------------------------------------------------------------------------

/// Errors returned by [`RecordingSession`] operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecordingError {
    #[error("a recording is already in progress")]
    AlreadyRecording,

    #[error("no recording is in progress")]
    NotRecording,

    /// The master object does not exist in the host.
    #[error("master object {0} does not exist")]
    MasterMissing(ObjectHandle),

    /// An event was reported for an object that is not tracked.
    #[error("object {0} is not tracked by this recording")]
    Untracked(ObjectHandle),
}

// ---------------------------------------------------------------------------
// SaveTarget
// ---------------------------------------------------------------------------

/// Destination of a finished recording.
pub trait SaveTarget {
    /// Receive the kept streams of a recording that ran for `total_ticks`.
    fn store(&mut self, total_ticks: u64, streams: Vec<ActionStream>);
}

impl SaveTarget for Vec<ActionStream> {
    fn store(&mut self, _total_ticks: u64, streams: Vec<ActionStream>) {
        self.extend(streams);
    }
}

// ---------------------------------------------------------------------------
// RecordingSession
// ---------------------------------------------------------------------------

/// Lifecycle state of a [`RecordingSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingState {
    Idle,
    Recording,
}

#[derive(Debug)]
struct Tracked {
    handle: ObjectHandle,
    stream: ActionStream,
    sampler: StateSampler,
    last_pose: Pose,
    /// Snapshot from the last tick the object was observed.
    last_snapshot: ObjectSnapshot,
    dead: bool,
    finished: bool,
}

/// One take in progress.
#[derive(Debug)]
pub struct RecordingSession {
    config: RecordingConfig,
    state: RecordingState,
    tick: u64,
    ids: IdAllocator,
    /// Indexed by `LogicalId`; the master is entry 0.
    tracked: Vec<Tracked>,
    by_handle: HashMap<ObjectHandle, LogicalId>,
    pending: Vec<(LogicalId, ActionKind)>,
    playback_driven: HashSet<ObjectHandle>,
}

impl RecordingSession {
    pub fn new(config: RecordingConfig) -> Self {
        Self {
            config,
            state: RecordingState::Idle,
            tick: 0,
            ids: IdAllocator::new(),
            tracked: Vec::new(),
            by_handle: HashMap::new(),
            pending: Vec::new(),
            playback_driven: HashSet::new(),
        }
    }

    pub fn config(&self) -> &RecordingConfig {
        &self.config
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == RecordingState::Recording
    }

    /// Ticks recorded so far.
    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    pub fn master(&self) -> Option<ObjectHandle> {
        self.tracked.first().map(|t| t.handle)
    }

    pub fn logical_id_of(&self, object: ObjectHandle) -> Option<LogicalId> {
        self.by_handle.get(&object).copied()
    }

    pub fn stream(&self, id: LogicalId) -> Option<&ActionStream> {
        self.tracked.get(id.0 as usize).map(|t| &t.stream)
    }

    /// Every stream of the current take in logical id order.
    pub fn streams(&self) -> impl Iterator<Item = &ActionStream> {
        self.tracked.iter().map(|t| &t.stream)
    }

    // -- lifecycle --------------------------------------------------------

    /// Begin a take around `master`.
    pub fn start(&mut self, host: &dyn HostWorld, master: ObjectHandle) -> Result<(), RecordingError> {
        if self.is_recording() {
            return Err(RecordingError::AlreadyRecording);
        }
        let observed = host.observe(master).ok_or(RecordingError::MasterMissing(master))?;

        self.tick = 0;
        self.ids.reset();
        self.tracked.clear();
        self.by_handle.clear();
        self.pending.clear();

        let id = self.track(host, master, observed.pose);
        if observed.category == ObjectCategory::Actor {
            if let Some(mode) = observed.game_mode {
                self.pending
                    .push((id, ActionKind::GameModeChange { old: None, new: mode }));
            }
        }
        self.state = RecordingState::Recording;
        tracing::debug!(master = %master, "recording started");
        Ok(())
    }

    /// Record one tick. Stops the session itself once `max_ticks` is reached.
    pub fn tick(&mut self, host: &mut dyn HostWorld) -> Result<(), RecordingError> {
        if !self.is_recording() {
            return Err(RecordingError::NotRecording);
        }
        self.discover(host);
        self.sample(host);
        self.tick += 1;

        if self.config.max_ticks.is_some_and(|max| self.tick >= max) {
            tracing::debug!(ticks = self.tick, "recording reached its tick limit");
            self.stop(host)?;
        }
        Ok(())
    }

    /// Report a one-shot event for a tracked object. It is stamped with the
    /// tick of the next [`tick`](Self::tick) call.
    pub fn record_event(
        &mut self,
        host: &dyn HostWorld,
        object: ObjectHandle,
        event: ObjectEvent,
    ) -> Result<(), RecordingError> {
        if !self.is_recording() {
            return Err(RecordingError::NotRecording);
        }
        let id = self
            .logical_id_of(object)
            .ok_or(RecordingError::Untracked(object))?;

        let kind = match event {
            ObjectEvent::Swing { hand } => ActionKind::Swing { hand },
            ObjectEvent::Hurt => ActionKind::Hurt,
            ObjectEvent::UseItem { hand } => ActionKind::UseItem { hand },
            ObjectEvent::RightClickBlock { pos, hand } => ActionKind::RightClickBlock { pos, hand },
            ObjectEvent::TakeItem { stack } => ActionKind::TakeItem { stack },
            ObjectEvent::Death => {
                let tracked = &mut self.tracked[id.0 as usize];
                if tracked.dead {
                    tracing::debug!(logical_id = %id, "ignoring death of a dead object");
                    return Ok(());
                }
                tracked.dead = true;
                if cancel_pending(&mut self.pending, id, |k| matches!(k, ActionKind::Respawn)) {
                    return Ok(());
                }
                // Dead objects are not sampled; catch up on changes made
                // since the last tick so they precede the death.
                if let Some(state) = host.observe(object) {
                    let by_handle = &self.by_handle;
                    let lookup = |h: ObjectHandle| by_handle.get(&h).copied();
                    for action in tracked.sampler.sample(self.tick, &state, &lookup) {
                        self.pending.push((id, action.kind));
                    }
                }
                let snapshot = host
                    .snapshot(object)
                    .unwrap_or_else(|| tracked.last_snapshot.clone());
                ActionKind::Death { snapshot }
            }
            ObjectEvent::Respawn => {
                let tracked = &mut self.tracked[id.0 as usize];
                if !tracked.dead {
                    tracing::debug!(logical_id = %id, "ignoring respawn of a live object");
                    return Ok(());
                }
                tracked.dead = false;
                if cancel_pending(&mut self.pending, id, |k| matches!(k, ActionKind::Death { .. })) {
                    return Ok(());
                }
                ActionKind::Respawn
            }
            ObjectEvent::BlockPlaced {
                pos,
                before,
                after,
                partner_before,
            } => {
                let partner = after.partner(pos).map(|(ppos, pstate)| {
                    CellEdit::new(ppos, partner_before.unwrap_or_default(), pstate)
                });
                ActionKind::PlaceBlock {
                    anchor: CellEdit::new(pos, before, after),
                    partner,
                }
            }
            ObjectEvent::BlockBroken { pos, before } => {
                let partner = before
                    .partner(pos)
                    .map(|(ppos, pstate)| CellEdit::new(ppos, pstate, BlockState::air()));
                ActionKind::BreakBlock {
                    anchor: CellEdit::new(pos, before, BlockState::air()),
                    partner,
                }
            }
        };
        self.pending.push((id, kind));
        Ok(())
    }

    /// Mark objects driven by another in-flight playback as "do not save".
    pub fn set_playback_driven(&mut self, objects: impl IntoIterator<Item = ObjectHandle>) {
        self.playback_driven = objects.into_iter().collect();
        for tracked in &mut self.tracked {
            if self.playback_driven.contains(&tracked.handle) {
                tracked.stream.set_keep(false);
            }
        }
    }

    /// End the take and undo the world mutations it left behind.
    ///
    /// Cell edits of kept streams are rewound newest first so the world is
    /// back to its pre-take state; the take itself still holds them.
    pub fn stop(&mut self, host: &mut dyn HostWorld) -> Result<(), RecordingError> {
        if !self.is_recording() {
            return Err(RecordingError::NotRecording);
        }
        self.state = RecordingState::Idle;
        if !self.pending.is_empty() {
            tracing::debug!(dropped = self.pending.len(), "discarding unflushed events");
            self.pending.clear();
        }

        let mut edits: Vec<&Action> = self
            .tracked
            .iter()
            .filter(|t| t.stream.keep())
            .flat_map(|t| t.stream.actions())
            .filter(|a| a.kind.is_world_mutation())
            .collect();
        // Stable sort keeps insertion order within a tick; iterate reversed.
        edits.sort_by_key(|a| a.tick);

        let bindings = Bindings::new();
        let snapshot = ObjectSnapshot::default();
        for action in edits.into_iter().rev() {
            let mut ctx = ActionContext::new(&mut *host, None, &snapshot, Pose::default(), &bindings);
            if let Err(e) = action.rewind(&mut ctx) {
                tracing::warn!(tick = action.tick, error = %e, "failed to rewind cell edit");
            }
        }
        tracing::debug!(ticks = self.tick, streams = self.tracked.len(), "recording stopped");
        Ok(())
    }

    /// Hand the kept streams to `target` and clear the session.
    ///
    /// Returns `false` while recording or when there is nothing to save.
    pub fn save(&mut self, target: &mut dyn SaveTarget) -> bool {
        if self.is_recording() || self.tracked.is_empty() {
            return false;
        }
        let streams: Vec<ActionStream> = self
            .tracked
            .drain(..)
            .map(|t| t.stream)
            .filter(ActionStream::keep)
            .collect();
        target.store(self.tick, streams);
        tracing::debug!(ticks = self.tick, "recording saved");

        self.by_handle.clear();
        self.ids.reset();
        self.tick = 0;
        true
    }

    /// Drop the take without saving it.
    pub fn discard(&mut self) {
        self.tracked.clear();
        self.by_handle.clear();
        self.pending.clear();
        self.ids.reset();
        self.tick = 0;
    }

    // -- per-tick phases --------------------------------------------------

    fn track(&mut self, host: &dyn HostWorld, object: ObjectHandle, pose: Pose) -> LogicalId {
        let id = self.ids.allocate();
        let snapshot = host.snapshot(object).unwrap_or_default();
        let mut stream = ActionStream::new(id, self.tick, snapshot.clone());
        if self.playback_driven.contains(&object) {
            stream.set_keep(false);
        }
        let mut sampler = StateSampler::new();
        if let Some(state) = host.observe(object) {
            sampler.prime(&state);
        }
        self.tracked.push(Tracked {
            handle: object,
            stream,
            sampler,
            last_pose: pose,
            last_snapshot: snapshot,
            dead: false,
            finished: false,
        });
        self.by_handle.insert(object, id);
        self.pending.push((id, ActionKind::Spawn));
        tracing::debug!(logical_id = %id, object = %object, tick = self.tick, "tracking object");
        id
    }

    fn discover(&mut self, host: &dyn HostWorld) {
        let Some(master) = self.tracked.first() else {
            return;
        };
        let center = host
            .observe(master.handle)
            .map(|s| s.pose)
            .unwrap_or(master.last_pose);

        for object in host.nearby_objects(&center, self.config.scan_radius) {
            if self.by_handle.contains_key(&object) {
                continue;
            }
            let Some(state) = host.observe(object) else {
                continue;
            };
            if self.config.excluded_categories.contains(&state.category) {
                continue;
            }
            self.track(host, object, state.pose);
        }

        if !self.config.track_vehicles {
            return;
        }
        let vehicles: Vec<ObjectHandle> = self
            .tracked
            .iter()
            .filter(|t| !t.finished)
            .filter_map(|t| host.observe(t.handle)?.mount)
            .filter(|v| !self.by_handle.contains_key(v))
            .collect();
        for vehicle in vehicles {
            // Two riders may share a vehicle.
            if self.by_handle.contains_key(&vehicle) {
                continue;
            }
            match host.observe(vehicle) {
                Some(state) => {
                    self.track(host, vehicle, state.pose);
                }
                None => tracing::warn!(vehicle = %vehicle, "ridden object cannot be observed"),
            }
        }
    }

    /// Append this tick's pose, host events and sampled changes to every
    /// live stream, in that order.
    fn sample(&mut self, host: &dyn HostWorld) {
        let tick = self.tick;
        let mut events: HashMap<LogicalId, Vec<ActionKind>> = HashMap::new();
        for (id, kind) in self.pending.drain(..) {
            events.entry(id).or_default().push(kind);
        }
        let by_handle = &self.by_handle;
        let lookup = |h: ObjectHandle| by_handle.get(&h).copied();

        for (index, tracked) in self.tracked.iter_mut().enumerate() {
            if tracked.finished {
                continue;
            }
            let id = tracked.stream.logical_id;
            let observed = if tracked.dead {
                None
            } else {
                host.observe(tracked.handle)
            };
            let pose = observed.as_ref().map_or(tracked.last_pose, |s| s.pose);
            tracked.stream.push_pose(pose);
            tracked.last_pose = pose;

            for kind in events.remove(&id).unwrap_or_default() {
                if let Err(e) = tracked.stream.push_action(Action::new(tick, kind)) {
                    tracing::warn!(logical_id = %id, error = %e, "dropping host event");
                }
            }

            match observed {
                Some(state) => {
                    if let Some(snapshot) = host.snapshot(tracked.handle) {
                        tracked.last_snapshot = snapshot;
                    }
                    for action in tracked.sampler.sample(tick, &state, &lookup) {
                        if let Err(e) = tracked.stream.push_action(action) {
                            tracing::warn!(error = %e, "dropping sampled action");
                        }
                    }
                }
                // The master and dead objects hold their last pose.
                None if index == 0 || tracked.dead => {}
                None => {
                    let despawn = Action::new(
                        tick,
                        ActionKind::Despawn {
                            snapshot: tracked.last_snapshot.clone(),
                        },
                    );
                    if let Err(e) = tracked.stream.push_action(despawn) {
                        tracing::warn!(error = %e, "dropping despawn action");
                    }
                    tracked.finished = true;
                    tracing::debug!(logical_id = %id, tick, "tracked object vanished");
                }
            }
        }

        for (id, kinds) in events {
            tracing::debug!(logical_id = %id, dropped = kinds.len(), "events for a finished stream");
        }
    }
}

/// Remove the latest pending action of `id` matching `is_kind`, so an
/// object that dies and respawns within one tick records neither.
fn cancel_pending(
    pending: &mut Vec<(LogicalId, ActionKind)>,
    id: LogicalId,
    is_kind: fn(&ActionKind) -> bool,
) -> bool {
    match pending.iter().rposition(|(pid, k)| *pid == id && is_kind(k)) {
        Some(at) => {
            pending.remove(at);
            true
        }
        None => false,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use cinereel_log::sandbox::MemoryHost;
    use cinereel_log::state::{EquipmentSlot, GameMode, ObservedState, Posture};

    // -- helpers ------------------------------------------------------------

    fn scene() -> (MemoryHost, ObjectHandle) {
        let mut host = MemoryHost::new();
        let player = host.insert(ObservedState::new(ObjectCategory::Actor, Pose::at(0.0, 64.0, 0.0)));
        (host, player)
    }

    fn kinds(stream: &ActionStream) -> Vec<&'static str> {
        stream.actions().iter().map(|a| a.kind.name()).collect()
    }

    // -- lifecycle ----------------------------------------------------------

    #[test]
    fn start_emits_spawn_and_game_mode_at_tick_zero() {
        let (mut host, player) = scene();
        let mut session = RecordingSession::new(RecordingConfig::default());
        session.start(&host, player).unwrap();
        session.tick(&mut host).unwrap();

        let master = session.stream(LogicalId::MASTER).unwrap();
        assert_eq!(kinds(master), ["spawn", "game_mode_change"]);
        assert!(master.actions().iter().all(|a| a.tick == 0));
        assert_eq!(
            master.actions()[1].kind,
            ActionKind::GameModeChange {
                old: None,
                new: GameMode::Survival
            }
        );
    }

    #[test]
    fn change_before_the_first_tick_is_not_lost() {
        let (mut host, player) = scene();
        let mut session = RecordingSession::new(RecordingConfig::default());
        session.start(&host, player).unwrap();
        host.object_mut(player).unwrap().posture = Posture::Sneaking;
        session.tick(&mut host).unwrap();

        let master = session.stream(LogicalId::MASTER).unwrap();
        assert!(master.actions_at(0).iter().any(|a| a.kind
            == ActionKind::PostureChange {
                old: Posture::Standing,
                new: Posture::Sneaking
            }));
    }

    #[test]
    fn state_machine_rejects_out_of_order_calls() {
        let (mut host, player) = scene();
        let mut session = RecordingSession::new(RecordingConfig::default());
        assert_eq!(session.tick(&mut host), Err(RecordingError::NotRecording));
        assert_eq!(session.stop(&mut host), Err(RecordingError::NotRecording));
        assert_eq!(
            session.start(&host, ObjectHandle(99)),
            Err(RecordingError::MasterMissing(ObjectHandle(99)))
        );

        session.start(&host, player).unwrap();
        assert_eq!(session.start(&host, player), Err(RecordingError::AlreadyRecording));
        let mut sink: Vec<ActionStream> = Vec::new();
        assert!(!session.save(&mut sink));
    }

    #[test]
    fn max_ticks_stops_the_session() {
        let (mut host, player) = scene();
        let config = RecordingConfig {
            max_ticks: Some(5),
            ..Default::default()
        };
        let mut session = RecordingSession::new(config);
        session.start(&host, player).unwrap();
        for _ in 0..5 {
            session.tick(&mut host).unwrap();
        }
        assert!(!session.is_recording());
        assert_eq!(session.stream(LogicalId::MASTER).unwrap().len_ticks(), 5);
    }

    // -- discovery ----------------------------------------------------------

    #[test]
    fn discovery_respects_radius_and_exclusions() {
        let (mut host, player) = scene();
        let pig = host.insert(ObservedState::new(ObjectCategory::Creature, Pose::at(5.0, 64.0, 0.0)));
        let arrow = host.insert(ObservedState::new(ObjectCategory::Projectile, Pose::at(1.0, 64.0, 0.0)));
        let far = host.insert(ObservedState::new(ObjectCategory::Creature, Pose::at(100.0, 64.0, 0.0)));

        let mut session = RecordingSession::new(RecordingConfig::default());
        session.start(&host, player).unwrap();
        session.tick(&mut host).unwrap();

        assert_eq!(session.logical_id_of(pig), Some(LogicalId(1)));
        assert_eq!(session.logical_id_of(arrow), None);
        assert_eq!(session.logical_id_of(far), None);

        // Walking into range later starts tracking at that tick.
        host.teleport(far, &Pose::at(10.0, 64.0, 0.0)).unwrap();
        session.tick(&mut host).unwrap();
        let id = session.logical_id_of(far).unwrap();
        assert_eq!(id, LogicalId(2));
        assert_eq!(session.stream(id).unwrap().spawn_tick, 1);
    }

    #[test]
    fn ridden_vehicle_is_tracked_outside_radius() {
        let (mut host, player) = scene();
        let rider = host.insert(ObservedState::new(ObjectCategory::Creature, Pose::at(3.0, 64.0, 0.0)));
        let cart = host.insert(ObservedState::new(ObjectCategory::Vehicle, Pose::at(200.0, 64.0, 0.0)));

        let mut session = RecordingSession::new(RecordingConfig::default());
        session.start(&host, player).unwrap();
        session.tick(&mut host).unwrap();
        host.mount(rider, cart).unwrap();
        session.tick(&mut host).unwrap();

        let cart_id = session.logical_id_of(cart).unwrap();
        let rider_stream = session.stream(session.logical_id_of(rider).unwrap()).unwrap();
        assert!(rider_stream
            .actions()
            .iter()
            .any(|a| a.kind == ActionKind::MountStart { vehicle: cart_id }));
    }

    #[test]
    fn vanished_object_gets_a_despawn() {
        let (mut host, player) = scene();
        let pig = host.insert(ObservedState::new(ObjectCategory::Creature, Pose::at(2.0, 64.0, 0.0)));
        let mut session = RecordingSession::new(RecordingConfig::default());
        session.start(&host, player).unwrap();
        session.tick(&mut host).unwrap();
        host.despawn(pig);
        session.tick(&mut host).unwrap();
        session.tick(&mut host).unwrap();

        let stream = session.stream(LogicalId(1)).unwrap();
        assert_eq!(stream.len_ticks(), 2);
        assert_eq!(kinds(stream).last(), Some(&"despawn"));
        assert!(!stream.present_at(1));
        assert!(stream.validate().is_ok());
    }

    #[test]
    fn despawn_carries_the_last_observed_state() {
        let (mut host, player) = scene();
        let pig = host.insert(ObservedState::new(ObjectCategory::Creature, Pose::at(2.0, 64.0, 0.0)));
        let saddle = ItemStack::new("minecraft:saddle", 1);
        let mut session = RecordingSession::new(RecordingConfig::default());
        session.start(&host, player).unwrap();
        session.tick(&mut host).unwrap();
        host.object_mut(pig)
            .unwrap()
            .equipment
            .set(EquipmentSlot::Chest, Some(saddle.clone()));
        session.tick(&mut host).unwrap();
        session.tick(&mut host).unwrap();
        host.despawn(pig);
        session.tick(&mut host).unwrap();

        let stream = session.stream(LogicalId(1)).unwrap();
        let Some(ActionKind::Despawn { snapshot }) = stream.actions().last().map(|a| &a.kind) else {
            panic!("expected a trailing despawn");
        };
        let state: ObservedState = serde_json::from_value(snapshot.0.clone()).unwrap();
        assert_eq!(state.equipment.get(EquipmentSlot::Chest), Some(&saddle));
        let spawned: ObservedState = serde_json::from_value(stream.snapshot.0.clone()).unwrap();
        assert_eq!(spawned.equipment.get(EquipmentSlot::Chest), None);
    }

    // -- events -------------------------------------------------------------

    #[test]
    fn death_records_changes_made_just_before_it() {
        let (mut host, player) = scene();
        let wolf = host.insert(ObservedState::new(ObjectCategory::Creature, Pose::at(2.0, 64.0, 0.0)));
        let mut session = RecordingSession::new(RecordingConfig::default());
        session.start(&host, player).unwrap();
        session.tick(&mut host).unwrap();

        host.object_mut(wolf).unwrap().posture = Posture::Sitting;
        session.record_event(&host, wolf, ObjectEvent::Death).unwrap();
        session.record_event(&host, wolf, ObjectEvent::Death).unwrap();
        session.tick(&mut host).unwrap();

        let stream = session.stream(LogicalId(1)).unwrap();
        assert_eq!(kinds(stream), ["spawn", "posture_change", "death"]);
        let ActionKind::Death { snapshot } = &stream.actions()[2].kind else {
            panic!("expected a death");
        };
        let state: ObservedState = serde_json::from_value(snapshot.0.clone()).unwrap();
        assert_eq!(state.posture, Posture::Sitting);
    }

    #[test]
    fn death_and_respawn_within_one_tick_cancel_out() {
        let (mut host, player) = scene();
        let wolf = host.insert(ObservedState::new(ObjectCategory::Creature, Pose::at(2.0, 64.0, 0.0)));
        let mut session = RecordingSession::new(RecordingConfig::default());
        session.start(&host, player).unwrap();
        session.tick(&mut host).unwrap();

        session.record_event(&host, wolf, ObjectEvent::Death).unwrap();
        session.record_event(&host, wolf, ObjectEvent::Respawn).unwrap();
        session.tick(&mut host).unwrap();
        // A respawn of a live object is ignored.
        session.record_event(&host, wolf, ObjectEvent::Respawn).unwrap();
        session.tick(&mut host).unwrap();

        let stream = session.stream(LogicalId(1)).unwrap();
        assert_eq!(kinds(stream), ["spawn"]);
        assert!(stream.present_at(2));
    }


    #[test]
    fn events_are_stamped_with_the_flushing_tick() {
        let (mut host, player) = scene();
        let mut session = RecordingSession::new(RecordingConfig::default());
        session.start(&host, player).unwrap();
        for _ in 0..3 {
            session.tick(&mut host).unwrap();
        }
        session
            .record_event(&host, player, ObjectEvent::Swing { hand: Hand::Off })
            .unwrap();
        session.tick(&mut host).unwrap();

        let swing = session
            .stream(LogicalId::MASTER)
            .unwrap()
            .actions()
            .iter()
            .find(|a| a.kind.name() == "swing")
            .unwrap();
        assert_eq!(swing.tick, 3);
        assert_eq!(
            session.record_event(&host, ObjectHandle(77), ObjectEvent::Hurt),
            Err(RecordingError::Untracked(ObjectHandle(77)))
        );
    }

    #[test]
    fn placed_door_records_both_halves_and_stop_rewinds_them() {
        let (mut host, player) = scene();
        let mut session = RecordingSession::new(RecordingConfig::default());
        session.start(&host, player).unwrap();
        session.tick(&mut host).unwrap();

        let pos = BlockPos::new(2, 64, 2);
        let door = BlockState::new("minecraft:oak_door").with("half", "lower");
        let (upper_pos, upper) = door.partner(pos).unwrap();
        host.set_block(pos, &door);
        host.set_block(upper_pos, &upper);
        session
            .record_event(
                &host,
                player,
                ObjectEvent::BlockPlaced {
                    pos,
                    before: BlockState::air(),
                    after: door.clone(),
                    partner_before: None,
                },
            )
            .unwrap();
        session.tick(&mut host).unwrap();
        session.stop(&mut host).unwrap();

        assert!(host.block_at(pos).is_air());
        assert!(host.block_at(upper_pos).is_air());

        let master = session.stream(LogicalId::MASTER).unwrap();
        let place = master.actions().iter().find(|a| a.kind.is_world_mutation()).unwrap();
        let ActionKind::PlaceBlock { partner: Some(partner), .. } = &place.kind else {
            panic!("expected a two-cell placement");
        };
        assert_eq!(partner.pos, upper_pos);
    }

    #[test]
    fn playback_driven_objects_are_not_saved() {
        let (mut host, player) = scene();
        let standin = host.insert(ObservedState::new(ObjectCategory::Actor, Pose::at(1.0, 64.0, 1.0)));
        let mut session = RecordingSession::new(RecordingConfig::default());
        session.start(&host, player).unwrap();
        session.tick(&mut host).unwrap();
        session.set_playback_driven([standin]);
        host.object_mut(standin).unwrap().posture = Posture::Sitting;
        session.tick(&mut host).unwrap();
        session.stop(&mut host).unwrap();

        let mut saved: Vec<ActionStream> = Vec::new();
        assert!(session.save(&mut saved));
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].logical_id, LogicalId::MASTER);
        assert_eq!(session.streams().count(), 0);
    }
}
