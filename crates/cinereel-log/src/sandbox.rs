//! Deterministic in-memory host.
//!
//! [`MemoryHost`] implements [`HostWorld`] and [`CameraHost`] over plain
//! collections. Handles are allocated from a counter starting at 1, objects
//! are iterated in handle order, and unset cells read as air, so two runs fed
//! the same calls observe the same world.

use std::collections::{BTreeMap, HashMap};

use crate::block::{BlockPos, BlockState};
use crate::host::{CameraHost, HostError, HostWorld, ObjectEffect, ObjectHandle};
use crate::pose::{CameraPose, Pose};
use crate::state::{
    EquipmentSlot, GameMode, ItemStack, ObjectCategory, ObjectSnapshot, ObservedState, Posture,
    StateFlags,
};

/// In-memory [`HostWorld`] used by tests, benchmarks and the demo.
#[derive(Debug, Default)]
pub struct MemoryHost {
    objects: BTreeMap<ObjectHandle, ObservedState>,
    blocks: HashMap<BlockPos, BlockState>,
    effects: Vec<(ObjectHandle, ObjectEffect)>,
    next_handle: u64,
    camera_locked: bool,
    refuse_camera: bool,
    camera: Option<CameraPose>,
    camera_frames: u64,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an object and return its handle.
    pub fn insert(&mut self, state: ObservedState) -> ObjectHandle {
        self.next_handle += 1;
        let handle = ObjectHandle(self.next_handle);
        self.objects.insert(handle, state);
        handle
    }

    /// Mutable access for scripting a scene between ticks.
    pub fn object_mut(&mut self, object: ObjectHandle) -> Option<&mut ObservedState> {
        self.objects.get_mut(&object)
    }

    /// Live objects in handle order.
    pub fn objects(&self) -> impl Iterator<Item = (ObjectHandle, &ObservedState)> {
        self.objects.iter().map(|(h, s)| (*h, s))
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Every effect played so far, oldest first.
    pub fn effects(&self) -> &[(ObjectHandle, ObjectEffect)] {
        &self.effects
    }

    /// Cells that hold something other than air.
    pub fn solid_blocks(&self) -> BTreeMap<BlockPos, BlockState> {
        self.blocks
            .iter()
            .filter(|(_, s)| !s.is_air())
            .map(|(p, s)| (*p, s.clone()))
            .collect()
    }

    /// Make subsequent [`CameraHost::acquire_camera`] calls fail.
    pub fn refuse_camera(&mut self, refuse: bool) {
        self.refuse_camera = refuse;
    }

    pub fn camera_locked(&self) -> bool {
        self.camera_locked
    }

    /// The last camera pose applied, if any.
    pub fn camera(&self) -> Option<&CameraPose> {
        self.camera.as_ref()
    }

    /// Number of camera poses applied so far.
    pub fn camera_frames(&self) -> u64 {
        self.camera_frames
    }

    fn state_mut(&mut self, object: ObjectHandle) -> Result<&mut ObservedState, HostError> {
        self.objects
            .get_mut(&object)
            .ok_or(HostError::NoSuchObject(object))
    }
}

impl HostWorld for MemoryHost {
    fn nearby_objects(&self, center: &Pose, radius: f64) -> Vec<ObjectHandle> {
        self.objects
            .iter()
            .filter(|(_, s)| center.within(&s.pose, radius))
            .map(|(h, _)| *h)
            .collect()
    }

    fn observe(&self, object: ObjectHandle) -> Option<ObservedState> {
        self.objects.get(&object).cloned()
    }

    fn snapshot(&self, object: ObjectHandle) -> Option<ObjectSnapshot> {
        let state = self.objects.get(&object)?;
        serde_json::to_value(state).ok().map(ObjectSnapshot)
    }

    fn exists(&self, object: ObjectHandle) -> bool {
        self.objects.contains_key(&object)
    }

    fn spawn(&mut self, snapshot: &ObjectSnapshot, pose: &Pose) -> Result<ObjectHandle, HostError> {
        let mut state: ObservedState = serde_json::from_value(snapshot.0.clone())
            .map_err(|e| HostError::SpawnFailed(e.to_string()))?;
        state.pose = *pose;
        state.mount = None;
        Ok(self.insert(state))
    }

    fn despawn(&mut self, object: ObjectHandle) -> bool {
        if self.objects.remove(&object).is_none() {
            return false;
        }
        for state in self.objects.values_mut() {
            if state.mount == Some(object) {
                state.mount = None;
            }
        }
        true
    }

    fn block_at(&self, pos: BlockPos) -> BlockState {
        self.blocks.get(&pos).cloned().unwrap_or_default()
    }

    fn set_block(&mut self, pos: BlockPos, state: &BlockState) {
        if state.is_air() {
            self.blocks.remove(&pos);
        } else {
            self.blocks.insert(pos, state.clone());
        }
    }

    fn teleport(&mut self, object: ObjectHandle, pose: &Pose) -> Result<(), HostError> {
        self.state_mut(object)?.pose = *pose;
        Ok(())
    }

    fn set_posture(&mut self, object: ObjectHandle, posture: Posture) -> Result<(), HostError> {
        self.state_mut(object)?.posture = posture;
        Ok(())
    }

    fn set_flags(&mut self, object: ObjectHandle, flags: StateFlags) -> Result<(), HostError> {
        self.state_mut(object)?.flags = flags;
        Ok(())
    }

    fn set_equipment(
        &mut self,
        object: ObjectHandle,
        slot: EquipmentSlot,
        stack: Option<&ItemStack>,
    ) -> Result<(), HostError> {
        self.state_mut(object)?.equipment.set(slot, stack.cloned());
        Ok(())
    }

    fn set_vehicle_data(&mut self, object: ObjectHandle, data: &[u8]) -> Result<(), HostError> {
        let state = self.state_mut(object)?;
        if state.category != ObjectCategory::Vehicle {
            return Err(HostError::Rejected {
                object,
                reason: "not a vehicle".to_owned(),
            });
        }
        state.vehicle_data = data.to_vec();
        Ok(())
    }

    fn set_game_mode(&mut self, object: ObjectHandle, mode: GameMode) -> Result<(), HostError> {
        let state = self.state_mut(object)?;
        if state.category != ObjectCategory::Actor {
            return Err(HostError::Rejected {
                object,
                reason: "game mode applies to actors only".to_owned(),
            });
        }
        state.game_mode = Some(mode);
        Ok(())
    }

    fn mount(&mut self, rider: ObjectHandle, vehicle: ObjectHandle) -> Result<(), HostError> {
        if !self.objects.contains_key(&vehicle) {
            return Err(HostError::NoSuchObject(vehicle));
        }
        self.state_mut(rider)?.mount = Some(vehicle);
        Ok(())
    }

    fn dismount(&mut self, rider: ObjectHandle) -> Result<(), HostError> {
        self.state_mut(rider)?.mount = None;
        Ok(())
    }

    fn play_effect(&mut self, object: ObjectHandle, effect: &ObjectEffect) {
        self.effects.push((object, effect.clone()));
    }

    fn take_item(&mut self, object: ObjectHandle, stack: &ItemStack) -> Result<(), HostError> {
        let center = self.state_mut(object)?.pose;
        let picked = self
            .objects
            .iter()
            .find(|(_, s)| {
                s.category == ObjectCategory::Item
                    && s.equipment.get(EquipmentSlot::MainHand) == Some(stack)
                    && center.within(&s.pose, 4.0)
            })
            .map(|(h, _)| *h);
        if let Some(item) = picked {
            self.objects.remove(&item);
        }
        Ok(())
    }

    fn drop_item(&mut self, pose: &Pose, stack: &ItemStack) -> Result<(), HostError> {
        let mut state = ObservedState::new(ObjectCategory::Item, *pose);
        state.equipment.set(EquipmentSlot::MainHand, Some(stack.clone()));
        self.insert(state);
        Ok(())
    }
}

impl CameraHost for MemoryHost {
    fn acquire_camera(&mut self) -> bool {
        if self.refuse_camera {
            return false;
        }
        self.camera_locked = true;
        true
    }

    fn release_camera(&mut self) {
        self.camera_locked = false;
    }

    fn set_camera(&mut self, pose: &CameraPose) {
        self.camera = Some(*pose);
        self.camera_frames += 1;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
