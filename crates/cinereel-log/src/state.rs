//! Observable object state as reported by the host.
//!
//! [`ObservedState`] is the read side of the host boundary: everything the
//! sampler diffs tick over tick. The individual field types double as the
//! payload types of the matching [`Action`](crate::action::Action) variants,
//! so a recorded change always carries exactly what the host reported.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::host::ObjectHandle;
use crate::pose::Pose;

// ---------------------------------------------------------------------------
// ObjectCategory
// ---------------------------------------------------------------------------

/// Broad category of a live object, used for tracking policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectCategory {
    /// A controllable actor (player or player stand-in).
    Actor,
    /// Any other living creature.
    Creature,
    /// A rideable vehicle (boat, minecart, ...).
    Vehicle,
    /// A dropped item lying in the world.
    Item,
    /// Arrows, thrown objects and similar short-lived objects.
    Projectile,
    /// Anything else the host exposes.
    Other,
}

// ---------------------------------------------------------------------------
// Posture / GameMode / Hand
// ---------------------------------------------------------------------------

/// Body posture of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Posture {
    #[default]
    Standing,
    Sneaking,
    Sitting,
    Sleeping,
    Swimming,
    Gliding,
}

/// Game mode of a controllable actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GameMode {
    #[default]
    Survival,
    Creative,
    Adventure,
    Spectator,
}

/// Which hand performed an interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Hand {
    #[default]
    Main,
    Off,
}

// ---------------------------------------------------------------------------
// StateFlags
// ---------------------------------------------------------------------------

/// Packed generic visibility/state flags.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct StateFlags(pub u8);

impl StateFlags {
    pub const ON_FIRE: u8 = 1 << 0;
    pub const SPRINTING: u8 = 1 << 1;
    pub const INVISIBLE: u8 = 1 << 2;
    pub const GLOWING: u8 = 1 << 3;
    pub const USING_ITEM: u8 = 1 << 4;

    /// Whether every bit in `mask` is set.
    pub fn contains(self, mask: u8) -> bool {
        self.0 & mask == mask
    }

    /// Copy with the bits in `mask` set or cleared.
    pub fn with(self, mask: u8, on: bool) -> Self {
        if on {
            Self(self.0 | mask)
        } else {
            Self(self.0 & !mask)
        }
    }
}

impl fmt::Debug for StateFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateFlags({:#010b})", self.0)
    }
}

// ---------------------------------------------------------------------------
// Equipment
// ---------------------------------------------------------------------------

/// An equipment slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EquipmentSlot {
    MainHand,
    OffHand,
    Head,
    Chest,
    Legs,
    Feet,
}

impl EquipmentSlot {
    /// Every slot, in storage order.
    pub const ALL: [EquipmentSlot; 6] = [
        EquipmentSlot::MainHand,
        EquipmentSlot::OffHand,
        EquipmentSlot::Head,
        EquipmentSlot::Chest,
        EquipmentSlot::Legs,
        EquipmentSlot::Feet,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

/// An item stack: identity, count, and serialized extra data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemStack {
    /// Namespaced item identifier, e.g. `"minecraft:diamond_sword"`.
    pub item_id: String,
    /// Stack size.
    pub count: u32,
    /// Serialized extra data (enchantments, custom names, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

impl ItemStack {
    /// A stack of `count` items with no extra data.
    pub fn new(item_id: impl Into<String>, count: u32) -> Self {
        Self {
            item_id: item_id.into(),
            count,
            extra: None,
        }
    }

    /// Builder-style extra data setter.
    pub fn with_extra(mut self, extra: serde_json::Value) -> Self {
        self.extra = Some(extra);
        self
    }
}

/// Contents of every equipment slot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Equipment {
    slots: [Option<ItemStack>; 6],
}

impl Equipment {
    /// Empty equipment.
    pub fn new() -> Self {
        Self::default()
    }

    /// The stack in `slot`, if any.
    pub fn get(&self, slot: EquipmentSlot) -> Option<&ItemStack> {
        self.slots[slot.index()].as_ref()
    }

    /// Replace the stack in `slot`, returning the previous one.
    pub fn set(&mut self, slot: EquipmentSlot, stack: Option<ItemStack>) -> Option<ItemStack> {
        std::mem::replace(&mut self.slots[slot.index()], stack)
    }
}

// ---------------------------------------------------------------------------
// ObjectSnapshot
// ---------------------------------------------------------------------------

/// Opaque serialized full state of an object, captured by the host.
///
/// The core never looks inside; it only hands the blob back to
/// [`HostWorld::spawn`](crate::host::HostWorld::spawn) when an object must be
/// recreated from nothing.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectSnapshot(pub serde_json::Value);

// ---------------------------------------------------------------------------
// ObservedState
// ---------------------------------------------------------------------------

/// Everything the core reads from a live object in one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedState {
    pub category: ObjectCategory,
    pub pose: Pose,
    pub posture: Posture,
    pub flags: StateFlags,
    pub equipment: Equipment,
    /// The object this one is riding, if any.
    pub mount: Option<ObjectHandle>,
    /// Vehicle-category specific bytes (boat paddles, minecart contents...).
    pub vehicle_data: Vec<u8>,
    /// Game mode; only meaningful for [`ObjectCategory::Actor`].
    pub game_mode: Option<GameMode>,
}

impl ObservedState {
    /// A default state for an object of `category` at `pose`.
    pub fn new(category: ObjectCategory, pose: Pose) -> Self {
        Self {
            category,
            pose,
            posture: Posture::default(),
            flags: StateFlags::default(),
            equipment: Equipment::default(),
            mount: None,
            vehicle_data: Vec::new(),
            game_mode: if category == ObjectCategory::Actor {
                Some(GameMode::default())
            } else {
                None
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
