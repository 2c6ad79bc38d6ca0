//! World cells and their serialized states.
//!
//! Block mutations are the only actions that touch the world rather than a
//! single object. Some structures occupy two cells (doors, tall plants, beds);
//! the cell that was not directly addressed is found through
//! [`BlockState::partner`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of the empty cell state.
pub const AIR: &str = "minecraft:air";

// ---------------------------------------------------------------------------
// BlockPos
// ---------------------------------------------------------------------------

/// Integer cell coordinate.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// The position offset by `(dx, dy, dz)`.
    pub fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }
}

impl fmt::Debug for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.x, self.y, self.z)
    }
}

// ---------------------------------------------------------------------------
// BlockState
// ---------------------------------------------------------------------------

/// Serialized state of one cell: an identifier plus string properties.
///
/// Properties live in a `BTreeMap` so serialization order is stable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockState {
    pub id: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

impl Default for BlockState {
    fn default() -> Self {
        Self::air()
    }
}

impl BlockState {
    /// A state with no properties.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            properties: BTreeMap::new(),
        }
    }

    /// The empty cell.
    pub fn air() -> Self {
        Self::new(AIR)
    }

    /// Builder-style property setter.
    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.properties.insert(key.to_owned(), value.to_owned());
        self
    }

    pub fn is_air(&self) -> bool {
        self.id == AIR
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Resolve the second cell of a two-cell structure anchored at `pos`.
    ///
    /// Vertical structures carry `half = upper | lower`; horizontal ones carry
    /// `part = head | foot` plus a `facing` direction pointing from foot to
    /// head. Returns the partner cell position and the state it must hold, or
    /// `None` for single-cell states.
    pub fn partner(&self, pos: BlockPos) -> Option<(BlockPos, BlockState)> {
        if let Some(half) = self.property("half") {
            let (dy, other) = match half {
                "lower" => (1, "upper"),
                "upper" => (-1, "lower"),
                _ => return None,
            };
            let mut state = self.clone();
            state.properties.insert("half".to_owned(), other.to_owned());
            return Some((pos.offset(0, dy, 0), state));
        }

        if let Some(part) = self.property("part") {
            let (dx, dz) = match self.property("facing")? {
                "north" => (0, -1),
                "south" => (0, 1),
                "west" => (-1, 0),
                "east" => (1, 0),
                _ => return None,
            };
            let (sign, other) = match part {
                "foot" => (1, "head"),
                "head" => (-1, "foot"),
                _ => return None,
            };
            let mut state = self.clone();
            state.properties.insert("part".to_owned(), other.to_owned());
            return Some((pos.offset(dx * sign, 0, dz * sign), state));
        }

        None
    }
}

// ---------------------------------------------------------------------------
// CellEdit
// ---------------------------------------------------------------------------

/// One cell's before/after pair inside a block action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellEdit {
    pub pos: BlockPos,
    pub before: BlockState,
    pub after: BlockState,
}

impl CellEdit {
    pub fn new(pos: BlockPos, before: BlockState, after: BlockState) -> Self {
        Self { pos, before, after }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
