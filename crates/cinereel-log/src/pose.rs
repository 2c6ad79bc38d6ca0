//! Per-tick spatial pose of a tracked object.
//!
//! A [`Pose`] is what an [`ActionStream`](crate::stream::ActionStream) stores
//! once per observed tick. It carries the world position, body/head/pitch
//! orientation and the handful of movement flags a replay needs to look right
//! (grounded, sneaking, sprinting). Everything else about the object is
//! captured sparsely as [`Action`](crate::action::Action)s.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Pose
// ---------------------------------------------------------------------------

/// Position and orientation of an object at one tick.
///
/// Angles are in degrees. `yaw` is the body yaw, `head_yaw` the look yaw.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    /// World-space X coordinate.
    pub x: f64,
    /// World-space Y coordinate (up).
    pub y: f64,
    /// World-space Z coordinate.
    pub z: f64,
    /// Body yaw in degrees.
    pub yaw: f32,
    /// Head yaw in degrees.
    pub head_yaw: f32,
    /// Pitch in degrees, positive looking down.
    pub pitch: f32,
    /// Whether the object was standing on the ground.
    #[serde(default)]
    pub on_ground: bool,
}

impl Pose {
    /// A pose at the given position with zero rotation.
    pub fn at(x: f64, y: f64, z: f64) -> Self {
        Self {
            x,
            y,
            z,
            ..Default::default()
        }
    }

    /// Builder-style rotation setter.
    pub fn with_rotation(mut self, yaw: f32, pitch: f32) -> Self {
        self.yaw = yaw;
        self.head_yaw = yaw;
        self.pitch = pitch;
        self
    }

    /// Position as an array.
    pub fn position(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    /// Squared euclidean distance between the positions of two poses.
    pub fn distance_squared(&self, other: &Pose) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }

    /// Whether `other` lies within `radius` of this pose (inclusive).
    pub fn within(&self, other: &Pose, radius: f64) -> bool {
        self.distance_squared(other) <= radius * radius
    }
}

// ---------------------------------------------------------------------------
// CameraPose
// ---------------------------------------------------------------------------

/// A free camera pose: position, orientation and field of view.
///
/// Angles are in degrees; `fov` is the vertical field of view in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraPose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f64,
    pub pitch: f64,
    #[serde(default)]
    pub roll: f64,
    #[serde(default = "default_fov")]
    pub fov: f64,
}

fn default_fov() -> f64 {
    70.0
}

impl Default for CameraPose {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            yaw: 0.0,
            pitch: 0.0,
            roll: 0.0,
            fov: default_fov(),
        }
    }
}

impl CameraPose {
    /// A camera at the given position looking along +Z with the default fov.
    pub fn at(x: f64, y: f64, z: f64) -> Self {
        Self {
            x,
            y,
            z,
            ..Default::default()
        }
    }

    /// Builder-style orientation setter.
    pub fn looking(mut self, yaw: f64, pitch: f64) -> Self {
        self.yaw = yaw;
        self.pitch = pitch;
        self
    }

    pub fn position(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    /// Euclidean distance between two camera positions.
    pub fn distance(&self, other: &CameraPose) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Whether every channel is finite.
    pub fn is_finite(&self) -> bool {
        [self.x, self.y, self.z, self.yaw, self.pitch, self.roll, self.fov]
            .iter()
            .all(|v| v.is_finite())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
