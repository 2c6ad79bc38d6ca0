//! Authored camera keyframes.
//!
//! A [`Keyframe`] pairs a [`CameraPose`] with relative timing. Its absolute
//! `tick` is derived by
//! [`KeyframeTimeline::recompute_ticks`](crate::timeline::KeyframeTimeline::recompute_ticks)
//! and never authored directly.

use std::fmt;

use serde::{Deserialize, Serialize};

use cinereel_log::pose::CameraPose;

// ---------------------------------------------------------------------------
// KeyframeId
// ---------------------------------------------------------------------------

/// Stable identifier of a keyframe within a timeline.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyframeId(pub u32);

impl fmt::Debug for KeyframeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyframeId({})", self.0)
    }
}

impl fmt::Display for KeyframeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "k{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Easing
// ---------------------------------------------------------------------------

/// Easing applied to the progress of the segment that ends at a keyframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Easing {
    #[default]
    Linear,
    EaseIn,
    EaseOut,
    EaseInOut,
    /// Constant speed along a Catmull-Rom path.
    Smooth,
    /// Smoothstep speed along a Catmull-Rom path.
    SmoothInOut,
    /// Hold the start pose, then cut at the end of the segment.
    Constant,
}

impl Easing {
    /// Map linear progress `t` in `[0, 1]` to eased progress.
    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Linear | Easing::Smooth => t,
            Easing::EaseIn => t * t,
            Easing::EaseOut => 1.0 - (1.0 - t) * (1.0 - t),
            Easing::EaseInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - 2.0 * (1.0 - t) * (1.0 - t)
                }
            }
            Easing::SmoothInOut => t * t * (3.0 - 2.0 * t),
            Easing::Constant => {
                if t < 1.0 {
                    0.0
                } else {
                    1.0
                }
            }
        }
    }

    /// Whether the segment follows the spline path instead of a straight blend.
    pub fn is_smooth(self) -> bool {
        matches!(self, Easing::Smooth | Easing::SmoothInOut)
    }
}

// ---------------------------------------------------------------------------
// KeyframeTiming
// ---------------------------------------------------------------------------

/// Author-specified relative timing of a keyframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyframeTiming {
    /// Ticks to hold the previous pose before travelling to this keyframe.
    pub start_delay_tick: u64,
    /// Ticks spent travelling from the previous keyframe to this one.
    pub path_tick: u64,
    /// Ticks to hold this keyframe when it ends a group.
    pub transition_delay_tick: u64,
    /// Easing of the travel towards this keyframe.
    pub easing: Easing,
}

impl KeyframeTiming {
    /// Travel for `path_tick` ticks with no delays.
    pub fn path(path_tick: u64) -> Self {
        Self {
            path_tick,
            ..Default::default()
        }
    }

    pub fn with_start_delay(mut self, ticks: u64) -> Self {
        self.start_delay_tick = ticks;
        self
    }

    pub fn with_transition_delay(mut self, ticks: u64) -> Self {
        self.transition_delay_tick = ticks;
        self
    }

    pub fn with_easing(mut self, easing: Easing) -> Self {
        self.easing = easing;
        self
    }
}

// ---------------------------------------------------------------------------
// Keyframe / KeyframeGroup
// ---------------------------------------------------------------------------

/// One authored camera pose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    pub id: KeyframeId,
    pub pose: CameraPose,
    /// Absolute tick, derived from the timing of every earlier keyframe.
    #[serde(default)]
    pub tick: u64,
    #[serde(flatten)]
    pub timing: KeyframeTiming,
}

impl Keyframe {
    pub fn new(id: KeyframeId, pose: CameraPose, timing: KeyframeTiming) -> Self {
        Self {
            id,
            pose,
            tick: 0,
            timing,
        }
    }
}

/// An ordered run of keyframes. Group ids are contiguous from 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyframeGroup {
    pub id: u32,
    pub keyframes: Vec<Keyframe>,
}

impl KeyframeGroup {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            keyframes: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.keyframes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keyframes.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn easings_fix_the_endpoints() {
        for easing in [
            Easing::Linear,
            Easing::EaseIn,
            Easing::EaseOut,
            Easing::EaseInOut,
            Easing::Smooth,
            Easing::SmoothInOut,
        ] {
            assert_eq!(easing.apply(0.0), 0.0, "{easing:?}");
            assert_eq!(easing.apply(1.0), 1.0, "{easing:?}");
            assert!((0.0..=1.0).contains(&easing.apply(0.37)));
        }
        assert_eq!(Easing::Constant.apply(0.99), 0.0);
        assert_eq!(Easing::Constant.apply(1.0), 1.0);
        assert_eq!(Easing::Linear.apply(2.0), 1.0);
    }

    #[test]
    fn timing_fields_flatten_into_the_keyframe() {
        let kf = Keyframe::new(
            KeyframeId(4),
            CameraPose::at(1.0, 2.0, 3.0),
            KeyframeTiming::path(40).with_start_delay(10).with_easing(Easing::Smooth),
        );
        let json = serde_json::to_value(&kf).unwrap();
        assert_eq!(json["path_tick"], 40);
        assert_eq!(json["start_delay_tick"], 10);
        assert_eq!(json["easing"], "Smooth");
        let back: Keyframe = serde_json::from_value(json).unwrap();
        assert_eq!(back, kf);
    }
}
