//! Keyframe groups and absolute tick computation.
//!
//! Authors only specify relative timing. Every edit reruns
//! [`KeyframeTimeline::recompute_ticks`], which walks all keyframes in order:
//!
//! - the first keyframe lands at `base_tick + start_delay_tick`;
//! - each later keyframe lands at the previous tick plus its own
//!   `start_delay_tick` and `path_tick`;
//! - the first keyframe of a group additionally waits out the previous
//!   group's last `transition_delay_tick`.
//!
//! The walk only reads authored fields, so it is idempotent.
//!
//! # Example
//!
//! ```
//! use cinereel_engine::keyframe::KeyframeTiming;
//! use cinereel_engine::timeline::KeyframeTimeline;
//! use cinereel_log::pose::CameraPose;
//!
//! let mut timeline = KeyframeTimeline::new();
//! let group = timeline.add_group();
//! let a = timeline.add_keyframe(group, CameraPose::at(0.0, 70.0, 0.0), KeyframeTiming::default()).unwrap();
//! let b = timeline.add_keyframe(group, CameraPose::at(10.0, 70.0, 0.0), KeyframeTiming::path(40)).unwrap();
//!
//! assert_eq!(timeline.keyframe(a).unwrap().tick, 0);
//! assert_eq!(timeline.keyframe(b).unwrap().tick, 40);
//! let mid = timeline.sample(20, 0.0).unwrap();
//! assert!((mid.x - 5.0).abs() < 1e-9);
//! ```

use serde::Serialize;

use cinereel_log::pose::CameraPose;

use crate::keyframe::{Keyframe, KeyframeGroup, KeyframeId, KeyframeTiming};
use crate::spline::{lerp_pose, ArcLengthTable, CameraSpline, ARC_LENGTH_SAMPLES};

// ---------------------------------------------------------------------------
// TimelineError
// ---------------------------------------------------------------------------

/// Errors returned by timeline edits and cutscene setup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimelineError {
    #[error("keyframe {0} does not exist")]
    UnknownKeyframe(KeyframeId),

    #[error("group {0} does not exist")]
    UnknownGroup(u32),

    #[error("index {index} out of range for group of {len} keyframes")]
    IndexOutOfRange { index: usize, len: usize },

    /// Playback needs at least one segment.
    #[error("timeline has {0} keyframes, at least 2 are needed to play")]
    TooFewKeyframes(usize),
}

// ---------------------------------------------------------------------------
// SegmentPath
// ---------------------------------------------------------------------------

/// How the camera travels between two keyframes.
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentPath {
    /// Straight blend of the two poses.
    Linear { from: CameraPose, to: CameraPose },
    /// Arc-length reparametrized Catmull-Rom path.
    Spline {
        spline: CameraSpline,
        table: ArcLengthTable,
    },
}

impl SegmentPath {
    /// Pose at eased progress `t` in `[0, 1]`.
    pub fn pose_at(&self, t: f64) -> CameraPose {
        match self {
            SegmentPath::Linear { from, to } => lerp_pose(from, to, t),
            SegmentPath::Spline { spline, table } => spline.evaluate(table.param_at(t)),
        }
    }
}

// ---------------------------------------------------------------------------
// KeyframeTimeline
// ---------------------------------------------------------------------------

/// Location of a keyframe: `(group index, keyframe index)`.
type Slot = (usize, usize);

/// Ordered keyframe groups with derived absolute ticks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyframeTimeline {
    /// Tick the first keyframe's start delay counts from.
    pub base_tick: u64,
    groups: Vec<KeyframeGroup>,
    #[serde(skip)]
    next_id: u32,
}

impl Default for KeyframeTimeline {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyframeTimeline {
    pub fn new() -> Self {
        Self {
            base_tick: 0,
            groups: Vec::new(),
            next_id: 1,
        }
    }

    pub fn with_base_tick(mut self, base_tick: u64) -> Self {
        self.base_tick = base_tick;
        self.recompute_ticks();
        self
    }

    pub fn groups(&self) -> &[KeyframeGroup] {
        &self.groups
    }

    pub fn group(&self, id: u32) -> Option<&KeyframeGroup> {
        self.groups.iter().find(|g| g.id == id)
    }

    /// Total number of keyframes.
    pub fn len(&self) -> usize {
        self.groups.iter().map(KeyframeGroup::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All keyframes in playback order.
    pub fn keyframes(&self) -> impl Iterator<Item = &Keyframe> {
        self.groups.iter().flat_map(|g| g.keyframes.iter())
    }

    pub fn keyframe(&self, id: KeyframeId) -> Option<&Keyframe> {
        let (g, k) = self.locate(id)?;
        Some(&self.groups[g].keyframes[k])
    }

    pub fn first(&self) -> Option<&Keyframe> {
        self.keyframes().next()
    }

    pub fn last(&self) -> Option<&Keyframe> {
        self.groups.iter().rev().find_map(|g| g.keyframes.last())
    }

    /// The keyframe played after `id`, crossing group boundaries.
    pub fn next_after(&self, id: KeyframeId) -> Option<&Keyframe> {
        let (g, k) = self.locate(id)?;
        self.groups[g]
            .keyframes
            .get(k + 1)
            .or_else(|| self.groups[g + 1..].iter().find_map(|grp| grp.keyframes.first()))
    }

    /// Absolute tick at which the timeline ends, including the trailing
    /// transition delay of the last keyframe.
    pub fn end_tick(&self) -> u64 {
        self.last()
            .map_or(self.base_tick, |kf| kf.tick + kf.timing.transition_delay_tick)
    }

    /// Ticks from `base_tick` to [`end_tick`](Self::end_tick).
    pub fn duration(&self) -> u64 {
        self.end_tick() - self.base_tick
    }

    fn locate(&self, id: KeyframeId) -> Option<Slot> {
        self.groups.iter().enumerate().find_map(|(g, grp)| {
            grp.keyframes
                .iter()
                .position(|kf| kf.id == id)
                .map(|k| (g, k))
        })
    }

    fn group_index(&self, id: u32) -> Result<usize, TimelineError> {
        self.groups
            .iter()
            .position(|g| g.id == id)
            .ok_or(TimelineError::UnknownGroup(id))
    }

    // -- edits ------------------------------------------------------------

    /// Append an empty group and return its id.
    pub fn add_group(&mut self) -> u32 {
        let id = self.groups.len() as u32 + 1;
        self.groups.push(KeyframeGroup::new(id));
        id
    }

    /// Append a keyframe to the end of `group`.
    pub fn add_keyframe(
        &mut self,
        group: u32,
        pose: CameraPose,
        timing: KeyframeTiming,
    ) -> Result<KeyframeId, TimelineError> {
        let g = self.group_index(group)?;
        let index = self.groups[g].len();
        self.insert_keyframe(group, index, pose, timing)
    }

    /// Insert a keyframe at `index` within `group`.
    pub fn insert_keyframe(
        &mut self,
        group: u32,
        index: usize,
        pose: CameraPose,
        timing: KeyframeTiming,
    ) -> Result<KeyframeId, TimelineError> {
        let g = self.group_index(group)?;
        let len = self.groups[g].len();
        if index > len {
            return Err(TimelineError::IndexOutOfRange { index, len });
        }
        let id = KeyframeId(self.next_id);
        self.next_id += 1;
        self.groups[g]
            .keyframes
            .insert(index, Keyframe::new(id, pose, timing));
        self.recompute_ticks();
        Ok(id)
    }

    /// Remove a keyframe. Removing the last keyframe of a group removes the
    /// group and renumbers the remaining groups from 1.
    pub fn remove_keyframe(&mut self, id: KeyframeId) -> Result<Keyframe, TimelineError> {
        let (g, k) = self.locate(id).ok_or(TimelineError::UnknownKeyframe(id))?;
        let removed = self.groups[g].keyframes.remove(k);
        if self.groups[g].is_empty() {
            self.groups.remove(g);
            for (i, group) in self.groups.iter_mut().enumerate() {
                group.id = i as u32 + 1;
            }
        }
        self.recompute_ticks();
        Ok(removed)
    }

    /// Move a keyframe to `index` within its own group.
    pub fn move_keyframe(&mut self, id: KeyframeId, index: usize) -> Result<(), TimelineError> {
        let (g, k) = self.locate(id).ok_or(TimelineError::UnknownKeyframe(id))?;
        let len = self.groups[g].len();
        if index >= len {
            return Err(TimelineError::IndexOutOfRange { index, len });
        }
        let kf = self.groups[g].keyframes.remove(k);
        self.groups[g].keyframes.insert(index, kf);
        self.recompute_ticks();
        Ok(())
    }

    /// Replace the relative timing of a keyframe.
    pub fn set_delays(&mut self, id: KeyframeId, timing: KeyframeTiming) -> Result<(), TimelineError> {
        let (g, k) = self.locate(id).ok_or(TimelineError::UnknownKeyframe(id))?;
        self.groups[g].keyframes[k].timing = timing;
        self.recompute_ticks();
        Ok(())
    }

    /// Replace the pose of a keyframe. Ticks are unaffected.
    pub fn set_pose(&mut self, id: KeyframeId, pose: CameraPose) -> Result<(), TimelineError> {
        let (g, k) = self.locate(id).ok_or(TimelineError::UnknownKeyframe(id))?;
        self.groups[g].keyframes[k].pose = pose;
        Ok(())
    }

    /// Derive every keyframe's absolute tick from the authored timing.
    pub fn recompute_ticks(&mut self) {
        let mut prev: Option<(u64, u64)> = None;
        for group in &mut self.groups {
            for (k, kf) in group.keyframes.iter_mut().enumerate() {
                let timing = kf.timing;
                kf.tick = match prev {
                    None => self.base_tick + timing.start_delay_tick,
                    Some((tick, transition)) => {
                        let crossing = if k == 0 { transition } else { 0 };
                        tick + crossing + timing.start_delay_tick + timing.path_tick
                    }
                };
                prev = Some((kf.tick, timing.transition_delay_tick));
            }
        }
    }

    // -- sampling ---------------------------------------------------------

    /// How the camera travels from `a` to `b`.
    ///
    /// Smooth easing on a pair inside one group follows the Catmull-Rom path
    /// through the group's neighbors; anything else is a straight blend.
    pub fn segment_path(
        &self,
        a: KeyframeId,
        b: KeyframeId,
        samples: usize,
    ) -> Result<SegmentPath, TimelineError> {
        let (ga, ka) = self.locate(a).ok_or(TimelineError::UnknownKeyframe(a))?;
        let (gb, kb) = self.locate(b).ok_or(TimelineError::UnknownKeyframe(b))?;
        let from = &self.groups[ga].keyframes[ka];
        let to = &self.groups[gb].keyframes[kb];

        let group = &self.groups[ga].keyframes;
        if ga != gb || kb != ka + 1 || !to.timing.easing.is_smooth() || group.len() < 2 {
            return Ok(SegmentPath::Linear {
                from: from.pose,
                to: to.pose,
            });
        }

        let p0 = ka.checked_sub(1).map_or(from.pose, |i| group[i].pose);
        let p3 = group.get(kb + 1).map_or(to.pose, |kf| kf.pose);
        let spline = CameraSpline::new(p0, from.pose, to.pose, p3);
        let table = ArcLengthTable::build(&spline, samples);
        Ok(SegmentPath::Spline { spline, table })
    }

    /// Camera pose at absolute `tick + partial`.
    ///
    /// Before the first keyframe and after the last the nearest keyframe's
    /// pose is held. Returns `None` for an empty timeline.
    pub fn sample(&self, tick: u64, partial: f64) -> Option<CameraPose> {
        self.sample_with(tick, partial, ARC_LENGTH_SAMPLES)
    }

    /// [`sample`](Self::sample) with an explicit arc-length table resolution.
    pub fn sample_with(&self, tick: u64, partial: f64, samples: usize) -> Option<CameraPose> {
        match self.bracket(tick, partial)? {
            Bracket::Hold(pose) => Some(pose),
            Bracket::Travel { a, b, t } => Some(match self.segment_path(a.id, b.id, samples) {
                Ok(path) => path.pose_at(t),
                Err(_) => a.pose,
            }),
        }
    }

    /// A sampler that reuses the segment path while consecutive samples
    /// stay on the same pair of keyframes.
    pub fn cursor(&self, samples: usize) -> TimelineCursor<'_> {
        TimelineCursor {
            timeline: self,
            samples,
            cached: None,
        }
    }

    /// Where `tick + partial` falls: holding a pose or travelling between two
    /// keyframes at eased progress `t`.
    fn bracket(&self, tick: u64, partial: f64) -> Option<Bracket<'_>> {
        let time = tick as f64 + partial.clamp(0.0, 1.0);
        let mut prev: Option<&Keyframe> = None;
        for b in self.keyframes() {
            if (b.tick as f64) <= time {
                prev = Some(b);
                continue;
            }
            let Some(a) = prev else {
                return Some(Bracket::Hold(b.pose));
            };
            let travel_start = b.tick.saturating_sub(b.timing.path_tick).max(a.tick) as f64;
            if time < travel_start {
                return Some(Bracket::Hold(a.pose));
            }
            let t = segment_progress(time - travel_start, b.tick as f64 - travel_start);
            return Some(Bracket::Travel {
                a,
                b,
                t: b.timing.easing.apply(t),
            });
        }
        prev.map(|kf| Bracket::Hold(kf.pose))
    }

    // -- persistence ------------------------------------------------------

    pub fn to_json_string(&self) -> Result<String, anyhow::Error> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a timeline, dropping keyframes that fail to parse or reuse an
    /// id, and groups left empty. Returns the timeline and the number of
    /// dropped keyframes.
    pub fn from_json_lenient(json: &str) -> Result<(KeyframeTimeline, usize), anyhow::Error> {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| anyhow::anyhow!("timeline is not valid JSON: {e}"))?;
        let raw_groups = value
            .get("groups")
            .and_then(|g| g.as_array())
            .ok_or_else(|| anyhow::anyhow!("timeline has no `groups` array"))?;

        let mut timeline = KeyframeTimeline::new();
        timeline.base_tick = value.get("base_tick").and_then(|t| t.as_u64()).unwrap_or(0);

        let mut dropped = 0;
        let mut seen = std::collections::HashSet::new();
        for raw in raw_groups {
            let mut keyframes = Vec::new();
            let raw_keyframes = raw
                .get("keyframes")
                .and_then(|k| k.as_array())
                .map(Vec::as_slice)
                .unwrap_or_default();
            for entry in raw_keyframes {
                match serde_json::from_value::<Keyframe>(entry.clone()) {
                    Ok(kf) if seen.insert(kf.id) => keyframes.push(kf),
                    Ok(kf) => {
                        tracing::warn!(keyframe = %kf.id, "dropping keyframe with duplicate id");
                        dropped += 1;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "dropping malformed keyframe");
                        dropped += 1;
                    }
                }
            }
            if keyframes.is_empty() {
                continue;
            }
            let id = timeline.groups.len() as u32 + 1;
            timeline.groups.push(KeyframeGroup { id, keyframes });
        }
        timeline.next_id = seen.iter().map(|id| id.0 + 1).max().unwrap_or(1);
        timeline.recompute_ticks();
        Ok((timeline, dropped))
    }
}

enum Bracket<'a> {
    Hold(CameraPose),
    Travel {
        a: &'a Keyframe,
        b: &'a Keyframe,
        t: f64,
    },
}

// ---------------------------------------------------------------------------
// TimelineCursor
// ---------------------------------------------------------------------------

/// Render-rate sampling over a borrowed timeline.
///
/// Gives the same poses as [`KeyframeTimeline::sample_with`] but only builds
/// a segment's arc-length table when the sampled pair changes.
pub struct TimelineCursor<'a> {
    timeline: &'a KeyframeTimeline,
    samples: usize,
    cached: Option<(KeyframeId, KeyframeId, SegmentPath)>,
}

impl TimelineCursor<'_> {
    pub fn sample(&mut self, tick: u64, partial: f64) -> Option<CameraPose> {
        let timeline = self.timeline;
        let (a, b, t) = match timeline.bracket(tick, partial)? {
            Bracket::Hold(pose) => return Some(pose),
            Bracket::Travel { a, b, t } => (a, b, t),
        };
        let hit = matches!(&self.cached, Some((ca, cb, _)) if *ca == a.id && *cb == b.id);
        if !hit {
            match timeline.segment_path(a.id, b.id, self.samples) {
                Ok(path) => self.cached = Some((a.id, b.id, path)),
                Err(_) => return Some(a.pose),
            }
        }
        self.cached.as_ref().map(|(_, _, path)| path.pose_at(t))
    }

    /// The pair whose path is currently cached.
    pub fn cached_pair(&self) -> Option<(KeyframeId, KeyframeId)> {
        self.cached.as_ref().map(|(a, b, _)| (*a, *b))
    }
}

/// Linear progress through a travel span; a zero-length span is complete.
pub(crate) fn segment_progress(elapsed: f64, span: f64) -> f64 {
    if span <= 0.0 {
        1.0
    } else {
        (elapsed / span).clamp(0.0, 1.0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
