//! Catmull-Rom camera splines with arc-length reparametrization.
//!
//! A [`CameraSpline`] interpolates the segment between the two inner control
//! points of four [`CameraPose`]s. Position, pitch and fov are plain scalar
//! channels. Yaw and roll are unwrapped first so no control point differs
//! from its neighbor by more than 180 degrees, interpolated as scalars, and
//! wrapped back into `(-180, 180]`.
//!
//! Raw parametric `t` does not move at constant speed when control points are
//! unevenly spaced. An [`ArcLengthTable`] samples the curve, accumulates
//! chord lengths, and maps a `progress` fraction of the travelled distance
//! back to `t`.
//!
//! # Example
//!
//! ```
//! use cinereel_engine::spline::{ArcLengthTable, CameraSpline};
//! use cinereel_log::pose::CameraPose;
//!
//! let spline = CameraSpline::new(
//!     CameraPose::at(0.0, 0.0, 0.0),
//!     CameraPose::at(1.0, 0.0, 0.0),
//!     CameraPose::at(5.0, 0.0, 0.0),
//!     CameraPose::at(6.0, 0.0, 0.0),
//! );
//! let table = ArcLengthTable::build(&spline, 60);
//! let halfway = spline.evaluate(table.param_at(0.5));
//! assert!((halfway.x - 3.0).abs() < 0.05);
//! ```

use cinereel_log::pose::CameraPose;

/// Default number of arc-length samples per segment.
pub const ARC_LENGTH_SAMPLES: usize = 60;

const EPSILON: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Scalar helpers
// ---------------------------------------------------------------------------

/// Uniform Catmull-Rom interpolation between `p1` and `p2`.
pub fn catmull_rom(p0: f64, p1: f64, p2: f64, p3: f64, t: f64) -> f64 {
    let t2 = t * t;
    let t3 = t2 * t;
    0.5 * ((2.0 * p1)
        + (-p0 + p2) * t
        + (2.0 * p0 - 5.0 * p1 + 4.0 * p2 - p3) * t2
        + (-p0 + 3.0 * p1 - 3.0 * p2 + p3) * t3)
}

pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Wrap an angle in degrees into `(-180, 180]`.
pub fn wrap_degrees(angle: f64) -> f64 {
    let wrapped = (angle + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped <= -180.0 {
        wrapped + 360.0
    } else {
        wrapped
    }
}

/// Shift `angle` by whole turns so it lies within 180 degrees of `reference`.
pub fn unwrap_degrees(reference: f64, angle: f64) -> f64 {
    reference + wrap_degrees(angle - reference)
}

/// Interpolate two angles along the shorter arc.
pub fn lerp_degrees(a: f64, b: f64, t: f64) -> f64 {
    wrap_degrees(lerp(a, unwrap_degrees(a, b), t))
}

/// Linear blend of two camera poses, angles along the shorter arc.
pub fn lerp_pose(a: &CameraPose, b: &CameraPose, t: f64) -> CameraPose {
    CameraPose {
        x: lerp(a.x, b.x, t),
        y: lerp(a.y, b.y, t),
        z: lerp(a.z, b.z, t),
        yaw: lerp_degrees(a.yaw, b.yaw, t),
        pitch: lerp(a.pitch, b.pitch, t),
        roll: lerp_degrees(a.roll, b.roll, t),
        fov: lerp(a.fov, b.fov, t),
    }
}

// ---------------------------------------------------------------------------
// CameraSpline
// ---------------------------------------------------------------------------

/// One Catmull-Rom segment through four camera poses.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraSpline {
    /// Control points with yaw and roll already unwrapped.
    points: [CameraPose; 4],
}

impl CameraSpline {
    /// Build the segment from `p1` to `p2`, with `p0` and `p3` as tangents.
    pub fn new(p0: CameraPose, p1: CameraPose, p2: CameraPose, p3: CameraPose) -> Self {
        let mut points = [p0, p1, p2, p3];
        // p1 is the reference; each point is unwrapped against its neighbor
        // on the p1 side.
        points[0].yaw = unwrap_degrees(points[1].yaw, points[0].yaw);
        points[2].yaw = unwrap_degrees(points[1].yaw, points[2].yaw);
        points[3].yaw = unwrap_degrees(points[2].yaw, points[3].yaw);
        points[0].roll = unwrap_degrees(points[1].roll, points[0].roll);
        points[2].roll = unwrap_degrees(points[1].roll, points[2].roll);
        points[3].roll = unwrap_degrees(points[2].roll, points[3].roll);
        Self { points }
    }

    fn channel(&self, t: f64, f: impl Fn(&CameraPose) -> f64) -> f64 {
        let [p0, p1, p2, p3] = &self.points;
        catmull_rom(f(p0), f(p1), f(p2), f(p3), t)
    }

    /// Position at raw parameter `t` in `[0, 1]`.
    pub fn position(&self, t: f64) -> [f64; 3] {
        [
            self.channel(t, |p| p.x),
            self.channel(t, |p| p.y),
            self.channel(t, |p| p.z),
        ]
    }

    /// Full pose at raw parameter `t` in `[0, 1]`.
    pub fn evaluate(&self, t: f64) -> CameraPose {
        let [x, y, z] = self.position(t);
        CameraPose {
            x,
            y,
            z,
            yaw: wrap_degrees(self.channel(t, |p| p.yaw)),
            pitch: self.channel(t, |p| p.pitch),
            roll: wrap_degrees(self.channel(t, |p| p.roll)),
            fov: self.channel(t, |p| p.fov),
        }
    }
}

// ---------------------------------------------------------------------------
// ArcLengthTable
// ---------------------------------------------------------------------------

/// Cumulative chord length of a spline sampled at fixed parameter steps.
#[derive(Debug, Clone, PartialEq)]
pub struct ArcLengthTable {
    /// `(cumulative length, t)` pairs, starting at `(0, 0)` and ending at `t = 1`.
    lut: Vec<(f64, f64)>,
}

impl ArcLengthTable {
    /// Sample `spline` at `samples` equal parameter steps.
    pub fn build(spline: &CameraSpline, samples: usize) -> Self {
        let samples = samples.max(1);
        let mut lut = Vec::with_capacity(samples + 1);
        let mut prev = spline.position(0.0);
        let mut cumulative = 0.0;
        lut.push((0.0, 0.0));
        for i in 1..=samples {
            let t = i as f64 / samples as f64;
            let pt = spline.position(t);
            let (dx, dy, dz) = (pt[0] - prev[0], pt[1] - prev[1], pt[2] - prev[2]);
            cumulative += (dx * dx + dy * dy + dz * dz).sqrt();
            lut.push((cumulative, t));
            prev = pt;
        }
        Self { lut }
    }

    /// Total sampled length of the segment.
    pub fn total(&self) -> f64 {
        self.lut.last().map_or(0.0, |&(d, _)| d)
    }

    /// Raw parameter at which `progress` of the total length is covered.
    ///
    /// A segment of zero length returns `progress` unchanged so non-spatial
    /// channels (rotation, fov) still interpolate.
    pub fn param_at(&self, progress: f64) -> f64 {
        let progress = if progress.is_finite() {
            progress.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let total = self.total();
        if total <= EPSILON || self.lut.len() < 2 {
            return progress;
        }

        let target = progress * total;
        let idx = self
            .lut
            .partition_point(|&(d, _)| d < target)
            .min(self.lut.len() - 1)
            .max(1);
        let (d0, t0) = self.lut[idx - 1];
        let (d1, t1) = self.lut[idx];
        let frac = if (d1 - d0).abs() < EPSILON {
            0.0
        } else {
            (target - d0) / (d1 - d0)
        };
        t0 + frac * (t1 - t0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn catmull_rom_hits_inner_points() {
        assert!(close(catmull_rom(0.0, 1.0, 2.0, 3.0, 0.0), 1.0));
        assert!(close(catmull_rom(0.0, 1.0, 2.0, 3.0, 1.0), 2.0));
        // Collinear evenly spaced points interpolate linearly.
        assert!(close(catmull_rom(0.0, 1.0, 2.0, 3.0, 0.25), 1.25));
    }

    #[test]
    fn wrap_keeps_half_open_range() {
        assert!(close(wrap_degrees(180.0), 180.0));
        assert!(close(wrap_degrees(-180.0), 180.0));
        assert!(close(wrap_degrees(190.0), -170.0));
        assert!(close(wrap_degrees(-190.0), 170.0));
        assert!(close(wrap_degrees(720.0), 0.0));
    }

    #[test]
    fn unwrap_takes_the_short_way() {
        assert!(close(unwrap_degrees(170.0, -170.0), 190.0));
        assert!(close(unwrap_degrees(-170.0, 170.0), -190.0));
        assert!(close(lerp_degrees(170.0, -170.0, 0.5), 180.0));
    }

    #[test]
    fn yaw_crossing_the_seam_does_not_spin() {
        let spline = CameraSpline::new(
            CameraPose::at(0.0, 0.0, 0.0).looking(160.0, 0.0),
            CameraPose::at(1.0, 0.0, 0.0).looking(170.0, 0.0),
            CameraPose::at(2.0, 0.0, 0.0).looking(-170.0, 0.0),
            CameraPose::at(3.0, 0.0, 0.0).looking(-160.0, 0.0),
        );
        for i in 0..=10 {
            let yaw = spline.evaluate(i as f64 / 10.0).yaw;
            assert!(yaw >= 170.0 - 1e-9 || yaw <= -170.0 + 1e-9, "yaw {yaw} spun the long way");
        }
    }

    #[test]
    fn zero_length_segment_returns_raw_progress() {
        let p = CameraPose::at(5.0, 5.0, 5.0);
        let spline = CameraSpline::new(p, p, p, p);
        let table = ArcLengthTable::build(&spline, ARC_LENGTH_SAMPLES);
        assert_eq!(table.total(), 0.0);
        assert!(close(table.param_at(0.3), 0.3));
        assert!(close(table.param_at(f64::NAN), 0.0));
        assert!(spline.evaluate(table.param_at(0.3)).is_finite());
    }

    #[test]
    fn param_at_is_monotone_and_bounded() {
        let spline = CameraSpline::new(
            CameraPose::at(0.0, 0.0, 0.0),
            CameraPose::at(0.5, 0.0, 0.0),
            CameraPose::at(10.0, 3.0, 0.0),
            CameraPose::at(11.0, 3.0, 0.0),
        );
        let table = ArcLengthTable::build(&spline, ARC_LENGTH_SAMPLES);
        let mut last = 0.0;
        for i in 0..=100 {
            let t = table.param_at(i as f64 / 100.0);
            assert!(t >= last - 1e-12);
            assert!((0.0..=1.0).contains(&t));
            last = t;
        }
        assert!(close(table.param_at(0.0), 0.0));
        assert!(close(table.param_at(1.0), 1.0));
    }
}
