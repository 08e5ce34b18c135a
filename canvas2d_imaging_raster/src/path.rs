// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Path construction: `moveTo`/`lineTo`/.../`arc`/`ellipse`/`arcTo`/`rect`.
//!
//! This is the "path builder" promised by
//! `canvas2d_imaging`'s crate doc comment: `arc`, `ellipse`, and `arcTo` are
//! geometric conveniences, not primitives the IR understands, so they are
//! expanded here into plain `MoveTo`/`LineTo`/`CurveTo` sequences before a
//! [`PathDesc`] is ever created. Everything downstream (the flattener, the
//! rasterizer, the stroker) only ever sees straight segments and cubic
//! Béziers.

extern crate alloc;

use alloc::vec::Vec;
use canvas2d_imaging::{PathCmd, PathDesc};
use core::f64::consts::PI;
#[cfg(not(feature = "std"))]
use kurbo::common::FloatFuncs as _;
use kurbo::{BezPath, PathEl, Point, Vec2};

#[inline]
fn vlen(v: Vec2) -> f64 {
    (v.x * v.x + v.y * v.y).sqrt()
}

/// A growable Canvas 2D path under construction.
///
/// Mirrors the HTML5 Canvas path-construction contract: a sequence of
/// subpaths, the most recent of which has a "current point" that subsequent
/// commands extend. Non-finite arguments are silently ignored (per the
/// Canvas 2D `InvalidArgumentError` contract: the offending command becomes
/// a no-op rather than raising).
#[derive(Clone, Debug, Default)]
pub struct CanvasPath {
    bez: BezPath,
    current: Option<Point>,
    subpath_start: Option<Point>,
}

#[inline]
fn finite(v: f64) -> bool {
    v.is_finite()
}

impl CanvasPath {
    /// Creates an empty path.
    pub fn new() -> Self {
        Self::default()
    }

    /// Discards all subpaths (`beginPath`).
    pub fn clear(&mut self) {
        self.bez = BezPath::new();
        self.current = None;
        self.subpath_start = None;
    }

    /// Returns `true` if no subpaths have been recorded.
    pub fn is_empty(&self) -> bool {
        self.bez.elements().is_empty()
    }

    /// The current point, if any.
    pub fn current_point(&self) -> Option<Point> {
        self.current
    }

    /// Starts a new subpath at `(x, y)`.
    pub fn move_to(&mut self, x: f64, y: f64) {
        if !(finite(x) && finite(y)) {
            return;
        }
        let p = Point::new(x, y);
        self.bez.move_to(p);
        self.current = Some(p);
        self.subpath_start = Some(p);
    }

    /// Appends a straight segment from the current point to `(x, y)`.
    ///
    /// If there is no current point, behaves like `moveTo`.
    pub fn line_to(&mut self, x: f64, y: f64) {
        if !(finite(x) && finite(y)) {
            return;
        }
        let p = Point::new(x, y);
        if self.current.is_none() {
            self.move_to(x, y);
            return;
        }
        self.bez.line_to(p);
        self.current = Some(p);
    }

    /// Appends a quadratic Bézier curve using one control point.
    pub fn quadratic_curve_to(&mut self, cx: f64, cy: f64, x: f64, y: f64) {
        if !(finite(cx) && finite(cy) && finite(x) && finite(y)) {
            return;
        }
        if self.current.is_none() {
            self.move_to(cx, cy);
        }
        self.bez.quad_to(Point::new(cx, cy), Point::new(x, y));
        self.current = Some(Point::new(x, y));
    }

    /// Appends a cubic Bézier curve using two control points.
    pub fn bezier_curve_to(&mut self, c1x: f64, c1y: f64, c2x: f64, c2y: f64, x: f64, y: f64) {
        if !(finite(c1x) && finite(c1y) && finite(c2x) && finite(c2y) && finite(x) && finite(y)) {
            return;
        }
        if self.current.is_none() {
            self.move_to(c1x, c1y);
        }
        self.bez
            .curve_to(Point::new(c1x, c1y), Point::new(c2x, c2y), Point::new(x, y));
        self.current = Some(Point::new(x, y));
    }

    /// Closes the current subpath and starts a new one at its start point.
    pub fn close_path(&mut self) {
        if self.current.is_none() {
            return;
        }
        self.bez.close_path();
        if let Some(start) = self.subpath_start {
            self.current = Some(start);
            self.subpath_start = Some(start);
        }
    }

    /// Appends an axis-aligned rectangle as a new closed subpath
    /// (`moveTo`+3×`lineTo`+`closePath`).
    pub fn rect(&mut self, x: f64, y: f64, w: f64, h: f64) {
        if !(finite(x) && finite(y) && finite(w) && finite(h)) {
            return;
        }
        self.move_to(x, y);
        self.line_to(x + w, y);
        self.line_to(x + w, y + h);
        self.line_to(x, y + h);
        self.close_path();
    }

    /// Appends a circular arc, normalizing the angle sweep per §4.1: for
    /// `ccw=false` the effective sweep is `min(a1 - a0 mod 2*pi, 2*pi)`; for
    /// `ccw=true` the sweep runs the other way. A full `2*pi` sweep is
    /// preserved rather than collapsed to zero.
    pub fn arc(&mut self, cx: f64, cy: f64, r: f64, a0: f64, a1: f64, ccw: bool) {
        self.ellipse(cx, cy, r, r, 0.0, a0, a1, ccw);
    }

    /// Appends an elliptical arc with an ellipse rotation, using the same
    /// angle-sweep normalization as [`Self::arc`].
    #[allow(clippy::too_many_arguments)]
    pub fn ellipse(&mut self, cx: f64, cy: f64, rx: f64, ry: f64, rot: f64, a0: f64, a1: f64, ccw: bool) {
        if !(finite(cx) && finite(cy) && finite(rx) && finite(ry) && finite(rot) && finite(a0) && finite(a1))
            || rx < 0.0
            || ry < 0.0
        {
            return;
        }

        let sweep = normalize_sweep(a0, a1, ccw);
        let start = ellipse_point(cx, cy, rx, ry, rot, a0);

        if self.current.is_some() {
            self.line_to(start.x, start.y);
        } else {
            self.move_to(start.x, start.y);
        }

        if sweep.abs() < 1e-12 {
            return;
        }

        for (a_start, a_end) in arc_segments(a0, sweep) {
            let p0 = ellipse_point(cx, cy, rx, ry, rot, a_start);
            let p1 = ellipse_point(cx, cy, rx, ry, rot, a_end);
            let (c1, c2) = ellipse_cubic_controls(cx, cy, rx, ry, rot, a_start, a_end);
            debug_assert!(vlen(p0 - self.current.unwrap_or(p0)) < 1e-6 + rx.max(ry) * 1e-6);
            self.bez.curve_to(c1, c2, p1);
            self.current = Some(p1);
        }
    }

    /// Appends a tangent-arc segment per the HTML5 Canvas `arcTo` contract:
    /// degenerates to a `lineTo(x1, y1)` when `r == 0` or the two implied
    /// segments are collinear; otherwise emits a `lineTo` to the first
    /// tangent point followed by an arc to the second.
    pub fn arc_to(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, r: f64) {
        if !(finite(x1) && finite(y1) && finite(x2) && finite(y2) && finite(r)) || r < 0.0 {
            return;
        }
        let Some(p0) = self.current else {
            self.move_to(x1, y1);
            return;
        };
        let p1 = Point::new(x1, y1);
        let p2 = Point::new(x2, y2);

        let v01 = p0 - p1;
        let v21 = p2 - p1;
        let len01 = vlen(v01);
        let len21 = vlen(v21);

        if r == 0.0 || len01 < 1e-12 || len21 < 1e-12 {
            self.line_to(x1, y1);
            return;
        }

        let u01 = v01 / len01;
        let u21 = v21 / len21;
        let cos_theta = (u01.x * u21.x + u01.y * u21.y).clamp(-1.0, 1.0);
        let sin_half = ((1.0 - cos_theta) / 2.0).max(0.0).sqrt();
        if sin_half < 1e-9 {
            // Collinear (theta ~ 0 or ~pi): degenerate to a line to p1.
            self.line_to(x1, y1);
            return;
        }

        // Distance from p1 to each tangent point, along u01/u21: the classic
        // `r / tan(theta/2)` construction.
        let half_angle = sin_half.asin();
        let tan_half = half_angle.tan();
        let dist = if tan_half.abs() > 1e-12 { r / tan_half } else { 0.0 };
        let dist = dist.min(len01).min(len21);

        let tangent1 = p1 + u01 * dist;
        let tangent2 = p1 + u21 * dist;

        self.line_to(tangent1.x, tangent1.y);

        // Determine the arc center: it lies along the interior bisector at
        // distance r / sin(theta/2) from p1.
        let bisector = vlen(u01 + u21);
        if bisector < 1e-12 {
            self.line_to(tangent2.x, tangent2.y);
            return;
        }
        let bis_dir = (u01 + u21) / bisector;
        let center_dist = r / sin_half.max(1e-12);
        let center = p1 + bis_dir * center_dist;

        let start_angle = (tangent1.y - center.y).atan2(tangent1.x - center.x);
        let end_angle = (tangent2.y - center.y).atan2(tangent2.x - center.x);

        // The short way around: determine sweep sign from the cross product
        // of u01 and u21 (orientation of the turn at p1).
        let cross = u01.x * u21.y - u01.y * u21.x;
        let ccw = cross > 0.0;
        let sweep = normalize_sweep(start_angle, end_angle, ccw);

        for (a_start, a_end) in arc_segments(start_angle, sweep) {
            let p_end = Point::new(
                center.x + r * a_end.cos(),
                center.y + r * a_end.sin(),
            );
            let (c1, c2) = ellipse_cubic_controls(center.x, center.y, r, r, 0.0, a_start, a_end);
            self.bez.curve_to(c1, c2, p_end);
            self.current = Some(p_end);
        }
    }

    /// Converts the path built so far to a [`kurbo::BezPath`] (user space).
    pub fn to_bez_path(&self) -> BezPath {
        self.bez.clone()
    }

    /// Converts the path built so far to a [`PathDesc`], ready to be
    /// registered as a resource and consumed by a draw operation.
    pub fn to_path_desc(&self) -> PathDesc {
        bez_path_to_path_desc(&self.bez)
    }
}

/// Converts an arbitrary [`kurbo::BezPath`] (e.g. an externally constructed
/// path object) into a [`PathDesc`]. The source path is not mutated.
pub fn bez_path_to_path_desc(path: &BezPath) -> PathDesc {
    let mut commands = Vec::with_capacity(path.elements().len());
    for el in path.elements() {
        let cmd = match *el {
            PathEl::MoveTo(p) => PathCmd::MoveTo { x: p.x as f32, y: p.y as f32 },
            PathEl::LineTo(p) => PathCmd::LineTo { x: p.x as f32, y: p.y as f32 },
            PathEl::QuadTo(c, p) => PathCmd::QuadTo {
                x1: c.x as f32,
                y1: c.y as f32,
                x: p.x as f32,
                y: p.y as f32,
            },
            PathEl::CurveTo(c1, c2, p) => PathCmd::CurveTo {
                x1: c1.x as f32,
                y1: c1.y as f32,
                x2: c2.x as f32,
                y2: c2.y as f32,
                x: p.x as f32,
                y: p.y as f32,
            },
            PathEl::ClosePath => PathCmd::Close,
        };
        commands.push(cmd);
    }
    PathDesc { commands: commands.into_boxed_slice() }
}

fn ellipse_point(cx: f64, cy: f64, rx: f64, ry: f64, rot: f64, angle: f64) -> Point {
    let (sin_rot, cos_rot) = (rot.sin(), rot.cos());
    let x = rx * angle.cos();
    let y = ry * angle.sin();
    Point::new(cx + x * cos_rot - y * sin_rot, cy + x * sin_rot + y * cos_rot)
}

/// Cubic Bézier control points approximating an elliptical arc segment
/// spanning at most one quadrant, using the standard `kappa` magic-number
/// construction (`kappa = 4/3 * tan(sweep/4)`).
fn ellipse_cubic_controls(
    cx: f64,
    cy: f64,
    rx: f64,
    ry: f64,
    rot: f64,
    a0: f64,
    a1: f64,
) -> (Point, Point) {
    let sweep = a1 - a0;
    let alpha = (4.0 / 3.0) * (sweep / 4.0).tan();

    let (sin_rot, cos_rot) = (rot.sin(), rot.cos());
    let transform = |x: f64, y: f64| -> Point {
        Point::new(cx + x * cos_rot - y * sin_rot, cy + x * sin_rot + y * cos_rot)
    };

    let (x0, y0) = (rx * a0.cos(), ry * a0.sin());
    let (x1, y1) = (rx * a1.cos(), ry * a1.sin());
    let (dx0, dy0) = (-rx * a0.sin(), ry * a0.cos());
    let (dx1, dy1) = (-rx * a1.sin(), ry * a1.cos());

    let c1 = transform(x0 + alpha * dx0, y0 + alpha * dy0);
    let c2 = transform(x1 - alpha * dx1, y1 - alpha * dy1);
    (c1, c2)
}

/// Splits an arc of total `sweep` (signed, starting at `a0`) into segments
/// of at most `PI / 2` each, so each segment's cubic-Bézier approximation
/// stays within the spec's chord-to-arc error tolerance.
fn arc_segments(a0: f64, sweep: f64) -> Vec<(f64, f64)> {
    let max_seg = PI / 2.0;
    let count = ((sweep.abs() / max_seg).ceil() as usize).max(1);
    let step = sweep / count as f64;
    let mut out = Vec::with_capacity(count);
    let mut a = a0;
    for _ in 0..count {
        out.push((a, a + step));
        a += step;
    }
    out
}

/// Normalizes an `(a0, a1, ccw)` angle range to a signed sweep per §4.1: for
/// `ccw=false`, sweep is in `[0, 2*pi]` (increasing angle); for `ccw=true`,
/// sweep is in `[-2*pi, 0]` (decreasing angle). A full circle is preserved.
fn normalize_sweep(a0: f64, a1: f64, ccw: bool) -> f64 {
    const TAU: f64 = 2.0 * PI;
    if ccw {
        let mut d = (a0 - a1).rem_euclid(TAU);
        if d == 0.0 && a0 != a1 {
            d = TAU;
        }
        -d
    } else {
        let mut d = (a1 - a0).rem_euclid(TAU);
        if d == 0.0 && a0 != a1 {
            d = TAU;
        }
        d
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn move_then_line_builds_two_elements() {
        let mut p = CanvasPath::new();
        p.move_to(0.0, 0.0);
        p.line_to(10.0, 0.0);
        assert_eq!(p.to_bez_path().elements().len(), 2);
        assert_eq!(p.current_point(), Some(Point::new(10.0, 0.0)));
    }

    #[test]
    fn non_finite_args_are_ignored() {
        let mut p = CanvasPath::new();
        p.move_to(0.0, 0.0);
        p.line_to(f64::NAN, 1.0);
        p.line_to(f64::INFINITY, 1.0);
        assert_eq!(p.to_bez_path().elements().len(), 1);
        assert_eq!(p.current_point(), Some(Point::new(0.0, 0.0)));
    }

    #[test]
    fn close_path_resets_current_to_subpath_start() {
        let mut p = CanvasPath::new();
        p.move_to(0.0, 0.0);
        p.line_to(10.0, 0.0);
        p.line_to(10.0, 10.0);
        p.close_path();
        assert_eq!(p.current_point(), Some(Point::new(0.0, 0.0)));
    }

    #[test]
    fn rect_emits_closed_subpath() {
        let mut p = CanvasPath::new();
        p.rect(1.0, 2.0, 3.0, 4.0);
        let bez = p.to_bez_path();
        assert_eq!(bez.elements().len(), 5); // move + 3 lines + close
    }

    #[test]
    fn full_circle_sweep_is_not_collapsed() {
        let mut p = CanvasPath::new();
        p.arc(0.0, 0.0, 10.0, 0.0, 2.0 * PI, false);
        let bez = p.to_bez_path();
        // A full sweep is split into >= 4 quadrant segments plus the
        // leading move-to, each a CurveTo.
        assert!(bez.elements().len() >= 5);
    }

    #[test]
    fn arc_to_degenerates_to_line_when_radius_zero() {
        let mut p = CanvasPath::new();
        p.move_to(0.0, 0.0);
        p.arc_to(10.0, 0.0, 10.0, 10.0, 0.0);
        let bez = p.to_bez_path();
        assert_eq!(bez.elements().len(), 2);
        assert_eq!(p.current_point(), Some(Point::new(10.0, 0.0)));
    }

    #[test]
    fn arc_to_collinear_degenerates_to_line() {
        let mut p = CanvasPath::new();
        p.move_to(0.0, 0.0);
        // (0,0) -> (5,0) -> (10,0): collinear.
        p.arc_to(5.0, 0.0, 10.0, 0.0, 2.0);
        let bez = p.to_bez_path();
        assert_eq!(bez.elements().len(), 2);
    }

    #[test]
    fn arc_to_with_radius_produces_tangent_line_and_arc() {
        let mut p = CanvasPath::new();
        p.move_to(0.0, 0.0);
        p.arc_to(10.0, 0.0, 10.0, 10.0, 2.0);
        let bez = p.to_bez_path();
        // move + lineTo(tangent1) + at least one curveTo.
        assert!(bez.elements().len() >= 3);
    }

    #[test]
    fn bez_path_to_path_desc_round_trips_commands() {
        let mut p = CanvasPath::new();
        p.move_to(0.0, 0.0);
        p.line_to(1.0, 1.0);
        p.close_path();
        let desc = p.to_path_desc();
        assert_eq!(desc.commands.len(), 3);
    }
}
