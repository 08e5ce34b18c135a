// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Adaptive curve flattening: reduces a [`BezPath`] to polylines the
//! rasterizer and stroker can consume directly.
//!
//! Quadratic and cubic segments are subdivided recursively (de Casteljau, at
//! `t = 0.5`) until each subsegment's control points fall within `tolerance`
//! of the chord connecting its endpoints, the same flatness test used
//! elsewhere in the Rust ecosystem for vector-icon rasterization. A depth
//! cap bounds recursion for degenerate curves (near-zero-length chords).

extern crate alloc;

use alloc::vec::Vec;
use kurbo::{Affine, BezPath, PathEl, Point};

/// Maximum recursion depth per curve; bounds work for pathological inputs
/// (e.g. a cubic whose control points coincide with its endpoints).
const MAX_DEPTH: u32 = 24;

/// One flattened subpath: a polyline plus whether the source subpath was
/// closed (`closePath`/an implicit close for filling purposes).
#[derive(Clone, Debug, Default)]
pub struct Polyline {
    /// Vertices in order; consecutive points are joined by straight edges.
    pub points: Vec<Point>,
    /// Whether the source subpath ended in an explicit `ClosePath`.
    pub closed: bool,
}

/// Flattens every subpath of `path` to polylines at the given tolerance.
///
/// `tolerance` is in the same coordinate space as `path`; callers that want
/// a fixed on-screen flatness (the spec's default of `<= 0.25` device
/// pixels) should flatten after transforming into device space.
pub fn flatten(path: &BezPath, tolerance: f64) -> Vec<Polyline> {
    let mut out = Vec::new();
    let mut current = Point::ZERO;
    let mut subpath_start = Point::ZERO;
    let mut active: Option<Polyline> = None;

    for el in path.elements() {
        match *el {
            PathEl::MoveTo(p) => {
                if let Some(poly) = active.take() {
                    if poly.points.len() > 1 {
                        out.push(poly);
                    }
                }
                active = Some(Polyline { points: alloc::vec![p], closed: false });
                current = p;
                subpath_start = p;
            }
            PathEl::LineTo(p) => {
                let poly = active.get_or_insert_with(|| Polyline { points: alloc::vec![current], closed: false });
                poly.points.push(p);
                current = p;
            }
            PathEl::QuadTo(c, p) => {
                let poly = active.get_or_insert_with(|| Polyline { points: alloc::vec![current], closed: false });
                flatten_quad(current, c, p, tolerance, 0, &mut poly.points);
                current = p;
            }
            PathEl::CurveTo(c1, c2, p) => {
                let poly = active.get_or_insert_with(|| Polyline { points: alloc::vec![current], closed: false });
                flatten_cubic(current, c1, c2, p, tolerance, 0, &mut poly.points);
                current = p;
            }
            PathEl::ClosePath => {
                if let Some(poly) = active.as_mut() {
                    poly.closed = true;
                    if poly.points.last().copied() != Some(subpath_start) {
                        poly.points.push(subpath_start);
                    }
                }
                current = subpath_start;
            }
        }
    }

    if let Some(poly) = active {
        if poly.points.len() > 1 {
            out.push(poly);
        }
    }

    out
}

/// Maps every point of `path` through `xf`, preserving subpath/segment
/// structure exactly (used to move a user-space path into device space
/// before flattening and rasterizing).
pub fn transform_path(path: &BezPath, xf: Affine) -> BezPath {
    let mut out = BezPath::new();
    for el in path.elements() {
        match *el {
            PathEl::MoveTo(p) => out.move_to(xf * p),
            PathEl::LineTo(p) => out.line_to(xf * p),
            PathEl::QuadTo(c, p) => out.quad_to(xf * c, xf * p),
            PathEl::CurveTo(c1, c2, p) => out.curve_to(xf * c1, xf * c2, xf * p),
            PathEl::ClosePath => out.close_path(),
        }
    }
    out
}

#[inline]
fn midpoint(a: Point, b: Point) -> Point {
    Point::new((a.x + b.x) * 0.5, (a.y + b.y) * 0.5)
}

fn flatten_quad(p0: Point, p1: Point, p2: Point, tolerance: f64, depth: u32, out: &mut Vec<Point>) {
    let mid = midpoint(p0, p2);
    let (dx, dy) = (p1.x - mid.x, p1.y - mid.y);
    let dist_sq = dx * dx + dy * dy;

    if depth >= MAX_DEPTH || dist_sq <= tolerance * tolerance {
        out.push(p2);
        return;
    }

    let q0 = midpoint(p0, p1);
    let q1 = midpoint(p1, p2);
    let r = midpoint(q0, q1);

    flatten_quad(p0, q0, r, tolerance, depth + 1, out);
    flatten_quad(r, q1, p2, tolerance, depth + 1, out);
}

fn flatten_cubic(
    p0: Point,
    p1: Point,
    p2: Point,
    p3: Point,
    tolerance: f64,
    depth: u32,
    out: &mut Vec<Point>,
) {
    // Flatness test: perpendicular distance of the two control points from
    // the chord p0->p3, via the cross product (twice the triangle area),
    // normalized by the chord length.
    let dx = p3.x - p0.x;
    let dy = p3.y - p0.y;
    let len_sq = dx * dx + dy * dy;

    let d1 = ((p1.x - p0.x) * dy - (p1.y - p0.y) * dx).abs();
    let d2 = ((p2.x - p0.x) * dy - (p2.y - p0.y) * dx).abs();

    let flat = if len_sq < 1e-12 {
        // Degenerate chord: fall back to control-point spread.
        let d1 = ((p1.x - p0.x).powi(2) + (p1.y - p0.y).powi(2)).sqrt();
        let d2 = ((p2.x - p3.x).powi(2) + (p2.y - p3.y).powi(2)).sqrt();
        d1.max(d2) <= tolerance
    } else {
        (d1 + d2) * (d1 + d2) <= tolerance * tolerance * len_sq
    };

    if depth >= MAX_DEPTH || flat {
        out.push(p3);
        return;
    }

    let m01 = midpoint(p0, p1);
    let m12 = midpoint(p1, p2);
    let m23 = midpoint(p2, p3);
    let m012 = midpoint(m01, m12);
    let m123 = midpoint(m12, m23);
    let m = midpoint(m012, m123);

    flatten_cubic(p0, m01, m012, m, tolerance, depth + 1, out);
    flatten_cubic(m, m123, m23, p3, tolerance, depth + 1, out);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn straight_line_stays_two_points() {
        let mut p = BezPath::new();
        p.move_to((0.0, 0.0));
        p.line_to((10.0, 0.0));
        let polys = flatten(&p, 0.25);
        assert_eq!(polys.len(), 1);
        assert_eq!(polys[0].points, alloc::vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0)]);
        assert!(!polys[0].closed);
    }

    #[test]
    fn quarter_circle_cubic_flattens_to_many_points() {
        // Standard kappa approximation of a quarter circle of radius 100.
        let k = 100.0 * 0.5522847498;
        let mut p = BezPath::new();
        p.move_to((100.0, 0.0));
        p.curve_to((100.0, k), (k, 100.0), (0.0, 100.0));
        let polys = flatten(&p, 0.1);
        assert_eq!(polys.len(), 1);
        assert!(polys[0].points.len() > 4);
        // Endpoints preserved.
        assert_eq!(polys[0].points[0], Point::new(100.0, 0.0));
        assert_eq!(*polys[0].points.last().unwrap(), Point::new(0.0, 100.0));
    }

    #[test]
    fn close_path_appends_start_point_and_marks_closed() {
        let mut p = BezPath::new();
        p.move_to((0.0, 0.0));
        p.line_to((10.0, 0.0));
        p.line_to((10.0, 10.0));
        p.close_path();
        let polys = flatten(&p, 0.25);
        assert_eq!(polys.len(), 1);
        assert!(polys[0].closed);
        assert_eq!(*polys[0].points.last().unwrap(), Point::new(0.0, 0.0));
    }

    #[test]
    fn multiple_subpaths_flatten_independently() {
        let mut p = BezPath::new();
        p.move_to((0.0, 0.0));
        p.line_to((1.0, 0.0));
        p.move_to((5.0, 5.0));
        p.line_to((6.0, 5.0));
        let polys = flatten(&p, 0.25);
        assert_eq!(polys.len(), 2);
    }

    #[test]
    fn transform_path_maps_every_point() {
        let mut p = BezPath::new();
        p.move_to((0.0, 0.0));
        p.line_to((1.0, 0.0));
        let moved = transform_path(&p, Affine::translate((10.0, 20.0)));
        let els = moved.elements();
        assert_eq!(els[0], PathEl::MoveTo(Point::new(10.0, 20.0)));
        assert_eq!(els[1], PathEl::LineTo(Point::new(11.0, 20.0)));
    }

    #[test]
    fn tighter_tolerance_yields_more_points() {
        let k = 100.0 * 0.5522847498;
        let mut p = BezPath::new();
        p.move_to((100.0, 0.0));
        p.curve_to((100.0, k), (k, 100.0), (0.0, 100.0));
        let coarse = flatten(&p, 5.0);
        let fine = flatten(&p, 0.01);
        assert!(fine[0].points.len() >= coarse[0].points.len());
    }
}
