// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Polygon scanline rasterizer with analytic coverage antialiasing.
//!
//! Edges are accumulated into a signed-area buffer (one cell per pixel),
//! following the same accumulation-buffer technique used by several pure
//! Rust vector rasterizers: each edge contributes a signed delta to the
//! pixels it crosses, exact to sub-pixel precision, and a left-to-right
//! running sum across each row turns those deltas into per-pixel winding
//! numbers. This gives "trapezoidal" analytic AA without supersampling.
//!
//! `fill()` always operates on implicitly closed subpaths (per the Canvas 2D
//! fill contract: an open subpath is closed with a straight edge back to its
//! start before filling). The caller is responsible for passing a polyline
//! set to match that contract; [`crate::flatten::Polyline::closed`] is
//! informational only here and does not gate whether a subpath is closed for
//! filling.

extern crate alloc;

use crate::flatten::Polyline;
use alloc::vec;
use alloc::vec::Vec;
use canvas2d_imaging::FillRule;
use kurbo::Point;

/// Per-pixel coverage in `[0.0, 1.0]`, row-major, `width * height` cells.
#[derive(Clone, Debug)]
pub struct CoverageMask {
    /// Mask width in pixels.
    pub width: usize,
    /// Mask height in pixels.
    pub height: usize,
    /// Coverage values, row-major, one per pixel.
    pub coverage: Vec<f32>,
}

impl CoverageMask {
    /// Creates a fully-transparent (all-zero) mask of the given size.
    pub fn empty(width: usize, height: usize) -> Self {
        Self { width, height, coverage: vec![0.0; width * height] }
    }

    /// Returns the coverage at `(x, y)`, or `0.0` outside bounds.
    #[inline]
    pub fn get(&self, x: i64, y: i64) -> f32 {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return 0.0;
        }
        self.coverage[y as usize * self.width + x as usize]
    }

    /// Returns the exclusive-end `(x0, y0, x1, y1)` bounding box of every
    /// pixel with nonzero coverage, or `None` if the mask is entirely empty.
    ///
    /// Lets compositing skip evaluating the source paint outside the shape
    /// for operators that only touch pixels the shape covers.
    pub fn bounds(&self) -> Option<(usize, usize, usize, usize)> {
        let mut min_x = self.width;
        let mut min_y = self.height;
        let mut max_x = 0;
        let mut max_y = 0;
        let mut any = false;
        for y in 0..self.height {
            let row = y * self.width;
            for x in 0..self.width {
                if self.coverage[row + x] > 0.0 {
                    any = true;
                    min_x = min_x.min(x);
                    max_x = max_x.max(x + 1);
                    min_y = min_y.min(y);
                    max_y = max_y.max(y + 1);
                }
            }
        }
        any.then_some((min_x, min_y, max_x, max_y))
    }
}

/// Accumulation-buffer edge rasterizer.
///
/// The accumulation buffer has `width + 1` cells per row: an edge can
/// deposit a fractional contribution one cell past the last fully-covered
/// pixel, which the final left-to-right prefix sum folds back in.
struct Accumulator {
    width: usize,
    height: usize,
    a: Vec<f32>,
}

impl Accumulator {
    fn new(width: usize, height: usize) -> Self {
        Self { width, height, a: vec![0.0; (width + 1) * height] }
    }

    /// Adds the signed-area contribution of one edge from `p0` to `p1`
    /// (device pixel coordinates, y-down). Horizontal edges contribute
    /// nothing, matching the scanline rasterization convention that only
    /// edges crossing a change in `y` affect winding.
    fn add_edge(&mut self, p0: Point, p1: Point) {
        if (p0.y - p1.y).abs() < 1e-9 {
            return;
        }

        let (dir, p0, p1) = if p0.y < p1.y { (1.0_f32, p0, p1) } else { (-1.0_f32, p1, p0) };
        let dxdy = (p1.x - p0.x) / (p1.y - p0.y);

        let y_top = p0.y.max(0.0);
        let y_bot = p1.y.min(self.height as f64);
        if y_top >= y_bot {
            return;
        }

        let mut x = p0.x + (y_top - p0.y) * dxdy;
        let y_start = y_top.floor() as usize;
        let y_end = y_bot.ceil() as usize;

        for y in y_start..y_end.min(self.height) {
            let row_y0 = (y as f64).max(y_top);
            let row_y1 = ((y + 1) as f64).min(y_bot);
            if row_y1 <= row_y0 {
                continue;
            }
            let dy = (row_y1 - row_y0) as f32;
            let x_next = x + dxdy * (row_y1 - row_y0);

            self.add_row_span(y, x as f32, x_next as f32, dy * dir);
            x = x_next;
        }
    }

    /// Deposits the signed area of a trapezoid spanning `[x0, x1)` (in
    /// either order) at row height `d` (already signed) into row `y`.
    ///
    /// Ported from the accumulation technique shared by several pure-Rust
    /// analytic-AA rasterizers: each affected cell receives the exact
    /// fraction of `d` proportional to the trapezoid's area over that
    /// cell's column.
    fn add_row_span(&mut self, y: usize, xa: f32, xb: f32, d: f32) {
        let row = y * (self.width + 1);
        let width = self.width as f32;
        let x0 = xa.min(xb).clamp(0.0, width);
        let x1 = xa.max(xb).clamp(0.0, width);

        let x0floor = x0.floor();
        let x0i = x0floor as usize;
        let x1ceil = x1.ceil();
        let x1i = x1ceil as usize;

        if x1i <= x0i + 1 {
            let xmf = 0.5 * (xa + xb) - x0floor;
            self.a[row + x0i] += d - d * xmf;
            if row + x0i + 1 < self.a.len() {
                self.a[row + x0i + 1] += d * xmf;
            }
            return;
        }

        let s = (x1 - x0).recip();
        let x0f = x0 - x0floor;
        let a0 = s * (1.0 - x0f);
        let x1f = x1 - x1ceil + 1.0;
        let am = s * x1f * x1f;

        self.a[row + x0i] += d * a0 * a0;

        if x1i == x0i + 2 {
            self.a[row + x0i + 1] += d * (1.0 - a0 * a0 - am);
        } else {
            let a1 = s * (1.5 - x0f);
            self.a[row + x0i + 1] += d * (a0 + a1);
            for xi in (x0i + 2)..(x1i - 1) {
                self.a[row + xi] += d * s;
            }
            let a2 = a1 + (x1i - x0i - 3) as f32 * s;
            self.a[row + x1i - 1] += d * (s - a2 - am);
        }

        self.a[row + x1i] += d * am;
    }

    /// Folds the accumulation buffer into per-pixel winding numbers via a
    /// left-to-right running sum over each row.
    fn into_windings(self) -> Vec<f32> {
        let mut out = vec![0.0_f32; self.width * self.height];
        for y in 0..self.height {
            let row_in = y * (self.width + 1);
            let row_out = y * self.width;
            let mut acc = 0.0_f32;
            for x in 0..self.width {
                acc += self.a[row_in + x];
                out[row_out + x] = acc;
            }
        }
        out
    }
}

/// Rasterizes a set of polylines (already in device pixel space) into a
/// [`CoverageMask`] using the given fill rule. Open polylines are treated as
/// implicitly closed, matching the Canvas 2D `fill()` contract.
pub fn rasterize(polylines: &[Polyline], width: usize, height: usize, fill_rule: FillRule) -> CoverageMask {
    if width == 0 || height == 0 {
        return CoverageMask::empty(width, height);
    }

    let mut acc = Accumulator::new(width, height);

    for poly in polylines {
        if poly.points.len() < 2 {
            continue;
        }
        for w in poly.points.windows(2) {
            acc.add_edge(w[0], w[1]);
        }
        let first = poly.points[0];
        let last = *poly.points.last().expect("checked len >= 2");
        let d = first - last;
        if d.x * d.x + d.y * d.y > 1e-18 {
            acc.add_edge(last, first);
        }
    }

    let windings = acc.into_windings();
    let coverage = windings
        .into_iter()
        .map(|w| fold_winding(w, fill_rule))
        .collect();

    CoverageMask { width, height, coverage }
}

#[inline]
fn fold_winding(w: f32, fill_rule: FillRule) -> f32 {
    match fill_rule {
        FillRule::NonZero => w.abs().min(1.0),
        FillRule::EvenOdd => {
            let m = w.abs().rem_euclid(2.0);
            if m > 1.0 { 2.0 - m } else { m }
        }
    }
}
