// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Stroke expansion: turns a centerline path plus line state into a
//! fillable outline.
//!
//! Rather than hand-rolling offset curves, joins, caps, miter-limit
//! fallback, and dashing, this module leans entirely on
//! [`canvas2d_imaging::stroke_outline`] (itself a thin wrapper over
//! [`kurbo::stroke`]): `kurbo::Stroke` already models width, cap, join,
//! miter limit, and dash pattern/offset as exactly the fields Canvas 2D's
//! line-state attributes expose. The resulting outline is just another
//! path, so it is rasterized by the same [`crate::raster`] pipeline used
//! for `fill()` -- stroking and filling share one rasterizer.

extern crate alloc;

use canvas2d_imaging::{stroke_outline, StrokeStyle};
use kurbo::BezPath;

/// Expands `path` into a fillable outline using `style`, at the given
/// flattening tolerance (device space, matching [`crate::flatten::flatten`]
/// tolerance conventions).
///
/// A stroke width of zero or less produces an empty outline: Canvas 2D
/// treats a non-positive `lineWidth` as "nothing is drawn" rather than an
/// error.
pub fn stroke_to_fill(path: &BezPath, style: &StrokeStyle, tolerance: f64) -> BezPath {
    if style.width <= 0.0 {
        return BezPath::new();
    }
    stroke_outline(path, style, tolerance)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_width_stroke_is_empty() {
        let mut p = BezPath::new();
        p.move_to((0.0, 0.0));
        p.line_to((10.0, 0.0));
        let style = StrokeStyle::new(0.0);
        let outline = stroke_to_fill(&p, &style, 0.25);
        assert!(outline.elements().is_empty());
    }

    #[test]
    fn straight_segment_produces_nonempty_outline() {
        let mut p = BezPath::new();
        p.move_to((0.0, 0.0));
        p.line_to((10.0, 0.0));
        let style = StrokeStyle::new(2.0);
        let outline = stroke_to_fill(&p, &style, 0.25);
        assert!(!outline.elements().is_empty());
    }
}
