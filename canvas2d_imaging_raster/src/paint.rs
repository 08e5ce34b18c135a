// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Paint evaluation: turns a [`PaintDesc`] plus a query point into a color.
//!
//! Solid paints are a direct lookup. Gradients resolve a local-space
//! coordinate to a position along the gradient (the projection for
//! `Linear`, the two-circle interpolation parameter for `Radial`, the
//! angle fraction for `Sweep`), apply the gradient's [`Extend`] mode, and
//! interpolate the two bracketing [`peniko::ColorStop`]s in straight sRGB.
//! Image patterns resample the paint's own embedded pixels (a pattern
//! captures its source image at `createPattern` time, independent of any
//! `ImageId` used elsewhere), repeating per axis via the sampler's extend
//! settings.

extern crate alloc;

use canvas2d_imaging::{Affine, Color, Extend, ImageQuality, PaintDesc};
#[cfg(not(feature = "std"))]
use kurbo::common::FloatFuncs as _;
use kurbo::Point;
use peniko::{ColorStop, Gradient, GradientKind};

/// Evaluates `paint` at local-space point `p`, where `p` has already been
/// mapped through the inverse of the combined shape/paint transform (i.e.
/// `p` is in the same space the gradient/pattern geometry was specified
/// in).
pub fn eval_paint(paint: &PaintDesc, p: Point) -> Color {
    match &paint.brush {
        peniko::Brush::Solid(color) => *color,
        peniko::Brush::Gradient(gradient) => eval_gradient(gradient, p),
        peniko::Brush::Image(image) => eval_pattern(image, p),
    }
}

fn apply_extend(t: f64, extend: Extend) -> f64 {
    match extend {
        Extend::Pad => t.clamp(0.0, 1.0),
        Extend::Repeat => t - t.floor(),
        Extend::Reflect => {
            let t = t.abs();
            let period = t.rem_euclid(2.0);
            if period > 1.0 { 2.0 - period } else { period }
        }
    }
}

fn eval_gradient(gradient: &Gradient, p: Point) -> Color {
    let t = match gradient.kind {
        GradientKind::Linear(pos) => linear_t(pos.start, pos.end, p),
        GradientKind::Radial(pos) => radial_t(
            pos.start_center,
            f64::from(pos.start_radius),
            pos.end_center,
            f64::from(pos.end_radius),
            p,
        ),
        GradientKind::Sweep(pos) => sweep_t(
            pos.center,
            f64::from(pos.start_angle),
            f64::from(pos.end_angle),
            p,
        ),
    };

    let t = apply_extend(t, gradient.extend);
    sample_stops(gradient.stops.as_slice(), t)
}

fn linear_t(start: Point, end: Point, p: Point) -> f64 {
    let dx = end.x - start.x;
    let dy = end.y - start.y;
    let len_sq = dx * dx + dy * dy;
    if len_sq < 1e-12 {
        return 0.0;
    }
    ((p.x - start.x) * dx + (p.y - start.y) * dy) / len_sq
}

/// Two-circle radial gradient parameterization: finds `t` such that `p`
/// lies on the circle interpolated between the start and end circles at
/// parameter `t`, preferring the larger root (matching the canonical
/// "radial gradient" ray-circle solve used by CSS/Canvas implementations).
fn radial_t(c0: Point, r0: f64, c1: Point, r1: f64, p: Point) -> f64 {
    let dcx = c1.x - c0.x;
    let dcy = c1.y - c0.y;
    let dr = r1 - r0;

    let pcx = p.x - c0.x;
    let pcy = p.y - c0.y;

    let a = dcx * dcx + dcy * dcy - dr * dr;
    let b = 2.0 * (pcx * dcx + pcy * dcy + r0 * dr);
    let c = pcx * pcx + pcy * pcy - r0 * r0;

    if a.abs() < 1e-9 {
        if b.abs() < 1e-12 {
            return 0.0;
        }
        return c / b;
    }

    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return 0.0;
    }
    let sqrt_disc = disc.sqrt();
    let t0 = (-b + sqrt_disc) / (2.0 * a);
    let t1 = (-b - sqrt_disc) / (2.0 * a);

    // Prefer the root with positive effective radius, the larger one if
    // both qualify.
    let valid = |t: f64| r0 + t * dr >= 0.0;
    match (valid(t0), valid(t1)) {
        (true, true) => t0.max(t1),
        (true, false) => t0,
        (false, true) => t1,
        (false, false) => 0.0,
    }
}

fn sweep_t(center: Point, start_angle: f64, end_angle: f64, p: Point) -> f64 {
    let dx = p.x - center.x;
    let dy = p.y - center.y;
    let angle = dy.atan2(dx);
    let span = end_angle - start_angle;
    if span.abs() < 1e-9 {
        return 0.0;
    }
    let mut a = angle - start_angle;
    let two_pi = 2.0 * core::f64::consts::PI;
    a = a.rem_euclid(two_pi);
    let mut span_norm = span.rem_euclid(two_pi);
    if span_norm == 0.0 {
        span_norm = two_pi;
    }
    a / span_norm
}

fn sample_stops(stops: &[ColorStop], t: f64) -> Color {
    if stops.is_empty() {
        return Color::TRANSPARENT;
    }
    if stops.len() == 1 {
        return stops[0].color.to_alpha_color::<peniko::color::Srgb>();
    }

    let t = t as f32;
    if t <= stops[0].offset {
        return stops[0].color.to_alpha_color::<peniko::color::Srgb>();
    }
    let last = &stops[stops.len() - 1];
    if t >= last.offset {
        return last.color.to_alpha_color::<peniko::color::Srgb>();
    }

    for w in stops.windows(2) {
        let (a, b) = (&w[0], &w[1]);
        if t >= a.offset && t <= b.offset {
            let span = (b.offset - a.offset).max(1e-6);
            let frac = (t - a.offset) / span;
            return lerp_color(
                a.color.to_alpha_color::<peniko::color::Srgb>(),
                b.color.to_alpha_color::<peniko::color::Srgb>(),
                frac,
            );
        }
    }

    last.color.to_alpha_color::<peniko::color::Srgb>()
}

fn lerp_color(a: Color, b: Color, t: f32) -> Color {
    let mut out = [0.0_f32; 4];
    for i in 0..4 {
        out[i] = a.components[i] + (b.components[i] - a.components[i]) * t;
    }
    Color::new(out)
}

fn eval_pattern(image: &peniko::Image, p: Point) -> Color {
    let width = image.image.width;
    let height = image.image.height;
    if width == 0 || height == 0 {
        return Color::TRANSPARENT;
    }

    let u = apply_extend(p.x / f64::from(width), image.sampler.x_extend);
    let v = apply_extend(p.y / f64::from(height), image.sampler.y_extend);

    let px = (u * f64::from(width)).clamp(0.0, f64::from(width) - 1.0);
    let py = (v * f64::from(height)).clamp(0.0, f64::from(height) - 1.0);

    match image.sampler.quality {
        ImageQuality::Low => sample_nearest(image.image.data.as_ref(), width, height, px, py),
        _ => sample_bilinear(image.image.data.as_ref(), width, height, px, py),
    }
}

pub(crate) fn pixel_at(data: &[u8], width: u32, x: u32, y: u32) -> Color {
    let idx = (y as usize * width as usize + x as usize) * 4;
    let Some(bytes) = data.get(idx..idx + 4) else {
        return Color::TRANSPARENT;
    };
    Color::new([
        f32::from(bytes[0]) / 255.0,
        f32::from(bytes[1]) / 255.0,
        f32::from(bytes[2]) / 255.0,
        f32::from(bytes[3]) / 255.0,
    ])
}

pub(crate) fn sample_nearest(data: &[u8], width: u32, height: u32, px: f64, py: f64) -> Color {
    let x = (px.round() as i64).clamp(0, i64::from(width) - 1) as u32;
    let y = (py.round() as i64).clamp(0, i64::from(height) - 1) as u32;
    pixel_at(data, width, x, y)
}

pub(crate) fn sample_bilinear(data: &[u8], width: u32, height: u32, px: f64, py: f64) -> Color {
    let x0 = px.floor().clamp(0.0, f64::from(width) - 1.0) as u32;
    let y0 = py.floor().clamp(0.0, f64::from(height) - 1.0) as u32;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let fx = (px - f64::from(x0)) as f32;
    let fy = (py - f64::from(y0)) as f32;

    let c00 = pixel_at(data, width, x0, y0);
    let c10 = pixel_at(data, width, x1, y0);
    let c01 = pixel_at(data, width, x0, y1);
    let c11 = pixel_at(data, width, x1, y1);

    let top = lerp_color(c00, c10, fx);
    let bottom = lerp_color(c01, c11, fx);
    lerp_color(top, bottom, fy)
}

/// Maps `device_point` into paint-local space via `inverse`, the inverse of
/// `ctm * paint_xf`. The caller inverts that product once per draw and
/// reuses it across every sampled pixel, rather than re-inverting per pixel.
#[inline]
pub fn invert_for_paint(inverse: Affine, device_point: Point) -> Point {
    inverse * device_point
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvas2d_imaging::PaintDesc;
    use peniko::{Brush, ColorStop, Extend, Gradient, GradientKind, LinearGradientPosition};

    #[test]
    fn solid_paint_is_constant() {
        let paint = PaintDesc { brush: Brush::Solid(Color::new([1.0, 0.0, 0.0, 1.0])) };
        let c = eval_paint(&paint, Point::new(5.0, 5.0));
        assert_eq!(c.components, [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn linear_gradient_interpolates_along_axis() {
        let mut gradient = Gradient {
            kind: GradientKind::Linear(LinearGradientPosition {
                start: Point::new(0.0, 0.0),
                end: Point::new(10.0, 0.0),
            }),
            extend: Extend::Pad,
            ..Default::default()
        };
        gradient.stops.push(ColorStop::from((0.0, Color::new([0.0, 0.0, 0.0, 1.0]))));
        gradient.stops.push(ColorStop::from((1.0, Color::new([1.0, 1.0, 1.0, 1.0]))));

        let paint = PaintDesc { brush: Brush::Gradient(gradient) };

        let start = eval_paint(&paint, Point::new(0.0, 0.0));
        let mid = eval_paint(&paint, Point::new(5.0, 0.0));
        let end = eval_paint(&paint, Point::new(10.0, 0.0));

        assert!(start.components[0] < 0.01);
        assert!((mid.components[0] - 0.5).abs() < 0.05);
        assert!(end.components[0] > 0.99);
    }

    #[test]
    fn pad_extend_clamps_past_gradient_ends() {
        let mut gradient = Gradient {
            kind: GradientKind::Linear(LinearGradientPosition {
                start: Point::new(0.0, 0.0),
                end: Point::new(10.0, 0.0),
            }),
            extend: Extend::Pad,
            ..Default::default()
        };
        gradient.stops.push(ColorStop { offset: 0.0, color: Color::new([0.0, 0.0, 0.0, 1.0]).into() });
        gradient.stops.push(ColorStop { offset: 1.0, color: Color::new([1.0, 1.0, 1.0, 1.0]).into() });
        let paint = PaintDesc { brush: Brush::Gradient(gradient) };

        let before = eval_paint(&paint, Point::new(-100.0, 0.0));
        let after = eval_paint(&paint, Point::new(100.0, 0.0));
        assert!(before.components[0] < 0.01);
        assert!(after.components[0] > 0.99);
    }

    #[test]
    fn invert_for_paint_applies_the_given_inverse() {
        let ctm = Affine::translate((10.0, 0.0)) * Affine::scale(2.0);
        let local = invert_for_paint(ctm.inverse(), Point::new(14.0, 0.0));
        assert!((local.x - 2.0).abs() < 1e-9);
    }
}
