// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The shadow stage: offsets and blurs a shape's coverage mask so it can be
//! composited beneath the shape itself.
//!
//! Per the non-goal in §1 ("no filter effects, shadows with arbitrary blur
//! kernels beyond a simple separable box/Gaussian"), blur is a three-pass
//! box blur, the standard cheap approximation of a Gaussian (three
//! convolutions with the same box width converge to a shape very close to a
//! true Gaussian, used widely in place of a real separable Gaussian kernel
//! when it isn't worth the extra coefficients). `shadowOffsetX/Y` and
//! `shadowBlur` are user-space quantities ([`canvas2d_imaging::ShadowDesc`]
//! documents them as such); [`device_offset`] and [`device_blur_radius`]
//! carry them into device space via the transform active at draw time,
//! before the mask is shifted and blurred.

extern crate alloc;

use crate::raster::CoverageMask;
use canvas2d_imaging::Affine;

/// Maps a user-space offset vector into device space via the linear part of
/// `xf` (translation does not apply to a vector).
pub fn device_offset(xf: Affine, offset_x: f32, offset_y: f32) -> (f64, f64) {
    let c = xf.as_coeffs();
    let (ox, oy) = (f64::from(offset_x), f64::from(offset_y));
    (c[0] * ox + c[2] * oy, c[1] * ox + c[3] * oy)
}

/// Maps a user-space blur radius into device space using the geometric mean
/// of `xf`'s area scale factor (a reasonable single-number approximation for
/// a possibly anisotropic transform).
pub fn device_blur_radius(xf: Affine, blur: f32) -> f32 {
    let c = xf.as_coeffs();
    let area_scale = (c[0] * c[3] - c[1] * c[2]).abs().sqrt();
    blur * area_scale as f32
}

/// Shifts `mask` by `(dx, dy)` device pixels, bilinearly resampling for
/// sub-pixel offsets. Pixels shifted in from outside the mask read as zero
/// coverage.
pub fn shift_mask(mask: &CoverageMask, dx: f64, dy: f64) -> CoverageMask {
    let (w, h) = (mask.width, mask.height);
    let mut out = CoverageMask::empty(w, h);
    for y in 0..h {
        for x in 0..w {
            let sx = x as f64 - dx;
            let sy = y as f64 - dy;
            out.coverage[y * w + x] = sample_bilinear(mask, sx, sy);
        }
    }
    out
}

fn sample_bilinear(mask: &CoverageMask, x: f64, y: f64) -> f32 {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = (x - x0) as f32;
    let fy = (y - y0) as f32;
    let (x0i, y0i) = (x0 as i64, y0 as i64);

    let c00 = mask.get(x0i, y0i);
    let c10 = mask.get(x0i + 1, y0i);
    let c01 = mask.get(x0i, y0i + 1);
    let c11 = mask.get(x0i + 1, y0i + 1);

    let top = c00 + (c10 - c00) * fx;
    let bottom = c01 + (c11 - c01) * fx;
    top + (bottom - top) * fy
}

/// One horizontal+vertical box blur pass of the given device-pixel radius.
/// A radius of `0` returns a clone of `mask` unchanged.
pub fn box_blur(mask: &CoverageMask, radius: usize) -> CoverageMask {
    if radius == 0 {
        return mask.clone();
    }
    let h = horizontal_pass(mask, radius);
    vertical_pass(&h, radius)
}

fn horizontal_pass(mask: &CoverageMask, radius: usize) -> CoverageMask {
    let (w, h) = (mask.width, mask.height);
    let mut out = CoverageMask::empty(w, h);
    let norm = (2 * radius + 1) as f32;
    let r = radius as i64;
    for y in 0..h {
        let mut acc = 0.0_f32;
        for x in -r..=r {
            acc += mask.get(x, y as i64);
        }
        for x in 0..w {
            out.coverage[y * w + x] = acc / norm;
            let add = x as i64 + r + 1;
            let sub = x as i64 - r;
            acc += mask.get(add, y as i64) - mask.get(sub, y as i64);
        }
    }
    out
}

fn vertical_pass(mask: &CoverageMask, radius: usize) -> CoverageMask {
    let (w, h) = (mask.width, mask.height);
    let mut out = CoverageMask::empty(w, h);
    let norm = (2 * radius + 1) as f32;
    let r = radius as i64;
    for x in 0..w {
        let mut acc = 0.0_f32;
        for y in -r..=r {
            acc += mask.get(x as i64, y);
        }
        for y in 0..h {
            out.coverage[y * w + x] = acc / norm;
            let add = y as i64 + r + 1;
            let sub = y as i64 - r;
            acc += mask.get(x as i64, add) - mask.get(x as i64, sub);
        }
    }
    out
}

/// Produces the shadow's coverage mask from the shape's own device-space
/// coverage: shift by `(offset_x, offset_y)` then run three box-blur passes
/// of `blur_radius` (already in device pixels; see [`device_blur_radius`]).
/// A `blur_radius` of `0` skips blurring, leaving a plain offset copy.
pub fn shadow_coverage(shape: &CoverageMask, offset_x: f64, offset_y: f64, blur_radius: f32) -> CoverageMask {
    let mut mask = shift_mask(shape, offset_x, offset_y);
    let radius = blur_radius.round().max(0.0) as usize;
    if radius > 0 {
        for _ in 0..3 {
            mask = box_blur(&mask, radius);
        }
    }
    mask
}
