// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error taxonomy for the rasterizer crate.
//!
//! No `thiserror`, no `anyhow`: a single plain enum with hand-rolled
//! `Debug`/`Display`/`core::error::Error` impls, matching the convention
//! already used for fallible paths elsewhere in the reference workspace
//! (e.g. cycle detection in its dependency-graph module).
//!
//! Most of the Canvas 2D error taxonomy is defined as *silent* no-ops
//! (non-finite path/transform arguments, `restore()` underflow) and is
//! therefore not represented here at all -- see the `CanvasContext` methods
//! that handle those cases with an early return and no `Err`.

use core::fmt;

/// Errors a [`crate::CanvasContext`] entry point can report to its caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImagingError {
    /// A color string failed to parse.
    ///
    /// The typed `CanvasContext` API has no direct caller for this variant
    /// (colors are constructed as [`canvas2d_imaging::Color`] values, not
    /// parsed from strings); it is defined for the benefit of any
    /// string-dispatched veneer built on top of this crate.
    ColorParse,
    /// Allocation of a surface, clip mask, or scratch buffer failed.
    ///
    /// Returned by [`crate::CanvasContext::try_new`] /
    /// [`crate::CanvasContext::try_with_config`] when `width * height * 4`
    /// overflows `usize` rather than attempting (and panicking on) the
    /// allocation.
    Resource,
    /// A composite operator outside the supported set was requested; a
    /// string-dispatched veneer falls back to `source-over` and reports this
    /// once.
    ///
    /// `CompositeOp` is [`canvas2d_imaging::CompositeOp`] (a closed enum), so
    /// the typed `CanvasContext` API can never construct an unsupported
    /// value; this variant is defined for the same out-of-scope veneer as
    /// `ColorParse` (the one that maps a `globalCompositeOperation` string
    /// onto `CompositeOp`).
    UnsupportedOperator,
    /// A gradient or pattern was constructed with invalid geometry (for
    /// example, a pattern with a zero-area source image).
    ///
    /// Returned by [`crate::CanvasContext::create_pattern`].
    InvalidPaint,
}

impl fmt::Display for ImagingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::ColorParse => "failed to parse color string",
            Self::Resource => "failed to allocate a pixel buffer",
            Self::UnsupportedOperator => {
                "unsupported composite operator; fell back to source-over"
            }
            Self::InvalidPaint => "invalid gradient or pattern geometry",
        };
        f.write_str(msg)
    }
}

impl core::error::Error for ImagingError {}
