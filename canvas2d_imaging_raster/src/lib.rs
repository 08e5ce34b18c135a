// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Software polygon rasterizer, stroker, compositor, and paint evaluator
//! implementing the `canvas2d_imaging` IR entirely on the CPU -- no GPU, no
//! windowing system, no host drawing library.
//!
//! [`CanvasContext`] is the crate's single public entry point: it owns a
//! pixel [`Surface`], the `save()`/`restore()` graphics-state stack, and
//! the path/resource tables, and ties together every pipeline stage below:
//!
//! - [`path`] -- path construction and curve expansion (`arc`/`ellipse`/`arcTo`).
//! - [`flatten`] -- adaptive recursive subdivision of curves into polylines.
//! - [`raster`] -- scanline polygon rasterization with analytic coverage AA.
//! - [`stroke`] -- stroke-to-fill outline expansion (width/cap/join/dash).
//! - [`paint`] -- solid/gradient/pattern color evaluation at a device point.
//! - [`compositor`] -- the Porter-Duff operator table.
//! - [`clip`] -- the intersective, copy-on-write clip-mask stack.
//! - [`shadow`] -- the offset+blur shadow stage.
//! - [`state`] -- the ambient graphics state and its save/restore stack.
//! - [`hit_test`] -- `isPointInPath`/`isPointInStroke`.
//! - [`surface`] -- the straight-RGBA8 pixel buffer.
//! - [`error`] -- the crate's small error taxonomy.

#![deny(unsafe_code)]
#![no_std]

extern crate alloc;

pub mod clip;
pub mod compositor;
pub mod context;
pub mod error;
pub mod flatten;
pub mod paint;
pub mod path;
pub mod raster;
pub mod shadow;
pub mod state;
pub mod stroke;
pub mod surface;

pub use context::{CanvasContext, PaintEntry, PatternRepeat, RasterConfig};
pub use error::ImagingError;
pub use raster::CoverageMask;
pub use surface::Surface;
