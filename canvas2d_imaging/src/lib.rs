// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Canvas 2D Imaging: backend-agnostic imaging IR and backend traits.
//!
//! This crate defines a small, plain-old-data (POD) friendly imaging
//! intermediate representation and traits for backends that consume it. It
//! models the HTML5 Canvas 2D rendering contract as a sequence of
//! state-mutating and drawing operations, independent of any particular
//! rasterizer.
//!
//! # Position in the stack
//!
//! - **Imaging IR (this crate)**: paths, paints, images, and the ambient
//!   graphics state expressed as POD state + draw operations, plus resource
//!   and backend traits.
//! - **Backends**: implementations of [`ImagingBackend`], such as the
//!   software rasterizer in `canvas2d_imaging_raster` or the operation-trace
//!   backend in `canvas2d_imaging_ref`.
//!
//! # Core concepts
//!
//! - **Resources**: small, opaque handles ([`PathId`], [`ImageId`],
//!   [`PaintId`]) whose lifetimes are managed via [`ResourceBackend`].
//! - **Imaging operations**: [`StateOp`] (mutate the ambient graphics state)
//!   and [`DrawOp`] (produce pixels), combined into [`ImagingOp`] for
//!   recording and replay.
//! - **Save/restore**: [`StateOp::Save`] and [`StateOp::Restore`] push and
//!   pop the entire graphics state (transform, clip, paints, line state,
//!   global alpha, composite operator, shadow) except the current path,
//!   matching Canvas's `save()`/`restore()`.
//!
//! This is intentionally a thin IR: the command surface that parses CSS
//! color strings and dispatches named methods, and the environment-specific
//! image adapter, both live above this crate.

#![no_std]

extern crate alloc;

use alloc::boxed::Box;
use peniko::Brush;
pub use peniko::{Color, Compose, Extend, Fill as FillRule, ImageAlphaType, ImageFormat};
pub use peniko::{ImageSampler, ImageQuality};

/// Identifier for a path resource.
///
/// This is a small, opaque handle that is stable for the lifetime of the
/// resource.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct PathId(pub u32);

/// Identifier for an image resource.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ImageId(pub u32);

/// Identifier for a paint resource (solid color, gradient, or pattern).
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct PaintId(pub u32);

/// Affine transform type used by the imaging IR.
pub type Affine = kurbo::Affine;

/// Stroke / line state used by `StateOp::SetStroke`.
///
/// This is a re-export of [`kurbo::Stroke`], which already captures width,
/// caps, joins, miter limit, and dash pattern/offset in one value -- exactly
/// the "line state" bundle the Canvas 2D contract treats as independently
/// settable attributes of the ambient graphics state.
pub type StrokeStyle = kurbo::Stroke;

/// Composite (Porter-Duff) operator used by `StateOp::SetCompositeOp`.
///
/// This is a re-export of [`peniko::Compose`], whose variant set already
/// covers the required operators plus `Plus` (Canvas's optional `lighter`).
pub type CompositeOp = Compose;

/// A simple axis-aligned rectangle in f32 coordinates.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RectF {
    /// Minimum X coordinate.
    pub x0: f32,
    /// Minimum Y coordinate.
    pub y0: f32,
    /// Maximum X coordinate.
    pub x1: f32,
    /// Maximum Y coordinate.
    pub y1: f32,
}

impl RectF {
    /// Create a new rectangle from min/max corners.
    #[inline]
    pub const fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Convert to kurbo's rectangle type.
    #[inline]
    pub fn to_kurbo(self) -> kurbo::Rect {
        kurbo::Rect::new(
            f64::from(self.x0),
            f64::from(self.y0),
            f64::from(self.x1),
            f64::from(self.y1),
        )
    }
}

/// Shadow parameters attached to the graphics state.
///
/// Modeled after the drop-shadow filter the reference workspace exposes as a
/// layer effect ([`FilterDesc::DropShadow`]-shaped), but flattened into a
/// single ambient-state field rather than a layer, since Canvas treats
/// `shadowColor`/`shadowBlur`/`shadowOffsetX`/`shadowOffsetY` as plain,
/// independently settable context attributes rather than a scoped effect.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ShadowDesc {
    /// Shadow color (including its own alpha).
    pub color: Color,
    /// Horizontal offset, in user space units.
    pub offset_x: f32,
    /// Vertical offset, in user space units.
    pub offset_y: f32,
    /// Blur radius (standard deviation of the separable blur), in user space units.
    ///
    /// A value of `0.0` disables blurring; the shadow is then a plain offset copy
    /// of the shape's coverage.
    pub blur: f32,
}

impl ShadowDesc {
    /// The default "no shadow" state: fully transparent color, zero offset, zero blur.
    pub const NONE: Self = Self {
        color: Color::TRANSPARENT,
        offset_x: 0.0,
        offset_y: 0.0,
        blur: 0.0,
    };

    /// Returns `true` if this shadow is a visible no-op and can be skipped entirely.
    #[inline]
    pub fn is_visible(&self) -> bool {
        self.color.components[3] > 0.0
    }
}

impl Default for ShadowDesc {
    #[inline]
    fn default() -> Self {
        Self::NONE
    }
}

/// State operations that mutate the ambient graphics state.
///
/// Every variant here corresponds to a field of the Canvas 2D graphics
/// state snapshotted by `save()`/`restore()`; the current path is
/// deliberately not represented here because it survives save/restore.
#[derive(Clone, Debug, PartialEq)]
pub enum StateOp {
    /// Set the current transform matrix (`setTransform`); `transform`,
    /// `translate`, `scale`, and `rotate` are expressed by backends as
    /// `SetTransform(current * delta)`.
    SetTransform(Affine),
    /// Set the current fill paint (`fillStyle`).
    SetFillPaint(PaintId),
    /// Set the current stroke paint (`strokeStyle`).
    SetStrokePaint(PaintId),
    /// Set the current stroke/line state (width, cap, join, miter limit, dash).
    SetStroke(StrokeStyle),
    /// Set the fill rule used by `fill()` and `clip()` (not by `stroke()`).
    SetFillRule(FillRule),
    /// Set global alpha (`globalAlpha`), multiplied into every draw's coverage.
    SetGlobalAlpha(f32),
    /// Set the compositing operator (`globalCompositeOperation`).
    SetCompositeOp(CompositeOp),
    /// Set the shadow parameters (`shadowColor`/`shadowBlur`/`shadowOffsetX/Y`).
    SetShadow(ShadowDesc),
    /// Intersect the current clip mask with the fill region of a path
    /// (`clip()`). Clips are strictly intersective: they never unshrink
    /// except via `restore()`.
    Clip {
        /// Path whose fill region defines the new clip region.
        path: PathId,
        /// Fill rule used to rasterize `path` for clipping purposes.
        fill_rule: FillRule,
    },
    /// Push the entire graphics state (`save()`).
    Save,
    /// Pop the most recently pushed graphics state (`restore()`).
    ///
    /// A `Restore` with no matching `Save` is a silent no-op, matching the
    /// Canvas 2D contract's `StateUnderflowError` handling.
    Restore,
}

/// Draw operations that produce pixels given the current state.
#[derive(Clone, Debug, PartialEq)]
pub enum DrawOp {
    /// Fill the given path with the current fill paint and fill rule.
    FillPath(PathId),
    /// Stroke the given path with the current stroke state and stroke paint.
    StrokePath(PathId),
    /// Fill an axis-aligned rectangle with the current fill paint, bypassing
    /// the current path (`fillRect`).
    FillRect(RectF),
    /// Stroke an axis-aligned rectangle with the current stroke state and
    /// stroke paint (`strokeRect`).
    StrokeRect(RectF),
    /// Clear an axis-aligned rectangle to transparent black, bypassing
    /// compositing, global alpha, and shadow (`clearRect`).
    ClearRect(RectF),
    /// Draw an image with an explicit transform and sampler.
    DrawImage {
        /// Image resource to draw.
        image: ImageId,
        /// Transform applied to the image's unit square.
        transform: Affine,
        /// Parameters that specify how to sample the image.
        sampler: ImageSampler,
    },
    /// Draw an image mapped from a source rect (in image pixel coordinates)
    /// to a destination rect (in local coordinates), the three-and-nine
    /// argument forms of `drawImage`.
    DrawImageRect {
        /// Image resource to draw.
        image: ImageId,
        /// Optional source rectangle in image pixel coordinates; `None` uses
        /// the full image bounds.
        src: Option<RectF>,
        /// Destination rectangle in local coordinates.
        dst: RectF,
        /// Parameters that specify how to sample the image.
        sampler: ImageSampler,
    },
}

/// Description of a path resource.
#[derive(Clone, Debug)]
pub struct PathDesc {
    /// Command buffer describing the path geometry, in the order they were
    /// recorded by `beginPath`/`moveTo`/.../`closePath`.
    pub commands: Box<[PathCmd]>,
}

/// Path command enumeration.
///
/// Only straight and Bézier primitives appear here; `arc`, `ellipse`, and
/// `arcTo` are expanded into `MoveTo`/`LineTo`/`CurveTo` sequences by the
/// path builder before a [`PathDesc`] is ever created; see
/// `canvas2d_imaging_raster::path` for that expansion.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum PathCmd {
    /// Move the current point without drawing, starting a new subpath.
    MoveTo {
        /// X coordinate of the new point.
        x: f32,
        /// Y coordinate of the new point.
        y: f32,
    },
    /// Draw a line from the current point to the given point.
    LineTo {
        /// X coordinate of the line end.
        x: f32,
        /// Y coordinate of the line end.
        y: f32,
    },
    /// Draw a quadratic Bézier curve from the current point, using a single
    /// control point.
    QuadTo {
        /// X coordinate of the control point.
        x1: f32,
        /// Y coordinate of the control point.
        y1: f32,
        /// X coordinate of the curve end.
        x: f32,
        /// Y coordinate of the curve end.
        y: f32,
    },
    /// Draw a cubic Bézier curve from the current point, using two control
    /// points.
    CurveTo {
        /// X coordinate of the first control point.
        x1: f32,
        /// Y coordinate of the first control point.
        y1: f32,
        /// X coordinate of the second control point.
        x2: f32,
        /// Y coordinate of the second control point.
        y2: f32,
        /// X coordinate of the curve end.
        x: f32,
        /// Y coordinate of the curve end.
        y: f32,
    },
    /// Close the current subpath, connecting it back to its starting point
    /// and marking it closed for stroking purposes.
    Close,
}

impl PathDesc {
    /// Convert this path description to a [`kurbo::BezPath`].
    pub fn to_bez_path(&self) -> kurbo::BezPath {
        let mut path = kurbo::BezPath::new();
        for cmd in self.commands.iter() {
            match *cmd {
                PathCmd::MoveTo { x, y } => path.move_to((f64::from(x), f64::from(y))),
                PathCmd::LineTo { x, y } => path.line_to((f64::from(x), f64::from(y))),
                PathCmd::QuadTo { x1, y1, x, y } => {
                    path.quad_to((f64::from(x1), f64::from(y1)), (f64::from(x), f64::from(y)));
                }
                PathCmd::CurveTo {
                    x1,
                    y1,
                    x2,
                    y2,
                    x,
                    y,
                } => path.curve_to(
                    (f64::from(x1), f64::from(y1)),
                    (f64::from(x2), f64::from(y2)),
                    (f64::from(x), f64::from(y)),
                ),
                PathCmd::Close => path.close_path(),
            }
        }
        path
    }
}

/// Compute the filled outline of a stroked path for hit-testing or clipping.
///
/// This is a backend-agnostic helper built directly on [`kurbo::stroke`],
/// mirroring the reference workspace's own `stroke_outline_for_clip_shape`
/// helper, generalized to operate on a plain [`kurbo::BezPath`] rather than
/// a layer-scoped `ClipShape`.
#[inline]
pub fn stroke_outline(path: &kurbo::BezPath, style: &StrokeStyle, tolerance: f64) -> kurbo::BezPath {
    kurbo::stroke(path.iter(), style, &kurbo::StrokeOpts::default(), tolerance)
}

/// Description of an image resource.
#[derive(Clone, Debug)]
pub struct ImageDesc {
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Pixel format of the image buffer.
    pub format: ImageFormat,
    /// Alpha encoding of the pixels (straight vs premultiplied).
    pub alpha_type: ImageAlphaType,
}

/// Description of a paint resource.
#[derive(Clone, Debug)]
pub struct PaintDesc {
    /// Brush used when rendering (solid color, gradient, or image pattern).
    ///
    /// This is a [`peniko::Brush`], so backends can directly map it onto
    /// their native paint representation.
    pub brush: Brush,
}

/// Resource lifetime interface.
///
/// Backends implement this to manage their own resource storage. IDs must
/// remain valid and refer to the same logical resource until the
/// corresponding `destroy_*` function is called.
pub trait ResourceBackend {
    /// Create a path resource.
    fn create_path(&mut self, desc: PathDesc) -> PathId;
    /// Destroy a previously created path.
    fn destroy_path(&mut self, id: PathId);

    /// Create an image resource from raw pixels.
    ///
    /// The `pixels` slice is expected to contain tightly packed, row-major
    /// image data in a backend-defined format (typically straight RGBA8 --
    /// see §3/§6 of the canonical image format this crate targets).
    fn create_image(&mut self, desc: ImageDesc, pixels: &[u8]) -> ImageId;
    /// Destroy a previously created image.
    fn destroy_image(&mut self, id: ImageId);

    /// Create a paint resource.
    fn create_paint(&mut self, desc: PaintDesc) -> PaintId;
    /// Destroy a previously created paint.
    fn destroy_paint(&mut self, id: PaintId);
}

/// Unified imaging operation used for recording and replaying command traces.
#[derive(Clone, Debug, PartialEq)]
pub enum ImagingOp {
    /// State-changing operation.
    State(StateOp),
    /// Drawing operation.
    Draw(DrawOp),
}

/// Minimal imaging backend trait.
pub trait ImagingBackend: ResourceBackend {
    /// Apply a state operation.
    fn state(&mut self, op: StateOp);

    /// Apply a draw operation.
    fn draw(&mut self, op: DrawOp);
}

/// Convenience helpers for [`ImagingBackend`] implementations and callers.
///
/// This is separate from [`ImagingBackend`] so that methods can accept
/// closures and return values without complicating trait object usage
/// (`&mut dyn ImagingBackend`).
pub trait ImagingBackendExt: ImagingBackend {
    /// Run `f` with the graphics state saved, restoring it afterwards even
    /// if `f` returns early.
    ///
    /// Note: if `f` panics, the state will not be restored.
    #[inline]
    fn with_saved_state<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.state(StateOp::Save);
        let out = f(self);
        self.state(StateOp::Restore);
        out
    }

    /// Run `f` with the clip additionally intersected with `path`'s fill
    /// region, restoring the previous clip afterwards.
    ///
    /// Note: if `f` panics, the state will not be restored.
    #[inline]
    fn with_clip<R>(
        &mut self,
        path: PathId,
        fill_rule: FillRule,
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        self.with_saved_state(|backend| {
            backend.state(StateOp::Clip { path, fill_rule });
            f(backend)
        })
    }
}

impl<B: ImagingBackend + ?Sized> ImagingBackendExt for B {}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use alloc::vec::Vec;

    /// Trivial in-memory backend that records operations for testing.
    #[derive(Default)]
    struct RecordingBackend {
        next_path: u32,
        next_image: u32,
        next_paint: u32,
        ops: Vec<ImagingOp>,
    }

    impl ResourceBackend for RecordingBackend {
        fn create_path(&mut self, _desc: PathDesc) -> PathId {
            let id = self.next_path;
            self.next_path += 1;
            PathId(id)
        }

        fn destroy_path(&mut self, _id: PathId) {}

        fn create_image(&mut self, _desc: ImageDesc, _pixels: &[u8]) -> ImageId {
            let id = self.next_image;
            self.next_image += 1;
            ImageId(id)
        }

        fn destroy_image(&mut self, _id: ImageId) {}

        fn create_paint(&mut self, _desc: PaintDesc) -> PaintId {
            let id = self.next_paint;
            self.next_paint += 1;
            PaintId(id)
        }

        fn destroy_paint(&mut self, _id: PaintId) {}
    }

    impl ImagingBackend for RecordingBackend {
        fn state(&mut self, op: StateOp) {
            self.ops.push(ImagingOp::State(op));
        }

        fn draw(&mut self, op: DrawOp) {
            self.ops.push(ImagingOp::Draw(op));
        }
    }

    #[test]
    fn record_basic_ops() {
        let mut backend = RecordingBackend::default();

        let paint = backend.create_paint(PaintDesc {
            brush: Brush::Solid(Color::WHITE),
        });
        let path = backend.create_path(PathDesc {
            commands: vec![PathCmd::MoveTo { x: 0.0, y: 0.0 }].into_boxed_slice(),
        });

        backend.state(StateOp::SetFillPaint(paint));
        backend.draw(DrawOp::FillPath(path));

        assert_eq!(backend.ops.len(), 2);
    }

    #[test]
    fn with_saved_state_emits_save_and_restore() {
        let mut backend = RecordingBackend::default();
        backend.with_saved_state(|b| {
            b.state(StateOp::SetGlobalAlpha(0.5));
        });

        assert_eq!(backend.ops.len(), 3);
        assert_eq!(backend.ops[0], ImagingOp::State(StateOp::Save));
        assert_eq!(
            backend.ops[1],
            ImagingOp::State(StateOp::SetGlobalAlpha(0.5))
        );
        assert_eq!(backend.ops[2], ImagingOp::State(StateOp::Restore));
    }

    #[test]
    fn with_clip_intersects_then_restores() {
        let mut backend = RecordingBackend::default();
        let path = backend.create_path(PathDesc {
            commands: vec![PathCmd::MoveTo { x: 0.0, y: 0.0 }].into_boxed_slice(),
        });

        backend.with_clip(path, FillRule::NonZero, |b| {
            b.draw(DrawOp::FillPath(path));
        });

        assert_eq!(backend.ops.len(), 4);
        match &backend.ops[1] {
            ImagingOp::State(StateOp::Clip { path: p, fill_rule }) => {
                assert_eq!(*p, path);
                assert_eq!(*fill_rule, FillRule::NonZero);
            }
            other => panic!("expected clip state op, got {other:?}"),
        }
    }

    #[test]
    fn path_desc_to_bez_path_round_trips_commands() {
        let desc = PathDesc {
            commands: vec![
                PathCmd::MoveTo { x: 0.0, y: 0.0 },
                PathCmd::LineTo { x: 10.0, y: 0.0 },
                PathCmd::LineTo { x: 10.0, y: 10.0 },
                PathCmd::Close,
            ]
            .into_boxed_slice(),
        };
        let bez = desc.to_bez_path();
        assert_eq!(bez.elements().len(), 4);
    }

    #[test]
    fn shadow_desc_default_is_invisible() {
        assert!(!ShadowDesc::default().is_visible());
        assert!(ShadowDesc {
            color: Color::BLACK,
            ..ShadowDesc::NONE
        }
        .is_visible());
    }
}
