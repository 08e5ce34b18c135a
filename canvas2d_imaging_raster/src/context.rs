// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! [`CanvasContext`]: the public, typed command surface that ties every
//! pipeline stage in this crate together into one backend.
//!
//! `CanvasContext` implements [`ResourceBackend`] and [`ImagingBackend`], so
//! it can consume a recorded [`canvas2d_imaging::ImagingOp`] trace exactly
//! like any other backend, but it also exposes a direct, typed method per
//! Canvas 2D command (`move_to`, `fill`, `set_transform`, ...) for callers
//! that want to drive it without going through the IR explicitly. The typed
//! methods are thin wrappers that call `self.state(...)`/`self.draw(...)`
//! internally, so both entry points stay behaviorally identical.

extern crate alloc;

use crate::clip::ClipMask;
use crate::compositor::{composite_pixel, whole_surface};
use crate::error::ImagingError;
use crate::flatten::{flatten, transform_path};
use crate::hit_test::{is_point_in_path, is_point_in_stroke};
use crate::paint::{eval_paint, invert_for_paint, sample_bilinear, sample_nearest};
use crate::path::CanvasPath;
use crate::raster::{rasterize, CoverageMask};
use crate::shadow::{device_blur_radius, device_offset, shadow_coverage};
use crate::state::{GraphicsState, GraphicsStateStack};
use crate::stroke::stroke_to_fill;
use crate::surface::Surface;
use alloc::vec::Vec;
use canvas2d_imaging::{
    Affine, Color, CompositeOp, DrawOp, Extend, FillRule, ImageAlphaType, ImageDesc, ImageFormat,
    ImageId, ImageQuality, ImageSampler, ImagingBackend, PaintDesc, PaintId, PathDesc, PathId,
    RectF, ResourceBackend, ShadowDesc, StateOp, StrokeStyle,
};
use kurbo::{BezPath, Point};
use peniko::{
    Blob, Brush, ColorStop, Gradient, GradientKind, Image as PenikoImage, ImageData,
    LinearGradientPosition, RadialGradientPosition, SweepGradientPosition,
};

/// Runtime-tunable knobs the spec leaves implementation-defined.
#[derive(Copy, Clone, Debug)]
pub struct RasterConfig {
    /// Maximum deviation (device pixels) between a flattened polyline and
    /// the curve it approximates.
    pub flatten_tolerance: f64,
    /// Maximum number of nested `save()` snapshots kept on the state stack.
    pub stack_depth_limit: usize,
}

impl Default for RasterConfig {
    fn default() -> Self {
        Self { flatten_tolerance: 0.25, stack_depth_limit: 32 }
    }
}

/// An image resource: canonical straight-RGBA8 pixels plus their
/// description.
#[derive(Clone, Debug)]
struct ImageEntry {
    desc: ImageDesc,
    pixels: Vec<u8>,
}

/// A paint resource: a [`peniko::Brush`] plus the pattern-space transform
/// `createPattern`'s optional transform sets (identity for everything else).
///
/// This lives in the raster crate rather than [`PaintDesc`] because the
/// shared IR models a paint as brush-only; the pattern transform is a
/// rasterizer-level concern (how a pattern's local space maps to the
/// current transform), not part of the cross-backend paint description.
#[derive(Clone, Debug)]
pub struct PaintEntry {
    /// The paint's brush (solid, gradient, or image pattern).
    pub brush: Brush,
    /// Additional transform applied between the pattern's own pixel space
    /// and the current transformation matrix. Identity for non-pattern
    /// brushes.
    pub pattern_transform: Affine,
}

/// How an image pattern repeats, mapping onto the two independently
/// settable [`Extend`] axes `peniko`'s sampler already exposes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PatternRepeat {
    /// Repeats along both axes.
    Repeat,
    /// Repeats horizontally only; vertical samples outside the image clamp.
    RepeatX,
    /// Repeats vertically only; horizontal samples outside the image clamp.
    RepeatY,
    /// Does not repeat; samples outside the image on either axis clamp.
    NoRepeat,
}

impl PatternRepeat {
    fn extends(self) -> (Extend, Extend) {
        match self {
            Self::Repeat => (Extend::Repeat, Extend::Repeat),
            Self::RepeatX => (Extend::Repeat, Extend::Pad),
            Self::RepeatY => (Extend::Pad, Extend::Repeat),
            Self::NoRepeat => (Extend::Pad, Extend::Pad),
        }
    }
}

/// A software Canvas 2D rendering context: owns a pixel surface, the
/// graphics-state stack, resource tables, and the path under construction.
pub struct CanvasContext {
    surface: Surface,
    state: GraphicsStateStack,
    current_path: CanvasPath,
    paths: Vec<Option<BezPath>>,
    images: Vec<Option<ImageEntry>>,
    paints: Vec<Option<PaintEntry>>,
    default_paint: PaintId,
    config: RasterConfig,
}

impl CanvasContext {
    /// Creates a context over a `width x height` surface, fully transparent,
    /// with default tunables (§10.3: 0.25px flatten tolerance, 32-deep state
    /// stack).
    ///
    /// Panics on the same `width * height * 4` overflow [`Self::try_new`]
    /// reports; use `try_new` directly when the dimensions are caller-supplied
    /// rather than a compile-time constant.
    pub fn new(width: usize, height: usize) -> Self {
        Self::try_new(width, height).expect("surface dimensions overflow a pixel buffer")
    }

    /// Creates a context with explicit tunables. See [`Self::new`].
    pub fn with_config(width: usize, height: usize, config: RasterConfig) -> Self {
        Self::try_with_config(width, height, config).expect("surface dimensions overflow a pixel buffer")
    }

    /// Creates a context over a `width x height` surface, reporting
    /// [`ImagingError::Resource`] instead of allocating when `width * height
    /// * 4` would overflow `usize` (the surface's pixel-buffer length).
    pub fn try_new(width: usize, height: usize) -> Result<Self, ImagingError> {
        Self::try_with_config(width, height, RasterConfig::default())
    }

    /// Creates a context with explicit tunables, reporting
    /// [`ImagingError::Resource`] instead of allocating when `width * height
    /// * 4` would overflow `usize`.
    pub fn try_with_config(width: usize, height: usize, config: RasterConfig) -> Result<Self, ImagingError> {
        width
            .checked_mul(height)
            .and_then(|px| px.checked_mul(4))
            .ok_or(ImagingError::Resource)?;

        let paints = alloc::vec![Some(PaintEntry {
            brush: Brush::Solid(Color::BLACK),
            pattern_transform: Affine::IDENTITY,
        })];
        let default_paint = PaintId(0);
        let state = GraphicsStateStack::new(GraphicsState::initial(default_paint), config.stack_depth_limit);
        Ok(Self {
            surface: Surface::new(width, height),
            state,
            current_path: CanvasPath::new(),
            paths: Vec::new(),
            images: Vec::new(),
            paints,
            default_paint,
            config,
        })
    }

    /// The surface this context draws into.
    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    /// Surface width in pixels.
    pub fn width(&self) -> usize {
        self.surface.width
    }

    /// Surface height in pixels.
    pub fn height(&self) -> usize {
        self.surface.height
    }

    /// The paint new contexts start with (opaque black, `fillStyle`'s and
    /// `strokeStyle`'s initial value).
    pub fn default_paint(&self) -> PaintId {
        self.default_paint
    }

    // -- Transform -------------------------------------------------------

    /// Replaces the current transform outright (`setTransform`).
    pub fn set_transform(&mut self, xf: Affine) {
        self.state(StateOp::SetTransform(xf));
    }

    /// Post-multiplies the current transform by `delta` (`transform`,
    /// `translate`, `scale`, `rotate` are all this with a specific `delta`).
    pub fn transform(&mut self, delta: Affine) {
        let current = self.state.current().transform;
        self.state(StateOp::SetTransform(current * delta));
    }

    /// Translates by `(x, y)`.
    pub fn translate(&mut self, x: f64, y: f64) {
        self.transform(Affine::translate((x, y)));
    }

    /// Scales by `(sx, sy)`.
    pub fn scale(&mut self, sx: f64, sy: f64) {
        self.transform(Affine::scale_non_uniform(sx, sy));
    }

    /// Rotates by `angle` radians.
    pub fn rotate(&mut self, angle: f64) {
        self.transform(Affine::rotate(angle));
    }

    /// Resets the transform to identity.
    pub fn reset_transform(&mut self) {
        self.state(StateOp::SetTransform(Affine::IDENTITY));
    }

    /// The current transformation matrix.
    pub fn current_transform(&self) -> Affine {
        self.state.current().transform
    }

    // -- State setters -----------------------------------------------------

    /// Sets the fill paint (`fillStyle`).
    pub fn set_fill_paint(&mut self, paint: PaintId) {
        self.state(StateOp::SetFillPaint(paint));
    }

    /// Sets the stroke paint (`strokeStyle`).
    pub fn set_stroke_paint(&mut self, paint: PaintId) {
        self.state(StateOp::SetStrokePaint(paint));
    }

    /// Sets line width/cap/join/miter-limit/dash (the `strokeStyle`-adjacent
    /// line-state attributes, bundled as one [`StrokeStyle`]).
    pub fn set_stroke_style(&mut self, style: StrokeStyle) {
        self.state(StateOp::SetStroke(style));
    }

    /// Sets the fill rule used by `fill()` and `clip()`.
    pub fn set_fill_rule(&mut self, rule: FillRule) {
        self.state(StateOp::SetFillRule(rule));
    }

    /// Sets global alpha. Values outside `[0, 1]` or non-finite are ignored,
    /// leaving the previous value in place (matching the Canvas 2D contract
    /// that an out-of-range `globalAlpha` assignment is a silent no-op).
    pub fn set_global_alpha(&mut self, alpha: f32) {
        if alpha.is_finite() && (0.0..=1.0).contains(&alpha) {
            self.state(StateOp::SetGlobalAlpha(alpha));
        }
    }

    /// Sets the compositing operator.
    pub fn set_composite_operation(&mut self, op: CompositeOp) {
        self.state(StateOp::SetCompositeOp(op));
    }

    /// Sets the shadow parameters.
    pub fn set_shadow(&mut self, shadow: ShadowDesc) {
        self.state(StateOp::SetShadow(shadow));
    }

    /// Pushes the entire graphics state (`save()`).
    pub fn save(&mut self) {
        self.state(StateOp::Save);
    }

    /// Pops the most recently pushed graphics state (`restore()`); a no-op
    /// if nothing is saved.
    pub fn restore(&mut self) {
        self.state(StateOp::Restore);
    }

    // -- Path construction (delegates to the current path) ----------------

    /// Discards the current path (`beginPath`).
    pub fn begin_path(&mut self) {
        self.current_path.clear();
    }

    /// Starts a new subpath at `(x, y)`.
    pub fn move_to(&mut self, x: f64, y: f64) {
        self.current_path.move_to(x, y);
    }

    /// Appends a straight segment to `(x, y)`.
    pub fn line_to(&mut self, x: f64, y: f64) {
        self.current_path.line_to(x, y);
    }

    /// Appends a quadratic Bézier curve.
    pub fn quadratic_curve_to(&mut self, cx: f64, cy: f64, x: f64, y: f64) {
        self.current_path.quadratic_curve_to(cx, cy, x, y);
    }

    /// Appends a cubic Bézier curve.
    pub fn bezier_curve_to(&mut self, c1x: f64, c1y: f64, c2x: f64, c2y: f64, x: f64, y: f64) {
        self.current_path.bezier_curve_to(c1x, c1y, c2x, c2y, x, y);
    }

    /// Closes the current subpath.
    pub fn close_path(&mut self) {
        self.current_path.close_path();
    }

    /// Appends an axis-aligned rectangle subpath.
    pub fn path_rect(&mut self, x: f64, y: f64, w: f64, h: f64) {
        self.current_path.rect(x, y, w, h);
    }

    /// Appends a circular arc.
    pub fn arc(&mut self, cx: f64, cy: f64, r: f64, a0: f64, a1: f64, ccw: bool) {
        self.current_path.arc(cx, cy, r, a0, a1, ccw);
    }

    /// Appends an elliptical arc.
    #[allow(clippy::too_many_arguments)]
    pub fn ellipse(&mut self, cx: f64, cy: f64, rx: f64, ry: f64, rot: f64, a0: f64, a1: f64, ccw: bool) {
        self.current_path.ellipse(cx, cy, rx, ry, rot, a0, a1, ccw);
    }

    /// Appends a tangent-arc segment (`arcTo`).
    pub fn arc_to(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, r: f64) {
        self.current_path.arc_to(x1, y1, x2, y2, r);
    }

    // -- Paint factories ----------------------------------------------------

    /// Registers a solid-color paint.
    pub fn create_solid_paint(&mut self, color: Color) -> PaintId {
        self.create_paint(PaintDesc { brush: Brush::Solid(color) })
    }

    /// Registers a linear gradient paint, capturing its geometry in the
    /// coordinate space active when this is called (per §4.4's invariant:
    /// "gradients capture geometry at creation").
    pub fn create_linear_gradient(
        &mut self,
        x0: f64,
        y0: f64,
        x1: f64,
        y1: f64,
        stops: &[(f32, Color)],
        extend: Extend,
    ) -> PaintId {
        let gradient = Gradient {
            kind: GradientKind::Linear(LinearGradientPosition::new((x0, y0), (x1, y1))),
            extend,
            stops: stops_from(stops),
            ..Default::default()
        };
        self.create_paint(PaintDesc { brush: Brush::Gradient(gradient) })
    }

    /// Registers a two-circle radial gradient paint.
    #[allow(clippy::too_many_arguments)]
    pub fn create_radial_gradient(
        &mut self,
        x0: f64,
        y0: f64,
        r0: f32,
        x1: f64,
        y1: f64,
        r1: f32,
        stops: &[(f32, Color)],
        extend: Extend,
    ) -> PaintId {
        let gradient = Gradient {
            kind: GradientKind::Radial(RadialGradientPosition::new_two_point((x0, y0), r0, (x1, y1), r1)),
            extend,
            stops: stops_from(stops),
            ..Default::default()
        };
        self.create_paint(PaintDesc { brush: Brush::Gradient(gradient) })
    }

    /// Registers a conic ("sweep") gradient paint spanning `[start_angle,
    /// start_angle + 2*pi)` radians around `(cx, cy)`.
    pub fn create_conic_gradient(
        &mut self,
        cx: f64,
        cy: f64,
        start_angle: f32,
        stops: &[(f32, Color)],
        extend: Extend,
    ) -> PaintId {
        let end_angle = start_angle + 2.0 * core::f32::consts::PI;
        let gradient = Gradient {
            kind: GradientKind::Sweep(SweepGradientPosition::new((cx, cy), start_angle, end_angle)),
            extend,
            stops: stops_from(stops),
            ..Default::default()
        };
        self.create_paint(PaintDesc { brush: Brush::Gradient(gradient) })
    }

    /// Registers an image-pattern paint (`createPattern`). Reports
    /// [`ImagingError::InvalidPaint`] for an unknown image or a zero-area
    /// image, per §4.4's pattern contract.
    pub fn create_pattern(
        &mut self,
        image: ImageId,
        repeat: PatternRepeat,
        pattern_transform: Affine,
    ) -> Result<PaintId, ImagingError> {
        let entry = self
            .images
            .get(image.0 as usize)
            .and_then(Option::clone)
            .ok_or(ImagingError::InvalidPaint)?;
        if entry.desc.width == 0 || entry.desc.height == 0 {
            return Err(ImagingError::InvalidPaint);
        }
        let (x_extend, y_extend) = repeat.extends();
        let image_data = ImageData {
            data: Blob::from(entry.pixels),
            format: entry.desc.format,
            alpha_type: entry.desc.alpha_type,
            width: entry.desc.width,
            height: entry.desc.height,
        };
        let sampler = ImageSampler { x_extend, y_extend, ..Default::default() };
        let brush = Brush::Image(PenikoImage { image: image_data, sampler });
        let id = self.create_paint(PaintDesc { brush });
        if let Some(slot) = self.paints.get_mut(id.0 as usize).and_then(Option::as_mut) {
            slot.pattern_transform = pattern_transform;
        }
        Ok(id)
    }

    // -- Drawing ------------------------------------------------------------

    /// Fills the current path (`fill()`), or `fill_rule` instead of the
    /// ambient fill rule if given.
    pub fn fill(&mut self, fill_rule: Option<FillRule>) {
        let desc = self.current_path.to_path_desc();
        let id = self.create_path(desc);
        let fill_rule = fill_rule.unwrap_or(self.state.current().fill_rule);
        let paint = self.state.current().fill_paint;
        self.fill_bez_by_id(id, fill_rule, paint);
        self.destroy_path(id);
    }

    /// Strokes the current path (`stroke()`).
    pub fn stroke(&mut self) {
        let desc = self.current_path.to_path_desc();
        let id = self.create_path(desc);
        let paint = self.state.current().stroke_paint;
        self.stroke_bez_by_id(id, paint);
        self.destroy_path(id);
    }

    /// Intersects the clip with the current path's fill region (`clip()`).
    pub fn clip(&mut self, fill_rule: Option<FillRule>) {
        let desc = self.current_path.to_path_desc();
        let id = self.create_path(desc);
        let fill_rule = fill_rule.unwrap_or(self.state.current().fill_rule);
        self.apply_clip(id, fill_rule);
        self.destroy_path(id);
    }

    /// Fills an axis-aligned rectangle, bypassing the current path
    /// (`fillRect`).
    pub fn fill_rect(&mut self, x: f64, y: f64, w: f64, h: f64) {
        self.draw(DrawOp::FillRect(RectF::new(x as f32, y as f32, (x + w) as f32, (y + h) as f32)));
    }

    /// Strokes an axis-aligned rectangle (`strokeRect`).
    pub fn stroke_rect(&mut self, x: f64, y: f64, w: f64, h: f64) {
        self.draw(DrawOp::StrokeRect(RectF::new(x as f32, y as f32, (x + w) as f32, (y + h) as f32)));
    }

    /// Clears an axis-aligned rectangle to transparent black (`clearRect`).
    pub fn clear_rect(&mut self, x: f64, y: f64, w: f64, h: f64) {
        self.draw(DrawOp::ClearRect(RectF::new(x as f32, y as f32, (x + w) as f32, (y + h) as f32)));
    }

    /// Draws `image`'s unit square through `transform` (the two/nine-argument
    /// forms of `drawImage` build `transform` as a translate+scale of the
    /// unit square; see [`Self::draw_image_to`] for the common case).
    pub fn draw_image_transformed(&mut self, image: ImageId, transform: Affine, sampler: ImageSampler) {
        self.draw(DrawOp::DrawImage { image, transform, sampler });
    }

    /// Draws the whole of `image` at `(x, y)` at its native size, nearest
    /// sampling (the two-argument `drawImage(image, x, y)` form).
    pub fn draw_image(&mut self, image: ImageId, x: f64, y: f64) {
        let Some(entry) = self.images.get(image.0 as usize).and_then(Option::clone) else {
            return;
        };
        let transform =
            Affine::translate((x, y)) * Affine::scale_non_uniform(f64::from(entry.desc.width), f64::from(entry.desc.height));
        self.draw_image_transformed(image, transform, ImageSampler::default());
    }

    /// Draws `image` scaled to `(w, h)` at `(x, y)` (the four-argument
    /// `drawImage` form).
    pub fn draw_image_scaled(&mut self, image: ImageId, x: f64, y: f64, w: f64, h: f64) {
        let transform = Affine::translate((x, y)) * Affine::scale_non_uniform(w, h);
        self.draw_image_transformed(image, transform, ImageSampler::default());
    }

    /// Draws a source rectangle of `image` mapped to a destination rectangle
    /// (the nine-argument `drawImage` form).
    #[allow(clippy::too_many_arguments)]
    pub fn draw_image_src_dst(
        &mut self,
        image: ImageId,
        sx: f64,
        sy: f64,
        sw: f64,
        sh: f64,
        dx: f64,
        dy: f64,
        dw: f64,
        dh: f64,
    ) {
        self.draw(DrawOp::DrawImageRect {
            image,
            src: Some(RectF::new(sx as f32, sy as f32, (sx + sw) as f32, (sy + sh) as f32)),
            dst: RectF::new(dx as f32, dy as f32, (dx + dw) as f32, (dy + dh) as f32),
            sampler: ImageSampler::default(),
        });
    }

    // -- Pixel data ----------------------------------------------------------

    /// Reads back a sub-rectangle as straight-RGBA8 bytes (`getImageData`).
    pub fn get_image_data(&self, x: i64, y: i64, w: usize, h: usize) -> Vec<u8> {
        self.surface.get_image_data(x, y, w, h)
    }

    /// Writes straight-RGBA8 bytes back to the surface, bypassing
    /// compositing, transform, clip, and global alpha (`putImageData`).
    pub fn put_image_data(&mut self, data: &[u8], w: usize, h: usize, x: i64, y: i64) {
        self.surface.put_image_data(data, w, h, x, y);
    }

    /// Allocates a fully transparent straight-RGBA8 buffer (`createImageData`).
    pub fn create_image_data(w: usize, h: usize) -> Vec<u8> {
        alloc::vec![0_u8; w * h * 4]
    }

    // -- Hit testing ----------------------------------------------------------

    /// `isPointInPath`: tests `(x, y)` (in the current transform's local
    /// space) against the current path's fill region.
    pub fn is_point_in_path(&self, x: f64, y: f64, fill_rule: Option<FillRule>) -> bool {
        let bez = self.current_path.to_bez_path();
        let fill_rule = fill_rule.unwrap_or(self.state.current().fill_rule);
        is_point_in_path(&bez, self.state.current().transform, x, y, fill_rule, self.config.flatten_tolerance)
    }

    /// `isPointInStroke`: tests `(x, y)` against the current path's stroked
    /// outline under the current stroke state.
    pub fn is_point_in_stroke(&self, x: f64, y: f64) -> bool {
        let bez = self.current_path.to_bez_path();
        let style = self.state.current().stroke.clone();
        is_point_in_stroke(&bez, self.state.current().transform, &style, x, y, self.config.flatten_tolerance)
    }

    // -- Internal pipeline ----------------------------------------------------

    fn apply_clip(&mut self, path: PathId, fill_rule: FillRule) {
        let Some(bez) = self.paths.get(path.0 as usize).and_then(Option::clone) else {
            return;
        };
        let xf = self.state.current().transform;
        let device = transform_path(&bez, xf);
        let polylines = flatten(&device, self.config.flatten_tolerance);
        let mask = rasterize(&polylines, self.surface.width, self.surface.height, fill_rule);
        let new_clip = self.state.current().clip.intersect(&mask);
        self.state.current_mut().clip = new_clip;
    }

    fn fill_bez_by_id(&mut self, path: PathId, fill_rule: FillRule, paint: PaintId) {
        let Some(bez) = self.paths.get(path.0 as usize).and_then(Option::clone) else {
            return;
        };
        self.fill_bez(&bez, fill_rule, paint);
    }

    fn fill_bez(&mut self, user_path: &BezPath, fill_rule: FillRule, paint: PaintId) {
        let xf = self.state.current().transform;
        let device = transform_path(user_path, xf);
        let polylines = flatten(&device, self.config.flatten_tolerance);
        let mask = rasterize(&polylines, self.surface.width, self.surface.height, fill_rule);
        self.paint_shadow(&mask);
        self.composite_paint(&mask, paint);
    }

    fn stroke_bez_by_id(&mut self, path: PathId, paint: PaintId) {
        let Some(bez) = self.paths.get(path.0 as usize).and_then(Option::clone) else {
            return;
        };
        self.stroke_bez(&bez, paint);
    }

    fn stroke_bez(&mut self, user_path: &BezPath, paint: PaintId) {
        let xf = self.state.current().transform;
        let style = self.state.current().stroke.clone();
        // Expand in user space (so an anisotropic transform widens the
        // stroke anisotropically too), then move the outline into device
        // space for flattening and rasterization.
        let outline_user = stroke_to_fill(user_path, &style, self.config.flatten_tolerance);
        let device = transform_path(&outline_user, xf);
        let polylines = flatten(&device, self.config.flatten_tolerance);
        let mask = rasterize(&polylines, self.surface.width, self.surface.height, FillRule::NonZero);
        self.paint_shadow(&mask);
        self.composite_paint(&mask, paint);
    }

    fn paint_shadow(&mut self, shape: &CoverageMask) {
        let gstate = self.state.current();
        let shadow = gstate.shadow;
        if !shadow.is_visible() {
            return;
        }
        let xf = gstate.transform;
        let global_alpha = gstate.global_alpha;
        let op = gstate.composite_op;
        let clip = gstate.clip.clone();

        let (ox, oy) = device_offset(xf, shadow.offset_x, shadow.offset_y);
        let blur = device_blur_radius(xf, shadow.blur);
        let shadow_mask = shadow_coverage(shape, ox, oy, blur);

        composite_loop(&mut self.surface, &shadow_mask, &clip, global_alpha, op, |_, _| shadow.color);
    }

    fn composite_paint(&mut self, shape: &CoverageMask, paint: PaintId) {
        let Some(entry) = self.paints.get(paint.0 as usize).and_then(Option::clone) else {
            return;
        };
        let gstate = self.state.current();
        let ctm = gstate.transform;
        let global_alpha = gstate.global_alpha;
        let op = gstate.composite_op;
        let clip = gstate.clip.clone();

        let combined = match &entry.brush {
            Brush::Image(_) => ctm * entry.pattern_transform,
            _ => ctm,
        };
        let inverse = combined.inverse();
        let desc = PaintDesc { brush: entry.brush };

        composite_loop(&mut self.surface, shape, &clip, global_alpha, op, |x, y| {
            let device_point = Point::new(x as f64 + 0.5, y as f64 + 0.5);
            let local = invert_for_paint(inverse, device_point);
            eval_paint(&desc, local)
        });
    }

    fn draw_image_internal(&mut self, image: ImageId, combined: Affine, sampler: ImageSampler, shape_path: &BezPath) {
        let Some(entry) = self.images.get(image.0 as usize).and_then(Option::clone) else {
            return;
        };
        if entry.desc.width == 0 || entry.desc.height == 0 {
            return;
        }
        let device_shape = transform_path(shape_path, combined);
        let polylines = flatten(&device_shape, self.config.flatten_tolerance);
        let shape = rasterize(&polylines, self.surface.width, self.surface.height, FillRule::NonZero);
        self.paint_shadow(&shape);

        let gstate = self.state.current();
        let global_alpha = gstate.global_alpha;
        let op = gstate.composite_op;
        let clip = gstate.clip.clone();
        let inverse = combined.inverse();
        let (width, height) = (entry.desc.width, entry.desc.height);

        composite_loop(&mut self.surface, &shape, &clip, global_alpha, op, |x, y| {
            let device_point = Point::new(x as f64 + 0.5, y as f64 + 0.5);
            let local = invert_for_paint(inverse, device_point);
            let u = apply_extend_sample(local.x, sampler.x_extend);
            let v = apply_extend_sample(local.y, sampler.y_extend);
            let px = (u * f64::from(width)).clamp(0.0, f64::from(width) - 1.0);
            let py = (v * f64::from(height)).clamp(0.0, f64::from(height) - 1.0);
            match sampler.quality {
                ImageQuality::Low => sample_nearest(&entry.pixels, width, height, px, py),
                _ => sample_bilinear(&entry.pixels, width, height, px, py),
            }
        });
    }

    fn draw_image_rect_internal(&mut self, image: ImageId, src: Option<RectF>, dst: RectF, sampler: ImageSampler) {
        let Some(entry) = self.images.get(image.0 as usize).and_then(Option::clone) else {
            return;
        };
        if entry.desc.width == 0 || entry.desc.height == 0 {
            return;
        }
        let src = src.unwrap_or(RectF::new(0.0, 0.0, entry.desc.width as f32, entry.desc.height as f32));
        let ctm = self.state.current().transform;
        let dst_kurbo = dst.to_kurbo();
        let device_rect = transform_path(&rect_path(dst_kurbo), ctm);
        let polylines = flatten(&device_rect, self.config.flatten_tolerance);
        let shape = rasterize(&polylines, self.surface.width, self.surface.height, FillRule::NonZero);
        self.paint_shadow(&shape);

        let gstate = self.state.current();
        let global_alpha = gstate.global_alpha;
        let op = gstate.composite_op;
        let clip = gstate.clip.clone();
        let inverse = ctm.inverse();
        let dst_w = (dst_kurbo.x1 - dst_kurbo.x0).max(1e-9);
        let dst_h = (dst_kurbo.y1 - dst_kurbo.y0).max(1e-9);
        let (width, height) = (entry.desc.width, entry.desc.height);

        composite_loop(&mut self.surface, &shape, &clip, global_alpha, op, |x, y| {
            let device_point = Point::new(x as f64 + 0.5, y as f64 + 0.5);
            let local = invert_for_paint(inverse, device_point);
            let frac_x = (local.x - dst_kurbo.x0) / dst_w;
            let frac_y = (local.y - dst_kurbo.y0) / dst_h;
            let px = (f64::from(src.x0) + frac_x * f64::from(src.x1 - src.x0)).clamp(0.0, f64::from(width) - 1.0);
            let py = (f64::from(src.y0) + frac_y * f64::from(src.y1 - src.y0)).clamp(0.0, f64::from(height) - 1.0);
            match sampler.quality {
                ImageQuality::Low => sample_nearest(&entry.pixels, width, height, px, py),
                _ => sample_bilinear(&entry.pixels, width, height, px, py),
            }
        });
    }
}

/// Axis-aligned unit square subpath, used as the shape `DrawOp::DrawImage`
/// maps through its transform.
fn unit_square_path() -> BezPath {
    let mut p = BezPath::new();
    p.move_to((0.0, 0.0));
    p.line_to((1.0, 0.0));
    p.line_to((1.0, 1.0));
    p.line_to((0.0, 1.0));
    p.close_path();
    p
}

fn rect_path(r: kurbo::Rect) -> BezPath {
    let mut p = BezPath::new();
    p.move_to((r.x0, r.y0));
    p.line_to((r.x1, r.y0));
    p.line_to((r.x1, r.y1));
    p.line_to((r.x0, r.y1));
    p.close_path();
    p
}

#[inline]
fn apply_extend_sample(t: f64, extend: Extend) -> f64 {
    match extend {
        Extend::Pad => t.clamp(0.0, 1.0),
        Extend::Repeat => t - t.floor(),
        Extend::Reflect => {
            let t = t.abs();
            let period = t.rem_euclid(2.0);
            if period > 1.0 {
                2.0 - period
            } else {
                period
            }
        }
    }
}

fn stops_from(stops: &[(f32, Color)]) -> peniko::ColorStops {
    let stops: Vec<ColorStop> = stops.iter().map(|&(offset, color)| ColorStop::from((offset, color))).collect();
    peniko::ColorStops::from(stops.as_slice())
}

/// Walks every surface pixel whose clip coverage is nonzero, compositing
/// `src(x, y)` over the destination with `shape`'s coverage, `global_alpha`,
/// and the clip's coverage all folded into the effective source weight.
/// Pixels entirely outside the clip are left untouched, which is also what
/// makes the "whole surface" Porter-Duff operators realize correctly within
/// clip bounds (see `crate::compositor`): the walk always covers the full
/// clipped region, and zero shape coverage there still participates in the
/// operator's math rather than being skipped.
/// Walks the region `op` can affect and composites `src_at(x, y)` into
/// `surface` at each pixel whose clip coverage is nonzero.
///
/// Operators that only touch pixels the shape covers (everything but the
/// "whole surface" set in [`crate::compositor::whole_surface`]) restrict the
/// walk to the shape's own bounding box: `src_at` is typically a paint
/// evaluation (a matrix multiply plus a gradient/pattern lookup) and is the
/// expensive part of this loop, so skipping it outside the shape is the
/// point of the bound. Operators that can erase or reveal pixels the shape
/// doesn't cover still need the full surface walked.
fn composite_loop(
    surface: &mut Surface,
    shape: &CoverageMask,
    clip: &ClipMask,
    global_alpha: f32,
    op: CompositeOp,
    mut src_at: impl FnMut(usize, usize) -> Color,
) {
    let (x0, y0, x1, y1) = if whole_surface(op) {
        (0, 0, surface.width, surface.height)
    } else {
        match shape.bounds() {
            Some(bounds) => bounds,
            None => return,
        }
    };

    for y in y0..y1 {
        for x in x0..x1 {
            let clip_c = clip.coverage(x as i64, y as i64);
            if clip_c <= 0.0 {
                continue;
            }
            let shape_c = shape.get(x as i64, y as i64);
            let weight = shape_c * global_alpha * clip_c;
            let src = src_at(x, y);
            let dst = surface.get_pixel(x, y);
            let out = composite_pixel(dst, src, weight, op);
            surface.set_pixel(x, y, out);
        }
    }
}

impl ResourceBackend for CanvasContext {
    fn create_path(&mut self, desc: PathDesc) -> PathId {
        let id = self.paths.len() as u32;
        self.paths.push(Some(desc.to_bez_path()));
        PathId(id)
    }

    fn destroy_path(&mut self, id: PathId) {
        if let Some(slot) = self.paths.get_mut(id.0 as usize) {
            *slot = None;
        }
    }

    fn create_image(&mut self, desc: ImageDesc, pixels: &[u8]) -> ImageId {
        let id = self.images.len() as u32;
        self.images.push(Some(ImageEntry { desc, pixels: pixels.to_vec() }));
        ImageId(id)
    }

    fn destroy_image(&mut self, id: ImageId) {
        if let Some(slot) = self.images.get_mut(id.0 as usize) {
            *slot = None;
        }
    }

    fn create_paint(&mut self, desc: PaintDesc) -> PaintId {
        let id = self.paints.len() as u32;
        self.paints.push(Some(PaintEntry { brush: desc.brush, pattern_transform: Affine::IDENTITY }));
        PaintId(id)
    }

    fn destroy_paint(&mut self, id: PaintId) {
        if let Some(slot) = self.paints.get_mut(id.0 as usize) {
            *slot = None;
        }
    }
}

impl ImagingBackend for CanvasContext {
    fn state(&mut self, op: StateOp) {
        match op {
            StateOp::SetTransform(xf) => self.state.current_mut().transform = xf,
            StateOp::SetFillPaint(p) => self.state.current_mut().fill_paint = p,
            StateOp::SetStrokePaint(p) => self.state.current_mut().stroke_paint = p,
            StateOp::SetStroke(s) => self.state.current_mut().stroke = s,
            StateOp::SetFillRule(r) => self.state.current_mut().fill_rule = r,
            StateOp::SetGlobalAlpha(a) => self.state.current_mut().global_alpha = a,
            StateOp::SetCompositeOp(op) => self.state.current_mut().composite_op = op,
            StateOp::SetShadow(s) => self.state.current_mut().shadow = s,
            StateOp::Clip { path, fill_rule } => self.apply_clip(path, fill_rule),
            StateOp::Save => self.state.save(),
            StateOp::Restore => self.state.restore(),
        }
    }

    fn draw(&mut self, op: DrawOp) {
        match op {
            DrawOp::FillPath(path) => {
                let fill_rule = self.state.current().fill_rule;
                let paint = self.state.current().fill_paint;
                self.fill_bez_by_id(path, fill_rule, paint);
            }
            DrawOp::StrokePath(path) => {
                let paint = self.state.current().stroke_paint;
                self.stroke_bez_by_id(path, paint);
            }
            DrawOp::FillRect(rect) => {
                let fill_rule = self.state.current().fill_rule;
                let paint = self.state.current().fill_paint;
                self.fill_bez(&rect_path(rect.to_kurbo()), fill_rule, paint);
            }
            DrawOp::StrokeRect(rect) => {
                let paint = self.state.current().stroke_paint;
                self.stroke_bez(&rect_path(rect.to_kurbo()), paint);
            }
            DrawOp::ClearRect(rect) => {
                let xf = self.state.current().transform;
                let device = transform_path(&rect_path(rect.to_kurbo()), xf);
                let polylines = flatten(&device, self.config.flatten_tolerance);
                let mask = rasterize(&polylines, self.surface.width, self.surface.height, FillRule::NonZero);
                let clip = self.state.current().clip.clone();
                composite_loop(&mut self.surface, &mask, &clip, 1.0, CompositeOp::Clear, |_, _| Color::TRANSPARENT);
            }
            DrawOp::DrawImage { image, transform, sampler } => {
                let ctm = self.state.current().transform;
                self.draw_image_internal(image, ctm * transform, sampler, &unit_square_path());
            }
            DrawOp::DrawImageRect { image, src, dst, sampler } => {
                self.draw_image_rect_internal(image, src, dst, sampler);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvas2d_imaging::ImagingBackendExt;

    fn opaque(r: f32, g: f32, b: f32) -> Color {
        Color::new([r, g, b, 1.0])
    }

    #[test]
    fn fill_rect_writes_opaque_color() {
        let mut ctx = CanvasContext::new(8, 8);
        let red = ctx.create_solid_paint(opaque(1.0, 0.0, 0.0));
        ctx.set_fill_paint(red);
        ctx.fill_rect(1.0, 1.0, 4.0, 4.0);
        let px = ctx.surface().get_pixel(2, 2);
        assert!((px.components[0] - 1.0).abs() < 0.01);
        assert!((px.components[3] - 1.0).abs() < 0.01);
        // Outside the rect stays transparent.
        let outside = ctx.surface().get_pixel(7, 7);
        assert_eq!(outside.components[3], 0.0);
    }

    #[test]
    fn clear_rect_erases_to_transparent() {
        let mut ctx = CanvasContext::new(4, 4);
        let white = ctx.create_solid_paint(opaque(1.0, 1.0, 1.0));
        ctx.set_fill_paint(white);
        ctx.fill_rect(0.0, 0.0, 4.0, 4.0);
        ctx.clear_rect(1.0, 1.0, 2.0, 2.0);
        assert_eq!(ctx.surface().get_pixel(2, 2).components[3], 0.0);
        assert!(ctx.surface().get_pixel(0, 0).components[3] > 0.9);
    }

    #[test]
    fn save_restore_preserves_fill_paint_across_changes() {
        let mut ctx = CanvasContext::new(4, 4);
        let red = ctx.create_solid_paint(opaque(1.0, 0.0, 0.0));
        let blue = ctx.create_solid_paint(opaque(0.0, 0.0, 1.0));
        ctx.set_fill_paint(red);
        ctx.save();
        ctx.set_fill_paint(blue);
        ctx.restore();
        ctx.fill_rect(0.0, 0.0, 4.0, 4.0);
        assert!((ctx.surface().get_pixel(1, 1).components[0] - 1.0).abs() < 0.01);
    }

    #[test]
    fn clip_restricts_subsequent_fills() {
        let mut ctx = CanvasContext::new(10, 10);
        ctx.path_rect(2.0, 2.0, 3.0, 3.0);
        ctx.clip(None);
        ctx.begin_path();
        let white = ctx.create_solid_paint(opaque(1.0, 1.0, 1.0));
        ctx.set_fill_paint(white);
        ctx.fill_rect(0.0, 0.0, 10.0, 10.0);
        assert!(ctx.surface().get_pixel(3, 3).components[0] > 0.9);
        assert_eq!(ctx.surface().get_pixel(8, 8).components[3], 0.0);
    }

    #[test]
    fn path_fill_follows_current_transform() {
        let mut ctx = CanvasContext::new(20, 20);
        let white = ctx.create_solid_paint(opaque(1.0, 1.0, 1.0));
        ctx.set_fill_paint(white);
        ctx.translate(10.0, 10.0);
        ctx.path_rect(-2.0, -2.0, 4.0, 4.0);
        ctx.fill(None);
        assert!(ctx.surface().get_pixel(10, 10).components[3] > 0.9);
        assert_eq!(ctx.surface().get_pixel(0, 0).components[3], 0.0);
    }

    #[test]
    fn hit_test_matches_filled_region() {
        let mut ctx = CanvasContext::new(20, 20);
        ctx.path_rect(5.0, 5.0, 5.0, 5.0);
        assert!(ctx.is_point_in_path(7.0, 7.0, None));
        assert!(!ctx.is_point_in_path(15.0, 15.0, None));
    }

    #[test]
    fn with_saved_state_from_the_ext_trait_restores_after_drawing() {
        let mut ctx = CanvasContext::new(4, 4);
        ctx.with_saved_state(|c| {
            c.state(StateOp::SetGlobalAlpha(0.2));
        });
        assert!((ctx.state.current().global_alpha - 1.0).abs() < 1e-6);
    }

    #[test]
    fn draw_image_places_pixels_at_destination() {
        let mut ctx = CanvasContext::new(10, 10);
        let pixels = alloc::vec![255_u8, 0, 0, 255, 0, 255, 0, 255, 0, 0, 255, 255, 255, 255, 0, 255];
        let image = ctx.create_image(
            ImageDesc { width: 2, height: 2, format: ImageFormat::Rgba8, alpha_type: ImageAlphaType::Alpha },
            &pixels,
        );
        ctx.draw_image_scaled(image, 2.0, 2.0, 4.0, 4.0);
        let px = ctx.surface().get_pixel(3, 3);
        assert!(px.components[3] > 0.9);
    }

    #[test]
    fn create_pattern_reports_invalid_paint_for_a_zero_area_image() {
        let mut ctx = CanvasContext::new(4, 4);
        let image = ctx.create_image(
            ImageDesc { width: 0, height: 0, format: ImageFormat::Rgba8, alpha_type: ImageAlphaType::Alpha },
            &[],
        );
        let err = ctx.create_pattern(image, PatternRepeat::Repeat, Affine::IDENTITY).unwrap_err();
        assert_eq!(err, ImagingError::InvalidPaint);
    }

    #[test]
    fn create_pattern_reports_invalid_paint_for_an_unknown_image() {
        let mut ctx = CanvasContext::new(4, 4);
        let err = ctx
            .create_pattern(ImageId(99), PatternRepeat::Repeat, Affine::IDENTITY)
            .unwrap_err();
        assert_eq!(err, ImagingError::InvalidPaint);
    }

    #[test]
    fn try_new_reports_resource_error_on_dimension_overflow() {
        let err = CanvasContext::try_new(usize::MAX, usize::MAX).unwrap_err();
        assert_eq!(err, ImagingError::Resource);
    }
}
