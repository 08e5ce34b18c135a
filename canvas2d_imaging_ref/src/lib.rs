// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Canvas 2D Imaging Reference Backend.
//!
//! This crate provides a small, stateful implementation of
//! [`ImagingBackend`] and [`ResourceBackend`] for **IR recording and state
//! tracing**.
//!
//! It is intentionally *not* a "reference renderer":
//! - It does **not** rasterize to pixels.
//! - It does **not** establish "golden" rendering behavior across backends.
//! - It is intended primarily for tests and debugging that want to assert on
//!   emitted ops and the imaging state at the time each op is applied.

#![no_std]

extern crate alloc;

use alloc::vec::Vec;

use canvas2d_imaging::{
    Affine, CompositeOp, DrawOp, FillRule, ImageDesc, ImageId, ImagingBackend, ImagingOp, PaintId,
    PathDesc, PathId, ResourceBackend, ShadowDesc, StateOp, StrokeStyle,
};

/// Snapshot of the ambient graphics state inside the backend.
///
/// Mirrors the fields `save()`/`restore()` are defined to snapshot (the
/// current path is deliberately absent; see `StateOp` docs).
#[derive(Clone, Debug)]
pub struct StateSnapshot {
    /// Current transform.
    pub transform: Affine,
    /// Current fill paint, if set.
    pub fill_paint: Option<PaintId>,
    /// Current stroke paint, if set.
    pub stroke_paint: Option<PaintId>,
    /// Current stroke/line state.
    pub stroke: StrokeStyle,
    /// Current fill rule used by `fill()`/`clip()`.
    pub fill_rule: FillRule,
    /// Current global alpha.
    pub global_alpha: f32,
    /// Current compositing operator.
    pub composite_op: CompositeOp,
    /// Current shadow parameters.
    pub shadow: ShadowDesc,
    /// Number of `save()` calls not yet matched by a `restore()`.
    pub save_depth: u32,
}

impl Default for StateSnapshot {
    fn default() -> Self {
        Self {
            transform: Affine::IDENTITY,
            fill_paint: None,
            stroke_paint: None,
            stroke: StrokeStyle::new(1.0),
            fill_rule: FillRule::NonZero,
            global_alpha: 1.0,
            composite_op: CompositeOp::SrcOver,
            shadow: ShadowDesc::NONE,
            save_depth: 0,
        }
    }
}

/// Event recorded by the reference backend.
#[derive(Clone, Debug)]
pub enum Event {
    /// State operation and the resulting state snapshot.
    State {
        /// State operation that was applied.
        op: StateOp,
        /// Snapshot after applying the state operation.
        state: StateSnapshot,
    },
    /// Draw operation and the state snapshot used for drawing.
    Draw {
        /// Draw operation that was applied.
        op: DrawOp,
        /// Snapshot at the time of drawing.
        state: StateSnapshot,
    },
}

/// Simple reference implementation of the imaging backend.
///
/// This backend stores resource descriptors in vectors keyed by their IDs,
/// tracks the ambient state exactly as `StateOp` defines it (including a
/// plain `Vec<StateSnapshot>` playing the role of the graphics-state stack),
/// and records a high-level [`Event`] log as state and draw operations are
/// applied. It never rasterizes a pixel.
#[derive(Default, Debug)]
pub struct RefBackend {
    paths: Vec<Option<PathDesc>>,
    images: Vec<Option<(ImageDesc, Vec<u8>)>>,
    paints: Vec<Option<()>>,

    /// Log of events in the order they were applied.
    events: Vec<Event>,
    /// Underlying imaging ops, for callers that want the raw trace.
    ops: Vec<ImagingOp>,
    /// Current imaging state.
    state: StateSnapshot,
    /// Saved states, pushed by `StateOp::Save` and popped by `StateOp::Restore`.
    saved: Vec<StateSnapshot>,
}

impl RefBackend {
    /// Returns a slice of recorded events.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Returns a slice of raw imaging operations.
    pub fn ops(&self) -> &[ImagingOp] {
        &self.ops
    }

    /// Returns the current ambient state.
    pub fn state(&self) -> &StateSnapshot {
        &self.state
    }

    /// Clears all recorded events and ops but keeps resources and state.
    pub fn clear_events(&mut self) {
        self.events.clear();
        self.ops.clear();
    }
}

impl ResourceBackend for RefBackend {
    fn create_path(&mut self, desc: PathDesc) -> PathId {
        let id =
            u32::try_from(self.paths.len()).expect("RefBackend: too many paths for u32 PathId");
        self.paths.push(Some(desc));
        PathId(id)
    }

    fn destroy_path(&mut self, id: PathId) {
        let idx = id.0 as usize;
        if let Some(slot) = self.paths.get_mut(idx) {
            *slot = None;
        }
    }

    fn create_image(&mut self, desc: ImageDesc, pixels: &[u8]) -> ImageId {
        let id =
            u32::try_from(self.images.len()).expect("RefBackend: too many images for u32 ImageId");
        self.images.push(Some((desc, pixels.to_vec())));
        ImageId(id)
    }

    fn destroy_image(&mut self, id: ImageId) {
        let idx = id.0 as usize;
        if let Some(slot) = self.images.get_mut(idx) {
            *slot = None;
        }
    }

    fn create_paint(&mut self, _desc: canvas2d_imaging::PaintDesc) -> PaintId {
        let id =
            u32::try_from(self.paints.len()).expect("RefBackend: too many paints for u32 PaintId");
        self.paints.push(Some(()));
        PaintId(id)
    }

    fn destroy_paint(&mut self, id: PaintId) {
        let idx = id.0 as usize;
        if let Some(slot) = self.paints.get_mut(idx) {
            *slot = None;
        }
    }
}

impl ImagingBackend for RefBackend {
    fn state(&mut self, op: StateOp) {
        match &op {
            StateOp::SetTransform(xf) => self.state.transform = *xf,
            StateOp::SetFillPaint(id) => self.state.fill_paint = Some(*id),
            StateOp::SetStrokePaint(id) => self.state.stroke_paint = Some(*id),
            StateOp::SetStroke(style) => self.state.stroke = style.clone(),
            StateOp::SetFillRule(rule) => self.state.fill_rule = *rule,
            StateOp::SetGlobalAlpha(alpha) => self.state.global_alpha = *alpha,
            StateOp::SetCompositeOp(op) => self.state.composite_op = *op,
            StateOp::SetShadow(shadow) => self.state.shadow = *shadow,
            StateOp::Clip { .. } => {
                // The reference backend does not model clip masks; it only
                // records that a clip operation occurred (see `events()`).
            }
            StateOp::Save => {
                self.saved.push(self.state.clone());
                self.state.save_depth += 1;
            }
            StateOp::Restore => {
                if let Some(prev) = self.saved.pop() {
                    self.state = prev;
                }
            }
        }

        self.ops.push(ImagingOp::State(op.clone()));
        self.events.push(Event::State {
            op,
            state: self.state.clone(),
        });
    }

    fn draw(&mut self, op: DrawOp) {
        self.ops.push(ImagingOp::Draw(op.clone()));
        self.events.push(Event::Draw {
            op,
            state: self.state.clone(),
        });
    }
}
