// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The ambient graphics state and its `save()`/`restore()` stack.
//!
//! Every field here corresponds to a [`canvas2d_imaging::StateOp`] variant
//! except the current path, which lives separately on
//! [`crate::context::CanvasContext`] and survives `save()`/`restore()` by
//! design (matching the Canvas 2D contract: "the current path is not part
//! of the state").

extern crate alloc;

use crate::clip::ClipMask;
use alloc::vec::Vec;
use canvas2d_imaging::{Affine, CompositeOp, FillRule, PaintId, ShadowDesc, StrokeStyle};

/// One snapshot of the ambient graphics state.
#[derive(Clone, Debug)]
pub struct GraphicsState {
    /// Current transformation matrix.
    pub transform: Affine,
    /// Current clip region.
    pub clip: ClipMask,
    /// Current fill paint.
    pub fill_paint: PaintId,
    /// Current stroke paint.
    pub stroke_paint: PaintId,
    /// Current line width/cap/join/miter/dash state.
    pub stroke: StrokeStyle,
    /// Fill rule used by `fill()` and `clip()`.
    pub fill_rule: FillRule,
    /// Global alpha, multiplied into every draw's effective coverage.
    pub global_alpha: f32,
    /// Current Porter-Duff compositing operator.
    pub composite_op: CompositeOp,
    /// Current shadow parameters.
    pub shadow: ShadowDesc,
}

impl GraphicsState {
    /// The initial state for a freshly constructed context: identity
    /// transform, no clip, opaque black fill/stroke paint (`default_paint`),
    /// a hairline stroke, nonzero fill rule, full global alpha,
    /// `source-over` compositing, and no shadow.
    pub fn initial(default_paint: PaintId) -> Self {
        Self {
            transform: Affine::IDENTITY,
            clip: ClipMask::All,
            fill_paint: default_paint,
            stroke_paint: default_paint,
            stroke: StrokeStyle::new(1.0),
            fill_rule: FillRule::NonZero,
            global_alpha: 1.0,
            composite_op: CompositeOp::SrcOver,
            shadow: ShadowDesc::NONE,
        }
    }
}

/// The `save()`/`restore()` stack: the live state plus a depth-bounded
/// history of pushed snapshots.
#[derive(Clone, Debug)]
pub struct GraphicsStateStack {
    current: GraphicsState,
    saved: Vec<GraphicsState>,
    depth_limit: usize,
}

impl GraphicsStateStack {
    /// Creates a stack seeded with `initial`, bounding `save()` depth to
    /// `depth_limit` (the spec requires at least 32).
    pub fn new(initial: GraphicsState, depth_limit: usize) -> Self {
        Self { current: initial, saved: Vec::new(), depth_limit }
    }

    /// The live state.
    #[inline]
    pub fn current(&self) -> &GraphicsState {
        &self.current
    }

    /// Mutable access to the live state.
    #[inline]
    pub fn current_mut(&mut self) -> &mut GraphicsState {
        &mut self.current
    }

    /// Pushes a copy of the live state. Silently does nothing once
    /// `depth_limit` saved snapshots are already on the stack, matching the
    /// "implementation-defined depth bound" the spec allows.
    pub fn save(&mut self) {
        if self.saved.len() < self.depth_limit {
            self.saved.push(self.current.clone());
        }
    }

    /// Pops the most recently pushed state, replacing the live state with
    /// it. A no-op if the stack is empty (`restore()` underflow is a silent
    /// no-op per the Canvas 2D contract, not an error).
    pub fn restore(&mut self) {
        if let Some(prev) = self.saved.pop() {
            self.current = prev;
        }
    }

    /// Number of snapshots currently saved (depth of nested `save()` calls
    /// not yet matched by a `restore()`).
    #[inline]
    pub fn depth(&self) -> usize {
        self.saved.len()
    }
}
