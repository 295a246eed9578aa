// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Fixed-function state that is coalesced and flushed right before a draw.
//!
//! Viewports, scissor rectangles and vertex buffers are frequently set one
//! slot at a time.  Recording each of those natively would cost one call per
//! slot, so they are accumulated here and flushed as one contiguous call per
//! run of changed slots.

use crate::imp::{NativeRecorder, VertexBinding};
use crate::resources::Buffer;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Viewport {
            x,
            y,
            width,
            height,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ScissorRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl ScissorRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        ScissorRect {
            x,
            y,
            width,
            height,
        }
    }
}

#[derive(Debug, Clone)]
struct VertexSlot {
    buffer: Buffer,
    offset: u64,
}

#[derive(Debug, Default)]
pub(crate) struct PendingState {
    viewports: Vec<Viewport>,
    viewports_dirty: bool,
    scissors: Vec<ScissorRect>,
    scissors_dirty: bool,
    vertex: Vec<Option<VertexSlot>>,
    /// Inclusive range of vertex slots changed since the last flush.
    vertex_dirty: Option<(usize, usize)>,
}

impl PendingState {
    pub fn set_viewport(&mut self, index: usize, viewport: Viewport) {
        if self.viewports.len() <= index {
            self.viewports.resize(index + 1, Viewport::new(0.0, 0.0, 0.0, 0.0));
        } else if self.viewports[index] == viewport {
            return;
        }
        self.viewports[index] = viewport;
        self.viewports_dirty = true;
    }

    pub fn set_scissor_rect(&mut self, index: usize, rect: ScissorRect) {
        if self.scissors.len() <= index {
            self.scissors.resize(index + 1, ScissorRect::default());
        } else if self.scissors[index] == rect {
            return;
        }
        self.scissors[index] = rect;
        self.scissors_dirty = true;
    }

    /// Returns false if the slot already held this exact binding.
    pub fn set_vertex_buffer(&mut self, index: usize, buffer: &Buffer, offset: u64) -> bool {
        if self.vertex.len() <= index {
            self.vertex.resize(index + 1, None);
        }
        if let Some(slot) = &self.vertex[index]
            && slot.buffer == *buffer
            && slot.offset == offset
        {
            return false;
        }
        self.vertex[index] = Some(VertexSlot {
            buffer: buffer.clone(),
            offset,
        });
        self.vertex_dirty = Some(match self.vertex_dirty {
            Some((low, high)) => (low.min(index), high.max(index)),
            None => (index, index),
        });
        true
    }

    /// Forces every bound slot to be re-sent on the next flush.
    pub fn mark_vertex_buffers_dirty(&mut self) {
        if !self.vertex.is_empty() {
            self.vertex_dirty = Some((0, self.vertex.len() - 1));
        }
    }

    /// Records every pending change.  `strides` comes from the bound pipeline.
    pub fn flush(&mut self, recorder: &mut dyn NativeRecorder, strides: &[u32]) {
        if std::mem::take(&mut self.viewports_dirty) {
            recorder.set_viewports(&self.viewports);
        }
        if std::mem::take(&mut self.scissors_dirty) {
            recorder.set_scissor_rects(&self.scissors);
        }
        let Some((low, high)) = self.vertex_dirty.take() else {
            return;
        };
        let mut run: Vec<VertexBinding> = Vec::new();
        let mut run_start = low;
        for index in low..=high {
            match &self.vertex[index] {
                Some(slot) => {
                    if run.is_empty() {
                        run_start = index;
                    }
                    run.push(VertexBinding {
                        buffer: slot.buffer.native(),
                        offset: slot.offset,
                        stride: strides.get(index).copied().unwrap_or(0),
                    });
                }
                None => {
                    if !run.is_empty() {
                        recorder.set_vertex_buffers(run_start as u32, &run);
                        run.clear();
                    }
                }
            }
        }
        if !run.is_empty() {
            recorder.set_vertex_buffers(run_start as u32, &run);
        }
    }

    pub fn reset(&mut self) {
        *self = PendingState::default();
    }
}
