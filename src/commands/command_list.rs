// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The command list: records GPU work against a native recording context.

A command list keeps a shadow of the state it has recorded (pipelines, bound
resource sets, vertex and index buffers, framebuffer) so that redundant
native calls are elided and binding hazards can be resolved before they
reach the backend.  The shadow state is dropped whenever a recording begins
or ends; nothing carries over from one recording to the next.

Recording takes `&mut self`.  A command list is `Send`, so several lists can
record on different threads against one [`Device`].
*/

use crate::bindings::resource_set::{BoundResourceSetInfo, ResourceSet};
use crate::bindings::resource_tracking::{BindMode, BoundViewInfo, Polarity};
use crate::bindings::visible_to::{BufferUsage, TextureUsage};
use crate::commands::activation::{BindContext, BindingState};
use crate::commands::lifecycle::{CommandListId, CommandListState, Lifecycle};
use crate::commands::pending::{PendingState, ScissorRect, Viewport};
use crate::device::{Device, check_range};
use crate::error::Error;
use crate::framebuffer::Framebuffer;
use crate::imp::{NativeCommandBuffer, NativeRecorder};
use crate::pipeline::{Pipeline, PipelineKind};
use crate::pixel_formats::IndexFormat;
use crate::resources::{Buffer, BufferDescription, ResourceId, Texture, TextureCopy};
use std::future::Future;
use std::sync::Arc;

use CommandListState::*;

#[derive(Debug, Clone)]
struct IndexBinding {
    buffer: Buffer,
    format: IndexFormat,
    offset: u64,
}

#[derive(Debug)]
pub struct CommandList {
    id: CommandListId,
    device: Device,
    lifecycle: Arc<Lifecycle>,
    recorder: Option<Box<dyn NativeRecorder>>,
    finished: Option<NativeCommandBuffer>,
    bindings: BindingState,
    pending: PendingState,
    graphics_pipeline: Option<Pipeline>,
    compute_pipeline: Option<Pipeline>,
    last_pipeline_kind: Option<PipelineKind>,
    framebuffer: Option<Framebuffer>,
    index_buffer: Option<IndexBinding>,
    debug_depth: u32,
}

/// The active recording context, or the lifecycle error for `operation`.
fn active<'a>(
    lifecycle: &Lifecycle,
    recorder: &'a mut Option<Box<dyn NativeRecorder>>,
    operation: &'static str,
) -> Result<&'a mut dyn NativeRecorder, Error> {
    lifecycle.require(operation, &[Recording])?;
    match recorder {
        Some(recorder) => Ok(recorder.as_mut()),
        None => Err(Error::WrongLifecycle {
            operation,
            state: lifecycle.state(),
        }),
    }
}

impl CommandList {
    pub(crate) fn new(device: Device) -> Self {
        let id = CommandListId::next();
        let trace = device.options().trace_bindings;
        CommandList {
            id,
            device,
            lifecycle: Lifecycle::new(id),
            recorder: None,
            finished: None,
            bindings: BindingState::new(trace),
            pending: PendingState::default(),
            graphics_pipeline: None,
            compute_pipeline: None,
            last_pipeline_kind: None,
            framebuffer: None,
            index_buffer: None,
            debug_depth: 0,
        }
    }

    pub fn id(&self) -> CommandListId {
        self.id
    }

    pub fn state(&self) -> CommandListState {
        self.lifecycle.state()
    }

    fn clear_managed_state(&mut self) {
        self.bindings.reset();
        self.pending.reset();
        self.graphics_pipeline = None;
        self.compute_pipeline = None;
        self.last_pipeline_kind = None;
        self.framebuffer = None;
        self.index_buffer = None;
        self.debug_depth = 0;
    }

    /// Starts a recording.
    ///
    /// Allowed from `Initial`, `Completed` and `Ended` (which discards the
    /// unsubmitted recording).  Fails with [`Error::WrongLifecycle`] while
    /// `Recording` or `Submitted`.
    pub fn begin(&mut self) -> Result<(), Error> {
        self.lifecycle
            .require("begin", &[Initial, Ended, Completed])?;
        let recorder = self.device.backend().create_recorder()?;
        let from = self
            .lifecycle
            .transition("begin", &[Initial, Ended, Completed], Recording)?;
        self.finished = None;
        self.clear_managed_state();
        self.recorder = Some(recorder);
        logwise::info_sync!(
            "Began command list {list} from {from}",
            list = logwise::privacy::LogIt(&self.id),
            from = logwise::privacy::LogIt(&from)
        );
        Ok(())
    }

    /// Finalizes the recording.
    pub fn end(&mut self) -> Result<(), Error> {
        self.lifecycle.require("end", &[Recording])?;
        let Some(mut recorder) = self.recorder.take() else {
            return Err(Error::WrongLifecycle {
                operation: "end",
                state: self.state(),
            });
        };
        if self.debug_depth > 0 {
            logwise::warn_sync!(
                "Closing {open} debug groups left open at end",
                open = self.debug_depth
            );
            if self.markers_enabled() {
                for _ in 0..self.debug_depth {
                    recorder.pop_debug_group();
                }
            }
        }
        let finished = recorder.finish();
        self.clear_managed_state();
        match finished {
            Ok(commands) => {
                self.finished = Some(commands);
                self.lifecycle.transition("end", &[Recording], Ended)?;
                logwise::info_sync!("Ended command list {list}", list = logwise::privacy::LogIt(&self.id));
                Ok(())
            }
            Err(err) => {
                self.lifecycle.transition("end", &[Recording], Initial)?;
                Err(err)
            }
        }
    }

    /// Discards any recording and returns to `Initial`.
    ///
    /// Fails with [`Error::WrongLifecycle`] while `Submitted`.
    pub fn reset(&mut self) -> Result<(), Error> {
        self.lifecycle
            .transition("reset", &[Initial, Recording, Ended, Completed], Initial)?;
        self.recorder = None;
        self.finished = None;
        self.clear_managed_state();
        Ok(())
    }

    /// Resolves once the submitted list has completed.
    ///
    /// Fails with [`Error::WrongLifecycle`] if the list is neither submitted nor completed.
    pub fn completion(&self) -> impl Future<Output = Result<(), Error>> + 'static {
        let lifecycle = self.lifecycle.clone();
        async move { lifecycle.completed().await }
    }

    pub(crate) fn prepare_submit(&mut self) -> Result<(NativeCommandBuffer, Arc<Lifecycle>), Error> {
        self.lifecycle.require("submit", &[Ended])?;
        let commands = self.finished.take().ok_or_else(|| {
            Error::InvalidState("the finalized commands were lost by a failed submission; record again".to_string())
        })?;
        self.lifecycle.transition("submit", &[Ended], Submitted)?;
        Ok((commands, self.lifecycle.clone()))
    }

    /// The finalized native commands, between `end` and `submit`.
    pub fn native_commands(&self) -> Option<&NativeCommandBuffer> {
        self.finished.as_ref()
    }

    pub fn bound_pipeline(&self) -> Option<&Pipeline> {
        self.graphics_pipeline.as_ref()
    }

    pub fn bound_compute_pipeline(&self) -> Option<&Pipeline> {
        self.compute_pipeline.as_ref()
    }

    pub fn bound_framebuffer(&self) -> Option<&Framebuffer> {
        self.framebuffer.as_ref()
    }

    pub fn bound_resource_set(&self, kind: PipelineKind, slot: u32) -> Option<&BoundResourceSetInfo> {
        self.bindings.bound_set(kind.bind_mode(), slot as usize)
    }

    /// Whether `slot` awaits reactivation before the next draw or dispatch.
    pub fn is_resource_set_invalidated(&self, kind: PipelineKind, slot: u32) -> bool {
        self.bindings.is_invalidated(kind.bind_mode(), slot as usize)
    }

    /// Native binds currently holding `resource` for reading or writing.
    pub fn bound_views(&self, resource: ResourceId, polarity: Polarity) -> &[BoundViewInfo] {
        self.bindings.binds(resource, polarity)
    }

    pub fn available_staging_buffers(&self) -> Vec<ResourceId> {
        self.lifecycle.with_staging(|pool| pool.available())
    }

    pub fn submitted_staging_buffers(&self) -> Vec<ResourceId> {
        self.lifecycle.with_staging(|pool| pool.submitted())
    }

    pub fn set_pipeline(&mut self, pipeline: &Pipeline) -> Result<(), Error> {
        let recorder = active(&self.lifecycle, &mut self.recorder, "set_pipeline")?;
        let kind = pipeline.kind();
        self.last_pipeline_kind = Some(kind);
        let bound = match kind {
            PipelineKind::Graphics => &mut self.graphics_pipeline,
            PipelineKind::Compute => &mut self.compute_pipeline,
        };
        if bound.as_ref() == Some(pipeline) {
            return Ok(());
        }
        recorder.set_pipeline(pipeline.native());
        self.bindings
            .configure(kind.bind_mode(), pipeline.resource_layouts());
        if kind == PipelineKind::Graphics {
            self.pending.mark_vertex_buffers_dirty();
        }
        *bound = Some(pipeline.clone());
        Ok(())
    }

    /// Binds `set` for whichever pipeline kind was bound most recently.
    pub fn set_resource_set(&mut self, slot: u32, set: &ResourceSet, dynamic_offsets: &[u32]) -> Result<(), Error> {
        let Some(kind) = self.last_pipeline_kind else {
            self.lifecycle.require("set_resource_set", &[Recording])?;
            return Err(Error::InvalidState(
                "set_resource_set requires a bound pipeline".to_string(),
            ));
        };
        self.bind_set(kind.bind_mode(), slot, set, dynamic_offsets)
    }

    pub fn set_graphics_resource_set(
        &mut self,
        slot: u32,
        set: &ResourceSet,
        dynamic_offsets: &[u32],
    ) -> Result<(), Error> {
        self.bind_set(BindMode::Graphics, slot, set, dynamic_offsets)
    }

    pub fn set_compute_resource_set(
        &mut self,
        slot: u32,
        set: &ResourceSet,
        dynamic_offsets: &[u32],
    ) -> Result<(), Error> {
        self.bind_set(BindMode::Compute, slot, set, dynamic_offsets)
    }

    fn bind_set(&mut self, mode: BindMode, slot: u32, set: &ResourceSet, dynamic_offsets: &[u32]) -> Result<(), Error> {
        let recorder = active(&self.lifecycle, &mut self.recorder, "set_resource_set")?;
        let mut ctx = BindContext {
            recorder,
            capabilities: self.device.capabilities(),
            backend_name: self.device.backend_name(),
        };
        self.bindings
            .set_resource_set(&mut ctx, mode, slot as usize, set, dynamic_offsets)?;
        Ok(())
    }

    /// Binds a vertex buffer.  The native call is deferred to the next draw.
    pub fn set_vertex_buffer(&mut self, index: u32, buffer: &Buffer, offset: u64) -> Result<(), Error> {
        let recorder = active(&self.lifecycle, &mut self.recorder, "set_vertex_buffer")?;
        if !buffer.usage().contains(BufferUsage::VERTEX_BUFFER) {
            return Err(Error::InvalidState(format!(
                "{} was not created as a vertex buffer",
                buffer.description().debug_name
            )));
        }
        check_range(buffer, offset, 0)?;
        if self.pending.set_vertex_buffer(index as usize, buffer, offset) {
            self.bindings
                .unbind(recorder, buffer.id(), Polarity::Write, None);
        }
        Ok(())
    }

    pub fn set_index_buffer(&mut self, buffer: &Buffer, format: IndexFormat, offset: u64) -> Result<(), Error> {
        let recorder = active(&self.lifecycle, &mut self.recorder, "set_index_buffer")?;
        if !buffer.usage().contains(BufferUsage::INDEX_BUFFER) {
            return Err(Error::InvalidState(format!(
                "{} was not created as an index buffer",
                buffer.description().debug_name
            )));
        }
        check_range(buffer, offset, 0)?;
        if offset % u64::from(format.byte_size()) != 0 {
            return Err(Error::InvalidState(format!(
                "index buffer offset {offset} is not a multiple of the {format:?} index size"
            )));
        }
        if let Some(bound) = &self.index_buffer
            && bound.buffer == *buffer
            && bound.format == format
            && bound.offset == offset
        {
            return Ok(());
        }
        self.bindings
            .unbind(recorder, buffer.id(), Polarity::Write, None);
        recorder.set_index_buffer(buffer.native(), format, offset);
        self.index_buffer = Some(IndexBinding {
            buffer: buffer.clone(),
            format,
            offset,
        });
        Ok(())
    }

    /// Binds render targets.
    ///
    /// Any read bind of a target is cleared first, viewport 0 and scissor 0
    /// are reset to cover the framebuffer, and a swapchain framebuffer keeps
    /// its swapchain referenced until this list completes.
    pub fn set_framebuffer(&mut self, framebuffer: &Framebuffer) -> Result<(), Error> {
        let recorder = active(&self.lifecycle, &mut self.recorder, "set_framebuffer")?;
        if self.framebuffer.as_ref() == Some(framebuffer) {
            return Ok(());
        }
        for target in framebuffer
            .color_targets()
            .iter()
            .chain(framebuffer.depth_target())
        {
            self.bindings
                .unbind(recorder, target.id(), Polarity::Read, None);
        }
        recorder.set_framebuffer(framebuffer.native());
        if let Some(references) = framebuffer.swapchain() {
            self.lifecycle.reference_swapchain(references);
        }
        let (width, height) = (framebuffer.width(), framebuffer.height());
        self.pending
            .set_viewport(0, Viewport::new(0.0, 0.0, width as f32, height as f32));
        self.pending
            .set_scissor_rect(0, ScissorRect::new(0, 0, width, height));
        self.framebuffer = Some(framebuffer.clone());
        Ok(())
    }

    fn require_framebuffer(&self, operation: &str) -> Result<&Framebuffer, Error> {
        self.framebuffer
            .as_ref()
            .ok_or_else(|| Error::InvalidState(format!("{operation} requires a bound framebuffer")))
    }

    pub fn set_viewport(&mut self, index: u32, viewport: Viewport) -> Result<(), Error> {
        self.lifecycle.require("set_viewport", &[Recording])?;
        self.pending.set_viewport(index as usize, viewport);
        Ok(())
    }

    /// Sets viewport `index` to cover the bound framebuffer.
    pub fn set_full_viewport(&mut self, index: u32) -> Result<(), Error> {
        self.lifecycle.require("set_full_viewport", &[Recording])?;
        let framebuffer = self.require_framebuffer("set_full_viewport")?;
        let viewport = Viewport::new(0.0, 0.0, framebuffer.width() as f32, framebuffer.height() as f32);
        self.pending.set_viewport(index as usize, viewport);
        Ok(())
    }

    /// Sets one full viewport per color target.
    pub fn set_full_viewports(&mut self) -> Result<(), Error> {
        self.lifecycle.require("set_full_viewports", &[Recording])?;
        let framebuffer = self.require_framebuffer("set_full_viewports")?;
        let count = framebuffer.color_targets().len().max(1);
        let viewport = Viewport::new(0.0, 0.0, framebuffer.width() as f32, framebuffer.height() as f32);
        for index in 0..count {
            self.pending.set_viewport(index, viewport);
        }
        Ok(())
    }

    pub fn set_scissor_rect(&mut self, index: u32, rect: ScissorRect) -> Result<(), Error> {
        self.lifecycle.require("set_scissor_rect", &[Recording])?;
        self.pending.set_scissor_rect(index as usize, rect);
        Ok(())
    }

    pub fn set_full_scissor_rect(&mut self, index: u32) -> Result<(), Error> {
        self.lifecycle.require("set_full_scissor_rect", &[Recording])?;
        let framebuffer = self.require_framebuffer("set_full_scissor_rect")?;
        let rect = ScissorRect::new(0, 0, framebuffer.width(), framebuffer.height());
        self.pending.set_scissor_rect(index as usize, rect);
        Ok(())
    }

    pub fn set_full_scissor_rects(&mut self) -> Result<(), Error> {
        self.lifecycle.require("set_full_scissor_rects", &[Recording])?;
        let framebuffer = self.require_framebuffer("set_full_scissor_rects")?;
        let count = framebuffer.color_targets().len().max(1);
        let rect = ScissorRect::new(0, 0, framebuffer.width(), framebuffer.height());
        for index in 0..count {
            self.pending.set_scissor_rect(index, rect);
        }
        Ok(())
    }

    pub fn clear_color_target(&mut self, index: u32, color: [f32; 4]) -> Result<(), Error> {
        self.lifecycle.require("clear_color_target", &[Recording])?;
        let targets = self
            .require_framebuffer("clear_color_target")?
            .color_targets()
            .len();
        if index as usize >= targets {
            return Err(Error::InvalidState(format!(
                "color target {index} does not exist; the framebuffer has {targets}"
            )));
        }
        let recorder = active(&self.lifecycle, &mut self.recorder, "clear_color_target")?;
        recorder.clear_color_target(index, color);
        Ok(())
    }

    pub fn clear_depth_stencil(&mut self, depth: f32, stencil: u8) -> Result<(), Error> {
        self.lifecycle.require("clear_depth_stencil", &[Recording])?;
        if self
            .require_framebuffer("clear_depth_stencil")?
            .depth_target()
            .is_none()
        {
            return Err(Error::InvalidState(
                "the bound framebuffer has no depth target".to_string(),
            ));
        }
        let recorder = active(&self.lifecycle, &mut self.recorder, "clear_depth_stencil")?;
        recorder.clear_depth_stencil(depth, stencil);
        Ok(())
    }

    /// Flushes coalesced state and reactivates invalidated graphics sets.
    fn pre_draw(&mut self, operation: &'static str) -> Result<&mut dyn NativeRecorder, Error> {
        let recorder = active(&self.lifecycle, &mut self.recorder, operation)?;
        let Some(pipeline) = &self.graphics_pipeline else {
            return Err(Error::InvalidState(format!(
                "{operation} requires a bound graphics pipeline"
            )));
        };
        if let Some(slot) = self.bindings.missing_set(BindMode::Graphics) {
            return Err(Error::InvalidState(format!(
                "{operation}: resource set slot {slot} of the graphics pipeline is unbound"
            )));
        }
        self.pending.flush(recorder, pipeline.vertex_strides());
        let mut ctx = BindContext {
            recorder,
            capabilities: self.device.capabilities(),
            backend_name: self.device.backend_name(),
        };
        self.bindings.flush(&mut ctx, BindMode::Graphics)?;
        Ok(ctx.recorder)
    }

    fn pre_dispatch(&mut self, operation: &'static str) -> Result<&mut dyn NativeRecorder, Error> {
        let recorder = active(&self.lifecycle, &mut self.recorder, operation)?;
        if !self.device.capabilities().compute {
            return Err(Error::unsupported(self.device.backend_name(), "compute dispatch"));
        }
        if self.compute_pipeline.is_none() {
            return Err(Error::InvalidState(format!(
                "{operation} requires a bound compute pipeline"
            )));
        }
        if let Some(slot) = self.bindings.missing_set(BindMode::Compute) {
            return Err(Error::InvalidState(format!(
                "{operation}: resource set slot {slot} of the compute pipeline is unbound"
            )));
        }
        let mut ctx = BindContext {
            recorder,
            capabilities: self.device.capabilities(),
            backend_name: self.device.backend_name(),
        };
        self.bindings.flush(&mut ctx, BindMode::Compute)?;
        Ok(ctx.recorder)
    }

    fn require_index_buffer(&self, operation: &str) -> Result<(), Error> {
        if self.index_buffer.is_none() {
            return Err(Error::InvalidState(format!(
                "{operation} requires a bound index buffer"
            )));
        }
        Ok(())
    }

    fn require_indirect(buffer: &Buffer, offset: u64, draw_count: u32, stride: u32, record: u64) -> Result<(), Error> {
        if !buffer.usage().contains(BufferUsage::INDIRECT_BUFFER) {
            return Err(Error::InvalidState(format!(
                "{} was not created as an indirect buffer",
                buffer.description().debug_name
            )));
        }
        if draw_count == 0 {
            return Ok(());
        }
        let span = u64::from(draw_count - 1) * u64::from(stride) + record;
        check_range(buffer, offset, span)
    }

    pub fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) -> Result<(), Error> {
        let recorder = self.pre_draw("draw")?;
        recorder.draw(vertex_count, instance_count, first_vertex, first_instance);
        Ok(())
    }

    pub fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) -> Result<(), Error> {
        self.require_index_buffer("draw_indexed")?;
        let recorder = self.pre_draw("draw_indexed")?;
        recorder.draw_indexed(index_count, instance_count, first_index, vertex_offset, first_instance);
        Ok(())
    }

    /// Draws from `draw_count` argument records `stride` bytes apart.
    ///
    /// Backends without multi-draw indirect get one native call per record.
    pub fn draw_indirect(&mut self, buffer: &Buffer, offset: u64, draw_count: u32, stride: u32) -> Result<(), Error> {
        Self::require_indirect(buffer, offset, draw_count, stride, 16)?;
        let multi = self.device.capabilities().multi_draw_indirect;
        let recorder = self.pre_draw("draw_indirect")?;
        if multi || draw_count <= 1 {
            recorder.draw_indirect(buffer.native(), offset, draw_count, stride);
        } else {
            for record in 0..u64::from(draw_count) {
                recorder.draw_indirect(buffer.native(), offset + record * u64::from(stride), 1, stride);
            }
        }
        Ok(())
    }

    pub fn draw_indexed_indirect(&mut self, buffer: &Buffer, offset: u64, draw_count: u32, stride: u32) -> Result<(), Error> {
        Self::require_indirect(buffer, offset, draw_count, stride, 20)?;
        self.require_index_buffer("draw_indexed_indirect")?;
        let multi = self.device.capabilities().multi_draw_indirect;
        let recorder = self.pre_draw("draw_indexed_indirect")?;
        if multi || draw_count <= 1 {
            recorder.draw_indexed_indirect(buffer.native(), offset, draw_count, stride);
        } else {
            for record in 0..u64::from(draw_count) {
                recorder.draw_indexed_indirect(buffer.native(), offset + record * u64::from(stride), 1, stride);
            }
        }
        Ok(())
    }

    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<(), Error> {
        let recorder = self.pre_dispatch("dispatch")?;
        recorder.dispatch(x, y, z);
        Ok(())
    }

    pub fn dispatch_indirect(&mut self, buffer: &Buffer, offset: u64) -> Result<(), Error> {
        Self::require_indirect(buffer, offset, 1, 0, 12)?;
        let recorder = self.pre_dispatch("dispatch_indirect")?;
        recorder.dispatch_indirect(buffer.native(), offset);
        Ok(())
    }

    /// Records an update of `data` into `buffer` at `offset`.
    ///
    /// Uses a recorded region update when the buffer is device-local, a
    /// discard write when a dynamic buffer is replaced whole, and otherwise a
    /// pooled staging buffer and a recorded copy.
    pub fn update_buffer(&mut self, buffer: &Buffer, offset: u64, data: &[u8]) -> Result<(), Error> {
        let recorder = active(&self.lifecycle, &mut self.recorder, "update_buffer")?;
        if data.is_empty() {
            return Ok(());
        }
        let len = data.len() as u64;
        check_range(buffer, offset, len)?;
        let capabilities = self.device.capabilities();
        let usage = buffer.usage();
        let dynamic = usage.contains(BufferUsage::DYNAMIC);
        let staging = usage.contains(BufferUsage::STAGING);
        let uniform = usage.contains(BufferUsage::UNIFORM_BUFFER);
        let whole = offset == 0 && len == buffer.size();

        if !dynamic && !staging && (!uniform || whole) && capabilities.update_buffer_region {
            logwise::trace_sync!("update_buffer: region update of {len} bytes", len = len);
            recorder.update_buffer_region(buffer.native(), offset, data);
            return Ok(());
        }
        if dynamic && whole && capabilities.map_discard {
            logwise::trace_sync!("update_buffer: discard write of {len} bytes", len = len);
            recorder.write_buffer_discard(buffer.native(), data);
            return Ok(());
        }

        let backend = self.device.backend();
        let staging_buffer = self.lifecycle.with_staging(|pool| {
            pool.acquire(len, |size| {
                Buffer::new(
                    backend,
                    BufferDescription::new(size, BufferUsage::STAGING, "staging"),
                )
            })
        })?;
        if let Err(err) = backend.write_buffer(staging_buffer.native(), 0, data) {
            self.lifecycle
                .with_staging(|pool| pool.restore(staging_buffer));
            return Err(err);
        }
        logwise::trace_sync!(
            "update_buffer: staged copy of {len} bytes through {staging}",
            len = len,
            staging = logwise::privacy::LogIt(&staging_buffer.id())
        );
        recorder.copy_buffer(staging_buffer.native(), 0, buffer.native(), offset, len);
        self.lifecycle
            .with_staging(|pool| pool.mark_submitted(staging_buffer));
        Ok(())
    }

    pub fn copy_buffer(
        &mut self,
        source: &Buffer,
        source_offset: u64,
        destination: &Buffer,
        destination_offset: u64,
        size: u64,
    ) -> Result<(), Error> {
        let recorder = active(&self.lifecycle, &mut self.recorder, "copy_buffer")?;
        check_range(source, source_offset, size)?;
        check_range(destination, destination_offset, size)?;
        if source == destination
            && source_offset < destination_offset + size
            && destination_offset < source_offset + size
        {
            return Err(Error::InvalidState(format!(
                "copy within {} overlaps itself",
                source.description().debug_name
            )));
        }
        if size == 0 {
            return Ok(());
        }
        recorder.copy_buffer(source.native(), source_offset, destination.native(), destination_offset, size);
        Ok(())
    }

    pub fn copy_texture(&mut self, source: &Texture, destination: &Texture, region: &TextureCopy) -> Result<(), Error> {
        let recorder = active(&self.lifecycle, &mut self.recorder, "copy_texture")?;
        if source.description().format != destination.description().format {
            return Err(Error::InvalidState(format!(
                "cannot copy {:?} texels into a {:?} texture",
                source.description().format,
                destination.description().format
            )));
        }
        check_texture_region(source, region.source_origin, region.source_mip_level, region.source_base_array_layer, region)?;
        check_texture_region(
            destination,
            region.destination_origin,
            region.destination_mip_level,
            region.destination_base_array_layer,
            region,
        )?;
        recorder.copy_texture(source.native(), destination.native(), region);
        Ok(())
    }

    /// Resolves a multisampled texture into a single-sampled one of the same shape.
    pub fn resolve_texture(&mut self, source: &Texture, destination: &Texture) -> Result<(), Error> {
        let recorder = active(&self.lifecycle, &mut self.recorder, "resolve_texture")?;
        let (s, d) = (source.description(), destination.description());
        if s.sample_count <= 1 || d.sample_count != 1 {
            return Err(Error::InvalidState(format!(
                "resolve needs a multisampled source and a single-sampled destination, got {} and {}",
                s.sample_count, d.sample_count
            )));
        }
        if s.format != d.format || (s.width, s.height) != (d.width, d.height) {
            return Err(Error::InvalidState(format!(
                "cannot resolve {} into {}: format or size differ",
                s.debug_name, d.debug_name
            )));
        }
        recorder.resolve_texture(source.native(), destination.native());
        Ok(())
    }

    pub fn generate_mipmaps(&mut self, texture: &Texture) -> Result<(), Error> {
        let recorder = active(&self.lifecycle, &mut self.recorder, "generate_mipmaps")?;
        if !texture.usage().contains(TextureUsage::GENERATE_MIPMAPS) {
            return Err(Error::InvalidState(format!(
                "{} was not created with GENERATE_MIPMAPS usage",
                texture.description().debug_name
            )));
        }
        if texture.description().mip_levels > 1 {
            recorder.generate_mipmaps(texture.native());
        }
        Ok(())
    }

    fn markers_enabled(&self) -> bool {
        self.device.options().emit_debug_markers && self.device.capabilities().debug_markers
    }

    pub fn push_debug_group(&mut self, label: &str) -> Result<(), Error> {
        let enabled = self.markers_enabled();
        let recorder = active(&self.lifecycle, &mut self.recorder, "push_debug_group")?;
        self.debug_depth += 1;
        if enabled {
            recorder.push_debug_group(label);
        }
        Ok(())
    }

    /// Fails with [`Error::InvalidState`] if no group is open.
    pub fn pop_debug_group(&mut self) -> Result<(), Error> {
        let enabled = self.markers_enabled();
        let recorder = active(&self.lifecycle, &mut self.recorder, "pop_debug_group")?;
        if self.debug_depth == 0 {
            return Err(Error::InvalidState(
                "pop_debug_group without a matching push".to_string(),
            ));
        }
        self.debug_depth -= 1;
        if enabled {
            recorder.pop_debug_group();
        }
        Ok(())
    }

    pub fn insert_debug_marker(&mut self, label: &str) -> Result<(), Error> {
        let enabled = self.markers_enabled();
        let recorder = active(&self.lifecycle, &mut self.recorder, "insert_debug_marker")?;
        if enabled {
            recorder.insert_debug_marker(label);
        }
        Ok(())
    }
}

fn check_texture_region(
    texture: &Texture,
    origin: (u32, u32, u32),
    mip_level: u32,
    base_layer: u32,
    region: &TextureCopy,
) -> Result<(), Error> {
    let description = texture.description();
    let fail = || {
        Error::InvalidState(format!(
            "copy region {region:?} does not fit {name}",
            name = description.debug_name
        ))
    };
    if mip_level >= description.mip_levels
        || base_layer
            .checked_add(region.layer_count)
            .is_none_or(|end| end > description.array_layers)
    {
        return Err(fail());
    }
    let (width, height, depth) = description.mip_extent(mip_level);
    let fits = |start: u32, len: u32, max: u32| start.checked_add(len).is_some_and(|end| end <= max);
    if !fits(origin.0, region.extent.0, width)
        || !fits(origin.1, region.extent.1, height)
        || !fits(origin.2, region.extent.2, depth)
    {
        return Err(fail());
    }
    Ok(())
}
