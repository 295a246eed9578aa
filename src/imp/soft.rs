// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
A software backend that journals native calls and keeps buffers in host memory.

`SoftBackend` implements the backend interface without a GPU.  Recorders
append every call to a [`NativeCall`] journal; submitted journals queue up and
execute on [`poll`](crate::imp::Backend::poll), which applies buffer writes and
copies to host memory and then runs the completion callbacks.

It is the reference implementation of the backend contract and what the test
suite records against.  Any of the three capability profiles can be
emulated.

# Example

```
use std::sync::Arc;
use slots_and_stages::{Device, DeviceOptions};
use slots_and_stages::imp::Capabilities;
use slots_and_stages::imp::soft::SoftBackend;

let backend = Arc::new(SoftBackend::new(Capabilities::deferred_context()));
let device = Device::new(backend.clone(), DeviceOptions::default());
assert_eq!(device.backend_name(), backend.name_str());
```
*/

use crate::bindings::sampler::SamplerDescription;
use crate::bindings::visible_to::{BufferUsage, ShaderStage};
use crate::commands::pending::{ScissorRect, Viewport};
use crate::error::Error;
use crate::imp::{
    Backend, Capabilities, CompletionCallback, ConstantBufferBinding, NativeBuffer, NativeCommandBuffer,
    NativeFramebuffer, NativePipeline, NativeRecorder, NativeSampler, NativeTexture, NativeView, VertexBinding,
    ViewAccess, ViewKey,
};
use crate::pipeline::PipelineDescription;
use crate::pixel_formats::IndexFormat;
use crate::resources::buffer::BufferDescription;
use crate::resources::texture::{TextureCopy, TextureDescription};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

/// One recorded native call.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeCall {
    SetPipeline(NativePipeline),
    SetFramebuffer(NativeFramebuffer),
    SetConstantBuffer {
        stage: ShaderStage,
        slot: u32,
        binding: Option<ConstantBufferBinding>,
    },
    SetShaderResource {
        stage: ShaderStage,
        slot: u32,
        view: Option<NativeView>,
    },
    SetUnorderedAccess {
        stage: ShaderStage,
        slot: u32,
        view: Option<NativeView>,
    },
    SetSampler {
        stage: ShaderStage,
        slot: u32,
        sampler: NativeSampler,
    },
    SetVertexBuffers {
        first_slot: u32,
        bindings: Vec<VertexBinding>,
    },
    SetIndexBuffer {
        buffer: NativeBuffer,
        format: IndexFormat,
        offset: u64,
    },
    SetViewports(Vec<Viewport>),
    SetScissorRects(Vec<ScissorRect>),
    ClearColorTarget {
        index: u32,
        color: [f32; 4],
    },
    ClearDepthStencil {
        depth: f32,
        stencil: u8,
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    },
    DrawIndirect {
        buffer: NativeBuffer,
        offset: u64,
        draw_count: u32,
        stride: u32,
    },
    DrawIndexedIndirect {
        buffer: NativeBuffer,
        offset: u64,
        draw_count: u32,
        stride: u32,
    },
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },
    DispatchIndirect {
        buffer: NativeBuffer,
        offset: u64,
    },
    UpdateBufferRegion {
        buffer: NativeBuffer,
        offset: u64,
        data: Vec<u8>,
    },
    WriteBufferDiscard {
        buffer: NativeBuffer,
        data: Vec<u8>,
    },
    CopyBuffer {
        source: NativeBuffer,
        source_offset: u64,
        destination: NativeBuffer,
        destination_offset: u64,
        size: u64,
    },
    CopyTexture {
        source: NativeTexture,
        destination: NativeTexture,
        region: TextureCopy,
    },
    ResolveTexture {
        source: NativeTexture,
        destination: NativeTexture,
    },
    GenerateMipmaps(NativeTexture),
    PushDebugGroup(String),
    PopDebugGroup,
    InsertDebugMarker(String),
}

/// The finalized journal of one recorder.
#[derive(Debug, Clone, PartialEq)]
pub struct SoftCommandBuffer {
    calls: Vec<NativeCall>,
}

impl SoftCommandBuffer {
    pub fn calls(&self) -> &[NativeCall] {
        &self.calls
    }
}

#[derive(Debug, Default)]
pub struct SoftRecorder {
    calls: Vec<NativeCall>,
}

impl NativeRecorder for SoftRecorder {
    fn set_pipeline(&mut self, pipeline: NativePipeline) {
        self.calls.push(NativeCall::SetPipeline(pipeline));
    }

    fn set_framebuffer(&mut self, framebuffer: NativeFramebuffer) {
        self.calls.push(NativeCall::SetFramebuffer(framebuffer));
    }

    fn set_constant_buffer(&mut self, stage: ShaderStage, slot: u32, binding: Option<ConstantBufferBinding>) {
        self.calls
            .push(NativeCall::SetConstantBuffer { stage, slot, binding });
    }

    fn set_shader_resource(&mut self, stage: ShaderStage, slot: u32, view: Option<NativeView>) {
        self.calls
            .push(NativeCall::SetShaderResource { stage, slot, view });
    }

    fn set_unordered_access(&mut self, stage: ShaderStage, slot: u32, view: Option<NativeView>) {
        self.calls
            .push(NativeCall::SetUnorderedAccess { stage, slot, view });
    }

    fn set_sampler(&mut self, stage: ShaderStage, slot: u32, sampler: NativeSampler) {
        self.calls
            .push(NativeCall::SetSampler { stage, slot, sampler });
    }

    fn set_vertex_buffers(&mut self, first_slot: u32, bindings: &[VertexBinding]) {
        self.calls.push(NativeCall::SetVertexBuffers {
            first_slot,
            bindings: bindings.to_vec(),
        });
    }

    fn set_index_buffer(&mut self, buffer: NativeBuffer, format: IndexFormat, offset: u64) {
        self.calls.push(NativeCall::SetIndexBuffer {
            buffer,
            format,
            offset,
        });
    }

    fn set_viewports(&mut self, viewports: &[Viewport]) {
        self.calls.push(NativeCall::SetViewports(viewports.to_vec()));
    }

    fn set_scissor_rects(&mut self, rects: &[ScissorRect]) {
        self.calls.push(NativeCall::SetScissorRects(rects.to_vec()));
    }

    fn clear_color_target(&mut self, index: u32, color: [f32; 4]) {
        self.calls
            .push(NativeCall::ClearColorTarget { index, color });
    }

    fn clear_depth_stencil(&mut self, depth: f32, stencil: u8) {
        self.calls
            .push(NativeCall::ClearDepthStencil { depth, stencil });
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        self.calls.push(NativeCall::Draw {
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        });
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        self.calls.push(NativeCall::DrawIndexed {
            index_count,
            instance_count,
            first_index,
            vertex_offset,
            first_instance,
        });
    }

    fn draw_indirect(&mut self, buffer: NativeBuffer, offset: u64, draw_count: u32, stride: u32) {
        self.calls.push(NativeCall::DrawIndirect {
            buffer,
            offset,
            draw_count,
            stride,
        });
    }

    fn draw_indexed_indirect(&mut self, buffer: NativeBuffer, offset: u64, draw_count: u32, stride: u32) {
        self.calls.push(NativeCall::DrawIndexedIndirect {
            buffer,
            offset,
            draw_count,
            stride,
        });
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.calls.push(NativeCall::Dispatch { x, y, z });
    }

    fn dispatch_indirect(&mut self, buffer: NativeBuffer, offset: u64) {
        self.calls
            .push(NativeCall::DispatchIndirect { buffer, offset });
    }

    fn update_buffer_region(&mut self, buffer: NativeBuffer, offset: u64, data: &[u8]) {
        self.calls.push(NativeCall::UpdateBufferRegion {
            buffer,
            offset,
            data: data.to_vec(),
        });
    }

    fn write_buffer_discard(&mut self, buffer: NativeBuffer, data: &[u8]) {
        self.calls.push(NativeCall::WriteBufferDiscard {
            buffer,
            data: data.to_vec(),
        });
    }

    fn copy_buffer(
        &mut self,
        source: NativeBuffer,
        source_offset: u64,
        destination: NativeBuffer,
        destination_offset: u64,
        size: u64,
    ) {
        self.calls.push(NativeCall::CopyBuffer {
            source,
            source_offset,
            destination,
            destination_offset,
            size,
        });
    }

    fn copy_texture(&mut self, source: NativeTexture, destination: NativeTexture, region: &TextureCopy) {
        self.calls.push(NativeCall::CopyTexture {
            source,
            destination,
            region: *region,
        });
    }

    fn resolve_texture(&mut self, source: NativeTexture, destination: NativeTexture) {
        self.calls
            .push(NativeCall::ResolveTexture { source, destination });
    }

    fn generate_mipmaps(&mut self, texture: NativeTexture) {
        self.calls.push(NativeCall::GenerateMipmaps(texture));
    }

    fn push_debug_group(&mut self, label: &str) {
        self.calls
            .push(NativeCall::PushDebugGroup(label.to_string()));
    }

    fn pop_debug_group(&mut self) {
        self.calls.push(NativeCall::PopDebugGroup);
    }

    fn insert_debug_marker(&mut self, label: &str) {
        self.calls
            .push(NativeCall::InsertDebugMarker(label.to_string()));
    }

    fn finish(self: Box<Self>) -> Result<NativeCommandBuffer, Error> {
        Ok(NativeCommandBuffer::new(SoftCommandBuffer { calls: self.calls }))
    }
}

/// Object counts of a [`SoftBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SoftStats {
    pub buffers: usize,
    pub textures: usize,
    pub views: usize,
    pub views_created: usize,
    pub samplers: usize,
    pub pipelines: usize,
    pub framebuffers: usize,
    pub submissions: usize,
    pub pending_submissions: usize,
}

#[derive(Debug)]
struct SoftBuffer {
    usage: BufferUsage,
    memory: Vec<u8>,
}

#[derive(Debug)]
enum ViewTarget {
    Buffer(NativeBuffer),
    Texture(NativeTexture),
}

struct Submission {
    calls: Vec<NativeCall>,
    on_complete: CompletionCallback,
}

#[derive(Default)]
struct SoftState {
    buffers: HashMap<NativeBuffer, SoftBuffer>,
    textures: HashMap<NativeTexture, TextureDescription>,
    views: HashMap<NativeView, ViewTarget>,
    samplers: HashSet<NativeSampler>,
    pipelines: HashSet<NativePipeline>,
    framebuffers: HashSet<NativeFramebuffer>,
    queue: VecDeque<Submission>,
    executed: Vec<NativeCall>,
    views_created: usize,
    submissions: usize,
}

impl SoftState {
    fn execute(&mut self, calls: Vec<NativeCall>) {
        for call in calls {
            match &call {
                NativeCall::UpdateBufferRegion { buffer, offset, data } => {
                    self.write(*buffer, *offset, data);
                }
                NativeCall::WriteBufferDiscard { buffer, data } => {
                    self.write(*buffer, 0, data);
                }
                NativeCall::CopyBuffer {
                    source,
                    source_offset,
                    destination,
                    destination_offset,
                    size,
                } => {
                    let bytes = self.buffers.get(source).and_then(|b| {
                        let start = *source_offset as usize;
                        b.memory.get(start..start + *size as usize).map(<[u8]>::to_vec)
                    });
                    match bytes {
                        Some(bytes) => self.write(*destination, *destination_offset, &bytes),
                        None => logwise::warn_sync!("Soft backend skipped a copy from a missing buffer range"),
                    }
                }
                _ => {}
            }
            self.executed.push(call);
        }
    }

    fn write(&mut self, buffer: NativeBuffer, offset: u64, data: &[u8]) {
        let start = offset as usize;
        match self
            .buffers
            .get_mut(&buffer)
            .and_then(|b| b.memory.get_mut(start..start + data.len()))
        {
            Some(target) => target.copy_from_slice(data),
            None => logwise::warn_sync!("Soft backend skipped a write outside a live buffer"),
        }
    }
}

pub struct SoftBackend {
    name: String,
    capabilities: Capabilities,
    next_handle: AtomicU64,
    failing_allocations: AtomicUsize,
    state: Mutex<SoftState>,
}

impl Debug for SoftBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftBackend")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

impl SoftBackend {
    pub fn new(capabilities: Capabilities) -> Self {
        SoftBackend {
            name: format!("soft ({:?})", capabilities.family),
            capabilities,
            next_handle: AtomicU64::new(1),
            failing_allocations: AtomicUsize::new(0),
            state: Mutex::new(SoftState::default()),
        }
    }

    pub fn name_str(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, SoftState> {
        self.state.lock().expect("soft backend state poisoned")
    }

    /// Makes the next `count` object creations fail with [`Error::AllocationFailure`].
    pub fn fail_next_allocations(&self, count: usize) {
        self.failing_allocations.store(count, Ordering::SeqCst);
    }

    fn allocate(&self, what: &str) -> Result<u64, Error> {
        let injected = self
            .failing_allocations
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(Error::AllocationFailure(format!("{what} (injected by soft backend)")));
        }
        Ok(self.next_handle.fetch_add(1, Ordering::Relaxed))
    }

    pub fn stats(&self) -> SoftStats {
        let state = self.lock();
        SoftStats {
            buffers: state.buffers.len(),
            textures: state.textures.len(),
            views: state.views.len(),
            views_created: state.views_created,
            samplers: state.samplers.len(),
            pipelines: state.pipelines.len(),
            framebuffers: state.framebuffers.len(),
            submissions: state.submissions,
            pending_submissions: state.queue.len(),
        }
    }

    /// Every call executed so far, in execution order.
    pub fn executed_calls(&self) -> Vec<NativeCall> {
        self.lock().executed.clone()
    }

    fn check_bounds(&self, memory: &[u8], offset: u64, len: u64) -> Result<(), Error> {
        match offset.checked_add(len) {
            Some(end) if end <= memory.len() as u64 => Ok(()),
            _ => Err(Error::InvalidState(format!(
                "{offset}+{len} is out of bounds of a {size}-byte buffer",
                size = memory.len()
            ))),
        }
    }
}

impl Backend for SoftBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn create_buffer(&self, description: &BufferDescription) -> Result<NativeBuffer, Error> {
        let handle = NativeBuffer(self.allocate(&format!("buffer {}", description.debug_name))?);
        self.lock().buffers.insert(
            handle,
            SoftBuffer {
                usage: description.usage,
                memory: vec![0; description.size as usize],
            },
        );
        Ok(handle)
    }

    fn destroy_buffer(&self, buffer: NativeBuffer) {
        self.lock().buffers.remove(&buffer);
    }

    fn create_texture(&self, description: &TextureDescription) -> Result<NativeTexture, Error> {
        let handle = NativeTexture(self.allocate(&format!("texture {}", description.debug_name))?);
        self.lock().textures.insert(handle, description.clone());
        Ok(handle)
    }

    fn destroy_texture(&self, texture: NativeTexture) {
        self.lock().textures.remove(&texture);
    }

    fn create_buffer_view(&self, buffer: NativeBuffer, key: ViewKey, access: ViewAccess) -> Result<NativeView, Error> {
        {
            let state = self.lock();
            let Some(target) = state.buffers.get(&buffer) else {
                return Err(Error::InvalidState(format!("{buffer:?} is not a live buffer")));
            };
            self.check_bounds(&target.memory, key.offset, key.size)?;
            if access == ViewAccess::ReadWrite && !target.usage.contains(BufferUsage::STRUCTURED_BUFFER_READ_WRITE) {
                return Err(Error::InvalidState(format!("{buffer:?} cannot be viewed for writing")));
            }
        }
        let view = NativeView(self.allocate("buffer view")?);
        let mut state = self.lock();
        state.views.insert(view, ViewTarget::Buffer(buffer));
        state.views_created += 1;
        Ok(view)
    }

    fn create_texture_view(&self, texture: NativeTexture, _access: ViewAccess) -> Result<NativeView, Error> {
        if !self.lock().textures.contains_key(&texture) {
            return Err(Error::InvalidState(format!("{texture:?} is not a live texture")));
        }
        let view = NativeView(self.allocate("texture view")?);
        let mut state = self.lock();
        state.views.insert(view, ViewTarget::Texture(texture));
        state.views_created += 1;
        Ok(view)
    }

    fn destroy_view(&self, view: NativeView) {
        let mut state = self.lock();
        if let Some(target) = state.views.remove(&view) {
            let live = match target {
                ViewTarget::Buffer(buffer) => state.buffers.contains_key(&buffer),
                ViewTarget::Texture(texture) => state.textures.contains_key(&texture),
            };
            if !live {
                logwise::warn_sync!("Soft backend destroyed a view after its resource");
            }
        }
    }

    fn create_sampler(&self, description: &SamplerDescription) -> Result<NativeSampler, Error> {
        let handle = NativeSampler(self.allocate(&format!("sampler {}", description.debug_name))?);
        self.lock().samplers.insert(handle);
        Ok(handle)
    }

    fn destroy_sampler(&self, sampler: NativeSampler) {
        self.lock().samplers.remove(&sampler);
    }

    fn create_pipeline(&self, description: &PipelineDescription) -> Result<NativePipeline, Error> {
        let handle = NativePipeline(self.allocate(&format!("pipeline {}", description.debug_name))?);
        self.lock().pipelines.insert(handle);
        Ok(handle)
    }

    fn destroy_pipeline(&self, pipeline: NativePipeline) {
        self.lock().pipelines.remove(&pipeline);
    }

    fn create_framebuffer(
        &self,
        color_targets: &[NativeTexture],
        depth_target: Option<NativeTexture>,
    ) -> Result<NativeFramebuffer, Error> {
        {
            let state = self.lock();
            if let Some(missing) = color_targets
                .iter()
                .chain(depth_target.as_ref())
                .find(|t| !state.textures.contains_key(*t))
            {
                return Err(Error::InvalidState(format!("{missing:?} is not a live texture")));
            }
        }
        let handle = NativeFramebuffer(self.allocate("framebuffer")?);
        self.lock().framebuffers.insert(handle);
        Ok(handle)
    }

    fn destroy_framebuffer(&self, framebuffer: NativeFramebuffer) {
        self.lock().framebuffers.remove(&framebuffer);
    }

    fn write_buffer(&self, buffer: NativeBuffer, offset: u64, data: &[u8]) -> Result<(), Error> {
        let mut state = self.lock();
        let Some(target) = state.buffers.get_mut(&buffer) else {
            return Err(Error::InvalidState(format!("{buffer:?} is not a live buffer")));
        };
        if !target
            .usage
            .intersects(BufferUsage::DYNAMIC | BufferUsage::STAGING)
        {
            return Err(Error::InvalidState(format!("{buffer:?} is not CPU-visible")));
        }
        self.check_bounds(&target.memory, offset, data.len() as u64)?;
        let start = offset as usize;
        target.memory[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read_buffer(&self, buffer: NativeBuffer, offset: u64, len: u64) -> Result<Vec<u8>, Error> {
        let state = self.lock();
        let Some(target) = state.buffers.get(&buffer) else {
            return Err(Error::InvalidState(format!("{buffer:?} is not a live buffer")));
        };
        self.check_bounds(&target.memory, offset, len)?;
        let start = offset as usize;
        Ok(target.memory[start..start + len as usize].to_vec())
    }

    fn create_recorder(&self) -> Result<Box<dyn NativeRecorder>, Error> {
        self.allocate("recorder")?;
        Ok(Box::new(SoftRecorder::default()))
    }

    fn submit(&self, commands: NativeCommandBuffer, on_complete: CompletionCallback) -> Result<(), Error> {
        let commands = commands.into_payload::<SoftCommandBuffer>().map_err(|_| {
            Error::unsupported(&self.name, "submitting a command buffer recorded by another backend")
        })?;
        let mut state = self.lock();
        state.submissions += 1;
        state.queue.push_back(Submission {
            calls: commands.calls,
            on_complete,
        });
        Ok(())
    }

    fn poll(&self) -> Result<usize, Error> {
        let retired: Vec<CompletionCallback> = {
            let mut state = self.lock();
            let mut retired = Vec::with_capacity(state.queue.len());
            while let Some(submission) = state.queue.pop_front() {
                state.execute(submission.calls);
                retired.push(submission.on_complete);
            }
            retired
        };
        let count = retired.len();
        for on_complete in retired {
            on_complete();
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn executes_writes_and_copies_on_poll() {
        let backend = SoftBackend::new(Capabilities::immediate_device());
        let staging = backend
            .create_buffer(&BufferDescription::new(4, BufferUsage::STAGING, "s"))
            .unwrap();
        let target = backend
            .create_buffer(&BufferDescription::new(8, BufferUsage::VERTEX_BUFFER, "t"))
            .unwrap();
        backend.write_buffer(staging, 0, &[1, 2, 3, 4]).unwrap();
        assert!(backend.write_buffer(target, 0, &[1]).is_err());

        let mut recorder = backend.create_recorder().unwrap();
        recorder.copy_buffer(staging, 0, target, 4, 4);
        recorder.update_buffer_region(target, 0, &[9]);
        let commands = recorder.finish().unwrap();

        let done = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = done.clone();
        backend
            .submit(commands, Box::new(move || flag.store(true, Ordering::SeqCst)))
            .unwrap();
        assert_eq!(backend.read_buffer(target, 0, 8).unwrap(), vec![0; 8]);
        assert_eq!(backend.poll().unwrap(), 1);
        assert!(done.load(Ordering::SeqCst));
        assert_eq!(backend.read_buffer(target, 0, 8).unwrap(), vec![9, 0, 0, 0, 1, 2, 3, 4]);
        assert_eq!(backend.executed_calls().len(), 2);
    }

    #[test]
    fn injected_failures_are_counted() {
        let backend = SoftBackend::new(Capabilities::bindless_descriptor());
        backend.fail_next_allocations(1);
        let err = backend
            .create_buffer(&BufferDescription::new(4, BufferUsage::STAGING, "s"))
            .unwrap_err();
        assert!(err.is_recoverable());
        assert!(backend
            .create_buffer(&BufferDescription::new(4, BufferUsage::STAGING, "s"))
            .is_ok());
        assert_eq!(backend.stats().buffers, 1);
    }
}
