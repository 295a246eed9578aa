// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! The interface between the core and a native graphics backend.
//!
//! The binding engine and the command list are written once against these two
//! traits and never branch on which backend is underneath.  What a backend can
//! express is described by [`Capabilities`]; the core probes those instead of
//! naming backends.
//!
//! * [`Backend`] is the device-level half: object construction and
//!   destruction, device-level buffer access, submission and completion.
//! * [`NativeRecorder`] is one native recording context (a deferred context,
//!   a native command buffer, or a client-side command stream for immediate
//!   APIs).  Every command list owns exactly one.
//!
//! Native objects are referred to by small copyable handles owned by the
//! backend, so the core never holds a reference into backend memory.

use crate::bindings::sampler::SamplerDescription;
use crate::bindings::visible_to::ShaderStage;
use crate::commands::pending::{ScissorRect, Viewport};
use crate::error::Error;
use crate::pipeline::PipelineDescription;
use crate::pixel_formats::IndexFormat;
use crate::resources::buffer::BufferDescription;
use crate::resources::texture::{TextureCopy, TextureDescription};
use std::any::Any;
use std::fmt::Debug;

pub mod soft;

macro_rules! native_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);
    };
}

native_handle!(
    /// A native buffer.
    NativeBuffer
);
native_handle!(
    /// A native texture.
    NativeTexture
);
native_handle!(
    /// A native shader-visible view over a buffer range or a texture.
    NativeView
);
native_handle!(NativeSampler);
native_handle!(NativePipeline);
native_handle!(NativeFramebuffer);

/// Whether a view is readable or writable from shaders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewAccess {
    Read,
    ReadWrite,
}

/// Cache key of a buffer view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewKey {
    pub offset: u64,
    pub size: u64,
}

/// A constant-buffer bind.  `range` of `None` binds the whole buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConstantBufferBinding {
    pub buffer: NativeBuffer,
    pub range: Option<ViewKey>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexBinding {
    pub buffer: NativeBuffer,
    pub offset: u64,
    pub stride: u32,
}

/// The backend family a capability profile describes.
///
/// Purely informational; the core never inspects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendFamily {
    ImmediateDevice,
    DeferredContext,
    BindlessDescriptor,
}

/// What a backend can express.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    pub family: BackendFamily,
    /// Constant buffers can be bound as sub-ranges.
    pub constant_buffer_ranges: bool,
    /// When `Some`, a sub-range constant-buffer bind must cover a multiple of this many bytes.
    pub constant_buffer_range_granularity: Option<u64>,
    pub min_uniform_buffer_offset_alignment: u64,
    pub min_structured_buffer_offset_alignment: u64,
    /// A recorded "update region" call is available.
    pub update_buffer_region: bool,
    /// Whole-buffer writes with discard semantics can be recorded.
    pub map_discard: bool,
    /// One native indirect draw can consume several argument records.
    pub multi_draw_indirect: bool,
    pub compute: bool,
    pub debug_markers: bool,
}

impl Capabilities {
    /// An explicit deferred-context API: per-stage register binds, constant
    /// buffer ranges in 256-byte granules.
    pub fn deferred_context() -> Self {
        Capabilities {
            family: BackendFamily::DeferredContext,
            constant_buffer_ranges: true,
            constant_buffer_range_granularity: Some(256),
            min_uniform_buffer_offset_alignment: 256,
            min_structured_buffer_offset_alignment: 16,
            update_buffer_region: true,
            map_discard: true,
            multi_draw_indirect: false,
            compute: true,
            debug_markers: true,
        }
    }

    /// An immediate-mode device API: byte-exact range binds.
    pub fn immediate_device() -> Self {
        Capabilities {
            family: BackendFamily::ImmediateDevice,
            constant_buffer_ranges: true,
            constant_buffer_range_granularity: None,
            min_uniform_buffer_offset_alignment: 256,
            min_structured_buffer_offset_alignment: 16,
            update_buffer_region: true,
            map_discard: true,
            multi_draw_indirect: true,
            compute: true,
            debug_markers: false,
        }
    }

    /// A bindless descriptor API: all uploads go through transfer memory.
    pub fn bindless_descriptor() -> Self {
        Capabilities {
            family: BackendFamily::BindlessDescriptor,
            constant_buffer_ranges: true,
            constant_buffer_range_granularity: None,
            min_uniform_buffer_offset_alignment: 64,
            min_structured_buffer_offset_alignment: 64,
            update_buffer_region: false,
            map_discard: false,
            multi_draw_indirect: true,
            compute: true,
            debug_markers: true,
        }
    }
}

/// Invoked exactly once when a submitted command buffer has finished executing.
pub type CompletionCallback = Box<dyn FnOnce() + Send>;

/// A finalized native command buffer.
///
/// The payload is backend-defined; only the backend that recorded it knows
/// how to submit it.
pub struct NativeCommandBuffer {
    payload: Box<dyn Any + Send + Sync>,
}

impl NativeCommandBuffer {
    pub fn new<T: Any + Send + Sync>(payload: T) -> Self {
        NativeCommandBuffer {
            payload: Box::new(payload),
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref()
    }

    pub fn into_payload<T: Any>(self) -> Result<Box<T>, Self> {
        match self.payload.downcast::<T>() {
            Ok(payload) => Ok(payload),
            Err(payload) => Err(NativeCommandBuffer { payload }),
        }
    }
}

impl Debug for NativeCommandBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeCommandBuffer").finish_non_exhaustive()
    }
}

/// Device-level half of a native backend.
pub trait Backend: Send + Sync + Debug {
    fn name(&self) -> &str;
    fn capabilities(&self) -> &Capabilities;

    fn create_buffer(&self, description: &BufferDescription) -> Result<NativeBuffer, Error>;
    fn destroy_buffer(&self, buffer: NativeBuffer);
    fn create_texture(&self, description: &TextureDescription) -> Result<NativeTexture, Error>;
    fn destroy_texture(&self, texture: NativeTexture);
    fn create_buffer_view(
        &self,
        buffer: NativeBuffer,
        key: ViewKey,
        access: ViewAccess,
    ) -> Result<NativeView, Error>;
    fn create_texture_view(
        &self,
        texture: NativeTexture,
        access: ViewAccess,
    ) -> Result<NativeView, Error>;
    fn destroy_view(&self, view: NativeView);
    fn create_sampler(&self, description: &SamplerDescription) -> Result<NativeSampler, Error>;
    fn destroy_sampler(&self, sampler: NativeSampler);
    fn create_pipeline(&self, description: &PipelineDescription) -> Result<NativePipeline, Error>;
    fn destroy_pipeline(&self, pipeline: NativePipeline);
    fn create_framebuffer(
        &self,
        color_targets: &[NativeTexture],
        depth_target: Option<NativeTexture>,
    ) -> Result<NativeFramebuffer, Error>;
    fn destroy_framebuffer(&self, framebuffer: NativeFramebuffer);

    /// Writes CPU-visible buffer memory immediately, outside any command buffer.
    fn write_buffer(&self, buffer: NativeBuffer, offset: u64, data: &[u8]) -> Result<(), Error>;
    /// Reads buffer memory as of the last completed submission.
    fn read_buffer(&self, buffer: NativeBuffer, offset: u64, len: u64) -> Result<Vec<u8>, Error>;

    fn create_recorder(&self) -> Result<Box<dyn NativeRecorder>, Error>;
    fn submit(
        &self,
        commands: NativeCommandBuffer,
        on_complete: CompletionCallback,
    ) -> Result<(), Error>;
    /// Retires finished submissions, running their completion callbacks.
    ///
    /// Returns how many submissions were retired.
    fn poll(&self) -> Result<usize, Error>;
}

/// One native recording context.
///
/// Calls are recorded in the order they are made.  Binds are per stage; a
/// `None` view clears the slot.
pub trait NativeRecorder: Send + Debug {
    fn set_pipeline(&mut self, pipeline: NativePipeline);
    fn set_framebuffer(&mut self, framebuffer: NativeFramebuffer);
    fn set_constant_buffer(
        &mut self,
        stage: ShaderStage,
        slot: u32,
        binding: Option<ConstantBufferBinding>,
    );
    fn set_shader_resource(&mut self, stage: ShaderStage, slot: u32, view: Option<NativeView>);
    fn set_unordered_access(&mut self, stage: ShaderStage, slot: u32, view: Option<NativeView>);
    fn set_sampler(&mut self, stage: ShaderStage, slot: u32, sampler: NativeSampler);
    fn set_vertex_buffers(&mut self, first_slot: u32, bindings: &[VertexBinding]);
    fn set_index_buffer(&mut self, buffer: NativeBuffer, format: IndexFormat, offset: u64);
    fn set_viewports(&mut self, viewports: &[Viewport]);
    fn set_scissor_rects(&mut self, rects: &[ScissorRect]);
    fn clear_color_target(&mut self, index: u32, color: [f32; 4]);
    fn clear_depth_stencil(&mut self, depth: f32, stencil: u8);

    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32);
    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );
    fn draw_indirect(&mut self, buffer: NativeBuffer, offset: u64, draw_count: u32, stride: u32);
    fn draw_indexed_indirect(
        &mut self,
        buffer: NativeBuffer,
        offset: u64,
        draw_count: u32,
        stride: u32,
    );
    fn dispatch(&mut self, x: u32, y: u32, z: u32);
    fn dispatch_indirect(&mut self, buffer: NativeBuffer, offset: u64);

    fn update_buffer_region(&mut self, buffer: NativeBuffer, offset: u64, data: &[u8]);
    fn write_buffer_discard(&mut self, buffer: NativeBuffer, data: &[u8]);
    fn copy_buffer(
        &mut self,
        source: NativeBuffer,
        source_offset: u64,
        destination: NativeBuffer,
        destination_offset: u64,
        size: u64,
    );
    fn copy_texture(&mut self, source: NativeTexture, destination: NativeTexture, region: &TextureCopy);
    fn resolve_texture(&mut self, source: NativeTexture, destination: NativeTexture);
    fn generate_mipmaps(&mut self, texture: NativeTexture);

    fn push_debug_group(&mut self, label: &str);
    fn pop_debug_group(&mut self);
    fn insert_debug_marker(&mut self, label: &str);

    /// Finalizes the recording.
    fn finish(self: Box<Self>) -> Result<NativeCommandBuffer, Error>;
}
