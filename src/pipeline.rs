// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Pipelines as far as binding is concerned.

Shader compilation and fixed-function state belong to the backend; the core
only needs to know whether a pipeline is graphics or compute, which resource
layouts it consumes, and the stride of each vertex buffer slot.
*/

use crate::bindings::layout::ResourceLayout;
use crate::bindings::resource_tracking::BindMode;
use crate::error::Error;
use crate::imp::{Backend, NativePipeline};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    Graphics,
    Compute,
}

impl PipelineKind {
    pub(crate) fn bind_mode(self) -> BindMode {
        match self {
            PipelineKind::Graphics => BindMode::Graphics,
            PipelineKind::Compute => BindMode::Compute,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineDescription {
    pub kind: PipelineKind,
    /// One layout per resource-set slot, in slot order.
    pub resource_layouts: Vec<ResourceLayout>,
    /// Byte stride per vertex buffer slot.  Ignored for compute pipelines.
    pub vertex_strides: Vec<u32>,
    pub debug_name: String,
}

impl PipelineDescription {
    pub fn graphics(resource_layouts: Vec<ResourceLayout>, vertex_strides: Vec<u32>, debug_name: &str) -> Self {
        PipelineDescription {
            kind: PipelineKind::Graphics,
            resource_layouts,
            vertex_strides,
            debug_name: debug_name.to_string(),
        }
    }

    pub fn compute(resource_layouts: Vec<ResourceLayout>, debug_name: &str) -> Self {
        PipelineDescription {
            kind: PipelineKind::Compute,
            resource_layouts,
            vertex_strides: Vec::new(),
            debug_name: debug_name.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineId(u64);

#[derive(Debug)]
struct PipelineShared {
    id: PipelineId,
    native: NativePipeline,
    description: PipelineDescription,
    backend: Arc<dyn Backend>,
}

impl Drop for PipelineShared {
    fn drop(&mut self) {
        self.backend.destroy_pipeline(self.native);
    }
}

/// A graphics or compute pipeline.  Cheap to clone.
#[derive(Debug, Clone)]
pub struct Pipeline {
    shared: Arc<PipelineShared>,
}

impl Pipeline {
    pub(crate) fn new(backend: &Arc<dyn Backend>, description: PipelineDescription) -> Result<Self, Error> {
        if description.kind == PipelineKind::Compute && !backend.capabilities().compute {
            return Err(Error::unsupported(backend.name(), "compute pipelines"));
        }
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        let native = backend.create_pipeline(&description)?;
        Ok(Pipeline {
            shared: Arc::new(PipelineShared {
                id: PipelineId(NEXT_ID.fetch_add(1, Ordering::Relaxed)),
                native,
                description,
                backend: backend.clone(),
            }),
        })
    }

    pub fn id(&self) -> PipelineId {
        self.shared.id
    }

    pub fn kind(&self) -> PipelineKind {
        self.shared.description.kind
    }

    pub fn resource_layouts(&self) -> &[ResourceLayout] {
        &self.shared.description.resource_layouts
    }

    pub fn vertex_strides(&self) -> &[u32] {
        &self.shared.description.vertex_strides
    }

    pub fn description(&self) -> &PipelineDescription {
        &self.shared.description
    }

    pub(crate) fn native(&self) -> NativePipeline {
        self.shared.native
    }
}

impl PartialEq for Pipeline {
    fn eq(&self, other: &Self) -> bool {
        self.shared.id == other.shared.id
    }
}
impl Eq for Pipeline {}
