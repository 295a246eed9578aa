// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Buffers and their view caches.

use crate::bindings::visible_to::BufferUsage;
use crate::error::Error;
use crate::imp::{Backend, NativeBuffer, NativeView, ViewAccess, ViewKey};
use crate::resources::ResourceId;
use crate::resources::view_cache::ViewCache;
use std::fmt::Debug;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDescription {
    pub size: u64,
    pub usage: BufferUsage,
    /// Element stride for structured views; zero for unstructured buffers.
    pub structure_byte_stride: u32,
    pub debug_name: String,
}

impl BufferDescription {
    pub fn new(size: u64, usage: BufferUsage, debug_name: &str) -> Self {
        BufferDescription {
            size,
            usage,
            structure_byte_stride: 0,
            debug_name: debug_name.to_string(),
        }
    }

    pub fn structured(mut self, structure_byte_stride: u32) -> Self {
        self.structure_byte_stride = structure_byte_stride;
        self
    }
}

struct BufferShared {
    id: ResourceId,
    native: NativeBuffer,
    description: BufferDescription,
    views: ViewCache<(ViewKey, ViewAccess)>,
    backend: Arc<dyn Backend>,
}

impl Debug for BufferShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.id)
            .field("native", &self.native)
            .field("debug_name", &self.description.debug_name)
            .finish()
    }
}

impl Drop for BufferShared {
    fn drop(&mut self) {
        for view in self.views.drain() {
            self.backend.destroy_view(view);
        }
        self.backend.destroy_buffer(self.native);
    }
}

/// A GPU buffer.
///
/// Cheap to clone; all clones refer to the same native buffer and share one
/// view cache.  The native buffer and every cached view are destroyed when the
/// last clone is dropped.
#[derive(Debug, Clone)]
pub struct Buffer {
    shared: Arc<BufferShared>,
}

impl Buffer {
    pub(crate) fn new(backend: &Arc<dyn Backend>, description: BufferDescription) -> Result<Self, Error> {
        if description.size == 0 {
            return Err(Error::InvalidState(format!(
                "buffer {} has zero size",
                description.debug_name
            )));
        }
        let native = backend.create_buffer(&description)?;
        Ok(Buffer {
            shared: Arc::new(BufferShared {
                id: ResourceId::next(),
                native,
                description,
                views: ViewCache::new(),
                backend: backend.clone(),
            }),
        })
    }

    pub fn id(&self) -> ResourceId {
        self.shared.id
    }

    pub fn size(&self) -> u64 {
        self.shared.description.size
    }

    pub fn usage(&self) -> BufferUsage {
        self.shared.description.usage
    }

    pub fn description(&self) -> &BufferDescription {
        &self.shared.description
    }

    pub fn native(&self) -> NativeBuffer {
        self.shared.native
    }

    /// Fetches or lazily creates the view of `access` over `key`.
    pub(crate) fn view(&self, key: ViewKey, access: ViewAccess) -> Result<NativeView, Error> {
        self.shared.views.get_or_create((key, access), || {
            self.shared
                .backend
                .create_buffer_view(self.shared.native, key, access)
        })
    }

    /// Number of views currently cached for this buffer.
    pub fn cached_view_count(&self) -> usize {
        self.shared.views.len()
    }
}

impl PartialEq for Buffer {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}
impl Eq for Buffer {}
