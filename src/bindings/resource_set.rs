// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Resource sets: concrete objects bound against a [`ResourceLayout`].
//!
//! A set is immutable once created.  Creation checks that the resource array
//! corresponds kind-for-kind to the layout; a mismatch is a contract violation
//! reported as [`Error::LayoutMismatch`].  Finer checks that depend on how an
//! object was created (usage flags) happen when the set is activated and are
//! reported as [`Error::ResourceTypeMismatch`].

use crate::bindings::buffer_range::BufferRange;
use crate::bindings::layout::{ResourceKind, ResourceLayout};
use crate::bindings::sampler::Sampler;
use crate::error::Error;
use crate::imp::Capabilities;
use crate::resources::{Buffer, Texture};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// One object in a resource set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindableResource {
    Buffer(Buffer),
    BufferRange(BufferRange),
    Texture(Texture),
    Sampler(Sampler),
}

impl BindableResource {
    fn describe(&self) -> &'static str {
        match self {
            BindableResource::Buffer(_) => "buffer",
            BindableResource::BufferRange(_) => "buffer range",
            BindableResource::Texture(_) => "texture",
            BindableResource::Sampler(_) => "sampler",
        }
    }

    fn fits(&self, kind: ResourceKind) -> bool {
        match self {
            BindableResource::Buffer(_) | BindableResource::BufferRange(_) => kind.is_buffer(),
            BindableResource::Texture(_) => kind.is_texture(),
            BindableResource::Sampler(_) => kind == ResourceKind::Sampler,
        }
    }

    /// The buffer range this resource covers, if it is a buffer.
    pub(crate) fn buffer_range(&self) -> Option<BufferRange> {
        match self {
            BindableResource::Buffer(buffer) => Some(BufferRange::full(buffer.clone())),
            BindableResource::BufferRange(range) => Some(range.clone()),
            _ => None,
        }
    }
}

impl From<Buffer> for BindableResource {
    fn from(buffer: Buffer) -> Self {
        BindableResource::Buffer(buffer)
    }
}
impl From<BufferRange> for BindableResource {
    fn from(range: BufferRange) -> Self {
        BindableResource::BufferRange(range)
    }
}
impl From<Texture> for BindableResource {
    fn from(texture: Texture) -> Self {
        BindableResource::Texture(texture)
    }
}
impl From<Sampler> for BindableResource {
    fn from(sampler: Sampler) -> Self {
        BindableResource::Sampler(sampler)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceSetId(u64);

#[derive(Debug)]
struct SetShared {
    id: ResourceSetId,
    layout: ResourceLayout,
    resources: Vec<BindableResource>,
    debug_name: String,
}

/// An immutable binding of concrete objects matching a layout.  Cheap to clone.
#[derive(Debug, Clone)]
pub struct ResourceSet {
    shared: Arc<SetShared>,
}

impl ResourceSet {
    pub(crate) fn new(
        capabilities: &Capabilities,
        backend_name: &str,
        layout: &ResourceLayout,
        resources: Vec<BindableResource>,
        debug_name: &str,
    ) -> Result<Self, Error> {
        if resources.len() != layout.len() {
            return Err(Error::LayoutMismatch(format!(
                "set {debug_name} has {got} resources but its layout declares {want}",
                got = resources.len(),
                want = layout.len()
            )));
        }
        for (i, (resource, element)) in resources.iter().zip(layout.elements()).enumerate() {
            if !resource.fits(element.kind) {
                return Err(Error::LayoutMismatch(format!(
                    "set {debug_name} element {i} ({name}) is declared {kind:?} but a {found} was supplied",
                    name = element.name,
                    kind = element.kind,
                    found = resource.describe()
                )));
            }
            if let BindableResource::BufferRange(range) = resource {
                let alignment = match element.kind {
                    ResourceKind::UniformBuffer => capabilities.min_uniform_buffer_offset_alignment,
                    _ => capabilities.min_structured_buffer_offset_alignment,
                };
                if alignment > 1 && range.offset() % alignment != 0 {
                    return Err(Error::unsupported(
                        backend_name,
                        format!(
                            "set {debug_name} element {i} range offset {offset} is not a multiple of {alignment}",
                            offset = range.offset()
                        ),
                    ));
                }
            }
        }
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Ok(ResourceSet {
            shared: Arc::new(SetShared {
                id: ResourceSetId(NEXT_ID.fetch_add(1, Ordering::Relaxed)),
                layout: layout.clone(),
                resources,
                debug_name: debug_name.to_string(),
            }),
        })
    }

    pub fn id(&self) -> ResourceSetId {
        self.shared.id
    }

    pub fn layout(&self) -> &ResourceLayout {
        &self.shared.layout
    }

    pub fn resources(&self) -> &[BindableResource] {
        &self.shared.resources
    }

    pub fn debug_name(&self) -> &str {
        &self.shared.debug_name
    }
}

impl PartialEq for ResourceSet {
    fn eq(&self, other: &Self) -> bool {
        self.shared.id == other.shared.id
    }
}
impl Eq for ResourceSet {}

/// A set as bound to a command list slot, with its dynamic offsets.
///
/// Equality is set identity plus offsets, never deep resource equality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundResourceSetInfo {
    pub set: ResourceSet,
    pub offsets: Vec<u32>,
}

impl BoundResourceSetInfo {
    pub fn new(set: ResourceSet, offsets: &[u32]) -> Self {
        BoundResourceSetInfo {
            set,
            offsets: offsets.to_vec(),
        }
    }

    /// Whether this is the same set with the same offsets.
    pub fn matches(&self, set: &ResourceSet, offsets: &[u32]) -> bool {
        self.set == *set && self.offsets == offsets
    }
}
