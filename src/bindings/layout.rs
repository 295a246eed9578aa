// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Resource layouts: the ordered schema a [`ResourceSet`](crate::bindings::resource_set::ResourceSet) must match.
//!
//! A layout is an ordered list of slot kinds, each with a shader-stage
//! visibility and an optional dynamic-offset flag.  Native APIs bind into a
//! handful of register classes; every element is assigned a per-class slot
//! index once, when the layout is declared, by a running counter over the
//! elements in declaration order.
//!
//! # Example
//!
//! ```
//! use slots_and_stages::bindings::layout::{BindingClass, DeviceSlot, ResourceKind, ResourceLayout, ResourceLayoutElement};
//! use slots_and_stages::bindings::visible_to::ShaderStages;
//!
//! let layout = ResourceLayout::new(vec![
//!     ResourceLayoutElement::new("camera", ResourceKind::UniformBuffer, ShaderStages::VERTEX),
//!     ResourceLayoutElement::new("albedo", ResourceKind::TextureReadOnly, ShaderStages::FRAGMENT),
//!     ResourceLayoutElement::new("albedo_sampler", ResourceKind::Sampler, ShaderStages::FRAGMENT),
//!     ResourceLayoutElement::new("lights", ResourceKind::StructuredBufferReadOnly, ShaderStages::FRAGMENT),
//! ]).unwrap();
//!
//! assert_eq!(layout.device_slot(0), DeviceSlot { class: BindingClass::ConstantBuffer, index: 0 });
//! assert_eq!(layout.device_slot(1), DeviceSlot { class: BindingClass::ShaderResource, index: 0 });
//! assert_eq!(layout.device_slot(3), DeviceSlot { class: BindingClass::ShaderResource, index: 1 });
//! ```

use crate::bindings::visible_to::ShaderStages;
use crate::error::Error;
use std::ops::{Add, AddAssign};
use std::sync::Arc;

/// The kind of object a layout element accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    UniformBuffer,
    StructuredBufferReadOnly,
    StructuredBufferReadWrite,
    TextureReadOnly,
    TextureReadWrite,
    Sampler,
}

impl ResourceKind {
    pub fn binding_class(self) -> BindingClass {
        match self {
            ResourceKind::UniformBuffer => BindingClass::ConstantBuffer,
            ResourceKind::StructuredBufferReadOnly | ResourceKind::TextureReadOnly => {
                BindingClass::ShaderResource
            }
            ResourceKind::StructuredBufferReadWrite | ResourceKind::TextureReadWrite => {
                BindingClass::UnorderedAccess
            }
            ResourceKind::Sampler => BindingClass::Sampler,
        }
    }

    pub fn is_buffer(self) -> bool {
        matches!(
            self,
            ResourceKind::UniformBuffer
                | ResourceKind::StructuredBufferReadOnly
                | ResourceKind::StructuredBufferReadWrite
        )
    }

    pub fn is_texture(self) -> bool {
        matches!(
            self,
            ResourceKind::TextureReadOnly | ResourceKind::TextureReadWrite
        )
    }
}

/// A native register class.
///
/// Read-only structured buffers and read-only textures share one class, as do
/// their read-write counterparts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BindingClass {
    ConstantBuffer,
    ShaderResource,
    UnorderedAccess,
    Sampler,
}

impl BindingClass {
    pub const ALL: [BindingClass; 4] = [
        BindingClass::ConstantBuffer,
        BindingClass::ShaderResource,
        BindingClass::UnorderedAccess,
        BindingClass::Sampler,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

/// The native slot an element binds to, relative to its set's base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceSlot {
    pub class: BindingClass,
    pub index: u32,
}

/// Per-class element counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ClassCounts([u32; 4]);

impl ClassCounts {
    pub fn get(&self, class: BindingClass) -> u32 {
        self.0[class.index()]
    }

    fn bump(&mut self, class: BindingClass) -> u32 {
        let slot = self.0[class.index()];
        self.0[class.index()] += 1;
        slot
    }
}

impl Add for ClassCounts {
    type Output = ClassCounts;
    fn add(mut self, rhs: ClassCounts) -> ClassCounts {
        self += rhs;
        self
    }
}

impl AddAssign for ClassCounts {
    fn add_assign(&mut self, rhs: ClassCounts) {
        for (lhs, rhs) in self.0.iter_mut().zip(rhs.0) {
            *lhs += rhs;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLayoutElement {
    pub name: String,
    pub kind: ResourceKind,
    pub stages: ShaderStages,
    pub dynamic_offset: bool,
}

impl ResourceLayoutElement {
    pub fn new(name: &str, kind: ResourceKind, stages: ShaderStages) -> Self {
        ResourceLayoutElement {
            name: name.to_string(),
            kind,
            stages,
            dynamic_offset: false,
        }
    }

    /// Marks the element as taking a byte offset at bind time.
    pub fn with_dynamic_offset(mut self) -> Self {
        self.dynamic_offset = true;
        self
    }
}

#[derive(Debug)]
struct LayoutShared {
    elements: Vec<ResourceLayoutElement>,
    device_slots: Vec<DeviceSlot>,
    counts: ClassCounts,
    dynamic_offset_count: usize,
}

/// An ordered schema of binding slots.  Cheap to clone.
#[derive(Debug, Clone)]
pub struct ResourceLayout {
    shared: Arc<LayoutShared>,
}

impl ResourceLayout {
    /// Declares a layout.
    ///
    /// Fails with [`Error::LayoutMismatch`] if a non-buffer element requests a dynamic offset.
    pub fn new(elements: Vec<ResourceLayoutElement>) -> Result<Self, Error> {
        let mut counts = ClassCounts::default();
        let mut device_slots = Vec::with_capacity(elements.len());
        let mut dynamic_offset_count = 0;
        for (i, element) in elements.iter().enumerate() {
            if element.dynamic_offset {
                if !element.kind.is_buffer() {
                    return Err(Error::LayoutMismatch(format!(
                        "element {i} ({name}) is {kind:?} and cannot take a dynamic offset",
                        name = element.name,
                        kind = element.kind
                    )));
                }
                dynamic_offset_count += 1;
            }
            let class = element.kind.binding_class();
            device_slots.push(DeviceSlot {
                class,
                index: counts.bump(class),
            });
        }
        Ok(ResourceLayout {
            shared: Arc::new(LayoutShared {
                elements,
                device_slots,
                counts,
                dynamic_offset_count,
            }),
        })
    }

    pub fn elements(&self) -> &[ResourceLayoutElement] {
        &self.shared.elements
    }

    pub fn len(&self) -> usize {
        self.shared.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.elements.is_empty()
    }

    /// The per-class slot of element `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of bounds.
    pub fn device_slot(&self, i: usize) -> DeviceSlot {
        self.shared.device_slots[i]
    }

    pub fn counts(&self) -> ClassCounts {
        self.shared.counts
    }

    pub fn dynamic_offset_count(&self) -> usize {
        self.shared.dynamic_offset_count
    }

    /// Whether a set declared against `other` can bind where `self` is expected.
    ///
    /// Names are ignored; kinds, stages and dynamic-offset flags must agree.
    pub fn is_compatible_with(&self, other: &ResourceLayout) -> bool {
        if Arc::ptr_eq(&self.shared, &other.shared) {
            return true;
        }
        self.len() == other.len()
            && self
                .elements()
                .iter()
                .zip(other.elements())
                .all(|(a, b)| {
                    a.kind == b.kind && a.stages == b.stages && a.dynamic_offset == b.dynamic_offset
                })
    }
}

impl PartialEq for ResourceLayout {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}
impl Eq for ResourceLayout {}
