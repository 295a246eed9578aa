// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Translates resource sets bound at logical slots into native per-stage binds.

Each pipeline mode (graphics, compute) has its own binding point: the
pipeline's layouts, the per-class slot bases derived from them, the bound
sets and their dirty flags.

Binding a resource for writing first clears every native read bind of the
same resource, and vice versa.  Clearing a bind invalidates the set slot that
made it, unless that slot is the one being activated right now; invalidated
slots are activated again right before the next draw or dispatch.

Redundant native calls are elided per (stage, slot): constant buffers and
samplers through small caches here, shader-resource and unordered-access
views through the occupancy map in the resource tracker.
*/

use crate::bindings::buffer_range::BufferRange;
use crate::bindings::layout::{BindingClass, ClassCounts, ResourceKind, ResourceLayout};
use crate::bindings::resource_set::{BindableResource, BoundResourceSetInfo, ResourceSet};
use crate::bindings::resource_tracking::{BindMode, BoundViewInfo, Polarity, ResourceTracker};
use crate::bindings::dirty_tracking::DirtySlots;
use crate::bindings::sampler::SamplerId;
use crate::bindings::visible_to::{BufferUsage, ShaderStage, ShaderStages, TextureUsage};
use crate::error::Error;
use crate::imp::{Capabilities, ConstantBufferBinding, NativeRecorder, NativeView, ViewAccess, ViewKey};
use crate::resources::ResourceId;
use std::collections::HashMap;

/// What the engine needs from the command list while binding.
pub(crate) struct BindContext<'a> {
    pub recorder: &'a mut dyn NativeRecorder,
    pub capabilities: &'a Capabilities,
    pub backend_name: &'a str,
}

#[derive(Debug, Default)]
struct BindPoint {
    layouts: Vec<ResourceLayout>,
    bases: Vec<ClassCounts>,
    sets: Vec<Option<BoundResourceSetInfo>>,
    dirty: DirtySlots,
}

impl BindPoint {
    /// Adopts a new pipeline's layouts.
    ///
    /// Bound sets that no longer fit their slot are dropped.  Sets whose
    /// per-class base moved are marked dirty.
    fn configure(&mut self, layouts: &[ResourceLayout]) {
        let mut bases = Vec::with_capacity(layouts.len());
        let mut running = ClassCounts::default();
        for layout in layouts {
            bases.push(running);
            running += layout.counts();
        }
        self.sets.resize(layouts.len(), None);
        self.dirty.resize(layouts.len());
        for slot in 0..layouts.len() {
            let Some(bound) = &self.sets[slot] else {
                continue;
            };
            if !layouts[slot].is_compatible_with(bound.set.layout()) {
                self.sets[slot] = None;
                self.dirty.clear(slot);
            } else if self.bases.get(slot) != Some(&bases[slot]) {
                self.dirty.mark(slot);
            }
        }
        self.layouts = layouts.to_vec();
        self.bases = bases;
    }
}

/// Where one layout element lands natively.
struct BindSite {
    element: usize,
    kind: ResourceKind,
    native_slot: u32,
    set_slot: u32,
    mode: BindMode,
    stages: Vec<ShaderStage>,
}

impl BindSite {
    fn mismatch(&self, found: impl Into<String>) -> Error {
        Error::ResourceTypeMismatch {
            element: self.element,
            expected: self.kind,
            found: found.into(),
        }
    }
}

fn stages_for(mode: BindMode, stages: ShaderStages) -> Vec<ShaderStage> {
    match mode {
        BindMode::Graphics => stages.graphics_stages().collect(),
        BindMode::Compute if stages.contains(ShaderStages::COMPUTE) => vec![ShaderStage::Compute],
        BindMode::Compute => Vec::new(),
    }
}

/// The effective range of a buffer element after its dynamic offset.
fn effective_range(site: &BindSite, resource: &BindableResource, dynamic_offset: u64) -> Result<BufferRange, Error> {
    let range = resource
        .buffer_range()
        .ok_or_else(|| site.mismatch("is not a buffer"))?;
    if dynamic_offset == 0 {
        Ok(range)
    } else {
        range.shifted(dynamic_offset)
    }
}

/// Checks usage flags and dynamic ranges of every element before anything is bound.
fn validate(capabilities: &Capabilities, backend_name: &str, set: &ResourceSet, offsets: &[u32]) -> Result<(), Error> {
    let layout = set.layout();
    let mut offsets = offsets.iter().copied();
    for (element_index, (element, resource)) in layout.elements().iter().zip(set.resources()).enumerate() {
        let site = BindSite {
            element: element_index,
            kind: element.kind,
            native_slot: 0,
            set_slot: 0,
            mode: BindMode::Graphics,
            stages: Vec::new(),
        };
        let dynamic_offset = if element.dynamic_offset {
            let offset = u64::from(offsets.next().unwrap_or(0));
            let alignment = match element.kind {
                ResourceKind::UniformBuffer => capabilities.min_uniform_buffer_offset_alignment,
                _ => capabilities.min_structured_buffer_offset_alignment,
            };
            if alignment > 1 && offset % alignment != 0 {
                return Err(Error::unsupported(
                    backend_name,
                    format!("dynamic offset {offset} of element {element_index} is not a multiple of {alignment}"),
                ));
            }
            offset
        } else {
            0
        };
        match element.kind {
            ResourceKind::UniformBuffer => {
                let range = effective_range(&site, resource, dynamic_offset)?;
                if !range.buffer().usage().contains(BufferUsage::UNIFORM_BUFFER) {
                    return Err(site.mismatch(format!(
                        "{} was not created for uniform use",
                        range.buffer().description().debug_name
                    )));
                }
                if !range.is_full_range() && !capabilities.constant_buffer_ranges {
                    return Err(Error::unsupported(
                        backend_name,
                        "binding a sub-range of a constant buffer",
                    ));
                }
            }
            ResourceKind::StructuredBufferReadOnly | ResourceKind::StructuredBufferReadWrite => {
                let range = effective_range(&site, resource, dynamic_offset)?;
                let required = if element.kind == ResourceKind::StructuredBufferReadOnly {
                    BufferUsage::STRUCTURED_BUFFER_READ_ONLY | BufferUsage::STRUCTURED_BUFFER_READ_WRITE
                } else {
                    BufferUsage::STRUCTURED_BUFFER_READ_WRITE
                };
                if !range.buffer().usage().intersects(required) {
                    return Err(site.mismatch(format!(
                        "{} was not created with {required:?} usage",
                        range.buffer().description().debug_name
                    )));
                }
            }
            ResourceKind::TextureReadOnly | ResourceKind::TextureReadWrite => {
                let BindableResource::Texture(texture) = resource else {
                    return Err(site.mismatch("is not a texture"));
                };
                let required = if element.kind == ResourceKind::TextureReadOnly {
                    TextureUsage::SAMPLED
                } else {
                    TextureUsage::STORAGE
                };
                if !texture.usage().contains(required) {
                    return Err(site.mismatch(format!(
                        "{} was not created with {required:?} usage",
                        texture.description().debug_name
                    )));
                }
            }
            ResourceKind::Sampler => {
                if !matches!(resource, BindableResource::Sampler(_)) {
                    return Err(site.mismatch("is not a sampler"));
                }
            }
        }
    }
    Ok(())
}

#[derive(Debug)]
pub(crate) struct BindingState {
    graphics: BindPoint,
    compute: BindPoint,
    tracker: ResourceTracker,
    samplers: HashMap<(ShaderStage, u32), SamplerId>,
    constant_buffers: HashMap<(ShaderStage, u32), ConstantBufferBinding>,
    trace: bool,
}

impl BindingState {
    pub fn new(trace: bool) -> Self {
        BindingState {
            graphics: BindPoint::default(),
            compute: BindPoint::default(),
            tracker: ResourceTracker::new(),
            samplers: HashMap::new(),
            constant_buffers: HashMap::new(),
            trace,
        }
    }

    fn point(&self, mode: BindMode) -> &BindPoint {
        match mode {
            BindMode::Graphics => &self.graphics,
            BindMode::Compute => &self.compute,
        }
    }

    fn point_mut(&mut self, mode: BindMode) -> &mut BindPoint {
        match mode {
            BindMode::Graphics => &mut self.graphics,
            BindMode::Compute => &mut self.compute,
        }
    }

    /// A pipeline of `mode` with `layouts` was bound.
    pub fn configure(&mut self, mode: BindMode, layouts: &[ResourceLayout]) {
        self.point_mut(mode).configure(layouts);
    }

    /// Forgets every bind.  Native state is assumed to be reset as well.
    pub fn reset(&mut self) {
        self.graphics = BindPoint::default();
        self.compute = BindPoint::default();
        self.tracker.clear();
        self.samplers.clear();
        self.constant_buffers.clear();
    }

    pub fn bound_set(&self, mode: BindMode, slot: usize) -> Option<&BoundResourceSetInfo> {
        self.point(mode).sets.get(slot).and_then(Option::as_ref)
    }

    pub fn is_invalidated(&self, mode: BindMode, slot: usize) -> bool {
        self.point(mode).dirty.is_dirty(slot)
    }

    /// The first layout slot of `mode` with nothing bound.
    pub fn missing_set(&self, mode: BindMode) -> Option<usize> {
        self.point(mode).sets.iter().position(Option::is_none)
    }

    pub fn binds(&self, resource: ResourceId, polarity: Polarity) -> &[BoundViewInfo] {
        self.tracker.binds(resource, polarity)
    }

    /// Binds `set` with `offsets` at `slot`.
    ///
    /// Returns false when the identical pair was already bound.  Graphics sets
    /// are activated immediately; compute sets on the next dispatch.
    pub fn set_resource_set(
        &mut self,
        ctx: &mut BindContext<'_>,
        mode: BindMode,
        slot: usize,
        set: &ResourceSet,
        offsets: &[u32],
    ) -> Result<bool, Error> {
        let point = self.point(mode);
        let Some(expected) = point.layouts.get(slot) else {
            return Err(Error::InvalidState(format!(
                "slot {slot} is past the {count} resource layouts of the bound {mode:?} pipeline",
                count = point.layouts.len()
            )));
        };
        if !expected.is_compatible_with(set.layout()) {
            return Err(Error::LayoutMismatch(format!(
                "set {name} does not match layout {slot} of the bound {mode:?} pipeline",
                name = set.debug_name()
            )));
        }
        let declared = set.layout().dynamic_offset_count();
        if offsets.len() != declared {
            return Err(Error::MissingDynamicOffset {
                expected: declared,
                provided: offsets.len(),
            });
        }
        if point.sets[slot]
            .as_ref()
            .is_some_and(|bound| bound.matches(set, offsets))
        {
            return Ok(false);
        }
        validate(ctx.capabilities, ctx.backend_name, set, offsets)?;

        let point = self.point_mut(mode);
        point.sets[slot] = Some(BoundResourceSetInfo::new(set.clone(), offsets));
        match mode {
            BindMode::Graphics => {
                point.dirty.clear(slot);
                if let Err(err) = self.activate(ctx, mode, slot) {
                    self.point_mut(mode).dirty.mark(slot);
                    return Err(err);
                }
            }
            BindMode::Compute => point.dirty.mark(slot),
        }
        Ok(true)
    }

    /// Reactivates every invalidated slot of `mode`, each at most once.
    pub fn flush(&mut self, ctx: &mut BindContext<'_>, mode: BindMode) -> Result<(), Error> {
        if !self.point(mode).dirty.any() {
            return Ok(());
        }
        for slot in 0..self.point(mode).sets.len() {
            if !self.point_mut(mode).dirty.take(slot) {
                continue;
            }
            if let Err(err) = self.activate(ctx, mode, slot) {
                self.point_mut(mode).dirty.mark(slot);
                return Err(err);
            }
        }
        Ok(())
    }

    fn activate(&mut self, ctx: &mut BindContext<'_>, mode: BindMode, slot: usize) -> Result<(), Error> {
        let point = self.point(mode);
        let Some(bound) = point.sets.get(slot).cloned().flatten() else {
            return Ok(());
        };
        let base = point.bases[slot];
        let layout = bound.set.layout();
        let declared = layout.dynamic_offset_count();
        if bound.offsets.len() != declared {
            return Err(Error::MissingDynamicOffset {
                expected: declared,
                provided: bound.offsets.len(),
            });
        }
        if self.trace {
            logwise::trace_sync!(
                "Activating resource set {name} at {mode} slot {slot}",
                name = bound.set.debug_name().to_string(),
                slot = slot,
                mode = logwise::privacy::LogIt(&mode)
            );
        }
        let mut offsets = bound.offsets.iter().copied();
        for (element_index, (element, resource)) in layout.elements().iter().zip(bound.set.resources()).enumerate() {
            let device_slot = layout.device_slot(element_index);
            let dynamic_offset = if element.dynamic_offset {
                offsets.next().map(u64::from).unwrap_or(0)
            } else {
                0
            };
            let site = BindSite {
                element: element_index,
                kind: element.kind,
                native_slot: base.get(device_slot.class) + device_slot.index,
                set_slot: slot as u32,
                mode,
                stages: stages_for(mode, element.stages),
            };
            match element.kind {
                ResourceKind::UniformBuffer => self.bind_uniform(ctx, &site, resource, dynamic_offset)?,
                ResourceKind::StructuredBufferReadOnly => {
                    self.bind_structured(ctx, &site, resource, dynamic_offset, Polarity::Read)?
                }
                ResourceKind::StructuredBufferReadWrite => {
                    self.bind_structured(ctx, &site, resource, dynamic_offset, Polarity::Write)?
                }
                ResourceKind::TextureReadOnly => self.bind_texture(ctx, &site, resource, Polarity::Read)?,
                ResourceKind::TextureReadWrite => self.bind_texture(ctx, &site, resource, Polarity::Write)?,
                ResourceKind::Sampler => self.bind_sampler(ctx, &site, resource)?,
            }
        }
        Ok(())
    }

    fn bind_uniform(
        &mut self,
        ctx: &mut BindContext<'_>,
        site: &BindSite,
        resource: &BindableResource,
        dynamic_offset: u64,
    ) -> Result<(), Error> {
        let range = effective_range(site, resource, dynamic_offset)?;
        let buffer = range.buffer();
        let binding = if range.is_full_range() {
            ConstantBufferBinding {
                buffer: buffer.native(),
                range: None,
            }
        } else {
            if !ctx.capabilities.constant_buffer_ranges {
                return Err(Error::unsupported(
                    ctx.backend_name,
                    "binding a sub-range of a constant buffer",
                ));
            }
            let size = match ctx.capabilities.constant_buffer_range_granularity {
                Some(granularity) if granularity > 1 => range
                    .size()
                    .div_ceil(granularity)
                    .saturating_mul(granularity)
                    .min(buffer.size() - range.offset()),
                _ => range.size(),
            };
            ConstantBufferBinding {
                buffer: buffer.native(),
                range: Some(ViewKey {
                    offset: range.offset(),
                    size,
                }),
            }
        };
        for &stage in &site.stages {
            let key = (stage, site.native_slot);
            if self.constant_buffers.get(&key) == Some(&binding) {
                continue;
            }
            ctx.recorder.set_constant_buffer(stage, site.native_slot, Some(binding));
            self.constant_buffers.insert(key, binding);
        }
        Ok(())
    }

    fn bind_structured(
        &mut self,
        ctx: &mut BindContext<'_>,
        site: &BindSite,
        resource: &BindableResource,
        dynamic_offset: u64,
        polarity: Polarity,
    ) -> Result<(), Error> {
        let range = effective_range(site, resource, dynamic_offset)?;
        let buffer = range.buffer();
        self.unbind(
            ctx.recorder,
            buffer.id(),
            polarity.opposite(),
            Some((site.mode, site.set_slot)),
        );
        let view = buffer.view(range.view_key(), access_for(polarity))?;
        self.bind_view(ctx, site, buffer.id(), view, polarity);
        Ok(())
    }

    fn bind_texture(
        &mut self,
        ctx: &mut BindContext<'_>,
        site: &BindSite,
        resource: &BindableResource,
        polarity: Polarity,
    ) -> Result<(), Error> {
        let BindableResource::Texture(texture) = resource else {
            return Err(site.mismatch("is not a texture"));
        };
        self.unbind(
            ctx.recorder,
            texture.id(),
            polarity.opposite(),
            Some((site.mode, site.set_slot)),
        );
        let view = texture.view(access_for(polarity))?;
        self.bind_view(ctx, site, texture.id(), view, polarity);
        Ok(())
    }

    fn bind_view(
        &mut self,
        ctx: &mut BindContext<'_>,
        site: &BindSite,
        resource: ResourceId,
        view: NativeView,
        polarity: Polarity,
    ) {
        let class = site.kind.binding_class();
        for &stage in &site.stages {
            if !self.tracker.holds(class, stage, site.native_slot, resource, view) {
                match polarity {
                    Polarity::Read => ctx.recorder.set_shader_resource(stage, site.native_slot, Some(view)),
                    Polarity::Write => ctx.recorder.set_unordered_access(stage, site.native_slot, Some(view)),
                }
            }
            self.tracker.record(
                resource,
                view,
                BoundViewInfo {
                    class,
                    stage,
                    slot: site.native_slot,
                    set_slot: site.set_slot,
                    mode: site.mode,
                },
            );
        }
    }

    fn bind_sampler(&mut self, ctx: &mut BindContext<'_>, site: &BindSite, resource: &BindableResource) -> Result<(), Error> {
        let BindableResource::Sampler(sampler) = resource else {
            return Err(site.mismatch("is not a sampler"));
        };
        for &stage in &site.stages {
            let key = (stage, site.native_slot);
            if self.samplers.get(&key) == Some(&sampler.id()) {
                continue;
            }
            ctx.recorder.set_sampler(stage, site.native_slot, sampler.native());
            self.samplers.insert(key, sampler.id());
        }
        Ok(())
    }

    /// Clears every `polarity` bind of `resource`, invalidating the owning set slots.
    ///
    /// `activating` names the slot currently being activated, which is never
    /// invalidated by its own binds.  Returns how many native binds were cleared.
    pub fn unbind(
        &mut self,
        recorder: &mut dyn NativeRecorder,
        resource: ResourceId,
        polarity: Polarity,
        activating: Option<(BindMode, u32)>,
    ) -> usize {
        let binds = self.tracker.take(resource, polarity);
        for info in &binds {
            match info.class {
                BindingClass::UnorderedAccess => recorder.set_unordered_access(info.stage, info.slot, None),
                _ => recorder.set_shader_resource(info.stage, info.slot, None),
            }
            if activating != Some((info.mode, info.set_slot)) {
                self.point_mut(info.mode).dirty.mark(info.set_slot as usize);
                if self.trace {
                    logwise::trace_sync!(
                        "Invalidated {mode} resource set slot {slot} after clearing a stale bind",
                        slot = info.set_slot,
                        mode = logwise::privacy::LogIt(&info.mode)
                    );
                }
            }
        }
        binds.len()
    }
}

fn access_for(polarity: Polarity) -> ViewAccess {
    match polarity {
        Polarity::Read => ViewAccess::Read,
        Polarity::Write => ViewAccess::ReadWrite,
    }
}
