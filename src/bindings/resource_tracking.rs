// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Reverse maps from resources to the native slots they are bound to.
//!
//! The binding engine needs to answer "where is this buffer or texture bound
//! for reading (or writing) right now?" so that binding it with the opposite
//! polarity can clear the stale bind first.  This module keeps that index.
//!
//! # Overview
//!
//! Two maps are kept, keyed by [`ResourceId`]:
//! - read binds: shader-resource slots holding a read view of the resource
//! - write binds: unordered-access slots holding a write view of the resource
//!
//! Each entry is a [`BoundViewInfo`] naming the native slot, the stage, the
//! pipeline mode and the resource-set slot that owns the bind.  The set slot
//! is what gets invalidated when the bind is cleared.
//!
//! A third map records which view currently occupies each native slot.  When
//! a slot is overwritten the previous occupant's entry is dropped, so the
//! maps never describe binds that no longer exist.  None of the maps own the
//! resources they describe.

use crate::bindings::layout::BindingClass;
use crate::bindings::visible_to::ShaderStage;
use crate::imp::NativeView;
use crate::resources::ResourceId;
use std::collections::HashMap;

/// Which binding point a bind was made for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindMode {
    Graphics,
    Compute,
}

/// Read or write polarity of a tracked bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Polarity {
    Read,
    Write,
}

impl Polarity {
    pub fn opposite(self) -> Polarity {
        match self {
            Polarity::Read => Polarity::Write,
            Polarity::Write => Polarity::Read,
        }
    }

    fn of(class: BindingClass) -> Polarity {
        match class {
            BindingClass::UnorderedAccess => Polarity::Write,
            _ => Polarity::Read,
        }
    }
}

/// One tracked native bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundViewInfo {
    pub class: BindingClass,
    pub stage: ShaderStage,
    pub slot: u32,
    /// The resource-set slot whose activation made this bind.
    pub set_slot: u32,
    pub mode: BindMode,
}

type NativeSlot = (BindingClass, ShaderStage, u32);

#[derive(Debug, Default)]
pub(crate) struct ResourceTracker {
    reads: HashMap<ResourceId, Vec<BoundViewInfo>>,
    writes: HashMap<ResourceId, Vec<BoundViewInfo>>,
    occupants: HashMap<NativeSlot, (ResourceId, NativeView)>,
}

impl ResourceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn map_mut(&mut self, polarity: Polarity) -> &mut HashMap<ResourceId, Vec<BoundViewInfo>> {
        match polarity {
            Polarity::Read => &mut self.reads,
            Polarity::Write => &mut self.writes,
        }
    }

    fn map(&self, polarity: Polarity) -> &HashMap<ResourceId, Vec<BoundViewInfo>> {
        match polarity {
            Polarity::Read => &self.reads,
            Polarity::Write => &self.writes,
        }
    }

    /// Whether `view` of `resource` already occupies the native slot.
    pub fn holds(&self, class: BindingClass, stage: ShaderStage, slot: u32, resource: ResourceId, view: NativeView) -> bool {
        self.occupants.get(&(class, stage, slot)) == Some(&(resource, view))
    }

    /// Records that `view` of `resource` was bound as described by `info`.
    ///
    /// Whatever previously occupied that native slot is forgotten.
    pub fn record(&mut self, resource: ResourceId, view: NativeView, info: BoundViewInfo) {
        let key = (info.class, info.stage, info.slot);
        let polarity = Polarity::of(info.class);
        if let Some((previous, _)) = self.occupants.insert(key, (resource, view)) {
            self.remove_entry(previous, polarity, key);
        }
        self.map_mut(polarity).entry(resource).or_default().push(info);
    }

    fn remove_entry(&mut self, resource: ResourceId, polarity: Polarity, key: NativeSlot) {
        let map = self.map_mut(polarity);
        if let Some(infos) = map.get_mut(&resource) {
            infos.retain(|info| (info.class, info.stage, info.slot) != key);
            if infos.is_empty() {
                map.remove(&resource);
            }
        }
    }

    /// Removes and returns every `polarity` bind of `resource`.
    pub fn take(&mut self, resource: ResourceId, polarity: Polarity) -> Vec<BoundViewInfo> {
        let infos = self.map_mut(polarity).remove(&resource).unwrap_or_default();
        for info in &infos {
            self.occupants.remove(&(info.class, info.stage, info.slot));
        }
        infos
    }

    pub fn binds(&self, resource: ResourceId, polarity: Polarity) -> &[BoundViewInfo] {
        self.map(polarity)
            .get(&resource)
            .map(|infos| infos.as_slice())
            .unwrap_or(&[])
    }

    pub fn clear(&mut self) {
        self.reads.clear();
        self.writes.clear();
        self.occupants.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(class: BindingClass, slot: u32, set_slot: u32) -> BoundViewInfo {
        BoundViewInfo {
            class,
            stage: ShaderStage::Fragment,
            slot,
            set_slot,
            mode: BindMode::Graphics,
        }
    }

    #[test]
    fn take_returns_and_forgets() {
        let mut tracker = ResourceTracker::new();
        let texture = ResourceId::next();
        tracker.record(texture, NativeView(1), info(BindingClass::ShaderResource, 0, 0));
        tracker.record(texture, NativeView(1), info(BindingClass::ShaderResource, 3, 1));
        assert_eq!(tracker.binds(texture, Polarity::Read).len(), 2);
        assert!(tracker.binds(texture, Polarity::Write).is_empty());

        let taken = tracker.take(texture, Polarity::Read);
        assert_eq!(taken.len(), 2);
        assert!(tracker.binds(texture, Polarity::Read).is_empty());
        assert!(!tracker.holds(BindingClass::ShaderResource, ShaderStage::Fragment, 0, texture, NativeView(1)));
    }

    #[test]
    fn overwriting_a_slot_drops_the_stale_entry() {
        let mut tracker = ResourceTracker::new();
        let a = ResourceId::next();
        let b = ResourceId::next();
        tracker.record(a, NativeView(1), info(BindingClass::UnorderedAccess, 2, 0));
        tracker.record(b, NativeView(2), info(BindingClass::UnorderedAccess, 2, 0));
        assert!(tracker.binds(a, Polarity::Write).is_empty());
        assert_eq!(tracker.binds(b, Polarity::Write).len(), 1);
        assert!(tracker.holds(BindingClass::UnorderedAccess, ShaderStage::Fragment, 2, b, NativeView(2)));
    }

    #[test]
    fn rebinding_same_slot_does_not_duplicate() {
        let mut tracker = ResourceTracker::new();
        let a = ResourceId::next();
        tracker.record(a, NativeView(1), info(BindingClass::ShaderResource, 0, 0));
        tracker.record(a, NativeView(1), info(BindingClass::ShaderResource, 0, 0));
        assert_eq!(tracker.binds(a, Polarity::Read).len(), 1);
    }
}
