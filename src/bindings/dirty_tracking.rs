// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Per-slot "dirty" tracking for resource-set binding points.

A slot is marked dirty when one of its native binds was cleared to resolve a
read/write hazard, or when the pipeline changed underneath it.  Dirty slots are
not rebound when they are marked; they are reactivated lazily, right before
the next draw or dispatch, so a slot marked many times is rebound once.

Graphics and compute binding points each own an independent instance.
*/

#[derive(Debug, Clone, Default)]
pub(crate) struct DirtySlots {
    dirty: Vec<bool>,
}

impl DirtySlots {
    /// Resizes to `len` slots.  New slots start clean; truncated slots are forgotten.
    pub fn resize(&mut self, len: usize) {
        self.dirty.resize(len, false);
    }

    /// Marks `slot` dirty.  Slots past the end are ignored; nothing is bound there.
    pub fn mark(&mut self, slot: usize) {
        if let Some(dirty) = self.dirty.get_mut(slot) {
            *dirty = true;
        }
    }

    pub fn clear(&mut self, slot: usize) {
        if let Some(dirty) = self.dirty.get_mut(slot) {
            *dirty = false;
        }
    }

    /// Returns whether `slot` was dirty, clearing it.
    pub fn take(&mut self, slot: usize) -> bool {
        match self.dirty.get_mut(slot) {
            Some(dirty) => std::mem::replace(dirty, false),
            None => false,
        }
    }

    pub fn is_dirty(&self, slot: usize) -> bool {
        self.dirty.get(slot).copied().unwrap_or(false)
    }

    pub fn any(&self) -> bool {
        self.dirty.iter().any(|d| *d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marks_are_idempotent_and_taken_once() {
        let mut slots = DirtySlots::default();
        slots.resize(3);
        slots.mark(1);
        slots.mark(1);
        slots.mark(7);
        assert!(slots.any());
        assert!(slots.take(1));
        assert!(!slots.take(1));
        assert!(!slots.any());
    }

    #[test]
    fn resize_forgets_truncated() {
        let mut slots = DirtySlots::default();
        slots.resize(2);
        slots.mark(1);
        slots.resize(1);
        slots.resize(2);
        assert!(!slots.is_dirty(1));
    }
}
