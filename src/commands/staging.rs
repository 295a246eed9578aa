// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Per-command-list pool of CPU-visible staging buffers.

When a buffer update cannot be recorded directly, the bytes are written into
a staging buffer and a GPU copy is recorded.  The staging buffer must stay
untouched until the copy has executed, so it moves to the submitted list as
soon as the copy is recorded, and only returns to the available list when the
command list completes (or is reset before it was ever submitted).

Buffers are never shared between command lists.
*/

use crate::error::Error;
use crate::resources::{Buffer, ResourceId};

#[derive(Debug, Default)]
pub(crate) struct StagingPool {
    available: Vec<Buffer>,
    submitted: Vec<Buffer>,
}

impl StagingPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the smallest available buffer of at least `size` bytes, or creates one.
    ///
    /// The returned buffer belongs to neither list until it is handed back with
    /// [`mark_submitted`](Self::mark_submitted) or [`restore`](Self::restore).
    pub fn acquire<F>(&mut self, size: u64, create: F) -> Result<Buffer, Error>
    where
        F: FnOnce(u64) -> Result<Buffer, Error>,
    {
        let best = self
            .available
            .iter()
            .enumerate()
            .filter(|(_, buffer)| buffer.size() >= size)
            .min_by_key(|(_, buffer)| buffer.size())
            .map(|(i, _)| i);
        match best {
            Some(i) => Ok(self.available.swap_remove(i)),
            None => create(size),
        }
    }

    /// A copy out of `buffer` has been recorded.
    pub fn mark_submitted(&mut self, buffer: Buffer) {
        self.submitted.push(buffer);
    }

    /// Returns an acquired buffer whose copy was never recorded.
    pub fn restore(&mut self, buffer: Buffer) {
        self.available.push(buffer);
    }

    /// Every recorded copy has executed (or will never execute).
    ///
    /// Returns how many buffers were released.
    pub fn release_submitted(&mut self) -> usize {
        let released = self.submitted.len();
        self.available.append(&mut self.submitted);
        released
    }

    pub fn available(&self) -> Vec<ResourceId> {
        self.available.iter().map(Buffer::id).collect()
    }

    pub fn submitted(&self) -> Vec<ResourceId> {
        self.submitted.iter().map(Buffer::id).collect()
    }
}
