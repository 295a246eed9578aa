// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use crate::error::Error;
use crate::imp::ViewKey;
use crate::resources::Buffer;

/// A byte range of a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferRange {
    buffer: Buffer,
    offset: u64,
    size: u64,
}

impl BufferRange {
    /// Fails with [`Error::InvalidState`] if the range does not fit in the buffer.
    pub fn new(buffer: Buffer, offset: u64, size: u64) -> Result<Self, Error> {
        let end = offset.checked_add(size);
        if size == 0 || end.is_none_or(|end| end > buffer.size()) {
            return Err(Error::InvalidState(format!(
                "range {offset}+{size} does not fit buffer {name} of {len} bytes",
                name = buffer.description().debug_name,
                len = buffer.size()
            )));
        }
        Ok(BufferRange {
            buffer,
            offset,
            size,
        })
    }

    pub fn full(buffer: Buffer) -> Self {
        let size = buffer.size();
        BufferRange {
            buffer,
            offset: 0,
            size,
        }
    }

    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_full_range(&self) -> bool {
        self.offset == 0 && self.size == self.buffer.size()
    }

    /// The same range shifted by a dynamic offset.
    ///
    /// Fails with [`Error::InvalidState`] if the shifted range runs past the buffer end.
    pub(crate) fn shifted(&self, dynamic_offset: u64) -> Result<BufferRange, Error> {
        BufferRange::new(self.buffer.clone(), self.offset + dynamic_offset, self.size)
    }

    pub(crate) fn view_key(&self) -> ViewKey {
        ViewKey {
            offset: self.offset,
            size: self.size,
        }
    }
}
