// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! Buffers and textures. */

pub mod buffer;
pub mod texture;
pub(crate) mod view_cache;

pub use buffer::{Buffer, BufferDescription};
pub use texture::{Texture, TextureCopy, TextureDescription};

use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of a buffer or texture.
///
/// Buffers and textures draw from one id space, so the reverse binding maps
/// can key on either without ambiguity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

impl ResourceId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ResourceId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}
