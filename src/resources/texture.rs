// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Textures and their default views.

use crate::bindings::visible_to::TextureUsage;
use crate::error::Error;
use crate::imp::{Backend, NativeTexture, NativeView, ViewAccess};
use crate::pixel_formats::PixelFormat;
use crate::resources::ResourceId;
use crate::resources::view_cache::ViewCache;
use std::fmt::Debug;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDescription {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub format: PixelFormat,
    pub usage: TextureUsage,
    pub sample_count: u32,
    pub debug_name: String,
}

impl TextureDescription {
    pub fn new_2d(
        width: u32,
        height: u32,
        format: PixelFormat,
        usage: TextureUsage,
        debug_name: &str,
    ) -> Self {
        TextureDescription {
            width,
            height,
            depth: 1,
            mip_levels: 1,
            array_layers: 1,
            format,
            usage,
            sample_count: 1,
            debug_name: debug_name.to_string(),
        }
    }

    pub fn with_mip_levels(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels;
        self
    }

    pub fn with_sample_count(mut self, sample_count: u32) -> Self {
        self.sample_count = sample_count;
        self
    }

    /// Dimensions of `mip_level`, never smaller than one texel.
    pub fn mip_extent(&self, mip_level: u32) -> (u32, u32, u32) {
        let level = |size: u32| size.checked_shr(mip_level).unwrap_or(0).max(1);
        (level(self.width), level(self.height), level(self.depth))
    }

    /// Length of the full mip chain down to a 1x1x1 level.
    pub fn max_mip_levels(&self) -> u32 {
        let largest = self.width.max(self.height).max(self.depth).max(1);
        u32::BITS - largest.leading_zeros()
    }
}

/// A region copied by [`copy_texture`](crate::commands::CommandList::copy_texture).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureCopy {
    pub source_origin: (u32, u32, u32),
    pub source_mip_level: u32,
    pub source_base_array_layer: u32,
    pub destination_origin: (u32, u32, u32),
    pub destination_mip_level: u32,
    pub destination_base_array_layer: u32,
    pub extent: (u32, u32, u32),
    pub layer_count: u32,
}

impl TextureCopy {
    /// Copies mip 0, layer 0 of `extent` between the origins of both textures.
    pub fn whole(extent: (u32, u32, u32)) -> Self {
        TextureCopy {
            source_origin: (0, 0, 0),
            source_mip_level: 0,
            source_base_array_layer: 0,
            destination_origin: (0, 0, 0),
            destination_mip_level: 0,
            destination_base_array_layer: 0,
            extent,
            layer_count: 1,
        }
    }
}

struct TextureShared {
    id: ResourceId,
    native: NativeTexture,
    description: TextureDescription,
    views: ViewCache<ViewAccess>,
    backend: Arc<dyn Backend>,
}

impl Debug for TextureShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.id)
            .field("native", &self.native)
            .field("debug_name", &self.description.debug_name)
            .finish()
    }
}

impl Drop for TextureShared {
    fn drop(&mut self) {
        for view in self.views.drain() {
            self.backend.destroy_view(view);
        }
        self.backend.destroy_texture(self.native);
    }
}

/// A GPU texture.
///
/// Cheap to clone.  Shader bindings use the texture's default full-resource
/// views, which are created lazily and cached for the texture's lifetime.
#[derive(Debug, Clone)]
pub struct Texture {
    shared: Arc<TextureShared>,
}

impl Texture {
    pub(crate) fn new(backend: &Arc<dyn Backend>, description: TextureDescription) -> Result<Self, Error> {
        if description.width == 0
            || description.height == 0
            || description.depth == 0
            || description.mip_levels == 0
            || description.array_layers == 0
            || description.sample_count == 0
        {
            return Err(Error::InvalidState(format!(
                "texture {} has an empty dimension",
                description.debug_name
            )));
        }
        if description.mip_levels > description.max_mip_levels() {
            return Err(Error::InvalidState(format!(
                "texture {} asks for {} mip levels but its full chain has {}",
                description.debug_name,
                description.mip_levels,
                description.max_mip_levels()
            )));
        }
        let native = backend.create_texture(&description)?;
        Ok(Texture {
            shared: Arc::new(TextureShared {
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

    pub fn description(&self) -> &TextureDescription {
        &self.shared.description
    }

    pub fn usage(&self) -> TextureUsage {
        self.shared.description.usage
    }

    pub fn native(&self) -> NativeTexture {
        self.shared.native
    }

    /// Fetches or lazily creates the default view of `access`.
    pub(crate) fn view(&self, access: ViewAccess) -> Result<NativeView, Error> {
        self.shared.views.get_or_create(access, || {
            self.shared
                .backend
                .create_texture_view(self.shared.native, access)
        })
    }

    pub fn cached_view_count(&self) -> usize {
        self.shared.views.len()
    }
}

impl PartialEq for Texture {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}
impl Eq for Texture {}
