// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Render targets.

use crate::bindings::visible_to::TextureUsage;
use crate::error::Error;
use crate::imp::{Backend, NativeFramebuffer};
use crate::resources::Texture;
use crate::swapchain::SwapchainReferences;
use std::fmt::Debug;
use std::sync::Arc;

struct FramebufferShared {
    native: NativeFramebuffer,
    color_targets: Vec<Texture>,
    depth_target: Option<Texture>,
    width: u32,
    height: u32,
    swapchain: Option<Arc<SwapchainReferences>>,
    backend: Arc<dyn Backend>,
}

impl Debug for FramebufferShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Framebuffer")
            .field("native", &self.native)
            .field("color_targets", &self.color_targets.len())
            .field("depth", &self.depth_target.is_some())
            .field("swapchain", &self.swapchain.is_some())
            .finish()
    }
}

impl Drop for FramebufferShared {
    fn drop(&mut self) {
        self.backend.destroy_framebuffer(self.native);
    }
}

/// A set of color targets and an optional depth target.  Cheap to clone.
#[derive(Debug, Clone)]
pub struct Framebuffer {
    shared: Arc<FramebufferShared>,
}

impl Framebuffer {
    pub(crate) fn new(
        backend: &Arc<dyn Backend>,
        color_targets: Vec<Texture>,
        depth_target: Option<Texture>,
        swapchain: Option<Arc<SwapchainReferences>>,
    ) -> Result<Self, Error> {
        let Some(first) = color_targets.first().or(depth_target.as_ref()) else {
            return Err(Error::InvalidState("a framebuffer needs at least one target".to_string()));
        };
        let (width, height, _) = first.description().mip_extent(0);
        for target in &color_targets {
            if !target.usage().contains(TextureUsage::RENDER_TARGET) {
                return Err(Error::InvalidState(format!(
                    "{} was not created as a render target",
                    target.description().debug_name
                )));
            }
        }
        if let Some(depth) = &depth_target
            && !depth.usage().contains(TextureUsage::DEPTH_STENCIL)
        {
            return Err(Error::InvalidState(format!(
                "{} was not created as a depth target",
                depth.description().debug_name
            )));
        }
        for target in color_targets.iter().chain(depth_target.as_ref()) {
            let (w, h, _) = target.description().mip_extent(0);
            if (w, h) != (width, height) {
                return Err(Error::InvalidState(format!(
                    "{} is {w}x{h} but the framebuffer is {width}x{height}",
                    target.description().debug_name
                )));
            }
        }
        let natives: Vec<_> = color_targets.iter().map(Texture::native).collect();
        let native = backend.create_framebuffer(&natives, depth_target.as_ref().map(Texture::native))?;
        Ok(Framebuffer {
            shared: Arc::new(FramebufferShared {
                native,
                color_targets,
                depth_target,
                width,
                height,
                swapchain,
                backend: backend.clone(),
            }),
        })
    }

    pub fn color_targets(&self) -> &[Texture] {
        &self.shared.color_targets
    }

    pub fn depth_target(&self) -> Option<&Texture> {
        self.shared.depth_target.as_ref()
    }

    pub fn width(&self) -> u32 {
        self.shared.width
    }

    pub fn height(&self) -> u32 {
        self.shared.height
    }

    pub(crate) fn native(&self) -> NativeFramebuffer {
        self.shared.native
    }

    pub(crate) fn swapchain(&self) -> Option<&Arc<SwapchainReferences>> {
        self.shared.swapchain.as_ref()
    }
}

impl PartialEq for Framebuffer {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}
impl Eq for Framebuffer {}
