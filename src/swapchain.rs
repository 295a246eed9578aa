// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Swapchains and the command lists that reference them.
//!
//! A command list that binds a swapchain's framebuffer references that
//! swapchain until the list completes (or its recording is discarded).  While
//! referenced, the swapchain's targets may still be written by in-flight work,
//! so it refuses to be resized.

use crate::commands::CommandListId;
use crate::error::Error;
use crate::framebuffer::Framebuffer;
use crate::imp::Backend;
use crate::pixel_formats::PixelFormat;
use crate::resources::{Texture, TextureDescription};
use crate::bindings::visible_to::TextureUsage;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// The set of command lists currently referencing one swapchain.
#[derive(Debug, Default)]
pub(crate) struct SwapchainReferences {
    referencers: Mutex<HashSet<CommandListId>>,
}

impl SwapchainReferences {
    pub fn insert(&self, list: CommandListId) {
        self.referencers
            .lock()
            .expect("swapchain references poisoned")
            .insert(list);
    }

    pub fn remove(&self, list: CommandListId) {
        self.referencers
            .lock()
            .expect("swapchain references poisoned")
            .remove(&list);
    }

    pub fn len(&self) -> usize {
        self.referencers
            .lock()
            .expect("swapchain references poisoned")
            .len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapchainDescription {
    pub width: u32,
    pub height: u32,
    pub color_format: PixelFormat,
    pub depth_format: Option<PixelFormat>,
    pub debug_name: String,
}

impl SwapchainDescription {
    pub fn new(width: u32, height: u32, color_format: PixelFormat, debug_name: &str) -> Self {
        SwapchainDescription {
            width,
            height,
            color_format,
            depth_format: None,
            debug_name: debug_name.to_string(),
        }
    }

    pub fn with_depth(mut self, depth_format: PixelFormat) -> Self {
        self.depth_format = Some(depth_format);
        self
    }
}

#[derive(Debug)]
pub struct Swapchain {
    backend: Arc<dyn Backend>,
    description: SwapchainDescription,
    references: Arc<SwapchainReferences>,
    framebuffer: Framebuffer,
}

impl Swapchain {
    pub(crate) fn new(backend: &Arc<dyn Backend>, description: SwapchainDescription) -> Result<Self, Error> {
        let references = Arc::new(SwapchainReferences::default());
        let framebuffer = Self::create_framebuffer(backend, &description, &references)?;
        Ok(Swapchain {
            backend: backend.clone(),
            description,
            references,
            framebuffer,
        })
    }

    fn create_framebuffer(
        backend: &Arc<dyn Backend>,
        description: &SwapchainDescription,
        references: &Arc<SwapchainReferences>,
    ) -> Result<Framebuffer, Error> {
        let color = Texture::new(
            backend,
            TextureDescription::new_2d(
                description.width,
                description.height,
                description.color_format,
                TextureUsage::RENDER_TARGET,
                &description.debug_name,
            ),
        )?;
        let depth = match description.depth_format {
            Some(format) => Some(Texture::new(
                backend,
                TextureDescription::new_2d(
                    description.width,
                    description.height,
                    format,
                    TextureUsage::DEPTH_STENCIL,
                    &format!("{} depth", description.debug_name),
                ),
            )?),
            None => None,
        };
        Framebuffer::new(backend, vec![color], depth, Some(references.clone()))
    }

    pub fn description(&self) -> &SwapchainDescription {
        &self.description
    }

    /// The framebuffer to render into.
    pub fn framebuffer(&self) -> &Framebuffer {
        &self.framebuffer
    }

    /// Whether a recorded or in-flight command list still targets this swapchain.
    pub fn is_referenced(&self) -> bool {
        self.references.len() > 0
    }

    pub fn reference_count(&self) -> usize {
        self.references.len()
    }

    /// Recreates the targets at a new size.
    ///
    /// Fails with [`Error::InvalidState`] while any command list references the swapchain.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), Error> {
        let referencers = self.references.len();
        if referencers > 0 {
            return Err(Error::InvalidState(format!(
                "swapchain {name} is referenced by {referencers} command lists",
                name = self.description.debug_name
            )));
        }
        let mut description = self.description.clone();
        description.width = width;
        description.height = height;
        let framebuffer = Self::create_framebuffer(&self.backend, &description, &self.references)?;
        logwise::info_sync!(
            "Resized swapchain {name} to {width}x{height}",
            name = description.debug_name.clone(),
            width = width,
            height = height
        );
        self.description = description;
        self.framebuffer = framebuffer;
        Ok(())
    }
}
