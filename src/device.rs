// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The device: object factory, submission and completion.

A [`Device`] wraps one [`Backend`].  It creates every object that binds to
native state, serializes submissions, and retires finished work when polled.
It is cheap to clone and can be shared between recording threads.
*/

use crate::bindings::layout::ResourceLayout;
use crate::bindings::resource_set::{BindableResource, ResourceSet};
use crate::bindings::sampler::{Sampler, SamplerDescription};
use crate::bindings::visible_to::BufferUsage;
use crate::commands::{CommandList, CommandListState};
use crate::error::Error;
use crate::framebuffer::Framebuffer;
use crate::imp::{Backend, Capabilities};
use crate::pipeline::{Pipeline, PipelineDescription};
use crate::resources::{Buffer, BufferDescription, Texture, TextureDescription};
use crate::swapchain::{Swapchain, SwapchainDescription};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Runtime switches for a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceOptions {
    /// Forward debug groups and markers to backends that support them.
    pub emit_debug_markers: bool,
    /// Log every resource-set activation and invalidation.
    pub trace_bindings: bool,
}

impl DeviceOptions {
    /// Reads `SAS_DEBUG_MARKERS` and `SAS_TRACE_BINDS`; `"1"` enables each.
    pub fn from_env() -> Self {
        DeviceOptions {
            emit_debug_markers: std::env::var("SAS_DEBUG_MARKERS")
                .map(|e| e == "1")
                .unwrap_or(false),
            trace_bindings: std::env::var("SAS_TRACE_BINDS")
                .map(|e| e == "1")
                .unwrap_or(false),
        }
    }
}

#[derive(Debug)]
struct DeviceShared {
    backend: Arc<dyn Backend>,
    options: DeviceOptions,
    in_flight: Arc<AtomicUsize>,
    submit_lock: Mutex<()>,
}

#[derive(Debug, Clone)]
pub struct Device {
    shared: Arc<DeviceShared>,
}

impl Device {
    pub fn new(backend: Arc<dyn Backend>, options: DeviceOptions) -> Self {
        logwise::info_sync!(
            "Created device on {backend} with {options}",
            backend = backend.name().to_string(),
            options = logwise::privacy::LogIt(&options)
        );
        Device {
            shared: Arc::new(DeviceShared {
                backend,
                options,
                in_flight: Arc::new(AtomicUsize::new(0)),
                submit_lock: Mutex::new(()),
            }),
        }
    }

    pub(crate) fn backend(&self) -> &Arc<dyn Backend> {
        &self.shared.backend
    }

    pub fn backend_name(&self) -> &str {
        self.shared.backend.name()
    }

    pub fn capabilities(&self) -> &Capabilities {
        self.shared.backend.capabilities()
    }

    pub fn options(&self) -> DeviceOptions {
        self.shared.options
    }

    pub fn create_buffer(&self, description: BufferDescription) -> Result<Buffer, Error> {
        Buffer::new(&self.shared.backend, description)
    }

    pub fn create_texture(&self, description: TextureDescription) -> Result<Texture, Error> {
        Texture::new(&self.shared.backend, description)
    }

    pub fn create_sampler(&self, description: SamplerDescription) -> Result<Sampler, Error> {
        Sampler::new(&self.shared.backend, description)
    }

    /// Binds concrete objects against `layout`.
    ///
    /// Fails with [`Error::LayoutMismatch`] if the objects do not correspond
    /// kind-for-kind to the layout, or [`Error::UnsupportedOperation`] if a
    /// buffer range offset violates the backend's alignment.
    pub fn create_resource_set(
        &self,
        layout: &ResourceLayout,
        resources: Vec<BindableResource>,
        debug_name: &str,
    ) -> Result<ResourceSet, Error> {
        ResourceSet::new(
            self.capabilities(),
            self.backend_name(),
            layout,
            resources,
            debug_name,
        )
    }

    pub fn create_pipeline(&self, description: PipelineDescription) -> Result<Pipeline, Error> {
        Pipeline::new(&self.shared.backend, description)
    }

    pub fn create_framebuffer(
        &self,
        color_targets: Vec<Texture>,
        depth_target: Option<Texture>,
    ) -> Result<Framebuffer, Error> {
        Framebuffer::new(&self.shared.backend, color_targets, depth_target, None)
    }

    pub fn create_swapchain(&self, description: SwapchainDescription) -> Result<Swapchain, Error> {
        Swapchain::new(&self.shared.backend, description)
    }

    pub fn create_command_list(&self) -> CommandList {
        CommandList::new(self.clone())
    }

    /// Writes a CPU-visible (dynamic or staging) buffer immediately.
    pub fn write_buffer(&self, buffer: &Buffer, offset: u64, data: &[u8]) -> Result<(), Error> {
        check_range(buffer, offset, data.len() as u64)?;
        if !buffer
            .usage()
            .intersects(BufferUsage::DYNAMIC | BufferUsage::STAGING)
        {
            return Err(Error::InvalidState(format!(
                "{} is not CPU-visible; record update_buffer instead",
                buffer.description().debug_name
            )));
        }
        self.shared.backend.write_buffer(buffer.native(), offset, data)
    }

    /// Reads buffer contents as of the last retired submission.
    pub fn read_buffer(&self, buffer: &Buffer, offset: u64, len: u64) -> Result<Vec<u8>, Error> {
        check_range(buffer, offset, len)?;
        self.shared.backend.read_buffer(buffer.native(), offset, len)
    }

    /// Submits an `Ended` command list.
    ///
    /// The list moves to `Submitted`, and to `Completed` once the backend
    /// retires it during [`poll`](Self::poll).
    pub fn submit(&self, list: &mut CommandList) -> Result<(), Error> {
        let _serial = self
            .shared
            .submit_lock
            .lock()
            .expect("device submission lock poisoned");
        let (commands, lifecycle) = list.prepare_submit()?;
        let in_flight = self.shared.in_flight.clone();
        in_flight.fetch_add(1, Ordering::AcqRel);
        let completion_lifecycle = lifecycle.clone();
        let completion_in_flight = in_flight.clone();
        let on_complete = Box::new(move || {
            completion_lifecycle.complete();
            completion_in_flight.fetch_sub(1, Ordering::AcqRel);
        });
        if let Err(err) = self.shared.backend.submit(commands, on_complete) {
            in_flight.fetch_sub(1, Ordering::AcqRel);
            lifecycle.transition("submit", &[CommandListState::Submitted], CommandListState::Ended)?;
            return Err(err);
        }
        logwise::info_sync!(
            "Submitted command list {list}",
            list = logwise::privacy::LogIt(&list.id())
        );
        Ok(())
    }

    /// Retires finished submissions.  Returns how many completed.
    pub fn poll(&self) -> Result<usize, Error> {
        self.shared.backend.poll()
    }

    /// Number of submissions not yet retired.
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::Acquire)
    }

    /// Polls until every submission has completed.
    pub fn wait_idle(&self) -> Result<(), Error> {
        while self.in_flight() > 0 {
            if self.poll()? == 0 {
                std::thread::yield_now();
            }
        }
        Ok(())
    }
}

pub(crate) fn check_range(buffer: &Buffer, offset: u64, len: u64) -> Result<(), Error> {
    match offset.checked_add(len) {
        Some(end) if end <= buffer.size() => Ok(()),
        _ => Err(Error::InvalidState(format!(
            "{offset}+{len} is out of bounds of {name} ({size} bytes)",
            name = buffer.description().debug_name,
            size = buffer.size()
        ))),
    }
}
