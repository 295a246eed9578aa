// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use crate::error::Error;
use crate::imp::{Backend, NativeSampler};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerType {
    ///The sampler shall use normalized coordinates, and will do interpolation for mipmapping.
    Mipmapped,
    ///Linear filtering within one mip level.
    PixelLinear,
    ///Nearest-texel lookup.
    Point,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressMode {
    Wrap,
    Mirror,
    Clamp,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SamplerDescription {
    pub sampler_type: SamplerType,
    pub address_mode: AddressMode,
    pub lod_min_clamp: f32,
    pub lod_max_clamp: f32,
    pub debug_name: String,
}

impl SamplerDescription {
    pub fn new(sampler_type: SamplerType, debug_name: &str) -> Self {
        SamplerDescription {
            sampler_type,
            address_mode: AddressMode::Clamp,
            lod_min_clamp: 0.0,
            lod_max_clamp: 14.0,
            debug_name: debug_name.to_string(),
        }
    }
}

/// Identity of a sampler, stable for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerId(u64);

#[derive(Debug)]
struct SamplerShared {
    id: SamplerId,
    native: NativeSampler,
    description: SamplerDescription,
    backend: Arc<dyn Backend>,
}

impl Drop for SamplerShared {
    fn drop(&mut self) {
        self.backend.destroy_sampler(self.native);
    }
}

/// A sampler object.  Cheap to clone; all clones are the same sampler.
#[derive(Debug, Clone)]
pub struct Sampler {
    shared: Arc<SamplerShared>,
}

impl Sampler {
    pub(crate) fn new(backend: &Arc<dyn Backend>, description: SamplerDescription) -> Result<Self, Error> {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        let native = backend.create_sampler(&description)?;
        Ok(Sampler {
            shared: Arc::new(SamplerShared {
                id: SamplerId(NEXT_ID.fetch_add(1, Ordering::Relaxed)),
                native,
                description,
                backend: backend.clone(),
            }),
        })
    }

    pub fn id(&self) -> SamplerId {
        self.shared.id
    }

    pub fn description(&self) -> &SamplerDescription {
        &self.shared.description
    }

    pub(crate) fn native(&self) -> NativeSampler {
        self.shared.native
    }
}

impl PartialEq for Sampler {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}
impl Eq for Sampler {}
