// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! Defines binding types */

pub mod buffer_range;
pub(crate) mod dirty_tracking;
pub mod layout;
pub mod resource_set;
pub mod resource_tracking;
pub mod sampler;
pub mod visible_to;

pub use buffer_range::BufferRange;
pub use layout::{ResourceKind, ResourceLayout, ResourceLayoutElement};
pub use resource_set::{BindableResource, ResourceSet};
pub use sampler::{Sampler, SamplerDescription};
