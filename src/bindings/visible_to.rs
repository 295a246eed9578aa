// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Resource visibility and usage declarations.
//!
//! This module describes which shader stages see a binding and how buffers and
//! textures are going to be used.  Backends use the usage declarations to pick
//! memory placement; the command list uses them to choose an update strategy
//! and to validate that a bound object can actually serve the kind its layout
//! declares.
//!
//! # Examples
//!
//! ```
//! use slots_and_stages::bindings::visible_to::{BufferUsage, ShaderStage, ShaderStages};
//!
//! let stages = ShaderStages::VERTEX | ShaderStages::FRAGMENT;
//! assert_eq!(
//!     stages.graphics_stages().collect::<Vec<_>>(),
//!     vec![ShaderStage::Vertex, ShaderStage::Fragment]
//! );
//!
//! let usage = BufferUsage::UNIFORM_BUFFER | BufferUsage::DYNAMIC;
//! assert!(usage.contains(BufferUsage::DYNAMIC));
//! ```

bitflags::bitflags! {
    /// The set of shader stages a binding is visible to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStages: u8 {
        const VERTEX = 1 << 0;
        const GEOMETRY = 1 << 1;
        const TESSELLATION_CONTROL = 1 << 2;
        const TESSELLATION_EVALUATION = 1 << 3;
        const FRAGMENT = 1 << 4;
        const COMPUTE = 1 << 5;
    }
}

bitflags::bitflags! {
    /// How a buffer is going to be used.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u16 {
        const VERTEX_BUFFER = 1 << 0;
        const INDEX_BUFFER = 1 << 1;
        const UNIFORM_BUFFER = 1 << 2;
        const STRUCTURED_BUFFER_READ_ONLY = 1 << 3;
        const STRUCTURED_BUFFER_READ_WRITE = 1 << 4;
        const INDIRECT_BUFFER = 1 << 5;
        /// The CPU rewrites the whole buffer frequently; eligible for discard writes.
        const DYNAMIC = 1 << 6;
        /// CPU-visible transfer memory.
        const STAGING = 1 << 7;
    }
}

bitflags::bitflags! {
    /// How a texture is going to be used.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u8 {
        const SAMPLED = 1 << 0;
        const STORAGE = 1 << 1;
        const RENDER_TARGET = 1 << 2;
        const DEPTH_STENCIL = 1 << 3;
        const GENERATE_MIPMAPS = 1 << 4;
        const STAGING = 1 << 5;
    }
}

/// A single shader stage.
///
/// Native bind calls are always issued per stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderStage {
    Vertex,
    Geometry,
    TessellationControl,
    TessellationEvaluation,
    Fragment,
    Compute,
}

impl ShaderStage {
    const GRAPHICS: [ShaderStage; 5] = [
        ShaderStage::Vertex,
        ShaderStage::Geometry,
        ShaderStage::TessellationControl,
        ShaderStage::TessellationEvaluation,
        ShaderStage::Fragment,
    ];

    pub fn flag(self) -> ShaderStages {
        match self {
            ShaderStage::Vertex => ShaderStages::VERTEX,
            ShaderStage::Geometry => ShaderStages::GEOMETRY,
            ShaderStage::TessellationControl => ShaderStages::TESSELLATION_CONTROL,
            ShaderStage::TessellationEvaluation => ShaderStages::TESSELLATION_EVALUATION,
            ShaderStage::Fragment => ShaderStages::FRAGMENT,
            ShaderStage::Compute => ShaderStages::COMPUTE,
        }
    }
}

impl ShaderStages {
    /// The graphics stages in this set, in pipeline order.
    pub fn graphics_stages(self) -> impl Iterator<Item = ShaderStage> {
        ShaderStage::GRAPHICS
            .into_iter()
            .filter(move |stage| self.contains(stage.flag()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_is_not_a_graphics_stage() {
        let all = ShaderStages::all();
        assert_eq!(all.graphics_stages().count(), 5);
        assert!(!all.graphics_stages().any(|s| s == ShaderStage::Compute));
        assert_eq!(ShaderStages::COMPUTE.graphics_stages().count(), 0);
    }
}
