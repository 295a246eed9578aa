// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Pixel formats understood by the core.
//!
//! Format conversion tables belong to the backends.  The core only needs to
//! know how large a texel is (for copy-region validation) and whether a format
//! is a depth format (for framebuffer validation), so a plain enum suffices here.
//!
//! ```
//! use slots_and_stages::pixel_formats::PixelFormat;
//!
//! assert_eq!(PixelFormat::RGBA8UNorm.bytes_per_pixel(), 4);
//! assert!(PixelFormat::Depth32Float.is_depth());
//! ```

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum PixelFormat {
    R8UNorm,
    R16Float,
    R32Float,
    R32SInt,
    RG32Float,
    RGBA8UNorm,
    RGBA8UNormSRGB,
    BGRA8UNorm,
    BGRA8UNormSRGB,
    RGBA16Float,
    RGBA32Float,
    Depth16UNorm,
    Depth32Float,
    Depth24UNormStencil8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            PixelFormat::R8UNorm => 1,
            PixelFormat::R16Float | PixelFormat::Depth16UNorm => 2,
            PixelFormat::R32Float
            | PixelFormat::R32SInt
            | PixelFormat::RGBA8UNorm
            | PixelFormat::RGBA8UNormSRGB
            | PixelFormat::BGRA8UNorm
            | PixelFormat::BGRA8UNormSRGB
            | PixelFormat::Depth32Float
            | PixelFormat::Depth24UNormStencil8 => 4,
            PixelFormat::RG32Float | PixelFormat::RGBA16Float => 8,
            PixelFormat::RGBA32Float => 16,
        }
    }

    pub fn is_depth(self) -> bool {
        matches!(
            self,
            PixelFormat::Depth16UNorm | PixelFormat::Depth32Float | PixelFormat::Depth24UNormStencil8
        )
    }
}

/// Element type of an index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    U16,
    U32,
}

impl IndexFormat {
    pub fn byte_size(self) -> u32 {
        match self {
            IndexFormat::U16 => 2,
            IndexFormat::U32 => 4,
        }
    }
}
