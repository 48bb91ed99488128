//! Texture/vertex format identifiers and their static properties.
//!
//! The enum is closed: every format the API can name is listed here, carrying
//! a texel (or compressed block) size in bytes and a block extent. A subset
//! of formats (3-channel 8/16/32-bit, the non-standard packed 10-10-10-2
//! variants, 16-bit packed color) is defined but has no WebGPU equivalent;
//! texture creation with those fails.

use crate::{Extent3d, TextureAspect};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Format {
    #[default]
    Undefined,

    R5g6b5Unorm,
    R5g5b5a1Unorm,

    R8Unorm,
    Rg8Unorm,
    Rgb8Unorm,
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,

    R16Float,
    Rg16Float,
    Rgb16Float,
    Rgba16Unorm,
    Rgba16Uint,
    Rgba16Float,

    R32Float,
    Rg32Float,
    Rgb32Float,
    Rgba32Uint,
    Rgba32Float,

    Rgb10a2Unorm,
    Rgb10a2Snorm,
    Rgb10a2Uscaled,
    Rgb10a2Sscaled,
    Rgb10a2Uint,
    Rgb10a2Sint,
    Bgr10a2Unorm,
    Bgr10a2Snorm,
    Bgr10a2Uscaled,
    Bgr10a2Sscaled,
    Bgr10a2Uint,
    Bgr10a2Sint,

    Depth16Unorm,
    Depth32Float,
    Depth16UnormStencil8,
    Depth24UnormStencil8,
    Depth32FloatStencil8,

    Bc1RgbUnorm,
    Bc1RgbUnormSrgb,
    Bc1RgbaUnorm,
    Bc1RgbaUnormSrgb,
    Bc2Unorm,
    Bc2UnormSrgb,
    Bc3Unorm,
    Bc3UnormSrgb,
    Bc4Unorm,
    Bc4Snorm,
    Bc5Unorm,
    Bc5Snorm,

    Etc2Rgb8Unorm,
    Etc2Rgb8UnormSrgb,
    Etc2Rgb8A1Unorm,
    Etc2Rgb8A1UnormSrgb,
    Etc2Rgba8Unorm,
    Etc2Rgba8UnormSrgb,
    EacR11Unorm,
    EacR11Snorm,
    EacRg11Unorm,
    EacRg11Snorm,

    Astc4x4Unorm,
    Astc4x4UnormSrgb,
    Astc5x4Unorm,
    Astc5x4UnormSrgb,
    Astc5x5Unorm,
    Astc5x5UnormSrgb,
    Astc6x5Unorm,
    Astc6x5UnormSrgb,
    Astc6x6Unorm,
    Astc6x6UnormSrgb,
    Astc8x5Unorm,
    Astc8x5UnormSrgb,
    Astc8x6Unorm,
    Astc8x6UnormSrgb,
    Astc8x8Unorm,
    Astc8x8UnormSrgb,
    Astc10x5Unorm,
    Astc10x5UnormSrgb,
    Astc10x6Unorm,
    Astc10x6UnormSrgb,
    Astc10x8Unorm,
    Astc10x8UnormSrgb,
    Astc10x10Unorm,
    Astc10x10UnormSrgb,
    Astc12x10Unorm,
    Astc12x10UnormSrgb,
    Astc12x12Unorm,
    Astc12x12UnormSrgb,
}

impl Format {
    /// Size in bytes of one texel, or of one compressed block for
    /// block-compressed formats. Zero for `Undefined`.
    pub fn size_in_bytes(self) -> u32 {
        use Format::*;
        match self {
            Undefined => 0,

            R5g6b5Unorm | R5g5b5a1Unorm => 2,

            R8Unorm => 1,
            Rg8Unorm => 2,
            Rgb8Unorm => 3,
            Rgba8Unorm | Rgba8UnormSrgb | Bgra8Unorm | Bgra8UnormSrgb => 4,

            R16Float => 2,
            Rg16Float => 4,
            Rgb16Float => 6,
            Rgba16Unorm | Rgba16Uint | Rgba16Float => 8,

            R32Float => 4,
            Rg32Float => 8,
            Rgb32Float => 12,
            Rgba32Uint | Rgba32Float => 16,

            Rgb10a2Unorm | Rgb10a2Snorm | Rgb10a2Uscaled | Rgb10a2Sscaled | Rgb10a2Uint
            | Rgb10a2Sint | Bgr10a2Unorm | Bgr10a2Snorm | Bgr10a2Uscaled | Bgr10a2Sscaled
            | Bgr10a2Uint | Bgr10a2Sint => 4,

            Depth16Unorm => 2,
            Depth32Float => 4,
            Depth16UnormStencil8 | Depth24UnormStencil8 => 4,
            Depth32FloatStencil8 => 8,

            Bc1RgbUnorm | Bc1RgbUnormSrgb | Bc1RgbaUnorm | Bc1RgbaUnormSrgb => 8,
            Bc2Unorm | Bc2UnormSrgb | Bc3Unorm | Bc3UnormSrgb => 16,
            Bc4Unorm | Bc4Snorm => 8,
            Bc5Unorm | Bc5Snorm => 16,

            Etc2Rgb8Unorm | Etc2Rgb8UnormSrgb | Etc2Rgb8A1Unorm | Etc2Rgb8A1UnormSrgb => 8,
            Etc2Rgba8Unorm | Etc2Rgba8UnormSrgb => 16,
            EacR11Unorm | EacR11Snorm => 8,
            EacRg11Unorm | EacRg11Snorm => 16,

            // All ASTC blocks are 128 bits regardless of footprint.
            Astc4x4Unorm | Astc4x4UnormSrgb | Astc5x4Unorm | Astc5x4UnormSrgb | Astc5x5Unorm
            | Astc5x5UnormSrgb | Astc6x5Unorm | Astc6x5UnormSrgb | Astc6x6Unorm
            | Astc6x6UnormSrgb | Astc8x5Unorm | Astc8x5UnormSrgb | Astc8x6Unorm
            | Astc8x6UnormSrgb | Astc8x8Unorm | Astc8x8UnormSrgb | Astc10x5Unorm
            | Astc10x5UnormSrgb | Astc10x6Unorm | Astc10x6UnormSrgb | Astc10x8Unorm
            | Astc10x8UnormSrgb | Astc10x10Unorm | Astc10x10UnormSrgb | Astc12x10Unorm
            | Astc12x10UnormSrgb | Astc12x12Unorm | Astc12x12UnormSrgb => 16,
        }
    }

    /// Texel block extent: 1x1x1 for uncompressed formats, the block
    /// dimensions for block-compressed ones.
    pub fn block_extent(self) -> Extent3d {
        use Format::*;
        let (width, height) = match self {
            Bc1RgbUnorm | Bc1RgbUnormSrgb | Bc1RgbaUnorm | Bc1RgbaUnormSrgb | Bc2Unorm
            | Bc2UnormSrgb | Bc3Unorm | Bc3UnormSrgb | Bc4Unorm | Bc4Snorm | Bc5Unorm
            | Bc5Snorm | Etc2Rgb8Unorm | Etc2Rgb8UnormSrgb | Etc2Rgb8A1Unorm
            | Etc2Rgb8A1UnormSrgb | Etc2Rgba8Unorm | Etc2Rgba8UnormSrgb | EacR11Unorm
            | EacR11Snorm | EacRg11Unorm | EacRg11Snorm | Astc4x4Unorm | Astc4x4UnormSrgb => {
                (4, 4)
            }
            Astc5x4Unorm | Astc5x4UnormSrgb => (5, 4),
            Astc5x5Unorm | Astc5x5UnormSrgb => (5, 5),
            Astc6x5Unorm | Astc6x5UnormSrgb => (6, 5),
            Astc6x6Unorm | Astc6x6UnormSrgb => (6, 6),
            Astc8x5Unorm | Astc8x5UnormSrgb => (8, 5),
            Astc8x6Unorm | Astc8x6UnormSrgb => (8, 6),
            Astc8x8Unorm | Astc8x8UnormSrgb => (8, 8),
            Astc10x5Unorm | Astc10x5UnormSrgb => (10, 5),
            Astc10x6Unorm | Astc10x6UnormSrgb => (10, 6),
            Astc10x8Unorm | Astc10x8UnormSrgb => (10, 8),
            Astc10x10Unorm | Astc10x10UnormSrgb => (10, 10),
            Astc12x10Unorm | Astc12x10UnormSrgb => (12, 10),
            Astc12x12Unorm | Astc12x12UnormSrgb => (12, 12),
            _ => (1, 1),
        };
        Extent3d {
            width,
            height,
            depth: 1,
        }
    }

    pub fn aspects(self) -> TextureAspect {
        use Format::*;
        match self {
            Depth16Unorm | Depth32Float => TextureAspect::DEPTH,
            Depth16UnormStencil8 | Depth24UnormStencil8 | Depth32FloatStencil8 => {
                TextureAspect::DEPTH | TextureAspect::STENCIL
            }
            _ => TextureAspect::COLOR,
        }
    }

    pub fn has_depth_or_stencil(self) -> bool {
        self.aspects()
            .intersects(TextureAspect::DEPTH | TextureAspect::STENCIL)
    }
}

/// Maps a format to its WebGPU texture format. `None` for the rejected
/// subset; texture creation with those formats fails with an error log.
pub(crate) fn map_texture_format(format: Format) -> Option<wgpu::TextureFormat> {
    use wgpu::TextureFormat as Wf;
    Some(match format {
        Format::R8Unorm => Wf::R8Unorm,
        Format::Rg8Unorm => Wf::Rg8Unorm,
        Format::Rgba8Unorm => Wf::Rgba8Unorm,
        Format::Rgba8UnormSrgb => Wf::Rgba8UnormSrgb,
        Format::Bgra8Unorm => Wf::Bgra8Unorm,
        Format::Bgra8UnormSrgb => Wf::Bgra8UnormSrgb,

        Format::R16Float => Wf::R16Float,
        Format::Rg16Float => Wf::Rg16Float,
        Format::Rgba16Unorm => Wf::Rgba16Unorm,
        Format::Rgba16Uint => Wf::Rgba16Uint,
        Format::Rgba16Float => Wf::Rgba16Float,

        Format::R32Float => Wf::R32Float,
        Format::Rg32Float => Wf::Rg32Float,
        Format::Rgba32Uint => Wf::Rgba32Uint,
        Format::Rgba32Float => Wf::Rgba32Float,

        Format::Rgb10a2Unorm => Wf::Rgb10a2Unorm,

        Format::Depth16Unorm => Wf::Depth16Unorm,
        Format::Depth32Float => Wf::Depth32Float,
        Format::Depth16UnormStencil8 | Format::Depth24UnormStencil8 => Wf::Depth24PlusStencil8,
        Format::Depth32FloatStencil8 => Wf::Depth32FloatStencil8,

        Format::Bc1RgbUnorm | Format::Bc1RgbaUnorm => Wf::Bc1RgbaUnorm,
        Format::Bc1RgbUnormSrgb | Format::Bc1RgbaUnormSrgb => Wf::Bc1RgbaUnormSrgb,
        Format::Bc2Unorm => Wf::Bc2RgbaUnorm,
        Format::Bc2UnormSrgb => Wf::Bc2RgbaUnormSrgb,
        Format::Bc3Unorm => Wf::Bc3RgbaUnorm,
        Format::Bc3UnormSrgb => Wf::Bc3RgbaUnormSrgb,
        Format::Bc4Unorm => Wf::Bc4RUnorm,
        Format::Bc4Snorm => Wf::Bc4RSnorm,
        Format::Bc5Unorm => Wf::Bc5RgUnorm,
        Format::Bc5Snorm => Wf::Bc5RgSnorm,

        Format::Etc2Rgb8Unorm => Wf::Etc2Rgb8Unorm,
        Format::Etc2Rgb8UnormSrgb => Wf::Etc2Rgb8UnormSrgb,
        Format::Etc2Rgb8A1Unorm => Wf::Etc2Rgb8A1Unorm,
        Format::Etc2Rgb8A1UnormSrgb => Wf::Etc2Rgb8A1UnormSrgb,
        Format::Etc2Rgba8Unorm => Wf::Etc2Rgba8Unorm,
        Format::Etc2Rgba8UnormSrgb => Wf::Etc2Rgba8UnormSrgb,
        Format::EacR11Unorm => Wf::EacR11Unorm,
        Format::EacR11Snorm => Wf::EacR11Snorm,
        Format::EacRg11Unorm => Wf::EacRg11Unorm,
        Format::EacRg11Snorm => Wf::EacRg11Snorm,

        Format::Astc4x4Unorm => astc(wgpu::AstcBlock::B4x4, false),
        Format::Astc4x4UnormSrgb => astc(wgpu::AstcBlock::B4x4, true),
        Format::Astc5x4Unorm => astc(wgpu::AstcBlock::B5x4, false),
        Format::Astc5x4UnormSrgb => astc(wgpu::AstcBlock::B5x4, true),
        Format::Astc5x5Unorm => astc(wgpu::AstcBlock::B5x5, false),
        Format::Astc5x5UnormSrgb => astc(wgpu::AstcBlock::B5x5, true),
        Format::Astc6x5Unorm => astc(wgpu::AstcBlock::B6x5, false),
        Format::Astc6x5UnormSrgb => astc(wgpu::AstcBlock::B6x5, true),
        Format::Astc6x6Unorm => astc(wgpu::AstcBlock::B6x6, false),
        Format::Astc6x6UnormSrgb => astc(wgpu::AstcBlock::B6x6, true),
        Format::Astc8x5Unorm => astc(wgpu::AstcBlock::B8x5, false),
        Format::Astc8x5UnormSrgb => astc(wgpu::AstcBlock::B8x5, true),
        Format::Astc8x6Unorm => astc(wgpu::AstcBlock::B8x6, false),
        Format::Astc8x6UnormSrgb => astc(wgpu::AstcBlock::B8x6, true),
        Format::Astc8x8Unorm => astc(wgpu::AstcBlock::B8x8, false),
        Format::Astc8x8UnormSrgb => astc(wgpu::AstcBlock::B8x8, true),
        Format::Astc10x5Unorm => astc(wgpu::AstcBlock::B10x5, false),
        Format::Astc10x5UnormSrgb => astc(wgpu::AstcBlock::B10x5, true),
        Format::Astc10x6Unorm => astc(wgpu::AstcBlock::B10x6, false),
        Format::Astc10x6UnormSrgb => astc(wgpu::AstcBlock::B10x6, true),
        Format::Astc10x8Unorm => astc(wgpu::AstcBlock::B10x8, false),
        Format::Astc10x8UnormSrgb => astc(wgpu::AstcBlock::B10x8, true),
        Format::Astc10x10Unorm => astc(wgpu::AstcBlock::B10x10, false),
        Format::Astc10x10UnormSrgb => astc(wgpu::AstcBlock::B10x10, true),
        Format::Astc12x10Unorm => astc(wgpu::AstcBlock::B12x10, false),
        Format::Astc12x10UnormSrgb => astc(wgpu::AstcBlock::B12x10, true),
        Format::Astc12x12Unorm => astc(wgpu::AstcBlock::B12x12, false),
        Format::Astc12x12UnormSrgb => astc(wgpu::AstcBlock::B12x12, true),

        // No WebGPU equivalent: 16-bit packed, 3-channel, and the
        // non-standard packed 10-10-10-2 variants.
        Format::Undefined
        | Format::R5g6b5Unorm
        | Format::R5g5b5a1Unorm
        | Format::Rgb8Unorm
        | Format::Rgb16Float
        | Format::Rgb32Float
        | Format::Rgb10a2Snorm
        | Format::Rgb10a2Uscaled
        | Format::Rgb10a2Sscaled
        | Format::Rgb10a2Uint
        | Format::Rgb10a2Sint
        | Format::Bgr10a2Unorm
        | Format::Bgr10a2Snorm
        | Format::Bgr10a2Uscaled
        | Format::Bgr10a2Sscaled
        | Format::Bgr10a2Uint
        | Format::Bgr10a2Sint => return None,
    })
}

fn astc(block: wgpu::AstcBlock, srgb: bool) -> wgpu::TextureFormat {
    wgpu::TextureFormat::Astc {
        block,
        channel: if srgb {
            wgpu::AstcChannel::UnormSrgb
        } else {
            wgpu::AstcChannel::Unorm
        },
    }
}

/// Maps a format to its WebGPU vertex format. The valid subset differs from
/// the texture subset: e.g. `Rgb32Float` is rejected as a texture format but
/// is a perfectly good `Float32x3` vertex attribute.
pub(crate) fn map_vertex_format(format: Format) -> Option<wgpu::VertexFormat> {
    use wgpu::VertexFormat as Vf;
    Some(match format {
        Format::R8Unorm => Vf::Unorm8,
        Format::Rg8Unorm => Vf::Unorm8x2,
        Format::Rgba8Unorm => Vf::Unorm8x4,
        Format::R16Float => Vf::Float16,
        Format::Rg16Float => Vf::Float16x2,
        Format::Rgba16Float => Vf::Float16x4,
        Format::Rgba16Uint => Vf::Uint16x4,
        Format::R32Float => Vf::Float32,
        Format::Rg32Float => Vf::Float32x2,
        Format::Rgb32Float => Vf::Float32x3,
        Format::Rgba32Float => Vf::Float32x4,
        Format::Rgba32Uint => Vf::Uint32x4,
        Format::Rgb10a2Unorm => Vf::Unorm10_10_10_2,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uncompressed_blocks_are_unit() {
        for format in [Format::R8Unorm, Format::Rgba8Unorm, Format::Rgba32Float] {
            let extent = format.block_extent();
            assert_eq!((extent.width, extent.height, extent.depth), (1, 1, 1));
        }
    }

    #[test]
    fn compressed_block_sizes() {
        assert_eq!(Format::Bc1RgbaUnorm.size_in_bytes(), 8);
        assert_eq!(Format::Bc3Unorm.size_in_bytes(), 16);
        assert_eq!(Format::Astc12x12Unorm.size_in_bytes(), 16);
        let extent = Format::Astc10x6Unorm.block_extent();
        assert_eq!((extent.width, extent.height), (10, 6));
    }

    #[test]
    fn rejected_formats_have_no_texture_mapping() {
        for format in [
            Format::Rgb8Unorm,
            Format::Rgb16Float,
            Format::Rgb32Float,
            Format::Bgr10a2Unorm,
            Format::Rgb10a2Uint,
        ] {
            assert!(map_texture_format(format).is_none(), "{format:?}");
        }
        // ...but three-channel float is a valid vertex attribute.
        assert_eq!(
            map_vertex_format(Format::Rgb32Float),
            Some(wgpu::VertexFormat::Float32x3)
        );
    }
}
