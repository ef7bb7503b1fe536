/// Texture, sampler and attachment descriptors

use std::any::Any;
use crate::error::Result;
use crate::graphics_device::SampleCount;
use crate::engine_bail;

/// Texture pixel formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum TextureFormat {
    R8G8B8A8_UNORM,
    R8G8B8A8_SRGB,
    B8G8R8A8_UNORM,
    B8G8R8A8_SRGB,
    R16G16B16A16_SFLOAT,
    R32_SFLOAT,
    D16_UNORM,
    D32_FLOAT,
    D32_FLOAT_S8_UINT,
    D24_UNORM_S8_UINT,
}

impl TextureFormat {
    pub fn is_depth(self) -> bool {
        matches!(
            self,
            TextureFormat::D16_UNORM
                | TextureFormat::D32_FLOAT
                | TextureFormat::D32_FLOAT_S8_UINT
                | TextureFormat::D24_UNORM_S8_UINT
        )
    }

    pub fn has_stencil_component(self) -> bool {
        matches!(self, TextureFormat::D32_FLOAT_S8_UINT | TextureFormat::D24_UNORM_S8_UINT)
    }

    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            TextureFormat::D16_UNORM => 2,
            TextureFormat::R16G16B16A16_SFLOAT | TextureFormat::D32_FLOAT_S8_UINT => 8,
            _ => 4,
        }
    }
}

/// Depth formats tried in order by `find_depth_format`
pub const DEPTH_FORMAT_CANDIDATES: [TextureFormat; 3] = [
    TextureFormat::D32_FLOAT,
    TextureFormat::D32_FLOAT_S8_UINT,
    TextureFormat::D24_UNORM_S8_UINT,
];

/// First candidate accepted by `is_supported`
pub fn find_supported_format(
    candidates: &[TextureFormat],
    is_supported: impl Fn(TextureFormat) -> bool,
) -> Result<TextureFormat> {
    match candidates.iter().copied().find(|f| is_supported(*f)) {
        Some(format) => Ok(format),
        None => engine_bail!("kestrel::texture",
            "None of the candidate formats {:?} is supported", candidates),
    }
}

/// Material channel a texture feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureType {
    #[default]
    None = 0,
    Diffuse = 1,
    Specular = 2,
    Ambient = 3,
    Emissive = 4,
    Height = 5,
    Normals = 6,
    Shininess = 7,
    Opacity = 8,
    Displacement = 9,
    Lightmap = 10,
    Reflection = 11,
    BaseColor = 12,
    NormalCamera = 13,
    EmissionColor = 14,
    Metalness = 15,
    DiffuseRoughness = 16,
    AmbientOcclusion = 17,
    Sheen = 19,
    Clearcoat = 20,
    Transmission = 21,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Filter {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressMode {
    Repeat,
    MirroredRepeat,
    ClampToEdge,
    ClampToBorder,
}

/// Sampler parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerProperties {
    pub mag_filter: Filter,
    pub min_filter: Filter,
    pub address_mode: AddressMode,
    /// `None` uses the device maximum
    pub max_anisotropy: Option<f32>,
}

impl Default for SamplerProperties {
    fn default() -> Self {
        Self {
            mag_filter: Filter::Linear,
            min_filter: Filter::Linear,
            address_mode: AddressMode::Repeat,
            max_anisotropy: None,
        }
    }
}

impl SamplerProperties {
    /// Anisotropy actually applied, never above the device limit
    pub fn effective_anisotropy(&self, device_max: f32) -> f32 {
        match self.max_anisotropy {
            Some(value) => value.clamp(1.0, device_max.max(1.0)),
            None => device_max.max(1.0),
        }
    }
}

/// Texture loading options
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureProperties {
    pub texture_type: TextureType,
    pub generate_mipmaps: bool,
    pub format: TextureFormat,
}

impl Default for TextureProperties {
    fn default() -> Self {
        Self {
            texture_type: TextureType::Diffuse,
            generate_mipmaps: true,
            format: TextureFormat::R8G8B8A8_UNORM,
        }
    }
}

/// Descriptor for creating a sampled 2D texture
#[derive(Debug, Clone)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub texture_type: TextureType,
    pub generate_mipmaps: bool,
    /// Tightly packed pixels for mip level 0
    pub data: Option<Vec<u8>>,
    pub sampler: SamplerProperties,
}

impl TextureDesc {
    pub fn mip_levels(&self) -> u32 {
        if self.generate_mipmaps {
            mip_level_count(self.width, self.height)
        } else {
            1
        }
    }

    /// Expected byte length of `data`
    pub fn expected_data_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel() as usize
    }
}

/// Number of levels in a full mip chain: floor(log2(max(w, h))) + 1
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    let largest = width.max(height).max(1);
    32 - largest.leading_zeros()
}

/// Read-only texture properties
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureInfo {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub texture_type: TextureType,
    pub mip_levels: u32,
}

/// Sampled GPU texture (image, view and sampler)
pub trait Texture: Send + Sync {
    fn info(&self) -> &TextureInfo;

    fn is_allocated(&self) -> bool;

    /// Free image memory now. `true` only on the first effective call.
    fn release(&self) -> bool;

    fn as_any(&self) -> &dyn Any;
}

/// Role of a render attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentKind {
    Color,
    DepthStencil,
    SwapChain,
    Offscreen,
    Resolve,
}

/// Descriptor for a render attachment. Holds `image_count` images.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttachmentTextureDesc {
    pub width: u32,
    pub height: u32,
    pub kind: AttachmentKind,
    pub image_count: u32,
    pub format: TextureFormat,
    pub samples: SampleCount,
    /// Also usable as a shader input (adds a sampler)
    pub sampled: bool,
    pub layer_count: u32,
}

impl Default for AttachmentTextureDesc {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            kind: AttachmentKind::Color,
            image_count: 1,
            format: TextureFormat::R8G8B8A8_UNORM,
            samples: SampleCount::S1,
            sampled: false,
            layer_count: 1,
        }
    }
}

/// Render attachment with one image per frame slot
pub trait AttachmentTexture: Send + Sync {
    fn desc(&self) -> &AttachmentTextureDesc;

    fn image_count(&self) -> usize {
        self.desc().image_count as usize
    }

    fn as_any(&self) -> &dyn Any;
}

#[cfg(test)]
#[path = "texture_tests.rs"]
mod tests;
