/// Sampler creation for sampled textures and attachments

use ash::vk;
use kestrel_engine::kestrel::render::SamplerProperties;
use kestrel_engine::kestrel::Result;
use kestrel_engine::engine_err;

use crate::vulkan_context::GpuContext;
use crate::vulkan_format::{address_mode_to_vk, filter_to_vk};

/// Build the native create info for `props` over `mip_levels` levels
///
/// Anisotropy never exceeds `device_max_anisotropy`.
pub(crate) fn sampler_create_info(
    props: &SamplerProperties,
    mip_levels: u32,
    device_max_anisotropy: f32,
) -> vk::SamplerCreateInfo<'static> {
    let address = address_mode_to_vk(props.address_mode);
    let anisotropy = props.effective_anisotropy(device_max_anisotropy);

    vk::SamplerCreateInfo::default()
        .mag_filter(filter_to_vk(props.mag_filter))
        .min_filter(filter_to_vk(props.min_filter))
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .address_mode_u(address)
        .address_mode_v(address)
        .address_mode_w(address)
        .mip_lod_bias(0.0)
        .min_lod(0.0)
        .max_lod(mip_levels as f32)
        .anisotropy_enable(anisotropy > 1.0)
        .max_anisotropy(anisotropy)
        .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
        .unnormalized_coordinates(false)
        .compare_enable(false)
        .compare_op(vk::CompareOp::ALWAYS)
}

pub(crate) fn create_sampler(
    ctx: &GpuContext,
    props: &SamplerProperties,
    mip_levels: u32,
) -> Result<vk::Sampler> {
    let create_info = sampler_create_info(props, mip_levels, ctx.max_sampler_anisotropy);
    unsafe {
        ctx.device.create_sampler(&create_info, None)
            .map_err(|e| engine_err!("kestrel::vulkan", "Failed to create sampler: {:?}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_engine::kestrel::render::{AddressMode, Filter};

    #[test]
    fn test_anisotropy_capped_by_device() {
        let props = SamplerProperties { max_anisotropy: Some(64.0), ..Default::default() };
        let info = sampler_create_info(&props, 1, 16.0);
        assert_eq!(info.max_anisotropy, 16.0);
        assert_eq!(info.anisotropy_enable, vk::TRUE);
    }

    #[test]
    fn test_anisotropy_disabled_at_one() {
        let props = SamplerProperties { max_anisotropy: Some(1.0), ..Default::default() };
        let info = sampler_create_info(&props, 1, 16.0);
        assert_eq!(info.anisotropy_enable, vk::FALSE);
    }

    #[test]
    fn test_lod_covers_mip_chain() {
        let props = SamplerProperties {
            mag_filter: Filter::Nearest,
            min_filter: Filter::Nearest,
            address_mode: AddressMode::ClampToEdge,
            max_anisotropy: None,
        };
        let info = sampler_create_info(&props, 9, 8.0);
        assert_eq!(info.max_lod, 9.0);
        assert_eq!(info.mag_filter, vk::Filter::NEAREST);
        assert_eq!(info.address_mode_v, vk::SamplerAddressMode::CLAMP_TO_EDGE);
        assert_eq!(info.max_anisotropy, 8.0);
    }
}
