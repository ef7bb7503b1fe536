use super::*;

// ============================================================================
// MIP LEVELS
// ============================================================================

#[test]
fn test_mip_level_count_powers_of_two() {
    assert_eq!(mip_level_count(1, 1), 1);
    assert_eq!(mip_level_count(256, 256), 9);
    assert_eq!(mip_level_count(1024, 512), 11);
}

#[test]
fn test_mip_level_count_non_power_of_two() {
    // floor(log2(600)) + 1 = 10
    assert_eq!(mip_level_count(600, 400), 10);
    assert_eq!(mip_level_count(3, 1), 2);
}

#[test]
fn test_mip_level_count_zero_is_one_level() {
    assert_eq!(mip_level_count(0, 0), 1);
}

#[test]
fn test_desc_without_mipmaps_has_one_level() {
    let desc = TextureDesc {
        width: 512,
        height: 512,
        format: TextureFormat::R8G8B8A8_UNORM,
        texture_type: TextureType::Diffuse,
        generate_mipmaps: false,
        data: None,
        sampler: SamplerProperties::default(),
    };
    assert_eq!(desc.mip_levels(), 1);
    assert_eq!(desc.expected_data_len(), 512 * 512 * 4);
}

// ============================================================================
// FORMATS
// ============================================================================

#[test]
fn test_depth_and_stencil_queries() {
    assert!(TextureFormat::D32_FLOAT.is_depth());
    assert!(!TextureFormat::D32_FLOAT.has_stencil_component());
    assert!(TextureFormat::D24_UNORM_S8_UINT.has_stencil_component());
    assert!(!TextureFormat::B8G8R8A8_SRGB.is_depth());
}

#[test]
fn test_find_supported_format_respects_candidate_order() {
    let format = find_supported_format(&DEPTH_FORMAT_CANDIDATES, |f| {
        f != TextureFormat::D32_FLOAT
    })
    .unwrap();
    assert_eq!(format, TextureFormat::D32_FLOAT_S8_UINT);
}

#[test]
fn test_find_supported_format_none_supported() {
    assert!(find_supported_format(&DEPTH_FORMAT_CANDIDATES, |_| false).is_err());
}

// ============================================================================
// SAMPLERS
// ============================================================================

#[test]
fn test_sampler_anisotropy_defaults_to_device_max() {
    let props = SamplerProperties::default();
    assert_eq!(props.effective_anisotropy(16.0), 16.0);
}

#[test]
fn test_sampler_anisotropy_is_clamped() {
    let props = SamplerProperties { max_anisotropy: Some(64.0), ..Default::default() };
    assert_eq!(props.effective_anisotropy(8.0), 8.0);
    let low = SamplerProperties { max_anisotropy: Some(0.0), ..Default::default() };
    assert_eq!(low.effective_anisotropy(8.0), 1.0);
}

#[test]
fn test_texture_type_discriminants() {
    assert_eq!(TextureType::Diffuse as u32, 1);
    assert_eq!(TextureType::Normals as u32, 6);
    assert_eq!(TextureType::Transmission as u32, 21);
}
