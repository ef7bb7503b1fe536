//! Unit tests for Vulkan conversion functions
//!
//! Pure mappings, no GPU required.

use super::*;

// ============================================================================
// TEXTURE FORMATS
// ============================================================================

#[test]
fn test_texture_format_to_vk_color_formats() {
    assert_eq!(texture_format_to_vk(TextureFormat::R8G8B8A8_UNORM), vk::Format::R8G8B8A8_UNORM);
    assert_eq!(texture_format_to_vk(TextureFormat::B8G8R8A8_SRGB), vk::Format::B8G8R8A8_SRGB);
    assert_eq!(texture_format_to_vk(TextureFormat::R16G16B16A16_SFLOAT), vk::Format::R16G16B16A16_SFLOAT);
}

#[test]
fn test_texture_format_to_vk_depth_formats() {
    assert_eq!(texture_format_to_vk(TextureFormat::D32_FLOAT), vk::Format::D32_SFLOAT);
    assert_eq!(texture_format_to_vk(TextureFormat::D32_FLOAT_S8_UINT), vk::Format::D32_SFLOAT_S8_UINT);
    assert_eq!(texture_format_to_vk(TextureFormat::D24_UNORM_S8_UINT), vk::Format::D24_UNORM_S8_UINT);
}

#[test]
fn test_surface_format_reverse_mapping() {
    assert_eq!(vk_format_to_texture_format(vk::Format::B8G8R8A8_SRGB), Some(TextureFormat::B8G8R8A8_SRGB));
    assert_eq!(vk_format_to_texture_format(vk::Format::A2B10G10R10_UNORM_PACK32), None);
}

#[test]
fn test_aspect_mask_follows_depth() {
    assert_eq!(aspect_mask(TextureFormat::D32_FLOAT), vk::ImageAspectFlags::DEPTH);
    assert_eq!(aspect_mask(TextureFormat::R8G8B8A8_UNORM), vk::ImageAspectFlags::COLOR);
}

// ============================================================================
// BUFFERS
// ============================================================================

#[test]
fn test_buffer_format_to_vk() {
    assert_eq!(buffer_format_to_vk(BufferFormat::R32G32_SFLOAT), vk::Format::R32G32_SFLOAT);
    assert_eq!(buffer_format_to_vk(BufferFormat::R32G32B32_SFLOAT), vk::Format::R32G32B32_SFLOAT);
    assert_eq!(buffer_format_to_vk(BufferFormat::R32_UINT), vk::Format::R32_UINT);
}

#[test]
fn test_device_local_kinds_are_transfer_targets() {
    let (usage, location) = buffer_kind_to_vk(BufferKind::Vertex);
    assert!(usage.contains(vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST));
    assert_eq!(location, gpu_allocator::MemoryLocation::GpuOnly);

    let (usage, location) = buffer_kind_to_vk(BufferKind::Index);
    assert!(usage.contains(vk::BufferUsageFlags::INDEX_BUFFER));
    assert_eq!(location, gpu_allocator::MemoryLocation::GpuOnly);
}

#[test]
fn test_uniform_kind_is_host_visible() {
    let (usage, location) = buffer_kind_to_vk(BufferKind::Uniform);
    assert_eq!(usage, vk::BufferUsageFlags::UNIFORM_BUFFER);
    assert_eq!(location, gpu_allocator::MemoryLocation::CpuToGpu);
}

#[test]
fn test_memory_properties_share_bits() {
    let flags = memory_properties_from_vk(
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    );
    assert_eq!(flags, MemoryPropertyFlags::HOST_VISIBLE | MemoryPropertyFlags::HOST_COHERENT);
}

// ============================================================================
// SAMPLES AND DEVICE TYPES
// ============================================================================

#[test]
fn test_sample_count_round_trip_through_flags() {
    assert_eq!(sample_count_to_vk(SampleCount::S1), vk::SampleCountFlags::TYPE_1);
    assert_eq!(sample_count_to_vk(SampleCount::S8), vk::SampleCountFlags::TYPE_8);

    let flags = sample_count_flags_from_vk(
        vk::SampleCountFlags::TYPE_1 | vk::SampleCountFlags::TYPE_4,
    );
    assert_eq!(flags, SampleCountFlags::TYPE_1 | SampleCountFlags::TYPE_4);
}

#[test]
fn test_physical_device_type_from_vk() {
    assert_eq!(physical_device_type_from_vk(vk::PhysicalDeviceType::DISCRETE_GPU), PhysicalDeviceType::DiscreteGpu);
    assert_eq!(physical_device_type_from_vk(vk::PhysicalDeviceType::INTEGRATED_GPU), PhysicalDeviceType::IntegratedGpu);
    assert_eq!(physical_device_type_from_vk(vk::PhysicalDeviceType::OTHER), PhysicalDeviceType::Other);
}

// ============================================================================
// PRESENTATION
// ============================================================================

#[test]
fn test_present_modes() {
    assert_eq!(present_mode_to_vk(PresentMode::Mailbox), vk::PresentModeKHR::MAILBOX);
    assert_eq!(present_mode_from_vk(vk::PresentModeKHR::FIFO), Some(PresentMode::Fifo));
    assert_eq!(present_mode_from_vk(vk::PresentModeKHR::SHARED_DEMAND_REFRESH), None);
}

#[test]
fn test_color_space_from_vk() {
    assert_eq!(color_space_from_vk(vk::ColorSpaceKHR::SRGB_NONLINEAR), ColorSpace::SrgbNonlinear);
    assert_eq!(color_space_from_vk(vk::ColorSpaceKHR::HDR10_ST2084_EXT), ColorSpace::Other);
}

// ============================================================================
// SHADERS, DESCRIPTORS AND PIPELINE STATE
// ============================================================================

#[test]
fn test_stage_flags_share_bits() {
    assert_eq!(
        stage_flags_to_vk(ShaderStageFlags::VERTEX | ShaderStageFlags::FRAGMENT),
        vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT
    );
    assert_eq!(shader_stage_to_vk(ShaderStage::Compute), vk::ShaderStageFlags::COMPUTE);
}

#[test]
fn test_descriptor_types() {
    assert_eq!(descriptor_type_to_vk(DescriptorType::UniformBuffer), vk::DescriptorType::UNIFORM_BUFFER);
    assert_eq!(
        descriptor_type_to_vk(DescriptorType::CombinedImageSampler),
        vk::DescriptorType::COMBINED_IMAGE_SAMPLER
    );
}

#[test]
fn test_rasterization_state() {
    assert_eq!(polygon_mode_to_vk(PolygonMode::Line), vk::PolygonMode::LINE);
    assert_eq!(cull_mode_to_vk(CullMode::Back), vk::CullModeFlags::BACK);
    assert_eq!(front_face_to_vk(FrontFace::CounterClockwise), vk::FrontFace::COUNTER_CLOCKWISE);
    assert_eq!(topology_to_vk(PrimitiveTopology::TriangleList), vk::PrimitiveTopology::TRIANGLE_LIST);
}

#[test]
fn test_compare_ops() {
    assert_eq!(compare_op_to_vk(CompareOp::Less), vk::CompareOp::LESS);
    assert_eq!(compare_op_to_vk(CompareOp::GreaterOrEqual), vk::CompareOp::GREATER_OR_EQUAL);
    assert_eq!(compare_op_to_vk(CompareOp::Always), vk::CompareOp::ALWAYS);
}

#[test]
fn test_sampler_state() {
    assert_eq!(filter_to_vk(Filter::Nearest), vk::Filter::NEAREST);
    assert_eq!(address_mode_to_vk(AddressMode::ClampToEdge), vk::SamplerAddressMode::CLAMP_TO_EDGE);
    assert_eq!(index_type_to_vk(IndexType::U32), vk::IndexType::UINT32);
    assert_eq!(input_rate_to_vk(VertexInputRate::Instance), vk::VertexInputRate::INSTANCE);
}

// ============================================================================
// RESULT CODES
// ============================================================================

#[test]
fn test_result_names() {
    assert_eq!(vk_result_name(vk::Result::ERROR_DEVICE_LOST), "VK_ERROR_DEVICE_LOST");
    assert_eq!(vk_result_name(vk::Result::ERROR_OUT_OF_DATE_KHR), "VK_ERROR_OUT_OF_DATE_KHR");
    assert_eq!(vk_result_name(vk::Result::from_raw(-12345)), "VK_UNKNOWN_RESULT");
}

#[test]
fn test_memory_exhaustion_is_out_of_memory() {
    assert!(matches!(vk_error("vkAllocateDescriptorSets", vk::Result::ERROR_OUT_OF_POOL_MEMORY), Error::OutOfMemory));
    assert!(matches!(vk_error("vkQueueSubmit", vk::Result::ERROR_OUT_OF_DEVICE_MEMORY), Error::OutOfMemory));
}

#[test]
fn test_other_failures_name_the_code() {
    match vk_error("vkQueueSubmit", vk::Result::ERROR_DEVICE_LOST) {
        Error::BackendError(msg) => assert_eq!(msg, "vkQueueSubmit failed: VK_ERROR_DEVICE_LOST"),
        other => panic!("unexpected error {:?}", other),
    }
}
