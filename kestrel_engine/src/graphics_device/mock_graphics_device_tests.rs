/// Unit tests for MockGraphicsDevice and the mock objects it hands out

use super::*;
use crate::graphics_device::{
    DescriptorType, SamplerProperties, ShaderStageFlags, TextureType,
};

fn uniform_desc(size: u64) -> BufferDesc {
    BufferDesc { kind: BufferKind::Uniform, size, data: None }
}

// ============================================================================
// Buffers
// ============================================================================

#[test]
fn test_buffer_release_transitions_once() {
    let device = MockGraphicsDevice::new();
    let state = device.state();
    let buffer = device.create_buffer(uniform_desc(64)).unwrap();

    assert!(buffer.is_allocated());
    assert_eq!(state.lock().unwrap().live_buffers, 1);

    assert!(buffer.release());
    assert!(!buffer.is_allocated());
    assert!(!buffer.release());
    assert_eq!(state.lock().unwrap().live_buffers, 0);
}

#[test]
fn test_dropping_buffer_releases_it() {
    let device = MockGraphicsDevice::new();
    let state = device.state();
    {
        let _buffer = device.create_buffer(uniform_desc(16)).unwrap();
        assert_eq!(state.lock().unwrap().live_buffers, 1);
    }
    assert_eq!(state.lock().unwrap().live_buffers, 0);
}

#[test]
fn test_vertex_buffer_goes_through_staging() {
    let device = MockGraphicsDevice::new();
    let state = device.state();
    let buffer = device
        .create_buffer(BufferDesc { kind: BufferKind::Vertex, size: 8, data: Some(vec![1; 8]) })
        .unwrap();

    let mock = buffer.as_any().downcast_ref::<MockBuffer>().unwrap();
    assert_eq!(mock.memory_type, 0);
    assert_eq!(state.lock().unwrap().staging_uploads, 1);
}

#[test]
fn test_uniform_buffer_picks_host_visible_memory() {
    let device = MockGraphicsDevice::new();
    let buffer = device.create_buffer(uniform_desc(16)).unwrap();
    let mock = buffer.as_any().downcast_ref::<MockBuffer>().unwrap();
    assert_eq!(mock.memory_type, 1);
}

#[test]
fn test_buffer_creation_fails_without_matching_memory() {
    let device = MockGraphicsDevice::new();
    device.state().lock().unwrap().memory_types.retain(|m| {
        !m.property_flags.contains(MemoryPropertyFlags::HOST_VISIBLE)
    });

    assert!(device.create_buffer(uniform_desc(16)).is_err());
}

#[test]
fn test_update_bounds_checked() {
    let device = MockGraphicsDevice::new();
    let buffer = device.create_buffer(uniform_desc(8)).unwrap();

    assert!(buffer.update(4, &[1, 2, 3, 4]).is_ok());
    assert!(buffer.update(6, &[1, 2, 3, 4]).is_err());

    let mock = buffer.as_any().downcast_ref::<MockBuffer>().unwrap();
    assert_eq!(&mock.contents.lock().unwrap()[4..], &[1, 2, 3, 4]);
}

#[test]
fn test_update_rejected_on_device_local_buffer() {
    let device = MockGraphicsDevice::new();
    let buffer = device
        .create_buffer(BufferDesc { kind: BufferKind::Index, size: 4, data: Some(vec![0; 4]) })
        .unwrap();
    assert!(matches!(buffer.update(0, &[0]), Err(Error::InvalidResource(_))));
}

// ============================================================================
// Textures
// ============================================================================

#[test]
fn test_texture_mip_levels_and_release() {
    let device = MockGraphicsDevice::new();
    let state = device.state();
    let texture = device
        .create_texture(TextureDesc {
            width: 256,
            height: 128,
            format: TextureFormat::R8G8B8A8_UNORM,
            texture_type: TextureType::Diffuse,
            generate_mipmaps: true,
            data: Some(vec![255; 256 * 128 * 4]),
            sampler: SamplerProperties::default(),
        })
        .unwrap();

    assert_eq!(texture.info().mip_levels, 9);
    assert_eq!(state.lock().unwrap().live_textures, 1);
    assert!(texture.release());
    assert!(!texture.release());
    assert_eq!(state.lock().unwrap().live_textures, 0);
}

#[test]
fn test_texture_rejects_short_data() {
    let device = MockGraphicsDevice::new();
    let result = device.create_texture(TextureDesc {
        width: 2,
        height: 2,
        format: TextureFormat::R8G8B8A8_UNORM,
        texture_type: TextureType::Diffuse,
        generate_mipmaps: false,
        data: Some(vec![0; 3]),
        sampler: SamplerProperties::default(),
    });
    assert!(result.is_err());
}

// ============================================================================
// Descriptors and pipelines
// ============================================================================

#[test]
fn test_descriptor_set_checks_types() {
    let device = MockGraphicsDevice::new();
    let bindings = [DescriptorBinding {
        index: 0,
        descriptor_type: DescriptorType::CombinedImageSampler,
        stages: ShaderStageFlags::FRAGMENT,
    }];
    let layout = device.create_descriptor_layout(&bindings).unwrap();
    let buffer = device.create_buffer(uniform_desc(16)).unwrap();

    let result = device.create_descriptor_set(
        layout.as_ref(),
        &bindings,
        &[BindingResource::UniformBuffer(buffer.as_ref())],
    );
    assert!(result.is_err());
}

#[test]
fn test_pipeline_sample_count_must_match_render_pass() {
    let device = MockGraphicsDevice::new();
    let vs = device
        .create_shader(ShaderDesc { stage: ShaderStage::Vertex, code: vec![SPIRV_MAGIC], entry_point: "main".into() })
        .unwrap();
    let fs = device
        .create_shader(ShaderDesc { stage: ShaderStage::Fragment, code: vec![SPIRV_MAGIC], entry_point: "main".into() })
        .unwrap();
    let layout = device.create_descriptor_layout(&[]).unwrap();
    let render_pass = device
        .create_render_pass(&RenderPassDesc {
            color_format: TextureFormat::B8G8R8A8_SRGB,
            depth_format: TextureFormat::D32_FLOAT,
            samples: SampleCount::S4,
        })
        .unwrap();
    let vertex_layout = crate::graphics_device::VertexLayout::default();

    let mut desc = PipelineDesc {
        vertex_shader: vs.as_ref(),
        fragment_shader: fs.as_ref(),
        descriptor_layout: layout.as_ref(),
        vertex_layout: &vertex_layout,
        topology: crate::graphics_device::PrimitiveTopology::TriangleList,
        rasterization: Default::default(),
        depth_stencil: Default::default(),
        color_blend: Default::default(),
        samples: SampleCount::S1,
    };
    assert!(device.create_pipeline(&desc, render_pass.as_ref()).is_err());

    desc.samples = SampleCount::S4;
    assert!(device.create_pipeline(&desc, render_pass.as_ref()).is_ok());
    assert_eq!(device.state().lock().unwrap().pipelines_created.len(), 1);
}

#[test]
fn test_shader_requires_spirv_magic() {
    let device = MockGraphicsDevice::new();
    let result = device.create_shader(ShaderDesc {
        stage: ShaderStage::Vertex,
        code: vec![0xDEAD_BEEF],
        entry_point: "main".into(),
    });
    assert!(result.is_err());
}

// ============================================================================
// Swapchain and frame submission
// ============================================================================

#[test]
fn test_swapchain_negotiation() {
    let device = MockGraphicsDevice::new();
    let swapchain = device
        .create_swapchain(&SwapchainRequest { width: 1280, height: 720, vsync: false })
        .unwrap();

    assert_eq!(swapchain.extent(), Extent2D::new(1280, 720));
    assert_eq!(swapchain.format(), TextureFormat::B8G8R8A8_SRGB);
    assert_eq!(swapchain.present_mode(), PresentMode::Mailbox);
    assert_eq!(swapchain.image_count(), 3);
}

#[test]
fn test_forced_out_of_date_acquire() {
    let device = MockGraphicsDevice::new();
    let mut swapchain = device
        .create_swapchain(&SwapchainRequest { width: 64, height: 64, vsync: true })
        .unwrap();
    device.state().lock().unwrap().out_of_date_acquires = 1;

    assert_eq!(swapchain.acquire_next_image().unwrap(), AcquireOutcome::OutOfDate);
    assert_eq!(
        swapchain.acquire_next_image().unwrap(),
        AcquireOutcome::Acquired { image_index: 0, suboptimal: false }
    );
}

#[test]
fn test_next_present_outcome_is_one_shot() {
    let device = MockGraphicsDevice::new();
    let mut swapchain = device
        .create_swapchain(&SwapchainRequest { width: 64, height: 64, vsync: true })
        .unwrap();
    device.state().lock().unwrap().next_present = Some(PresentOutcome::Suboptimal);

    assert_eq!(swapchain.present(0).unwrap(), PresentOutcome::Suboptimal);
    assert_eq!(swapchain.present(1).unwrap(), PresentOutcome::Presented);
    assert_eq!(device.state().lock().unwrap().presented_images, vec![0, 1]);
}

#[test]
fn test_depth_format_follows_candidate_order() {
    let device = MockGraphicsDevice::new();
    assert_eq!(device.find_depth_format().unwrap(), TextureFormat::D32_FLOAT);

    device.state().lock().unwrap().supported_depth_formats = vec![TextureFormat::D24_UNORM_S8_UINT];
    assert_eq!(device.find_depth_format().unwrap(), TextureFormat::D24_UNORM_S8_UINT);

    device.state().lock().unwrap().supported_depth_formats.clear();
    assert!(device.find_depth_format().is_err());
}

#[test]
fn test_command_list_records_in_order() {
    let device = MockGraphicsDevice::new();
    let mut cmd = device.create_command_list().unwrap();
    cmd.begin().unwrap();
    cmd.draw_indexed(3, 0, 0).unwrap();
    cmd.end().unwrap();

    assert_eq!(device.state().lock().unwrap().commands, vec!["begin", "draw_indexed 3", "end"]);
}

#[test]
fn test_binding_released_buffer_is_violation() {
    let device = MockGraphicsDevice::new();
    let vertices = device.create_buffer(BufferDesc {
        kind: BufferKind::Vertex,
        size: 4,
        data: Some(vec![0; 4]),
    }).unwrap();
    let mut cmd = device.create_command_list().unwrap();
    cmd.begin().unwrap();

    assert!(vertices.release());
    assert!(matches!(cmd.bind_vertex_buffer(vertices.as_ref(), 0), Err(Error::ContractViolation(_))));
    assert!(matches!(
        cmd.bind_index_buffer(vertices.as_ref(), 0, IndexType::U32),
        Err(Error::ContractViolation(_))
    ));
    assert_eq!(device.state().lock().unwrap().commands, vec!["staging_copy", "begin"]);
}
