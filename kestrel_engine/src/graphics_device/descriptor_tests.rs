use super::*;
use crate::error::Error;
use crate::graphics_device::mock_graphics_device::MockGraphicsDevice;

#[test]
fn test_bindings_get_sequential_indices() {
    let mut layout = DescriptorLayout::new();
    let a = layout.add_binding(DescriptorType::UniformBuffer, ShaderStageFlags::VERTEX).unwrap();
    let b = layout
        .add_binding(DescriptorType::CombinedImageSampler, ShaderStageFlags::FRAGMENT)
        .unwrap();
    let c = layout
        .add_binding(DescriptorType::UniformBuffer, ShaderStageFlags::VERTEX | ShaderStageFlags::FRAGMENT)
        .unwrap();

    assert_eq!((a, b, c), (0, 1, 2));
    assert_eq!(layout.count_of(DescriptorType::UniformBuffer), 2);
}

#[test]
fn test_bake_preserves_insertion_order() {
    let device = MockGraphicsDevice::new();
    let mut layout = DescriptorLayout::new();
    let types = [
        DescriptorType::UniformBuffer,
        DescriptorType::CombinedImageSampler,
        DescriptorType::CombinedImageSampler,
        DescriptorType::UniformBuffer,
    ];
    for ty in types {
        layout.add_binding(ty, ShaderStageFlags::FRAGMENT).unwrap();
    }

    layout.bake(&device).unwrap();

    assert!(layout.is_baked());
    assert_eq!(layout.native().unwrap().binding_count(), 4);
    for (i, binding) in layout.bindings().iter().enumerate() {
        assert_eq!(binding.index, i as u32);
        assert_eq!(binding.descriptor_type, types[i]);
    }
}

#[test]
fn test_add_binding_after_bake_is_rejected() {
    let device = MockGraphicsDevice::new();
    let mut layout = DescriptorLayout::new();
    layout.add_binding(DescriptorType::UniformBuffer, ShaderStageFlags::VERTEX).unwrap();
    layout.bake(&device).unwrap();

    let result = layout.add_binding(DescriptorType::UniformBuffer, ShaderStageFlags::VERTEX);

    assert!(matches!(result, Err(Error::ContractViolation(_))));
    assert_eq!(layout.binding_count(), 1);
}

#[test]
fn test_second_bake_is_rejected() {
    let device = MockGraphicsDevice::new();
    let mut layout = DescriptorLayout::new();
    layout.bake(&device).unwrap();
    assert!(matches!(layout.bake(&device), Err(Error::ContractViolation(_))));
}

#[test]
fn test_unbaked_layout_has_no_native() {
    let layout = DescriptorLayout::new();
    assert!(layout.native().is_none());
    assert!(!layout.is_baked());
}
