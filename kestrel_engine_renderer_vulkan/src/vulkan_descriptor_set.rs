/// Descriptor set layouts and descriptor sets
///
/// Each descriptor set owns a pool sized exactly for its bindings, so
/// destroying the set is destroying its pool.

use ash::vk;
use kestrel_engine::kestrel::render::{
    BindingResource, Buffer, DescriptorBinding, DescriptorSet, DescriptorType,
    NativeDescriptorLayout, Texture,
};
use kestrel_engine::kestrel::{Error, Result};
use kestrel_engine::{engine_err, engine_error, engine_trace, engine_violation};
use std::any::Any;

use crate::vulkan_buffer::VulkanBuffer;
use crate::vulkan_format::{descriptor_type_to_vk, stage_flags_to_vk};
use crate::vulkan_texture::VulkanTexture;

// ============================================================================
// Layout
// ============================================================================

pub struct VulkanDescriptorLayout {
    device: ash::Device,
    pub(crate) layout: vk::DescriptorSetLayout,
    binding_count: usize,
}

impl VulkanDescriptorLayout {
    pub(crate) fn create(device: &ash::Device, bindings: &[DescriptorBinding]) -> Result<Self> {
        let vk_bindings: Vec<vk::DescriptorSetLayoutBinding> = bindings
            .iter()
            .map(|b| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(b.index)
                    .descriptor_type(descriptor_type_to_vk(b.descriptor_type))
                    .descriptor_count(1)
                    .stage_flags(stage_flags_to_vk(b.stages))
            })
            .collect();

        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&vk_bindings);
        let layout = unsafe {
            device.create_descriptor_set_layout(&create_info, None)
                .map_err(|e| engine_err!("kestrel::vulkan", "Failed to create descriptor set layout: {:?}", e))?
        };

        Ok(Self { device: device.clone(), layout, binding_count: bindings.len() })
    }
}

impl NativeDescriptorLayout for VulkanDescriptorLayout {
    fn binding_count(&self) -> usize {
        self.binding_count
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanDescriptorLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

// ============================================================================
// Set
// ============================================================================

pub struct VulkanDescriptorSet {
    device: ash::Device,
    pool: vk::DescriptorPool,
    pub(crate) set: vk::DescriptorSet,
    binding_count: usize,
}

/// Pool sizes covering `bindings` exactly, one entry per descriptor type used
pub(crate) fn pool_sizes(bindings: &[DescriptorBinding]) -> Vec<vk::DescriptorPoolSize> {
    [DescriptorType::UniformBuffer, DescriptorType::CombinedImageSampler]
        .into_iter()
        .filter_map(|ty| {
            let count = bindings.iter().filter(|b| b.descriptor_type == ty).count() as u32;
            (count > 0).then(|| vk::DescriptorPoolSize {
                ty: descriptor_type_to_vk(ty),
                descriptor_count: count,
            })
        })
        .collect()
}

fn downcast_buffer(buffer: &dyn Buffer) -> Result<&VulkanBuffer> {
    if !buffer.is_allocated() {
        engine_error!("kestrel::vulkan", "Cannot bind a released buffer");
        return Err(Error::InvalidResource("buffer was released".to_string()));
    }
    buffer.as_any().downcast_ref::<VulkanBuffer>().ok_or_else(|| {
        engine_error!("kestrel::vulkan", "Buffer is not a Vulkan buffer");
        Error::InvalidResource("foreign buffer handle".to_string())
    })
}

fn downcast_texture(texture: &dyn Texture) -> Result<&VulkanTexture> {
    if !texture.is_allocated() {
        engine_error!("kestrel::vulkan", "Cannot bind a released texture");
        return Err(Error::InvalidResource("texture was released".to_string()));
    }
    texture.as_any().downcast_ref::<VulkanTexture>().ok_or_else(|| {
        engine_error!("kestrel::vulkan", "Texture is not a Vulkan texture");
        Error::InvalidResource("foreign texture handle".to_string())
    })
}

impl VulkanDescriptorSet {
    /// Allocate a dedicated pool and one set, then write `resources` into it
    pub(crate) fn create(
        device: &ash::Device,
        layout: &VulkanDescriptorLayout,
        bindings: &[DescriptorBinding],
        resources: &[BindingResource<'_>],
    ) -> Result<Self> {
        if bindings.len() != resources.len() {
            return Err(engine_violation!("kestrel::vulkan",
                "Descriptor set has {} binding(s) but {} resource(s) were given",
                bindings.len(), resources.len()));
        }
        for (binding, resource) in bindings.iter().zip(resources) {
            if binding.descriptor_type != resource.descriptor_type() {
                return Err(engine_violation!("kestrel::vulkan",
                    "Binding {} expects {:?} but got {:?}",
                    binding.index, binding.descriptor_type, resource.descriptor_type()));
            }
        }

        // resolve every native handle before creating anything
        let mut buffer_infos = Vec::new();
        let mut image_infos = Vec::new();
        for resource in resources {
            match resource {
                BindingResource::UniformBuffer(buffer) => {
                    let vk_buffer = downcast_buffer(*buffer)?;
                    buffer_infos.push(
                        vk::DescriptorBufferInfo::default()
                            .buffer(vk_buffer.buffer)
                            .offset(0)
                            .range(vk::WHOLE_SIZE),
                    );
                }
                BindingResource::Texture(texture) => {
                    let vk_texture = downcast_texture(*texture)?;
                    image_infos.push(
                        vk::DescriptorImageInfo::default()
                            .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                            .image_view(vk_texture.view)
                            .sampler(vk_texture.sampler),
                    );
                }
            }
        }

        let sizes = pool_sizes(bindings);
        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .pool_sizes(&sizes)
            .max_sets(1);
        let pool = unsafe {
            device.create_descriptor_pool(&pool_info, None)
                .map_err(|e| engine_err!("kestrel::vulkan", "Failed to create descriptor pool: {:?}", e))?
        };

        let layouts = [layout.layout];
        let allocate_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&layouts);
        let set = match unsafe { device.allocate_descriptor_sets(&allocate_info) } {
            Ok(sets) => sets[0],
            Err(e) => {
                unsafe { device.destroy_descriptor_pool(pool, None) };
                return Err(engine_err!("kestrel::vulkan", "Failed to allocate descriptor set: {:?}", e));
            }
        };

        let mut next_buffer = 0;
        let mut next_image = 0;
        let writes: Vec<vk::WriteDescriptorSet> = bindings
            .iter()
            .map(|binding| {
                let write = vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(binding.index)
                    .dst_array_element(0)
                    .descriptor_type(descriptor_type_to_vk(binding.descriptor_type));
                match binding.descriptor_type {
                    DescriptorType::UniformBuffer => {
                        next_buffer += 1;
                        write.buffer_info(std::slice::from_ref(&buffer_infos[next_buffer - 1]))
                    }
                    DescriptorType::CombinedImageSampler => {
                        next_image += 1;
                        write.image_info(std::slice::from_ref(&image_infos[next_image - 1]))
                    }
                }
            })
            .collect();

        unsafe { device.update_descriptor_sets(&writes, &[]) };

        engine_trace!("kestrel::vulkan", "Wrote descriptor set with {} binding(s)", bindings.len());
        Ok(Self { device: device.clone(), pool, set, binding_count: bindings.len() })
    }
}

impl DescriptorSet for VulkanDescriptorSet {
    fn binding_count(&self) -> usize {
        self.binding_count
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanDescriptorSet {
    fn drop(&mut self) {
        unsafe {
            // frees the set with it
            self.device.destroy_descriptor_pool(self.pool, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_engine::kestrel::render::ShaderStageFlags;

    fn binding(index: u32, descriptor_type: DescriptorType) -> DescriptorBinding {
        DescriptorBinding { index, descriptor_type, stages: ShaderStageFlags::FRAGMENT }
    }

    #[test]
    fn test_pool_sizes_cover_each_type_once() {
        let bindings = [
            binding(0, DescriptorType::UniformBuffer),
            binding(1, DescriptorType::UniformBuffer),
            binding(2, DescriptorType::CombinedImageSampler),
            binding(3, DescriptorType::UniformBuffer),
        ];
        let sizes = pool_sizes(&bindings);
        assert_eq!(sizes.len(), 2);
        assert_eq!(sizes[0].ty, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(sizes[0].descriptor_count, 3);
        assert_eq!(sizes[1].ty, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert_eq!(sizes[1].descriptor_count, 1);
    }

    #[test]
    fn test_pool_sizes_skip_unused_types() {
        let sizes = pool_sizes(&[binding(0, DescriptorType::CombinedImageSampler)]);
        assert_eq!(sizes.len(), 1);
        assert_eq!(sizes[0].ty, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
    }
}
