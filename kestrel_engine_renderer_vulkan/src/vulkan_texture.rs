/// VulkanTexture and VulkanAttachmentTexture - images, views and samplers

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use kestrel_engine::kestrel::render::{
    AttachmentKind, AttachmentTexture, AttachmentTextureDesc, SampleCount, SamplerProperties,
    Texture, TextureDesc, TextureFormat, TextureInfo,
};
use kestrel_engine::kestrel::{Error, Result};
use kestrel_engine::{engine_debug, engine_err, engine_error, engine_violation};
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::vulkan_context::GpuContext;
use crate::vulkan_format::{aspect_mask, sample_count_to_vk, texture_format_to_vk};
use crate::vulkan_sampler::create_sampler;
use crate::vulkan_upload::{copy_buffer_to_image, generate_mipmaps, transition_image_layout, StagingBuffer};

/// Image with bound memory, released in reverse order of creation
struct GpuImage {
    image: vk::Image,
    view: vk::ImageView,
    allocation: Option<Allocation>,
}

impl GpuImage {
    /// Create an image, bind memory and build a view covering every level
    #[allow(clippy::too_many_arguments)]
    fn create(
        ctx: &GpuContext,
        width: u32,
        height: u32,
        format: TextureFormat,
        mip_levels: u32,
        samples: SampleCount,
        usage: vk::ImageUsageFlags,
        name: &str,
    ) -> Result<Self> {
        let vk_format = texture_format_to_vk(format);

        let image = unsafe {
            let create_info = vk::ImageCreateInfo::default()
                .image_type(vk::ImageType::TYPE_2D)
                .format(vk_format)
                .extent(vk::Extent3D { width, height, depth: 1 })
                .mip_levels(mip_levels)
                .array_layers(1)
                .samples(sample_count_to_vk(samples))
                .tiling(vk::ImageTiling::OPTIMAL)
                .usage(usage)
                .sharing_mode(vk::SharingMode::EXCLUSIVE)
                .initial_layout(vk::ImageLayout::UNDEFINED);

            ctx.device.create_image(&create_info, None)
                .map_err(|e| engine_err!("kestrel::vulkan", "Failed to create {} image ({}x{}): {:?}", name, width, height, e))?
        };

        let requirements = unsafe { ctx.device.get_image_memory_requirements(image) };
        let allocation = ctx.lock_allocator()?.allocate(&AllocationCreateDesc {
            name,
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(_) => {
                unsafe { ctx.device.destroy_image(image, None) };
                let size_mb = requirements.size as f64 / (1024.0 * 1024.0);
                engine_error!("kestrel::vulkan", "Out of GPU memory for {} ({}x{}, {:.2} MB)", name, width, height, size_mb);
                return Err(Error::OutOfMemory);
            }
        };

        let mut gpu_image = Self { image, view: vk::ImageView::null(), allocation: None };
        let (memory, offset) = (unsafe { allocation.memory() }, allocation.offset());
        gpu_image.allocation = Some(allocation);

        unsafe {
            if let Err(e) = ctx.device.bind_image_memory(image, memory, offset) {
                gpu_image.destroy(ctx);
                return Err(engine_err!("kestrel::vulkan", "Failed to bind {} image memory: {:?}", name, e));
            }

            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(vk_format)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: aspect_mask(format),
                    base_mip_level: 0,
                    level_count: mip_levels,
                    base_array_layer: 0,
                    layer_count: 1,
                });

            match ctx.device.create_image_view(&view_info, None) {
                Ok(view) => gpu_image.view = view,
                Err(e) => {
                    gpu_image.destroy(ctx);
                    return Err(engine_err!("kestrel::vulkan", "Failed to create {} image view: {:?}", name, e));
                }
            }
        }

        Ok(gpu_image)
    }

    fn destroy(&mut self, ctx: &GpuContext) {
        unsafe {
            if self.view != vk::ImageView::null() {
                ctx.device.destroy_image_view(self.view, None);
                self.view = vk::ImageView::null();
            }
            if let Some(allocation) = self.allocation.take() {
                if let Ok(mut allocator) = ctx.allocator.lock() {
                    allocator.free(allocation).ok();
                }
            }
            if self.image != vk::Image::null() {
                ctx.device.destroy_image(self.image, None);
                self.image = vk::Image::null();
            }
        }
    }
}

// ============================================================================
// Sampled texture
// ============================================================================

/// Sampled 2D texture
pub struct VulkanTexture {
    ctx: Arc<GpuContext>,
    image: Mutex<GpuImage>,
    pub(crate) view: vk::ImageView,
    pub(crate) sampler: vk::Sampler,
    info: TextureInfo,
    allocated: AtomicBool,
}

impl VulkanTexture {
    /// Create the image, upload `desc.data` and generate the mip chain
    pub(crate) fn create(ctx: &Arc<GpuContext>, desc: &TextureDesc) -> Result<Self> {
        if desc.width == 0 || desc.height == 0 {
            return Err(engine_violation!("kestrel::vulkan",
                "Texture size must be non-zero ({}x{})", desc.width, desc.height));
        }
        if desc.format.is_depth() {
            return Err(engine_violation!("kestrel::vulkan",
                "Sampled textures cannot use depth format {:?}", desc.format));
        }
        if let Some(data) = &desc.data {
            if data.len() != desc.expected_data_len() {
                engine_error!("kestrel::vulkan", "Texture data is {} bytes, expected {} for {}x{} {:?}",
                    data.len(), desc.expected_data_len(), desc.width, desc.height, desc.format);
                return Err(Error::InvalidResource(format!(
                    "texture data size {} does not match {}x{} {:?}",
                    data.len(), desc.width, desc.height, desc.format
                )));
            }
        }

        let mip_levels = desc.mip_levels();
        let mut usage = vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST;
        if mip_levels > 1 {
            usage |= vk::ImageUsageFlags::TRANSFER_SRC;
        }

        let mut image = GpuImage::create(
            ctx, desc.width, desc.height, desc.format, mip_levels, SampleCount::S1, usage, "texture",
        )?;

        if let Err(e) = Self::upload(ctx, &image, desc, mip_levels) {
            image.destroy(ctx);
            return Err(e);
        }

        let sampler = match create_sampler(ctx, &desc.sampler, mip_levels) {
            Ok(sampler) => sampler,
            Err(e) => {
                image.destroy(ctx);
                return Err(e);
            }
        };

        engine_debug!("kestrel::vulkan", "Created {}x{} {:?} texture with {} mip level(s)",
            desc.width, desc.height, desc.format, mip_levels);

        Ok(Self {
            ctx: Arc::clone(ctx),
            view: image.view,
            image: Mutex::new(image),
            sampler,
            info: TextureInfo {
                width: desc.width,
                height: desc.height,
                format: desc.format,
                texture_type: desc.texture_type,
                mip_levels,
            },
            allocated: AtomicBool::new(true),
        })
    }

    fn upload(ctx: &GpuContext, image: &GpuImage, desc: &TextureDesc, mip_levels: u32) -> Result<()> {
        let color = vk::ImageAspectFlags::COLOR;
        let Some(data) = &desc.data else {
            return transition_image_layout(
                ctx, image.image, color, mip_levels,
                vk::ImageLayout::UNDEFINED, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            );
        };

        transition_image_layout(
            ctx, image.image, color, mip_levels,
            vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )?;

        let staging = StagingBuffer::new(ctx, data)?;
        copy_buffer_to_image(ctx, staging.buffer, image.image, desc.width, desc.height)?;

        if mip_levels > 1 {
            generate_mipmaps(
                ctx, image.image, texture_format_to_vk(desc.format),
                desc.width, desc.height, mip_levels,
            )
        } else {
            transition_image_layout(
                ctx, image.image, color, 1,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            )
        }
    }
}

impl Texture for VulkanTexture {
    fn info(&self) -> &TextureInfo {
        &self.info
    }

    fn is_allocated(&self) -> bool {
        self.allocated.load(Ordering::Acquire)
    }

    fn release(&self) -> bool {
        if !self.allocated.swap(false, Ordering::AcqRel) {
            return false;
        }
        unsafe { self.ctx.device.destroy_sampler(self.sampler, None) };
        if let Ok(mut image) = self.image.lock() {
            image.destroy(&self.ctx);
        }
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanTexture {
    fn drop(&mut self) {
        self.release();
    }
}

// ============================================================================
// Attachment texture
// ============================================================================

/// Render attachment with one image per frame slot
pub struct VulkanAttachmentTexture {
    ctx: Arc<GpuContext>,
    images: Vec<GpuImage>,
    sampler: Option<vk::Sampler>,
    desc: AttachmentTextureDesc,
}

impl VulkanAttachmentTexture {
    pub(crate) fn create(ctx: &Arc<GpuContext>, desc: &AttachmentTextureDesc) -> Result<Self> {
        if desc.width == 0 || desc.height == 0 || desc.image_count == 0 {
            return Err(engine_violation!("kestrel::vulkan",
                "Attachment needs a non-zero size and image count ({}x{}, {} image(s))",
                desc.width, desc.height, desc.image_count));
        }

        let usage = attachment_usage(desc);
        let mut attachment = Self {
            ctx: Arc::clone(ctx),
            images: Vec::with_capacity(desc.image_count as usize),
            sampler: None,
            desc: *desc,
        };

        // on error, Drop frees the images created so far
        for _ in 0..desc.image_count {
            attachment.images.push(GpuImage::create(
                ctx, desc.width, desc.height, desc.format, 1, desc.samples, usage, "attachment",
            )?);
        }

        if desc.sampled {
            attachment.sampler = Some(create_sampler(ctx, &SamplerProperties::default(), 1)?);
        }

        engine_debug!("kestrel::vulkan", "Created {:?} attachment {}x{} {:?} x{} ({:?})",
            desc.kind, desc.width, desc.height, desc.format, desc.image_count, desc.samples);
        Ok(attachment)
    }

    pub(crate) fn view(&self, index: usize) -> Option<vk::ImageView> {
        self.images.get(index).map(|image| image.view)
    }

    pub(crate) fn sampler(&self) -> Option<vk::Sampler> {
        self.sampler
    }
}

/// Image usage for an attachment of `desc.kind`
pub(crate) fn attachment_usage(desc: &AttachmentTextureDesc) -> vk::ImageUsageFlags {
    let mut usage = if desc.format.is_depth() || desc.kind == AttachmentKind::DepthStencil {
        vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
    } else {
        vk::ImageUsageFlags::COLOR_ATTACHMENT
    };
    if desc.samples > SampleCount::S1 && !desc.sampled {
        usage |= vk::ImageUsageFlags::TRANSIENT_ATTACHMENT;
    }
    if desc.sampled {
        usage |= vk::ImageUsageFlags::SAMPLED;
    }
    if matches!(desc.kind, AttachmentKind::Offscreen | AttachmentKind::Resolve) {
        usage |= vk::ImageUsageFlags::TRANSFER_SRC;
    }
    usage
}

impl AttachmentTexture for VulkanAttachmentTexture {
    fn desc(&self) -> &AttachmentTextureDesc {
        &self.desc
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanAttachmentTexture {
    fn drop(&mut self) {
        if let Some(sampler) = self.sampler.take() {
            unsafe { self.ctx.device.destroy_sampler(sampler, None) };
        }
        for image in &mut self.images {
            image.destroy(&self.ctx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(kind: AttachmentKind, format: TextureFormat, samples: SampleCount) -> AttachmentTextureDesc {
        AttachmentTextureDesc { width: 64, height: 64, kind, format, samples, ..Default::default() }
    }

    #[test]
    fn test_depth_attachment_usage() {
        let usage = attachment_usage(&desc(AttachmentKind::DepthStencil, TextureFormat::D32_FLOAT, SampleCount::S1));
        assert!(usage.contains(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT));
        assert!(!usage.contains(vk::ImageUsageFlags::COLOR_ATTACHMENT));
    }

    #[test]
    fn test_multisampled_color_is_transient() {
        let usage = attachment_usage(&desc(AttachmentKind::Color, TextureFormat::B8G8R8A8_SRGB, SampleCount::S4));
        assert!(usage.contains(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSIENT_ATTACHMENT));
    }

    #[test]
    fn test_sampled_offscreen_usage() {
        let mut d = desc(AttachmentKind::Offscreen, TextureFormat::R8G8B8A8_UNORM, SampleCount::S1);
        d.sampled = true;
        let usage = attachment_usage(&d);
        assert!(usage.contains(vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_SRC));
        assert!(!usage.contains(vk::ImageUsageFlags::TRANSIENT_ATTACHMENT));
    }
}
