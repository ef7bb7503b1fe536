/// One-shot transfer commands: staging copies, layout transitions, mip generation
///
/// Every helper records into a command buffer from the context's upload
/// pool, submits it to the graphics queue and waits for the queue to drain
/// before returning, so the caller may free its staging memory immediately.

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use kestrel_engine::kestrel::{Error, Result};
use kestrel_engine::{engine_err, engine_error, engine_trace};

use crate::vulkan_context::GpuContext;

/// Host-visible buffer holding data on its way to device-local memory
pub(crate) struct StagingBuffer<'a> {
    ctx: &'a GpuContext,
    pub(crate) buffer: vk::Buffer,
    allocation: Option<Allocation>,
}

impl<'a> StagingBuffer<'a> {
    /// Create a staging buffer filled with `data`
    pub(crate) fn new(ctx: &'a GpuContext, data: &[u8]) -> Result<Self> {
        unsafe {
            let create_info = vk::BufferCreateInfo::default()
                .size(data.len() as u64)
                .usage(vk::BufferUsageFlags::TRANSFER_SRC)
                .sharing_mode(vk::SharingMode::EXCLUSIVE);

            let buffer = ctx.device.create_buffer(&create_info, None)
                .map_err(|e| engine_err!("kestrel::vulkan", "Failed to create staging buffer ({} bytes): {:?}", data.len(), e))?;

            let requirements = ctx.device.get_buffer_memory_requirements(buffer);
            let allocation = ctx.lock_allocator()?.allocate(&AllocationCreateDesc {
                name: "staging",
                requirements,
                location: MemoryLocation::CpuToGpu,
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            });
            let allocation = match allocation {
                Ok(allocation) => allocation,
                Err(e) => {
                    ctx.device.destroy_buffer(buffer, None);
                    engine_error!("kestrel::vulkan", "Out of memory for staging buffer ({} bytes): {:?}", data.len(), e);
                    return Err(Error::OutOfMemory);
                }
            };

            let staging = Self { ctx, buffer, allocation: Some(allocation) };

            let allocation = staging.allocation.as_ref()
                .ok_or_else(|| engine_err!("kestrel::vulkan", "Staging buffer lost its allocation"))?;
            ctx.device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
                .map_err(|e| engine_err!("kestrel::vulkan", "Failed to bind staging buffer memory: {:?}", e))?;

            let mapped = allocation.mapped_ptr()
                .ok_or_else(|| engine_err!("kestrel::vulkan", "Staging buffer is not host visible"))?;
            std::ptr::copy_nonoverlapping(data.as_ptr(), mapped.as_ptr() as *mut u8, data.len());

            Ok(staging)
        }
    }
}

impl Drop for StagingBuffer<'_> {
    fn drop(&mut self) {
        unsafe {
            if let Some(allocation) = self.allocation.take() {
                if let Ok(mut allocator) = self.ctx.allocator.lock() {
                    allocator.free(allocation).ok();
                }
            }
            self.ctx.device.destroy_buffer(self.buffer, None);
        }
    }
}

/// Record `record` into a fresh command buffer, submit it and wait for completion
pub(crate) fn submit_single_time<F>(ctx: &GpuContext, record: F) -> Result<()>
where
    F: FnOnce(vk::CommandBuffer),
{
    let pool = ctx.upload_command_pool.lock()
        .map_err(|_| engine_err!("kestrel::vulkan", "Upload command pool lock poisoned"))?;

    unsafe {
        let allocate_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(*pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let command_buffer = ctx.device.allocate_command_buffers(&allocate_info)
            .map_err(|e| engine_err!("kestrel::vulkan", "Failed to allocate upload command buffer: {:?}", e))?[0];

        let result = (|| {
            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            ctx.device.begin_command_buffer(command_buffer, &begin_info)
                .map_err(|e| engine_err!("kestrel::vulkan", "Failed to begin upload command buffer: {:?}", e))?;

            record(command_buffer);

            ctx.device.end_command_buffer(command_buffer)
                .map_err(|e| engine_err!("kestrel::vulkan", "Failed to end upload command buffer: {:?}", e))?;

            let command_buffers = [command_buffer];
            let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
            ctx.device.queue_submit(ctx.graphics_queue, &[submit_info], vk::Fence::null())
                .map_err(|e| engine_err!("kestrel::vulkan", "Failed to submit upload commands: {:?}", e))?;

            ctx.device.queue_wait_idle(ctx.graphics_queue)
                .map_err(|e| engine_err!("kestrel::vulkan", "Failed to wait for upload completion: {:?}", e))
        })();

        ctx.device.free_command_buffers(*pool, &[command_buffer]);
        result
    }
}

/// Copy `size` bytes between buffers
pub(crate) fn copy_buffer(ctx: &GpuContext, src: vk::Buffer, dst: vk::Buffer, size: u64) -> Result<()> {
    engine_trace!("kestrel::vulkan", "Copying {} bytes through staging", size);
    submit_single_time(ctx, |cmd| unsafe {
        let region = vk::BufferCopy::default().size(size);
        ctx.device.cmd_copy_buffer(cmd, src, dst, &[region]);
    })
}

/// Access masks and stages for the layout transitions the engine performs
fn transition_masks(
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> Result<(vk::AccessFlags, vk::AccessFlags, vk::PipelineStageFlags, vk::PipelineStageFlags)> {
    match (old_layout, new_layout) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => Ok((
            vk::AccessFlags::empty(),
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TRANSFER,
        )),
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => Ok((
            vk::AccessFlags::TRANSFER_WRITE,
            vk::AccessFlags::SHADER_READ,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
        )),
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => Ok((
            vk::AccessFlags::empty(),
            vk::AccessFlags::SHADER_READ,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
        )),
        _ => Err(engine_err!("kestrel::vulkan",
            "Unsupported image layout transition {:?} -> {:?}", old_layout, new_layout)),
    }
}

/// Move every mip level of `image` from `old_layout` to `new_layout`
pub(crate) fn transition_image_layout(
    ctx: &GpuContext,
    image: vk::Image,
    aspect_mask: vk::ImageAspectFlags,
    mip_levels: u32,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> Result<()> {
    let (src_access, dst_access, src_stage, dst_stage) = transition_masks(old_layout, new_layout)?;

    submit_single_time(ctx, |cmd| unsafe {
        let barrier = vk::ImageMemoryBarrier::default()
            .old_layout(old_layout)
            .new_layout(new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask,
                base_mip_level: 0,
                level_count: mip_levels,
                base_array_layer: 0,
                layer_count: 1,
            })
            .src_access_mask(src_access)
            .dst_access_mask(dst_access);

        ctx.device.cmd_pipeline_barrier(
            cmd,
            src_stage,
            dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    })
}

/// Copy tightly packed pixels into mip level 0 (image in TRANSFER_DST_OPTIMAL)
pub(crate) fn copy_buffer_to_image(
    ctx: &GpuContext,
    buffer: vk::Buffer,
    image: vk::Image,
    width: u32,
    height: u32,
) -> Result<()> {
    submit_single_time(ctx, |cmd| unsafe {
        let region = vk::BufferImageCopy::default()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
            .image_extent(vk::Extent3D { width, height, depth: 1 });

        ctx.device.cmd_copy_buffer_to_image(
            cmd,
            buffer,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[region],
        );
    })
}

/// Fill mip levels 1.. by successive linear blits and leave every level
/// in SHADER_READ_ONLY_OPTIMAL
///
/// Expects all levels in TRANSFER_DST_OPTIMAL with level 0 populated.
pub(crate) fn generate_mipmaps(
    ctx: &GpuContext,
    image: vk::Image,
    format: vk::Format,
    width: u32,
    height: u32,
    mip_levels: u32,
) -> Result<()> {
    let properties = unsafe {
        ctx.instance.get_physical_device_format_properties(ctx.physical_device, format)
    };
    if !properties
        .optimal_tiling_features
        .contains(vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR)
    {
        return Err(engine_err!("kestrel::vulkan",
            "Format {:?} does not support linear blitting, cannot generate mipmaps", format));
    }

    submit_single_time(ctx, |cmd| unsafe {
        let mut barrier = vk::ImageMemoryBarrier::default()
            .image(image)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        let mut mip_width = width as i32;
        let mut mip_height = height as i32;

        for level in 1..mip_levels {
            barrier.subresource_range.base_mip_level = level - 1;
            barrier = barrier
                .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .new_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
                .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                .dst_access_mask(vk::AccessFlags::TRANSFER_READ);
            ctx.device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::TRANSFER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );

            let next_width = (mip_width / 2).max(1);
            let next_height = (mip_height / 2).max(1);
            let blit = vk::ImageBlit::default()
                .src_offsets([
                    vk::Offset3D { x: 0, y: 0, z: 0 },
                    vk::Offset3D { x: mip_width, y: mip_height, z: 1 },
                ])
                .src_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: level - 1,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .dst_offsets([
                    vk::Offset3D { x: 0, y: 0, z: 0 },
                    vk::Offset3D { x: next_width, y: next_height, z: 1 },
                ])
                .dst_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: level,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            ctx.device.cmd_blit_image(
                cmd,
                image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[blit],
                vk::Filter::LINEAR,
            );

            barrier = barrier
                .old_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
                .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                .src_access_mask(vk::AccessFlags::TRANSFER_READ)
                .dst_access_mask(vk::AccessFlags::SHADER_READ);
            ctx.device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );

            mip_width = next_width;
            mip_height = next_height;
        }

        // last level was only ever written
        barrier.subresource_range.base_mip_level = mip_levels - 1;
        barrier = barrier
            .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .dst_access_mask(vk::AccessFlags::SHADER_READ);
        ctx.device.cmd_pipeline_barrier(
            cmd,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    })
}
