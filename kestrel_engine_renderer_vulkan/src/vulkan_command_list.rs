/// VulkanCommandList - records one frame of draw commands
///
/// Owns a pool with a single primary command buffer that is reset at every
/// `begin`. Recording-state misuse is reported as a contract violation.

use ash::vk;
use kestrel_engine::kestrel::render::{
    Buffer, ClearValue, CommandList, DescriptorSet, Framebuffer, IndexType, Pipeline, Rect2D,
    RenderPass, Viewport,
};
use kestrel_engine::kestrel::{Error, Result};
use kestrel_engine::{engine_err, engine_error, engine_violation};
use std::any::Any;

use crate::vulkan_buffer::VulkanBuffer;
use crate::vulkan_descriptor_set::VulkanDescriptorSet;
use crate::vulkan_format::index_type_to_vk;
use crate::vulkan_frame_buffer::VulkanFramebuffer;
use crate::vulkan_pipeline::VulkanPipeline;
use crate::vulkan_render_pass::VulkanRenderPass;

pub struct VulkanCommandList {
    device: ash::Device,
    command_pool: vk::CommandPool,
    pub(crate) command_buffer: vk::CommandBuffer,
    is_recording: bool,
    in_render_pass: bool,
}

/// Downcast a trait object to its Vulkan type or fail with `InvalidResource`
fn native<'a, T: 'static>(object: &'a dyn Any, what: &str) -> Result<&'a T> {
    object.downcast_ref::<T>().ok_or_else(|| {
        engine_error!("kestrel::vulkan", "{} is not a Vulkan object", what);
        Error::InvalidResource(format!("foreign {} handle", what))
    })
}

fn require_allocated(buffer: &dyn Buffer, operation: &str) -> Result<()> {
    if buffer.is_allocated() {
        Ok(())
    } else {
        Err(engine_violation!("kestrel::vulkan", "{} called with a released buffer", operation))
    }
}

pub(crate) fn clear_value_to_vk(value: &ClearValue) -> vk::ClearValue {
    match value {
        ClearValue::Color(color) => vk::ClearValue {
            color: vk::ClearColorValue { float32: *color },
        },
        ClearValue::DepthStencil { depth, stencil } => vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue { depth: *depth, stencil: *stencil },
        },
    }
}

impl VulkanCommandList {
    pub(crate) fn create(device: &ash::Device, graphics_queue_family: u32) -> Result<Self> {
        unsafe {
            let pool_info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(graphics_queue_family)
                .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

            let command_pool = device.create_command_pool(&pool_info, None)
                .map_err(|e| engine_err!("kestrel::vulkan", "Failed to create command pool: {:?}", e))?;

            let allocate_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(command_pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);

            let command_buffer = match device.allocate_command_buffers(&allocate_info) {
                Ok(buffers) => buffers[0],
                Err(e) => {
                    device.destroy_command_pool(command_pool, None);
                    return Err(engine_err!("kestrel::vulkan", "Failed to allocate command buffer: {:?}", e));
                }
            };

            Ok(Self {
                device: device.clone(),
                command_pool,
                command_buffer,
                is_recording: false,
                in_render_pass: false,
            })
        }
    }

    fn require_recording(&self, operation: &str) -> Result<()> {
        if self.is_recording {
            Ok(())
        } else {
            Err(engine_violation!("kestrel::vulkan", "{} called while the command list is not recording", operation))
        }
    }

    fn require_render_pass(&self, operation: &str) -> Result<()> {
        self.require_recording(operation)?;
        if self.in_render_pass {
            Ok(())
        } else {
            Err(engine_violation!("kestrel::vulkan", "{} called outside a render pass", operation))
        }
    }
}

impl CommandList for VulkanCommandList {
    fn begin(&mut self) -> Result<()> {
        if self.is_recording {
            return Err(engine_violation!("kestrel::vulkan", "Command list already recording"));
        }

        unsafe {
            self.device
                .reset_command_buffer(self.command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(|e| engine_err!("kestrel::vulkan", "Failed to reset command buffer: {:?}", e))?;

            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            self.device
                .begin_command_buffer(self.command_buffer, &begin_info)
                .map_err(|e| engine_err!("kestrel::vulkan", "Failed to begin command buffer: {:?}", e))?;
        }

        self.is_recording = true;
        self.in_render_pass = false;
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        self.require_recording("end")?;
        if self.in_render_pass {
            return Err(engine_violation!("kestrel::vulkan", "Render pass not ended before ending command list"));
        }

        unsafe {
            self.device
                .end_command_buffer(self.command_buffer)
                .map_err(|e| engine_err!("kestrel::vulkan", "Failed to end command buffer: {:?}", e))?;
        }
        self.is_recording = false;
        Ok(())
    }

    fn begin_render_pass(
        &mut self,
        render_pass: &dyn RenderPass,
        framebuffer: &dyn Framebuffer,
        clear_values: &[ClearValue],
    ) -> Result<()> {
        self.require_recording("begin_render_pass")?;
        if self.in_render_pass {
            return Err(engine_violation!("kestrel::vulkan", "Already inside a render pass"));
        }
        if clear_values.len() != render_pass.desc().attachment_count() {
            return Err(engine_violation!("kestrel::vulkan",
                "Render pass has {} attachment(s) but {} clear value(s) were given",
                render_pass.desc().attachment_count(), clear_values.len()));
        }

        let vk_render_pass = native::<VulkanRenderPass>(render_pass.as_any(), "render pass")?;
        let vk_framebuffer = native::<VulkanFramebuffer>(framebuffer.as_any(), "framebuffer")?;
        let vk_clear_values: Vec<vk::ClearValue> = clear_values.iter().map(clear_value_to_vk).collect();

        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(vk_render_pass.render_pass)
            .framebuffer(vk_framebuffer.framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: vk::Extent2D {
                    width: framebuffer.width(),
                    height: framebuffer.height(),
                },
            })
            .clear_values(&vk_clear_values);

        unsafe {
            self.device.cmd_begin_render_pass(
                self.command_buffer,
                &begin_info,
                vk::SubpassContents::INLINE,
            );
        }
        self.in_render_pass = true;
        Ok(())
    }

    fn end_render_pass(&mut self) -> Result<()> {
        self.require_render_pass("end_render_pass")?;
        unsafe {
            self.device.cmd_end_render_pass(self.command_buffer);
        }
        self.in_render_pass = false;
        Ok(())
    }

    fn set_viewport(&mut self, viewport: Viewport) -> Result<()> {
        self.require_recording("set_viewport")?;
        let vk_viewport = vk::Viewport::default()
            .x(viewport.x)
            .y(viewport.y)
            .width(viewport.width)
            .height(viewport.height)
            .min_depth(viewport.min_depth)
            .max_depth(viewport.max_depth);
        unsafe {
            self.device.cmd_set_viewport(self.command_buffer, 0, &[vk_viewport]);
        }
        Ok(())
    }

    fn set_scissor(&mut self, scissor: Rect2D) -> Result<()> {
        self.require_recording("set_scissor")?;
        let vk_scissor = vk::Rect2D::default()
            .offset(vk::Offset2D { x: scissor.x, y: scissor.y })
            .extent(vk::Extent2D { width: scissor.width, height: scissor.height });
        unsafe {
            self.device.cmd_set_scissor(self.command_buffer, 0, &[vk_scissor]);
        }
        Ok(())
    }

    fn bind_pipeline(&mut self, pipeline: &dyn Pipeline) -> Result<()> {
        self.require_recording("bind_pipeline")?;
        let vk_pipeline = native::<VulkanPipeline>(pipeline.as_any(), "pipeline")?;
        unsafe {
            self.device.cmd_bind_pipeline(
                self.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                vk_pipeline.pipeline,
            );
        }
        Ok(())
    }

    fn bind_descriptor_set(
        &mut self,
        pipeline: &dyn Pipeline,
        descriptor_set: &dyn DescriptorSet,
    ) -> Result<()> {
        self.require_recording("bind_descriptor_set")?;
        let vk_pipeline = native::<VulkanPipeline>(pipeline.as_any(), "pipeline")?;
        let vk_set = native::<VulkanDescriptorSet>(descriptor_set.as_any(), "descriptor set")?;
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                self.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                vk_pipeline.layout,
                0,
                &[vk_set.set],
                &[],
            );
        }
        Ok(())
    }

    fn bind_vertex_buffer(&mut self, buffer: &dyn Buffer, offset: u64) -> Result<()> {
        self.require_recording("bind_vertex_buffer")?;
        require_allocated(buffer, "bind_vertex_buffer")?;
        let vk_buffer = native::<VulkanBuffer>(buffer.as_any(), "vertex buffer")?;
        unsafe {
            self.device.cmd_bind_vertex_buffers(self.command_buffer, 0, &[vk_buffer.buffer], &[offset]);
        }
        Ok(())
    }

    fn bind_index_buffer(&mut self, buffer: &dyn Buffer, offset: u64, index_type: IndexType) -> Result<()> {
        self.require_recording("bind_index_buffer")?;
        require_allocated(buffer, "bind_index_buffer")?;
        let vk_buffer = native::<VulkanBuffer>(buffer.as_any(), "index buffer")?;
        unsafe {
            self.device.cmd_bind_index_buffer(
                self.command_buffer,
                vk_buffer.buffer,
                offset,
                index_type_to_vk(index_type),
            );
        }
        Ok(())
    }

    fn draw_indexed(&mut self, index_count: u32, first_index: u32, vertex_offset: i32) -> Result<()> {
        self.require_render_pass("draw_indexed")?;
        unsafe {
            self.device.cmd_draw_indexed(
                self.command_buffer,
                index_count,
                1, // instance_count
                first_index,
                vertex_offset,
                0, // first_instance
            );
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanCommandList {
    fn drop(&mut self) {
        unsafe {
            // frees the command buffer with it
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}
