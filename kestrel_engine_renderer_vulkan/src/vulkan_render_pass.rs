/// VulkanRenderPass - single-subpass forward pass with optional MSAA resolve

use ash::vk;
use kestrel_engine::kestrel::render::{RenderPass, RenderPassDesc};
use kestrel_engine::kestrel::Result;
use kestrel_engine::{engine_debug, engine_err};
use std::any::Any;

use crate::vulkan_format::{sample_count_to_vk, texture_format_to_vk};

pub struct VulkanRenderPass {
    device: ash::Device,
    pub(crate) render_pass: vk::RenderPass,
    desc: RenderPassDesc,
}

/// Attachment descriptions in framebuffer order: color, depth, then resolve
pub(crate) fn attachment_descriptions(desc: &RenderPassDesc) -> Vec<vk::AttachmentDescription> {
    let samples = sample_count_to_vk(desc.samples);
    let color_format = texture_format_to_vk(desc.color_format);

    // the color target is presented directly unless it is resolved first
    let color_final_layout = if desc.has_resolve() {
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
    } else {
        vk::ImageLayout::PRESENT_SRC_KHR
    };

    let mut attachments = vec![
        vk::AttachmentDescription::default()
            .format(color_format)
            .samples(samples)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(if desc.has_resolve() {
                vk::AttachmentStoreOp::DONT_CARE
            } else {
                vk::AttachmentStoreOp::STORE
            })
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(color_final_layout),
        vk::AttachmentDescription::default()
            .format(texture_format_to_vk(desc.depth_format))
            .samples(samples)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
    ];

    if desc.has_resolve() {
        attachments.push(
            vk::AttachmentDescription::default()
                .format(color_format)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(vk::AttachmentLoadOp::DONT_CARE)
                .store_op(vk::AttachmentStoreOp::STORE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::PRESENT_SRC_KHR),
        );
    }

    attachments
}

impl VulkanRenderPass {
    pub(crate) fn create(device: &ash::Device, desc: &RenderPassDesc) -> Result<Self> {
        let attachments = attachment_descriptions(desc);

        let color_ref = [vk::AttachmentReference::default()
            .attachment(0)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)];
        let depth_ref = vk::AttachmentReference::default()
            .attachment(1)
            .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
        let resolve_ref = [vk::AttachmentReference::default()
            .attachment(2)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)];

        let mut subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_ref)
            .depth_stencil_attachment(&depth_ref);
        if desc.has_resolve() {
            subpass = subpass.resolve_attachments(&resolve_ref);
        }

        let stage_mask = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
        let dependency = vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(stage_mask)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(stage_mask)
            .dst_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            );

        let render_pass_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(std::slice::from_ref(&subpass))
            .dependencies(std::slice::from_ref(&dependency));

        let render_pass = unsafe {
            device.create_render_pass(&render_pass_info, None)
                .map_err(|e| engine_err!("kestrel::vulkan", "Failed to create render pass: {:?}", e))?
        };

        engine_debug!("kestrel::vulkan", "Created render pass ({:?} color, {:?} depth, {:?})",
            desc.color_format, desc.depth_format, desc.samples);
        Ok(Self { device: device.clone(), render_pass, desc: *desc })
    }
}

impl RenderPass for VulkanRenderPass {
    fn desc(&self) -> &RenderPassDesc {
        &self.desc
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanRenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_render_pass(self.render_pass, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_engine::kestrel::render::{SampleCount, TextureFormat};

    fn desc(samples: SampleCount) -> RenderPassDesc {
        RenderPassDesc {
            color_format: TextureFormat::B8G8R8A8_SRGB,
            depth_format: TextureFormat::D32_FLOAT,
            samples,
        }
    }

    #[test]
    fn test_single_sampled_pass_presents_color() {
        let attachments = attachment_descriptions(&desc(SampleCount::S1));
        assert_eq!(attachments.len(), 2);
        assert_eq!(attachments[0].final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(attachments[0].store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(attachments[1].format, vk::Format::D32_SFLOAT);
    }

    #[test]
    fn test_multisampled_pass_resolves_into_presentable_image() {
        let attachments = attachment_descriptions(&desc(SampleCount::S4));
        assert_eq!(attachments.len(), 3);
        assert_eq!(attachments[0].samples, vk::SampleCountFlags::TYPE_4);
        assert_eq!(attachments[1].samples, vk::SampleCountFlags::TYPE_4);
        assert_eq!(attachments[2].samples, vk::SampleCountFlags::TYPE_1);
        assert_eq!(attachments[2].final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(attachments[0].final_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    }
}
