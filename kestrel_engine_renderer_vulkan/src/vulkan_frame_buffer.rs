/// VulkanFramebuffer - binds swapchain and attachment views to a render pass
///
/// Created once per swapchain image and reused each frame.

use ash::vk;
use kestrel_engine::kestrel::render::{Framebuffer, FramebufferAttachment, FramebufferDesc};
use kestrel_engine::kestrel::{Error, Result};
use kestrel_engine::{engine_err, engine_error};
use std::any::Any;

use crate::vulkan_render_pass::VulkanRenderPass;
use crate::vulkan_swapchain::VulkanSwapchain;
use crate::vulkan_texture::VulkanAttachmentTexture;

pub struct VulkanFramebuffer {
    device: ash::Device,
    pub(crate) framebuffer: vk::Framebuffer,
    width: u32,
    height: u32,
}

fn foreign(what: &str) -> Error {
    engine_error!("kestrel::vulkan", "Framebuffer attachment is not a Vulkan {}", what);
    Error::InvalidResource(format!("foreign {} handle", what))
}

/// Native view for one framebuffer attachment
fn attachment_view(attachment: &FramebufferAttachment<'_>) -> Result<vk::ImageView> {
    match attachment {
        FramebufferAttachment::SwapchainImage { swapchain, index } => swapchain
            .as_any()
            .downcast_ref::<VulkanSwapchain>()
            .ok_or_else(|| foreign("swapchain"))?
            .image_view(*index),
        FramebufferAttachment::Texture { texture, index } => texture
            .as_any()
            .downcast_ref::<VulkanAttachmentTexture>()
            .ok_or_else(|| foreign("attachment"))?
            .view(*index),
    }
    .ok_or_else(|| {
        engine_error!("kestrel::vulkan", "Framebuffer attachment image index out of range");
        Error::InvalidResource("attachment image index out of range".to_string())
    })
}

impl VulkanFramebuffer {
    pub(crate) fn create(device: &ash::Device, desc: &FramebufferDesc<'_>) -> Result<Self> {
        let render_pass = desc
            .render_pass
            .as_any()
            .downcast_ref::<VulkanRenderPass>()
            .ok_or_else(|| foreign("render pass"))?;

        let views = desc
            .attachments
            .iter()
            .map(attachment_view)
            .collect::<Result<Vec<_>>>()?;

        let create_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass.render_pass)
            .attachments(&views)
            .width(desc.width)
            .height(desc.height)
            .layers(1);

        let framebuffer = unsafe {
            device.create_framebuffer(&create_info, None)
                .map_err(|e| engine_err!("kestrel::vulkan", "Failed to create framebuffer {}x{}: {:?}", desc.width, desc.height, e))?
        };

        Ok(Self { device: device.clone(), framebuffer, width: desc.width, height: desc.height })
    }
}

impl Framebuffer for VulkanFramebuffer {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanFramebuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_framebuffer(self.framebuffer, None);
        }
    }
}
