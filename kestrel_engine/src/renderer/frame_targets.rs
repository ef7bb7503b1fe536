/// Render pass, attachments and framebuffers built around one swapchain
///
/// Always rebuilt as a unit when the swapchain is recreated.

use std::sync::Arc;
use crate::error::Result;
use crate::graphics_device::{
    AttachmentKind, AttachmentTexture, AttachmentTextureDesc, Extent2D, Framebuffer,
    FramebufferAttachment, FramebufferDesc, GraphicsDevice, RenderPass, RenderPassDesc,
    SampleCount, Swapchain,
};
use crate::{engine_debug, engine_err};

pub struct FrameTargets {
    render_pass: Arc<dyn RenderPass>,
    depth: Arc<dyn AttachmentTexture>,
    /// Multisampled color target, resolved into the swapchain image
    msaa_color: Option<Arc<dyn AttachmentTexture>>,
    framebuffers: Vec<Arc<dyn Framebuffer>>,
    extent: Extent2D,
}

impl FrameTargets {
    pub fn new(
        device: &dyn GraphicsDevice,
        swapchain: &dyn Swapchain,
        samples: SampleCount,
    ) -> Result<Self> {
        let extent = swapchain.extent();
        let desc = RenderPassDesc {
            color_format: swapchain.format(),
            depth_format: device.find_depth_format()?,
            samples,
        };
        let render_pass = device.create_render_pass(&desc)?;

        let depth = device.create_attachment_texture(&AttachmentTextureDesc {
            width: extent.width,
            height: extent.height,
            kind: AttachmentKind::DepthStencil,
            format: desc.depth_format,
            samples,
            ..Default::default()
        })?;

        let msaa_color = if desc.has_resolve() {
            Some(device.create_attachment_texture(&AttachmentTextureDesc {
                width: extent.width,
                height: extent.height,
                kind: AttachmentKind::Color,
                format: desc.color_format,
                samples,
                ..Default::default()
            })?)
        } else {
            None
        };

        let mut framebuffers = Vec::with_capacity(swapchain.image_count());
        for index in 0..swapchain.image_count() {
            let presentable = FramebufferAttachment::SwapchainImage { swapchain, index };
            let depth_view = FramebufferAttachment::Texture { texture: depth.as_ref(), index: 0 };

            let attachments = match &msaa_color {
                Some(color) => vec![
                    FramebufferAttachment::Texture { texture: color.as_ref(), index: 0 },
                    depth_view,
                    presentable,
                ],
                None => vec![presentable, depth_view],
            };

            framebuffers.push(device.create_framebuffer(&FramebufferDesc {
                render_pass: render_pass.as_ref(),
                attachments,
                width: extent.width,
                height: extent.height,
            })?);
        }

        engine_debug!("kestrel::FrameTargets",
            "Built {} framebuffer(s) at {}x{} ({}x MSAA, depth {:?})",
            framebuffers.len(), extent.width, extent.height, samples.count(), desc.depth_format);

        Ok(Self { render_pass, depth, msaa_color, framebuffers, extent })
    }

    pub fn render_pass(&self) -> &Arc<dyn RenderPass> {
        &self.render_pass
    }

    pub fn render_pass_desc(&self) -> RenderPassDesc {
        *self.render_pass.desc()
    }

    pub fn depth(&self) -> &Arc<dyn AttachmentTexture> {
        &self.depth
    }

    pub fn msaa_color(&self) -> Option<&Arc<dyn AttachmentTexture>> {
        self.msaa_color.as_ref()
    }

    pub fn framebuffer(&self, image_index: u32) -> Result<&Arc<dyn Framebuffer>> {
        self.framebuffers.get(image_index as usize).ok_or_else(|| {
            engine_err!("kestrel::FrameTargets",
                "No framebuffer for swapchain image {} ({} built)", image_index, self.framebuffers.len())
        })
    }

    pub fn framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn extent(&self) -> Extent2D {
        self.extent
    }

    pub fn samples(&self) -> SampleCount {
        self.render_pass.desc().samples
    }
}
