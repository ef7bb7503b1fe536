/// Framebuffer trait - binds attachment views to a render pass
///
/// Created once per swapchain image and reused every frame. Rebuilt only
/// when the swapchain or its attachments are recreated.

use std::any::Any;
use crate::graphics_device::{AttachmentTexture, RenderPass, Swapchain};

/// One image view of a framebuffer
pub enum FramebufferAttachment<'a> {
    /// Image `index` of a swapchain
    SwapchainImage { swapchain: &'a dyn Swapchain, index: usize },
    /// Image `index` of an attachment texture
    Texture { texture: &'a dyn AttachmentTexture, index: usize },
}

/// Descriptor for creating a framebuffer
///
/// Attachment order follows the render pass: color (the multisampled target
/// when MSAA is on, the swapchain image otherwise), then depth, then the
/// swapchain image as resolve target when MSAA is on.
pub struct FramebufferDesc<'a> {
    pub render_pass: &'a dyn RenderPass,
    pub attachments: Vec<FramebufferAttachment<'a>>,
    pub width: u32,
    pub height: u32,
}

/// Framebuffer
pub trait Framebuffer: Send + Sync {
    /// Width in pixels
    fn width(&self) -> u32;

    /// Height in pixels
    fn height(&self) -> u32;

    fn as_any(&self) -> &dyn Any;
}
