/// GraphicsDevice trait - factory for GPU resources and frame submission

use std::sync::Arc;
use crate::error::Result;
use crate::graphics_device::{
    AttachmentTexture, AttachmentTextureDesc, BindingResource, Buffer, BufferDesc, CommandList,
    DescriptorBinding, DescriptorSet, DeviceInfo, Framebuffer, FramebufferDesc,
    NativeDescriptorLayout, Pipeline, PipelineDesc, RenderPass, RenderPassDesc, Shader,
    ShaderDesc, Swapchain, SwapchainRequest, Texture, TextureDesc, TextureFormat,
};

/// Logical device plus its queues and allocator
///
/// Implemented by backend-specific devices (e.g. `VulkanGraphicsDevice`).
/// All methods take `&self`; backends synchronize their own internal state.
/// Frames in flight are limited to one: `wait_for_frame` blocks until the
/// previously submitted frame has finished on the GPU.
pub trait GraphicsDevice: Send + Sync {
    /// Selected physical device and its limits
    fn info(&self) -> &DeviceInfo;

    /// Create a buffer
    ///
    /// Device-local kinds are filled from `desc.data` through a staging copy
    /// that has completed when this returns.
    fn create_buffer(&self, desc: BufferDesc) -> Result<Arc<dyn Buffer>>;

    /// Create a sampled 2D texture, uploading and mip-mapping `desc.data`
    fn create_texture(&self, desc: TextureDesc) -> Result<Arc<dyn Texture>>;

    fn create_attachment_texture(&self, desc: &AttachmentTextureDesc) -> Result<Arc<dyn AttachmentTexture>>;

    fn create_shader(&self, desc: ShaderDesc) -> Result<Arc<dyn Shader>>;

    /// Create the native object behind a baked `DescriptorLayout`
    fn create_descriptor_layout(
        &self,
        bindings: &[DescriptorBinding],
    ) -> Result<Arc<dyn NativeDescriptorLayout>>;

    /// Allocate a pool sized for `bindings` and write one set from it
    ///
    /// `resources[i]` is written to `bindings[i]`; types must match.
    fn create_descriptor_set(
        &self,
        layout: &dyn NativeDescriptorLayout,
        bindings: &[DescriptorBinding],
        resources: &[BindingResource<'_>],
    ) -> Result<Arc<dyn DescriptorSet>>;

    fn create_render_pass(&self, desc: &RenderPassDesc) -> Result<Arc<dyn RenderPass>>;

    fn create_pipeline(
        &self,
        desc: &PipelineDesc<'_>,
        render_pass: &dyn RenderPass,
    ) -> Result<Arc<dyn Pipeline>>;

    fn create_framebuffer(&self, desc: &FramebufferDesc<'_>) -> Result<Arc<dyn Framebuffer>>;

    /// Create a swapchain for the device's surface
    fn create_swapchain(&self, request: &SwapchainRequest) -> Result<Box<dyn Swapchain>>;

    fn create_command_list(&self) -> Result<Box<dyn CommandList>>;

    /// First supported depth attachment format
    fn find_depth_format(&self) -> Result<TextureFormat>;

    /// Block until the frame in flight has finished
    fn wait_for_frame(&self) -> Result<()>;

    /// Submit a recorded frame
    ///
    /// Waits on the swapchain's image-available signal, signals its
    /// render-finished signal, and arms the in-flight fence.
    fn submit_frame(&self, commands: &dyn CommandList, swapchain: &dyn Swapchain) -> Result<()>;

    /// Block until the device is idle
    fn wait_idle(&self) -> Result<()>;
}
