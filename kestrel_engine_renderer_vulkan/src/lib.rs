/*!
# Kestrel Engine - Vulkan Backend

Vulkan implementation of the `kestrel_engine` graphics device traits.

Uses `ash` for the Vulkan bindings, `ash-window` for surface creation and
`gpu-allocator` for memory management. Construct a [`VulkanGraphicsDevice`]
for a window and hand it to the core `Renderer`:

```no_run
use kestrel_engine::kestrel::render::Extent2D;
use kestrel_engine::kestrel::renderer::{Renderer, RendererSettings};
use kestrel_engine_renderer_vulkan::{DeviceConfig, VulkanGraphicsDevice};
# fn run(window: &winit::window::Window) -> kestrel_engine::kestrel::Result<()> {
let device = VulkanGraphicsDevice::new(window, DeviceConfig::default())?;
let size = window.inner_size();
let renderer = Renderer::new(
    Box::new(device),
    Extent2D::new(size.width, size.height),
    RendererSettings::default(),
)?;
# Ok(())
# }
```
*/

// Device and shared state
mod vulkan;
mod vulkan_context;
mod vulkan_format;
mod debug;

// Resources
mod vulkan_upload;
mod vulkan_buffer;
mod vulkan_sampler;
mod vulkan_texture;
mod vulkan_shader;
mod vulkan_descriptor_set;
mod vulkan_pipeline;

// Frame recording and presentation
mod vulkan_render_pass;
mod vulkan_frame_buffer;
mod vulkan_command_list;
mod vulkan_swapchain;

pub use vulkan::{DeviceConfig, VulkanGraphicsDevice};
pub use vulkan_buffer::VulkanBuffer;
pub use vulkan_texture::{VulkanAttachmentTexture, VulkanTexture};
pub use vulkan_swapchain::VulkanSwapchain;
pub use vulkan_command_list::VulkanCommandList;

// Re-export debug utilities
pub use debug::{get_validation_stats, print_validation_stats_report, DebugSeverity, ValidationStats};
