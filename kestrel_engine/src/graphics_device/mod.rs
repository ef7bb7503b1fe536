/// Graphics device module - backend-facing traits and negotiation helpers

pub mod graphics_device;
pub mod device_selection;
pub mod memory;
pub mod buffer;
pub mod texture;
pub mod shader;
pub mod descriptor;
pub mod pipeline;
pub mod render_pass;
pub mod frame_buffer;
pub mod command_list;
pub mod swapchain;

pub use graphics_device::*;
pub use device_selection::*;
pub use memory::*;
pub use buffer::*;
pub use texture::*;
pub use shader::*;
pub use descriptor::*;
pub use pipeline::*;
pub use render_pass::*;
pub use frame_buffer::*;
pub use command_list::*;
pub use swapchain::*;

// Mock graphics device for tests (no GPU required)
#[cfg(test)]
pub mod mock_graphics_device;
