/// CommandList trait - records one frame of draw commands

use std::any::Any;
use crate::error::Result;
use crate::graphics_device::{
    Buffer, DescriptorSet, Framebuffer, IndexType, Pipeline, RenderPass,
};

/// Command list for recording rendering commands
///
/// Recorded between `begin` and `end`, then handed to
/// `GraphicsDevice::submit_frame`.
pub trait CommandList: Send + Sync {
    /// Reset and begin recording
    fn begin(&mut self) -> Result<()>;

    /// End recording
    fn end(&mut self) -> Result<()>;

    /// Begin a render pass
    ///
    /// # Arguments
    ///
    /// * `render_pass` - The render pass to begin
    /// * `framebuffer` - Framebuffer compatible with `render_pass`
    /// * `clear_values` - One clear value per attachment, in attachment order
    fn begin_render_pass(
        &mut self,
        render_pass: &dyn RenderPass,
        framebuffer: &dyn Framebuffer,
        clear_values: &[ClearValue],
    ) -> Result<()>;

    /// End the current render pass
    fn end_render_pass(&mut self) -> Result<()>;

    fn set_viewport(&mut self, viewport: Viewport) -> Result<()>;

    fn set_scissor(&mut self, scissor: Rect2D) -> Result<()>;

    fn bind_pipeline(&mut self, pipeline: &dyn Pipeline) -> Result<()>;

    /// Bind a descriptor set at set index 0 of `pipeline`'s layout
    fn bind_descriptor_set(
        &mut self,
        pipeline: &dyn Pipeline,
        descriptor_set: &dyn DescriptorSet,
    ) -> Result<()>;

    /// Bind a vertex buffer at binding 0
    ///
    /// # Arguments
    ///
    /// * `buffer` - Buffer to bind
    /// * `offset` - Offset into the buffer in bytes
    fn bind_vertex_buffer(&mut self, buffer: &dyn Buffer, offset: u64) -> Result<()>;

    fn bind_index_buffer(
        &mut self,
        buffer: &dyn Buffer,
        offset: u64,
        index_type: IndexType,
    ) -> Result<()>;

    /// Draw indexed vertices
    ///
    /// # Arguments
    ///
    /// * `index_count` - Number of indices to draw
    /// * `first_index` - Index of first index
    /// * `vertex_offset` - Value added to vertex index before indexing into the vertex buffer
    fn draw_indexed(&mut self, index_count: u32, first_index: u32, vertex_offset: i32) -> Result<()>;

    fn as_any(&self) -> &dyn Any;
}

/// Viewport dimensions and depth range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    /// Full-extent viewport with depth range [0, 1]
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// 2D rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect2D {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Clear value for an attachment
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    /// Color clear value (RGBA)
    Color([f32; 4]),
    /// Depth/stencil clear value
    DepthStencil { depth: f32, stencil: u32 },
}
