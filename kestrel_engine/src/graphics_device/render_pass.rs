/// Render pass trait and descriptor

use std::any::Any;
use crate::graphics_device::{SampleCount, TextureFormat};

/// Formats and sample count of the single-subpass forward pass
///
/// With `samples > 1` the pass renders into a multisampled color target and
/// resolves into the presentable image at the end of the subpass. Two passes
/// with equal descriptors are compatible: pipelines built against one can be
/// used with the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderPassDesc {
    /// Format of the presentable image
    pub color_format: TextureFormat,
    pub depth_format: TextureFormat,
    pub samples: SampleCount,
}

impl RenderPassDesc {
    /// A resolve attachment follows color and depth
    pub fn has_resolve(&self) -> bool {
        self.samples > SampleCount::S1
    }

    /// Number of attachments (and clear values) the pass expects
    pub fn attachment_count(&self) -> usize {
        if self.has_resolve() { 3 } else { 2 }
    }
}

/// Native render pass
pub trait RenderPass: Send + Sync {
    fn desc(&self) -> &RenderPassDesc;

    fn as_any(&self) -> &dyn Any;
}
