/// Swapchain trait and surface negotiation
///
/// The selection functions below are backend-independent: a backend feeds
/// them the surface query results and builds its native swapchain from the
/// answer. A swapchain is always rebuilt as a whole, never patched.

use std::any::Any;
use crate::error::Result;
use crate::graphics_device::TextureFormat;
use crate::engine_bail;

/// Width and height in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Extent2D {
    pub width: u32,
    pub height: u32,
}

impl Extent2D {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Either side is zero (minimized window)
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    SrgbNonlinear,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceFormat {
    pub format: TextureFormat,
    pub color_space: ColorSpace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresentMode {
    Immediate,
    Mailbox,
    Fifo,
    FifoRelaxed,
}

/// Surface limits reported by the presentation engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceCapabilities {
    pub min_image_count: u32,
    /// 0 means no upper bound
    pub max_image_count: u32,
    /// `u32::MAX` in both fields means the surface size follows the swapchain
    pub current_extent: Extent2D,
    pub min_extent: Extent2D,
    pub max_extent: Extent2D,
}

/// Preferred sRGB BGRA pair, else the first format reported
pub fn choose_surface_format(available: &[SurfaceFormat]) -> Result<SurfaceFormat> {
    let preferred = available.iter().find(|f| {
        f.format == TextureFormat::B8G8R8A8_SRGB && f.color_space == ColorSpace::SrgbNonlinear
    });

    match preferred.or_else(|| available.first()) {
        Some(format) => Ok(*format),
        None => engine_bail!("kestrel::swapchain", "Surface reports no formats"),
    }
}

/// Mailbox when vsync is off and mailbox is offered, else FIFO
///
/// FIFO is always available, so it is the fallback in every case.
pub fn choose_present_mode(available: &[PresentMode], vsync: bool) -> PresentMode {
    if !vsync && available.contains(&PresentMode::Mailbox) {
        PresentMode::Mailbox
    } else {
        PresentMode::Fifo
    }
}

/// Swapchain extent for a window of `window` pixels
pub fn choose_extent(capabilities: &SurfaceCapabilities, window: Extent2D) -> Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    // max before min: a surface reporting min > max resolves to max
    Extent2D {
        width: window
            .width
            .max(capabilities.min_extent.width)
            .min(capabilities.max_extent.width),
        height: window
            .height
            .max(capabilities.min_extent.height)
            .min(capabilities.max_extent.height),
    }
}

/// One image above the minimum, capped by the maximum when there is one
pub fn choose_image_count(capabilities: &SurfaceCapabilities) -> u32 {
    let count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        count.min(capabilities.max_image_count)
    } else {
        count
    }
}

/// Parameters for creating or recreating a swapchain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainRequest {
    pub width: u32,
    pub height: u32,
    pub vsync: bool,
}

/// Result of acquiring the next image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired { image_index: u32, suboptimal: bool },
    /// The swapchain no longer matches the surface and must be recreated
    OutOfDate,
}

/// Result of presenting an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Suboptimal,
    OutOfDate,
}

impl PresentOutcome {
    pub fn needs_recreation(self) -> bool {
        !matches!(self, PresentOutcome::Presented)
    }
}

/// Swapchain for presenting rendered images to a window
///
/// Transient invalidation (out-of-date, suboptimal) is reported through the
/// outcome enums, never as an `Err`.
pub trait Swapchain: Send + Sync {
    /// Acquire the next presentable image
    fn acquire_next_image(&mut self) -> Result<AcquireOutcome>;

    /// Present image `image_index` once the submitted frame finishes
    fn present(&mut self, image_index: u32) -> Result<PresentOutcome>;

    /// Tear down and rebuild against the current surface capabilities
    ///
    /// The caller must ensure no frame is in flight.
    fn recreate(&mut self, request: &SwapchainRequest) -> Result<()>;

    fn image_count(&self) -> usize;

    fn extent(&self) -> Extent2D;

    fn format(&self) -> TextureFormat;

    fn present_mode(&self) -> PresentMode;

    fn as_any(&self) -> &dyn Any;
}

#[cfg(test)]
#[path = "swapchain_tests.rs"]
mod tests;
