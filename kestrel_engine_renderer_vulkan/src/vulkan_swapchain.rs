/// VulkanSwapchain - presentation to the window surface
///
/// Surface negotiation (format, present mode, extent, image count) is done
/// by the backend-independent selection functions; this module only feeds
/// them the surface query results and builds the native objects.

use ash::vk;
use kestrel_engine::kestrel::render::{
    choose_extent, choose_image_count, choose_present_mode, choose_surface_format,
    AcquireOutcome, Extent2D, PresentMode, PresentOutcome, SurfaceCapabilities, SurfaceFormat,
    Swapchain, SwapchainRequest, TextureFormat,
};
use kestrel_engine::kestrel::{Error, Result};
use kestrel_engine::{engine_debug, engine_err, engine_error, engine_info, engine_trace, engine_warn};
use std::any::Any;
use std::sync::Arc;

use crate::vulkan_context::{GpuContext, SurfaceContext};
use crate::vulkan_format::{
    color_space_from_vk, color_space_to_vk, present_mode_from_vk, present_mode_to_vk,
    texture_format_to_vk, vk_error, vk_format_to_texture_format,
};

// ============================================================================
// Surface queries
// ============================================================================

/// Everything the surface reports for one physical device
pub(crate) struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<SurfaceFormat>,
    pub present_modes: Vec<PresentMode>,
}

impl SurfaceSupport {
    /// At least one usable format and one present mode
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

pub(crate) fn query_surface_support(
    surface_loader: &ash::khr::surface::Instance,
    physical_device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
) -> Result<SurfaceSupport> {
    unsafe {
        let capabilities = surface_loader
            .get_physical_device_surface_capabilities(physical_device, surface)
            .map_err(|e| engine_err!("kestrel::vulkan", "Failed to get surface capabilities: {:?}", e))?;

        let formats = surface_loader
            .get_physical_device_surface_formats(physical_device, surface)
            .map_err(|e| engine_err!("kestrel::vulkan", "Failed to query surface formats: {:?}", e))?
            .into_iter()
            .filter_map(|f| {
                vk_format_to_texture_format(f.format).map(|format| SurfaceFormat {
                    format,
                    color_space: color_space_from_vk(f.color_space),
                })
            })
            .collect();

        let present_modes = surface_loader
            .get_physical_device_surface_present_modes(physical_device, surface)
            .map_err(|e| engine_err!("kestrel::vulkan", "Failed to query present modes: {:?}", e))?
            .into_iter()
            .filter_map(present_mode_from_vk)
            .collect();

        Ok(SurfaceSupport { capabilities, formats, present_modes })
    }
}

pub(crate) fn capabilities_from_vk(caps: &vk::SurfaceCapabilitiesKHR) -> SurfaceCapabilities {
    let extent = |e: vk::Extent2D| Extent2D::new(e.width, e.height);
    SurfaceCapabilities {
        min_image_count: caps.min_image_count,
        max_image_count: caps.max_image_count,
        current_extent: extent(caps.current_extent),
        min_extent: extent(caps.min_image_extent),
        max_extent: extent(caps.max_image_extent),
    }
}

// ============================================================================
// Swapchain
// ============================================================================

pub struct VulkanSwapchain {
    ctx: Arc<GpuContext>,
    surface: Arc<SurfaceContext>,
    loader: ash::khr::swapchain::Device,

    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: TextureFormat,
    extent: Extent2D,
    present_mode: PresentMode,

    /// Signaled when the acquired image is ready to be rendered to
    image_available: vk::Semaphore,
    /// One per swapchain image, signaled when rendering to it has finished
    render_finished: Vec<vk::Semaphore>,

    current_image: u32,
}

impl VulkanSwapchain {
    pub(crate) fn create(
        ctx: &Arc<GpuContext>,
        surface: &Arc<SurfaceContext>,
        request: &SwapchainRequest,
    ) -> Result<Self> {
        let loader = ash::khr::swapchain::Device::new(&ctx.instance, &ctx.device);

        let image_available = unsafe {
            ctx.device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
                .map_err(|e| engine_err!("kestrel::vulkan", "Failed to create image-available semaphore: {:?}", e))?
        };

        let mut swapchain = Self {
            ctx: Arc::clone(ctx),
            surface: Arc::clone(surface),
            loader,
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            image_views: Vec::new(),
            format: TextureFormat::B8G8R8A8_SRGB,
            extent: Extent2D::default(),
            present_mode: PresentMode::Fifo,
            image_available,
            render_finished: Vec::new(),
            current_image: 0,
        };

        // on error, Drop destroys whatever was built
        swapchain.build(request)?;
        engine_info!("kestrel::vulkan", "Swapchain created: {}x{}, {} image(s), {:?}, {:?}",
            swapchain.extent.width, swapchain.extent.height, swapchain.images.len(),
            swapchain.format, swapchain.present_mode);
        Ok(swapchain)
    }

    /// View over swapchain image `index`
    pub(crate) fn image_view(&self, index: usize) -> Option<vk::ImageView> {
        self.image_views.get(index).copied()
    }

    pub(crate) fn image_available_semaphore(&self) -> vk::Semaphore {
        self.image_available
    }

    /// Render-finished semaphore for the image last acquired
    pub(crate) fn render_finished_semaphore(&self) -> Result<vk::Semaphore> {
        self.render_finished
            .get(self.current_image as usize)
            .copied()
            .ok_or_else(|| engine_err!("kestrel::vulkan",
                "No render-finished semaphore for image {}", self.current_image))
    }

    /// Create the native swapchain, replacing the current one if any
    fn build(&mut self, request: &SwapchainRequest) -> Result<()> {
        let support = query_surface_support(
            &self.surface.surface_loader,
            self.ctx.physical_device,
            self.surface.surface,
        )?;

        let surface_format = choose_surface_format(&support.formats)?;
        let present_mode = choose_present_mode(&support.present_modes, request.vsync);
        let capabilities = capabilities_from_vk(&support.capabilities);
        let extent = choose_extent(&capabilities, Extent2D::new(request.width, request.height));
        let image_count = choose_image_count(&capabilities);

        if extent.is_empty() {
            engine_error!("kestrel::vulkan", "Cannot build a swapchain with empty extent {}x{}",
                extent.width, extent.height);
            return Err(Error::InvalidResource("swapchain extent is zero".to_string()));
        }

        let queue_families = [self.ctx.graphics_queue_family, self.surface.present_queue_family];
        let old_swapchain = self.swapchain;

        let mut create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface.surface)
            .min_image_count(image_count)
            .image_format(texture_format_to_vk(surface_format.format))
            .image_color_space(color_space_to_vk(surface_format.color_space))
            .image_extent(vk::Extent2D { width: extent.width, height: extent.height })
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode_to_vk(present_mode))
            .clipped(true)
            .old_swapchain(old_swapchain);

        create_info = if queue_families[0] != queue_families[1] {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&queue_families)
        } else {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        };

        unsafe {
            let swapchain = self.loader.create_swapchain(&create_info, None)
                .map_err(|e| vk_error("vkCreateSwapchainKHR", e))?;

            self.destroy_views();
            if old_swapchain != vk::SwapchainKHR::null() {
                self.loader.destroy_swapchain(old_swapchain, None);
            }
            self.swapchain = swapchain;

            self.images = self.loader.get_swapchain_images(swapchain)
                .map_err(|e| engine_err!("kestrel::vulkan", "Failed to get swapchain images: {:?}", e))?;

            let vk_format = texture_format_to_vk(surface_format.format);
            for &image in &self.images {
                let view_info = vk::ImageViewCreateInfo::default()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(vk_format)
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    });
                let view = self.ctx.device.create_image_view(&view_info, None)
                    .map_err(|e| engine_err!("kestrel::vulkan", "Failed to create swapchain image view: {:?}", e))?;
                self.image_views.push(view);
            }

            while self.render_finished.len() < self.images.len() {
                let semaphore = self.ctx.device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
                    .map_err(|e| engine_err!("kestrel::vulkan", "Failed to create render-finished semaphore: {:?}", e))?;
                self.render_finished.push(semaphore);
            }
            for semaphore in self.render_finished.drain(self.images.len()..) {
                self.ctx.device.destroy_semaphore(semaphore, None);
            }
        }

        self.format = surface_format.format;
        self.extent = extent;
        self.present_mode = present_mode;
        self.current_image = 0;
        Ok(())
    }

    fn destroy_views(&mut self) {
        for view in self.image_views.drain(..) {
            unsafe { self.ctx.device.destroy_image_view(view, None) };
        }
    }
}

impl Swapchain for VulkanSwapchain {
    fn acquire_next_image(&mut self) -> Result<AcquireOutcome> {
        let result = unsafe {
            self.loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                self.image_available,
                vk::Fence::null(),
            )
        };

        match result {
            Ok((image_index, suboptimal)) => {
                self.current_image = image_index;
                engine_trace!("kestrel::vulkan", "Acquired swapchain image {}", image_index);
                Ok(AcquireOutcome::Acquired { image_index, suboptimal })
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                engine_debug!("kestrel::vulkan", "Swapchain out of date on acquire");
                Ok(AcquireOutcome::OutOfDate)
            }
            Err(e) => Err(vk_error("vkAcquireNextImageKHR", e)),
        }
    }

    fn present(&mut self, image_index: u32) -> Result<PresentOutcome> {
        let wait_semaphores = [*self.render_finished.get(image_index as usize).ok_or_else(|| {
            engine_err!("kestrel::vulkan", "Present of unknown swapchain image {}", image_index)
        })?];
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe { self.loader.queue_present(self.surface.present_queue, &present_info) } {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(e) => Err(vk_error("vkQueuePresentKHR", e)),
        }
    }

    fn recreate(&mut self, request: &SwapchainRequest) -> Result<()> {
        if request.width == 0 || request.height == 0 {
            engine_warn!("kestrel::vulkan", "Skipping swapchain recreation for {}x{} window",
                request.width, request.height);
            return Ok(());
        }

        self.build(request)?;
        engine_info!("kestrel::vulkan", "Swapchain recreated: {}x{}, {} image(s), {:?}",
            self.extent.width, self.extent.height, self.images.len(), self.present_mode);
        Ok(())
    }

    fn image_count(&self) -> usize {
        self.images.len()
    }

    fn extent(&self) -> Extent2D {
        self.extent
    }

    fn format(&self) -> TextureFormat {
        self.format
    }

    fn present_mode(&self) -> PresentMode {
        self.present_mode
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanSwapchain {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.device_wait_idle().ok();

            self.destroy_views();
            for semaphore in self.render_finished.drain(..) {
                self.ctx.device.destroy_semaphore(semaphore, None);
            }
            self.ctx.device.destroy_semaphore(self.image_available, None);
            if self.swapchain != vk::SwapchainKHR::null() {
                self.loader.destroy_swapchain(self.swapchain, None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_from_vk() {
        let caps = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            current_extent: vk::Extent2D { width: u32::MAX, height: u32::MAX },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D { width: 4096, height: 4096 },
            ..Default::default()
        };
        let converted = capabilities_from_vk(&caps);
        assert_eq!(converted.min_image_count, 2);
        assert_eq!(converted.max_image_count, 0);
        assert_eq!(converted.current_extent.width, u32::MAX);
        assert_eq!(converted.max_extent, Extent2D::new(4096, 4096));
        assert_eq!(choose_image_count(&converted), 3);
    }

    #[test]
    fn test_surface_support_adequacy() {
        let empty = SurfaceSupport {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: Vec::new(),
            present_modes: vec![PresentMode::Fifo],
        };
        assert!(!empty.is_adequate());
    }
}
