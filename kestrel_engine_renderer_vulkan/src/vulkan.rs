/// VulkanGraphicsDevice - Vulkan implementation of the GraphicsDevice trait
///
/// Owns the instance, the surface, the logical device and the allocator.
/// Every resource it creates keeps an `Arc<GpuContext>` (or a device clone)
/// and destroys its own handles; the device itself is torn down last.

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use kestrel_engine::kestrel::render::{
    find_queue_families, find_supported_format, max_usable_sample_count, pick_physical_device,
    AttachmentTexture, AttachmentTextureDesc, BindingResource, Buffer, BufferDesc, CommandList,
    DescriptorBinding, DescriptorSet, DeviceInfo, Framebuffer, FramebufferDesc, GraphicsDevice,
    NativeDescriptorLayout, PhysicalDeviceInfo, Pipeline, PipelineDesc, QueueFamilyInfo,
    RenderPass, RenderPassDesc, Shader, ShaderDesc, Swapchain, SwapchainRequest, Texture,
    TextureDesc, TextureFormat, DEPTH_FORMAT_CANDIDATES,
};
use kestrel_engine::kestrel::{Error, Result};
use kestrel_engine::{engine_debug, engine_err, engine_error, engine_info, engine_warn};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::ffi::{CStr, CString};
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex};

use crate::debug::{cleanup_debug_config, init_debug_config, vulkan_debug_callback, DebugSeverity};
use crate::vulkan_buffer::VulkanBuffer;
use crate::vulkan_command_list::VulkanCommandList;
use crate::vulkan_context::{GpuContext, SurfaceContext};
use crate::vulkan_descriptor_set::{VulkanDescriptorLayout, VulkanDescriptorSet};
use crate::vulkan_format::{
    physical_device_type_from_vk, sample_count_flags_from_vk, texture_format_to_vk, vk_error,
};
use crate::vulkan_frame_buffer::VulkanFramebuffer;
use crate::vulkan_pipeline::VulkanPipeline;
use crate::vulkan_render_pass::VulkanRenderPass;
use crate::vulkan_shader::VulkanShader;
use crate::vulkan_swapchain::{query_surface_support, VulkanSwapchain};
use crate::vulkan_texture::{VulkanAttachmentTexture, VulkanTexture};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Device creation options
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Reported to the driver in the application info
    pub app_name: String,
    /// Request the Khronos validation layer and install the debug messenger
    pub enable_validation: bool,
    /// Device extensions required on top of `VK_KHR_swapchain`
    pub required_extensions: Vec<String>,
    pub debug_severity: DebugSeverity,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            app_name: "Kestrel Application".to_string(),
            enable_validation: cfg!(feature = "vulkan-validation"),
            required_extensions: Vec::new(),
            debug_severity: DebugSeverity::default(),
        }
    }
}

impl DeviceConfig {
    /// Swapchain extension followed by the configured ones, without duplicates
    pub fn device_extensions(&self) -> Vec<String> {
        let swapchain = ash::khr::swapchain::NAME.to_string_lossy().into_owned();
        let mut extensions = vec![swapchain];
        for extension in &self.required_extensions {
            if !extensions.contains(extension) {
                extensions.push(extension.clone());
            }
        }
        extensions
    }
}

/// Run `submit`; when it fails, run `resignal` (an empty batch carrying
/// the in-flight fence) so the fence signals once earlier work completes
fn submit_or_resignal(
    submit: impl FnOnce() -> std::result::Result<(), vk::Result>,
    resignal: impl FnOnce() -> std::result::Result<(), vk::Result>,
) -> Result<()> {
    submit().map_err(|e| {
        if let Err(resignal_error) = resignal() {
            engine_error!("kestrel::vulkan", "Failed to re-signal the in-flight fence: {:?}", resignal_error);
        }
        vk_error("vkQueueSubmit", e)
    })
}

fn init_failed(what: &str, detail: impl std::fmt::Debug) -> Error {
    engine_error!("kestrel::vulkan", "{}: {:?}", what, detail);
    Error::InitializationFailed(format!("{}: {:?}", what, detail))
}

/// Vulkan device implementation
pub struct VulkanGraphicsDevice {
    /// Keeps the Vulkan library loaded
    _entry: ash::Entry,
    ctx: Arc<GpuContext>,
    surface: Arc<SurfaceContext>,
    debug_messenger: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    /// Signaled when the last submitted frame has finished (created signaled)
    in_flight_fence: vk::Fence,
    info: DeviceInfo,
}

/// Handles created so far by `VulkanGraphicsDevice::new`
///
/// Destroyed in reverse creation order when construction fails part way.
#[derive(Default)]
struct PendingHandles {
    instance: Option<ash::Instance>,
    debug_messenger: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    surface: Option<(ash::khr::surface::Instance, vk::SurfaceKHR)>,
    device: Option<ash::Device>,
    fence: Option<vk::Fence>,
    upload_command_pool: Option<vk::CommandPool>,
}

impl PendingHandles {
    fn disarm(&mut self) {
        self.upload_command_pool = None;
        self.fence = None;
        self.device = None;
        self.surface = None;
        self.debug_messenger = None;
        self.instance = None;
    }

    fn is_empty(&self) -> bool {
        self.instance.is_none()
            && self.debug_messenger.is_none()
            && self.surface.is_none()
            && self.device.is_none()
            && self.fence.is_none()
            && self.upload_command_pool.is_none()
    }
}

impl Drop for PendingHandles {
    fn drop(&mut self) {
        if self.is_empty() {
            return;
        }
        engine_debug!("kestrel::vulkan", "Device creation failed, destroying partially created handles");
        unsafe {
            if let Some(device) = self.device.take() {
                if let Some(pool) = self.upload_command_pool.take() {
                    device.destroy_command_pool(pool, None);
                }
                if let Some(fence) = self.fence.take() {
                    device.destroy_fence(fence, None);
                }
                device.destroy_device(None);
            }
            if let Some((surface_loader, surface)) = self.surface.take() {
                surface_loader.destroy_surface(surface, None);
            }
            if let Some((debug_utils, messenger)) = self.debug_messenger.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
                cleanup_debug_config();
            }
            if let Some(instance) = self.instance.take() {
                instance.destroy_instance(None);
            }
        }
    }
}

impl VulkanGraphicsDevice {
    /// Create a device able to render and present to `window`
    pub fn new<W: HasDisplayHandle + HasWindowHandle>(window: &W, config: DeviceConfig) -> Result<Self> {
        unsafe {
            let entry = ash::Entry::load()
                .map_err(|e| init_failed("Failed to load Vulkan library", e))?;

            let enable_validation = config.enable_validation && Self::check_validation_layer_support(&entry);

            let app_name = CString::new(config.app_name.as_str())
                .map_err(|e| init_failed("Invalid application name", e))?;
            let app_info = vk::ApplicationInfo::default()
                .application_name(&app_name)
                .application_version(vk::make_api_version(0, 1, 0, 0))
                .engine_name(c"Kestrel")
                .engine_version(vk::make_api_version(0, 0, 1, 0))
                .api_version(vk::API_VERSION_1_3);

            let display_handle = window.display_handle()
                .map_err(|e| init_failed("Failed to get display handle", e))?;
            let mut extension_names = ash_window::enumerate_required_extensions(display_handle.as_raw())
                .map_err(|e| init_failed("Failed to get required instance extensions", e))?
                .to_vec();
            if enable_validation {
                extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
            }

            let layer_names = if enable_validation {
                vec![VALIDATION_LAYER.as_ptr()]
            } else {
                vec![]
            };

            let create_info = vk::InstanceCreateInfo::default()
                .application_info(&app_info)
                .enabled_layer_names(&layer_names)
                .enabled_extension_names(&extension_names);

            let instance = entry.create_instance(&create_info, None)
                .map_err(|e| init_failed("Failed to create Vulkan instance", e))?;
            let mut pending = PendingHandles::default();
            pending.instance = Some(instance.clone());

            let debug_messenger = if enable_validation {
                let debug_utils = ash::ext::debug_utils::Instance::new(&entry, &instance);
                init_debug_config(config.debug_severity);

                let debug_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
                    .message_severity(config.debug_severity.message_severity_flags())
                    .message_type(
                        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
                    )
                    .pfn_user_callback(Some(vulkan_debug_callback));

                let messenger = debug_utils.create_debug_utils_messenger(&debug_info, None)
                    .map_err(|e| {
                        cleanup_debug_config();
                        init_failed("Failed to create debug messenger", e)
                    })?;
                pending.debug_messenger = Some((debug_utils.clone(), messenger));
                Some((debug_utils, messenger))
            } else {
                None
            };

            let window_handle = window.window_handle()
                .map_err(|e| init_failed("Failed to get window handle", e))?;
            let surface = ash_window::create_surface(
                &entry,
                &instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
            .map_err(|e| init_failed("Failed to create surface", e))?;
            let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);
            pending.surface = Some((surface_loader.clone(), surface));

            // Physical device selection
            let physical_devices = instance.enumerate_physical_devices()
                .map_err(|e| init_failed("Failed to enumerate physical devices", e))?;

            let candidates: Vec<PhysicalDeviceInfo> = physical_devices
                .iter()
                .map(|&pd| Self::describe_physical_device(&instance, &surface_loader, surface, pd))
                .collect();
            for candidate in &candidates {
                engine_debug!("kestrel::vulkan", "Found GPU '{}' ({:?})", candidate.name, candidate.device_type);
            }

            let device_extensions = config.device_extensions();
            let required: Vec<&str> = device_extensions.iter().map(String::as_str).collect();
            let selected = pick_physical_device(&candidates, &required)?;
            let physical_device = physical_devices[selected];
            let selected_info = &candidates[selected];

            let families = find_queue_families(selected_info);
            let (graphics_family, present_family) = match (families.graphics, families.present) {
                (Some(graphics), Some(present)) => (graphics, present),
                _ => return Err(init_failed("Selected GPU has no graphics/present queue", families)),
            };

            // Logical device
            let queue_priorities = [1.0];
            let mut queue_create_infos = vec![vk::DeviceQueueCreateInfo::default()
                .queue_family_index(graphics_family)
                .queue_priorities(&queue_priorities)];
            if present_family != graphics_family {
                queue_create_infos.push(vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(present_family)
                    .queue_priorities(&queue_priorities));
            }

            let extension_cstrings = device_extensions
                .iter()
                .map(|name| CString::new(name.as_str()))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| init_failed("Invalid device extension name", e))?;
            let device_extension_names: Vec<*const std::ffi::c_char> =
                extension_cstrings.iter().map(|name| name.as_ptr()).collect();

            let device_features = vk::PhysicalDeviceFeatures::default().sampler_anisotropy(true);

            let device_create_info = vk::DeviceCreateInfo::default()
                .queue_create_infos(&queue_create_infos)
                .enabled_extension_names(&device_extension_names)
                .enabled_features(&device_features);

            let device = instance.create_device(physical_device, &device_create_info, None)
                .map_err(|e| init_failed("Failed to create logical device", e))?;
            pending.device = Some(device.clone());

            let graphics_queue = device.get_device_queue(graphics_family, 0);
            let present_queue = device.get_device_queue(present_family, 0);

            let fence_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);
            let in_flight_fence = device.create_fence(&fence_info, None)
                .map_err(|e| init_failed("Failed to create in-flight fence", e))?;
            pending.fence = Some(in_flight_fence);

            let upload_pool_info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(graphics_family)
                .flags(vk::CommandPoolCreateFlags::TRANSIENT | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
            let upload_command_pool = device.create_command_pool(&upload_pool_info, None)
                .map_err(|e| init_failed("Failed to create upload command pool", e))?;
            pending.upload_command_pool = Some(upload_command_pool);

            let allocator = Allocator::new(&AllocatorCreateDesc {
                instance: instance.clone(),
                device: device.clone(),
                physical_device,
                debug_settings: Default::default(),
                buffer_device_address: false,
                allocation_sizes: Default::default(),
            })
            .map_err(|e| init_failed("Failed to create GPU allocator", e))?;

            // nothing below can fail; ownership moves to the device
            pending.disarm();

            let info = DeviceInfo {
                name: selected_info.name.clone(),
                device_type: selected_info.device_type,
                max_samples: max_usable_sample_count(
                    selected_info.color_sample_counts,
                    selected_info.depth_sample_counts,
                ),
                max_anisotropy: selected_info.max_sampler_anisotropy,
            };

            let ctx = Arc::new(GpuContext::new(
                device,
                instance,
                physical_device,
                Arc::new(Mutex::new(allocator)),
                graphics_queue,
                graphics_family,
                upload_command_pool,
                selected_info.max_sampler_anisotropy,
            ));

            let surface = Arc::new(SurfaceContext {
                surface_loader,
                surface,
                present_queue,
                present_queue_family: present_family,
            });

            engine_info!("kestrel::vulkan", "Vulkan device ready: '{}', graphics family {}, present family {}, max {:?}, validation {}",
                info.name, graphics_family, present_family, info.max_samples,
                if enable_validation { "on" } else { "off" });

            Ok(Self {
                _entry: entry,
                ctx,
                surface,
                debug_messenger,
                in_flight_fence,
                info,
            })
        }
    }

    fn check_validation_layer_support(entry: &ash::Entry) -> bool {
        let layers = unsafe { entry.enumerate_instance_layer_properties() }.unwrap_or_default();
        let available = layers
            .iter()
            .any(|layer| layer.layer_name_as_c_str().is_ok_and(|name| name == VALIDATION_LAYER));
        if !available {
            engine_warn!("kestrel::vulkan", "Validation requested but {:?} is not installed; continuing without it",
                VALIDATION_LAYER);
        }
        available
    }

    /// Gather everything the selection rules look at for one adapter
    unsafe fn describe_physical_device(
        instance: &ash::Instance,
        surface_loader: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
        physical_device: vk::PhysicalDevice,
    ) -> PhysicalDeviceInfo {
        let properties = instance.get_physical_device_properties(physical_device);
        let features = instance.get_physical_device_features(physical_device);

        let queue_families = instance
            .get_physical_device_queue_family_properties(physical_device)
            .iter()
            .enumerate()
            .map(|(index, family)| QueueFamilyInfo {
                supports_graphics: family.queue_flags.contains(vk::QueueFlags::GRAPHICS),
                supports_present: surface_loader
                    .get_physical_device_surface_support(physical_device, index as u32, surface)
                    .unwrap_or(false),
                queue_count: family.queue_count,
            })
            .collect();

        let supported_extensions = instance
            .enumerate_device_extension_properties(physical_device)
            .unwrap_or_default()
            .iter()
            .filter_map(|ext| ext.extension_name_as_c_str().ok())
            .map(|name| name.to_string_lossy().into_owned())
            .collect();

        let swapchain_adequate = query_surface_support(surface_loader, physical_device, surface)
            .map(|support| support.is_adequate())
            .unwrap_or(false);

        let name = properties
            .device_name_as_c_str()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "Unknown GPU".to_string());

        PhysicalDeviceInfo {
            name,
            device_type: physical_device_type_from_vk(properties.device_type),
            queue_families,
            supported_extensions,
            swapchain_adequate,
            sampler_anisotropy: features.sampler_anisotropy == vk::TRUE,
            max_sampler_anisotropy: properties.limits.max_sampler_anisotropy,
            max_image_dimension_2d: properties.limits.max_image_dimension2_d,
            color_sample_counts: sample_count_flags_from_vk(properties.limits.framebuffer_color_sample_counts),
            depth_sample_counts: sample_count_flags_from_vk(properties.limits.framebuffer_depth_sample_counts),
        }
    }
}

impl GraphicsDevice for VulkanGraphicsDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn create_buffer(&self, desc: BufferDesc) -> Result<Arc<dyn Buffer>> {
        Ok(Arc::new(VulkanBuffer::create(&self.ctx, &desc)?))
    }

    fn create_texture(&self, desc: TextureDesc) -> Result<Arc<dyn Texture>> {
        Ok(Arc::new(VulkanTexture::create(&self.ctx, &desc)?))
    }

    fn create_attachment_texture(&self, desc: &AttachmentTextureDesc) -> Result<Arc<dyn AttachmentTexture>> {
        Ok(Arc::new(VulkanAttachmentTexture::create(&self.ctx, desc)?))
    }

    fn create_shader(&self, desc: ShaderDesc) -> Result<Arc<dyn Shader>> {
        Ok(Arc::new(VulkanShader::create(&self.ctx.device, &desc)?))
    }

    fn create_descriptor_layout(
        &self,
        bindings: &[DescriptorBinding],
    ) -> Result<Arc<dyn NativeDescriptorLayout>> {
        Ok(Arc::new(VulkanDescriptorLayout::create(&self.ctx.device, bindings)?))
    }

    fn create_descriptor_set(
        &self,
        layout: &dyn NativeDescriptorLayout,
        bindings: &[DescriptorBinding],
        resources: &[BindingResource<'_>],
    ) -> Result<Arc<dyn DescriptorSet>> {
        let vk_layout = layout
            .as_any()
            .downcast_ref::<VulkanDescriptorLayout>()
            .ok_or_else(|| {
                engine_error!("kestrel::vulkan", "Descriptor layout is not a Vulkan layout");
                Error::InvalidResource("foreign descriptor layout handle".to_string())
            })?;
        Ok(Arc::new(VulkanDescriptorSet::create(&self.ctx.device, vk_layout, bindings, resources)?))
    }

    fn create_render_pass(&self, desc: &RenderPassDesc) -> Result<Arc<dyn RenderPass>> {
        Ok(Arc::new(VulkanRenderPass::create(&self.ctx.device, desc)?))
    }

    fn create_pipeline(
        &self,
        desc: &PipelineDesc<'_>,
        render_pass: &dyn RenderPass,
    ) -> Result<Arc<dyn Pipeline>> {
        Ok(Arc::new(VulkanPipeline::create(&self.ctx.device, desc, render_pass)?))
    }

    fn create_framebuffer(&self, desc: &FramebufferDesc<'_>) -> Result<Arc<dyn Framebuffer>> {
        Ok(Arc::new(VulkanFramebuffer::create(&self.ctx.device, desc)?))
    }

    fn create_swapchain(&self, request: &SwapchainRequest) -> Result<Box<dyn Swapchain>> {
        Ok(Box::new(VulkanSwapchain::create(&self.ctx, &self.surface, request)?))
    }

    fn create_command_list(&self) -> Result<Box<dyn CommandList>> {
        Ok(Box::new(VulkanCommandList::create(&self.ctx.device, self.ctx.graphics_queue_family)?))
    }

    fn find_depth_format(&self) -> Result<TextureFormat> {
        find_supported_format(&DEPTH_FORMAT_CANDIDATES, |format| {
            let properties = unsafe {
                self.ctx.instance.get_physical_device_format_properties(
                    self.ctx.physical_device,
                    texture_format_to_vk(format),
                )
            };
            properties
                .optimal_tiling_features
                .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
        })
    }

    fn wait_for_frame(&self) -> Result<()> {
        unsafe {
            self.ctx.device
                .wait_for_fences(&[self.in_flight_fence], true, u64::MAX)
                .map_err(|e| vk_error("vkWaitForFences", e))
        }
    }

    fn submit_frame(&self, commands: &dyn CommandList, swapchain: &dyn Swapchain) -> Result<()> {
        let vk_commands = commands
            .as_any()
            .downcast_ref::<VulkanCommandList>()
            .ok_or_else(|| {
                engine_error!("kestrel::vulkan", "Command list is not a Vulkan command list");
                Error::InvalidResource("foreign command list handle".to_string())
            })?;
        let vk_swapchain = swapchain
            .as_any()
            .downcast_ref::<VulkanSwapchain>()
            .ok_or_else(|| {
                engine_error!("kestrel::vulkan", "Swapchain is not a Vulkan swapchain");
                Error::InvalidResource("foreign swapchain handle".to_string())
            })?;

        let wait_semaphores = [vk_swapchain.image_available_semaphore()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [vk_swapchain.render_finished_semaphore()?];
        let command_buffers = [vk_commands.command_buffer];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        // the graphics queue is shared with uploads; hold the upload lock while submitting
        let _queue_guard = self.ctx.upload_command_pool
            .lock()
            .map_err(|_| engine_err!("kestrel::vulkan", "Upload command pool lock poisoned"))?;

        unsafe {
            self.ctx.device
                .reset_fences(&[self.in_flight_fence])
                .map_err(|e| vk_error("vkResetFences", e))?;

            // the fence is already reset; a failed submit must not leave it unsignaled
            submit_or_resignal(
                || self.ctx.device.queue_submit(self.ctx.graphics_queue, &[submit_info], self.in_flight_fence),
                || self.ctx.device.queue_submit(self.ctx.graphics_queue, &[], self.in_flight_fence),
            )
        }
    }

    fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.ctx.device
                .device_wait_idle()
                .map_err(|e| vk_error("vkDeviceWaitIdle", e))
        }
    }
}

impl Drop for VulkanGraphicsDevice {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.device_wait_idle().ok();

            self.ctx.device.destroy_fence(self.in_flight_fence, None);
            {
                let mut pool = self.ctx.upload_command_pool
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                if *pool != vk::CommandPool::null() {
                    self.ctx.device.destroy_command_pool(*pool, None);
                    *pool = vk::CommandPool::null();
                }
            }

            // Allocator memory must be released before the device goes away,
            // which is only possible once no resource holds the context
            let ctx = match Arc::get_mut(&mut self.ctx) {
                Some(ctx) => ctx,
                None => {
                    engine_warn!("kestrel::vulkan",
                        "{} resource(s) outlive the graphics device; leaking the Vulkan device",
                        Arc::strong_count(&self.ctx) - 1);
                    return;
                }
            };
            ManuallyDrop::drop(&mut ctx.allocator);

            cleanup_debug_config();
            if let Some((debug_utils, messenger)) = self.debug_messenger.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            self.surface.surface_loader.destroy_surface(self.surface.surface, None);
            self.ctx.device.destroy_device(None);
            self.ctx.instance.destroy_instance(None);
            engine_debug!("kestrel::vulkan", "Vulkan device destroyed");
        }
    }
}
