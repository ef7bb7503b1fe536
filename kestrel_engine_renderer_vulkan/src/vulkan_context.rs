/// GpuContext - Shared device state for all Vulkan objects
///
/// Every buffer, texture, descriptor set and swapchain holds an `Arc` to one
/// of these so it can destroy itself without reaching back into the device.
///
/// Destruction of the device, instance and surface is done by
/// `VulkanGraphicsDevice::drop()` once every resource is gone.

use ash::vk;
use gpu_allocator::vulkan::Allocator;
use kestrel_engine::kestrel::Result;
use kestrel_engine::engine_err;
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex, MutexGuard};

/// Shared GPU context for all Vulkan resources
pub struct GpuContext {
    /// Vulkan logical device
    pub device: ash::Device,

    /// Vulkan instance (destroyed by VulkanGraphicsDevice)
    pub instance: ash::Instance,

    pub physical_device: vk::PhysicalDevice,

    /// GPU memory allocator
    /// Wrapped in ManuallyDrop so it is dropped BEFORE the device is destroyed
    pub allocator: ManuallyDrop<Arc<Mutex<Allocator>>>,

    /// Graphics queue for command submission and uploads
    pub graphics_queue: vk::Queue,
    pub graphics_queue_family: u32,

    /// Reusable pool for one-shot upload commands (TRANSIENT + RESET_COMMAND_BUFFER)
    pub upload_command_pool: Mutex<vk::CommandPool>,

    /// Largest anisotropy the device accepts
    pub max_sampler_anisotropy: f32,
}

impl GpuContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        device: ash::Device,
        instance: ash::Instance,
        physical_device: vk::PhysicalDevice,
        allocator: Arc<Mutex<Allocator>>,
        graphics_queue: vk::Queue,
        graphics_queue_family: u32,
        upload_command_pool: vk::CommandPool,
        max_sampler_anisotropy: f32,
    ) -> Self {
        Self {
            device,
            instance,
            physical_device,
            allocator: ManuallyDrop::new(allocator),
            graphics_queue,
            graphics_queue_family,
            upload_command_pool: Mutex::new(upload_command_pool),
            max_sampler_anisotropy,
        }
    }

    /// Lock the allocator, mapping a poisoned lock to a backend error
    pub fn lock_allocator(&self) -> Result<MutexGuard<'_, Allocator>> {
        self.allocator
            .lock()
            .map_err(|_| engine_err!("kestrel::vulkan", "GPU allocator lock poisoned"))
    }
}

/// Presentation surface plus the queue that presents to it
///
/// Shared between the device (which owns the surface) and every swapchain
/// built for it.
pub struct SurfaceContext {
    pub surface_loader: ash::khr::surface::Instance,
    pub surface: vk::SurfaceKHR,
    pub present_queue: vk::Queue,
    pub present_queue_family: u32,
}
