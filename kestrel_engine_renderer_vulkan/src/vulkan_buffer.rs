/// VulkanBuffer - Vulkan implementation of the Buffer trait

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use kestrel_engine::kestrel::render::{check_buffer_range, Buffer, BufferDesc, BufferKind};
use kestrel_engine::kestrel::{Error, Result};
use kestrel_engine::{engine_bail, engine_err, engine_error, engine_trace, engine_violation};
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::vulkan_context::GpuContext;
use crate::vulkan_format::buffer_kind_to_vk;
use crate::vulkan_upload::{copy_buffer, StagingBuffer};

/// Vulkan buffer plus its allocation
pub struct VulkanBuffer {
    ctx: Arc<GpuContext>,
    pub(crate) buffer: vk::Buffer,
    allocation: Mutex<Option<Allocation>>,
    kind: BufferKind,
    size: u64,
    allocated: AtomicBool,
}

impl VulkanBuffer {
    /// Create a buffer for `desc`
    ///
    /// Vertex and index buffers live in device-local memory and are filled
    /// through a staging copy; uniform buffers are persistently mapped.
    pub(crate) fn create(ctx: &Arc<GpuContext>, desc: &BufferDesc) -> Result<Self> {
        if desc.size == 0 {
            engine_bail!("kestrel::vulkan", "Cannot create a zero-sized {:?} buffer", desc.kind);
        }
        if desc.kind.uses_staging() && desc.data.is_none() {
            return Err(engine_violation!("kestrel::vulkan",
                "{:?} buffer requires initial data", desc.kind));
        }
        if let Some(data) = &desc.data {
            if !check_buffer_range(desc.size, 0, data.len()) {
                return Err(engine_violation!("kestrel::vulkan",
                    "Initial data ({} bytes) exceeds buffer size {}", data.len(), desc.size));
            }
        }

        let (usage, location) = buffer_kind_to_vk(desc.kind);

        let vk_buffer = unsafe {
            let create_info = vk::BufferCreateInfo::default()
                .size(desc.size)
                .usage(usage)
                .sharing_mode(vk::SharingMode::EXCLUSIVE);

            ctx.device.create_buffer(&create_info, None)
                .map_err(|e| engine_err!("kestrel::vulkan", "Failed to create buffer of size {} bytes: {:?}", desc.size, e))?
        };

        let requirements = unsafe { ctx.device.get_buffer_memory_requirements(vk_buffer) };
        let allocation = ctx.lock_allocator()?.allocate(&AllocationCreateDesc {
            name: "buffer",
            requirements,
            location,
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(_) => {
                unsafe { ctx.device.destroy_buffer(vk_buffer, None) };
                let size_mb = requirements.size as f64 / (1024.0 * 1024.0);
                engine_error!("kestrel::vulkan", "Out of GPU memory for {:?} buffer (required: {:.2} MB)", desc.kind, size_mb);
                return Err(Error::OutOfMemory);
            }
        };

        let (memory, offset) = (unsafe { allocation.memory() }, allocation.offset());
        // from here on, dropping `buffer` frees the allocation and the handle
        let buffer = Self {
            ctx: Arc::clone(ctx),
            buffer: vk_buffer,
            allocation: Mutex::new(Some(allocation)),
            kind: desc.kind,
            size: desc.size,
            allocated: AtomicBool::new(true),
        };

        unsafe {
            ctx.device.bind_buffer_memory(vk_buffer, memory, offset)
                .map_err(|e| engine_err!("kestrel::vulkan", "Failed to bind buffer memory: {:?}", e))?;
        }

        if let Some(data) = &desc.data {
            if desc.kind.uses_staging() {
                let staging = StagingBuffer::new(ctx, data)?;
                copy_buffer(ctx, staging.buffer, buffer.buffer, data.len() as u64)?;
            } else {
                buffer.update(0, data)?;
            }
        }

        engine_trace!("kestrel::vulkan", "Created {:?} buffer ({} bytes)", desc.kind, desc.size);
        Ok(buffer)
    }

    fn lock_allocation(&self) -> Result<std::sync::MutexGuard<'_, Option<Allocation>>> {
        self.allocation
            .lock()
            .map_err(|_| engine_err!("kestrel::vulkan", "Buffer allocation lock poisoned"))
    }
}

impl Buffer for VulkanBuffer {
    fn kind(&self) -> BufferKind {
        self.kind
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn is_allocated(&self) -> bool {
        self.allocated.load(Ordering::Acquire)
    }

    fn update(&self, offset: u64, data: &[u8]) -> Result<()> {
        if !check_buffer_range(self.size, offset, data.len()) {
            return Err(engine_violation!("kestrel::vulkan",
                "Buffer update out of range: offset {} + {} bytes > size {}", offset, data.len(), self.size));
        }

        let guard = self.lock_allocation()?;
        let Some(allocation) = guard.as_ref() else {
            engine_error!("kestrel::vulkan", "Buffer update failed: buffer was released");
            return Err(Error::InvalidResource("Buffer has no allocation".to_string()));
        };

        let mapped_ptr = allocation
            .mapped_ptr()
            .ok_or_else(|| engine_violation!("kestrel::vulkan",
                "{:?} buffer is not host visible", self.kind))?
            .as_ptr() as *mut u8;

        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), mapped_ptr.add(offset as usize), data.len());
        }
        Ok(())
    }

    fn release(&self) -> bool {
        if !self.allocated.swap(false, Ordering::AcqRel) {
            return false;
        }

        let allocation = self.allocation.lock().ok().and_then(|mut a| a.take());
        unsafe {
            if let Some(allocation) = allocation {
                if let Ok(mut allocator) = self.ctx.allocator.lock() {
                    allocator.free(allocation).ok();
                }
            }
            self.ctx.device.destroy_buffer(self.buffer, None);
        }
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanBuffer {
    fn drop(&mut self) {
        self.release();
    }
}
