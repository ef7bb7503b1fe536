/// Buffer trait and buffer descriptor

use std::any::Any;
use crate::error::Result;
use crate::graphics_device::MemoryPropertyFlags;

/// What a buffer holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    /// Vertex buffer (device local, filled through staging)
    Vertex,
    /// Index buffer (device local, filled through staging)
    Index,
    /// Uniform buffer (host visible, persistently mapped)
    Uniform,
}

impl BufferKind {
    /// Memory properties the backing allocation must have
    pub fn required_properties(self) -> MemoryPropertyFlags {
        match self {
            BufferKind::Vertex | BufferKind::Index => MemoryPropertyFlags::DEVICE_LOCAL,
            BufferKind::Uniform => {
                MemoryPropertyFlags::HOST_VISIBLE | MemoryPropertyFlags::HOST_COHERENT
            }
        }
    }

    /// Contents are uploaded through a host-visible staging buffer
    pub fn uses_staging(self) -> bool {
        !self.required_properties().contains(MemoryPropertyFlags::HOST_VISIBLE)
    }
}

/// Descriptor for creating a buffer
#[derive(Debug, Clone)]
pub struct BufferDesc {
    pub kind: BufferKind,
    /// Size in bytes
    pub size: u64,
    /// Initial contents, required for device-local kinds
    pub data: Option<Vec<u8>>,
}

/// Buffer data format for vertex attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum BufferFormat {
    R32_SFLOAT,
    R32G32_SFLOAT,
    R32G32B32_SFLOAT,
    R32G32B32A32_SFLOAT,
    R32_UINT,
}

impl BufferFormat {
    /// Size of one element in bytes
    pub fn size(self) -> u32 {
        match self {
            BufferFormat::R32_SFLOAT | BufferFormat::R32_UINT => 4,
            BufferFormat::R32G32_SFLOAT => 8,
            BufferFormat::R32G32B32_SFLOAT => 12,
            BufferFormat::R32G32B32A32_SFLOAT => 16,
        }
    }
}

/// GPU buffer with an explicit, single-shot release
///
/// `release` frees the backing memory now. It returns `true` only on the
/// call that performed the release; later calls are no-ops returning `false`.
/// Backends also release on drop when the handle is still allocated.
pub trait Buffer: Send + Sync {
    fn kind(&self) -> BufferKind;

    /// Size in bytes
    fn size(&self) -> u64;

    /// Backing memory is still held
    fn is_allocated(&self) -> bool;

    /// Write `data` at `offset`. Only valid for host-visible kinds.
    fn update(&self, offset: u64, data: &[u8]) -> Result<()>;

    /// Free the backing memory
    fn release(&self) -> bool;

    fn as_any(&self) -> &dyn Any;
}

/// Check that `offset + len` fits in a buffer of `size` bytes
pub fn check_buffer_range(size: u64, offset: u64, len: usize) -> bool {
    offset
        .checked_add(len as u64)
        .map(|end| end <= size)
        .unwrap_or(false)
}
