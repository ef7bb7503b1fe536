/// Memory type selection
///
/// Bit values of [`MemoryPropertyFlags`] match the native flag layout so
/// backends can convert with `from_bits_truncate`.

use bitflags::bitflags;
use crate::error::Result;
use crate::engine_bail;

bitflags! {
    /// Properties a memory type offers
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MemoryPropertyFlags: u32 {
        const DEVICE_LOCAL = 0x1;
        const HOST_VISIBLE = 0x2;
        const HOST_COHERENT = 0x4;
        const HOST_CACHED = 0x8;
        const LAZILY_ALLOCATED = 0x10;
    }
}

/// One entry of the device's memory type table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryTypeInfo {
    pub property_flags: MemoryPropertyFlags,
    pub heap_index: u32,
}

/// Index of the first memory type allowed by `type_filter` (one bit per type
/// index, as reported by the resource's memory requirements) that has every
/// flag in `properties`.
pub fn find_memory_type(
    type_filter: u32,
    properties: MemoryPropertyFlags,
    memory_types: &[MemoryTypeInfo],
) -> Result<u32> {
    for (index, memory_type) in memory_types.iter().enumerate().take(32) {
        if type_filter & (1 << index) != 0 && memory_type.property_flags.contains(properties) {
            return Ok(index as u32);
        }
    }

    engine_bail!("kestrel::memory",
        "No memory type matches filter {:#b} with properties {:?}", type_filter, properties);
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
