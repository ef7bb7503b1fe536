//! Vertex format consumed by the default mesh pipeline.

use std::mem::{offset_of, size_of};
use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use crate::graphics_device::{
    BufferFormat, VertexAttribute, VertexBinding, VertexInputRate, VertexLayout,
};

/// Index element type of every mesh
pub type Index = u32;

bitflags! {
    /// Which material maps a vertex samples
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct VertexFlags: u32 {
        const HAS_TEXTURE = 1 << 0;
        const HAS_NORMAL_MAP = 1 << 1;
        const HAS_SPECULAR_MAP = 1 << 2;
        const HAS_HEIGHT_MAP = 1 << 3;
        const HAS_ALBEDO_MAP = 1 << 4;
        const HAS_ROUGHNESS_MAP = 1 << 5;
        const HAS_METALLIC_MAP = 1 << 6;
    }
}

/// Interleaved 3D vertex, attribute locations 0..=6 in field order
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct Vertex3D {
    pub position: [f32; 3],
    pub color: [f32; 3],
    pub uv: [f32; 2],
    pub normal: [f32; 3],
    pub tangent: [f32; 3],
    pub bitangent: [f32; 3],
    /// [`VertexFlags`] bits
    pub flags: u32,
}

impl Vertex3D {
    /// Vertex with position, color and uv only
    pub fn new(position: [f32; 3], color: [f32; 3], uv: [f32; 2]) -> Self {
        Self { position, color, uv, ..Default::default() }
    }

    pub fn vertex_flags(&self) -> VertexFlags {
        VertexFlags::from_bits_truncate(self.flags)
    }

    pub fn vertex_layout() -> VertexLayout {
        let attribute = |location: u32, format: BufferFormat, offset: usize| VertexAttribute {
            location,
            binding: 0,
            format,
            offset: offset as u32,
        };

        VertexLayout {
            bindings: vec![VertexBinding {
                binding: 0,
                stride: size_of::<Vertex3D>() as u32,
                input_rate: VertexInputRate::Vertex,
            }],
            attributes: vec![
                attribute(0, BufferFormat::R32G32B32_SFLOAT, offset_of!(Vertex3D, position)),
                attribute(1, BufferFormat::R32G32B32_SFLOAT, offset_of!(Vertex3D, color)),
                attribute(2, BufferFormat::R32G32_SFLOAT, offset_of!(Vertex3D, uv)),
                attribute(3, BufferFormat::R32G32B32_SFLOAT, offset_of!(Vertex3D, normal)),
                attribute(4, BufferFormat::R32G32B32_SFLOAT, offset_of!(Vertex3D, tangent)),
                attribute(5, BufferFormat::R32G32B32_SFLOAT, offset_of!(Vertex3D, bitangent)),
                attribute(6, BufferFormat::R32_UINT, offset_of!(Vertex3D, flags)),
            ],
        }
    }
}

#[cfg(test)]
#[path = "vertex_tests.rs"]
mod tests;
