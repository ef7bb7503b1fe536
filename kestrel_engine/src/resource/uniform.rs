//! std140 uniform block layouts shared with the shaders.

use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4};

pub const SHADOW_CASCADE_COUNT: usize = 4;
pub const MAX_DIRECT_LIGHTS: usize = 16;
pub const MAX_POINT_LIGHTS: usize = 16;

/// Per-object matrices (binding 0)
///
/// The normal matrix is a mat3, which std140 pads to three vec4 columns.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MatricesUniformData {
    pub model: [[f32; 4]; 4],
    pub normal: [[f32; 4]; 3],
}

impl MatricesUniformData {
    pub fn new(model: Mat4, normal: Mat3) -> Self {
        let column = |i: usize| normal.col(i).extend(0.0).to_array();
        Self {
            model: model.to_cols_array_2d(),
            normal: [column(0), column(1), column(2)],
        }
    }
}

impl Default for MatricesUniformData {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, Mat3::IDENTITY)
    }
}

/// Per-frame camera block (binding 4)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CameraUniformData {
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    pub inv_projection: [[f32; 4]; 4],
    pub position: [f32; 3],
    pub near: f32,
    pub far: f32,
    pub _pad0: [f32; 3],
    pub cascade_splits: [f32; SHADOW_CASCADE_COUNT],
    pub ssao_enabled: u32,
    pub _pad1: [u32; 3],
}

/// One directional light, `color.w` holds the intensity
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct DirectLightData {
    pub direction: [f32; 4],
    pub color: [f32; 4],
}

/// One point light, `position.w` holds the radius and `color.w` the intensity
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct PointLightData {
    pub position: [f32; 4],
    pub color: [f32; 4],
}

/// Per-frame lights block (binding 5)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LightsUniformData {
    pub direct: [DirectLightData; MAX_DIRECT_LIGHTS],
    pub point: [PointLightData; MAX_POINT_LIGHTS],
    pub direct_count: u32,
    pub point_count: u32,
    pub _pad: [u32; 2],
}

impl Default for LightsUniformData {
    fn default() -> Self {
        Self::zeroed()
    }
}

#[cfg(test)]
#[path = "uniform_tests.rs"]
mod tests;
