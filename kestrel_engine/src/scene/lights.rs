/// Light components and their packing into the lights uniform block

use glam::Vec3;
use crate::resource::{
    DirectLightData, LightsUniformData, PointLightData, MAX_DIRECT_LIGHTS, MAX_POINT_LIGHTS,
};
use crate::engine_warn;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectLight {
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

impl Default for DirectLight {
    fn default() -> Self {
        Self { direction: Vec3::new(0.0, -1.0, 0.0), color: Vec3::ONE, intensity: 1.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    pub position: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub radius: f32,
}

impl Default for PointLight {
    fn default() -> Self {
        Self { position: Vec3::ZERO, color: Vec3::ONE, intensity: 1.0, radius: 10.0 }
    }
}

/// Pack lights into the uniform block; lights past the block capacity are dropped
pub fn pack_lights(direct: &[DirectLight], point: &[PointLight]) -> LightsUniformData {
    if direct.len() > MAX_DIRECT_LIGHTS || point.len() > MAX_POINT_LIGHTS {
        engine_warn!("kestrel::lights",
            "{} directional / {} point lights exceed capacity {} / {}, extra lights ignored",
            direct.len(), point.len(), MAX_DIRECT_LIGHTS, MAX_POINT_LIGHTS);
    }

    let mut data = LightsUniformData::default();
    for (slot, light) in data.direct.iter_mut().zip(direct) {
        *slot = DirectLightData {
            direction: light.direction.normalize_or_zero().extend(0.0).to_array(),
            color: light.color.extend(light.intensity).to_array(),
        };
    }
    for (slot, light) in data.point.iter_mut().zip(point) {
        *slot = PointLightData {
            position: light.position.extend(light.radius).to_array(),
            color: light.color.extend(light.intensity).to_array(),
        };
    }
    data.direct_count = direct.len().min(MAX_DIRECT_LIGHTS) as u32;
    data.point_count = point.len().min(MAX_POINT_LIGHTS) as u32;
    data
}

#[cfg(test)]
#[path = "lights_tests.rs"]
mod tests;
