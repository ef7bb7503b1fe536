/// Perspective camera component and the per-frame data derived from it
///
/// The component caches its view and projection matrices and recomputes
/// them only when the FOV, clip planes, aspect ratio or the owning
/// transform changed since the last `update`.

use std::sync::Arc;
use glam::{Mat4, Vec3};
use crate::graphics_device::AttachmentTexture;
use crate::resource::{CameraUniformData, SHADOW_CASCADE_COUNT};
use crate::scene::Transform;

/// Blend between logarithmic and uniform splits used by default
pub const DEFAULT_CASCADE_LAMBDA: f32 = 0.95;

#[derive(Clone)]
pub struct CameraComponent {
    /// Vertical field of view in degrees
    fov: f32,
    near: f32,
    far: f32,
    aspect: f32,
    view: Mat4,
    projection: Mat4,
    /// Projection inputs changed since the last update
    is_changed: bool,
    pub is_enabled: bool,
    pub ssao_enabled: bool,
    /// Render into this attachment instead of the swapchain
    pub target_texture: Option<Arc<dyn AttachmentTexture>>,
    last_pose: Option<(Vec3, Vec3)>,
}

impl Default for CameraComponent {
    fn default() -> Self {
        Self {
            fov: 60.0,
            near: 0.1,
            far: 1000.0,
            aspect: 1.0,
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            is_changed: true,
            is_enabled: true,
            ssao_enabled: false,
            target_texture: None,
            last_pose: None,
        }
    }
}

impl CameraComponent {
    pub fn new(fov: f32, near: f32, far: f32) -> Self {
        Self { fov, near, far, ..Self::default() }
    }

    pub fn fov(&self) -> f32 {
        self.fov
    }

    pub fn near(&self) -> f32 {
        self.near
    }

    pub fn far(&self) -> f32 {
        self.far
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn view(&self) -> Mat4 {
        self.view
    }

    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    pub fn is_changed(&self) -> bool {
        self.is_changed
    }

    pub fn set_fov(&mut self, fov: f32) {
        self.fov = fov;
        self.is_changed = true;
    }

    pub fn set_clip_planes(&mut self, near: f32, far: f32) {
        self.near = near;
        self.far = far;
        self.is_changed = true;
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        if self.aspect != aspect {
            self.aspect = aspect;
            self.is_changed = true;
        }
    }

    /// Right-handed perspective with Y flipped for Vulkan clip space
    pub fn update_projection(&mut self) {
        let mut projection = Mat4::perspective_rh(self.fov.to_radians(), self.aspect, self.near, self.far);
        projection.y_axis.y *= -1.0;
        self.projection = projection;
    }

    pub fn update_view(&mut self, transform: &Transform) {
        self.view = Mat4::look_to_rh(transform.position(), transform.forward(), transform.up());
    }

    /// Recompute whatever is stale. Returns `true` if anything was recomputed.
    pub fn update(&mut self, transform: &Transform) -> bool {
        let pose = (transform.position(), transform.rotation());
        let moved = self.last_pose != Some(pose);

        if self.is_changed {
            self.update_projection();
        }
        if moved {
            self.update_view(transform);
            self.last_pose = Some(pose);
        }

        let recomputed = self.is_changed || moved;
        self.is_changed = false;
        recomputed
    }

    pub fn to_camera_data(&self, transform: &Transform) -> CameraData {
        CameraData {
            view: self.view,
            projection: self.projection,
            position: transform.position(),
            near: self.near,
            far: self.far,
            cascade_splits: compute_cascade_splits(self.near, self.far, DEFAULT_CASCADE_LAMBDA),
            ssao_enabled: self.ssao_enabled,
        }
    }
}

/// Far distance of each shadow cascade
///
/// `lambda` blends the logarithmic split (1.0) with the uniform split (0.0).
/// The last split is always `far`.
pub fn compute_cascade_splits(near: f32, far: f32, lambda: f32) -> [f32; SHADOW_CASCADE_COUNT] {
    let mut splits = [0.0; SHADOW_CASCADE_COUNT];
    let ratio = far / near;
    for (i, split) in splits.iter_mut().enumerate() {
        let p = (i + 1) as f32 / SHADOW_CASCADE_COUNT as f32;
        let log = near * ratio.powf(p);
        let uniform = near + (far - near) * p;
        *split = lambda * log + (1.0 - lambda) * uniform;
    }
    splits
}

/// Camera state pushed to the renderer once per frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraData {
    pub view: Mat4,
    pub projection: Mat4,
    pub position: Vec3,
    pub near: f32,
    pub far: f32,
    pub cascade_splits: [f32; SHADOW_CASCADE_COUNT],
    pub ssao_enabled: bool,
}

impl Default for CameraData {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            position: Vec3::ZERO,
            near: 0.1,
            far: 1000.0,
            cascade_splits: compute_cascade_splits(0.1, 1000.0, DEFAULT_CASCADE_LAMBDA),
            ssao_enabled: false,
        }
    }
}

impl CameraData {
    pub fn to_uniform(&self) -> CameraUniformData {
        CameraUniformData {
            view: self.view.to_cols_array_2d(),
            projection: self.projection.to_cols_array_2d(),
            inv_projection: self.projection.inverse().to_cols_array_2d(),
            position: self.position.to_array(),
            near: self.near,
            far: self.far,
            _pad0: [0.0; 3],
            cascade_splits: self.cascade_splits,
            ssao_enabled: self.ssao_enabled as u32,
            _pad1: [0; 3],
        }
    }
}

#[cfg(test)]
#[path = "camera_tests.rs"]
mod tests;
