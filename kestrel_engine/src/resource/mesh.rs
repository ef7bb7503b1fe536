//! GPU-backed triangle mesh.
//!
//! A `Mesh` keeps its CPU-side vertices and indices and, once allocated,
//! owns a vertex buffer, an index buffer, a per-object uniform buffer and
//! the descriptor set that binds that uniform together with the material
//! textures and the renderer's camera/lights blocks.
//!
//! `allocate` and `deallocate` are both idempotent. Dropping an allocated
//! mesh releases its buffers through the handles' own `Drop`.

use std::mem::size_of;
use glam::Mat4;
use std::sync::Arc;
use crate::error::{Error, Result};
use crate::graphics_device::{Buffer, DescriptorSet, Texture};
use crate::renderer::{FrameState, Renderer};
use crate::resource::{Index, Material, MatricesUniformData, Vertex3D};
use crate::scene::Transform;
use crate::{engine_debug, engine_violation};

/// GPU objects of an allocated mesh
pub struct MeshGpuResources {
    pub vertex_buffer: Arc<dyn Buffer>,
    pub index_buffer: Arc<dyn Buffer>,
    pub uniform_buffer: Arc<dyn Buffer>,
    pub descriptor_set: Arc<dyn DescriptorSet>,
    /// Textures written into `descriptor_set`, blank fallbacks included
    pub textures: Vec<Arc<dyn Texture>>,
}

impl MeshGpuResources {
    /// Name of the first buffer or bound texture that has been released
    pub fn released_resource(&self) -> Option<&'static str> {
        if !self.vertex_buffer.is_allocated() {
            Some("vertex buffer")
        } else if !self.index_buffer.is_allocated() {
            Some("index buffer")
        } else if !self.uniform_buffer.is_allocated() {
            Some("uniform buffer")
        } else if self.textures.iter().any(|t| !t.is_allocated()) {
            Some("material texture")
        } else {
            None
        }
    }
}

pub struct Mesh {
    pub vertices: Vec<Vertex3D>,
    pub indices: Vec<Index>,
    pub model_path: String,
    pub material: Material,
    gpu: Option<MeshGpuResources>,
    /// Model matrix currently held by the uniform buffer
    uploaded_matrix: Option<Mat4>,
}

impl Mesh {
    pub fn new(vertices: Vec<Vertex3D>, indices: Vec<Index>) -> Self {
        Self {
            vertices,
            indices,
            model_path: String::new(),
            material: Material::default(),
            gpu: None,
            uploaded_matrix: None,
        }
    }

    pub fn with_material(mut self, material: Material) -> Self {
        self.material = material;
        self
    }

    pub fn is_allocated(&self) -> bool {
        self.gpu.is_some()
    }

    pub fn gpu(&self) -> Option<&MeshGpuResources> {
        self.gpu.as_ref()
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    /// Create the GPU objects. No-op when already allocated.
    pub fn allocate(&mut self, renderer: &Renderer) -> Result<()> {
        if self.gpu.is_some() {
            return Ok(());
        }
        if self.vertices.is_empty() || self.indices.is_empty() {
            return Err(Error::InvalidResource(format!(
                "mesh '{}' has {} vertices and {} indices",
                self.model_path, self.vertices.len(), self.indices.len()
            )));
        }
        if let Some(&index) = self.indices.iter().find(|&&i| i as usize >= self.vertices.len()) {
            return Err(Error::InvalidResource(format!(
                "mesh '{}' index {} out of range ({} vertices)",
                self.model_path, index, self.vertices.len()
            )));
        }

        let vertex_buffer = renderer.create_vertex_buffer(&self.vertices)?;
        let index_buffer = renderer.create_index_buffer(&self.indices)?;
        let uniform_buffer = renderer.create_uniform_buffer(size_of::<MatricesUniformData>() as u64)?;
        let descriptor_set = renderer.create_descriptors(
            renderer.default_layout(),
            uniform_buffer.as_ref(),
            &self.material,
        )?;
        let textures = self.material.textures()
            .into_iter()
            .map(|texture| texture.unwrap_or(renderer.blank_texture()).clone())
            .collect();

        engine_debug!("kestrel::Mesh",
            "Allocated mesh '{}' ({} vertices, {} indices)",
            self.model_path, self.vertices.len(), self.indices.len());

        self.gpu = Some(MeshGpuResources { vertex_buffer, index_buffer, uniform_buffer, descriptor_set, textures });
        self.uploaded_matrix = None;
        Ok(())
    }

    /// Release the GPU objects after the device has gone idle
    ///
    /// Rejected while a frame is being recorded. No-op when not allocated.
    pub fn deallocate(&mut self, renderer: &Renderer) -> Result<()> {
        if self.gpu.is_none() {
            return Ok(());
        }
        if renderer.frame_state() != FrameState::Idle {
            return Err(engine_violation!("kestrel::Mesh",
                "deallocate of mesh '{}' during frame ({:?})", self.model_path, renderer.frame_state()));
        }

        renderer.wait_idle()?;
        if let Some(gpu) = self.gpu.take() {
            renderer.destroy_vertex_buffer(gpu.vertex_buffer.as_ref())?;
            renderer.destroy_index_buffer(gpu.index_buffer.as_ref())?;
            renderer.destroy_uniform_buffer(gpu.uniform_buffer.as_ref())?;
        }
        self.uploaded_matrix = None;

        engine_debug!("kestrel::Mesh", "Deallocated mesh '{}'", self.model_path);
        Ok(())
    }

    /// Transform must be written before the next draw
    ///
    /// True when the transform is dirty or differs from the one last
    /// uploaded, which happens when several entities share the mesh.
    pub fn needs_transform_upload(&self, transform: &Transform) -> bool {
        transform.is_dirty() || self.uploaded_matrix != Some(transform.model_matrix())
    }

    /// Write model and normal matrices into the object uniform buffer
    pub fn update_transform(&mut self, transform: &Transform) -> Result<()> {
        let gpu = self.gpu.as_ref().ok_or_else(|| {
            Error::InvalidResource(format!("mesh '{}' is not allocated", self.model_path))
        })?;

        let model = transform.model_matrix();
        let data = MatricesUniformData::new(model, transform.normal_matrix());
        gpu.uniform_buffer.update(0, bytemuck::bytes_of(&data))?;
        self.uploaded_matrix = Some(model);
        Ok(())
    }
}

#[cfg(test)]
#[path = "mesh_tests.rs"]
mod tests;
