//! Surface textures of a mesh.

use std::sync::Arc;
use crate::graphics_device::Texture;
use crate::resource::VertexFlags;

/// Material textures, bound in order diffuse, normal, specular
///
/// Missing maps are replaced by the renderer's blank texture when the
/// descriptor set is written.
#[derive(Clone, Default)]
pub struct Material {
    pub diffuse: Option<Arc<dyn Texture>>,
    pub normal: Option<Arc<dyn Texture>>,
    pub specular: Option<Arc<dyn Texture>>,
}

impl Material {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_diffuse(mut self, texture: Arc<dyn Texture>) -> Self {
        self.diffuse = Some(texture);
        self
    }

    pub fn with_normal(mut self, texture: Arc<dyn Texture>) -> Self {
        self.normal = Some(texture);
        self
    }

    pub fn with_specular(mut self, texture: Arc<dyn Texture>) -> Self {
        self.specular = Some(texture);
        self
    }

    /// Textures in sampler binding order
    pub fn textures(&self) -> [Option<&Arc<dyn Texture>>; 3] {
        [self.diffuse.as_ref(), self.normal.as_ref(), self.specular.as_ref()]
    }

    /// Flags to stamp on vertices drawn with this material
    pub fn vertex_flags(&self) -> VertexFlags {
        let mut flags = VertexFlags::empty();
        flags.set(VertexFlags::HAS_TEXTURE, self.diffuse.is_some());
        flags.set(VertexFlags::HAS_NORMAL_MAP, self.normal.is_some());
        flags.set(VertexFlags::HAS_SPECULAR_MAP, self.specular.is_some());
        flags
    }
}
