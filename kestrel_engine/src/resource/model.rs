//! Collection of meshes loaded from one asset.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use rustc_hash::FxHashMap;
use crate::error::{Error, Result};
use crate::graphics_device::{SamplerProperties, Texture, TextureProperties};
use crate::renderer::Renderer;
use crate::resource::Mesh;

/// Meshes plus the textures they share
///
/// Meshes are shared handles so that one mesh can appear in several models
/// without being allocated twice.
pub struct Model {
    pub meshes: Vec<Arc<Mutex<Mesh>>>,
    pub model_path: String,
    /// Directory texture paths are resolved against
    pub textures_path: String,
    /// Loaded textures keyed by their path relative to `textures_path`
    pub textures: FxHashMap<String, Arc<dyn Texture>>,
    pub receive_shadows: bool,
}

impl Default for Model {
    fn default() -> Self {
        Self {
            meshes: Vec::new(),
            model_path: String::new(),
            textures_path: String::new(),
            textures: FxHashMap::default(),
            receive_shadows: true,
        }
    }
}

pub(crate) fn lock_mesh(mesh: &Arc<Mutex<Mesh>>) -> Result<MutexGuard<'_, Mesh>> {
    mesh.lock()
        .map_err(|_| Error::InvalidResource("mesh lock poisoned".to_string()))
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_mesh(&mut self, mesh: Mesh) -> Arc<Mutex<Mesh>> {
        let shared = Arc::new(Mutex::new(mesh));
        self.meshes.push(shared.clone());
        shared
    }

    pub fn add_shared_mesh(&mut self, mesh: Arc<Mutex<Mesh>>) {
        self.meshes.push(mesh);
    }

    /// Load a texture once and reuse it for every later request of the same path
    pub fn load_texture(
        &mut self,
        renderer: &Renderer,
        relative_path: &str,
        properties: TextureProperties,
    ) -> Result<Arc<dyn Texture>> {
        if let Some(texture) = self.textures.get(relative_path) {
            return Ok(texture.clone());
        }

        let full_path = Path::new(&self.textures_path).join(relative_path);
        let texture = renderer.create_texture_from_file(
            &full_path,
            properties,
            SamplerProperties::default(),
        )?;
        self.textures.insert(relative_path.to_string(), texture.clone());
        Ok(texture)
    }

    pub fn allocate(&mut self, renderer: &Renderer) -> Result<()> {
        for mesh in &self.meshes {
            lock_mesh(mesh)?.allocate(renderer)?;
        }
        Ok(())
    }

    /// Deallocate every mesh and release the cached textures
    pub fn deallocate(&mut self, renderer: &Renderer) -> Result<()> {
        for mesh in &self.meshes {
            lock_mesh(mesh)?.deallocate(renderer)?;
        }
        for (_, texture) in self.textures.drain() {
            renderer.destroy_texture(texture.as_ref())?;
        }
        Ok(())
    }
}
