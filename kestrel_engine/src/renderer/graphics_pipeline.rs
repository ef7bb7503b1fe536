/// Stable graphics pipeline handle
///
/// The renderer rebuilds the native pipeline behind a [`GraphicsPipeline`]
/// in place (new MSAA count, wireframe toggle, reloaded shaders). Callers
/// keep the same `Arc` across every rebuild.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};
use slotmap::new_key_type;
use crate::graphics_device::{
    CullMode, DescriptorLayout, FrontFace, Pipeline, PrimitiveTopology, VertexLayout,
};
use crate::renderer::ShaderModule;
use crate::resource::Vertex3D;

new_key_type! {
    /// Key of a live pipeline in the renderer's registry
    pub struct PipelineKey;
}

/// Everything a pipeline is built from
#[derive(Clone)]
pub struct PipelineProperties {
    pub vertex_shader: Arc<ShaderModule>,
    pub fragment_shader: Arc<ShaderModule>,
    /// Must be baked
    pub layout: Arc<DescriptorLayout>,
    pub vertex_layout: VertexLayout,
    pub topology: PrimitiveTopology,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub depth_test: bool,
    pub depth_write: bool,
    pub blend_enable: bool,
    /// Overrides the renderer-wide wireframe setting when set
    pub wireframe: Option<bool>,
}

impl PipelineProperties {
    /// Opaque triangle pipeline over [`Vertex3D`] with depth test and back-face culling
    pub fn new(
        vertex_shader: Arc<ShaderModule>,
        fragment_shader: Arc<ShaderModule>,
        layout: Arc<DescriptorLayout>,
    ) -> Self {
        Self {
            vertex_shader,
            fragment_shader,
            layout,
            vertex_layout: Vertex3D::vertex_layout(),
            topology: PrimitiveTopology::TriangleList,
            cull_mode: CullMode::Back,
            front_face: FrontFace::CounterClockwise,
            depth_test: true,
            depth_write: true,
            blend_enable: false,
            wireframe: None,
        }
    }
}

pub struct GraphicsPipeline {
    key: PipelineKey,
    properties: PipelineProperties,
    native: RwLock<Option<Arc<dyn Pipeline>>>,
    generation: AtomicU32,
}

impl GraphicsPipeline {
    pub(crate) fn new(key: PipelineKey, properties: PipelineProperties, native: Arc<dyn Pipeline>) -> Self {
        Self {
            key,
            properties,
            native: RwLock::new(Some(native)),
            generation: AtomicU32::new(0),
        }
    }

    pub fn key(&self) -> PipelineKey {
        self.key
    }

    pub fn properties(&self) -> &PipelineProperties {
        &self.properties
    }

    /// Current native pipeline, `None` once destroyed
    pub fn native(&self) -> Option<Arc<dyn Pipeline>> {
        self.native.read().ok().and_then(|guard| guard.clone())
    }

    pub fn is_valid(&self) -> bool {
        self.native().is_some()
    }

    /// Number of rebuilds so far
    pub fn generation(&self) -> u32 {
        self.generation.load(Ordering::SeqCst)
    }

    pub(crate) fn replace_native(&self, native: Option<Arc<dyn Pipeline>>) -> bool {
        let previous = match self.native.write() {
            Ok(mut guard) => std::mem::replace(&mut *guard, native.clone()),
            Err(_) => return false,
        };
        if native.is_some() {
            self.generation.fetch_add(1, Ordering::SeqCst);
        }
        previous.is_some()
    }
}
