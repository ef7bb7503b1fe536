/// Stable shader handle whose native module can be reloaded in place

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};
use slotmap::new_key_type;
use crate::graphics_device::{Shader, ShaderStage};

new_key_type! {
    /// Key of a live shader in the renderer's registry
    pub struct ShaderKey;
}

/// Shader loading options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderProperties {
    /// Compiled SPIR-V file
    pub path: PathBuf,
    pub stage: ShaderStage,
    pub entry_point: String,
}

impl ShaderProperties {
    pub fn new(path: impl Into<PathBuf>, stage: ShaderStage) -> Self {
        Self { path: path.into(), stage, entry_point: "main".to_string() }
    }
}

/// Where the bytecode of a shader comes from
#[derive(Debug, Clone)]
pub(crate) enum ShaderSource {
    File(PathBuf),
    Code(Vec<u32>),
}

/// Shader module owned by the renderer
///
/// Callers hold the `Arc<ShaderModule>` returned at creation. Reloading
/// swaps the native module behind it and bumps [`generation`](Self::generation);
/// the handle itself never changes.
pub struct ShaderModule {
    key: ShaderKey,
    stage: ShaderStage,
    entry_point: String,
    pub(crate) source: ShaderSource,
    native: RwLock<Option<Arc<dyn Shader>>>,
    generation: AtomicU32,
}

impl ShaderModule {
    pub(crate) fn new(
        key: ShaderKey,
        stage: ShaderStage,
        entry_point: String,
        source: ShaderSource,
        native: Arc<dyn Shader>,
    ) -> Self {
        Self {
            key,
            stage,
            entry_point,
            source,
            native: RwLock::new(Some(native)),
            generation: AtomicU32::new(0),
        }
    }

    pub fn key(&self) -> ShaderKey {
        self.key
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    /// Source file, `None` for shaders built from in-memory code
    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            ShaderSource::File(path) => Some(path),
            ShaderSource::Code(_) => None,
        }
    }

    /// Current native module, `None` once destroyed
    pub fn native(&self) -> Option<Arc<dyn Shader>> {
        self.native.read().ok().and_then(|guard| guard.clone())
    }

    pub fn is_loaded(&self) -> bool {
        self.native().is_some()
    }

    /// Number of reloads so far
    pub fn generation(&self) -> u32 {
        self.generation.load(Ordering::SeqCst)
    }

    pub(crate) fn replace_native(&self, native: Option<Arc<dyn Shader>>) -> bool {
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
