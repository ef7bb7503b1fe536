/// Shader trait, descriptor and SPIR-V file loading

use std::any::Any;
use std::path::Path;
use crate::error::{Error, Result};
use crate::engine_error;

/// Pipeline stage a shader runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

/// Descriptor for creating a shader module
#[derive(Debug, Clone)]
pub struct ShaderDesc {
    pub stage: ShaderStage,
    /// SPIR-V words
    pub code: Vec<u32>,
    pub entry_point: String,
}

/// Compiled shader module
pub trait Shader: Send + Sync {
    fn stage(&self) -> ShaderStage;

    fn entry_point(&self) -> &str;

    fn as_any(&self) -> &dyn Any;
}

/// Read a compiled shader from disk as little-endian 32-bit words
///
/// Fails with [`Error::Io`] naming the path when the file cannot be read,
/// and with [`Error::InvalidResource`] when its length is not a whole
/// number of words.
pub fn read_shader_file(path: impl AsRef<Path>) -> Result<Vec<u32>> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| {
        engine_error!("kestrel::shader", "Failed to read shader file '{}': {}", path.display(), e);
        Error::Io(format!("{}: {}", path.display(), e))
    })?;

    if bytes.is_empty() || bytes.len() % 4 != 0 {
        engine_error!("kestrel::shader",
            "Shader file '{}' has invalid size {} (must be a non-zero multiple of 4)",
            path.display(), bytes.len());
        return Err(Error::InvalidResource(format!(
            "{}: shader size {} is not a multiple of 4", path.display(), bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

#[cfg(test)]
#[path = "shader_tests.rs"]
mod tests;
