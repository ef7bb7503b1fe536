/// VulkanShader - Vulkan implementation of the Shader trait

use ash::vk;
use kestrel_engine::kestrel::render::{Shader, ShaderDesc, ShaderStage};
use kestrel_engine::kestrel::{Error, Result};
use kestrel_engine::{engine_err, engine_error, engine_trace};
use std::any::Any;
use std::ffi::CString;

/// Compiled shader module
pub struct VulkanShader {
    device: ash::Device,
    pub(crate) module: vk::ShaderModule,
    stage: ShaderStage,
    entry_point: String,
    /// Entry point as passed to pipeline creation
    pub(crate) entry_point_c: CString,
}

impl VulkanShader {
    /// Create a shader module after checking that the SPIR-V exposes `desc.entry_point`
    pub(crate) fn create(device: &ash::Device, desc: &ShaderDesc) -> Result<Self> {
        let descriptor_count = check_entry_point(&desc.code, &desc.entry_point)?;

        let entry_point_c = CString::new(desc.entry_point.as_str()).map_err(|_| {
            engine_error!("kestrel::vulkan", "Entry point '{}' contains a NUL byte", desc.entry_point);
            Error::InvalidResource(format!("invalid entry point name '{}'", desc.entry_point))
        })?;

        let create_info = vk::ShaderModuleCreateInfo::default().code(&desc.code);
        let module = unsafe {
            device.create_shader_module(&create_info, None)
                .map_err(|e| engine_err!("kestrel::vulkan", "Failed to create {:?} shader module: {:?}", desc.stage, e))?
        };

        engine_trace!("kestrel::vulkan", "Created {:?} shader '{}' ({} words, {} descriptor(s))",
            desc.stage, desc.entry_point, desc.code.len(), descriptor_count);

        Ok(Self {
            device: device.clone(),
            module,
            stage: desc.stage,
            entry_point: desc.entry_point.clone(),
            entry_point_c,
        })
    }
}

/// Reflect `code` and return the number of descriptors used by `entry_point`
fn check_entry_point(code: &[u32], entry_point: &str) -> Result<usize> {
    let entry_points = spirq::ReflectConfig::new()
        .spv(code)
        .ref_all_rscs(false)
        .reflect()
        .map_err(|e| {
            engine_error!("kestrel::vulkan", "SPIR-V reflection failed: {:?}", e);
            Error::InvalidResource(format!("malformed SPIR-V: {:?}", e))
        })?;

    match entry_points.iter().find(|ep| ep.name == entry_point) {
        Some(ep) => Ok(ep
            .vars
            .iter()
            .filter(|var| matches!(var, spirq::var::Variable::Descriptor { .. }))
            .count()),
        None => {
            let available: Vec<&str> = entry_points.iter().map(|ep| ep.name.as_str()).collect();
            engine_error!("kestrel::vulkan", "Entry point '{}' not found in shader (available: {:?})",
                entry_point, available);
            Err(Error::InvalidResource(format!("entry point '{}' not found", entry_point)))
        }
    }
}

impl Shader for VulkanShader {
    fn stage(&self) -> ShaderStage {
        self.stage
    }

    fn entry_point(&self) -> &str {
        &self.entry_point
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanShader {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}
