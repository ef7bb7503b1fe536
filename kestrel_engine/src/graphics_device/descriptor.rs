/// Descriptor layouts and descriptor sets
///
/// A [`DescriptorLayout`] is built by appending bindings, then baked once into
/// a native layout object. Baking is one-way: the binding list is frozen and
/// further `add_binding` calls are rejected.

use std::any::Any;
use std::sync::Arc;
use bitflags::bitflags;
use crate::error::Result;
use crate::graphics_device::{Buffer, GraphicsDevice, Texture};
use crate::{engine_debug, engine_violation};

/// Resource type of one binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorType {
    UniformBuffer,
    CombinedImageSampler,
}

bitflags! {
    /// Shader stages that can see a binding
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStageFlags: u32 {
        const VERTEX = 0x1;
        const FRAGMENT = 0x10;
        const COMPUTE = 0x20;
    }
}

/// One slot of a descriptor layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorBinding {
    pub index: u32,
    pub descriptor_type: DescriptorType,
    pub stages: ShaderStageFlags,
}

/// Backend object created when a layout is baked
pub trait NativeDescriptorLayout: Send + Sync {
    fn binding_count(&self) -> usize;

    fn as_any(&self) -> &dyn Any;
}

/// Resource written into one binding of a descriptor set
pub enum BindingResource<'a> {
    UniformBuffer(&'a dyn Buffer),
    Texture(&'a dyn Texture),
}

impl BindingResource<'_> {
    pub fn descriptor_type(&self) -> DescriptorType {
        match self {
            BindingResource::UniformBuffer(_) => DescriptorType::UniformBuffer,
            BindingResource::Texture(_) => DescriptorType::CombinedImageSampler,
        }
    }
}

/// Descriptor pool plus the one set allocated from it
pub trait DescriptorSet: Send + Sync {
    fn binding_count(&self) -> usize;

    fn as_any(&self) -> &dyn Any;
}

/// Ordered binding schema, frozen by [`bake`](DescriptorLayout::bake)
#[derive(Default)]
pub struct DescriptorLayout {
    bindings: Vec<DescriptorBinding>,
    native: Option<Arc<dyn NativeDescriptorLayout>>,
}

impl DescriptorLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a binding at the next sequential index and return that index
    pub fn add_binding(
        &mut self,
        descriptor_type: DescriptorType,
        stages: ShaderStageFlags,
    ) -> Result<u32> {
        if self.is_baked() {
            return Err(engine_violation!("kestrel::DescriptorLayout",
                "add_binding({:?}) called after bake", descriptor_type));
        }

        let index = self.bindings.len() as u32;
        self.bindings.push(DescriptorBinding { index, descriptor_type, stages });
        Ok(index)
    }

    /// Create the native layout object. Can only succeed once.
    pub fn bake(&mut self, device: &dyn GraphicsDevice) -> Result<()> {
        if self.is_baked() {
            return Err(engine_violation!("kestrel::DescriptorLayout",
                "bake called twice"));
        }

        let native = device.create_descriptor_layout(&self.bindings)?;
        engine_debug!("kestrel::DescriptorLayout",
            "Baked descriptor layout with {} binding(s)", self.bindings.len());
        self.native = Some(native);
        Ok(())
    }

    pub fn is_baked(&self) -> bool {
        self.native.is_some()
    }

    pub fn bindings(&self) -> &[DescriptorBinding] {
        &self.bindings
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    /// Native layout, `None` until baked
    pub fn native(&self) -> Option<&Arc<dyn NativeDescriptorLayout>> {
        self.native.as_ref()
    }

    /// Number of bindings of `descriptor_type`
    pub fn count_of(&self, descriptor_type: DescriptorType) -> usize {
        self.bindings
            .iter()
            .filter(|b| b.descriptor_type == descriptor_type)
            .count()
    }
}

#[cfg(test)]
#[path = "descriptor_tests.rs"]
mod tests;
