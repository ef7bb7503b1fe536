/// VulkanPipeline - graphics pipeline plus its layout
///
/// Viewport and scissor are dynamic, so a pipeline survives window resizes
/// as long as its render pass stays compatible.

use ash::vk;
use kestrel_engine::kestrel::render::{Pipeline, PipelineDesc, RenderPass, Shader};
use kestrel_engine::kestrel::{Error, Result};
use kestrel_engine::{engine_debug, engine_err, engine_error};
use std::any::Any;

use crate::vulkan_descriptor_set::VulkanDescriptorLayout;
use crate::vulkan_format::{
    buffer_format_to_vk, compare_op_to_vk, cull_mode_to_vk, front_face_to_vk, input_rate_to_vk,
    polygon_mode_to_vk, sample_count_to_vk, shader_stage_to_vk, topology_to_vk,
};
use crate::vulkan_render_pass::VulkanRenderPass;
use crate::vulkan_shader::VulkanShader;

pub struct VulkanPipeline {
    device: ash::Device,
    pub(crate) pipeline: vk::Pipeline,
    pub(crate) layout: vk::PipelineLayout,
}

fn downcast_shader(shader: &dyn Shader) -> Result<&VulkanShader> {
    shader.as_any().downcast_ref::<VulkanShader>().ok_or_else(|| {
        engine_error!("kestrel::vulkan", "Shader is not a Vulkan shader");
        Error::InvalidResource("foreign shader handle".to_string())
    })
}

/// Color blend attachment: standard alpha blending when enabled
pub(crate) fn color_blend_attachment(blend_enable: bool) -> vk::PipelineColorBlendAttachmentState {
    let attachment = vk::PipelineColorBlendAttachmentState::default()
        .color_write_mask(vk::ColorComponentFlags::RGBA)
        .blend_enable(blend_enable);
    if blend_enable {
        attachment
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
            .alpha_blend_op(vk::BlendOp::ADD)
    } else {
        attachment
    }
}

impl VulkanPipeline {
    pub(crate) fn create(
        device: &ash::Device,
        desc: &PipelineDesc<'_>,
        render_pass: &dyn RenderPass,
    ) -> Result<Self> {
        let vk_render_pass = render_pass
            .as_any()
            .downcast_ref::<VulkanRenderPass>()
            .ok_or_else(|| {
                engine_error!("kestrel::vulkan", "Render pass is not a Vulkan render pass");
                Error::InvalidResource("foreign render pass handle".to_string())
            })?;
        let descriptor_layout = desc
            .descriptor_layout
            .as_any()
            .downcast_ref::<VulkanDescriptorLayout>()
            .ok_or_else(|| {
                engine_error!("kestrel::vulkan", "Descriptor layout is not a Vulkan layout");
                Error::InvalidResource("foreign descriptor layout handle".to_string())
            })?;
        let vertex_shader = downcast_shader(desc.vertex_shader)?;
        let fragment_shader = downcast_shader(desc.fragment_shader)?;

        if render_pass.desc().samples != desc.samples {
            engine_error!("kestrel::vulkan", "Pipeline samples {:?} do not match render pass samples {:?}",
                desc.samples, render_pass.desc().samples);
            return Err(Error::InvalidResource("pipeline and render pass sample counts differ".to_string()));
        }

        let shader_stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(shader_stage_to_vk(vertex_shader.stage()))
                .module(vertex_shader.module)
                .name(&vertex_shader.entry_point_c),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(shader_stage_to_vk(fragment_shader.stage()))
                .module(fragment_shader.module)
                .name(&fragment_shader.entry_point_c),
        ];

        let vertex_bindings: Vec<vk::VertexInputBindingDescription> = desc.vertex_layout.bindings
            .iter()
            .map(|binding| vk::VertexInputBindingDescription {
                binding: binding.binding,
                stride: binding.stride,
                input_rate: input_rate_to_vk(binding.input_rate),
            })
            .collect();

        let vertex_attributes: Vec<vk::VertexInputAttributeDescription> = desc.vertex_layout.attributes
            .iter()
            .map(|attribute| vk::VertexInputAttributeDescription {
                location: attribute.location,
                binding: attribute.binding,
                format: buffer_format_to_vk(attribute.format),
                offset: attribute.offset,
            })
            .collect();

        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&vertex_bindings)
            .vertex_attribute_descriptions(&vertex_attributes);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(topology_to_vk(desc.topology))
            .primitive_restart_enable(false);

        // Viewport state (dynamic)
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(polygon_mode_to_vk(desc.rasterization.polygon_mode))
            .line_width(1.0)
            .cull_mode(cull_mode_to_vk(desc.rasterization.cull_mode))
            .front_face(front_face_to_vk(desc.rasterization.front_face))
            .depth_bias_enable(false);

        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(desc.depth_stencil.depth_test_enable)
            .depth_write_enable(desc.depth_stencil.depth_write_enable)
            .depth_compare_op(compare_op_to_vk(desc.depth_stencil.depth_compare_op))
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(sample_count_to_vk(desc.samples));

        let blend_attachment = color_blend_attachment(desc.color_blend.blend_enable);
        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(std::slice::from_ref(&blend_attachment));

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::default()
            .dynamic_states(&dynamic_states);

        let set_layouts = [descriptor_layout.layout];
        let layout_create_info = vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts);

        unsafe {
            let layout = device.create_pipeline_layout(&layout_create_info, None)
                .map_err(|e| engine_err!("kestrel::vulkan", "Failed to create pipeline layout: {:?}", e))?;

            let pipeline_create_info = vk::GraphicsPipelineCreateInfo::default()
                .stages(&shader_stages)
                .vertex_input_state(&vertex_input_state)
                .input_assembly_state(&input_assembly_state)
                .viewport_state(&viewport_state)
                .rasterization_state(&rasterization_state)
                .depth_stencil_state(&depth_stencil_state)
                .multisample_state(&multisample_state)
                .color_blend_state(&color_blend_state)
                .dynamic_state(&dynamic_state)
                .layout(layout)
                .render_pass(vk_render_pass.render_pass)
                .subpass(0);

            let pipeline = match device.create_graphics_pipelines(
                vk::PipelineCache::null(),
                &[pipeline_create_info],
                None,
            ) {
                Ok(pipelines) => pipelines[0],
                Err((_, e)) => {
                    device.destroy_pipeline_layout(layout, None);
                    return Err(engine_err!("kestrel::vulkan", "Failed to create graphics pipeline: {:?}", e));
                }
            };

            engine_debug!("kestrel::vulkan", "Created graphics pipeline ({:?}, {:?}, {:?})",
                desc.topology, desc.rasterization.polygon_mode, desc.samples);
            Ok(Self { device: device.clone(), pipeline, layout })
        }
    }
}

impl Pipeline for VulkanPipeline {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}
