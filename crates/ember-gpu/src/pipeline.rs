//! Graphics pipeline configuration and creation.

use crate::backend::{RenderTargetFormats, ShaderStages};
use crate::error::{GpuError, Result};
use ash::vk;

/// How fragment output combines with the colour attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlendMode {
    /// Overwrite the destination.
    #[default]
    Opaque,
    /// Standard `src_alpha, 1 - src_alpha` blending.
    Alpha,
}

/// Depth test configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthPolicy {
    pub test: bool,
    pub write: bool,
    pub compare_op: vk::CompareOp,
}

impl Default for DepthPolicy {
    fn default() -> Self {
        Self {
            test: true,
            write: true,
            compare_op: vk::CompareOp::LESS,
        }
    }
}

/// Immutable description of a graphics pipeline's fixed-function state.
///
/// Attachment formats are not part of the config; they come from the
/// swapchain's [`RenderTargetFormats`] at creation time.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    topology: vk::PrimitiveTopology,
    polygon_mode: vk::PolygonMode,
    cull_mode: vk::CullModeFlags,
    front_face: vk::FrontFace,
    blend: BlendMode,
    depth: DepthPolicy,
    dynamic_states: Vec<vk::DynamicState>,
    vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::CLOCKWISE,
            blend: BlendMode::Opaque,
            depth: DepthPolicy::default(),
            dynamic_states: vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR],
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
        }
    }
}

impl PipelineConfig {
    /// Start building a config from the defaults.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    pub const fn topology(&self) -> vk::PrimitiveTopology {
        self.topology
    }

    pub const fn polygon_mode(&self) -> vk::PolygonMode {
        self.polygon_mode
    }

    pub const fn cull_mode(&self) -> vk::CullModeFlags {
        self.cull_mode
    }

    pub const fn front_face(&self) -> vk::FrontFace {
        self.front_face
    }

    pub const fn blend(&self) -> BlendMode {
        self.blend
    }

    pub const fn depth(&self) -> DepthPolicy {
        self.depth
    }

    pub fn dynamic_states(&self) -> &[vk::DynamicState] {
        &self.dynamic_states
    }

    pub fn vertex_bindings(&self) -> &[vk::VertexInputBindingDescription] {
        &self.vertex_bindings
    }

    pub fn vertex_attributes(&self) -> &[vk::VertexInputAttributeDescription] {
        &self.vertex_attributes
    }

    fn color_blend_attachment(&self) -> vk::PipelineColorBlendAttachmentState {
        let base = vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA);
        match self.blend {
            BlendMode::Opaque => base.blend_enable(false),
            BlendMode::Alpha => base
                .blend_enable(true)
                .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
                .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                .color_blend_op(vk::BlendOp::ADD)
                .src_alpha_blend_factor(vk::BlendFactor::ONE)
                .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
                .alpha_blend_op(vk::BlendOp::ADD),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug, Clone, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    #[must_use]
    pub const fn topology(mut self, topology: vk::PrimitiveTopology) -> Self {
        self.config.topology = topology;
        self
    }

    #[must_use]
    pub const fn polygon_mode(mut self, mode: vk::PolygonMode) -> Self {
        self.config.polygon_mode = mode;
        self
    }

    #[must_use]
    pub const fn cull_mode(mut self, mode: vk::CullModeFlags) -> Self {
        self.config.cull_mode = mode;
        self
    }

    #[must_use]
    pub const fn front_face(mut self, face: vk::FrontFace) -> Self {
        self.config.front_face = face;
        self
    }

    #[must_use]
    pub const fn blend(mut self, blend: BlendMode) -> Self {
        self.config.blend = blend;
        self
    }

    #[must_use]
    pub const fn depth(mut self, depth: DepthPolicy) -> Self {
        self.config.depth = depth;
        self
    }

    #[must_use]
    pub fn dynamic_states(mut self, states: &[vk::DynamicState]) -> Self {
        self.config.dynamic_states = states.to_vec();
        self
    }

    /// Set the vertex input layout. Empty slices mean no vertex buffers.
    #[must_use]
    pub fn vertex_input(
        mut self,
        bindings: &[vk::VertexInputBindingDescription],
        attributes: &[vk::VertexInputAttributeDescription],
    ) -> Self {
        self.config.vertex_bindings = bindings.to_vec();
        self.config.vertex_attributes = attributes.to_vec();
        self
    }

    pub fn build(self) -> PipelineConfig {
        self.config
    }
}

/// Create a pipeline layout and a dynamic-rendering graphics pipeline.
///
/// Push constants, when `push_constant_size > 0`, are visible to both stages.
///
/// # Safety
/// The device and set layouts must be valid and the shaders valid SPIR-V.
pub unsafe fn create_graphics_pipeline(
    device: &ash::Device,
    config: &PipelineConfig,
    shaders: &ShaderStages<'_>,
    set_layouts: &[vk::DescriptorSetLayout],
    push_constant_size: u32,
    target: RenderTargetFormats,
) -> Result<(vk::Pipeline, vk::PipelineLayout)> {
    let push_ranges = [vk::PushConstantRange::default()
        .stage_flags(vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT)
        .offset(0)
        .size(push_constant_size)];
    let push_ranges: &[_] = if push_constant_size > 0 {
        &push_ranges
    } else {
        &[]
    };

    let layout_info = vk::PipelineLayoutCreateInfo::default()
        .set_layouts(set_layouts)
        .push_constant_ranges(push_ranges);
    let layout = unsafe { device.create_pipeline_layout(&layout_info, None) }
        .map_err(|e| GpuError::PipelineCreation(e.to_string()))?;

    let result = unsafe { create_pipeline_with_layout(device, config, shaders, layout, target) };
    match result {
        Ok(pipeline) => Ok((pipeline, layout)),
        Err(e) => {
            unsafe { device.destroy_pipeline_layout(layout, None) };
            Err(e)
        }
    }
}

unsafe fn create_shader_module(device: &ash::Device, code: &[u32], stage: &str) -> Result<vk::ShaderModule> {
    let info = vk::ShaderModuleCreateInfo::default().code(code);
    unsafe { device.create_shader_module(&info, None) }
        .map_err(|e| GpuError::ShaderModule(format!("{stage}: {e}")))
}

unsafe fn create_pipeline_with_layout(
    device: &ash::Device,
    config: &PipelineConfig,
    shaders: &ShaderStages<'_>,
    layout: vk::PipelineLayout,
    target: RenderTargetFormats,
) -> Result<vk::Pipeline> {
    let vert_module = unsafe { create_shader_module(device, shaders.vertex, "Vertex")? };
    let frag_module = match unsafe { create_shader_module(device, shaders.fragment, "Fragment") } {
        Ok(module) => module,
        Err(e) => {
            unsafe { device.destroy_shader_module(vert_module, None) };
            return Err(e);
        }
    };

    let shader_stages = [
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vert_module)
            .name(c"main"),
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(frag_module)
            .name(c"main"),
    ];

    let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(config.vertex_bindings())
        .vertex_attribute_descriptions(config.vertex_attributes());

    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(config.topology())
        .primitive_restart_enable(false);

    // Viewport and scissor are set per frame
    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewport_count(1)
        .scissor_count(1);

    let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(config.polygon_mode())
        .cull_mode(config.cull_mode())
        .front_face(config.front_face())
        .depth_bias_enable(false)
        .line_width(1.0);

    let multisampling = vk::PipelineMultisampleStateCreateInfo::default()
        .rasterization_samples(vk::SampleCountFlags::TYPE_1)
        .sample_shading_enable(false);

    let depth = config.depth();
    let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(depth.test)
        .depth_write_enable(depth.write)
        .depth_compare_op(depth.compare_op)
        .depth_bounds_test_enable(false)
        .stencil_test_enable(false);

    let color_blend_attachments = [config.color_blend_attachment()];
    let color_blending = vk::PipelineColorBlendStateCreateInfo::default()
        .logic_op_enable(false)
        .attachments(&color_blend_attachments);

    let dynamic_state =
        vk::PipelineDynamicStateCreateInfo::default().dynamic_states(config.dynamic_states());

    let color_formats = [target.color];
    let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
        .color_attachment_formats(&color_formats)
        .depth_attachment_format(target.depth);

    let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&shader_stages)
        .vertex_input_state(&vertex_input)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization)
        .multisample_state(&multisampling)
        .depth_stencil_state(&depth_stencil)
        .color_blend_state(&color_blending)
        .dynamic_state(&dynamic_state)
        .layout(layout)
        .push_next(&mut rendering_info);

    let result = unsafe {
        device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
    };

    unsafe {
        device.destroy_shader_module(vert_module, None);
        device.destroy_shader_module(frag_module, None);
    }

    let pipelines = result.map_err(|(_pipelines, e)| GpuError::PipelineCreation(e.to_string()))?;
    pipelines
        .into_iter()
        .next()
        .ok_or_else(|| GpuError::PipelineCreation("Driver returned no pipeline".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_opaque_with_depth() {
        let config = PipelineConfig::default();
        assert_eq!(config.blend(), BlendMode::Opaque);
        assert!(config.depth().test);
        assert!(config.depth().write);
        assert_eq!(
            config.dynamic_states(),
            &[vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR]
        );
        assert_eq!(config.color_blend_attachment().blend_enable, vk::FALSE);
    }

    #[test]
    fn builder_overrides_fields() {
        let config = PipelineConfig::builder()
            .blend(BlendMode::Alpha)
            .cull_mode(vk::CullModeFlags::BACK)
            .polygon_mode(vk::PolygonMode::LINE)
            .depth(DepthPolicy {
                test: true,
                write: false,
                compare_op: vk::CompareOp::LESS_OR_EQUAL,
            })
            .build();

        assert_eq!(config.blend(), BlendMode::Alpha);
        assert_eq!(config.cull_mode(), vk::CullModeFlags::BACK);
        assert_eq!(config.polygon_mode(), vk::PolygonMode::LINE);
        assert!(!config.depth().write);

        let attachment = config.color_blend_attachment();
        assert_eq!(attachment.blend_enable, vk::TRUE);
        assert_eq!(attachment.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
        assert_eq!(
            attachment.dst_color_blend_factor,
            vk::BlendFactor::ONE_MINUS_SRC_ALPHA
        );
    }

    #[test]
    fn vertex_input_is_copied() {
        let bindings = [vk::VertexInputBindingDescription {
            binding: 0,
            stride: 44,
            input_rate: vk::VertexInputRate::VERTEX,
        }];
        let config = PipelineConfig::builder().vertex_input(&bindings, &[]).build();
        assert_eq!(config.vertex_bindings().len(), 1);
        assert_eq!(config.vertex_bindings()[0].stride, 44);
        assert!(config.vertex_attributes().is_empty());
    }
}
