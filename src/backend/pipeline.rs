// Graphics pipeline construction
//
// PipelineConfig captures every fixed-function choice a pipeline needs.
// Presets cover the two pipelines in use: the depth-tested scene pass
// and the blended overlay pass drawn on top of it.

use anyhow::{Context, Result};
use ash::vk;
use std::path::Path;
use std::sync::Arc;

use super::shader::create_shader_module;
use super::Device;

/// Fixed-function state for one graphics pipeline. Vertex input is
/// supplied separately since it depends on the vertex type.
#[derive(Clone)]
pub struct PipelineConfig {
    pub topology: vk::PrimitiveTopology,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub depth_test: bool,
    pub depth_write: bool,
    pub blend_enable: bool,
    pub binding_descriptions: Vec<vk::VertexInputBindingDescription>,
    pub attribute_descriptions: Vec<vk::VertexInputAttributeDescription>,
    pub render_pass: vk::RenderPass,
    pub pipeline_layout: vk::PipelineLayout,
    pub subpass: u32,
}

impl PipelineConfig {
    /// Depth-tested, back-face-culled 3D geometry.
    pub fn scene(render_pass: vk::RenderPass, pipeline_layout: vk::PipelineLayout) -> Self {
        Self {
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth_test: true,
            depth_write: true,
            blend_enable: false,
            binding_descriptions: Vec::new(),
            attribute_descriptions: Vec::new(),
            render_pass,
            pipeline_layout,
            subpass: 0,
        }
    }

    /// Alpha-blended 2D geometry drawn over the scene. Depth writes are
    /// disabled so overlay triangles never occlude each other or the
    /// scene behind them.
    pub fn overlay(render_pass: vk::RenderPass, pipeline_layout: vk::PipelineLayout) -> Self {
        Self {
            cull_mode: vk::CullModeFlags::NONE,
            depth_test: false,
            depth_write: false,
            blend_enable: true,
            ..Self::scene(render_pass, pipeline_layout)
        }
    }
}

pub struct Pipeline {
    device: Arc<Device>,
    pipeline: vk::Pipeline,
}

impl Pipeline {
    pub fn new(
        device: Arc<Device>,
        vert_path: impl AsRef<Path>,
        frag_path: impl AsRef<Path>,
        config: &PipelineConfig,
    ) -> Result<Self> {
        assert!(
            config.pipeline_layout != vk::PipelineLayout::null(),
            "Pipeline config is missing a pipeline layout"
        );
        assert!(
            config.render_pass != vk::RenderPass::null(),
            "Pipeline config is missing a render pass"
        );

        let vert_module = create_shader_module(&device, vert_path)?;
        let frag_module = create_shader_module(&device, frag_path)?;

        let result = Self::create_pipeline(&device, vert_module, frag_module, config);

        // Modules are only needed during pipeline creation
        unsafe {
            device.device.destroy_shader_module(vert_module, None);
            device.device.destroy_shader_module(frag_module, None);
        }

        let pipeline = result?;
        Ok(Self { device, pipeline })
    }

    fn create_pipeline(
        device: &Arc<Device>,
        vert_module: vk::ShaderModule,
        frag_module: vk::ShaderModule,
        config: &PipelineConfig,
    ) -> Result<vk::Pipeline> {
        let entry_point = c"main";
        let stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vert_module)
                .name(entry_point),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(frag_module)
                .name(entry_point),
        ];

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&config.binding_descriptions)
            .vertex_attribute_descriptions(&config.attribute_descriptions);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(config.topology)
            .primitive_restart_enable(false);

        // Viewport and scissor are dynamic; only counts matter here
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(config.polygon_mode)
            .line_width(1.0)
            .cull_mode(config.cull_mode)
            .front_face(config.front_face)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let color_blend_attachment = vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(config.blend_enable)
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
            .alpha_blend_op(vk::BlendOp::ADD);

        let attachments = [color_blend_attachment];
        let color_blending =
            vk::PipelineColorBlendStateCreateInfo::default().attachments(&attachments);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(config.depth_test)
            .depth_write_enable(config.depth_write)
            .depth_compare_op(vk::CompareOp::LESS)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .color_blend_state(&color_blending)
            .depth_stencil_state(&depth_stencil)
            .dynamic_state(&dynamic_state)
            .layout(config.pipeline_layout)
            .render_pass(config.render_pass)
            .subpass(config.subpass);

        let pipelines = unsafe {
            device.device.create_graphics_pipelines(
                vk::PipelineCache::null(),
                &[pipeline_info],
                None,
            )
        }
        .map_err(|(_, e)| e)
        .context("Failed to create graphics pipeline")?;

        Ok(pipelines[0])
    }

    pub fn bind(&self, command_buffer: vk::CommandBuffer) {
        unsafe {
            self.device.device.cmd_bind_pipeline(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline,
            );
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_pipeline(self.pipeline, None);
        }
    }
}
