// Render systems: pipeline layouts, per-frame uniform data, draw loops
//
// The scene system owns the lit 3D pass (global UBO at set 0, per
// object material at set 1, transform push constants). The overlay
// system draws flat 2D geometry with push constants only.

use anyhow::{Context, Result};
use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};
use std::sync::Arc;

use crate::backend::{Device, Pipeline, PipelineConfig};
use crate::scene::model::{OverlayVertex, Vertex, VertexLayout};
use crate::scene::{Camera, GameObject, OverlayObject, SceneLight};

/// Most scenes have one or two directional lights; the array is fixed
/// so the UBO size is static.
pub const MAX_DIRECTIONAL_LIGHTS: usize = 4;

/// Per-frame state threaded through the render systems. Camera matrices
/// travel in the global UBO, not here.
pub struct FrameInfo {
    pub frame_index: usize,
    pub command_buffer: vk::CommandBuffer,
    pub global_descriptor_set: vk::DescriptorSet,
}

/// std140 layout matching the shader's DirectionalLight.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct DirectionalLight {
    /// xyz direction, w unused.
    pub direction: [f32; 4],
    /// rgb color, a intensity.
    pub color: [f32; 4],
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: [0.0; 4],
            color: [0.0; 4],
        }
    }
}

/// std140 layout matching the shader's global uniform block.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct GlobalUbo {
    pub projection: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub lights: [DirectionalLight; MAX_DIRECTIONAL_LIGHTS],
    pub light_count: u32,
    pub _pad: [u32; 3],
}

impl Default for GlobalUbo {
    fn default() -> Self {
        Self {
            projection: Mat4::IDENTITY.to_cols_array_2d(),
            view: Mat4::IDENTITY.to_cols_array_2d(),
            lights: [DirectionalLight::default(); MAX_DIRECTIONAL_LIGHTS],
            light_count: 0,
            _pad: [0; 3],
        }
    }
}

/// Pack camera matrices and lights for upload. Lights beyond the array
/// capacity are dropped with a warning rather than overflowing.
pub fn build_global_ubo(camera: &Camera, lights: &[SceneLight]) -> GlobalUbo {
    let mut ubo = GlobalUbo {
        projection: camera.projection().to_cols_array_2d(),
        view: camera.view().to_cols_array_2d(),
        ..Default::default()
    };

    if lights.len() > MAX_DIRECTIONAL_LIGHTS {
        log::warn!(
            "Scene has {} directional lights, only the first {} are used",
            lights.len(),
            MAX_DIRECTIONAL_LIGHTS
        );
    }

    for (slot, light) in ubo.lights.iter_mut().zip(lights.iter()) {
        slot.direction = Vec4::from((light.direction, 1.0)).to_array();
        slot.color = Vec4::from((light.color, light.intensity)).to_array();
    }
    ubo.light_count = lights.len().min(MAX_DIRECTIONAL_LIGHTS) as u32;

    ubo
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct ObjectPushConstants {
    model: [[f32; 4]; 4],
    /// Normal matrix padded to mat4 for std430-friendly alignment.
    normal: [[f32; 4]; 4],
}

pub struct SceneRenderSystem {
    device: Arc<Device>,
    pipeline_layout: vk::PipelineLayout,
    pipeline: Pipeline,
}

impl SceneRenderSystem {
    pub fn new(
        device: Arc<Device>,
        render_pass: vk::RenderPass,
        set_layouts: &[vk::DescriptorSetLayout],
    ) -> Result<Self> {
        let push_constant_range = vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT)
            .offset(0)
            .size(std::mem::size_of::<ObjectPushConstants>() as u32);

        let ranges = [push_constant_range];
        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(set_layouts)
            .push_constant_ranges(&ranges);
        let pipeline_layout = unsafe {
            device.device.create_pipeline_layout(&layout_info, None)
        }
        .context("Failed to create scene pipeline layout")?;

        let mut config = PipelineConfig::scene(render_pass, pipeline_layout);
        config.binding_descriptions = Vertex::binding_descriptions();
        config.attribute_descriptions = Vertex::attribute_descriptions();

        let pipeline = Pipeline::new(
            device.clone(),
            "shaders/scene.vert.spv",
            "shaders/scene.frag.spv",
            &config,
        )?;

        Ok(Self {
            device,
            pipeline_layout,
            pipeline,
        })
    }

    pub fn render(&self, frame_info: &FrameInfo, objects: &[GameObject]) {
        let cmd = frame_info.command_buffer;
        self.pipeline.bind(cmd);

        unsafe {
            self.device.device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline_layout,
                0,
                &[frame_info.global_descriptor_set],
                &[],
            );
        }

        for object in objects {
            let push = ObjectPushConstants {
                model: object.transform.matrix().to_cols_array_2d(),
                normal: Mat4::from_mat3(object.transform.normal_matrix()).to_cols_array_2d(),
            };

            unsafe {
                self.device.device.cmd_bind_descriptor_sets(
                    cmd,
                    vk::PipelineBindPoint::GRAPHICS,
                    self.pipeline_layout,
                    1,
                    &[object.descriptor_sets[frame_info.frame_index]],
                    &[],
                );
                self.device.device.cmd_push_constants(
                    cmd,
                    self.pipeline_layout,
                    vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                    0,
                    bytemuck::bytes_of(&push),
                );
            }

            object.model.bind(&self.device, cmd);
            object.model.draw(&self.device, cmd);
        }
    }
}

impl Drop for SceneRenderSystem {
    fn drop(&mut self) {
        unsafe {
            self.device
                .device
                .destroy_pipeline_layout(self.pipeline_layout, None);
        }
    }
}

// Matches the overlay shader's push constant block; color sits at a
// 16-byte boundary under std430, hence the padding.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct OverlayPushConstants {
    transform: [[f32; 2]; 2],
    offset: [f32; 2],
    _pad: [f32; 2],
    color: [f32; 3],
    _pad2: f32,
}

pub struct OverlayRenderSystem {
    device: Arc<Device>,
    pipeline_layout: vk::PipelineLayout,
    pipeline: Pipeline,
}

impl OverlayRenderSystem {
    pub fn new(device: Arc<Device>, render_pass: vk::RenderPass) -> Result<Self> {
        let push_constant_range = vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT)
            .offset(0)
            .size(std::mem::size_of::<OverlayPushConstants>() as u32);

        let ranges = [push_constant_range];
        let layout_info = vk::PipelineLayoutCreateInfo::default().push_constant_ranges(&ranges);
        let pipeline_layout = unsafe {
            device.device.create_pipeline_layout(&layout_info, None)
        }
        .context("Failed to create overlay pipeline layout")?;

        let mut config = PipelineConfig::overlay(render_pass, pipeline_layout);
        config.binding_descriptions = OverlayVertex::binding_descriptions();
        config.attribute_descriptions = OverlayVertex::attribute_descriptions();

        let pipeline = Pipeline::new(
            device.clone(),
            "shaders/overlay.vert.spv",
            "shaders/overlay.frag.spv",
            &config,
        )?;

        Ok(Self {
            device,
            pipeline_layout,
            pipeline,
        })
    }

    pub fn render(&self, frame_info: &FrameInfo, objects: &[OverlayObject]) {
        let cmd = frame_info.command_buffer;
        self.pipeline.bind(cmd);

        for object in objects {
            let push = OverlayPushConstants {
                transform: object.transform.matrix().to_cols_array_2d(),
                offset: object.transform.translation.to_array(),
                _pad: [0.0; 2],
                color: object.color.to_array(),
                _pad2: 0.0,
            };

            unsafe {
                self.device.device.cmd_push_constants(
                    cmd,
                    self.pipeline_layout,
                    vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                    0,
                    bytemuck::bytes_of(&push),
                );
            }

            object.model.bind(&self.device, cmd);
            object.model.draw(&self.device, cmd);
        }
    }
}

impl Drop for OverlayRenderSystem {
    fn drop(&mut self) {
        unsafe {
            self.device
                .device
                .destroy_pipeline_layout(self.pipeline_layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn light(intensity: f32) -> SceneLight {
        SceneLight {
            direction: Vec3::new(1.0, -3.0, -1.0),
            color: Vec3::new(1.0, 1.0, 1.0),
            intensity,
        }
    }

    #[test]
    fn ubo_packs_camera_matrices() {
        let mut camera = Camera::default();
        camera.set_perspective(1.0, 1.5, 0.1, 50.0);
        let ubo = build_global_ubo(&camera, &[]);
        assert_eq!(ubo.projection, camera.projection().to_cols_array_2d());
        assert_eq!(ubo.view, camera.view().to_cols_array_2d());
        assert_eq!(ubo.light_count, 0);
    }

    #[test]
    fn ubo_packs_direction_and_intensity() {
        let camera = Camera::default();
        let ubo = build_global_ubo(&camera, &[light(2.5)]);
        assert_eq!(ubo.light_count, 1);
        assert_eq!(ubo.lights[0].direction, [1.0, -3.0, -1.0, 1.0]);
        assert_eq!(ubo.lights[0].color, [1.0, 1.0, 1.0, 2.5]);
    }

    #[test]
    fn ubo_caps_light_count() {
        let camera = Camera::default();
        let lights: Vec<SceneLight> = (0..MAX_DIRECTIONAL_LIGHTS + 3)
            .map(|i| light(i as f32))
            .collect();
        let ubo = build_global_ubo(&camera, &lights);
        assert_eq!(ubo.light_count, MAX_DIRECTIONAL_LIGHTS as u32);
        // The kept lights are the first N in order
        assert_eq!(ubo.lights[0].color[3], 0.0);
        assert_eq!(
            ubo.lights[MAX_DIRECTIONAL_LIGHTS - 1].color[3],
            (MAX_DIRECTIONAL_LIGHTS - 1) as f32
        );
    }

    #[test]
    fn ubo_size_is_std140_compatible() {
        // 2 mat4 + 4 lights of 2 vec4 each + count padded to vec4
        let expected = 2 * 64 + MAX_DIRECTIONAL_LIGHTS * 32 + 16;
        assert_eq!(std::mem::size_of::<GlobalUbo>(), expected);
    }

    #[test]
    fn push_constant_blocks_fit_within_guaranteed_limit() {
        // 128 bytes is the minimum maxPushConstantsSize
        assert_eq!(std::mem::size_of::<ObjectPushConstants>(), 128);
        assert!(std::mem::size_of::<OverlayPushConstants>() <= 128);
        assert_eq!(std::mem::size_of::<OverlayPushConstants>(), 48);
    }
}
