// =============================================================================
// VKFORGE - Vulkan scene renderer
// =============================================================================
//
// FRAME FLOW:
// 1. Poll input, advance the frame clock
// 2. Move the camera, update object animation
// 3. Upload the global UBO for this frame-in-flight slot
// 4. Acquire a swapchain image (skip the frame if the swapchain is stale)
// 5. Record the scene pass, then the overlay pass
// 6. Submit and present
//
// =============================================================================

mod backend;
mod config;
mod input;
mod render_system;
mod renderer;
mod scene;
mod time;

use anyhow::{Context, Result};
use ash::vk;
use glam::{Vec2, Vec3};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Fullscreen, Window, WindowAttributes},
};

use backend::swapchain::MAX_FRAMES_IN_FLIGHT;
use backend::{
    checkerboard_pixels, flat_normal_pixels, Buffer, DescriptorPool, DescriptorSetLayout,
    DescriptorWriter, Device, LayoutBinding, LayoutConfig, PoolConfig, PoolSize, Texture,
};
use config::Config;
use input::{CameraController, InputState};
use render_system::{
    build_global_ubo, FrameInfo, GlobalUbo, OverlayRenderSystem, SceneRenderSystem,
};
use renderer::Renderer;
use scene::model::{Model, OverlayVertex};
use scene::{Camera, GameObject, OverlayObject, Scene, SceneLight, Transform};
use time::FrameClock;

fn main() -> Result<()> {
    let config = Config::load();
    init_logging();
    log::info!("Starting renderer");
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        if config.window.fullscreen {
            "fullscreen"
        } else {
            "windowed"
        }
    );

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    if let Some(error) = app.fatal_error.take() {
        for cause in error.chain() {
            log::error!("  {}", cause);
        }
        return Err(error);
    }
    Ok(())
}

fn init_logging() {
    use env_logger::Builder;
    use log::LevelFilter;

    let mut builder = Builder::from_default_env();
    builder.filter_level(LevelFilter::Info);
    builder.init();
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

struct App {
    config: Config,
    window: Option<Arc<Window>>,
    state: Option<VulkanState>,
    fatal_error: Option<anyhow::Error>,
    is_minimized: bool,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            window: None,
            state: None,
            fatal_error: None,
            is_minimized: false,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("Fatal: {:?}", error);
        self.fatal_error = Some(error);
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let mut window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));
        if self.config.window.fullscreen {
            window_attributes =
                window_attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                self.fail(event_loop, anyhow::anyhow!(e).context("Failed to create window"));
                return;
            }
        };

        match VulkanState::new(&self.config, window.clone()) {
            Ok(state) => self.state = Some(state),
            Err(e) => {
                self.fail(event_loop, e.context("Failed to initialize Vulkan"));
                return;
            }
        }

        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let Some(state) = self.state.as_mut() else {
            return;
        };

        state.input.handle_event(&event);

        let mut render_error = None;
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                let _ = state.device.wait_idle();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                if size.width == 0 || size.height == 0 {
                    self.is_minimized = true;
                } else {
                    self.is_minimized = false;
                    state.renderer.note_window_resized();
                }
            }
            WindowEvent::RedrawRequested => {
                if self.is_minimized {
                    return;
                }
                if let Err(e) = state.render_frame() {
                    render_error = Some(e);
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state.is_pressed() && !event.repeat {
                    if let PhysicalKey::Code(key) = event.physical_key {
                        match key {
                            KeyCode::Escape => {
                                log::info!("ESC pressed, exiting...");
                                event_loop.exit();
                            }
                            KeyCode::F5 => {
                                state.rotate_models = !state.rotate_models;
                                log::info!(
                                    "Model rotation {}",
                                    if state.rotate_models { "on" } else { "off" }
                                );
                            }
                            _ => {}
                        }
                    }
                }
            }
            _ => {}
        }

        if let Some(e) = render_error {
            self.fail(event_loop, e.context("Render error"));
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}

// =============================================================================
// VULKAN STATE
// =============================================================================

/// Everything that lives for the duration of the rendering session.
/// Fields drop in declaration order; the Drop impl waits for the GPU
/// first so teardown never races in-flight work.
struct VulkanState {
    renderer: Renderer,
    scene_system: SceneRenderSystem,
    overlay_system: OverlayRenderSystem,

    ubo_buffers: Vec<Buffer>,
    global_sets: Vec<vk::DescriptorSet>,
    _material_layout: DescriptorSetLayout,
    _global_layout: DescriptorSetLayout,
    _descriptor_pool: DescriptorPool,
    _placeholder_albedo: Arc<Texture>,
    _placeholder_normal: Arc<Texture>,
    _textures: Vec<Arc<Texture>>,

    scene: Scene,
    camera: Camera,
    viewer: Transform,
    controller: CameraController,
    input: InputState,
    clock: FrameClock,
    rotate_models: bool,

    show_fps: bool,
    frame_count: u32,
    fps_timer: Instant,

    device: Arc<Device>,
}

impl VulkanState {
    fn new(config: &Config, window: Arc<Window>) -> Result<Self> {
        let device = Device::new(
            &window,
            &config.window.title,
            config.debug.validation_layers,
        )?;
        let renderer = Renderer::new(
            device.clone(),
            window,
            config.graphics.clear_color,
            config.get_present_mode(),
        )?;

        let model_count = config.scene.models.len().max(1);
        let descriptor_pool = DescriptorPool::new(
            device.clone(),
            PoolConfig {
                max_sets: (MAX_FRAMES_IN_FLIGHT * (1 + model_count)) as u32,
                pool_sizes: vec![
                    PoolSize {
                        descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
                        count: MAX_FRAMES_IN_FLIGHT as u32,
                    },
                    PoolSize {
                        descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                        count: (MAX_FRAMES_IN_FLIGHT * model_count * 2) as u32,
                    },
                ],
                flags: vk::DescriptorPoolCreateFlags::empty(),
            },
        )?;

        let global_layout = DescriptorSetLayout::new(
            device.clone(),
            LayoutConfig {
                bindings: vec![LayoutBinding {
                    binding: 0,
                    descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
                    stage_flags: vk::ShaderStageFlags::ALL_GRAPHICS,
                    count: 1,
                }],
            },
        )?;
        let material_layout = DescriptorSetLayout::new(
            device.clone(),
            LayoutConfig {
                bindings: vec![
                    LayoutBinding {
                        binding: 0,
                        descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                        stage_flags: vk::ShaderStageFlags::FRAGMENT,
                        count: 1,
                    },
                    LayoutBinding {
                        binding: 1,
                        descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                        stage_flags: vk::ShaderStageFlags::FRAGMENT,
                        count: 1,
                    },
                ],
            },
        )?;

        let mut ubo_buffers = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        let mut global_sets = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            let mut buffer = Buffer::new(
                device.clone(),
                std::mem::size_of::<GlobalUbo>() as vk::DeviceSize,
                1,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                vk::MemoryPropertyFlags::HOST_VISIBLE,
                0,
            )?;
            buffer.map()?;

            let set = DescriptorWriter::new(&global_layout, &descriptor_pool)
                .write_buffer(0, buffer.descriptor_info(vk::WHOLE_SIZE, 0))
                .build()?;

            ubo_buffers.push(buffer);
            global_sets.push(set);
        }

        const PLACEHOLDER_DIM: u32 = 64;
        let placeholder_albedo = Arc::new(Texture::from_pixels(
            device.clone(),
            &checkerboard_pixels(PLACEHOLDER_DIM),
            PLACEHOLDER_DIM,
            PLACEHOLDER_DIM,
            vk::Format::R8G8B8A8_SRGB,
        )?);
        let placeholder_normal = Arc::new(Texture::from_pixels(
            device.clone(),
            &flat_normal_pixels(PLACEHOLDER_DIM),
            PLACEHOLDER_DIM,
            PLACEHOLDER_DIM,
            vk::Format::R8G8B8A8_UNORM,
        )?);

        let (scene, textures) = load_scene(
            config,
            &device,
            &descriptor_pool,
            &material_layout,
            &placeholder_albedo,
            &placeholder_normal,
        )?;

        let scene_system = SceneRenderSystem::new(
            device.clone(),
            renderer.render_pass(),
            &[global_layout.handle(), material_layout.handle()],
        )?;
        let overlay_system = OverlayRenderSystem::new(device.clone(), renderer.render_pass())?;

        log::info!("Vulkan initialized");

        Ok(Self {
            renderer,
            scene_system,
            overlay_system,
            ubo_buffers,
            global_sets,
            _material_layout: material_layout,
            _global_layout: global_layout,
            _descriptor_pool: descriptor_pool,
            _placeholder_albedo: placeholder_albedo,
            _placeholder_normal: placeholder_normal,
            _textures: textures,
            scene,
            camera: Camera::default(),
            viewer: Transform {
                translation: Vec3::new(0.0, 0.0, -4.0),
                ..Default::default()
            },
            controller: CameraController::new(
                config.controls.move_speed,
                config.controls.turn_speed,
            ),
            input: InputState::new(),
            clock: FrameClock::new(),
            rotate_models: false,
            show_fps: config.debug.show_fps,
            frame_count: 0,
            fps_timer: Instant::now(),
            device,
        })
    }

    fn render_frame(&mut self) -> Result<()> {
        self.clock.tick();
        let delta = self.clock.delta();

        self.controller
            .update(&mut self.input, delta, &mut self.viewer);
        self.camera
            .set_view_yxz(self.viewer.translation, self.viewer.rotation);
        self.camera.set_perspective(
            45f32.to_radians(),
            self.renderer.aspect_ratio(),
            0.3,
            100.0,
        );

        if self.rotate_models {
            for object in &mut self.scene.objects {
                object.transform.rotation.y =
                    (object.transform.rotation.y + 30f32.to_radians() * delta)
                        .rem_euclid(std::f32::consts::TAU);
            }
        }
        for overlay in &mut self.scene.overlay {
            overlay.transform.rotation =
                (overlay.transform.rotation + 0.5 * delta).rem_euclid(std::f32::consts::TAU);
        }

        let Some(command_buffer) = self.renderer.begin_frame()? else {
            // Swapchain was recreated; nothing to record this frame
            return Ok(());
        };
        let frame_index = self.renderer.frame_index();

        let ubo = build_global_ubo(&self.camera, &self.scene.lights);
        let buffer = &mut self.ubo_buffers[frame_index];
        buffer.write_to_buffer(bytemuck::bytes_of(&ubo), 0);
        buffer.flush(vk::WHOLE_SIZE, 0)?;

        let frame_info = FrameInfo {
            frame_index,
            command_buffer,
            global_descriptor_set: self.global_sets[frame_index],
        };

        self.renderer.begin_render_pass(command_buffer);
        self.scene_system.render(&frame_info, &self.scene.objects);
        self.overlay_system.render(&frame_info, &self.scene.overlay);
        self.renderer.end_render_pass(command_buffer);
        self.renderer.end_frame()?;

        if self.show_fps {
            self.update_fps();
        }
        Ok(())
    }

    fn update_fps(&mut self) {
        self.frame_count += 1;
        let elapsed = self.fps_timer.elapsed();
        if elapsed.as_secs_f32() >= 1.0 {
            log::info!(
                "FPS: {:.0}",
                self.frame_count as f32 / elapsed.as_secs_f32()
            );
            self.frame_count = 0;
            self.fps_timer = Instant::now();
        }
    }
}

impl Drop for VulkanState {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");
        let _ = self.device.wait_idle();
    }
}

// =============================================================================
// SCENE SETUP
// =============================================================================

fn load_scene(
    config: &Config,
    device: &Arc<Device>,
    pool: &DescriptorPool,
    material_layout: &DescriptorSetLayout,
    placeholder_albedo: &Arc<Texture>,
    placeholder_normal: &Arc<Texture>,
) -> Result<(Scene, Vec<Arc<Texture>>)> {
    let mut scene = Scene::new();
    let mut textures = Vec::new();

    scene.lights.push(SceneLight {
        direction: Vec3::new(1.0, -3.0, -1.0).normalize(),
        color: Vec3::ONE,
        intensity: 1.0,
    });

    for model_config in &config.scene.models {
        let model = Rc::new(
            Model::load_obj(device.clone(), &model_config.obj)
                .with_context(|| format!("Failed to load model {}", model_config.obj))?,
        );

        let diffuse = model_config
            .diffuse_texture
            .as_deref()
            .map(|path| {
                Texture::new(device.clone(), path, vk::Format::R8G8B8A8_SRGB).map(Arc::new)
            })
            .transpose()?;
        // Normal maps hold vectors, not colors; sampled without sRGB decode
        let normal = model_config
            .normal_texture
            .as_deref()
            .map(|path| {
                Texture::new(device.clone(), path, vk::Format::R8G8B8A8_UNORM).map(Arc::new)
            })
            .transpose()?;

        let mut descriptor_sets = [vk::DescriptorSet::null(); MAX_FRAMES_IN_FLIGHT];
        for set in descriptor_sets.iter_mut() {
            let diffuse_info = diffuse
                .as_ref()
                .unwrap_or(placeholder_albedo)
                .descriptor_info();
            let normal_info = normal
                .as_ref()
                .unwrap_or(placeholder_normal)
                .descriptor_info();
            *set = DescriptorWriter::new(material_layout, pool)
                .write_image(0, diffuse_info)
                .write_image(1, normal_info)
                .build()?;
        }

        if let Some(texture) = &diffuse {
            textures.push(texture.clone());
        }
        if let Some(texture) = &normal {
            textures.push(texture.clone());
        }

        let id = scene.next_id();
        scene.objects.push(GameObject {
            id,
            model,
            diffuse_texture: diffuse,
            normal_texture: normal,
            transform: Transform {
                translation: Vec3::from(model_config.translation),
                scale: Vec3::from(model_config.scale),
                rotation: Vec3::new(
                    model_config.rotation_deg[0].to_radians(),
                    model_config.rotation_deg[1].to_radians(),
                    model_config.rotation_deg[2].to_radians(),
                ),
            },
            descriptor_sets,
        });
    }

    if scene.objects.is_empty() {
        log::warn!("No models configured; scene will only show the overlay");
    }

    // Corner marker so an empty scene still shows something moving
    let triangle = Rc::new(Model::new(
        device.clone(),
        &[
            OverlayVertex {
                position: [0.0, -0.5],
                color: [1.0, 0.0, 0.0],
            },
            OverlayVertex {
                position: [0.5, 0.5],
                color: [0.0, 1.0, 0.0],
            },
            OverlayVertex {
                position: [-0.5, 0.5],
                color: [0.0, 0.0, 1.0],
            },
        ],
        None,
    )?);
    let id = scene.next_id();
    scene.overlay.push(OverlayObject {
        id,
        model: triangle,
        transform: scene::Transform2d {
            translation: Vec2::new(0.7, -0.7),
            scale: Vec2::splat(0.15),
            rotation: 0.0,
        },
        color: Vec3::new(1.0, 0.85, 0.6),
    });

    Ok((scene, textures))
}
