// Frame lifecycle
//
// Owns the swapchain and one primary command buffer per frame in
// flight. Callers drive a strict begin_frame / begin_render_pass /
// end_render_pass / end_frame sequence; calling out of order is a
// programming error and asserts. Swapchain staleness is absorbed here
// through transparent recreation.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;
use winit::window::Window;

use crate::backend::swapchain::{Swapchain, MAX_FRAMES_IN_FLIGHT};
use crate::backend::Device;

/// What an acquire attempt means for the frame about to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image is available; `suboptimal` flags a pending recreation
    /// after the frame completes.
    Ready { image_index: u32, suboptimal: bool },
    /// The swapchain no longer matches the surface; recreate and skip
    /// this frame.
    OutOfDate,
}

/// Fold the acquire result into a frame decision. Only OUT_OF_DATE and
/// SUBOPTIMAL are recoverable; everything else is a real error.
pub fn classify_acquire(
    result: std::result::Result<(u32, bool), vk::Result>,
) -> Result<AcquireOutcome> {
    match result {
        Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Ready {
            image_index,
            suboptimal,
        }),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
        Err(e) => Err(anyhow::anyhow!(e).context("Failed to acquire swapchain image")),
    }
}

pub struct Renderer {
    device: Arc<Device>,
    window: Arc<Window>,
    swapchain: Swapchain,
    command_buffers: Vec<vk::CommandBuffer>,
    clear_color: [f32; 4],
    present_mode: vk::PresentModeKHR,

    current_image_index: u32,
    is_frame_started: bool,
    window_resized: bool,
}

impl Renderer {
    pub fn new(
        device: Arc<Device>,
        window: Arc<Window>,
        clear_color: [f32; 4],
        present_mode: vk::PresentModeKHR,
    ) -> Result<Self> {
        let swapchain = Swapchain::new(
            device.clone(),
            window_extent(&window),
            present_mode,
            None,
        )?;
        let command_buffers = allocate_command_buffers(&device)?;

        Ok(Self {
            device,
            window,
            swapchain,
            command_buffers,
            clear_color,
            present_mode,
            current_image_index: 0,
            is_frame_started: false,
            window_resized: false,
        })
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.swapchain.render_pass()
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.swapchain.extent_aspect_ratio()
    }

    pub fn frame_in_progress(&self) -> bool {
        self.is_frame_started
    }

    /// Frame-in-flight slot of the frame being recorded. Only meaningful
    /// between begin_frame and end_frame.
    pub fn frame_index(&self) -> usize {
        assert!(
            self.is_frame_started,
            "Cannot get frame index when no frame is in progress"
        );
        self.swapchain.frame_index()
    }

    pub fn current_command_buffer(&self) -> vk::CommandBuffer {
        assert!(
            self.is_frame_started,
            "Cannot get command buffer when no frame is in progress"
        );
        self.command_buffers[self.swapchain.frame_index()]
    }

    pub fn note_window_resized(&mut self) {
        self.window_resized = true;
    }

    /// Acquire an image and begin recording. Returns `None` when the
    /// swapchain had to be recreated and the caller should skip this
    /// frame entirely.
    pub fn begin_frame(&mut self) -> Result<Option<vk::CommandBuffer>> {
        assert!(
            !self.is_frame_started,
            "Cannot begin a frame while another is in progress"
        );

        match classify_acquire(self.swapchain.acquire_next_image())? {
            AcquireOutcome::OutOfDate => {
                self.recreate_swapchain()?;
                return Ok(None);
            }
            AcquireOutcome::Ready { image_index, .. } => {
                self.current_image_index = image_index;
            }
        }

        self.is_frame_started = true;

        let command_buffer = self.current_command_buffer();
        let begin_info = vk::CommandBufferBeginInfo::default();
        unsafe {
            self.device
                .device
                .begin_command_buffer(command_buffer, &begin_info)
        }
        .context("Failed to begin command buffer")?;

        Ok(Some(command_buffer))
    }

    /// Finish recording, submit, and present. Recreates the swapchain
    /// when presentation reports it stale or the window was resized.
    pub fn end_frame(&mut self) -> Result<()> {
        assert!(
            self.is_frame_started,
            "Cannot end a frame when none is in progress"
        );

        let command_buffer = self.current_command_buffer();
        unsafe { self.device.device.end_command_buffer(command_buffer) }
            .context("Failed to end command buffer")?;

        let result = self
            .swapchain
            .submit_command_buffers(command_buffer, self.current_image_index);

        match result {
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) | Ok(true) => {
                self.window_resized = false;
                self.recreate_swapchain()?;
            }
            Ok(false) if self.window_resized => {
                self.window_resized = false;
                self.recreate_swapchain()?;
            }
            Ok(false) => {}
            Err(e) => {
                return Err(anyhow::anyhow!(e).context("Failed to present swapchain image"))
            }
        }

        self.is_frame_started = false;
        Ok(())
    }

    pub fn begin_render_pass(&self, command_buffer: vk::CommandBuffer) {
        assert!(
            self.is_frame_started,
            "Cannot begin render pass when no frame is in progress"
        );
        assert_eq!(
            command_buffer,
            self.current_command_buffer(),
            "Cannot begin render pass on a command buffer from a different frame"
        );

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.clear_color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ];

        let extent = self.swapchain.extent();
        let render_pass_info = vk::RenderPassBeginInfo::default()
            .render_pass(self.swapchain.render_pass())
            .framebuffer(self.swapchain.framebuffer(self.current_image_index as usize))
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(&clear_values);

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };

        unsafe {
            self.device.device.cmd_begin_render_pass(
                command_buffer,
                &render_pass_info,
                vk::SubpassContents::INLINE,
            );
            self.device
                .device
                .cmd_set_viewport(command_buffer, 0, &[viewport]);
            self.device
                .device
                .cmd_set_scissor(command_buffer, 0, &[scissor]);
        }
    }

    pub fn end_render_pass(&self, command_buffer: vk::CommandBuffer) {
        assert!(
            self.is_frame_started,
            "Cannot end render pass when no frame is in progress"
        );
        assert_eq!(
            command_buffer,
            self.current_command_buffer(),
            "Cannot end render pass on a command buffer from a different frame"
        );

        unsafe {
            self.device.device.cmd_end_render_pass(command_buffer);
        }
    }

    fn recreate_swapchain(&mut self) -> Result<()> {
        let extent = window_extent(&self.window);
        if extent.width == 0 || extent.height == 0 {
            // Minimized; leave the stale swapchain in place and let a
            // later frame retry once the window has area again
            log::debug!("Skipping swapchain recreation while extent is zero");
            return Ok(());
        }

        log::info!(
            "Recreating swapchain at {}x{}",
            extent.width,
            extent.height
        );
        self.device.wait_idle()?;

        let new_swapchain = Swapchain::new(
            self.device.clone(),
            extent,
            self.present_mode,
            Some(&self.swapchain),
        )?;
        new_swapchain.compare_formats(&self.swapchain)?;
        self.swapchain = new_swapchain;

        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        unsafe {
            self.device
                .device
                .free_command_buffers(self.device.command_pool(), &self.command_buffers);
        }
    }
}

fn window_extent(window: &Window) -> vk::Extent2D {
    let size = window.inner_size();
    vk::Extent2D {
        width: size.width,
        height: size.height,
    }
}

fn allocate_command_buffers(device: &Device) -> Result<Vec<vk::CommandBuffer>> {
    let alloc_info = vk::CommandBufferAllocateInfo::default()
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_pool(device.command_pool())
        .command_buffer_count(MAX_FRAMES_IN_FLIGHT as u32);

    unsafe { device.device.allocate_command_buffers(&alloc_info) }
        .context("Failed to allocate frame command buffers")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_success_carries_image_index() {
        let outcome = classify_acquire(Ok((3, false))).unwrap();
        assert_eq!(
            outcome,
            AcquireOutcome::Ready {
                image_index: 3,
                suboptimal: false
            }
        );
    }

    #[test]
    fn suboptimal_acquire_still_renders() {
        let outcome = classify_acquire(Ok((0, true))).unwrap();
        assert_eq!(
            outcome,
            AcquireOutcome::Ready {
                image_index: 0,
                suboptimal: true
            }
        );
    }

    #[test]
    fn out_of_date_acquire_requests_recreation() {
        let outcome = classify_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap();
        assert_eq!(outcome, AcquireOutcome::OutOfDate);
    }

    #[test]
    fn device_loss_is_fatal() {
        assert!(classify_acquire(Err(vk::Result::ERROR_DEVICE_LOST)).is_err());
    }
}
