// Swapchain - window presentation
//
// Owns the presentable images plus everything keyed to them: depth
// attachments, render pass, framebuffers, and per-frame sync objects.
// Never mutated in place; resize or staleness replaces the whole object,
// with the old swapchain handed to the new one as a construction
// dependency so the driver can alias resources.

use anyhow::{Context, Result};
use ash::{khr, vk};
use std::sync::Arc;

use super::sync::FrameSync;
use super::Device;

/// Upper bound on frames whose GPU work may be outstanding at once.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Depth formats probed in order; first supported wins.
const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Advance a frame-in-flight slot index.
pub fn next_frame_index(current: usize) -> usize {
    (current + 1) % MAX_FRAMES_IN_FLIGHT
}

/// Image and depth formats must survive a recreation unchanged; a driver
/// handing back different formats after a resize is unrecoverable.
pub fn ensure_formats_stable(
    old: (vk::Format, vk::Format),
    new: (vk::Format, vk::Format),
) -> Result<()> {
    if old != new {
        anyhow::bail!(
            "Swapchain image/depth format changed across recreation: {:?} -> {:?}",
            old,
            new
        );
    }
    Ok(())
}

pub struct Swapchain {
    device: Arc<Device>,
    loader: khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,

    image_format: vk::Format,
    depth_format: vk::Format,
    extent: vk::Extent2D,

    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    depth_images: Vec<vk::Image>,
    depth_memories: Vec<vk::DeviceMemory>,
    depth_views: Vec<vk::ImageView>,

    render_pass: vk::RenderPass,
    framebuffers: Vec<vk::Framebuffer>,

    frame_sync: Vec<FrameSync>,
    /// Fence of the submission currently using each swapchain image, or
    /// null when the image is free. Guards against re-rendering into an
    /// image a previous frame-in-flight slot still owns.
    images_in_flight: Vec<vk::Fence>,
    current_frame: usize,
}

impl Swapchain {
    /// Build a swapchain for `window_extent`. Pass the previous swapchain
    /// when recreating so the driver may reuse its resources.
    pub fn new(
        device: Arc<Device>,
        window_extent: vk::Extent2D,
        preferred_present_mode: vk::PresentModeKHR,
        old: Option<&Swapchain>,
    ) -> Result<Self> {
        let support = device.swapchain_support()?;

        let surface_format = choose_surface_format(&support.formats);
        let present_mode = choose_present_mode(&support.present_modes, preferred_present_mode);
        let extent = choose_extent(&support.capabilities, window_extent);

        log::info!(
            "Creating swapchain: {}x{}, format {:?}, present mode {:?}",
            extent.width,
            extent.height,
            surface_format.format,
            present_mode
        );

        let mut image_count = support.capabilities.min_image_count + 1;
        if support.capabilities.max_image_count > 0
            && image_count > support.capabilities.max_image_count
        {
            image_count = support.capabilities.max_image_count;
        }

        let loader = khr::swapchain::Device::new(&device.instance, &device.device);

        let queue_families = [device.graphics_queue_family, device.present_queue_family];
        let mut create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(device.surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old.map_or(vk::SwapchainKHR::null(), |s| s.swapchain));

        create_info = if device.graphics_queue_family != device.present_queue_family {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&queue_families)
        } else {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        };

        let swapchain = unsafe { loader.create_swapchain(&create_info, None) }
            .context("Failed to create swapchain")?;

        let images = unsafe { loader.get_swapchain_images(swapchain) }?;
        log::info!("Created swapchain with {} images", images.len());

        let image_views = images
            .iter()
            .map(|&image| {
                create_image_view(
                    &device,
                    image,
                    surface_format.format,
                    vk::ImageAspectFlags::COLOR,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        let depth_format = device.find_supported_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
        )?;

        let mut depth_images = Vec::with_capacity(images.len());
        let mut depth_memories = Vec::with_capacity(images.len());
        let mut depth_views = Vec::with_capacity(images.len());
        for _ in 0..images.len() {
            let (image, memory, view) = create_depth_resources(&device, extent, depth_format)?;
            depth_images.push(image);
            depth_memories.push(memory);
            depth_views.push(view);
        }

        let render_pass = create_render_pass(&device, surface_format.format, depth_format)?;

        let framebuffers = image_views
            .iter()
            .zip(&depth_views)
            .map(|(&color_view, &depth_view)| {
                let attachments = [color_view, depth_view];
                let framebuffer_info = vk::FramebufferCreateInfo::default()
                    .render_pass(render_pass)
                    .attachments(&attachments)
                    .width(extent.width)
                    .height(extent.height)
                    .layers(1);
                unsafe { device.device.create_framebuffer(&framebuffer_info, None) }
                    .context("Failed to create framebuffer")
            })
            .collect::<Result<Vec<_>>>()?;

        let frame_sync = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|_| FrameSync::new(&device))
            .collect::<Result<Vec<_>>>()?;
        let images_in_flight = vec![vk::Fence::null(); images.len()];

        Ok(Self {
            device,
            loader,
            swapchain,
            image_format: surface_format.format,
            depth_format,
            extent,
            images,
            image_views,
            depth_images,
            depth_memories,
            depth_views,
            render_pass,
            framebuffers,
            frame_sync,
            images_in_flight,
            current_frame: 0,
        })
    }

    /// Wait for this frame slot's previous submission, then acquire the
    /// next presentable image, signaling the slot's acquire semaphore.
    /// All waits are indefinite.
    pub fn acquire_next_image(&self) -> std::result::Result<(u32, bool), vk::Result> {
        let sync = &self.frame_sync[self.current_frame];
        unsafe {
            self.device
                .device
                .wait_for_fences(&[sync.in_flight_fence], true, u64::MAX)?;

            self.loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                sync.image_available,
                vk::Fence::null(),
            )
        }
    }

    /// Submit the recorded command buffer for `image_index` and present.
    /// Advances the frame-in-flight index. Returns `Ok(true)` when the
    /// presentation engine reports the swapchain suboptimal.
    pub fn submit_command_buffers(
        &mut self,
        command_buffer: vk::CommandBuffer,
        image_index: u32,
    ) -> std::result::Result<bool, vk::Result> {
        let image_idx = image_index as usize;

        unsafe {
            // Another frame slot may still be rendering into this image
            if self.images_in_flight[image_idx] != vk::Fence::null() {
                self.device.device.wait_for_fences(
                    &[self.images_in_flight[image_idx]],
                    true,
                    u64::MAX,
                )?;
            }
            let sync = &self.frame_sync[self.current_frame];
            self.images_in_flight[image_idx] = sync.in_flight_fence;

            self.device.device.reset_fences(&[sync.in_flight_fence])?;

            let wait_semaphores = [sync.image_available];
            let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
            let signal_semaphores = [sync.render_finished];
            let command_buffers = [command_buffer];

            let submit_info = vk::SubmitInfo::default()
                .wait_semaphores(&wait_semaphores)
                .wait_dst_stage_mask(&wait_stages)
                .command_buffers(&command_buffers)
                .signal_semaphores(&signal_semaphores);

            self.device.device.queue_submit(
                self.device.graphics_queue,
                &[submit_info],
                sync.in_flight_fence,
            )?;

            let swapchains = [self.swapchain];
            let image_indices = [image_index];
            let present_info = vk::PresentInfoKHR::default()
                .wait_semaphores(&signal_semaphores)
                .swapchains(&swapchains)
                .image_indices(&image_indices);

            let result = self
                .loader
                .queue_present(self.device.present_queue, &present_info);

            self.current_frame = next_frame_index(self.current_frame);

            result
        }
    }

    pub fn compare_formats(&self, other: &Swapchain) -> Result<()> {
        ensure_formats_stable(
            (other.image_format, other.depth_format),
            (self.image_format, self.depth_format),
        )
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    pub fn framebuffer(&self, index: usize) -> vk::Framebuffer {
        self.framebuffers[index]
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn extent_aspect_ratio(&self) -> f32 {
        self.extent.width as f32 / self.extent.height as f32
    }

    pub fn image_format(&self) -> vk::Format {
        self.image_format
    }

    pub fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    pub fn frame_index(&self) -> usize {
        self.current_frame
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        let device = &self.device.device;
        unsafe {
            for sync in &self.frame_sync {
                sync.destroy(device);
            }
            for &framebuffer in &self.framebuffers {
                device.destroy_framebuffer(framebuffer, None);
            }
            device.destroy_render_pass(self.render_pass, None);
            for i in 0..self.depth_images.len() {
                device.destroy_image_view(self.depth_views[i], None);
                device.destroy_image(self.depth_images[i], None);
                device.free_memory(self.depth_memories[i], None);
            }
            for &view in &self.image_views {
                device.destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

/// Prefer BGRA8 SRGB with SRGB nonlinear colorspace, else take the first
/// advertised format.
fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .unwrap_or(formats[0])
}

/// Use the preferred mode when the surface offers it; FIFO is the only
/// mode every driver guarantees.
fn choose_present_mode(
    present_modes: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    present_modes
        .iter()
        .copied()
        .find(|&mode| mode == preferred)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    window_extent: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: window_extent.width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: window_extent.height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

pub fn create_image_view(
    device: &Device,
    image: vk::Image,
    format: vk::Format,
    aspect_mask: vk::ImageAspectFlags,
) -> Result<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });

    unsafe { device.device.create_image_view(&create_info, None) }
        .context("Failed to create image view")
}

fn create_depth_resources(
    device: &Device,
    extent: vk::Extent2D,
    format: vk::Format,
) -> Result<(vk::Image, vk::DeviceMemory, vk::ImageView)> {
    let image_info = vk::ImageCreateInfo::default()
        .image_type(vk::ImageType::TYPE_2D)
        .extent(vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(1)
        .format(format)
        .tiling(vk::ImageTiling::OPTIMAL)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
        .samples(vk::SampleCountFlags::TYPE_1)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);

    let (image, memory) =
        device.create_image_with_info(&image_info, vk::MemoryPropertyFlags::DEVICE_LOCAL)?;
    let view = create_image_view(device, image, format, vk::ImageAspectFlags::DEPTH)?;

    Ok((image, memory, view))
}

fn create_render_pass(
    device: &Device,
    color_format: vk::Format,
    depth_format: vk::Format,
) -> Result<vk::RenderPass> {
    let color_attachment = vk::AttachmentDescription::default()
        .format(color_format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR);

    let depth_attachment = vk::AttachmentDescription::default()
        .format(depth_format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::DONT_CARE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

    let color_attachment_ref = vk::AttachmentReference::default()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    let depth_attachment_ref = vk::AttachmentReference::default()
        .attachment(1)
        .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

    let color_attachments = [color_attachment_ref];
    let subpass = vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_attachments)
        .depth_stencil_attachment(&depth_attachment_ref);

    let dependency = vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        )
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        )
        .dst_access_mask(
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        );

    let attachments = [color_attachment, depth_attachment];
    let subpasses = [subpass];
    let dependencies = [dependency];

    let render_pass_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    unsafe { device.device.create_render_pass(&render_pass_info, None) }
        .context("Failed to create render pass")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_index_cycles_modulo_frames_in_flight() {
        let mut frame = 0;
        for _ in 0..MAX_FRAMES_IN_FLIGHT + 1 {
            frame = next_frame_index(frame);
        }
        assert_eq!(frame, 1 % MAX_FRAMES_IN_FLIGHT);
    }

    #[test]
    fn frame_index_stays_in_bounds() {
        let mut frame = 0;
        for _ in 0..10 {
            frame = next_frame_index(frame);
            assert!(frame < MAX_FRAMES_IN_FLIGHT);
        }
    }

    #[test]
    fn matching_formats_pass_stability_check() {
        let pair = (vk::Format::B8G8R8A8_SRGB, vk::Format::D32_SFLOAT);
        assert!(ensure_formats_stable(pair, pair).is_ok());
    }

    #[test]
    fn format_change_across_recreation_is_fatal() {
        let old = (vk::Format::B8G8R8A8_SRGB, vk::Format::D32_SFLOAT);
        let new = (vk::Format::B8G8R8A8_UNORM, vk::Format::D32_SFLOAT);
        let err = ensure_formats_stable(old, new).unwrap_err();
        assert!(err.to_string().contains("format changed"));

        let new_depth = (vk::Format::B8G8R8A8_SRGB, vk::Format::D24_UNORM_S8_UINT);
        assert!(ensure_formats_stable(old, new_depth).is_err());
    }

    #[test]
    fn surface_format_prefers_bgra_srgb() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];
        assert_eq!(
            choose_surface_format(&formats).format,
            vk::Format::B8G8R8A8_SRGB
        );
    }

    #[test]
    fn surface_format_falls_back_to_first() {
        let formats = [vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }];
        assert_eq!(
            choose_surface_format(&formats).format,
            vk::Format::R8G8B8A8_UNORM
        );
    }

    #[test]
    fn present_mode_honors_preference_when_available() {
        assert_eq!(
            choose_present_mode(
                &[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
                vk::PresentModeKHR::MAILBOX
            ),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(
                &[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE],
                vk::PresentModeKHR::IMMEDIATE
            ),
            vk::PresentModeKHR::IMMEDIATE
        );
    }

    #[test]
    fn present_mode_falls_back_to_fifo() {
        assert_eq!(
            choose_present_mode(
                &[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::FIFO_RELAXED],
                vk::PresentModeKHR::MAILBOX
            ),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn extent_clamped_to_surface_bounds() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 200,
                height: 200,
            },
            max_image_extent: vk::Extent2D {
                width: 1000,
                height: 1000,
            },
            ..Default::default()
        };
        let chosen = choose_extent(
            &caps,
            vk::Extent2D {
                width: 50,
                height: 4000,
            },
        );
        assert_eq!(chosen.width, 200);
        assert_eq!(chosen.height, 1000);
    }
}
