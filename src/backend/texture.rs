// Sampled 2D textures
//
// Pixels are decoded on the CPU, staged through a host-visible buffer,
// and copied into a device-local image. The image only ever moves
// through two layout transitions: UNDEFINED -> TRANSFER_DST_OPTIMAL
// before the copy and TRANSFER_DST_OPTIMAL -> SHADER_READ_ONLY_OPTIMAL
// after it. Any other transition is a bug.

use anyhow::{Context, Result};
use ash::vk;
use std::path::Path;
use std::sync::Arc;

use super::buffer::Buffer;
use super::swapchain::create_image_view;
use super::Device;

/// Access masks and pipeline stages for a supported layout transition.
pub fn transition_masks(
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> Result<(
    vk::AccessFlags,
    vk::AccessFlags,
    vk::PipelineStageFlags,
    vk::PipelineStageFlags,
)> {
    match (old_layout, new_layout) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => Ok((
            vk::AccessFlags::empty(),
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TRANSFER,
        )),
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => {
            Ok((
                vk::AccessFlags::TRANSFER_WRITE,
                vk::AccessFlags::SHADER_READ,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
            ))
        }
        _ => anyhow::bail!(
            "Unsupported image layout transition: {:?} -> {:?}",
            old_layout,
            new_layout
        ),
    }
}

/// Flat checkerboard pattern, used as the stand-in albedo when an
/// object has no diffuse texture configured.
pub fn checkerboard_pixels(size: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let light = (x / (size / 8).max(1) + y / (size / 8).max(1)) % 2 == 0;
            if light {
                pixels.extend_from_slice(&[200, 60, 200, 255]);
            } else {
                pixels.extend_from_slice(&[40, 40, 40, 255]);
            }
        }
    }
    pixels
}

/// Uniform (128, 128, 255) pixels, the tangent-space encoding of an
/// unperturbed +Z normal. Bound when an object has no normal map so the
/// shader's perturbation is a no-op.
pub fn flat_normal_pixels(size: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    for _ in 0..size * size {
        pixels.extend_from_slice(&[128, 128, 255, 255]);
    }
    pixels
}

pub struct Texture {
    device: Arc<Device>,
    image: vk::Image,
    memory: vk::DeviceMemory,
    view: vk::ImageView,
    sampler: vk::Sampler,
}

impl Texture {
    /// Load an image file and upload it as an RGBA8 sampled texture.
    /// Color data wants `R8G8B8A8_SRGB`; normal maps and other encoded
    /// data want `R8G8B8A8_UNORM` so sampling returns raw values.
    pub fn new(device: Arc<Device>, path: impl AsRef<Path>, format: vk::Format) -> Result<Self> {
        let path = path.as_ref();
        let decoded = image::open(path)
            .with_context(|| format!("Failed to load texture {}", path.display()))?
            .flipv()
            .to_rgba8();
        let (width, height) = decoded.dimensions();
        log::debug!("Loaded texture {} ({}x{})", path.display(), width, height);

        Self::from_pixels(device, &decoded, width, height, format)
    }

    /// Upload raw RGBA8 pixels. `pixels` must be `width * height * 4` bytes.
    pub fn from_pixels(
        device: Arc<Device>,
        pixels: &[u8],
        width: u32,
        height: u32,
        format: vk::Format,
    ) -> Result<Self> {
        anyhow::ensure!(
            pixels.len() as u64 == u64::from(width) * u64::from(height) * 4,
            "Pixel data size {} does not match {}x{} RGBA8",
            pixels.len(),
            width,
            height
        );

        let mut staging = Buffer::new(
            device.clone(),
            4,
            width * height,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            0,
        )?;
        staging.map()?;
        staging.write_to_buffer(pixels, 0);
        staging.unmap();

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let (image, memory) =
            device.create_image_with_info(&image_info, vk::MemoryPropertyFlags::DEVICE_LOCAL)?;

        transition_image_layout(
            &device,
            image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )?;
        device.copy_buffer_to_image(staging.handle(), image, width, height, 1)?;
        transition_image_layout(
            &device,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )?;

        let view = create_image_view(&device, image, format, vk::ImageAspectFlags::COLOR)?;
        let sampler = create_sampler(&device)?;

        Ok(Self {
            device,
            image,
            memory,
            view,
            sampler,
        })
    }

    pub fn descriptor_info(&self) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo {
            sampler: self.sampler,
            image_view: self.view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }

}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_sampler(self.sampler, None);
            self.device.device.destroy_image_view(self.view, None);
            self.device.device.destroy_image(self.image, None);
            self.device.device.free_memory(self.memory, None);
        }
    }
}

fn transition_image_layout(
    device: &Device,
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> Result<()> {
    let (src_access, dst_access, src_stage, dst_stage) =
        transition_masks(old_layout, new_layout)?;

    let command_buffer = device.begin_single_time_commands()?;

    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        })
        .src_access_mask(src_access)
        .dst_access_mask(dst_access);

    unsafe {
        device.device.cmd_pipeline_barrier(
            command_buffer,
            src_stage,
            dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    }

    device.end_single_time_commands(command_buffer)
}

fn create_sampler(device: &Device) -> Result<vk::Sampler> {
    let sampler_info = vk::SamplerCreateInfo::default()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::REPEAT)
        .address_mode_w(vk::SamplerAddressMode::REPEAT)
        .anisotropy_enable(true)
        .max_anisotropy(device.properties.limits.max_sampler_anisotropy)
        .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
        .unnormalized_coordinates(false)
        .compare_enable(false)
        .compare_op(vk::CompareOp::ALWAYS)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .mip_lod_bias(0.0)
        .min_lod(0.0)
        .max_lod(0.0);

    unsafe { device.device.create_sampler(&sampler_info, None) }
        .context("Failed to create texture sampler")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_transition_masks() {
        let (src_access, dst_access, src_stage, dst_stage) = transition_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .unwrap();
        assert_eq!(src_access, vk::AccessFlags::empty());
        assert_eq!(dst_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(dst_stage, vk::PipelineStageFlags::TRANSFER);
    }

    #[test]
    fn sample_transition_masks() {
        let (src_access, dst_access, src_stage, dst_stage) = transition_masks(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();
        assert_eq!(src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(dst_access, vk::AccessFlags::SHADER_READ);
        assert_eq!(src_stage, vk::PipelineStageFlags::TRANSFER);
        assert_eq!(dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn unexpected_transition_is_rejected() {
        let err = transition_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Unsupported image layout transition"));

        assert!(transition_masks(
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .is_err());
    }

    #[test]
    fn checkerboard_covers_full_extent() {
        let pixels = checkerboard_pixels(64);
        assert_eq!(pixels.len(), 64 * 64 * 4);
        // Both tile colors appear
        assert!(pixels.chunks(4).any(|p| p == [200, 60, 200, 255]));
        assert!(pixels.chunks(4).any(|p| p == [40, 40, 40, 255]));
    }

    #[test]
    fn flat_normal_encodes_unperturbed_plus_z() {
        let pixels = flat_normal_pixels(4);
        assert_eq!(pixels.len(), 4 * 4 * 4);
        for pixel in pixels.chunks(4) {
            assert_eq!(pixel, [128, 128, 255, 255]);
            // x * 2 - 1 in shader terms: x and y near zero, z near one
            let z = pixel[2] as f32 / 255.0 * 2.0 - 1.0;
            assert!(z > 0.99);
        }
    }
}
