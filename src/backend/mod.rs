// Vulkan backend: device bring-up, memory, presentation, descriptors

pub mod buffer;
pub mod descriptors;
pub mod device;
pub mod pipeline;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod texture;

pub use buffer::Buffer;
pub use descriptors::{
    DescriptorPool, DescriptorSetLayout, DescriptorWriter, LayoutBinding, LayoutConfig,
    PoolConfig, PoolSize,
};
pub use device::Device;
pub use pipeline::{Pipeline, PipelineConfig};
pub use swapchain::{Swapchain, MAX_FRAMES_IN_FLIGHT};
pub use texture::{checkerboard_pixels, flat_normal_pixels, Texture};
