// Descriptor set layouts, pools, and batched writes
//
// Layouts and pools are described with plain config structs validated
// up front, so a malformed description fails at construction rather
// than as a cryptic validation-layer message mid-frame.

use anyhow::{Context, Result};
use ash::vk;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::Device;

/// One binding slot in a descriptor set layout.
#[derive(Clone, Copy)]
pub struct LayoutBinding {
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub stage_flags: vk::ShaderStageFlags,
    pub count: u32,
}

/// Complete description of a descriptor set layout.
#[derive(Clone, Default)]
pub struct LayoutConfig {
    pub bindings: Vec<LayoutBinding>,
}

impl LayoutConfig {
    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for b in &self.bindings {
            if !seen.insert(b.binding) {
                anyhow::bail!("Duplicate descriptor binding index {}", b.binding);
            }
            if b.count == 0 {
                anyhow::bail!("Descriptor binding {} has count 0", b.binding);
            }
        }
        Ok(())
    }
}

pub struct DescriptorSetLayout {
    device: Arc<Device>,
    layout: vk::DescriptorSetLayout,
    bindings: HashMap<u32, LayoutBinding>,
}

impl DescriptorSetLayout {
    pub fn new(device: Arc<Device>, config: LayoutConfig) -> Result<Self> {
        config.validate()?;

        let vk_bindings: Vec<vk::DescriptorSetLayoutBinding> = config
            .bindings
            .iter()
            .map(|b| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(b.binding)
                    .descriptor_type(b.descriptor_type)
                    .descriptor_count(b.count)
                    .stage_flags(b.stage_flags)
            })
            .collect();

        let layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&vk_bindings);
        let layout = unsafe {
            device
                .device
                .create_descriptor_set_layout(&layout_info, None)
        }
        .context("Failed to create descriptor set layout")?;

        let bindings = config.bindings.iter().map(|b| (b.binding, *b)).collect();

        Ok(Self {
            device,
            layout,
            bindings,
        })
    }

    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    fn binding(&self, index: u32) -> Option<&LayoutBinding> {
        self.bindings.get(&index)
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .device
                .destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

#[derive(Clone, Copy)]
pub struct PoolSize {
    pub descriptor_type: vk::DescriptorType,
    pub count: u32,
}

/// Complete description of a descriptor pool.
#[derive(Clone)]
pub struct PoolConfig {
    pub max_sets: u32,
    pub pool_sizes: Vec<PoolSize>,
    pub flags: vk::DescriptorPoolCreateFlags,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_sets: 0,
            pool_sizes: Vec::new(),
            flags: vk::DescriptorPoolCreateFlags::empty(),
        }
    }
}

impl PoolConfig {
    fn validate(&self) -> Result<()> {
        if self.max_sets == 0 {
            anyhow::bail!("Descriptor pool must allow at least one set");
        }
        if self.pool_sizes.is_empty() {
            anyhow::bail!("Descriptor pool needs at least one pool size");
        }
        for size in &self.pool_sizes {
            if size.count == 0 {
                anyhow::bail!(
                    "Pool size for {:?} has count 0",
                    size.descriptor_type
                );
            }
        }
        Ok(())
    }
}

pub struct DescriptorPool {
    device: Arc<Device>,
    pool: vk::DescriptorPool,
}

impl DescriptorPool {
    pub fn new(device: Arc<Device>, config: PoolConfig) -> Result<Self> {
        config.validate()?;

        let sizes: Vec<vk::DescriptorPoolSize> = config
            .pool_sizes
            .iter()
            .map(|s| vk::DescriptorPoolSize {
                ty: s.descriptor_type,
                descriptor_count: s.count,
            })
            .collect();

        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(config.max_sets)
            .pool_sizes(&sizes)
            .flags(config.flags);

        let pool = unsafe { device.device.create_descriptor_pool(&pool_info, None) }
            .context("Failed to create descriptor pool")?;

        Ok(Self { device, pool })
    }

    /// Allocate one set with the given layout. Exhaustion is an error,
    /// not something to paper over with a silent retry.
    pub fn allocate(&self, layout: &DescriptorSetLayout) -> Result<vk::DescriptorSet> {
        let layouts = [layout.handle()];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        let sets = unsafe { self.device.device.allocate_descriptor_sets(&alloc_info) }
            .context("Failed to allocate descriptor set (pool exhausted?)")?;
        Ok(sets[0])
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_descriptor_pool(self.pool, None);
        }
    }
}

enum WriteInfo {
    Buffer(vk::DescriptorBufferInfo),
    Image(vk::DescriptorImageInfo),
}

/// Collects writes against a layout and applies them in one
/// `update_descriptor_sets` call.
pub struct DescriptorWriter<'a> {
    layout: &'a DescriptorSetLayout,
    pool: &'a DescriptorPool,
    writes: Vec<(u32, WriteInfo)>,
}

impl<'a> DescriptorWriter<'a> {
    pub fn new(layout: &'a DescriptorSetLayout, pool: &'a DescriptorPool) -> Self {
        Self {
            layout,
            pool,
            writes: Vec::new(),
        }
    }

    pub fn write_buffer(mut self, binding: u32, info: vk::DescriptorBufferInfo) -> Self {
        assert!(
            self.layout.binding(binding).is_some(),
            "Layout has no binding {}",
            binding
        );
        self.writes.push((binding, WriteInfo::Buffer(info)));
        self
    }

    pub fn write_image(mut self, binding: u32, info: vk::DescriptorImageInfo) -> Self {
        assert!(
            self.layout.binding(binding).is_some(),
            "Layout has no binding {}",
            binding
        );
        self.writes.push((binding, WriteInfo::Image(info)));
        self
    }

    /// Allocate a fresh set from the pool and apply the queued writes.
    pub fn build(self) -> Result<vk::DescriptorSet> {
        let set = self.pool.allocate(self.layout)?;
        self.overwrite(set);
        Ok(set)
    }

    /// Apply the queued writes to an existing set.
    pub fn overwrite(self, set: vk::DescriptorSet) {
        let device = &self.layout.device;

        // Info structs must stay alive until the update call, so split
        // them out before building the write array.
        let mut buffer_infos = Vec::new();
        let mut image_infos = Vec::new();
        for (_, info) in &self.writes {
            match info {
                WriteInfo::Buffer(b) => buffer_infos.push([*b]),
                WriteInfo::Image(i) => image_infos.push([*i]),
            }
        }

        let mut vk_writes = Vec::with_capacity(self.writes.len());
        let mut buffer_idx = 0;
        let mut image_idx = 0;
        for (binding, info) in &self.writes {
            let layout_binding = self
                .layout
                .binding(*binding)
                .expect("binding checked at write time");
            let write = vk::WriteDescriptorSet::default()
                .dst_set(set)
                .dst_binding(*binding)
                .descriptor_type(layout_binding.descriptor_type);
            let write = match info {
                WriteInfo::Buffer(_) => {
                    let w = write.buffer_info(&buffer_infos[buffer_idx]);
                    buffer_idx += 1;
                    w
                }
                WriteInfo::Image(_) => {
                    let w = write.image_info(&image_infos[image_idx]);
                    image_idx += 1;
                    w
                }
            };
            vk_writes.push(write);
        }

        unsafe {
            device.device.update_descriptor_sets(&vk_writes, &[]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_config_rejects_duplicate_bindings() {
        let config = LayoutConfig {
            bindings: vec![
                LayoutBinding {
                    binding: 0,
                    descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
                    stage_flags: vk::ShaderStageFlags::VERTEX,
                    count: 1,
                },
                LayoutBinding {
                    binding: 0,
                    descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                    stage_flags: vk::ShaderStageFlags::FRAGMENT,
                    count: 1,
                },
            ],
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate"));
    }

    #[test]
    fn layout_config_rejects_zero_count() {
        let config = LayoutConfig {
            bindings: vec![LayoutBinding {
                binding: 1,
                descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
                stage_flags: vk::ShaderStageFlags::VERTEX,
                count: 0,
            }],
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn layout_config_accepts_distinct_bindings() {
        let config = LayoutConfig {
            bindings: vec![
                LayoutBinding {
                    binding: 0,
                    descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
                    stage_flags: vk::ShaderStageFlags::ALL_GRAPHICS,
                    count: 1,
                },
                LayoutBinding {
                    binding: 1,
                    descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                    stage_flags: vk::ShaderStageFlags::FRAGMENT,
                    count: 1,
                },
            ],
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn pool_config_rejects_empty_description() {
        assert!(PoolConfig::default().validate().is_err());

        let no_sizes = PoolConfig {
            max_sets: 4,
            ..Default::default()
        };
        assert!(no_sizes.validate().is_err());
    }

    #[test]
    fn pool_config_accepts_complete_description() {
        let config = PoolConfig {
            max_sets: 8,
            pool_sizes: vec![PoolSize {
                descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
                count: 8,
            }],
            flags: vk::DescriptorPoolCreateFlags::empty(),
        };
        assert!(config.validate().is_ok());
    }
}
