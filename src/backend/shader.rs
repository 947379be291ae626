// SPIR-V shader module loading

use anyhow::{Context, Result};
use ash::vk;
use std::fs::File;
use std::path::Path;

use super::Device;

/// Read a compiled SPIR-V file and wrap it in a shader module.
pub fn create_shader_module(device: &Device, path: impl AsRef<Path>) -> Result<vk::ShaderModule> {
    let path = path.as_ref();
    let mut file = File::open(path)
        .with_context(|| format!("Failed to open shader {}", path.display()))?;
    let code = ash::util::read_spv(&mut file)
        .with_context(|| format!("Failed to read SPIR-V from {}", path.display()))?;

    let create_info = vk::ShaderModuleCreateInfo::default().code(&code);
    unsafe { device.device.create_shader_module(&create_info, None) }
        .with_context(|| format!("Failed to create shader module from {}", path.display()))
}
