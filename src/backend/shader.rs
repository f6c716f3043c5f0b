// Shader module loading
//
// SPIR-V is read from disk at startup. `read_spv` takes care of word
// alignment and endianness.

use anyhow::{Context, Result};
use ash::vk;
use std::io::Cursor;
use std::path::Path;

use super::VulkanDevice;
use crate::error::RendererError;

/// Read a compiled shader fully into memory as SPIR-V words
pub fn read_spirv(path: &Path) -> Result<Vec<u32>> {
    let bytes = std::fs::read(path).map_err(|source| RendererError::ShaderLoad {
        path: path.to_path_buf(),
        source,
    })?;
    parse_spirv(&bytes).map_err(|source| {
        RendererError::ShaderLoad {
            path: path.to_path_buf(),
            source,
        }
        .into()
    })
}

pub fn parse_spirv(bytes: &[u8]) -> std::io::Result<Vec<u32>> {
    ash::util::read_spv(&mut Cursor::new(bytes))
}

/// Create a shader module from SPIR-V words
pub fn create_shader_module(device: &VulkanDevice, code: &[u32]) -> Result<vk::ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::builder().code(code);

    unsafe {
        device.device.create_shader_module(&create_info, None)
            .context("Failed to create shader module")
    }
}

/// Load a .spv file and wrap it in a shader module
pub fn load_shader_module(device: &VulkanDevice, path: &Path) -> Result<vk::ShaderModule> {
    let code = read_spirv(path)?;
    log::debug!("Loaded shader {:?} ({} words)", path, code.len());
    create_shader_module(device, &code)
}
