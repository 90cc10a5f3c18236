//! Shader modules from pre-compiled SPIR-V.

use crate::device::GpuDevice;
use crate::error::{GpuError, Result};
use ash::vk;
use std::io::Cursor;

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Decode a SPIR-V byte blob into words.
///
/// Rejects blobs whose length is not a multiple of four or that do not
/// start with the SPIR-V magic number.
pub fn decode_spirv(bytes: &[u8]) -> Result<Vec<u32>> {
    let words = ash::util::read_spv(&mut Cursor::new(bytes))
        .map_err(|e| GpuError::ShaderModule(format!("Invalid SPIR-V: {e}")))?;

    match words.first() {
        Some(&SPIRV_MAGIC) => Ok(words),
        Some(&other) => Err(GpuError::ShaderModule(format!(
            "Bad SPIR-V magic number {other:#010x}"
        ))),
        None => Err(GpuError::ShaderModule("Empty SPIR-V blob".to_string())),
    }
}

/// A shader module for one pipeline stage.
///
/// Only needed until the pipelines using it are built.
pub struct ShaderModule {
    handle: vk::ShaderModule,
    stage: vk::ShaderStageFlags,
    device: GpuDevice,
}

impl ShaderModule {
    /// Create a module from a SPIR-V byte blob.
    pub fn from_spirv(
        device: &GpuDevice,
        stage: vk::ShaderStageFlags,
        bytes: &[u8],
    ) -> Result<Self> {
        let code = decode_spirv(bytes)?;
        let create_info = vk::ShaderModuleCreateInfo::default().code(&code);

        let handle = unsafe { device.handle().create_shader_module(&create_info, None) }
            .map_err(|e| GpuError::ShaderModule(format!("{stage:?}: {e}")))?;

        Ok(Self {
            handle,
            stage,
            device: device.clone(),
        })
    }

    /// The raw module handle.
    pub fn handle(&self) -> vk::ShaderModule {
        self.handle
    }

    /// Stage this module was created for.
    pub fn stage(&self) -> vk::ShaderStageFlags {
        self.stage
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_shader_module(self.handle, None);
        }
    }
}
