//! Command buffer management.

use crate::device::GpuDevice;
use crate::error::{GpuError, Result};
use crate::sync::{Fence, Semaphore};
use ash::vk;

/// Command pool on the device's graphics queue family.
///
/// Command buffers allocated from it are freed together with the pool.
pub struct CommandPool {
    pool: vk::CommandPool,
    device: GpuDevice,
}

impl CommandPool {
    /// Create a new command pool.
    pub fn new(device: &GpuDevice, flags: vk::CommandPoolCreateFlags) -> Result<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(device.queue_family())
            .flags(flags);

        let pool = unsafe { device.handle().create_command_pool(&create_info, None)? };

        Ok(Self {
            pool,
            device: device.clone(),
        })
    }

    /// Allocate a single primary command buffer.
    pub fn allocate_primary(&self) -> Result<vk::CommandBuffer> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffers = unsafe { self.device.handle().allocate_command_buffers(&alloc_info)? };
        buffers
            .into_iter()
            .next()
            .ok_or_else(|| GpuError::InvalidState("No command buffer allocated".to_string()))
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_command_pool(self.pool, None);
        }
    }
}

/// Begin recording a command buffer.
///
/// # Safety
/// The command buffer must belong to `device` and not be pending execution.
pub unsafe fn begin_command_buffer(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    flags: vk::CommandBufferUsageFlags,
) -> Result<()> {
    let begin_info = vk::CommandBufferBeginInfo::default().flags(flags);
    unsafe { device.begin_command_buffer(cmd, &begin_info)? };
    Ok(())
}

/// End recording a command buffer.
///
/// # Safety
/// The command buffer must be in the recording state.
pub unsafe fn end_command_buffer(device: &ash::Device, cmd: vk::CommandBuffer) -> Result<()> {
    unsafe { device.end_command_buffer(cmd)? };
    Ok(())
}

/// Submit one command buffer to the device queue.
///
/// Waits on `wait` at `wait_stage`, signals `signal` and then `fence` on completion.
///
/// # Safety
/// The command buffer must be fully recorded and every handle must belong to `device`.
pub unsafe fn submit_command_buffer(
    device: &GpuDevice,
    cmd: vk::CommandBuffer,
    wait: &Semaphore,
    wait_stage: vk::PipelineStageFlags,
    signal: &Semaphore,
    fence: &Fence,
) -> Result<()> {
    let command_buffers = [cmd];
    let wait_semaphores = [wait.handle()];
    let wait_stages = [wait_stage];
    let signal_semaphores = [signal.handle()];

    let submit_info = vk::SubmitInfo::default()
        .command_buffers(&command_buffers)
        .wait_semaphores(&wait_semaphores)
        .wait_dst_stage_mask(&wait_stages)
        .signal_semaphores(&signal_semaphores);

    unsafe {
        device
            .handle()
            .queue_submit(device.queue(), &[submit_info], fence.handle())?;
    }
    Ok(())
}
