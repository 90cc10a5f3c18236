//! Resources owned by one frame-in-flight slot.

use crate::texture::Texture;
use crate::uniforms::FrameTransform;
use ash::vk;
use mc2_gpu::{
    write_combined_image_sampler, write_uniform_buffer, CommandPool, Fence, GpuDevice, Result,
    Semaphore, StagingBuffer,
};

/// Descriptor sets allocated to one slot for the renderer's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSets {
    /// Set 0: the slot's uniform buffer.
    pub uniforms: vk::DescriptorSet,
    /// Set 1: the shared texture.
    pub texture: vk::DescriptorSet,
}

impl FrameSets {
    /// Sets in pipeline-layout order.
    pub fn as_array(&self) -> [vk::DescriptorSet; 2] {
        [self.uniforms, self.texture]
    }
}

/// Command buffer, sync objects, uniform buffer and descriptor sets of one slot.
///
/// Nothing here is touched by any other slot.
pub struct FrameData {
    command_buffer: vk::CommandBuffer,
    _command_pool: CommandPool,
    image_acquired: Semaphore,
    render_finished: Semaphore,
    in_flight: Fence,
    uniforms: StagingBuffer,
    sets: FrameSets,
    device: GpuDevice,
}

impl FrameData {
    /// Create the slot and point its descriptor sets at its uniform buffer
    /// and at `texture`.
    ///
    /// The fence starts signaled so the first wait on the slot returns at once.
    pub fn new(device: &GpuDevice, sets: FrameSets, texture: &Texture) -> Result<Self> {
        let command_pool =
            CommandPool::new(device, vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)?;
        let command_buffer = command_pool.allocate_primary()?;

        let uniforms = StagingBuffer::new(
            device,
            FrameTransform::SIZE,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            "frame uniforms",
        )?;

        write_uniform_buffer(device, sets.uniforms, 0, &uniforms);
        write_combined_image_sampler(device, sets.texture, 0, texture.image(), texture.sampler());

        Ok(Self {
            command_buffer,
            _command_pool: command_pool,
            image_acquired: Semaphore::new(device)?,
            render_finished: Semaphore::new(device)?,
            in_flight: Fence::new(device, true)?,
            uniforms,
            sets,
            device: device.clone(),
        })
    }

    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    pub fn image_acquired(&self) -> &Semaphore {
        &self.image_acquired
    }

    pub fn render_finished(&self) -> &Semaphore {
        &self.render_finished
    }

    pub fn in_flight(&self) -> &Fence {
        &self.in_flight
    }

    pub fn sets(&self) -> FrameSets {
        self.sets
    }

    /// Copy this frame's matrices into the mapped uniform buffer.
    pub fn update_uniforms(&mut self, transform: &FrameTransform) -> Result<()> {
        self.uniforms.write_value(transform)
    }

    /// Reset the command buffer for re-recording.
    pub fn reset_commands(&self) -> Result<()> {
        unsafe {
            self.device.handle().reset_command_buffer(
                self.command_buffer,
                vk::CommandBufferResetFlags::empty(),
            )?;
        }
        Ok(())
    }

    /// Replace the image-acquired semaphore.
    ///
    /// A suboptimal acquire signals the semaphore even though the frame is
    /// dropped, so it must not be reused. Only call while the device is idle.
    pub fn renew_image_acquired(&mut self) -> Result<()> {
        self.image_acquired = Semaphore::new(&self.device)?;
        Ok(())
    }
}
