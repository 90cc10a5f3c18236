//! Synchronization primitives.

use crate::device::GpuDevice;
use crate::error::Result;
use ash::vk;

/// A binary semaphore ordering work between queue operations.
pub struct Semaphore {
    handle: vk::Semaphore,
    device: GpuDevice,
}

impl Semaphore {
    /// Create a semaphore.
    pub fn new(device: &GpuDevice) -> Result<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();
        let handle = unsafe { device.handle().create_semaphore(&create_info, None)? };
        Ok(Self {
            handle,
            device: device.clone(),
        })
    }

    /// The raw semaphore handle.
    pub fn handle(&self) -> vk::Semaphore {
        self.handle
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.handle, None);
        }
    }
}

/// A fence the CPU can wait on for GPU completion.
pub struct Fence {
    handle: vk::Fence,
    device: GpuDevice,
}

impl Fence {
    /// Create a fence, optionally already signaled.
    pub fn new(device: &GpuDevice, signaled: bool) -> Result<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::default().flags(flags);
        let handle = unsafe { device.handle().create_fence(&create_info, None)? };
        Ok(Self {
            handle,
            device: device.clone(),
        })
    }

    /// The raw fence handle.
    pub fn handle(&self) -> vk::Fence {
        self.handle
    }

    /// Block until the fence is signaled.
    pub fn wait(&self) -> Result<()> {
        unsafe {
            self.device
                .handle()
                .wait_for_fences(&[self.handle], true, u64::MAX)?;
        }
        Ok(())
    }

    /// Reset the fence to unsignaled state.
    pub fn reset(&self) -> Result<()> {
        unsafe {
            self.device.handle().reset_fences(&[self.handle])?;
        }
        Ok(())
    }

    /// Check the fence without blocking.
    pub fn is_signaled(&self) -> Result<bool> {
        let signaled = unsafe { self.device.handle().get_fence_status(self.handle)? };
        Ok(signaled)
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.handle, None);
        }
    }
}
