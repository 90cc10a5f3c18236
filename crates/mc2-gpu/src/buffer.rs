//! GPU buffers with their memory role encoded in the type.
//!
//! A [`StagingBuffer`] lives in host-visible, coherent memory and is the only
//! kind the CPU can write. A [`ResidentBuffer`] lives in device-local memory
//! and can only be filled by a device-side copy.

use crate::device::GpuDevice;
use crate::error::{GpuError, Result};
use crate::memory::MemoryBlock;
use ash::vk;
use bytemuck::Pod;
use std::marker::PhantomData;

mod sealed {
    pub trait Sealed {}
}

/// Memory role of a [`GpuBuffer`].
pub trait BufferRole: sealed::Sealed {
    /// Memory properties requested for this role.
    const MEMORY_PROPERTIES: vk::MemoryPropertyFlags;
    /// Short label used in allocation names.
    const LABEL: &'static str;
}

/// Host-visible, host-coherent memory the CPU writes through a mapping.
#[derive(Debug)]
pub enum HostVisible {}

/// Device-local memory, written only by GPU copies.
#[derive(Debug)]
pub enum DeviceLocal {}

impl sealed::Sealed for HostVisible {}
impl sealed::Sealed for DeviceLocal {}

impl BufferRole for HostVisible {
    const MEMORY_PROPERTIES: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::from_raw(
        vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw()
            | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw(),
    );
    const LABEL: &'static str = "staging";
}

impl BufferRole for DeviceLocal {
    const MEMORY_PROPERTIES: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
    const LABEL: &'static str = "resident";
}

/// CPU-writable transfer buffer.
pub type StagingBuffer = GpuBuffer<HostVisible>;

/// GPU-resident buffer.
pub type ResidentBuffer = GpuBuffer<DeviceLocal>;

/// A buffer handle together with the memory bound to it.
///
/// Size is fixed at construction. Not `Clone`: use
/// [`duplicate`](Self::duplicate) to copy the GPU contents into a new buffer.
pub struct GpuBuffer<R: BufferRole> {
    handle: vk::Buffer,
    size: u64,
    usage: vk::BufferUsageFlags,
    // Freed after the buffer handle is destroyed in Drop.
    memory: MemoryBlock,
    device: GpuDevice,
    _role: PhantomData<R>,
}

impl<R: BufferRole> GpuBuffer<R> {
    /// Create a buffer and bind freshly allocated memory to it.
    pub fn new(
        device: &GpuDevice,
        size: u64,
        usage: vk::BufferUsageFlags,
        name: &str,
    ) -> Result<Self> {
        if size == 0 {
            return Err(GpuError::InvalidState(format!(
                "Buffer '{name}' must not be empty"
            )));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let handle = unsafe { device.handle().create_buffer(&buffer_info, None)? };
        let requirements = unsafe { device.handle().get_buffer_memory_requirements(handle) };

        let memory = match device.allocate(requirements, R::MEMORY_PROPERTIES, true, name) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.handle().destroy_buffer(handle, None) };
                return Err(e);
            }
        };

        let bound = unsafe {
            device
                .handle()
                .bind_buffer_memory(handle, memory.memory(), memory.offset())
        };
        if let Err(e) = bound {
            unsafe { device.handle().destroy_buffer(handle, None) };
            return Err(e.into());
        }

        tracing::debug!("Created {} buffer '{name}' ({size} bytes)", R::LABEL);

        Ok(Self {
            handle,
            size,
            usage,
            memory,
            device: device.clone(),
            _role: PhantomData,
        })
    }

    /// The raw buffer handle.
    pub fn handle(&self) -> vk::Buffer {
        self.handle
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Usage flags the buffer was created with.
    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }

    /// Copy the whole of `src` into the start of this buffer on the GPU.
    ///
    /// Blocks until the copy completes. Requires `self.size() >= src.size()`,
    /// `TRANSFER_DST` on this buffer and `TRANSFER_SRC` on `src`.
    pub fn copy_from<S: BufferRole>(&self, src: &GpuBuffer<S>) -> Result<()> {
        if self.size < src.size {
            return Err(GpuError::InvalidState(format!(
                "Copy source ({} bytes) larger than destination ({} bytes)",
                src.size, self.size
            )));
        }
        if !src.usage.contains(vk::BufferUsageFlags::TRANSFER_SRC) {
            return Err(GpuError::InvalidState(
                "Copy source lacks TRANSFER_SRC usage".to_string(),
            ));
        }
        if !self.usage.contains(vk::BufferUsageFlags::TRANSFER_DST) {
            return Err(GpuError::InvalidState(
                "Copy destination lacks TRANSFER_DST usage".to_string(),
            ));
        }

        let region = vk::BufferCopy::default()
            .src_offset(0)
            .dst_offset(0)
            .size(src.size);
        let (src_handle, dst_handle) = (src.handle, self.handle);

        self.device.immediate_submit(|device, cmd| {
            unsafe { device.cmd_copy_buffer(cmd, src_handle, dst_handle, &[region]) };
            Ok(())
        })
    }

    /// Allocate a buffer of the same size, usage and role and copy this
    /// buffer's contents into it.
    pub fn duplicate(&self) -> Result<Self> {
        let copy = Self::new(&self.device, self.size, self.usage, "duplicate")?;
        copy.copy_from(self)?;
        Ok(copy)
    }
}

impl GpuBuffer<HostVisible> {
    /// Create a staging buffer holding `bytes`.
    pub fn from_bytes(
        device: &GpuDevice,
        usage: vk::BufferUsageFlags,
        bytes: &[u8],
        name: &str,
    ) -> Result<Self> {
        let mut buffer = Self::new(device, bytes.len() as u64, usage, name)?;
        buffer.fill(bytes)?;
        Ok(buffer)
    }

    /// Write exactly `size()` bytes through the host mapping.
    pub fn fill(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() as u64 != self.size {
            return Err(GpuError::InvalidState(format!(
                "Fill of {} bytes into a {} byte buffer",
                bytes.len(),
                self.size
            )));
        }

        let size = self.size as usize;
        let mapped = self
            .memory
            .mapped_slice_mut()
            .ok_or_else(|| GpuError::InvalidState("Buffer not mapped".to_string()))?;
        mapped[..size].copy_from_slice(bytes);
        Ok(())
    }

    /// Write a plain-data value whose size equals the buffer size.
    pub fn write_value<T: Pod>(&mut self, value: &T) -> Result<()> {
        self.fill(bytemuck::bytes_of(value))
    }

    /// Read the buffer contents back through the host mapping.
    pub fn read(&self) -> Result<Vec<u8>> {
        let mapped = self
            .memory
            .mapped_slice()
            .ok_or_else(|| GpuError::InvalidState("Buffer not mapped".to_string()))?;
        Ok(mapped[..self.size as usize].to_vec())
    }
}

impl GpuBuffer<DeviceLocal> {
    /// Upload `data` into a new resident buffer through a transient staging
    /// buffer.
    ///
    /// `TRANSFER_DST` is added to `usage`.
    pub fn upload<T: Pod>(
        device: &GpuDevice,
        usage: vk::BufferUsageFlags,
        data: &[T],
        name: &str,
    ) -> Result<Self> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let staging = StagingBuffer::from_bytes(
            device,
            vk::BufferUsageFlags::TRANSFER_SRC,
            bytes,
            &format!("{name} (staging)"),
        )?;

        let resident = Self::new(
            device,
            staging.size(),
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            name,
        )?;
        resident.copy_from(&staging)?;

        Ok(resident)
    }
}

impl<R: BufferRole> Drop for GpuBuffer<R> {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_buffer(self.handle, None);
        }
    }
}
