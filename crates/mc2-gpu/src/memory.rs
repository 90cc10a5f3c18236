//! GPU memory management.

use crate::device::GpuDevice;
use crate::error::{GpuError, Result};
use ash::vk;
use gpu_allocator::vulkan::Allocation;
use gpu_allocator::MemoryLocation;

/// Resolve a memory-type index satisfying both a type-filter bitmask and
/// the requested property flags.
///
/// Index 0 is a valid answer.
pub fn find_memory_type_index(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> Result<u32> {
    memory_properties
        .memory_types
        .iter()
        .take(memory_properties.memory_type_count as usize)
        .enumerate()
        .find(|(index, memory_type)| {
            type_filter & (1 << index) != 0 && memory_type.property_flags.contains(properties)
        })
        .map(|(index, _)| index as u32)
        .ok_or(GpuError::NoCompatibleMemoryType {
            type_filter,
            properties,
        })
}

/// Whether memory type `index` exists and carries every flag in `properties`.
pub fn memory_type_has(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    index: u32,
    properties: vk::MemoryPropertyFlags,
) -> bool {
    index < memory_properties.memory_type_count
        && memory_properties.memory_types[index as usize]
            .property_flags
            .contains(properties)
}

/// Map requested property flags onto an allocator location.
pub fn memory_location(properties: vk::MemoryPropertyFlags) -> MemoryLocation {
    if properties.contains(vk::MemoryPropertyFlags::HOST_VISIBLE) {
        MemoryLocation::CpuToGpu
    } else {
        MemoryLocation::GpuOnly
    }
}

/// One sub-allocation of device memory.
///
/// Returned to the device allocator on drop.
pub struct MemoryBlock {
    allocation: Option<Allocation>,
    device: GpuDevice,
}

impl MemoryBlock {
    pub(crate) fn new(allocation: Allocation, device: GpuDevice) -> Self {
        Self {
            allocation: Some(allocation),
            device,
        }
    }

    /// The backing `VkDeviceMemory` object.
    pub fn memory(&self) -> vk::DeviceMemory {
        self.allocation
            .as_ref()
            .map_or(vk::DeviceMemory::null(), |a| unsafe { a.memory() })
    }

    /// Offset of this block inside its device memory object.
    pub fn offset(&self) -> u64 {
        self.allocation.as_ref().map_or(0, Allocation::offset)
    }

    /// Allocated size, at least the requested size.
    pub fn size(&self) -> u64 {
        self.allocation.as_ref().map_or(0, Allocation::size)
    }

    /// Host-visible view of the block, `None` for device-local memory.
    pub fn mapped_slice(&self) -> Option<&[u8]> {
        self.allocation.as_ref().and_then(Allocation::mapped_slice)
    }

    /// Mutable host-visible view of the block, `None` for device-local memory.
    pub fn mapped_slice_mut(&mut self) -> Option<&mut [u8]> {
        self.allocation
            .as_mut()
            .and_then(Allocation::mapped_slice_mut)
    }
}

impl Drop for MemoryBlock {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            if let Err(e) = self.device.free(allocation) {
                tracing::error!("Failed to free GPU memory: {e}");
            }
        }
    }
}
