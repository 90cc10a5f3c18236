//! Descriptor set management.

use crate::buffer::{GpuBuffer, HostVisible};
use crate::device::GpuDevice;
use crate::error::Result;
use crate::image::{GpuImage, ShaderReadOnly};
use ash::vk;

/// Descriptor set layout builder.
pub struct DescriptorSetLayoutBuilder<'a> {
    bindings: Vec<vk::DescriptorSetLayoutBinding<'a>>,
}

impl<'a> DescriptorSetLayoutBuilder<'a> {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            bindings: Vec::new(),
        }
    }

    /// Add a binding.
    pub fn binding(
        mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        count: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::default()
                .binding(binding)
                .descriptor_type(descriptor_type)
                .descriptor_count(count)
                .stage_flags(stage_flags),
        );
        self
    }

    /// Add a uniform buffer binding.
    pub fn uniform_buffer(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.binding(binding, vk::DescriptorType::UNIFORM_BUFFER, 1, stage_flags)
    }

    /// Add a combined image sampler binding.
    pub fn combined_image_sampler(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.binding(
            binding,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            1,
            stage_flags,
        )
    }

    /// Build the descriptor set layout.
    pub fn build(self, device: &GpuDevice) -> Result<DescriptorSetLayout> {
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&self.bindings);

        let handle = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&layout_info, None)?
        };
        Ok(DescriptorSetLayout {
            handle,
            device: device.clone(),
        })
    }
}

impl Default for DescriptorSetLayoutBuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// An owned descriptor set layout.
pub struct DescriptorSetLayout {
    handle: vk::DescriptorSetLayout,
    device: GpuDevice,
}

impl DescriptorSetLayout {
    /// The raw layout handle.
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.handle
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.handle, None);
        }
    }
}

/// Pool sizes for `frames` sets of every listed descriptor kind.
pub fn pool_sizes(frames: u32, kinds: &[vk::DescriptorType]) -> Vec<vk::DescriptorPoolSize> {
    kinds
        .iter()
        .map(|&ty| vk::DescriptorPoolSize {
            ty,
            descriptor_count: frames,
        })
        .collect()
}

/// Fixed-capacity pool sized for one set per binding kind per frame in flight.
///
/// Sets are never freed individually; they live as long as the pool.
pub struct DescriptorPool {
    pool: vk::DescriptorPool,
    device: GpuDevice,
}

impl DescriptorPool {
    /// Create a pool holding `frames` sets of each kind in `kinds`.
    pub fn new(device: &GpuDevice, frames: u32, kinds: &[vk::DescriptorType]) -> Result<Self> {
        let sizes = pool_sizes(frames, kinds);
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(frames * kinds.len() as u32)
            .pool_sizes(&sizes);

        let pool = unsafe { device.handle().create_descriptor_pool(&create_info, None)? };
        Ok(Self {
            pool,
            device: device.clone(),
        })
    }

    /// Allocate one set per layout, in order.
    pub fn allocate(&self, layouts: &[vk::DescriptorSetLayout]) -> Result<Vec<vk::DescriptorSet>> {
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);

        let sets = unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info)? };
        Ok(sets)
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_descriptor_pool(self.pool, None);
        }
    }
}

/// Point a uniform-buffer binding at the whole of `buffer`.
pub fn write_uniform_buffer(
    device: &GpuDevice,
    dst_set: vk::DescriptorSet,
    binding: u32,
    buffer: &GpuBuffer<HostVisible>,
) {
    let buffer_info = vk::DescriptorBufferInfo::default()
        .buffer(buffer.handle())
        .offset(0)
        .range(buffer.size());

    let write = vk::WriteDescriptorSet::default()
        .dst_set(dst_set)
        .dst_binding(binding)
        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
        .buffer_info(std::slice::from_ref(&buffer_info));

    unsafe { device.handle().update_descriptor_sets(&[write], &[]) };
}

/// Point a combined-image-sampler binding at an uploaded image.
///
/// Only images already transitioned for sampling are accepted.
pub fn write_combined_image_sampler(
    device: &GpuDevice,
    dst_set: vk::DescriptorSet,
    binding: u32,
    image: &GpuImage<ShaderReadOnly>,
    sampler: vk::Sampler,
) {
    let image_info = vk::DescriptorImageInfo::default()
        .sampler(sampler)
        .image_view(image.view())
        .image_layout(image.layout());

    let write = vk::WriteDescriptorSet::default()
        .dst_set(dst_set)
        .dst_binding(binding)
        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
        .image_info(std::slice::from_ref(&image_info));

    unsafe { device.handle().update_descriptor_sets(&[write], &[]) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_descriptor_per_frame_per_kind() {
        let sizes = pool_sizes(
            2,
            &[
                vk::DescriptorType::UNIFORM_BUFFER,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            ],
        );
        assert_eq!(sizes.len(), 2);
        assert_eq!(sizes[0].ty, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(sizes[1].ty, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert!(sizes.iter().all(|size| size.descriptor_count == 2));
    }
}
