//! 2D images whose layout state is tracked in the type.
//!
//! A freshly created image is [`GpuImage<Undefined>`]. The only way to get
//! a sampleable [`GpuImage<ShaderReadOnly>`] is [`GpuImage::fill`], which
//! records both layout transitions around the upload.

use crate::buffer::{BufferRole, GpuBuffer, StagingBuffer};
use crate::device::GpuDevice;
use crate::error::{GpuError, Result};
use crate::memory::MemoryBlock;
use ash::vk;
use std::marker::PhantomData;

mod sealed {
    pub trait Sealed {}
}

/// Layout state of a [`GpuImage`].
pub trait ImageLayoutState: sealed::Sealed {
    /// The Vulkan layout the image is in.
    const LAYOUT: vk::ImageLayout;
}

/// Contents undefined; usable as a render pass attachment or as an upload target.
#[derive(Debug)]
pub enum Undefined {}

/// Uploaded and transitioned for sampling in fragment shaders.
#[derive(Debug)]
pub enum ShaderReadOnly {}

impl sealed::Sealed for Undefined {}
impl sealed::Sealed for ShaderReadOnly {}

impl ImageLayoutState for Undefined {
    const LAYOUT: vk::ImageLayout = vk::ImageLayout::UNDEFINED;
}

impl ImageLayoutState for ShaderReadOnly {
    const LAYOUT: vk::ImageLayout = vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL;
}

/// Image, view and memory, destroyed together.
struct ImageResource {
    image: vk::Image,
    view: vk::ImageView,
    // Freed after the image is destroyed in Drop.
    memory: MemoryBlock,
    device: GpuDevice,
}

impl Drop for ImageResource {
    fn drop(&mut self) {
        unsafe {
            let device = self.device.handle();
            if self.view != vk::ImageView::null() {
                device.destroy_image_view(self.view, None);
            }
            device.destroy_image(self.image, None);
        }
    }
}

/// A single-mip, single-layer 2D image plus a matching view.
pub struct GpuImage<L: ImageLayoutState> {
    resource: ImageResource,
    format: vk::Format,
    extent: vk::Extent2D,
    usage: vk::ImageUsageFlags,
    aspect: vk::ImageAspectFlags,
    _layout: PhantomData<L>,
}

impl GpuImage<Undefined> {
    /// Create an image in device-local memory and a view over it.
    pub fn new(
        device: &GpuDevice,
        format: vk::Format,
        extent: vk::Extent2D,
        usage: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
        name: &str,
    ) -> Result<Self> {
        let create_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.handle().create_image(&create_info, None)? };
        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };

        let memory = match device.allocate(
            requirements,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            false,
            name,
        ) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.handle().destroy_image(image, None) };
                return Err(e);
            }
        };

        let mut resource = ImageResource {
            image,
            view: vk::ImageView::null(),
            memory,
            device: device.clone(),
        };

        unsafe {
            device
                .handle()
                .bind_image_memory(image, resource.memory.memory(), resource.memory.offset())?;
        }

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(full_range(aspect));
        resource.view = unsafe { device.handle().create_image_view(&view_info, None)? };

        tracing::debug!(
            "Created image '{name}' {}x{} {format:?}",
            extent.width,
            extent.height
        );

        Ok(Self {
            resource,
            format,
            extent,
            usage,
            aspect,
            _layout: PhantomData,
        })
    }

    /// Upload `source` into the image and transition it for sampling.
    ///
    /// The source is first copied into a staging buffer sized to the image's
    /// memory requirement. One blocking submission then transitions the image
    /// to transfer-destination, copies exactly `extent` texels and transitions
    /// it to shader-read-only.
    pub fn fill<S: BufferRole>(self, source: &GpuBuffer<S>) -> Result<GpuImage<ShaderReadOnly>> {
        if !self.usage.contains(vk::ImageUsageFlags::TRANSFER_DST) {
            return Err(GpuError::InvalidState(
                "Image fill requires TRANSFER_DST usage".to_string(),
            ));
        }

        let device = self.resource.device.clone();
        let staging = StagingBuffer::new(
            &device,
            self.resource.memory.size(),
            vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST,
            "image upload",
        )?;
        staging.copy_from(source)?;

        let image = self.resource.image;
        let range = full_range(self.aspect);
        let extent = self.extent;
        let aspect = self.aspect;
        let staging_handle = staging.handle();

        device.immediate_submit(|device, cmd| {
            let to_transfer = vk::ImageMemoryBarrier::default()
                .old_layout(vk::ImageLayout::UNDEFINED)
                .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(range)
                .src_access_mask(vk::AccessFlags::empty())
                .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE);

            let region = vk::BufferImageCopy::default()
                .buffer_offset(0)
                .buffer_row_length(0)
                .buffer_image_height(0)
                .image_subresource(
                    vk::ImageSubresourceLayers::default()
                        .aspect_mask(aspect)
                        .mip_level(0)
                        .base_array_layer(0)
                        .layer_count(1),
                )
                .image_offset(vk::Offset3D::default())
                .image_extent(vk::Extent3D {
                    width: extent.width,
                    height: extent.height,
                    depth: 1,
                });

            let to_shader = vk::ImageMemoryBarrier::default()
                .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(range)
                .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                .dst_access_mask(vk::AccessFlags::SHADER_READ);

            unsafe {
                device.cmd_pipeline_barrier(
                    cmd,
                    vk::PipelineStageFlags::TOP_OF_PIPE,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[to_transfer],
                );
                device.cmd_copy_buffer_to_image(
                    cmd,
                    staging_handle,
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                );
                device.cmd_pipeline_barrier(
                    cmd,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::PipelineStageFlags::FRAGMENT_SHADER,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[to_shader],
                );
            }
            Ok(())
        })?;

        Ok(GpuImage {
            resource: self.resource,
            format: self.format,
            extent: self.extent,
            usage: self.usage,
            aspect: self.aspect,
            _layout: PhantomData,
        })
    }
}

impl<L: ImageLayoutState> GpuImage<L> {
    /// The raw image handle.
    pub fn handle(&self) -> vk::Image {
        self.resource.image
    }

    /// The view covering the whole image.
    pub fn view(&self) -> vk::ImageView {
        self.resource.view
    }

    /// Image format.
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Image extent in texels.
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Aspect the view and barriers cover.
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        self.aspect
    }

    /// Current layout.
    pub fn layout(&self) -> vk::ImageLayout {
        L::LAYOUT
    }
}

/// Subresource range covering the single mip and layer for `aspect`.
pub fn full_range(aspect: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(aspect)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_markers() {
        assert_eq!(Undefined::LAYOUT, vk::ImageLayout::UNDEFINED);
        assert_eq!(
            ShaderReadOnly::LAYOUT,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        );
    }

    #[test]
    fn range_is_restricted_to_aspect() {
        let range = full_range(vk::ImageAspectFlags::DEPTH);
        assert_eq!(range.aspect_mask, vk::ImageAspectFlags::DEPTH);
        assert_eq!(range.level_count, 1);
        assert_eq!(range.layer_count, 1);
    }
}
