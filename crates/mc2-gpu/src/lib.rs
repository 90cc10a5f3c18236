//! Vulkan device and resource layer for the mc2 renderer.
//!
//! This crate provides:
//! - Instance creation with an explicit layer/extension check
//! - Physical device selection and the logical device with its allocator
//! - Surface and swapchain handling, including resize-driven recreation
//! - Buffers and images whose memory role and layout live in the type
//! - Descriptor pools, shader modules and a graphics pipeline builder
//!
//! Every resource keeps a clone of the [`GpuDevice`] it was created from and
//! releases its handles on drop.

pub mod buffer;
pub mod capabilities;
pub mod command;
pub mod descriptors;
pub mod device;
pub mod error;
pub mod image;
pub mod instance;
pub mod memory;
pub mod pipeline;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use buffer::{BufferRole, DeviceLocal, GpuBuffer, HostVisible, ResidentBuffer, StagingBuffer};
pub use capabilities::{DeviceCandidate, GpuCapabilities, GpuVendor, InstanceSupport};
pub use command::CommandPool;
pub use descriptors::{
    write_combined_image_sampler, write_uniform_buffer, DescriptorPool, DescriptorSetLayout,
    DescriptorSetLayoutBuilder,
};
pub use device::GpuDevice;
pub use error::{GpuError, Result};
pub use image::{GpuImage, ImageLayoutState, ShaderReadOnly, Undefined};
pub use instance::{GpuInstance, InstanceConfig};
pub use memory::MemoryBlock;
pub use pipeline::{DepthState, GraphicsPipelineBuilder, Pipeline, PipelineDescription};
pub use shader::ShaderModule;
pub use surface::{Surface, SurfaceSupport};
pub use swapchain::{AcquireOutcome, PresentOutcome, PresentationTarget, Swapchain};
pub use sync::{Fence, Semaphore};
