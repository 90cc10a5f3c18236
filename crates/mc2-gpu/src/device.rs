//! Logical device, queue and allocator.

use crate::capabilities::{pick_best, required_device_extensions, DeviceCandidate, GpuCapabilities};
use crate::error::{GpuError, Result};
use crate::instance::GpuInstance;
use crate::memory::{find_memory_type_index, memory_location, memory_type_has, MemoryBlock};
use crate::surface::Surface;
use ash::vk;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// Command pool, buffer and fence reserved for blocking setup transfers.
struct UploadContext {
    pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    fence: vk::Fence,
}

struct DeviceInner {
    device: ash::Device,
    physical_device: vk::PhysicalDevice,
    capabilities: GpuCapabilities,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    queue_family: u32,
    queue: vk::Queue,
    allocator: Mutex<Option<Allocator>>,
    upload: Mutex<UploadContext>,
    // Dropped after the device.
    instance: Arc<GpuInstance>,
}

impl Drop for DeviceInner {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();

            let upload = self.upload.get_mut();
            self.device.destroy_fence(upload.fence, None);
            self.device.destroy_command_pool(upload.pool, None);

            // Shutdown allocator BEFORE destroying device
            drop(self.allocator.lock().take());

            self.device.destroy_device(None);
        }
    }
}

/// The logical device every GPU resource is created against.
///
/// Cheap to clone. Each resource keeps a clone so that the device is
/// destroyed only after the last resource referencing it.
#[derive(Clone)]
pub struct GpuDevice {
    inner: Arc<DeviceInner>,
}

impl GpuDevice {
    /// Select a physical device able to present to `surface` and create the
    /// logical device on it.
    pub fn new(instance: Arc<GpuInstance>, surface: &Surface) -> Result<Self> {
        Self::create(instance, Some(surface))
    }

    /// Create a device without presentation support, for tools and tests.
    pub fn headless(instance: Arc<GpuInstance>) -> Result<Self> {
        Self::create(instance, None)
    }

    fn create(instance: Arc<GpuInstance>, surface: Option<&Surface>) -> Result<Self> {
        let physical_devices = unsafe { instance.handle().enumerate_physical_devices()? };

        let mut candidates = Vec::with_capacity(physical_devices.len());
        for physical_device in physical_devices {
            // SAFETY: the handle was just enumerated from this instance.
            let candidate =
                unsafe { DeviceCandidate::query(instance.handle(), physical_device, surface)? };
            if let Some(reason) = candidate.rejection_reason() {
                tracing::debug!(
                    "Skipping GPU {}: {reason}",
                    candidate.capabilities.device_name
                );
            }
            candidates.push(candidate);
        }

        let chosen = pick_best(&candidates).ok_or(GpuError::NoSuitableDevice)?;
        let queue_family = chosen.queue_family.ok_or(GpuError::NoSuitableDevice)?;
        let physical_device = chosen.physical_device;
        let capabilities = chosen.capabilities.clone();

        tracing::info!("Selected GPU: {}", capabilities.summary());

        let device = unsafe {
            create_logical_device(
                instance.handle(),
                physical_device,
                queue_family,
                surface.is_some(),
            )?
        };
        let queue = unsafe { device.get_device_queue(queue_family, 0) };
        let memory_properties = unsafe {
            instance
                .handle()
                .get_physical_device_memory_properties(physical_device)
        };

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.handle().clone(),
            device: device.clone(),
            physical_device,
            debug_settings: gpu_allocator::AllocatorDebugSettings {
                log_memory_information: cfg!(debug_assertions),
                log_leaks_on_shutdown: true,
                store_stack_traces: false,
                log_allocations: false,
                log_frees: false,
                log_stack_traces: false,
            },
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .map_err(|e| GpuError::AllocationFailed(e.to_string()))?;

        let upload = unsafe { create_upload_context(&device, queue_family)? };

        Ok(Self {
            inner: Arc::new(DeviceInner {
                device,
                physical_device,
                capabilities,
                memory_properties,
                queue_family,
                queue,
                allocator: Mutex::new(Some(allocator)),
                upload: Mutex::new(upload),
                instance,
            }),
        })
    }

    /// Get the Vulkan device handle.
    pub fn handle(&self) -> &ash::Device {
        &self.inner.device
    }

    /// Get the instance this device was created from.
    pub fn instance(&self) -> &GpuInstance {
        &self.inner.instance
    }

    /// Get the physical device handle.
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.inner.physical_device
    }

    /// Get GPU capabilities.
    pub fn capabilities(&self) -> &GpuCapabilities {
        &self.inner.capabilities
    }

    /// Graphics queue, also used for presentation.
    pub fn queue(&self) -> vk::Queue {
        self.inner.queue
    }

    /// Queue family of [`queue`](Self::queue).
    pub fn queue_family(&self) -> u32 {
        self.inner.queue_family
    }

    /// Wait for device to be idle.
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.inner.device.device_wait_idle()?;
        }
        Ok(())
    }

    /// Resolve the memory-type index for a resource.
    pub fn memory_type_index(
        &self,
        type_filter: u32,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<u32> {
        find_memory_type_index(&self.inner.memory_properties, type_filter, properties)
    }

    /// Allocate memory for a resource with the given requirements.
    ///
    /// Fails with [`GpuError::NoCompatibleMemoryType`] when no memory type
    /// satisfies both the requirement bits and `properties`. The allocator
    /// picks the type itself from the matching [`gpu_allocator::MemoryLocation`]; the block
    /// it returns must still carry every flag in `properties`.
    pub fn allocate(
        &self,
        requirements: vk::MemoryRequirements,
        properties: vk::MemoryPropertyFlags,
        linear: bool,
        name: &str,
    ) -> Result<MemoryBlock> {
        let resolved = self.memory_type_index(requirements.memory_type_bits, properties)?;

        let allocation = self
            .inner
            .allocator
            .lock()
            .as_mut()
            .ok_or_else(|| GpuError::InvalidState("Allocator already shut down".to_string()))?
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location: memory_location(properties),
                linear,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| GpuError::AllocationFailed(format!("{name}: {e}")))?;

        let chosen = allocation.memory_type_index() as u32;
        let block = MemoryBlock::new(allocation, self.clone());
        if !memory_type_has(&self.inner.memory_properties, chosen, properties) {
            return Err(GpuError::AllocationFailed(format!(
                "{name}: allocator chose memory type {chosen} lacking {properties:?}"
            )));
        }
        if chosen != resolved {
            tracing::trace!("{name}: memory type {chosen} used instead of {resolved}");
        }
        Ok(block)
    }

    pub(crate) fn free(&self, allocation: Allocation) -> Result<()> {
        if let Some(allocator) = self.inner.allocator.lock().as_mut() {
            allocator
                .free(allocation)
                .map_err(|e| GpuError::AllocationFailed(e.to_string()))?;
        }
        Ok(())
    }

    /// Record a one-shot command list, submit it and block until the GPU has
    /// finished executing it.
    ///
    /// Meant for setup-time transfers only. The upload command buffer is
    /// returned to the initial state whether or not `record` or the
    /// submission fails, so a failed upload does not poison the next one.
    pub fn immediate_submit<F>(&self, record: F) -> Result<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer) -> Result<()>,
    {
        let upload = self.inner.upload.lock();
        let device = &self.inner.device;

        let submitted = self.submit_upload(&upload, record);
        let reset = unsafe {
            device.reset_command_pool(upload.pool, vk::CommandPoolResetFlags::empty())
        };

        submitted?;
        reset?;
        Ok(())
    }

    /// Record and run one upload. Leaves resetting the pool to the caller.
    fn submit_upload<F>(&self, upload: &UploadContext, record: F) -> Result<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer) -> Result<()>,
    {
        let device = &self.inner.device;
        let cmd = upload.command_buffer;

        unsafe {
            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device.begin_command_buffer(cmd, &begin_info)?;

            let recorded = record(device, cmd);
            device.end_command_buffer(cmd)?;
            recorded?;

            let command_buffers = [cmd];
            let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
            device.queue_submit(self.inner.queue, &[submit_info], upload.fence)?;

            device.wait_for_fences(&[upload.fence], true, u64::MAX)?;
            device.reset_fences(&[upload.fence])?;
        }
        Ok(())
    }
}

/// Create the logical device with one graphics queue.
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn create_logical_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    queue_family: u32,
    presenting: bool,
) -> Result<ash::Device> {
    let queue_priority = 1.0_f32;
    let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
        .queue_family_index(queue_family)
        .queue_priorities(std::slice::from_ref(&queue_priority))];

    let extensions = required_device_extensions(presenting);
    let extension_names: Vec<*const std::ffi::c_char> =
        extensions.iter().map(|ext| ext.as_ptr()).collect();

    let features = vk::PhysicalDeviceFeatures::default().sampler_anisotropy(true);

    let device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extension_names)
        .enabled_features(&features);

    let device = unsafe { instance.create_device(physical_device, &device_create_info, None)? };

    Ok(device)
}

/// # Safety
/// The device must be valid and the queue family must exist.
unsafe fn create_upload_context(device: &ash::Device, queue_family: u32) -> Result<UploadContext> {
    let pool_info = vk::CommandPoolCreateInfo::default().queue_family_index(queue_family);
    let pool = unsafe { device.create_command_pool(&pool_info, None)? };

    let alloc_info = vk::CommandBufferAllocateInfo::default()
        .command_pool(pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(1);
    let command_buffer = unsafe { device.allocate_command_buffers(&alloc_info)? }
        .into_iter()
        .next()
        .ok_or_else(|| GpuError::InvalidState("No upload command buffer allocated".to_string()))?;

    let fence = unsafe { device.create_fence(&vk::FenceCreateInfo::default(), None)? };

    Ok(UploadContext {
        pool,
        command_buffer,
        fence,
    })
}
