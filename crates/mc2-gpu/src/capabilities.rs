//! GPU capability detection and device suitability.

use crate::error::Result;
use crate::surface::Surface;
use ash::vk;
use std::collections::HashSet;
use std::ffi::CStr;

/// Layers and instance extensions the Vulkan loader reports.
///
/// Queried once at startup and handed to instance creation.
#[derive(Debug, Clone, Default)]
pub struct InstanceSupport {
    layers: HashSet<String>,
    extensions: HashSet<String>,
}

impl InstanceSupport {
    /// Query the loader.
    ///
    /// # Safety
    /// The entry must be a valid Vulkan entry point.
    pub unsafe fn query(entry: &ash::Entry) -> Result<Self> {
        let layers = unsafe { entry.enumerate_instance_layer_properties()? }
            .iter()
            .filter_map(|props| props.layer_name_as_c_str().ok())
            .map(|name| name.to_string_lossy().into_owned())
            .collect();

        let extensions = unsafe { entry.enumerate_instance_extension_properties(None)? }
            .iter()
            .filter_map(|props| props.extension_name_as_c_str().ok())
            .map(|name| name.to_string_lossy().into_owned())
            .collect();

        Ok(Self { layers, extensions })
    }

    /// Build from known layer and extension names.
    pub fn from_names<L, E>(layers: L, extensions: E) -> Self
    where
        L: IntoIterator,
        L::Item: Into<String>,
        E: IntoIterator,
        E::Item: Into<String>,
    {
        Self {
            layers: layers.into_iter().map(Into::into).collect(),
            extensions: extensions.into_iter().map(Into::into).collect(),
        }
    }

    /// Check whether a layer is installed.
    pub fn has_layer(&self, name: &CStr) -> bool {
        name.to_str().is_ok_and(|name| self.layers.contains(name))
    }

    /// Check whether an instance extension is available.
    pub fn has_extension(&self, name: &CStr) -> bool {
        name.to_str().is_ok_and(|name| self.extensions.contains(name))
    }

    /// Return the requested layers that are not installed.
    pub fn missing_layers<'a>(&self, requested: &[&'a CStr]) -> Vec<&'a CStr> {
        requested
            .iter()
            .copied()
            .filter(|layer| !self.has_layer(layer))
            .collect()
    }
}

/// GPU vendor identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other(u32),
}

impl GpuVendor {
    /// Identify vendor from PCI vendor ID.
    pub fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            0x106B => Self::Apple,
            other => Self::Other(other),
        }
    }
}

/// Detected GPU capabilities.
#[derive(Debug, Clone)]
pub struct GpuCapabilities {
    /// GPU vendor
    pub vendor: GpuVendor,
    /// Device name
    pub device_name: String,
    /// Device type (discrete, integrated, ...)
    pub device_type: vk::PhysicalDeviceType,
    /// Vulkan API version
    pub api_version: u32,
    /// Driver version
    pub driver_version: u32,
    /// Device-local memory in MB
    pub device_local_memory_mb: u64,
    /// Anisotropic sampling support
    pub supports_sampler_anisotropy: bool,
    /// Geometry shader support
    pub supports_geometry_shader: bool,
    /// Maximum sampler anisotropy
    pub max_sampler_anisotropy: f32,
    /// Available device extensions
    pub available_extensions: HashSet<String>,
}

impl GpuCapabilities {
    /// Query capabilities from a physical device.
    ///
    /// # Safety
    /// The instance and physical device must be valid.
    pub unsafe fn query(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Self {
        let (properties, memory_properties, features, extensions) = unsafe {
            (
                instance.get_physical_device_properties(physical_device),
                instance.get_physical_device_memory_properties(physical_device),
                instance.get_physical_device_features(physical_device),
                instance
                    .enumerate_device_extension_properties(physical_device)
                    .unwrap_or_default(),
            )
        };

        let available_extensions: HashSet<String> = extensions
            .iter()
            .filter_map(|ext| ext.extension_name_as_c_str().ok())
            .map(|name| name.to_string_lossy().into_owned())
            .collect();

        let device_name = properties
            .device_name_as_c_str()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let device_local_memory_mb: u64 = memory_properties
            .memory_heaps
            .iter()
            .take(memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size / (1024 * 1024))
            .sum();

        Self {
            vendor: GpuVendor::from_vendor_id(properties.vendor_id),
            device_name,
            device_type: properties.device_type,
            api_version: properties.api_version,
            driver_version: properties.driver_version,
            device_local_memory_mb,
            supports_sampler_anisotropy: features.sampler_anisotropy == vk::TRUE,
            supports_geometry_shader: features.geometry_shader == vk::TRUE,
            max_sampler_anisotropy: properties.limits.max_sampler_anisotropy,
            available_extensions,
        }
    }

    /// Get a human-readable summary of capabilities.
    pub fn summary(&self) -> String {
        format!(
            "{} ({:?}, {:?}) - Vulkan {}.{}.{} - {} MB VRAM",
            self.device_name,
            self.vendor,
            self.device_type,
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            vk::api_version_patch(self.api_version),
            self.device_local_memory_mb,
        )
    }
}

/// Device extensions required when rendering to a surface.
pub fn required_device_extensions(presenting: bool) -> Vec<&'static CStr> {
    if presenting {
        vec![ash::khr::swapchain::NAME]
    } else {
        Vec::new()
    }
}

/// One physical device evaluated against the renderer's needs.
#[derive(Debug, Clone)]
pub struct DeviceCandidate {
    pub physical_device: vk::PhysicalDevice,
    pub capabilities: GpuCapabilities,
    /// Required extensions the device lacks.
    pub missing_extensions: Vec<String>,
    /// Queue family supporting graphics (and presentation, when a surface is given).
    pub queue_family: Option<u32>,
    /// The surface reports at least one format and one present mode.
    pub swapchain_adequate: bool,
}

impl DeviceCandidate {
    /// Evaluate a physical device, optionally against a presentation surface.
    ///
    /// # Safety
    /// The instance and physical device must be valid, and the surface must
    /// belong to the same instance.
    pub unsafe fn query(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        surface: Option<&Surface>,
    ) -> Result<Self> {
        let capabilities = unsafe { GpuCapabilities::query(instance, physical_device) };

        let missing_extensions = required_device_extensions(surface.is_some())
            .iter()
            .map(|ext| ext.to_string_lossy().into_owned())
            .filter(|ext| !capabilities.available_extensions.contains(ext))
            .collect::<Vec<_>>();

        let families =
            unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

        let mut queue_family = None;
        for (index, family) in families.iter().enumerate() {
            let index = index as u32;
            if !family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                continue;
            }
            let presents = match surface {
                Some(surface) => surface.supports_present(physical_device, index)?,
                None => true,
            };
            if presents {
                queue_family = Some(index);
                break;
            }
        }

        let swapchain_adequate = match surface {
            Some(surface) if missing_extensions.is_empty() => {
                let support = surface.support(physical_device)?;
                !support.formats.is_empty() && !support.present_modes.is_empty()
            }
            Some(_) => false,
            None => true,
        };

        Ok(Self {
            physical_device,
            capabilities,
            missing_extensions,
            queue_family,
            swapchain_adequate,
        })
    }

    /// Whether the device can run the renderer at all.
    pub fn is_suitable(&self) -> bool {
        self.missing_extensions.is_empty()
            && self.queue_family.is_some()
            && self.swapchain_adequate
            && self.capabilities.supports_sampler_anisotropy
    }

    /// Preference score among suitable devices.
    pub fn score(&self) -> u64 {
        let mut score = match self.capabilities.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
            vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
            vk::PhysicalDeviceType::VIRTUAL_GPU => 50,
            _ => 0,
        };

        // +1 per GB
        score += self.capabilities.device_local_memory_mb / 1024;

        if self.capabilities.supports_geometry_shader {
            score += 10;
        }

        score
    }

    /// Explain why a device was rejected.
    pub fn rejection_reason(&self) -> Option<String> {
        if !self.missing_extensions.is_empty() {
            Some(format!("missing extensions {:?}", self.missing_extensions))
        } else if self.queue_family.is_none() {
            Some("no graphics queue family that can present".to_string())
        } else if !self.swapchain_adequate {
            Some("surface reports no formats or present modes".to_string())
        } else if !self.capabilities.supports_sampler_anisotropy {
            Some("sampler anisotropy not supported".to_string())
        } else {
            None
        }
    }
}

/// Pick the highest scoring suitable candidate, first one wins on ties.
pub fn pick_best(candidates: &[DeviceCandidate]) -> Option<&DeviceCandidate> {
    candidates
        .iter()
        .filter(|candidate| candidate.is_suitable())
        .fold(None, |best: Option<&DeviceCandidate>, candidate| match best {
            Some(best) if best.score() >= candidate.score() => Some(best),
            _ => Some(candidate),
        })
}
