//! Vulkan instance creation.

use crate::capabilities::InstanceSupport;
use crate::error::{GpuError, Result};
use ash::vk;
use raw_window_handle::RawDisplayHandle;
use std::ffi::{c_void, CStr, CString};

/// Khronos validation layer name.
pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Instance creation settings, passed explicitly into [`GpuInstance::new`].
#[derive(Debug, Clone)]
pub struct InstanceConfig {
    /// Application name reported to the driver.
    pub app_name: String,
    /// Enable the Khronos validation layer. Missing layer is fatal.
    pub validation: bool,
    /// Additional instance extensions on top of the windowing ones.
    pub extensions: Vec<&'static CStr>,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            app_name: "mc2".to_string(),
            validation: cfg!(debug_assertions),
            extensions: Vec::new(),
        }
    }
}

impl InstanceConfig {
    /// Create a config with the given application name.
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            ..Default::default()
        }
    }

    /// Enable or disable validation layers.
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    /// Request an additional instance extension.
    pub fn with_extension(mut self, extension: &'static CStr) -> Self {
        self.extensions.push(extension);
        self
    }
}

struct DebugMessenger {
    loader: ash::ext::debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
}

/// Loaded Vulkan entry point plus the instance created from it.
///
/// Shared behind an `Arc` by the surface and the device so that it is
/// destroyed only after both of them.
pub struct GpuInstance {
    entry: ash::Entry,
    instance: ash::Instance,
    support: InstanceSupport,
    debug: Option<DebugMessenger>,
}

impl GpuInstance {
    /// Load Vulkan and create an instance.
    ///
    /// Pass the window's display handle to enable the surface extensions it
    /// needs, or `None` for a headless instance.
    pub fn new(config: &InstanceConfig, display: Option<RawDisplayHandle>) -> Result<Self> {
        // SAFETY: loading the system Vulkan library has no preconditions beyond
        // the library itself being well-behaved.
        let entry = unsafe { ash::Entry::load() }.map_err(|e| GpuError::Loader(e.to_string()))?;

        // SAFETY: entry was just loaded.
        let support = unsafe { InstanceSupport::query(&entry)? };

        let mut layers: Vec<&CStr> = Vec::new();
        if config.validation {
            let missing = support.missing_layers(&[VALIDATION_LAYER]);
            if let Some(layer) = missing.first() {
                return Err(GpuError::LayerNotAvailable(layer.to_string_lossy().into_owned()));
            }
            layers.push(VALIDATION_LAYER);
        }

        let mut extension_names: Vec<*const std::ffi::c_char> = Vec::new();
        if let Some(display) = display {
            let window_extensions = ash_window::enumerate_required_extensions(display)
                .map_err(|e| GpuError::SurfaceCreation(e.to_string()))?;
            extension_names.extend_from_slice(window_extensions);
        }
        extension_names.extend(config.extensions.iter().map(|ext| ext.as_ptr()));
        if config.validation && support.has_extension(ash::ext::debug_utils::NAME) {
            extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
        }
        #[cfg(target_os = "macos")]
        {
            extension_names.push(ash::khr::portability_enumeration::NAME.as_ptr());
            extension_names.push(ash::khr::get_physical_device_properties2::NAME.as_ptr());
        }

        let app_name = CString::new(config.app_name.as_str())
            .map_err(|e| GpuError::InvalidState(format!("Invalid application name: {e}")))?;

        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(c"mc2")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_1);

        let layer_names: Vec<*const std::ffi::c_char> = layers.iter().map(|l| l.as_ptr()).collect();

        // Required for MoltenVK on macOS
        #[cfg(target_os = "macos")]
        let create_flags = vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
        #[cfg(not(target_os = "macos"))]
        let create_flags = vk::InstanceCreateFlags::empty();

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extension_names)
            .enabled_layer_names(&layer_names)
            .flags(create_flags);

        // SAFETY: all pointers in create_info outlive this call.
        let instance = unsafe { entry.create_instance(&create_info, None)? };

        let debug = if config.validation && support.has_extension(ash::ext::debug_utils::NAME) {
            match unsafe { create_debug_messenger(&entry, &instance) } {
                Ok(debug) => Some(debug),
                Err(e) => {
                    tracing::warn!("Failed to create debug messenger: {e}");
                    None
                }
            }
        } else {
            None
        };

        let validation = if debug.is_some() { "on" } else { "off" };
        tracing::info!("Vulkan instance created (validation: {})", validation);

        Ok(Self {
            entry,
            instance,
            support,
            debug,
        })
    }

    /// Get the Vulkan entry point.
    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    /// Get the Vulkan instance handle.
    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }

    /// Layers and extensions reported by the loader at startup.
    pub fn support(&self) -> &InstanceSupport {
        &self.support
    }
}

impl Drop for GpuInstance {
    fn drop(&mut self) {
        unsafe {
            if let Some(debug) = self.debug.take() {
                debug
                    .loader
                    .destroy_debug_utils_messenger(debug.messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// # Safety
/// The entry and instance must be valid and the instance must have been
/// created with the debug utils extension enabled.
unsafe fn create_debug_messenger(
    entry: &ash::Entry,
    instance: &ash::Instance,
) -> Result<DebugMessenger> {
    let loader = ash::ext::debug_utils::Instance::new(entry, instance);

    let info = vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback));

    // SAFETY: caller guarantees the extension is enabled.
    let messenger = unsafe { loader.create_debug_utils_messenger(&info, None)? };

    Ok(DebugMessenger { loader, messenger })
}

/// Forwards validation messages into `tracing`.
unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() {
        return vk::FALSE;
    }
    // SAFETY: the loader passes a valid callback struct whose message is a
    // NUL-terminated string for the duration of the call.
    let message = unsafe {
        let data = &*data;
        if data.p_message.is_null() {
            return vk::FALSE;
        }
        CStr::from_ptr(data.p_message).to_string_lossy()
    };

    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        tracing::error!(target: "vulkan", "[{message_type:?}] {message}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        tracing::warn!(target: "vulkan", "[{message_type:?}] {message}");
    } else {
        tracing::debug!(target: "vulkan", "[{message_type:?}] {message}");
    }

    vk::FALSE
}
