//! Swapchain management.

use crate::device::GpuDevice;
use crate::error::{GpuError, Result};
use crate::surface::{Surface, SurfaceSupport};
use crate::sync::Semaphore;
use ash::vk;
use std::sync::Arc;

/// Something that owns a drawable area, usually a window.
///
/// Swapchain recreation polls it until the area becomes non-zero again.
pub trait PresentationTarget {
    /// Current drawable size in pixels.
    fn drawable_size(&self) -> (u32, u32);

    /// Block until the event source delivers new events.
    ///
    /// Returns `false` once the target is closed and will never grow again.
    fn wait_events(&mut self) -> bool;
}

/// Poll `target` until its drawable size is non-zero.
///
/// Returns `None` if the target closes while minimized.
pub fn wait_for_drawable_extent<P>(target: &mut P) -> Option<vk::Extent2D>
where
    P: PresentationTarget + ?Sized,
{
    loop {
        let (width, height) = target.drawable_size();
        if width > 0 && height > 0 {
            return Some(vk::Extent2D { width, height });
        }
        if !target.wait_events() {
            return None;
        }
    }
}

/// Result of asking the swapchain for the next image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image is available and will signal the semaphore when ready.
    Ready(u32),
    /// Out of date or suboptimal; the swapchain must be recreated.
    Stale,
}

/// Result of presenting an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    /// Presented (or dropped) against a stale swapchain; recreate before the next frame.
    Stale,
}

/// Format, present mode and extent derived from one surface snapshot.
#[derive(Debug, Clone, Copy)]
pub struct SwapchainSettings {
    pub format: vk::Format,
    pub color_space: vk::ColorSpaceKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

impl SwapchainSettings {
    /// Apply the format, present-mode and extent policies.
    pub fn resolve(support: &SurfaceSupport, drawable: vk::Extent2D, vsync: bool) -> Result<Self> {
        let surface_format = select_surface_format(&support.formats).ok_or_else(|| {
            GpuError::SwapchainCreation("Surface reports no formats".to_string())
        })?;
        let caps = &support.capabilities;

        // Determine image count
        let mut image_count = caps.min_image_count + 1;
        if caps.max_image_count > 0 && image_count > caps.max_image_count {
            image_count = caps.max_image_count;
        }

        Ok(Self {
            format: surface_format.format,
            color_space: surface_format.color_space,
            present_mode: select_present_mode(&support.present_modes, vsync),
            extent: calculate_extent(caps, drawable.width, drawable.height),
            image_count,
            pre_transform: caps.current_transform,
        })
    }
}

/// The chain of presentable images plus the views created for them.
///
/// The images belong to the presentation engine; the views and the chain
/// itself are destroyed on drop or recreation.
pub struct Swapchain {
    handle: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    settings: SwapchainSettings,
    vsync: bool,
    loader: ash::khr::swapchain::Device,
    device: GpuDevice,
    surface: Arc<Surface>,
}

impl Swapchain {
    /// Create a swapchain for `surface` sized from `drawable`.
    pub fn new(
        device: &GpuDevice,
        surface: Arc<Surface>,
        drawable: vk::Extent2D,
        vsync: bool,
    ) -> Result<Self> {
        let loader = ash::khr::swapchain::Device::new(device.instance().handle(), device.handle());
        let support = surface.support(device.physical_device())?;
        let settings = SwapchainSettings::resolve(&support, drawable, vsync)?;

        let mut swapchain = Self {
            handle: vk::SwapchainKHR::null(),
            images: Vec::new(),
            image_views: Vec::new(),
            settings,
            vsync,
            loader,
            device: device.clone(),
            surface,
        };
        swapchain.build(settings)?;

        tracing::info!(
            "Swapchain created: {}x{} {:?} {:?} ({} images)",
            settings.extent.width,
            settings.extent.height,
            settings.format,
            settings.present_mode,
            swapchain.images.len()
        );

        Ok(swapchain)
    }

    fn build(&mut self, settings: SwapchainSettings) -> Result<()> {
        let queue_families = [self.device.queue_family()];
        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface.handle())
            .min_image_count(settings.image_count)
            .image_format(settings.format)
            .image_color_space(settings.color_space)
            .image_extent(settings.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .queue_family_indices(&queue_families)
            .pre_transform(settings.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(settings.present_mode)
            .clipped(true);

        self.handle = unsafe { self.loader.create_swapchain(&create_info, None) }
            .map_err(|e| GpuError::SwapchainCreation(e.to_string()))?;
        self.settings = settings;

        self.images = unsafe { self.loader.get_swapchain_images(self.handle)? };

        for &image in &self.images {
            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(settings.format)
                .components(vk::ComponentMapping::default())
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .base_mip_level(0)
                        .level_count(1)
                        .base_array_layer(0)
                        .layer_count(1),
                );

            // Pushed one by one so a failure still lets destroy_chain clean up.
            let view = unsafe { self.device.handle().create_image_view(&view_info, None)? };
            self.image_views.push(view);
        }

        Ok(())
    }

    fn destroy_chain(&mut self) {
        unsafe {
            for view in self.image_views.drain(..) {
                self.device.handle().destroy_image_view(view, None);
            }
            if self.handle != vk::SwapchainKHR::null() {
                self.loader.destroy_swapchain(self.handle, None);
            }
        }
        self.handle = vk::SwapchainKHR::null();
        self.images.clear();
    }

    /// Tear the swapchain down and build it again for the target's current size.
    ///
    /// Waits for the device to go idle, destroys the old views and chain,
    /// then blocks while the drawable area is zero. Returns `false` if the
    /// target closed while waiting; the swapchain then stays empty and every
    /// acquire reports [`AcquireOutcome::Stale`].
    pub fn recreate<P>(&mut self, target: &mut P) -> Result<bool>
    where
        P: PresentationTarget + ?Sized,
    {
        self.device.wait_idle()?;
        self.destroy_chain();

        let Some(drawable) = wait_for_drawable_extent(target) else {
            tracing::info!("Presentation target closed during swapchain recreation");
            return Ok(false);
        };

        let support = self.surface.support(self.device.physical_device())?;
        let settings = SwapchainSettings::resolve(&support, drawable, self.vsync)?;
        self.build(settings)?;

        tracing::info!(
            "Swapchain recreated: {}x{} ({} images)",
            settings.extent.width,
            settings.extent.height,
            self.images.len()
        );

        Ok(true)
    }

    /// Acquire the next image, signaling `signal` once it is available.
    pub fn acquire_next_image(&self, signal: &Semaphore) -> Result<AcquireOutcome> {
        if self.handle == vk::SwapchainKHR::null() {
            return Ok(AcquireOutcome::Stale);
        }

        let result = unsafe {
            self.loader.acquire_next_image(
                self.handle,
                u64::MAX,
                signal.handle(),
                vk::Fence::null(),
            )
        };

        match result {
            Ok((index, false)) => Ok(AcquireOutcome::Ready(index)),
            Ok((_, true)) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::Stale),
            Err(e) => Err(GpuError::from(e)),
        }
    }

    /// Present an image once `wait` is signaled.
    pub fn present(&self, image_index: u32, wait: &Semaphore) -> Result<PresentOutcome> {
        let swapchains = [self.handle];
        let image_indices = [image_index];
        let wait_semaphores = [wait.handle()];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe { self.loader.queue_present(self.device.queue(), &present_info) };

        match result {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::Stale),
            Err(e) => Err(GpuError::from(e)),
        }
    }

    /// Raw swapchain handle, null while recreation is pending.
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    /// Views onto the presentable images, one per image.
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// Number of presentable images.
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Color format of the images.
    pub fn format(&self) -> vk::Format {
        self.settings.format
    }

    /// Current image extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.settings.extent
    }

    /// Settings the chain was last built with.
    pub fn settings(&self) -> &SwapchainSettings {
        &self.settings
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy_chain();
    }
}

/// Select the surface format.
///
/// Prefers `B8G8R8A8_SRGB` with the sRGB non-linear color space, otherwise
/// the first reported format.
pub fn select_surface_format(available: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    available
        .iter()
        .find(|format| {
            format.format == vk::Format::B8G8R8A8_SRGB
                && format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| available.first())
        .copied()
}

/// Select the present mode.
pub fn select_present_mode(available: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if vsync {
        return vk::PresentModeKHR::FIFO;
    }

    // Mailbox, then immediate, then FIFO (always supported)
    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
        .into_iter()
        .find(|mode| available.contains(mode))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Calculate swapchain extent.
///
/// Uses the fixed current extent when the surface reports one, otherwise
/// clamps each axis into its own bounds.
pub fn calculate_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    desired_width: u32,
    desired_height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: desired_width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: desired_height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    fn free_extent_caps() -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 3,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 10,
                height: 20,
            },
            max_image_extent: vk::Extent2D {
                width: 4000,
                height: 300,
            },
            ..Default::default()
        }
    }

    #[test]
    fn srgb_format_preferred() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        let chosen = select_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);
    }

    #[test]
    fn first_format_is_fallback() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        let chosen = select_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::R8G8B8A8_UNORM);
        assert!(select_surface_format(&[]).is_none());
    }

    #[test]
    fn present_mode_policy() {
        let all = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::MAILBOX,
        ];
        assert_eq!(select_present_mode(&all, false), vk::PresentModeKHR::MAILBOX);
        assert_eq!(select_present_mode(&all, true), vk::PresentModeKHR::FIFO);
        assert_eq!(
            select_present_mode(&all[..2], false),
            vk::PresentModeKHR::IMMEDIATE
        );
        assert_eq!(
            select_present_mode(&all[..1], false),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn fixed_extent_wins() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            ..free_extent_caps()
        };
        let extent = calculate_extent(&caps, 1920, 1080);
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn each_axis_clamped_to_its_own_bounds() {
        let caps = free_extent_caps();
        let extent = calculate_extent(&caps, 1920, 1080);
        assert_eq!((extent.width, extent.height), (1920, 300));

        let extent = calculate_extent(&caps, 1, 1);
        assert_eq!((extent.width, extent.height), (10, 20));
    }

    #[test]
    fn resolve_is_stable_for_same_size() {
        let support = SurfaceSupport {
            capabilities: free_extent_caps(),
            formats: vec![format(
                vk::Format::B8G8R8A8_SRGB,
                vk::ColorSpaceKHR::SRGB_NONLINEAR,
            )],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        let drawable = vk::Extent2D {
            width: 640,
            height: 200,
        };

        let first = SwapchainSettings::resolve(&support, drawable, false).unwrap();
        let second = SwapchainSettings::resolve(&support, drawable, false).unwrap();
        assert_eq!(first.format, second.format);
        assert_eq!(
            (first.extent.width, first.extent.height),
            (second.extent.width, second.extent.height)
        );
        assert_eq!(first.image_count, 3);
    }

    #[test]
    fn resolve_rejects_empty_format_list() {
        let support = SurfaceSupport {
            capabilities: free_extent_caps(),
            formats: Vec::new(),
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        let drawable = vk::Extent2D {
            width: 640,
            height: 200,
        };
        assert!(SwapchainSettings::resolve(&support, drawable, false).is_err());
    }

    struct MinimizedWindow {
        sizes: Vec<(u32, u32)>,
        waits: usize,
        closes_after: Option<usize>,
    }

    impl PresentationTarget for MinimizedWindow {
        fn drawable_size(&self) -> (u32, u32) {
            self.sizes[self.waits.min(self.sizes.len() - 1)]
        }

        fn wait_events(&mut self) -> bool {
            self.waits += 1;
            self.closes_after.map_or(true, |limit| self.waits < limit)
        }
    }

    #[test]
    fn waits_until_drawable_is_non_zero() {
        let mut window = MinimizedWindow {
            sizes: vec![(0, 0), (800, 0), (0, 600), (800, 600)],
            waits: 0,
            closes_after: None,
        };
        let extent = wait_for_drawable_extent(&mut window).unwrap();
        assert_eq!((extent.width, extent.height), (800, 600));
        assert_eq!(window.waits, 3);
    }

    #[test]
    fn closing_while_minimized_stops_waiting() {
        let mut window = MinimizedWindow {
            sizes: vec![(0, 0)],
            waits: 0,
            closes_after: Some(2),
        };
        assert!(wait_for_drawable_extent(&mut window).is_none());
        assert_eq!(window.waits, 2);
    }

    #[test]
    fn no_wait_when_already_visible() {
        let mut window = MinimizedWindow {
            sizes: vec![(1, 1)],
            waits: 0,
            closes_after: None,
        };
        assert!(wait_for_drawable_extent(&mut window).is_some());
        assert_eq!(window.waits, 0);
    }
}
