//! The single-subpass render pass and the per-swapchain render targets.

use ash::vk;
use mc2_gpu::{GpuDevice, GpuImage, Result, Swapchain, Undefined};

/// Depth attachment format.
pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// Color attachment plus depth attachment, one subpass.
///
/// The color attachment is cleared, stored and left ready for presentation.
pub struct RenderPass {
    handle: vk::RenderPass,
    color_format: vk::Format,
    device: GpuDevice,
}

impl RenderPass {
    pub fn new(device: &GpuDevice, color_format: vk::Format) -> Result<Self> {
        let attachments = [
            vk::AttachmentDescription::default()
                .format(color_format)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::STORE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::PRESENT_SRC_KHR),
            vk::AttachmentDescription::default()
                .format(DEPTH_FORMAT)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::STORE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
        ];

        let color_refs = [vk::AttachmentReference::default()
            .attachment(0)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)];
        let depth_ref = vk::AttachmentReference::default()
            .attachment(1)
            .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

        let subpasses = [vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs)
            .depth_stencil_attachment(&depth_ref)];

        let depth_stages = vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
            | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
        let dependencies = [
            vk::SubpassDependency::default()
                .src_subpass(vk::SUBPASS_EXTERNAL)
                .dst_subpass(0)
                .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
                .src_access_mask(vk::AccessFlags::empty())
                .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
                .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE),
            vk::SubpassDependency::default()
                .src_subpass(vk::SUBPASS_EXTERNAL)
                .dst_subpass(0)
                .src_stage_mask(depth_stages)
                .src_access_mask(vk::AccessFlags::empty())
                .dst_stage_mask(depth_stages)
                .dst_access_mask(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE),
        ];

        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let handle = unsafe { device.handle().create_render_pass(&create_info, None)? };
        tracing::debug!("Created render pass for {color_format:?}");

        Ok(Self {
            handle,
            color_format,
            device: device.clone(),
        })
    }

    pub fn handle(&self) -> vk::RenderPass {
        self.handle
    }

    pub fn color_format(&self) -> vk::Format {
        self.color_format
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_render_pass(self.handle, None);
        }
    }
}

/// Depth image plus one framebuffer per swapchain image.
///
/// Sized to the swapchain; rebuilt whenever it is recreated.
pub struct RenderTargets {
    framebuffers: Vec<vk::Framebuffer>,
    depth: GpuImage<Undefined>,
    extent: vk::Extent2D,
    device: GpuDevice,
}

impl RenderTargets {
    pub fn new(
        device: &GpuDevice,
        render_pass: &RenderPass,
        swapchain: &Swapchain,
    ) -> Result<Self> {
        let extent = swapchain.extent();
        let depth = GpuImage::new(
            device,
            DEPTH_FORMAT,
            extent,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            vk::ImageAspectFlags::DEPTH,
            "depth",
        )?;

        let mut targets = Self {
            framebuffers: Vec::with_capacity(swapchain.image_count()),
            depth,
            extent,
            device: device.clone(),
        };

        for &view in swapchain.image_views() {
            let attachments = [view, targets.depth.view()];
            let create_info = vk::FramebufferCreateInfo::default()
                .render_pass(render_pass.handle())
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);

            let framebuffer = unsafe { device.handle().create_framebuffer(&create_info, None)? };
            targets.framebuffers.push(framebuffer);
        }

        Ok(targets)
    }

    /// Framebuffer targeting swapchain image `image_index`.
    pub fn framebuffer(&self, image_index: u32) -> Option<vk::Framebuffer> {
        self.framebuffers.get(image_index as usize).copied()
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for RenderTargets {
    fn drop(&mut self) {
        unsafe {
            for framebuffer in self.framebuffers.drain(..) {
                self.device.handle().destroy_framebuffer(framebuffer, None);
            }
        }
    }
}
