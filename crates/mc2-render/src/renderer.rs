//! The Vulkan renderer: one textured mesh drawn under a per-frame transform.

use crate::frame::{FrameData, FrameSets};
use crate::frame_loop::{FrameBackend, FrameLoop, FrameStatus, FRAMES_IN_FLIGHT};
use crate::mesh::{GpuMesh, MeshData, Vertex};
use crate::record::{build_draw_commands, encode, DrawInputs};
use crate::render_pass::{RenderPass, RenderTargets};
use crate::texture::{Texture, TextureData};
use crate::uniforms::FrameTransform;
use ash::vk;
use mc2_gpu::command::{begin_command_buffer, end_command_buffer, submit_command_buffer};
use mc2_gpu::{
    AcquireOutcome, DepthState, DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBuilder,
    GpuDevice, GpuError, GpuInstance, GraphicsPipelineBuilder, InstanceConfig, Pipeline,
    PresentOutcome, PresentationTarget, Result, ShaderModule, Surface, Swapchain,
};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::sync::Arc;

/// Renderer settings.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    pub instance: InstanceConfig,
    /// RGBA clear color of the color attachment.
    pub clear_color: [f32; 4],
    pub vsync: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            instance: InstanceConfig::default(),
            clear_color: [0.0, 157.0 / 256.0, 196.0 / 256.0, 1.0],
            vsync: false,
        }
    }
}

/// What the renderer draws: supplied once at startup.
#[derive(Debug, Clone)]
pub struct Scene {
    pub mesh: MeshData,
    pub texture: TextureData,
    /// Pre-compiled SPIR-V for the vertex stage.
    pub vertex_spirv: Vec<u8>,
    /// Pre-compiled SPIR-V for the fragment stage.
    pub fragment_spirv: Vec<u8>,
}

/// Owns every GPU object the frame protocol touches.
///
/// Fields drop in declaration order: per-slot data first, the swapchain
/// and surface last. Each object keeps the device alive until it is gone.
struct RenderCore {
    frames: Vec<FrameData>,
    // Only held so the sets, layouts and sampled image outlive the frames.
    _descriptor_pool: DescriptorPool,
    pipeline: Pipeline,
    _set_layouts: [DescriptorSetLayout; 2],
    targets: Option<RenderTargets>,
    render_pass: RenderPass,
    _texture: Texture,
    mesh: GpuMesh,
    swapchain: Swapchain,
    clear_color: [f32; 4],
    device: GpuDevice,
}

impl RenderCore {
    fn frame(&self, slot: usize) -> Result<&FrameData> {
        self.frames
            .get(slot)
            .ok_or_else(|| GpuError::InvalidState(format!("No frame slot {slot}")))
    }

    fn frame_mut(&mut self, slot: usize) -> Result<&mut FrameData> {
        self.frames
            .get_mut(slot)
            .ok_or_else(|| GpuError::InvalidState(format!("No frame slot {slot}")))
    }
}

impl FrameBackend for RenderCore {
    fn wait_for_slot(&mut self, slot: usize) -> Result<()> {
        self.frame(slot)?.in_flight().wait()
    }

    fn acquire_image(&mut self, slot: usize) -> Result<AcquireOutcome> {
        let frame = self.frame(slot)?;
        self.swapchain.acquire_next_image(frame.image_acquired())
    }

    fn reset_slot_fence(&mut self, slot: usize) -> Result<()> {
        self.frame(slot)?.in_flight().reset()
    }

    fn update_uniforms(&mut self, slot: usize, transform: &FrameTransform) -> Result<()> {
        self.frame_mut(slot)?.update_uniforms(transform)
    }

    fn record(&mut self, slot: usize, image_index: u32) -> Result<()> {
        let targets = self.targets.as_ref().ok_or_else(|| {
            GpuError::InvalidState("Render targets missing; swapchain not rebuilt".to_string())
        })?;
        let framebuffer = targets.framebuffer(image_index).ok_or_else(|| {
            GpuError::InvalidState(format!("No framebuffer for swapchain image {image_index}"))
        })?;
        let frame = self.frame(slot)?;

        let commands = build_draw_commands(&DrawInputs {
            render_pass: self.render_pass.handle(),
            framebuffer,
            extent: targets.extent(),
            clear_color: self.clear_color,
            pipeline: self.pipeline.handle(),
            pipeline_layout: self.pipeline.layout(),
            vertex_buffer: self.mesh.vertex_buffer(),
            index_buffer: self.mesh.index_buffer(),
            index_count: self.mesh.index_count(),
            descriptor_sets: frame.sets().as_array(),
        });

        frame.reset_commands()?;
        let device = self.device.handle();
        let cmd = frame.command_buffer();
        unsafe {
            begin_command_buffer(device, cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
            encode(device, cmd, &commands);
            end_command_buffer(device, cmd)?;
        }
        Ok(())
    }

    fn submit(&mut self, slot: usize) -> Result<()> {
        let frame = self.frame(slot)?;
        unsafe {
            submit_command_buffer(
                &self.device,
                frame.command_buffer(),
                frame.image_acquired(),
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                frame.render_finished(),
                frame.in_flight(),
            )
        }
    }

    fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentOutcome> {
        let frame = self.frame(slot)?;
        self.swapchain.present(image_index, frame.render_finished())
    }

    fn recreate_swapchain(&mut self, target: &mut dyn PresentationTarget) -> Result<bool> {
        self.device.wait_idle()?;
        // Framebuffers go before the views they reference.
        self.targets = None;

        if !self.swapchain.recreate(target)? {
            return Ok(false);
        }
        if self.swapchain.format() != self.render_pass.color_format() {
            return Err(GpuError::SwapchainCreation(format!(
                "Surface format changed from {:?} to {:?}",
                self.render_pass.color_format(),
                self.swapchain.format()
            )));
        }

        self.targets = Some(RenderTargets::new(
            &self.device,
            &self.render_pass,
            &self.swapchain,
        )?);
        for frame in &mut self.frames {
            frame.renew_image_acquired()?;
        }
        Ok(true)
    }
}

/// Draws the scene every frame, recreating the swapchain as needed.
pub struct Renderer {
    frame_loop: FrameLoop,
    core: RenderCore,
}

impl Renderer {
    /// Create every GPU object needed to draw `scene` into `window`.
    ///
    /// `drawable` is the window's current size in pixels.
    ///
    /// # Safety
    /// `window` must outlive the returned renderer. The surface refers to the
    /// native window by raw handle, so the window must be dropped after the
    /// renderer.
    ///
    /// Calling it outside an `unsafe` block does not compile:
    ///
    /// ```compile_fail
    /// use mc2_render::{Renderer, RendererConfig, Scene};
    /// use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
    ///
    /// fn create<W: HasDisplayHandle + HasWindowHandle>(window: &W, scene: &Scene) {
    ///     let _ = Renderer::new(window, (800, 600), scene, &RendererConfig::default());
    /// }
    /// ```
    pub unsafe fn new<W>(
        window: &W,
        drawable: (u32, u32),
        scene: &Scene,
        config: &RendererConfig,
    ) -> Result<Self>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let display = window
            .display_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get display handle: {e}")))?
            .as_raw();
        let instance = Arc::new(GpuInstance::new(&config.instance, Some(display))?);
        // SAFETY: the caller guarantees the window outlives the renderer.
        let surface = Arc::new(unsafe { Surface::from_window(Arc::clone(&instance), window)? });
        let device = GpuDevice::new(instance, &surface)?;

        let (width, height) = drawable;
        let swapchain = Swapchain::new(
            &device,
            Arc::clone(&surface),
            vk::Extent2D { width, height },
            config.vsync,
        )?;

        let render_pass = RenderPass::new(&device, swapchain.format())?;
        let targets = RenderTargets::new(&device, &render_pass, &swapchain)?;

        let set_layouts = [
            DescriptorSetLayoutBuilder::new()
                .uniform_buffer(0, vk::ShaderStageFlags::VERTEX)
                .build(&device)?,
            DescriptorSetLayoutBuilder::new()
                .combined_image_sampler(0, vk::ShaderStageFlags::FRAGMENT)
                .build(&device)?,
        ];

        let pipeline = {
            let vertex = ShaderModule::from_spirv(
                &device,
                vk::ShaderStageFlags::VERTEX,
                &scene.vertex_spirv,
            )?;
            let fragment = ShaderModule::from_spirv(
                &device,
                vk::ShaderStageFlags::FRAGMENT,
                &scene.fragment_spirv,
            )?;

            let mut builder = GraphicsPipelineBuilder::new();
            builder
                .shader(&vertex)
                .shader(&fragment)
                .render_pass(render_pass.handle())
                .depth(DepthState::enabled(vk::CompareOp::LESS));
            for layout in &set_layouts {
                builder.descriptor_set_layout(layout);
            }
            Vertex::describe(&mut builder);
            builder.build(&device)?
        };

        let mesh = GpuMesh::upload(&device, &scene.mesh)?;
        let texture = Texture::upload(&device, &scene.texture)?;

        let descriptor_pool = DescriptorPool::new(
            &device,
            FRAMES_IN_FLIGHT as u32,
            &[
                vk::DescriptorType::UNIFORM_BUFFER,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            ],
        )?;

        let layout_handles = [set_layouts[0].handle(), set_layouts[1].handle()];
        let frames = (0..FRAMES_IN_FLIGHT)
            .map(|_| {
                let sets = descriptor_pool.allocate(&layout_handles)?;
                let [uniforms, texture_set] = sets[..] else {
                    return Err(GpuError::InvalidState(format!(
                        "Expected 2 descriptor sets, got {}",
                        sets.len()
                    )));
                };
                FrameData::new(
                    &device,
                    FrameSets {
                        uniforms,
                        texture: texture_set,
                    },
                    &texture,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::info!(
            "Renderer initialized: {} frames in flight, {} swapchain images",
            FRAMES_IN_FLIGHT,
            swapchain.image_count()
        );

        Ok(Self {
            frame_loop: FrameLoop::new(),
            core: RenderCore {
                frames,
                _descriptor_pool: descriptor_pool,
                pipeline,
                _set_layouts: set_layouts,
                targets: Some(targets),
                render_pass,
                _texture: texture,
                mesh,
                swapchain,
                clear_color: config.clear_color,
                device,
            },
        })
    }

    /// Draw one frame with `transform`.
    ///
    /// `target` is polled if the swapchain has to be rebuilt while the
    /// window is minimized.
    pub fn draw<P: PresentationTarget>(
        &mut self,
        target: &mut P,
        transform: &FrameTransform,
    ) -> Result<FrameStatus> {
        self.frame_loop.draw(&mut self.core, target, transform)
    }

    /// Rebuild the swapchain before the next frame.
    pub fn notify_resized(&mut self) {
        self.frame_loop.mark_stale();
    }

    /// Frames presented so far.
    pub fn frame_number(&self) -> u64 {
        self.frame_loop.frame_number()
    }

    /// Current swapchain extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.core.swapchain.extent()
    }

    pub fn device(&self) -> &GpuDevice {
        &self.core.device
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.core.device.wait_idle() {
            tracing::error!("Failed to wait for device idle on shutdown: {e}");
        }
    }
}
