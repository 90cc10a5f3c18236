//! Graphics pipeline builder.
//!
//! The builder only accumulates state. [`GraphicsPipelineBuilder::resolve`]
//! turns it into a [`PipelineDescription`], a plain value that fully
//! determines the pipeline, and [`GraphicsPipelineBuilder::build`] creates
//! the Vulkan objects from that description. Rasterization is fixed: filled
//! triangle lists, no culling, counter-clockwise front faces, line width 1,
//! one sample, blending disabled.

use crate::descriptors::DescriptorSetLayout;
use crate::device::GpuDevice;
use crate::error::{GpuError, Result};
use crate::shader::ShaderModule;
use ash::vk;

/// One shader stage of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderStage {
    pub stage: vk::ShaderStageFlags,
    pub module: vk::ShaderModule,
}

/// Vertex buffer binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexBinding {
    pub binding: u32,
    pub stride: u32,
    pub input_rate: vk::VertexInputRate,
}

/// Vertex attribute inside a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    pub location: u32,
    pub binding: u32,
    pub format: vk::Format,
    pub offset: u32,
}

/// Depth test configuration. The default disables depth testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthState {
    pub test: bool,
    pub write: bool,
    pub compare_op: vk::CompareOp,
}

impl Default for DepthState {
    fn default() -> Self {
        Self {
            test: false,
            write: false,
            compare_op: vk::CompareOp::NEVER,
        }
    }
}

impl DepthState {
    /// Depth test and write enabled with the given comparison.
    pub fn enabled(compare_op: vk::CompareOp) -> Self {
        Self {
            test: true,
            write: true,
            compare_op,
        }
    }
}

/// Fixed-function policy baked into every pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterPolicy {
    pub topology: vk::PrimitiveTopology,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub line_width: f32,
    pub samples: vk::SampleCountFlags,
}

impl RasterPolicy {
    pub const FIXED: Self = Self {
        topology: vk::PrimitiveTopology::TRIANGLE_LIST,
        polygon_mode: vk::PolygonMode::FILL,
        cull_mode: vk::CullModeFlags::NONE,
        front_face: vk::FrontFace::COUNTER_CLOCKWISE,
        line_width: 1.0,
        samples: vk::SampleCountFlags::TYPE_1,
    };
}

/// Everything a pipeline is built from.
///
/// Two equal descriptions produce interchangeable pipelines.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineDescription {
    pub stages: Vec<ShaderStage>,
    pub vertex_bindings: Vec<VertexBinding>,
    pub vertex_attributes: Vec<VertexAttribute>,
    pub render_pass: vk::RenderPass,
    pub subpass: u32,
    pub depth: DepthState,
    /// Set `i` of the pipeline layout is `set_layouts[i]`.
    pub set_layouts: Vec<vk::DescriptorSetLayout>,
    pub raster: RasterPolicy,
}

/// Accumulates pipeline state; call order does not matter.
#[derive(Debug, Clone, Default)]
pub struct GraphicsPipelineBuilder {
    stages: Vec<ShaderStage>,
    vertex_bindings: Vec<VertexBinding>,
    vertex_attributes: Vec<VertexAttribute>,
    render_pass: Option<vk::RenderPass>,
    depth: DepthState,
    set_layouts: Vec<vk::DescriptorSetLayout>,
}

impl GraphicsPipelineBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a shader stage. A second module for the same stage replaces the first.
    pub fn shader(&mut self, module: &ShaderModule) -> &mut Self {
        self.shader_stage(module.stage(), module.handle())
    }

    /// Add a shader stage from raw parts.
    pub fn shader_stage(
        &mut self,
        stage: vk::ShaderStageFlags,
        module: vk::ShaderModule,
    ) -> &mut Self {
        self.stages.retain(|s| s.stage != stage);
        self.stages.push(ShaderStage { stage, module });
        self
    }

    /// Add a vertex buffer binding.
    pub fn vertex_binding(
        &mut self,
        binding: u32,
        stride: u32,
        input_rate: vk::VertexInputRate,
    ) -> &mut Self {
        self.vertex_bindings.push(VertexBinding {
            binding,
            stride,
            input_rate,
        });
        self
    }

    /// Add a vertex attribute.
    pub fn vertex_attribute(
        &mut self,
        location: u32,
        binding: u32,
        format: vk::Format,
        offset: u32,
    ) -> &mut Self {
        self.vertex_attributes.push(VertexAttribute {
            location,
            binding,
            format,
            offset,
        });
        self
    }

    /// Set the render pass the pipeline draws in (subpass 0).
    pub fn render_pass(&mut self, render_pass: vk::RenderPass) -> &mut Self {
        self.render_pass = Some(render_pass);
        self
    }

    /// Set depth testing.
    pub fn depth(&mut self, depth: DepthState) -> &mut Self {
        self.depth = depth;
        self
    }

    /// Append a descriptor set layout; its position is its set index.
    pub fn descriptor_set_layout(&mut self, layout: &DescriptorSetLayout) -> &mut Self {
        self.set_layouts.push(layout.handle());
        self
    }

    /// Append a raw descriptor set layout handle.
    pub fn descriptor_set_layout_handle(&mut self, layout: vk::DescriptorSetLayout) -> &mut Self {
        self.set_layouts.push(layout);
        self
    }

    /// Snapshot the accumulated state.
    ///
    /// Fails if no render pass or no vertex stage was given.
    pub fn resolve(&self) -> Result<PipelineDescription> {
        let render_pass = self.render_pass.ok_or_else(|| {
            GpuError::PipelineCreation("Render pass not set".to_string())
        })?;
        if !self
            .stages
            .iter()
            .any(|s| s.stage == vk::ShaderStageFlags::VERTEX)
        {
            return Err(GpuError::PipelineCreation(
                "Vertex shader stage not set".to_string(),
            ));
        }

        let mut stages = self.stages.clone();
        stages.sort_by_key(|s| s.stage.as_raw());

        let mut vertex_attributes = self.vertex_attributes.clone();
        vertex_attributes.sort_by_key(|a| a.location);

        let mut vertex_bindings = self.vertex_bindings.clone();
        vertex_bindings.sort_by_key(|b| b.binding);

        Ok(PipelineDescription {
            stages,
            vertex_bindings,
            vertex_attributes,
            render_pass,
            subpass: 0,
            depth: self.depth,
            set_layouts: self.set_layouts.clone(),
            raster: RasterPolicy::FIXED,
        })
    }

    /// Build the pipeline and its layout.
    ///
    /// The builder is left untouched; changing it afterwards has no effect
    /// on pipelines already built.
    pub fn build(&self, device: &GpuDevice) -> Result<Pipeline> {
        let description = self.resolve()?;
        Pipeline::new(device, &description)
    }
}

/// An immutable pipeline and its layout.
pub struct Pipeline {
    handle: vk::Pipeline,
    layout: vk::PipelineLayout,
    device: GpuDevice,
}

impl Pipeline {
    fn new(device: &GpuDevice, description: &PipelineDescription) -> Result<Self> {
        let raw = device.handle();

        let shader_stages: Vec<_> = description
            .stages
            .iter()
            .map(|s| {
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(s.stage)
                    .module(s.module)
                    .name(c"main")
            })
            .collect();

        let bindings: Vec<_> = description
            .vertex_bindings
            .iter()
            .map(|b| {
                vk::VertexInputBindingDescription::default()
                    .binding(b.binding)
                    .stride(b.stride)
                    .input_rate(b.input_rate)
            })
            .collect();

        let attributes: Vec<_> = description
            .vertex_attributes
            .iter()
            .map(|a| {
                vk::VertexInputAttributeDescription::default()
                    .location(a.location)
                    .binding(a.binding)
                    .format(a.format)
                    .offset(a.offset)
            })
            .collect();

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let raster = description.raster;
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(raster.topology)
            .primitive_restart_enable(false);

        // Viewport and scissor are set at draw time
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(raster.polygon_mode)
            .cull_mode(raster.cull_mode)
            .front_face(raster.front_face)
            .depth_bias_enable(false)
            .line_width(raster.line_width);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(raster.samples)
            .sample_shading_enable(false);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(description.depth.test)
            .depth_write_enable(description.depth.write)
            .depth_compare_op(description.depth.compare_op)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(false)
            .color_write_mask(vk::ColorComponentFlags::RGBA)];

        let color_blending = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let layout_info =
            vk::PipelineLayoutCreateInfo::default().set_layouts(&description.set_layouts);

        let layout = unsafe { raw.create_pipeline_layout(&layout_info, None) }
            .map_err(|e| GpuError::PipelineCreation(e.to_string()))?;

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(description.render_pass)
            .subpass(description.subpass);

        let created = unsafe {
            raw.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        };

        let handle = match created {
            Ok(pipelines) => pipelines.into_iter().next(),
            Err((_, e)) => {
                unsafe { raw.destroy_pipeline_layout(layout, None) };
                return Err(GpuError::PipelineCreation(e.to_string()));
            }
        };
        let Some(handle) = handle else {
            unsafe { raw.destroy_pipeline_layout(layout, None) };
            return Err(GpuError::PipelineCreation(
                "Driver returned no pipeline".to_string(),
            ));
        };

        tracing::debug!(
            "Created graphics pipeline ({} stages, {} set layouts)",
            description.stages.len(),
            description.set_layouts.len()
        );

        Ok(Self {
            handle,
            layout,
            device: device.clone(),
        })
    }

    /// The raw pipeline handle.
    pub fn handle(&self) -> vk::Pipeline {
        self.handle
    }

    /// The pipeline layout.
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            let device = self.device.handle();
            device.destroy_pipeline(self.handle, None);
            device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn textured_builder() -> GraphicsPipelineBuilder {
        let mut builder = GraphicsPipelineBuilder::new();
        builder
            .shader_stage(
                vk::ShaderStageFlags::VERTEX,
                vk::ShaderModule::from_raw(10),
            )
            .shader_stage(
                vk::ShaderStageFlags::FRAGMENT,
                vk::ShaderModule::from_raw(11),
            )
            .vertex_binding(0, 32, vk::VertexInputRate::VERTEX)
            .vertex_attribute(0, 0, vk::Format::R32G32B32_SFLOAT, 0)
            .vertex_attribute(1, 0, vk::Format::R32G32B32_SFLOAT, 12)
            .vertex_attribute(2, 0, vk::Format::R32G32_SFLOAT, 24)
            .render_pass(vk::RenderPass::from_raw(20))
            .depth(DepthState::enabled(vk::CompareOp::LESS))
            .descriptor_set_layout_handle(vk::DescriptorSetLayout::from_raw(30))
            .descriptor_set_layout_handle(vk::DescriptorSetLayout::from_raw(31));
        builder
    }

    #[test]
    fn identical_state_resolves_identically() {
        let a = textured_builder().resolve().unwrap();
        let b = textured_builder().resolve().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn call_order_is_irrelevant() {
        let mut reordered = GraphicsPipelineBuilder::new();
        reordered
            .descriptor_set_layout_handle(vk::DescriptorSetLayout::from_raw(30))
            .render_pass(vk::RenderPass::from_raw(20))
            .vertex_attribute(2, 0, vk::Format::R32G32_SFLOAT, 24)
            .depth(DepthState::enabled(vk::CompareOp::LESS))
            .shader_stage(
                vk::ShaderStageFlags::FRAGMENT,
                vk::ShaderModule::from_raw(11),
            )
            .vertex_attribute(0, 0, vk::Format::R32G32B32_SFLOAT, 0)
            .descriptor_set_layout_handle(vk::DescriptorSetLayout::from_raw(31))
            .vertex_binding(0, 32, vk::VertexInputRate::VERTEX)
            .shader_stage(
                vk::ShaderStageFlags::VERTEX,
                vk::ShaderModule::from_raw(10),
            )
            .vertex_attribute(1, 0, vk::Format::R32G32B32_SFLOAT, 12);

        assert_eq!(
            reordered.resolve().unwrap(),
            textured_builder().resolve().unwrap()
        );
    }

    #[test]
    fn later_mutation_does_not_touch_resolved_state() {
        let mut builder = textured_builder();
        let before = builder.resolve().unwrap();

        builder
            .depth(DepthState::default())
            .render_pass(vk::RenderPass::from_raw(99));

        assert_eq!(before.render_pass, vk::RenderPass::from_raw(20));
        assert!(before.depth.test);
        assert_ne!(builder.resolve().unwrap(), before);
    }

    #[test]
    fn set_index_follows_insertion_order() {
        let description = textured_builder().resolve().unwrap();
        assert_eq!(
            description.set_layouts,
            vec![
                vk::DescriptorSetLayout::from_raw(30),
                vk::DescriptorSetLayout::from_raw(31)
            ]
        );
    }

    #[test]
    fn missing_render_pass_fails_at_resolve() {
        let mut builder = GraphicsPipelineBuilder::new();
        builder.shader_stage(vk::ShaderStageFlags::VERTEX, vk::ShaderModule::from_raw(1));
        let err = builder.resolve().unwrap_err();
        assert!(matches!(err, GpuError::PipelineCreation(msg) if msg.contains("Render pass")));
    }

    #[test]
    fn missing_vertex_stage_fails_at_resolve() {
        let mut builder = GraphicsPipelineBuilder::new();
        builder.render_pass(vk::RenderPass::from_raw(1));
        assert!(builder.resolve().is_err());
    }

    #[test]
    fn fixed_raster_policy() {
        let description = textured_builder().resolve().unwrap();
        assert_eq!(description.raster.cull_mode, vk::CullModeFlags::NONE);
        assert_eq!(
            description.raster.front_face,
            vk::FrontFace::COUNTER_CLOCKWISE
        );
        assert_eq!(description.raster.polygon_mode, vk::PolygonMode::FILL);
        assert!((description.raster.line_width - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn stage_replacement() {
        let mut builder = textured_builder();
        builder.shader_stage(
            vk::ShaderStageFlags::VERTEX,
            vk::ShaderModule::from_raw(12),
        );
        let description = builder.resolve().unwrap();
        assert_eq!(description.stages.len(), 2);
        assert!(description
            .stages
            .contains(&ShaderStage {
                stage: vk::ShaderStageFlags::VERTEX,
                module: vk::ShaderModule::from_raw(12),
            }));
    }
}
