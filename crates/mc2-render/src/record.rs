//! Draw-command planning and encoding.
//!
//! A frame's command buffer is first planned as a list of [`DrawCommand`]s
//! and then encoded. Keeping the plan as a value makes recordings comparable
//! without a GPU.

use ash::vk;

/// One command recorded into a frame's command buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DrawCommand {
    BeginRenderPass {
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        width: u32,
        height: u32,
        clear_color: [f32; 4],
        clear_depth: f32,
    },
    BindPipeline(vk::Pipeline),
    /// Full-extent viewport with depth range `0..1`.
    SetViewport {
        width: f32,
        height: f32,
    },
    /// Scissor covering the whole framebuffer.
    SetScissor {
        width: u32,
        height: u32,
    },
    BindVertexBuffer(vk::Buffer),
    BindIndexBuffer(vk::Buffer),
    BindDescriptorSets {
        layout: vk::PipelineLayout,
        sets: [vk::DescriptorSet; 2],
    },
    DrawIndexed {
        index_count: u32,
    },
    EndRenderPass,
}

/// Everything one frame's draw depends on.
#[derive(Debug, Clone, Copy)]
pub struct DrawInputs {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub clear_color: [f32; 4],
    pub pipeline: vk::Pipeline,
    pub pipeline_layout: vk::PipelineLayout,
    pub vertex_buffer: vk::Buffer,
    pub index_buffer: vk::Buffer,
    pub index_count: u32,
    /// The slot's sets, in set-index order.
    pub descriptor_sets: [vk::DescriptorSet; 2],
}

/// Plan a single indexed draw of the mesh into the whole framebuffer.
pub fn build_draw_commands(inputs: &DrawInputs) -> Vec<DrawCommand> {
    let vk::Extent2D { width, height } = inputs.extent;

    vec![
        DrawCommand::BeginRenderPass {
            render_pass: inputs.render_pass,
            framebuffer: inputs.framebuffer,
            width,
            height,
            clear_color: inputs.clear_color,
            clear_depth: 1.0,
        },
        DrawCommand::BindPipeline(inputs.pipeline),
        DrawCommand::SetViewport {
            width: width as f32,
            height: height as f32,
        },
        DrawCommand::SetScissor { width, height },
        DrawCommand::BindVertexBuffer(inputs.vertex_buffer),
        DrawCommand::BindIndexBuffer(inputs.index_buffer),
        DrawCommand::BindDescriptorSets {
            layout: inputs.pipeline_layout,
            sets: inputs.descriptor_sets,
        },
        DrawCommand::DrawIndexed {
            index_count: inputs.index_count,
        },
        DrawCommand::EndRenderPass,
    ]
}

/// Record `commands` into `cmd`.
///
/// # Safety
/// `cmd` must be in the recording state and every handle in `commands`
/// must belong to `device`.
pub unsafe fn encode(device: &ash::Device, cmd: vk::CommandBuffer, commands: &[DrawCommand]) {
    for command in commands {
        match *command {
            DrawCommand::BeginRenderPass {
                render_pass,
                framebuffer,
                width,
                height,
                clear_color,
                clear_depth,
            } => {
                let clear_values = [
                    vk::ClearValue {
                        color: vk::ClearColorValue {
                            float32: clear_color,
                        },
                    },
                    vk::ClearValue {
                        depth_stencil: vk::ClearDepthStencilValue {
                            depth: clear_depth,
                            stencil: 0,
                        },
                    },
                ];
                let begin_info = vk::RenderPassBeginInfo::default()
                    .render_pass(render_pass)
                    .framebuffer(framebuffer)
                    .render_area(full_rect(width, height))
                    .clear_values(&clear_values);
                unsafe {
                    device.cmd_begin_render_pass(cmd, &begin_info, vk::SubpassContents::INLINE);
                }
            }
            DrawCommand::BindPipeline(pipeline) => unsafe {
                device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline);
            },
            DrawCommand::SetViewport { width, height } => unsafe {
                let viewport = vk::Viewport {
                    x: 0.0,
                    y: 0.0,
                    width,
                    height,
                    min_depth: 0.0,
                    max_depth: 1.0,
                };
                device.cmd_set_viewport(cmd, 0, &[viewport]);
            },
            DrawCommand::SetScissor { width, height } => unsafe {
                device.cmd_set_scissor(cmd, 0, &[full_rect(width, height)]);
            },
            DrawCommand::BindVertexBuffer(buffer) => unsafe {
                device.cmd_bind_vertex_buffers(cmd, 0, &[buffer], &[0]);
            },
            DrawCommand::BindIndexBuffer(buffer) => unsafe {
                device.cmd_bind_index_buffer(cmd, buffer, 0, vk::IndexType::UINT16);
            },
            DrawCommand::BindDescriptorSets { layout, sets } => unsafe {
                device.cmd_bind_descriptor_sets(
                    cmd,
                    vk::PipelineBindPoint::GRAPHICS,
                    layout,
                    0,
                    &sets,
                    &[],
                );
            },
            DrawCommand::DrawIndexed { index_count } => unsafe {
                device.cmd_draw_indexed(cmd, index_count, 1, 0, 0, 0);
            },
            DrawCommand::EndRenderPass => unsafe {
                device.cmd_end_render_pass(cmd);
            },
        }
    }
}

fn full_rect(width: u32, height: u32) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent: vk::Extent2D { width, height },
    }
}
