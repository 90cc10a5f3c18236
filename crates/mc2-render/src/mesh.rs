//! Vertex layout and static mesh data.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use mc2_gpu::{GpuDevice, GraphicsPipelineBuilder, ResidentBuffer, Result};

/// One vertex: position, color and texture coordinate.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub color: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    /// Byte stride of one vertex in binding 0.
    pub const STRIDE: u32 = std::mem::size_of::<Self>() as u32;

    /// Shader location, format and byte offset of every attribute.
    pub const ATTRIBUTES: [(u32, vk::Format, u32); 3] = [
        (0, vk::Format::R32G32B32_SFLOAT, 0),
        (1, vk::Format::R32G32B32_SFLOAT, 12),
        (2, vk::Format::R32G32_SFLOAT, 24),
    ];

    pub const fn new(position: [f32; 3], color: [f32; 3], uv: [f32; 2]) -> Self {
        Self {
            position,
            color,
            uv,
        }
    }

    /// Register the vertex binding and attributes on a pipeline builder.
    pub fn describe(builder: &mut GraphicsPipelineBuilder) -> &mut GraphicsPipelineBuilder {
        builder.vertex_binding(0, Self::STRIDE, vk::VertexInputRate::VERTEX);
        for (location, format, offset) in Self::ATTRIBUTES {
            builder.vertex_attribute(location, 0, format, offset);
        }
        builder
    }
}

/// CPU-side mesh: vertices plus 16-bit triangle-list indices.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u16>,
}

impl MeshData {
    /// Unit cube centered on the origin.
    ///
    /// Eight shared corners, so texture coordinates only line up on the
    /// front and back faces.
    pub fn unit_cube() -> Self {
        const H: f32 = 0.5;
        let vertices = vec![
            Vertex::new([-H, -H, H], [1.0, 0.0, 0.0], [0.0, 0.0]),
            Vertex::new([H, -H, H], [0.0, 1.0, 0.0], [1.0, 0.0]),
            Vertex::new([H, H, H], [0.0, 0.0, 1.0], [1.0, 1.0]),
            Vertex::new([-H, H, H], [1.0, 1.0, 0.0], [0.0, 1.0]),
            Vertex::new([-H, -H, -H], [1.0, 0.0, 1.0], [1.0, 0.0]),
            Vertex::new([H, -H, -H], [0.0, 1.0, 1.0], [0.0, 0.0]),
            Vertex::new([H, H, -H], [1.0, 1.0, 1.0], [0.0, 1.0]),
            Vertex::new([-H, H, -H], [0.0, 0.0, 0.0], [1.0, 1.0]),
        ];

        #[rustfmt::skip]
        let indices = vec![
            0, 1, 2, 2, 3, 0, // front
            5, 4, 7, 7, 6, 5, // back
            4, 0, 3, 3, 7, 4, // left
            1, 5, 6, 6, 2, 1, // right
            3, 2, 6, 6, 7, 3, // top
            4, 5, 1, 1, 0, 4, // bottom
        ];

        Self { vertices, indices }
    }

    /// Number of indices drawn.
    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }
}

/// A mesh uploaded into device-local vertex and index buffers.
pub struct GpuMesh {
    vertices: ResidentBuffer,
    indices: ResidentBuffer,
    index_count: u32,
}

impl GpuMesh {
    /// Upload both buffers through staging.
    pub fn upload(device: &GpuDevice, mesh: &MeshData) -> Result<Self> {
        let vertices = ResidentBuffer::upload(
            device,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            &mesh.vertices,
            "mesh vertices",
        )?;
        let indices = ResidentBuffer::upload(
            device,
            vk::BufferUsageFlags::INDEX_BUFFER,
            &mesh.indices,
            "mesh indices",
        )?;

        tracing::debug!(
            "Uploaded mesh: {} vertices, {} indices",
            mesh.vertices.len(),
            mesh.indices.len()
        );

        Ok(Self {
            vertices,
            indices,
            index_count: mesh.index_count(),
        })
    }

    pub fn vertex_buffer(&self) -> vk::Buffer {
        self.vertices.handle()
    }

    pub fn index_buffer(&self) -> vk::Buffer {
        self.indices.handle()
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn vertex_layout_matches_shader_inputs() {
        assert_eq!(Vertex::STRIDE, 32);
        assert_eq!(std::mem::offset_of!(Vertex, position), 0);
        assert_eq!(std::mem::offset_of!(Vertex, color), 12);
        assert_eq!(std::mem::offset_of!(Vertex, uv), 24);
    }

    #[test]
    fn describe_registers_binding_and_attributes() {
        let mut builder = GraphicsPipelineBuilder::new();
        Vertex::describe(&mut builder)
            .shader_stage(vk::ShaderStageFlags::VERTEX, vk::ShaderModule::from_raw(1))
            .render_pass(vk::RenderPass::from_raw(2));

        let description = builder.resolve().unwrap();
        assert_eq!(description.vertex_bindings.len(), 1);
        assert_eq!(description.vertex_bindings[0].stride, 32);
        let offsets: Vec<u32> = description
            .vertex_attributes
            .iter()
            .map(|a| a.offset)
            .collect();
        assert_eq!(offsets, vec![0, 12, 24]);
    }

    #[test]
    fn cube_has_twelve_triangles() {
        let cube = MeshData::unit_cube();
        assert_eq!(cube.vertices.len(), 8);
        assert_eq!(cube.indices.len(), 36);
        assert_eq!(cube.index_count(), 36);
        assert!(cube.indices.iter().all(|&i| (i as usize) < cube.vertices.len()));
    }

    #[test]
    fn cube_uses_every_corner_on_three_faces() {
        let cube = MeshData::unit_cube();
        for corner in 0..8u16 {
            let faces = cube
                .indices
                .chunks(6)
                .filter(|face| face.contains(&corner))
                .count();
            assert_eq!(faces, 3, "corner {corner}");
        }
    }
}
