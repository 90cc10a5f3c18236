//! Per-frame uniform data.

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

/// Model, view and projection matrices, laid out as the vertex shader's
/// uniform block at set 0, binding 0.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct FrameTransform {
    pub model: Mat4,
    pub view: Mat4,
    pub projection: Mat4,
}

impl FrameTransform {
    /// Size of the uniform block in bytes.
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    /// Build a transform from its three matrices.
    pub fn new(model: Mat4, view: Mat4, projection: Mat4) -> Self {
        Self {
            model,
            view,
            projection,
        }
    }
}

impl Default for FrameTransform {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, Mat4::IDENTITY, Mat4::IDENTITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_column_major_matrices() {
        assert_eq!(FrameTransform::SIZE, 192);

        let transform = FrameTransform::new(
            Mat4::from_translation(glam::Vec3::new(1.0, 2.0, 3.0)),
            Mat4::IDENTITY,
            Mat4::IDENTITY,
        );
        let floats: &[f32] = bytemuck::cast_slice(bytemuck::bytes_of(&transform));
        // Translation sits in the fourth column of the model matrix.
        assert_eq!(&floats[12..15], &[1.0, 2.0, 3.0]);
        // View starts right after the model matrix.
        assert_eq!(floats[16], 1.0);
    }
}
