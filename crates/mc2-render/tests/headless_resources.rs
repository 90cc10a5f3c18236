//! Render resources created on a headless device.
//!
//! These tests need a Vulkan driver; they print a note and pass when none
//! is available.

use std::sync::Arc;

use ash::vk;
use mc2_gpu::{GpuDevice, GpuInstance, InstanceConfig};
use mc2_render::{GpuMesh, MeshData, RenderPass, Texture, TextureData, TEXTURE_FORMAT};

fn headless_device() -> Option<GpuDevice> {
    let config = InstanceConfig::new("mc2-render-tests").with_validation(false);
    let instance = match GpuInstance::new(&config, None) {
        Ok(instance) => Arc::new(instance),
        Err(e) => {
            eprintln!("skipping: no Vulkan instance ({e})");
            return None;
        }
    };
    match GpuDevice::headless(instance) {
        Ok(device) => Some(device),
        Err(e) => {
            eprintln!("skipping: no usable GPU ({e})");
            None
        }
    }
}

#[test]
fn cube_mesh_uploads() {
    let Some(device) = headless_device() else {
        return;
    };

    let mesh = GpuMesh::upload(&device, &MeshData::unit_cube()).unwrap();
    assert_eq!(mesh.index_count(), 36);
    assert_ne!(mesh.vertex_buffer(), mesh.index_buffer());
}

#[test]
fn texture_is_sampleable_after_upload() {
    let Some(device) = headless_device() else {
        return;
    };

    let data = TextureData::checkerboard(16, 4, [255, 0, 0, 255], [0, 0, 255, 255]);
    let texture = Texture::upload(&device, &data).unwrap();

    assert_eq!(
        texture.image().layout(),
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
    );
    assert_eq!(texture.image().format(), TEXTURE_FORMAT);
    assert_ne!(texture.sampler(), vk::Sampler::null());
}

#[test]
fn render_pass_keeps_color_format() {
    let Some(device) = headless_device() else {
        return;
    };

    let render_pass = RenderPass::new(&device, vk::Format::B8G8R8A8_SRGB).unwrap();
    assert_eq!(render_pass.color_format(), vk::Format::B8G8R8A8_SRGB);
    assert_ne!(render_pass.handle(), vk::RenderPass::null());
}
