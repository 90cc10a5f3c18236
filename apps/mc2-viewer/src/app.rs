//! The spinning cube.

use std::fs;
use std::path::Path;

use anyhow::Context;
use glam::Mat4;
use mc2_app::{App, FrameTransform, MeshData, OrbitCamera, Scene, TextureData, WindowEvent};
use tracing::{info, warn};
use winit::event::{ElementState, MouseScrollDelta};
use winit::keyboard::{Key, NamedKey};

use crate::options::ViewerOptions;

/// Radians per second the cube turns.
const SPIN_SPEED: f32 = 0.8;
/// Radians the camera orbits per arrow-key press.
const ORBIT_STEP: f32 = 0.1;

pub struct Viewer {
    options: ViewerOptions,
    camera: OrbitCamera,
    angle: f32,
    paused: bool,
}

impl Viewer {
    pub fn new(options: ViewerOptions) -> Self {
        Self {
            options,
            camera: OrbitCamera::default(),
            angle: 0.0,
            paused: false,
        }
    }

    fn load_texture(&self) -> anyhow::Result<TextureData> {
        let Some(path) = &self.options.texture else {
            return Ok(default_texture());
        };

        match load_image(path) {
            Ok(texture) => {
                info!(
                    "Loaded texture {} ({}x{})",
                    path.display(),
                    texture.width(),
                    texture.height()
                );
                Ok(texture)
            }
            Err(e) => {
                warn!("{e:#}; using the built-in checkerboard");
                Ok(default_texture())
            }
        }
    }
}

fn default_texture() -> TextureData {
    TextureData::checkerboard(64, 8, [134, 96, 67, 255], [94, 63, 40, 255])
}

fn load_image(path: &Path) -> anyhow::Result<TextureData> {
    let image = image::open(path)
        .with_context(|| format!("Failed to decode {}", path.display()))?
        .to_rgba8();
    let (width, height) = image.dimensions();
    Ok(TextureData::new(width, height, image.into_raw())?)
}

fn read_shader(path: &Path) -> anyhow::Result<Vec<u8>> {
    fs::read(path).with_context(|| {
        format!(
            "Failed to read shader {} (compile the GLSL in apps/mc2-viewer/shaders with glslc)",
            path.display()
        )
    })
}

impl App for Viewer {
    fn scene(&mut self) -> anyhow::Result<Scene> {
        Ok(Scene {
            mesh: MeshData::unit_cube(),
            texture: self.load_texture()?,
            vertex_spirv: read_shader(&self.options.vertex_shader())?,
            fragment_spirv: read_shader(&self.options.fragment_shader())?,
        })
    }

    fn update(&mut self, dt: f32) {
        if !self.paused {
            self.angle = (self.angle + SPIN_SPEED * dt) % std::f32::consts::TAU;
        }
    }

    fn transform(&self, aspect: f32) -> FrameTransform {
        FrameTransform::new(
            Mat4::from_rotation_y(self.angle),
            self.camera.view(),
            self.camera.projection(aspect),
        )
    }

    fn on_event(&mut self, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::KeyboardInput { event, .. } if event.state == ElementState::Pressed => {
                match &event.logical_key {
                    Key::Named(NamedKey::Space) => self.paused = !self.paused,
                    Key::Named(NamedKey::ArrowLeft) => self.camera.orbit(-ORBIT_STEP, 0.0),
                    Key::Named(NamedKey::ArrowRight) => self.camera.orbit(ORBIT_STEP, 0.0),
                    Key::Named(NamedKey::ArrowUp) => self.camera.orbit(0.0, ORBIT_STEP),
                    Key::Named(NamedKey::ArrowDown) => self.camera.orbit(0.0, -ORBIT_STEP),
                    _ => return false,
                }
                true
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(position) => position.y as f32 / 50.0,
                };
                self.camera.zoom(-lines * 0.25);
                true
            }
            _ => false,
        }
    }
}
