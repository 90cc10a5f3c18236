//! Application framework for the mc2 renderer.
//!
//! This crate provides the boilerplate around [`mc2_render::Renderer`]:
//! - Logging setup
//! - Window creation and event pumping
//! - The frame loop, including resize and minimize handling
//! - A simple orbit camera and FPS statistics
//!
//! # Example
//!
//! ```no_run
//! use mc2_app::{run_app, App, AppConfig, OrbitCamera};
//! use mc2_render::{FrameTransform, MeshData, Scene, TextureData};
//!
//! struct Spinner {
//!     camera: OrbitCamera,
//! }
//!
//! impl App for Spinner {
//!     fn scene(&mut self) -> anyhow::Result<Scene> {
//!         Ok(Scene {
//!             mesh: MeshData::unit_cube(),
//!             texture: TextureData::checkerboard(64, 8, [255; 4], [0, 0, 0, 255]),
//!             vertex_spirv: std::fs::read("build/shaders/mesh.vert.spv")?,
//!             fragment_spirv: std::fs::read("build/shaders/mesh.frag.spv")?,
//!         })
//!     }
//!
//!     fn update(&mut self, dt: f32) {
//!         self.camera.orbit(dt, 0.0);
//!     }
//!
//!     fn transform(&self, aspect: f32) -> FrameTransform {
//!         FrameTransform::new(
//!             glam::Mat4::IDENTITY,
//!             self.camera.view(),
//!             self.camera.projection(aspect),
//!         )
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     let app = Spinner { camera: OrbitCamera::default() };
//!     run_app(AppConfig::default(), app)
//! }
//! ```

mod app;
mod camera;
mod runner;
mod stats;

pub use app::App;
pub use camera::OrbitCamera;
pub use runner::{init_logging, run_app, AppConfig};
pub use stats::FrameStats;

// Re-export commonly used types for convenience
pub use mc2_render::{FrameTransform, MeshData, Scene, TextureData};
pub use winit::event::WindowEvent;
