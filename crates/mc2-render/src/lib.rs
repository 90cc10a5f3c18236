//! Frame lifecycle and draw recording for the mc2 renderer.
//!
//! [`Renderer`] owns every GPU object needed to draw one textured mesh and
//! runs the frame protocol through [`FrameLoop`]:
//! wait, acquire, update, record, submit, present, advance.
//! The protocol itself is GPU-free and talks to the renderer through the
//! [`FrameBackend`] trait.

pub mod frame;
pub mod frame_loop;
pub mod mesh;
pub mod record;
pub mod render_pass;
pub mod renderer;
pub mod texture;
pub mod uniforms;

pub use frame::{FrameData, FrameSets};
pub use frame_loop::{FrameBackend, FrameLoop, FrameStatus, FRAMES_IN_FLIGHT};
pub use mesh::{GpuMesh, MeshData, Vertex};
pub use record::{build_draw_commands, DrawCommand, DrawInputs};
pub use render_pass::{RenderPass, RenderTargets, DEPTH_FORMAT};
pub use renderer::{Renderer, RendererConfig, Scene};
pub use texture::{Sampler, SamplerSettings, Texture, TextureData, TEXTURE_FORMAT};
pub use uniforms::FrameTransform;
