//! `App` trait definition.

use mc2_render::{FrameTransform, Scene};
use winit::event::WindowEvent;

/// Trait for applications driven by [`run_app`](crate::run_app).
///
/// The runner owns the window, the renderer and the frame loop; the
/// application supplies what is drawn and how it moves.
pub trait App {
    /// Build the scene uploaded once at startup.
    ///
    /// Called before the window is created.
    fn scene(&mut self) -> anyhow::Result<Scene>;

    /// Advance application state by `dt` seconds.
    fn update(&mut self, dt: f32);

    /// Matrices for the next frame, given the swapchain aspect ratio.
    fn transform(&self, aspect: f32) -> FrameTransform;

    /// Handle window events.
    ///
    /// Called for each window event. Return `true` if the event was
    /// handled and should not be processed further.
    ///
    /// Default implementation does nothing and returns `false`.
    #[allow(unused_variables)]
    fn on_event(&mut self, event: &WindowEvent) -> bool {
        false
    }
}
