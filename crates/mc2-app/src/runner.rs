//! Application runner and event loop.
//!
//! The runner drives frames itself and pumps winit events between them, so
//! swapchain recreation can block on the event source while the window is
//! minimized.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use mc2_gpu::{InstanceConfig, PresentationTarget};
use mc2_render::{FrameStatus, Renderer, RendererConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Window, WindowId};

use crate::app::App;
use crate::stats::FrameStats;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Window title, also reported to the driver as the application name.
    pub title: String,
    /// Initial window width.
    pub width: u32,
    /// Initial window height.
    pub height: u32,
    /// Target frames per second (None for unlimited).
    pub target_fps: Option<u32>,
    /// Enable vsync.
    pub vsync: bool,
    /// Enable Vulkan validation layers (default: debug builds only).
    pub validation: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "mc2".to_string(),
            width: 1280,
            height: 720,
            target_fps: None,
            vsync: false,
            validation: cfg!(debug_assertions),
        }
    }
}

impl AppConfig {
    /// Create a new config with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Set the window dimensions.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the target FPS.
    pub fn with_target_fps(mut self, fps: u32) -> Self {
        self.target_fps = Some(fps);
        self
    }

    /// Enable or disable vsync.
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    /// Enable or disable validation layers.
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    /// Renderer settings derived from this config.
    pub fn renderer_config(&self) -> RendererConfig {
        RendererConfig {
            instance: InstanceConfig::new(self.title.clone()).with_validation(self.validation),
            vsync: self.vsync,
            ..Default::default()
        }
    }

    /// Minimum duration of one frame, if a target FPS is set.
    pub fn target_frame_time(&self) -> Option<Duration> {
        self.target_fps
            .filter(|&fps| fps > 0)
            .map(|fps| Duration::from_nanos(1_000_000_000 / u64::from(fps)))
    }
}

/// Install the `tracing` subscriber, filtered by `RUST_LOG` (default `info`).
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Run an [`App`] with the given configuration.
///
/// Initializes logging, creates the window and renderer, and draws until the
/// window is closed. Any renderer error ends the run and is returned.
pub fn run_app<A: App>(config: AppConfig, mut app: A) -> anyhow::Result<()> {
    init_logging();
    info!("{} starting...", config.title);

    let scene = app.scene().context("Failed to build scene")?;

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut pump = EventPump {
        event_loop,
        handler: WindowHandler::new(config.clone(), app),
    };
    let window = pump.wait_for_window()?;

    let size = window.inner_size();
    // SAFETY: `window` is only dropped after `renderer`, below.
    let mut renderer = unsafe {
        Renderer::new(
            window.as_ref(),
            (size.width, size.height),
            &scene,
            &config.renderer_config(),
        )
    }
    .context("Failed to initialize renderer")?;

    info!("Application ready!");

    let result = frame_loop(&mut pump, &mut renderer, config.target_frame_time());

    let frames = renderer.frame_number();
    info!("Starting cleanup...");
    drop(renderer);
    drop(window);
    pump.handler.stats.log(frames);
    info!("Cleanup complete");

    result
}

fn frame_loop<A: App>(
    pump: &mut EventPump<A>,
    renderer: &mut Renderer,
    target_frame_time: Option<Duration>,
) -> anyhow::Result<()> {
    let mut last_frame = Instant::now();

    loop {
        let frame_start = Instant::now();

        if !pump.poll() {
            info!("Close requested");
            return Ok(());
        }
        if std::mem::take(&mut pump.handler.resized) {
            renderer.notify_resized();
        }

        let dt = frame_start.duration_since(last_frame).as_secs_f32();
        last_frame = frame_start;
        pump.handler.stats.record(dt);
        pump.handler.app.update(dt);

        let extent = renderer.extent();
        let aspect = extent.width as f32 / extent.height.max(1) as f32;
        let transform = pump.handler.app.transform(aspect);

        let status = renderer.draw(pump, &transform).map_err(|e| {
            error!("Frame {} failed: {e}", renderer.frame_number());
            e
        })?;
        if status == FrameStatus::TargetClosed {
            info!("Window closed while minimized");
            return Ok(());
        }

        if let Some(target) = target_frame_time {
            let elapsed = frame_start.elapsed();
            if elapsed < target {
                thread::sleep(target - elapsed);
            }
        }
    }
}

/// The event loop plus the handler its events are dispatched to.
struct EventPump<A: App> {
    event_loop: EventLoop<()>,
    handler: WindowHandler<A>,
}

impl<A: App> EventPump<A> {
    /// Dispatch pending events without blocking.
    ///
    /// Returns `false` once the window should close.
    fn poll(&mut self) -> bool {
        self.pump(Some(Duration::ZERO))
    }

    fn pump(&mut self, timeout: Option<Duration>) -> bool {
        let status = self.event_loop.pump_app_events(timeout, &mut self.handler);
        !matches!(status, PumpStatus::Exit(_)) && !self.handler.close_requested
    }

    /// Pump events until the window exists.
    fn wait_for_window(&mut self) -> anyhow::Result<Arc<Window>> {
        loop {
            if let Some(e) = self.handler.init_error.take() {
                return Err(e);
            }
            if let Some(window) = &self.handler.window {
                return Ok(Arc::clone(window));
            }
            if !self.pump(Some(Duration::from_millis(16))) {
                anyhow::bail!("Event loop exited before the window was created");
            }
        }
    }
}

impl<A: App> PresentationTarget for EventPump<A> {
    fn drawable_size(&self) -> (u32, u32) {
        self.handler
            .window
            .as_ref()
            .map_or((0, 0), |window| {
                let size = window.inner_size();
                (size.width, size.height)
            })
    }

    fn wait_events(&mut self) -> bool {
        self.pump(None)
    }
}

/// Receives winit callbacks and records what the frame loop needs.
struct WindowHandler<A: App> {
    config: AppConfig,
    app: A,
    window: Option<Arc<Window>>,
    init_error: Option<anyhow::Error>,
    resized: bool,
    close_requested: bool,
    stats: FrameStats,
}

impl<A: App> WindowHandler<A> {
    fn new(config: AppConfig, app: A) -> Self {
        Self {
            config,
            app,
            window: None,
            init_error: None,
            resized: false,
            close_requested: false,
            stats: FrameStats::new(),
        }
    }
}

impl<A: App> ApplicationHandler for WindowHandler<A> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        info!("Creating window...");
        let window_attrs = Window::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));

        match event_loop.create_window(window_attrs) {
            Ok(window) => self.window = Some(Arc::new(window)),
            Err(e) => {
                error!("Failed to create window: {e}");
                self.init_error = Some(anyhow::Error::new(e).context("Failed to create window"));
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        // Let the app handle the event first
        if self.app.on_event(&event) {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                self.close_requested = true;
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                tracing::debug!("Resized to {}x{}", size.width, size.height);
                self.resized = true;
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_methods() {
        let config = AppConfig::new("viewer")
            .with_size(640, 480)
            .with_vsync(true)
            .with_validation(false)
            .with_target_fps(60);

        assert_eq!(config.title, "viewer");
        assert_eq!((config.width, config.height), (640, 480));
        assert!(config.vsync);
        assert!(!config.validation);
        assert_eq!(config.target_fps, Some(60));
    }

    #[test]
    fn renderer_config_carries_window_settings() {
        let renderer = AppConfig::new("viewer")
            .with_vsync(true)
            .with_validation(true)
            .renderer_config();

        assert!(renderer.vsync);
        assert!(renderer.instance.validation);
        assert_eq!(renderer.instance.app_name, "viewer");
    }

    #[test]
    fn frame_time_from_target_fps() {
        assert_eq!(AppConfig::default().target_frame_time(), None);
        assert_eq!(
            AppConfig::default().with_target_fps(50).target_frame_time(),
            Some(Duration::from_millis(20))
        );
        assert_eq!(AppConfig::default().with_target_fps(0).target_frame_time(), None);
    }
}
