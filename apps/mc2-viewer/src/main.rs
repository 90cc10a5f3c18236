//! mc2 demo viewer
//!
//! Draws a textured, spinning cube with the frame-in-flight renderer.
//!
//! ## Usage
//!
//! ```bash
//! glslc apps/mc2-viewer/shaders/triangle.vert -o build/shaders/triangle.vert.spv
//! glslc apps/mc2-viewer/shaders/triangle.frag -o build/shaders/triangle.frag.spv
//! cargo run -p mc2-viewer -- [OPTIONS]
//! ```
//!
//! ## Options
//!
//! - `--texture <PATH>`: Image used as the cube texture (default: checkerboard)
//! - `--shaders <DIR>`: Directory with the compiled shaders (default: `build/shaders`)
//! - `--vsync`: Present with FIFO instead of mailbox/immediate
//! - `--validation` / `--no-validation`: Force Vulkan validation on or off
//! - `-h, --help`: Print help message
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod app;
mod options;

use mc2_app::{run_app, AppConfig};

use crate::app::Viewer;
use crate::options::ViewerOptions;

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;

fn main() -> anyhow::Result<()> {
    let options = ViewerOptions::from_env()?;
    if options.help {
        print_help();
        return Ok(());
    }

    let mut config = AppConfig::new("mc2 viewer")
        .with_size(WIDTH, HEIGHT)
        .with_vsync(options.vsync);
    if let Some(validation) = options.validation {
        config = config.with_validation(validation);
    }

    if let Err(e) = run_app(config, Viewer::new(options)) {
        tracing::error!("{e:#}");
        return Err(e);
    }
    Ok(())
}

fn print_help() {
    eprintln!(
        "mc2 viewer: a textured cube drawn with two frames in flight

USAGE:
    cargo run -p mc2-viewer -- [OPTIONS]

OPTIONS:
    --texture <PATH>        Image used as the cube texture
                            Default: built-in checkerboard
    --shaders <DIR>         Directory holding triangle.vert.spv and triangle.frag.spv
                            Default: build/shaders
    --vsync                 Present with FIFO (vsync)
    --validation            Force Vulkan validation layers on
    --no-validation         Force Vulkan validation layers off
    -h, --help              Print this help message

CONTROLS:
    Arrow keys              Orbit the camera
    Mouse wheel             Zoom
    Space                   Pause the spin

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log level (e.g., info, debug, trace)"
    );
}
