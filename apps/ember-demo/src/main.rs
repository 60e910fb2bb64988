//! Ember Demo
//!
//! Two vases on a textured floor, lit by a sun and six coloured point lights
//! orbiting the scene.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p ember-demo -- [OPTIONS]
//! ```
//!
//! ## Options
//!
//! - `--vsync`: Present with FIFO instead of mailbox/immediate
//! - `--validation`: Force the Vulkan validation layers on
//! - `--no-validation`: Force the Vulkan validation layers off
//! - `--texture <PATH>`: Image used for the floor (default: generated checkerboard)
//! - `-h, --help`: Print help message
//!
//! ## Controls
//!
//! - `W`/`A`/`S`/`D`: Move
//! - `Space`/`Left Ctrl`: Move up/down
//! - `Left Shift`: Sprint
//! - Mouse: Look around
//! - `Escape`: Release or capture the cursor
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod app;

use ember_app::{run_app, AppConfig};

use crate::app::{Demo, DemoArgs};

const WIDTH: u32 = 800;
const HEIGHT: u32 = 600;

fn main() -> anyhow::Result<()> {
    // Check for help flag before starting the app
    if std::env::args().any(|arg| arg == "-h" || arg == "--help") {
        print_help();
        return Ok(());
    }

    let args = DemoArgs::from_args();
    let mut config = AppConfig::new("Ember Demo")
        .with_size(WIDTH, HEIGHT)
        .with_vsync(args.vsync);
    if let Some(validation) = args.validation {
        config = config.with_validation(validation);
    }

    run_app::<Demo>(config)
}

fn print_help() {
    eprintln!(
        "Ember Demo

USAGE:
    cargo run -p ember-demo -- [OPTIONS]

OPTIONS:
    --vsync                 Present with FIFO (default: off)
    --validation            Enable Vulkan validation layers
                            Default: on in debug builds
    --no-validation         Disable Vulkan validation layers
    --texture <PATH>        Floor texture image
                            Default: generated checkerboard
    -h, --help              Print this help message

CONTROLS:
    W/A/S/D                 Move
    Space / Left Ctrl       Move up / down
    Left Shift              Sprint
    Mouse                   Look around
    Escape                  Release or capture the cursor

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log level (e.g., info, debug, trace)"
    );
}
