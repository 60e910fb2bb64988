//! Application framework for the Ember renderer.
//!
//! Handles the boilerplate every Ember program needs:
//! - Logging setup
//! - Window, GPU context and device creation
//! - The frame loop (events, update, begin/end frame, pacing)
//! - Orderly shutdown
//!
//! # Example
//!
//! ```no_run
//! use ember_app::{run_app, AppConfig, AppContext, EmberApp, FrameInfo};
//!
//! struct MyApp;
//!
//! impl EmberApp for MyApp {
//!     fn init(_ctx: &mut AppContext) -> anyhow::Result<Self> {
//!         Ok(MyApp)
//!     }
//!
//!     fn update(&mut self, _ctx: &mut AppContext, _dt: f32) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//!
//!     fn render(&mut self, _ctx: &AppContext, _frame: &FrameInfo) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     run_app::<MyApp>(AppConfig::default())
//! }
//! ```

mod app;
mod context;
mod runner;

pub use app::EmberApp;
pub use context::{AppContext, FrameInfo};
pub use runner::{run_app, AppConfig};

pub use ember_gpu::VulkanDevice;
pub use winit::event::{DeviceEvent, WindowEvent};
