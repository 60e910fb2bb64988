//! `EmberApp` trait definition.

use crate::context::{AppContext, FrameInfo};
use winit::event::WindowEvent;

/// An application driven by [`run_app`](crate::run_app).
pub trait EmberApp: Sized {
    /// Called once after the window, device and renderer exist.
    ///
    /// Create pipelines against `ctx.renderer.render_target()`.
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self>;

    /// Advance simulation by `dt` seconds. Called every frame before rendering,
    /// after input for the frame has been processed.
    fn update(&mut self, ctx: &mut AppContext, dt: f32) -> anyhow::Result<()>;

    /// Record draws for one frame.
    ///
    /// The render pass is already active on `frame.command_buffer`, and the
    /// slot `frame.frame_index` is no longer in use by the GPU, so its uniform
    /// buffers may be written here before recording draws.
    fn render(&mut self, ctx: &AppContext, frame: &FrameInfo) -> anyhow::Result<()>;

    /// Window event hook. Return `true` to stop the event from reaching the
    /// input state.
    #[allow(unused_variables)]
    fn on_event(&mut self, event: &WindowEvent) -> bool {
        false
    }

    /// Called before shutdown with the device idle.
    #[allow(unused_variables)]
    fn cleanup(&mut self, ctx: &mut AppContext) {}
}
