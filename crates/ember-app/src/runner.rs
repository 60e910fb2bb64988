//! Application runner and frame loop.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ember_core::PresentationSurface;
use ember_gpu::{DeviceConfig, GpuContextBuilder, GraphicsDevice, SurfaceContext, VulkanDevice};
use ember_input::InputManager;
use ember_platform::{PlatformConfig, PlatformEvent, Window};
use ember_render::{Renderer, RendererConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::app::EmberApp;
use crate::context::{AppContext, FrameInfo};

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    /// Frame rate cap, `None` for unlimited.
    pub target_fps: Option<u32>,
    pub vsync: bool,
    /// Enable Vulkan validation layers (default: debug builds only).
    pub validation: bool,
    pub clear_color: [f32; 4],
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Ember".to_string(),
            width: 800,
            height: 600,
            target_fps: None,
            vsync: false,
            validation: cfg!(debug_assertions),
            clear_color: RendererConfig::default().clear.color,
        }
    }
}

impl AppConfig {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub const fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    #[must_use]
    pub const fn with_target_fps(mut self, fps: u32) -> Self {
        self.target_fps = Some(fps);
        self
    }

    #[must_use]
    pub const fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    #[must_use]
    pub const fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    #[must_use]
    pub const fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    fn target_frame_time(&self) -> Option<Duration> {
        self.target_fps
            .filter(|&fps| fps > 0)
            .map(|fps| Duration::from_nanos(1_000_000_000 / u64::from(fps)))
    }
}

/// Run an [`EmberApp`] until its window closes.
///
/// Initializes logging (`RUST_LOG`, default `info`), creates the window, GPU
/// context, device and renderer, then drives the frame loop. Errors from any
/// stage are fatal and returned.
pub fn run_app<A: EmberApp>(config: AppConfig) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("{} starting...", config.title);

    let mut ctx = create_context(&config)?;
    let mut app = A::init(&mut ctx)?;
    info!("Application ready");

    let result = frame_loop(&mut app, &mut ctx, &config);

    // Nothing may be released while the GPU still reads it
    ctx.device().wait_idle()?;
    app.cleanup(&mut ctx);
    drop(app);

    info!("Shutdown complete after {} frames", ctx.frame_count);
    result
}

fn create_context(config: &AppConfig) -> anyhow::Result<AppContext> {
    let mut window = Window::new(PlatformConfig {
        title: config.title.clone(),
        width: config.width,
        height: config.height,
        resizable: true,
    })?;

    let gpu = Arc::new(
        GpuContextBuilder::new()
            .app_name(&config.title)
            .validation(config.validation)
            .build(window.raw_display_handle()?)?,
    );

    // SAFETY: the surface lives inside the renderer, which AppContext drops
    // before the window
    let surface =
        Arc::new(unsafe { SurfaceContext::from_window(gpu, window.winit_window().as_ref())? });

    let device = VulkanDevice::new(
        surface,
        DeviceConfig {
            vsync: config.vsync,
            ..DeviceConfig::default()
        },
    )?;

    let renderer = Renderer::new(
        device,
        &mut window,
        RendererConfig::default().with_clear_color(config.clear_color),
    )?;

    Ok(AppContext {
        renderer,
        window,
        input: InputManager::new(),
        frame_count: 0,
    })
}

fn frame_loop<A: EmberApp>(
    app: &mut A,
    ctx: &mut AppContext,
    config: &AppConfig,
) -> anyhow::Result<()> {
    let target_frame_time = config.target_frame_time();
    let mut stats = FrameStats::default();
    let mut last_frame = Instant::now();

    loop {
        ctx.window.poll_events();
        for event in ctx.window.drain_events() {
            match event {
                PlatformEvent::Window(event) => {
                    if !app.on_event(&event) {
                        ctx.input.process_window_event(&event);
                    }
                }
                PlatformEvent::Device(event) => ctx.input.process_device_event(&event),
            }
        }
        if ctx.window.should_close() {
            info!("Close requested");
            break;
        }

        let frame_start = Instant::now();
        let dt = frame_start.duration_since(last_frame).as_secs_f32();
        last_frame = frame_start;
        stats.record(dt);

        app.update(ctx, dt)?;

        if let Some(command_buffer) = ctx.renderer.begin_frame(&mut ctx.window)? {
            ctx.renderer.begin_render_pass(command_buffer)?;
            let frame = FrameInfo {
                command_buffer,
                frame_index: ctx.renderer.frame_index(),
                dt,
            };
            app.render(ctx, &frame)?;
            ctx.renderer.end_render_pass(command_buffer)?;
            ctx.renderer.end_frame(&mut ctx.window)?;
            ctx.frame_count += 1;
        }

        ctx.input.end_frame();

        if let Some(target) = target_frame_time {
            let elapsed = frame_start.elapsed();
            if elapsed < target {
                thread::sleep(target - elapsed);
            }
        }
    }

    stats.log();
    Ok(())
}

/// Min/max/average frames per second.
#[derive(Debug, Clone, Copy)]
struct FrameStats {
    min_fps: f64,
    max_fps: f64,
    fps_sum: f64,
    frames: u64,
}

impl Default for FrameStats {
    fn default() -> Self {
        Self {
            min_fps: f64::MAX,
            max_fps: 0.0,
            fps_sum: 0.0,
            frames: 0,
        }
    }
}

impl FrameStats {
    fn record(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        let fps = 1.0 / f64::from(dt);
        self.min_fps = self.min_fps.min(fps);
        self.max_fps = self.max_fps.max(fps);
        self.fps_sum += fps;
        self.frames += 1;
    }

    #[allow(clippy::cast_precision_loss)]
    fn average(&self) -> Option<f64> {
        (self.frames > 0).then(|| self.fps_sum / self.frames as f64)
    }

    fn log(&self) {
        let Some(avg) = self.average() else {
            return;
        };
        info!("FPS Statistics:");
        info!("  Min: {:.1}", self.min_fps);
        info!("  Max: {:.1}", self.max_fps);
        info!("  Avg: {avg:.1}");
        info!("  Total frames: {}", self.frames);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builder() {
        let config = AppConfig::new("test")
            .with_size(1024, 768)
            .with_vsync(true)
            .with_validation(false)
            .with_target_fps(50);
        assert_eq!(config.title, "test");
        assert_eq!((config.width, config.height), (1024, 768));
        assert!(config.vsync);
        assert!(!config.validation);
        assert_eq!(config.target_frame_time(), Some(Duration::from_millis(20)));
    }

    #[test]
    fn zero_target_fps_is_uncapped() {
        assert_eq!(AppConfig::default().with_target_fps(0).target_frame_time(), None);
        assert_eq!(AppConfig::default().target_frame_time(), None);
    }

    #[test]
    fn frame_stats() {
        let mut stats = FrameStats::default();
        assert_eq!(stats.average(), None);

        stats.record(0.5);
        stats.record(0.25);
        stats.record(0.0);
        assert_eq!(stats.frames, 2);
        assert!((stats.min_fps - 2.0).abs() < 1e-9);
        assert!((stats.max_fps - 4.0).abs() < 1e-9);
        assert!((stats.average().unwrap_or_default() - 3.0).abs() < 1e-9);
    }
}
