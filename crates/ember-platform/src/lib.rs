//! Platform abstraction for the Ember renderer.
//!
//! [`Window`] owns a winit event loop that is pumped by the caller instead of
//! taking over the thread, and implements [`PresentationSurface`] so the
//! renderer can block on events while the window is minimized.

use std::sync::Arc;
use std::time::Duration;

use ember_core::{Extent2D, PresentationSurface};
use raw_window_handle::{HasDisplayHandle, RawDisplayHandle};
use thiserror::Error;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{DeviceEvent, DeviceId, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{CursorGrabMode, WindowId};

pub use winit::window::Window as WinitWindow;

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Window creation failed: {0}")]
    WindowCreation(String),
    #[error("Event loop error: {0}")]
    EventLoop(String),
    #[error("Window handle unavailable: {0}")]
    Handle(String),
}

pub type Result<T> = std::result::Result<T, PlatformError>;

/// Window configuration.
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub resizable: bool,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            title: "Ember".to_string(),
            width: 800,
            height: 600,
            resizable: true,
        }
    }
}

/// Platform event collected while pumping.
#[derive(Debug, Clone)]
pub enum PlatformEvent {
    Window(WindowEvent),
    Device(DeviceEvent),
}

/// Window state updated from inside the event loop.
struct Handler {
    config: PlatformConfig,
    window: Option<Arc<WinitWindow>>,
    error: Option<PlatformError>,
    events: Vec<PlatformEvent>,
    resized: bool,
    close_requested: bool,
}

impl Handler {
    const fn new(config: PlatformConfig) -> Self {
        Self {
            config,
            window: None,
            error: None,
            events: Vec::new(),
            resized: false,
            close_requested: false,
        }
    }

    fn record(&mut self, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => self.close_requested = true,
            WindowEvent::Resized(size) => {
                tracing::debug!("Window resized to {}x{}", size.width, size.height);
                self.resized = true;
            }
            _ => {}
        }
        self.events.push(PlatformEvent::Window(event));
    }
}

impl ApplicationHandler for Handler {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attributes = WinitWindow::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height))
            .with_resizable(self.config.resizable);

        match event_loop.create_window(attributes) {
            Ok(window) => {
                tracing::info!(
                    "Window '{}' created ({}x{})",
                    self.config.title,
                    self.config.width,
                    self.config.height
                );
                self.window = Some(Arc::new(window));
            }
            Err(e) => self.error = Some(PlatformError::WindowCreation(e.to_string())),
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        self.record(event);
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _device_id: DeviceId,
        event: DeviceEvent,
    ) {
        self.events.push(PlatformEvent::Device(event));
    }
}

/// A window with its own pumped event loop.
pub struct Window {
    window: Arc<WinitWindow>,
    // Dropped before the event loop
    handler: Handler,
    event_loop: EventLoop<()>,
}

impl Window {
    /// Create the event loop and open the window.
    pub fn new(config: PlatformConfig) -> Result<Self> {
        let mut event_loop =
            EventLoop::new().map_err(|e| PlatformError::EventLoop(e.to_string()))?;
        let mut handler = Handler::new(config);

        let window = loop {
            if let PumpStatus::Exit(code) =
                event_loop.pump_app_events(Some(Duration::ZERO), &mut handler)
            {
                return Err(PlatformError::EventLoop(format!(
                    "Event loop exited with code {code} before the window opened"
                )));
            }
            if let Some(error) = handler.error.take() {
                return Err(error);
            }
            if let Some(window) = &handler.window {
                break Arc::clone(window);
            }
        };

        Ok(Self {
            window,
            handler,
            event_loop,
        })
    }

    /// Process pending events without blocking.
    pub fn poll_events(&mut self) {
        self.pump(Some(Duration::ZERO));
    }

    fn pump(&mut self, timeout: Option<Duration>) {
        if let PumpStatus::Exit(code) = self.event_loop.pump_app_events(timeout, &mut self.handler)
        {
            tracing::debug!("Event loop exited with code {code}");
            self.handler.close_requested = true;
        }
    }

    /// Take the events collected since the last call.
    pub fn drain_events(&mut self) -> std::vec::Drain<'_, PlatformEvent> {
        self.handler.events.drain(..)
    }

    pub const fn winit_window(&self) -> &Arc<WinitWindow> {
        &self.window
    }

    /// Display handle for instance creation.
    pub fn raw_display_handle(&self) -> Result<RawDisplayHandle> {
        self.window
            .display_handle()
            .map(|handle| handle.as_raw())
            .map_err(|e| PlatformError::Handle(e.to_string()))
    }

    /// Lock and hide the cursor for mouse-look, or release it.
    pub fn set_cursor_captured(&self, captured: bool) {
        let result = if captured {
            self.window
                .set_cursor_grab(CursorGrabMode::Locked)
                .or_else(|_| self.window.set_cursor_grab(CursorGrabMode::Confined))
        } else {
            self.window.set_cursor_grab(CursorGrabMode::None)
        };
        if let Err(e) = result {
            tracing::warn!("Failed to change cursor grab: {e}");
        }
        self.window.set_cursor_visible(!captured);
    }
}

impl PresentationSurface for Window {
    fn current_extent(&self) -> Extent2D {
        extent_of(self.window.inner_size())
    }

    fn should_close(&self) -> bool {
        self.handler.close_requested
    }

    fn was_resized(&self) -> bool {
        self.handler.resized
    }

    fn reset_resized_flag(&mut self) {
        self.handler.resized = false;
    }

    fn wait_events(&mut self) {
        self.pump(None);
    }
}

const fn extent_of(size: PhysicalSize<u32>) -> Extent2D {
    Extent2D::new(size.width, size.height)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_and_resize_are_latched() {
        let mut handler = Handler::new(PlatformConfig::default());
        handler.record(WindowEvent::Resized(PhysicalSize::new(0, 0)));
        assert!(handler.resized);
        assert!(!handler.close_requested);

        handler.record(WindowEvent::CloseRequested);
        assert!(handler.close_requested);
        assert_eq!(handler.events.len(), 2);
    }

    #[test]
    fn minimized_size_is_zero_extent() {
        assert!(extent_of(PhysicalSize::new(0, 0)).is_zero());
        assert_eq!(extent_of(PhysicalSize::new(800, 600)), Extent2D::new(800, 600));
    }

    #[test]
    fn default_config() {
        let config = PlatformConfig::default();
        assert_eq!((config.width, config.height), (800, 600));
        assert!(config.resizable);
    }
}
