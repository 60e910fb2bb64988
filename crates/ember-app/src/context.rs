//! Application context.

use ash::vk;
use ember_core::Extent2D;
use ember_gpu::VulkanDevice;
use ember_input::InputManager;
use ember_platform::Window;
use ember_render::Renderer;

/// Everything the framework owns on behalf of the application.
pub struct AppContext {
    /// Owns the surface, so it is declared (and dropped) before the window.
    pub renderer: Renderer<VulkanDevice>,
    pub window: Window,
    pub input: InputManager,
    /// Frames presented so far.
    pub frame_count: u64,
}

impl AppContext {
    pub const fn device(&self) -> &VulkanDevice {
        self.renderer.device()
    }

    pub fn extent(&self) -> Extent2D {
        self.renderer.extent()
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.renderer.aspect_ratio()
    }
}

/// The frame being recorded.
#[derive(Debug, Clone, Copy)]
pub struct FrameInfo {
    pub command_buffer: vk::CommandBuffer,
    /// Frame slot in `[0, MAX_FRAMES_IN_FLIGHT)`.
    pub frame_index: usize,
    /// Seconds since the previous frame.
    pub dt: f32,
}
