//! Frame orchestration: swapchain ownership, frame slots and the
//! begin/end frame bracket.

use crate::error::{RenderError, Result};
use ember_core::constants::MAX_FRAMES_IN_FLIGHT;
use ember_core::{Extent2D, PresentationSurface};
use ember_gpu::{vk, AcquiredImage, ClearValues, GraphicsDevice, RenderTargetFormats, Swapchain};

/// Renderer settings.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RendererConfig {
    pub clear: ClearValues,
}

impl RendererConfig {
    #[must_use]
    pub const fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear.color = color;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameState {
    Idle,
    FrameInProgress {
        image_index: u32,
        render_pass_active: bool,
        /// Acquire reported a suboptimal swapchain; rebuild after presenting.
        suboptimal: bool,
    },
}

/// Owns the swapchain and the per-slot command buffers, and drives
/// `begin_frame` → `begin_render_pass` → `end_render_pass` → `end_frame`.
pub struct Renderer<B: GraphicsDevice> {
    command_buffers: Vec<vk::CommandBuffer>,
    state: FrameState,
    frame_index: usize,
    config: RendererConfig,
    swapchain: B::Swapchain,
    device: B,
}

impl<B: GraphicsDevice> Renderer<B> {
    /// Create the swapchain for `surface` and one command buffer per frame slot.
    pub fn new<S>(device: B, surface: &mut S, config: RendererConfig) -> Result<Self>
    where
        S: PresentationSurface + ?Sized,
    {
        let extent = wait_for_drawable(surface).ok_or(RenderError::SurfaceClosed)?;
        let swapchain = device.create_swapchain(extent, None)?;
        let command_buffers = device.allocate_command_buffers(MAX_FRAMES_IN_FLIGHT)?;

        tracing::info!(
            "Renderer ready: {MAX_FRAMES_IN_FLIGHT} frames in flight, {} swapchain images, {}",
            swapchain.image_count(),
            swapchain.formats()
        );

        Ok(Self {
            command_buffers,
            state: FrameState::Idle,
            frame_index: 0,
            config,
            swapchain,
            device,
        })
    }

    /// Start recording a frame.
    ///
    /// Returns `None` if the swapchain was stale; it has been rebuilt and the
    /// caller should skip this frame.
    pub fn begin_frame<S>(&mut self, surface: &mut S) -> Result<Option<vk::CommandBuffer>>
    where
        S: PresentationSurface + ?Sized,
    {
        if self.state != FrameState::Idle {
            return Err(RenderError::FrameAlreadyInProgress);
        }

        let command_buffer = self.slot_command_buffer()?;

        match self.swapchain.acquire_next_image(self.frame_index)? {
            AcquiredImage::Stale => {
                tracing::debug!("Swapchain out of date on acquire, rebuilding");
                // This rebuild already picks up any pending resize
                surface.reset_resized_flag();
                self.recreate_swapchain(surface)?;
                Ok(None)
            }
            AcquiredImage::Ready {
                image_index,
                suboptimal,
            } => {
                self.device.begin_command_buffer(command_buffer)?;
                self.state = FrameState::FrameInProgress {
                    image_index,
                    render_pass_active: false,
                    suboptimal,
                };
                Ok(Some(command_buffer))
            }
        }
    }

    /// Finish recording, submit and present, then advance to the next slot.
    ///
    /// Rebuilds the swapchain if it was reported stale or suboptimal, or if the
    /// surface was resized.
    pub fn end_frame<S>(&mut self, surface: &mut S) -> Result<()>
    where
        S: PresentationSurface + ?Sized,
    {
        let FrameState::FrameInProgress {
            image_index,
            render_pass_active,
            suboptimal,
        } = self.state
        else {
            return Err(RenderError::NoFrameInProgress);
        };
        if render_pass_active {
            return Err(RenderError::RenderPassActive);
        }

        let command_buffer = self.slot_command_buffer()?;
        self.device.end_command_buffer(command_buffer)?;
        let status = self
            .swapchain
            .submit_and_present(self.frame_index, command_buffer, image_index)?;

        self.state = FrameState::Idle;
        self.frame_index = (self.frame_index + 1) % MAX_FRAMES_IN_FLIGHT;

        if status.needs_rebuild() || suboptimal || surface.was_resized() {
            tracing::debug!("Rebuilding swapchain after present ({status:?})");
            surface.reset_resized_flag();
            self.recreate_swapchain(surface)?;
        }

        Ok(())
    }

    /// Begin rendering to the acquired image, clearing colour and depth.
    pub fn begin_render_pass(&mut self, command_buffer: vk::CommandBuffer) -> Result<()> {
        let image_index = self.check_frame(command_buffer, false)?;
        self.device.begin_render_pass(
            command_buffer,
            &self.swapchain,
            image_index,
            &self.config.clear,
        )?;
        self.set_render_pass_active(true);
        Ok(())
    }

    pub fn end_render_pass(&mut self, command_buffer: vk::CommandBuffer) -> Result<()> {
        let image_index = self.check_frame(command_buffer, true)?;
        self.device
            .end_render_pass(command_buffer, &self.swapchain, image_index)?;
        self.set_render_pass_active(false);
        Ok(())
    }

    /// Validate that a frame is being recorded into `command_buffer` and the
    /// render pass is in the expected state. Returns the acquired image index.
    fn check_frame(&self, command_buffer: vk::CommandBuffer, expect_active: bool) -> Result<u32> {
        let FrameState::FrameInProgress {
            image_index,
            render_pass_active,
            ..
        } = self.state
        else {
            return Err(RenderError::NoFrameInProgress);
        };
        if command_buffer != self.slot_command_buffer()? {
            return Err(RenderError::CommandBufferMismatch);
        }
        match (render_pass_active, expect_active) {
            (true, false) => Err(RenderError::RenderPassActive),
            (false, true) => Err(RenderError::RenderPassNotActive),
            _ => Ok(image_index),
        }
    }

    /// Command buffer of the current frame slot.
    fn slot_command_buffer(&self) -> Result<vk::CommandBuffer> {
        self.command_buffers
            .get(self.frame_index)
            .copied()
            .ok_or(RenderError::InvalidFrameSlot {
                slot: self.frame_index,
                frames_in_flight: self.command_buffers.len(),
            })
    }

    fn set_render_pass_active(&mut self, active: bool) {
        if let FrameState::FrameInProgress {
            render_pass_active, ..
        } = &mut self.state
        {
            *render_pass_active = active;
        }
    }

    /// Rebuild the swapchain for the surface's current extent.
    ///
    /// Blocks while the surface has no drawable area and returns without
    /// rebuilding if the surface is closed meanwhile.
    pub fn recreate_swapchain<S>(&mut self, surface: &mut S) -> Result<()>
    where
        S: PresentationSurface + ?Sized,
    {
        if self.state != FrameState::Idle {
            return Err(RenderError::FrameAlreadyInProgress);
        }

        let Some(extent) = wait_for_drawable(surface) else {
            tracing::debug!("Surface closed while waiting for a drawable extent");
            return Ok(());
        };

        self.device.wait_idle()?;

        let swapchain = self.device.create_swapchain(extent, Some(&self.swapchain))?;
        if !self.swapchain.compare_formats(&swapchain) {
            return Err(RenderError::SwapchainFormatChanged {
                old: self.swapchain.formats(),
                new: swapchain.formats(),
            });
        }
        // Old swapchain is released here, after the new one was validated
        self.swapchain = swapchain;

        // On failure the previous buffers stay in use
        let command_buffers = self.device.allocate_command_buffers(MAX_FRAMES_IN_FLIGHT)?;
        self.device.free_command_buffers(&self.command_buffers);
        self.command_buffers = command_buffers;

        tracing::info!(
            "Swapchain recreated: {}x{} ({} images)",
            extent.width,
            extent.height,
            self.swapchain.image_count()
        );
        Ok(())
    }

    /// Current frame slot.
    pub const fn frame_index(&self) -> usize {
        self.frame_index
    }

    pub fn extent(&self) -> Extent2D {
        self.swapchain.extent()
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.swapchain.extent().aspect_ratio()
    }

    /// Formats pipelines must be built against.
    pub fn render_target(&self) -> RenderTargetFormats {
        self.swapchain.formats()
    }

    pub fn is_frame_in_progress(&self) -> bool {
        self.state != FrameState::Idle
    }

    /// Command buffer of the frame being recorded, if any.
    pub fn current_command_buffer(&self) -> Option<vk::CommandBuffer> {
        if self.is_frame_in_progress() {
            self.slot_command_buffer().ok()
        } else {
            None
        }
    }

    pub const fn device(&self) -> &B {
        &self.device
    }

    pub const fn config(&self) -> &RendererConfig {
        &self.config
    }
}

impl<B: GraphicsDevice> Drop for Renderer<B> {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            tracing::error!("Failed to wait for device idle on shutdown: {e}");
        }
        self.device.free_command_buffers(&self.command_buffers);
        // Swapchain drops next, then the device
    }
}

/// Block until `surface` has a non-zero extent. `None` if it closed first.
fn wait_for_drawable<S>(surface: &mut S) -> Option<Extent2D>
where
    S: PresentationSurface + ?Sized,
{
    loop {
        let extent = surface.current_extent();
        if !extent.is_zero() {
            return Some(extent);
        }
        if surface.should_close() {
            return None;
        }
        surface.wait_events();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_gpu::mock::{MockDevice, MockEvent};
    use ember_gpu::SwapchainStatus;
    use std::collections::VecDeque;

    /// Surface whose extent changes on each `wait_events`.
    struct TestSurface {
        extent: Extent2D,
        pending: VecDeque<Extent2D>,
        resized: bool,
        close_on_wait: bool,
        closed: bool,
        waits: usize,
    }

    impl TestSurface {
        fn new(width: u32, height: u32) -> Self {
            Self {
                extent: Extent2D::new(width, height),
                pending: VecDeque::new(),
                resized: false,
                close_on_wait: false,
                closed: false,
                waits: 0,
            }
        }
    }

    impl PresentationSurface for TestSurface {
        fn current_extent(&self) -> Extent2D {
            self.extent
        }

        fn should_close(&self) -> bool {
            self.closed
        }

        fn was_resized(&self) -> bool {
            self.resized
        }

        fn reset_resized_flag(&mut self) {
            self.resized = false;
        }

        fn wait_events(&mut self) {
            self.waits += 1;
            if self.close_on_wait {
                self.closed = true;
            }
            if let Some(extent) = self.pending.pop_front() {
                self.extent = extent;
            }
        }
    }

    fn setup() -> (MockDevice, TestSurface, Renderer<MockDevice>) {
        let device = MockDevice::new();
        let mut surface = TestSurface::new(800, 600);
        let renderer = Renderer::new(device.clone(), &mut surface, RendererConfig::default()).unwrap();
        (device, surface, renderer)
    }

    fn run_frame(renderer: &mut Renderer<MockDevice>, surface: &mut TestSurface) -> bool {
        let Some(cmd) = renderer.begin_frame(surface).unwrap() else {
            return false;
        };
        renderer.begin_render_pass(cmd).unwrap();
        renderer.end_render_pass(cmd).unwrap();
        renderer.end_frame(surface).unwrap();
        true
    }

    fn swapchains_created(device: &MockDevice) -> usize {
        device.count(|e| matches!(e, MockEvent::CreateSwapchain { .. }))
    }

    #[test]
    fn five_frames_cycle_two_slots() {
        let (device, mut surface, mut renderer) = setup();
        let mut slots = Vec::new();
        for _ in 0..5 {
            slots.push(renderer.frame_index());
            assert!(run_frame(&mut renderer, &mut surface));
        }

        assert_eq!(slots, vec![0, 1, 0, 1, 0]);
        let acquired: Vec<_> = device
            .events()
            .into_iter()
            .filter_map(|e| match e {
                MockEvent::Acquire { slot } => Some(slot),
                _ => None,
            })
            .collect();
        assert_eq!(acquired, vec![0, 1, 0, 1, 0]);
        assert_eq!(device.count(|e| matches!(e, MockEvent::Present { .. })), 5);
        assert_eq!(swapchains_created(&device), 1);
        assert!(device.max_outstanding_frames() <= MAX_FRAMES_IN_FLIGHT);
        assert_eq!(device.max_outstanding_frames(), 2);
    }

    #[test]
    fn stale_acquire_rebuilds_without_submitting() {
        let (device, mut surface, mut renderer) = setup();
        device.script_acquire(AcquiredImage::Stale);

        assert!(renderer.begin_frame(&mut surface).unwrap().is_none());
        assert!(!renderer.is_frame_in_progress());
        assert_eq!(device.count(|e| matches!(e, MockEvent::Submit { .. })), 0);
        assert_eq!(swapchains_created(&device), 2);
        assert_eq!(renderer.frame_index(), 0);

        assert!(run_frame(&mut renderer, &mut surface));
    }

    #[test]
    fn stale_acquire_during_resize_rebuilds_once() {
        let (device, mut surface, mut renderer) = setup();
        surface.extent = Extent2D::new(1024, 768);
        surface.resized = true;
        device.clear_events();
        device.script_acquire(AcquiredImage::Stale);

        assert!(renderer.begin_frame(&mut surface).unwrap().is_none());
        assert!(!surface.resized);
        assert!(run_frame(&mut renderer, &mut surface));

        assert_eq!(swapchains_created(&device), 1);
        assert_eq!(device.count(|e| *e == MockEvent::WaitIdle), 1);
        assert_eq!(renderer.extent(), Extent2D::new(1024, 768));
    }

    #[test]
    fn failed_reallocation_keeps_previous_command_buffers() {
        let (device, mut surface, mut renderer) = setup();
        let before = renderer.command_buffers.clone();
        device.fail_next_allocation();

        assert!(matches!(
            renderer.recreate_swapchain(&mut surface),
            Err(RenderError::Gpu(_))
        ));
        assert_eq!(renderer.command_buffers, before);
        assert!(run_frame(&mut renderer, &mut surface));
        assert!(run_frame(&mut renderer, &mut surface));
    }

    #[test]
    fn missing_command_buffer_is_an_error() {
        let (_device, mut surface, mut renderer) = setup();
        renderer.command_buffers.clear();

        assert!(matches!(
            renderer.begin_frame(&mut surface),
            Err(RenderError::InvalidFrameSlot {
                slot: 0,
                frames_in_flight: 0
            })
        ));
        assert!(!renderer.is_frame_in_progress());
        assert_eq!(renderer.current_command_buffer(), None);
    }

    #[test]
    fn stale_and_suboptimal_present_trigger_rebuild() {
        let (device, mut surface, mut renderer) = setup();
        device.script_present(SwapchainStatus::Stale);
        device.script_present(SwapchainStatus::Suboptimal);

        run_frame(&mut renderer, &mut surface);
        run_frame(&mut renderer, &mut surface);
        run_frame(&mut renderer, &mut surface);
        assert_eq!(swapchains_created(&device), 3);
    }

    #[test]
    fn suboptimal_acquire_rebuilds_after_present() {
        let (device, mut surface, mut renderer) = setup();
        device.script_acquire(AcquiredImage::Ready {
            image_index: 0,
            suboptimal: true,
        });
        assert!(run_frame(&mut renderer, &mut surface));
        assert_eq!(device.count(|e| matches!(e, MockEvent::Present { .. })), 1);
        assert_eq!(swapchains_created(&device), 2);
    }

    #[test]
    fn resize_rebuilds_at_new_extent_and_old_is_dropped_after() {
        let (device, mut surface, mut renderer) = setup();
        surface.extent = Extent2D::new(1024, 768);
        surface.resized = true;
        device.clear_events();

        run_frame(&mut renderer, &mut surface);

        assert!(!surface.resized);
        assert_eq!(renderer.extent(), Extent2D::new(1024, 768));
        let events = device.events();
        let wait = events.iter().position(|e| *e == MockEvent::WaitIdle).unwrap();
        let create = events
            .iter()
            .position(|e| matches!(e, MockEvent::CreateSwapchain { chained: true, .. }))
            .unwrap();
        let destroy = events
            .iter()
            .position(|e| matches!(e, MockEvent::DestroySwapchain { .. }))
            .unwrap();
        let realloc = events
            .iter()
            .position(|e| matches!(e, MockEvent::AllocateCommandBuffers { count: 2 }))
            .unwrap();
        assert!(wait < create && create < destroy && destroy < realloc);
    }

    #[test]
    fn repeated_rebuilds_keep_formats() {
        let (_device, mut surface, mut renderer) = setup();
        let formats = renderer.render_target();
        for _ in 0..3 {
            renderer.recreate_swapchain(&mut surface).unwrap();
            assert_eq!(renderer.render_target(), formats);
        }
    }

    #[test]
    fn format_change_is_fatal() {
        let (device, mut surface, mut renderer) = setup();
        device.set_formats(RenderTargetFormats {
            color: vk::Format::R8G8B8A8_UNORM,
            depth: vk::Format::D32_SFLOAT,
        });
        let result = renderer.recreate_swapchain(&mut surface);
        assert!(matches!(
            result,
            Err(RenderError::SwapchainFormatChanged { .. })
        ));
        assert_eq!(renderer.render_target().color, vk::Format::B8G8R8A8_SRGB);
    }

    #[test]
    fn zero_extent_waits_for_events() {
        let (device, mut surface, mut renderer) = setup();
        surface.extent = Extent2D::new(0, 0);
        surface.pending = VecDeque::from([Extent2D::new(0, 0), Extent2D::new(640, 480)]);

        renderer.recreate_swapchain(&mut surface).unwrap();
        assert_eq!(surface.waits, 2);
        assert_eq!(renderer.extent(), Extent2D::new(640, 480));
        assert_eq!(swapchains_created(&device), 2);
    }

    #[test]
    fn closing_while_minimized_aborts_rebuild() {
        let (device, mut surface, mut renderer) = setup();
        surface.extent = Extent2D::new(0, 0);
        surface.close_on_wait = true;

        renderer.recreate_swapchain(&mut surface).unwrap();
        assert_eq!(surface.waits, 1);
        assert_eq!(swapchains_created(&device), 1);
        assert_eq!(renderer.extent(), Extent2D::new(800, 600));
    }

    #[test]
    fn new_fails_if_surface_closes_first() {
        let mut surface = TestSurface::new(0, 0);
        surface.close_on_wait = true;
        let result = Renderer::new(MockDevice::new(), &mut surface, RendererConfig::default());
        assert!(matches!(result, Err(RenderError::SurfaceClosed)));
    }

    #[test]
    fn out_of_order_calls_are_rejected() {
        let (_device, mut surface, mut renderer) = setup();
        let foreign = vk::CommandBuffer::null();

        assert!(matches!(
            renderer.end_frame(&mut surface),
            Err(RenderError::NoFrameInProgress)
        ));
        assert!(matches!(
            renderer.begin_render_pass(foreign),
            Err(RenderError::NoFrameInProgress)
        ));

        let cmd = renderer.begin_frame(&mut surface).unwrap().unwrap();
        assert!(matches!(
            renderer.begin_frame(&mut surface),
            Err(RenderError::FrameAlreadyInProgress)
        ));
        assert!(matches!(
            renderer.recreate_swapchain(&mut surface),
            Err(RenderError::FrameAlreadyInProgress)
        ));
        assert!(matches!(
            renderer.end_render_pass(cmd),
            Err(RenderError::RenderPassNotActive)
        ));

        renderer.begin_render_pass(cmd).unwrap();
        assert!(matches!(
            renderer.begin_render_pass(cmd),
            Err(RenderError::RenderPassActive)
        ));
        assert!(matches!(
            renderer.end_frame(&mut surface),
            Err(RenderError::RenderPassActive)
        ));
        renderer.end_render_pass(cmd).unwrap();
        renderer.end_frame(&mut surface).unwrap();
    }

    #[test]
    fn foreign_command_buffer_is_rejected() {
        let (_device, mut surface, mut renderer) = setup();
        let cmd = renderer.begin_frame(&mut surface).unwrap().unwrap();
        assert_eq!(renderer.current_command_buffer(), Some(cmd));
        assert!(matches!(
            renderer.begin_render_pass(vk::CommandBuffer::null()),
            Err(RenderError::CommandBufferMismatch)
        ));
    }

    #[test]
    fn drop_waits_idle_before_releasing_swapchain() {
        let (device, _surface, renderer) = setup();
        device.clear_events();
        drop(renderer);

        let events = device.events();
        assert_eq!(events.first(), Some(&MockEvent::WaitIdle));
        assert!(matches!(events.last(), Some(MockEvent::DestroySwapchain { .. })));
    }
}
