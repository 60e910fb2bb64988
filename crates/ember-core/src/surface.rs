//! Presentation surface contract.

use crate::types::Extent2D;

/// A window (or anything else with a drawable area) that swapchains present to.
///
/// The extent may transiently be `0x0`, e.g. while the window is minimized.
/// Callers that rebuild size-dependent GPU resources must call
/// [`wait_events`](Self::wait_events) until the extent becomes non-zero.
pub trait PresentationSurface {
    /// Current drawable size in physical pixels.
    fn current_extent(&self) -> Extent2D;

    /// Returns `true` once the user asked the surface to close.
    fn should_close(&self) -> bool;

    /// Returns `true` if the surface was resized since the flag was last reset.
    fn was_resized(&self) -> bool;

    /// Clear the resize flag after the resize has been handled.
    fn reset_resized_flag(&mut self);

    /// Block until at least one platform event has been processed.
    fn wait_events(&mut self);
}
