//! Core types, math, and traits for the Ember renderer.
//!
//! This crate provides the foundational types used throughout the engine:
//! - Window/drawable extents
//! - Scene transform math (model and normal matrices)
//! - The [`PresentationSurface`] contract consumed by the frame orchestrator
//! - Engine-wide constants

pub mod math;
pub mod surface;
pub mod types;

pub use math::Transform;
pub use surface::PresentationSurface;
pub use types::Extent2D;

/// Engine-wide constants
pub mod constants {
    /// Number of frames the CPU may record ahead of the GPU.
    pub const MAX_FRAMES_IN_FLIGHT: usize = 2;
    /// Capacity of the point light array in the global uniform block.
    pub const MAX_LIGHTS: usize = 10;
}
