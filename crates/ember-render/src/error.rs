//! Render error types.

use ember_gpu::{GpuError, RenderTargetFormats};
use std::fmt;
use thiserror::Error;

/// Kind of asset, for lookup errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Mesh,
    Material,
    Texture,
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Mesh => "mesh",
            Self::Material => "material",
            Self::Texture => "texture",
        })
    }
}

/// Rendering errors.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Gpu(#[from] GpuError),

    /// `begin_frame` was called while a frame is being recorded.
    #[error("Cannot begin a frame while one is already in progress")]
    FrameAlreadyInProgress,

    /// A frame operation was called outside `begin_frame`/`end_frame`.
    #[error("No frame is in progress")]
    NoFrameInProgress,

    /// The render pass must be ended first.
    #[error("A render pass is still active")]
    RenderPassActive,

    #[error("No render pass is active")]
    RenderPassNotActive,

    /// The command buffer is not the one returned by `begin_frame`.
    #[error("Command buffer does not belong to the current frame")]
    CommandBufferMismatch,

    /// A rebuilt swapchain no longer matches the formats pipelines were built for.
    #[error("Swapchain formats changed from ({old}) to ({new})")]
    SwapchainFormatChanged {
        old: RenderTargetFormats,
        new: RenderTargetFormats,
    },

    /// The surface closed before it had a drawable area.
    #[error("Presentation surface closed")]
    SurfaceClosed,

    #[error("Too many point lights: {count} (maximum {max})")]
    TooManyLights { count: usize, max: usize },

    #[error("Frame slot {slot} out of range ({frames_in_flight} frames in flight)")]
    InvalidFrameSlot { slot: usize, frames_in_flight: usize },

    #[error("Descriptor set {0} was not created by this resource set")]
    UnknownDescriptorSet(usize),

    #[error("Unknown {kind} '{name}'")]
    AssetNotFound { kind: AssetKind, name: String },

    #[error("Failed to load image: {0}")]
    Image(#[from] image::ImageError),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, RenderError>;
