//! Vulkan abstraction layer for the Ember renderer.
//!
//! This crate provides:
//! - the backend-neutral [`GraphicsDevice`] and [`Swapchain`] traits
//! - Vulkan instance, device and surface management
//! - GPU capability detection
//! - Memory allocation via gpu-allocator
//! - Swapchains with per-slot synchronization
//! - Descriptor, pipeline and texture helpers
//! - A recording [`mock`] backend (feature `mock`)

pub mod backend;
pub mod capabilities;
pub mod command;
pub mod context;
pub mod descriptors;
pub mod device;
pub mod error;
pub mod instance;
pub mod memory;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod pipeline;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod texture;

pub use ash::vk;
pub use backend::{
    AcquiredImage, BufferDesc, BufferUsage, ClearValues, DescriptorWrite, GraphicsDevice,
    RenderTargetFormats, ShaderStages, Swapchain, SwapchainStatus, TextureDesc,
};
pub use capabilities::{GpuCapabilities, GpuVendor};
pub use context::{GpuContext, GpuContextBuilder};
pub use descriptors::{DescriptorBinding, DescriptorPool, DescriptorSetLayoutBuilder};
pub use device::{
    DeviceConfig, VulkanBuffer, VulkanDescriptorSetLayout, VulkanDevice, VulkanPipeline,
};
pub use error::{GpuError, Result};
pub use memory::{GpuAllocator, GpuBuffer, GpuImage};
pub use pipeline::{BlendMode, DepthPolicy, PipelineConfig, PipelineConfigBuilder};
pub use surface::{SurfaceCapabilities, SurfaceContext};
pub use swapchain::VulkanSwapchain;
pub use sync::{create_fence, create_semaphore, FrameSync};
pub use texture::VulkanTexture;
