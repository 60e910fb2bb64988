//! Backend-neutral device and swapchain interfaces.
//!
//! The frame orchestrator and render systems are written against these traits
//! so they can run on the Vulkan backend ([`crate::VulkanDevice`]) or on the
//! recording mock used in tests.

use std::fmt;

use ash::vk;
use ember_core::Extent2D;

use crate::descriptors::DescriptorBinding;
use crate::error::Result;
use crate::pipeline::PipelineConfig;

/// Colour and depth formats of a swapchain's render target.
///
/// Pipelines are built against these formats, so they must stay identical
/// across swapchain rebuilds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTargetFormats {
    pub color: vk::Format,
    pub depth: vk::Format,
}

/// Result of acquiring a swapchain image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquiredImage {
    /// An image was acquired and may be rendered to.
    Ready { image_index: u32, suboptimal: bool },
    /// The swapchain no longer matches the surface; nothing was acquired.
    Stale,
}

/// Result of submitting and presenting a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapchainStatus {
    Optimal,
    /// Presented, but the swapchain should be rebuilt.
    Suboptimal,
    /// Out of date; the swapchain must be rebuilt.
    Stale,
}

impl SwapchainStatus {
    /// Returns `true` if the swapchain has to be rebuilt.
    #[must_use]
    pub const fn needs_rebuild(self) -> bool {
        !matches!(self, Self::Optimal)
    }
}

/// Clear values used when a render pass begins.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearValues {
    pub color: [f32; 4],
    pub depth: f32,
}

impl Default for ClearValues {
    fn default() -> Self {
        Self {
            color: [0.63, 0.4, 0.0, 1.0],
            depth: 1.0,
        }
    }
}

/// What a buffer is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    Uniform,
    Vertex,
    Index,
}

impl BufferUsage {
    /// Vulkan usage flags for this kind of buffer.
    #[must_use]
    pub const fn flags(self) -> vk::BufferUsageFlags {
        match self {
            Self::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
            Self::Vertex => vk::BufferUsageFlags::VERTEX_BUFFER,
            Self::Index => vk::BufferUsageFlags::INDEX_BUFFER,
        }
    }
}

/// Buffer creation parameters. All buffers are host visible and persistently mapped.
#[derive(Debug, Clone, Copy)]
pub struct BufferDesc<'a> {
    pub size: u64,
    pub usage: BufferUsage,
    pub name: &'a str,
}

/// Texture creation parameters.
#[derive(Debug, Clone, Copy)]
pub struct TextureDesc<'a> {
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGBA8 pixels, `width * height * 4` bytes.
    pub pixels: &'a [u8],
    pub filter: vk::Filter,
    pub name: &'a str,
}

/// SPIR-V byte code for a vertex/fragment shader pair.
#[derive(Debug, Clone, Copy)]
pub struct ShaderStages<'a> {
    pub vertex: &'a [u32],
    pub fragment: &'a [u32],
}

/// A single descriptor write, used when allocating a descriptor set.
pub enum DescriptorWrite<'a, D: GraphicsDevice + ?Sized> {
    UniformBuffer { binding: u32, buffer: &'a D::Buffer },
    CombinedImageSampler { binding: u32, texture: &'a D::Texture },
}

impl<D: GraphicsDevice + ?Sized> Clone for DescriptorWrite<'_, D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<D: GraphicsDevice + ?Sized> Copy for DescriptorWrite<'_, D> {}

impl<D: GraphicsDevice + ?Sized> DescriptorWrite<'_, D> {
    /// Binding slot the write targets.
    #[must_use]
    pub const fn binding(&self) -> u32 {
        match self {
            Self::UniformBuffer { binding, .. } | Self::CombinedImageSampler { binding, .. } => {
                *binding
            }
        }
    }
}

/// Swapchain: presentable images plus per-slot synchronization.
pub trait Swapchain {
    /// Size of the images.
    fn extent(&self) -> Extent2D;

    /// Number of presentable images.
    fn image_count(&self) -> usize;

    /// Render target formats.
    fn formats(&self) -> RenderTargetFormats;

    /// Returns `true` if both swapchains use the same colour and depth formats.
    fn compare_formats(&self, other: &Self) -> bool
    where
        Self: Sized,
    {
        self.formats() == other.formats()
    }

    /// Wait until frame slot `slot` is free, then acquire the next image.
    fn acquire_next_image(&mut self, slot: usize) -> Result<AcquiredImage>;

    /// Submit `command_buffer` for frame slot `slot` and present `image_index`.
    fn submit_and_present(
        &mut self,
        slot: usize,
        command_buffer: vk::CommandBuffer,
        image_index: u32,
    ) -> Result<SwapchainStatus>;
}

/// A graphics device capable of driving the frame loop.
///
/// Owned resources (`Buffer`, `Texture`, ...) release themselves on drop.
/// Command buffers and descriptor sets are plain handles owned by the device's
/// pools.
pub trait GraphicsDevice {
    type Swapchain: Swapchain;
    type Buffer;
    type Texture;
    type DescriptorSetLayout;
    type Pipeline;

    /// Create a swapchain, chaining `previous` for driver-side reuse.
    fn create_swapchain(
        &self,
        extent: Extent2D,
        previous: Option<&Self::Swapchain>,
    ) -> Result<Self::Swapchain>;

    /// Block until the device has finished all submitted work.
    fn wait_idle(&self) -> Result<()>;

    fn allocate_command_buffers(&self, count: usize) -> Result<Vec<vk::CommandBuffer>>;
    fn free_command_buffers(&self, command_buffers: &[vk::CommandBuffer]);
    /// Reset and begin recording.
    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer) -> Result<()>;
    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> Result<()>;

    /// Begin rendering into swapchain image `image_index` and set a full-extent viewport.
    fn begin_render_pass(
        &self,
        command_buffer: vk::CommandBuffer,
        swapchain: &Self::Swapchain,
        image_index: u32,
        clear: &ClearValues,
    ) -> Result<()>;
    /// End rendering and transition the image for presentation.
    fn end_render_pass(
        &self,
        command_buffer: vk::CommandBuffer,
        swapchain: &Self::Swapchain,
        image_index: u32,
    ) -> Result<()>;

    fn create_buffer(&self, desc: &BufferDesc<'_>) -> Result<Self::Buffer>;
    /// Copy `data` into the mapped buffer at `offset`.
    fn write_buffer(&self, buffer: &Self::Buffer, offset: u64, data: &[u8]) -> Result<()>;
    /// Make prior writes visible to the GPU.
    fn flush_buffer(&self, buffer: &Self::Buffer) -> Result<()>;

    fn create_texture(&self, desc: &TextureDesc<'_>) -> Result<Self::Texture>;

    fn create_descriptor_set_layout(
        &self,
        bindings: &[DescriptorBinding],
    ) -> Result<Self::DescriptorSetLayout>;
    fn allocate_descriptor_set(
        &self,
        layout: &Self::DescriptorSetLayout,
        writes: &[DescriptorWrite<'_, Self>],
    ) -> Result<vk::DescriptorSet>;

    fn create_pipeline(
        &self,
        config: &PipelineConfig,
        shaders: &ShaderStages<'_>,
        set_layouts: &[&Self::DescriptorSetLayout],
        push_constant_size: u32,
        target: RenderTargetFormats,
    ) -> Result<Self::Pipeline>;

    fn bind_pipeline(&self, command_buffer: vk::CommandBuffer, pipeline: &Self::Pipeline);
    fn bind_descriptor_set(
        &self,
        command_buffer: vk::CommandBuffer,
        pipeline: &Self::Pipeline,
        set: vk::DescriptorSet,
    );
    fn push_constants(
        &self,
        command_buffer: vk::CommandBuffer,
        pipeline: &Self::Pipeline,
        data: &[u8],
    );
    fn bind_vertex_buffer(&self, command_buffer: vk::CommandBuffer, buffer: &Self::Buffer);
    fn bind_index_buffer(&self, command_buffer: vk::CommandBuffer, buffer: &Self::Buffer);
    fn draw(&self, command_buffer: vk::CommandBuffer, vertex_count: u32, instance_count: u32);
    fn draw_indexed(&self, command_buffer: vk::CommandBuffer, index_count: u32);
}

impl fmt::Display for RenderTargetFormats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "color {:?}, depth {:?}", self.color, self.depth)
    }
}
