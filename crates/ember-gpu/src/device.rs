//! Vulkan implementation of [`GraphicsDevice`].

use crate::backend::{
    BufferDesc, BufferUsage, ClearValues, DescriptorWrite, GraphicsDevice, RenderTargetFormats,
    ShaderStages, TextureDesc,
};
use crate::command::{begin_command_buffer, end_command_buffer, CommandPool};
use crate::context::GpuContext;
use crate::descriptors::{
    create_layout, write_combined_image_sampler, write_uniform_buffer, DescriptorBinding,
    DescriptorPool,
};
use crate::error::{GpuError, Result};
use crate::memory::{align_up, GpuBuffer};
use crate::pipeline::{create_graphics_pipeline, PipelineConfig};
use crate::surface::SurfaceContext;
use crate::swapchain::VulkanSwapchain;
use crate::texture::{color_subresource_range, VulkanTexture};
use ash::vk;
use ember_core::{constants::MAX_FRAMES_IN_FLIGHT, Extent2D};
use gpu_allocator::MemoryLocation;
use std::sync::Arc;

/// Device-level settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Present with FIFO.
    pub vsync: bool,
    /// Maximum number of descriptor sets in the shared pool.
    pub max_sets: u32,
    /// Uniform buffer descriptors in the shared pool.
    pub uniform_buffers: u32,
    /// Combined image sampler descriptors in the shared pool.
    pub combined_image_samplers: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            vsync: true,
            max_sets: 64,
            uniform_buffers: 64,
            combined_image_samplers: 64,
        }
    }
}

/// Host-visible, persistently mapped buffer.
pub struct VulkanBuffer {
    inner: GpuBuffer,
    gpu: Arc<GpuContext>,
}

impl VulkanBuffer {
    /// Raw buffer handle.
    pub const fn handle(&self) -> vk::Buffer {
        self.inner.buffer
    }

    /// Size in bytes.
    pub const fn size(&self) -> u64 {
        self.inner.size
    }
}

impl Drop for VulkanBuffer {
    fn drop(&mut self) {
        if let Err(e) = self.gpu.allocator().lock().free_buffer(&mut self.inner) {
            tracing::warn!("Failed to free buffer: {e}");
        }
    }
}

pub struct VulkanDescriptorSetLayout {
    layout: vk::DescriptorSetLayout,
    gpu: Arc<GpuContext>,
}

impl VulkanDescriptorSetLayout {
    pub const fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for VulkanDescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.gpu
                .device()
                .destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// Graphics pipeline and its layout.
pub struct VulkanPipeline {
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
    gpu: Arc<GpuContext>,
}

impl VulkanPipeline {
    pub const fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    pub const fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for VulkanPipeline {
    fn drop(&mut self) {
        let device = self.gpu.device();
        unsafe {
            device.destroy_pipeline(self.pipeline, None);
            device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

/// Vulkan graphics device bound to one window surface.
///
/// Owns the command and descriptor pools. Command buffers and descriptor sets
/// handed out by this device are invalid once it is dropped.
pub struct VulkanDevice {
    command_pool: CommandPool,
    descriptor_pool: DescriptorPool,
    config: DeviceConfig,
    surface: Arc<SurfaceContext>,
    gpu: Arc<GpuContext>,
}

impl VulkanDevice {
    /// Create the device's pools for rendering to `surface`.
    pub fn new(surface: Arc<SurfaceContext>, config: DeviceConfig) -> Result<Self> {
        let gpu = surface.gpu().clone();
        let device = gpu.device();

        let command_pool = unsafe { CommandPool::new(device, gpu.graphics_queue_family())? };

        let pool_sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: config.uniform_buffers,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: config.combined_image_samplers,
            },
        ];
        let descriptor_pool = match unsafe { DescriptorPool::new(device, config.max_sets, &pool_sizes) }
        {
            Ok(pool) => pool,
            Err(e) => {
                unsafe { command_pool.destroy(device) };
                return Err(e);
            }
        };

        Ok(Self {
            command_pool,
            descriptor_pool,
            config,
            surface,
            gpu,
        })
    }

    /// The shared GPU context.
    pub const fn gpu(&self) -> &Arc<GpuContext> {
        &self.gpu
    }

    pub const fn config(&self) -> &DeviceConfig {
        &self.config
    }

    fn depth_aspect(format: vk::Format) -> vk::ImageAspectFlags {
        match format {
            vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT => {
                vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
            }
            _ => vk::ImageAspectFlags::DEPTH,
        }
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        let device = self.gpu.device();
        unsafe {
            let _ = device.device_wait_idle();
            self.descriptor_pool.destroy(device);
            self.command_pool.destroy(device);
        }
    }
}

impl GraphicsDevice for VulkanDevice {
    type Swapchain = VulkanSwapchain;
    type Buffer = VulkanBuffer;
    type Texture = VulkanTexture;
    type DescriptorSetLayout = VulkanDescriptorSetLayout;
    type Pipeline = VulkanPipeline;

    fn create_swapchain(
        &self,
        extent: Extent2D,
        previous: Option<&Self::Swapchain>,
    ) -> Result<Self::Swapchain> {
        VulkanSwapchain::new(
            self.surface.clone(),
            extent,
            self.config.vsync,
            previous,
            MAX_FRAMES_IN_FLIGHT,
        )
    }

    fn wait_idle(&self) -> Result<()> {
        self.gpu.wait_idle()
    }

    fn allocate_command_buffers(&self, count: usize) -> Result<Vec<vk::CommandBuffer>> {
        let count = u32::try_from(count)
            .map_err(|_| GpuError::InvalidState(format!("Too many command buffers: {count}")))?;
        unsafe { self.command_pool.allocate(self.gpu.device(), count) }
    }

    fn free_command_buffers(&self, command_buffers: &[vk::CommandBuffer]) {
        unsafe { self.command_pool.free(self.gpu.device(), command_buffers) };
    }

    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer) -> Result<()> {
        let device = self.gpu.device();
        unsafe {
            device.reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())?;
            begin_command_buffer(device, command_buffer, vk::CommandBufferUsageFlags::empty())
        }
    }

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> Result<()> {
        unsafe { end_command_buffer(self.gpu.device(), command_buffer) }
    }

    fn begin_render_pass(
        &self,
        command_buffer: vk::CommandBuffer,
        swapchain: &Self::Swapchain,
        image_index: u32,
        clear: &ClearValues,
    ) -> Result<()> {
        let (Some(color_image), Some(color_view), Some(depth_image), Some(depth_view)) = (
            swapchain.image(image_index),
            swapchain.image_view(image_index),
            swapchain.depth_image(image_index),
            swapchain.depth_view(image_index),
        ) else {
            return Err(GpuError::InvalidState(format!(
                "Swapchain image {image_index} out of range"
            )));
        };

        let device = self.gpu.device();
        let extent = swapchain.vk_extent();
        let depth_format = crate::backend::Swapchain::formats(swapchain).depth;

        let barriers = [
            vk::ImageMemoryBarrier2::default()
                .src_stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
                .src_access_mask(vk::AccessFlags2::NONE)
                .dst_stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
                .dst_access_mask(vk::AccessFlags2::COLOR_ATTACHMENT_WRITE)
                .old_layout(vk::ImageLayout::UNDEFINED)
                .new_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(color_image)
                .subresource_range(color_subresource_range()),
            vk::ImageMemoryBarrier2::default()
                .src_stage_mask(
                    vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS
                        | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS,
                )
                .src_access_mask(vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE)
                .dst_stage_mask(
                    vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS
                        | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS,
                )
                .dst_access_mask(
                    vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ
                        | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
                )
                .old_layout(vk::ImageLayout::UNDEFINED)
                .new_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(depth_image)
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(Self::depth_aspect(depth_format))
                        .base_mip_level(0)
                        .level_count(1)
                        .base_array_layer(0)
                        .layer_count(1),
                ),
        ];

        let color_attachments = [vk::RenderingAttachmentInfo::default()
            .image_view(color_view)
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: clear.color,
                },
            })];
        let depth_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(depth_view)
            .image_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .clear_value(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: clear.depth,
                    stencil: 0,
                },
            });

        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        let rendering_info = vk::RenderingInfo::default()
            .render_area(render_area)
            .layer_count(1)
            .color_attachments(&color_attachments)
            .depth_attachment(&depth_attachment);

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };

        unsafe {
            device.cmd_pipeline_barrier2(
                command_buffer,
                &vk::DependencyInfo::default().image_memory_barriers(&barriers),
            );
            device.cmd_begin_rendering(command_buffer, &rendering_info);
            device.cmd_set_viewport(command_buffer, 0, &[viewport]);
            device.cmd_set_scissor(command_buffer, 0, &[render_area]);
        }

        Ok(())
    }

    fn end_render_pass(
        &self,
        command_buffer: vk::CommandBuffer,
        swapchain: &Self::Swapchain,
        image_index: u32,
    ) -> Result<()> {
        let image = swapchain.image(image_index).ok_or_else(|| {
            GpuError::InvalidState(format!("Swapchain image {image_index} out of range"))
        })?;
        let device = self.gpu.device();

        let barrier = vk::ImageMemoryBarrier2::default()
            .src_stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
            .src_access_mask(vk::AccessFlags2::COLOR_ATTACHMENT_WRITE)
            .dst_stage_mask(vk::PipelineStageFlags2::BOTTOM_OF_PIPE)
            .dst_access_mask(vk::AccessFlags2::NONE)
            .old_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .new_layout(vk::ImageLayout::PRESENT_SRC_KHR)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(color_subresource_range());
        let barriers = [barrier];

        unsafe {
            device.cmd_end_rendering(command_buffer);
            device.cmd_pipeline_barrier2(
                command_buffer,
                &vk::DependencyInfo::default().image_memory_barriers(&barriers),
            );
        }

        Ok(())
    }

    fn create_buffer(&self, desc: &BufferDesc<'_>) -> Result<Self::Buffer> {
        let size = match desc.usage {
            BufferUsage::Uniform => align_up(
                desc.size,
                self.gpu.capabilities().min_uniform_buffer_offset_alignment,
            ),
            BufferUsage::Vertex | BufferUsage::Index => desc.size,
        };
        let inner = self.gpu.allocator().lock().create_buffer(
            size,
            desc.usage.flags(),
            MemoryLocation::CpuToGpu,
            desc.name,
        )?;
        Ok(VulkanBuffer {
            inner,
            gpu: self.gpu.clone(),
        })
    }

    fn write_buffer(&self, buffer: &Self::Buffer, offset: u64, data: &[u8]) -> Result<()> {
        buffer.inner.write_bytes(offset, data)
    }

    fn flush_buffer(&self, buffer: &Self::Buffer) -> Result<()> {
        unsafe {
            buffer
                .inner
                .flush(self.gpu.device(), self.gpu.capabilities().non_coherent_atom_size)
        }
    }

    fn create_texture(&self, desc: &TextureDesc<'_>) -> Result<Self::Texture> {
        VulkanTexture::upload(&self.gpu, &self.command_pool, desc)
    }

    fn create_descriptor_set_layout(
        &self,
        bindings: &[DescriptorBinding],
    ) -> Result<Self::DescriptorSetLayout> {
        let layout = unsafe { create_layout(self.gpu.device(), bindings)? };
        Ok(VulkanDescriptorSetLayout {
            layout,
            gpu: self.gpu.clone(),
        })
    }

    fn allocate_descriptor_set(
        &self,
        layout: &Self::DescriptorSetLayout,
        writes: &[DescriptorWrite<'_, Self>],
    ) -> Result<vk::DescriptorSet> {
        let device = self.gpu.device();
        let set = unsafe { self.descriptor_pool.allocate(device, layout.layout)? };

        for write in writes {
            match write {
                DescriptorWrite::UniformBuffer { binding, buffer } => unsafe {
                    write_uniform_buffer(device, set, *binding, buffer.handle(), buffer.size());
                },
                DescriptorWrite::CombinedImageSampler { binding, texture } => unsafe {
                    write_combined_image_sampler(
                        device,
                        set,
                        *binding,
                        texture.view(),
                        texture.sampler(),
                    );
                },
            }
        }

        Ok(set)
    }

    fn create_pipeline(
        &self,
        config: &PipelineConfig,
        shaders: &ShaderStages<'_>,
        set_layouts: &[&Self::DescriptorSetLayout],
        push_constant_size: u32,
        target: RenderTargetFormats,
    ) -> Result<Self::Pipeline> {
        let layouts: Vec<_> = set_layouts.iter().map(|l| l.layout).collect();
        let (pipeline, layout) = unsafe {
            create_graphics_pipeline(
                self.gpu.device(),
                config,
                shaders,
                &layouts,
                push_constant_size,
                target,
            )?
        };
        Ok(VulkanPipeline {
            pipeline,
            layout,
            gpu: self.gpu.clone(),
        })
    }

    fn bind_pipeline(&self, command_buffer: vk::CommandBuffer, pipeline: &Self::Pipeline) {
        unsafe {
            self.gpu.device().cmd_bind_pipeline(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline.pipeline,
            );
        }
    }

    fn bind_descriptor_set(
        &self,
        command_buffer: vk::CommandBuffer,
        pipeline: &Self::Pipeline,
        set: vk::DescriptorSet,
    ) {
        unsafe {
            self.gpu.device().cmd_bind_descriptor_sets(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline.layout,
                0,
                &[set],
                &[],
            );
        }
    }

    fn push_constants(
        &self,
        command_buffer: vk::CommandBuffer,
        pipeline: &Self::Pipeline,
        data: &[u8],
    ) {
        unsafe {
            self.gpu.device().cmd_push_constants(
                command_buffer,
                pipeline.layout,
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                0,
                data,
            );
        }
    }

    fn bind_vertex_buffer(&self, command_buffer: vk::CommandBuffer, buffer: &Self::Buffer) {
        unsafe {
            self.gpu
                .device()
                .cmd_bind_vertex_buffers(command_buffer, 0, &[buffer.handle()], &[0]);
        }
    }

    fn bind_index_buffer(&self, command_buffer: vk::CommandBuffer, buffer: &Self::Buffer) {
        unsafe {
            self.gpu.device().cmd_bind_index_buffer(
                command_buffer,
                buffer.handle(),
                0,
                vk::IndexType::UINT32,
            );
        }
    }

    fn draw(&self, command_buffer: vk::CommandBuffer, vertex_count: u32, instance_count: u32) {
        unsafe {
            self.gpu
                .device()
                .cmd_draw(command_buffer, vertex_count, instance_count, 0, 0);
        }
    }

    fn draw_indexed(&self, command_buffer: vk::CommandBuffer, index_count: u32) {
        unsafe {
            self.gpu
                .device()
                .cmd_draw_indexed(command_buffer, index_count, 1, 0, 0, 0);
        }
    }
}
