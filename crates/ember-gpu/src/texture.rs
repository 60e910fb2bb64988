//! Sampled textures uploaded through a staging buffer.

use crate::backend::TextureDesc;
use crate::command::{execute_single_time_commands, CommandPool};
use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::memory::GpuImage;
use crate::swapchain::create_image_view;
use ash::vk;
use gpu_allocator::MemoryLocation;
use std::sync::Arc;

/// Format used for every colour texture.
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// A device-local RGBA texture with its view and sampler.
pub struct VulkanTexture {
    image: GpuImage,
    view: vk::ImageView,
    sampler: vk::Sampler,
    gpu: Arc<GpuContext>,
}

impl VulkanTexture {
    /// Create the image, upload `desc.pixels` and leave it in
    /// `SHADER_READ_ONLY_OPTIMAL`.
    pub fn upload(gpu: &Arc<GpuContext>, pool: &CommandPool, desc: &TextureDesc<'_>) -> Result<Self> {
        let expected = u64::from(desc.width) * u64::from(desc.height) * 4;
        if desc.width == 0 || desc.height == 0 || desc.pixels.len() as u64 != expected {
            return Err(GpuError::InvalidState(format!(
                "Texture '{}' is {}x{} but has {} bytes of pixel data",
                desc.name,
                desc.width,
                desc.height,
                desc.pixels.len()
            )));
        }

        let extent = vk::Extent3D {
            width: desc.width,
            height: desc.height,
            depth: 1,
        };
        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(TEXTURE_FORMAT)
            .extent(extent)
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = gpu
            .allocator()
            .lock()
            .create_image(&image_info, MemoryLocation::GpuOnly, desc.name)?;

        // Null handles are valid to destroy, so Drop covers partial construction
        let mut texture = Self {
            image,
            view: vk::ImageView::null(),
            sampler: vk::Sampler::null(),
            gpu: gpu.clone(),
        };

        texture.copy_pixels(pool, desc, extent)?;

        let device = gpu.device();
        texture.view = unsafe {
            create_image_view(
                device,
                texture.image.image,
                TEXTURE_FORMAT,
                vk::ImageAspectFlags::COLOR,
            )?
        };

        let sampler_info = vk::SamplerCreateInfo::default()
            .mag_filter(desc.filter)
            .min_filter(desc.filter)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(false)
            .max_anisotropy(1.0)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .min_lod(0.0)
            .max_lod(0.0)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false);
        texture.sampler = unsafe { device.create_sampler(&sampler_info, None)? };

        tracing::debug!("Uploaded texture '{}' ({}x{})", desc.name, desc.width, desc.height);
        Ok(texture)
    }

    fn copy_pixels(
        &self,
        pool: &CommandPool,
        desc: &TextureDesc<'_>,
        extent: vk::Extent3D,
    ) -> Result<()> {
        let gpu = &self.gpu;
        let device = gpu.device();

        let mut staging = gpu.allocator().lock().create_buffer(
            desc.pixels.len() as u64,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
            &format!("{}_staging", desc.name),
        )?;

        let image = self.image.image;
        let staging_buffer = staging.buffer;
        let result = staging
            .write_bytes(0, desc.pixels)
            .and_then(|()| unsafe {
                staging.flush(device, gpu.capabilities().non_coherent_atom_size)
            })
            .and_then(|()| unsafe {
                execute_single_time_commands(device, pool, gpu.graphics_queue(), |cmd| {
                    transition(
                        device,
                        cmd,
                        image,
                        vk::ImageLayout::UNDEFINED,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    );

                    let region = vk::BufferImageCopy::default()
                        .buffer_offset(0)
                        .buffer_row_length(0)
                        .buffer_image_height(0)
                        .image_subresource(
                            vk::ImageSubresourceLayers::default()
                                .aspect_mask(vk::ImageAspectFlags::COLOR)
                                .mip_level(0)
                                .base_array_layer(0)
                                .layer_count(1),
                        )
                        .image_extent(extent);
                    device.cmd_copy_buffer_to_image(
                        cmd,
                        staging_buffer,
                        image,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        &[region],
                    );

                    transition(
                        device,
                        cmd,
                        image,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    );
                })
            });

        gpu.allocator().lock().free_buffer(&mut staging)?;
        result
    }

    /// Image view handle.
    pub const fn view(&self) -> vk::ImageView {
        self.view
    }

    /// Sampler handle.
    pub const fn sampler(&self) -> vk::Sampler {
        self.sampler
    }

    /// Width and height in pixels.
    pub const fn size(&self) -> (u32, u32) {
        (self.image.extent.width, self.image.extent.height)
    }
}

impl Drop for VulkanTexture {
    fn drop(&mut self) {
        let device = self.gpu.device();
        unsafe {
            device.destroy_sampler(self.sampler, None);
            device.destroy_image_view(self.view, None);
        }
        if let Err(e) = self.gpu.allocator().lock().free_image(&mut self.image) {
            tracing::warn!("Failed to free texture image: {e}");
        }
    }
}

/// Record a colour image layout transition for the upload path.
unsafe fn transition(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) {
    let (src_stage, src_access, dst_stage, dst_access) = match new_layout {
        vk::ImageLayout::TRANSFER_DST_OPTIMAL => (
            vk::PipelineStageFlags2::NONE,
            vk::AccessFlags2::NONE,
            vk::PipelineStageFlags2::COPY,
            vk::AccessFlags2::TRANSFER_WRITE,
        ),
        _ => (
            vk::PipelineStageFlags2::COPY,
            vk::AccessFlags2::TRANSFER_WRITE,
            vk::PipelineStageFlags2::FRAGMENT_SHADER,
            vk::AccessFlags2::SHADER_SAMPLED_READ,
        ),
    };

    let barrier = vk::ImageMemoryBarrier2::default()
        .src_stage_mask(src_stage)
        .src_access_mask(src_access)
        .dst_stage_mask(dst_stage)
        .dst_access_mask(dst_access)
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(color_subresource_range());

    let barriers = [barrier];
    let dependency = vk::DependencyInfo::default().image_memory_barriers(&barriers);
    unsafe { device.cmd_pipeline_barrier2(cmd, &dependency) };
}

/// Full subresource range of a single-mip colour image.
pub(crate) fn color_subresource_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1)
}
