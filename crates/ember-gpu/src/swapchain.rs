//! Swapchain management.

use crate::backend::{AcquiredImage, RenderTargetFormats, Swapchain, SwapchainStatus};
use crate::command::submit_command_buffers;
use crate::error::{GpuError, Result};
use crate::memory::GpuImage;
use crate::surface::SurfaceContext;
use crate::sync::{wait_for_fence, FrameSync};
use ash::vk;
use ember_core::Extent2D;
use gpu_allocator::MemoryLocation;
use std::sync::Arc;

/// Swapchain with per-image depth attachments and per-slot synchronization.
///
/// All owned Vulkan objects are destroyed on drop; the caller must make sure
/// the device is idle first.
pub struct VulkanSwapchain {
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    depth_images: Vec<GpuImage>,
    depth_views: Vec<vk::ImageView>,
    frame_syncs: Vec<FrameSync>,
    images_in_flight: ImagesInFlight,
    formats: RenderTargetFormats,
    extent: vk::Extent2D,
    surface: Arc<SurfaceContext>,
}

impl VulkanSwapchain {
    /// Create a swapchain for `surface`.
    ///
    /// `old` is passed to the driver as `oldSwapchain`; it stays valid and is
    /// destroyed when the caller drops it.
    pub fn new(
        surface: Arc<SurfaceContext>,
        desired: Extent2D,
        vsync: bool,
        old: Option<&Self>,
        frames_in_flight: usize,
    ) -> Result<Self> {
        let caps = surface.capabilities()?;
        let surface_format = select_surface_format(&caps.formats)?;
        let present_mode = select_present_mode(&caps.present_modes, vsync);
        let extent = calculate_extent(&caps.capabilities, desired.width, desired.height);

        let gpu = surface.gpu().clone();
        let depth_format = unsafe { find_depth_format(gpu.instance(), gpu.physical_device())? };

        let mut image_count = caps.capabilities.min_image_count + 1;
        if caps.capabilities.max_image_count > 0 && image_count > caps.capabilities.max_image_count
        {
            image_count = caps.capabilities.max_image_count;
        }

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(caps.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old.map_or(vk::SwapchainKHR::null(), |o| o.swapchain));

        let swapchain = unsafe { surface.swapchain_loader.create_swapchain(&create_info, None) }
            .map_err(|e| GpuError::SwapchainCreation(e.to_string()))?;

        // From here on, Drop cleans up whatever has been created so far
        let mut chain = Self {
            swapchain,
            images: Vec::new(),
            image_views: Vec::new(),
            depth_images: Vec::new(),
            depth_views: Vec::new(),
            frame_syncs: Vec::new(),
            images_in_flight: ImagesInFlight::default(),
            formats: RenderTargetFormats {
                color: surface_format.format,
                depth: depth_format,
            },
            extent,
            surface,
        };

        let device = gpu.device();
        chain.images = unsafe { chain.surface.swapchain_loader.get_swapchain_images(swapchain)? };

        for &image in &chain.images {
            let view = unsafe {
                create_image_view(device, image, surface_format.format, vk::ImageAspectFlags::COLOR)?
            };
            chain.image_views.push(view);
        }

        for index in 0..chain.images.len() {
            let depth_info = vk::ImageCreateInfo::default()
                .image_type(vk::ImageType::TYPE_2D)
                .format(depth_format)
                .extent(vk::Extent3D {
                    width: extent.width,
                    height: extent.height,
                    depth: 1,
                })
                .mip_levels(1)
                .array_layers(1)
                .samples(vk::SampleCountFlags::TYPE_1)
                .tiling(vk::ImageTiling::OPTIMAL)
                .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
                .sharing_mode(vk::SharingMode::EXCLUSIVE)
                .initial_layout(vk::ImageLayout::UNDEFINED);

            let depth_image = gpu.allocator().lock().create_image(
                &depth_info,
                MemoryLocation::GpuOnly,
                &format!("swapchain_depth_{index}"),
            )?;
            let image = depth_image.image;
            chain.depth_images.push(depth_image);

            let view = unsafe {
                create_image_view(device, image, depth_format, vk::ImageAspectFlags::DEPTH)?
            };
            chain.depth_views.push(view);
        }

        chain.frame_syncs = unsafe { FrameSync::for_slots(device, frames_in_flight)? };
        chain.images_in_flight = ImagesInFlight::new(chain.images.len());

        tracing::info!(
            "Swapchain created: {}x{} ({} images, {}, {:?})",
            extent.width,
            extent.height,
            chain.images.len(),
            chain.formats,
            present_mode
        );

        Ok(chain)
    }

    pub(crate) fn image(&self, index: u32) -> Option<vk::Image> {
        self.images.get(index as usize).copied()
    }

    pub(crate) fn image_view(&self, index: u32) -> Option<vk::ImageView> {
        self.image_views.get(index as usize).copied()
    }

    pub(crate) fn depth_image(&self, index: u32) -> Option<vk::Image> {
        self.depth_images.get(index as usize).map(|d| d.image)
    }

    pub(crate) fn depth_view(&self, index: u32) -> Option<vk::ImageView> {
        self.depth_views.get(index as usize).copied()
    }

    pub(crate) const fn vk_extent(&self) -> vk::Extent2D {
        self.extent
    }

    fn frame_sync(&self, slot: usize) -> Result<&FrameSync> {
        self.frame_syncs
            .get(slot)
            .ok_or_else(|| GpuError::InvalidState(format!("Frame slot {slot} out of range")))
    }
}

impl Swapchain for VulkanSwapchain {
    fn extent(&self) -> Extent2D {
        Extent2D::new(self.extent.width, self.extent.height)
    }

    fn image_count(&self) -> usize {
        self.images.len()
    }

    fn formats(&self) -> RenderTargetFormats {
        self.formats
    }

    fn acquire_next_image(&mut self, slot: usize) -> Result<AcquiredImage> {
        let sync = self.frame_sync(slot)?;
        let gpu = self.surface.gpu();

        unsafe { sync.wait(gpu.device())? };

        let result = unsafe {
            self.surface.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                sync.image_available,
                vk::Fence::null(),
            )
        };

        acquire_status(result)
    }

    fn submit_and_present(
        &mut self,
        slot: usize,
        command_buffer: vk::CommandBuffer,
        image_index: u32,
    ) -> Result<SwapchainStatus> {
        let gpu = self.surface.gpu().clone();
        let device = gpu.device();
        let sync = self.frame_sync(slot)?;
        let (image_available, render_finished, in_flight) =
            (sync.image_available, sync.render_finished, sync.in_flight);

        let wait_on = self.images_in_flight.claim(image_index, in_flight)?;

        unsafe {
            if let Some(fence) = wait_on {
                wait_for_fence(device, fence, u64::MAX)?;
            }

            self.frame_sync(slot)?.reset(device)?;

            submit_command_buffers(
                device,
                gpu.graphics_queue(),
                &[command_buffer],
                &[image_available],
                &[vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT],
                &[render_finished],
                in_flight,
            )?;
        }

        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [render_finished];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe {
            self.surface
                .swapchain_loader
                .queue_present(gpu.graphics_queue(), &present_info)
        };

        present_status(result)
    }
}

impl Drop for VulkanSwapchain {
    fn drop(&mut self) {
        let gpu = self.surface.gpu().clone();
        let device = gpu.device();

        unsafe {
            for sync in &self.frame_syncs {
                sync.destroy(device);
            }
            for &view in &self.depth_views {
                device.destroy_image_view(view, None);
            }
        }

        {
            let mut allocator = gpu.allocator().lock();
            for image in &mut self.depth_images {
                if let Err(e) = allocator.free_image(image) {
                    tracing::warn!("Failed to free swapchain depth image: {e}");
                }
            }
        }

        unsafe {
            for &view in &self.image_views {
                device.destroy_image_view(view, None);
            }
            self.surface
                .swapchain_loader
                .destroy_swapchain(self.swapchain, None);
        }
    }
}

/// Fence of the frame slot that last submitted work for each swapchain image.
///
/// Images are handed out by the driver in any order, so an image may come back
/// while another slot's work on it is still in flight.
#[derive(Debug, Default)]
pub(crate) struct ImagesInFlight {
    fences: Vec<vk::Fence>,
}

impl ImagesInFlight {
    pub(crate) fn new(image_count: usize) -> Self {
        Self {
            fences: vec![vk::Fence::null(); image_count],
        }
    }

    /// Record that the slot owning `fence` is about to render to `image_index`.
    ///
    /// Returns the fence of another slot that must be waited on first, if any.
    pub(crate) fn claim(
        &mut self,
        image_index: u32,
        fence: vk::Fence,
    ) -> Result<Option<vk::Fence>> {
        let owner = self
            .fences
            .get_mut(image_index as usize)
            .ok_or_else(|| GpuError::InvalidState(format!("Image {image_index} out of range")))?;

        let previous = std::mem::replace(owner, fence);
        Ok((previous != vk::Fence::null() && previous != fence).then_some(previous))
    }
}

/// Classify the result of `vkAcquireNextImageKHR`.
fn acquire_status(result: ash::prelude::VkResult<(u32, bool)>) -> Result<AcquiredImage> {
    match result {
        Ok((image_index, suboptimal)) => Ok(AcquiredImage::Ready {
            image_index,
            suboptimal,
        }),
        // No image was acquired and the semaphore stays unsignaled
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquiredImage::Stale),
        Err(e) => Err(GpuError::from(e)),
    }
}

/// Classify the result of `vkQueuePresentKHR`.
fn present_status(result: ash::prelude::VkResult<bool>) -> Result<SwapchainStatus> {
    match result {
        Ok(false) => Ok(SwapchainStatus::Optimal),
        Ok(true) => Ok(SwapchainStatus::Suboptimal),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(SwapchainStatus::Stale),
        Err(e) => Err(GpuError::from(e)),
    }
}

/// Create a 2D image view covering one mip level and layer.
///
/// # Safety
/// The device and image must be valid.
pub(crate) unsafe fn create_image_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
) -> Result<vk::ImageView> {
    let view_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping::default())
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(aspect)
                .base_mip_level(0)
                .level_count(1)
                .base_array_layer(0)
                .layer_count(1),
        );

    let view = unsafe { device.create_image_view(&view_info, None)? };
    Ok(view)
}

/// Depth formats in order of preference.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Pick the first depth format usable as an optimal-tiling depth attachment.
///
/// # Safety
/// The instance and physical device must be valid.
pub unsafe fn find_depth_format(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> Result<vk::Format> {
    DEPTH_FORMAT_CANDIDATES
        .into_iter()
        .find(|&format| {
            let props =
                unsafe { instance.get_physical_device_format_properties(physical_device, format) };
            props
                .optimal_tiling_features
                .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
        })
        .ok_or_else(|| GpuError::SwapchainCreation("No supported depth format".to_string()))
}

/// Select the best surface format.
pub fn select_surface_format(available: &[vk::SurfaceFormatKHR]) -> Result<vk::SurfaceFormatKHR> {
    available
        .iter()
        .find(|format| {
            format.format == vk::Format::B8G8R8A8_SRGB
                && format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| available.first())
        .copied()
        .ok_or_else(|| GpuError::SwapchainCreation("Surface reports no formats".to_string()))
}

/// Select the best present mode.
pub fn select_present_mode(available: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if vsync {
        return vk::PresentModeKHR::FIFO;
    }

    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
        .into_iter()
        .find(|mode| available.contains(mode))
        // FIFO is always supported
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Calculate swapchain extent.
pub fn calculate_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    desired_width: u32,
    desired_height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: desired_width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: desired_height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface_format(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn prefers_srgb_surface_format() {
        let available = [
            surface_format(vk::Format::B8G8R8A8_UNORM),
            surface_format(vk::Format::B8G8R8A8_SRGB),
        ];
        let selected = select_surface_format(&available).unwrap();
        assert_eq!(selected.format, vk::Format::B8G8R8A8_SRGB);
    }

    #[test]
    fn falls_back_to_first_surface_format() {
        let available = [surface_format(vk::Format::R8G8B8A8_UNORM)];
        let selected = select_surface_format(&available).unwrap();
        assert_eq!(selected.format, vk::Format::R8G8B8A8_UNORM);
        assert!(select_surface_format(&[]).is_err());
    }

    #[test]
    fn present_mode_selection() {
        let all = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::MAILBOX,
        ];
        assert_eq!(select_present_mode(&all, true), vk::PresentModeKHR::FIFO);
        assert_eq!(select_present_mode(&all, false), vk::PresentModeKHR::MAILBOX);
        assert_eq!(
            select_present_mode(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE], false),
            vk::PresentModeKHR::IMMEDIATE
        );
        assert_eq!(
            select_present_mode(&[vk::PresentModeKHR::FIFO], false),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn extent_uses_current_extent_when_fixed() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            ..Default::default()
        };
        assert_eq!(calculate_extent(&caps, 1920, 1080), caps.current_extent);
    }

    #[test]
    fn extent_is_clamped_when_surface_defers() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 1024,
                height: 768,
            },
            ..Default::default()
        };
        let extent = calculate_extent(&caps, 1920, 500);
        assert_eq!(extent.width, 1024);
        assert_eq!(extent.height, 500);
    }

    fn fence(raw: u64) -> vk::Fence {
        <vk::Fence as vk::Handle>::from_raw(raw)
    }

    #[test]
    fn first_use_of_an_image_needs_no_wait() {
        let mut images = ImagesInFlight::new(3);
        assert_eq!(images.claim(0, fence(1)).unwrap(), None);
        assert_eq!(images.claim(1, fence(2)).unwrap(), None);
    }

    #[test]
    fn same_slot_reusing_an_image_needs_no_wait() {
        let mut images = ImagesInFlight::new(2);
        images.claim(1, fence(1)).unwrap();
        assert_eq!(images.claim(1, fence(1)).unwrap(), None);
    }

    #[test]
    fn other_slot_reusing_an_image_waits_on_its_fence() {
        let mut images = ImagesInFlight::new(3);
        images.claim(2, fence(1)).unwrap();
        assert_eq!(images.claim(2, fence(2)).unwrap(), Some(fence(1)));
        // Ownership moved to the second slot
        assert_eq!(images.claim(2, fence(1)).unwrap(), Some(fence(2)));
    }

    #[test]
    fn out_of_range_image_is_an_error() {
        let mut images = ImagesInFlight::new(2);
        assert!(matches!(
            images.claim(2, fence(1)),
            Err(GpuError::InvalidState(_))
        ));
    }

    #[test]
    fn acquire_results_are_classified() {
        assert_eq!(
            acquire_status(Ok((2, false))).unwrap(),
            AcquiredImage::Ready {
                image_index: 2,
                suboptimal: false
            }
        );
        assert_eq!(
            acquire_status(Ok((0, true))).unwrap(),
            AcquiredImage::Ready {
                image_index: 0,
                suboptimal: true
            }
        );
        assert_eq!(
            acquire_status(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            AcquiredImage::Stale
        );
        assert!(acquire_status(Err(vk::Result::ERROR_SURFACE_LOST_KHR)).is_err());
        assert!(acquire_status(Err(vk::Result::ERROR_DEVICE_LOST)).is_err());
    }

    #[test]
    fn present_results_are_classified() {
        assert_eq!(present_status(Ok(false)).unwrap(), SwapchainStatus::Optimal);
        assert_eq!(present_status(Ok(true)).unwrap(), SwapchainStatus::Suboptimal);
        assert_eq!(
            present_status(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            SwapchainStatus::Stale
        );
        assert!(present_status(Err(vk::Result::ERROR_SURFACE_LOST_KHR)).is_err());
        assert!(present_status(Err(vk::Result::ERROR_DEVICE_LOST)).is_err());
    }
}
