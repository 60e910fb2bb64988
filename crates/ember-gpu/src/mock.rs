//! Recording mock backend.
//!
//! `MockDevice` implements [`GraphicsDevice`] without touching a GPU. Every
//! call is appended to an ordered event log, submissions are tracked as
//! outstanding fences per frame slot, and acquire/present results or the
//! formats of the next swapchain can be scripted.

use crate::backend::{
    AcquiredImage, BufferDesc, ClearValues, DescriptorWrite, GraphicsDevice, RenderTargetFormats,
    ShaderStages, Swapchain, SwapchainStatus, TextureDesc,
};
use crate::descriptors::DescriptorBinding;
use crate::error::{GpuError, Result};
use crate::pipeline::PipelineConfig;
use ash::vk::{self, Handle};
use ember_core::{constants::MAX_FRAMES_IN_FLIGHT, Extent2D};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// A recorded device or swapchain call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    CreateSwapchain { id: u64, extent: Extent2D, chained: bool },
    DestroySwapchain { id: u64 },
    WaitIdle,
    AllocateCommandBuffers { count: usize },
    FreeCommandBuffers { count: usize },
    BeginCommandBuffer { cmd: vk::CommandBuffer },
    EndCommandBuffer { cmd: vk::CommandBuffer },
    Acquire { slot: usize },
    Submit { slot: usize, cmd: vk::CommandBuffer, image_index: u32 },
    Present { image_index: u32 },
    BeginRenderPass { cmd: vk::CommandBuffer, image_index: u32 },
    EndRenderPass { cmd: vk::CommandBuffer, image_index: u32 },
    CreateBuffer { id: u64, size: u64 },
    WriteBuffer { id: u64, offset: u64, len: usize },
    FlushBuffer { id: u64 },
    CreateTexture { id: u64 },
    AllocateDescriptorSet { set: vk::DescriptorSet, buffers: Vec<u64>, textures: Vec<u64> },
    CreatePipeline { id: u64 },
    BindPipeline { id: u64 },
    BindDescriptorSet { set: vk::DescriptorSet },
    PushConstants { len: usize },
    BindVertexBuffer { id: u64 },
    BindIndexBuffer { id: u64 },
    Draw { vertex_count: u32, instance_count: u32 },
    DrawIndexed { index_count: u32 },
}

#[derive(Debug)]
struct MockState {
    events: Vec<MockEvent>,
    acquire_script: VecDeque<AcquiredImage>,
    present_script: VecDeque<SwapchainStatus>,
    formats: RenderTargetFormats,
    image_count: usize,
    /// Outstanding submission per frame slot.
    pending: Vec<bool>,
    max_outstanding: usize,
    recording: Vec<vk::CommandBuffer>,
    fail_next_allocation: bool,
    next_id: u64,
}

impl MockState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn outstanding(&self) -> usize {
        self.pending.iter().filter(|&&p| p).count()
    }

    fn is_recording(&self, cmd: vk::CommandBuffer) -> bool {
        self.recording.contains(&cmd)
    }
}

/// Formats reported by the mock until changed.
pub const MOCK_FORMATS: RenderTargetFormats = RenderTargetFormats {
    color: vk::Format::B8G8R8A8_SRGB,
    depth: vk::Format::D32_SFLOAT,
};

/// Recording graphics device.
#[derive(Clone)]
pub struct MockDevice {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDevice {
    /// Create a mock with three swapchain images.
    pub fn new() -> Self {
        Self::with_image_count(3)
    }

    pub fn with_image_count(image_count: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                events: Vec::new(),
                acquire_script: VecDeque::new(),
                present_script: VecDeque::new(),
                formats: MOCK_FORMATS,
                image_count,
                pending: vec![false; MAX_FRAMES_IN_FLIGHT],
                max_outstanding: 0,
                recording: Vec::new(),
                fail_next_allocation: false,
                next_id: 0,
            })),
        }
    }

    /// Snapshot of the event log.
    pub fn events(&self) -> Vec<MockEvent> {
        self.state.lock().events.clone()
    }

    pub fn clear_events(&self) {
        self.state.lock().events.clear();
    }

    /// Number of logged events matching `pred`.
    pub fn count(&self, pred: impl Fn(&MockEvent) -> bool) -> usize {
        self.state.lock().events.iter().filter(|e| pred(e)).count()
    }

    /// Queue the result of an upcoming acquire. Unscripted acquires succeed.
    pub fn script_acquire(&self, result: AcquiredImage) {
        self.state.lock().acquire_script.push_back(result);
    }

    /// Queue the result of an upcoming present. Unscripted presents are optimal.
    pub fn script_present(&self, status: SwapchainStatus) {
        self.state.lock().present_script.push_back(status);
    }

    /// Make the next command buffer allocation fail.
    pub fn fail_next_allocation(&self) {
        self.state.lock().fail_next_allocation = true;
    }

    /// Formats reported by swapchains created from now on.
    pub fn set_formats(&self, formats: RenderTargetFormats) {
        self.state.lock().formats = formats;
    }

    /// Highest number of simultaneously outstanding submissions seen.
    pub fn max_outstanding_frames(&self) -> usize {
        self.state.lock().max_outstanding
    }

    /// Submissions not yet waited on.
    pub fn outstanding_frames(&self) -> usize {
        self.state.lock().outstanding()
    }

    fn log(&self, event: MockEvent) {
        self.state.lock().events.push(event);
    }
}

/// Swapchain created by [`MockDevice`].
pub struct MockSwapchain {
    id: u64,
    extent: Extent2D,
    formats: RenderTargetFormats,
    image_count: usize,
    next_image: u32,
    state: Arc<Mutex<MockState>>,
}

impl MockSwapchain {
    pub const fn id(&self) -> u64 {
        self.id
    }
}

impl Swapchain for MockSwapchain {
    fn extent(&self) -> Extent2D {
        self.extent
    }

    fn image_count(&self) -> usize {
        self.image_count
    }

    fn formats(&self) -> RenderTargetFormats {
        self.formats
    }

    fn acquire_next_image(&mut self, slot: usize) -> Result<AcquiredImage> {
        let mut state = self.state.lock();
        if slot >= state.pending.len() {
            return Err(GpuError::InvalidState(format!("Frame slot {slot} out of range")));
        }
        // Waiting on the slot fence retires its previous submission
        state.pending[slot] = false;
        state.events.push(MockEvent::Acquire { slot });

        if let Some(scripted) = state.acquire_script.pop_front() {
            return Ok(scripted);
        }
        drop(state);

        let image_index = self.next_image;
        self.next_image = (self.next_image + 1) % self.image_count as u32;
        Ok(AcquiredImage::Ready {
            image_index,
            suboptimal: false,
        })
    }

    fn submit_and_present(
        &mut self,
        slot: usize,
        command_buffer: vk::CommandBuffer,
        image_index: u32,
    ) -> Result<SwapchainStatus> {
        let mut state = self.state.lock();
        if slot >= state.pending.len() {
            return Err(GpuError::InvalidState(format!("Frame slot {slot} out of range")));
        }
        if state.is_recording(command_buffer) {
            return Err(GpuError::InvalidState(
                "Submitted a command buffer that is still recording".to_string(),
            ));
        }
        if state.pending[slot] {
            return Err(GpuError::InvalidState(format!(
                "Slot {slot} submitted while its previous work is outstanding"
            )));
        }

        state.pending[slot] = true;
        let outstanding = state.outstanding();
        state.max_outstanding = state.max_outstanding.max(outstanding);
        state.events.push(MockEvent::Submit {
            slot,
            cmd: command_buffer,
            image_index,
        });
        state.events.push(MockEvent::Present { image_index });

        Ok(state
            .present_script
            .pop_front()
            .unwrap_or(SwapchainStatus::Optimal))
    }
}

impl Drop for MockSwapchain {
    fn drop(&mut self) {
        self.state
            .lock()
            .events
            .push(MockEvent::DestroySwapchain { id: self.id });
    }
}

/// Buffer whose contents live in host memory.
pub struct MockBuffer {
    id: u64,
    data: Mutex<Vec<u8>>,
}

impl MockBuffer {
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Copy of the current contents.
    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().clone()
    }
}

pub struct MockTexture {
    id: u64,
    pub width: u32,
    pub height: u32,
}

impl MockTexture {
    pub const fn id(&self) -> u64 {
        self.id
    }
}

pub struct MockDescriptorSetLayout {
    pub bindings: Vec<DescriptorBinding>,
}

pub struct MockPipeline {
    id: u64,
    pub config: PipelineConfig,
    pub push_constant_size: u32,
    pub target: RenderTargetFormats,
}

impl MockPipeline {
    pub const fn id(&self) -> u64 {
        self.id
    }
}

impl GraphicsDevice for MockDevice {
    type Swapchain = MockSwapchain;
    type Buffer = MockBuffer;
    type Texture = MockTexture;
    type DescriptorSetLayout = MockDescriptorSetLayout;
    type Pipeline = MockPipeline;

    fn create_swapchain(
        &self,
        extent: Extent2D,
        previous: Option<&Self::Swapchain>,
    ) -> Result<Self::Swapchain> {
        if extent.is_zero() {
            return Err(GpuError::SwapchainCreation("Zero extent".to_string()));
        }
        let mut state = self.state.lock();
        let id = state.next_id();
        state.events.push(MockEvent::CreateSwapchain {
            id,
            extent,
            chained: previous.is_some(),
        });
        Ok(MockSwapchain {
            id,
            extent,
            formats: state.formats,
            image_count: state.image_count,
            next_image: 0,
            state: self.state.clone(),
        })
    }

    fn wait_idle(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.pending.iter_mut().for_each(|p| *p = false);
        state.events.push(MockEvent::WaitIdle);
        Ok(())
    }

    fn allocate_command_buffers(&self, count: usize) -> Result<Vec<vk::CommandBuffer>> {
        let mut state = self.state.lock();
        if std::mem::take(&mut state.fail_next_allocation) {
            return Err(GpuError::Vulkan(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY));
        }
        state.events.push(MockEvent::AllocateCommandBuffers { count });
        Ok((0..count)
            .map(|_| vk::CommandBuffer::from_raw(state.next_id()))
            .collect())
    }

    fn free_command_buffers(&self, command_buffers: &[vk::CommandBuffer]) {
        self.log(MockEvent::FreeCommandBuffers {
            count: command_buffers.len(),
        });
    }

    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer) -> Result<()> {
        let mut state = self.state.lock();
        if !state.is_recording(command_buffer) {
            state.recording.push(command_buffer);
        }
        state.events.push(MockEvent::BeginCommandBuffer {
            cmd: command_buffer,
        });
        Ok(())
    }

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> Result<()> {
        let mut state = self.state.lock();
        if !state.is_recording(command_buffer) {
            return Err(GpuError::InvalidState(
                "Ended a command buffer that is not recording".to_string(),
            ));
        }
        state.recording.retain(|&c| c != command_buffer);
        state.events.push(MockEvent::EndCommandBuffer {
            cmd: command_buffer,
        });
        Ok(())
    }

    fn begin_render_pass(
        &self,
        command_buffer: vk::CommandBuffer,
        swapchain: &Self::Swapchain,
        image_index: u32,
        _clear: &ClearValues,
    ) -> Result<()> {
        if image_index as usize >= swapchain.image_count {
            return Err(GpuError::InvalidState(format!(
                "Swapchain image {image_index} out of range"
            )));
        }
        self.log(MockEvent::BeginRenderPass {
            cmd: command_buffer,
            image_index,
        });
        Ok(())
    }

    fn end_render_pass(
        &self,
        command_buffer: vk::CommandBuffer,
        _swapchain: &Self::Swapchain,
        image_index: u32,
    ) -> Result<()> {
        self.log(MockEvent::EndRenderPass {
            cmd: command_buffer,
            image_index,
        });
        Ok(())
    }

    fn create_buffer(&self, desc: &BufferDesc<'_>) -> Result<Self::Buffer> {
        let size = usize::try_from(desc.size)
            .map_err(|_| GpuError::AllocationFailed(format!("Buffer too large: {}", desc.size)))?;
        let mut state = self.state.lock();
        let id = state.next_id();
        state.events.push(MockEvent::CreateBuffer {
            id,
            size: desc.size,
        });
        Ok(MockBuffer {
            id,
            data: Mutex::new(vec![0; size]),
        })
    }

    fn write_buffer(&self, buffer: &Self::Buffer, offset: u64, data: &[u8]) -> Result<()> {
        let mut contents = buffer.data.lock();
        let start = offset as usize;
        let end = start + data.len();
        if end > contents.len() {
            return Err(GpuError::InvalidState(format!(
                "Write of {} bytes at offset {offset} exceeds buffer size {}",
                data.len(),
                contents.len()
            )));
        }
        contents[start..end].copy_from_slice(data);
        drop(contents);

        self.log(MockEvent::WriteBuffer {
            id: buffer.id,
            offset,
            len: data.len(),
        });
        Ok(())
    }

    fn flush_buffer(&self, buffer: &Self::Buffer) -> Result<()> {
        self.log(MockEvent::FlushBuffer { id: buffer.id });
        Ok(())
    }

    fn create_texture(&self, desc: &TextureDesc<'_>) -> Result<Self::Texture> {
        if desc.pixels.len() != (desc.width * desc.height * 4) as usize {
            return Err(GpuError::InvalidState(format!(
                "Texture '{}' has {} bytes of pixel data",
                desc.name,
                desc.pixels.len()
            )));
        }
        let mut state = self.state.lock();
        let id = state.next_id();
        state.events.push(MockEvent::CreateTexture { id });
        Ok(MockTexture {
            id,
            width: desc.width,
            height: desc.height,
        })
    }

    fn create_descriptor_set_layout(
        &self,
        bindings: &[DescriptorBinding],
    ) -> Result<Self::DescriptorSetLayout> {
        Ok(MockDescriptorSetLayout {
            bindings: bindings.to_vec(),
        })
    }

    fn allocate_descriptor_set(
        &self,
        layout: &Self::DescriptorSetLayout,
        writes: &[DescriptorWrite<'_, Self>],
    ) -> Result<vk::DescriptorSet> {
        let mut buffers = Vec::new();
        let mut textures = Vec::new();
        for write in writes {
            let Some(binding) = layout.bindings.iter().find(|b| b.binding == write.binding())
            else {
                return Err(GpuError::DescriptorAllocation(format!(
                    "Layout has no binding {}",
                    write.binding()
                )));
            };
            match write {
                DescriptorWrite::UniformBuffer { buffer, .. } => {
                    if binding.descriptor_type != vk::DescriptorType::UNIFORM_BUFFER {
                        return Err(GpuError::DescriptorAllocation(format!(
                            "Binding {} is not a uniform buffer",
                            binding.binding
                        )));
                    }
                    buffers.push(buffer.id);
                }
                DescriptorWrite::CombinedImageSampler { texture, .. } => {
                    if binding.descriptor_type != vk::DescriptorType::COMBINED_IMAGE_SAMPLER {
                        return Err(GpuError::DescriptorAllocation(format!(
                            "Binding {} is not an image sampler",
                            binding.binding
                        )));
                    }
                    textures.push(texture.id);
                }
            }
        }

        let mut state = self.state.lock();
        let set = vk::DescriptorSet::from_raw(state.next_id());
        state.events.push(MockEvent::AllocateDescriptorSet {
            set,
            buffers,
            textures,
        });
        Ok(set)
    }

    fn create_pipeline(
        &self,
        config: &PipelineConfig,
        _shaders: &ShaderStages<'_>,
        _set_layouts: &[&Self::DescriptorSetLayout],
        push_constant_size: u32,
        target: RenderTargetFormats,
    ) -> Result<Self::Pipeline> {
        let mut state = self.state.lock();
        let id = state.next_id();
        state.events.push(MockEvent::CreatePipeline { id });
        Ok(MockPipeline {
            id,
            config: config.clone(),
            push_constant_size,
            target,
        })
    }

    fn bind_pipeline(&self, _command_buffer: vk::CommandBuffer, pipeline: &Self::Pipeline) {
        self.log(MockEvent::BindPipeline { id: pipeline.id });
    }

    fn bind_descriptor_set(
        &self,
        _command_buffer: vk::CommandBuffer,
        _pipeline: &Self::Pipeline,
        set: vk::DescriptorSet,
    ) {
        self.log(MockEvent::BindDescriptorSet { set });
    }

    fn push_constants(
        &self,
        _command_buffer: vk::CommandBuffer,
        _pipeline: &Self::Pipeline,
        data: &[u8],
    ) {
        self.log(MockEvent::PushConstants { len: data.len() });
    }

    fn bind_vertex_buffer(&self, _command_buffer: vk::CommandBuffer, buffer: &Self::Buffer) {
        self.log(MockEvent::BindVertexBuffer { id: buffer.id });
    }

    fn bind_index_buffer(&self, _command_buffer: vk::CommandBuffer, buffer: &Self::Buffer) {
        self.log(MockEvent::BindIndexBuffer { id: buffer.id });
    }

    fn draw(&self, _command_buffer: vk::CommandBuffer, vertex_count: u32, instance_count: u32) {
        self.log(MockEvent::Draw {
            vertex_count,
            instance_count,
        });
    }

    fn draw_indexed(&self, _command_buffer: vk::CommandBuffer, index_count: u32) {
        self.log(MockEvent::DrawIndexed { index_count });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BufferUsage;

    #[test]
    fn acquire_cycles_images_and_retires_slot() {
        let device = MockDevice::with_image_count(2);
        let mut swapchain = device.create_swapchain(Extent2D::new(64, 64), None).unwrap();
        let cmd = device.allocate_command_buffers(1).unwrap()[0];

        for expected in [0, 1, 0] {
            let AcquiredImage::Ready { image_index, .. } = swapchain.acquire_next_image(0).unwrap()
            else {
                panic!("expected an image");
            };
            assert_eq!(image_index, expected);
            device.begin_command_buffer(cmd).unwrap();
            device.end_command_buffer(cmd).unwrap();
            swapchain.submit_and_present(0, cmd, image_index).unwrap();
            assert_eq!(device.outstanding_frames(), 1);
        }
        assert_eq!(device.max_outstanding_frames(), 1);
    }

    #[test]
    fn out_of_range_slot_is_an_error() {
        let device = MockDevice::new();
        let mut swapchain = device.create_swapchain(Extent2D::new(8, 8), None).unwrap();
        let cmd = device.allocate_command_buffers(1).unwrap()[0];

        assert!(matches!(
            swapchain.acquire_next_image(MAX_FRAMES_IN_FLIGHT),
            Err(GpuError::InvalidState(_))
        ));
        assert!(matches!(
            swapchain.submit_and_present(MAX_FRAMES_IN_FLIGHT, cmd, 0),
            Err(GpuError::InvalidState(_))
        ));
        assert_eq!(device.count(|e| matches!(e, MockEvent::Submit { .. })), 0);
    }

    #[test]
    fn scripted_results_are_returned_in_order() {
        let device = MockDevice::new();
        device.script_acquire(AcquiredImage::Stale);
        device.script_present(SwapchainStatus::Suboptimal);
        let mut swapchain = device.create_swapchain(Extent2D::new(8, 8), None).unwrap();
        let cmd = device.allocate_command_buffers(1).unwrap()[0];

        assert_eq!(swapchain.acquire_next_image(0).unwrap(), AcquiredImage::Stale);
        assert!(matches!(
            swapchain.acquire_next_image(0).unwrap(),
            AcquiredImage::Ready { .. }
        ));
        assert_eq!(
            swapchain.submit_and_present(0, cmd, 0).unwrap(),
            SwapchainStatus::Suboptimal
        );
    }

    #[test]
    fn submitting_a_recording_buffer_fails() {
        let device = MockDevice::new();
        let mut swapchain = device.create_swapchain(Extent2D::new(8, 8), None).unwrap();
        let cmd = device.allocate_command_buffers(1).unwrap()[0];
        device.begin_command_buffer(cmd).unwrap();
        assert!(swapchain.submit_and_present(0, cmd, 0).is_err());
    }

    #[test]
    fn buffer_writes_are_bounds_checked() {
        let device = MockDevice::new();
        let buffer = device
            .create_buffer(&BufferDesc {
                size: 4,
                usage: BufferUsage::Uniform,
                name: "test",
            })
            .unwrap();
        device.write_buffer(&buffer, 0, &[1, 2, 3, 4]).unwrap();
        assert_eq!(buffer.contents(), vec![1, 2, 3, 4]);
        assert!(device.write_buffer(&buffer, 2, &[0; 4]).is_err());
    }

    #[test]
    fn swapchain_formats_follow_device() {
        let device = MockDevice::new();
        let first = device.create_swapchain(Extent2D::new(8, 8), None).unwrap();
        device.set_formats(RenderTargetFormats {
            color: vk::Format::R8G8B8A8_UNORM,
            depth: vk::Format::D32_SFLOAT,
        });
        let second = device
            .create_swapchain(Extent2D::new(8, 8), Some(&first))
            .unwrap();
        assert!(!first.compare_formats(&second));
        assert!(first.compare_formats(&first));
    }
}
