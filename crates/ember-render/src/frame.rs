//! Per-frame context handed to render systems.

use crate::assets::AssetRegistry;
use crate::camera::Camera;
use crate::scene::Scene;
use ember_gpu::{vk, GraphicsDevice};

/// Everything a render system needs to record one frame.
///
/// Borrowed for the duration of the frame only.
pub struct FrameContext<'a, B: GraphicsDevice> {
    /// Frame slot in `[0, MAX_FRAMES_IN_FLIGHT)`.
    pub frame_index: usize,
    /// Seconds since the previous frame.
    pub frame_time: f32,
    pub command_buffer: vk::CommandBuffer,
    pub camera: &'a Camera,
    /// Slot's set with the global uniform buffer at binding 0.
    pub global_descriptor_set: vk::DescriptorSet,
    /// Slot's set with the global uniform buffer and a texture sampler.
    pub textured_descriptor_set: Option<vk::DescriptorSet>,
    pub scene: &'a Scene,
    pub assets: &'a AssetRegistry<B>,
    pub device: &'a B,
}
