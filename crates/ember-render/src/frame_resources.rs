//! Per-frame uniform buffers and the descriptor sets that reference them.

use crate::error::{RenderError, Result};
use bytemuck::Pod;
use ember_gpu::{vk, BufferDesc, BufferUsage, DescriptorWrite, GraphicsDevice};
use std::marker::PhantomData;
use std::mem::size_of;

/// Identifies a family of descriptor sets (one per frame slot) in a
/// [`FrameResources`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorSetId(usize);

/// One uniform buffer of `T` per frame slot, plus descriptor sets binding it.
///
/// Everything is created at startup and reused every frame. Slot `i`'s buffer
/// may only be written once `begin_frame` has waited on slot `i`'s fence, so
/// the GPU is never reading what the CPU writes.
pub struct FrameResources<B: GraphicsDevice, T: Pod> {
    buffers: Vec<B::Buffer>,
    /// `sets[id][slot]`
    sets: Vec<Vec<vk::DescriptorSet>>,
    _marker: PhantomData<T>,
}

impl<B: GraphicsDevice, T: Pod> FrameResources<B, T> {
    /// Create a persistently mapped uniform buffer per slot.
    pub fn new(device: &B, frames_in_flight: usize) -> Result<Self> {
        let buffers = (0..frames_in_flight)
            .map(|slot| {
                device.create_buffer(&BufferDesc {
                    size: size_of::<T>() as u64,
                    usage: BufferUsage::Uniform,
                    name: &format!("frame_uniforms_{slot}"),
                })
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            buffers,
            sets: Vec::new(),
            _marker: PhantomData,
        })
    }

    /// Allocate one descriptor set per slot from `layout`, binding that slot's
    /// buffer at `binding` plus every write in `extra`.
    pub fn add_descriptor_sets(
        &mut self,
        device: &B,
        layout: &B::DescriptorSetLayout,
        binding: u32,
        extra: &[DescriptorWrite<'_, B>],
    ) -> Result<DescriptorSetId> {
        let mut sets = Vec::with_capacity(self.buffers.len());
        for buffer in &self.buffers {
            let mut writes = Vec::with_capacity(extra.len() + 1);
            writes.push(DescriptorWrite::UniformBuffer { binding, buffer });
            writes.extend_from_slice(extra);
            sets.push(device.allocate_descriptor_set(layout, &writes)?);
        }

        self.sets.push(sets);
        Ok(DescriptorSetId(self.sets.len() - 1))
    }

    pub fn descriptor_set(&self, slot: usize, id: DescriptorSetId) -> Result<vk::DescriptorSet> {
        let sets = self
            .sets
            .get(id.0)
            .ok_or(RenderError::UnknownDescriptorSet(id.0))?;
        sets.get(slot).copied().ok_or(RenderError::InvalidFrameSlot {
            slot,
            frames_in_flight: self.buffers.len(),
        })
    }

    pub fn buffer(&self, slot: usize) -> Result<&B::Buffer> {
        self.buffers.get(slot).ok_or(RenderError::InvalidFrameSlot {
            slot,
            frames_in_flight: self.buffers.len(),
        })
    }

    pub fn frames_in_flight(&self) -> usize {
        self.buffers.len()
    }

    /// Write `value` into slot `slot`'s buffer and flush it to the device.
    ///
    /// Must happen before recording any draw that binds this slot's sets.
    pub fn update(&self, device: &B, slot: usize, value: &T) -> Result<()> {
        let buffer = self.buffer(slot)?;
        device.write_buffer(buffer, 0, bytemuck::bytes_of(value))?;
        device.flush_buffer(buffer)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_gpu::mock::{MockDevice, MockEvent};
    use ember_gpu::DescriptorSetLayoutBuilder;

    fn layout(device: &MockDevice, with_texture: bool) -> ember_gpu::mock::MockDescriptorSetLayout {
        let mut builder =
            DescriptorSetLayoutBuilder::new().uniform_buffer(0, vk::ShaderStageFlags::ALL_GRAPHICS);
        if with_texture {
            builder = builder.sampled_image(1, vk::ShaderStageFlags::FRAGMENT);
        }
        device.create_descriptor_set_layout(&builder.build()).unwrap()
    }

    #[test]
    fn one_buffer_and_set_per_slot() {
        let device = MockDevice::new();
        let mut resources = FrameResources::<_, [f32; 4]>::new(&device, 2).unwrap();
        let global = resources
            .add_descriptor_sets(&device, &layout(&device, false), 0, &[])
            .unwrap();

        assert_eq!(resources.frames_in_flight(), 2);
        let set0 = resources.descriptor_set(0, global).unwrap();
        let set1 = resources.descriptor_set(1, global).unwrap();
        assert_ne!(set0, set1);
        assert!(resources.descriptor_set(2, global).is_err());
        assert_eq!(resources.buffer(0).unwrap().contents().len(), 16);

        let allocations: Vec<_> = device
            .events()
            .into_iter()
            .filter_map(|e| match e {
                MockEvent::AllocateDescriptorSet { buffers, .. } => Some(buffers),
                _ => None,
            })
            .collect();
        assert_eq!(
            allocations,
            vec![
                vec![resources.buffer(0).unwrap().id()],
                vec![resources.buffer(1).unwrap().id()]
            ]
        );
    }

    #[test]
    fn extra_writes_are_added_to_every_slot() {
        let device = MockDevice::new();
        let texture = device
            .create_texture(&ember_gpu::TextureDesc {
                width: 1,
                height: 1,
                pixels: &[255; 4],
                filter: vk::Filter::LINEAR,
                name: "white",
            })
            .unwrap();
        let mut resources = FrameResources::<_, [f32; 4]>::new(&device, 2).unwrap();
        resources
            .add_descriptor_sets(
                &device,
                &layout(&device, true),
                0,
                &[DescriptorWrite::CombinedImageSampler {
                    binding: 1,
                    texture: &texture,
                }],
            )
            .unwrap();

        let with_texture = device.count(|e| {
            matches!(e, MockEvent::AllocateDescriptorSet { textures, .. } if textures == &vec![texture.id()])
        });
        assert_eq!(with_texture, 2);
    }

    #[test]
    fn update_writes_then_flushes_the_slot_buffer() {
        let device = MockDevice::new();
        let resources = FrameResources::<_, [f32; 4]>::new(&device, 2).unwrap();
        device.clear_events();

        resources.update(&device, 1, &[1.0, 2.0, 3.0, 4.0]).unwrap();

        let id = resources.buffer(1).unwrap().id();
        assert_eq!(
            device.events(),
            vec![
                MockEvent::WriteBuffer { id, offset: 0, len: 16 },
                MockEvent::FlushBuffer { id },
            ]
        );
        assert_eq!(
            resources.buffer(1).unwrap().contents(),
            bytemuck::bytes_of(&[1.0f32, 2.0, 3.0, 4.0]).to_vec()
        );
        assert!(resources.update(&device, 2, &[0.0; 4]).is_err());
    }

    #[test]
    fn unknown_set_id_is_an_error() {
        let device = MockDevice::new();
        let resources = FrameResources::<_, [f32; 4]>::new(&device, 2).unwrap();
        assert!(matches!(
            resources.descriptor_set(0, DescriptorSetId(0)),
            Err(RenderError::UnknownDescriptorSet(0))
        ));
    }
}
