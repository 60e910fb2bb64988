//! Render systems: each owns (or looks up) a pipeline and records draws for
//! one kind of scene object.

mod point_light;
mod simple;
mod textured;

pub use point_light::{PointLightPush, PointLightSystem};
pub use simple::{SimplePush, SimpleRenderSystem};
pub use textured::TexturedRenderSystem;

#[cfg(test)]
pub(crate) mod test_support {
    use crate::assets::AssetRegistry;
    use crate::camera::Camera;
    use crate::frame::FrameContext;
    use crate::frame_resources::{DescriptorSetId, FrameResources};
    use crate::scene::Scene;
    use crate::ubo::GlobalUbo;
    use ember_gpu::mock::{MockDescriptorSetLayout, MockDevice, MockEvent, MOCK_FORMATS};
    use ember_gpu::{vk, DescriptorSetLayoutBuilder, GraphicsDevice, ShaderStages};

    pub const SHADERS: ShaderStages<'static> = ShaderStages {
        vertex: &[0x0723_0203],
        fragment: &[0x0723_0203],
    };

    /// Device, global layout and per-slot resources for system tests.
    pub struct Fixture {
        pub device: MockDevice,
        pub layout: MockDescriptorSetLayout,
        pub resources: FrameResources<MockDevice, GlobalUbo>,
        pub global: DescriptorSetId,
        pub assets: AssetRegistry<MockDevice>,
        pub scene: Scene,
        pub camera: Camera,
        pub command_buffer: vk::CommandBuffer,
    }

    impl Fixture {
        pub fn new() -> Self {
            let device = MockDevice::new();
            let layout = device
                .create_descriptor_set_layout(
                    &DescriptorSetLayoutBuilder::new()
                        .uniform_buffer(0, vk::ShaderStageFlags::ALL_GRAPHICS)
                        .sampled_image(1, vk::ShaderStageFlags::FRAGMENT)
                        .build(),
                )
                .unwrap();
            let mut resources = FrameResources::new(&device, 2).unwrap();
            let global = resources
                .add_descriptor_sets(&device, &layout, 0, &[])
                .unwrap();
            let command_buffer = device.allocate_command_buffers(1).unwrap()[0];
            Self {
                device,
                layout,
                resources,
                global,
                assets: AssetRegistry::new(),
                scene: Scene::new(),
                camera: Camera::new(),
                command_buffer,
            }
        }

        pub const fn target() -> ember_gpu::RenderTargetFormats {
            MOCK_FORMATS
        }

        pub fn frame(&self, slot: usize) -> FrameContext<'_, MockDevice> {
            FrameContext {
                frame_index: slot,
                frame_time: 0.016,
                command_buffer: self.command_buffer,
                camera: &self.camera,
                global_descriptor_set: self.resources.descriptor_set(slot, self.global).unwrap(),
                textured_descriptor_set: None,
                scene: &self.scene,
                assets: &self.assets,
                device: &self.device,
            }
        }

        pub fn count(&self, pred: impl Fn(&MockEvent) -> bool) -> usize {
            self.device.count(pred)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{Fixture, SHADERS};
    use super::*;
    use crate::mesh::MeshBuilder;
    use crate::scene::Model;
    use crate::ubo::GlobalUbo;
    use ember_gpu::mock::MockEvent;
    use ember_gpu::GraphicsDevice;
    use glam::Vec3;

    #[test]
    fn uniform_flush_precedes_draws_of_the_frame() {
        let mut fx = Fixture::new();
        let simple =
            SimpleRenderSystem::new(&fx.device, &fx.layout, Fixture::target(), SHADERS).unwrap();
        let lights =
            PointLightSystem::new(&fx.device, &fx.layout, Fixture::target(), SHADERS).unwrap();

        let mesh = fx
            .assets
            .upload_mesh(&fx.device, "cube", &MeshBuilder::cube(Vec3::ONE))
            .unwrap();
        let pipeline = fx
            .device
            .create_pipeline(
                &ember_gpu::PipelineConfig::default(),
                &SHADERS,
                &[&fx.layout],
                0,
                Fixture::target(),
            )
            .unwrap();
        let material = fx.assets.add_material("default", pipeline);
        fx.scene.spawn().model = Some(Model { mesh, material });
        fx.scene.spawn_point_light(0.2, 0.1, Vec3::ONE);

        for slot in [0, 1, 0] {
            fx.device.clear_events();
            let mut ubo = GlobalUbo::default();
            lights.update(0.016, &mut fx.scene, &mut ubo).unwrap();
            ubo.set_camera(&fx.camera);
            fx.resources.update(&fx.device, slot, &ubo).unwrap();

            let frame = fx.frame(slot);
            simple.render(&frame).unwrap();
            lights.render(&frame).unwrap();

            let events = fx.device.events();
            let buffer_id = fx.resources.buffer(slot).unwrap().id();
            let flush = events
                .iter()
                .position(|e| *e == MockEvent::FlushBuffer { id: buffer_id })
                .unwrap();
            let first_draw = events
                .iter()
                .position(|e| {
                    matches!(e, MockEvent::Draw { .. } | MockEvent::DrawIndexed { .. })
                })
                .unwrap();
            assert!(flush < first_draw);
            assert_eq!(
                events
                    .iter()
                    .filter(|e| matches!(e, MockEvent::Draw { .. } | MockEvent::DrawIndexed { .. }))
                    .count(),
                2
            );
        }
    }
}
