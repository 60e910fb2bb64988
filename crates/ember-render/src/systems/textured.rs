use crate::assets::MaterialHandle;
use crate::error::Result;
use crate::frame::FrameContext;
use crate::mesh::Vertex;
use crate::scene::Components;
use crate::systems::SimplePush;
use ember_gpu::{GraphicsDevice, PipelineConfig, RenderTargetFormats, ShaderStages};

/// Draws textured models using the pipeline registered as their material.
///
/// The texture itself comes from the frame's textured descriptor set, which is
/// built once at startup.
#[derive(Debug, Default, Clone, Copy)]
pub struct TexturedRenderSystem;

impl TexturedRenderSystem {
    pub const fn new() -> Self {
        Self
    }

    /// Build the pipeline to register as the "textured" material.
    ///
    /// `textured_layout` must have the global uniform buffer at binding 0 and a
    /// combined image sampler at binding 1.
    pub fn material_pipeline<B: GraphicsDevice>(
        device: &B,
        textured_layout: &B::DescriptorSetLayout,
        target: RenderTargetFormats,
        shaders: ShaderStages<'_>,
    ) -> Result<B::Pipeline> {
        let config = PipelineConfig::builder()
            .vertex_input(&Vertex::binding_descriptions(), &Vertex::attribute_descriptions())
            .build();
        Ok(device.create_pipeline(
            &config,
            &shaders,
            &[textured_layout],
            SimplePush::SIZE,
            target,
        )?)
    }

    /// Record draws for every object with both a model and a texture.
    ///
    /// Does nothing if the frame has no textured descriptor set.
    pub fn render<B: GraphicsDevice>(&self, frame: &FrameContext<'_, B>) -> Result<()> {
        let Some(textured_set) = frame.textured_descriptor_set else {
            return Ok(());
        };
        let device = frame.device;
        let cmd = frame.command_buffer;
        let mut bound: Option<MaterialHandle> = None;

        for id in frame.scene.ids_with(Components::MODEL | Components::TEXTURE) {
            let Some(object) = frame.scene.get(id) else {
                continue;
            };
            let Some(model) = object.model else {
                continue;
            };

            let pipeline = frame.assets.material(model.material)?;
            if bound != Some(model.material) {
                device.bind_pipeline(cmd, pipeline);
                device.bind_descriptor_set(cmd, pipeline, textured_set);
                bound = Some(model.material);
            }

            let push = SimplePush {
                model_matrix: object.transform.matrix(),
                normal_matrix: object.transform.normal_matrix(),
            };
            device.push_constants(cmd, pipeline, bytemuck::bytes_of(&push));

            let mesh = frame.assets.mesh(model.mesh)?;
            mesh.bind(device, cmd);
            mesh.draw(device, cmd);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::MeshBuilder;
    use crate::scene::Model;
    use crate::systems::test_support::{Fixture, SHADERS};
    use ember_gpu::mock::MockEvent;
    use ember_gpu::DescriptorWrite;
    use glam::Vec3;

    fn textured_scene(fx: &mut Fixture, objects: usize) -> ember_gpu::vk::DescriptorSet {
        let floor = fx
            .assets
            .upload_mesh(&fx.device, "floor", &MeshBuilder::quad(3.0, 4.0, Vec3::ONE))
            .unwrap();
        let texture = fx
            .assets
            .create_texture(&fx.device, "checker", 2, 2, &[128; 16])
            .unwrap();
        let pipeline = TexturedRenderSystem::material_pipeline(
            &fx.device,
            &fx.layout,
            Fixture::target(),
            SHADERS,
        )
        .unwrap();
        let material = fx.assets.add_material("textured", pipeline);

        for _ in 0..objects {
            let object = fx.scene.spawn();
            object.model = Some(Model {
                mesh: floor,
                material,
            });
            object.texture = Some(texture);
        }

        let texture = fx.assets.texture(texture).unwrap();
        fx.device
            .allocate_descriptor_set(
                &fx.layout,
                &[
                    DescriptorWrite::UniformBuffer {
                        binding: 0,
                        buffer: fx.resources.buffer(0).unwrap(),
                    },
                    DescriptorWrite::CombinedImageSampler {
                        binding: 1,
                        texture,
                    },
                ],
            )
            .unwrap()
    }

    #[test]
    fn skipped_without_textured_set() {
        let mut fx = Fixture::new();
        textured_scene(&mut fx, 1);
        fx.device.clear_events();

        TexturedRenderSystem::new().render(&fx.frame(0)).unwrap();
        assert!(fx.device.events().is_empty());
    }

    #[test]
    fn binds_material_once_for_shared_material() {
        let mut fx = Fixture::new();
        let set = textured_scene(&mut fx, 3);
        let untextured = fx.scene.iter().find_map(|o| o.model);
        fx.scene.spawn().model = untextured;
        fx.device.clear_events();

        let mut frame = fx.frame(0);
        frame.textured_descriptor_set = Some(set);
        TexturedRenderSystem::new().render(&frame).unwrap();

        assert_eq!(fx.count(|e| matches!(e, MockEvent::BindPipeline { .. })), 1);
        assert_eq!(fx.count(|e| *e == MockEvent::BindDescriptorSet { set }), 1);
        assert_eq!(fx.count(|e| matches!(e, MockEvent::PushConstants { len: 128 })), 3);
        assert_eq!(fx.count(|e| matches!(e, MockEvent::DrawIndexed { index_count: 6 })), 3);
    }
}
