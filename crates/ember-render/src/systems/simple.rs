use crate::error::Result;
use crate::frame::FrameContext;
use crate::mesh::Vertex;
use crate::scene::Components;
use bytemuck::{Pod, Zeroable};
use ember_gpu::{GraphicsDevice, PipelineConfig, RenderTargetFormats, ShaderStages};
use glam::Mat4;

/// Push constants for lit meshes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct SimplePush {
    pub model_matrix: Mat4,
    /// Only the upper 3x3 is used.
    pub normal_matrix: Mat4,
}

impl SimplePush {
    pub const SIZE: u32 = std::mem::size_of::<Self>() as u32;
}

/// Draws untextured models with the default lit pipeline.
pub struct SimpleRenderSystem<B: GraphicsDevice> {
    pipeline: B::Pipeline,
}

impl<B: GraphicsDevice> SimpleRenderSystem<B> {
    pub fn new(
        device: &B,
        global_layout: &B::DescriptorSetLayout,
        target: RenderTargetFormats,
        shaders: ShaderStages<'_>,
    ) -> Result<Self> {
        let config = PipelineConfig::builder()
            .vertex_input(&Vertex::binding_descriptions(), &Vertex::attribute_descriptions())
            .build();
        let pipeline =
            device.create_pipeline(&config, &shaders, &[global_layout], SimplePush::SIZE, target)?;
        Ok(Self { pipeline })
    }

    pub const fn pipeline(&self) -> &B::Pipeline {
        &self.pipeline
    }

    /// Record a draw for every object that has a model but no texture.
    pub fn render(&self, frame: &FrameContext<'_, B>) -> Result<()> {
        let device = frame.device;
        let cmd = frame.command_buffer;

        device.bind_pipeline(cmd, &self.pipeline);
        device.bind_descriptor_set(cmd, &self.pipeline, frame.global_descriptor_set);

        for id in frame.scene.ids_with(Components::MODEL) {
            let Some(object) = frame.scene.get(id) else {
                continue;
            };
            let Some(model) = object.model else {
                continue;
            };
            if object.texture.is_some() {
                continue;
            }

            let push = SimplePush {
                model_matrix: object.transform.matrix(),
                normal_matrix: object.transform.normal_matrix(),
            };
            device.push_constants(cmd, &self.pipeline, bytemuck::bytes_of(&push));

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
    use glam::Vec3;

    #[test]
    fn pipeline_uses_vertex_input_and_matrix_push() {
        let fx = Fixture::new();
        let system =
            SimpleRenderSystem::new(&fx.device, &fx.layout, Fixture::target(), SHADERS).unwrap();
        assert_eq!(SimplePush::SIZE, 128);
        assert_eq!(system.pipeline().push_constant_size, 128);
        assert_eq!(system.pipeline().config.vertex_attributes().len(), 4);
        assert_eq!(system.pipeline().target, Fixture::target());
    }

    #[test]
    fn draws_untextured_models_only() {
        let mut fx = Fixture::new();
        let system =
            SimpleRenderSystem::new(&fx.device, &fx.layout, Fixture::target(), SHADERS).unwrap();
        let cube = fx
            .assets
            .upload_mesh(&fx.device, "cube", &MeshBuilder::cube(Vec3::ONE))
            .unwrap();
        let pipeline = fx
            .device
            .create_pipeline(&PipelineConfig::default(), &SHADERS, &[], 0, Fixture::target())
            .unwrap();
        let material = fx.assets.add_material("default", pipeline);
        let texture = fx
            .assets
            .create_texture(&fx.device, "white", 1, 1, &[255; 4])
            .unwrap();

        fx.scene.spawn().model = Some(Model {
            mesh: cube,
            material,
        });
        let textured = fx.scene.spawn();
        textured.model = Some(Model {
            mesh: cube,
            material,
        });
        textured.texture = Some(texture);
        fx.scene.spawn_point_light(1.0, 0.1, Vec3::ONE);

        fx.device.clear_events();
        system.render(&fx.frame(0)).unwrap();

        assert_eq!(fx.count(|e| matches!(e, MockEvent::BindPipeline { .. })), 1);
        assert_eq!(fx.count(|e| matches!(e, MockEvent::PushConstants { len: 128 })), 1);
        assert_eq!(fx.count(|e| *e == MockEvent::DrawIndexed { index_count: 36 }), 1);
    }

    #[test]
    fn missing_mesh_is_an_error() {
        let mut fx = Fixture::new();
        let system =
            SimpleRenderSystem::new(&fx.device, &fx.layout, Fixture::target(), SHADERS).unwrap();
        let mut other = crate::assets::AssetRegistry::<ember_gpu::mock::MockDevice>::new();
        let mesh = other
            .upload_mesh(&fx.device, "cube", &MeshBuilder::cube(Vec3::ONE))
            .unwrap();
        let pipeline = fx
            .device
            .create_pipeline(&PipelineConfig::default(), &SHADERS, &[], 0, Fixture::target())
            .unwrap();
        let material = other.add_material("default", pipeline);
        fx.scene.spawn().model = Some(Model { mesh, material });

        assert!(system.render(&fx.frame(0)).is_err());
    }
}
