use crate::error::{RenderError, Result};
use crate::frame::FrameContext;
use crate::scene::{Components, ObjectId, Scene};
use crate::ubo::{GlobalUbo, PointLightUbo};
use bytemuck::{Pod, Zeroable};
use ember_core::constants::MAX_LIGHTS;
use ember_gpu::{BlendMode, GraphicsDevice, PipelineConfig, RenderTargetFormats, ShaderStages};
use glam::{Mat4, Vec3, Vec4};

/// Push constants for one light billboard.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct PointLightPush {
    pub position: Vec4,
    /// `w` is intensity.
    pub color: Vec4,
    pub radius: f32,
    _padding: [f32; 3],
}

impl PointLightPush {
    pub const SIZE: u32 = std::mem::size_of::<Self>() as u32;

    pub const fn new(position: Vec4, color: Vec4, radius: f32) -> Self {
        Self {
            position,
            color,
            radius,
            _padding: [0.0; 3],
        }
    }
}

/// Animates point lights, feeds them to the global uniform block and draws
/// them as camera-facing billboards.
pub struct PointLightSystem<B: GraphicsDevice> {
    pipeline: B::Pipeline,
}

impl<B: GraphicsDevice> PointLightSystem<B> {
    pub fn new(
        device: &B,
        global_layout: &B::DescriptorSetLayout,
        target: RenderTargetFormats,
        shaders: ShaderStages<'_>,
    ) -> Result<Self> {
        // Billboard corners are generated in the vertex shader
        let config = PipelineConfig::builder().blend(BlendMode::Alpha).build();
        let pipeline = device.create_pipeline(
            &config,
            &shaders,
            &[global_layout],
            PointLightPush::SIZE,
            target,
        )?;
        Ok(Self { pipeline })
    }

    pub const fn pipeline(&self) -> &B::Pipeline {
        &self.pipeline
    }

    /// Rotate every light about `-Y` by `frame_time` radians and copy the
    /// lights into `ubo`.
    ///
    /// Fails with [`RenderError::TooManyLights`] before touching the scene or
    /// `ubo` if there are more than [`MAX_LIGHTS`] lights.
    #[allow(clippy::unused_self)]
    pub fn update(&self, frame_time: f32, scene: &mut Scene, ubo: &mut GlobalUbo) -> Result<()> {
        let ids = scene.ids_with(Components::POINT_LIGHT);
        if ids.len() > MAX_LIGHTS {
            return Err(RenderError::TooManyLights {
                count: ids.len(),
                max: MAX_LIGHTS,
            });
        }

        let rotation = Mat4::from_axis_angle(Vec3::NEG_Y, frame_time);
        for (slot, id) in ids.iter().enumerate() {
            let Some(object) = scene.get_mut(*id) else {
                continue;
            };
            let Some(light) = object.point_light else {
                continue;
            };

            object.transform.translation = rotation.transform_point3(object.transform.translation);
            ubo.point_lights[slot] = PointLightUbo {
                position: object.transform.translation.extend(1.0),
                color: object.color.extend(light.intensity),
            };
        }
        // Bounded by MAX_LIGHTS above
        ubo.num_lights = ids.len() as i32;

        Ok(())
    }

    /// Draw every light, farthest from the camera first.
    pub fn render(&self, frame: &FrameContext<'_, B>) -> Result<()> {
        let device = frame.device;
        let cmd = frame.command_buffer;

        device.bind_pipeline(cmd, &self.pipeline);
        device.bind_descriptor_set(cmd, &self.pipeline, frame.global_descriptor_set);

        for id in back_to_front(frame.scene, frame.camera.position()) {
            let Some(object) = frame.scene.get(id) else {
                continue;
            };
            let Some(light) = object.point_light else {
                continue;
            };

            let push = PointLightPush::new(
                object.transform.translation.extend(1.0),
                object.color.extend(light.intensity),
                object.transform.scale.x,
            );
            device.push_constants(cmd, &self.pipeline, bytemuck::bytes_of(&push));
            device.draw(cmd, 6, 1);
        }

        Ok(())
    }
}

/// Light ids sorted by descending squared distance to `eye`.
pub(crate) fn back_to_front(scene: &Scene, eye: Vec3) -> Vec<ObjectId> {
    let mut lights: Vec<(f32, ObjectId)> = scene
        .ids_with(Components::POINT_LIGHT)
        .into_iter()
        .filter_map(|id| {
            scene
                .get(id)
                .map(|o| (o.transform.translation.distance_squared(eye), id))
        })
        .collect();
    lights.sort_by(|a, b| b.0.total_cmp(&a.0));
    lights.into_iter().map(|(_, id)| id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::systems::test_support::{Fixture, SHADERS};
    use approx::assert_relative_eq;
    use ember_gpu::mock::MockEvent;
    use std::f32::consts::{FRAC_PI_2, TAU};

    fn system(fx: &Fixture) -> PointLightSystem<ember_gpu::mock::MockDevice> {
        PointLightSystem::new(&fx.device, &fx.layout, Fixture::target(), SHADERS).unwrap()
    }

    #[test]
    fn pipeline_blends_without_vertex_input() {
        let fx = Fixture::new();
        let lights = system(&fx);
        assert_eq!(PointLightPush::SIZE, 48);
        assert_eq!(lights.pipeline().config.blend(), BlendMode::Alpha);
        assert!(lights.pipeline().config.vertex_bindings().is_empty());
        assert_eq!(lights.pipeline().push_constant_size, 48);
    }

    #[test]
    fn update_rotates_about_world_up_and_fills_ubo() {
        let mut fx = Fixture::new();
        let lights = system(&fx);
        let id = fx.scene.spawn_point_light(0.2, 0.1, Vec3::new(1.0, 0.5, 0.25));
        fx.scene.get_mut(id).unwrap().transform.translation = Vec3::X;

        let mut ubo = GlobalUbo::default();
        lights.update(FRAC_PI_2, &mut fx.scene, &mut ubo).unwrap();

        let position = fx.scene.get(id).unwrap().transform.translation;
        assert_relative_eq!(position.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(position.y, 0.0, epsilon = 1e-6);
        assert_relative_eq!(position.z, 1.0, epsilon = 1e-6);

        assert_eq!(ubo.num_lights, 1);
        assert_eq!(ubo.lights()[0].position, position.extend(1.0));
        assert_eq!(ubo.lights()[0].color, Vec4::new(1.0, 0.5, 0.25, 0.2));
    }

    #[test]
    fn full_turn_returns_lights_to_start() {
        let mut fx = Fixture::new();
        let lights = system(&fx);
        let start = Vec3::new(-1.0, -1.0, -1.0);
        let id = fx.scene.spawn_point_light(0.2, 0.1, Vec3::ONE);
        fx.scene.get_mut(id).unwrap().transform.translation = start;

        let mut ubo = GlobalUbo::default();
        for _ in 0..4 {
            lights.update(TAU / 4.0, &mut fx.scene, &mut ubo).unwrap();
        }
        let position = fx.scene.get(id).unwrap().transform.translation;
        assert_relative_eq!(position.distance(start), 0.0, epsilon = 1e-5);
    }

    #[test]
    fn ten_lights_fit() {
        let mut fx = Fixture::new();
        let lights = system(&fx);
        for _ in 0..MAX_LIGHTS {
            fx.scene.spawn_point_light(0.2, 0.1, Vec3::ONE);
        }
        let mut ubo = GlobalUbo::default();
        lights.update(0.0, &mut fx.scene, &mut ubo).unwrap();
        assert_eq!(ubo.lights().len(), MAX_LIGHTS);
    }

    #[test]
    fn eleven_lights_fail_without_partial_writes() {
        let mut fx = Fixture::new();
        let lights = system(&fx);
        for i in 0..=MAX_LIGHTS {
            let id = fx.scene.spawn_point_light(0.2, 0.1, Vec3::ONE);
            fx.scene.get_mut(id).unwrap().transform.translation = Vec3::new(i as f32, 0.0, 1.0);
        }
        let before: Vec<_> = fx.scene.iter().map(|o| o.transform).collect();

        let mut ubo = GlobalUbo::default();
        let result = lights.update(1.0, &mut fx.scene, &mut ubo);
        assert!(matches!(
            result,
            Err(RenderError::TooManyLights { count: 11, max: 10 })
        ));

        assert_eq!(ubo.num_lights, 0);
        assert!(ubo
            .point_lights
            .iter()
            .all(|l| *l == PointLightUbo::default()));
        let after: Vec<_> = fx.scene.iter().map(|o| o.transform).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn lights_sorted_back_to_front() {
        let mut scene = Scene::new();
        let mut spawn = |z: f32| {
            let id = scene.spawn_point_light(0.2, 0.1, Vec3::ONE);
            scene.get_mut(id).unwrap().transform.translation = Vec3::new(0.0, 0.0, z);
            id
        };
        let near = spawn(1.0);
        let far = spawn(-3.0);
        let mid = spawn(2.0);

        assert_eq!(back_to_front(&scene, Vec3::ZERO), vec![far, mid, near]);
    }

    #[test]
    fn render_draws_one_billboard_per_light() {
        let mut fx = Fixture::new();
        let lights = system(&fx);
        for _ in 0..6 {
            fx.scene.spawn_point_light(0.2, 0.1, Vec3::ONE);
        }
        fx.scene.spawn();
        fx.device.clear_events();

        lights.render(&fx.frame(1)).unwrap();

        assert_eq!(
            fx.count(|e| *e
                == MockEvent::Draw {
                    vertex_count: 6,
                    instance_count: 1
                }),
            6
        );
        assert_eq!(fx.count(|e| matches!(e, MockEvent::PushConstants { len: 48 })), 6);
        assert_eq!(fx.count(|e| matches!(e, MockEvent::BindPipeline { .. })), 1);
    }
}
