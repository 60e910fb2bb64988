//! Demo scene: two vases on a textured floor with orbiting point lights.

use std::f32::consts::TAU;
use std::path::PathBuf;

use glam::{Quat, Vec3};
use tracing::info;

use ember_app::{AppContext, EmberApp, FrameInfo, VulkanDevice};
use ember_core::constants::MAX_FRAMES_IN_FLIGHT;
use ember_core::Transform;
use ember_gpu::{
    vk, DescriptorSetLayoutBuilder, DescriptorWrite, GraphicsDevice, PipelineConfig,
    ShaderStages, VulkanDescriptorSetLayout,
};
use ember_input::{KeyCode, MovementController};
use ember_render::{
    checker_image, AssetRegistry, Camera, DescriptorSetId, FrameContext, FrameResources,
    GlobalUbo, MeshBuilder, Model, PointLightSystem, Scene, SimplePush, SimpleRenderSystem,
    TexturedRenderSystem, Vertex, WORLD_UP,
};
use ember_shaders::ShaderPair;

const NEAR_PLANE: f32 = 0.1;
const FAR_PLANE: f32 = 1000.0;

/// Radians per second the sun turns about `-Z`.
const SUN_SPEED: f32 = 0.25;

const LIGHT_INTENSITY: f32 = 0.2;
const LIGHT_RADIUS: f32 = 0.1;
const LIGHT_COLORS: [Vec3; 6] = [
    Vec3::new(1.0, 0.1, 0.1),
    Vec3::new(0.1, 0.1, 1.0),
    Vec3::new(0.1, 1.0, 0.1),
    Vec3::new(1.0, 1.0, 0.1),
    Vec3::new(0.1, 1.0, 1.0),
    Vec3::new(1.0, 1.0, 1.0),
];

/// Command line options.
#[derive(Debug, Clone, Default)]
pub struct DemoArgs {
    pub vsync: bool,
    /// `None` keeps the build-dependent default.
    pub validation: Option<bool>,
    pub texture: Option<PathBuf>,
}

impl DemoArgs {
    /// Parse options from the process arguments, ignoring unknown ones.
    pub fn from_args() -> Self {
        Self::parse(std::env::args().skip(1))
    }

    fn parse(args: impl IntoIterator<Item = String>) -> Self {
        let mut parsed = Self::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--vsync" => parsed.vsync = true,
                "--validation" => parsed.validation = Some(true),
                "--no-validation" => parsed.validation = Some(false),
                "--texture" => {
                    if let Some(path) = args.next() {
                        parsed.texture = Some(PathBuf::from(path));
                    }
                }
                _ => {}
            }
        }

        parsed
    }
}

const fn stages(pair: ShaderPair) -> ShaderStages<'static> {
    ShaderStages {
        vertex: pair.vertex,
        fragment: pair.fragment,
    }
}

/// Demo application state.
pub struct Demo {
    simple_system: SimpleRenderSystem<VulkanDevice>,
    textured_system: TexturedRenderSystem,
    point_light_system: PointLightSystem<VulkanDevice>,
    resources: FrameResources<VulkanDevice, GlobalUbo>,
    global_sets: DescriptorSetId,
    textured_sets: DescriptorSetId,
    assets: AssetRegistry<VulkanDevice>,
    _global_layout: VulkanDescriptorSetLayout,
    _textured_layout: VulkanDescriptorSetLayout,
    scene: Scene,
    camera: Camera,
    /// Transform the camera follows.
    viewer: Transform,
    controller: MovementController,
    ubo: GlobalUbo,
    cursor_captured: bool,
    frame_time: f32,
}

impl EmberApp for Demo {
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self> {
        let args = DemoArgs::from_args();
        let device = ctx.device();
        let target = ctx.renderer.render_target();

        let global_layout = device.create_descriptor_set_layout(
            &DescriptorSetLayoutBuilder::new()
                .uniform_buffer(0, vk::ShaderStageFlags::ALL_GRAPHICS)
                .build(),
        )?;
        let textured_layout = device.create_descriptor_set_layout(
            &DescriptorSetLayoutBuilder::new()
                .uniform_buffer(0, vk::ShaderStageFlags::ALL_GRAPHICS)
                .sampled_image(1, vk::ShaderStageFlags::FRAGMENT)
                .build(),
        )?;

        let mut assets = AssetRegistry::new();

        // Floor texture
        let floor_texture = match &args.texture {
            Some(path) => assets.load_texture(device, "floor", path)?,
            None => {
                let image = checker_image(256, 8, [40, 40, 48, 255], [200, 200, 210, 255]);
                assets.create_texture(
                    device,
                    "floor",
                    image.width(),
                    image.height(),
                    image.as_raw(),
                )?
            }
        };

        // Materials
        let simple = stages(ember_shaders::simple_shader());
        let textured = stages(ember_shaders::textured_shader());
        let default_material = assets.add_material(
            "default",
            device.create_pipeline(
                &PipelineConfig::builder()
                    .vertex_input(&Vertex::binding_descriptions(), &Vertex::attribute_descriptions())
                    .build(),
                &simple,
                &[&global_layout],
                SimplePush::SIZE,
                target,
            )?,
        );
        let textured_material = assets.add_material(
            "textured",
            TexturedRenderSystem::material_pipeline(device, &textured_layout, target, textured)?,
        );

        // Per-frame uniforms and descriptor sets
        let mut resources = FrameResources::new(device, MAX_FRAMES_IN_FLIGHT)?;
        let global_sets = resources.add_descriptor_sets(device, &global_layout, 0, &[])?;
        let textured_sets = resources.add_descriptor_sets(
            device,
            &textured_layout,
            0,
            &[DescriptorWrite::CombinedImageSampler {
                binding: 1,
                texture: assets.texture(floor_texture)?,
            }],
        )?;

        // Systems
        let simple_system = SimpleRenderSystem::new(device, &global_layout, target, simple)?;
        let point_light_system = PointLightSystem::new(
            device,
            &global_layout,
            target,
            stages(ember_shaders::point_light_shader()),
        )?;

        // Scene
        let flat_vase =
            assets.upload_mesh(device, "flat_vase", &MeshBuilder::vase(8, Vec3::splat(0.8)))?;
        let smooth_vase =
            assets.upload_mesh(device, "smooth_vase", &MeshBuilder::vase(48, Vec3::splat(0.8)))?;
        let floor = assets.upload_mesh(device, "floor", &MeshBuilder::quad(1.0, 4.0, Vec3::ONE))?;

        let mut scene = Scene::new();
        for (mesh, x) in [(flat_vase, -0.5), (smooth_vase, 0.5)] {
            let vase = scene.spawn();
            vase.model = Some(Model {
                mesh,
                material: default_material,
            });
            vase.transform.translation = Vec3::new(x, 0.5, 0.0);
            vase.transform.scale = Vec3::new(3.0, 1.5, 3.0);
        }

        let floor_object = scene.spawn();
        floor_object.model = Some(Model {
            mesh: floor,
            material: textured_material,
        });
        floor_object.texture = Some(floor_texture);
        floor_object.transform.translation = Vec3::new(0.0, 0.5, 0.0);
        floor_object.transform.scale = Vec3::new(3.0, 1.0, 3.0);

        for (i, color) in LIGHT_COLORS.into_iter().enumerate() {
            let id = scene.spawn_point_light(LIGHT_INTENSITY, LIGHT_RADIUS, color);
            let angle = i as f32 * TAU / LIGHT_COLORS.len() as f32;
            if let Some(light) = scene.get_mut(id) {
                light.transform.translation =
                    Quat::from_axis_angle(Vec3::NEG_Y, angle) * Vec3::new(-1.0, -1.0, -1.0);
            }
        }
        info!("Scene ready with {} objects", scene.len());

        let mut camera = Camera::new();
        camera.set_view_target(Vec3::new(-1.0, -2.0, 2.0), Vec3::new(0.0, 0.0, 2.5), WORLD_UP);

        let viewer = Transform::from_translation(Vec3::new(0.0, 0.0, -2.5));

        ctx.window.set_cursor_captured(true);

        Ok(Self {
            simple_system,
            textured_system: TexturedRenderSystem::new(),
            point_light_system,
            resources,
            global_sets,
            textured_sets,
            assets,
            _global_layout: global_layout,
            _textured_layout: textured_layout,
            scene,
            camera,
            viewer,
            controller: MovementController::new(),
            ubo: GlobalUbo::default(),
            cursor_captured: true,
            frame_time: 0.0,
        })
    }

    fn update(&mut self, ctx: &mut AppContext, dt: f32) -> anyhow::Result<()> {
        self.frame_time = dt;

        if ctx.input.is_key_just_pressed(KeyCode::Escape) {
            self.cursor_captured = !self.cursor_captured;
            ctx.window.set_cursor_captured(self.cursor_captured);
        }

        if self.cursor_captured {
            self.controller
                .move_in_plane_xz(&ctx.input, dt, &mut self.viewer);
        }
        self.camera
            .set_view_yxz(self.viewer.translation, self.viewer.rotation);
        self.camera.set_perspective_projection(
            self.controller.fov_radians(),
            ctx.aspect_ratio(),
            NEAR_PLANE,
            FAR_PLANE,
        );

        self.ubo.set_camera(&self.camera);
        self.point_light_system
            .update(dt, &mut self.scene, &mut self.ubo)?;

        let sun = Quat::from_axis_angle(Vec3::NEG_Z, dt * SUN_SPEED);
        self.ubo.sun_direction = (sun * self.ubo.sun_direction.truncate()).extend(0.0);

        Ok(())
    }

    fn render(&mut self, ctx: &AppContext, frame: &FrameInfo) -> anyhow::Result<()> {
        let device = ctx.device();
        self.resources.update(device, frame.frame_index, &self.ubo)?;

        let frame_ctx = FrameContext {
            frame_index: frame.frame_index,
            frame_time: self.frame_time,
            command_buffer: frame.command_buffer,
            camera: &self.camera,
            global_descriptor_set: self
                .resources
                .descriptor_set(frame.frame_index, self.global_sets)?,
            textured_descriptor_set: Some(
                self.resources
                    .descriptor_set(frame.frame_index, self.textured_sets)?,
            ),
            scene: &self.scene,
            assets: &self.assets,
            device,
        };

        // Transparent billboards last
        self.simple_system.render(&frame_ctx)?;
        self.textured_system.render(&frame_ctx)?;
        self.point_light_system.render(&frame_ctx)?;

        Ok(())
    }

    fn cleanup(&mut self, ctx: &mut AppContext) {
        ctx.window.set_cursor_captured(false);
        info!("Demo finished after {} frames", ctx.frame_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> DemoArgs {
        DemoArgs::parse(list.iter().map(|s| (*s).to_string()))
    }

    #[test]
    fn defaults_without_flags() {
        let parsed = args(&[]);
        assert!(!parsed.vsync);
        assert_eq!(parsed.validation, None);
        assert_eq!(parsed.texture, None);
    }

    #[test]
    fn parses_flags_and_texture_path() {
        let parsed = args(&["--vsync", "--texture", "floor.png", "--no-validation"]);
        assert!(parsed.vsync);
        assert_eq!(parsed.validation, Some(false));
        assert_eq!(parsed.texture, Some(PathBuf::from("floor.png")));
    }

    #[test]
    fn texture_flag_without_value_is_ignored() {
        let parsed = args(&["--validation", "--texture"]);
        assert_eq!(parsed.validation, Some(true));
        assert_eq!(parsed.texture, None);
    }

    #[test]
    fn lights_fit_in_uniform_block() {
        assert!(LIGHT_COLORS.len() <= ember_core::constants::MAX_LIGHTS);
    }
}
