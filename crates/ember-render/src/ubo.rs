//! Global uniform block shared by every pipeline.

use crate::camera::Camera;
use bytemuck::{Pod, Zeroable};
use ember_core::constants::MAX_LIGHTS;
use glam::{Mat4, Vec4};

/// One point light as seen by the shaders.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PointLightUbo {
    /// World position, `w` ignored.
    pub position: Vec4,
    /// Colour, `w` is intensity.
    pub color: Vec4,
}

/// Per-frame uniform data at set 0, binding 0 (std140 compatible).
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct GlobalUbo {
    pub projection: Mat4,
    pub view: Mat4,
    pub inverse_view: Mat4,
    /// `w` is intensity.
    pub ambient_light_color: Vec4,
    pub fog_color: Vec4,
    /// `x` = fog start, `y` = fog end.
    pub fog_distances: Vec4,
    pub sun_direction: Vec4,
    /// `w` is intensity.
    pub sun_color: Vec4,
    pub point_lights: [PointLightUbo; MAX_LIGHTS],
    pub num_lights: i32,
    _padding: [i32; 3],
}

impl Default for GlobalUbo {
    fn default() -> Self {
        Self {
            projection: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            inverse_view: Mat4::IDENTITY,
            ambient_light_color: Vec4::new(1.0, 1.0, 1.0, 0.02),
            fog_color: Vec4::new(0.63, 0.4, 0.0, 1.0),
            fog_distances: Vec4::new(50.0, 70.0, 0.0, 0.0),
            sun_direction: Vec4::new(0.0, -10.0, 0.0, 0.0),
            sun_color: Vec4::new(1.0, 1.0, 1.0, 0.5),
            point_lights: [PointLightUbo::default(); MAX_LIGHTS],
            num_lights: 0,
            _padding: [0; 3],
        }
    }
}

impl GlobalUbo {
    /// Copy the camera matrices.
    pub fn set_camera(&mut self, camera: &Camera) {
        self.projection = camera.projection();
        self.view = camera.view();
        self.inverse_view = camera.inverse_view();
    }

    /// Active point lights.
    pub fn lights(&self) -> &[PointLightUbo] {
        let count = usize::try_from(self.num_lights).unwrap_or(0).min(MAX_LIGHTS);
        &self.point_lights[..count]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    #[test]
    fn layout_matches_std140_block() {
        assert_eq!(size_of::<PointLightUbo>(), 32);
        assert_eq!(offset_of!(GlobalUbo, ambient_light_color), 192);
        assert_eq!(offset_of!(GlobalUbo, fog_color), 208);
        assert_eq!(offset_of!(GlobalUbo, sun_direction), 240);
        assert_eq!(offset_of!(GlobalUbo, point_lights), 272);
        assert_eq!(offset_of!(GlobalUbo, num_lights), 592);
        assert_eq!(size_of::<GlobalUbo>(), 608);
    }

    #[test]
    fn defaults() {
        let ubo = GlobalUbo::default();
        assert_eq!(ubo.ambient_light_color, Vec4::new(1.0, 1.0, 1.0, 0.02));
        assert_eq!(ubo.fog_distances.x, 50.0);
        assert_eq!(ubo.fog_distances.y, 70.0);
        assert_eq!(ubo.sun_direction, Vec4::new(0.0, -10.0, 0.0, 0.0));
        assert!(ubo.lights().is_empty());
    }
}
