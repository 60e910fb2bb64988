//! First-person movement in the XZ plane.

use ember_core::Transform;
use glam::Vec3;
use std::f32::consts::TAU;
use winit::keyboard::KeyCode;

use crate::input::InputManager;

/// Keys driving the [`MovementController`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyMappings {
    pub move_left: KeyCode,
    pub move_right: KeyCode,
    pub move_forward: KeyCode,
    pub move_backward: KeyCode,
    pub move_up: KeyCode,
    pub move_down: KeyCode,
    pub sprint: KeyCode,
}

impl Default for KeyMappings {
    fn default() -> Self {
        Self {
            move_left: KeyCode::KeyA,
            move_right: KeyCode::KeyD,
            move_forward: KeyCode::KeyW,
            move_backward: KeyCode::KeyS,
            move_up: KeyCode::Space,
            move_down: KeyCode::ControlLeft,
            sprint: KeyCode::ShiftLeft,
        }
    }
}

/// Mouse-look plus WASD movement, with pitch clamped and yaw wrapped.
///
/// World up is `-Y`, so "up" moves towards negative Y.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovementController {
    pub keys: KeyMappings,
    /// Units per second.
    pub move_speed: f32,
    /// Radians per second per unit of mouse motion.
    pub look_sensitivity: f32,
    pub sprint_multiplier: f32,
    /// Vertical field of view in degrees.
    pub fov: f32,
}

impl Default for MovementController {
    fn default() -> Self {
        Self {
            keys: KeyMappings::default(),
            move_speed: 3.0,
            look_sensitivity: 0.45,
            sprint_multiplier: 5.0,
            fov: 50.0,
        }
    }
}

impl MovementController {
    pub const PITCH_LIMIT: f32 = 1.5;

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply this frame's mouse motion and held keys to `transform`.
    pub fn move_in_plane_xz(&self, input: &InputManager, dt: f32, transform: &mut Transform) {
        let motion = input.mouse_motion();
        let rotate = Vec3::new(-motion.y, motion.x, 0.0);
        if rotate.length_squared() > f32::EPSILON {
            transform.rotation += self.look_sensitivity * dt * rotate;
        }

        transform.rotation.x = transform
            .rotation
            .x
            .clamp(-Self::PITCH_LIMIT, Self::PITCH_LIMIT);
        transform.rotation.y = transform.rotation.y.rem_euclid(TAU);

        let yaw = transform.rotation.y;
        let forward = Vec3::new(yaw.sin(), 0.0, yaw.cos());
        let right = Vec3::new(forward.z, 0.0, -forward.x);
        let up = Vec3::NEG_Y;

        let mut direction = Vec3::ZERO;
        for (key, step) in [
            (self.keys.move_forward, forward),
            (self.keys.move_backward, -forward),
            (self.keys.move_right, right),
            (self.keys.move_left, -right),
            (self.keys.move_up, up),
            (self.keys.move_down, -up),
        ] {
            if input.is_key_pressed(key) {
                direction += step;
            }
        }

        let speed = if input.is_key_pressed(self.keys.sprint) {
            self.move_speed * self.sprint_multiplier
        } else {
            self.move_speed
        };

        if direction.length_squared() > f32::EPSILON {
            transform.translation += speed * dt * direction.normalize();
        }
    }

    /// Field of view in radians.
    #[must_use]
    pub fn fov_radians(&self) -> f32 {
        self.fov.to_radians()
    }
}
