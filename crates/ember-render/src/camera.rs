//! Camera and view management.
//!
//! Projections target Vulkan clip space: depth in `[0, 1]` and `+y` pointing
//! down the screen. The default world up vector is therefore `-Y`.

use glam::{Mat4, Vec3, Vec4};

/// World up vector used by the camera helpers.
pub const WORLD_UP: Vec3 = Vec3::NEG_Y;

/// Projection and view state for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    projection: Mat4,
    view: Mat4,
    inverse_view: Mat4,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            projection: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            inverse_view: Mat4::IDENTITY,
        }
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    /// Orthographic projection mapping the box onto the clip volume.
    pub fn set_orthographic_projection(
        &mut self,
        left: f32,
        right: f32,
        top: f32,
        bottom: f32,
        near: f32,
        far: f32,
    ) {
        self.projection = Mat4::from_cols(
            Vec4::new(2.0 / (right - left), 0.0, 0.0, 0.0),
            Vec4::new(0.0, 2.0 / (bottom - top), 0.0, 0.0),
            Vec4::new(0.0, 0.0, 1.0 / (far - near), 0.0),
            Vec4::new(
                -(right + left) / (right - left),
                -(bottom + top) / (bottom - top),
                -near / (far - near),
                1.0,
            ),
        );
    }

    /// Perspective projection with vertical field of view `fovy` in radians.
    ///
    /// A degenerate `aspect` (zero or not finite) leaves the projection unchanged.
    pub fn set_perspective_projection(&mut self, fovy: f32, aspect: f32, near: f32, far: f32) {
        if !aspect.is_finite() || aspect.abs() <= f32::EPSILON {
            tracing::warn!("Ignoring perspective projection with aspect {aspect}");
            return;
        }
        let tan_half_fovy = (fovy / 2.0).tan();
        self.projection = Mat4::from_cols(
            Vec4::new(1.0 / (aspect * tan_half_fovy), 0.0, 0.0, 0.0),
            Vec4::new(0.0, 1.0 / tan_half_fovy, 0.0, 0.0),
            Vec4::new(0.0, 0.0, far / (far - near), 1.0),
            Vec4::new(0.0, 0.0, -(far * near) / (far - near), 0.0),
        );
    }

    /// Look from `position` along `direction`.
    ///
    /// A zero direction, or one parallel to `up`, leaves the view unchanged.
    pub fn set_view_direction(&mut self, position: Vec3, direction: Vec3, up: Vec3) {
        let Some(w) = direction.try_normalize() else {
            tracing::warn!("Ignoring zero view direction");
            return;
        };
        let Some(u) = w.cross(up).try_normalize() else {
            tracing::warn!("Ignoring view direction parallel to up vector");
            return;
        };
        let v = w.cross(u);
        self.set_basis(position, u, v, w);
    }

    /// Look from `position` towards `target`.
    pub fn set_view_target(&mut self, position: Vec3, target: Vec3, up: Vec3) {
        self.set_view_direction(position, target - position, up);
    }

    /// View from `position` with Tait-Bryan angles applied in Y, X, Z order.
    pub fn set_view_yxz(&mut self, position: Vec3, rotation: Vec3) {
        let (s3, c3) = rotation.z.sin_cos();
        let (s2, c2) = rotation.x.sin_cos();
        let (s1, c1) = rotation.y.sin_cos();
        let u = Vec3::new(c1 * c3 + s1 * s2 * s3, c2 * s3, c1 * s2 * s3 - c3 * s1);
        let v = Vec3::new(c3 * s1 * s2 - c1 * s3, c2 * c3, c1 * c3 * s2 + s1 * s3);
        let w = Vec3::new(c2 * s1, -s2, c1 * c2);
        self.set_basis(position, u, v, w);
    }

    fn set_basis(&mut self, position: Vec3, u: Vec3, v: Vec3, w: Vec3) {
        self.view = Mat4::from_cols(
            Vec4::new(u.x, v.x, w.x, 0.0),
            Vec4::new(u.y, v.y, w.y, 0.0),
            Vec4::new(u.z, v.z, w.z, 0.0),
            Vec4::new(-u.dot(position), -v.dot(position), -w.dot(position), 1.0),
        );
        self.inverse_view = Mat4::from_cols(
            u.extend(0.0),
            v.extend(0.0),
            w.extend(0.0),
            position.extend(1.0),
        );
    }

    pub const fn projection(&self) -> Mat4 {
        self.projection
    }

    pub const fn view(&self) -> Mat4 {
        self.view
    }

    pub const fn inverse_view(&self) -> Mat4 {
        self.inverse_view
    }

    /// Camera position in world space.
    pub fn position(&self) -> Vec3 {
        self.inverse_view.w_axis.truncate()
    }
}
