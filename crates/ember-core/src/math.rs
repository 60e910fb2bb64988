//! Scene transform math.

use glam::{EulerRot, Mat4, Quat, Vec3};

/// Translation, rotation and scale of a scene object.
///
/// `rotation` holds Tait-Bryan angles in radians, applied in Y (yaw),
/// X (pitch), Z (roll) order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub scale: Vec3,
    pub rotation: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            scale: Vec3::ONE,
            rotation: Vec3::ZERO,
        }
    }
}

impl Transform {
    /// Create a transform at the given position.
    #[must_use]
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Default::default()
        }
    }

    /// Rotation as a quaternion (Y, then X, then Z).
    #[inline]
    #[must_use]
    pub fn rotation_quat(&self) -> Quat {
        Quat::from_euler(
            EulerRot::YXZ,
            self.rotation.y,
            self.rotation.x,
            self.rotation.z,
        )
    }

    /// Model matrix: `translate * Ry * Rx * Rz * scale`.
    #[must_use]
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation_quat(), self.translation)
    }

    /// Matrix for transforming normals: `R * S^-1`.
    ///
    /// Returned as a 4x4 matrix so it can be pushed alongside the model matrix.
    #[must_use]
    pub fn normal_matrix(&self) -> Mat4 {
        Mat4::from_quat(self.rotation_quat()) * Mat4::from_scale(self.scale.recip())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::Vec4;

    /// Model matrix written out term by term.
    fn reference_matrix(t: &Transform) -> Mat4 {
        let (s1, c1) = t.rotation.y.sin_cos();
        let (s2, c2) = t.rotation.x.sin_cos();
        let (s3, c3) = t.rotation.z.sin_cos();
        Mat4::from_cols(
            Vec4::new(
                t.scale.x * (c1 * c3 + s1 * s2 * s3),
                t.scale.x * (c2 * s3),
                t.scale.x * (c1 * s2 * s3 - c3 * s1),
                0.0,
            ),
            Vec4::new(
                t.scale.y * (c3 * s1 * s2 - c1 * s3),
                t.scale.y * (c2 * c3),
                t.scale.y * (c1 * c3 * s2 + s1 * s3),
                0.0,
            ),
            Vec4::new(
                t.scale.z * (c2 * s1),
                t.scale.z * (-s2),
                t.scale.z * (c1 * c2),
                0.0,
            ),
            t.translation.extend(1.0),
        )
    }

    #[test]
    fn identity_transform() {
        assert_eq!(Transform::default().matrix(), Mat4::IDENTITY);
        assert_eq!(Transform::default().normal_matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn matrix_matches_yxz_expansion() {
        let t = Transform {
            translation: Vec3::new(1.0, -2.0, 3.5),
            scale: Vec3::new(3.0, 1.5, 3.0),
            rotation: Vec3::new(0.3, 1.1, -0.7),
        };
        let expected = reference_matrix(&t);
        let actual = t.matrix();
        for (a, e) in actual.to_cols_array().iter().zip(expected.to_cols_array()) {
            assert_relative_eq!(*a, e, epsilon = 1e-5);
        }
    }

    #[test]
    fn normal_matrix_is_inverse_transpose_of_linear_part() {
        let t = Transform {
            translation: Vec3::new(4.0, 0.0, -1.0),
            scale: Vec3::new(2.0, 0.5, 4.0),
            rotation: Vec3::new(0.2, -0.4, 0.9),
        };
        let linear = glam::Mat3::from_mat4(t.matrix());
        let expected = linear.inverse().transpose();
        let actual = glam::Mat3::from_mat4(t.normal_matrix());
        for (a, e) in actual.to_cols_array().iter().zip(expected.to_cols_array()) {
            assert_relative_eq!(*a, e, epsilon = 1e-5);
        }
    }
}
