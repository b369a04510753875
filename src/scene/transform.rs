//! Placement of viewer objects

use glam::{Mat4, Vec3};

/// Position and uniform scale.
///
/// Spheres and light markers are never rotated, so neither is this.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub scale: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            scale: 1.0,
        }
    }
}

impl Transform {
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    pub fn with_uniform_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    /// Model matrix: scale, then translate
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_translation(self.position) * Mat4::from_scale(Vec3::splat(self.scale))
    }

    /// Inverse transpose of the model matrix, for transforming normals
    pub fn normal_matrix(&self) -> Mat4 {
        if self.scale == 0.0 {
            return Mat4::IDENTITY;
        }
        Mat4::from_scale(Vec3::splat(self.scale.recip()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix_scales_about_position() {
        let t = Transform::from_position(Vec3::new(1.0, 2.0, 3.0)).with_uniform_scale(0.5);
        let p = t.matrix().transform_point3(Vec3::X);
        assert!((p - Vec3::new(1.5, 2.0, 3.0)).length() < 1e-6);
    }

    #[test]
    fn test_normal_matrix_matches_inverse_transpose() {
        let t = Transform::from_position(Vec3::new(-4.0, 0.5, 2.0)).with_uniform_scale(0.25);
        let expected = t.matrix().inverse().transpose();
        let n = Vec3::new(0.3, -0.8, 0.5);
        let a = t.normal_matrix().transform_vector3(n);
        let b = expected.transform_vector3(n);
        assert!((a - b).length() < 1e-5);
    }
}
