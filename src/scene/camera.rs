//! Fly camera

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

/// Narrowest field of view reachable by zooming, in degrees
pub const MIN_ZOOM: f32 = 1.0;
/// Widest (and initial) field of view, in degrees
pub const MAX_ZOOM: f32 = 45.0;

/// Perspective camera oriented by yaw and pitch
///
/// Angles are in degrees. Yaw −90° looks down −Z.
#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub world_up: Vec3,
    /// Vertical field of view in degrees
    pub zoom: f32,
    pub near: f32,
    pub far: f32,
    pub aspect: f32,
    front: Vec3,
    right: Vec3,
    up: Vec3,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, 0.0, 5.0), -90.0, 0.0)
    }
}

impl Camera {
    pub fn new(position: Vec3, yaw: f32, pitch: f32) -> Self {
        let mut camera = Self {
            position,
            yaw,
            pitch,
            world_up: Vec3::Y,
            zoom: MAX_ZOOM,
            near: 0.1,
            far: 100.0,
            aspect: 16.0 / 9.0,
            front: Vec3::NEG_Z,
            right: Vec3::X,
            up: Vec3::Y,
        };
        camera.update_vectors();
        camera
    }

    /// Recompute the basis from yaw and pitch
    pub fn update_vectors(&mut self) {
        let (yaw, pitch) = (self.yaw.to_radians(), self.pitch.to_radians());
        self.front = Vec3::new(yaw.cos() * pitch.cos(), pitch.sin(), yaw.sin() * pitch.cos()).normalize();
        self.right = self.front.cross(self.world_up).normalize();
        self.up = self.right.cross(self.front).normalize();
    }

    pub fn forward(&self) -> Vec3 {
        self.front
    }

    pub fn right(&self) -> Vec3 {
        self.right
    }

    pub fn up(&self) -> Vec3 {
        self.up
    }

    /// Get the view matrix
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.front, self.up)
    }

    /// Get the projection matrix
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.zoom.to_radians(), self.aspect, self.near, self.far)
    }

    /// Update aspect ratio, ignoring a minimised (zero-sized) window
    pub fn set_aspect(&mut self, width: f32, height: f32) {
        if width > 0.0 && height > 0.0 {
            self.aspect = width / height;
        }
    }

    /// Build camera uniform data for shaders
    pub fn uniform_data(&self) -> CameraUniformData {
        let view = self.view_matrix();
        let proj = self.projection_matrix();
        CameraUniformData {
            view,
            proj,
            view_proj: proj * view,
            position: self.position.extend(1.0),
        }
    }
}

/// Camera uniform data for GPU
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct CameraUniformData {
    pub view: Mat4,
    pub proj: Mat4,
    pub view_proj: Mat4,
    pub position: Vec4,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_looks_down_negative_z() {
        let camera = Camera::default();
        assert_eq!(camera.position, Vec3::new(0.0, 0.0, 5.0));
        assert!((camera.forward() - Vec3::NEG_Z).length() < 1e-5);
        assert!((camera.right() - Vec3::X).length() < 1e-5);
        assert!((camera.up() - Vec3::Y).length() < 1e-5);
    }

    #[test]
    fn test_view_matrix_moves_world_opposite() {
        let camera = Camera::default();
        let origin_in_view = camera.view_matrix().transform_point3(Vec3::ZERO);
        assert!((origin_in_view - Vec3::new(0.0, 0.0, -5.0)).length() < 1e-5);
    }

    #[test]
    fn test_zero_height_keeps_aspect() {
        let mut camera = Camera::default();
        camera.set_aspect(800.0, 600.0);
        camera.set_aspect(800.0, 0.0);
        assert!((camera.aspect - 4.0 / 3.0).abs() < 1e-6);
    }
}
