//! Six-view cube capture rig

use crate::resources::CubeFace;
use glam::{Mat4, Vec3};
use std::sync::OnceLock;

/// Near plane of the capture projection
pub const CAPTURE_NEAR: f32 = 0.1;
/// Far plane of the capture projection
pub const CAPTURE_FAR: f32 = 10.0;

/// Projection and per-face views used to render any source onto a cubemap.
///
/// The views look from the origin down each axis in face order. The ±Y faces
/// use +Z and -Z as up so the look and up vectors are never parallel.
#[derive(Debug, Clone, PartialEq)]
pub struct CubeCaptureTransform {
    pub projection: Mat4,
    pub views: [Mat4; 6],
}

/// `(forward, up)` per face in layer order
pub const FACE_BASES: [(Vec3, Vec3); 6] = [
    (Vec3::X, Vec3::NEG_Y),
    (Vec3::NEG_X, Vec3::NEG_Y),
    (Vec3::Y, Vec3::Z),
    (Vec3::NEG_Y, Vec3::NEG_Z),
    (Vec3::Z, Vec3::NEG_Y),
    (Vec3::NEG_Z, Vec3::NEG_Y),
];

impl CubeCaptureTransform {
    /// Build the rig; pure and deterministic
    pub fn build() -> Self {
        let projection = Mat4::perspective_rh(90f32.to_radians(), 1.0, CAPTURE_NEAR, CAPTURE_FAR);
        let views = FACE_BASES.map(|(forward, up)| Mat4::look_at_rh(Vec3::ZERO, forward, up));
        Self { projection, views }
    }

    /// Process-wide instance, computed on first use
    pub fn shared() -> &'static Self {
        static RIG: OnceLock<CubeCaptureTransform> = OnceLock::new();
        RIG.get_or_init(Self::build)
    }

    pub fn view(&self, face: CubeFace) -> Mat4 {
        self.views[face.layer() as usize]
    }

    /// World-space direction a view looks along
    pub fn forward(&self, face: CubeFace) -> Vec3 {
        // Third row of the rotation is -forward
        let view = self.view(face);
        -Vec3::new(view.x_axis.z, view.y_axis.z, view.z_axis.z)
    }
}
