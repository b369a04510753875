//! Scene management

mod camera;
mod camera_controller;
mod light;
mod transform;

pub use camera::*;
pub use camera_controller::*;
pub use light::*;
pub use transform::*;

use glam::Vec3;

use crate::ViewerConfig;

/// Lowest roughness in the grid; fully smooth spheres alias badly under point lights
pub const MIN_ROUGHNESS: f32 = 0.05;

/// One sphere of the material grid
#[derive(Debug, Clone, Copy)]
pub struct SphereInstance {
    pub transform: Transform,
    pub metallic: f32,
    pub roughness: f32,
}

/// The scene containing all renderable content
pub struct Scene {
    pub camera: Camera,
    pub lights: Vec<PointLight>,
    pub spheres: Vec<SphereInstance>,
    pub albedo: Vec3,
}

impl Scene {
    /// Sphere grid and corner lights described by the viewer configuration
    pub fn from_config(config: &ViewerConfig) -> Self {
        let mut camera = Camera::default();
        camera.set_aspect(config.width as f32, config.height as f32);

        Self {
            camera,
            lights: corner_lights().to_vec(),
            spheres: sphere_grid(config.rows, config.columns, config.spacing),
            albedo: Vec3::from(config.albedo),
        }
    }
}

/// Grid of spheres centred on the origin at z = -2.
///
/// Metallic rises with the row and roughness with the column, as
/// `index / count`; the last row and column stop one step short of 1.
pub fn sphere_grid(rows: u32, columns: u32, spacing: f32) -> Vec<SphereInstance> {
    let step = |index: u32, count: u32| index as f32 / count as f32;

    let mut spheres = Vec::with_capacity((rows * columns) as usize);
    for row in 0..rows {
        for col in 0..columns {
            let position = Vec3::new(
                (col as f32 - columns.saturating_sub(1) as f32 / 2.0) * spacing,
                (row as f32 - rows.saturating_sub(1) as f32 / 2.0) * spacing,
                -2.0,
            );
            spheres.push(SphereInstance {
                transform: Transform::from_position(position).with_uniform_scale(0.5),
                metallic: step(row, rows),
                roughness: step(col, columns).clamp(MIN_ROUGHNESS, 1.0),
            });
        }
    }
    spheres
}
