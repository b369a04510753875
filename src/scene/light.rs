//! Point lights for the viewer scene

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

/// Point light
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    pub position: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

impl PointLight {
    pub fn new(position: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            position,
            color,
            intensity,
        }
    }

    /// Radiant colour: colour scaled by intensity
    pub fn radiance(&self) -> Vec3 {
        self.color * self.intensity
    }

    /// Convert to GPU data format
    pub fn to_gpu_data(&self) -> GpuLightData {
        GpuLightData {
            position: self.position.extend(1.0),
            radiance: self.radiance().extend(0.0),
        }
    }
}

/// Four white lights in front of the sphere grid, at the corners of a square
pub fn corner_lights() -> [PointLight; 4] {
    [(-10.0, 10.0), (10.0, 10.0), (-10.0, -10.0), (10.0, -10.0)]
        .map(|(x, y)| PointLight::new(Vec3::new(x, y, 10.0), Vec3::ONE, 300.0))
}

/// GPU-friendly light data
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct GpuLightData {
    pub position: Vec4,
    pub radiance: Vec4,
}
