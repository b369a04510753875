//! Mesh data structures and primitive shapes

use crate::backend::types::Vertex;
use glam::{Vec2, Vec3};
use std::f32::consts::PI;

/// A mesh with vertex and index data, always an indexed triangle list
#[derive(Debug, Clone)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub name: String,
}

impl Mesh {
    pub fn new(name: &str) -> Self {
        Self {
            vertices: Vec::new(),
            indices: Vec::new(),
            name: name.to_string(),
        }
    }

    /// Calculate vertex count
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Calculate index count
    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    /// Calculate triangle count
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Get vertex data as bytes
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Get index data as bytes
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    fn push(&mut self, position: Vec3, normal: Vec3, uv: Vec2) -> u32 {
        let index = self.vertices.len() as u32;
        self.vertices.push(Vertex {
            position,
            normal,
            uv,
        });
        index
    }
}

/// Primitive shapes used as proxy geometry and by the viewer scene.
///
/// Sizes follow the classic demo primitives: the quad and cube span two
/// units, the sphere has radius two and the circle radius one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    /// 2x2 quad on the XY plane facing +Z
    Quad,
    /// Cube from -1 to 1 on every axis
    Cube,
    /// UV sphere
    Sphere { x_segments: u32, y_segments: u32 },
    /// Disc on the XY plane facing +Z
    Circle { segments: u32 },
}

pub const SPHERE_RADIUS: f32 = 2.0;

impl Shape {
    pub fn sphere() -> Self {
        Shape::Sphere {
            x_segments: 64,
            y_segments: 64,
        }
    }

    pub fn circle() -> Self {
        Shape::Circle { segments: 36 }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Shape::Quad => "quad",
            Shape::Cube => "cube",
            Shape::Sphere { .. } => "sphere",
            Shape::Circle { .. } => "circle",
        }
    }

    /// Generate the triangle mesh for this shape
    pub fn mesh(&self) -> Mesh {
        match *self {
            Shape::Quad => quad_mesh(),
            Shape::Cube => cube_mesh(),
            Shape::Sphere {
                x_segments,
                y_segments,
            } => sphere_mesh(x_segments.max(3), y_segments.max(2)),
            Shape::Circle { segments } => circle_mesh(segments.max(3)),
        }
    }

    /// Analytic surface area of the ideal shape
    pub fn surface_area(&self) -> f32 {
        match self {
            Shape::Quad => 4.0,
            Shape::Cube => 24.0,
            Shape::Sphere { .. } => 4.0 * PI * SPHERE_RADIUS * SPHERE_RADIUS,
            Shape::Circle { .. } => PI,
        }
    }

    /// Enclosed volume; flat shapes have none
    pub fn volume(&self) -> f32 {
        match self {
            Shape::Quad | Shape::Circle { .. } => 0.0,
            Shape::Cube => 8.0,
            Shape::Sphere { .. } => 4.0 / 3.0 * PI * SPHERE_RADIUS.powi(3),
        }
    }
}

fn quad_mesh() -> Mesh {
    let mut mesh = Mesh::new("quad");
    let corners = [
        (Vec3::new(-1.0, 1.0, 0.0), Vec2::new(0.0, 1.0)),
        (Vec3::new(-1.0, -1.0, 0.0), Vec2::new(0.0, 0.0)),
        (Vec3::new(1.0, 1.0, 0.0), Vec2::new(1.0, 1.0)),
        (Vec3::new(1.0, -1.0, 0.0), Vec2::new(1.0, 0.0)),
    ];
    for (position, uv) in corners {
        mesh.push(position, Vec3::Z, uv);
    }
    mesh.indices.extend_from_slice(&[0, 1, 2, 2, 1, 3]);
    mesh
}

fn cube_mesh() -> Mesh {
    let mut mesh = Mesh::new("cube");

    // (normal, tangent u axis, tangent v axis) per face, counter-clockwise seen from outside
    let faces = [
        (Vec3::Z, Vec3::X, Vec3::Y),
        (-Vec3::Z, -Vec3::X, Vec3::Y),
        (Vec3::X, -Vec3::Z, Vec3::Y),
        (-Vec3::X, Vec3::Z, Vec3::Y),
        (Vec3::Y, Vec3::X, -Vec3::Z),
        (-Vec3::Y, Vec3::X, Vec3::Z),
    ];

    for (normal, u_axis, v_axis) in faces {
        let base = mesh.vertices.len() as u32;
        for (u, v) in [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)] {
            let position = normal + u_axis * (u * 2.0 - 1.0) + v_axis * (v * 2.0 - 1.0);
            mesh.push(position, normal, Vec2::new(u, 1.0 - v));
        }
        mesh.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    mesh
}

fn sphere_mesh(x_segments: u32, y_segments: u32) -> Mesh {
    let mut mesh = Mesh::new("sphere");

    for y in 0..=y_segments {
        for x in 0..=x_segments {
            let x_segment = x as f32 / x_segments as f32;
            let y_segment = y as f32 / y_segments as f32;
            let direction = Vec3::new(
                (x_segment * 2.0 * PI).cos() * (y_segment * PI).sin(),
                (y_segment * PI).cos(),
                (x_segment * 2.0 * PI).sin() * (y_segment * PI).sin(),
            );
            mesh.push(
                direction * SPHERE_RADIUS,
                direction,
                Vec2::new(x_segment, y_segment),
            );
        }
    }

    let row = x_segments + 1;
    for y in 0..y_segments {
        for x in 0..x_segments {
            let current = y * row + x;
            let next = current + row;
            mesh.indices.extend_from_slice(&[
                current,
                current + 1,
                next,
                current + 1,
                next + 1,
                next,
            ]);
        }
    }

    mesh
}

fn circle_mesh(segments: u32) -> Mesh {
    let mut mesh = Mesh::new("circle");
    let center = mesh.push(Vec3::ZERO, Vec3::Z, Vec2::splat(0.5));

    for i in 0..=segments {
        let angle = 2.0 * PI * i as f32 / segments as f32;
        let (y, x) = angle.sin_cos();
        mesh.push(
            Vec3::new(x, y, 0.0),
            Vec3::Z,
            Vec2::new((x + 1.0) / 2.0, (y + 1.0) / 2.0),
        );
    }

    for i in 1..=segments {
        mesh.indices.extend_from_slice(&[center, i, i + 1]);
    }

    mesh
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_cube_counts() {
        let mesh = Shape::Cube.mesh();
        assert_eq!(mesh.vertex_count(), 24);
        assert_eq!(mesh.index_count(), 36);
        assert_eq!(mesh.triangle_count(), 12);
    }

    #[test]
    fn test_cube_spans_two_units() {
        let mesh = Shape::Cube.mesh();
        for vertex in &mesh.vertices {
            assert_eq!(vertex.position.abs().max_element(), 1.0);
            // Every corner sits on the face its normal points through
            assert_eq!(vertex.position.dot(vertex.normal), 1.0);
        }
    }

    #[test]
    fn test_cube_winding_faces_outward() {
        let mesh = Shape::Cube.mesh();
        for tri in mesh.indices.chunks(3) {
            let a = mesh.vertices[tri[0] as usize];
            let b = mesh.vertices[tri[1] as usize];
            let c = mesh.vertices[tri[2] as usize];
            let face_normal = (b.position - a.position).cross(c.position - a.position);
            assert!(face_normal.dot(a.normal) > 0.0);
        }
    }

    #[test]
    fn test_sphere_vertices_on_radius() {
        let mesh = Shape::Sphere {
            x_segments: 8,
            y_segments: 6,
        }
        .mesh();
        assert_eq!(mesh.vertex_count(), 9 * 7);
        assert_eq!(mesh.triangle_count(), 8 * 6 * 2);
        for vertex in &mesh.vertices {
            assert!((vertex.position.length() - SPHERE_RADIUS).abs() < 1e-4);
            assert!((vertex.normal.length() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_circle_is_a_fan() {
        let mesh = Shape::Circle { segments: 12 }.mesh();
        assert_eq!(mesh.vertex_count(), 14);
        assert_eq!(mesh.triangle_count(), 12);
        assert!(mesh.indices.iter().all(|&i| (i as usize) < mesh.vertex_count()));
    }

    #[rstest]
    #[case::quad(Shape::Quad, 4.0, 0.0)]
    #[case::cube(Shape::Cube, 24.0, 8.0)]
    #[case::sphere(Shape::sphere(), 16.0 * PI, 32.0 / 3.0 * PI)]
    #[case::circle(Shape::circle(), PI, 0.0)]
    fn test_area_and_volume(#[case] shape: Shape, #[case] area: f32, #[case] volume: f32) {
        assert!((shape.surface_area() - area).abs() < 1e-4);
        assert!((shape.volume() - volume).abs() < 1e-4);
    }

    #[test]
    fn test_degenerate_segments_are_raised() {
        let mesh = Shape::Circle { segments: 0 }.mesh();
        assert_eq!(mesh.triangle_count(), 3);
    }
}
