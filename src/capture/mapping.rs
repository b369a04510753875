//! Equirectangular direction mapping
//!
//! Longitude runs along U starting at -X and increasing toward +Z; latitude
//! runs along V from the south pole (V = 0) to the north pole (V = 1).

use glam::{Vec2, Vec3};
use std::f32::consts::{PI, TAU};

/// Equirectangular texture coordinates of a direction.
///
/// The direction does not need to be normalized.
pub fn direction_to_equirect_uv(dir: Vec3) -> Vec2 {
    let d = dir.normalize();
    Vec2::new(
        d.z.atan2(d.x) / TAU + 0.5,
        d.y.clamp(-1.0, 1.0).asin() / PI + 0.5,
    )
}

/// Unit direction at equirectangular texture coordinates
pub fn equirect_uv_to_direction(uv: Vec2) -> Vec3 {
    let phi = (uv.x - 0.5) * TAU;
    let theta = (uv.y - 0.5) * PI;
    Vec3::new(theta.cos() * phi.cos(), theta.sin(), theta.cos() * phi.sin())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::pos_x(Vec3::X, Vec2::new(0.5, 0.5))]
    #[case::pos_z(Vec3::Z, Vec2::new(0.75, 0.5))]
    #[case::neg_z(Vec3::NEG_Z, Vec2::new(0.25, 0.5))]
    #[case::north(Vec3::Y, Vec2::new(0.5, 1.0))]
    #[case::south(Vec3::NEG_Y, Vec2::new(0.5, 0.0))]
    fn test_axis_coordinates(#[case] dir: Vec3, #[case] uv: Vec2) {
        assert!((direction_to_equirect_uv(dir) - uv).abs().max_element() < 1e-6);
    }

    #[test]
    fn test_negative_x_sits_on_the_seam() {
        let u = direction_to_equirect_uv(Vec3::NEG_X).x;
        assert!(u < 1e-6 || u > 1.0 - 1e-6);
    }

    #[test]
    fn test_inverse_round_trip() {
        for i in 1..16 {
            for j in 1..8 {
                let uv = Vec2::new(i as f32 / 16.0, j as f32 / 8.0);
                let back = direction_to_equirect_uv(equirect_uv_to_direction(uv));
                assert!((back - uv).abs().max_element() < 1e-5, "{uv} -> {back}");
            }
        }
    }

    #[test]
    fn test_unnormalized_input() {
        let a = direction_to_equirect_uv(Vec3::new(3.0, 4.0, -2.0));
        let b = direction_to_equirect_uv(Vec3::new(3.0, 4.0, -2.0).normalize());
        assert!((a - b).abs().max_element() < 1e-6);
    }
}
