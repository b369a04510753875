//! Diffuse irradiance convolution
//!
//! Deterministic quadrature over the hemisphere around each texel direction.
//! `phi` steps around the normal over [0, 2pi) and `theta` away from it over
//! [0, pi/2), both at the same angular increment. Each sample contributes
//! `L * cos(theta) * sin(theta)`; the sum is scaled by `pi / sample_count`.

use glam::Vec3;
use std::f32::consts::{FRAC_PI_2, PI, TAU};

use crate::backend::traits::{CaptureBackend, MeshHandle};
use crate::backend::types::CaptureProgram;
use crate::capture::rig::CubeCaptureTransform;
use crate::capture::target::CaptureTarget;
use crate::capture::{CaptureError, PassReport};
use crate::resources::Cubemap;

/// Angular increment used unless configured otherwise
pub const DEFAULT_SAMPLE_DELTA: f32 = PI / 64.0;

/// Upper bound on quadrature samples per irradiance texel
pub const MAX_SAMPLES_PER_TEXEL: u64 = 1 << 20;

/// Number of `(phi, theta)` steps for an angular increment.
///
/// Counts are rounded so that an increment dividing the ranges exactly
/// (like pi/64) is not thrown off by float error.
pub fn quadrature_steps(sample_delta: f32) -> (u32, u32) {
    let steps = |range: f32| ((range / sample_delta - 1e-4).ceil() as u32).max(1);
    (steps(TAU), steps(FRAC_PI_2))
}

/// Total quadrature samples taken for every irradiance texel
pub fn sample_count(sample_delta: f32) -> u64 {
    let (phi_steps, theta_steps) = quadrature_steps(sample_delta);
    u64::from(phi_steps) * u64::from(theta_steps)
}

/// Orthonormal `(right, up)` pair perpendicular to `normal`
pub fn tangent_frame(normal: Vec3) -> (Vec3, Vec3) {
    let up = if normal.y.abs() < 0.999 { Vec3::Y } else { Vec3::Z };
    let right = up.cross(normal).normalize();
    let up = normal.cross(right);
    (right, up)
}

/// Irradiance arriving around `normal`, sampling radiance with `radiance`
pub fn convolve_direction<F>(normal: Vec3, sample_delta: f32, mut radiance: F) -> Vec3
where
    F: FnMut(Vec3) -> Vec3,
{
    let normal = normal.normalize();
    let (right, up) = tangent_frame(normal);
    let (phi_steps, theta_steps) = quadrature_steps(sample_delta);

    let mut sum = Vec3::ZERO;
    for i in 0..phi_steps {
        let (sin_phi, cos_phi) = (i as f32 * sample_delta).sin_cos();
        for j in 0..theta_steps {
            let (sin_theta, cos_theta) = (j as f32 * sample_delta).sin_cos();
            let sample = right * (sin_theta * cos_phi) + up * (sin_theta * sin_phi) + normal * cos_theta;
            sum += radiance(sample) * cos_theta * sin_theta;
        }
    }

    sum * PI / (phi_steps as f32 * theta_steps as f32)
}

/// Convolve a populated environment cubemap into `destination`.
///
/// Refuses an environment that no projection pass has written.
#[allow(clippy::too_many_arguments)]
pub fn convolve_irradiance<B: CaptureBackend + ?Sized>(
    backend: &mut B,
    environment: &Cubemap,
    rig: &CubeCaptureTransform,
    target: &CaptureTarget,
    destination: &mut Cubemap,
    proxy: MeshHandle,
    sample_delta: f32,
    strict: bool,
) -> Result<PassReport, CaptureError> {
    if !environment.is_populated() {
        return Err(CaptureError::EnvironmentNotPopulated {
            cubemap: environment.label().to_string(),
        });
    }

    log::info!(
        "Convolving '{}' into '{}' ({}x{} per face, {} samples per texel)",
        environment.label(),
        destination.label(),
        destination.face_size(),
        destination.face_size(),
        sample_count(sample_delta)
    );

    let report = target.capture_faces(
        backend,
        rig,
        CaptureProgram::IrradianceConvolution { sample_delta },
        environment.texture(),
        proxy,
        destination,
        strict,
    )?;

    if report.is_complete() {
        destination.mark_populated();
    } else {
        log::warn!(
            "'{}' left unpopulated, faces skipped: {:?}",
            destination.label(),
            report.incomplete_faces
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_step_counts() {
        assert_eq!(quadrature_steps(DEFAULT_SAMPLE_DELTA), (128, 32));
    }

    #[test]
    fn test_coarse_step_counts() {
        assert_eq!(quadrature_steps(PI / 8.0), (16, 4));
        // A step that does not divide the range still covers all of it
        assert_eq!(quadrature_steps(1.0), (7, 2));
    }

    #[test]
    fn test_sample_count_does_not_wrap() {
        assert_eq!(sample_count(DEFAULT_SAMPLE_DELTA), 4096);
        assert_eq!(sample_count(PI / 1024.0), MAX_SAMPLES_PER_TEXEL);
        // 628 319 x 157 080 steps, past u32::MAX
        assert!(sample_count(1e-5) > u64::from(u32::MAX));
    }

    #[test]
    fn test_tangent_frame_is_orthonormal() {
        for normal in [Vec3::X, Vec3::Y, Vec3::NEG_Y, Vec3::new(0.3, -0.5, 0.8).normalize()] {
            let (right, up) = tangent_frame(normal);
            assert!((right.length() - 1.0).abs() < 1e-5);
            assert!((up.length() - 1.0).abs() < 1e-5);
            assert!(right.dot(normal).abs() < 1e-5);
            assert!(up.dot(normal).abs() < 1e-5);
            assert!(right.dot(up).abs() < 1e-5);
        }
    }

    #[test]
    fn test_constant_radiance_integrates_to_itself() {
        let irradiance = convolve_direction(Vec3::Z, DEFAULT_SAMPLE_DELTA, |_| Vec3::splat(2.0));
        assert!((irradiance - Vec3::splat(2.0)).abs().max_element() < 0.01);
    }

    #[test]
    fn test_samples_stay_in_hemisphere() {
        let normal = Vec3::new(1.0, 1.0, 0.0).normalize();
        convolve_direction(normal, PI / 16.0, |dir| {
            assert!(dir.dot(normal) > -1e-5);
            assert!((dir.length() - 1.0).abs() < 1e-4);
            Vec3::ZERO
        });
    }

    #[test]
    fn test_light_behind_contributes_nothing() {
        // Radiance only from the lower hemisphere
        let irradiance = convolve_direction(Vec3::Y, PI / 32.0, |dir| {
            if dir.y < -1e-3 {
                Vec3::ONE
            } else {
                Vec3::ZERO
            }
        });
        assert_eq!(irradiance, Vec3::ZERO);
    }
}
