//! IBL Capture - offscreen baking of image-based lighting cubemaps
//!
//! Loads an equirectangular HDR environment and bakes it, before any frame is
//! drawn, into:
//! - an **environment cubemap** by projecting the image onto six cube faces
//! - a **diffuse irradiance cubemap** by cosine-weighted hemisphere
//!   convolution of the environment
//!
//! Two backends implement the capture contract:
//! - **wgpu**: the GPU path, windowed or headless
//! - **software**: a CPU reference that evaluates the same capture programs
//!
//! # Features
//! - One reusable capture framebuffer, resized between the two passes
//! - Framebuffer completeness checks with strict and lenient reporting
//! - Readback of baked faces for verification
//! - Interactive PBR viewer lit by the baked irradiance

pub mod backend;
pub mod capture;
pub mod egui_integration;
pub mod resources;
pub mod scene;
pub mod timer;
pub mod viewer;
pub mod window;

pub use backend::software::SoftwareBackend;
pub use backend::wgpu_backend::WgpuBackend;
pub use backend::CaptureBackend;
pub use capture::{bake_from_file, bake_irradiance, BakeReport, CaptureError, IblMaps};
pub use egui_integration::WgpuEguiIntegration;
pub use viewer::Viewer;
pub use window::Window;

use std::f32::consts::FRAC_PI_2;

/// Configuration for the two capture passes
#[derive(Debug, Clone, PartialEq)]
pub struct BakeConfig {
    /// Face resolution of the environment cubemap
    pub environment_size: u32,
    /// Face resolution of the irradiance cubemap, strictly below the environment's
    pub irradiance_size: u32,
    /// Angular step of the convolution quadrature, in radians
    pub sample_delta: f32,
    /// Fail on the first incomplete framebuffer instead of logging and skipping the face
    pub strict_framebuffer_checks: bool,
}

impl Default for BakeConfig {
    fn default() -> Self {
        Self {
            environment_size: 512,
            irradiance_size: 32,
            sample_delta: capture::DEFAULT_SAMPLE_DELTA,
            strict_framebuffer_checks: cfg!(debug_assertions),
        }
    }
}

impl BakeConfig {
    pub fn with_environment_size(mut self, size: u32) -> Self {
        self.environment_size = size;
        self
    }

    pub fn with_irradiance_size(mut self, size: u32) -> Self {
        self.irradiance_size = size;
        self
    }

    pub fn with_sample_delta(mut self, delta: f32) -> Self {
        self.sample_delta = delta;
        self
    }

    pub fn with_strict_checks(mut self, strict: bool) -> Self {
        self.strict_framebuffer_checks = strict;
        self
    }

    /// Check sizes and quadrature step before any GPU work
    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.environment_size == 0 || self.irradiance_size == 0 {
            return Err(CaptureError::InvalidConfig(format!(
                "face sizes must be non-zero (environment {}, irradiance {})",
                self.environment_size, self.irradiance_size
            )));
        }
        if self.irradiance_size >= self.environment_size {
            return Err(CaptureError::InvalidConfig(format!(
                "irradiance size {} must be smaller than environment size {}",
                self.irradiance_size, self.environment_size
            )));
        }
        if !(self.sample_delta > 0.0 && self.sample_delta <= FRAC_PI_2) {
            return Err(CaptureError::InvalidConfig(format!(
                "sample delta {} outside (0, pi/2]",
                self.sample_delta
            )));
        }
        let samples = capture::sample_count(self.sample_delta);
        if samples > capture::MAX_SAMPLES_PER_TEXEL {
            return Err(CaptureError::InvalidConfig(format!(
                "sample delta {} needs {} samples per texel, more than the limit of {}",
                self.sample_delta,
                samples,
                capture::MAX_SAMPLES_PER_TEXEL
            )));
        }
        Ok(())
    }
}

/// Configuration for the interactive viewer
#[derive(Debug, Clone)]
pub struct ViewerConfig {
    /// Window title
    pub title: String,
    /// Initial window width
    pub width: u32,
    /// Initial window height
    pub height: u32,
    /// Enable vsync
    pub vsync: bool,
    /// Sphere grid rows (metallic varies by row)
    pub rows: u32,
    /// Sphere grid columns (roughness varies by column)
    pub columns: u32,
    /// Distance between neighbouring sphere centres
    pub spacing: f32,
    /// Base colour of every sphere
    pub albedo: [f32; 3],
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            title: "Irradiance Viewer".to_string(),
            width: 1280,
            height: 720,
            vsync: true,
            rows: 7,
            columns: 7,
            spacing: 2.5,
            albedo: [0.5, 0.0, 0.0],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_default_config_is_valid() {
        let config = BakeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.environment_size, 512);
        assert_eq!(config.irradiance_size, 32);
        assert_eq!(config.sample_delta, std::f32::consts::PI / 64.0);
    }

    #[rstest]
    #[case::zero_environment(BakeConfig::default().with_environment_size(0))]
    #[case::zero_irradiance(BakeConfig::default().with_irradiance_size(0))]
    #[case::equal_sizes(BakeConfig::default().with_environment_size(32))]
    #[case::larger_irradiance(BakeConfig::default().with_irradiance_size(1024))]
    #[case::zero_delta(BakeConfig::default().with_sample_delta(0.0))]
    #[case::wide_delta(BakeConfig::default().with_sample_delta(2.0))]
    #[case::nan_delta(BakeConfig::default().with_sample_delta(f32::NAN))]
    #[case::tiny_delta(BakeConfig::default().with_sample_delta(1e-5))]
    fn test_invalid_configs_rejected(#[case] config: BakeConfig) {
        assert!(matches!(config.validate(), Err(CaptureError::InvalidConfig(_))));
    }

    #[test]
    fn test_finest_allowed_delta() {
        let config = BakeConfig::default().with_sample_delta(std::f32::consts::PI / 1024.0);
        assert!(config.validate().is_ok());
    }
}
