//! Common utilities for capture integration tests.
//!
//! Every pipeline test runs once per backend. The software backend is always
//! available; the wgpu backend runs headless and is skipped when no adapter
//! can be found.

use glam::Vec3;

use ibl_capture::resources::{CubemapTexels, RadianceImage};
use ibl_capture::{BakeConfig, CaptureBackend, SoftwareBackend, WgpuBackend};

/// Pixel size of the default framebuffer the tests pretend to have
pub const SURFACE_SIZE: (u32, u32) = (320, 240);

// ============================================================================
// Backend Enumeration
// ============================================================================

/// Capture backends under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// CPU reference rasterizer.
    Software,
    /// wgpu without a surface.
    Wgpu,
}

impl Backend {
    /// Get the backend name for display.
    #[allow(dead_code)]
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Software => "software",
            Backend::Wgpu => "wgpu",
        }
    }
}

// ============================================================================
// Test Context
// ============================================================================

/// Test context owning one capture backend.
pub struct TestContext {
    #[allow(dead_code)]
    pub kind: Backend,
    pub backend: Box<dyn CaptureBackend>,
}

impl TestContext {
    /// Create a new test context for the given backend.
    ///
    /// Returns `None` if the backend is not available.
    pub fn new(kind: Backend) -> Option<Self> {
        let _ = env_logger::builder().is_test(true).try_init();

        let (width, height) = SURFACE_SIZE;
        let backend: Box<dyn CaptureBackend> = match kind {
            Backend::Software => Box::new(SoftwareBackend::new(width, height)),
            Backend::Wgpu => Box::new(WgpuBackend::new_headless(width, height).ok()?),
        };
        Some(Self { kind, backend })
    }

    pub fn backend(&mut self) -> &mut dyn CaptureBackend {
        self.backend.as_mut()
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// Small bake settings that keep the software rasterizer fast.
#[allow(dead_code)]
pub fn small_config() -> BakeConfig {
    BakeConfig::default()
        .with_environment_size(16)
        .with_irradiance_size(4)
        .with_sample_delta(std::f32::consts::PI / 16.0)
        .with_strict_checks(true)
}

/// 4x2 RGB image, black except for pure red at file pixel (0, 0).
#[allow(dead_code)]
pub fn red_corner_image() -> RadianceImage {
    let mut pixels = vec![0.0; 4 * 2 * 3];
    pixels[0] = 1.0;
    match RadianceImage::from_pixels(4, 2, 3, pixels, "red_corner") {
        Ok(image) => image,
        Err(e) => panic!("Failed to build test image: {}", e),
    }
}

/// Direction through the centre of file pixel (0, 0) of a 4x2 image.
///
/// Longitude -135 degrees, latitude +45 degrees.
#[allow(dead_code)]
pub fn red_corner_direction() -> Vec3 {
    Vec3::new(-0.5, std::f32::consts::FRAC_1_SQRT_2, -0.5)
}

/// 64x32 RGB image whose channels vary smoothly with direction.
///
/// Red follows `cos(longitude)`, green `sin(latitude)` and blue
/// `sin^3(longitude)`, with both longitude terms fading out toward the poles.
/// Every channel is continuous across the U seam, so each cube axis maps to a
/// distinct, well-defined colour.
#[allow(dead_code)]
pub fn gradient_image() -> RadianceImage {
    use std::f32::consts::{PI, TAU};

    let (width, height) = (64u32, 32u32);
    let mut pixels = Vec::with_capacity((width * height * 3) as usize);
    for row in 0..height {
        // File rows run from the north pole down
        let v = 1.0 - (row as f32 + 0.5) / height as f32;
        let latitude = (v - 0.5) * PI;
        let fade = latitude.cos().powi(2);
        for column in 0..width {
            let u = (column as f32 + 0.5) / width as f32;
            let longitude = (u - 0.5) * TAU;
            pixels.extend_from_slice(&[
                0.5 + 0.5 * fade * longitude.cos(),
                0.5 + 0.5 * latitude.sin(),
                0.5 + 0.5 * fade * longitude.sin().powi(3),
            ]);
        }
    }
    match RadianceImage::from_pixels(width, height, 3, pixels, "gradient") {
        Ok(image) => image,
        Err(e) => panic!("Failed to build test image: {}", e),
    }
}

/// Assert that a sampled colour is within `tolerance` of `expected` per channel.
#[allow(dead_code)]
pub fn assert_color_near(actual: Vec3, expected: Vec3, tolerance: f32, context: &str) {
    let diff = (actual - expected).abs().max_element();
    assert!(
        diff <= tolerance,
        "{}: expected {:?}, got {:?} (max channel error {})",
        context,
        expected,
        actual,
        diff
    );
}

/// Largest channel value anywhere in a cubemap.
#[allow(dead_code)]
pub fn max_channel(texels: &CubemapTexels) -> f32 {
    texels
        .iter_texels()
        .map(|(_, _, _, rgb)| rgb.max_element())
        .fold(0.0, f32::max)
}
