//! Offscreen capture pipeline
//!
//! Turns an equirectangular HDR image into an environment cubemap and a
//! diffuse irradiance cubemap:
//!
//! 1. upload the radiance image as a 2D float texture
//! 2. project it onto the environment cubemap at high resolution
//! 3. shrink the capture target and convolve into the irradiance cubemap
//! 4. release the capture target and restore the window viewport
//!
//! Everything runs once, synchronously, before the render loop starts.

pub mod convolver;
pub mod mapping;
pub mod projector;
pub mod rig;
pub mod target;

use std::path::Path;
use std::time::Duration;

use thiserror::Error;

use crate::backend::traits::{BackendError, CaptureBackend, MeshHandle};
use crate::backend::types::FramebufferStatus;
use crate::resources::{CubeFace, Cubemap, HdrTexture, ImageError, RadianceImage, Shape};
use crate::timer::Timer;
use crate::BakeConfig;

pub use convolver::{
    convolve_direction, convolve_irradiance, quadrature_steps, sample_count, DEFAULT_SAMPLE_DELTA,
    MAX_SAMPLES_PER_TEXEL,
};
pub use mapping::{direction_to_equirect_uv, equirect_uv_to_direction};
pub use projector::project_equirectangular;
pub use rig::CubeCaptureTransform;
pub use target::{with_capture_target, CaptureTarget, TargetState};

/// Capture pipeline error
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error("Framebuffer {framebuffer} incomplete for face {face}: status {status}")]
    FramebufferIncomplete {
        framebuffer: u64,
        face: CubeFace,
        status: FramebufferStatus,
    },
    #[error("Capture target is {target}x{target} but the destination faces are {cubemap}x{cubemap}")]
    ResolutionMismatch { target: u32, cubemap: u32 },
    #[error("Environment cubemap '{cubemap}' has not been populated by a projection pass")]
    EnvironmentNotPopulated { cubemap: String },
    #[error("Capture target cannot go from {from:?} to resolution {resolution}")]
    InvalidTransition { from: TargetState, resolution: u32 },
    #[error("Invalid bake configuration: {0}")]
    InvalidConfig(String),
}

/// Outcome of one six-face capture pass
#[derive(Debug, Clone, PartialEq)]
pub struct PassReport {
    pub program: &'static str,
    pub face_size: u32,
    pub faces_captured: u32,
    /// Faces skipped because the framebuffer was incomplete (lenient mode only)
    pub incomplete_faces: Vec<CubeFace>,
}

impl PassReport {
    pub fn new(program: &'static str, face_size: u32) -> Self {
        Self {
            program,
            face_size,
            faces_captured: 0,
            incomplete_faces: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.faces_captured == 6 && self.incomplete_faces.is_empty()
    }
}

/// Summary of a full bake
#[derive(Debug, Clone)]
pub struct BakeReport {
    pub environment: PassReport,
    pub irradiance: PassReport,
    pub elapsed: Duration,
}

/// The two cubemaps handed to the render loop
#[derive(Debug)]
pub struct IblMaps {
    pub environment: Cubemap,
    pub irradiance: Cubemap,
}

impl IblMaps {
    pub fn destroy<B: CaptureBackend + ?Sized>(self, backend: &mut B) {
        self.environment.destroy(backend);
        self.irradiance.destroy(backend);
    }

    /// Move both cubemaps from the backend that baked them to another one.
    ///
    /// The source maps are released whether or not the move succeeds.
    pub fn transfer<S, D>(self, source: &mut S, destination: &mut D) -> Result<IblMaps, CaptureError>
    where
        S: CaptureBackend + ?Sized,
        D: CaptureBackend + ?Sized,
    {
        let moved = self.copy_to(source, destination);
        if moved.is_ok() {
            log::info!(
                "Transferred baked cubemaps from {} to {} backend",
                source.name(),
                destination.name()
            );
        }
        self.destroy(source);
        moved
    }

    fn copy_to<S, D>(&self, source: &mut S, destination: &mut D) -> Result<IblMaps, CaptureError>
    where
        S: CaptureBackend + ?Sized,
        D: CaptureBackend + ?Sized,
    {
        let environment_texels = self.environment.read_back(source)?;
        let irradiance_texels = self.irradiance.read_back(source)?;

        let environment = Cubemap::upload(destination, &environment_texels, self.environment.label())?;
        match Cubemap::upload(destination, &irradiance_texels, self.irradiance.label()) {
            Ok(irradiance) => Ok(IblMaps {
                environment,
                irradiance,
            }),
            Err(e) => {
                environment.destroy(destination);
                Err(e.into())
            }
        }
    }
}

/// Load an HDR file and bake both cubemaps from it
pub fn bake_from_file<B: CaptureBackend + ?Sized, P: AsRef<Path>>(
    backend: &mut B,
    path: P,
    config: &BakeConfig,
) -> Result<(IblMaps, BakeReport), CaptureError> {
    config.validate()?;
    let image = RadianceImage::from_file(path)?;
    bake_irradiance(backend, image, config)
}

/// Bake the environment and irradiance cubemaps from a radiance image.
///
/// Stages run strictly in order; the capture target is released and the
/// viewport restored whether or not they succeed. Intermediate resources
/// (the HDR texture and the proxy mesh) are destroyed before returning.
pub fn bake_irradiance<B: CaptureBackend + ?Sized>(
    backend: &mut B,
    image: RadianceImage,
    config: &BakeConfig,
) -> Result<(IblMaps, BakeReport), CaptureError> {
    config.validate()?;
    let mut timer = Timer::started("Irradiance bake");
    log::info!(
        "Baking '{}' on {} backend: environment {}, irradiance {}",
        image.name(),
        backend.name(),
        config.environment_size,
        config.irradiance_size
    );

    let hdr = HdrTexture::upload(backend, image)?;
    let proxy = match backend.upload_mesh(&Shape::Cube.mesh()) {
        Ok(proxy) => proxy,
        Err(e) => {
            hdr.destroy(backend);
            return Err(e.into());
        }
    };

    let result = bake_with_sources(backend, &hdr, proxy, config);

    backend.destroy_mesh(proxy);
    hdr.destroy(backend);

    let (maps, environment, irradiance) = result?;
    let elapsed = timer.stop().unwrap_or_default();

    Ok((
        maps,
        BakeReport {
            environment,
            irradiance,
            elapsed,
        },
    ))
}

fn bake_with_sources<B: CaptureBackend + ?Sized>(
    backend: &mut B,
    hdr: &HdrTexture,
    proxy: MeshHandle,
    config: &BakeConfig,
) -> Result<(IblMaps, PassReport, PassReport), CaptureError> {
    let mut environment = Cubemap::allocate(backend, config.environment_size, "environment_cubemap")?;
    let mut irradiance = match Cubemap::allocate(backend, config.irradiance_size, "irradiance_cubemap") {
        Ok(irradiance) => irradiance,
        Err(e) => {
            environment.destroy(backend);
            return Err(e.into());
        }
    };

    let rig = CubeCaptureTransform::shared();
    let passes = with_capture_target(backend, |backend, target| {
        target.resize(backend, config.environment_size)?;
        let env_report = project_equirectangular(
            backend,
            hdr,
            rig,
            target,
            &mut environment,
            proxy,
            config.strict_framebuffer_checks,
        )?;

        target.resize(backend, config.irradiance_size)?;
        let irr_report = convolve_irradiance(
            backend,
            &environment,
            rig,
            target,
            &mut irradiance,
            proxy,
            config.sample_delta,
            config.strict_framebuffer_checks,
        )?;
        Ok((env_report, irr_report))
    });

    match passes {
        Ok((env_report, irr_report)) => Ok((
            IblMaps {
                environment,
                irradiance,
            },
            env_report,
            irr_report,
        )),
        Err(e) => {
            environment.destroy(backend);
            irradiance.destroy(backend);
            Err(e)
        }
    }
}
