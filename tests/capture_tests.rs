//! Capture pipeline integration tests.
//!
//! Tests are parameterized using `rstest` to run against every capture
//! backend. The wgpu cases are skipped when no adapter is available.
//!
//! # Test Categories
//!
//! - **Bake Tests**: full projection and convolution passes with readback
//! - **Lifecycle Tests**: capture target sizing, viewport restore, cleanup
//! - **Completeness Tests**: strict and lenient framebuffer checks

mod common;

use glam::Vec3;
use rstest::rstest;

use common::{
    assert_color_near, gradient_image, max_channel, red_corner_direction, red_corner_image,
    small_config, Backend, TestContext, SURFACE_SIZE,
};
use ibl_capture::backend::{
    CaptureProgram, FramebufferStatus, SamplerDescriptor, TextureDescriptor, Viewport,
};
use ibl_capture::capture::{
    convolve_irradiance, direction_to_equirect_uv, project_equirectangular, with_capture_target,
    CubeCaptureTransform,
};
use ibl_capture::resources::{CubeFace, Cubemap, HdrTexture, RadianceImage, Shape, TexelView};
use ibl_capture::{bake_from_file, bake_irradiance, CaptureBackend, CaptureError, SoftwareBackend};

// ============================================================================
// Bake Tests
// ============================================================================

/// A uniform environment integrates to the same radiance in every direction.
#[rstest]
#[case::software(Backend::Software)]
#[case::wgpu(Backend::Wgpu)]
fn test_uniform_environment_irradiance(#[case] backend: Backend) {
    let Some(mut ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };

    let radiance = Vec3::new(0.8, 0.4, 0.2);
    let image = RadianceImage::constant(32, 16, radiance.to_array());
    let (maps, report) =
        bake_irradiance(ctx.backend(), image, &small_config()).expect("bake should succeed");

    assert!(report.environment.is_complete());
    assert!(report.irradiance.is_complete());

    let environment = maps.environment.read_back(ctx.backend()).expect("readback");
    for (face, x, y, rgb) in environment.iter_texels() {
        assert_color_near(rgb, radiance, 0.01, &format!("environment {} ({}, {})", face, x, y));
    }

    let irradiance = maps.irradiance.read_back(ctx.backend()).expect("readback");
    assert_eq!(irradiance.face_size, 4);
    for (face, x, y, rgb) in irradiance.iter_texels() {
        // Coarse quadrature loses a little over one percent
        assert_color_near(rgb, radiance, 0.03, &format!("irradiance {} ({}, {})", face, x, y));
    }

    maps.destroy(ctx.backend());
}

/// A single red texel lands on the cube face its direction points at.
#[rstest]
#[case::software(Backend::Software)]
#[case::wgpu(Backend::Wgpu)]
fn test_red_pixel_projects_to_its_direction(#[case] backend: Backend) {
    let Some(mut ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };

    let (maps, _) =
        bake_irradiance(ctx.backend(), red_corner_image(), &small_config()).expect("bake should succeed");
    let environment = maps.environment.read_back(ctx.backend()).expect("readback");

    let red = environment.sample(red_corner_direction());
    assert!(red.x > 0.6, "expected red along the pixel direction, got {:?}", red);
    assert!(red.y < 0.05 && red.z < 0.05, "expected pure red, got {:?}", red);

    // Directions far from the red texel after filtering; -X, +Y and -Z sit
    // on texel borders that touch the red pixel
    for dir in [Vec3::X, Vec3::NEG_Y, Vec3::Z] {
        let rgb = environment.sample(dir);
        assert!(rgb.max_element() < 0.05, "expected black along {:?}, got {:?}", dir, rgb);
    }

    // The irradiance is brightest on the hemisphere facing the red pixel
    let irradiance = maps.irradiance.read_back(ctx.backend()).expect("readback");
    let facing = irradiance.sample(red_corner_direction());
    let away = irradiance.sample(-red_corner_direction());
    assert!(facing.x > away.x, "facing {:?} should exceed away {:?}", facing, away);
    assert!(max_channel(&irradiance) <= 1.0);

    maps.destroy(ctx.backend());
}

/// Each face axis of the environment holds the radiance the source image
/// has at that direction's equirectangular coordinates.
#[rstest]
#[case::software(Backend::Software)]
#[case::wgpu(Backend::Wgpu)]
fn test_face_axes_match_source_image(#[case] backend: Backend) {
    let Some(mut ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };

    let source = gradient_image();
    let source_texels = source.to_rgba();
    let source_view = TexelView::new(&source_texels, source.width(), source.height());

    let (maps, _) = bake_irradiance(ctx.backend(), source, &small_config()).expect("bake should succeed");
    let environment = maps.environment.read_back(ctx.backend()).expect("readback");

    for face in CubeFace::ALL {
        let axis = face.axis();
        let expected = source_view
            .sample(direction_to_equirect_uv(axis), &SamplerDescriptor::linear_clamp())
            .truncate();
        assert_color_near(environment.sample(axis), expected, 0.02, &format!("face {}", face));
    }

    // Opposite axes must not be confused with each other
    let pos_x = environment.sample(Vec3::X);
    let neg_x = environment.sample(Vec3::NEG_X);
    let pos_z = environment.sample(Vec3::Z);
    let neg_z = environment.sample(Vec3::NEG_Z);
    assert!(pos_x.x > 0.9 && neg_x.x < 0.1, "+X {:?} / -X {:?}", pos_x, neg_x);
    assert!(pos_z.z > 0.9 && neg_z.z < 0.1, "+Z {:?} / -Z {:?}", pos_z, neg_z);
    assert!(environment.sample(Vec3::Y).y > 0.9);
    assert!(environment.sample(Vec3::NEG_Y).y < 0.1);

    maps.destroy(ctx.backend());
}

/// Baked maps can move between backends without changing their texels.
#[rstest]
#[case::software(Backend::Software)]
#[case::wgpu(Backend::Wgpu)]
fn test_transfer_preserves_texels(#[case] backend: Backend) {
    let Some(mut ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };

    let mut software = SoftwareBackend::new(SURFACE_SIZE.0, SURFACE_SIZE.1);
    let (maps, _) =
        bake_irradiance(&mut software, red_corner_image(), &small_config()).expect("bake should succeed");
    let expected = maps.irradiance.read_back(&mut software).expect("readback");

    let moved = maps
        .transfer(&mut software, ctx.backend())
        .expect("transfer should succeed");
    assert_eq!(software.texture_count(), 0);
    assert!(moved.environment.is_populated());
    assert!(moved.irradiance.is_populated());

    let actual = moved.irradiance.read_back(ctx.backend()).expect("readback");
    for face in CubeFace::ALL {
        for y in 0..actual.face_size {
            for x in 0..actual.face_size {
                assert_color_near(
                    actual.texel(face, x, y),
                    expected.texel(face, x, y),
                    1e-3,
                    &format!("{} ({}, {})", face, x, y),
                );
            }
        }
    }

    moved.destroy(ctx.backend());
}

/// A failed readback still releases the source cubemaps.
#[test]
fn test_failed_transfer_releases_source() {
    let mut source = SoftwareBackend::new(SURFACE_SIZE.0, SURFACE_SIZE.1);
    let mut destination = SoftwareBackend::new(SURFACE_SIZE.0, SURFACE_SIZE.1);
    let (maps, _) =
        bake_irradiance(&mut source, red_corner_image(), &small_config()).expect("bake should succeed");
    assert_eq!(source.texture_count(), 2);

    // Irradiance storage vanishes behind the handle, so its readback fails
    source.destroy_texture(maps.irradiance.texture());
    assert_eq!(source.texture_count(), 1);

    let result = maps.transfer(&mut source, &mut destination);
    assert!(matches!(result, Err(CaptureError::Backend(_))));
    assert_eq!(source.texture_count(), 0);
    assert_eq!(destination.texture_count(), 0);
}

// ============================================================================
// Lifecycle Tests
// ============================================================================

/// The window framebuffer and viewport are restored after baking.
#[rstest]
#[case::software(Backend::Software)]
#[case::wgpu(Backend::Wgpu)]
fn test_viewport_restored_after_bake(#[case] backend: Backend) {
    let Some(mut ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };

    let (maps, _) =
        bake_irradiance(ctx.backend(), red_corner_image(), &small_config()).expect("bake should succeed");

    assert_eq!(ctx.backend.bound_framebuffer(), None);
    assert_eq!(ctx.backend.viewport(), Viewport::new(SURFACE_SIZE.0, SURFACE_SIZE.1));

    maps.destroy(ctx.backend());
}

/// Each pass renders six faces in order, at its own resolution.
#[test]
fn test_draws_follow_pass_resolutions() {
    let mut backend = SoftwareBackend::new(SURFACE_SIZE.0, SURFACE_SIZE.1);
    let (maps, report) =
        bake_irradiance(&mut backend, red_corner_image(), &small_config()).expect("bake should succeed");

    assert_eq!(report.environment.face_size, 16);
    assert_eq!(report.irradiance.face_size, 4);

    let draws = backend.draws();
    assert_eq!(draws.len(), 12);

    for (i, draw) in draws[..6].iter().enumerate() {
        assert_eq!(draw.program, CaptureProgram::EquirectangularToCubemap);
        assert_eq!(draw.target, maps.environment.texture());
        assert_eq!(draw.layer, i as u32);
        assert_eq!(draw.attachment_size, (16, 16));
        assert_eq!(draw.viewport, Viewport::square(16));
    }
    for (i, draw) in draws[6..].iter().enumerate() {
        assert!(matches!(draw.program, CaptureProgram::IrradianceConvolution { .. }));
        assert_eq!(draw.target, maps.irradiance.texture());
        assert_eq!(draw.layer, i as u32);
        assert_eq!(draw.attachment_size, (4, 4));
        assert_eq!(draw.viewport, Viewport::square(4));
    }

    // Only the two cubemaps outlive the bake
    assert_eq!(backend.texture_count(), 2);
    assert_eq!(backend.framebuffer_count(), 0);
    assert_eq!(backend.renderbuffer_count(), 0);

    maps.destroy(&mut backend);
    assert_eq!(backend.texture_count(), 0);
}

/// A missing HDR file fails before anything is allocated.
#[rstest]
#[case::software(Backend::Software)]
#[case::wgpu(Backend::Wgpu)]
fn test_missing_hdr_file(#[case] backend: Backend) {
    let Some(mut ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };

    let result = bake_from_file(ctx.backend(), "does/not/exist.hdr", &small_config());
    assert!(matches!(result, Err(CaptureError::Image(_))));
    assert_eq!(ctx.backend.bound_framebuffer(), None);
}

#[test]
fn test_missing_hdr_file_leaves_no_textures() {
    let mut backend = SoftwareBackend::new(SURFACE_SIZE.0, SURFACE_SIZE.1);
    let result = bake_from_file(&mut backend, "does/not/exist.hdr", &small_config());
    assert!(result.is_err());
    assert_eq!(backend.texture_count(), 0);
    assert!(backend.draws().is_empty());
}

/// Convolution refuses an environment no projection has written.
#[rstest]
#[case::software(Backend::Software)]
#[case::wgpu(Backend::Wgpu)]
fn test_unpopulated_environment_rejected(#[case] backend: Backend) {
    let Some(mut ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    let backend = ctx.backend();

    let environment = Cubemap::allocate(backend, 16, "environment").expect("allocate");
    let mut irradiance = Cubemap::allocate(backend, 4, "irradiance").expect("allocate");
    let proxy = backend.upload_mesh(&Shape::Cube.mesh()).expect("upload mesh");

    let result = with_capture_target(backend, |backend, target| {
        target.resize(backend, 16)?;
        target.resize(backend, 4)?;
        convolve_irradiance(
            backend,
            &environment,
            CubeCaptureTransform::shared(),
            target,
            &mut irradiance,
            proxy,
            std::f32::consts::PI / 16.0,
            true,
        )
    });

    assert!(matches!(result, Err(CaptureError::EnvironmentNotPopulated { .. })));
    assert!(!irradiance.is_populated());
    assert_eq!(backend.bound_framebuffer(), None);

    backend.destroy_mesh(proxy);
    environment.destroy(backend);
    irradiance.destroy(backend);
}

// ============================================================================
// Completeness Tests
// ============================================================================

/// Depth storage that disagrees with the colour attachment is incomplete.
#[rstest]
#[case::software(Backend::Software)]
#[case::wgpu(Backend::Wgpu)]
fn test_mismatched_depth_is_incomplete(#[case] backend: Backend) {
    let Some(mut ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    let backend = ctx.backend();

    let cube = backend
        .create_texture(&TextureDescriptor::new_cube(8, Cubemap::FORMAT))
        .expect("create cubemap");
    let framebuffer = backend.create_framebuffer("mismatch").expect("create framebuffer");
    let depth = backend.create_renderbuffer(16, 16).expect("create renderbuffer");

    assert_eq!(
        backend.framebuffer_status(framebuffer).expect("status"),
        FramebufferStatus::MissingAttachment
    );

    backend.attach_depth(framebuffer, depth).expect("attach depth");
    backend.attach_color(framebuffer, cube, 0).expect("attach color");
    assert_eq!(
        backend.framebuffer_status(framebuffer).expect("status"),
        FramebufferStatus::IncompleteDimensions
    );

    backend.renderbuffer_storage(depth, 8, 8).expect("resize depth");
    assert_eq!(
        backend.framebuffer_status(framebuffer).expect("status"),
        FramebufferStatus::Complete
    );

    backend.destroy_framebuffer(framebuffer);
    backend.destroy_renderbuffer(depth);
    backend.destroy_texture(cube);
}

/// Lenient capture logs and skips faces it cannot render; strict capture fails.
#[rstest]
#[case::software(Backend::Software)]
#[case::wgpu(Backend::Wgpu)]
fn test_incomplete_faces_strict_and_lenient(#[case] backend: Backend) {
    let Some(mut ctx) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    let backend = ctx.backend();

    let hdr = HdrTexture::upload(backend, red_corner_image()).expect("upload hdr");
    let proxy = backend.upload_mesh(&Shape::Cube.mesh()).expect("upload mesh");
    let rig = CubeCaptureTransform::shared();

    // Target sized for 16 while the destination faces are 8
    let mut lenient_dest = Cubemap::allocate(backend, 8, "lenient").expect("allocate");
    let report = with_capture_target(backend, |backend, target| {
        target.resize(backend, 16)?;
        project_equirectangular(backend, &hdr, rig, target, &mut lenient_dest, proxy, false)
    })
    .expect("lenient capture reports instead of failing");
    assert_eq!(report.faces_captured, 0);
    assert_eq!(report.incomplete_faces, CubeFace::ALL.to_vec());
    assert!(!report.is_complete());
    assert!(!lenient_dest.is_populated());

    // A skipped projection cannot feed the convolution, even in lenient mode
    let mut irradiance = Cubemap::allocate(backend, 4, "irradiance").expect("allocate");
    let result = with_capture_target(backend, |backend, target| {
        target.resize(backend, 16)?;
        target.resize(backend, 4)?;
        convolve_irradiance(
            backend,
            &lenient_dest,
            rig,
            target,
            &mut irradiance,
            proxy,
            std::f32::consts::PI / 16.0,
            false,
        )
    });
    assert!(matches!(result, Err(CaptureError::EnvironmentNotPopulated { .. })));
    assert!(!irradiance.is_populated());
    irradiance.destroy(backend);

    let mut strict_dest = Cubemap::allocate(backend, 8, "strict").expect("allocate");
    let result = with_capture_target(backend, |backend, target| {
        target.resize(backend, 16)?;
        project_equirectangular(backend, &hdr, rig, target, &mut strict_dest, proxy, true)
    });
    assert!(matches!(
        result,
        Err(CaptureError::ResolutionMismatch { target: 16, cubemap: 8 })
    ));
    assert!(!strict_dest.is_populated());
    assert_eq!(backend.viewport(), Viewport::new(SURFACE_SIZE.0, SURFACE_SIZE.1));

    lenient_dest.destroy(backend);
    strict_dest.destroy(backend);
    backend.destroy_mesh(proxy);
    hdr.destroy(backend);
}
