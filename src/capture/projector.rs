//! Equirectangular to cubemap projection pass

use crate::backend::traits::{CaptureBackend, MeshHandle};
use crate::backend::types::CaptureProgram;
use crate::capture::rig::CubeCaptureTransform;
use crate::capture::target::CaptureTarget;
use crate::capture::{CaptureError, PassReport};
use crate::resources::{Cubemap, HdrTexture};

/// Project the HDR texture onto the six faces of `destination`.
///
/// The target must already be sized to the destination's face resolution.
/// The destination is marked populated only when all six faces were written;
/// a lenient pass that skipped faces leaves it unpopulated.
pub fn project_equirectangular<B: CaptureBackend + ?Sized>(
    backend: &mut B,
    hdr: &HdrTexture,
    rig: &CubeCaptureTransform,
    target: &CaptureTarget,
    destination: &mut Cubemap,
    proxy: MeshHandle,
    strict: bool,
) -> Result<PassReport, CaptureError> {
    let report = target.capture_faces(
        backend,
        rig,
        CaptureProgram::EquirectangularToCubemap,
        hdr.texture(),
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
    log::info!(
        "Projected {}x{} HDR onto '{}' ({} faces at {}x{})",
        hdr.size().0,
        hdr.size().1,
        destination.label(),
        report.faces_captured,
        destination.face_size(),
        destination.face_size()
    );
    Ok(report)
}
