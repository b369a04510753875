//! Per-texel evaluation of the capture programs

use crate::backend::types::{CaptureDraw, CaptureProgram, SamplerDescriptor, Viewport};
use crate::capture::convolver::convolve_direction;
use crate::capture::mapping::direction_to_equirect_uv;
use crate::resources::{sample_cube, TexelView};
use glam::{Vec3, Vec4};

/// Source texture as seen by a fragment program
pub(super) enum SourceView<'a> {
    Flat {
        view: TexelView<'a>,
        sampler: SamplerDescriptor,
    },
    Cube {
        faces: &'a [Vec<f32>],
        face_size: u32,
    },
}

/// Rasterize the proxy geometry into `target`.
///
/// The proxy surrounds the camera, so every texel inside the viewport is
/// covered. The viewport is clipped to the attachment first. Texel rows run top to bottom; clip-space Y is flipped to match
/// the GPU capture vertex stage.
pub(super) fn rasterize(
    draw: &CaptureDraw,
    source: &SourceView<'_>,
    viewport: Viewport,
    target: &mut [f32],
    target_width: u32,
    target_height: u32,
) {
    let Some(viewport) = viewport.clamped_to(target_width, target_height) else {
        return;
    };
    let inverse = (draw.projection * draw.view * draw.model).inverse();

    for py in viewport.y..viewport.y + viewport.height {
        for px in viewport.x..viewport.x + viewport.width {
            let ndc_x = (px - viewport.x) as f32 + 0.5;
            let ndc_y = (py - viewport.y) as f32 + 0.5;
            let ndc_x = ndc_x / viewport.width as f32 * 2.0 - 1.0;
            let ndc_y = ndc_y / viewport.height as f32 * 2.0 - 1.0;

            // Camera sits at the local origin, so the far-plane point gives the direction
            let far = inverse * Vec4::new(ndc_x, ndc_y, 1.0, 1.0);
            let local = far.truncate() / far.w;

            let color = shade(draw.program, source, local);
            let i = ((py * target_width + px) * 4) as usize;
            target[i..i + 4].copy_from_slice(&[color.x, color.y, color.z, 1.0]);
        }
    }
}

fn shade(program: CaptureProgram, source: &SourceView<'_>, local_pos: Vec3) -> Vec3 {
    match (program, source) {
        (CaptureProgram::EquirectangularToCubemap, SourceView::Flat { view, sampler }) => {
            let uv = direction_to_equirect_uv(local_pos);
            view.sample(uv, sampler).truncate()
        }
        (CaptureProgram::IrradianceConvolution { sample_delta }, SourceView::Cube { faces, face_size }) => {
            convolve_direction(local_pos, sample_delta, |dir| sample_cube(*faces, *face_size, dir))
        }
        // Mismatched source dimensions are rejected before rasterizing
        _ => Vec3::ZERO,
    }
}
