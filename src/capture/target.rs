//! Capture framebuffer lifecycle
//!
//! One framebuffer and one depth renderbuffer serve both capture passes.
//! Resizing reallocates only the renderbuffer storage and the viewport. The
//! target moves strictly forward through its states:
//!
//! `Unallocated -> Allocated(high) -> Allocated(low) -> Released`

use glam::{Mat4, Vec3};

use crate::backend::traits::{CaptureBackend, FramebufferHandle, MeshHandle, RenderbufferHandle, TextureHandle};
use crate::backend::types::{CaptureDraw, CaptureProgram, Viewport};
use crate::capture::rig::CubeCaptureTransform;
use crate::capture::{CaptureError, PassReport};
use crate::resources::{CubeFace, Cubemap};

/// Scale applied to the two-unit proxy cube so it renders as a unit cube
pub const PROXY_SCALE: f32 = 0.5;

/// Lifecycle state of a [`CaptureTarget`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetState {
    Unallocated,
    /// Sized for the first (environment) pass
    HighRes(u32),
    /// Shrunk for the second (irradiance) pass
    LowRes(u32),
    Released,
}

/// The reusable offscreen framebuffer and its depth renderbuffer
#[derive(Debug)]
pub struct CaptureTarget {
    framebuffer: FramebufferHandle,
    depth: RenderbufferHandle,
    state: TargetState,
}

impl CaptureTarget {
    /// Create the framebuffer and an empty depth renderbuffer
    pub fn acquire<B: CaptureBackend + ?Sized>(backend: &mut B) -> Result<Self, CaptureError> {
        let framebuffer = backend.create_framebuffer("capture")?;
        let depth = match backend.create_renderbuffer(0, 0) {
            Ok(depth) => depth,
            Err(e) => {
                backend.destroy_framebuffer(framebuffer);
                return Err(e.into());
            }
        };

        log::debug!(
            "Acquired capture target (framebuffer {}, renderbuffer {})",
            framebuffer.id(),
            depth.id()
        );
        Ok(Self {
            framebuffer,
            depth,
            state: TargetState::Unallocated,
        })
    }

    pub fn framebuffer(&self) -> FramebufferHandle {
        self.framebuffer
    }

    pub fn depth_renderbuffer(&self) -> RenderbufferHandle {
        self.depth
    }

    pub fn state(&self) -> TargetState {
        self.state
    }

    /// Current square resolution, if storage is allocated
    pub fn resolution(&self) -> Option<u32> {
        match self.state {
            TargetState::HighRes(r) | TargetState::LowRes(r) => Some(r),
            TargetState::Unallocated | TargetState::Released => None,
        }
    }

    /// Size depth storage and viewport for the next pass.
    ///
    /// The first resize allocates the high resolution; the second must be
    /// strictly smaller. Any other transition fails without touching the
    /// backend.
    pub fn resize<B: CaptureBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        resolution: u32,
    ) -> Result<(), CaptureError> {
        let next = match self.state {
            _ if resolution == 0 => None,
            TargetState::Unallocated => Some(TargetState::HighRes(resolution)),
            TargetState::HighRes(high) if resolution < high => Some(TargetState::LowRes(resolution)),
            _ => None,
        };
        let Some(next) = next else {
            return Err(CaptureError::InvalidTransition {
                from: self.state,
                resolution,
            });
        };

        backend.bind_framebuffer(Some(self.framebuffer));
        backend.renderbuffer_storage(self.depth, resolution, resolution)?;
        if self.state == TargetState::Unallocated {
            backend.attach_depth(self.framebuffer, self.depth)?;
        }
        backend.set_viewport(Viewport::square(resolution));

        log::debug!("Capture target {:?} -> {:?}", self.state, next);
        self.state = next;
        Ok(())
    }

    /// Render the six faces of `destination` with a capture program.
    ///
    /// Each face is attached and checked for completeness before its draw.
    /// In strict mode an incomplete face aborts the pass; otherwise it is
    /// logged, skipped, and listed in the report.
    #[allow(clippy::too_many_arguments)]
    pub fn capture_faces<B: CaptureBackend + ?Sized>(
        &self,
        backend: &mut B,
        rig: &CubeCaptureTransform,
        program: CaptureProgram,
        source: TextureHandle,
        proxy: MeshHandle,
        destination: &Cubemap,
        strict: bool,
    ) -> Result<PassReport, CaptureError> {
        let mut report = PassReport::new(program.name(), destination.face_size());

        if self.resolution() != Some(destination.face_size()) {
            let err = CaptureError::ResolutionMismatch {
                target: self.resolution().unwrap_or(0),
                cubemap: destination.face_size(),
            };
            if strict {
                return Err(err);
            }
            log::warn!("{}", err);
        }

        let model = Mat4::from_scale(Vec3::splat(PROXY_SCALE));
        backend.bind_framebuffer(Some(self.framebuffer));

        for face in CubeFace::ALL {
            backend.attach_color(self.framebuffer, destination.texture(), face.layer())?;

            let status = backend.framebuffer_status(self.framebuffer)?;
            if !status.is_complete() {
                if strict {
                    return Err(CaptureError::FramebufferIncomplete {
                        framebuffer: self.framebuffer.id(),
                        face,
                        status,
                    });
                }
                log::error!(
                    "Framebuffer {} incomplete for face {} of '{}': {}",
                    self.framebuffer.id(),
                    face,
                    destination.label(),
                    status
                );
                report.incomplete_faces.push(face);
                continue;
            }
            log::debug!(
                "Capturing face {} of '{}' with {}",
                face,
                destination.label(),
                program.name()
            );

            backend.draw_capture(&CaptureDraw {
                program,
                source,
                mesh: proxy,
                projection: rig.projection,
                view: rig.view(face),
                model,
                clear_color: [0.0, 0.0, 0.0, 1.0],
            })?;
            report.faces_captured += 1;
        }

        Ok(report)
    }

    /// Bind the window framebuffer, restore its viewport, and destroy the
    /// capture objects. Safe to call from any state.
    pub fn release<B: CaptureBackend + ?Sized>(&mut self, backend: &mut B) {
        if self.state == TargetState::Released {
            return;
        }

        backend.bind_framebuffer(None);
        let (width, height) = backend.surface_size();
        backend.set_viewport(Viewport::new(width, height));

        backend.destroy_framebuffer(self.framebuffer);
        backend.destroy_renderbuffer(self.depth);

        log::debug!("Released capture target, viewport restored to {}x{}", width, height);
        self.state = TargetState::Released;
    }
}

/// Run `f` with a freshly acquired capture target, releasing it on every
/// exit path.
pub fn with_capture_target<B, T, F>(backend: &mut B, f: F) -> Result<T, CaptureError>
where
    B: CaptureBackend + ?Sized,
    F: FnOnce(&mut B, &mut CaptureTarget) -> Result<T, CaptureError>,
{
    let mut target = CaptureTarget::acquire(backend)?;
    let result = f(backend, &mut target);
    target.release(backend);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::software::SoftwareBackend;

    #[test]
    fn test_acquire_starts_unallocated() {
        let mut backend = SoftwareBackend::new(800, 600);
        let target = CaptureTarget::acquire(&mut backend).unwrap();
        assert_eq!(target.state(), TargetState::Unallocated);
        assert_eq!(target.resolution(), None);
        assert_eq!(backend.framebuffer_count(), 1);
        assert_eq!(backend.renderbuffer_count(), 1);
    }

    #[test]
    fn test_resize_high_then_low() {
        let mut backend = SoftwareBackend::new(800, 600);
        let mut target = CaptureTarget::acquire(&mut backend).unwrap();

        target.resize(&mut backend, 64).unwrap();
        assert_eq!(target.state(), TargetState::HighRes(64));
        assert_eq!(backend.viewport(), Viewport::square(64));
        assert_eq!(backend.renderbuffer_size(target.depth_renderbuffer()), Some((64, 64)));
        assert_eq!(backend.bound_framebuffer(), Some(target.framebuffer()));

        target.resize(&mut backend, 8).unwrap();
        assert_eq!(target.state(), TargetState::LowRes(8));
        assert_eq!(backend.viewport(), Viewport::square(8));
        assert_eq!(backend.renderbuffer_size(target.depth_renderbuffer()), Some((8, 8)));
    }

    #[test]
    fn test_resize_must_shrink() {
        let mut backend = SoftwareBackend::new(800, 600);
        let mut target = CaptureTarget::acquire(&mut backend).unwrap();
        target.resize(&mut backend, 32).unwrap();

        let err = target.resize(&mut backend, 32).unwrap_err();
        assert!(matches!(
            err,
            CaptureError::InvalidTransition {
                from: TargetState::HighRes(32),
                resolution: 32
            }
        ));
        // Failed transitions leave the backend untouched
        assert_eq!(backend.viewport(), Viewport::square(32));
    }

    #[test]
    fn test_no_third_resolution() {
        let mut backend = SoftwareBackend::new(800, 600);
        let mut target = CaptureTarget::acquire(&mut backend).unwrap();
        target.resize(&mut backend, 32).unwrap();
        target.resize(&mut backend, 16).unwrap();
        assert!(target.resize(&mut backend, 8).is_err());
        assert_eq!(target.state(), TargetState::LowRes(16));
    }

    #[test]
    fn test_zero_resolution_rejected() {
        let mut backend = SoftwareBackend::new(800, 600);
        let mut target = CaptureTarget::acquire(&mut backend).unwrap();
        assert!(target.resize(&mut backend, 0).is_err());
        assert_eq!(target.state(), TargetState::Unallocated);
    }

    #[test]
    fn test_release_restores_window_viewport() {
        let mut backend = SoftwareBackend::new(800, 600);
        backend.set_surface_size(1600, 1200);
        let mut target = CaptureTarget::acquire(&mut backend).unwrap();
        target.resize(&mut backend, 16).unwrap();

        target.release(&mut backend);
        assert_eq!(target.state(), TargetState::Released);
        assert_eq!(backend.viewport(), Viewport::new(1600, 1200));
        assert_eq!(backend.bound_framebuffer(), None);
        assert_eq!(backend.framebuffer_count(), 0);
        assert_eq!(backend.renderbuffer_count(), 0);

        assert!(target.resize(&mut backend, 8).is_err());
    }

    #[test]
    fn test_scoped_target_released_on_error() {
        let mut backend = SoftwareBackend::new(320, 240);
        let result: Result<(), CaptureError> = with_capture_target(&mut backend, |backend, target| {
            target.resize(backend, 16)?;
            target.resize(backend, 32)?;
            Ok(())
        });

        assert!(result.is_err());
        assert_eq!(backend.framebuffer_count(), 0);
        assert_eq!(backend.renderbuffer_count(), 0);
        assert_eq!(backend.viewport(), Viewport::new(320, 240));
    }
}
