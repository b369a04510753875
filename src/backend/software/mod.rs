//! CPU reference backend
//!
//! Implements the capture contract without a GPU. Capture draws evaluate the
//! same fragment programs as the WGSL shaders, texel by texel, and float
//! textures are stored with half-float precision like their GPU
//! counterparts. Every draw is recorded so callers can inspect which face
//! was written at which resolution.

mod raster;

use std::collections::HashMap;

use half::f16;

use crate::backend::framebuffer::{ColorAttachmentState, FramebufferState};
use crate::backend::traits::*;
use crate::backend::types::*;
use crate::resources::{Mesh, TexelView};

use raster::SourceView;

/// One executed capture draw
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    pub framebuffer: FramebufferHandle,
    pub program: CaptureProgram,
    pub target: TextureHandle,
    pub layer: u32,
    pub attachment_size: (u32, u32),
    pub viewport: Viewport,
}

struct SoftwareTexture {
    desc: TextureDescriptor,
    layers: Vec<Vec<f32>>,
}

struct SoftwareMesh {
    name: String,
    index_count: usize,
}

/// Software capture backend
pub struct SoftwareBackend {
    surface_size: (u32, u32),
    textures: HashMap<u64, SoftwareTexture>,
    meshes: HashMap<u64, SoftwareMesh>,
    framebuffers: HashMap<u64, FramebufferState>,
    renderbuffers: HashMap<u64, (u32, u32)>,
    bound_framebuffer: Option<FramebufferHandle>,
    viewport: Viewport,
    draws: Vec<DrawRecord>,
    next_texture_id: u64,
    next_mesh_id: u64,
    next_framebuffer_id: u64,
    next_renderbuffer_id: u64,
}

impl SoftwareBackend {
    /// Create a backend whose default framebuffer has the given pixel size
    pub fn new(width: u32, height: u32) -> Self {
        log::info!("Software capture backend ({}x{} surface)", width, height);
        Self {
            surface_size: (width, height),
            textures: HashMap::new(),
            meshes: HashMap::new(),
            framebuffers: HashMap::new(),
            renderbuffers: HashMap::new(),
            bound_framebuffer: None,
            viewport: Viewport::new(width, height),
            draws: Vec::new(),
            next_texture_id: 1,
            next_mesh_id: 1,
            next_framebuffer_id: 1,
            next_renderbuffer_id: 1,
        }
    }

    /// Change the default framebuffer size, as a window resize would
    pub fn set_surface_size(&mut self, width: u32, height: u32) {
        self.surface_size = (width, height);
    }

    /// Capture draws executed so far, in submission order
    pub fn draws(&self) -> &[DrawRecord] {
        &self.draws
    }

    /// Number of live textures
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Number of live framebuffers
    pub fn framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }

    /// Number of live renderbuffers
    pub fn renderbuffer_count(&self) -> usize {
        self.renderbuffers.len()
    }

    /// Current storage size of a renderbuffer
    pub fn renderbuffer_size(&self, renderbuffer: RenderbufferHandle) -> Option<(u32, u32)> {
        self.renderbuffers.get(&renderbuffer.0).copied()
    }

    fn texture(&self, handle: TextureHandle) -> BackendResult<&SoftwareTexture> {
        self.textures.get(&handle.0).ok_or(BackendError::UnknownHandle {
            kind: "texture",
            id: handle.0,
        })
    }

    fn framebuffer_state(&self, handle: FramebufferHandle) -> BackendResult<&FramebufferState> {
        self.framebuffers.get(&handle.0).ok_or(BackendError::UnknownHandle {
            kind: "framebuffer",
            id: handle.0,
        })
    }

    fn depth_size(&self, state: &FramebufferState) -> Option<(u32, u32)> {
        state
            .depth
            .and_then(|rb| self.renderbuffers.get(&rb.0).copied())
    }
}

/// Round texels through the storage precision of a format
fn quantize(format: TextureFormat, texels: &mut [f32]) {
    if format == TextureFormat::Rgba16Float {
        for t in texels.iter_mut() {
            *t = f16::from_f32(*t).to_f32();
        }
    }
}

impl CaptureBackend for SoftwareBackend {
    fn name(&self) -> &'static str {
        "software"
    }

    fn surface_size(&self) -> (u32, u32) {
        self.surface_size
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::TextureCreationFailed(format!(
                "zero-sized texture {:?}",
                desc.label
            )));
        }
        if desc.dimension == TextureDimension::Cube && desc.width != desc.height {
            return Err(BackendError::TextureCreationFailed(format!(
                "cube faces must be square, got {}x{}",
                desc.width, desc.height
            )));
        }

        let id = self.next_texture_id;
        self.next_texture_id += 1;

        let layer_len = (desc.width * desc.height * 4) as usize;
        self.textures.insert(
            id,
            SoftwareTexture {
                desc: desc.clone(),
                layers: vec![vec![0.0; layer_len]; desc.layers() as usize],
            },
        );
        Ok(TextureHandle(id))
    }

    fn write_texture(
        &mut self,
        texture: TextureHandle,
        layer: u32,
        texels: &[f32],
        width: u32,
        height: u32,
    ) -> BackendResult<()> {
        let tex = self
            .textures
            .get_mut(&texture.0)
            .ok_or(BackendError::UnknownHandle {
                kind: "texture",
                id: texture.0,
            })?;

        if (width, height) != (tex.desc.width, tex.desc.height) {
            return Err(BackendError::InvalidUpload(format!(
                "{}x{} upload into {}x{} texture",
                width, height, tex.desc.width, tex.desc.height
            )));
        }
        if texels.len() != (width * height * 4) as usize {
            return Err(BackendError::InvalidUpload(format!(
                "{} texels for a {}x{} RGBA layer",
                texels.len(),
                width,
                height
            )));
        }
        let format = tex.desc.format;
        let Some(dst) = tex.layers.get_mut(layer as usize) else {
            return Err(BackendError::InvalidUpload(format!("layer {} out of range", layer)));
        };

        dst.copy_from_slice(texels);
        quantize(format, dst);
        Ok(())
    }

    fn read_texture_layer(&mut self, texture: TextureHandle, layer: u32) -> BackendResult<Vec<f32>> {
        let tex = self.texture(texture)?;
        tex.layers
            .get(layer as usize)
            .cloned()
            .ok_or_else(|| BackendError::ReadbackFailed(format!("layer {} out of range", layer)))
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture.0);
        for fb in self.framebuffers.values_mut() {
            fb.forget_texture(texture);
        }
    }

    fn upload_mesh(&mut self, mesh: &Mesh) -> BackendResult<MeshHandle> {
        if mesh.indices.iter().any(|&i| i as usize >= mesh.vertex_count()) {
            return Err(BackendError::InvalidUpload(format!(
                "mesh '{}' indexes past its vertices",
                mesh.name
            )));
        }

        let id = self.next_mesh_id;
        self.next_mesh_id += 1;
        self.meshes.insert(
            id,
            SoftwareMesh {
                name: mesh.name.clone(),
                index_count: mesh.index_count(),
            },
        );
        Ok(MeshHandle(id))
    }

    fn destroy_mesh(&mut self, mesh: MeshHandle) {
        self.meshes.remove(&mesh.0);
    }

    fn create_framebuffer(&mut self, label: &str) -> BackendResult<FramebufferHandle> {
        let id = self.next_framebuffer_id;
        self.next_framebuffer_id += 1;
        self.framebuffers.insert(id, FramebufferState::new(label));
        Ok(FramebufferHandle(id))
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        self.framebuffers.remove(&framebuffer.0);
        if self.bound_framebuffer == Some(framebuffer) {
            self.bound_framebuffer = None;
        }
    }

    fn create_renderbuffer(&mut self, width: u32, height: u32) -> BackendResult<RenderbufferHandle> {
        let id = self.next_renderbuffer_id;
        self.next_renderbuffer_id += 1;
        self.renderbuffers.insert(id, (width, height));
        Ok(RenderbufferHandle(id))
    }

    fn renderbuffer_storage(
        &mut self,
        renderbuffer: RenderbufferHandle,
        width: u32,
        height: u32,
    ) -> BackendResult<()> {
        let size = self
            .renderbuffers
            .get_mut(&renderbuffer.0)
            .ok_or(BackendError::UnknownHandle {
                kind: "renderbuffer",
                id: renderbuffer.0,
            })?;
        *size = (width, height);
        Ok(())
    }

    fn destroy_renderbuffer(&mut self, renderbuffer: RenderbufferHandle) {
        self.renderbuffers.remove(&renderbuffer.0);
    }

    fn attach_depth(
        &mut self,
        framebuffer: FramebufferHandle,
        renderbuffer: RenderbufferHandle,
    ) -> BackendResult<()> {
        if !self.renderbuffers.contains_key(&renderbuffer.0) {
            return Err(BackendError::UnknownHandle {
                kind: "renderbuffer",
                id: renderbuffer.0,
            });
        }
        let fb = self
            .framebuffers
            .get_mut(&framebuffer.0)
            .ok_or(BackendError::UnknownHandle {
                kind: "framebuffer",
                id: framebuffer.0,
            })?;
        fb.depth = Some(renderbuffer);
        Ok(())
    }

    fn attach_color(
        &mut self,
        framebuffer: FramebufferHandle,
        texture: TextureHandle,
        layer: u32,
    ) -> BackendResult<()> {
        let desc = self.texture(texture)?.desc.clone();
        if layer >= desc.layers() {
            return Err(BackendError::Validation(format!(
                "layer {} of a {}-layer texture",
                layer,
                desc.layers()
            )));
        }

        let fb = self
            .framebuffers
            .get_mut(&framebuffer.0)
            .ok_or(BackendError::UnknownHandle {
                kind: "framebuffer",
                id: framebuffer.0,
            })?;
        fb.color = Some(ColorAttachmentState {
            texture,
            layer,
            width: desc.width,
            height: desc.height,
            format: desc.format,
        });
        Ok(())
    }

    fn framebuffer_status(&self, framebuffer: FramebufferHandle) -> BackendResult<FramebufferStatus> {
        let state = self.framebuffer_state(framebuffer)?;
        Ok(state.status(self.depth_size(state)))
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>) {
        self.bound_framebuffer = framebuffer;
    }

    fn bound_framebuffer(&self) -> Option<FramebufferHandle> {
        self.bound_framebuffer
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn draw_capture(&mut self, draw: &CaptureDraw) -> BackendResult<()> {
        let framebuffer = self.bound_framebuffer.ok_or_else(|| {
            BackendError::Validation("capture draw with the default framebuffer bound".to_string())
        })?;
        let state = self.framebuffer_state(framebuffer)?;
        let status = state.status(self.depth_size(state));
        let color = match state.color {
            Some(color) if status.is_complete() => color,
            _ => {
                return Err(BackendError::Validation(format!(
                    "draw into framebuffer '{}' with status {}",
                    state.label, status
                )))
            }
        };

        if !self.meshes.contains_key(&draw.mesh.0) {
            return Err(BackendError::UnknownHandle {
                kind: "mesh",
                id: draw.mesh.0,
            });
        }
        if draw.source == color.texture {
            return Err(BackendError::Validation(
                "capture source is also the colour attachment".to_string(),
            ));
        }

        // Take the target out so the source can be borrowed alongside it
        let mut target = self
            .textures
            .remove(&color.texture.0)
            .ok_or(BackendError::UnknownHandle {
                kind: "texture",
                id: color.texture.0,
            })?;

        let result = (|| -> BackendResult<()> {
            let source = self.texture(draw.source)?;
            let source = match (draw.program, source.desc.dimension) {
                (CaptureProgram::EquirectangularToCubemap, TextureDimension::D2) => SourceView::Flat {
                    view: TexelView::new(
                        &source.layers[0],
                        source.desc.width,
                        source.desc.height,
                    ),
                    sampler: source.desc.sampler,
                },
                (CaptureProgram::IrradianceConvolution { .. }, TextureDimension::Cube) => SourceView::Cube {
                    faces: &source.layers,
                    face_size: source.desc.width,
                },
                (program, dimension) => {
                    return Err(BackendError::Validation(format!(
                        "{} cannot sample a {:?} texture",
                        program.name(),
                        dimension
                    )))
                }
            };

            let layer = &mut target.layers[color.layer as usize];
            let clear = draw.clear_color;
            for texel in layer.chunks_exact_mut(4) {
                texel.copy_from_slice(&clear);
            }
            raster::rasterize(draw, &source, self.viewport, layer, color.width, color.height);
            quantize(color.format, layer);
            Ok(())
        })();

        self.textures.insert(color.texture.0, target);
        result?;

        if let Some(mesh) = self.meshes.get(&draw.mesh.0) {
            log::trace!(
                "Software {} draw into texture {} layer {} ('{}', {} indices)",
                draw.program.name(),
                color.texture.0,
                color.layer,
                mesh.name,
                mesh.index_count,
            );
        }

        self.draws.push(DrawRecord {
            framebuffer,
            program: draw.program,
            target: color.texture,
            layer: color.layer,
            attachment_size: (color.width, color.height),
            viewport: self.viewport,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::Shape;
    use glam::Mat4;

    fn cube_target(backend: &mut SoftwareBackend, size: u32) -> TextureHandle {
        backend
            .create_texture(&TextureDescriptor::new_cube(size, TextureFormat::Rgba16Float))
            .unwrap()
    }

    #[test]
    fn test_write_quantizes_to_half() {
        let mut backend = SoftwareBackend::new(64, 64);
        let tex = backend
            .create_texture(&TextureDescriptor::new_2d(1, 1, TextureFormat::Rgba16Float))
            .unwrap();
        backend.write_texture(tex, 0, &[0.1, 1.0, 65504.0, 1.0], 1, 1).unwrap();

        let texels = backend.read_texture_layer(tex, 0).unwrap();
        assert_eq!(texels[0], f16::from_f32(0.1).to_f32());
        assert_eq!(&texels[1..], &[1.0, 65504.0, 1.0]);
    }

    #[test]
    fn test_write_rejects_wrong_size() {
        let mut backend = SoftwareBackend::new(64, 64);
        let tex = cube_target(&mut backend, 4);
        let err = backend.write_texture(tex, 0, &[0.0; 8], 1, 2).unwrap_err();
        assert!(matches!(err, BackendError::InvalidUpload(_)));
        let err = backend.write_texture(tex, 6, &[0.0; 64], 4, 4).unwrap_err();
        assert!(matches!(err, BackendError::InvalidUpload(_)));
    }

    #[test]
    fn test_draw_requires_bound_framebuffer() {
        let mut backend = SoftwareBackend::new(64, 64);
        let source = cube_target(&mut backend, 4);
        let mesh = backend.upload_mesh(&Shape::Cube.mesh()).unwrap();

        let err = backend
            .draw_capture(&CaptureDraw {
                program: CaptureProgram::IrradianceConvolution { sample_delta: 0.5 },
                source,
                mesh,
                projection: Mat4::IDENTITY,
                view: Mat4::IDENTITY,
                model: Mat4::IDENTITY,
                clear_color: [0.0; 4],
            })
            .unwrap_err();
        assert!(matches!(err, BackendError::Validation(_)));
        assert!(backend.draws().is_empty());
    }

    #[test]
    fn test_destroyed_attachment_leaves_framebuffer_incomplete() {
        let mut backend = SoftwareBackend::new(64, 64);
        let tex = cube_target(&mut backend, 8);
        let fb = backend.create_framebuffer("capture").unwrap();
        backend.attach_color(fb, tex, 3).unwrap();
        assert_eq!(backend.framebuffer_status(fb).unwrap(), FramebufferStatus::Complete);

        backend.destroy_texture(tex);
        assert_eq!(
            backend.framebuffer_status(fb).unwrap(),
            FramebufferStatus::MissingAttachment
        );
    }

    #[test]
    fn test_renderbuffer_storage_changes_completeness() {
        let mut backend = SoftwareBackend::new(64, 64);
        let tex = cube_target(&mut backend, 8);
        let fb = backend.create_framebuffer("capture").unwrap();
        let rb = backend.create_renderbuffer(16, 16).unwrap();
        backend.attach_depth(fb, rb).unwrap();
        backend.attach_color(fb, tex, 0).unwrap();
        assert_eq!(
            backend.framebuffer_status(fb).unwrap(),
            FramebufferStatus::IncompleteDimensions
        );

        backend.renderbuffer_storage(rb, 8, 8).unwrap();
        assert!(backend.framebuffer_status(fb).unwrap().is_complete());
        assert_eq!(backend.renderbuffer_size(rb), Some((8, 8)));
    }

    #[test]
    fn test_attach_rejects_out_of_range_layer() {
        let mut backend = SoftwareBackend::new(64, 64);
        let tex = backend
            .create_texture(&TextureDescriptor::new_2d(4, 4, TextureFormat::Rgba16Float))
            .unwrap();
        let fb = backend.create_framebuffer("capture").unwrap();
        assert!(backend.attach_color(fb, tex, 1).is_err());
    }

    #[test]
    fn test_non_square_cube_rejected() {
        let mut backend = SoftwareBackend::new(64, 64);
        let desc = TextureDescriptor {
            height: 3,
            ..TextureDescriptor::new_cube(4, TextureFormat::Rgba16Float)
        };
        assert!(matches!(
            backend.create_texture(&desc),
            Err(BackendError::TextureCreationFailed(_))
        ));
    }
}
