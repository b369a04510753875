//! Core backend abstraction traits
//!
//! These traits define the interface that both the wgpu and the software
//! backends implement. The surface is deliberately shaped like the classic
//! framebuffer-object API: one framebuffer with a colour attachment that is
//! re-pointed at every cube face, and a depth renderbuffer whose storage is
//! reallocated between passes.

use crate::backend::types::*;
use crate::resources::Mesh;
use thiserror::Error;

/// Backend error type
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Failed to initialize backend: {0}")]
    InitializationFailed(String),
    #[error("Failed to create surface: {0}")]
    SurfaceCreationFailed(String),
    #[error("Failed to create device: {0}")]
    DeviceCreationFailed(String),
    #[error("Failed to acquire next image: {0}")]
    AcquireImageFailed(String),
    #[error("Failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("Unknown {kind} handle {id}")]
    UnknownHandle { kind: &'static str, id: u64 },
    #[error("Invalid upload: {0}")]
    InvalidUpload(String),
    #[error("Readback failed: {0}")]
    ReadbackFailed(String),
    #[error("GPU validation error: {0}")]
    Validation(String),
    #[error("Surface lost")]
    SurfaceLost,
    #[error("Out of memory")]
    OutOfMemory,
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Handle to a texture (2D or cube)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub(crate) u64);

/// Handle to an offscreen framebuffer object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferHandle(pub(crate) u64);

/// Handle to a depth renderbuffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderbufferHandle(pub(crate) u64);

/// Handle to uploaded proxy geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshHandle(pub(crate) u64);

macro_rules! impl_handle_id {
    ($($handle:ty),*) => {
        $(impl $handle {
            /// Raw identifier, stable for the lifetime of the resource
            pub fn id(&self) -> u64 {
                self.0
            }
        })*
    };
}

impl_handle_id!(TextureHandle, FramebufferHandle, RenderbufferHandle, MeshHandle);

/// Backend able to run the offscreen cubemap capture passes
pub trait CaptureBackend {
    /// Human readable backend name for logs
    fn name(&self) -> &'static str;

    /// Pixel size of the default (window) framebuffer
    fn surface_size(&self) -> (u32, u32);

    // Textures

    /// Create a 2D texture or cubemap
    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle>;

    /// Upload RGBA `f32` texels into one layer (cube face) of a texture
    fn write_texture(
        &mut self,
        texture: TextureHandle,
        layer: u32,
        texels: &[f32],
        width: u32,
        height: u32,
    ) -> BackendResult<()>;

    /// Read back one layer (cube face) as RGBA `f32` texels, rows top to bottom
    fn read_texture_layer(&mut self, texture: TextureHandle, layer: u32) -> BackendResult<Vec<f32>>;

    /// Destroy a texture
    fn destroy_texture(&mut self, texture: TextureHandle);

    // Geometry

    /// Upload proxy geometry used by capture draws
    fn upload_mesh(&mut self, mesh: &Mesh) -> BackendResult<MeshHandle>;

    /// Destroy uploaded geometry
    fn destroy_mesh(&mut self, mesh: MeshHandle);

    // Framebuffers

    /// Create an empty framebuffer object
    fn create_framebuffer(&mut self, label: &str) -> BackendResult<FramebufferHandle>;

    /// Destroy a framebuffer object; attachments are not destroyed
    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle);

    /// Create a depth renderbuffer with storage of the given size
    fn create_renderbuffer(&mut self, width: u32, height: u32) -> BackendResult<RenderbufferHandle>;

    /// Reallocate the storage of an existing renderbuffer
    fn renderbuffer_storage(
        &mut self,
        renderbuffer: RenderbufferHandle,
        width: u32,
        height: u32,
    ) -> BackendResult<()>;

    /// Destroy a renderbuffer
    fn destroy_renderbuffer(&mut self, renderbuffer: RenderbufferHandle);

    /// Attach a renderbuffer as the depth attachment
    fn attach_depth(
        &mut self,
        framebuffer: FramebufferHandle,
        renderbuffer: RenderbufferHandle,
    ) -> BackendResult<()>;

    /// Attach one layer (cube face) of a texture as colour attachment 0
    fn attach_color(
        &mut self,
        framebuffer: FramebufferHandle,
        texture: TextureHandle,
        layer: u32,
    ) -> BackendResult<()>;

    /// Completeness of a framebuffer in its current attachment state
    fn framebuffer_status(&self, framebuffer: FramebufferHandle) -> BackendResult<FramebufferStatus>;

    /// Bind a framebuffer for subsequent draws, `None` for the window
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>);

    /// Currently bound framebuffer
    fn bound_framebuffer(&self) -> Option<FramebufferHandle>;

    // Rasterizer state

    /// Set the viewport used by subsequent draws
    fn set_viewport(&mut self, viewport: Viewport);

    /// Current viewport
    fn viewport(&self) -> Viewport;

    // Drawing

    /// Clear the bound framebuffer and draw the proxy geometry with a capture program.
    ///
    /// Returns once the commands have been submitted.
    fn draw_capture(&mut self, draw: &CaptureDraw) -> BackendResult<()>;
}
