//! Common types shared between backends

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3};

use crate::backend::traits::{MeshHandle, TextureHandle};

/// Texture format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8UnormSrgb,
    Bgra8UnormSrgb,
    Rgba16Float,
    Rgba32Float,
    Depth24Plus,
    Depth32Float,
}

impl TextureFormat {
    /// Formats the capture passes may write radiance into
    pub fn is_float_color(&self) -> bool {
        matches!(self, TextureFormat::Rgba16Float | TextureFormat::Rgba32Float)
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            TextureFormat::Rgba8UnormSrgb
            | TextureFormat::Bgra8UnormSrgb
            | TextureFormat::Depth24Plus
            | TextureFormat::Depth32Float => 4,
            TextureFormat::Rgba16Float => 8,
            TextureFormat::Rgba32Float => 16,
        }
    }
}

/// Texture usage flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureUsage(u32);

impl TextureUsage {
    pub const COPY_SRC: Self = Self(1 << 0);
    pub const COPY_DST: Self = Self(1 << 1);
    pub const TEXTURE_BINDING: Self = Self(1 << 2);
    pub const RENDER_ATTACHMENT: Self = Self(1 << 3);

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for TextureUsage {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Texture dimensionality
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureDimension {
    D2,
    /// Six square layers in +X, -X, +Y, -Y, +Z, -Z order
    Cube,
}

/// Filter mode for samplers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    Nearest,
    Linear,
}

/// Address mode for samplers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMode {
    ClampToEdge,
    Repeat,
}

/// Sampling state bound to a texture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerDescriptor {
    pub mag_filter: FilterMode,
    pub min_filter: FilterMode,
    pub address_mode_u: AddressMode,
    pub address_mode_v: AddressMode,
}

impl Default for SamplerDescriptor {
    fn default() -> Self {
        Self::linear_clamp()
    }
}

impl SamplerDescriptor {
    pub fn linear_clamp() -> Self {
        Self {
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            address_mode_u: AddressMode::ClampToEdge,
            address_mode_v: AddressMode::ClampToEdge,
        }
    }
}

/// Texture descriptor
///
/// Textures never carry a mip chain here: every sampled texture in the capture
/// pipeline is read at level 0.
#[derive(Debug, Clone)]
pub struct TextureDescriptor {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub dimension: TextureDimension,
    pub format: TextureFormat,
    pub usage: TextureUsage,
    pub sampler: SamplerDescriptor,
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            width: 1,
            height: 1,
            dimension: TextureDimension::D2,
            format: TextureFormat::Rgba16Float,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
            sampler: SamplerDescriptor::default(),
        }
    }
}

impl TextureDescriptor {
    pub fn new_2d(width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            width,
            height,
            format,
            ..Default::default()
        }
    }

    /// A cubemap that capture passes render into and later passes sample from
    pub fn new_cube(face_size: u32, format: TextureFormat) -> Self {
        Self {
            width: face_size,
            height: face_size,
            dimension: TextureDimension::Cube,
            format,
            usage: TextureUsage::TEXTURE_BINDING
                | TextureUsage::RENDER_ATTACHMENT
                | TextureUsage::COPY_SRC,
            ..Default::default()
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn with_sampler(mut self, sampler: SamplerDescriptor) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn layers(&self) -> u32 {
        match self.dimension {
            TextureDimension::D2 => 1,
            TextureDimension::Cube => 6,
        }
    }
}

/// Vertex with position, normal and UV
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
}

/// Pixel rectangle rasterization is confined to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }

    pub fn square(size: u32) -> Self {
        Self::new(size, size)
    }

    /// Intersection with a `width` x `height` attachment, `None` if empty
    pub fn clamped_to(&self, width: u32, height: u32) -> Option<Viewport> {
        let x_end = (self.x + self.width).min(width);
        let y_end = (self.y + self.height).min(height);
        (x_end > self.x && y_end > self.y).then(|| Viewport {
            x: self.x,
            y: self.y,
            width: x_end - self.x,
            height: y_end - self.y,
        })
    }
}

/// Result of a framebuffer completeness query.
///
/// Numeric codes follow the OpenGL `glCheckFramebufferStatus` values so logs
/// can be compared against driver documentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramebufferStatus {
    Complete,
    IncompleteAttachment,
    MissingAttachment,
    IncompleteDimensions,
    Unsupported,
}

impl FramebufferStatus {
    pub fn code(&self) -> u32 {
        match self {
            FramebufferStatus::Complete => 0x8CD5,
            FramebufferStatus::IncompleteAttachment => 0x8CD6,
            FramebufferStatus::MissingAttachment => 0x8CD7,
            FramebufferStatus::IncompleteDimensions => 0x8CD9,
            FramebufferStatus::Unsupported => 0x8CDD,
        }
    }

    pub fn is_complete(&self) -> bool {
        *self == FramebufferStatus::Complete
    }
}

impl std::fmt::Display for FramebufferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FramebufferStatus::Complete => "complete",
            FramebufferStatus::IncompleteAttachment => "incomplete attachment",
            FramebufferStatus::MissingAttachment => "missing attachment",
            FramebufferStatus::IncompleteDimensions => "incomplete dimensions",
            FramebufferStatus::Unsupported => "unsupported",
        };
        write!(f, "{:#06X} ({})", self.code(), name)
    }
}

/// Fragment program run by a capture draw
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CaptureProgram {
    /// Samples a 2D equirectangular texture along the fragment direction
    EquirectangularToCubemap,
    /// Cosine-weighted hemisphere integral of a cubemap around the fragment direction
    IrradianceConvolution { sample_delta: f32 },
}

impl CaptureProgram {
    pub fn name(&self) -> &'static str {
        match self {
            CaptureProgram::EquirectangularToCubemap => "equirectangular_to_cubemap",
            CaptureProgram::IrradianceConvolution { .. } => "irradiance_convolution",
        }
    }
}

/// One proxy-geometry draw into the bound capture framebuffer.
///
/// The colour and depth attachments are cleared before the draw; depth is
/// never tested since the proxy only generates directions.
#[derive(Debug, Clone)]
pub struct CaptureDraw {
    pub program: CaptureProgram,
    pub source: TextureHandle,
    pub mesh: MeshHandle,
    pub projection: Mat4,
    pub view: Mat4,
    pub model: Mat4,
    pub clear_color: [f32; 4],
}
