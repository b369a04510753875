//! Cubemap resources and face addressing

use crate::backend::traits::{BackendResult, CaptureBackend, TextureHandle};
use crate::backend::types::{SamplerDescriptor, TextureDescriptor, TextureFormat, TextureUsage};
use crate::resources::sampling::TexelView;
use glam::{Vec2, Vec3};

/// One face of a cubemap, in layer order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CubeFace {
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    PositiveZ,
    NegativeZ,
}

impl CubeFace {
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::PositiveZ,
        CubeFace::NegativeZ,
    ];

    /// Array layer of this face
    pub fn layer(self) -> u32 {
        self as u32
    }

    pub fn from_layer(layer: u32) -> Option<Self> {
        Self::ALL.get(layer as usize).copied()
    }

    /// Outward axis the face is centred on
    pub fn axis(self) -> Vec3 {
        match self {
            CubeFace::PositiveX => Vec3::X,
            CubeFace::NegativeX => Vec3::NEG_X,
            CubeFace::PositiveY => Vec3::Y,
            CubeFace::NegativeY => Vec3::NEG_Y,
            CubeFace::PositiveZ => Vec3::Z,
            CubeFace::NegativeZ => Vec3::NEG_Z,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CubeFace::PositiveX => "+X",
            CubeFace::NegativeX => "-X",
            CubeFace::PositiveY => "+Y",
            CubeFace::NegativeY => "-Y",
            CubeFace::PositiveZ => "+Z",
            CubeFace::NegativeZ => "-Z",
        }
    }
}

impl std::fmt::Display for CubeFace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// World direction through the centre of texel `(x, y)` of a face.
///
/// Rows run top to bottom, matching readback order.
pub fn face_texel_direction(face: CubeFace, x: u32, y: u32, size: u32) -> Vec3 {
    let u = (x as f32 + 0.5) / size as f32 * 2.0 - 1.0;
    let v = (y as f32 + 0.5) / size as f32 * 2.0 - 1.0;
    let dir = match face {
        CubeFace::PositiveX => Vec3::new(1.0, -v, -u),
        CubeFace::NegativeX => Vec3::new(-1.0, -v, u),
        CubeFace::PositiveY => Vec3::new(u, 1.0, v),
        CubeFace::NegativeY => Vec3::new(u, -1.0, -v),
        CubeFace::PositiveZ => Vec3::new(u, -v, 1.0),
        CubeFace::NegativeZ => Vec3::new(-u, -v, -1.0),
    };
    dir.normalize()
}

/// Face and normalized face coordinates a direction lands on.
///
/// Inverse of [`face_texel_direction`]; ties on the major axis resolve to X
/// before Y before Z.
pub fn direction_to_face_uv(dir: Vec3) -> (CubeFace, Vec2) {
    let a = dir.abs();
    let (face, sc, tc, ma) = if a.x >= a.y && a.x >= a.z {
        if dir.x >= 0.0 {
            (CubeFace::PositiveX, -dir.z, -dir.y, a.x)
        } else {
            (CubeFace::NegativeX, dir.z, -dir.y, a.x)
        }
    } else if a.y >= a.z {
        if dir.y >= 0.0 {
            (CubeFace::PositiveY, dir.x, dir.z, a.y)
        } else {
            (CubeFace::NegativeY, dir.x, -dir.z, a.y)
        }
    } else if dir.z >= 0.0 {
        (CubeFace::PositiveZ, dir.x, -dir.y, a.z)
    } else {
        (CubeFace::NegativeZ, -dir.x, -dir.y, a.z)
    };

    let uv = Vec2::new(sc / ma + 1.0, tc / ma + 1.0) * 0.5;
    (face, uv)
}

/// A floating-point cubemap living on a backend.
///
/// `populated` is set once every face has been written by a capture pass;
/// consumers refuse an unpopulated cubemap.
#[derive(Debug)]
pub struct Cubemap {
    texture: TextureHandle,
    face_size: u32,
    populated: bool,
    label: String,
}

impl Cubemap {
    pub const FORMAT: TextureFormat = TextureFormat::Rgba16Float;

    /// Allocate storage for six faces without writing them
    pub fn allocate<B: CaptureBackend + ?Sized>(
        backend: &mut B,
        face_size: u32,
        label: &str,
    ) -> BackendResult<Self> {
        let desc = TextureDescriptor::new_cube(face_size, Self::FORMAT)
            .with_label(label)
            .with_sampler(SamplerDescriptor::linear_clamp());
        let texture = backend.create_texture(&desc)?;
        log::debug!("Allocated cubemap '{}' ({}x{} per face)", label, face_size, face_size);

        Ok(Self {
            texture,
            face_size,
            populated: false,
            label: label.to_string(),
        })
    }

    /// Create a populated cubemap from faces baked elsewhere
    pub fn upload<B: CaptureBackend + ?Sized>(
        backend: &mut B,
        texels: &CubemapTexels,
        label: &str,
    ) -> BackendResult<Self> {
        let mut desc = TextureDescriptor::new_cube(texels.face_size, Self::FORMAT)
            .with_label(label)
            .with_sampler(SamplerDescriptor::linear_clamp());
        desc.usage = desc.usage | TextureUsage::COPY_DST;
        let texture = backend.create_texture(&desc)?;

        for face in CubeFace::ALL {
            let layer = &texels.faces[face.layer() as usize];
            if let Err(e) = backend.write_texture(texture, face.layer(), layer, texels.face_size, texels.face_size) {
                backend.destroy_texture(texture);
                return Err(e);
            }
        }

        Ok(Self {
            texture,
            face_size: texels.face_size,
            populated: true,
            label: label.to_string(),
        })
    }

    pub fn texture(&self) -> TextureHandle {
        self.texture
    }

    pub fn face_size(&self) -> u32 {
        self.face_size
    }

    pub fn is_populated(&self) -> bool {
        self.populated
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn mark_populated(&mut self) {
        self.populated = true;
    }

    /// Read all six faces back to the CPU
    pub fn read_back<B: CaptureBackend + ?Sized>(&self, backend: &mut B) -> BackendResult<CubemapTexels> {
        let mut faces: [Vec<f32>; 6] = Default::default();
        for face in CubeFace::ALL {
            faces[face.layer() as usize] = backend.read_texture_layer(self.texture, face.layer())?;
        }
        Ok(CubemapTexels {
            face_size: self.face_size,
            faces,
        })
    }

    pub fn destroy<B: CaptureBackend + ?Sized>(self, backend: &mut B) {
        backend.destroy_texture(self.texture);
    }
}

/// CPU copy of a cubemap's six faces
#[derive(Debug, Clone)]
pub struct CubemapTexels {
    pub face_size: u32,
    pub faces: [Vec<f32>; 6],
}

impl CubemapTexels {
    pub fn face(&self, face: CubeFace) -> TexelView<'_> {
        TexelView::new(&self.faces[face.layer() as usize], self.face_size, self.face_size)
    }

    /// RGB value of one texel
    pub fn texel(&self, face: CubeFace, x: u32, y: u32) -> Vec3 {
        self.face(face).fetch(x, y).truncate()
    }

    /// Bilinear sample along a direction, filtered within the face it hits
    pub fn sample(&self, dir: Vec3) -> Vec3 {
        sample_cube(&self.faces, self.face_size, dir)
    }

    /// Iterate `(face, x, y, rgb)` over every texel
    pub fn iter_texels(&self) -> impl Iterator<Item = (CubeFace, u32, u32, Vec3)> + '_ {
        let size = self.face_size;
        CubeFace::ALL.into_iter().flat_map(move |face| {
            (0..size).flat_map(move |y| (0..size).map(move |x| (face, x, y, self.texel(face, x, y))))
        })
    }
}

/// Bilinear cube sampling over six RGBA face buffers in layer order
pub fn sample_cube<T: AsRef<[f32]>>(faces: &[T], face_size: u32, dir: Vec3) -> Vec3 {
    let (face, uv) = direction_to_face_uv(dir);
    TexelView::new(faces[face.layer() as usize].as_ref(), face_size, face_size)
        .sample(uv, &SamplerDescriptor::linear_clamp())
        .truncate()
}
