//! Radiance (HDR) image loading and upload

use crate::backend::traits::{BackendResult, CaptureBackend, TextureHandle};
use crate::backend::types::{SamplerDescriptor, TextureDescriptor, TextureFormat, TextureUsage};
use image::DynamicImage;
use std::path::Path;
use thiserror::Error;

/// Failure to produce a radiance image
#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Failed to read radiance image '{name}': {source}")]
    Decode {
        name: String,
        #[source]
        source: image::ImageError,
    },
    #[error("Unsupported channel count {0} (expected 1, 3 or 4)")]
    UnsupportedChannels(u32),
    #[error("Pixel buffer holds {actual} samples, expected {expected}")]
    SampleCountMismatch { expected: usize, actual: usize },
    #[error("Radiance image has zero extent ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },
}

/// Floating-point equirectangular image.
///
/// Rows are stored bottom to top: the loader flips the file's top-down rows
/// so that row 0 is texture V = 0.
#[derive(Debug, Clone)]
pub struct RadianceImage {
    width: u32,
    height: u32,
    channels: u32,
    pixels: Vec<f32>,
    name: String,
}

impl RadianceImage {
    /// Load from a file; the format is detected from its contents
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ImageError> {
        let path = path.as_ref();
        let name = path.display().to_string();

        let img = image::open(path).map_err(|source| ImageError::Decode {
            name: name.clone(),
            source,
        })?;
        Self::from_image(img, &name)
    }

    /// Load from encoded bytes
    pub fn from_bytes(bytes: &[u8], name: &str) -> Result<Self, ImageError> {
        let img = image::load_from_memory(bytes).map_err(|source| ImageError::Decode {
            name: name.to_string(),
            source,
        })?;
        Self::from_image(img, name)
    }

    fn from_image(img: DynamicImage, name: &str) -> Result<Self, ImageError> {
        let (width, height) = (img.width(), img.height());
        let channels = img.color().channel_count() as u32;

        let pixels = match channels {
            1 => img.to_rgb32f().into_raw().chunks_exact(3).map(|p| p[0]).collect(),
            3 => img.to_rgb32f().into_raw(),
            4 => img.to_rgba32f().into_raw(),
            other => return Err(ImageError::UnsupportedChannels(other)),
        };

        log::info!("Radiance image '{}': {}x{}, {} channels", name, width, height, channels);
        Self::from_pixels(width, height, channels, pixels, name)
    }

    /// Build from samples in file order (rows top to bottom)
    pub fn from_pixels(
        width: u32,
        height: u32,
        channels: u32,
        pixels: Vec<f32>,
        name: &str,
    ) -> Result<Self, ImageError> {
        if !matches!(channels, 1 | 3 | 4) {
            return Err(ImageError::UnsupportedChannels(channels));
        }
        if width == 0 || height == 0 {
            return Err(ImageError::EmptyImage { width, height });
        }
        let expected = (width * height * channels) as usize;
        if pixels.len() != expected {
            return Err(ImageError::SampleCountMismatch {
                expected,
                actual: pixels.len(),
            });
        }

        Ok(Self {
            width,
            height,
            channels,
            pixels: flip_rows(pixels, (width * channels) as usize),
            name: name.to_string(),
        })
    }

    /// Uniform radiance everywhere
    pub fn constant(width: u32, height: u32, rgb: [f32; 3]) -> Self {
        Self {
            width,
            height,
            channels: 3,
            pixels: rgb.repeat((width * height) as usize),
            name: "constant".to_string(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u32 {
        self.channels
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Samples in texture order (rows bottom to top)
    pub fn pixels(&self) -> &[f32] {
        &self.pixels
    }

    /// Expand to RGBA with alpha 1; single-channel images are splatted to grey
    pub fn to_rgba(&self) -> Vec<f32> {
        let mut rgba = Vec::with_capacity((self.width * self.height * 4) as usize);
        for pixel in self.pixels.chunks_exact(self.channels as usize) {
            match *pixel {
                [l] => rgba.extend_from_slice(&[l, l, l, 1.0]),
                [r, g, b] => rgba.extend_from_slice(&[r, g, b, 1.0]),
                _ => rgba.extend_from_slice(pixel),
            }
        }
        rgba
    }
}

fn flip_rows(pixels: Vec<f32>, row_len: usize) -> Vec<f32> {
    pixels.chunks_exact(row_len).rev().flatten().copied().collect()
}

/// The equirectangular source texture on a backend
#[derive(Debug)]
pub struct HdrTexture {
    texture: TextureHandle,
    width: u32,
    height: u32,
}

impl HdrTexture {
    /// Upload an image and release its CPU samples.
    ///
    /// The texture is linear filtered, clamped, and has no mip chain. On a
    /// failed upload the texture is destroyed before returning.
    pub fn upload<B: CaptureBackend + ?Sized>(
        backend: &mut B,
        image: RadianceImage,
    ) -> BackendResult<Self> {
        let (width, height) = (image.width, image.height);
        let desc = TextureDescriptor {
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST | TextureUsage::COPY_SRC,
            ..TextureDescriptor::new_2d(width, height, TextureFormat::Rgba16Float)
        }
        .with_label(&image.name)
        .with_sampler(SamplerDescriptor::linear_clamp());

        let texture = backend.create_texture(&desc)?;
        let texels = image.to_rgba();
        drop(image);

        if let Err(e) = backend.write_texture(texture, 0, &texels, width, height) {
            backend.destroy_texture(texture);
            return Err(e);
        }

        log::debug!("Uploaded HDR texture {}x{}", width, height);
        Ok(Self {
            texture,
            width,
            height,
        })
    }

    pub fn texture(&self) -> TextureHandle {
        self.texture
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn destroy<B: CaptureBackend + ?Sized>(self, backend: &mut B) {
        backend.destroy_texture(self.texture);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_are_flipped() {
        // 1x2, top row red, bottom row blue
        let pixels = vec![1.0, 0.0, 0.0, 0.0, 0.0, 1.0];
        let img = RadianceImage::from_pixels(1, 2, 3, pixels, "flip").unwrap();
        assert_eq!(img.pixels(), &[0.0, 0.0, 1.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_unsupported_channels() {
        let err = RadianceImage::from_pixels(1, 1, 2, vec![0.0; 2], "la").unwrap_err();
        assert!(matches!(err, ImageError::UnsupportedChannels(2)));
    }

    #[test]
    fn test_sample_count_mismatch() {
        let err = RadianceImage::from_pixels(2, 2, 3, vec![0.0; 11], "short").unwrap_err();
        assert!(matches!(
            err,
            ImageError::SampleCountMismatch {
                expected: 12,
                actual: 11
            }
        ));
    }

    #[test]
    fn test_zero_extent() {
        let err = RadianceImage::from_pixels(0, 4, 3, Vec::new(), "empty").unwrap_err();
        assert!(matches!(err, ImageError::EmptyImage { width: 0, height: 4 }));
    }

    #[test]
    fn test_luminance_expands_to_grey() {
        let img = RadianceImage::from_pixels(2, 1, 1, vec![0.5, 2.0], "luma").unwrap();
        assert_eq!(img.to_rgba(), vec![0.5, 0.5, 0.5, 1.0, 2.0, 2.0, 2.0, 1.0]);
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = RadianceImage::from_file("does/not/exist.hdr").unwrap_err();
        assert!(matches!(err, ImageError::Decode { .. }));
        assert!(err.to_string().contains("does/not/exist.hdr"));
    }

    #[test]
    fn test_garbage_bytes_fail_to_decode() {
        let err = RadianceImage::from_bytes(b"not an image", "garbage").unwrap_err();
        assert!(matches!(err, ImageError::Decode { .. }));
    }
}
