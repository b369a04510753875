//! CPU texel sampling
//!
//! Mirrors the fixed-function sampler the capture shaders rely on, so texels
//! read back from a backend can be compared against what the GPU would
//! fetch.

use crate::backend::types::{AddressMode, FilterMode, SamplerDescriptor};
use glam::{Vec2, Vec4};

/// Borrowed RGBA `f32` texels of one 2D image or cube face, rows top to bottom
#[derive(Debug, Clone, Copy)]
pub struct TexelView<'a> {
    pub texels: &'a [f32],
    pub width: u32,
    pub height: u32,
}

impl<'a> TexelView<'a> {
    pub fn new(texels: &'a [f32], width: u32, height: u32) -> Self {
        debug_assert_eq!(texels.len(), (width * height * 4) as usize);
        Self {
            texels,
            width,
            height,
        }
    }

    /// Texel at integer coordinates
    pub fn fetch(&self, x: u32, y: u32) -> Vec4 {
        let i = ((y * self.width + x) * 4) as usize;
        Vec4::from_slice(&self.texels[i..i + 4])
    }

    /// Sample at normalized coordinates with the given sampler state
    pub fn sample(&self, uv: Vec2, sampler: &SamplerDescriptor) -> Vec4 {
        let (w, h) = (self.width as i64, self.height as i64);
        match sampler.mag_filter {
            FilterMode::Nearest => {
                let x = wrap((uv.x * w as f32).floor() as i64, w, sampler.address_mode_u);
                let y = wrap((uv.y * h as f32).floor() as i64, h, sampler.address_mode_v);
                self.fetch(x, y)
            }
            FilterMode::Linear => {
                let x = uv.x * w as f32 - 0.5;
                let y = uv.y * h as f32 - 0.5;
                let (x0, y0) = (x.floor(), y.floor());
                let (fx, fy) = (x - x0, y - y0);

                let xs = [x0 as i64, x0 as i64 + 1].map(|i| wrap(i, w, sampler.address_mode_u));
                let ys = [y0 as i64, y0 as i64 + 1].map(|i| wrap(i, h, sampler.address_mode_v));

                let top = self.fetch(xs[0], ys[0]).lerp(self.fetch(xs[1], ys[0]), fx);
                let bottom = self.fetch(xs[0], ys[1]).lerp(self.fetch(xs[1], ys[1]), fx);
                top.lerp(bottom, fy)
            }
        }
    }
}

fn wrap(i: i64, n: i64, mode: AddressMode) -> u32 {
    match mode {
        AddressMode::ClampToEdge => i.clamp(0, n - 1) as u32,
        AddressMode::Repeat => i.rem_euclid(n) as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient() -> Vec<f32> {
        // 2x2: red, green / blue, white
        vec![
            1.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, //
            0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0,
        ]
    }

    #[test]
    fn test_linear_texel_centers_are_exact() {
        let texels = gradient();
        let view = TexelView::new(&texels, 2, 2);
        let sampler = SamplerDescriptor::linear_clamp();
        assert_eq!(view.sample(Vec2::new(0.25, 0.25), &sampler), Vec4::new(1.0, 0.0, 0.0, 1.0));
        assert_eq!(view.sample(Vec2::new(0.75, 0.75), &sampler), Vec4::ONE);
    }

    #[test]
    fn test_linear_midpoint_blends() {
        let texels = gradient();
        let view = TexelView::new(&texels, 2, 2);
        let c = view.sample(Vec2::splat(0.5), &SamplerDescriptor::linear_clamp());
        assert!((c - Vec4::new(0.5, 0.5, 0.5, 1.0)).abs().max_element() < 1e-6);
    }

    #[test]
    fn test_clamp_holds_edge_value() {
        let texels = gradient();
        let view = TexelView::new(&texels, 2, 2);
        let c = view.sample(Vec2::new(0.0, 0.0), &SamplerDescriptor::linear_clamp());
        assert_eq!(c, Vec4::new(1.0, 0.0, 0.0, 1.0));
    }

    #[test]
    fn test_repeat_wraps_around() {
        let texels = gradient();
        let view = TexelView::new(&texels, 2, 2);
        let sampler = SamplerDescriptor {
            mag_filter: FilterMode::Nearest,
            min_filter: FilterMode::Nearest,
            address_mode_u: AddressMode::Repeat,
            address_mode_v: AddressMode::Repeat,
        };
        assert_eq!(view.sample(Vec2::new(1.25, -0.75), &sampler), Vec4::new(1.0, 0.0, 0.0, 1.0));
    }
}
