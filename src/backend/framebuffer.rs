//! Framebuffer object bookkeeping shared by the backends
//!
//! Neither wgpu nor the software rasterizer has a framebuffer object of its
//! own, so both record attachments here and derive completeness from them.

use crate::backend::traits::{RenderbufferHandle, TextureHandle};
use crate::backend::types::{FramebufferStatus, TextureFormat};

/// Colour attachment 0: one layer of a texture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorAttachmentState {
    pub texture: TextureHandle,
    pub layer: u32,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}

/// Attachment state of one framebuffer object
#[derive(Debug, Clone, Default)]
pub struct FramebufferState {
    pub label: String,
    pub color: Option<ColorAttachmentState>,
    pub depth: Option<RenderbufferHandle>,
}

impl FramebufferState {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            color: None,
            depth: None,
        }
    }

    /// Completeness given the current storage size of the depth attachment.
    ///
    /// `depth_size` is `None` when no depth renderbuffer is attached or the
    /// attached one no longer exists.
    pub fn status(&self, depth_size: Option<(u32, u32)>) -> FramebufferStatus {
        let Some(color) = &self.color else {
            return FramebufferStatus::MissingAttachment;
        };

        if !color.format.is_float_color() || color.width == 0 || color.height == 0 {
            return FramebufferStatus::IncompleteAttachment;
        }

        match (self.depth, depth_size) {
            (None, _) => FramebufferStatus::Complete,
            (Some(_), None) => FramebufferStatus::IncompleteAttachment,
            (Some(_), Some(size)) if size != (color.width, color.height) => {
                FramebufferStatus::IncompleteDimensions
            }
            (Some(_), Some(_)) => FramebufferStatus::Complete,
        }
    }

    /// Drop references to a texture that is being destroyed
    pub fn forget_texture(&mut self, texture: TextureHandle) {
        if self.color.map(|c| c.texture) == Some(texture) {
            self.color = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn color(size: u32) -> ColorAttachmentState {
        ColorAttachmentState {
            texture: TextureHandle(1),
            layer: 0,
            width: size,
            height: size,
            format: TextureFormat::Rgba16Float,
        }
    }

    #[test]
    fn test_missing_color_attachment() {
        let fb = FramebufferState::new("capture");
        assert_eq!(fb.status(None), FramebufferStatus::MissingAttachment);
    }

    #[test]
    fn test_matching_depth_is_complete() {
        let mut fb = FramebufferState::new("capture");
        fb.color = Some(color(32));
        fb.depth = Some(RenderbufferHandle(7));
        assert_eq!(fb.status(Some((32, 32))), FramebufferStatus::Complete);
    }

    #[test]
    fn test_mismatched_depth_is_incomplete() {
        let mut fb = FramebufferState::new("capture");
        fb.color = Some(color(32));
        fb.depth = Some(RenderbufferHandle(7));

        let status = fb.status(Some((512, 512)));
        assert_eq!(status, FramebufferStatus::IncompleteDimensions);
        assert_eq!(status.code(), 0x8CD9);
    }

    #[test]
    fn test_non_float_color_is_incomplete() {
        let mut fb = FramebufferState::new("capture");
        fb.color = Some(ColorAttachmentState {
            format: TextureFormat::Rgba8UnormSrgb,
            ..color(16)
        });
        assert_eq!(fb.status(None), FramebufferStatus::IncompleteAttachment);
    }

    #[test]
    fn test_dangling_depth_is_incomplete() {
        let mut fb = FramebufferState::new("capture");
        fb.color = Some(color(16));
        fb.depth = Some(RenderbufferHandle(3));
        assert_eq!(fb.status(None), FramebufferStatus::IncompleteAttachment);
    }

    #[test]
    fn test_forget_texture_detaches_color() {
        let mut fb = FramebufferState::new("capture");
        fb.color = Some(color(16));
        fb.forget_texture(TextureHandle(1));
        assert!(fb.color.is_none());
        assert_eq!(format!("{}", fb.status(None)), "0x8CD7 (missing attachment)");
    }
}
