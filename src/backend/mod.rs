//! Backend abstraction layer
//!
//! Provides the capture trait and the types that both the wgpu and the
//! software backends implement.

pub mod framebuffer;
pub mod software;
pub mod traits;
pub mod types;
pub mod wgpu_backend;

pub use traits::*;
pub use types::*;
