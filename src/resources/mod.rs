//! Resource management
//!
//! Radiance images, cubemaps and the primitive meshes used as capture proxies.

mod cubemap;
mod hdr;
mod mesh;
mod sampling;

pub use cubemap::*;
pub use hdr::*;
pub use mesh::*;
pub use sampling::*;
