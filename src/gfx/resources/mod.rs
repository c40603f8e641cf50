//! GPU resource management
//!
//! Generational handles, offscreen render targets, the environment cube map,
//! wgpu texture allocation and screenshot output.

pub mod cube_map;
pub mod framebuffer;
pub mod handle;
pub mod screenshot;
pub mod texture_resource;

// Re-export main types
pub use cube_map::CubeMap;
pub use framebuffer::{FramebufferTarget, TargetFormat};
pub use screenshot::ScreenshotRecorder;
pub use texture_resource::TextureResource;
