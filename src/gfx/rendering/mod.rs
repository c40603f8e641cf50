//! Core rendering functionality
//!
//! The passes talk to a GL-like [`GraphicsDevice`]; [`WgpuDevice`] maps it onto
//! wgpu render passes, pipelines and bind groups.

pub mod device;
pub mod overlay;
pub mod pipeline_manager;
#[cfg(test)]
pub mod recording;
pub mod render_engine;
pub mod shading;
pub mod shadow_pass;
pub mod wgpu_device;

// Re-export main types
pub use device::GraphicsDevice;
pub use render_engine::RenderEngine;
pub use wgpu_device::WgpuDevice;
