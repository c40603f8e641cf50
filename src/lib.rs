//! Shadowbox
//!
//! A shadow-mapped scene viewer built on wgpu and winit: randomly placed mesh
//! instances inside an environment box, lit by an orbiting point light.

pub mod app;
pub mod config;
pub mod error;
pub mod gfx;
pub mod input;
pub mod wgpu_utils;

// Re-export main types for convenience
pub use app::ShadowboxApp;
pub use config::DemoConfig;
pub use error::{RenderError, RenderResult};

/// Loads `shadowbox.json` from the working directory, or the defaults, and
/// builds the application from it
pub fn default() -> anyhow::Result<ShadowboxApp> {
    let config = DemoConfig::load_or_default(std::path::Path::new("."))?;
    ShadowboxApp::new(config)
}
