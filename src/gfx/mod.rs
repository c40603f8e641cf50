//! # Graphics Module
//!
//! Everything between the scene description and the pixels on screen.
//!
//! ## Architecture Overview
//!
//! - **Camera System** ([`camera`]) - Zoomable camera, orbiting light and virtual trackball
//! - **Geometry** ([`geometry`]) - Procedural cube used for the walls
//! - **Rendering Pipeline** ([`rendering`]) - Shadow map capture, shaded composites and overlays
//! - **Scene Management** ([`scene`]) - Mesh import, part hierarchies and scene objects
//! - **Resource Management** ([`resources`]) - Handles, render targets, cube maps and screenshots
//!
//! The render passes only ever see the GL-like
//! [`GraphicsDevice`](rendering::GraphicsDevice) trait, so pass ordering and
//! uniform math are testable without a GPU.
//!
//! ```no_run
//! use shadowbox::config::DemoConfig;
//! use shadowbox::gfx::{rendering::WgpuDevice, scene::{ObjImporter, Scene}, RenderEngine};
//!
//! # async fn run(window: std::sync::Arc<winit::window::Window>) -> anyhow::Result<()> {
//! let config = DemoConfig::default();
//! let device = WgpuDevice::new(window).await?;
//! let mut engine = RenderEngine::new(device, &config)?;
//! let scene = Scene::load(engine.device_mut(), &config, &ObjImporter)?;
//! engine.render_frame(&scene, false)?;
//! # Ok(())
//! # }
//! ```

pub mod camera;
pub mod geometry;
pub mod rendering;
pub mod resources;
pub mod scene;

// Re-export commonly used types
pub use rendering::render_engine::RenderEngine;
