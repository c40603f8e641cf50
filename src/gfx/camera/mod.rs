//! Scene camera, orbiting light and trackball interaction

pub mod camera;
pub mod light;
pub mod trackball;

// Re-export main types
pub use camera::{CameraState, MAX_ZOOM, MIN_ZOOM, OPENGL_TO_WGPU_MATRIX};
pub use light::LightState;
pub use trackball::VirtualTrackball;
