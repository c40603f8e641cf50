use cgmath::{perspective, Deg, Matrix4, Vector3};

/// Converts GL clip space (z in [-1, 1]) to wgpu clip space (z in [0, 1]).
///
/// Scene math stays in the GL convention so the shadow bias matrix maps clip
/// space onto [0, 1]; the device applies this when it packs clip-space matrices.
#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

pub const MIN_ZOOM: f32 = 0.5;
/// Keeps the default 45 degree field of view above one degree
pub const MAX_ZOOM: f32 = 40.0;
const ZOOM_IN_FACTOR: f32 = 1.1;
const ZOOM_OUT_FACTOR: f32 = 0.9;

/// Projection parameters and view transform of the scene camera
///
/// Zoom narrows the field of view (`fovy / zoom`) instead of moving the camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraState {
    /// Vertical field of view in degrees at zoom 1
    pub fovy: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub zoom: f32,
    pub view: Matrix4<f32>,
}

impl CameraState {
    pub fn new(fovy: f32, width: u32, height: u32, near: f32, far: f32) -> Self {
        let mut camera = Self {
            fovy,
            aspect: 1.0,
            near,
            far,
            zoom: 1.0,
            view: Matrix4::from_translation(Vector3::new(0.0, 0.0, -10.0)),
        };
        camera.resize(width, height);
        camera
    }

    /// GL-convention perspective projection
    pub fn projection(&self) -> Matrix4<f32> {
        perspective(Deg(self.fovy / self.zoom), self.aspect, self.near, self.far)
    }

    /// Updates the aspect ratio; a minimized window keeps the previous one
    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.aspect = width as f32 / height as f32;
        }
    }

    pub fn zoom_in(&mut self) {
        self.zoom = (self.zoom * ZOOM_IN_FACTOR).min(MAX_ZOOM);
    }

    pub fn zoom_out(&mut self) {
        self.zoom = (self.zoom * ZOOM_OUT_FACTOR).max(MIN_ZOOM);
    }

    /// Moves the camera by `delta` in view space
    pub fn translate(&mut self, delta: Vector3<f32>) {
        self.view = Matrix4::from_translation(-delta) * self.view;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{SquareMatrix, Vector4};

    #[test]
    fn test_zoom_never_drops_below_floor() {
        let mut camera = CameraState::new(45.0, 800, 600, 0.5, 30.0);
        for _ in 0..500 {
            camera.zoom_out();
            assert!(camera.zoom >= MIN_ZOOM);
        }
        assert_eq!(camera.zoom, MIN_ZOOM);
    }

    #[test]
    fn test_zoom_in_is_capped() {
        let mut camera = CameraState::new(45.0, 800, 600, 0.5, 30.0);
        for _ in 0..1000 {
            camera.zoom_in();
        }
        assert_eq!(camera.zoom, MAX_ZOOM);
        assert!(camera.fovy / camera.zoom >= 1.0);
        let projection = camera.projection();
        assert!(projection.y.y.is_finite());

        camera.zoom_out();
        assert!(camera.zoom < MAX_ZOOM);
    }

    #[test]
    fn test_zoom_in_narrows_field_of_view() {
        let mut camera = CameraState::new(45.0, 800, 600, 0.5, 30.0);
        let before = camera.projection();
        camera.zoom_in();
        assert!((camera.zoom - 1.1).abs() < 1e-6);
        // larger focal length on y
        assert!(camera.projection().y.y > before.y.y);
    }

    #[test]
    fn test_resize_updates_aspect_and_ignores_zero() {
        let mut camera = CameraState::new(45.0, 800, 600, 0.5, 30.0);
        assert!((camera.aspect - 800.0 / 600.0).abs() < 1e-6);
        camera.resize(0, 100);
        assert!((camera.aspect - 800.0 / 600.0).abs() < 1e-6);
        camera.resize(100, 100);
        assert_eq!(camera.aspect, 1.0);
    }

    #[test]
    fn test_translate_moves_camera_not_world() {
        let mut camera = CameraState::new(45.0, 800, 600, 0.5, 30.0);
        camera.translate(Vector3::new(1.0, 0.0, 0.0));
        let origin = camera.view * Vector4::new(0.0, 0.0, 0.0, 1.0);
        assert_eq!(origin, Vector4::new(-1.0, 0.0, -10.0, 1.0));
    }

    #[test]
    fn test_gl_to_wgpu_depth_range() {
        let near = OPENGL_TO_WGPU_MATRIX * Vector4::new(0.0, 0.0, -1.0, 1.0);
        let far = OPENGL_TO_WGPU_MATRIX * Vector4::new(0.0, 0.0, 1.0, 1.0);
        assert_eq!(near.z, 0.0);
        assert_eq!(far.z, 1.0);
        assert!(OPENGL_TO_WGPU_MATRIX.invert().is_some());
    }
}
