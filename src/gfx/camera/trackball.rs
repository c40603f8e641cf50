//! Virtual trackball
//!
//! Maps pointer positions onto a unit hemisphere in front of the window and
//! turns a drag from one point to another into the rotation between them.

use cgmath::{InnerSpace, Matrix4, One, Quaternion, Rad, Rotation3, Vector3};

#[derive(Debug, Clone, Copy)]
pub struct VirtualTrackball {
    width: f32,
    height: f32,
    rotating: bool,
    point_on_start: Vector3<f32>,
    orientation_on_start: Quaternion<f32>,
    orientation: Quaternion<f32>,
}

impl VirtualTrackball {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1) as f32,
            height: height.max(1) as f32,
            rotating: false,
            point_on_start: Vector3::unit_z(),
            orientation_on_start: Quaternion::one(),
            orientation: Quaternion::one(),
        }
    }

    pub fn set_window_size(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.width = width as f32;
            self.height = height as f32;
        }
    }

    pub fn is_rotating(&self) -> bool {
        self.rotating
    }

    pub fn rotate_begin(&mut self, x: f32, y: f32) {
        self.rotating = true;
        self.point_on_start = self.point_on_sphere(x, y);
        self.orientation_on_start = self.orientation;
    }

    /// Rotates by the arc from the drag start to `(x, y)`, divided by `zoom`
    pub fn rotate(&mut self, x: f32, y: f32, zoom: f32) {
        if !self.rotating {
            return;
        }

        let point = self.point_on_sphere(x, y);
        let axis = self.point_on_start.cross(point);
        if axis.magnitude2() < 1e-12 {
            self.orientation = self.orientation_on_start;
            return;
        }

        let angle = self.point_on_start.dot(point).clamp(-1.0, 1.0).acos() / zoom.max(f32::EPSILON);
        let delta = Quaternion::from_axis_angle(axis.normalize(), Rad(angle));
        self.orientation = (delta * self.orientation_on_start).normalize();
    }

    pub fn rotate_end(&mut self) {
        self.rotating = false;
    }

    /// Accumulated rotation, to be composed into the camera view
    pub fn transform(&self) -> Matrix4<f32> {
        Matrix4::from(self.orientation)
    }

    /// Window coordinates (origin top-left) to a point on the unit sphere,
    /// or on its silhouette circle when outside
    fn point_on_sphere(&self, x: f32, y: f32) -> Vector3<f32> {
        let radius = self.width.min(self.height) * 0.5;
        let px = (x - self.width * 0.5) / radius;
        let py = (self.height * 0.5 - y) / radius;
        let r2 = px * px + py * py;
        if r2 <= 1.0 {
            Vector3::new(px, py, (1.0 - r2).sqrt())
        } else {
            Vector3::new(px, py, 0.0).normalize()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{SquareMatrix, Vector4};

    #[test]
    fn test_starts_as_identity() {
        let trackball = VirtualTrackball::new(800, 600);
        assert_eq!(trackball.transform(), Matrix4::identity());
    }

    #[test]
    fn test_motion_without_button_does_nothing() {
        let mut trackball = VirtualTrackball::new(800, 600);
        trackball.rotate(700.0, 300.0, 1.0);
        assert_eq!(trackball.transform(), Matrix4::identity());
    }

    #[test]
    fn test_horizontal_drag_rotates_about_y() {
        let mut trackball = VirtualTrackball::new(800, 600);
        trackball.rotate_begin(400.0, 300.0);
        trackball.rotate(700.0, 300.0, 1.0);
        trackball.rotate_end();

        // the forward axis swings towards +X, the up axis stays put
        let forward = trackball.transform() * Vector4::new(0.0, 0.0, 1.0, 0.0);
        let up = trackball.transform() * Vector4::new(0.0, 1.0, 0.0, 0.0);
        assert!(forward.x > 0.5);
        assert!((up.y - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_zoom_scales_down_rotation() {
        let mut normal = VirtualTrackball::new(800, 600);
        let mut zoomed = VirtualTrackball::new(800, 600);
        for (trackball, zoom) in [(&mut normal, 1.0), (&mut zoomed, 2.0)] {
            trackball.rotate_begin(400.0, 300.0);
            trackball.rotate(600.0, 300.0, zoom);
        }

        let n = normal.transform() * Vector4::new(0.0, 0.0, 1.0, 0.0);
        let z = zoomed.transform() * Vector4::new(0.0, 0.0, 1.0, 0.0);
        assert!(z.x < n.x);
        assert!(z.x > 0.0);
    }

    #[test]
    fn test_rotation_accumulates_across_drags() {
        let mut trackball = VirtualTrackball::new(800, 600);
        trackball.rotate_begin(400.0, 300.0);
        trackball.rotate(500.0, 300.0, 1.0);
        trackball.rotate_end();
        let first = trackball.transform();

        trackball.rotate_begin(400.0, 300.0);
        trackball.rotate(500.0, 300.0, 1.0);
        trackball.rotate_end();

        let once = first * Vector4::new(0.0, 0.0, 1.0, 0.0);
        let twice = trackball.transform() * Vector4::new(0.0, 0.0, 1.0, 0.0);
        assert!(twice.x > once.x);
    }
}
