use cgmath::{perspective, Deg, EuclideanSpace, InnerSpace, Matrix3, Matrix4, Point3, Vector3};

/// Below this sine of the angle between view direction and up, look-at is degenerate
const PARALLEL_EPSILON: f32 = 1e-3;

/// Look-at towards `target` with +Y up, falling back to +Z when the view
/// direction is (nearly) vertical
pub fn look_at(eye: Point3<f32>, target: Point3<f32>) -> Matrix4<f32> {
    let direction = target - eye;
    let mut up = Vector3::unit_y();
    if direction.magnitude2() > 0.0 && direction.normalize().cross(up).magnitude() < PARALLEL_EPSILON
    {
        log::warn!(
            "Light direction {:?} is parallel to +Y, using +Z as up vector",
            direction
        );
        up = Vector3::unit_z();
    }
    Matrix4::look_at_rh(eye, target, up)
}

/// The single scene light: an orbiting point looking at the origin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightState {
    pub position: Point3<f32>,
    pub view: Matrix4<f32>,
    pub projection: Matrix4<f32>,
}

impl LightState {
    /// Light with a square 90 degree frustum, matching the square shadow map
    pub fn new(position: Point3<f32>, near: f32, far: f32) -> Self {
        Self {
            position,
            view: look_at(position, Point3::origin()),
            projection: perspective(Deg(90.0), 1.0, near, far),
        }
    }

    /// Rotates the light around the vertical axis and re-aims it at the origin
    pub fn rotate(&mut self, angle: Deg<f32>) {
        let rotation = Matrix3::from_angle_y(angle);
        self.position = Point3::from_vec(rotation * self.position.to_vec());
        self.view = look_at(self.position, Point3::origin());
    }

    /// Advances the orbit by `elapsed` seconds at `degrees_per_second`
    pub fn orbit(&mut self, elapsed: f32, degrees_per_second: f32) {
        self.rotate(Deg(elapsed * degrees_per_second));
    }

    pub fn view_projection(&self) -> Matrix4<f32> {
        self.projection * self.view
    }
}
