use cgmath::{Matrix4, Point3, Vector3};
use rand::Rng;

use crate::config::DemoConfig;
use crate::error::RenderResult;
use crate::gfx::camera::{CameraState, LightState, VirtualTrackball};
use crate::gfx::geometry::generate_cube;
use crate::gfx::rendering::device::GraphicsDevice;
use crate::gfx::rendering::shadow_pass::BIAS;
use crate::input::Action;

use super::import::AssetImporter;
use super::mesh::{Mesh, ViewUniforms};

/// How mesh instances are shaded in the color pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RenderMode {
    Flat,
    #[default]
    Phong,
    Wireframe,
    HiddenLine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// The enclosing environment cube: always Phong, casts no shadow
    Walls,
    /// A mesh instance: follows the render mode and casts shadows
    Instance,
}

/// One drawable: a mesh, its world transform and its color
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneObject {
    pub mesh: usize,
    pub model: Matrix4<f32>,
    pub color: Vector3<f32>,
    pub kind: ObjectKind,
}

impl SceneObject {
    pub fn casts_shadow(&self) -> bool {
        self.kind == ObjectKind::Instance
    }
}

/// Main scene: camera, light, meshes and the objects drawn from them
///
/// The app is the only writer; the render passes read it once per frame.
pub struct Scene {
    pub camera: CameraState,
    pub light: LightState,
    pub trackball: VirtualTrackball,
    meshes: Vec<Mesh>,
    objects: Vec<SceneObject>,
    render_mode: RenderMode,
    show_shadow_map: bool,
    show_debug_view: bool,
    screenshot_requested: bool,
    light_degrees_per_second: f32,
}

pub const WALLS_COLOR: Vector3<f32> = Vector3::new(1.0, 0.8, 0.8);

impl Scene {
    pub fn new(config: &DemoConfig) -> Self {
        let [x, y, z] = config.light_start;
        Self {
            camera: CameraState::new(
                config.fovy,
                config.window_width,
                config.window_height,
                config.near_plane,
                config.far_plane,
            ),
            light: LightState::new(Point3::new(x, y, z), config.near_plane, config.far_plane),
            trackball: VirtualTrackball::new(config.window_width, config.window_height),
            meshes: Vec::new(),
            objects: Vec::new(),
            render_mode: RenderMode::default(),
            show_shadow_map: false,
            show_debug_view: false,
            screenshot_requested: false,
            light_degrees_per_second: config.light_degrees_per_second,
        }
    }

    /// Builds the demo scene: the walls cube plus randomly placed instances of
    /// the configured model, all uploaded to `device`
    pub fn load<D: GraphicsDevice + ?Sized>(
        device: &mut D,
        config: &DemoConfig,
        importer: &dyn AssetImporter,
    ) -> RenderResult<Self> {
        let mut scene = Self::new(config);

        let mut model = Mesh::load(importer, &config.model_path, config.invert_model)?;
        model.upload(device, &config.model_path.display().to_string())?;
        let model = scene.add_mesh(model);

        let mut walls = Mesh::from_geometry(&generate_cube().inverted())?;
        walls.upload(device, "walls")?;
        let walls = scene.add_mesh(walls);
        scene.add_object(SceneObject {
            mesh: walls,
            model: Matrix4::from_scale(config.cube_scale()),
            color: WALLS_COLOR,
            kind: ObjectKind::Walls,
        });

        scene.populate_instances(model, config.instance_count, &mut rand::rng());
        log::info!(
            "Scene ready: {} meshes, {} objects",
            scene.meshes.len(),
            scene.objects.len()
        );
        Ok(scene)
    }

    pub fn add_mesh(&mut self, mesh: Mesh) -> usize {
        self.meshes.push(mesh);
        self.meshes.len() - 1
    }

    pub fn add_object(&mut self, object: SceneObject) {
        self.objects.push(object);
    }

    /// Adds `count` instances of `mesh`, each offset by a random `t` in
    /// `[-0.5, 0.5]^3` of the normalized model and colored `t + 0.5`
    pub fn populate_instances<R: Rng>(&mut self, mesh: usize, count: usize, rng: &mut R) {
        let scale = self.meshes.get(mesh).map_or(1.0, Mesh::unit_scale);
        for _ in 0..count {
            let t = Vector3::new(
                rng.random_range(-0.5..=0.5),
                rng.random_range(-0.5..=0.5),
                rng.random_range(-0.5..=0.5),
            );
            self.objects.push(SceneObject {
                mesh,
                // normalization is folded into the root, so offsets scale with it
                model: Matrix4::from_translation(t * scale),
                color: t + Vector3::new(0.5, 0.5, 0.5),
                kind: ObjectKind::Instance,
            });
        }
    }

    /// Advances the light orbit by `elapsed` seconds
    pub fn update(&mut self, elapsed: f32) {
        self.light.orbit(elapsed, self.light_degrees_per_second);
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.camera.resize(width, height);
        self.trackball.set_window_size(width, height);
    }

    /// Applies a key action. Returns `false` for [`Action::Exit`].
    pub fn apply(&mut self, action: Action) -> bool {
        match action {
            Action::SetRenderMode(mode) => {
                log::info!("Render mode: {:?}", mode);
                self.render_mode = mode;
            }
            Action::ToggleShadowMap => self.show_shadow_map = !self.show_shadow_map,
            Action::ToggleDebugView => self.show_debug_view = !self.show_debug_view,
            Action::Screenshot => self.screenshot_requested = true,
            Action::ZoomIn => self.camera.zoom_in(),
            Action::ZoomOut => self.camera.zoom_out(),
            Action::Translate(delta) => self.camera.translate(delta),
            Action::Exit => return false,
        }
        true
    }

    /// Camera view with the trackball rotation applied to the scene
    pub fn view(&self) -> Matrix4<f32> {
        self.camera.view * self.trackball.transform()
    }

    fn shadow_transform(&self) -> Matrix4<f32> {
        BIAS * self.light.view_projection()
    }

    /// Inputs of a color pass seen from the camera
    pub fn camera_uniforms(&self) -> ViewUniforms {
        ViewUniforms {
            view: self.view(),
            projection: self.camera.projection(),
            light_position: self.light.position,
            shadow_transform: self.shadow_transform(),
        }
    }

    /// Inputs of a color pass seen from the light, for the debug view
    pub fn light_uniforms(&self) -> ViewUniforms {
        ViewUniforms {
            view: self.light.view,
            projection: self.light.projection,
            light_position: self.light.position,
            shadow_transform: self.shadow_transform(),
        }
    }

    pub fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    pub fn objects(&self) -> &[SceneObject] {
        &self.objects
    }

    pub fn render_mode(&self) -> RenderMode {
        self.render_mode
    }

    pub fn show_shadow_map(&self) -> bool {
        self.show_shadow_map
    }

    pub fn show_debug_view(&self) -> bool {
        self.show_debug_view
    }

    /// Returns whether a screenshot was requested since the last call
    pub fn take_screenshot_request(&mut self) -> bool {
        std::mem::take(&mut self.screenshot_requested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::camera::MIN_ZOOM;
    use crate::gfx::rendering::recording::RecordingDevice;
    use crate::gfx::scene::import::{ImportedMesh, ImportedNode, ImportedScene};
    use rand::{rngs::StdRng, SeedableRng};
    use std::path::Path;

    struct TetraImporter;

    impl AssetImporter for TetraImporter {
        fn import(&self, _path: &Path) -> RenderResult<ImportedScene> {
            let mut root = ImportedNode::new("root");
            root.meshes.push(0);
            Ok(ImportedScene {
                root,
                meshes: vec![ImportedMesh {
                    name: "tetra".into(),
                    positions: vec![
                        [0.0, 0.0, 0.0],
                        [2.0, 0.0, 0.0],
                        [0.0, 2.0, 0.0],
                        [0.0, 0.0, 2.0],
                    ],
                    normals: None,
                    colors: None,
                    faces: vec![vec![0, 2, 1], vec![0, 1, 3], vec![0, 3, 2], vec![1, 2, 3]],
                }],
            })
        }
    }

    fn loaded_scene() -> (RecordingDevice, Scene) {
        let mut device = RecordingDevice::new(800, 600);
        let scene = Scene::load(&mut device, &DemoConfig::default(), &TetraImporter).unwrap();
        (device, scene)
    }

    #[test]
    fn test_load_builds_walls_and_instances() {
        let (_, scene) = loaded_scene();
        assert_eq!(scene.meshes().len(), 2);
        assert_eq!(scene.objects().len(), 21);

        let walls: Vec<_> = scene
            .objects()
            .iter()
            .filter(|o| o.kind == ObjectKind::Walls)
            .collect();
        assert_eq!(walls.len(), 1);
        assert!(!walls[0].casts_shadow());
        assert_eq!(walls[0].color, WALLS_COLOR);
        assert_eq!(walls[0].model, Matrix4::from_scale(22.5));
    }

    #[test]
    fn test_instance_colors_track_offsets() {
        let mut scene = Scene::new(&DemoConfig::default());
        let mut rng = StdRng::seed_from_u64(7);
        scene.populate_instances(0, 50, &mut rng);

        for object in scene.objects() {
            let offset = object.model.w.truncate();
            let expected = offset + Vector3::new(0.5, 0.5, 0.5);
            assert!((object.color - expected).x.abs() < 1e-6);
            for c in [object.color.x, object.color.y, object.color.z] {
                assert!((0.0..=1.0).contains(&c));
            }
        }
    }

    #[test]
    fn test_actions_update_state() {
        let mut scene = Scene::new(&DemoConfig::default());
        assert!(scene.apply(Action::SetRenderMode(RenderMode::Wireframe)));
        assert_eq!(scene.render_mode(), RenderMode::Wireframe);

        scene.apply(Action::ToggleDebugView);
        scene.apply(Action::ToggleShadowMap);
        assert!(scene.show_debug_view() && scene.show_shadow_map());

        scene.apply(Action::Screenshot);
        assert!(scene.take_screenshot_request());
        assert!(!scene.take_screenshot_request());

        for _ in 0..300 {
            scene.apply(Action::ZoomOut);
        }
        assert!(scene.camera.zoom >= MIN_ZOOM);
        assert!(!scene.apply(Action::Exit));
    }

    #[test]
    fn test_update_orbits_light() {
        let mut scene = Scene::new(&DemoConfig::default());
        // nine seconds at ten degrees per second
        scene.update(9.0);
        assert!(scene.light.position.x.abs() < 1e-4);
        assert!((scene.light.position.z + 10.0).abs() < 1e-4);
    }

    #[test]
    fn test_debug_view_looks_from_light() {
        let scene = Scene::new(&DemoConfig::default());
        let uniforms = scene.light_uniforms();
        assert_eq!(uniforms.view, scene.light.view);
        assert_eq!(uniforms.shadow_transform, scene.camera_uniforms().shadow_transform);
    }
}
