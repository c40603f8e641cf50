//! Triangle meshes and their scene graph traversal
//!
//! A [`Mesh`] owns one flat, non-indexed vertex array and the root
//! [`MeshPart`] of its hierarchy. Each part draws a contiguous range of that
//! array, so drawing a mesh is a pre-order walk issuing one draw per part with
//! the accumulated transform.

use std::path::Path;

use cgmath::{
    InnerSpace, Matrix, Matrix3, Matrix4, Point3, SquareMatrix, Transform, Vector3, Vector4,
};

use super::import::{AssetImporter, ImportedNode, ImportedScene};
use super::mesh_part::MeshPart;
use super::vertex::Vertex3D;
use crate::error::{RenderError, RenderResult};
use crate::gfx::geometry::GeometryData;
use crate::gfx::rendering::device::{
    DrawUniforms, GraphicsDevice, ShadedUniforms, VertexArrayId,
};

/// Axis-aligned bounds in object space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

impl BoundingBox {
    fn empty() -> Self {
        Self {
            min: Point3::new(f32::MAX, f32::MAX, f32::MAX),
            max: Point3::new(f32::MIN, f32::MIN, f32::MIN),
        }
    }

    fn include(&mut self, p: Point3<f32>) {
        self.min = Point3::new(self.min.x.min(p.x), self.min.y.min(p.y), self.min.z.min(p.z));
        self.max = Point3::new(self.max.x.max(p.x), self.max.y.max(p.y), self.max.z.max(p.z));
    }

    pub fn center(&self) -> Point3<f32> {
        self.min + (self.max - self.min) * 0.5
    }

    pub fn extent(&self) -> Vector3<f32> {
        self.max - self.min
    }

    pub fn max_extent(&self) -> f32 {
        let e = self.extent();
        e.x.max(e.y).max(e.z)
    }
}

/// Camera and light state shared by every node drawn in one color pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewUniforms {
    pub view: Matrix4<f32>,
    pub projection: Matrix4<f32>,
    /// Light position in world space
    pub light_position: Point3<f32>,
    /// Bias * light projection * light view, computed once per pass
    pub shadow_transform: Matrix4<f32>,
}

/// Per-node uniforms of the shaded programs
///
/// Light and camera positions are brought into the node's object space through
/// the inverse model and model-view transforms, dividing by w so projective
/// parent transforms are handled.
pub fn shaded_uniforms(
    view: &ViewUniforms,
    world_model: &Matrix4<f32>,
    color: Vector3<f32>,
) -> RenderResult<ShadedUniforms> {
    let model_view = view.view * world_model;
    let singular = || RenderError::InvalidMesh("node transform is not invertible".into());
    let model_inverse = world_model.invert().ok_or_else(singular)?;
    let model_view_inverse = model_view.invert().ok_or_else(singular)?;

    let upper = Matrix3::from_cols(
        model_view.x.truncate(),
        model_view.y.truncate(),
        model_view.z.truncate(),
    );
    let normal_matrix = upper.invert().ok_or_else(singular)?.transpose();

    let light = model_inverse * view.light_position.to_homogeneous();
    let camera: Vector4<f32> = model_view_inverse.w;

    Ok(ShadedUniforms {
        model_view_projection: view.projection * model_view,
        model_view,
        normal_matrix,
        light_transform: view.shadow_transform * world_model,
        light_position: light.truncate() / light.w,
        camera_position: camera.truncate() / camera.w,
        color,
    })
}

#[derive(Debug)]
pub struct Mesh {
    root: MeshPart,
    vertices: Vec<Vertex3D>,
    bounds: BoundingBox,
    unit_scale: f32,
    vertex_array: Option<VertexArrayId>,
}

impl Mesh {
    /// Imports `path`, normalizes it to unit size around the origin and, when
    /// `invert` is set, turns it inside out
    pub fn load(importer: &dyn AssetImporter, path: &Path, invert: bool) -> RenderResult<Self> {
        let scene = importer.import(path)?;
        let mesh = Self::from_imported(&scene, path, invert)?;
        log::info!(
            "Loaded mesh {}: {} vertices in {} parts",
            path.display(),
            mesh.vertex_count(),
            mesh.root.node_count()
        );
        Ok(mesh)
    }

    pub fn from_imported(scene: &ImportedScene, path: &Path, invert: bool) -> RenderResult<Self> {
        let mut vertices = Vec::new();
        let mut root = Self::load_node(&scene.root, scene, path, invert, &mut vertices)?;

        if vertices.is_empty() {
            return Err(RenderError::InvalidMesh(format!(
                "{} contains no triangles",
                path.display()
            )));
        }

        let bounds = Self::compute_bounds(&root, &vertices);
        let max_extent = bounds.max_extent();
        let mut unit_scale = if max_extent > f32::EPSILON {
            1.0 / max_extent
        } else {
            1.0
        };
        if invert {
            unit_scale = -unit_scale;
        }

        let center = bounds.center();
        root.transform = Matrix4::from_scale(unit_scale)
            * Matrix4::from_translation(-center.to_homogeneous().truncate())
            * root.transform;

        let mesh = Self {
            root,
            vertices,
            bounds,
            unit_scale,
            vertex_array: None,
        };
        mesh.validate()?;
        Ok(mesh)
    }

    /// Single-part mesh from generated geometry, with no normalization
    pub fn from_geometry(geometry: &GeometryData) -> RenderResult<Self> {
        let vertices = geometry.to_triangle_list();
        let root = MeshPart::new(Matrix4::identity(), 0, vertices.len() as u32);
        let bounds = Self::compute_bounds(&root, &vertices);
        let mesh = Self {
            root,
            vertices,
            bounds,
            unit_scale: 1.0,
            vertex_array: None,
        };
        mesh.validate()?;
        Ok(mesh)
    }

    fn load_node(
        node: &ImportedNode,
        scene: &ImportedScene,
        path: &Path,
        invert: bool,
        vertices: &mut Vec<Vertex3D>,
    ) -> RenderResult<MeshPart> {
        // file transforms are row-major
        let transform = Matrix4::from(node.transform).transpose();
        let first = vertices.len() as u32;

        for &mesh_index in &node.meshes {
            let mesh = scene.meshes.get(mesh_index).ok_or_else(|| RenderError::MeshImport {
                path: path.to_path_buf(),
                reason: format!("node '{}' refers to missing mesh {}", node.name, mesh_index),
            })?;

            for face in &mesh.faces {
                if face.len() != 3 {
                    return Err(RenderError::UnsupportedTopology {
                        path: path.to_path_buf(),
                        arity: face.len(),
                    });
                }

                let mut corners = [Vertex3D::new([0.0; 3], [0.0; 3]); 3];
                for (corner, &index) in corners.iter_mut().zip(face.iter()) {
                    let index = index as usize;
                    let position = *mesh.positions.get(index).ok_or_else(|| {
                        RenderError::MeshImport {
                            path: path.to_path_buf(),
                            reason: format!("face index {} out of range", index),
                        }
                    })?;
                    corner.position = position;
                    if let Some(normal) = mesh.normals.as_ref().and_then(|n| n.get(index)) {
                        corner.normal = *normal;
                    }
                    if let Some(color) = mesh.colors.as_ref().and_then(|c| c.get(index)) {
                        corner.color = *color;
                    }
                }

                if mesh.normals.is_none() {
                    let normal = face_normal(&corners);
                    for corner in &mut corners {
                        corner.normal = normal;
                    }
                }
                if invert {
                    for corner in &mut corners {
                        corner.normal = corner.normal.map(|c| -c);
                    }
                }

                vertices.extend_from_slice(&corners);
            }
        }

        let count = vertices.len() as u32 - first;
        log::debug!(
            "{}: node '{}' draws {} vertices from {}",
            path.display(),
            node.name,
            count,
            first
        );

        let mut part = MeshPart::new(transform, first, count);
        for child in &node.children {
            part.children
                .push(Self::load_node(child, scene, path, invert, vertices)?);
        }
        Ok(part)
    }

    /// Bounds of every vertex under its accumulated node transform
    fn compute_bounds(root: &MeshPart, vertices: &[Vertex3D]) -> BoundingBox {
        let mut bounds = BoundingBox::empty();
        for (range, world) in root.flatten(&Matrix4::identity()) {
            for vertex in &vertices[range.start as usize..range.end as usize] {
                bounds.include(world.transform_point(Point3::from(vertex.position)));
            }
        }
        bounds
    }

    fn validate(&self) -> RenderResult<()> {
        if self.vertices.len() % 3 != 0 {
            return Err(RenderError::InvalidMesh(format!(
                "vertex count {} is not a multiple of 3",
                self.vertices.len()
            )));
        }
        Ok(())
    }

    pub fn root(&self) -> &MeshPart {
        &self.root
    }

    pub fn vertices(&self) -> &[Vertex3D] {
        &self.vertices
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertices.len() as u32
    }

    /// Bounds before normalization
    pub fn bounding_box(&self) -> BoundingBox {
        self.bounds
    }

    /// Signed uniform scale folded into the root transform
    pub fn unit_scale(&self) -> f32 {
        self.unit_scale
    }

    /// Uploads the vertex array once; later calls are no-ops
    pub fn upload<D: GraphicsDevice + ?Sized>(&mut self, device: &mut D, label: &str) -> RenderResult<()> {
        if self.vertex_array.is_none() {
            self.vertex_array = Some(device.create_vertex_array(label, &self.vertices)?);
        }
        Ok(())
    }

    fn vertex_array(&self) -> RenderResult<VertexArrayId> {
        self.vertex_array
            .ok_or_else(|| RenderError::InvalidMesh("mesh drawn before upload".into()))
    }

    /// Depth-only traversal: one `light_view_projection * world` matrix per node
    pub fn render_depth<D: GraphicsDevice + ?Sized>(
        &self,
        device: &mut D,
        light_view_projection: &Matrix4<f32>,
        model: &Matrix4<f32>,
    ) -> RenderResult<()> {
        device.bind_vertex_array(self.vertex_array()?)?;
        self.root.visit(model, &mut |part, world| {
            device.set_uniforms(DrawUniforms::Depth {
                light_transform: light_view_projection * world,
            });
            device.draw_arrays(part.range())
        })
    }

    /// Shaded traversal with the currently bound program
    pub fn render_shaded<D: GraphicsDevice + ?Sized>(
        &self,
        device: &mut D,
        view: &ViewUniforms,
        model: &Matrix4<f32>,
        color: Vector3<f32>,
    ) -> RenderResult<()> {
        device.bind_vertex_array(self.vertex_array()?)?;
        self.root.visit(model, &mut |part: &MeshPart, world: &Matrix4<f32>| -> RenderResult<()> {
            device.set_uniforms(DrawUniforms::Shaded(shaded_uniforms(view, world, color)?));
            device.draw_arrays(part.range())
        })
    }
}

fn face_normal(corners: &[Vertex3D; 3]) -> [f32; 3] {
    let [a, b, c] = corners.map(|v| Vector3::from(v.position));
    let n = (b - a).cross(c - a);
    if n.magnitude2() > f32::EPSILON * f32::EPSILON {
        n.normalize().into()
    } else {
        [0.0, 1.0, 0.0]
    }
}
