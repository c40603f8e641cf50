//! Mesh file import
//!
//! [`AssetImporter`] is the narrow interface the mesh loader consumes: a node
//! hierarchy with row-major transforms plus per-mesh vertex attributes and
//! faces of whatever arity the file contains. Topology checks happen in
//! [`Mesh`](super::mesh::Mesh), not here.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{RenderError, RenderResult};

/// One node of the imported hierarchy
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedNode {
    pub name: String,
    /// Local transform, row-major as stored by the file format
    pub transform: [[f32; 4]; 4],
    /// Indices into [`ImportedScene::meshes`]
    pub meshes: Vec<usize>,
    pub children: Vec<ImportedNode>,
}

impl ImportedNode {
    pub const IDENTITY: [[f32; 4]; 4] = [
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ];

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transform: Self::IDENTITY,
            meshes: Vec::new(),
            children: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportedMesh {
    pub name: String,
    pub positions: Vec<[f32; 3]>,
    pub normals: Option<Vec<[f32; 3]>>,
    pub colors: Option<Vec<[f32; 3]>>,
    /// Vertex indices of each face
    pub faces: Vec<Vec<u32>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportedScene {
    pub root: ImportedNode,
    pub meshes: Vec<ImportedMesh>,
}

pub trait AssetImporter {
    fn import(&self, path: &Path) -> RenderResult<ImportedScene>;
}

/// Wavefront OBJ importer backed by `tobj`
///
/// Faces are kept as written, so quads and n-gons reach the mesh loader and
/// get rejected there. OBJ has no node hierarchy: the root node gets one
/// child per object/group in the file.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjImporter;

impl ObjImporter {
    fn load_options() -> tobj::LoadOptions {
        tobj::LoadOptions {
            single_index: true,
            triangulate: false,
            ignore_points: true,
            ignore_lines: true,
            ..Default::default()
        }
    }

    /// Parses OBJ data from any buffered reader; `origin` names the source in errors
    pub fn import_from_reader<R: BufRead>(
        &self,
        reader: &mut R,
        origin: &Path,
    ) -> RenderResult<ImportedScene> {
        let (models, _materials) =
            tobj::load_obj_buf(reader, &Self::load_options(), |_| {
                Err(tobj::LoadError::OpenFileFailed)
            })
            .map_err(|e| RenderError::MeshImport {
                path: origin.to_path_buf(),
                reason: e.to_string(),
            })?;

        if models.is_empty() {
            return Err(RenderError::MeshImport {
                path: origin.to_path_buf(),
                reason: "file contains no geometry".into(),
            });
        }

        let mut root = ImportedNode::new(
            origin
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "root".into()),
        );
        let mut meshes = Vec::with_capacity(models.len());

        for (index, model) in models.into_iter().enumerate() {
            log::debug!(
                "{}: object '{}' with {} positions",
                origin.display(),
                model.name,
                model.mesh.positions.len() / 3
            );
            let mut node = ImportedNode::new(model.name.clone());
            node.meshes.push(index);
            root.children.push(node);
            meshes.push(Self::convert_mesh(model));
        }

        Ok(ImportedScene { root, meshes })
    }

    fn convert_mesh(model: tobj::Model) -> ImportedMesh {
        let mesh = model.mesh;
        let triples = |data: &[f32]| -> Vec<[f32; 3]> {
            data.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect()
        };

        let positions = triples(&mesh.positions);
        let normals = (!mesh.normals.is_empty()).then(|| triples(&mesh.normals));
        let colors = (!mesh.vertex_color.is_empty()).then(|| triples(&mesh.vertex_color));

        let faces = if mesh.face_arities.is_empty() {
            mesh.indices.chunks(3).map(<[u32]>::to_vec).collect()
        } else {
            let mut faces = Vec::with_capacity(mesh.face_arities.len());
            let mut start = 0usize;
            for &arity in &mesh.face_arities {
                let end = (start + arity as usize).min(mesh.indices.len());
                faces.push(mesh.indices[start..end].to_vec());
                start = end;
            }
            faces
        };

        ImportedMesh {
            name: model.name,
            positions,
            normals,
            colors,
            faces,
        }
    }
}

impl AssetImporter for ObjImporter {
    fn import(&self, path: &Path) -> RenderResult<ImportedScene> {
        let file = File::open(path).map_err(|e| RenderError::MeshImport {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        self.import_from_reader(&mut BufReader::new(file), path)
    }
}
