//! # Scene Management Module
//!
//! Meshes are imported once, flattened into a single vertex array per mesh and
//! drawn as a hierarchy of [`MeshPart`] ranges. The [`Scene`] places them as
//! [`SceneObject`]s and owns the camera, light and interaction state.
//!
//! ## Key Components
//!
//! - [`Scene`] - Camera, light, meshes, objects and the active [`RenderMode`]
//! - [`Mesh`] - One imported or generated mesh with its part hierarchy
//! - [`AssetImporter`] - Source of mesh data; [`ObjImporter`] reads OBJ files
//! - [`Vertex3D`] - Position, normal and color of one vertex

pub mod import;
pub mod mesh;
pub mod mesh_part;
pub mod scene;
pub mod vertex;

// Re-export main types
pub use import::{AssetImporter, ObjImporter};
pub use mesh::Mesh;
pub use mesh_part::MeshPart;
pub use scene::{ObjectKind, RenderMode, Scene, SceneObject};
pub use vertex::Vertex3D;
