//! # Procedural Geometry Generation
//!
//! Generates primitive shapes in code so the scene does not need model files
//! for them. The demo uses the cube, turned inside out, as the walls of the
//! environment box.
//!
//! ```no_run
//! use shadowbox::gfx::geometry::generate_cube;
//!
//! let walls = generate_cube().inverted().to_triangle_list();
//! assert_eq!(walls.len(), 36);
//! ```

pub mod primitives;

pub use primitives::*;

use crate::gfx::scene::vertex::Vertex3D;

/// Indexed geometry as produced by the generators
#[derive(Debug, Clone, Default)]
pub struct GeometryData {
    /// Vertex positions (x, y, z)
    pub vertices: Vec<[f32; 3]>,
    /// Normal vectors (x, y, z)
    pub normals: Vec<[f32; 3]>,
    /// Triangle indices (counter-clockwise winding)
    pub indices: Vec<u32>,
}

impl GeometryData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Flips normals and winding so the shape is lit from the inside
    pub fn inverted(mut self) -> Self {
        for normal in &mut self.normals {
            *normal = [-normal[0], -normal[1], -normal[2]];
        }
        for triangle in self.indices.chunks_exact_mut(3) {
            triangle.swap(1, 2);
        }
        self
    }

    /// Expands the indexed geometry into a flat triangle list with white vertices
    pub fn to_triangle_list(&self) -> Vec<Vertex3D> {
        self.indices
            .iter()
            .map(|&i| {
                let i = i as usize;
                Vertex3D::new(
                    self.vertices[i],
                    self.normals.get(i).copied().unwrap_or([0.0, 1.0, 0.0]),
                )
            })
            .collect()
    }
}
