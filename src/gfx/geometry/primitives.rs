//! # Primitive Shape Generation

use super::GeometryData;

/// Generate a unit cube centered at the origin
///
/// Returns a cube with vertices from -0.5 to 0.5 on all axes, four vertices
/// per face so every face keeps its own outward normal.
pub fn generate_cube() -> GeometryData {
    let mut data = GeometryData::new();

    let faces: [([f32; 3], [[f32; 3]; 4]); 6] = [
        // +Z
        (
            [0.0, 0.0, 1.0],
            [
                [-0.5, -0.5, 0.5],
                [0.5, -0.5, 0.5],
                [0.5, 0.5, 0.5],
                [-0.5, 0.5, 0.5],
            ],
        ),
        // -Z
        (
            [0.0, 0.0, -1.0],
            [
                [0.5, -0.5, -0.5],
                [-0.5, -0.5, -0.5],
                [-0.5, 0.5, -0.5],
                [0.5, 0.5, -0.5],
            ],
        ),
        // -X
        (
            [-1.0, 0.0, 0.0],
            [
                [-0.5, -0.5, -0.5],
                [-0.5, -0.5, 0.5],
                [-0.5, 0.5, 0.5],
                [-0.5, 0.5, -0.5],
            ],
        ),
        // +X
        (
            [1.0, 0.0, 0.0],
            [
                [0.5, -0.5, 0.5],
                [0.5, -0.5, -0.5],
                [0.5, 0.5, -0.5],
                [0.5, 0.5, 0.5],
            ],
        ),
        // +Y
        (
            [0.0, 1.0, 0.0],
            [
                [-0.5, 0.5, 0.5],
                [0.5, 0.5, 0.5],
                [0.5, 0.5, -0.5],
                [-0.5, 0.5, -0.5],
            ],
        ),
        // -Y
        (
            [0.0, -1.0, 0.0],
            [
                [-0.5, -0.5, -0.5],
                [0.5, -0.5, -0.5],
                [0.5, -0.5, 0.5],
                [-0.5, -0.5, 0.5],
            ],
        ),
    ];

    for (normal, corners) in faces {
        let base = data.vertices.len() as u32;
        data.vertices.extend_from_slice(&corners);
        data.normals.extend_from_slice(&[normal; 4]);
        data.indices
            .extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
    }

    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{InnerSpace, Vector3};

    #[test]
    fn test_cube_generation() {
        let cube = generate_cube();
        assert_eq!(cube.vertex_count(), 24); // 6 faces * 4 vertices
        assert_eq!(cube.indices.len(), 36); // 6 faces * 2 triangles * 3 indices
        assert_eq!(cube.triangle_count(), 12);
    }

    #[test]
    fn test_cube_winding_matches_outward_normals() {
        let cube = generate_cube();
        for triangle in cube.indices.chunks_exact(3) {
            let [a, b, c] = [0, 1, 2].map(|k| Vector3::from(cube.vertices[triangle[k] as usize]));
            let face = (b - a).cross(c - a).normalize();
            let normal = Vector3::from(cube.normals[triangle[0] as usize]);
            assert!(face.dot(normal) > 0.99);
        }
    }

    #[test]
    fn test_inverted_cube_faces_inward() {
        let walls = generate_cube().inverted().to_triangle_list();
        assert_eq!(walls.len(), 36);
        for vertex in &walls {
            let position = Vector3::from(vertex.position);
            let normal = Vector3::from(vertex.normal);
            // every inward normal points towards the center
            assert!(position.dot(normal) < 0.0);
            assert_eq!(vertex.color, [1.0, 1.0, 1.0]);
        }
    }
}
