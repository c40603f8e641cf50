//! Scene graph nodes of a mesh
//!
//! A [`MeshPart`] carries a transform relative to its parent and a contiguous
//! range of the owning mesh's vertex array. Parts own their children, so the
//! hierarchy is a tree by construction.

use std::ops::Range;

use cgmath::{Matrix4, SquareMatrix};

#[derive(Debug, Clone, PartialEq)]
pub struct MeshPart {
    pub transform: Matrix4<f32>,
    pub first: u32,
    pub count: u32,
    pub children: Vec<MeshPart>,
}

impl MeshPart {
    pub fn new(transform: Matrix4<f32>, first: u32, count: u32) -> Self {
        Self {
            transform,
            first,
            count,
            children: Vec::new(),
        }
    }

    /// Node without geometry of its own
    pub fn group(transform: Matrix4<f32>) -> Self {
        Self::new(transform, 0, 0)
    }

    pub fn with_child(mut self, child: MeshPart) -> Self {
        self.children.push(child);
        self
    }

    /// Vertex range `[first, first + count)` drawn for this node
    pub fn range(&self) -> Range<u32> {
        self.first..self.first + self.count
    }

    /// Visits the tree in pre-order, handing every node its world transform
    ///
    /// The world transform of a node is `parent_world * node.transform`, with
    /// `parent` as the accumulated transform of the root's parent.
    pub fn visit<E, F>(&self, parent: &Matrix4<f32>, visitor: &mut F) -> Result<(), E>
    where
        F: FnMut(&MeshPart, &Matrix4<f32>) -> Result<(), E>,
    {
        let world = parent * self.transform;
        visitor(self, &world)?;
        for child in &self.children {
            child.visit(&world, visitor)?;
        }
        Ok(())
    }

    /// Infallible [`visit`](Self::visit)
    pub fn for_each<F>(&self, parent: &Matrix4<f32>, visitor: &mut F)
    where
        F: FnMut(&MeshPart, &Matrix4<f32>),
    {
        let world = parent * self.transform;
        visitor(self, &world);
        for child in &self.children {
            child.for_each(&world, visitor);
        }
    }

    /// Pre-order list of every node with its world transform
    pub fn flatten(&self, parent: &Matrix4<f32>) -> Vec<(Range<u32>, Matrix4<f32>)> {
        let mut out = Vec::new();
        self.for_each(parent, &mut |part, world| out.push((part.range(), *world)));
        out
    }

    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(MeshPart::node_count).sum::<usize>()
    }
}

impl Default for MeshPart {
    fn default() -> Self {
        Self::group(Matrix4::identity())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{Deg, Vector3};

    fn approx_eq(a: &Matrix4<f32>, b: &Matrix4<f32>) -> bool {
        let a: &[f32; 16] = a.as_ref();
        let b: &[f32; 16] = b.as_ref();
        a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() < 1e-5)
    }

    fn three_level_tree() -> (MeshPart, [Matrix4<f32>; 3]) {
        let root = Matrix4::from_translation(Vector3::new(1.0, 2.0, 3.0));
        let middle = Matrix4::from_angle_y(Deg(90.0));
        let leaf = Matrix4::from_nonuniform_scale(2.0, 1.0, 0.5);

        let tree = MeshPart::new(root, 0, 3)
            .with_child(MeshPart::new(middle, 3, 6).with_child(MeshPart::new(leaf, 9, 3)));
        (tree, [root, middle, leaf])
    }

    #[test]
    fn test_world_transform_is_product_of_ancestors() {
        let (tree, [root, middle, leaf]) = three_level_tree();
        let instance = Matrix4::from_scale(3.0);

        let nodes = tree.flatten(&instance);
        assert_eq!(nodes.len(), 3);
        assert!(approx_eq(&nodes[0].1, &(instance * root)));
        assert!(approx_eq(&nodes[1].1, &(instance * root * middle)));
        assert!(approx_eq(&nodes[2].1, &(instance * root * middle * leaf)));
    }

    #[test]
    fn test_leaf_transform_moves_points_as_composed() {
        let (tree, _) = three_level_tree();
        let nodes = tree.flatten(&Matrix4::identity());
        let leaf_world = nodes[2].1;

        // scale x by 2, rotate +X onto -Z, then translate
        let p = leaf_world * cgmath::Vector4::new(1.0, 0.0, 0.0, 1.0);
        assert!((p.x - 1.0).abs() < 1e-5);
        assert!((p.y - 2.0).abs() < 1e-5);
        assert!((p.z - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_pre_order_ranges_partition_vertices() {
        let (tree, _) = three_level_tree();
        let ranges: Vec<_> = tree
            .flatten(&Matrix4::identity())
            .into_iter()
            .map(|(range, _)| range)
            .collect();

        let mut expected_start = 0;
        for range in &ranges {
            assert_eq!(range.start, expected_start);
            expected_start = range.end;
        }
        assert_eq!(expected_start, 12);
    }

    #[test]
    fn test_for_each_matches_fallible_visit() {
        let (tree, _) = three_level_tree();
        let instance = Matrix4::from_scale(2.0);
        let mut visited = Vec::new();
        tree.visit::<(), _>(&instance, &mut |part, world| {
            visited.push((part.range(), *world));
            Ok(())
        })
        .unwrap();
        assert_eq!(tree.flatten(&instance), visited);
    }

    #[test]
    fn test_visit_stops_on_error() {
        let (tree, _) = three_level_tree();
        let mut seen = 0;
        let result = tree.visit(&Matrix4::identity(), &mut |_, _| {
            seen += 1;
            if seen == 2 {
                Err("stop")
            } else {
                Ok(())
            }
        });
        assert_eq!(result, Err("stop"));
        assert_eq!(seen, 2);
        assert_eq!(tree.node_count(), 3);
    }
}
