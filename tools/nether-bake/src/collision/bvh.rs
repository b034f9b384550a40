//! Median-split bounding volume hierarchy over collision triangles
//!
//! Nodes live in two arenas (leaves, interiors) addressed by index, which is
//! also how the runtime tables are laid out. Both arenas are filled in build
//! order: a node is appended once its subtree is complete, so the root is
//! always the last node created.

use glam::Vec3;

use crate::geometry::{triangle_centroid, Aabb};

/// BVH build parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BvhConfig {
    /// Sets at or below this triangle count become leaves
    pub max_leaf_size: usize,
    /// Fraction of the scene diagonal below which a node is not split
    pub relative_threshold: f32,
}

impl Default for BvhConfig {
    fn default() -> Self {
        Self {
            max_leaf_size: 32,
            relative_threshold: 0.01,
        }
    }
}

/// Arena reference to a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRef {
    Leaf(u32),
    Interior(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeafNode {
    pub bounds: Aabb,
    /// Indices into the collision mesh's triangle list
    pub triangles: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InteriorNode {
    pub bounds: Aabb,
    pub left: NodeRef,
    pub right: NodeRef,
}

/// Built hierarchy
#[derive(Debug, Clone, PartialEq)]
pub struct Bvh {
    leaves: Vec<LeafNode>,
    interiors: Vec<InteriorNode>,
    root: NodeRef,
    order: Vec<NodeRef>,
}

impl Bvh {
    pub fn root(&self) -> NodeRef {
        self.root
    }

    pub fn leaves(&self) -> &[LeafNode] {
        &self.leaves
    }

    pub fn interiors(&self) -> &[InteriorNode] {
        &self.interiors
    }

    /// Every node, leaves and interiors interleaved, in creation order
    pub fn build_order(&self) -> &[NodeRef] {
        &self.order
    }

    pub fn bounds(&self, node: NodeRef) -> Option<&Aabb> {
        match node {
            NodeRef::Leaf(i) => self.leaves.get(i as usize).map(|n| &n.bounds),
            NodeRef::Interior(i) => self.interiors.get(i as usize).map(|n| &n.bounds),
        }
    }

    /// Triangle indices of every leaf below `node`, left to right
    pub fn collect_triangles(&self, node: NodeRef) -> Vec<u32> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(node) = stack.pop() {
            match node {
                NodeRef::Leaf(i) => {
                    if let Some(leaf) = self.leaves.get(i as usize) {
                        out.extend_from_slice(&leaf.triangles);
                    }
                }
                NodeRef::Interior(i) => {
                    if let Some(interior) = self.interiors.get(i as usize) {
                        stack.push(interior.right);
                        stack.push(interior.left);
                    }
                }
            }
        }
        out
    }

    /// Depth of the deepest leaf (a lone root leaf has depth 1)
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(self.root, 1)];
        while let Some((node, depth)) = stack.pop() {
            match node {
                NodeRef::Leaf(_) => deepest = deepest.max(depth),
                NodeRef::Interior(i) => {
                    if let Some(interior) = self.interiors.get(i as usize) {
                        stack.push((interior.left, depth + 1));
                        stack.push((interior.right, depth + 1));
                    }
                }
            }
        }
        deepest
    }
}

/// Single-use builder; working state is dropped with it
pub struct BvhBuilder<'a> {
    vertices: &'a [[f32; 3]],
    triangles: &'a [[u32; 3]],
    max_leaf_size: usize,
    split_threshold: f32,
    centroids: Vec<Vec3>,
    leaves: Vec<LeafNode>,
    interiors: Vec<InteriorNode>,
    order: Vec<NodeRef>,
}

impl<'a> BvhBuilder<'a> {
    /// Prepare a build over `triangles`
    ///
    /// Every triangle index must be in range for `vertices`. Callers reject
    /// empty input; an empty build yields a single empty leaf.
    pub fn new(vertices: &'a [[f32; 3]], triangles: &'a [[u32; 3]], config: &BvhConfig) -> Self {
        let corner = |i: u32| Vec3::from_array(vertices[i as usize]);

        let centroids: Vec<Vec3> = triangles
            .iter()
            .map(|&[a, b, c]| triangle_centroid(corner(a), corner(b), corner(c)))
            .collect();

        let scene = Aabb::from_points(triangles.iter().flatten().map(|&i| corner(i)));

        Self {
            vertices,
            triangles,
            // A zero cap would split single triangles forever
            max_leaf_size: config.max_leaf_size.max(1),
            split_threshold: scene.diagonal() * config.relative_threshold,
            centroids,
            leaves: Vec::new(),
            interiors: Vec::new(),
            order: Vec::new(),
        }
    }

    pub fn build(mut self) -> Bvh {
        let mut all: Vec<u32> = (0..self.triangles.len() as u32).collect();
        let root = self.build_node(&mut all);

        Bvh {
            leaves: self.leaves,
            interiors: self.interiors,
            root,
            order: self.order,
        }
    }

    fn bounds_of(&self, set: &[u32]) -> Aabb {
        Aabb::from_points(
            set.iter()
                .flat_map(|&t| self.triangles[t as usize])
                .map(|i| Vec3::from_array(self.vertices[i as usize])),
        )
    }

    fn build_node(&mut self, set: &mut [u32]) -> NodeRef {
        let bounds = self.bounds_of(set);

        // The count test alone guarantees both halves shrink, even when every
        // centroid coincides
        if set.len() <= self.max_leaf_size || bounds.diagonal() <= self.split_threshold {
            let node = NodeRef::Leaf(self.leaves.len() as u32);
            self.leaves.push(LeafNode {
                bounds,
                triangles: set.to_vec(),
            });
            self.order.push(node);
            return node;
        }

        let axis = bounds.longest_axis();
        let centroids = &self.centroids;
        // Stable: equal centroids keep their incoming order
        set.sort_by(|&a, &b| centroids[a as usize][axis].total_cmp(&centroids[b as usize][axis]));

        let mid = set.len() / 2;
        let (left_set, right_set) = set.split_at_mut(mid);
        let left = self.build_node(left_set);
        let right = self.build_node(right_set);

        let node = NodeRef::Interior(self.interiors.len() as u32);
        self.interiors.push(InteriorNode {
            bounds,
            left,
            right,
        });
        self.order.push(node);
        node
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_pcg::Pcg32;

    /// Row of unit right triangles along +X, `spacing` apart
    fn triangle_row(count: usize, spacing: f32) -> (Vec<[f32; 3]>, Vec<[u32; 3]>) {
        let mut vertices = Vec::new();
        let mut triangles = Vec::new();
        for i in 0..count {
            let x = i as f32 * spacing;
            let base = vertices.len() as u32;
            vertices.push([x, 0.0, 0.0]);
            vertices.push([x + 1.0, 0.0, 0.0]);
            vertices.push([x, 1.0, 0.0]);
            triangles.push([base, base + 1, base + 2]);
        }
        (vertices, triangles)
    }

    fn random_soup(seed: u64, count: usize) -> (Vec<[f32; 3]>, Vec<[u32; 3]>) {
        let mut rng = Pcg32::seed_from_u64(seed);
        let mut vertices = Vec::new();
        let mut triangles = Vec::new();
        for _ in 0..count {
            let center: [f32; 3] = [
                rng.random_range(-50.0..50.0),
                rng.random_range(-50.0..50.0),
                rng.random_range(-50.0..50.0),
            ];
            let base = vertices.len() as u32;
            for _ in 0..3 {
                vertices.push([
                    center[0] + rng.random_range(-2.0..2.0),
                    center[1] + rng.random_range(-2.0..2.0),
                    center[2] + rng.random_range(-2.0..2.0),
                ]);
            }
            triangles.push([base, base + 1, base + 2]);
        }
        (vertices, triangles)
    }

    fn assert_partition(bvh: &Bvh, triangle_count: usize) {
        let mut seen = vec![0u32; triangle_count];
        for leaf in bvh.leaves() {
            for &t in &leaf.triangles {
                seen[t as usize] += 1;
            }
        }
        assert!(seen.iter().all(|&n| n == 1), "every triangle in exactly one leaf");
    }

    fn assert_containment(bvh: &Bvh, vertices: &[[f32; 3]], triangles: &[[u32; 3]]) {
        for &node in bvh.build_order() {
            let bounds = bvh.bounds(node).unwrap();
            for t in bvh.collect_triangles(node) {
                for &i in &triangles[t as usize] {
                    let p = Vec3::from_array(vertices[i as usize]);
                    assert!(bounds.contains(p, 1e-4), "{:?} escapes {:?}", p, bounds);
                }
            }
        }
    }

    #[test]
    fn test_forty_triangles_split_once() {
        let (vertices, triangles) = triangle_row(40, 2.0);
        let bvh = BvhBuilder::new(&vertices, &triangles, &BvhConfig::default()).build();

        assert_eq!(bvh.interiors().len(), 1);
        assert_eq!(bvh.leaves().len(), 2);
        assert_eq!(bvh.root(), NodeRef::Interior(0));
        assert_eq!(bvh.leaves()[0].triangles, (0..20).collect::<Vec<_>>());
        assert_eq!(bvh.leaves()[1].triangles, (20..40).collect::<Vec<_>>());
        assert_eq!(
            bvh.build_order(),
            &[NodeRef::Leaf(0), NodeRef::Leaf(1), NodeRef::Interior(0)]
        );
        assert_partition(&bvh, 40);
    }

    #[test]
    fn test_small_input_is_single_leaf() {
        let (vertices, triangles) = triangle_row(32, 2.0);
        let bvh = BvhBuilder::new(&vertices, &triangles, &BvhConfig::default()).build();

        assert_eq!(bvh.root(), NodeRef::Leaf(0));
        assert_eq!(bvh.leaves().len(), 1);
        assert!(bvh.interiors().is_empty());
        assert_eq!(bvh.depth(), 1);
    }

    #[test]
    fn test_root_is_last_interior() {
        let (vertices, triangles) = triangle_row(200, 2.0);
        let config = BvhConfig {
            max_leaf_size: 8,
            relative_threshold: 0.0,
        };
        let bvh = BvhBuilder::new(&vertices, &triangles, &config).build();

        let last = bvh.interiors().len() as u32 - 1;
        assert_eq!(bvh.root(), NodeRef::Interior(last));
        assert_eq!(bvh.build_order().last(), Some(&bvh.root()));
        assert_eq!(bvh.leaves().len() + bvh.interiors().len(), bvh.build_order().len());
        assert!(bvh.leaves().iter().all(|l| l.triangles.len() <= 8));
        assert_partition(&bvh, 200);
    }

    #[test]
    fn test_split_threshold_stops_tiny_clusters() {
        // 64 triangles in a tight cluster plus one far away
        let (mut vertices, mut triangles) = triangle_row(64, 0.0);
        let base = vertices.len() as u32;
        vertices.extend([[1000.0, 0.0, 0.0], [1001.0, 0.0, 0.0], [1000.0, 1.0, 0.0]]);
        triangles.push([base, base + 1, base + 2]);

        let config = BvhConfig {
            max_leaf_size: 1,
            relative_threshold: 0.01,
        };
        let bvh = BvhBuilder::new(&vertices, &triangles, &config).build();

        // The cluster's diagonal (~1.4) is under 1% of the scene (~1001), so it
        // ends up in a handful of oversized leaves rather than 64 singletons
        assert!(bvh.leaves().iter().any(|l| l.triangles.len() > 1));
        assert!(bvh.leaves().len() < 10);
        assert_partition(&bvh, 65);
    }

    #[test]
    fn test_identical_centroids_terminate() {
        // 100 copies of the same triangle, no geometric threshold
        let vertices = vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let triangles = vec![[0, 1, 2]; 100];
        let config = BvhConfig {
            max_leaf_size: 4,
            relative_threshold: -1.0,
        };

        let bvh = BvhBuilder::new(&vertices, &triangles, &config).build();

        assert!(bvh.leaves().iter().all(|l| l.triangles.len() <= 4));
        assert_partition(&bvh, 100);
    }

    #[test]
    fn test_zero_leaf_size_is_clamped() {
        let (vertices, triangles) = triangle_row(5, 2.0);
        let config = BvhConfig {
            max_leaf_size: 0,
            relative_threshold: 0.0,
        };
        let bvh = BvhBuilder::new(&vertices, &triangles, &config).build();
        assert_eq!(bvh.leaves().len(), 5);
        assert_partition(&bvh, 5);
    }

    #[test]
    fn test_random_soups_contain_and_partition() {
        for seed in 0..8 {
            let (vertices, triangles) = random_soup(seed, 500);
            let config = BvhConfig {
                max_leaf_size: 16,
                relative_threshold: 0.01,
            };
            let bvh = BvhBuilder::new(&vertices, &triangles, &config).build();

            assert_partition(&bvh, triangles.len());
            assert_containment(&bvh, &vertices, &triangles);
            let mut all = bvh.collect_triangles(bvh.root());
            all.sort_unstable();
            assert_eq!(all, (0..500).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_build_is_deterministic() {
        let (vertices, triangles) = random_soup(42, 300);
        let config = BvhConfig::default();
        let a = BvhBuilder::new(&vertices, &triangles, &config).build();
        let b = BvhBuilder::new(&vertices, &triangles, &config).build();
        assert_eq!(a, b);
    }
}
