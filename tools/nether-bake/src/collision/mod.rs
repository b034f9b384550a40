//! Collision mesh baking (triangle soup -> filtered soup + BVH)

mod bvh;
mod soup;

pub use bvh::{Bvh, BvhBuilder, BvhConfig, InteriorNode, LeafNode, NodeRef};
pub use soup::{
    degenerate_epsilon, filter_soup, FilteredSoup, SoupError, TriangleSoup, MACHINE_EPSILON,
    MIN_DEGENERATE_EPSILON,
};

/// A collider ready for emission
#[derive(Debug, Clone, PartialEq)]
pub struct CollisionMesh {
    /// Deduplicated vertex positions
    pub vertices: Vec<[f32; 3]>,
    /// Corner indices into `vertices`, original winding
    pub triangles: Vec<[u32; 3]>,
    pub bvh: Bvh,
}

/// Result of baking one collider
#[derive(Debug, Clone, PartialEq)]
pub enum CollisionOutcome {
    Baked(CollisionMesh),
    /// Every triangle was degenerate; the caller drops the collider
    Excluded { discarded: usize },
}

/// Filter a raw soup and build its BVH
pub fn build_collision(soup: &TriangleSoup, config: &BvhConfig) -> CollisionOutcome {
    let filtered = filter_soup(soup);

    if filtered.triangles.is_empty() {
        return CollisionOutcome::Excluded {
            discarded: filtered.discarded,
        };
    }

    let bvh = BvhBuilder::new(&filtered.vertices, &filtered.triangles, config).build();

    tracing::debug!(
        "Baked collision: {} triangles ({} discarded), {} vertices, {} leaves, {} interiors",
        filtered.triangles.len(),
        filtered.discarded,
        filtered.vertices.len(),
        bvh.leaves().len(),
        bvh.interiors().len()
    );

    CollisionOutcome::Baked(CollisionMesh {
        vertices: filtered.vertices,
        triangles: filtered.triangles,
        bvh,
    })
}
