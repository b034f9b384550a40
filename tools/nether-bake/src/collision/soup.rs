//! Triangle soup input and the degenerate-triangle filter

use glam::Vec3;
use hashbrown::HashMap;

use crate::geometry::{triangle_area, VertexKey};

/// Single-precision unit round-off used to scale the degenerate epsilon
pub const MACHINE_EPSILON: f32 = 1.192_092_9e-6;

/// Absolute floor of the degenerate epsilon
pub const MIN_DEGENERATE_EPSILON: f32 = 0.01;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SoupError {
    #[error("triangle index count {0} is not a multiple of 3")]
    RaggedIndices(usize),

    #[error("triangle index {index} out of range for {vertex_count} vertices")]
    IndexOutOfRange { index: u32, vertex_count: usize },
}

/// Raw collision input: vertices plus index triples
#[derive(Debug, Clone, PartialEq)]
pub struct TriangleSoup {
    vertices: Vec<[f32; 3]>,
    triangles: Vec<[u32; 3]>,
}

impl TriangleSoup {
    /// Build from a flat index list, checking every index against the vertices
    pub fn from_flat(vertices: Vec<[f32; 3]>, indices: Vec<u32>) -> Result<Self, SoupError> {
        if indices.len() % 3 != 0 {
            return Err(SoupError::RaggedIndices(indices.len()));
        }
        if let Some(&index) = indices.iter().find(|&&i| i as usize >= vertices.len()) {
            return Err(SoupError::IndexOutOfRange {
                index,
                vertex_count: vertices.len(),
            });
        }

        let triangles = indices
            .chunks_exact(3)
            .map(|t| [t[0], t[1], t[2]])
            .collect();
        Ok(Self {
            vertices,
            triangles,
        })
    }

    pub fn vertices(&self) -> &[[f32; 3]] {
        &self.vertices
    }

    pub fn triangles(&self) -> &[[u32; 3]] {
        &self.triangles
    }
}

/// Filtered, compacted soup ready for BVH construction
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredSoup {
    pub vertices: Vec<[f32; 3]>,
    pub triangles: Vec<[u32; 3]>,
    /// Number of input triangles dropped as degenerate
    pub discarded: usize,
}

/// `max(0.01, 3 * (max|x| + max|y| + max|z|) * MACHINE_EPSILON)` over all vertices
pub fn degenerate_epsilon(vertices: &[[f32; 3]]) -> f32 {
    let max = vertices.iter().fold(Vec3::ZERO, |acc, v| {
        acc.max(Vec3::from_array(*v).abs())
    });
    let epsilon = 3.0 * (max.x + max.y + max.z) * MACHINE_EPSILON;
    epsilon.max(MIN_DEGENERATE_EPSILON)
}

fn is_degenerate(a: Vec3, b: Vec3, c: Vec3, epsilon: f32) -> bool {
    triangle_area(a, b, c) < epsilon
        || a.distance(b) < epsilon
        || a.distance(c) < epsilon
        || b.distance(c) < epsilon
}

/// Drop degenerate triangles and deduplicate the surviving vertices
///
/// Vertices are merged on exact position equality in first-seen order. Corner
/// order within each triangle is preserved.
pub fn filter_soup(soup: &TriangleSoup) -> FilteredSoup {
    let epsilon = degenerate_epsilon(&soup.vertices);

    let mut lookup: HashMap<VertexKey, u32> = HashMap::new();
    let mut vertices: Vec<[f32; 3]> = Vec::new();
    let mut triangles: Vec<[u32; 3]> = Vec::with_capacity(soup.triangles.len());
    let mut discarded = 0;

    for triangle in &soup.triangles {
        let [a, b, c] = triangle.map(|i| Vec3::from_array(soup.vertices[i as usize]));
        if is_degenerate(a, b, c, epsilon) {
            discarded += 1;
            continue;
        }

        let remapped = triangle.map(|i| {
            let position = soup.vertices[i as usize];
            *lookup.entry(VertexKey::new(position)).or_insert_with(|| {
                vertices.push(position);
                (vertices.len() - 1) as u32
            })
        });
        triangles.push(remapped);
    }

    if discarded > 0 {
        tracing::debug!(
            "Discarded {} degenerate triangles (epsilon={})",
            discarded,
            epsilon
        );
    }

    FilteredSoup {
        vertices,
        triangles,
        discarded,
    }
}
