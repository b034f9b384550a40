//! Types and constants for mesh encoding

use crate::geometry::UvTransformKey;

/// Maximum vertex count addressable by u16 indices (65535)
/// Meshes that replicate past this must be split before export.
pub const MAX_VERTEX_COUNT: usize = u16::MAX as usize;

/// Source mesh as read from the scene
///
/// Attribute presence is mesh-wide: an attribute is either present for every
/// vertex or absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceMesh {
    pub positions: Vec<[f32; 3]>,
    pub uvs: Option<Vec<[f32; 2]>>,
    /// RGBA8
    pub colors: Option<Vec<[u8; 4]>>,
    pub normals: Option<Vec<[f32; 3]>>,
    /// Triangle index lists into `positions`, one per material slot
    pub submeshes: Vec<Vec<u32>>,
}

impl SourceMesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Check attribute lengths and submesh indices against the vertex count
    pub fn validate(&self) -> Result<(), ReplicationError> {
        let expected = self.positions.len();
        let lengths = [
            ("uv", self.uvs.as_ref().map(Vec::len)),
            ("color", self.colors.as_ref().map(Vec::len)),
            ("normal", self.normals.as_ref().map(Vec::len)),
        ];
        for (attribute, len) in lengths {
            match len {
                Some(actual) if actual != expected => {
                    return Err(ReplicationError::AttributeLength {
                        attribute,
                        expected,
                        actual,
                    });
                }
                _ => {}
            }
        }

        for (submesh, indices) in self.submeshes.iter().enumerate() {
            if let Some(&index) = indices.iter().find(|&&i| i as usize >= expected) {
                return Err(ReplicationError::IndexOutOfRange {
                    submesh,
                    index,
                    vertex_count: expected,
                });
            }
        }

        Ok(())
    }

    /// All submesh triangles concatenated, as a flat collision soup
    pub fn triangle_indices(&self) -> Vec<u32> {
        self.submeshes.iter().flatten().copied().collect()
    }
}

/// UV scale/offset applied by a submesh's material
///
/// A submesh without a material gets [`UvTransform::INVALID`], which is its own
/// replication group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UvTransform {
    pub valid: bool,
    pub scale: [f32; 2],
    pub offset: [f32; 2],
}

impl UvTransform {
    /// Sentinel for materialless submeshes (UVs collapse to zero)
    pub const INVALID: Self = Self {
        valid: false,
        scale: [0.0, 0.0],
        offset: [0.0, 0.0],
    };

    pub const IDENTITY: Self = Self {
        valid: true,
        scale: [1.0, 1.0],
        offset: [0.0, 0.0],
    };

    pub fn new(scale: [f32; 2], offset: [f32; 2]) -> Self {
        Self {
            valid: true,
            scale,
            offset,
        }
    }

    /// `uv * scale + offset`
    #[inline]
    pub fn apply(&self, uv: [f32; 2]) -> [f32; 2] {
        [
            uv[0] * self.scale[0] + self.offset[0],
            uv[1] * self.scale[1] + self.offset[1],
        ]
    }

    /// Bit-exact grouping key
    pub fn key(&self) -> UvTransformKey {
        UvTransformKey::new(self.valid, self.scale, self.offset)
    }
}

/// Result of replication: flat vertex streams plus per-submesh u16 indices
///
/// Absent attributes are empty vectors, matching the count-prefixed record layout.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncodedMesh {
    pub positions: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub colors: Vec<[u8; 4]>,
    pub normals: Vec<[f32; 3]>,
    pub submesh_indices: Vec<Vec<u16>>,
}

impl EncodedMesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn index_count(&self) -> usize {
        self.submesh_indices.iter().map(Vec::len).sum()
    }
}

/// Error category, used by callers deciding how to report a failed mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad input shape; nothing was produced
    Validation,
    /// Replication exceeded the u16 vertex ceiling
    Overflow,
    /// Internal slot bookkeeping disagreed with itself
    Consistency,
}

/// Fatal replication errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReplicationError {
    #[error("mesh has {submeshes} submeshes but {materials} materials")]
    CountMismatch { submeshes: usize, materials: usize },

    #[error("mesh has no submeshes")]
    EmptySubmeshes,

    #[error("{attribute} stream has {actual} entries, expected {expected}")]
    AttributeLength {
        attribute: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("submesh {submesh} references vertex {index}, but mesh has {vertex_count} vertices")]
    IndexOutOfRange {
        submesh: usize,
        index: u32,
        vertex_count: usize,
    },

    #[error("replication group {group} references no vertices")]
    EmptyLump { group: usize },

    #[error("mesh vertex count {actual} exceeds limit {limit} after replication")]
    IndexOverflow { limit: usize, actual: usize },

    #[error("submesh {submesh} vertex {vertex} mapped to slot {existing}, then to slot {attempted}")]
    VertexSlotConflict {
        submesh: usize,
        vertex: u32,
        existing: u32,
        attempted: u32,
    },

    #[error("submesh {submesh} vertex {vertex} has no output slot")]
    UnmappedVertex { submesh: usize, vertex: u32 },

    #[error("output slot {slot} does not match source vertex {vertex}")]
    VertexMismatch { vertex: u32, slot: u32 },
}

impl ReplicationError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::CountMismatch { .. }
            | Self::EmptySubmeshes
            | Self::AttributeLength { .. }
            | Self::IndexOutOfRange { .. }
            | Self::EmptyLump { .. } => ErrorClass::Validation,
            Self::IndexOverflow { .. } => ErrorClass::Overflow,
            Self::VertexSlotConflict { .. }
            | Self::UnmappedVertex { .. }
            | Self::VertexMismatch { .. } => ErrorClass::Consistency,
        }
    }
}
