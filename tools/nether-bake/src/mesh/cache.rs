//! Content-addressed cache of encoded meshes
//!
//! Scene objects that reference the same mesh with the same ordered UV
//! transforms produce identical replications. The cache encodes each distinct
//! (mesh id, transform vector) once and hands out a stable table index.
//! Entries are write-once; nothing is invalidated during a bake.

use hashbrown::HashMap;

use super::replicate::encode;
use super::types::{EncodedMesh, ReplicationError, SourceMesh, UvTransform};
use crate::geometry::UvTransformKey;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    mesh_id: String,
    transforms: Vec<UvTransformKey>,
}

/// Write-once table of encoded meshes in first-request order
#[derive(Debug, Default)]
pub struct EncodeCache {
    lookup: HashMap<CacheKey, usize>,
    entries: Vec<EncodedMesh>,
    hits: usize,
}

impl EncodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the table index for this replication, encoding it on first use
    pub fn get_or_encode(
        &mut self,
        mesh_id: &str,
        mesh: &SourceMesh,
        transforms: &[UvTransform],
    ) -> Result<usize, ReplicationError> {
        let key = CacheKey {
            mesh_id: mesh_id.to_string(),
            transforms: transforms.iter().map(UvTransform::key).collect(),
        };

        if let Some(&index) = self.lookup.get(&key) {
            self.hits += 1;
            return Ok(index);
        }

        let encoded = encode(mesh, transforms)?;
        let index = self.entries.len();
        self.entries.push(encoded);
        self.lookup.insert(key, index);
        Ok(index)
    }

    pub fn get(&self, index: usize) -> Option<&EncodedMesh> {
        self.entries.get(index)
    }

    /// Encoded meshes in table order
    pub fn entries(&self) -> &[EncodedMesh] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of requests served without encoding
    pub fn hits(&self) -> usize {
        self.hits
    }
}
