//! Render mesh encoding (per-submesh UV transforms -> replicated u16 mesh)

mod cache;
mod replicate;
mod types;

// Re-export public API
pub use cache::EncodeCache;
pub use replicate::{encode, group_by_transform, ReplicationGroup};
pub use types::{
    EncodedMesh, ErrorClass, ReplicationError, SourceMesh, UvTransform, MAX_VERTEX_COUNT,
};
