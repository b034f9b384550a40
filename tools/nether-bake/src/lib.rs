//! nether-bake library
//!
//! Bakes editor scenes into runtime-ready mesh and collision tables for the
//! Nethercore fixed-function target (u16 indices, one UV channel per vertex,
//! triangle-soup collision).

pub mod bake;
pub mod collision;
pub mod formats;
pub mod geometry;
pub mod manifest;
pub mod mesh;
pub mod obj;
pub mod scene;

// Re-export the encoder API
pub use mesh::{encode, EncodeCache, EncodedMesh, ReplicationError, SourceMesh, UvTransform};

// Re-export the collision API
pub use collision::{
    build_collision, filter_soup, Bvh, BvhConfig, CollisionMesh, CollisionOutcome, NodeRef,
    TriangleSoup,
};

// Re-export the bake pipeline
pub use bake::{bake, bake_to_memory, BakeReport, BakedScene};
pub use manifest::BakeManifest;
pub use scene::{ManifestScene, SceneSource};
