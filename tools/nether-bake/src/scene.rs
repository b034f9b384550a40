//! Scene data access for the bake pass
//!
//! [`SceneSource`] is the only way the bake pass reaches scene data. The
//! manifest-backed implementation loads every referenced OBJ up front so that
//! a missing or malformed file fails before anything is encoded.

use anyhow::{Context, Result};
use hashbrown::HashMap;
use std::path::Path;

use crate::collision::TriangleSoup;
use crate::manifest::BakeManifest;
use crate::mesh::{SourceMesh, UvTransform};
use crate::obj::{load_obj, DEFAULT_SUBMESH};

/// Read access to meshes, materials and collision geometry
pub trait SceneSource {
    /// Mesh geometry by id
    fn mesh(&self, mesh_id: &str) -> Result<&SourceMesh>;

    /// UV transform for a material; `None` means the submesh has no material
    fn uv_transform(&self, material: Option<&str>) -> Result<UvTransform>;

    /// Material authored on each submesh of a mesh, `None` where there is none
    fn submesh_materials(&self, mesh_id: &str) -> Result<Vec<Option<String>>> {
        Ok(vec![None; self.mesh(mesh_id)?.submeshes.len()])
    }

    /// Raw triangles of a mesh for collision baking
    fn triangle_soup(&self, mesh_id: &str) -> Result<TriangleSoup> {
        let mesh = self.mesh(mesh_id)?;
        TriangleSoup::from_flat(mesh.positions.clone(), mesh.triangle_indices())
            .with_context(|| format!("Mesh '{}' is not a valid triangle soup", mesh_id))
    }
}

/// Scene described by a bake.toml and the OBJ files next to it
#[derive(Debug)]
pub struct ManifestScene<'a> {
    manifest: &'a BakeManifest,
    meshes: HashMap<String, SourceMesh>,
    /// `usemtl` names per submesh, for meshes loaded from OBJ
    materials: HashMap<String, Vec<String>>,
}

impl<'a> ManifestScene<'a> {
    /// Load every mesh the manifest declares, resolving paths against `base_dir`
    pub fn load(manifest: &'a BakeManifest, base_dir: &Path) -> Result<Self> {
        let mut meshes = HashMap::with_capacity(manifest.meshes.len());
        let mut materials = HashMap::with_capacity(manifest.meshes.len());

        for entry in &manifest.meshes {
            let path = base_dir.join(&entry.path);
            let obj = load_obj(&path).with_context(|| format!("Failed to load mesh '{}'", entry.id))?;
            tracing::info!(
                "Loaded mesh '{}': {} vertices, {} submeshes",
                entry.id,
                obj.mesh.vertex_count(),
                obj.mesh.submeshes.len()
            );
            meshes.insert(entry.id.clone(), obj.mesh);
            materials.insert(entry.id.clone(), obj.materials);
        }

        Ok(Self {
            manifest,
            meshes,
            materials,
        })
    }

    /// Build a scene from meshes already in memory
    pub fn from_meshes(
        manifest: &'a BakeManifest,
        meshes: impl IntoIterator<Item = (String, SourceMesh)>,
    ) -> Self {
        Self {
            manifest,
            meshes: meshes.into_iter().collect(),
            materials: HashMap::new(),
        }
    }

    pub fn manifest(&self) -> &BakeManifest {
        self.manifest
    }
}

impl SceneSource for ManifestScene<'_> {
    fn mesh(&self, mesh_id: &str) -> Result<&SourceMesh> {
        self.meshes
            .get(mesh_id)
            .with_context(|| format!("Unknown mesh '{}'", mesh_id))
    }

    fn uv_transform(&self, material: Option<&str>) -> Result<UvTransform> {
        self.manifest
            .uv_transform(material)
            .with_context(|| format!("Unknown material '{}'", material.unwrap_or_default()))
    }

    fn submesh_materials(&self, mesh_id: &str) -> Result<Vec<Option<String>>> {
        let mesh = self.mesh(mesh_id)?;
        let Some(names) = self.materials.get(mesh_id) else {
            return Ok(vec![None; mesh.submeshes.len()]);
        };
        Ok(names
            .iter()
            .map(|name| (name != DEFAULT_SUBMESH).then(|| name.clone()))
            .collect())
    }
}
