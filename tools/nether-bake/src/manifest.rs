//! bake.toml scene manifest
//!
//! Declares UV transforms per material, source meshes, the scene objects that
//! instance them, and which meshes contribute static collision.

use anyhow::{bail, Context, Result};
use hashbrown::HashSet;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::collision::BvhConfig;
use crate::mesh::UvTransform;

/// Material id that always resolves to the invalid UV transform
pub const NO_MATERIAL: &str = "none";

/// Root manifest structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BakeManifest {
    #[serde(default)]
    pub output: OutputSection,
    #[serde(default)]
    pub collision: CollisionSection,
    #[serde(default)]
    pub materials: Vec<MaterialEntry>,
    #[serde(default)]
    pub meshes: Vec<MeshEntry>,
    #[serde(default)]
    pub objects: Vec<ObjectEntry>,
    #[serde(default)]
    pub colliders: Vec<ColliderEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputSection {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("build")
}

/// BVH tuning
#[derive(Debug, Clone, Deserialize)]
pub struct CollisionSection {
    #[serde(default = "default_max_leaf_size")]
    pub max_leaf_size: usize,
    #[serde(default = "default_relative_threshold")]
    pub relative_threshold: f32,
}

impl Default for CollisionSection {
    fn default() -> Self {
        Self {
            max_leaf_size: default_max_leaf_size(),
            relative_threshold: default_relative_threshold(),
        }
    }
}

fn default_max_leaf_size() -> usize {
    BvhConfig::default().max_leaf_size
}

fn default_relative_threshold() -> f32 {
    BvhConfig::default().relative_threshold
}

/// Texture placement for one material
#[derive(Debug, Clone, Deserialize)]
pub struct MaterialEntry {
    pub id: String,
    #[serde(default = "default_scale")]
    pub scale: [f32; 2],
    #[serde(default)]
    pub offset: [f32; 2],
}

fn default_scale() -> [f32; 2] {
    [1.0, 1.0]
}

#[derive(Debug, Clone, Deserialize)]
pub struct MeshEntry {
    pub id: String,
    /// OBJ path, relative to the manifest
    pub path: PathBuf,
}

/// Scene object: a mesh plus one material per submesh
#[derive(Debug, Clone, Deserialize)]
pub struct ObjectEntry {
    pub id: String,
    pub mesh: String,
    /// Material per submesh; when omitted, the mesh's own `usemtl` names are used
    #[serde(default)]
    pub materials: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ColliderEntry {
    pub id: String,
    pub mesh: String,
}

impl BakeManifest {
    /// Load manifest from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest: {:?}", path))?;
        Self::parse(&content).with_context(|| format!("Failed to parse manifest: {:?}", path))
    }

    /// Parse manifest from string
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse bake.toml")
    }

    pub fn bvh_config(&self) -> BvhConfig {
        BvhConfig {
            max_leaf_size: self.collision.max_leaf_size,
            relative_threshold: self.collision.relative_threshold,
        }
    }

    /// Resolve a material id to its UV transform
    ///
    /// `None` and [`NO_MATERIAL`] give the invalid sentinel.
    pub fn uv_transform(&self, material: Option<&str>) -> Option<UvTransform> {
        match material {
            None | Some(NO_MATERIAL) => Some(UvTransform::INVALID),
            Some(id) => self
                .materials
                .iter()
                .find(|m| m.id == id)
                .map(|m| UvTransform::new(m.scale, m.offset)),
        }
    }

    pub fn mesh(&self, id: &str) -> Option<&MeshEntry> {
        self.meshes.iter().find(|m| m.id == id)
    }

    /// Check ids and cross references
    pub fn validate(&self) -> Result<()> {
        check_unique("material", self.materials.iter().map(|m| m.id.as_str()))?;
        check_unique("mesh", self.meshes.iter().map(|m| m.id.as_str()))?;
        check_unique("object", self.objects.iter().map(|o| o.id.as_str()))?;
        check_unique("collider", self.colliders.iter().map(|c| c.id.as_str()))?;

        if self.materials.iter().any(|m| m.id == NO_MATERIAL) {
            bail!("Material id '{}' is reserved", NO_MATERIAL);
        }

        for object in &self.objects {
            if self.mesh(&object.mesh).is_none() {
                bail!("Object '{}' references unknown mesh '{}'", object.id, object.mesh);
            }
            for material in &object.materials {
                if self.uv_transform(Some(material)).is_none() {
                    bail!(
                        "Object '{}' references unknown material '{}'",
                        object.id,
                        material
                    );
                }
            }
        }

        for collider in &self.colliders {
            if self.mesh(&collider.mesh).is_none() {
                bail!(
                    "Collider '{}' references unknown mesh '{}'",
                    collider.id,
                    collider.mesh
                );
            }
        }

        Ok(())
    }
}

fn check_unique<'a>(kind: &str, ids: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            bail!("Duplicate {} id '{}'", kind, id);
        }
    }
    Ok(())
}
