//! The export pass: encode every object, bake every collider, write the tables
//!
//! Output files are assembled in a staging directory beside the output
//! directory and moved into place only once the whole scene has baked.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::collision::{build_collision, CollisionOutcome};
use crate::formats::{write_mesh_table, write_object_table, CollisionTables};
use crate::manifest::BakeManifest;
use crate::mesh::{EncodeCache, EncodedMesh, UvTransform};
use crate::scene::SceneSource;

pub const MESHES_FILE: &str = "meshes.bin";
pub const OBJECTS_FILE: &str = "objects.bin";
pub const COLLISION_FILE: &str = "collision.bin";
pub const REPORT_FILE: &str = "report.toml";

/// Summary of a bake, written as report.toml
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BakeReport {
    pub objects: usize,
    /// Objects served from an existing encoded mesh
    pub cache_hits: usize,
    pub vertex_tables: usize,
    pub bvh_tables: usize,
    pub meshes: Vec<MeshStats>,
    pub colliders: Vec<ColliderStats>,
    pub excluded_colliders: Vec<ExcludedCollider>,
}

/// One entry of the encoded mesh table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshStats {
    pub mesh: String,
    pub source_vertices: usize,
    pub encoded_vertices: usize,
    pub indices: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColliderStats {
    pub id: String,
    pub triangles: usize,
    pub vertices: usize,
    pub leaves: usize,
    pub interiors: usize,
    pub depth: usize,
}

/// A collider dropped because none of its triangles survived filtering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcludedCollider {
    pub id: String,
    pub discarded: usize,
}

/// A fully baked scene, not yet written anywhere
#[derive(Debug)]
pub struct BakedScene {
    pub meshes: Vec<EncodedMesh>,
    /// Mesh table index per object, in manifest order
    pub objects: Vec<u32>,
    pub collision: CollisionTables,
    pub report: BakeReport,
}

impl BakedScene {
    /// Serialize every output file as (file name, contents)
    pub fn to_files(&self) -> Result<Vec<(&'static str, Vec<u8>)>> {
        let mut meshes = Vec::new();
        write_mesh_table(&mut meshes, &self.meshes).context("Failed to write mesh table")?;

        let mut objects = Vec::new();
        write_object_table(&mut objects, &self.objects).context("Failed to write object table")?;

        let mut collision = Vec::new();
        self.collision
            .write(&mut collision)
            .context("Failed to write collision tables")?;

        let report = toml::to_string(&self.report).context("Failed to serialize bake report")?;

        Ok(vec![
            (MESHES_FILE, meshes),
            (OBJECTS_FILE, objects),
            (COLLISION_FILE, collision),
            (REPORT_FILE, report.into_bytes()),
        ])
    }
}

/// Run the bake entirely in memory
pub fn bake_to_memory(manifest: &BakeManifest, scene: &impl SceneSource) -> Result<BakedScene> {
    manifest.validate()?;

    let mut cache = EncodeCache::new();
    let mut objects = Vec::with_capacity(manifest.objects.len());
    let mut report = BakeReport {
        objects: manifest.objects.len(),
        ..Default::default()
    };

    for object in &manifest.objects {
        let mesh = scene.mesh(&object.mesh)?;
        let materials: Vec<Option<String>> = if object.materials.is_empty() {
            scene.submesh_materials(&object.mesh)?
        } else {
            object.materials.iter().cloned().map(Some).collect()
        };
        let transforms = materials
            .iter()
            .map(|m| scene.uv_transform(m.as_deref()))
            .collect::<Result<Vec<UvTransform>>>()
            .with_context(|| format!("Failed to resolve materials of object '{}'", object.id))?;

        let before = cache.len();
        let index = cache
            .get_or_encode(&object.mesh, mesh, &transforms)
            .with_context(|| format!("Failed to encode object '{}'", object.id))?;

        if cache.len() > before {
            let encoded = cache
                .get(index)
                .with_context(|| format!("Mesh table entry {} missing", index))?;
            tracing::info!(
                "Encoded object '{}' (mesh '{}'): {} -> {} vertices",
                object.id,
                object.mesh,
                mesh.vertex_count(),
                encoded.vertex_count()
            );
            report.meshes.push(MeshStats {
                mesh: object.mesh.clone(),
                source_vertices: mesh.vertex_count(),
                encoded_vertices: encoded.vertex_count(),
                indices: encoded.index_count(),
            });
        } else {
            tracing::debug!("Object '{}' reuses mesh table entry {}", object.id, index);
        }

        objects.push(u32::try_from(index).context("Mesh table too large")?);
    }
    report.cache_hits = cache.hits();

    let config = manifest.bvh_config();
    let mut collision = CollisionTables::new();

    for collider in &manifest.colliders {
        let soup = scene
            .triangle_soup(&collider.mesh)
            .with_context(|| format!("Failed to read collider '{}'", collider.id))?;

        match build_collision(&soup, &config) {
            CollisionOutcome::Baked(mesh) => {
                collision
                    .add(&mesh)
                    .with_context(|| format!("Failed to emit collider '{}'", collider.id))?;
                tracing::info!(
                    "Baked collider '{}': {} triangles, {} leaves, depth {}",
                    collider.id,
                    mesh.triangles.len(),
                    mesh.bvh.leaves().len(),
                    mesh.bvh.depth()
                );
                report.colliders.push(ColliderStats {
                    id: collider.id.clone(),
                    triangles: mesh.triangles.len(),
                    vertices: mesh.vertices.len(),
                    leaves: mesh.bvh.leaves().len(),
                    interiors: mesh.bvh.interiors().len(),
                    depth: mesh.bvh.depth(),
                });
            }
            CollisionOutcome::Excluded { discarded } => {
                tracing::warn!(
                    "Collider '{}' has no usable triangles ({} degenerate), excluding it",
                    collider.id,
                    discarded
                );
                report.excluded_colliders.push(ExcludedCollider {
                    id: collider.id.clone(),
                    discarded,
                });
            }
        }
    }
    report.vertex_tables = collision.vertex_table_count();
    report.bvh_tables = collision.bvh_count();

    Ok(BakedScene {
        meshes: cache.entries().to_vec(),
        objects,
        collision,
        report,
    })
}

/// Bake the scene and write all output files into `output_dir`
pub fn bake(
    manifest: &BakeManifest,
    scene: &impl SceneSource,
    output_dir: &Path,
) -> Result<BakeReport> {
    let baked = bake_to_memory(manifest, scene)?;
    let files = baked.to_files()?;

    let parent = match output_dir.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)
        .with_context(|| format!("Failed to create directory: {:?}", parent))?;

    let staging = tempfile::Builder::new()
        .prefix(".nether-bake-")
        .tempdir_in(&parent)
        .with_context(|| format!("Failed to create staging directory in {:?}", parent))?;

    let staged = staging.path().join("new");
    let backup = staging.path().join("old");
    fs::create_dir(&staged)?;
    fs::create_dir(&backup)?;

    for (name, contents) in &files {
        let path = staged.join(name);
        fs::write(&path, contents).with_context(|| format!("Failed to write {:?}", path))?;
    }

    let names: Vec<&str> = files.iter().map(|(name, _)| *name).collect();
    commit(&staged, &backup, output_dir, &names)?;
    for (name, contents) in &files {
        tracing::debug!("Wrote {:?} ({} bytes)", output_dir.join(name), contents.len());
    }

    tracing::info!(
        "Baked {} objects into {} meshes, {} colliders ({} excluded) -> {:?}",
        baked.report.objects,
        baked.meshes.len(),
        baked.collision.collider_count(),
        baked.report.excluded_colliders.len(),
        output_dir
    );

    Ok(baked.report)
}

/// Move staged files into `output_dir` as one unit
///
/// Previous outputs are moved into `backup` first. If any move fails, the
/// files already placed are removed and the previous outputs are restored.
fn commit(staged: &Path, backup: &Path, output_dir: &Path, names: &[&str]) -> Result<()> {
    for name in names {
        let target = output_dir.join(name);
        match fs::symlink_metadata(&target) {
            Ok(meta) if !meta.is_file() => {
                bail!("Output path {:?} exists and is not a file", target)
            }
            _ => {}
        }
    }

    let created = !output_dir.exists();
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory: {:?}", output_dir))?;

    let mut moved_aside = Vec::new();
    let mut placed = Vec::new();
    let result = swap_in(staged, backup, output_dir, names, &mut moved_aside, &mut placed);

    if result.is_err() {
        for name in &placed {
            if let Err(e) = fs::remove_file(output_dir.join(name)) {
                tracing::warn!("Failed to remove partial output {}: {}", name, e);
            }
        }
        for name in &moved_aside {
            if let Err(e) = fs::rename(backup.join(name), output_dir.join(name)) {
                tracing::warn!("Failed to restore previous {}: {}", name, e);
            }
        }
        if created {
            fs::remove_dir(output_dir).ok();
        }
    }

    result
}

fn swap_in<'a>(
    staged: &Path,
    backup: &Path,
    output_dir: &Path,
    names: &[&'a str],
    moved_aside: &mut Vec<&'a str>,
    placed: &mut Vec<&'a str>,
) -> Result<()> {
    for &name in names {
        let target = output_dir.join(name);
        if target.exists() {
            fs::rename(&target, backup.join(name))
                .with_context(|| format!("Failed to move previous {:?} aside", target))?;
            moved_aside.push(name);
        }
    }

    for &name in names {
        fs::rename(staged.join(name), output_dir.join(name))
            .with_context(|| format!("Failed to move {} into {:?}", name, output_dir))?;
        placed.push(name);
    }

    Ok(())
}
