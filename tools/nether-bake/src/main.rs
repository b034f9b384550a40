//! nether-bake - static scene baking tool
//!
//! Replicates mesh vertices per UV transform group and bakes collision
//! geometry into flattened BVH tables.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use nether_bake::bake::{COLLISION_FILE, MESHES_FILE, OBJECTS_FILE};
use nether_bake::formats::{read_collision_file, read_mesh_table, read_object_table};
use nether_bake::{bake, BakeManifest, ManifestScene, SceneSource};

#[derive(Parser)]
#[command(name = "nether-bake")]
#[command(about = "Nethercore static scene baker")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bake meshes and colliders from a manifest file
    Build {
        /// Path to bake.toml manifest
        #[arg(default_value = "bake.toml")]
        manifest: PathBuf,

        /// Output directory (overrides manifest)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate manifest and load meshes without writing anything
    Check {
        /// Path to bake.toml manifest
        #[arg(default_value = "bake.toml")]
        manifest: PathBuf,
    },

    /// Print a summary of a baked table file
    Inspect {
        /// meshes.bin, objects.bin or collision.bin
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match &cli.command {
        Commands::Build { verbose: true, .. } => tracing::Level::DEBUG,
        _ => tracing::Level::INFO,
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();

    match cli.command {
        Commands::Build {
            manifest, output, ..
        } => {
            let config = BakeManifest::load(&manifest)?;
            let base_dir = manifest_dir(&manifest);
            let scene = ManifestScene::load(&config, base_dir)?;

            let output_dir = output.unwrap_or_else(|| base_dir.join(&config.output.dir));
            let report = bake(&config, &scene, &output_dir)?;

            if !report.excluded_colliders.is_empty() {
                tracing::warn!(
                    "{} collider(s) excluded, see report.toml",
                    report.excluded_colliders.len()
                );
            }
            tracing::info!("Bake complete!");
        }
        Commands::Check { manifest } => {
            let config = BakeManifest::load(&manifest)?;
            config.validate()?;
            let scene = ManifestScene::load(&config, manifest_dir(&manifest))?;

            for object in &config.objects {
                let mesh = scene.mesh(&object.mesh)?;
                if object.materials.is_empty() {
                    for material in scene.submesh_materials(&object.mesh)? {
                        scene.uv_transform(material.as_deref()).with_context(|| {
                            format!("Object '{}' uses mesh '{}'", object.id, object.mesh)
                        })?;
                    }
                } else if mesh.submeshes.len() != object.materials.len() {
                    bail!(
                        "Object '{}' lists {} materials for {} submeshes of mesh '{}'",
                        object.id,
                        object.materials.len(),
                        mesh.submeshes.len(),
                        object.mesh
                    );
                }
            }
            for collider in &config.colliders {
                scene.triangle_soup(&collider.mesh)?;
            }

            tracing::info!(
                "Manifest OK: {} meshes, {} objects, {} colliders",
                config.meshes.len(),
                config.objects.len(),
                config.colliders.len()
            );
        }
        Commands::Inspect { file } => inspect(&file)?,
    }

    Ok(())
}

fn manifest_dir(manifest: &Path) -> &Path {
    manifest.parent().unwrap_or_else(|| Path::new("."))
}

fn inspect(path: &Path) -> Result<()> {
    let data = std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();

    match name {
        MESHES_FILE => {
            let meshes = read_mesh_table(&data)?;
            tracing::info!("{} encoded meshes", meshes.len());
            for (i, mesh) in meshes.iter().enumerate() {
                tracing::info!(
                    "  [{}] {} vertices, {} submeshes, {} indices (uv: {}, color: {}, normal: {})",
                    i,
                    mesh.vertex_count(),
                    mesh.submesh_indices.len(),
                    mesh.index_count(),
                    !mesh.uvs.is_empty(),
                    !mesh.colors.is_empty(),
                    !mesh.normals.is_empty()
                );
            }
        }
        OBJECTS_FILE => {
            let objects = read_object_table(&data)?;
            tracing::info!("{} objects -> mesh table {:?}", objects.len(), objects);
        }
        COLLISION_FILE => {
            let file = read_collision_file(&data)?;
            tracing::info!(
                "{} colliders, {} vertex tables, {} BVH tables",
                file.colliders.len(),
                file.vertex_tables.len(),
                file.bvhs.len()
            );
            for (i, collider) in file.colliders.iter().enumerate() {
                let vertices = &file.vertex_tables[collider.vertex_table as usize];
                let bvh = &file.bvhs[collider.bvh as usize];
                let triangles: usize = bvh.leaves.iter().map(|l| l.corners.len() / 3).sum();
                tracing::info!(
                    "  [{}] {} vertices, {} triangles, {} leaves, {} interiors",
                    i,
                    vertices.len(),
                    triangles,
                    bvh.leaves.len(),
                    bvh.interiors.len()
                );
            }
        }
        _ => bail!(
            "Unrecognized table file {:?} (expected {}, {} or {})",
            path,
            MESHES_FILE,
            OBJECTS_FILE,
            COLLISION_FILE
        ),
    }

    Ok(())
}
