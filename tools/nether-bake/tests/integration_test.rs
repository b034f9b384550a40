//! Integration tests for nether-bake
//!
//! Tests the full pipeline: write OBJ + bake.toml -> bake -> read tables back

use nether_bake::bake::{COLLISION_FILE, MESHES_FILE, OBJECTS_FILE, REPORT_FILE};
use nether_bake::formats::{read_collision_file, read_mesh_table, read_object_table};
use nether_bake::{bake, BakeManifest, BakeReport, ManifestScene, NodeRef};
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::tempdir;

/// Floor quad split across two materials, sharing the diagonal
const FLOOR_OBJ: &str = "\
v 0 0 0
v 4 0 0
v 4 0 4
v 0 0 4
vt 0 0
vt 1 0
vt 1 1
vt 0 1
vn 0 1 0
usemtl stone
f 1/1/1 3/3/1 2/2/1
usemtl moss
f 1/1/1 4/4/1 3/3/1
";

/// Three collinear points, no usable collision triangles
const SLIVER_OBJ: &str = "\
v 0 0 0
v 1 0 0
v 2 0 0
f 1 2 3
";

const MANIFEST: &str = r#"
[output]
dir = "baked"

[[materials]]
id = "stone"
scale = [2.0, 2.0]

[[materials]]
id = "moss"
offset = [0.5, 0.0]

[[meshes]]
id = "floor"
path = "meshes/floor.obj"

[[meshes]]
id = "sliver"
path = "meshes/sliver.obj"

[[objects]]
id = "floor_a"
mesh = "floor"
materials = ["stone", "moss"]

[[objects]]
id = "floor_b"
mesh = "floor"
materials = ["stone", "moss"]

[[objects]]
id = "floor_plain"
mesh = "floor"
materials = ["none", "none"]

[[colliders]]
id = "floor_col"
mesh = "floor"

[[colliders]]
id = "sliver_col"
mesh = "sliver"
"#;

fn write_project(dir: &Path, manifest: &str) {
    fs::create_dir_all(dir.join("meshes")).expect("Failed to create mesh dir");
    fs::write(dir.join("meshes/floor.obj"), FLOOR_OBJ).expect("Failed to write OBJ");
    fs::write(dir.join("meshes/sliver.obj"), SLIVER_OBJ).expect("Failed to write OBJ");
    fs::write(dir.join("bake.toml"), manifest).expect("Failed to write manifest");
}

fn run_bake(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_nether-bake"))
        .args(args)
        .output()
        .expect("Failed to run nether-bake")
}

#[test]
fn test_library_bake() {
    let dir = tempdir().expect("Failed to create temp dir");
    write_project(dir.path(), MANIFEST);

    let manifest = BakeManifest::load(&dir.path().join("bake.toml")).unwrap();
    let scene = ManifestScene::load(&manifest, dir.path()).unwrap();
    let out = dir.path().join("baked");
    let report = bake(&manifest, &scene, &out).unwrap();

    // floor_a and floor_b share an entry; floor_plain gets its own
    let objects = read_object_table(&fs::read(out.join(OBJECTS_FILE)).unwrap()).unwrap();
    assert_eq!(objects, vec![0, 0, 1]);
    assert_eq!(report.cache_hits, 1);

    let meshes = read_mesh_table(&fs::read(out.join(MESHES_FILE)).unwrap()).unwrap();
    assert_eq!(meshes.len(), 2);

    // Two transforms: the diagonal (vertices 1 and 3) is duplicated
    let split = &meshes[0];
    assert_eq!(split.vertex_count(), 6);
    assert_eq!(split.submesh_indices.len(), 2);
    assert_eq!(split.normals.len(), 6);
    for &i in &split.submesh_indices[0] {
        let [u, v] = split.uvs[i as usize];
        assert!([0.0, 2.0].contains(&u) && [0.0, 2.0].contains(&v));
    }
    for &i in &split.submesh_indices[1] {
        let [u, _] = split.uvs[i as usize];
        assert!([0.5, 1.5].contains(&u));
    }

    // Both submeshes without material collapse to one group, UVs zeroed
    let plain = &meshes[1];
    assert_eq!(plain.vertex_count(), 4);
    assert!(plain.uvs.iter().all(|&uv| uv == [0.0, 0.0]));

    let collision = read_collision_file(&fs::read(out.join(COLLISION_FILE)).unwrap()).unwrap();
    assert_eq!(collision.colliders.len(), 1);
    let bvh = &collision.bvhs[0];
    assert_eq!(bvh.root, NodeRef::Leaf(0));
    assert_eq!(bvh.leaves[0].corners.len(), 6);
    assert_eq!(collision.vertex_tables[0].len(), 4);

    assert_eq!(report.excluded_colliders.len(), 1);
    assert_eq!(report.excluded_colliders[0].id, "sliver_col");
}

#[test]
fn test_cli_build() {
    let dir = tempdir().expect("Failed to create temp dir");
    write_project(dir.path(), MANIFEST);
    let manifest = dir.path().join("bake.toml");

    let output = run_bake(&["build", manifest.to_str().unwrap()]);
    assert!(output.status.success(), "nether-bake build failed: {:?}", output);

    // Output dir comes from the manifest, relative to it
    let out = dir.path().join("baked");
    for file in [MESHES_FILE, OBJECTS_FILE, COLLISION_FILE, REPORT_FILE] {
        assert!(out.join(file).exists(), "{} should exist", file);
    }

    let report: BakeReport =
        toml::from_str(&fs::read_to_string(out.join(REPORT_FILE)).unwrap()).unwrap();
    assert_eq!(report.objects, 3);
    assert_eq!(report.colliders.len(), 1);
    assert_eq!(report.colliders[0].leaves, 1);
    assert_eq!(report.colliders[0].depth, 1);
}

#[test]
fn test_cli_output_override() {
    let dir = tempdir().expect("Failed to create temp dir");
    write_project(dir.path(), MANIFEST);
    let manifest = dir.path().join("bake.toml");
    let out = dir.path().join("elsewhere");

    let output = run_bake(&[
        "build",
        manifest.to_str().unwrap(),
        "-o",
        out.to_str().unwrap(),
        "-v",
    ]);
    assert!(output.status.success(), "nether-bake build failed: {:?}", output);
    assert!(out.join(MESHES_FILE).exists());
    assert!(!dir.path().join("baked").exists());
}

#[test]
fn test_cli_failure_writes_nothing() {
    let dir = tempdir().expect("Failed to create temp dir");
    // floor has two submeshes; one material is a count mismatch
    let broken = MANIFEST.replace(
        "materials = [\"none\", \"none\"]",
        "materials = [\"none\"]",
    );
    write_project(dir.path(), &broken);
    let manifest = dir.path().join("bake.toml");

    let output = run_bake(&["build", manifest.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(!dir.path().join("baked").exists());

    let output = run_bake(&["check", manifest.to_str().unwrap()]);
    assert!(!output.status.success());
}

#[test]
fn test_cli_check() {
    let dir = tempdir().expect("Failed to create temp dir");
    write_project(dir.path(), MANIFEST);
    let manifest = dir.path().join("bake.toml");

    let output = run_bake(&["check", manifest.to_str().unwrap()]);
    assert!(output.status.success(), "nether-bake check failed: {:?}", output);
    assert!(!dir.path().join("baked").exists());

    let typo = MANIFEST.replacen("\"moss\"]", "\"mos\"]", 1);
    fs::write(&manifest, typo).unwrap();
    let output = run_bake(&["check", manifest.to_str().unwrap()]);
    assert!(!output.status.success());
}

#[test]
fn test_cli_inspect() {
    let dir = tempdir().expect("Failed to create temp dir");
    write_project(dir.path(), MANIFEST);
    let manifest = dir.path().join("bake.toml");
    assert!(run_bake(&["build", manifest.to_str().unwrap()]).status.success());

    let out = dir.path().join("baked");
    for file in [MESHES_FILE, OBJECTS_FILE, COLLISION_FILE] {
        let output = run_bake(&["inspect", out.join(file).to_str().unwrap()]);
        assert!(output.status.success(), "inspect {} failed: {:?}", file, output);
    }

    let output = run_bake(&["inspect", out.join(REPORT_FILE).to_str().unwrap()]);
    assert!(!output.status.success());
}
