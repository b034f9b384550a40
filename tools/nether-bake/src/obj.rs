//! Wavefront OBJ loading
//!
//! Each `usemtl` opens (or reopens) a submesh named after the material, so a
//! mesh comes back with one triangle list per material slot. Face corners with
//! the same `v/vt/vn` triple collapse to a single vertex, which keeps vertices
//! shared across submeshes the way the editor stores them.
//!
//! Vertex colors use the common `v x y z r g b` extension (components 0..1).

use anyhow::{bail, Context, Result};
use hashbrown::HashMap;
use std::path::Path;

use crate::mesh::SourceMesh;

/// Submesh name for faces that precede any `usemtl`
pub const DEFAULT_SUBMESH: &str = "";

/// Parsed OBJ mesh with its submesh material names
#[derive(Debug, Clone, PartialEq)]
pub struct ObjMesh {
    pub mesh: SourceMesh,
    /// Material name per submesh, in first-use order
    pub materials: Vec<String>,
}

/// Parsed corner: (position, texcoord, normal), all 0-based
type Corner = (usize, Option<usize>, Option<usize>);

/// Load an OBJ file from disk
pub fn load_obj(path: &Path) -> Result<ObjMesh> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to open OBJ: {:?}", path))?;
    parse_obj(&source).with_context(|| format!("Failed to parse OBJ: {:?}", path))
}

/// Parse OBJ source text
pub fn parse_obj(source: &str) -> Result<ObjMesh> {
    let mut positions: Vec<[f32; 3]> = Vec::new();
    let mut colors: Vec<Option<[f32; 3]>> = Vec::new();
    let mut tex_coords: Vec<[f32; 2]> = Vec::new();
    let mut normals_raw: Vec<[f32; 3]> = Vec::new();

    let mut corners: Vec<Corner> = Vec::new();
    let mut corner_lookup: HashMap<Corner, u32> = HashMap::new();

    let mut submesh_lookup: HashMap<String, usize> = HashMap::new();
    let mut materials: Vec<String> = Vec::new();
    let mut submeshes: Vec<Vec<u32>> = Vec::new();
    let mut current: Option<usize> = None;

    for (line_num, line) in source.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        let line_num = line_num + 1;

        match parts[0] {
            "v" if parts.len() >= 4 => {
                positions.push(parse_floats(&parts[1..4], line_num)?);
                colors.push(if parts.len() >= 7 {
                    Some(parse_floats(&parts[4..7], line_num)?)
                } else {
                    None
                });
            }
            "vt" if parts.len() >= 3 => {
                tex_coords.push(parse_floats(&parts[1..3], line_num)?);
            }
            "vn" if parts.len() >= 4 => {
                normals_raw.push(parse_floats(&parts[1..4], line_num)?);
            }
            "usemtl" => {
                let name = parts.get(1).copied().unwrap_or(DEFAULT_SUBMESH);
                current = Some(open_submesh(
                    name,
                    &mut submesh_lookup,
                    &mut materials,
                    &mut submeshes,
                ));
            }
            "f" if parts.len() >= 4 => {
                let face: Vec<Corner> = parts[1..]
                    .iter()
                    .map(|v| {
                        parse_obj_vertex(v)
                            .with_context(|| format!("Bad face vertex {:?} on line {}", v, line_num))
                    })
                    .collect::<Result<_>>()?;

                let submesh = match current {
                    Some(s) => s,
                    None => {
                        let s = open_submesh(
                            DEFAULT_SUBMESH,
                            &mut submesh_lookup,
                            &mut materials,
                            &mut submeshes,
                        );
                        current = Some(s);
                        s
                    }
                };

                // Fan triangulation for convex polygons
                for i in 1..face.len() - 1 {
                    for corner in [face[0], face[i], face[i + 1]] {
                        let index = *corner_lookup.entry(corner).or_insert_with(|| {
                            corners.push(corner);
                            (corners.len() - 1) as u32
                        });
                        submeshes[submesh].push(index);
                    }
                }
            }
            _ => {}
        }
    }

    if corners.is_empty() {
        bail!("No faces found in OBJ file");
    }

    let mut mesh_positions = Vec::with_capacity(corners.len());
    for &(vi, _, _) in &corners {
        let p = positions
            .get(vi)
            .with_context(|| format!("Face references missing position {}", vi + 1))?;
        mesh_positions.push(*p);
    }

    let uvs = gather_attribute(&corners, |c| c.1, &tex_coords, "texture coordinate")?;
    let normals = gather_attribute(&corners, |c| c.2, &normals_raw, "normal")?;

    // Colors only when every referenced position carries one
    let mesh_colors: Option<Vec<[u8; 4]>> = corners
        .iter()
        .map(|&(vi, _, _)| colors.get(vi).copied().flatten().map(pack_color))
        .collect();

    let mesh = SourceMesh {
        positions: mesh_positions,
        uvs,
        colors: mesh_colors,
        normals,
        submeshes,
    };

    Ok(ObjMesh { mesh, materials })
}

fn open_submesh(
    name: &str,
    lookup: &mut HashMap<String, usize>,
    materials: &mut Vec<String>,
    submeshes: &mut Vec<Vec<u32>>,
) -> usize {
    *lookup.entry(name.to_string()).or_insert_with(|| {
        materials.push(name.to_string());
        submeshes.push(Vec::new());
        submeshes.len() - 1
    })
}

/// Resolve an optional per-corner attribute; all-or-nothing across the mesh
fn gather_attribute<T: Copy>(
    corners: &[Corner],
    select: impl Fn(&Corner) -> Option<usize>,
    values: &[T],
    what: &str,
) -> Result<Option<Vec<T>>> {
    let present = corners.iter().filter(|c| select(c).is_some()).count();
    if present == 0 {
        return Ok(None);
    }
    if present != corners.len() {
        tracing::warn!(
            "OBJ has a {} on only {} of {} corners, ignoring the stream",
            what,
            present,
            corners.len()
        );
        return Ok(None);
    }

    corners
        .iter()
        .map(|c| {
            let i = select(c).unwrap_or_default();
            values
                .get(i)
                .copied()
                .with_context(|| format!("Face references missing {} {}", what, i + 1))
        })
        .collect::<Result<Vec<_>>>()
        .map(Some)
}

fn pack_color(c: [f32; 3]) -> [u8; 4] {
    let unorm = |f: f32| (f.clamp(0.0, 1.0) * 255.0).round() as u8;
    [unorm(c[0]), unorm(c[1]), unorm(c[2]), 255]
}

fn parse_floats<const N: usize>(parts: &[&str], line_num: usize) -> Result<[f32; N]> {
    let mut out = [0.0f32; N];
    for (slot, part) in out.iter_mut().zip(parts) {
        *slot = part
            .parse()
            .with_context(|| format!("Bad number {:?} on line {}", part, line_num))?;
    }
    Ok(out)
}

/// Parse OBJ vertex reference: "v", "v/vt", "v/vt/vn", or "v//vn"
fn parse_obj_vertex(s: &str) -> Option<Corner> {
    let parts: Vec<&str> = s.split('/').collect();

    let vi = parts.first()?.parse::<usize>().ok()?.checked_sub(1)?; // OBJ indices are 1-based

    let vti = parts
        .get(1)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<usize>().ok())
        .and_then(|i| i.checked_sub(1));

    let vni = parts
        .get(2)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<usize>().ok())
        .and_then(|i| i.checked_sub(1));

    Some((vi, vti, vni))
}
