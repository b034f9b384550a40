//! Encoded mesh table (meshes.bin) and object table (objects.bin)
//!
//! # Mesh record layout
//! ```text
//! u32 vertex_count, then vertex_count * (x, y, z) f32
//! u32 uv_count,     then uv_count * (u, v) f32
//! u32 color_count,  then color_count * (a, r, g, b) u8
//! u32 normal_count, then normal_count * (x, y, z) f32
//! u32 submesh_count
//!   per submesh: u32 index_count, then index_count * u16
//! ```
//!
//! A table is a u32 mesh count followed by that many records.

use anyhow::{Context, Result};
use std::io::Write;

use super::{write_count, write_vec3, ByteReader};
use crate::mesh::EncodedMesh;

/// Write one encoded mesh record
pub fn write_encoded_mesh<W: Write>(w: &mut W, mesh: &EncodedMesh) -> Result<()> {
    write_count(w, mesh.positions.len(), "vertices")?;
    for &p in &mesh.positions {
        write_vec3(w, p)?;
    }

    write_count(w, mesh.uvs.len(), "UVs")?;
    for uv in &mesh.uvs {
        w.write_all(&uv[0].to_le_bytes())?;
        w.write_all(&uv[1].to_le_bytes())?;
    }

    write_count(w, mesh.colors.len(), "colors")?;
    for &[r, g, b, a] in &mesh.colors {
        w.write_all(&[a, r, g, b])?;
    }

    write_count(w, mesh.normals.len(), "normals")?;
    for &n in &mesh.normals {
        write_vec3(w, n)?;
    }

    write_count(w, mesh.submesh_indices.len(), "submeshes")?;
    for indices in &mesh.submesh_indices {
        write_count(w, indices.len(), "indices")?;
        for i in indices {
            w.write_all(&i.to_le_bytes())?;
        }
    }

    Ok(())
}

/// Write a complete mesh table
pub fn write_mesh_table<W: Write>(w: &mut W, meshes: &[EncodedMesh]) -> Result<()> {
    write_count(w, meshes.len(), "meshes")?;
    for (i, mesh) in meshes.iter().enumerate() {
        write_encoded_mesh(w, mesh).with_context(|| format!("Failed to write mesh {}", i))?;
    }
    Ok(())
}

fn read_encoded_mesh(r: &mut ByteReader) -> Result<EncodedMesh> {
    let mut mesh = EncodedMesh::default();

    let count = r.count(12)?;
    for _ in 0..count {
        mesh.positions.push(r.vec3()?);
    }

    let count = r.count(8)?;
    for _ in 0..count {
        mesh.uvs.push([r.f32()?, r.f32()?]);
    }

    let count = r.count(4)?;
    for _ in 0..count {
        let [a, red, g, b] = [r.u8()?, r.u8()?, r.u8()?, r.u8()?];
        mesh.colors.push([red, g, b, a]);
    }

    let count = r.count(12)?;
    for _ in 0..count {
        mesh.normals.push(r.vec3()?);
    }

    let submeshes = r.count(4)?;
    for _ in 0..submeshes {
        let count = r.count(2)?;
        let mut indices = Vec::with_capacity(count);
        for _ in 0..count {
            indices.push(r.u16()?);
        }
        mesh.submesh_indices.push(indices);
    }

    Ok(mesh)
}

/// Parse a complete mesh table
pub fn read_mesh_table(data: &[u8]) -> Result<Vec<EncodedMesh>> {
    let mut r = ByteReader::new(data);
    // Smallest record: five zero counts
    let count = r.count(20)?;
    let meshes = (0..count)
        .map(|i| read_encoded_mesh(&mut r).with_context(|| format!("Failed to read mesh {}", i)))
        .collect::<Result<Vec<_>>>()?;
    r.finish()?;
    Ok(meshes)
}

/// Write the object table: one mesh table index per scene object
pub fn write_object_table<W: Write>(w: &mut W, mesh_indices: &[u32]) -> Result<()> {
    write_count(w, mesh_indices.len(), "objects")?;
    for index in mesh_indices {
        w.write_all(&index.to_le_bytes())?;
    }
    Ok(())
}

pub fn read_object_table(data: &[u8]) -> Result<Vec<u32>> {
    let mut r = ByteReader::new(data);
    let count = r.count(4)?;
    let indices = (0..count).map(|_| r.u32()).collect::<Result<Vec<_>>>()?;
    r.finish()?;
    Ok(indices)
}
