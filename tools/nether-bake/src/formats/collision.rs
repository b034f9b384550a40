//! Collision tables (collision.bin)
//!
//! # Layout
//! ```text
//! u32 vertex_table_count, u32 bvh_count, u32 collider_count
//! vertex tables: u32 vertex_count, then vertex_count * (x, y, z) f32
//! bvh tables:
//!   u32 leaf_count, u32 interior_count, i32 root
//!   leaves:    min xyz f32, max xyz f32, i16 corner indices (3 per triangle), i16 -1
//!   interiors: min xyz f32, max xyz f32, i32 left, i32 right
//! colliders: u32 vertex_table, u32 bvh
//! ```
//!
//! Node refs: `>= 0` is an interior index, `< 0` is leaf `-(ref + 1)`. The root
//! is leaf 0 when there are no interiors, otherwise the last interior.
//!
//! Identical vertex tables and BVH tables are written once; colliders refer to
//! them by first-seen id.

use anyhow::{bail, Context, Result};
use hashbrown::HashMap;
use std::io::Write;

use super::{write_count, write_vec3, ByteReader};
use crate::collision::{CollisionMesh, NodeRef};

/// Closes each leaf's corner list
pub const LEAF_TERMINATOR: i16 = -1;

/// Corner indices are stored as i16, so the highest usable index is `i16::MAX`
pub const MAX_COLLISION_VERTICES: usize = i16::MAX as usize + 1;

pub fn encode_node_ref(node: NodeRef) -> i32 {
    match node {
        NodeRef::Interior(i) => i as i32,
        NodeRef::Leaf(i) => -(i as i32) - 1,
    }
}

pub fn decode_node_ref(raw: i32) -> NodeRef {
    if raw >= 0 {
        NodeRef::Interior(raw as u32)
    } else {
        NodeRef::Leaf((-(raw + 1)) as u32)
    }
}

fn encode_vertex_table(vertices: &[[f32; 3]]) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(4 + vertices.len() * 12);
    write_count(&mut buf, vertices.len(), "collision vertices")?;
    for &v in vertices {
        write_vec3(&mut buf, v)?;
    }
    Ok(buf)
}

fn encode_bvh_table(mesh: &CollisionMesh) -> Result<Vec<u8>> {
    if mesh.vertices.len() > MAX_COLLISION_VERTICES {
        bail!(
            "Collision mesh has {} vertices, but i16 corner indices allow at most {}",
            mesh.vertices.len(),
            MAX_COLLISION_VERTICES
        );
    }

    let bvh = &mesh.bvh;
    let mut buf = Vec::new();
    write_count(&mut buf, bvh.leaves().len(), "BVH leaves")?;
    write_count(&mut buf, bvh.interiors().len(), "BVH interiors")?;
    buf.write_all(&encode_node_ref(bvh.root()).to_le_bytes())?;

    for leaf in bvh.leaves() {
        write_vec3(&mut buf, leaf.bounds.min.to_array())?;
        write_vec3(&mut buf, leaf.bounds.max.to_array())?;
        for &t in &leaf.triangles {
            let triangle = mesh
                .triangles
                .get(t as usize)
                .with_context(|| format!("BVH leaf references missing triangle {}", t))?;
            for &corner in triangle {
                // Range checked against MAX_COLLISION_VERTICES above
                buf.write_all(&(corner as i16).to_le_bytes())?;
            }
        }
        buf.write_all(&LEAF_TERMINATOR.to_le_bytes())?;
    }

    for interior in bvh.interiors() {
        write_vec3(&mut buf, interior.bounds.min.to_array())?;
        write_vec3(&mut buf, interior.bounds.max.to_array())?;
        buf.write_all(&encode_node_ref(interior.left).to_le_bytes())?;
        buf.write_all(&encode_node_ref(interior.right).to_le_bytes())?;
    }

    Ok(buf)
}

/// Content-addressed set of serialized tables, ids in first-seen order
#[derive(Debug, Default)]
struct TablePool {
    lookup: HashMap<Vec<u8>, u32>,
    tables: Vec<Vec<u8>>,
}

impl TablePool {
    fn intern(&mut self, table: Vec<u8>) -> u32 {
        if let Some(&id) = self.lookup.get(&table) {
            return id;
        }
        let id = self.tables.len() as u32;
        self.lookup.insert(table.clone(), id);
        self.tables.push(table);
        id
    }
}

/// Accumulates colliders for one collision.bin
#[derive(Debug, Default)]
pub struct CollisionTables {
    vertex_tables: TablePool,
    bvh_tables: TablePool,
    colliders: Vec<ColliderRecord>,
}

impl CollisionTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize and intern a baked collider, returning its collider index
    pub fn add(&mut self, mesh: &CollisionMesh) -> Result<usize> {
        let vertex_table = self.vertex_tables.intern(encode_vertex_table(&mesh.vertices)?);
        let bvh = self.bvh_tables.intern(encode_bvh_table(mesh)?);
        self.colliders.push(ColliderRecord { vertex_table, bvh });
        Ok(self.colliders.len() - 1)
    }

    pub fn collider_count(&self) -> usize {
        self.colliders.len()
    }

    pub fn vertex_table_count(&self) -> usize {
        self.vertex_tables.tables.len()
    }

    pub fn bvh_count(&self) -> usize {
        self.bvh_tables.tables.len()
    }

    pub fn write<W: Write>(&self, w: &mut W) -> Result<()> {
        write_count(w, self.vertex_tables.tables.len(), "vertex tables")?;
        write_count(w, self.bvh_tables.tables.len(), "BVH tables")?;
        write_count(w, self.colliders.len(), "colliders")?;
        for table in &self.vertex_tables.tables {
            w.write_all(table)?;
        }
        for table in &self.bvh_tables.tables {
            w.write_all(table)?;
        }
        for collider in &self.colliders {
            w.write_all(&collider.vertex_table.to_le_bytes())?;
            w.write_all(&collider.bvh.to_le_bytes())?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColliderRecord {
    pub vertex_table: u32,
    pub bvh: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeafRecord {
    pub min: [f32; 3],
    pub max: [f32; 3],
    /// Corner indices, three per triangle, terminator stripped
    pub corners: Vec<i16>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InteriorRecord {
    pub min: [f32; 3],
    pub max: [f32; 3],
    pub left: NodeRef,
    pub right: NodeRef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BvhTable {
    pub root: NodeRef,
    pub leaves: Vec<LeafRecord>,
    pub interiors: Vec<InteriorRecord>,
}

/// Parsed collision.bin
#[derive(Debug, Clone, PartialEq)]
pub struct CollisionFile {
    pub vertex_tables: Vec<Vec<[f32; 3]>>,
    pub bvhs: Vec<BvhTable>,
    pub colliders: Vec<ColliderRecord>,
}

fn read_bvh_table(r: &mut ByteReader) -> Result<BvhTable> {
    // Leaf record: 24 bytes of bounds + terminator
    let leaf_count = r.count(26)?;
    let interior_count = r.u32()? as usize;
    let root = decode_node_ref(r.i32()?);

    let mut leaves = Vec::with_capacity(leaf_count);
    for _ in 0..leaf_count {
        let min = r.vec3()?;
        let max = r.vec3()?;
        let mut corners = Vec::new();
        loop {
            let corner = r.i16()?;
            if corner == LEAF_TERMINATOR {
                break;
            }
            if corner < 0 {
                bail!("BVH leaf has negative corner index {}", corner);
            }
            corners.push(corner);
        }
        if corners.len() % 3 != 0 {
            bail!("BVH leaf has {} corner indices (not whole triangles)", corners.len());
        }
        leaves.push(LeafRecord { min, max, corners });
    }

    let mut interiors = Vec::new();
    for index in 0..interior_count {
        let min = r.vec3()?;
        let max = r.vec3()?;
        let left = decode_node_ref(r.i32()?);
        let right = decode_node_ref(r.i32()?);
        for child in [left, right] {
            // Children are always written before their parent
            let valid = match child {
                NodeRef::Leaf(i) => (i as usize) < leaf_count,
                NodeRef::Interior(i) => (i as usize) < index,
            };
            if !valid {
                bail!("BVH interior {} has dangling child {:?}", index, child);
            }
        }
        interiors.push(InteriorRecord {
            min,
            max,
            left,
            right,
        });
    }

    let expected_root = match interior_count {
        0 => NodeRef::Leaf(0),
        n => NodeRef::Interior(n as u32 - 1),
    };
    if root != expected_root {
        bail!("BVH root {:?} is not {:?}", root, expected_root);
    }

    Ok(BvhTable {
        root,
        leaves,
        interiors,
    })
}

/// Parse a complete collision.bin
pub fn read_collision_file(data: &[u8]) -> Result<CollisionFile> {
    let mut r = ByteReader::new(data);
    let vertex_table_count = r.count(4)?;
    let bvh_count = r.count(12)?;
    let collider_count = r.count(8)?;

    let mut vertex_tables = Vec::with_capacity(vertex_table_count);
    for _ in 0..vertex_table_count {
        let count = r.count(12)?;
        let vertices = (0..count).map(|_| r.vec3()).collect::<Result<Vec<_>>>()?;
        vertex_tables.push(vertices);
    }

    let bvhs = (0..bvh_count)
        .map(|i| read_bvh_table(&mut r).with_context(|| format!("Failed to read BVH {}", i)))
        .collect::<Result<Vec<_>>>()?;

    let mut colliders = Vec::with_capacity(collider_count);
    for _ in 0..collider_count {
        let collider = ColliderRecord {
            vertex_table: r.u32()?,
            bvh: r.u32()?,
        };
        if collider.vertex_table as usize >= vertex_table_count || collider.bvh as usize >= bvh_count {
            bail!("Collider references missing table: {:?}", collider);
        }
        let vertex_count = vertex_tables[collider.vertex_table as usize].len();
        let highest = bvhs[collider.bvh as usize]
            .leaves
            .iter()
            .flat_map(|leaf| leaf.corners.iter())
            .max();
        if let Some(&corner) = highest {
            if corner as usize >= vertex_count {
                bail!(
                    "Collider {:?} uses corner {} but its vertex table has {} vertices",
                    collider,
                    corner,
                    vertex_count
                );
            }
        }
        colliders.push(collider);
    }
    r.finish()?;

    Ok(CollisionFile {
        vertex_tables,
        bvhs,
        colliders,
    })
}
