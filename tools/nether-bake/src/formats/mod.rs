//! Binary table formats written by the bake pass
//!
//! All values are little-endian. Counts are u32 and precede their records.

mod collision;
mod mesh;

pub use collision::{
    decode_node_ref, encode_node_ref, read_collision_file, BvhTable, ColliderRecord,
    CollisionFile, CollisionTables, InteriorRecord, LeafRecord, MAX_COLLISION_VERTICES,
    LEAF_TERMINATOR,
};
pub use mesh::{
    read_mesh_table, read_object_table, write_encoded_mesh, write_mesh_table, write_object_table,
};

use anyhow::{bail, Context, Result};
use std::io::Write;

/// Write a length prefix, failing if it does not fit in u32
pub(crate) fn write_count<W: Write>(w: &mut W, len: usize, what: &str) -> Result<()> {
    let count = u32::try_from(len).with_context(|| format!("Too many {}: {}", what, len))?;
    w.write_all(&count.to_le_bytes())?;
    Ok(())
}

pub(crate) fn write_vec3<W: Write>(w: &mut W, v: [f32; 3]) -> Result<()> {
    for f in v {
        w.write_all(&f.to_le_bytes())?;
    }
    Ok(())
}

/// Cursor over a byte slice with bounds-checked little-endian reads
pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        let end = self.pos + N;
        if end > self.data.len() {
            bail!(
                "Unexpected end of data at offset {} (need {} bytes, have {})",
                self.pos,
                N,
                self.data.len() - self.pos
            );
        }
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(&self.data[self.pos..end]);
        self.pos = end;
        Ok(bytes)
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.take::<1>()?[0])
    }

    pub fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take()?))
    }

    pub fn i16(&mut self) -> Result<i16> {
        Ok(i16::from_le_bytes(self.take()?))
    }

    pub fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    pub fn i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.take()?))
    }

    pub fn f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.take()?))
    }

    pub fn vec3(&mut self) -> Result<[f32; 3]> {
        Ok([self.f32()?, self.f32()?, self.f32()?])
    }

    /// Read a u32 count, rejecting counts that cannot fit in the remaining data
    pub fn count(&mut self, record_size: usize) -> Result<usize> {
        let count = self.u32()? as usize;
        let remaining = self.data.len() - self.pos;
        if count.saturating_mul(record_size) > remaining {
            bail!(
                "Record count {} at offset {} exceeds remaining {} bytes",
                count,
                self.pos - 4,
                remaining
            );
        }
        Ok(count)
    }

    pub fn finish(self) -> Result<()> {
        if self.pos != self.data.len() {
            bail!(
                "{} trailing bytes after offset {}",
                self.data.len() - self.pos,
                self.pos
            );
        }
        Ok(())
    }
}
