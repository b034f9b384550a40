//! Vertex replication across UV-transform groups
//!
//! The target runtime has a single UV channel and no per-material texture
//! matrix, so every submesh's UV transform is baked into its vertices. Submeshes
//! sharing a transform share vertices; a vertex used under two different
//! transforms is emitted once per transform.
//!
//! Output order is fully determined by first occurrence: groups in the order
//! their transform is first seen, vertices within a group in the order their
//! index is first seen. Hash maps are lookups only, never iterated.

use hashbrown::HashMap;

use super::types::{EncodedMesh, ReplicationError, SourceMesh, UvTransform, MAX_VERTEX_COUNT};
use crate::geometry::UvTransformKey;

/// Submeshes sharing one bit-identical UV transform
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicationGroup {
    pub transform: UvTransform,
    /// Submesh indices, ascending
    pub submeshes: Vec<usize>,
}

/// Partition submeshes by transform, groups in discovery order
pub fn group_by_transform(transforms: &[UvTransform]) -> Vec<ReplicationGroup> {
    let mut lookup: HashMap<UvTransformKey, usize> = HashMap::new();
    let mut groups: Vec<ReplicationGroup> = Vec::new();

    for (submesh, transform) in transforms.iter().enumerate() {
        let group = *lookup.entry(transform.key()).or_insert_with(|| {
            groups.push(ReplicationGroup {
                transform: *transform,
                submeshes: Vec::new(),
            });
            groups.len() - 1
        });
        groups[group].submeshes.push(submesh);
    }

    groups
}

/// Encode a mesh with one UV transform per submesh
///
/// Pure and deterministic: identical inputs produce identical buffers.
pub fn encode(mesh: &SourceMesh, transforms: &[UvTransform]) -> Result<EncodedMesh, ReplicationError> {
    if mesh.submeshes.len() != transforms.len() {
        return Err(ReplicationError::CountMismatch {
            submeshes: mesh.submeshes.len(),
            materials: transforms.len(),
        });
    }
    if mesh.submeshes.is_empty() {
        return Err(ReplicationError::EmptySubmeshes);
    }
    mesh.validate()?;

    let groups = group_by_transform(transforms);

    // Per submesh: source vertex -> output slot
    let mut remap: Vec<HashMap<u32, u32>> = vec![HashMap::new(); mesh.submeshes.len()];
    let mut out = EncodedMesh::default();
    let mut replica_base: usize = 0;

    for (group_num, group) in groups.iter().enumerate() {
        let lump = collect_lump(mesh, group, replica_base, &mut remap)?;
        if lump.is_empty() {
            return Err(ReplicationError::EmptyLump { group: group_num });
        }
        replica_base += lump.len();

        append_lump(mesh, &group.transform, &lump, &mut out);

        tracing::debug!(
            "Replication group {}: {} submeshes, {} vertices (valid={}, scale={:?}, offset={:?})",
            group_num,
            group.submeshes.len(),
            lump.len(),
            group.transform.valid,
            group.transform.scale,
            group.transform.offset
        );
    }

    if replica_base > MAX_VERTEX_COUNT {
        return Err(ReplicationError::IndexOverflow {
            limit: MAX_VERTEX_COUNT,
            actual: replica_base,
        });
    }

    out.submesh_indices = mesh
        .submeshes
        .iter()
        .enumerate()
        .map(|(submesh, indices)| rewrite_indices(mesh, &out, submesh, indices, &remap[submesh]))
        .collect::<Result<_, _>>()?;

    tracing::debug!(
        "Encoded mesh: {} source vertices -> {} output vertices ({} groups)",
        mesh.vertex_count(),
        out.vertex_count(),
        groups.len()
    );

    Ok(out)
}

/// Gather the distinct source vertices of one group, recording output slots
fn collect_lump(
    mesh: &SourceMesh,
    group: &ReplicationGroup,
    replica_base: usize,
    remap: &mut [HashMap<u32, u32>],
) -> Result<Vec<u32>, ReplicationError> {
    let mut lump_slots: HashMap<u32, u32> = HashMap::new();
    let mut lump: Vec<u32> = Vec::new();

    for &submesh in &group.submeshes {
        for &index in &mesh.submeshes[submesh] {
            let lump_slot = *lump_slots.entry(index).or_insert_with(|| {
                lump.push(index);
                (lump.len() - 1) as u32
            });
            // Saturates only past u32::MAX, long after the u16 overflow check fires
            let slot = u32::try_from(replica_base)
                .unwrap_or(u32::MAX)
                .saturating_add(lump_slot);

            let existing = *remap[submesh].entry(index).or_insert(slot);
            if existing != slot {
                return Err(ReplicationError::VertexSlotConflict {
                    submesh,
                    vertex: index,
                    existing,
                    attempted: slot,
                });
            }
        }
    }

    Ok(lump)
}

/// Append one lump's vertices to the output streams
fn append_lump(mesh: &SourceMesh, transform: &UvTransform, lump: &[u32], out: &mut EncodedMesh) {
    out.positions
        .extend(lump.iter().map(|&i| mesh.positions[i as usize]));

    if let Some(uvs) = &mesh.uvs {
        out.uvs
            .extend(lump.iter().map(|&i| transform.apply(uvs[i as usize])));
    }
    if let Some(colors) = &mesh.colors {
        out.colors.extend(lump.iter().map(|&i| colors[i as usize]));
    }
    if let Some(normals) = &mesh.normals {
        out.normals.extend(lump.iter().map(|&i| normals[i as usize]));
    }
}

/// Rewrite a submesh's indices to output slots, verifying each vertex
fn rewrite_indices(
    mesh: &SourceMesh,
    out: &EncodedMesh,
    submesh: usize,
    indices: &[u32],
    remap: &HashMap<u32, u32>,
) -> Result<Vec<u16>, ReplicationError> {
    indices
        .iter()
        .map(|&index| {
            let slot = *remap
                .get(&index)
                .ok_or(ReplicationError::UnmappedVertex {
                    submesh,
                    vertex: index,
                })?;

            let source = mesh.positions[index as usize].map(f32::to_bits);
            let emitted = out.positions.get(slot as usize).map(|p| p.map(f32::to_bits));
            if emitted != Some(source) {
                return Err(ReplicationError::VertexMismatch {
                    vertex: index,
                    slot,
                });
            }

            u16::try_from(slot).map_err(|_| ReplicationError::IndexOverflow {
                limit: MAX_VERTEX_COUNT,
                actual: out.vertex_count(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::ErrorClass;

    /// Unit quad: 4 vertices, triangles (0,1,2) and (0,2,3), one per submesh
    fn quad() -> SourceMesh {
        SourceMesh {
            positions: vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 1.0, 0.0],
                [0.0, 1.0, 0.0],
            ],
            uvs: Some(vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]),
            colors: None,
            normals: None,
            submeshes: vec![vec![0, 1, 2], vec![0, 2, 3]],
        }
    }

    /// Check the per-index replication contract for every submesh
    fn assert_replicated(mesh: &SourceMesh, transforms: &[UvTransform], out: &EncodedMesh) {
        let uvs = mesh.uvs.as_ref().unwrap();
        for (submesh, indices) in out.submesh_indices.iter().enumerate() {
            let source = &mesh.submeshes[submesh];
            assert_eq!(indices.len(), source.len());
            for (&slot, &index) in indices.iter().zip(source) {
                let slot = slot as usize;
                let index = index as usize;
                assert_eq!(out.positions[slot], mesh.positions[index]);
                assert_eq!(out.uvs[slot], transforms[submesh].apply(uvs[index]));
            }
        }
    }

    #[test]
    fn test_shared_transform_no_replication() {
        let mesh = quad();
        let transforms = [UvTransform::IDENTITY, UvTransform::IDENTITY];

        let out = encode(&mesh, &transforms).unwrap();

        assert_eq!(out.vertex_count(), 4);
        assert_eq!(out.uvs.len(), 4);
        assert_eq!(out.submesh_indices, vec![vec![0, 1, 2], vec![0, 2, 3]]);
        assert_replicated(&mesh, &transforms, &out);
    }

    #[test]
    fn test_differing_transforms_replicate_shared_vertices() {
        let mesh = quad();
        let transforms = [
            UvTransform::new([2.0, 2.0], [0.0, 0.0]),
            UvTransform::new([1.0, 1.0], [0.0, 0.0]),
        ];

        let out = encode(&mesh, &transforms).unwrap();

        // Vertices 0 and 2 are shared and get a second copy
        assert_eq!(out.vertex_count(), 6);
        assert_eq!(out.submesh_indices.len(), 2);
        assert_eq!(out.submesh_indices[0], vec![0, 1, 2]);
        assert_eq!(out.submesh_indices[1], vec![3, 4, 5]);
        assert_eq!(out.uvs[1], [2.0, 0.0]);
        assert_eq!(out.uvs[4], [1.0, 1.0]);
        assert_replicated(&mesh, &transforms, &out);
    }

    #[test]
    fn test_groups_follow_discovery_order() {
        let a = UvTransform::new([1.0, 1.0], [0.5, 0.0]);
        let b = UvTransform::IDENTITY;
        let groups = group_by_transform(&[a, b, a, UvTransform::INVALID, b]);

        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].transform, a);
        assert_eq!(groups[0].submeshes, vec![0, 2]);
        assert_eq!(groups[1].submeshes, vec![1, 4]);
        assert!(!groups[2].transform.valid);
        assert_eq!(groups[2].submeshes, vec![3]);
    }

    #[test]
    fn test_invalid_sentinel_is_its_own_group() {
        let mesh = quad();
        let transforms = [UvTransform::IDENTITY, UvTransform::INVALID];

        let out = encode(&mesh, &transforms).unwrap();

        assert_eq!(out.vertex_count(), 6);
        // Materialless submesh UVs collapse to zero
        for &slot in &out.submesh_indices[1] {
            assert_eq!(out.uvs[slot as usize], [0.0, 0.0]);
        }
    }

    #[test]
    fn test_non_adjacent_groups_share_slots() {
        let mut mesh = quad();
        mesh.submeshes = vec![vec![0, 1, 2], vec![0, 2, 3], vec![0, 1, 3]];
        let a = UvTransform::IDENTITY;
        let b = UvTransform::new([0.5, 0.5], [0.0, 0.0]);
        let transforms = [a, b, a];

        let out = encode(&mesh, &transforms).unwrap();

        // Group a = {0, 2}: vertices 0,1,2,3 -> 4 slots; group b = {1}: 0,2,3 -> 3 slots
        assert_eq!(out.vertex_count(), 7);
        assert_eq!(out.submesh_indices[0], vec![0, 1, 2]);
        assert_eq!(out.submesh_indices[2], vec![0, 1, 3]);
        assert_eq!(out.submesh_indices[1], vec![4, 5, 6]);
        assert_replicated(&mesh, &transforms, &out);
    }

    #[test]
    fn test_colors_and_normals_copied_verbatim() {
        let mut mesh = quad();
        mesh.colors = Some(vec![[255, 0, 0, 255], [0, 255, 0, 255], [0, 0, 255, 255], [9, 9, 9, 9]]);
        mesh.normals = Some(vec![[0.0, 0.0, 1.0]; 4]);
        let transforms = [UvTransform::IDENTITY, UvTransform::new([3.0, 3.0], [0.0, 0.0])];

        let out = encode(&mesh, &transforms).unwrap();

        assert_eq!(out.colors.len(), out.vertex_count());
        assert_eq!(out.normals.len(), out.vertex_count());
        let colors = mesh.colors.as_ref().unwrap();
        for (submesh, indices) in out.submesh_indices.iter().enumerate() {
            for (&slot, &index) in indices.iter().zip(&mesh.submeshes[submesh]) {
                assert_eq!(out.colors[slot as usize], colors[index as usize]);
            }
        }
    }

    #[test]
    fn test_missing_uvs_emit_no_uv_stream() {
        let mut mesh = quad();
        mesh.uvs = None;
        let out = encode(&mesh, &[UvTransform::IDENTITY, UvTransform::INVALID]).unwrap();
        assert_eq!(out.vertex_count(), 6);
        assert!(out.uvs.is_empty());
    }

    #[test]
    fn test_encode_is_deterministic() {
        let mesh = quad();
        let transforms = [UvTransform::new([2.0, 1.0], [0.1, 0.2]), UvTransform::IDENTITY];
        let a = encode(&mesh, &transforms).unwrap();
        let b = encode(&mesh, &transforms).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_count_mismatch() {
        let err = encode(&quad(), &[UvTransform::IDENTITY]).unwrap_err();
        assert_eq!(
            err,
            ReplicationError::CountMismatch {
                submeshes: 2,
                materials: 1
            }
        );
        assert_eq!(err.class(), ErrorClass::Validation);
    }

    #[test]
    fn test_empty_submeshes() {
        let mut mesh = quad();
        mesh.submeshes.clear();
        assert_eq!(encode(&mesh, &[]), Err(ReplicationError::EmptySubmeshes));
    }

    #[test]
    fn test_empty_lump() {
        let mut mesh = quad();
        mesh.submeshes[1].clear();
        let err = encode(&mesh, &[UvTransform::IDENTITY, UvTransform::INVALID]).unwrap_err();
        assert_eq!(err, ReplicationError::EmptyLump { group: 1 });
    }

    #[test]
    fn test_overflow_reports_limit_and_actual() {
        let count = 30_000u32;
        let mesh = SourceMesh {
            positions: (0..count).map(|i| [i as f32, 0.0, 0.0]).collect(),
            uvs: Some(vec![[0.0, 0.0]; count as usize]),
            colors: None,
            normals: None,
            submeshes: vec![(0..count).collect(); 3],
        };
        let transforms = [
            UvTransform::IDENTITY,
            UvTransform::new([2.0, 2.0], [0.0, 0.0]),
            UvTransform::new([3.0, 3.0], [0.0, 0.0]),
        ];

        let err = encode(&mesh, &transforms).unwrap_err();

        assert_eq!(
            err,
            ReplicationError::IndexOverflow {
                limit: 65535,
                actual: 90_000
            }
        );
        assert_eq!(err.class(), ErrorClass::Overflow);

        // The same mesh fits when all submeshes share a transform
        let shared = [UvTransform::IDENTITY; 3];
        assert_eq!(encode(&mesh, &shared).unwrap().vertex_count(), 30_000);
    }

    #[test]
    fn test_overflow_boundary() {
        let count = MAX_VERTEX_COUNT as u32;
        let mesh = SourceMesh {
            positions: (0..count).map(|i| [i as f32, 0.0, 0.0]).collect(),
            uvs: Some(vec![[0.0, 0.0]; count as usize]),
            colors: None,
            normals: None,
            submeshes: vec![(0..count).collect(), vec![0, 0, 0]],
        };

        // Exactly 65535 output vertices still fit
        let shared = [UvTransform::IDENTITY; 2];
        let out = encode(&mesh, &shared).unwrap();
        assert_eq!(out.vertex_count(), 65535);
        assert_eq!(out.submesh_indices[0].last(), Some(&65534));

        // One replicated vertex more overflows
        let split = [UvTransform::IDENTITY, UvTransform::new([2.0, 2.0], [0.0, 0.0])];
        assert_eq!(
            encode(&mesh, &split).unwrap_err(),
            ReplicationError::IndexOverflow {
                limit: 65535,
                actual: 65536
            }
        );
    }

    #[test]
    fn test_out_of_range_index_rejected() {
        let mut mesh = quad();
        mesh.submeshes[0] = vec![0, 1, 7];
        let err = encode(&mesh, &[UvTransform::IDENTITY, UvTransform::IDENTITY]).unwrap_err();
        assert!(matches!(err, ReplicationError::IndexOutOfRange { index: 7, .. }));
    }
}
