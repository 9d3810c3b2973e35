use serde::{Deserialize, Serialize};

/// Chunk edge length in voxels (16x16x16).
pub const CHUNK_SIZE: i32 = 16;

/// Cells per chunk: 16 * 16 * 16 = 4096.
pub const CHUNK_VOLUME: usize = (CHUNK_SIZE * CHUNK_SIZE * CHUNK_SIZE) as usize;

/// World-space voxel position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

/// Chunk-space position. One unit is one whole chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkCoordinate {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

/// Offset of a voxel inside its chunk, each axis in `0..16`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalPosition {
    pub x: usize,
    pub y: usize,
    pub z: usize,
}

impl Vector3 {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

impl ChunkCoordinate {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

/// Compute which chunk a world-space position falls in.
pub fn world_to_chunk(pos: Vector3) -> ChunkCoordinate {
    ChunkCoordinate {
        x: pos.x.div_euclid(CHUNK_SIZE),
        y: pos.y.div_euclid(CHUNK_SIZE),
        z: pos.z.div_euclid(CHUNK_SIZE),
    }
}

/// World-space origin (inclusive minimum corner) of a chunk.
pub fn chunk_to_world(coord: ChunkCoordinate) -> Vector3 {
    Vector3 {
        x: coord.x * CHUNK_SIZE,
        y: coord.y * CHUNK_SIZE,
        z: coord.z * CHUNK_SIZE,
    }
}

/// Offset within the owning chunk. Always non-negative, including for
/// negative world coordinates.
pub fn local_voxel_position(pos: Vector3) -> LocalPosition {
    LocalPosition {
        x: pos.x.rem_euclid(CHUNK_SIZE) as usize,
        y: pos.y.rem_euclid(CHUNK_SIZE) as usize,
        z: pos.z.rem_euclid(CHUNK_SIZE) as usize,
    }
}

/// Recombine a chunk coordinate and a local offset into a world position.
pub fn local_to_world(coord: ChunkCoordinate, local: LocalPosition) -> Vector3 {
    let origin = chunk_to_world(coord);
    Vector3 {
        x: origin.x + local.x as i32,
        y: origin.y + local.y as i32,
        z: origin.z + local.z as i32,
    }
}

/// Index into a chunk's voxel array for a local offset (x fastest, then y, then z).
pub fn voxel_index(local: LocalPosition) -> usize {
    let size = CHUNK_SIZE as usize;
    local.x + local.y * size + local.z * size * size
}

/// Inverse of [`voxel_index`]. Returns `None` for indices outside the chunk.
pub fn local_from_index(index: usize) -> Option<LocalPosition> {
    if index >= CHUNK_VOLUME {
        return None;
    }
    let size = CHUNK_SIZE as usize;
    Some(LocalPosition {
        x: index % size,
        y: (index / size) % size,
        z: index / (size * size),
    })
}

/// Deterministic chunk id, e.g. `chunk_-1_0_3`.
pub fn chunk_id(coord: ChunkCoordinate) -> String {
    format!("chunk_{}_{}_{}", coord.x, coord.y, coord.z)
}

/// Parse a chunk id produced by [`chunk_id`]. Malformed input yields `None`.
pub fn parse_chunk_id(id: &str) -> Option<ChunkCoordinate> {
    let rest = id.strip_prefix("chunk_")?;
    let mut parts = rest.split('_');
    let x = parts.next()?.parse().ok()?;
    let y = parts.next()?.parse().ok()?;
    let z = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(ChunkCoordinate { x, y, z })
}

/// The 26 chunks sharing a face, edge or corner with `coord`.
pub fn neighbors(coord: ChunkCoordinate) -> Vec<ChunkCoordinate> {
    let mut out = Vec::with_capacity(26);
    for dz in -1..=1 {
        for dy in -1..=1 {
            for dx in -1..=1 {
                if dx == 0 && dy == 0 && dz == 0 {
                    continue;
                }
                out.push(ChunkCoordinate {
                    x: coord.x + dx,
                    y: coord.y + dy,
                    z: coord.z + dz,
                });
            }
        }
    }
    out
}

/// Euclidean distance between two chunk coordinates.
pub fn distance(a: ChunkCoordinate, b: ChunkCoordinate) -> f64 {
    let dx = f64::from(a.x - b.x);
    let dy = f64::from(a.y - b.y);
    let dz = f64::from(a.z - b.z);
    (dx * dx + dy * dy + dz * dz).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_positions_map_to_lower_chunk() {
        let pos = Vector3::new(-1, -16, -17);
        assert_eq!(world_to_chunk(pos), ChunkCoordinate::new(-1, -1, -2));
        let local = local_voxel_position(pos);
        assert_eq!((local.x, local.y, local.z), (15, 0, 15));
        assert_eq!(local_to_world(world_to_chunk(pos), local), pos);
    }

    #[test]
    fn index_inverse_covers_chunk() {
        for index in [0, 1, 16, 255, 256, 4095] {
            let local = local_from_index(index).unwrap();
            assert_eq!(voxel_index(local), index);
        }
        assert!(local_from_index(CHUNK_VOLUME).is_none());
    }

    #[test]
    fn chunk_id_parses_back() {
        let coord = ChunkCoordinate::new(-3, 0, 12);
        assert_eq!(chunk_id(coord), "chunk_-3_0_12");
        assert_eq!(parse_chunk_id(&chunk_id(coord)), Some(coord));
    }

    #[test]
    fn malformed_chunk_ids_are_rejected() {
        for bad in ["", "chunk_", "chunk_1_2", "chunk_1_2_3_4", "chunk_a_b_c", "block_1_2_3"] {
            assert_eq!(parse_chunk_id(bad), None, "{bad}");
        }
    }

    #[test]
    fn neighbors_exclude_self() {
        let center = ChunkCoordinate::new(4, -2, 7);
        let around = neighbors(center);
        assert_eq!(around.len(), 26);
        assert!(!around.contains(&center));
        assert!(around.iter().all(|c| distance(*c, center) <= 3f64.sqrt() + 1e-9));
    }
}
