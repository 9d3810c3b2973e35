use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::codec::{self, PayloadError, VoxelPayload};
use crate::coords::{
    chunk_id, local_voxel_position, parse_chunk_id, voxel_index, world_to_chunk, ChunkCoordinate,
    LocalPosition, Vector3, CHUNK_VOLUME,
};

/// Block id reserved for empty space.
pub const AIR: u8 = 0;

/// Opaque entity record attached to a chunk. The sync core carries these
/// through storage and the wire without interpreting them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: String,
    pub kind: String,
    pub position: Vector3,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// One 16x16x16 block of voxels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireChunk", try_from = "WireChunk")]
pub struct WorldChunk {
    pub chunk_id: String,
    pub position: ChunkCoordinate,
    pub voxel_data: Box<[u8; CHUNK_VOLUME]>,
    pub entities: Vec<Entity>,
    pub last_modified: u64,
    pub is_loaded: bool,
    pub is_dirty: bool,
}

/// Serialized shape of a [`WorldChunk`]: voxels travel as a tagged payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireChunk {
    chunk_id: String,
    position: ChunkCoordinate,
    voxel_data: VoxelPayload,
    #[serde(default)]
    entities: Vec<Entity>,
    #[serde(default)]
    last_modified: u64,
    #[serde(default)]
    is_loaded: bool,
    #[serde(default)]
    is_dirty: bool,
}

impl From<WorldChunk> for WireChunk {
    fn from(chunk: WorldChunk) -> Self {
        Self {
            voxel_data: VoxelPayload::compress(&chunk.voxel_data),
            chunk_id: chunk.chunk_id,
            position: chunk.position,
            entities: chunk.entities,
            last_modified: chunk.last_modified,
            is_loaded: chunk.is_loaded,
            is_dirty: chunk.is_dirty,
        }
    }
}

impl TryFrom<WireChunk> for WorldChunk {
    type Error = PayloadError;

    fn try_from(wire: WireChunk) -> Result<Self, Self::Error> {
        Ok(Self {
            voxel_data: wire.voxel_data.decompress()?,
            // The id is derived from the position so the two can never disagree.
            chunk_id: chunk_id(wire.position),
            position: wire.position,
            entities: wire.entities,
            last_modified: wire.last_modified,
            is_loaded: wire.is_loaded,
            is_dirty: wire.is_dirty,
        })
    }
}

impl WorldChunk {
    /// A loaded, clean, all-air chunk.
    pub fn empty(position: ChunkCoordinate, now_ms: u64) -> Self {
        Self {
            chunk_id: chunk_id(position),
            position,
            voxel_data: Box::new([AIR; CHUNK_VOLUME]),
            entities: Vec::new(),
            last_modified: now_ms,
            is_loaded: true,
            is_dirty: false,
        }
    }

    /// Rebuild a chunk from an RLE blob as stored by persistence.
    pub fn from_rle(position: ChunkCoordinate, rle: &[u8], last_modified: u64) -> Self {
        Self {
            voxel_data: codec::decode(rle),
            last_modified,
            ..Self::empty(position, last_modified)
        }
    }

    pub fn get(&self, local: LocalPosition) -> u8 {
        self.voxel_data[voxel_index(local)]
    }

    /// Write one voxel, returning the previous value. Always marks the chunk
    /// dirty, even when the value is unchanged.
    pub fn set(&mut self, local: LocalPosition, block_id: u8, now_ms: u64) -> u8 {
        let index = voxel_index(local);
        let previous = self.voxel_data[index];
        self.voxel_data[index] = block_id;
        self.last_modified = now_ms;
        self.is_dirty = true;
        previous
    }

    pub fn is_empty(&self) -> bool {
        codec::is_chunk_empty(&*self.voxel_data)
    }

    pub fn non_empty_count(&self) -> usize {
        codec::count_non_empty(&*self.voxel_data)
    }

    pub fn to_rle(&self) -> Vec<u8> {
        codec::encode(&*self.voxel_data)
    }
}

/// The chunks of one island, indexed by coordinate. Holds no persistence:
/// dirty flags are cleared only through [`ChunkStore::mark_clean`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<WorldChunk>", into = "Vec<WorldChunk>")]
pub struct ChunkStore {
    chunks: Vec<WorldChunk>,
    index: HashMap<ChunkCoordinate, usize>,
}

impl From<Vec<WorldChunk>> for ChunkStore {
    fn from(chunks: Vec<WorldChunk>) -> Self {
        let mut store = Self::default();
        for chunk in chunks {
            store.insert(chunk);
        }
        store
    }
}

impl From<ChunkStore> for Vec<WorldChunk> {
    fn from(store: ChunkStore) -> Self {
        store.chunks
    }
}

impl ChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorldChunk> {
        self.chunks.iter()
    }

    pub fn positions(&self) -> impl Iterator<Item = ChunkCoordinate> + '_ {
        self.chunks.iter().map(|c| c.position)
    }

    pub fn contains(&self, coord: ChunkCoordinate) -> bool {
        self.index.contains_key(&coord)
    }

    pub fn get(&self, coord: ChunkCoordinate) -> Option<&WorldChunk> {
        self.index.get(&coord).map(|&i| &self.chunks[i])
    }

    pub fn get_mut(&mut self, coord: ChunkCoordinate) -> Option<&mut WorldChunk> {
        self.index.get(&coord).map(|&i| &mut self.chunks[i])
    }

    /// Insert a chunk, replacing (and returning) any chunk at the same position.
    pub fn insert(&mut self, chunk: WorldChunk) -> Option<WorldChunk> {
        match self.index.get(&chunk.position) {
            Some(&i) => Some(std::mem::replace(&mut self.chunks[i], chunk)),
            None => {
                self.index.insert(chunk.position, self.chunks.len());
                self.chunks.push(chunk);
                None
            }
        }
    }

    /// Fetch a chunk, appending an empty one if it does not exist yet.
    pub fn get_or_create(&mut self, coord: ChunkCoordinate, now_ms: u64) -> &mut WorldChunk {
        let i = match self.index.get(&coord) {
            Some(&i) => i,
            None => {
                self.insert(WorldChunk::empty(coord, now_ms));
                self.chunks.len() - 1
            }
        };
        &mut self.chunks[i]
    }

    /// Drop a chunk. Only used to undo a lazily created chunk when a batch
    /// is rolled back; chunks are otherwise never removed.
    fn discard(&mut self, coord: ChunkCoordinate) -> Option<WorldChunk> {
        let i = self.index.remove(&coord)?;
        let removed = self.chunks.swap_remove(i);
        if let Some(moved) = self.chunks.get(i) {
            self.index.insert(moved.position, i);
        }
        Some(removed)
    }

    /// Block id at a world position; air when the chunk does not exist.
    pub fn get_voxel(&self, pos: Vector3) -> u8 {
        self.get(world_to_chunk(pos))
            .map(|chunk| chunk.get(local_voxel_position(pos)))
            .unwrap_or(AIR)
    }

    /// Write a block id at a world position, creating the chunk if needed.
    /// Returns the previous value.
    pub fn set_voxel(&mut self, pos: Vector3, block_id: u8, now_ms: u64) -> u8 {
        self.get_or_create(world_to_chunk(pos), now_ms)
            .set(local_voxel_position(pos), block_id, now_ms)
    }

    pub fn dirty_chunks(&self) -> impl Iterator<Item = &WorldChunk> {
        self.chunks.iter().filter(|c| c.is_dirty)
    }

    /// Persistence acknowledgement: clear the dirty flag on the named chunks.
    pub fn mark_clean(&mut self, chunk_ids: &[String]) {
        for id in chunk_ids {
            if let Some(coord) = parse_chunk_id(id) {
                if let Some(chunk) = self.get_mut(coord) {
                    chunk.is_dirty = false;
                }
            }
        }
    }
}

/// Records the state of every chunk before its first mutation in a batch,
/// so the batch can be undone exactly.
#[derive(Debug, Default)]
pub struct ChunkJournal {
    saved: HashMap<ChunkCoordinate, Option<WorldChunk>>,
}

impl ChunkJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember `coord` as it is now. Later calls for the same chunk are no-ops.
    pub fn record(&mut self, store: &ChunkStore, coord: ChunkCoordinate) {
        self.saved
            .entry(coord)
            .or_insert_with(|| store.get(coord).cloned());
    }

    pub fn is_empty(&self) -> bool {
        self.saved.is_empty()
    }

    /// Coordinates of every recorded chunk.
    pub fn chunks(&self) -> impl Iterator<Item = ChunkCoordinate> + '_ {
        self.saved.keys().copied()
    }

    /// Put every recorded chunk back the way it was.
    pub fn restore(self, store: &mut ChunkStore) {
        for (coord, before) in self.saved {
            match before {
                Some(chunk) => {
                    store.insert(chunk);
                }
                None => {
                    store.discard(coord);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_chunk_reads_as_air() {
        let store = ChunkStore::new();
        assert_eq!(store.get_voxel(Vector3::new(3, 4, 5)), AIR);
    }

    #[test]
    fn set_voxel_creates_chunk_lazily() {
        let mut store = ChunkStore::new();
        let pos = Vector3::new(-5, 20, 33);
        assert_eq!(store.set_voxel(pos, 9, 100), AIR);
        assert_eq!(store.get_voxel(pos), 9);

        let chunk = store.get(world_to_chunk(pos)).unwrap();
        assert_eq!(chunk.chunk_id, "chunk_-1_1_2");
        assert!(chunk.is_dirty);
        assert_eq!(chunk.last_modified, 100);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn repeated_write_is_idempotent() {
        let mut store = ChunkStore::new();
        let pos = Vector3::new(1, 1, 1);
        store.set_voxel(pos, 4, 10);
        let once = store.get(world_to_chunk(pos)).unwrap().voxel_data.clone();
        store.set_voxel(pos, 4, 20);
        let twice = store.get(world_to_chunk(pos)).unwrap();
        assert_eq!(twice.voxel_data, once);
        assert_eq!(twice.last_modified, 20);
    }

    #[test]
    fn insert_never_duplicates_ids() {
        let coord = ChunkCoordinate::new(0, 0, 0);
        let store = ChunkStore::from(vec![
            WorldChunk::empty(coord, 1),
            WorldChunk::empty(ChunkCoordinate::new(1, 0, 0), 1),
            WorldChunk::empty(coord, 2),
        ]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(coord).unwrap().last_modified, 2);
    }

    #[test]
    fn mark_clean_clears_only_named_chunks() {
        let mut store = ChunkStore::new();
        store.set_voxel(Vector3::new(0, 0, 0), 1, 1);
        store.set_voxel(Vector3::new(16, 0, 0), 1, 1);
        store.mark_clean(&["chunk_0_0_0".to_string(), "not-a-chunk".to_string()]);
        let dirty: Vec<_> = store.dirty_chunks().map(|c| c.chunk_id.clone()).collect();
        assert_eq!(dirty, vec!["chunk_1_0_0".to_string()]);
    }

    #[test]
    fn journal_restores_modified_and_created_chunks() {
        let mut store = ChunkStore::new();
        let kept = Vector3::new(2, 2, 2);
        store.set_voxel(kept, 3, 1);
        store.mark_clean(&["chunk_0_0_0".to_string()]);
        let before = store.clone();

        let mut journal = ChunkJournal::new();
        let created = Vector3::new(40, 0, 0);
        for (pos, block) in [(kept, 7), (created, 8), (kept, 9)] {
            journal.record(&store, world_to_chunk(pos));
            store.set_voxel(pos, block, 50);
        }
        assert_eq!(store.len(), 2);

        journal.restore(&mut store);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get_voxel(kept), 3);
        assert_eq!(store.get_voxel(created), AIR);
        assert_eq!(store.get(world_to_chunk(kept)), before.get(world_to_chunk(kept)));
    }

    #[test]
    fn discard_keeps_index_consistent() {
        let mut store = ChunkStore::from(
            (0..4)
                .map(|x| WorldChunk::empty(ChunkCoordinate::new(x, 0, 0), 0))
                .collect::<Vec<_>>(),
        );
        store.discard(ChunkCoordinate::new(1, 0, 0));
        assert_eq!(store.len(), 3);
        for x in [0, 2, 3] {
            let coord = ChunkCoordinate::new(x, 0, 0);
            assert_eq!(store.get(coord).unwrap().position, coord);
        }
    }

    #[test]
    fn chunk_json_uses_tagged_payload() {
        let mut chunk = WorldChunk::empty(ChunkCoordinate::new(0, 0, 0), 5);
        let json = serde_json::to_value(&chunk).unwrap();
        assert_eq!(json["chunkId"], "chunk_0_0_0");
        assert_eq!(json["voxelData"]["encoding"], "empty");

        chunk.set(LocalPosition { x: 1, y: 2, z: 3 }, 6, 9);
        let text = serde_json::to_string(&chunk).unwrap();
        let back: WorldChunk = serde_json::from_str(&text).unwrap();
        assert_eq!(back, chunk);
    }
}
