use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use island_common::coords::{chunk_id, parse_chunk_id, world_to_chunk};
use island_common::{
    now_ms, ChunkStore, Island, IslandId, IslandMeta, PlayerId, Vector3, VoxelChange, WorldChunk,
};
use tokio::sync::RwLock;

use super::{change_block_id, IslandRepository, PersistenceError};

struct StoredIsland {
    meta: IslandMeta,
    chunks: ChunkStore,
    dirty: BTreeSet<String>,
    change_log: Vec<VoxelChange>,
}

#[derive(Default)]
struct State {
    islands: HashMap<IslandId, StoredIsland>,
    owners: HashMap<PlayerId, IslandId>,
}

/// Map-backed repository for tests and local development.
#[derive(Default)]
pub struct InMemoryIslandRepository {
    state: RwLock<State>,
}

impl InMemoryIslandRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every change applied to an island through this repository, oldest first.
    pub async fn change_log(&self, island_id: &str) -> Vec<VoxelChange> {
        self.state
            .read()
            .await
            .islands
            .get(island_id)
            .map(|stored| stored.change_log.clone())
            .unwrap_or_default()
    }

    /// The stored copy of one voxel, as a restart would see it.
    pub async fn stored_voxel(&self, island_id: &str, pos: Vector3) -> Option<u8> {
        self.state
            .read()
            .await
            .islands
            .get(island_id)
            .map(|stored| stored.chunks.get_voxel(pos))
    }
}

#[async_trait]
impl IslandRepository for InMemoryIslandRepository {
    async fn find_by_id(&self, island_id: &str) -> Result<Option<IslandMeta>, PersistenceError> {
        let state = self.state.read().await;
        Ok(state.islands.get(island_id).map(|s| s.meta.clone()))
    }

    async fn find_by_owner_id(
        &self,
        owner_id: &str,
    ) -> Result<Option<IslandMeta>, PersistenceError> {
        let state = self.state.read().await;
        Ok(state
            .owners
            .get(owner_id)
            .and_then(|id| state.islands.get(id))
            .map(|s| s.meta.clone()))
    }

    async fn create(&self, island: &Island) -> Result<(), PersistenceError> {
        let mut state = self.state.write().await;
        if state.islands.contains_key(island.id()) {
            return Err(PersistenceError::AlreadyExists(island.meta.id.clone()));
        }
        let mut chunks = island.chunks.clone();
        let ids: Vec<String> = chunks.iter().map(|c| c.chunk_id.clone()).collect();
        chunks.mark_clean(&ids);

        state
            .owners
            .insert(island.meta.owner_id.clone(), island.meta.id.clone());
        state.islands.insert(
            island.meta.id.clone(),
            StoredIsland {
                meta: island.meta.clone(),
                chunks,
                dirty: BTreeSet::new(),
                change_log: Vec::new(),
            },
        );
        Ok(())
    }

    async fn update(&self, meta: &IslandMeta) -> Result<(), PersistenceError> {
        let mut state = self.state.write().await;
        let stored = state
            .islands
            .get_mut(&meta.id)
            .ok_or_else(|| PersistenceError::MissingIsland(meta.id.clone()))?;
        stored.meta = meta.clone();
        Ok(())
    }

    async fn delete(&self, island_id: &str) -> Result<(), PersistenceError> {
        let mut state = self.state.write().await;
        if let Some(stored) = state.islands.remove(island_id) {
            state.owners.remove(&stored.meta.owner_id);
        }
        Ok(())
    }

    async fn load_chunks(&self, island_id: &str) -> Result<Vec<WorldChunk>, PersistenceError> {
        let state = self.state.read().await;
        let stored = state
            .islands
            .get(island_id)
            .ok_or_else(|| PersistenceError::MissingIsland(island_id.to_string()))?;
        Ok(stored.chunks.iter().cloned().collect())
    }

    async fn save_chunks(
        &self,
        island_id: &str,
        chunks: &[WorldChunk],
    ) -> Result<(), PersistenceError> {
        let mut state = self.state.write().await;
        let stored = state
            .islands
            .get_mut(island_id)
            .ok_or_else(|| PersistenceError::MissingIsland(island_id.to_string()))?;
        for chunk in chunks {
            let mut copy = chunk.clone();
            copy.is_dirty = false;
            stored.chunks.insert(copy);
        }
        Ok(())
    }

    async fn apply_voxel_changes(
        &self,
        island_id: &str,
        changes: &[VoxelChange],
        server_version: u64,
    ) -> Result<(), PersistenceError> {
        // Check the whole batch before touching anything.
        let blocks = changes
            .iter()
            .map(change_block_id)
            .collect::<Result<Vec<_>, _>>()?;

        let mut state = self.state.write().await;
        let stored = state
            .islands
            .get_mut(island_id)
            .ok_or_else(|| PersistenceError::MissingIsland(island_id.to_string()))?;

        let now = now_ms();
        for (change, block_id) in changes.iter().zip(blocks) {
            stored.chunks.set_voxel(change.position, block_id, now);
            stored.dirty.insert(chunk_id(world_to_chunk(change.position)));
        }
        stored.change_log.extend_from_slice(changes);
        stored.meta.server_version = server_version;
        Ok(())
    }

    async fn get_dirty_chunks(&self, island_id: &str) -> Result<Vec<WorldChunk>, PersistenceError> {
        let state = self.state.read().await;
        let Some(stored) = state.islands.get(island_id) else {
            return Ok(Vec::new());
        };
        Ok(stored
            .dirty
            .iter()
            .filter_map(|id| parse_chunk_id(id))
            .filter_map(|coord| stored.chunks.get(coord).cloned())
            .collect())
    }

    async fn mark_chunks_clean(
        &self,
        island_id: &str,
        chunk_ids: &[String],
    ) -> Result<(), PersistenceError> {
        let mut state = self.state.write().await;
        if let Some(stored) = state.islands.get_mut(island_id) {
            for id in chunk_ids {
                stored.dirty.remove(id);
            }
            stored.chunks.mark_clean(chunk_ids);
        }
        Ok(())
    }

    async fn increment_visit_count(&self, island_id: &str) -> Result<u64, PersistenceError> {
        let mut state = self.state.write().await;
        let stored = state
            .islands
            .get_mut(island_id)
            .ok_or_else(|| PersistenceError::MissingIsland(island_id.to_string()))?;
        stored.meta.visit_count += 1;
        Ok(stored.meta.visit_count)
    }

    async fn get_public_islands(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<IslandMeta>, PersistenceError> {
        let state = self.state.read().await;
        let mut public: Vec<&IslandMeta> = state
            .islands
            .values()
            .map(|s| &s.meta)
            .filter(|m| m.permissions.is_public)
            .collect();
        public.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        Ok(public
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }
}
