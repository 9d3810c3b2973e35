//! Storage port for islands and their chunks.
//!
//! The service layer only talks to [`IslandRepository`]; which backend sits
//! behind it is chosen once at startup from configuration.

mod memory;
mod valkey;

pub use memory::InMemoryIslandRepository;
pub use valkey::ValkeyIslandRepository;

use async_trait::async_trait;
use island_common::{Island, IslandMeta, VoxelChange, WorldChunk};

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("valkey error: {0}")]
    Valkey(#[from] redis::RedisError),
    #[error("malformed stored record: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("island {0} does not exist in storage")]
    MissingIsland(String),
    #[error("island {0} already exists")]
    AlreadyExists(String),
    #[error("change at ({x}, {y}, {z}) carries invalid block id {block_id}")]
    InvalidChange { x: i32, y: i32, z: i32, block_id: i32 },
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Everything the island core needs from durable storage. Every call may
/// fail and may be slow.
#[async_trait]
pub trait IslandRepository: Send + Sync {
    async fn find_by_id(&self, island_id: &str) -> Result<Option<IslandMeta>, PersistenceError>;

    async fn find_by_owner_id(&self, owner_id: &str)
        -> Result<Option<IslandMeta>, PersistenceError>;

    /// Store a new island together with all of its chunks.
    async fn create(&self, island: &Island) -> Result<(), PersistenceError>;

    /// Overwrite the island record. Chunks are untouched.
    async fn update(&self, meta: &IslandMeta) -> Result<(), PersistenceError>;

    async fn delete(&self, island_id: &str) -> Result<(), PersistenceError>;

    async fn load_chunks(&self, island_id: &str) -> Result<Vec<WorldChunk>, PersistenceError>;

    async fn save_chunks(
        &self,
        island_id: &str,
        chunks: &[WorldChunk],
    ) -> Result<(), PersistenceError>;

    async fn save_chunk(&self, island_id: &str, chunk: &WorldChunk) -> Result<(), PersistenceError> {
        self.save_chunks(island_id, std::slice::from_ref(chunk)).await
    }

    /// Durably apply one sync call's batch of already-validated changes,
    /// together with the island's new server version. All or nothing.
    async fn apply_voxel_changes(
        &self,
        island_id: &str,
        changes: &[VoxelChange],
        server_version: u64,
    ) -> Result<(), PersistenceError>;

    /// Chunks written through [`apply_voxel_changes`](Self::apply_voxel_changes)
    /// and not yet acknowledged with [`mark_chunks_clean`](Self::mark_chunks_clean).
    async fn get_dirty_chunks(&self, island_id: &str) -> Result<Vec<WorldChunk>, PersistenceError>;

    async fn mark_chunks_clean(
        &self,
        island_id: &str,
        chunk_ids: &[String],
    ) -> Result<(), PersistenceError>;

    /// Returns the new visit count.
    async fn increment_visit_count(&self, island_id: &str) -> Result<u64, PersistenceError>;

    async fn get_public_islands(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<IslandMeta>, PersistenceError>;
}

/// Convert a validated change's block id, refusing anything outside a byte.
fn change_block_id(change: &VoxelChange) -> Result<u8, PersistenceError> {
    u8::try_from(change.new_block_id).map_err(|_| PersistenceError::InvalidChange {
        x: change.position.x,
        y: change.position.y,
        z: change.position.z,
        block_id: change.new_block_id,
    })
}
