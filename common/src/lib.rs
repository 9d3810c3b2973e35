pub mod chunk;
pub mod codec;
pub mod coords;
pub mod island;
pub mod sync;
pub mod valkey;

pub use chunk::{ChunkJournal, ChunkStore, Entity, WorldChunk, AIR};
pub use coords::{ChunkCoordinate, Vector3, CHUNK_SIZE, CHUNK_VOLUME};
pub use island::{
    BuildPermission, Island, IslandBlueprint, IslandId, IslandMeta, IslandPermissions,
    IslandSummary, ItemStack, PlayerId,
};
pub use sync::{
    ChangeBroadcast, ConflictResolution, RejectedChange, Resolution, SyncRequest, SyncResponse,
    ValidationResult, VoxelChange,
};

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
