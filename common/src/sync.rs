use serde::{Deserialize, Serialize};

use crate::chunk::WorldChunk;
use crate::coords::{ChunkCoordinate, Vector3};
use crate::island::{IslandId, PlayerId};

/// One edit made by a client. Block ids are signed on the wire so that
/// out-of-range values reach validation instead of failing to parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoxelChange {
    pub position: Vector3,
    /// The value the client saw before editing.
    pub old_block_id: i32,
    pub new_block_id: i32,
    pub timestamp: u64,
    pub player_id: PlayerId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub player_id: PlayerId,
    #[serde(default)]
    pub client_version: u64,
    #[serde(default)]
    pub last_sync_timestamp: u64,
    #[serde(default)]
    pub pending_changes: Vec<VoxelChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_chunks: Option<Vec<ChunkCoordinate>>,
    /// Island to sync against when it is not the player's own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub island_id: Option<IslandId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Resolution {
    ServerWins,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictResolution {
    pub position: Vector3,
    pub client_value: i32,
    pub server_value: u8,
    pub resolution: Resolution,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedChange {
    pub change: VoxelChange,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub success: bool,
    pub server_version: u64,
    pub timestamp: u64,
    pub world_updates: Vec<WorldChunk>,
    pub player_updates: Vec<serde_json::Value>,
    pub conflict_resolutions: Vec<ConflictResolution>,
    pub rejected_changes: Vec<RejectedChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncResponse {
    /// A failed call. The client must assume nothing changed on the server.
    pub fn failure(message: impl Into<String>, timestamp: u64) -> Self {
        Self {
            success: false,
            server_version: 0,
            timestamp,
            world_updates: Vec::new(),
            player_updates: Vec::new(),
            conflict_resolutions: Vec::new(),
            rejected_changes: Vec::new(),
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

/// Pushed to observers of an island after a sync applied changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "voxel_changes", rename_all = "camelCase")]
pub struct ChangeBroadcast {
    pub island_id: IslandId,
    pub server_version: u64,
    pub changes: Vec<VoxelChange>,
}
