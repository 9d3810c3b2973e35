//! Client/server reconciliation.
//!
//! A sync call validates the client's pending edits against the island, drops
//! those that clash with newer server state (the server always wins), applies
//! the rest and stores them as one batch. If storing fails or times out the
//! batch is undone in memory and the client is told nothing happened.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use island_common::{
    now_ms, ChangeBroadcast, ChunkCoordinate, ConflictResolution, Island, PlayerId,
    RejectedChange, Resolution, SyncRequest, SyncResponse, ValidationResult, VoxelChange,
    WorldChunk,
};
use lru::LruCache;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::broadcast::{island_zone, BroadcastPort};
use crate::error::ServiceError;
use crate::island::{self, ChangeBatch};
use crate::service::{IslandHandle, IslandService};

/// What the server remembers about a player's last sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerSyncState {
    pub last_version: u64,
    pub last_sync_ms: u64,
    touched: Instant,
}

pub struct SyncEngine {
    islands: Arc<IslandService>,
    broadcast: Option<Arc<dyn BroadcastPort>>,
    states: Mutex<LruCache<PlayerId, PlayerSyncState>>,
    retention: Duration,
}

/// The server value a change clashes with, if any. A change conflicts when
/// the client expected a different value and the chunk holding the position
/// moved on after the client's last sync.
fn detect_conflict(island: &Island, change: &VoxelChange, last_sync_ms: u64) -> Option<u8> {
    let current = island::get_voxel(island, change.position);
    if i32::from(current) == change.old_block_id {
        return None;
    }
    match island::last_modified_at(island, change.position) {
        Some(modified) if modified > last_sync_ms => Some(current),
        _ => None,
    }
}

/// Chunks the client asked for. Missing ones come back empty without being
/// added to the island.
fn requested_chunks(
    island: &Island,
    requested: Option<&[ChunkCoordinate]>,
    now_ms: u64,
) -> Vec<WorldChunk> {
    requested
        .unwrap_or_default()
        .iter()
        .map(|coord| {
            island
                .chunks
                .get(*coord)
                .cloned()
                .unwrap_or_else(|| WorldChunk::empty(*coord, now_ms))
        })
        .collect()
}

fn ensure(
    island: &Island,
    player_id: &str,
    action: &'static str,
    allowed: fn(&Island, &str) -> bool,
) -> Result<(), ServiceError> {
    if allowed(island, player_id) {
        return Ok(());
    }
    Err(ServiceError::PermissionDenied {
        player: player_id.to_string(),
        island: island.meta.id.clone(),
        action,
    })
}

impl SyncEngine {
    pub fn new(
        islands: Arc<IslandService>,
        broadcast: Option<Arc<dyn BroadcastPort>>,
        capacity: usize,
        retention: Duration,
    ) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            islands,
            broadcast,
            states: Mutex::new(LruCache::new(capacity)),
            retention,
        }
    }

    pub async fn synchronize_state(&self, request: SyncRequest) -> SyncResponse {
        match self.try_synchronize(&request).await {
            Ok(response) => response,
            Err(e) => {
                if e.is_transient() {
                    tracing::error!("Sync for {} failed: {}", request.player_id, e);
                } else {
                    tracing::warn!("Sync for {} refused: {}", request.player_id, e);
                }
                SyncResponse::failure(e.to_string(), now_ms())
            }
        }
    }

    async fn try_synchronize(&self, request: &SyncRequest) -> Result<SyncResponse, ServiceError> {
        let player_id = request.player_id.as_str();
        let handle = self.resolve(player_id, request.island_id.as_deref()).await?;
        let now = now_ms();

        if request.pending_changes.is_empty() {
            let island = handle.read().await;
            ensure(&island, player_id, "view", island::can_view)?;
            let response = SyncResponse {
                success: true,
                server_version: island.meta.server_version,
                timestamp: now,
                world_updates: requested_chunks(&island, request.requested_chunks.as_deref(), now),
                player_updates: Vec::new(),
                conflict_resolutions: Vec::new(),
                rejected_changes: Vec::new(),
                error: None,
            };
            drop(island);
            self.remember(player_id, response.server_version, now).await;
            return Ok(response);
        }

        let mut island = handle.write().await;
        ensure(&island, player_id, "build", island::can_build)?;

        let verdicts = island::validate_changes(&island, &request.pending_changes);
        let mut batch = ChangeBatch::begin(&island);
        let mut rejected_changes = Vec::new();
        let mut conflict_resolutions = Vec::new();

        for (change, verdict) in request.pending_changes.iter().zip(verdicts) {
            let block_id = match verdict {
                Ok(block_id) => block_id,
                Err(reason) => {
                    rejected_changes.push(RejectedChange {
                        change: change.clone(),
                        reason: reason.to_string(),
                    });
                    continue;
                }
            };
            if let Some(server_value) = detect_conflict(&island, change, request.last_sync_timestamp)
            {
                conflict_resolutions.push(ConflictResolution {
                    position: change.position,
                    client_value: change.new_block_id,
                    server_value,
                    resolution: Resolution::ServerWins,
                });
                continue;
            }
            batch.apply(&mut island, change, block_id, now);
        }

        if !batch.is_empty() {
            let next_version = island.meta.server_version + 1;
            if let Err(e) = self
                .islands
                .persist_changes(island.id(), batch.applied(), next_version)
                .await
            {
                batch.rollback_unconfirmed(&mut island, now);
                return Err(e);
            }
            island.meta.server_version = next_version;
        }

        let island_id = island.meta.id.clone();
        let server_version = island.meta.server_version;
        let world_updates = requested_chunks(&island, request.requested_chunks.as_deref(), now);
        drop(island);

        let applied = batch.into_applied();
        tracing::debug!(
            "Sync for {} on {}: {} applied, {} conflicts, {} rejected, version {}",
            player_id,
            island_id,
            applied.len(),
            conflict_resolutions.len(),
            rejected_changes.len(),
            server_version
        );
        if !applied.is_empty() {
            self.announce(player_id, &island_id, server_version, applied);
        }
        self.remember(player_id, server_version, now).await;

        Ok(SyncResponse {
            success: true,
            server_version,
            timestamp: now,
            world_updates,
            player_updates: Vec::new(),
            conflict_resolutions,
            rejected_changes,
            error: None,
        })
    }

    /// Dry-run validation against the player's own island.
    pub async fn validate_client_changes(
        &self,
        player_id: &str,
        changes: &[VoxelChange],
    ) -> ValidationResult {
        let handle = match self.islands.island_for_owner(player_id).await {
            Ok(Some(handle)) => handle,
            Ok(None) => return invalid(ServiceError::NotFound.to_string()),
            Err(e) => return invalid(e.to_string()),
        };
        let island = handle.read().await;
        let errors: Vec<String> = island::validate_changes(&island, changes)
            .into_iter()
            .filter_map(Result::err)
            .map(|rejection| rejection.to_string())
            .collect();
        ValidationResult {
            is_valid: errors.is_empty(),
            errors,
        }
    }

    /// Send the player every chunk of their island under a fresh version.
    pub async fn force_synchronization(&self, player_id: &str) -> SyncResponse {
        let handle = match self.resolve(player_id, None).await {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!("Forced sync for {} refused: {}", player_id, e);
                return SyncResponse::failure(e.to_string(), now_ms());
            }
        };

        let now = now_ms();
        let mut island = handle.write().await;
        island.meta.server_version += 1;
        if let Err(e) = self.islands.persist_meta(&island.meta).await {
            island.meta.server_version -= 1;
            tracing::error!("Forced sync for {} failed: {}", player_id, e);
            return SyncResponse::failure(e.to_string(), now);
        }
        let server_version = island.meta.server_version;
        let world_updates: Vec<WorldChunk> = island.chunks.iter().cloned().collect();
        drop(island);

        tracing::info!(
            "Forced sync for {}: {} chunks at version {}",
            player_id,
            world_updates.len(),
            server_version
        );
        self.remember(player_id, server_version, now).await;
        SyncResponse {
            success: true,
            server_version,
            timestamp: now,
            world_updates,
            player_updates: Vec::new(),
            conflict_resolutions: Vec::new(),
            rejected_changes: Vec::new(),
            error: None,
        }
    }

    /// Forget players that have not synced within the retention window.
    pub async fn cleanup_old_states(&self) -> usize {
        let mut states = self.states.lock().await;
        let mut evicted = 0;
        while let Some((_, state)) = states.peek_lru() {
            if state.touched.elapsed() <= self.retention {
                break;
            }
            states.pop_lru();
            evicted += 1;
        }
        evicted
    }

    pub async fn player_state(&self, player_id: &str) -> Option<PlayerSyncState> {
        self.states.lock().await.peek(player_id).copied()
    }

    async fn resolve(
        &self,
        player_id: &str,
        island_id: Option<&str>,
    ) -> Result<IslandHandle, ServiceError> {
        let found = match island_id {
            Some(island_id) => self.islands.island_by_id(island_id).await?,
            None => self.islands.island_for_owner(player_id).await?,
        };
        found.ok_or(ServiceError::NotFound)
    }

    async fn remember(&self, player_id: &str, last_version: u64, last_sync_ms: u64) {
        self.states.lock().await.put(
            player_id.to_string(),
            PlayerSyncState {
                last_version,
                last_sync_ms,
                touched: Instant::now(),
            },
        );
    }

    /// Push applied changes to the other players in the submitter's zone, or
    /// to everyone watching the island when the submitter is not in one.
    /// Never blocks the caller.
    fn announce(
        &self,
        player_id: &str,
        island_id: &str,
        server_version: u64,
        changes: Vec<VoxelChange>,
    ) {
        let Some(port) = self.broadcast.clone() else {
            return;
        };
        let message = ChangeBroadcast {
            island_id: island_id.to_string(),
            server_version,
            changes,
        };
        let payload = match serde_json::to_string(&message) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("Failed to encode change broadcast: {}", e);
                return;
            }
        };
        let player_id = player_id.to_string();
        tokio::spawn(async move {
            let zone = port
                .get_player_connection(&player_id)
                .await
                .and_then(|connection| connection.current_zone)
                .unwrap_or_else(|| island_zone(&message.island_id));
            match port
                .broadcast_to_zone(&zone, &payload, Some(&player_id))
                .await
            {
                Ok(delivered) => {
                    tracing::debug!("Broadcast version {} to {} in {}", server_version, delivered, zone)
                }
                Err(e) => tracing::warn!("Broadcast to {} failed: {}", zone, e),
            }
        });
    }
}

fn invalid(error: String) -> ValidationResult {
    ValidationResult {
        is_valid: false,
        errors: vec![error],
    }
}
