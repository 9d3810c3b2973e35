//! Island lifecycle on top of the pure rules in [`crate::island`].
//!
//! Loaded islands live in an arena keyed by island id, each behind its own
//! `RwLock`. Writers to one island are serialized; different islands never
//! contend. Every persistence call made while an island is locked is bounded
//! by the configured timeout.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use island_common::{
    now_ms, Island, IslandBlueprint, IslandId, IslandMeta, IslandSummary, PlayerId, VoxelChange,
};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

use crate::error::ServiceError;
use crate::island;
use crate::persistence::{IslandRepository, PersistenceError};

pub type IslandHandle = Arc<RwLock<Island>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitOutcome {
    pub allowed: bool,
    pub visit_count: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    pub islands: usize,
    pub chunks: usize,
    pub failures: usize,
}

pub struct IslandService {
    repo: Arc<dyn IslandRepository>,
    islands: RwLock<HashMap<IslandId, IslandHandle>>,
    /// Owner -> island id. Also serializes island creation.
    owners: Mutex<HashMap<PlayerId, IslandId>>,
    start_size: i32,
    persist_timeout: Duration,
}

impl IslandService {
    pub fn new(
        repo: Arc<dyn IslandRepository>,
        start_size: i32,
        persist_timeout: Duration,
    ) -> Self {
        Self {
            repo,
            islands: RwLock::new(HashMap::new()),
            owners: Mutex::new(HashMap::new()),
            start_size,
            persist_timeout,
        }
    }

    pub async fn loaded_count(&self) -> usize {
        self.islands.read().await.len()
    }

    /// Run a persistence call under the configured timeout.
    pub async fn persist<T, F>(&self, fut: F) -> Result<T, ServiceError>
    where
        F: Future<Output = Result<T, PersistenceError>>,
    {
        match tokio::time::timeout(self.persist_timeout, fut).await {
            Ok(result) => result.map_err(ServiceError::from),
            Err(_) => Err(ServiceError::Timeout(self.persist_timeout)),
        }
    }

    /// Durably record a sync call's applied changes and the version they
    /// produced.
    pub async fn persist_changes(
        &self,
        island_id: &str,
        changes: &[VoxelChange],
        server_version: u64,
    ) -> Result<(), ServiceError> {
        self.persist(
            self.repo
                .apply_voxel_changes(island_id, changes, server_version),
        )
        .await
    }

    /// Overwrite the stored island record with `meta`.
    pub async fn persist_meta(&self, meta: &IslandMeta) -> Result<(), ServiceError> {
        self.persist(self.repo.update(meta)).await
    }

    /// The owner's island, created and stored on first request.
    pub async fn get_or_create_island(
        &self,
        owner_id: &str,
    ) -> Result<IslandHandle, ServiceError> {
        let mut owners = self.owners.lock().await;
        if let Some(handle) = self.cached_for_owner(&owners, owner_id).await {
            return Ok(handle);
        }
        if let Some(meta) = self.persist(self.repo.find_by_owner_id(owner_id)).await? {
            owners.insert(owner_id.to_string(), meta.id.clone());
            return self.load(meta).await;
        }

        let mut island = island::create_island(owner_id, self.start_size, now_ms());
        self.persist(self.repo.create(&island)).await?;
        let ids: Vec<String> = island.chunks.iter().map(|c| c.chunk_id.clone()).collect();
        island.chunks.mark_clean(&ids);

        tracing::info!(
            "Created island {} for {} with {} chunks",
            island.meta.id,
            owner_id,
            island.chunks.len()
        );
        owners.insert(owner_id.to_string(), island.meta.id.clone());
        Ok(self.insert(island).await)
    }

    /// The owner's island if it exists. Never creates one.
    pub async fn island_for_owner(
        &self,
        owner_id: &str,
    ) -> Result<Option<IslandHandle>, ServiceError> {
        let known = self.owners.lock().await.get(owner_id).cloned();
        if let Some(island_id) = known {
            if let Some(handle) = self.islands.read().await.get(&island_id) {
                return Ok(Some(handle.clone()));
            }
        }
        let Some(meta) = self.persist(self.repo.find_by_owner_id(owner_id)).await? else {
            return Ok(None);
        };
        self.owners
            .lock()
            .await
            .insert(owner_id.to_string(), meta.id.clone());
        self.load(meta).await.map(Some)
    }

    pub async fn island_by_id(
        &self,
        island_id: &str,
    ) -> Result<Option<IslandHandle>, ServiceError> {
        if let Some(handle) = self.islands.read().await.get(island_id) {
            return Ok(Some(handle.clone()));
        }
        match self.persist(self.repo.find_by_id(island_id)).await? {
            Some(meta) => self.load(meta).await.map(Some),
            None => Ok(None),
        }
    }

    async fn cached_for_owner(
        &self,
        owners: &HashMap<PlayerId, IslandId>,
        owner_id: &str,
    ) -> Option<IslandHandle> {
        let island_id = owners.get(owner_id)?;
        self.islands.read().await.get(island_id).cloned()
    }

    async fn load(&self, meta: IslandMeta) -> Result<IslandHandle, ServiceError> {
        let chunks = self.persist(self.repo.load_chunks(&meta.id)).await?;
        tracing::debug!("Loaded island {} ({} chunks)", meta.id, chunks.len());
        Ok(self
            .insert(Island {
                meta,
                chunks: chunks.into(),
            })
            .await)
    }

    /// Add an island to the arena. If a concurrent load got there first, the
    /// existing handle wins so there is only ever one copy in memory.
    async fn insert(&self, island: Island) -> IslandHandle {
        let mut islands = self.islands.write().await;
        islands
            .entry(island.meta.id.clone())
            .or_insert_with(|| Arc::new(RwLock::new(island)))
            .clone()
    }

    /// Grow an island from a blueprint. Either the new chunks and level are
    /// stored, or the island is left exactly as it was.
    pub async fn expand_island(
        &self,
        island_id: &str,
        blueprint: &IslandBlueprint,
    ) -> Result<IslandSummary, ServiceError> {
        let handle = self.island_by_id(island_id).await?.ok_or(ServiceError::NotFound)?;
        let mut island = handle.write().await;
        let before = island.clone();

        let added = island::expand(&mut island, blueprint, now_ms())?;
        let new_chunks: Vec<_> = added
            .iter()
            .filter_map(|coord| island.chunks.get(*coord).cloned())
            .collect();

        let stored = async {
            self.persist(self.repo.save_chunks(island_id, &new_chunks))
                .await?;
            self.persist(self.repo.update(&island.meta)).await
        }
        .await;
        if let Err(e) = stored {
            tracing::error!("Failed to store expansion of {}: {}", island_id, e);
            *island = before;
            return Err(e);
        }

        let ids: Vec<String> = new_chunks.iter().map(|c| c.chunk_id.clone()).collect();
        island.chunks.mark_clean(&ids);
        tracing::info!(
            "Expanded island {} to level {} with {} new chunks",
            island_id,
            island.meta.expansion_level,
            added.len()
        );
        Ok(IslandSummary::from(&*island))
    }

    /// Let a player visit an island, counting the visit when it is allowed
    /// and the visitor is not the owner.
    pub async fn visit(
        &self,
        island_id: &str,
        visitor_id: &str,
    ) -> Result<VisitOutcome, ServiceError> {
        let handle = self.island_by_id(island_id).await?.ok_or(ServiceError::NotFound)?;
        let mut island = handle.write().await;
        let previous = island.meta.visit_count;

        if !island::record_visit(&mut island, visitor_id) {
            return Ok(VisitOutcome {
                allowed: false,
                visit_count: previous,
            });
        }
        if island.meta.visit_count != previous {
            if let Err(e) = self
                .persist(self.repo.increment_visit_count(island_id))
                .await
            {
                island.meta.visit_count = previous;
                return Err(e);
            }
        }
        Ok(VisitOutcome {
            allowed: true,
            visit_count: island.meta.visit_count,
        })
    }

    /// Public islands, newest record from memory when the island is loaded.
    pub async fn list_public(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<IslandSummary>, ServiceError> {
        let metas = self
            .persist(self.repo.get_public_islands(limit, offset))
            .await?;
        let loaded: Vec<(IslandMeta, Option<IslandHandle>)> = {
            let islands = self.islands.read().await;
            metas
                .into_iter()
                .map(|meta| {
                    let handle = islands.get(&meta.id).cloned();
                    (meta, handle)
                })
                .collect()
        };

        let mut out = Vec::with_capacity(loaded.len());
        for (meta, handle) in loaded {
            match handle {
                Some(handle) => out.push(IslandSummary::from(&*handle.read().await)),
                None => out.push(IslandSummary::new(&meta, 0)),
            }
        }
        Ok(out)
    }

    /// Persistence sweep: store every dirty chunk and the island record,
    /// then acknowledge the chunks as clean in storage and in memory.
    pub async fn flush_dirty(&self) -> FlushStats {
        let handles: Vec<(IslandId, IslandHandle)> = self
            .islands
            .read()
            .await
            .iter()
            .map(|(id, handle)| (id.clone(), handle.clone()))
            .collect();

        let mut stats = FlushStats::default();
        for (island_id, handle) in handles {
            let mut island = handle.write().await;
            let dirty: Vec<_> = island.chunks.dirty_chunks().cloned().collect();
            let ids: Vec<String> = dirty.iter().map(|c| c.chunk_id.clone()).collect();

            let stored = async {
                self.persist(self.repo.save_chunks(&island_id, &dirty)).await?;
                self.persist(self.repo.update(&island.meta)).await?;
                self.persist(self.repo.mark_chunks_clean(&island_id, &ids))
                    .await
            }
            .await;

            match stored {
                Ok(()) => {
                    island.chunks.mark_clean(&ids);
                    stats.islands += 1;
                    stats.chunks += ids.len();
                }
                Err(e) => {
                    tracing::error!("Failed to flush island {}: {}", island_id, e);
                    stats.failures += 1;
                }
            }
        }
        stats
    }

    /// Unload islands nobody is using: fully flushed, not borrowed by any
    /// caller, and unmodified for at least `idle`. They are reloaded from
    /// storage on next access.
    pub async fn evict_idle(&self, idle: Duration) -> usize {
        let cutoff = now_ms().saturating_sub(idle.as_millis() as u64);
        let mut evicted: Vec<(IslandId, PlayerId)> = Vec::new();
        {
            let mut islands = self.islands.write().await;
            islands.retain(|island_id, handle| {
                // The arena's own reference is the only one.
                if Arc::strong_count(handle) > 1 {
                    return true;
                }
                let Ok(island) = handle.try_read() else {
                    return true;
                };
                let idle = island.meta.last_modified <= cutoff
                    && island.chunks.dirty_chunks().next().is_none();
                if idle {
                    evicted.push((island_id.clone(), island.meta.owner_id.clone()));
                }
                !idle
            });
        }

        if !evicted.is_empty() {
            let mut owners = self.owners.lock().await;
            for (island_id, owner_id) in &evicted {
                if owners.get(owner_id) == Some(island_id) {
                    owners.remove(owner_id);
                }
            }
            tracing::debug!("Evicted {} idle islands", evicted.len());
        }
        evicted.len()
    }
}
