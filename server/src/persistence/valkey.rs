use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use island_common::coords::{chunk_id, local_voxel_position, parse_chunk_id, world_to_chunk};
use island_common::valkey;
use island_common::{now_ms, Island, IslandMeta, VoxelChange, WorldChunk};
use redis::AsyncCommands;

use super::{change_block_id, IslandRepository, PersistenceError};

/// Valkey-backed repository.
///
/// Chunks are stored RLE-compressed in one hash per island, with a parallel
/// hash of last-modified timestamps. Multi-key writes go through atomic
/// pipelines so a batch is either fully stored or not at all.
#[derive(Clone)]
pub struct ValkeyIslandRepository {
    valkey: redis::aio::MultiplexedConnection,
}

impl ValkeyIslandRepository {
    pub fn new(valkey: redis::aio::MultiplexedConnection) -> Self {
        Self { valkey }
    }

    async fn fetch_chunks(
        &self,
        island_id: &str,
        ids: &[String],
    ) -> Result<Vec<WorldChunk>, PersistenceError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut con = self.valkey.clone();
        let blobs: Vec<Option<Vec<u8>>> = redis::cmd("HMGET")
            .arg(valkey::chunks_key(island_id))
            .arg(ids)
            .query_async(&mut con)
            .await?;
        let stamps: Vec<Option<u64>> = redis::cmd("HMGET")
            .arg(valkey::chunk_ts_key(island_id))
            .arg(ids)
            .query_async(&mut con)
            .await?;

        Ok(ids
            .iter()
            .zip(blobs.into_iter().zip(stamps))
            .filter_map(|(id, (blob, ts))| {
                let coord = parse_chunk_id(id)?;
                let blob = blob?;
                Some(WorldChunk::from_rle(coord, &blob, ts.unwrap_or_default()))
            })
            .collect())
    }
}

fn chunk_fields(chunks: &[WorldChunk]) -> (Vec<(String, Vec<u8>)>, Vec<(String, u64)>) {
    chunks
        .iter()
        .map(|c| {
            (
                (c.chunk_id.clone(), c.to_rle()),
                (c.chunk_id.clone(), c.last_modified),
            )
        })
        .unzip()
}

/// Inclusive ZRANGE indices for a page. Saturates instead of wrapping, so
/// an offset past the end yields an empty range rather than negative
/// (from-the-end) indices.
fn page_range(limit: usize, offset: usize) -> (isize, isize) {
    let start = isize::try_from(offset).unwrap_or(isize::MAX);
    let limit = isize::try_from(limit).unwrap_or(isize::MAX);
    (start, start.saturating_add(limit).saturating_sub(1))
}

#[async_trait]
impl IslandRepository for ValkeyIslandRepository {
    async fn find_by_id(&self, island_id: &str) -> Result<Option<IslandMeta>, PersistenceError> {
        let json: Option<String> = self.valkey.clone().get(valkey::island_key(island_id)).await?;
        json.map(|j| serde_json::from_str(&j))
            .transpose()
            .map_err(Into::into)
    }

    async fn find_by_owner_id(
        &self,
        owner_id: &str,
    ) -> Result<Option<IslandMeta>, PersistenceError> {
        let island_id: Option<String> = self.valkey.clone().get(valkey::owner_key(owner_id)).await?;
        match island_id {
            Some(id) => self.find_by_id(&id).await,
            None => Ok(None),
        }
    }

    async fn create(&self, island: &Island) -> Result<(), PersistenceError> {
        let meta = &island.meta;
        let mut con = self.valkey.clone();
        let exists: bool = con.exists(valkey::island_key(&meta.id)).await?;
        if exists {
            return Err(PersistenceError::AlreadyExists(meta.id.clone()));
        }

        let chunks: Vec<WorldChunk> = island.chunks.iter().cloned().collect();
        let (blobs, stamps) = chunk_fields(&chunks);

        let mut pipe = redis::pipe();
        pipe.atomic()
            .set(valkey::island_key(&meta.id), serde_json::to_string(meta)?)
            .ignore()
            .set(valkey::owner_key(&meta.owner_id), &meta.id)
            .ignore();
        if !blobs.is_empty() {
            pipe.hset_multiple(valkey::chunks_key(&meta.id), blobs.as_slice())
                .ignore()
                .hset_multiple(valkey::chunk_ts_key(&meta.id), stamps.as_slice())
                .ignore();
        }
        if meta.permissions.is_public {
            pipe.zadd(valkey::PUBLIC_ISLANDS, &meta.id, meta.created_at as f64)
                .ignore();
        }
        let _: () = pipe.query_async(&mut con).await?;
        Ok(())
    }

    async fn update(&self, meta: &IslandMeta) -> Result<(), PersistenceError> {
        let mut con = self.valkey.clone();
        let exists: bool = con.exists(valkey::island_key(&meta.id)).await?;
        if !exists {
            return Err(PersistenceError::MissingIsland(meta.id.clone()));
        }

        let mut pipe = redis::pipe();
        pipe.atomic()
            .set(valkey::island_key(&meta.id), serde_json::to_string(meta)?)
            .ignore();
        if meta.permissions.is_public {
            pipe.zadd(valkey::PUBLIC_ISLANDS, &meta.id, meta.created_at as f64)
                .ignore();
        } else {
            pipe.zrem(valkey::PUBLIC_ISLANDS, &meta.id).ignore();
        }
        let _: () = pipe.query_async(&mut con).await?;
        Ok(())
    }

    async fn delete(&self, island_id: &str) -> Result<(), PersistenceError> {
        let Some(meta) = self.find_by_id(island_id).await? else {
            return Ok(());
        };
        let _: () = redis::pipe()
            .atomic()
            .del(&[
                valkey::island_key(island_id),
                valkey::owner_key(&meta.owner_id),
                valkey::chunks_key(island_id),
                valkey::chunk_ts_key(island_id),
                valkey::dirty_key(island_id),
                valkey::changes_key(island_id),
            ])
            .ignore()
            .zrem(valkey::PUBLIC_ISLANDS, island_id)
            .ignore()
            .query_async(&mut self.valkey.clone())
            .await?;
        Ok(())
    }

    async fn load_chunks(&self, island_id: &str) -> Result<Vec<WorldChunk>, PersistenceError> {
        let mut con = self.valkey.clone();
        let blobs: HashMap<String, Vec<u8>> = con.hgetall(valkey::chunks_key(island_id)).await?;
        let stamps: HashMap<String, u64> = con.hgetall(valkey::chunk_ts_key(island_id)).await?;

        let mut chunks = Vec::with_capacity(blobs.len());
        for (id, blob) in blobs {
            let Some(coord) = parse_chunk_id(&id) else {
                tracing::warn!("Skipping malformed chunk id {} on island {}", id, island_id);
                continue;
            };
            let ts = stamps.get(&id).copied().unwrap_or_default();
            chunks.push(WorldChunk::from_rle(coord, &blob, ts));
        }
        Ok(chunks)
    }

    async fn save_chunks(
        &self,
        island_id: &str,
        chunks: &[WorldChunk],
    ) -> Result<(), PersistenceError> {
        if chunks.is_empty() {
            return Ok(());
        }
        let (blobs, stamps) = chunk_fields(chunks);
        let _: () = redis::pipe()
            .atomic()
            .hset_multiple(valkey::chunks_key(island_id), blobs.as_slice())
            .ignore()
            .hset_multiple(valkey::chunk_ts_key(island_id), stamps.as_slice())
            .ignore()
            .query_async(&mut self.valkey.clone())
            .await?;
        Ok(())
    }

    async fn apply_voxel_changes(
        &self,
        island_id: &str,
        changes: &[VoxelChange],
        server_version: u64,
    ) -> Result<(), PersistenceError> {
        if changes.is_empty() {
            return Ok(());
        }
        // Callers hold the island's write lock, so the record cannot move
        // underneath this read-modify-write.
        let mut meta = self
            .find_by_id(island_id)
            .await?
            .ok_or_else(|| PersistenceError::MissingIsland(island_id.to_string()))?;
        meta.server_version = server_version;
        let record = serde_json::to_string(&meta)?;

        let blocks = changes
            .iter()
            .map(change_block_id)
            .collect::<Result<Vec<_>, _>>()?;

        // Group by chunk so each blob is read and written once.
        let mut touched: BTreeMap<String, Vec<(usize, u8)>> = BTreeMap::new();
        for (i, (change, block_id)) in changes.iter().zip(&blocks).enumerate() {
            touched
                .entry(chunk_id(world_to_chunk(change.position)))
                .or_default()
                .push((i, *block_id));
        }
        let ids: Vec<String> = touched.keys().cloned().collect();
        let mut chunks: HashMap<String, WorldChunk> = self
            .fetch_chunks(island_id, &ids)
            .await?
            .into_iter()
            .map(|c| (c.chunk_id.clone(), c))
            .collect();

        let now = now_ms();
        for (id, edits) in &touched {
            let Some(coord) = parse_chunk_id(id) else {
                continue;
            };
            let chunk = chunks
                .entry(id.clone())
                .or_insert_with(|| WorldChunk::empty(coord, now));
            for &(i, block_id) in edits {
                chunk.set(local_voxel_position(changes[i].position), block_id, now);
            }
        }

        let updated: Vec<WorldChunk> = chunks.into_values().collect();
        let (blobs, stamps) = chunk_fields(&updated);
        let log: Vec<String> = changes
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<_, _>>()?;
        let changes_key = valkey::changes_key(island_id);

        let _: () = redis::pipe()
            .atomic()
            .hset_multiple(valkey::chunks_key(island_id), blobs.as_slice())
            .ignore()
            .hset_multiple(valkey::chunk_ts_key(island_id), stamps.as_slice())
            .ignore()
            .sadd(valkey::dirty_key(island_id), &ids)
            .ignore()
            .rpush(&changes_key, &log)
            .ignore()
            .ltrim(&changes_key, -valkey::CHANGE_LOG_LIMIT, -1)
            .ignore()
            .set(valkey::island_key(island_id), record)
            .ignore()
            .query_async(&mut self.valkey.clone())
            .await?;
        Ok(())
    }

    async fn get_dirty_chunks(&self, island_id: &str) -> Result<Vec<WorldChunk>, PersistenceError> {
        let ids: Vec<String> = self
            .valkey
            .clone()
            .smembers(valkey::dirty_key(island_id))
            .await?;
        self.fetch_chunks(island_id, &ids).await
    }

    async fn mark_chunks_clean(
        &self,
        island_id: &str,
        chunk_ids: &[String],
    ) -> Result<(), PersistenceError> {
        if chunk_ids.is_empty() {
            return Ok(());
        }
        let _: () = self
            .valkey
            .clone()
            .srem(valkey::dirty_key(island_id), chunk_ids)
            .await?;
        Ok(())
    }

    async fn increment_visit_count(&self, island_id: &str) -> Result<u64, PersistenceError> {
        // Callers hold the island's write lock, so read-modify-write is safe
        // against other writers of this record.
        let mut meta = self
            .find_by_id(island_id)
            .await?
            .ok_or_else(|| PersistenceError::MissingIsland(island_id.to_string()))?;
        meta.visit_count += 1;
        let _: () = self
            .valkey
            .clone()
            .set(valkey::island_key(island_id), serde_json::to_string(&meta)?)
            .await?;
        Ok(meta.visit_count)
    }

    async fn get_public_islands(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<IslandMeta>, PersistenceError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut con = self.valkey.clone();
        let (start, stop) = page_range(limit, offset);
        let ids: Vec<String> = con.zrange(valkey::PUBLIC_ISLANDS, start, stop).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = ids.iter().map(|id| valkey::island_key(id)).collect();
        let records: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut con)
            .await?;

        let mut out = Vec::with_capacity(records.len());
        for json in records.into_iter().flatten() {
            out.push(serde_json::from_str(&json)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_range_never_goes_negative() {
        assert_eq!(page_range(10, 0), (0, 9));
        assert_eq!(page_range(1, 5), (5, 5));
        assert_eq!(page_range(10, usize::MAX), (isize::MAX, isize::MAX - 1));
        assert_eq!(page_range(usize::MAX, usize::MAX), (isize::MAX, isize::MAX - 1));
        let (start, stop) = page_range(usize::MAX, 3);
        assert!(start >= 0 && stop >= start);
    }
}
