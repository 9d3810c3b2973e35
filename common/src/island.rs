use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::chunk::ChunkStore;
use crate::coords::Vector3;

pub type PlayerId = String;
pub type IslandId = String;

/// Top soil block.
pub const GRASS: u8 = 1;
/// Sub-surface block.
pub const DIRT: u8 = 2;

/// Per-player rights on someone else's island, weakest first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildPermission {
    #[default]
    None,
    View,
    Build,
    Admin,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IslandPermissions {
    pub is_public: bool,
    pub allowed_visitors: Vec<PlayerId>,
    pub coop_members: Vec<PlayerId>,
    pub build_permissions: HashMap<PlayerId, BuildPermission>,
}

/// Everything about an island except its chunks. This is the record the
/// persistence layer stores as a single document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IslandMeta {
    pub id: IslandId,
    pub owner_id: PlayerId,
    pub expansion_level: u32,
    #[serde(default)]
    pub permissions: IslandPermissions,
    #[serde(default)]
    pub visit_count: u64,
    pub created_at: u64,
    pub last_modified: u64,
    /// Bumped once per sync that applied at least one change, and on forced resyncs.
    #[serde(default)]
    pub server_version: u64,
}

/// A player-owned world: metadata plus its chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Island {
    #[serde(flatten)]
    pub meta: IslandMeta,
    #[serde(default)]
    pub chunks: ChunkStore,
}

impl Island {
    pub fn id(&self) -> &str {
        &self.meta.id
    }

    pub fn owner_id(&self) -> &str {
        &self.meta.owner_id
    }
}

/// Deterministic island id for an owner; each owner has exactly one island.
pub fn island_id_for_owner(owner_id: &str) -> IslandId {
    format!("island_{owner_id}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemStack {
    pub item_id: String,
    pub quantity: u32,
}

/// Externally supplied description of an island expansion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IslandBlueprint {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub required_materials: Vec<ItemStack>,
    /// Extension in world units along +X and +Z. The Y component is unused.
    pub expansion_size: Vector3,
    /// Requirements such as `expansion_level_2`.
    #[serde(default)]
    pub unlock_requirements: Vec<String>,
}

/// Compact view of an island for listings and API responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IslandSummary {
    pub id: IslandId,
    pub owner_id: PlayerId,
    pub expansion_level: u32,
    pub visit_count: u64,
    pub is_public: bool,
    pub server_version: u64,
    pub chunk_count: usize,
    pub created_at: u64,
    pub last_modified: u64,
}

impl IslandSummary {
    pub fn new(meta: &IslandMeta, chunk_count: usize) -> Self {
        Self {
            id: meta.id.clone(),
            owner_id: meta.owner_id.clone(),
            expansion_level: meta.expansion_level,
            visit_count: meta.visit_count,
            is_public: meta.permissions.is_public,
            server_version: meta.server_version,
            chunk_count,
            created_at: meta.created_at,
            last_modified: meta.last_modified,
        }
    }
}

impl From<&Island> for IslandSummary {
    fn from(island: &Island) -> Self {
        Self::new(&island.meta, island.chunks.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::WorldChunk;
    use crate::coords::ChunkCoordinate;

    #[test]
    fn island_json_is_flat() {
        let island = Island {
            meta: IslandMeta {
                id: island_id_for_owner("alice"),
                owner_id: "alice".into(),
                expansion_level: 1,
                permissions: IslandPermissions::default(),
                visit_count: 0,
                created_at: 1,
                last_modified: 1,
                server_version: 0,
            },
            chunks: ChunkStore::from(vec![WorldChunk::empty(ChunkCoordinate::new(0, 0, 0), 1)]),
        };
        let json = serde_json::to_value(&island).unwrap();
        assert_eq!(json["id"], "island_alice");
        assert_eq!(json["ownerId"], "alice");
        assert_eq!(json["chunks"][0]["chunkId"], "chunk_0_0_0");

        let back: Island = serde_json::from_value(json).unwrap();
        assert_eq!(back, island);
    }

    #[test]
    fn permissions_parse_screaming_case() {
        let perms: IslandPermissions =
            serde_json::from_str(r#"{"buildPermissions":{"bob":"BUILD","eve":"NONE"}}"#).unwrap();
        assert_eq!(perms.build_permissions["bob"], BuildPermission::Build);
        assert!(BuildPermission::Admin > BuildPermission::Build);
        assert!(!perms.is_public);
    }
}
