//! Island rules: generation, voxel access, bounds, validation, expansion
//! and permissions. Everything here is synchronous and free of I/O; the
//! async lifecycle around it lives in [`crate::service`].

use island_common::coords::{
    chunk_to_world, voxel_index, world_to_chunk, ChunkCoordinate, LocalPosition, Vector3,
    CHUNK_SIZE,
};
use island_common::island::{island_id_for_owner, DIRT, GRASS};
use island_common::{
    BuildPermission, ChunkJournal, ChunkStore, Island, IslandBlueprint, IslandMeta,
    IslandPermissions, VoxelChange, WorldChunk,
};
use serde::Serialize;

/// Default starting footprint of a new island, in world units per axis.
pub const ISLAND_START_SIZE: i32 = 32;

/// Local Y layers (in chunk-Y 0) filled with dirt; the next layer is grass.
const DIRT_LAYERS: usize = 3;

/// Most chunks a single expansion may add.
pub const MAX_EXPANSION_CHUNKS: u64 = 1024;

const EXPANSION_LEVEL_PREFIX: &str = "expansion_level_";

/// Build a fresh island for `owner_id`.
///
/// The footprint is `ceil(start_size / 16)` chunks per axis starting at the
/// origin chunk. Chunks at chunk-Y 0 get three layers of dirt topped with
/// grass; the rest are air. Every generated chunk starts dirty.
pub fn create_island(owner_id: &str, start_size: i32, now_ms: u64) -> Island {
    let per_axis = (start_size.max(1) + CHUNK_SIZE - 1) / CHUNK_SIZE;
    let mut chunks = ChunkStore::new();

    for cz in 0..per_axis {
        for cy in 0..per_axis {
            for cx in 0..per_axis {
                let mut chunk = WorldChunk::empty(ChunkCoordinate::new(cx, cy, cz), now_ms);
                if cy == 0 {
                    fill_ground(&mut chunk);
                }
                chunk.is_dirty = true;
                chunks.insert(chunk);
            }
        }
    }

    Island {
        meta: IslandMeta {
            id: island_id_for_owner(owner_id),
            owner_id: owner_id.to_string(),
            expansion_level: 1,
            permissions: IslandPermissions::default(),
            visit_count: 0,
            created_at: now_ms,
            last_modified: now_ms,
            server_version: 0,
        },
        chunks,
    }
}

fn fill_ground(chunk: &mut WorldChunk) {
    let size = CHUNK_SIZE as usize;
    for y in 0..=DIRT_LAYERS {
        let block = if y < DIRT_LAYERS { DIRT } else { GRASS };
        for z in 0..size {
            for x in 0..size {
                chunk.voxel_data[voxel_index(LocalPosition { x, y, z })] = block;
            }
        }
    }
}

pub fn get_voxel(island: &Island, pos: Vector3) -> u8 {
    island.chunks.get_voxel(pos)
}

/// Write one voxel, creating its chunk if needed. Returns the previous value.
pub fn set_voxel(island: &mut Island, pos: Vector3, block_id: u8, now_ms: u64) -> u8 {
    island.meta.last_modified = now_ms;
    island.chunks.set_voxel(pos, block_id, now_ms)
}

/// When the chunk holding `pos` was last modified, if it exists.
pub fn last_modified_at(island: &Island, pos: Vector3) -> Option<u64> {
    island
        .chunks
        .get(world_to_chunk(pos))
        .map(|chunk| chunk.last_modified)
}

/// Inclusive world-space box covering every chunk of an island.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bounds {
    pub min: Vector3,
    pub max: Vector3,
    empty: bool,
}

impl Bounds {
    /// The degenerate zero box of an island without chunks. Contains nothing.
    pub const EMPTY: Bounds = Bounds {
        min: Vector3::new(0, 0, 0),
        max: Vector3::new(0, 0, 0),
        empty: true,
    };

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn contains(&self, pos: Vector3) -> bool {
        !self.empty
            && (self.min.x..=self.max.x).contains(&pos.x)
            && (self.min.y..=self.max.y).contains(&pos.y)
            && (self.min.z..=self.max.z).contains(&pos.z)
    }
}

pub fn bounds_of(island: &Island) -> Bounds {
    let mut positions = island.chunks.positions();
    let Some(first) = positions.next() else {
        return Bounds::EMPTY;
    };
    let (lo, hi) = positions.fold((first, first), |(lo, hi), c| {
        (
            ChunkCoordinate::new(lo.x.min(c.x), lo.y.min(c.y), lo.z.min(c.z)),
            ChunkCoordinate::new(hi.x.max(c.x), hi.y.max(c.y), hi.z.max(c.z)),
        )
    });
    let max_origin = chunk_to_world(hi);
    Bounds {
        min: chunk_to_world(lo),
        max: Vector3::new(
            max_origin.x + CHUNK_SIZE - 1,
            max_origin.y + CHUNK_SIZE - 1,
            max_origin.z + CHUNK_SIZE - 1,
        ),
        empty: false,
    }
}

/// Why a single change was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChangeRejection {
    #[error("invalid block id {0}: must be between 0 and 255")]
    InvalidBlockId(i32),
    #[error("position ({x}, {y}, {z}) is outside island bounds")]
    OutOfBounds { x: i32, y: i32, z: i32 },
}

/// Check one change against precomputed bounds, yielding the block id to write.
pub fn validate_change(bounds: &Bounds, change: &VoxelChange) -> Result<u8, ChangeRejection> {
    let block_id = u8::try_from(change.new_block_id)
        .map_err(|_| ChangeRejection::InvalidBlockId(change.new_block_id))?;
    let pos = change.position;
    if !bounds.contains(pos) {
        return Err(ChangeRejection::OutOfBounds {
            x: pos.x,
            y: pos.y,
            z: pos.z,
        });
    }
    Ok(block_id)
}

/// Validate every change without touching the island. One verdict per
/// change, in submission order.
pub fn validate_changes(
    island: &Island,
    changes: &[VoxelChange],
) -> Vec<Result<u8, ChangeRejection>> {
    let bounds = bounds_of(island);
    changes
        .iter()
        .map(|change| validate_change(&bounds, change))
        .collect()
}

/// Changes applied to one island as a unit, undoable until dropped.
#[derive(Debug)]
pub struct ChangeBatch {
    applied: Vec<VoxelChange>,
    journal: ChunkJournal,
    previous_last_modified: u64,
}

impl ChangeBatch {
    pub fn begin(island: &Island) -> Self {
        Self {
            applied: Vec::new(),
            journal: ChunkJournal::new(),
            previous_last_modified: island.meta.last_modified,
        }
    }

    /// Apply an already validated change.
    pub fn apply(&mut self, island: &mut Island, change: &VoxelChange, block_id: u8, now_ms: u64) {
        self.journal
            .record(&island.chunks, world_to_chunk(change.position));
        set_voxel(island, change.position, block_id, now_ms);
        self.applied.push(change.clone());
    }

    pub fn applied(&self) -> &[VoxelChange] {
        &self.applied
    }

    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }

    pub fn into_applied(self) -> Vec<VoxelChange> {
        self.applied
    }

    /// Restore the island exactly as it was when the batch began.
    pub fn rollback(self, island: &mut Island) {
        self.journal.restore(&mut island.chunks);
        island.meta.last_modified = self.previous_last_modified;
    }

    /// Undo the batch after a store whose outcome is unknown. Every touched
    /// chunk is left dirty, so the next flush overwrites whatever storage
    /// may have kept.
    pub fn rollback_unconfirmed(self, island: &mut Island, now_ms: u64) {
        let touched: Vec<ChunkCoordinate> = self.journal.chunks().collect();
        self.rollback(island);
        for coord in touched {
            island.chunks.get_or_create(coord, now_ms).is_dirty = true;
        }
    }
}

/// Validate and apply `changes` in order, skipping invalid ones.
pub fn apply_changes(island: &mut Island, changes: &[VoxelChange], now_ms: u64) -> ChangeBatch {
    let verdicts = validate_changes(island, changes);
    let mut batch = ChangeBatch::begin(island);
    for (change, verdict) in changes.iter().zip(verdicts) {
        if let Ok(block_id) = verdict {
            batch.apply(island, change, block_id, now_ms);
        }
    }
    batch
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExpandError {
    #[error("blueprint requires expansion level {required}, island is at level {current}")]
    LevelTooLow { required: u32, current: u32 },
    #[error("unrecognised unlock requirement: {0}")]
    UnknownRequirement(String),
    #[error("expansion size must not be negative")]
    NegativeSize,
    #[error("expansion reaches past the edge of the world")]
    OutOfRange,
    #[error("expansion would add {chunks} chunks, at most {limit} allowed")]
    TooLarge { chunks: u64, limit: u64 },
}

/// Number of chunk coordinates in `from..=to`, zero when empty.
fn span(from: i32, to: i32) -> u64 {
    (i64::from(to) - i64::from(from) + 1).max(0) as u64
}

/// Fails closed: any requirement that cannot be checked is unmet.
pub fn check_unlock(island: &Island, blueprint: &IslandBlueprint) -> Result<(), ExpandError> {
    for requirement in &blueprint.unlock_requirements {
        let required: u32 = requirement
            .strip_prefix(EXPANSION_LEVEL_PREFIX)
            .and_then(|level| level.parse().ok())
            .ok_or_else(|| ExpandError::UnknownRequirement(requirement.clone()))?;
        if island.meta.expansion_level < required {
            return Err(ExpandError::LevelTooLow {
                required,
                current: island.meta.expansion_level,
            });
        }
    }
    Ok(())
}

/// Grow the island along +X, then +Z, by the blueprint's expansion size.
///
/// The X pass covers the existing Y/Z range; the Z pass covers the existing
/// Y range across the widened X range. Existing chunks are never touched.
/// Returns the coordinates of the chunks that were added.
pub fn expand(
    island: &mut Island,
    blueprint: &IslandBlueprint,
    now_ms: u64,
) -> Result<Vec<ChunkCoordinate>, ExpandError> {
    check_unlock(island, blueprint)?;
    let size = blueprint.expansion_size;
    if size.x < 0 || size.z < 0 {
        return Err(ExpandError::NegativeSize);
    }

    let bounds = bounds_of(island);
    let far_x = bounds.max.x.checked_add(size.x).ok_or(ExpandError::OutOfRange)?;
    let far_z = bounds.max.z.checked_add(size.z).ok_or(ExpandError::OutOfRange)?;
    let lo = world_to_chunk(bounds.min);
    let hi = world_to_chunk(bounds.max);
    let far = world_to_chunk(Vector3::new(far_x, bounds.max.y, far_z));

    // Chunk ranges of the X pass and the Z pass, in sweep order.
    let mut passes = Vec::with_capacity(2);
    if size.x > 0 {
        passes.push((hi.x + 1..=far.x, lo.z..=hi.z));
    }
    if size.z > 0 {
        passes.push((lo.x..=far.x, hi.z + 1..=far.z));
    }

    let height = span(lo.y, hi.y);
    let planned = passes.iter().fold(0u64, |total, (xs, zs)| {
        let area = span(*xs.start(), *xs.end()).saturating_mul(span(*zs.start(), *zs.end()));
        total.saturating_add(area.saturating_mul(height))
    });
    if planned > MAX_EXPANSION_CHUNKS {
        return Err(ExpandError::TooLarge {
            chunks: planned,
            limit: MAX_EXPANSION_CHUNKS,
        });
    }

    let mut added = Vec::new();
    for (xs, zs) in passes {
        for cz in zs {
            for cy in lo.y..=hi.y {
                for cx in xs.clone() {
                    add_chunk(island, ChunkCoordinate::new(cx, cy, cz), now_ms, &mut added);
                }
            }
        }
    }

    island.meta.expansion_level += 1;
    island.meta.last_modified = now_ms;
    Ok(added)
}

fn add_chunk(
    island: &mut Island,
    coord: ChunkCoordinate,
    now_ms: u64,
    added: &mut Vec<ChunkCoordinate>,
) {
    if island.chunks.contains(coord) {
        return;
    }
    let mut chunk = WorldChunk::empty(coord, now_ms);
    chunk.is_dirty = true;
    island.chunks.insert(chunk);
    added.push(coord);
}

pub fn can_visit(island: &Island, visitor_id: &str) -> bool {
    let perms = &island.meta.permissions;
    island.owner_id() == visitor_id
        || perms.is_public
        || perms.allowed_visitors.iter().any(|p| p == visitor_id)
        || perms.coop_members.iter().any(|p| p == visitor_id)
}

pub fn permission_of(island: &Island, player_id: &str) -> BuildPermission {
    if island.owner_id() == player_id {
        return BuildPermission::Admin;
    }
    island
        .meta
        .permissions
        .build_permissions
        .get(player_id)
        .copied()
        .unwrap_or_default()
}

pub fn can_build(island: &Island, player_id: &str) -> bool {
    permission_of(island, player_id) >= BuildPermission::Build
}

pub fn can_view(island: &Island, player_id: &str) -> bool {
    can_visit(island, player_id) || permission_of(island, player_id) >= BuildPermission::View
}

/// Count a visit. Returns whether the visitor was allowed in; only allowed
/// non-owner visits are counted.
pub fn record_visit(island: &mut Island, visitor_id: &str) -> bool {
    if !can_visit(island, visitor_id) {
        return false;
    }
    if island.owner_id() != visitor_id {
        island.meta.visit_count += 1;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use island_common::AIR;

    fn change(x: i32, y: i32, z: i32, old: i32, new: i32) -> VoxelChange {
        VoxelChange {
            position: Vector3::new(x, y, z),
            old_block_id: old,
            new_block_id: new,
            timestamp: 0,
            player_id: "alice".into(),
        }
    }

    fn blueprint(size: Vector3, requirements: &[&str]) -> IslandBlueprint {
        IslandBlueprint {
            id: "bp".into(),
            name: "Eastern shelf".into(),
            required_materials: vec![],
            expansion_size: size,
            unlock_requirements: requirements.iter().map(|r| r.to_string()).collect(),
        }
    }

    #[test]
    fn new_island_has_layered_ground() {
        let island = create_island("alice", ISLAND_START_SIZE, 1);
        assert_eq!(island.id(), "island_alice");
        assert_eq!(island.chunks.len(), 8);
        assert!(island.chunks.iter().all(|c| c.is_dirty));

        assert_eq!(get_voxel(&island, Vector3::new(5, 0, 5)), DIRT);
        assert_eq!(get_voxel(&island, Vector3::new(20, 2, 31)), DIRT);
        assert_eq!(get_voxel(&island, Vector3::new(5, 3, 5)), GRASS);
        assert_eq!(get_voxel(&island, Vector3::new(5, 4, 5)), AIR);
        assert_eq!(get_voxel(&island, Vector3::new(5, 16, 5)), AIR);
        // Layers run along Y at every depth, not along Z.
        assert_eq!(get_voxel(&island, Vector3::new(7, 9, 2)), AIR);
        assert_eq!(get_voxel(&island, Vector3::new(7, 1, 14)), DIRT);
        assert_eq!(get_voxel(&island, Vector3::new(30, 3, 27)), GRASS);
        let floor = island.chunks.get(ChunkCoordinate::new(1, 0, 1)).unwrap();
        assert_eq!(floor.non_empty_count(), 4 * 16 * 16);
        assert!(island
            .chunks
            .iter()
            .filter(|c| c.position.y == 1)
            .all(|c| c.is_empty()));
    }

    #[test]
    fn generation_is_deterministic() {
        assert_eq!(create_island("bob", 40, 7), create_island("bob", 40, 7));
        // ceil(40 / 16) = 3 chunks per axis
        assert_eq!(create_island("bob", 40, 7).chunks.len(), 27);
    }

    #[test]
    fn set_then_get_returns_block() {
        let mut island = create_island("alice", ISLAND_START_SIZE, 1);
        let pos = Vector3::new(10, 5, 15);
        set_voxel(&mut island, pos, 1, 2);
        assert_eq!(get_voxel(&island, pos), 1);
        assert_eq!(island.meta.last_modified, 2);
        assert_eq!(last_modified_at(&island, pos), Some(2));
    }

    #[test]
    fn bounds_cover_whole_chunks() {
        let island = create_island("alice", ISLAND_START_SIZE, 1);
        let bounds = bounds_of(&island);
        assert_eq!(bounds.min, Vector3::new(0, 0, 0));
        assert_eq!(bounds.max, Vector3::new(31, 31, 31));
        assert!(bounds.contains(Vector3::new(31, 0, 0)));
        assert!(!bounds.contains(Vector3::new(32, 0, 0)));
        assert!(!bounds.contains(Vector3::new(0, -1, 0)));
    }

    #[test]
    fn empty_island_has_degenerate_bounds() {
        let mut island = create_island("alice", ISLAND_START_SIZE, 1);
        island.chunks = ChunkStore::new();
        let bounds = bounds_of(&island);
        assert!(bounds.is_empty());
        assert_eq!(bounds.min, bounds.max);
        assert!(!bounds.contains(Vector3::new(0, 0, 0)));
    }

    #[test]
    fn validation_rejects_without_mutating() {
        let island = create_island("alice", ISLAND_START_SIZE, 1);
        let before = island.clone();
        let changes = vec![
            change(1, 4, 1, 0, 7),
            change(99999, -100, 99999, 0, 999),
            change(1, 4, 1, 0, -1),
            change(64, 4, 1, 0, 3),
            change(1, 4, 2, 0, 255),
        ];
        let verdicts = validate_changes(&island, &changes);
        assert_eq!(verdicts[0], Ok(7));
        assert_eq!(verdicts[1], Err(ChangeRejection::InvalidBlockId(999)));
        assert_eq!(verdicts[2], Err(ChangeRejection::InvalidBlockId(-1)));
        assert!(matches!(verdicts[3], Err(ChangeRejection::OutOfBounds { x: 64, .. })));
        assert_eq!(verdicts[4], Ok(255));
        assert_eq!(island, before);
    }

    #[test]
    fn apply_skips_invalid_and_rolls_back() {
        let mut island = create_island("alice", ISLAND_START_SIZE, 1);
        let before = island.clone();
        let batch = apply_changes(
            &mut island,
            &[change(1, 4, 1, 0, 7), change(500, 0, 0, 0, 7)],
            9,
        );
        assert_eq!(batch.applied().len(), 1);
        assert_eq!(get_voxel(&island, Vector3::new(1, 4, 1)), 7);
        assert_eq!(island.meta.last_modified, 9);

        batch.rollback(&mut island);
        assert_eq!(island, before);
    }

    #[test]
    fn unconfirmed_rollback_leaves_chunks_dirty() {
        let mut island = create_island("alice", ISLAND_START_SIZE, 1);
        let ids: Vec<String> = island.chunks.iter().map(|c| c.chunk_id.clone()).collect();
        island.chunks.mark_clean(&ids);
        let before = island.clone();

        let mut batch = ChangeBatch::begin(&island);
        batch.apply(&mut island, &change(1, 4, 1, 0, 7), 7, 9);
        batch.apply(&mut island, &change(40, 4, 1, 0, 7), 7, 9);
        batch.rollback_unconfirmed(&mut island, 10);

        assert_eq!(get_voxel(&island, Vector3::new(1, 4, 1)), AIR);
        assert_eq!(get_voxel(&island, Vector3::new(40, 4, 1)), AIR);
        assert_eq!(island.meta.last_modified, before.meta.last_modified);
        let dirty: Vec<&str> = island
            .chunks
            .dirty_chunks()
            .map(|c| c.chunk_id.as_str())
            .collect();
        assert_eq!(dirty.len(), 2);
        assert!(dirty.contains(&"chunk_0_0_0") && dirty.contains(&"chunk_2_0_0"));
        assert!(island.chunks.get(ChunkCoordinate::new(2, 0, 0)).unwrap().is_empty());
    }

    #[test]
    fn expand_below_required_level_adds_nothing() {
        let mut island = create_island("alice", ISLAND_START_SIZE, 1);
        let err = expand(
            &mut island,
            &blueprint(Vector3::new(16, 0, 0), &["expansion_level_2"]),
            5,
        )
        .unwrap_err();
        assert_eq!(
            err,
            ExpandError::LevelTooLow {
                required: 2,
                current: 1
            }
        );
        assert_eq!(island.chunks.len(), 8);
        assert_eq!(island.meta.expansion_level, 1);
    }

    #[test]
    fn unknown_requirement_fails_closed() {
        let mut island = create_island("alice", ISLAND_START_SIZE, 1);
        let err = expand(&mut island, &blueprint(Vector3::new(16, 0, 0), &["defeat_boss"]), 5)
            .unwrap_err();
        assert_eq!(err, ExpandError::UnknownRequirement("defeat_boss".into()));
        assert_eq!(island.chunks.len(), 8);
    }

    #[test]
    fn expand_sweeps_x_then_z() {
        let mut island = create_island("alice", ISLAND_START_SIZE, 1);
        let added = expand(
            &mut island,
            &blueprint(Vector3::new(16, 0, 16), &["expansion_level_1"]),
            5,
        )
        .unwrap();

        // X pass: x=2 across y 0..=1, z 0..=1 -> 4 chunks.
        // Z pass: z=2 across y 0..=1, x 0..=2 -> 6 chunks.
        assert_eq!(added.len(), 10);
        assert_eq!(added[0], ChunkCoordinate::new(2, 0, 0));
        assert!(added[..4].iter().all(|c| c.x == 2));
        assert!(added[4..].iter().all(|c| c.z == 2));
        assert_eq!(island.chunks.len(), 18);
        assert_eq!(island.meta.expansion_level, 2);

        let bounds = bounds_of(&island);
        assert_eq!(bounds.max, Vector3::new(47, 31, 47));
        // Existing ground untouched.
        assert_eq!(get_voxel(&island, Vector3::new(0, 3, 0)), GRASS);
    }

    #[test]
    fn expand_rounds_partial_chunks_up() {
        let mut island = create_island("alice", 16, 1);
        let added = expand(&mut island, &blueprint(Vector3::new(20, 0, 0), &[]), 5).unwrap();
        assert_eq!(
            added,
            vec![ChunkCoordinate::new(1, 0, 0), ChunkCoordinate::new(2, 0, 0)]
        );
    }

    #[test]
    fn expand_refuses_overflowing_size() {
        let mut island = create_island("alice", ISLAND_START_SIZE, 1);
        let before = island.clone();
        let err = expand(&mut island, &blueprint(Vector3::new(i32::MAX, 0, 0), &[]), 5)
            .unwrap_err();
        assert_eq!(err, ExpandError::OutOfRange);
        let err = expand(&mut island, &blueprint(Vector3::new(0, 0, i32::MAX), &[]), 5)
            .unwrap_err();
        assert_eq!(err, ExpandError::OutOfRange);
        assert_eq!(island, before);
    }

    #[test]
    fn expand_caps_chunks_per_call() {
        let mut island = create_island("alice", ISLAND_START_SIZE, 1);
        let before = island.clone();
        let err = expand(&mut island, &blueprint(Vector3::new(100_000_000, 0, 0), &[]), 5)
            .unwrap_err();
        assert!(matches!(
            err,
            ExpandError::TooLarge { limit: MAX_EXPANSION_CHUNKS, chunks } if chunks > MAX_EXPANSION_CHUNKS
        ));
        assert_eq!(island, before);

        // 64 columns across 2 chunk rows and 2 chunk layers fits.
        let added = expand(&mut island, &blueprint(Vector3::new(64 * 16, 0, 0), &[]), 5).unwrap();
        assert_eq!(added.len(), 256);
    }

    #[test]
    fn visit_rules() {
        let mut island = create_island("alice", 16, 1);
        assert!(record_visit(&mut island, "alice"));
        assert_eq!(island.meta.visit_count, 0);

        assert!(!record_visit(&mut island, "bob"));
        assert_eq!(island.meta.visit_count, 0);

        island.meta.permissions.coop_members.push("bob".into());
        assert!(record_visit(&mut island, "bob"));
        assert_eq!(island.meta.visit_count, 1);

        island.meta.permissions.is_public = true;
        assert!(record_visit(&mut island, "carol"));
        assert_eq!(island.meta.visit_count, 2);
    }

    #[test]
    fn build_permission_levels() {
        let mut island = create_island("alice", 16, 1);
        let perms = &mut island.meta.permissions.build_permissions;
        perms.insert("bob".into(), BuildPermission::Build);
        perms.insert("eve".into(), BuildPermission::View);

        assert!(can_build(&island, "alice"));
        assert!(can_build(&island, "bob"));
        assert!(!can_build(&island, "eve"));
        assert!(can_view(&island, "eve"));
        assert!(!can_view(&island, "mallory"));
    }
}
