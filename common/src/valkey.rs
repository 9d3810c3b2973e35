/// Valkey sorted set of public island ids scored by creation time.
pub const PUBLIC_ISLANDS: &str = "public_islands";

/// Most recent applied changes kept per island.
pub const CHANGE_LOG_LIMIT: isize = 1000;

/// Build the Valkey key for an island record (JSON).
pub fn island_key(island_id: &str) -> String {
    format!("island:{island_id}")
}

/// Build the Valkey key mapping an owner to their island id.
pub fn owner_key(owner_id: &str) -> String {
    format!("island_owner:{owner_id}")
}

/// Build the Valkey key for an island's chunk hash (chunk id -> RLE blob).
pub fn chunks_key(island_id: &str) -> String {
    format!("island_chunks:{island_id}")
}

/// Build the Valkey key for an island's chunk timestamp hash (chunk id -> last modified ms).
pub fn chunk_ts_key(island_id: &str) -> String {
    format!("island_chunk_ts:{island_id}")
}

/// Build the Valkey key for the set of dirty chunk ids of an island.
pub fn dirty_key(island_id: &str) -> String {
    format!("island_dirty:{island_id}")
}

/// Build the Valkey key for an island's applied change log.
pub fn changes_key(island_id: &str) -> String {
    format!("island_changes:{island_id}")
}
