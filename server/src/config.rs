use std::time::Duration;

use crate::island::ISLAND_START_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Valkey,
    Memory,
}

pub struct Config {
    pub valkey_url: String,
    pub listen_addr: String,
    pub storage: StorageBackend,
    pub island_start_size: i32,
    pub persist_timeout: Duration,
    pub sync_state_retention: Duration,
    pub sync_state_capacity: usize,
    pub flush_interval: Duration,
    pub cleanup_interval: Duration,
    pub island_idle: Duration,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring unparseable {}={:?}", key, raw);
            default
        }),
        Err(_) => default,
    }
}

/// Seconds between maintenance ticks. Never zero, since a zero period
/// cannot drive an interval timer.
fn interval_secs(key: &str, default: u64) -> Duration {
    let secs: u64 = env_or(key, default);
    if secs == 0 {
        tracing::warn!("{}=0 is not a valid interval, using 1s", key);
        return Duration::from_secs(1);
    }
    Duration::from_secs(secs)
}

impl Config {
    pub fn from_env() -> Self {
        let storage = match std::env::var("STORAGE_BACKEND").as_deref() {
            Ok("memory") => StorageBackend::Memory,
            Ok("valkey") | Err(_) => StorageBackend::Valkey,
            Ok(other) => {
                tracing::warn!("Unknown STORAGE_BACKEND {:?}, using valkey", other);
                StorageBackend::Valkey
            }
        };
        Self {
            valkey_url: std::env::var("VALKEY_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".into()),
            listen_addr: std::env::var("LISTEN_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:3000".into()),
            storage,
            island_start_size: env_or("ISLAND_START_SIZE", ISLAND_START_SIZE),
            persist_timeout: Duration::from_millis(env_or("PERSIST_TIMEOUT_MS", 5_000)),
            sync_state_retention: Duration::from_secs(env_or("SYNC_STATE_RETENTION_SECS", 3_600)),
            sync_state_capacity: env_or("SYNC_STATE_CAPACITY", 10_000),
            flush_interval: interval_secs("FLUSH_INTERVAL_SECS", 30),
            cleanup_interval: interval_secs("CLEANUP_INTERVAL_SECS", 300),
            island_idle: Duration::from_secs(env_or("ISLAND_IDLE_SECS", 600)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_interval_is_clamped() {
        std::env::set_var("ISLAND_TEST_ZERO_INTERVAL_SECS", "0");
        assert_eq!(
            interval_secs("ISLAND_TEST_ZERO_INTERVAL_SECS", 30),
            Duration::from_secs(1)
        );
        std::env::set_var("ISLAND_TEST_SET_INTERVAL_SECS", "12");
        assert_eq!(
            interval_secs("ISLAND_TEST_SET_INTERVAL_SECS", 30),
            Duration::from_secs(12)
        );
        assert_eq!(
            interval_secs("ISLAND_TEST_UNSET_INTERVAL_SECS", 30),
            Duration::from_secs(30)
        );
    }
}
