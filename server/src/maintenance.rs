use std::sync::Arc;
use std::time::Duration;

use crate::service::IslandService;
use crate::sync::SyncEngine;

/// Periodically store dirty chunks and island records, then unload islands
/// that have sat untouched for `idle`.
pub async fn run_flush(islands: Arc<IslandService>, every: Duration, idle: Duration) {
    tracing::info!("Flush task started, every {:?}", every);
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let stats = islands.flush_dirty().await;
        if stats.failures > 0 {
            tracing::warn!(
                "Flush stored {} islands ({} chunks), {} failed",
                stats.islands,
                stats.chunks,
                stats.failures
            );
        } else if stats.chunks > 0 {
            tracing::info!("Flushed {} chunks across {} islands", stats.chunks, stats.islands);
        }
        let evicted = islands.evict_idle(idle).await;
        if evicted > 0 {
            tracing::info!("Unloaded {} idle islands", evicted);
        }
    }
}

/// Periodically forget players that stopped syncing.
pub async fn run_cleanup(engine: Arc<SyncEngine>, every: Duration) {
    tracing::info!("Sync state cleanup started, every {:?}", every);
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let evicted = engine.cleanup_old_states().await;
        if evicted > 0 {
            tracing::debug!("Evicted {} idle sync states", evicted);
        }
    }
}
