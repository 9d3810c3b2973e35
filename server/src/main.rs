mod api;
mod broadcast;
mod config;
mod error;
mod island;
mod maintenance;
mod persistence;
mod service;
mod sync;
mod ws;

use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::broadcast::{BroadcastPort, ConnectionHub};
use crate::config::StorageBackend;
use crate::persistence::{InMemoryIslandRepository, IslandRepository, ValkeyIslandRepository};

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    let mut sigterm =
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                tracing::warn!("Failed to register SIGTERM handler: {}", e);
                let _ = ctrl_c.await;
                tracing::info!("Received SIGINT, shutting down...");
                return;
            }
        };
    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, shutting down..."),
        _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down..."),
    }
}

async fn open_repository(config: &config::Config) -> anyhow::Result<Arc<dyn IslandRepository>> {
    match config.storage {
        StorageBackend::Valkey => {
            let valkey_client = redis::Client::open(config.valkey_url.as_str())?;
            let valkey_con = valkey_client.get_multiplexed_async_connection().await?;
            tracing::info!("Using Valkey storage at {}", config.valkey_url);
            Ok(Arc::new(ValkeyIslandRepository::new(valkey_con)))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; islands are lost on restart");
            Ok(Arc::new(InMemoryIslandRepository::new()))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("island_server=info".parse()?),
        )
        .init();

    let config = config::Config::from_env();
    tracing::info!("Starting server on {}", config.listen_addr);

    let repo = open_repository(&config).await?;
    let hub = Arc::new(ConnectionHub::new());
    let islands = Arc::new(service::IslandService::new(
        repo,
        config.island_start_size,
        config.persist_timeout,
    ));
    let engine = Arc::new(sync::SyncEngine::new(
        islands.clone(),
        Some(hub.clone() as Arc<dyn BroadcastPort>),
        config.sync_state_capacity,
        config.sync_state_retention,
    ));

    // Start maintenance tasks
    tokio::spawn(maintenance::run_flush(
        islands.clone(),
        config.flush_interval,
        config.island_idle,
    ));
    tokio::spawn(maintenance::run_cleanup(engine.clone(), config.cleanup_interval));

    let state = api::AppState {
        islands: islands.clone(),
        engine,
        hub,
    };
    let app = api::router(state).layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    tracing::info!("Server listening on {}", config.listen_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let stats = islands.flush_dirty().await;
    tracing::info!(
        "Final flush stored {} chunks ({} failures). Server stopped.",
        stats.chunks,
        stats.failures
    );
    Ok(())
}
