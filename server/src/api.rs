use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use island_common::coords::parse_chunk_id;
use island_common::{IslandBlueprint, PlayerId, SyncRequest, VoxelChange};
use serde::Deserialize;
use std::sync::Arc;

use crate::broadcast::ConnectionHub;
use crate::error::ServiceError;
use crate::service::IslandService;
use crate::sync::SyncEngine;
use crate::ws;

const DEFAULT_PAGE: usize = 20;
const MAX_PAGE: usize = 100;

#[derive(Clone)]
pub struct AppState {
    pub islands: Arc<IslandService>,
    pub engine: Arc<SyncEngine>,
    pub hub: Arc<ConnectionHub>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/sync", post(synchronize))
        .route("/api/sync/validate", post(validate))
        .route("/api/sync/{player_id}/force", post(force_sync))
        .route("/api/islands/public", get(public_islands))
        .route("/api/islands/{id}", post(get_or_create_island))
        .route("/api/islands/{id}/expand", post(expand_island))
        .route("/api/islands/{id}/visit", post(visit_island))
        .route("/api/islands/{id}/chunks/{chunk_id}", get(get_chunk))
        .route("/api/health", get(health))
        .route("/ws", get(ws_upgrade))
        .with_state(state)
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServiceError::NotFound => StatusCode::NOT_FOUND,
            ServiceError::PermissionDenied { .. } => StatusCode::FORBIDDEN,
            ServiceError::Expand(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::Persistence(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        };
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

async fn synchronize(
    State(state): State<AppState>,
    Json(request): Json<SyncRequest>,
) -> impl IntoResponse {
    Json(state.engine.synchronize_state(request).await)
}

async fn force_sync(
    State(state): State<AppState>,
    Path(player_id): Path<String>,
) -> impl IntoResponse {
    Json(state.engine.force_synchronization(&player_id).await)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidateBody {
    player_id: PlayerId,
    #[serde(default)]
    changes: Vec<VoxelChange>,
}

async fn validate(
    State(state): State<AppState>,
    Json(body): Json<ValidateBody>,
) -> impl IntoResponse {
    Json(
        state
            .engine
            .validate_client_changes(&body.player_id, &body.changes)
            .await,
    )
}

async fn get_or_create_island(
    State(state): State<AppState>,
    Path(owner_id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let handle = state.islands.get_or_create_island(&owner_id).await?;
    let summary = island_common::IslandSummary::from(&*handle.read().await);
    Ok(Json(summary))
}

#[derive(Deserialize)]
struct PageQuery {
    limit: Option<usize>,
    offset: Option<usize>,
}

async fn public_islands(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let limit = page.limit.unwrap_or(DEFAULT_PAGE).min(MAX_PAGE);
    let offset = page.offset.unwrap_or(0);
    Ok(Json(state.islands.list_public(limit, offset).await?))
}

async fn expand_island(
    State(state): State<AppState>,
    Path(island_id): Path<String>,
    Json(blueprint): Json<IslandBlueprint>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(Json(state.islands.expand_island(&island_id, &blueprint).await?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VisitBody {
    visitor_id: PlayerId,
}

async fn visit_island(
    State(state): State<AppState>,
    Path(island_id): Path<String>,
    Json(body): Json<VisitBody>,
) -> Result<impl IntoResponse, ServiceError> {
    Ok(Json(state.islands.visit(&island_id, &body.visitor_id).await?))
}

/// Raw RLE bytes of one chunk, for clients that stream terrain outside sync.
async fn get_chunk(
    State(state): State<AppState>,
    Path((island_id, chunk_id)): Path<(String, String)>,
) -> Result<Response, ServiceError> {
    let Some(coord) = parse_chunk_id(&chunk_id) else {
        return Ok(StatusCode::NOT_FOUND.into_response());
    };
    let handle = state
        .islands
        .island_by_id(&island_id)
        .await?
        .ok_or(ServiceError::NotFound)?;

    let (blob, last_modified) = {
        let island = handle.read().await;
        match island.chunks.get(coord) {
            Some(chunk) => (chunk.to_rle(), chunk.last_modified),
            None => return Ok(StatusCode::NOT_FOUND.into_response()),
        }
    };

    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::HeaderName::from_static("x-last-modified"),
                last_modified.to_string(),
            ),
            (
                header::CACHE_CONTROL,
                "no-cache, must-revalidate".to_string(),
            ),
        ],
        blob,
    )
        .into_response())
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "loaded_islands": state.islands.loaded_count().await,
        "connected_players": state.hub.connected_count().await,
    }))
}

#[derive(Deserialize)]
struct WsQuery {
    player_id: PlayerId,
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws::handle_socket(socket, state.hub, query.player_id))
}
