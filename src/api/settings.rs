use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{RoomKey, RoomParams};
use crate::state::AppState;

/// Server settings routes. Every call is rate limited by its token.
pub fn settings_routes() -> Router<AppState> {
    Router::new()
        .route("/connections", post(get_connections_num))
        .route("/health", post(health_check))
        .route("/settings", post(get_server_settings))
        .route("/rooms", post(create_room))
        .route("/notify-servers", post(set_notify_server))
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionsResponse {
    pub count_conn: usize,
    pub exists: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub exists: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSettings {
    pub udp_port: u16,
    pub max_requests_per_window: u32,
    pub rate_limit_window_ms: u64,
    pub data_ttl_seconds: u64,
    pub max_connections: usize,
    pub shards: usize,
}

#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    pub settings: ServerSettings,
}

/// `{token, room_ttl_seconds?, game_configs?}`
#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    pub token: String,
    #[serde(flatten)]
    pub params: RoomParams,
}

#[derive(Debug, Deserialize)]
pub struct NotifyServerRequest {
    pub token: String,
    pub id: Uuid,
    pub url: String,
}

fn admit(state: &AppState, token: &str) -> Result<()> {
    if token.trim().is_empty() {
        return Err(AppError::BadRequest("Token is required".to_string()));
    }
    state.admin_limiter.check(token)
}

/// POST /api/v1/server-settings/connections
async fn get_connections_num(
    State(state): State<AppState>,
    Json(request): Json<TokenRequest>,
) -> Result<Json<ConnectionsResponse>> {
    admit(&state, &request.token)?;

    let (count_conn, exists) = state.relay.connection_count();
    Ok(Json(ConnectionsResponse { count_conn, exists }))
}

/// POST /api/v1/server-settings/health
async fn health_check(
    State(state): State<AppState>,
    Json(request): Json<TokenRequest>,
) -> Result<Json<HealthCheckResponse>> {
    admit(&state, &request.token)?;
    Ok(Json(HealthCheckResponse { exists: true }))
}

/// POST /api/v1/server-settings/settings
async fn get_server_settings(
    State(state): State<AppState>,
    Json(request): Json<TokenRequest>,
) -> Result<Json<SettingsResponse>> {
    admit(&state, &request.token)?;

    let config = &state.config;
    Ok(Json(SettingsResponse {
        settings: ServerSettings {
            udp_port: config.udp_port,
            max_requests_per_window: config.max_udp_requests,
            rate_limit_window_ms: config.rate_limit_window_ms,
            data_ttl_seconds: config.data_ttl_seconds,
            max_connections: config.max_connections,
            shards: config.shard_count.max(1),
        },
    }))
}

/// POST /api/v1/server-settings/rooms - Create the room named by the token
async fn create_room(
    State(state): State<AppState>,
    Json(request): Json<CreateRoomRequest>,
) -> Result<(StatusCode, Json<RoomKey>)> {
    admit(&state, &request.token)?;

    let key = state.relay.create_room(&request.token, request.params)?;
    Ok((StatusCode::CREATED, Json(key)))
}

/// POST /api/v1/server-settings/notify-servers - Link the token's room to a peer server
async fn set_notify_server(
    State(state): State<AppState>,
    Json(request): Json<NotifyServerRequest>,
) -> Result<Json<serde_json::Value>> {
    admit(&state, &request.token)?;

    state
        .relay
        .register_peer(&request.token, request.id, &request.url)
        .await?;

    Ok(Json(serde_json::json!({})))
}
