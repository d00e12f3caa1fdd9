use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::error::Result;
use crate::state::AppState;

/// Health response structure
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub connections: usize,
    pub max_connections: usize,
    pub timestamp: String,
}

/// Health routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

/// GET /health - Liveness and capacity, no token required
async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>> {
    let (connections, below_capacity) = state.relay.connection_count();

    let status = if below_capacity {
        "healthy"
    } else {
        "at_capacity"
    };

    Ok(Json(HealthResponse {
        status: status.to_string(),
        connections,
        max_connections: state.relay.max_connections(),
        timestamp: Utc::now().to_rfc3339(),
    }))
}
