pub mod health;
pub mod settings;

use axum::Router;

use crate::state::AppState;

/// Create the API router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_routes())
        .merge(health::health_routes())
        .with_state(state)
}

/// API v1 routes
fn api_routes() -> Router<AppState> {
    Router::new().nest("/server-settings", settings::settings_routes())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::auth::AuthService;
    use crate::config::Config;
    use crate::models::TokenInfo;
    use crate::notifier::Notifier;
    use crate::ratelimit::RateLimiter;
    use crate::relay::{RelayService, RoomStore, SessionStore};
    use crate::store::TtlStore;

    fn state(admin_rate_limit: u32) -> (AppState, AuthService) {
        let mut config = Config::local("api-test-secret");
        config.admin_rate_limit = admin_rate_limit;
        config.max_connections = 5;
        let auth = AuthService::new(&config);

        let horizon = Duration::from_secs(60);
        let relay = RelayService::new(
            Arc::new(auth.clone()),
            Arc::new(SessionStore::new(horizon)),
            Arc::new(RoomStore::new(horizon)),
            Arc::new(Notifier::new()),
        )
        .with_max_connections(config.max_connections);
        let limiter = RateLimiter::new(
            config.admin_rate_limit,
            Arc::new(TtlStore::new(config.rate_limit_window())),
        );

        (AppState::new(config, relay, limiter), auth)
    }

    fn token(auth: &AuthService) -> String {
        auth.generate_token(&TokenInfo {
            game_id: Uuid::new_v4(),
            room_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            expiry: Duration::from_secs(100),
        })
        .unwrap()
    }

    async fn post(app: &Router, path: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn create_room_then_conflict() {
        let (state, auth) = state(10);
        let app = create_router(state);
        let token = token(&auth);

        let (status, body) = post(&app, "/api/v1/server-settings/rooms", json!({ "token": token })).await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body.get("gameId").is_some());
        assert!(body.get("roomId").is_some());

        let (status, _) = post(&app, "/api/v1/server-settings/rooms", json!({ "token": token })).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn create_room_accepts_params() {
        let (state, auth) = state(10);
        let relay = Arc::clone(&state.relay);
        let app = create_router(state);

        let body = json!({
            "token": token(&auth),
            "room_ttl_seconds": 30,
            "game_configs": { "mode": "duel" },
        });
        let (status, body) = post(&app, "/api/v1/server-settings/rooms", body).await;
        assert_eq!(status, StatusCode::CREATED);

        let key: crate::models::RoomKey = serde_json::from_value(body).unwrap();
        let room = relay.room(&key).expect("room stored");
        assert_eq!(room.game_configs.as_ref().unwrap()["mode"], "duel");

        let (status, _) = post(
            &app,
            "/api/v1/server-settings/rooms",
            json!({ "token": token(&auth), "room_ttl_seconds": 0 }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn invalid_token_is_unauthorized() {
        let (state, _) = state(10);
        let app = create_router(state);

        let (status, body) = post(&app, "/api/v1/server-settings/rooms", json!({ "token": "nope" })).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], 401);
    }

    #[tokio::test]
    async fn calls_are_rate_limited_per_token() {
        let (state, auth) = state(2);
        let app = create_router(state);
        let token = token(&auth);

        for _ in 0..2 {
            let (status, body) =
                post(&app, "/api/v1/server-settings/health", json!({ "token": token })).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["exists"], true);
        }
        let (status, _) = post(&app, "/api/v1/server-settings/health", json!({ "token": token })).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn connections_and_settings() {
        let (state, auth) = state(10);
        let app = create_router(state);
        let token = token(&auth);

        let (status, body) =
            post(&app, "/api/v1/server-settings/connections", json!({ "token": token })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "countConn": 0, "exists": true }));

        let (status, body) =
            post(&app, "/api/v1/server-settings/settings", json!({ "token": token })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["settings"]["maxConnections"], 5);
        assert_eq!(body["settings"]["maxRequestsPerWindow"], 200);
    }

    #[tokio::test]
    async fn notify_server_requires_room() {
        let (state, auth) = state(10);
        let app = create_router(state);
        let token = token(&auth);
        let body = json!({ "token": token, "id": Uuid::new_v4(), "url": "127.0.0.1:9" });

        let (status, _) = post(&app, "/api/v1/server-settings/notify-servers", body.clone()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        post(&app, "/api/v1/server-settings/rooms", json!({ "token": token })).await;
        let (status, _) = post(&app, "/api/v1/server-settings/notify-servers", body).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn health_needs_no_token() {
        let (state, _) = state(10);
        let app = create_router(state);

        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["maxConnections"], 5);
    }
}
