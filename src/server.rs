use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api;
use crate::auth::AuthService;
use crate::config::Config;
use crate::error::Result;
use crate::notifier::Notifier;
use crate::ratelimit::{CounterStore, RateLimiter};
use crate::relay::{HandshakeRetry, RelayService, RoomStore, SessionStore};
use crate::state::AppState;
use crate::udp::worker::spawn_capacity_monitor;
use crate::udp::UdpListener;

/// A bound relay: the UDP data plane plus the HTTP admin plane.
pub struct RelayServer {
    state: AppState,
    udp: UdpListener,
    admin: TcpListener,
    cancel: CancellationToken,
    background: Vec<JoinHandle<()>>,
}

impl RelayServer {
    /// Bind both sockets and start the store sweepers.
    /// Everything stops once `cancel` fires.
    pub async fn bind(config: Config, cancel: CancellationToken) -> Result<Self> {
        let auth = Arc::new(AuthService::new(&config));
        let sessions = Arc::new(SessionStore::new(config.data_ttl()));
        let rooms = Arc::new(RoomStore::new(config.data_ttl()));
        let counters = Arc::new(CounterStore::new(config.rate_limit_window()));

        let handshake_retry =
            HandshakeRetry::with_lengths(config.handshake_retry_lengths.iter().copied());
        if !handshake_retry.is_disabled() {
            tracing::info!(lengths = ?config.handshake_retry_lengths, "Handshake retry enabled");
        }

        let relay = RelayService::new(
            auth,
            Arc::clone(&sessions),
            Arc::clone(&rooms),
            Arc::new(Notifier::new()),
        )
        .with_handshake_retry(handshake_retry)
        .with_max_connections(config.max_connections);

        let udp_limiter = RateLimiter::new(config.max_udp_requests, Arc::clone(&counters));
        let admin_limiter = RateLimiter::new(config.admin_rate_limit, Arc::clone(&counters));

        let udp = UdpListener::bind(
            &config.udp_addr(),
            udp_limiter,
            config.shard_count,
            config.max_udp_requests as usize,
        )
        .await?;
        let admin = TcpListener::bind(config.admin_addr()).await.map_err(|e| {
            tracing::error!(address = %config.admin_addr(), error = %e, "Failed to bind admin listener");
            e
        })?;

        let every = config.sweep_interval();
        let background = vec![
            sessions.spawn_sweeper("sessions", every, cancel.clone()),
            rooms.spawn_sweeper("rooms", every, cancel.clone()),
            counters.spawn_sweeper("rate_limits", every, cancel.clone()),
        ];

        Ok(Self {
            state: AppState::new(config, relay, admin_limiter),
            udp,
            admin,
            cancel,
            background,
        })
    }

    pub fn udp_addr(&self) -> Result<SocketAddr> {
        self.udp.local_addr()
    }

    pub fn admin_addr(&self) -> Result<SocketAddr> {
        Ok(self.admin.local_addr()?)
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Serve until cancelled or until the UDP socket fails.
    pub async fn run(self) -> Result<()> {
        let Self {
            state,
            mut udp,
            admin,
            cancel,
            mut background,
        } = self;

        let report_every = state.config.queue_report_interval();
        background.extend(udp.start_workers(
            Arc::clone(&state.relay),
            report_every,
            cancel.clone(),
        ));
        background.push(spawn_capacity_monitor(
            Arc::clone(&state.relay),
            report_every,
            cancel.clone(),
        ));

        let app = api::create_router(state)
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
            .layer(TraceLayer::new_for_http());

        tracing::info!(address = %admin.local_addr()?, "Admin server listening");
        let shutdown = cancel.clone();
        let admin_task = tokio::spawn(async move {
            axum::serve(admin, app)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await
        });

        let outcome = udp.listen(cancel.clone()).await;
        cancel.cancel();

        match admin_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "Admin server failed"),
            Err(e) => tracing::error!(error = %e, "Admin server task panicked"),
        }
        for task in background {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Background task ended abnormally");
            }
        }

        tracing::info!("Relay server stopped");
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn binds_ephemeral_ports_and_stops_on_cancel() {
        let cancel = CancellationToken::new();
        let server = RelayServer::bind(Config::local("server-test-secret"), cancel.clone())
            .await
            .unwrap();

        assert_ne!(server.udp_addr().unwrap().port(), 0);
        assert_ne!(server.admin_addr().unwrap().port(), 0);
        assert_eq!(server.state().relay.connection_count(), (0, true));

        let task = tokio::spawn(server.run());
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("server did not stop")
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn bind_fails_on_taken_admin_port() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut config = Config::local("server-test-secret");
        config.admin_port = taken.local_addr().unwrap().port();

        let result = RelayServer::bind(config, CancellationToken::new()).await;
        assert!(result.is_err());
    }
}
