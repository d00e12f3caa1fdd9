use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::relay::RelayService;
use crate::udp::{Dispatcher, Inbound};

/// Spawn one worker per shard receiver
pub fn spawn_workers(
    receivers: Vec<mpsc::Receiver<Inbound>>,
    service: Arc<RelayService>,
    cancel: CancellationToken,
) -> Vec<JoinHandle<()>> {
    receivers
        .into_iter()
        .enumerate()
        .map(|(shard, rx)| {
            tokio::spawn(run_worker(shard, rx, Arc::clone(&service), cancel.clone()))
        })
        .collect()
}

/// Drain one shard until cancelled. Queued items are abandoned on cancellation.
pub async fn run_worker(
    shard: usize,
    mut rx: mpsc::Receiver<Inbound>,
    service: Arc<RelayService>,
    cancel: CancellationToken,
) {
    tracing::debug!(shard, "Worker started");

    loop {
        let item = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            item = rx.recv() => match item {
                Some(item) => item,
                None => break,
            },
        };

        let client = item.sender.identity();
        if let Err(panic) = AssertUnwindSafe(handle_inbound(&service, item))
            .catch_unwind()
            .await
        {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(shard, client = %client, reason = %reason, "Panic while handling datagram");
        }
    }

    tracing::debug!(shard, "Worker stopped");
}

/// Route one datagram and write it to every recipient.
pub async fn handle_inbound(service: &RelayService, item: Inbound) {
    let route = match service.resolve_and_route(Arc::clone(&item.sender), &item.datagram) {
        Ok(route) => route,
        Err(e) => {
            tracing::warn!(client = %item.sender.identity(), error = %e, "Datagram dropped");
            return;
        }
    };

    if route.payload.is_empty() {
        return;
    }

    for user in &route.recipients {
        if let Err(e) = user.connection.send(&route.payload).await {
            tracing::warn!(
                user_id = %user.id,
                client = %user.identity(),
                error = %e,
                "Write failed, removing user"
            );
            if let Err(e) = service.remove_member(item.sender.as_ref(), user) {
                tracing::warn!(user_id = %user.id, error = %e, "Failed to remove user");
            }
        }
    }

    if !route.peer_servers.is_empty() {
        for (peer_id, e) in service.notify_peers(&route.peer_servers, &route.payload).await {
            tracing::warn!(peer_id = %peer_id, error = %e, "Peer notification failed");
        }
    }
}

/// Periodically log how many datagrams are waiting across the shards.
pub fn spawn_queue_monitor(
    dispatcher: Arc<Dispatcher>,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    tracing::info!(
                        queued = dispatcher.queued(),
                        shards = dispatcher.shard_count(),
                        "Shard queue depth"
                    );
                }
            }
        }
    })
}

/// Periodically log active connections against capacity.
pub fn spawn_capacity_monitor(
    service: Arc<RelayService>,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let (count, below_capacity) = service.connection_count();
                    tracing::info!(
                        connections = count,
                        max_connections = service.max_connections(),
                        below_capacity,
                        peer_servers = service.peer_server_count(),
                        "Connection count"
                    );
                    tracing::debug!(clients = ?service.active_connections(), "Active clients");
                }
            }
        }
    })
}
