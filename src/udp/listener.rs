use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::ratelimit::RateLimiter;
use crate::relay::RelayService;
use crate::udp::worker::{spawn_queue_monitor, spawn_workers};
use crate::udp::{Dispatcher, Inbound, UdpConnection};

const BUFFER_SIZE: usize = 4096;

/// Owner of the listening socket
pub struct UdpListener {
    socket: Arc<UdpSocket>,
    limiter: RateLimiter,
    dispatcher: Arc<Dispatcher>,
    receivers: Vec<mpsc::Receiver<Inbound>>,
}

impl UdpListener {
    /// Bind `addr` and build `shard_count` queues of `queue_capacity` items.
    pub async fn bind(
        addr: &str,
        limiter: RateLimiter,
        shard_count: usize,
        queue_capacity: usize,
    ) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await.map_err(|e| {
            tracing::error!(address = %addr, error = %e, "Failed to bind UDP socket");
            e
        })?;
        let (dispatcher, receivers) = Dispatcher::new(shard_count, queue_capacity);

        tracing::info!(
            address = %socket.local_addr()?,
            shards = dispatcher.shard_count(),
            queue_capacity = dispatcher.capacity(),
            "UDP listener bound"
        );

        Ok(Self {
            socket: Arc::new(socket),
            limiter,
            dispatcher: Arc::new(dispatcher),
            receivers,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(&self.dispatcher)
    }

    /// Start one worker per shard plus the queue-depth monitor.
    /// Only the first call has receivers to hand out.
    pub fn start_workers(
        &mut self,
        service: Arc<RelayService>,
        report_every: Duration,
        cancel: CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        let receivers = std::mem::take(&mut self.receivers);
        if receivers.is_empty() {
            return Vec::new();
        }

        let mut handles = spawn_workers(receivers, service, cancel.clone());
        handles.push(spawn_queue_monitor(self.dispatcher(), report_every, cancel));
        handles
    }

    /// Read datagrams until `cancel` fires or the socket fails for good.
    pub async fn listen(self, cancel: CancellationToken) -> Result<()> {
        let mut buffer = vec![0u8; BUFFER_SIZE];

        loop {
            let (len, addr) = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("UDP listener shutting down");
                    break;
                }
                received = self.socket.recv_from(&mut buffer) => match received {
                    Ok(received) => received,
                    Err(e) if is_fatal(&e) => {
                        tracing::error!(error = %e, "UDP socket failed");
                        return Err(e.into());
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "UDP read failed");
                        continue;
                    }
                },
            };

            self.accept(addr, &buffer[..len]);
        }

        Ok(())
    }

    /// Filter one datagram and queue it. False when it was discarded.
    pub fn accept(&self, addr: SocketAddr, datagram: &[u8]) -> bool {
        if self.limiter.is_limited(&addr.to_string()) {
            tracing::trace!(client = %addr, "Rate limited");
            return false;
        }

        if datagram.is_empty() {
            return false;
        }

        self.dispatcher.dispatch(Inbound {
            sender: Arc::new(UdpConnection::new(addr, &self.socket)),
            datagram: datagram.to_vec(),
        })
    }
}

fn is_fatal(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::InvalidInput
            | io::ErrorKind::NotConnected
            | io::ErrorKind::Unsupported
            | io::ErrorKind::OutOfMemory
    )
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::auth::AuthService;
    use crate::config::Config;
    use crate::models::TokenInfo;
    use crate::notifier::Notifier;
    use crate::relay::{RoomStore, SessionStore};
    use crate::store::TtlStore;

    fn limiter(max: u32) -> RateLimiter {
        RateLimiter::new(max, Arc::new(TtlStore::new(Duration::from_secs(10))))
    }

    #[tokio::test]
    async fn accept_applies_rate_limit_and_drops_empty() {
        let listener = UdpListener::bind("127.0.0.1:0", limiter(2), 1, 16)
            .await
            .unwrap();
        let client: SocketAddr = "127.0.0.1:5555".parse().unwrap();
        let other: SocketAddr = "127.0.0.1:5556".parse().unwrap();

        assert!(listener.accept(client, b"one"));
        assert!(!listener.accept(client, b""));
        assert!(!listener.accept(client, b"three"));
        assert!(listener.accept(other, b"one"));
        assert_eq!(listener.dispatcher().queued(), 2);
    }

    #[tokio::test]
    async fn listen_stops_on_cancel() {
        let listener = UdpListener::bind("127.0.0.1:0", limiter(10), 1, 16)
            .await
            .unwrap();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(listener.listen(cancel.clone()));

        cancel.cancel();
        let result = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("listener did not stop")
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn handshake_over_the_socket() {
        let config = Config::local("listener-test-secret");
        let auth = Arc::new(AuthService::new(&config));
        let horizon = Duration::from_secs(60);
        let service = Arc::new(RelayService::new(
            Arc::clone(&auth),
            Arc::new(SessionStore::new(horizon)),
            Arc::new(RoomStore::new(horizon)),
            Arc::new(Notifier::new()),
        ));

        let mut listener = UdpListener::bind("127.0.0.1:0", limiter(100), 2, 16)
            .await
            .unwrap();
        let server_addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let workers = listener.start_workers(service, Duration::from_secs(60), cancel.clone());
        assert_eq!(workers.len(), 3);
        assert!(listener
            .start_workers(
                Arc::new(RelayService::new(
                    Arc::clone(&auth),
                    Arc::new(SessionStore::new(horizon)),
                    Arc::new(RoomStore::new(horizon)),
                    Arc::new(Notifier::new()),
                )),
                Duration::from_secs(60),
                cancel.clone(),
            )
            .is_empty());
        let task = tokio::spawn(listener.listen(cancel.clone()));

        let user_id = Uuid::new_v4();
        let token = auth
            .generate_token(&TokenInfo {
                game_id: Uuid::new_v4(),
                room_id: Uuid::new_v4(),
                user_id,
                expiry: Duration::from_secs(100),
            })
            .unwrap();

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(token.as_bytes(), server_addr).await.unwrap();

        let mut buf = [0u8; 128];
        let (n, _) = tokio::time::timeout(Duration::from_secs(2), client.recv_from(&mut buf))
            .await
            .expect("no handshake reply")
            .unwrap();
        assert_eq!(&buf[..n], user_id.to_string().as_bytes());

        cancel.cancel();
        task.await.unwrap().unwrap();
        for worker in workers {
            worker.await.unwrap();
        }
    }
}
