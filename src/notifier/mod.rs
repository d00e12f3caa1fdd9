//! Outbound links to sibling relay instances.
//!
//! Payloads are forwarded as the exact datagram bytes, with no extra framing
//! or encoding. A receiving peer applies its own room broadcast logic.

use std::net::SocketAddr;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::net::{lookup_host, UdpSocket};
use uuid::Uuid;

use crate::error::{AppError, Result};

/// Open outbound socket to one peer server
#[derive(Debug)]
pub struct PeerLink {
    pub id: Uuid,
    pub address: String,
    socket: UdpSocket,
}

impl PeerLink {
    /// Resolve `address` and dial it
    pub async fn connect(id: Uuid, address: &str) -> Result<Self> {
        let target = resolve(address).await?;
        let bind_addr: SocketAddr = if target.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };

        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(target).await?;

        Ok(Self {
            id,
            address: address.to_string(),
            socket,
        })
    }

    pub async fn send(&self, payload: &[u8]) -> Result<()> {
        self.socket.send(payload).await?;
        Ok(())
    }

    pub fn peer_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.peer_addr()?)
    }
}

async fn resolve(address: &str) -> Result<SocketAddr> {
    lookup_host(address)
        .await
        .map_err(|e| AppError::PeerInvalid(format!("{}: {}", address, e)))?
        .next()
        .ok_or_else(|| AppError::PeerInvalid(format!("{} did not resolve", address)))
}

/// Registry of peer links, keyed by peer server id
#[derive(Debug, Default)]
pub struct Notifier {
    peers: DashMap<Uuid, Arc<PeerLink>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dial `address` and register it under `id`, closing any previous link for `id`.
    pub async fn register(&self, id: Uuid, address: &str) -> Result<()> {
        let link = PeerLink::connect(id, address).await?;

        match self.peers.insert(id, Arc::new(link)) {
            Some(old) => tracing::info!(
                peer_id = %id,
                old_address = %old.address,
                address = %address,
                "Peer server re-registered"
            ),
            None => tracing::info!(peer_id = %id, address = %address, "Peer server registered"),
        }

        Ok(())
    }

    /// Write `payload` to every registered peer in `ids`.
    ///
    /// A failed write gets one reconnect and one retry. A peer that still fails
    /// is evicted and reported; the remaining peers are attempted regardless.
    pub async fn notify(&self, ids: &[Uuid], payload: &[u8]) -> Vec<(Uuid, AppError)> {
        let mut failures = Vec::new();

        for id in ids {
            let link = match self.peers.get(id) {
                Some(link) => Arc::clone(link.value()),
                None => continue,
            };

            let Err(first) = link.send(payload).await else {
                continue;
            };
            tracing::debug!(peer_id = %id, error = %first, "Peer write failed, reconnecting");

            match self.reconnect_and_send(&link, payload).await {
                Ok(()) => {}
                Err(e) => {
                    self.evict(id, &link);
                    failures.push((*id, e));
                }
            }
        }

        failures
    }

    async fn reconnect_and_send(&self, stale: &Arc<PeerLink>, payload: &[u8]) -> Result<()> {
        let fresh = Arc::new(PeerLink::connect(stale.id, &stale.address).await?);
        fresh.send(payload).await?;

        // Keep a concurrent re-registration if one replaced the stale link meanwhile.
        if let Some(mut current) = self.peers.get_mut(&stale.id) {
            if Arc::ptr_eq(current.value(), stale) {
                *current = fresh;
            }
        }
        Ok(())
    }

    fn evict(&self, id: &Uuid, stale: &Arc<PeerLink>) {
        if self
            .peers
            .remove_if(id, |_, current| Arc::ptr_eq(current, stale))
            .is_some()
        {
            tracing::warn!(peer_id = %id, address = %stale.address, "Peer server evicted");
        }
    }

    pub fn remove(&self, id: &Uuid) -> Result<()> {
        self.peers
            .remove(id)
            .map(|_| ())
            .ok_or(AppError::PeerNotFound)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
