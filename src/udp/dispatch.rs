//! Round-robin fan-in from the listener to the shard queues.
//!
//! Ordering caveat: shards are picked by a shared counter, not by client, so
//! consecutive datagrams from one client can be handled by different workers
//! and delivered out of order.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};

use crate::udp::Connection;

/// One datagram waiting for a worker
pub struct Inbound {
    pub sender: Arc<dyn Connection>,
    pub datagram: Vec<u8>,
}

pub struct Dispatcher {
    shards: Vec<mpsc::Sender<Inbound>>,
    next: AtomicUsize,
    capacity: usize,
}

impl Dispatcher {
    /// Build `shard_count` bounded queues of `capacity` items each.
    /// The receivers go to the workers.
    pub fn new(shard_count: usize, capacity: usize) -> (Self, Vec<mpsc::Receiver<Inbound>>) {
        let shard_count = shard_count.max(1);
        let capacity = capacity.max(1);

        let (shards, receivers): (Vec<mpsc::Sender<Inbound>>, Vec<mpsc::Receiver<Inbound>>) =
            (0..shard_count).map(|_| mpsc::channel(capacity)).unzip();

        let dispatcher = Self {
            shards,
            next: AtomicUsize::new(0),
            capacity,
        };
        (dispatcher, receivers)
    }

    /// Hand `item` to the next shard without waiting. A full or closed queue drops it.
    pub fn dispatch(&self, item: Inbound) -> bool {
        let shard = self.next_shard();
        match self.shards[shard].try_send(item) {
            Ok(()) => true,
            Err(TrySendError::Full(item)) => {
                tracing::debug!(
                    shard,
                    client = %item.sender.identity(),
                    "Shard queue full, datagram dropped"
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(shard, "Shard queue closed, datagram dropped");
                false
            }
        }
    }

    fn next_shard(&self) -> usize {
        self.next.fetch_add(1, Ordering::Relaxed) % self.shards.len()
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Items currently waiting across all shards
    pub fn queued(&self) -> usize {
        self.shards
            .iter()
            .map(|shard| self.capacity - shard.capacity())
            .sum()
    }
}
