//! Time-bounded key/value store.
//!
//! Every entry expires one horizon after it was written (or last touched).
//! Reads treat expired entries as absent and drop them; a background sweeper
//! removes the ones nobody reads again.

use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
struct Slot<V> {
    value: V,
    expires_at: Instant,
    ttl: Duration,
}

impl<V> Slot<V> {
    fn new(value: V, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
            ttl,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }
}

/// Concurrent map with a per-instance expiry horizon
#[derive(Debug)]
pub struct TtlStore<K, V>
where
    K: Eq + Hash,
{
    entries: DashMap<K, Slot<V>>,
    connections: DashMap<String, Instant>,
    horizon: Duration,
}

impl<K, V> TtlStore<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(horizon: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            connections: DashMap::new(),
            horizon,
        }
    }

    pub fn horizon(&self) -> Duration {
        self.horizon
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(slot) if !slot.is_expired(now) => return Some(slot.value.clone()),
            Some(_) => {}
            None => return None,
        }

        self.entries.remove_if(key, |_, slot| slot.is_expired(now));
        None
    }

    /// Insert or overwrite. The entry gets a fresh expiry.
    pub fn set(&self, key: K, value: V) {
        self.entries.insert(key, Slot::new(value, self.horizon));
    }

    /// Insert only when no live entry exists. Returns false if one does.
    pub fn insert_if_absent(&self, key: K, value: V) -> bool {
        self.insert_if_absent_with_ttl(key, value, self.horizon)
    }

    /// Like `insert_if_absent`, but the entry lives for `ttl` instead of the
    /// store horizon, including on later `touch` calls.
    pub fn insert_if_absent_with_ttl(&self, key: K, value: V, ttl: Duration) -> bool {
        let now = Instant::now();
        match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().is_expired(now) {
                    return false;
                }
                occupied.insert(Slot::new(value, ttl));
                true
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Slot::new(value, ttl));
                true
            }
        }
    }

    /// Return the live value for `key`, creating it with `make` if absent or expired.
    pub fn get_or_insert_with(&self, key: K, make: impl FnOnce() -> V) -> V {
        let now = Instant::now();
        match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(Slot::new(make(), self.horizon));
                }
                occupied.get().value.clone()
            }
            Entry::Vacant(vacant) => vacant.insert(Slot::new(make(), self.horizon)).value.clone(),
        }
    }

    /// Apply `update` to a live value in place, or start a new entry from `initial`.
    /// The expiry of a live entry is left untouched.
    pub fn update_or_insert(&self, key: K, initial: V, update: impl FnOnce(&mut V)) -> V {
        let now = Instant::now();
        match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(Slot::new(initial, self.horizon));
                } else {
                    update(&mut occupied.get_mut().value);
                }
                occupied.get().value.clone()
            }
            Entry::Vacant(vacant) => vacant.insert(Slot::new(initial, self.horizon)).value.clone(),
        }
    }

    /// Push a live entry's expiry one lifetime into the future.
    pub fn touch(&self, key: &K) -> bool {
        let now = Instant::now();
        match self.entries.get_mut(key) {
            Some(mut slot) if !slot.is_expired(now) => {
                slot.expires_at = now + slot.ttl;
                true
            }
            _ => false,
        }
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        self.entries
            .remove(key)
            .filter(|(_, slot)| !slot.is_expired(now))
            .map(|(_, slot)| slot.value)
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|slot| !slot.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record an active connection for capacity reporting. Does not affect entry expiry.
    pub fn track_connection(&self, key: impl Into<String>) {
        self.connections
            .insert(key.into(), Instant::now() + self.horizon);
    }

    /// Keep a tracked connection counted for another horizon. False if it already lapsed.
    pub fn touch_connection(&self, key: &str) -> bool {
        let now = Instant::now();
        match self.connections.get_mut(key) {
            Some(mut expires_at) if *expires_at > now => {
                *expires_at = now + self.horizon;
                true
            }
            _ => false,
        }
    }

    pub fn count_active(&self) -> usize {
        let now = Instant::now();
        self.connections
            .iter()
            .filter(|entry| *entry.value() > now)
            .count()
    }

    pub fn list_active_connections(&self) -> Vec<String> {
        let now = Instant::now();
        self.connections
            .iter()
            .filter(|entry| *entry.value() > now)
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Drop every expired entry and connection. Returns how many entries were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, slot| !slot.is_expired(now));
        self.connections.retain(|_, expires_at| *expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    /// Run `sweep` every `every` until `cancel` fires.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        name: &'static str,
        every: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!(store = name, "Store sweeper stopped");
                        break;
                    }
                    _ = interval.tick() => {
                        let removed = store.sweep();
                        if removed > 0 {
                            tracing::trace!(store = name, removed, "Expired entries swept");
                        }
                    }
                }
            }
        })
    }
}
