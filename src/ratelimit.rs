//! Fixed-window request limiter backed by a time-bounded store.
//!
//! The counter for a key lives in a store whose horizon is the window, so the
//! count resets on its own once the entry expires.

use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::store::TtlStore;

pub type CounterStore = TtlStore<String, u32>;

#[derive(Debug, Clone)]
pub struct RateLimiter {
    max_requests: u32,
    counters: Arc<CounterStore>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, counters: Arc<CounterStore>) -> Self {
        Self {
            max_requests,
            counters,
        }
    }

    /// Count one request for `key`. True once the window's count exceeds the maximum.
    pub fn is_limited(&self, key: &str) -> bool {
        let count = self
            .counters
            .update_or_insert(key.to_string(), 1, |count| *count = count.saturating_add(1));
        count > self.max_requests
    }

    /// `is_limited` as an error, for callers that surface rejections.
    pub fn check(&self, key: &str) -> Result<()> {
        if self.is_limited(key) {
            tracing::debug!(key = %key, max = self.max_requests, "Rate limit exceeded");
            return Err(AppError::TooManyRequests);
        }
        Ok(())
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }
}
