use std::sync::Arc;

use crate::config::Config;
use crate::ratelimit::RateLimiter;
use crate::relay::RelayService;

/// Shared state of the administrative plane
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub relay: Arc<RelayService>,
    pub admin_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(config: Config, relay: RelayService, admin_limiter: RateLimiter) -> Self {
        Self {
            config: Arc::new(config),
            relay: Arc::new(relay),
            admin_limiter: Arc::new(admin_limiter),
        }
    }
}
