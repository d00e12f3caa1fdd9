pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod notifier;
pub mod ratelimit;
pub mod relay;
pub mod server;
pub mod state;
pub mod store;
pub mod udp;

pub use config::Config;
pub use error::{AppError, Result};
pub use server::RelayServer;
pub use state::AppState;
