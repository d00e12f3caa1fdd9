use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub admin_port: u16,
    pub udp_port: u16,
    pub token_secret: String,
    pub token_expiry_seconds: u64,
    pub max_udp_requests: u32,
    pub admin_rate_limit: u32,
    pub rate_limit_window_ms: u64,
    pub data_ttl_seconds: u64,
    pub sweep_interval_ms: u64,
    pub max_connections: usize,
    pub shard_count: usize,
    pub handshake_retry_lengths: Vec<usize>,
    pub queue_report_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Config {
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            admin_port: env::var("ADMIN_PORT")
                .unwrap_or_else(|_| "8081".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidPort("ADMIN_PORT"))?,
            udp_port: env::var("UDP_PORT")
                .unwrap_or_else(|_| "4500".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidPort("UDP_PORT"))?,
            token_secret: env::var("TOKEN_SECRET").map_err(|_| ConfigError::MissingTokenSecret)?,
            token_expiry_seconds: parse_or("TOKEN_EXPIRY_SECONDS", 3600)?,
            max_udp_requests: parse_or("MAX_UDP_REQUESTS", 200)?,
            admin_rate_limit: parse_or("ADMIN_RATE_LIMIT", 10)?,
            rate_limit_window_ms: parse_or("RATE_LIMIT_WINDOW_MS", 1000)?,
            data_ttl_seconds: parse_or("DATA_TTL_SECONDS", 300)?,
            sweep_interval_ms: parse_or("SWEEP_INTERVAL_MS", 1000)?,
            max_connections: parse_or("MAX_CONNECTIONS", 10_000)?,
            shard_count: parse_or("SHARD_COUNT", default_shard_count())?,
            handshake_retry_lengths: env::var("HANDSHAKE_RETRY_LENGTHS")
                .map(|raw| parse_lengths(&raw))
                .unwrap_or_else(|_| Ok(Vec::new()))?,
            queue_report_interval_secs: parse_or("QUEUE_REPORT_INTERVAL_SECS", 1)?,
        })
    }

    /// Defaults suitable for local runs and tests. Binds ephemeral ports on loopback.
    pub fn local(token_secret: impl Into<String>) -> Self {
        Self {
            server_host: "127.0.0.1".to_string(),
            admin_port: 0,
            udp_port: 0,
            token_secret: token_secret.into(),
            token_expiry_seconds: 3600,
            max_udp_requests: 200,
            admin_rate_limit: 10,
            rate_limit_window_ms: 1000,
            data_ttl_seconds: 300,
            sweep_interval_ms: 1000,
            max_connections: 10_000,
            shard_count: default_shard_count(),
            handshake_retry_lengths: Vec::new(),
            queue_report_interval_secs: 1,
        }
    }

    pub fn admin_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.admin_port)
    }

    pub fn udp_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.udp_port)
    }

    pub fn data_ttl(&self) -> Duration {
        Duration::from_secs(self.data_ttl_seconds)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_millis(self.rate_limit_window_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(1))
    }

    pub fn queue_report_interval(&self) -> Duration {
        Duration::from_secs(self.queue_report_interval_secs.max(1))
    }
}

fn default_shard_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key,
            value: raw.clone(),
        }),
        Err(_) => Ok(default),
    }
}

fn parse_lengths(raw: &str) -> Result<Vec<usize>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse().map_err(|_| ConfigError::InvalidValue {
                key: "HANDSHAKE_RETRY_LENGTHS",
                value: raw.to_string(),
            })
        })
        .collect()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid port in {0}")]
    InvalidPort(&'static str),
    #[error("TOKEN_SECRET environment variable is required")]
    MissingTokenSecret,
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_retry_lengths() {
        assert_eq!(parse_lengths("12, 24,,36").unwrap(), vec![12, 24, 36]);
        assert!(parse_lengths("").unwrap().is_empty());
        assert!(parse_lengths("12,abc").is_err());
    }

    #[test]
    fn local_config_uses_ephemeral_ports() {
        let config = Config::local("secret");
        assert_eq!(config.udp_addr(), "127.0.0.1:0");
        assert_eq!(config.admin_addr(), "127.0.0.1:0");
        assert_eq!(config.rate_limit_window(), Duration::from_secs(1));
        assert!(config.shard_count >= 1);
    }
}
