//! Runtime configuration for the queue, registry and worker pool.
//!
//! Environment variables: `WORKER_ID`, `REDIS_HOST`, `REDIS_PORT`,
//! `HEARTBEAT_INTERVAL`, plus the queue/pool knobs a deployed worker
//! process needs.

use crate::error::ConfigError;
use std::time::Duration;

/// Configuration shared by the CLI's `worker` and `batch` subcommands.
#[derive(Debug, Clone)]
pub struct Config {
    /// Worker id; defaults to `worker-{random hex}` if unset.
    pub worker_id: String,
    pub redis_host: String,
    pub redis_port: u16,
    pub queue_name: String,
    pub max_retries: u32,
    pub processing_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
    pub recovery_interval: Duration,
    pub num_workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", uuid::Uuid::new_v4().simple()),
            redis_host: "localhost".to_string(),
            redis_port: 6379,
            queue_name: "image_processing_v2".to_string(),
            max_retries: 3,
            processing_timeout: Duration::from_secs(300),
            heartbeat_interval: Duration::from_secs(10),
            heartbeat_timeout: Duration::from_secs(30),
            recovery_interval: Duration::from_secs(30),
            num_workers: 4,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = worker_id.into();
        self
    }

    pub fn with_redis(mut self, host: impl Into<String>, port: u16) -> Self {
        self.redis_host = host.into();
        self.redis_port = port;
        self
    }

    pub fn with_queue_name(mut self, name: impl Into<String>) -> Self {
        self.queue_name = name.into();
        self
    }

    pub fn with_num_workers(mut self, n: usize) -> Self {
        self.num_workers = n;
        self
    }

    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}", self.redis_host, self.redis_port)
    }

    /// Builds configuration from the environment, falling back to defaults
    /// for anything unset.
    ///
    /// # Environment variables
    /// - `WORKER_ID` (default `worker-{random hex}`)
    /// - `REDIS_HOST` (default `localhost`)
    /// - `REDIS_PORT` (default `6379`)
    /// - `QUEUE_NAME` (default `image_processing_v2`)
    /// - `MAX_RETRIES` (default `3`)
    /// - `PROCESSING_TIMEOUT_SECS` (default `300`)
    /// - `HEARTBEAT_INTERVAL` (default `10`)
    /// - `HEARTBEAT_TIMEOUT_SECS` (default `30`)
    /// - `RECOVERY_INTERVAL_SECS` (default `30`)
    /// - `NUM_WORKERS` (default `4`)
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("WORKER_ID") {
            config.worker_id = v;
        }
        if let Ok(v) = std::env::var("REDIS_HOST") {
            config.redis_host = v;
        }
        if let Ok(v) = std::env::var("REDIS_PORT") {
            config.redis_port = parse_env("REDIS_PORT", &v)?;
        }
        if let Ok(v) = std::env::var("QUEUE_NAME") {
            config.queue_name = v;
        }
        if let Ok(v) = std::env::var("MAX_RETRIES") {
            config.max_retries = parse_env("MAX_RETRIES", &v)?;
        }
        if let Ok(v) = std::env::var("PROCESSING_TIMEOUT_SECS") {
            config.processing_timeout = Duration::from_secs(parse_env("PROCESSING_TIMEOUT_SECS", &v)?);
        }
        if let Ok(v) = std::env::var("HEARTBEAT_INTERVAL") {
            config.heartbeat_interval = Duration::from_secs(parse_env("HEARTBEAT_INTERVAL", &v)?);
        }
        if let Ok(v) = std::env::var("HEARTBEAT_TIMEOUT_SECS") {
            config.heartbeat_timeout = Duration::from_secs(parse_env("HEARTBEAT_TIMEOUT_SECS", &v)?);
        }
        if let Ok(v) = std::env::var("RECOVERY_INTERVAL_SECS") {
            config.recovery_interval = Duration::from_secs(parse_env("RECOVERY_INTERVAL_SECS", &v)?);
        }
        if let Ok(v) = std::env::var("NUM_WORKERS") {
            config.num_workers = parse_env("NUM_WORKERS", &v)?;
        }

        Ok(config)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{value}'"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_values() {
        let config = Config::default();
        assert_eq!(config.redis_host, "localhost");
        assert_eq!(config.redis_port, 6379);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.num_workers, 4);
    }

    #[test]
    fn builder_overrides_fields() {
        let config = Config::new()
            .with_worker_id("worker-1")
            .with_redis("redis.internal", 6380)
            .with_queue_name("my_queue")
            .with_num_workers(8);
        assert_eq!(config.worker_id, "worker-1");
        assert_eq!(config.redis_host, "redis.internal");
        assert_eq!(config.redis_port, 6380);
        assert_eq!(config.queue_name, "my_queue");
        assert_eq!(config.num_workers, 8);
    }

    #[test]
    fn redis_url_formats_host_and_port() {
        let config = Config::new().with_redis("example.com", 7000);
        assert_eq!(config.redis_url(), "redis://example.com:7000");
    }
}
