//! Configuration Module
//!
//! Handles loading and managing server configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::{RetryPolicy, DEFAULT_TTL_MS};
use crate::tasks::MaintenanceBudget;

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// TTL in milliseconds for entries written without an explicit TTL
    pub default_ttl_ms: u64,
    /// Retries after the first failed fetch
    pub fetch_max_retries: u32,
    /// Backoff before the first retry, doubled on each further retry
    pub fetch_base_backoff_ms: u64,
    /// How long a worker request may stay unanswered
    pub worker_timeout_ms: u64,
    /// Maintenance pass interval in seconds
    pub maintenance_interval: u64,
    /// Byte budget enforced by smart eviction
    pub max_cache_bytes: u64,
    /// Entry budget enforced by smart eviction
    pub max_entries: usize,
    /// HTTP server port
    pub server_port: u16,
    /// Where the store is snapshotted on shutdown and restored on startup
    pub snapshot_path: Option<PathBuf>,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `DEFAULT_TTL_MS` - Default TTL in milliseconds (default: 3600000)
    /// - `FETCH_MAX_RETRIES` - Fetch retries (default: 2)
    /// - `FETCH_BASE_BACKOFF_MS` - First retry backoff (default: 1000)
    /// - `WORKER_TIMEOUT_MS` - Worker request timeout (default: 30000)
    /// - `MAINTENANCE_INTERVAL` - Maintenance frequency in seconds (default: 60)
    /// - `MAX_CACHE_BYTES` - Byte budget (default: 5242880)
    /// - `MAX_ENTRIES` - Entry budget (default: 1000)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `SNAPSHOT_PATH` - Snapshot file (default: unset, no persistence)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            default_ttl_ms: parse_var("DEFAULT_TTL_MS", defaults.default_ttl_ms),
            fetch_max_retries: parse_var("FETCH_MAX_RETRIES", defaults.fetch_max_retries),
            fetch_base_backoff_ms: parse_var(
                "FETCH_BASE_BACKOFF_MS",
                defaults.fetch_base_backoff_ms,
            ),
            worker_timeout_ms: parse_var("WORKER_TIMEOUT_MS", defaults.worker_timeout_ms),
            maintenance_interval: parse_var("MAINTENANCE_INTERVAL", defaults.maintenance_interval),
            max_cache_bytes: parse_var("MAX_CACHE_BYTES", defaults.max_cache_bytes),
            max_entries: parse_var("MAX_ENTRIES", defaults.max_entries),
            server_port: parse_var("SERVER_PORT", defaults.server_port),
            snapshot_path: env::var("SNAPSHOT_PATH")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.fetch_max_retries, self.fetch_base_backoff_ms)
    }

    pub fn worker_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_timeout_ms)
    }

    pub fn maintenance_budget(&self) -> MaintenanceBudget {
        MaintenanceBudget {
            max_bytes: self.max_cache_bytes,
            max_entries: self.max_entries,
        }
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_ttl_ms: DEFAULT_TTL_MS,
            fetch_max_retries: 2,
            fetch_base_backoff_ms: 1000,
            worker_timeout_ms: 30_000,
            maintenance_interval: 60,
            max_cache_bytes: 5 * 1024 * 1024,
            max_entries: 1000,
            server_port: 3000,
            snapshot_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.default_ttl_ms, 3_600_000);
        assert_eq!(config.fetch_max_retries, 2);
        assert_eq!(config.fetch_base_backoff_ms, 1000);
        assert_eq!(config.worker_timeout_ms, 30_000);
        assert_eq!(config.maintenance_interval, 60);
        assert_eq!(config.max_cache_bytes, 5_242_880);
        assert_eq!(config.max_entries, 1000);
        assert_eq!(config.server_port, 3000);
        assert!(config.snapshot_path.is_none());
    }

    #[test]
    fn test_config_from_env() {
        // Single test touches the environment to avoid races between tests
        for name in [
            "DEFAULT_TTL_MS",
            "FETCH_MAX_RETRIES",
            "FETCH_BASE_BACKOFF_MS",
            "WORKER_TIMEOUT_MS",
            "MAINTENANCE_INTERVAL",
            "MAX_CACHE_BYTES",
            "MAX_ENTRIES",
            "SERVER_PORT",
            "SNAPSHOT_PATH",
        ] {
            env::remove_var(name);
        }
        assert_eq!(Config::from_env(), Config::default());

        env::set_var("FETCH_MAX_RETRIES", "5");
        env::set_var("SERVER_PORT", "not-a-port");
        env::set_var("SNAPSHOT_PATH", "/tmp/cache.json");
        let config = Config::from_env();
        assert_eq!(config.fetch_max_retries, 5);
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.snapshot_path, Some(PathBuf::from("/tmp/cache.json")));

        env::remove_var("FETCH_MAX_RETRIES");
        env::remove_var("SERVER_PORT");
        env::remove_var("SNAPSHOT_PATH");
    }

    #[test]
    fn test_derived_settings() {
        let config = Config::default();
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(config.worker_timeout(), Duration::from_secs(30));
        assert_eq!(config.maintenance_budget().max_bytes, 5_242_880);
        assert_eq!(config.maintenance_budget().max_entries, 1000);
    }
}
