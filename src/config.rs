//! Configuration for the catalog cache
//!
//! Defaults match the production worker. Environment variables can override
//! the worker URL and timings without changing behavior.

use std::time::Duration;

use thiserror::Error;

/// Base URL of the catalog worker
pub const DEFAULT_CATALOG_URL: &str = "https://smm-services-cache.sitewasd2026.workers.dev";

/// Storage key holding the serialized service list
pub const SERVICES_KEY: &str = "smm_services_cache";

/// Storage key holding the fetch timestamp
pub const TIMESTAMP_KEY: &str = "smm_services_timestamp";

/// Errors raised while reading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable held something other than milliseconds
    #[error("{name} must be a whole number of milliseconds, got '{value}'")]
    InvalidMillis { name: &'static str, value: String },
}

/// Settings for `ServiceCache`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Base URL of the catalog worker
    pub catalog_url: String,
    /// How long a fetched catalog stays fresh
    pub expiry: Duration,
    /// Upper bound on a single network fetch
    pub fetch_timeout: Duration,
    /// Delay before a preload starts fetching
    pub preload_delay: Duration,
    /// Storage key for the service list
    pub services_key: String,
    /// Storage key for the fetch timestamp
    pub timestamp_key: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            catalog_url: DEFAULT_CATALOG_URL.to_string(),
            expiry: Duration::from_secs(23 * 60 * 60), // 23 hours
            fetch_timeout: Duration::from_millis(5000),
            preload_delay: Duration::from_millis(1000),
            services_key: SERVICES_KEY.to_string(),
            timestamp_key: TIMESTAMP_KEY.to_string(),
        }
    }
}

impl CacheConfig {
    /// Builds a config from the process environment
    ///
    /// Reads `CATALOG_URL`, `CACHE_EXPIRY_MS` and `CACHE_FETCH_TIMEOUT_MS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("CATALOG_URL").filter(|url| !url.trim().is_empty()) {
            config.catalog_url = url.trim().to_string();
        }
        if let Some(expiry) = parse_millis("CACHE_EXPIRY_MS", lookup("CACHE_EXPIRY_MS"))? {
            config.expiry = expiry;
        }
        if let Some(timeout) =
            parse_millis("CACHE_FETCH_TIMEOUT_MS", lookup("CACHE_FETCH_TIMEOUT_MS"))?
        {
            config.fetch_timeout = timeout;
        }

        Ok(config)
    }
}

fn parse_millis(name: &'static str, value: Option<String>) -> Result<Option<Duration>, ConfigError> {
    match value {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map(|ms| Some(Duration::from_millis(ms)))
            .map_err(|_| ConfigError::InvalidMillis { name, value }),
    }
}
