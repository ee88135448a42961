//! Configuration for the RabbitDesk client.
//!
//! One section per component of the resilience layer. Values come from a TOML
//! file (optional), then `RABBITDESK__<SECTION>__<KEY>` environment
//! variables, then [`ClientConfig::validate`].
//!
//! # Example (TOML)
//!
//! ```toml
//! [api]
//! base_url = "https://console.example.com"
//! request_timeout = "30s"
//!
//! [cache]
//! default_ttl = "5m"
//! max_size = 100
//!
//! [credential]
//! refresh_threshold_minutes = 2
//! warning_threshold_minutes = 5
//! poll_interval = "60s"
//!
//! [probe]
//! ttl = "30s"
//! timeout = "10s"
//! fast_fail = true
//! ```

pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use loader::{load_config, load_config_from_str};

/// Errors produced while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),

    /// The configuration sources could not be read or deserialized.
    #[error("Failed to load configuration: {0}")]
    Load(String),
}

/// Root client configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Management API endpoint settings.
    pub api: ApiConfig,
    /// Response cache settings.
    pub cache: CacheConfig,
    /// Credential lifecycle settings.
    pub credential: CredentialConfig,
    /// Availability probe settings.
    pub probe: ProbeConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Management API endpoint settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the console backend.
    pub base_url: String,
    /// Timeout for a single HTTP request.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Path of the OAuth token endpoint, relative to `base_url`.
    pub token_path: String,
    /// OAuth client id sent with refresh requests, if the server wants one.
    pub client_id: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            request_timeout: Duration::from_secs(30),
            token_path: "/auth/token".to_string(),
            client_id: None,
        }
    }
}

/// Response cache settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL applied when `set` gets no override.
    #[serde(with = "humantime_serde")]
    pub default_ttl: Duration,
    /// Maximum number of stored entries (expired ones included).
    pub max_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(300), // 5 minutes
            max_size: 100,
        }
    }
}

/// Credential lifecycle settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CredentialConfig {
    /// Refresh when this many whole minutes (or fewer) remain.
    pub refresh_threshold_minutes: i64,
    /// Warn when this many whole minutes (or fewer, but more than zero) remain.
    pub warning_threshold_minutes: i64,
    /// Interval between monitor ticks.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            refresh_threshold_minutes: 2,
            warning_threshold_minutes: 5,
            poll_interval: Duration::from_secs(60),
        }
    }
}

/// Availability probe settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// How long a probe result stays valid.
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    /// Hard deadline for a single probe.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Whether loaders refuse to call targets the probe reports unavailable.
    pub fast_fail: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30),
            timeout: Duration::from_secs(10),
            fast_fail: true,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl ClientConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - The base URL is not an http(s) URL
    /// - The cache holds zero entries
    /// - Any TTL, timeout or interval is zero
    /// - A threshold is negative, or the refresh threshold exceeds the
    ///   warning threshold
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api.base_url.trim().is_empty() {
            return Err(ConfigError::Missing("api.base_url".to_string()));
        }
        let url = url::Url::parse(&self.api.base_url).map_err(|e| {
            ConfigError::InvalidValue(format!("api.base_url '{}': {e}", self.api.base_url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidValue(format!(
                "api.base_url must use http or https, got '{}'",
                url.scheme()
            )));
        }
        if self.api.request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "api.request_timeout must be greater than 0".to_string(),
            ));
        }

        if self.cache.max_size == 0 {
            return Err(ConfigError::InvalidValue(
                "cache.max_size must be at least 1".to_string(),
            ));
        }
        if self.cache.default_ttl.is_zero() {
            return Err(ConfigError::InvalidValue(
                "cache.default_ttl must be greater than 0".to_string(),
            ));
        }

        let credential = &self.credential;
        if credential.refresh_threshold_minutes < 0 || credential.warning_threshold_minutes < 0 {
            return Err(ConfigError::InvalidValue(
                "credential thresholds must not be negative".to_string(),
            ));
        }
        if credential.refresh_threshold_minutes > credential.warning_threshold_minutes {
            return Err(ConfigError::InvalidValue(format!(
                "credential.refresh_threshold_minutes ({}) exceeds warning_threshold_minutes ({})",
                credential.refresh_threshold_minutes, credential.warning_threshold_minutes
            )));
        }
        if credential.poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "credential.poll_interval must be greater than 0".to_string(),
            ));
        }

        if self.probe.ttl.is_zero() || self.probe.timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "probe.ttl and probe.timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
