//! Relay Configuration
//!
//! Typed configuration for every subsystem, a TOML file loader, and
//! environment-variable overrides. Construction-time validation is strict:
//! a bad value fails fast with a [`ConfigurationError`] and is never
//! retried or papered over.
//!
//! # File format
//!
//! ```toml
//! models = ["Claude Sonnet 4", "Claude 3.5 Haiku"]
//! regions = ["us-east-1", "eu-west-1"]
//!
//! [retry]
//! max_retries = 3
//! base_delay_ms = 500
//!
//! [executor]
//! max_concurrent_requests = 8
//! request_timeout_seconds = 120
//!
//! [cache]
//! mode = "file"
//! max_age_hours = 24.0
//!
//! [endpoint]
//! base_url = "https://inference.{region}.example.com"
//! api_key_env = "LLM_RELAY_API_KEY"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::CacheConfig;
use crate::catalog::refresh::FetchPolicy;
use crate::catalog::CatalogConfig;
use crate::executor::ExecutorConfig;
use crate::retry::RetryPolicy;

/// Environment variable overriding the endpoint template
pub const ENV_ENDPOINT: &str = "LLM_RELAY_ENDPOINT";
/// Environment variable overriding the region list (comma-separated)
pub const ENV_REGIONS: &str = "LLM_RELAY_REGIONS";
/// Environment variable overriding the model list (comma-separated)
pub const ENV_MODELS: &str = "LLM_RELAY_MODELS";

// ============================================================================
// Errors
// ============================================================================

/// Bad construction-time input; fails fast, never retried
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ConfigurationError {
    /// Cache freshness window must be strictly positive
    #[error("cache max_age_hours must be > 0, got {hours}")]
    InvalidCacheMaxAge {
        /// The rejected value
        hours: f64,
    },

    /// At least one model must be configured
    #[error("no models configured")]
    EmptyModels,

    /// At least one region must be configured
    #[error("no regions configured")]
    EmptyRegions,

    /// Worker pool size must be at least 1
    #[error("max_concurrent_requests must be >= 1, got {value}")]
    InvalidConcurrency {
        /// The rejected value
        value: usize,
    },

    /// Request timeout must be at least 1 second
    #[error("request_timeout_seconds must be >= 1, got {value}")]
    InvalidTimeout {
        /// The rejected value
        value: u64,
    },

    /// Backoff multiplier below 1.0 would shrink delays
    #[error("backoff_multiplier must be >= 1.0, got {value}")]
    InvalidBackoffMultiplier {
        /// The rejected value
        value: f64,
    },

    /// The endpoint template must mention the region placeholder
    #[error("endpoint base_url must contain a {{region}} placeholder: {url}")]
    InvalidEndpoint {
        /// The rejected template
        url: String,
    },
}

/// Failure reading or parsing a configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Filesystem failure
    #[error("cannot read config {path}: {source}")]
    Io {
        /// Path that failed
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// TOML syntax or shape error
    #[error("cannot parse config {path}: {source}")]
    Parse {
        /// Path that failed
        path: PathBuf,
        /// Underlying error
        source: Box<toml::de::Error>,
    },
}

// ============================================================================
// Endpoint
// ============================================================================

/// Where and how to reach the inference gateway
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// URL template; `{region}` is substituted per request
    pub base_url: String,
    /// Environment variable holding the bearer token
    pub api_key_env: String,
    /// TCP connect timeout
    pub connect_timeout_ms: u64,
    /// Whole-request timeout for one invocation
    pub request_timeout_ms: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: "https://inference.{region}.example.com".to_string(),
            api_key_env: "LLM_RELAY_API_KEY".to_string(),
            connect_timeout_ms: 5_000,
            request_timeout_ms: 120_000,
        }
    }
}

impl EndpointConfig {
    /// Concrete base URL for a region
    #[must_use]
    pub fn url_for(&self, region: &str) -> String {
        self.base_url.replace("{region}", region)
    }
}

// ============================================================================
// Relay Config
// ============================================================================

fn default_models() -> Vec<String> {
    vec!["Claude Sonnet 4".to_string()]
}

fn default_regions() -> Vec<String> {
    vec!["us-east-1".to_string(), "us-west-2".to_string()]
}

fn default_fetch_enabled() -> bool {
    true
}

/// Complete relay configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Model names to try, in preference order
    #[serde(default = "default_models")]
    pub models: Vec<String>,
    /// Regions to try, in preference order
    #[serde(default = "default_regions")]
    pub regions: Vec<String>,
    /// Retry and adaptation policy
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Parallel executor pool settings
    #[serde(default)]
    pub executor: ExecutorConfig,
    /// Catalog cache settings
    #[serde(default)]
    pub cache: CacheConfig,
    /// Catalog refresh fan-out policy
    #[serde(default)]
    pub fetch: FetchPolicy,
    /// Whether remote catalog fetching is enabled
    #[serde(default = "default_fetch_enabled")]
    pub fetch_enabled: bool,
    /// Inference gateway endpoint
    #[serde(default)]
    pub endpoint: EndpointConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            models: default_models(),
            regions: default_regions(),
            retry: RetryPolicy::default(),
            executor: ExecutorConfig::default(),
            cache: CacheConfig::default(),
            fetch: FetchPolicy::default(),
            fetch_enabled: true,
            endpoint: EndpointConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Validate every semantic constraint.
    ///
    /// # Errors
    ///
    /// Returns the first violated [`ConfigurationError`].
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.models.is_empty() {
            return Err(ConfigurationError::EmptyModels);
        }
        if self.regions.is_empty() {
            return Err(ConfigurationError::EmptyRegions);
        }
        if self.cache.max_age_hours <= 0.0 {
            return Err(ConfigurationError::InvalidCacheMaxAge {
                hours: self.cache.max_age_hours,
            });
        }
        if self.executor.max_concurrent_requests == 0 {
            return Err(ConfigurationError::InvalidConcurrency {
                value: self.executor.max_concurrent_requests,
            });
        }
        if self.executor.request_timeout_seconds == 0 {
            return Err(ConfigurationError::InvalidTimeout {
                value: self.executor.request_timeout_seconds,
            });
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(ConfigurationError::InvalidBackoffMultiplier {
                value: self.retry.backoff_multiplier,
            });
        }
        if !self.endpoint.base_url.contains("{region}") {
            return Err(ConfigurationError::InvalidEndpoint {
                url: self.endpoint.base_url.clone(),
            });
        }
        Ok(())
    }

    /// The catalog-facing slice of this config
    #[must_use]
    pub fn catalog_config(&self) -> CatalogConfig {
        CatalogConfig {
            regions: self.regions.clone(),
            fetch_enabled: self.fetch_enabled,
            fetch: self.fetch.clone(),
        }
    }

    /// Apply environment overrides (`LLM_RELAY_ENDPOINT`,
    /// `LLM_RELAY_REGIONS`, `LLM_RELAY_MODELS`)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(endpoint) = std::env::var(ENV_ENDPOINT) {
            if !endpoint.trim().is_empty() {
                self.endpoint.base_url = endpoint;
            }
        }
        if let Ok(regions) = std::env::var(ENV_REGIONS) {
            let parsed = split_list(&regions);
            if !parsed.is_empty() {
                self.regions = parsed;
            }
        }
        if let Ok(models) = std::env::var(ENV_MODELS) {
            let parsed = split_list(&models);
            if !parsed.is_empty() {
                self.models = parsed;
            }
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

// ============================================================================
// File Loading
// ============================================================================

/// Default config location: `<user config dir>/llm-relay/config.toml`
#[must_use]
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("llm-relay")
        .join("config.toml")
}

/// Load configuration from the default path.
///
/// A missing file yields the defaults; a present-but-broken file is an
/// error (silently ignoring a typo'd config hides real mistakes).
///
/// # Errors
///
/// Returns [`ConfigError`] when the file exists but cannot be read or
/// parsed.
pub fn load_config() -> Result<RelayConfig, ConfigError> {
    load_config_from_path(&default_config_path())
}

/// Load configuration from an explicit path (missing file = defaults).
///
/// # Errors
///
/// Returns [`ConfigError`] when the file exists but cannot be read or
/// parsed.
pub fn load_config_from_path(path: &Path) -> Result<RelayConfig, ConfigError> {
    if !path.exists() {
        tracing::debug!(path = ?path, "no config file, using defaults");
        return Ok(RelayConfig::default());
    }
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: RelayConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source: Box::new(source),
    })?;
    tracing::info!(path = ?path, "configuration loaded");
    Ok(config)
}
