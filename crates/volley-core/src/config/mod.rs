//! Provider configuration.
//!
//! Layered loading: built-in defaults, then an optional TOML file named by
//! `$VOLLEY_CONFIG`, then `VOLLEY__`-prefixed environment variables (nested
//! keys separated by `__`). Construction validates everything up front so a
//! misconfigured provider fails fast instead of at first call.

use crate::error::ProviderError;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

impl From<ConfigError> for ProviderError {
    fn from(error: ConfigError) -> Self {
        ProviderError::Config(error.to_string())
    }
}

fn default_max_batch_size() -> usize {
    200
}

fn default_max_concurrent_batches() -> usize {
    5
}

fn default_aggregation_window_ms() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_min_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    10_000
}

fn default_log_retries() -> bool {
    true
}

fn default_reset_interval_ms() -> u64 {
    10_000
}

/// One upstream JSON-RPC endpoint. Order in the endpoint list is the
/// failover rotation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Short name used in logs and events; the URL itself may carry an API
    /// key and is never logged.
    pub name: Arc<str>,
    pub url: String,
}

impl EndpointConfig {
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>, url: impl Into<String>) -> Self {
        Self { name: name.into(), url: url.into() }
    }
}

/// Batching knobs, immutable per client.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RequestPolicy {
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    #[serde(default = "default_max_concurrent_batches")]
    pub max_concurrent_batches: usize,
    #[serde(default = "default_aggregation_window_ms")]
    pub aggregation_window_ms: u64,
}

impl Default for RequestPolicy {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            max_concurrent_batches: default_max_concurrent_batches(),
            aggregation_window_ms: default_aggregation_window_ms(),
        }
    }
}

/// Per-endpoint retry budget.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Physical attempts per endpoint before failing over.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_min_backoff_ms")]
    pub min_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_log_retries")]
    pub log_retries: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            min_backoff_ms: default_min_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            log_retries: default_log_retries(),
        }
    }
}

/// Complete provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub endpoints: Vec<EndpointConfig>,
    /// When set, network detection requires every endpoint to report this
    /// chain id.
    #[serde(default)]
    pub expected_chain_id: Option<u64>,
    #[serde(default)]
    pub request: RequestPolicy,
    #[serde(default)]
    pub retry: RetryPolicy,
    /// How long until unreachable flags clear and the rotation resets.
    #[serde(default = "default_reset_interval_ms")]
    pub reset_interval_ms: u64,
    /// Optional per-physical-request deadline.
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
}

impl ProviderConfig {
    /// Configuration with default policies for the given endpoints.
    #[must_use]
    pub fn new(endpoints: Vec<EndpointConfig>) -> Self {
        Self {
            endpoints,
            expected_chain_id: None,
            request: RequestPolicy::default(),
            retry: RetryPolicy::default(),
            reset_interval_ms: default_reset_interval_ms(),
            request_timeout_ms: None,
        }
    }

    /// Loads layered configuration from file and environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a source fails to parse or the merged
    /// result fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Ok(path) = std::env::var("VOLLEY_CONFIG") {
            builder = builder.add_source(File::with_name(&path));
        }
        let raw = builder
            .add_source(Environment::with_prefix("VOLLEY").separator("__"))
            .build()?;
        let parsed: Self = raw.try_deserialize()?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoints.is_empty() {
            return Err(ConfigError::Invalid("at least one endpoint is required".into()));
        }
        let mut seen = Vec::with_capacity(self.endpoints.len());
        for endpoint in &self.endpoints {
            if endpoint.name.is_empty() || !valid_name(&endpoint.name) {
                return Err(ConfigError::Invalid(format!(
                    "endpoint name {:?} must be non-empty [A-Za-z0-9._-]",
                    endpoint.name
                )));
            }
            if seen.contains(&&endpoint.name) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate endpoint name {:?}",
                    endpoint.name
                )));
            }
            seen.push(&endpoint.name);
            let url = Url::parse(&endpoint.url).map_err(|error| {
                ConfigError::Invalid(format!("endpoint {:?} url: {error}", endpoint.name))
            })?;
            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(ConfigError::Invalid(format!(
                    "endpoint {:?} url scheme must be http or https",
                    endpoint.name
                )));
            }
        }
        if self.request.max_batch_size == 0 {
            return Err(ConfigError::Invalid("max_batch_size must be at least 1".into()));
        }
        if self.request.max_concurrent_batches == 0 {
            return Err(ConfigError::Invalid("max_concurrent_batches must be at least 1".into()));
        }
        if self.retry.max_retries == 0 {
            return Err(ConfigError::Invalid("max_retries must be at least 1".into()));
        }
        if self.retry.min_backoff_ms > self.retry.max_backoff_ms {
            return Err(ConfigError::Invalid(
                "min_backoff_ms must not exceed max_backoff_ms".into(),
            ));
        }
        Ok(())
    }
}

fn valid_name(name: &str) -> bool {
    name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}
