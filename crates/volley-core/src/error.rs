//! Typed failures surfaced by the provider.
//!
//! Every variant is `Clone`: a single physical batch failure settles many
//! pending callers, so causes are carried as pre-sanitized strings rather
//! than source objects. `Transport` and `Protocol` failures are retried and
//! eventually trigger failover; `Rpc` failures are retried with an identical
//! payload; `AllEndpointsFailed` and `ConfirmationTimeout` are terminal for
//! their respective surfaces.

use thiserror::Error;

/// Crate-wide error type.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum ProviderError {
    /// Network or HTTP-level failure reaching the endpoint.
    #[error("transport failure: {0}")]
    Transport(String),

    /// Well-formed JSON-RPC error returned by the endpoint.
    #[error("rpc error {code}: {message}")]
    Rpc { code: i32, message: String, data: Option<serde_json::Value> },

    /// Malformed batch response (unparseable body, or an id the server
    /// never answered). Treated like a transport failure by retry logic.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// Every configured endpoint was exhausted for one logical call.
    #[error("all {attempts} endpoints failed, last error: {last}")]
    AllEndpointsFailed { attempts: usize, last: Box<ProviderError> },

    /// The confirmation waiter hit its deadline.
    #[error("transaction {tx_hash} not confirmed after {timeout_ms}ms ({poll_count} polls)")]
    ConfirmationTimeout {
        tx_hash: String,
        timeout_ms: u64,
        poll_count: u64,
        last_error: Option<Box<ProviderError>>,
    },

    /// An endpoint reported a different chain identity than expected during
    /// the first network detection.
    #[error("endpoint {endpoint} reports chain identity {actual}, expected {expected}")]
    ChainMismatch { endpoint: String, expected: String, actual: String },

    /// Network detection produced no usable chain identity.
    #[error("network detection failed: {0}")]
    NetworkDetection(String),

    /// Invalid configuration rejected at construction time.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ProviderError {
    /// Stable machine-readable code for the variant.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Rpc { .. } => "rpc_error",
            Self::Protocol(_) => "protocol_violation",
            Self::AllEndpointsFailed { .. } => "all_endpoints_failed",
            Self::ConfirmationTimeout { .. } => "confirmation_timeout",
            Self::ChainMismatch { .. } => "chain_mismatch",
            Self::NetworkDetection(_) => "network_detection",
            Self::Config(_) => "invalid_config",
        }
    }

    /// JSON-RPC error code, for `Rpc` failures.
    #[must_use]
    pub fn rpc_code(&self) -> Option<i32> {
        match self {
            Self::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Attached JSON-RPC error data, when present.
    #[must_use]
    pub fn data(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Rpc { data, .. } => data.as_ref(),
            _ => None,
        }
    }

    /// The wrapped cause for aggregate failures.
    #[must_use]
    pub fn last_cause(&self) -> Option<&ProviderError> {
        match self {
            Self::AllEndpointsFailed { last, .. } => Some(last),
            Self::ConfirmationTimeout { last_error, .. } => last_error.as_deref(),
            _ => None,
        }
    }
}
