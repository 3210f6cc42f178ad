//! Wire types for JSON-RPC 2.0 batch traffic.
//!
//! Requests are always sent as a JSON array, even when a batch collapses to
//! one element; responses may legally come back as an array or as a bare
//! object, in any order. [`BatchPayload`] absorbs both shapes so the client
//! can match responses to callers purely by request id.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Cow;
use thiserror::Error;

/// JSON-RPC protocol version sent with every request.
pub const JSONRPC_VERSION: &str = "2.0";

/// ENS registry address shared by mainnet and the public testnets that
/// deploy one.
pub const ENS_REGISTRY: &str = "0x00000000000C2E074eC69A0dFb2997BA6C7d2e1e";

fn default_version() -> Cow<'static, str> {
    Cow::Borrowed(JSONRPC_VERSION)
}

/// A single JSON-RPC request.
///
/// Ids are assigned by the issuing client, monotonically increasing per
/// client instance, and never reused, even when the call is rejected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcRequest {
    pub jsonrpc: Cow<'static, str>,
    pub method: String,
    pub params: serde_json::Value,
    pub id: u64,
}

impl RpcRequest {
    #[must_use]
    pub fn new(method: impl Into<String>, params: serde_json::Value, id: u64) -> Self {
        Self { jsonrpc: Cow::Borrowed(JSONRPC_VERSION), method: method.into(), params, id }
    }
}

/// The `error` member of a JSON-RPC response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcErrorObject {
    pub code: i32,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// A single JSON-RPC response entry.
///
/// The id is kept as a raw JSON value: servers answering a malformed entry
/// reply with `id: null`, and such entries must fail the unmatched caller
/// rather than poison the whole batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    #[serde(default = "default_version")]
    pub jsonrpc: Cow<'static, str>,
    #[serde(default)]
    pub id: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorObject>,
}

impl RpcResponse {
    /// Creates a success response (used by the mock harness and tests).
    #[must_use]
    pub fn success(id: u64, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: Cow::Borrowed(JSONRPC_VERSION),
            id: serde_json::Value::from(id),
            result: Some(result),
            error: None,
        }
    }

    /// Creates an error response.
    #[must_use]
    pub fn failure(id: u64, error: RpcErrorObject) -> Self {
        Self {
            jsonrpc: Cow::Borrowed(JSONRPC_VERSION),
            id: serde_json::Value::from(id),
            result: None,
            error: Some(error),
        }
    }

    /// Request id as an integer, when the server echoed one back intact.
    #[must_use]
    pub fn id_u64(&self) -> Option<u64> {
        self.id.as_u64()
    }
}

/// Body of a physical batch response: an array in the common case, a bare
/// object when the upstream collapses a one-element batch.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum BatchPayload {
    Batch(Vec<RpcResponse>),
    Single(RpcResponse),
}

impl BatchPayload {
    #[must_use]
    pub fn into_responses(self) -> Vec<RpcResponse> {
        match self {
            Self::Batch(entries) => entries,
            Self::Single(entry) => vec![entry],
        }
    }
}

/// Identity of the chain an endpoint serves.
///
/// Two identities are equal iff all fields match; two absent ENS registries
/// compare equal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChainIdentity {
    pub chain_id: u64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ens_registry: Option<String>,
}

impl ChainIdentity {
    /// Maps a raw chain id onto the known-chains table. Unknown ids get the
    /// name `"unknown"` and no ENS registry.
    #[must_use]
    pub fn for_chain_id(chain_id: u64) -> Self {
        let (name, ens) = match chain_id {
            1 => ("mainnet", Some(ENS_REGISTRY)),
            10 => ("optimism", None),
            100 => ("gnosis", None),
            137 => ("polygon", None),
            8453 => ("base", None),
            17000 => ("holesky", Some(ENS_REGISTRY)),
            42161 => ("arbitrum", None),
            11155111 => ("sepolia", Some(ENS_REGISTRY)),
            _ => ("unknown", None),
        };
        Self { chain_id, name: name.to_owned(), ens_registry: ens.map(str::to_owned) }
    }
}

impl std::fmt::Display for ChainIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (chain id {})", self.name, self.chain_id)
    }
}

/// Decoded `eth_feeHistory` result.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeHistory {
    #[serde(with = "hex_u64")]
    pub oldest_block: u64,
    pub base_fee_per_gas: Vec<String>,
    pub gas_used_ratio: Vec<f64>,
    #[serde(default)]
    pub reward: Vec<Vec<String>>,
}

/// Failure to parse a `0x`-prefixed hex quantity.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HexQuantityError {
    #[error("missing 0x prefix")]
    MissingPrefix,
    #[error("empty hex quantity")]
    Empty,
    #[error("invalid hex digits")]
    InvalidDigits,
}

/// Formats a u64 as an Ethereum hex quantity (`0x1b4`, no leading zeros).
#[must_use]
pub fn to_hex_u64(value: u64) -> String {
    format!("0x{value:x}")
}

/// Parses an Ethereum hex quantity into a u64.
///
/// # Errors
///
/// Returns [`HexQuantityError`] when the prefix is missing, the digits are
/// absent, or they are not valid hexadecimal.
pub fn parse_hex_u64(text: &str) -> Result<u64, HexQuantityError> {
    let digits = text.strip_prefix("0x").ok_or(HexQuantityError::MissingPrefix)?;
    if digits.is_empty() {
        return Err(HexQuantityError::Empty);
    }
    u64::from_str_radix(digits, 16).map_err(|_| HexQuantityError::InvalidDigits)
}

/// Serde adapter for u64 fields carried as hex quantities on the wire.
pub mod hex_u64 {
    use super::{parse_hex_u64, to_hex_u64, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&to_hex_u64(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let text = String::deserialize(deserializer)?;
        parse_hex_u64(&text).map_err(serde::de::Error::custom)
    }
}
