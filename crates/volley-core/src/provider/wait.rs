//! Deadline-bounded transaction confirmation polling.
//!
//! Every poll goes through the normal retry/failover path, and every
//! failure is recorded rather than propagated, so the only way out of the
//! wait is a confirmed receipt or the deadline. This bounds a failure mode
//! where a wait primitive swallows errors and never settles.

use super::{parse_quantity, FallbackProvider};
use crate::error::ProviderError;
use crate::types;
use crate::utils::sanitize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Polling knobs for [`FallbackProvider::wait_for_transaction`].
#[derive(Debug, Clone, Copy)]
pub struct WaitOptions {
    /// Overall deadline for the wait.
    pub timeout: Duration,
    /// Pause between receipt polls.
    pub poll_interval: Duration,
    /// Blocks the chain must have built on top of the transaction,
    /// inclusive. Values ≤ 1 confirm as soon as a receipt is mined.
    pub confirmations: u64,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(1),
            confirmations: 1,
        }
    }
}

impl FallbackProvider {
    /// Polls `eth_getTransactionReceipt` until the transaction reaches the
    /// requested confirmation depth or the deadline passes.
    ///
    /// Per-poll failures (endpoint outages, protocol violations) are
    /// retained as the timeout's `last_error` and polling continues.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::ConfirmationTimeout` when the deadline
    /// passes first, carrying the poll count and the last per-poll failure
    /// if there was one.
    pub async fn wait_for_transaction(
        &self,
        tx_hash: &str,
        options: WaitOptions,
    ) -> Result<Value, ProviderError> {
        let deadline = Instant::now() + options.timeout;
        let mut poll_count: u64 = 0;
        let mut last_error: Option<ProviderError> = None;
        debug!(
            tx_hash,
            timeout_ms = options.timeout.as_millis() as u64,
            confirmations = options.confirmations,
            "waiting for transaction confirmation"
        );

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match tokio::time::timeout(
                remaining,
                self.poll_receipt(tx_hash, options.confirmations),
            )
            .await
            {
                Err(_) => break,
                Ok(Ok(Some(receipt))) => {
                    info!(tx_hash, poll_count, "transaction confirmed");
                    return Ok(receipt);
                }
                Ok(Ok(None)) => {}
                Ok(Err(poll_error)) => {
                    debug!(tx_hash, error = %poll_error, "receipt poll failed");
                    last_error = Some(poll_error);
                }
            }
            poll_count += 1;

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            tokio::time::sleep(options.poll_interval.min(remaining)).await;
        }

        warn!(tx_hash, poll_count, "transaction confirmation timed out");
        Err(ProviderError::ConfirmationTimeout {
            tx_hash: tx_hash.to_owned(),
            timeout_ms: options.timeout.as_millis() as u64,
            poll_count,
            last_error: last_error.map(Box::new),
        })
    }

    /// One poll: `Ok(Some(receipt))` when confirmed to the requested
    /// depth, `Ok(None)` while pending.
    async fn poll_receipt(
        &self,
        tx_hash: &str,
        required: u64,
    ) -> Result<Option<Value>, ProviderError> {
        let receipt = self.call("eth_getTransactionReceipt", json!([tx_hash])).await?;
        if receipt.is_null() {
            return Ok(None);
        }
        let confirmed = match receipt_block_number(&receipt)? {
            None => false,
            Some(_) if required <= 1 => true,
            Some(mined_in) => {
                let raw = self.call("eth_blockNumber", json!([])).await?;
                let latest = parse_quantity(&raw, "eth_blockNumber")?;
                latest.saturating_sub(mined_in) + 1 >= required
            }
        };
        Ok(confirmed.then_some(receipt))
    }
}

/// `blockNumber` of a non-null receipt; `None` while the transaction is
/// still pending on a node that returns skeleton receipts.
fn receipt_block_number(receipt: &Value) -> Result<Option<u64>, ProviderError> {
    match receipt.get("blockNumber") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(raw)) => types::parse_hex_u64(raw).map(Some).map_err(|parse_error| {
            ProviderError::Protocol(format!("receipt blockNumber {raw:?}: {parse_error}"))
        }),
        Some(other) => Err(ProviderError::Protocol(format!(
            "receipt blockNumber is not a hex quantity: {}",
            sanitize::compact_value(other)
        ))),
    }
}
