//! Multi-endpoint failover orchestrator.
//!
//! [`FallbackProvider`] owns one [`BatchedClient`] per configured endpoint
//! and routes every logical call to the active one, retrying with capped
//! exponential backoff and rotating to the next endpoint when a retry
//! budget runs out. Rotation follows configuration order and wraps; it is
//! never reordered by observed latency.
//!
//! Before serving traffic the provider validates that every reachable
//! endpoint reports the same chain identity. A mismatch on the first-ever
//! detection is fatal; afterwards mismatching endpoints are excluded until
//! the periodic reset sweep re-admits them.

mod builder;
mod wait;

pub use builder::FallbackProviderBuilder;
pub use wait::WaitOptions;

use crate::batch::BatchedClient;
use crate::config::{ProviderConfig, RetryPolicy};
use crate::error::ProviderError;
use crate::events::{EventBus, ProviderEvent, SwitchReason};
use crate::types::{self, ChainIdentity, FeeHistory};
use crate::utils::{sanitize, Retrier};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex as AsyncMutex};
use tracing::{debug, error, info, warn};

/// Per-endpoint slot. `reachable` and `observed` are written by detection
/// and the reset sweep; `perform` only reads them.
struct EndpointState {
    client: BatchedClient,
    reachable: AtomicBool,
    observed: parking_lot::Mutex<Option<ChainIdentity>>,
}

/// Detection bookkeeping, serialized under one async mutex so concurrent
/// first calls trigger a single probe round.
struct DetectionState {
    identity: Option<ChainIdentity>,
    validated_once: bool,
}

struct ProviderInner {
    endpoints: Vec<EndpointState>,
    active: AtomicUsize,
    retry: RetryPolicy,
    expected_chain_id: Option<u64>,
    reset_interval: Duration,
    detection: AsyncMutex<DetectionState>,
    reset_scheduled: AtomicBool,
    events: EventBus,
}

/// Failover JSON-RPC provider. Cheap to clone; clones share endpoint
/// state, the active index, and the event channel.
#[derive(Clone)]
pub struct FallbackProvider {
    inner: Arc<ProviderInner>,
}

impl FallbackProvider {
    #[must_use]
    pub fn builder() -> FallbackProviderBuilder {
        FallbackProviderBuilder::new()
    }

    /// Builds a provider from a loaded configuration, with no middleware.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::Config` when validation fails or the HTTP
    /// client cannot be initialized.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        config.validate()?;
        builder::build_provider(config, Vec::new())
    }

    /// Issues one logical call, validating the network first.
    ///
    /// The first call (and the first call after each reset sweep) performs
    /// one chain-identity probe round before any traffic is sent.
    ///
    /// # Errors
    ///
    /// Propagates detection failures, then `AllEndpointsFailed` when every
    /// endpoint exhausts its retry budget.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        self.inner.detect_network().await?;
        self.inner.perform(method, params).await
    }

    /// Issues one logical call without the chain-identity gate.
    ///
    /// # Errors
    ///
    /// Returns `AllEndpointsFailed` wrapping the last per-endpoint cause.
    pub async fn perform(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        self.inner.perform(method, params).await
    }

    /// Returns the validated chain identity, probing reachable endpoints
    /// if no identity is cached.
    ///
    /// # Errors
    ///
    /// `ChainMismatch` when endpoints disagree on the first-ever detection,
    /// `NetworkDetection` when no endpoint yields a usable identity.
    pub async fn detect_network(&self) -> Result<ChainIdentity, ProviderError> {
        self.inner.detect_network().await
    }

    /// # Errors
    ///
    /// See [`FallbackProvider::detect_network`].
    pub async fn get_network(&self) -> Result<ChainIdentity, ProviderError> {
        self.inner.detect_network().await
    }

    /// Fetches the fee history for `block_count` blocks ending at
    /// `newest_block` (a hex quantity or a tag such as `"latest"`).
    ///
    /// # Errors
    ///
    /// Call failures as in [`FallbackProvider::call`], plus `Protocol` when
    /// the result does not decode.
    pub async fn get_fee_history(
        &self,
        block_count: u64,
        newest_block: &str,
        reward_percentiles: &[f64],
    ) -> Result<FeeHistory, ProviderError> {
        let params = json!([types::to_hex_u64(block_count), newest_block, reward_percentiles]);
        let raw = self.call("eth_feeHistory", params).await?;
        serde_json::from_value(raw).map_err(|decode_error| {
            ProviderError::Protocol(format!("malformed eth_feeHistory result: {decode_error}"))
        })
    }

    /// Subscribes to provider notifications. Slow receivers lag and drop
    /// the oldest events rather than applying backpressure.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.inner.events.subscribe()
    }

    #[must_use]
    pub fn endpoint_count(&self) -> usize {
        self.inner.endpoints.len()
    }
}

impl ProviderInner {
    /// Bounded endpoint scan: at most one retry-budgeted run per endpoint
    /// per logical call, so a fully-failed fleet terminates instead of
    /// looping.
    async fn perform(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        let total = self.endpoints.len();
        let retrier = Retrier::new(
            self.retry.max_retries,
            Duration::from_millis(self.retry.min_backoff_ms),
            Duration::from_millis(self.retry.max_backoff_ms),
        )
        .log_attempts(self.retry.log_retries);

        let mut last_error = None;
        for _ in 0..total {
            // The endpoint choice is fixed here, before any await.
            let index = self.active.load(Ordering::Acquire) % total;
            let endpoint = &self.endpoints[index];
            if !endpoint.reachable.load(Ordering::Acquire) {
                debug!(endpoint = %endpoint.client.name(), "skipping excluded endpoint");
                self.advance(index, SwitchReason::Unreachable);
                continue;
            }

            let outcome = retrier
                .run(|| {
                    let client = endpoint.client.clone();
                    let params = params.clone();
                    async move { client.call(method, params).await }
                })
                .await;
            match outcome {
                Ok(value) => return Ok(value),
                Err(failure) => {
                    warn!(
                        endpoint = %endpoint.client.name(),
                        error = %failure,
                        "endpoint exhausted its retry budget"
                    );
                    last_error = Some(failure);
                    self.advance(index, SwitchReason::RetriesExhausted);
                }
            }
        }

        let last = last_error
            .unwrap_or_else(|| ProviderError::Transport("no reachable endpoints".into()));
        error!(attempts = total, error = %last, "all endpoints failed");
        self.events.emit(ProviderEvent::AllEndpointsFailed {
            attempts: total,
            error: last.to_string(),
        });
        Err(ProviderError::AllEndpointsFailed { attempts: total, last: Box::new(last) })
    }

    /// Advances the active index past `from`. Compare-and-swap keeps
    /// concurrent failures on the same endpoint from skipping ahead by
    /// more than one slot.
    fn advance(&self, from: usize, reason: SwitchReason) {
        let total = self.endpoints.len();
        if total < 2 {
            return;
        }
        let to = (from + 1) % total;
        if self
            .active
            .compare_exchange(from, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let name = Arc::clone(self.endpoints[from].client.name());
            debug!(from, to, endpoint = %name, ?reason, "advancing active endpoint");
            self.events.emit(ProviderEvent::EndpointSwitched { from, to, endpoint: name, reason });
        }
    }

    /// Probes every reachable endpoint for its chain id and validates the
    /// answers against each other (and the configured expectation, when one
    /// is set). The validated identity is cached until the reset sweep
    /// invalidates it.
    async fn detect_network(self: &Arc<Self>) -> Result<ChainIdentity, ProviderError> {
        let mut detection = self.detection.lock().await;
        if let Some(identity) = &detection.identity {
            return Ok(identity.clone());
        }

        let probes = self.endpoints.iter().enumerate().filter_map(|(index, endpoint)| {
            if !endpoint.reachable.load(Ordering::Acquire) {
                return None;
            }
            let client = endpoint.client.clone();
            Some(async move { (index, client.call("eth_chainId", json!([])).await) })
        });
        let outcomes = futures::future::join_all(probes).await;

        let mut observed = Vec::new();
        for (index, outcome) in outcomes {
            let endpoint = &self.endpoints[index];
            match outcome.and_then(|value| parse_quantity(&value, "eth_chainId")) {
                Ok(chain_id) => observed.push((index, ChainIdentity::for_chain_id(chain_id))),
                Err(probe_error) => {
                    warn!(
                        endpoint = %endpoint.client.name(),
                        error = %probe_error,
                        "chain id probe failed, excluding endpoint"
                    );
                    endpoint.reachable.store(false, Ordering::Release);
                }
            }
        }
        if observed.is_empty() {
            return Err(ProviderError::NetworkDetection(
                "no reachable endpoint answered eth_chainId".into(),
            ));
        }

        // Reference identity: the configured chain when one is expected,
        // otherwise the first answer in configuration order.
        let reference = match self.expected_chain_id {
            Some(expected) => observed
                .iter()
                .find(|(_, identity)| identity.chain_id == expected)
                .map(|(_, identity)| identity.clone()),
            None => Some(observed[0].1.clone()),
        };

        let mut usable = 0usize;
        for (index, identity) in &observed {
            let endpoint = &self.endpoints[*index];
            self.record_identity(endpoint, identity);
            if reference.as_ref() == Some(identity) {
                usable += 1;
            } else if !detection.validated_once {
                let expected = match (&reference, self.expected_chain_id) {
                    (Some(identity), _) => identity.to_string(),
                    (None, Some(chain_id)) => ChainIdentity::for_chain_id(chain_id).to_string(),
                    (None, None) => "unknown".to_owned(),
                };
                error!(
                    endpoint = %endpoint.client.name(),
                    actual = %identity,
                    %expected,
                    "chain identity mismatch on first detection"
                );
                return Err(ProviderError::ChainMismatch {
                    endpoint: endpoint.client.name().to_string(),
                    expected,
                    actual: identity.to_string(),
                });
            } else {
                warn!(
                    endpoint = %endpoint.client.name(),
                    actual = %identity,
                    "endpoint left the validated network, excluding it"
                );
                endpoint.reachable.store(false, Ordering::Release);
            }
        }

        let identity = match reference {
            Some(identity) if usable > 0 => identity,
            _ => {
                return Err(ProviderError::NetworkDetection(
                    "no endpoint reports the expected chain".into(),
                ))
            }
        };
        detection.identity = Some(identity.clone());
        detection.validated_once = true;
        info!(network = %identity, usable, "network detection complete");
        self.schedule_reset();
        Ok(identity)
    }

    fn record_identity(&self, endpoint: &EndpointState, identity: &ChainIdentity) {
        let mut observed = endpoint.observed.lock();
        if let Some(previous) = observed.as_ref() {
            if previous != identity {
                info!(
                    endpoint = %endpoint.client.name(),
                    from = %previous,
                    to = %identity,
                    "endpoint changed chain identity"
                );
            }
        }
        *observed = Some(identity.clone());
    }

    /// Arms the one-shot reset timer unless one is already outstanding.
    /// The sweep re-admits every endpoint, resets the rotation to the
    /// first endpoint, and invalidates the cached identity so the next
    /// call re-validates the fleet.
    fn schedule_reset(self: &Arc<Self>) {
        if self
            .reset_scheduled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let interval = self.reset_interval;
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            if let Some(inner) = weak.upgrade() {
                inner.reset_sweep().await;
            }
        });
    }

    async fn reset_sweep(&self) {
        let mut detection = self.detection.lock().await;
        for endpoint in &self.endpoints {
            endpoint.reachable.store(true, Ordering::Release);
        }
        self.active.store(0, Ordering::Release);
        detection.identity = None;
        self.reset_scheduled.store(false, Ordering::Release);
        debug!("reset sweep re-admitted all endpoints");
    }
}

/// Decodes a JSON-RPC hex quantity result (`"0x1"`-style string).
fn parse_quantity(value: &Value, what: &str) -> Result<u64, ProviderError> {
    let raw = value.as_str().ok_or_else(|| {
        ProviderError::Protocol(format!(
            "{what} returned a non-string result: {}",
            sanitize::compact_value(value)
        ))
    })?;
    types::parse_hex_u64(raw).map_err(|parse_error| {
        ProviderError::Protocol(format!("{what} returned {raw:?}: {parse_error}"))
    })
}
