//! Construction of [`FallbackProvider`] instances.

use super::{DetectionState, EndpointState, FallbackProvider, ProviderInner};
use crate::batch::BatchedClient;
use crate::config::{EndpointConfig, ProviderConfig, RequestPolicy, RetryPolicy};
use crate::error::ProviderError;
use crate::events::{EventBus, EVENT_CHANNEL_CAPACITY};
use crate::transport::{HttpTransport, Middleware};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;

/// Fluent configuration surface. Endpoints are tried in the order they
/// are added.
///
/// ```no_run
/// use volley_core::provider::FallbackProvider;
///
/// # fn demo() -> Result<(), volley_core::error::ProviderError> {
/// let provider = FallbackProvider::builder()
///     .endpoint("primary", "https://rpc.example.org")
///     .endpoint("backup", "https://rpc-backup.example.org")
///     .expected_chain_id(1)
///     .build()?;
/// # let _ = provider;
/// # Ok(())
/// # }
/// ```
pub struct FallbackProviderBuilder {
    config: ProviderConfig,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl FallbackProviderBuilder {
    pub(crate) fn new() -> Self {
        Self { config: ProviderConfig::new(Vec::new()), middleware: Vec::new() }
    }

    /// Appends one endpoint to the rotation.
    #[must_use]
    pub fn endpoint(mut self, name: impl Into<Arc<str>>, url: impl Into<String>) -> Self {
        self.config.endpoints.push(EndpointConfig::new(name, url));
        self
    }

    /// Appends endpoints in iteration order.
    #[must_use]
    pub fn endpoints(mut self, endpoints: impl IntoIterator<Item = EndpointConfig>) -> Self {
        self.config.endpoints.extend(endpoints);
        self
    }

    /// Chain id every endpoint must report. Without it, the first probed
    /// identity becomes the reference.
    #[must_use]
    pub fn expected_chain_id(mut self, chain_id: u64) -> Self {
        self.config.expected_chain_id = Some(chain_id);
        self
    }

    #[must_use]
    pub fn request_policy(mut self, policy: RequestPolicy) -> Self {
        self.config.request = policy;
        self
    }

    #[must_use]
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    /// Interval of the sweep that re-admits excluded endpoints and
    /// re-validates the network.
    #[must_use]
    pub fn reset_interval(mut self, interval: Duration) -> Self {
        self.config.reset_interval_ms = interval.as_millis().try_into().unwrap_or(u64::MAX);
        self
    }

    /// Per-physical-request timeout, overriding the transport default.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout_ms =
            Some(timeout.as_millis().try_into().unwrap_or(u64::MAX));
        self
    }

    /// Appends an outbound middleware layer; layers wrap each physical
    /// request in the order they were added.
    #[must_use]
    pub fn middleware(mut self, layer: Arc<dyn Middleware>) -> Self {
        self.middleware.push(layer);
        self
    }

    /// # Errors
    ///
    /// Returns `ProviderError::Config` when the accumulated configuration
    /// fails validation or the HTTP client cannot be initialized.
    pub fn build(self) -> Result<FallbackProvider, ProviderError> {
        self.config.validate()?;
        build_provider(&self.config, self.middleware)
    }
}

/// Assembles the shared transport, the event channel, and one batching
/// client per endpoint. Callers validate `config` first.
pub(super) fn build_provider(
    config: &ProviderConfig,
    middleware: Vec<Arc<dyn Middleware>>,
) -> Result<FallbackProvider, ProviderError> {
    let timeout = config.request_timeout_ms.map(Duration::from_millis);
    let transport = Arc::new(HttpTransport::new(timeout, middleware)?);
    let events = EventBus::new(EVENT_CHANNEL_CAPACITY);

    let mut endpoints = Vec::with_capacity(config.endpoints.len());
    for endpoint in &config.endpoints {
        let client =
            BatchedClient::new(endpoint, config.request, Arc::clone(&transport), events.clone())?;
        endpoints.push(EndpointState {
            client,
            reachable: AtomicBool::new(true),
            observed: Mutex::new(None),
        });
    }

    Ok(FallbackProvider {
        inner: Arc::new(ProviderInner {
            endpoints,
            active: AtomicUsize::new(0),
            retry: config.retry,
            expected_chain_id: config.expected_chain_id,
            reset_interval: Duration::from_millis(config.reset_interval_ms),
            detection: AsyncMutex::new(DetectionState { identity: None, validated_once: false }),
            reset_scheduled: AtomicBool::new(false),
            events,
        }),
    })
}
