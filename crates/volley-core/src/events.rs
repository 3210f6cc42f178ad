//! Typed event stream for observability collaborators.
//!
//! A bounded broadcast channel replaces ad-hoc emitter callbacks: the hot
//! path fires and forgets, subscribers that lag lose the oldest events
//! instead of applying backpressure, and zero subscribers costs nothing.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Default capacity of the broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Why the orchestrator moved off an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchReason {
    /// The endpoint's retry budget was exhausted.
    RetriesExhausted,
    /// The endpoint is currently excluded and was skipped without I/O.
    Unreachable,
}

/// Notifications emitted by the provider.
#[derive(Debug, Clone)]
pub enum ProviderEvent {
    BatchSubmitted { endpoint: Arc<str>, calls: usize },
    BatchSucceeded { endpoint: Arc<str>, calls: usize, elapsed: Duration },
    BatchFailed { endpoint: Arc<str>, calls: usize, error: String },
    /// `endpoint` names the endpoint being left.
    EndpointSwitched { from: usize, to: usize, endpoint: Arc<str>, reason: SwitchReason },
    AllEndpointsFailed { attempts: usize, error: String },
}

impl ProviderEvent {
    /// Stable event name for log pipelines.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::BatchSubmitted { .. } => "batch-submitted",
            Self::BatchSucceeded { .. } => "batch-succeeded",
            Self::BatchFailed { .. } => "batch-failed",
            Self::EndpointSwitched { .. } => "endpoint-switched",
            Self::AllEndpointsFailed { .. } => "all-endpoints-failed",
        }
    }
}

/// Cloneable handle around the broadcast sender.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ProviderEvent>,
}

impl EventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.sender.subscribe()
    }

    /// Sends without blocking; a missing audience is not an error.
    pub fn emit(&self, event: ProviderEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EVENT_CHANNEL_CAPACITY)
    }
}
