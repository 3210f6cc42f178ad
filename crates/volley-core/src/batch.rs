//! Single-endpoint batching JSON-RPC client.
//!
//! Callers enqueue individual calls; a deferred aggregator tick drains the
//! queue into physical batch requests, paced by the aggregation window and
//! admission-limited by [`ConcurrencyLimiter`]. Responses are matched back
//! to callers by request id, so out-of-order entries and collapsed
//! single-object bodies are handled uniformly.
//!
//! This layer never retries: a transport failure settles every call in the
//! affected batch and leaves retry/failover policy to the orchestrator.

use crate::config::{EndpointConfig, RequestPolicy};
use crate::error::ProviderError;
use crate::events::{EventBus, ProviderEvent};
use crate::transport::HttpTransport;
use crate::types::{BatchPayload, RpcRequest, RpcResponse};
use crate::utils::{sanitize, ConcurrencyLimiter, Queue};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};
use url::Url;

/// A queued call: the immutable request plus the channel that settles its
/// caller exactly once.
struct PendingCall {
    request: RpcRequest,
    settle: oneshot::Sender<Result<serde_json::Value, ProviderError>>,
}

struct AggregatorState {
    queue: Queue<PendingCall>,
    ticks_elapsed: u32,
    scheduled: bool,
}

struct ClientShared {
    name: Arc<str>,
    url: Url,
    policy: RequestPolicy,
    transport: Arc<HttpTransport>,
    limiter: ConcurrencyLimiter,
    next_id: AtomicU64,
    aggregator: Mutex<AggregatorState>,
    events: EventBus,
}

/// Batching client for one endpoint. Cheap to clone; clones share the
/// queue, the id counter, and the admission limiter.
#[derive(Clone)]
pub struct BatchedClient {
    shared: Arc<ClientShared>,
}

impl BatchedClient {
    /// # Errors
    ///
    /// Returns `ProviderError::Config` when the URL does not parse or the
    /// policy's concurrency bound is zero.
    pub fn new(
        endpoint: &EndpointConfig,
        policy: RequestPolicy,
        transport: Arc<HttpTransport>,
        events: EventBus,
    ) -> Result<Self, ProviderError> {
        let url = Url::parse(&endpoint.url).map_err(|error| {
            ProviderError::Config(format!("endpoint {:?} url: {error}", endpoint.name))
        })?;
        let limiter = ConcurrencyLimiter::new(policy.max_concurrent_batches)
            .map_err(|error| ProviderError::Config(error.to_string()))?;
        Ok(Self {
            shared: Arc::new(ClientShared {
                name: Arc::clone(&endpoint.name),
                url,
                policy,
                transport,
                limiter,
                next_id: AtomicU64::new(1),
                aggregator: Mutex::new(AggregatorState {
                    queue: Queue::new(),
                    ticks_elapsed: 0,
                    scheduled: false,
                }),
                events,
            }),
        })
    }

    /// Endpoint name used in logs and events.
    #[must_use]
    pub fn name(&self) -> &Arc<str> {
        &self.shared.name
    }

    /// Enqueues one call and resolves when its batch settles.
    ///
    /// Never fails before enqueueing; the returned future settles exactly
    /// once, on batch completion, transport failure, or protocol violation.
    ///
    /// # Errors
    ///
    /// `Rpc` when the endpoint answered this id with an error object,
    /// `Transport`/`Protocol` when the whole batch failed.
    pub async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, ProviderError> {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest::new(method, params, id);
        let (settle, resolution) = oneshot::channel();
        trace!(endpoint = %self.shared.name, method, id, "call queued");
        {
            let mut aggregator = self.shared.aggregator.lock();
            aggregator.queue.enqueue(PendingCall { request, settle });
            if !aggregator.scheduled {
                aggregator.scheduled = true;
                tokio::spawn(run_aggregator(Arc::clone(&self.shared)));
            }
        }
        match resolution.await {
            Ok(outcome) => outcome,
            Err(_) => {
                Err(ProviderError::Transport("batch task dropped before settling the call".into()))
            }
        }
    }
}

/// Timer-paced drain loop. At most one instance runs per client; the
/// `scheduled` flag under the aggregator mutex guarantees it.
async fn run_aggregator(shared: Arc<ClientShared>) {
    let window = Duration::from_millis(shared.policy.aggregation_window_ms);
    loop {
        tokio::time::sleep(window).await;
        let drained = {
            let mut aggregator = shared.aggregator.lock();
            aggregator.ticks_elapsed += 1;
            let flush = aggregator.queue.len() > shared.policy.max_batch_size
                || aggregator.ticks_elapsed > 2;
            if flush {
                aggregator.ticks_elapsed = 0;
                let take = isize::try_from(shared.policy.max_batch_size).unwrap_or(isize::MAX);
                Some(aggregator.queue.dequeue_multiple(take))
            } else {
                None
            }
        };
        if let Some(calls) = drained {
            if !calls.is_empty() {
                let worker = Arc::clone(&shared);
                tokio::spawn(async move { worker.submit(calls).await });
            }
        }
        let mut aggregator = shared.aggregator.lock();
        if aggregator.queue.is_empty() {
            aggregator.scheduled = false;
            aggregator.ticks_elapsed = 0;
            return;
        }
    }
}

impl ClientShared {
    /// Pushes one drained batch through admission control and the wire.
    async fn submit(&self, calls: Vec<PendingCall>) {
        let permit = match self.limiter.acquire().await {
            Ok(permit) => permit,
            Err(error) => {
                warn!(endpoint = %self.name, calls = calls.len(), "batch admission queue cleared");
                settle_all(calls, &ProviderError::Transport(format!(
                    "batch submission dropped: {error}"
                )));
                return;
            }
        };
        self.dispatch(calls).await;
        drop(permit);
    }

    async fn dispatch(&self, calls: Vec<PendingCall>) {
        let requests: Vec<&RpcRequest> = calls.iter().map(|call| &call.request).collect();
        let body = match serde_json::to_vec(&requests) {
            Ok(raw) => Bytes::from(raw),
            Err(error) => {
                settle_all(calls, &ProviderError::Protocol(format!(
                    "failed to encode batch: {error}"
                )));
                return;
            }
        };

        let total = calls.len();
        let started = Instant::now();
        self.events.emit(ProviderEvent::BatchSubmitted {
            endpoint: Arc::clone(&self.name),
            calls: total,
        });
        debug!(endpoint = %self.name, calls = total, bytes = body.len(), "submitting batch");

        match self.transport.post(&self.url, body).await {
            Ok(raw) => self.demux(calls, &raw, started),
            Err(error) => {
                warn!(endpoint = %self.name, calls = total, error = %error, "batch transport failure");
                self.events.emit(ProviderEvent::BatchFailed {
                    endpoint: Arc::clone(&self.name),
                    calls: total,
                    error: error.to_string(),
                });
                settle_all(calls, &error);
            }
        }
    }

    /// Matches response entries to pending calls by id and settles each
    /// caller. Ids the server never answered settle as protocol violations
    /// for their callers only.
    fn demux(&self, calls: Vec<PendingCall>, raw: &[u8], started: Instant) {
        let mut indexed = match index_responses(raw) {
            Ok(indexed) => indexed,
            Err(error) => {
                warn!(endpoint = %self.name, calls = calls.len(), error = %error, "unparseable batch response");
                self.events.emit(ProviderEvent::BatchFailed {
                    endpoint: Arc::clone(&self.name),
                    calls: calls.len(),
                    error: error.to_string(),
                });
                settle_all(calls, &error);
                return;
            }
        };

        let total = calls.len();
        for call in calls {
            let id = call.request.id;
            let _ = call.settle.send(outcome_for(id, &mut indexed));
        }
        self.events.emit(ProviderEvent::BatchSucceeded {
            endpoint: Arc::clone(&self.name),
            calls: total,
            elapsed: started.elapsed(),
        });
        debug!(
            endpoint = %self.name,
            calls = total,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "batch settled"
        );
    }
}

/// Parses the raw body (array or collapsed single object) into an id map.
/// Entries without an integer id are unmatchable and dropped; their callers
/// settle as protocol violations.
fn index_responses(raw: &[u8]) -> Result<HashMap<u64, RpcResponse>, ProviderError> {
    let payload: BatchPayload = serde_json::from_slice(raw).map_err(|error| {
        ProviderError::Protocol(format!("unparseable batch response: {error}"))
    })?;
    let mut indexed = HashMap::new();
    for response in payload.into_responses() {
        if let Some(id) = response.id_u64() {
            indexed.insert(id, response);
        }
    }
    Ok(indexed)
}

/// Resolves one caller from the indexed responses: an error object becomes
/// a sanitized `Rpc` failure, a missing entry a `Protocol` failure, and an
/// absent result resolves as JSON null (`eth_getTransactionReceipt` answers
/// pending transactions this way).
fn outcome_for(
    id: u64,
    indexed: &mut HashMap<u64, RpcResponse>,
) -> Result<serde_json::Value, ProviderError> {
    match indexed.remove(&id) {
        None => Err(ProviderError::Protocol(format!("no response for request id {id}"))),
        Some(response) => {
            if let Some(mut error) = response.error {
                sanitize::truncate_error_object(&mut error);
                Err(ProviderError::Rpc {
                    code: error.code,
                    message: error.message,
                    data: error.data,
                })
            } else {
                Ok(response.result.unwrap_or(serde_json::Value::Null))
            }
        }
    }
}

fn settle_all(calls: Vec<PendingCall>, failure: &ProviderError) {
    for call in calls {
        let _ = call.settle.send(Err(failure.clone()));
    }
}
