//! Batch-Aware RPC Mock for Ethereum JSON-RPC Testing
//!
//! Wraps mockito with a responder that parses each physical batch request
//! and answers entry by entry, echoing the client-assigned request ids.
//! Static bodies cannot do that, so every response is built from the
//! request.

use mockito::{Mock, Request, Server, ServerOpts};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;

/// Per-entry responder: gets the method and params, answers with a result
/// or a JSON-RPC error `(code, message)`.
pub type RpcOutcome = Result<Value, (i32, String)>;

/// One mock endpoint speaking batch JSON-RPC.
///
/// Captures every physical batch it receives, in arrival order, for
/// request-count and payload assertions.
pub struct BatchRpcMock {
    server: Server,
    mocks: Vec<Mock>,
    batches: Arc<Mutex<Vec<Vec<Value>>>>,
}

/// A standalone (non-pooled) server. Pooled servers are recycled across
/// tests and can be handed out while their runtime thread is still
/// blocked finishing a previous test's in-flight response, which makes
/// deadline-sensitive tests hang on requests their own mock never sees.
async fn fresh_server() -> Server {
    Server::new_with_opts_async(ServerOpts::default()).await
}

impl BatchRpcMock {
    /// Starts a mock that answers every entry through `respond` and
    /// returns responses as a JSON array in request order.
    pub async fn start<F>(respond: F) -> Self
    where
        F: Fn(&str, &Value) -> RpcOutcome + Send + Sync + 'static,
    {
        Self::start_shaped(respond, Value::Array).await
    }

    /// Starts a mock with a custom body shape: `shape` receives the
    /// per-entry responses in request order and renders the final body,
    /// so tests can reverse, collapse, or drop responses.
    pub async fn start_shaped<F, S>(respond: F, shape: S) -> Self
    where
        F: Fn(&str, &Value) -> RpcOutcome + Send + Sync + 'static,
        S: Fn(Vec<Value>) -> Value + Send + Sync + 'static,
    {
        let mut server = fresh_server().await;
        let batches = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&batches);
        let mock = server
            .mock("POST", "/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body_from_request(move |request| {
                let entries = request_entries(request);
                captured.lock().push(entries.clone());
                let responses = entries.iter().map(|entry| answer(entry, &respond)).collect();
                shape(responses).to_string().into_bytes()
            })
            .create_async()
            .await;
        Self { server, mocks: vec![mock], batches }
    }

    /// Starts a mock that fails every request at the HTTP layer while
    /// still capturing the batches it receives.
    pub async fn start_http_error(status: usize) -> Self {
        let mut server = fresh_server().await;
        let batches = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&batches);
        let mock = server
            .mock("POST", "/")
            .with_status(status)
            .with_body_from_request(move |request| {
                captured.lock().push(request_entries(request));
                b"upstream exploded".to_vec()
            })
            .create_async()
            .await;
        Self { server, mocks: vec![mock], batches }
    }

    /// Returns the URL of the mock server.
    #[must_use]
    pub fn url(&self) -> String {
        self.server.url()
    }

    /// Number of physical HTTP requests received so far.
    #[must_use]
    pub fn physical_requests(&self) -> usize {
        self.batches.lock().len()
    }

    /// Captured batches in arrival order, one `Vec` of request objects per
    /// physical request.
    #[must_use]
    pub fn batches(&self) -> Vec<Vec<Value>> {
        self.batches.lock().clone()
    }

    /// All captured request entries, flattened in arrival order.
    #[must_use]
    pub fn entries(&self) -> Vec<Value> {
        self.batches.lock().iter().flatten().cloned().collect()
    }

    /// Params of every captured call to `method`, in arrival order.
    #[must_use]
    pub fn params_of(&self, method: &str) -> Vec<Value> {
        self.entries()
            .into_iter()
            .filter(|entry| entry["method"] == method)
            .map(|entry| entry["params"].clone())
            .collect()
    }

    /// How many times `method` was received, across all batches.
    #[must_use]
    pub fn count_of(&self, method: &str) -> usize {
        self.params_of(method).len()
    }

    /// Ids of every captured entry, flattened in arrival order.
    #[must_use]
    pub fn ids(&self) -> Vec<u64> {
        self.entries().iter().filter_map(|entry| entry["id"].as_u64()).collect()
    }

    /// Verifies all registered mocks were hit.
    #[must_use]
    pub fn verify_all_called(&self) -> bool {
        self.mocks.iter().all(Mock::matched)
    }
}

/// Splits a physical request body into its entries. A single-object body
/// counts as a one-entry batch.
fn request_entries(request: &Request) -> Vec<Value> {
    let raw = request.body().map(Clone::clone).unwrap_or_default();
    match serde_json::from_slice::<Value>(&raw) {
        Ok(Value::Array(entries)) => entries,
        Ok(single) => vec![single],
        Err(_) => Vec::new(),
    }
}

fn answer<F>(entry: &Value, respond: &F) -> Value
where
    F: Fn(&str, &Value) -> RpcOutcome,
{
    let id = entry.get("id").cloned().unwrap_or(Value::Null);
    let method = entry.get("method").and_then(Value::as_str).unwrap_or_default();
    let params = entry.get("params").cloned().unwrap_or(Value::Null);
    match respond(method, &params) {
        Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
        Err((code, message)) => json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": code, "message": message }
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use url::Url;
    use volley_core::transport::HttpTransport;

    async fn post_raw(mock: &BatchRpcMock, body: Value) -> Value {
        let transport = HttpTransport::new(None, Vec::new()).unwrap();
        let url = Url::parse(&mock.url()).unwrap();
        let raw = transport
            .post(&url, Bytes::from(serde_json::to_vec(&body).unwrap()))
            .await
            .unwrap();
        serde_json::from_slice(&raw).unwrap()
    }

    #[tokio::test]
    async fn test_mock_echoes_request_ids() {
        let mock = BatchRpcMock::start(|_, _| Ok(json!("0x1"))).await;
        let body = post_raw(
            &mock,
            json!([
                { "jsonrpc": "2.0", "method": "eth_chainId", "params": [], "id": 42 },
                { "jsonrpc": "2.0", "method": "eth_chainId", "params": [], "id": 43 },
            ]),
        )
        .await;
        assert_eq!(body[0]["id"], 42);
        assert_eq!(body[1]["id"], 43);
        assert_eq!(mock.physical_requests(), 1);
        assert_eq!(mock.ids(), vec![42, 43]);
        assert!(mock.verify_all_called());
    }

    #[tokio::test]
    async fn test_mock_shapes_can_collapse_single_responses() {
        let mock = BatchRpcMock::start_shaped(
            |_, _| Ok(json!("0x1")),
            |mut responses| {
                if responses.len() == 1 {
                    responses.pop().unwrap_or(Value::Null)
                } else {
                    Value::Array(responses)
                }
            },
        )
        .await;
        let body = post_raw(
            &mock,
            json!([{ "jsonrpc": "2.0", "method": "eth_chainId", "params": [], "id": 7 }]),
        )
        .await;
        assert!(body.is_object());
        assert_eq!(body["id"], 7);
    }
}
