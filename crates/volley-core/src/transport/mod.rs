//! Shared HTTP transport for physical batch requests.
//!
//! One tuned `reqwest::Client` serves every configured endpoint: rustls TLS,
//! pooled keep-alive connections, no redirects, and a hard overall timeout
//! so a stuck upstream can never hold a batch open indefinitely. Network
//! errors are scrubbed before they are logged or stored, since endpoint
//! URLs may embed API keys and must never appear in error text.

mod middleware;

pub use middleware::{HttpRequest, HttpResponse, Middleware, Next};

use crate::error::ProviderError;
use crate::utils::sanitize;
use bytes::Bytes;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const OVERALL_TIMEOUT: Duration = Duration::from_secs(45);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(30);
const POOL_MAX_IDLE_PER_HOST: usize = 16;
const TCP_KEEPALIVE: Duration = Duration::from_secs(30);

/// HTTP POST transport shared by all batch clients.
pub struct HttpTransport {
    client: reqwest::Client,
    middleware: Vec<Arc<dyn Middleware>>,
    request_timeout: Option<Duration>,
}

impl HttpTransport {
    /// Builds the shared client.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::Config` when the TLS backend or connection
    /// pool cannot be initialized.
    pub fn new(
        request_timeout: Option<Duration>,
        middleware: Vec<Arc<dyn Middleware>>,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(OVERALL_TIMEOUT)
            .http2_adaptive_window(true)
            .use_rustls_tls()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("volley/", env!("CARGO_PKG_VERSION")))
            .tcp_keepalive(TCP_KEEPALIVE)
            .tcp_nodelay(true)
            .build()
            .map_err(|error| {
                ProviderError::Config(format!("failed to build http client: {error}"))
            })?;
        Ok(Self { client, middleware, request_timeout })
    }

    /// POSTs one physical batch and returns the raw response body.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::Transport` for connection, timeout, and
    /// non-2xx failures, with the cause scrubbed and truncated.
    pub async fn post(&self, url: &Url, body: Bytes) -> Result<Bytes, ProviderError> {
        let request = HttpRequest {
            url: url.clone(),
            headers: HeaderMap::new(),
            body,
            timeout: self.request_timeout,
        };
        let response = Next::new(self, &self.middleware).run(request).await?;
        if !(200..300).contains(&response.status) {
            let body_text = String::from_utf8_lossy(&response.body);
            return Err(ProviderError::Transport(format!(
                "http status {}: {}",
                response.status,
                sanitize::truncate_text(&body_text, sanitize::DEFAULT_TEXT_LIMIT)
            )));
        }
        debug!(bytes = response.body.len(), "batch response received");
        Ok(response.body)
    }

    /// Terminal handler behind the middleware chain.
    pub(crate) async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ProviderError> {
        let mut builder = self
            .client
            .post(request.url)
            .header(CONTENT_TYPE, "application/json")
            .headers(request.headers)
            .body(request.body);
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        let response = builder
            .send()
            .await
            .map_err(|error| ProviderError::Transport(scrub_reqwest_error(error)))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|error| ProviderError::Transport(scrub_reqwest_error(error)))?;
        Ok(HttpResponse { status, body })
    }
}

/// Reduces a reqwest error to a bounded message with the URL stripped.
fn scrub_reqwest_error(error: reqwest::Error) -> String {
    let scrubbed = error.without_url();
    let detail = sanitize::describe_error(&scrubbed);
    if scrubbed.is_timeout() {
        format!("request timed out: {detail}")
    } else if scrubbed.is_connect() {
        format!("connection failed: {detail}")
    } else {
        detail
    }
}
