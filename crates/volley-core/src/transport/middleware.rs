//! Outbound middleware wrapping each physical HTTP call.
//!
//! Middleware run in configured order; each receives the request and a
//! [`Next`] handle that invokes the remainder of the chain, with the tuned
//! reqwest client as the terminal handler. Typical uses are auth headers,
//! request capture, and transport-level instrumentation.

use super::HttpTransport;
use crate::error::ProviderError;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// One outbound JSON-RPC batch about to be POSTed.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Per-request deadline; `None` falls back to the client-wide timeout.
    pub timeout: Option<Duration>,
}

/// Raw HTTP response handed back up the chain. Status is not interpreted
/// here so middleware can observe non-2xx responses.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
}

#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(
        &self,
        request: HttpRequest,
        next: Next<'_>,
    ) -> Result<HttpResponse, ProviderError>;
}

/// The rest of the middleware chain, ending at the reqwest execution.
pub struct Next<'a> {
    transport: &'a HttpTransport,
    rest: &'a [Arc<dyn Middleware>],
}

impl<'a> Next<'a> {
    pub(crate) fn new(transport: &'a HttpTransport, rest: &'a [Arc<dyn Middleware>]) -> Self {
        Self { transport, rest }
    }

    /// Invokes the next middleware, or the terminal HTTP execution when the
    /// chain is exhausted.
    pub async fn run(self, request: HttpRequest) -> Result<HttpResponse, ProviderError> {
        match self.rest.split_first() {
            Some((middleware, rest)) => {
                middleware.handle(request, Next::new(self.transport, rest)).await
            }
            None => self.transport.execute(request).await,
        }
    }
}
