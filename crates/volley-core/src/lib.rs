//! # Volley Core
//!
//! Core library for Volley, a batching and failover client for
//! Ethereum-compatible JSON-RPC endpoints.
//!
//! The crate is built from the following pieces:
//!
//! - **[`batch`]**: Single-endpoint batching client that coalesces
//!   concurrent calls into physical JSON-RPC batch requests and
//!   demultiplexes responses back to callers by request id.
//!
//! - **[`provider`]**: Multi-endpoint failover orchestrator with capped
//!   exponential retry, chain-identity validation across endpoints, and a
//!   deadline-bounded transaction confirmation waiter.
//!
//! - **[`transport`]**: Shared HTTP/2 transport with connection pooling,
//!   scrubbed error rendering, and an outbound middleware chain.
//!
//! - **[`config`]**: Layered configuration loading with validation, from
//!   files and `VOLLEY__`-prefixed environment variables.
//!
//! - **[`events`]**: Broadcast channel of typed provider notifications for
//!   observability consumers.
//!
//! - **[`utils`]**: FIFO queue, concurrency limiter, retrier, and bounded
//!   error sanitation shared by the layers above.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       FallbackProvider                      │
//! │  ┌──────────────────┐  ┌──────────────────┐  ┌───────────┐  │
//! │  │ NetworkDetection │  │ ActiveEndpoint   │  │ EventBus  │  │
//! │  │ (chain identity) │  │ (rotation index) │  │           │  │
//! │  └────────┬─────────┘  └────────┬─────────┘  └─────┬─────┘  │
//! │           │                     │                  │        │
//! │  ┌────────▼─────────────────────▼──────┐           │        │
//! │  │   BatchedClient (one per endpoint)  │───────────┘        │
//! │  │   Queue · Limiter · id demux        │                    │
//! │  └────────┬────────────────────────────┘                    │
//! │           │                                                 │
//! │  ┌────────▼────────┐                                        │
//! │  │  HttpTransport  │                                        │
//! │  │  (middleware)   │                                        │
//! │  └─────────────────┘                                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Call Flow
//!
//! ```text
//! call(method, params)
//!       │
//!       ▼
//! ┌──────────────────┐
//! │ Network detected?│ ─── No ──► probe eth_chainId on every
//! └──────┬───────────┘            reachable endpoint, validate,
//!        │ Yes                    cache identity, arm reset timer
//!        ▼
//! ┌──────────────────┐
//! │ Active endpoint  │ ◄── rotate (mod N) when a retry
//! │    selection     │     budget is exhausted
//! └──────┬───────────┘
//!        │
//!        ▼
//! ┌──────────────────┐
//! │  BatchedClient   │ enqueue; aggregator tick drains the
//! │     .call()      │ queue into one physical batch
//! └──────┬───────────┘
//!        │
//!        ▼
//! ┌──────────────────┐
//! │ ConcurrencyLimi- │ ─── slot ──► HTTP POST (JSON array)
//! │ ter admission    │
//! └──────┬───────────┘
//!        │
//!        ▼
//!   demux by id ──► settle each caller (result, rpc error,
//!                   or protocol violation for missing ids)
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod events;
pub mod provider;
pub mod transport;
pub mod types;
pub mod utils;
