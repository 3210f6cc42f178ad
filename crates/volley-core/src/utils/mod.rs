//! Shared leaf utilities: the FIFO queue and admission limiter that pace
//! batch submission, the backoff retrier the orchestrator drives, and the
//! sanitizer that keeps hostile error payloads bounded.

pub mod limiter;
pub mod queue;
pub mod retry;
pub mod sanitize;

pub use limiter::{ConcurrencyLimiter, LimiterError, LimiterPermit};
pub use queue::Queue;
pub use retry::Retrier;
