//! Admission control for physical batch submissions.
//!
//! `tokio::sync::Semaphore` covers the plain "at most n at once" case, but
//! the batch client also needs to observe how many submissions are waiting
//! and to drop queued submissions without touching running ones. This
//! limiter keeps its own FIFO admission line to expose both.

use super::queue::Queue;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LimiterError {
    #[error("concurrency limit must be at least 1")]
    ZeroLimit,
    /// The queued job was dropped by `clear_queue` before it started.
    #[error("admission queue cleared before the job started")]
    Cleared,
}

#[derive(Debug, Default)]
struct LimiterState {
    active: usize,
    waiters: Queue<oneshot::Sender<LimiterPermit>>,
}

#[derive(Debug)]
struct LimiterShared {
    limit: usize,
    state: Mutex<LimiterState>,
}

impl LimiterShared {
    /// Frees one slot: hands it to the oldest live waiter, or decrements the
    /// active count when nobody is waiting.
    fn release(self: &Arc<Self>) {
        loop {
            let grant = {
                let mut state = self.state.lock();
                let Some(tx) = state.waiters.dequeue() else {
                    state.active -= 1;
                    return;
                };
                tx
            };
            let permit = LimiterPermit { shared: Some(Arc::clone(self)) };
            match grant.send(permit) {
                Ok(()) => return,
                Err(mut stale) => {
                    // Receiver gave up while queued; keep the slot and try
                    // the next waiter. Disarm so dropping the returned
                    // permit does not release a second time.
                    stale.shared = None;
                }
            }
        }
    }
}

/// RAII slot handle; dropping it releases the slot to the next waiter.
#[derive(Debug)]
pub struct LimiterPermit {
    shared: Option<Arc<LimiterShared>>,
}

impl Drop for LimiterPermit {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            shared.release();
        }
    }
}

/// Runs at most `limit` async jobs concurrently, admitting the overflow in
/// FIFO order. Cheap to clone; clones share the same slots.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    shared: Arc<LimiterShared>,
}

impl ConcurrencyLimiter {
    /// # Errors
    ///
    /// Returns [`LimiterError::ZeroLimit`] when `limit` is zero.
    pub fn new(limit: usize) -> Result<Self, LimiterError> {
        if limit == 0 {
            return Err(LimiterError::ZeroLimit);
        }
        Ok(Self {
            shared: Arc::new(LimiterShared { limit, state: Mutex::new(LimiterState::default()) }),
        })
    }

    /// A limiter that never queues.
    #[must_use]
    pub fn unbounded() -> Self {
        Self {
            shared: Arc::new(LimiterShared {
                limit: usize::MAX,
                state: Mutex::new(LimiterState::default()),
            }),
        }
    }

    /// Waits for a free slot.
    ///
    /// # Errors
    ///
    /// Returns [`LimiterError::Cleared`] when `clear_queue` drops this
    /// admission before a slot frees.
    pub async fn acquire(&self) -> Result<LimiterPermit, LimiterError> {
        let waiter = {
            let mut state = self.shared.state.lock();
            if state.active < self.shared.limit {
                state.active += 1;
                None
            } else {
                let (tx, rx) = oneshot::channel();
                state.waiters.enqueue(tx);
                Some(rx)
            }
        };
        match waiter {
            None => Ok(LimiterPermit { shared: Some(Arc::clone(&self.shared)) }),
            Some(rx) => rx.await.map_err(|_| LimiterError::Cleared),
        }
    }

    /// Acquires a slot, runs the job, releases the slot.
    ///
    /// # Errors
    ///
    /// Returns [`LimiterError::Cleared`] when the queued job is dropped
    /// before starting; jobs that began running always complete.
    pub async fn run<F, Fut>(&self, job: F) -> Result<Fut::Output, LimiterError>
    where
        F: FnOnce() -> Fut,
        Fut: Future,
    {
        let _permit = self.acquire().await?;
        Ok(job().await)
    }

    /// Number of jobs currently holding a slot.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.shared.state.lock().active
    }

    /// Number of admissions waiting for a slot.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.shared.state.lock().waiters.len()
    }

    /// Drops every queued admission; running jobs are untouched. Each
    /// dropped admission resolves with [`LimiterError::Cleared`].
    pub fn clear_queue(&self) {
        let dropped = {
            let mut state = self.shared.state.lock();
            std::mem::take(&mut state.waiters)
        };
        drop(dropped);
    }
}
