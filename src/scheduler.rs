//! Bounded-concurrency write scheduling (§4.4).
//!
//! A global semaphore caps total concurrent chunk writes across every
//! session; a per-session semaphore further bounds how many of those
//! global slots one session may hold at once. Sessions beyond their
//! per-session concurrency cap queue up to a bounded depth and fail fast
//! with `Overloaded` past it, rather than growing an unbounded queue.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore};

use crate::error::{CoordinatorError, Result};
use crate::model::SessionHandle;

struct SessionSlot {
    semaphore: Arc<Semaphore>,
    queued: Arc<std::sync::atomic::AtomicUsize>,
}

/// Dispatches chunk-write work under a global cap and a per-session cap,
/// with a wall-clock timeout on each admitted write.
pub struct Scheduler {
    global: Arc<Semaphore>,
    per_session_permits: usize,
    max_queue_per_session: usize,
    write_timeout: Duration,
    sessions: Mutex<HashMap<SessionHandle, Arc<SessionSlot>>>,
}

impl Scheduler {
    pub fn new(
        max_parallel_writes: usize,
        max_parallel_per_session: usize,
        max_queue_per_session: usize,
        write_timeout_secs: u64,
    ) -> Self {
        Self {
            global: Arc::new(Semaphore::new(max_parallel_writes)),
            per_session_permits: max_parallel_per_session,
            max_queue_per_session,
            write_timeout: Duration::from_secs(write_timeout_secs),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    async fn slot_for(&self, handle: SessionHandle) -> Arc<SessionSlot> {
        let mut sessions = self.sessions.lock().await;
        sessions
            .entry(handle)
            .or_insert_with(|| {
                Arc::new(SessionSlot {
                    semaphore: Arc::new(Semaphore::new(self.per_session_permits)),
                    queued: Arc::new(std::sync::atomic::AtomicUsize::new(0)),
                })
            })
            .clone()
    }

    /// Drops the per-session bookkeeping once a session reaches a terminal
    /// state, so aborted/completed sessions don't linger in the map.
    pub async fn forget_session(&self, handle: SessionHandle) {
        self.sessions.lock().await.remove(&handle);
    }

    /// Runs `task` once both a global and a per-session slot are free,
    /// enforcing the write timeout around the task itself. Queued callers
    /// beyond `max_queue_per_session` are rejected immediately with
    /// `Overloaded` rather than waiting on the per-session semaphore —
    /// round-robin fairness across sessions falls out of Tokio's
    /// FIFO-per-semaphore wakeup order, since every session contends on
    /// the same global semaphore independently of queue position.
    pub async fn schedule<F, Fut, T>(&self, handle: SessionHandle, task: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let slot = self.slot_for(handle).await;

        let queued_now = slot
            .queued
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
            + 1;
        if queued_now > self.max_queue_per_session {
            slot.queued.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
            return Err(CoordinatorError::Overloaded {
                retry_after_secs: 1,
            });
        }

        let result = (async {
            let _session_permit = slot
                .semaphore
                .acquire()
                .await
                .map_err(|_| CoordinatorError::Cancelled)?;
            let _global_permit = self
                .global
                .acquire()
                .await
                .map_err(|_| CoordinatorError::Cancelled)?;

            match tokio::time::timeout(self.write_timeout, task()).await {
                Ok(inner) => inner,
                Err(_) => Err(CoordinatorError::Timeout),
            }
        })
        .await;

        slot.queued.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
        result
    }
}
