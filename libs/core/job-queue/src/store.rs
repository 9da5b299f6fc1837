//! Backing-store abstraction for the queue.
//!
//! A store owns job records and the waiting/active/completed/failed sets.
//! `claim` must be atomic: one job is handed to exactly one caller, and the
//! record reads `active` from the moment it leaves the waiting set.
//!
//! Every active job carries a lease deadline. A job whose lease runs out is
//! considered stalled (its worker crashed or hung) and is handed back through
//! [`QueueStore::reclaim_stalled`].

use crate::error::QueueResult;
use crate::job::{JobId, NewJob, QueueCounts, StoredJob};
use async_trait::async_trait;

/// How many finished jobs a store keeps for inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retention {
    pub keep_completed: usize,
    pub keep_failed: usize,
}

impl Default for Retention {
    fn default() -> Self {
        Self {
            keep_completed: 100,
            keep_failed: 50,
        }
    }
}

#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Queue name, used for logging and metric labels.
    fn queue_name(&self) -> &str;

    /// Insert a job into the waiting set and return its new id.
    async fn insert(&self, job: NewJob) -> QueueResult<JobId>;

    /// Atomically move the next ready job (lowest `(ready_at, id)`) to active,
    /// leased until `lease_until_ms`.
    ///
    /// Returns `None` when paused or when nothing is ready at `now_ms`.
    async fn claim(&self, now_ms: i64, lease_until_ms: i64) -> QueueResult<Option<StoredJob>>;

    /// Take over up to `limit` active jobs whose lease expired at or before
    /// `now_ms`, extending their lease to `lease_until_ms`.
    ///
    /// The jobs stay active; the caller settles them with `retry_later` or `fail`.
    async fn reclaim_stalled(
        &self,
        now_ms: i64,
        lease_until_ms: i64,
        limit: usize,
    ) -> QueueResult<Vec<StoredJob>>;

    /// Move an active job to completed.
    async fn complete(&self, id: JobId, finished_at_ms: i64) -> QueueResult<()>;

    /// Move an active job back to waiting, ready at `ready_at_ms`.
    async fn retry_later(
        &self,
        id: JobId,
        attempts_made: u32,
        error: &str,
        ready_at_ms: i64,
    ) -> QueueResult<()>;

    /// Move an active job to failed.
    async fn fail(
        &self,
        id: JobId,
        attempts_made: u32,
        error: &str,
        finished_at_ms: i64,
    ) -> QueueResult<()>;

    async fn counts(&self, now_ms: i64) -> QueueResult<QueueCounts>;

    async fn set_paused(&self, paused: bool) -> QueueResult<()>;

    async fn is_paused(&self) -> QueueResult<bool>;

    /// Discard every job that has not been dispatched yet (waiting and delayed).
    async fn drain(&self) -> QueueResult<u64>;

    /// Move every failed job back to waiting with `attempts_made = 0`, ready at `now_ms`.
    async fn retry_failed(&self, now_ms: i64) -> QueueResult<u64>;

    /// Failed jobs, most recently failed first.
    async fn failed(&self, limit: usize) -> QueueResult<Vec<StoredJob>>;

    async fn get(&self, id: JobId) -> QueueResult<Option<StoredJob>>;

    /// Backing-store connectivity check.
    async fn ping(&self) -> QueueResult<()> {
        Ok(())
    }
}
