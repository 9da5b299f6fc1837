//! Typed queue facade over a [`QueueStore`].

use crate::clock::{Clock, SystemClock};
use crate::error::{JobError, QueueResult};
use crate::job::{JobId, JobOptions, JobPayload, JobStatus, NewJob, QueueCounts, StoredJob};
use crate::metrics::QueueMetrics;
use crate::store::QueueStore;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Extra delay per position in a bulk enqueue.
pub const BULK_STAGGER_MS: u64 = 100;

/// How long a claimed job may stay active before it counts as stalled.
pub const DEFAULT_LEASE_MS: u64 = 300_000;

/// Stalled jobs settled per recovery sweep.
const RECOVERY_BATCH: usize = 100;

/// Payload-agnostic operations on a queue: introspection and operator controls.
#[derive(Clone)]
pub struct QueueControl {
    store: Arc<dyn QueueStore>,
    clock: Arc<dyn Clock>,
    metrics: QueueMetrics,
}

impl QueueControl {
    pub fn new(store: Arc<dyn QueueStore>, clock: Arc<dyn Clock>) -> Self {
        let metrics = QueueMetrics::new(store.queue_name());
        Self {
            store,
            clock,
            metrics,
        }
    }

    pub fn name(&self) -> &str {
        self.store.queue_name()
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Point-in-time counts; not transactional with concurrent enqueue/dequeue.
    pub async fn status(&self) -> QueueResult<QueueCounts> {
        let counts = self.store.counts(self.now_ms()).await?;
        self.metrics.record_counts(&counts);
        Ok(counts)
    }

    pub async fn pause(&self) -> QueueResult<()> {
        self.store.set_paused(true).await?;
        info!(queue = %self.name(), "Queue paused");
        Ok(())
    }

    pub async fn resume(&self) -> QueueResult<()> {
        self.store.set_paused(false).await?;
        info!(queue = %self.name(), "Queue resumed");
        Ok(())
    }

    pub async fn is_paused(&self) -> QueueResult<bool> {
        self.store.is_paused().await
    }

    /// Discard all jobs not yet dispatched. Active jobs are unaffected.
    pub async fn drain(&self) -> QueueResult<u64> {
        let drained = self.store.drain().await?;
        self.metrics.jobs_drained(drained);
        info!(queue = %self.name(), drained, "Queue drained");
        Ok(drained)
    }

    /// Re-enqueue every failed job at attempt 0.
    pub async fn retry_failed_jobs(&self) -> QueueResult<u64> {
        let retried = self.store.retry_failed(self.now_ms()).await?;
        self.metrics.failed_jobs_revived(retried);
        info!(queue = %self.name(), retried, "Failed jobs re-enqueued");
        Ok(retried)
    }

    /// Failed jobs, most recent first.
    pub async fn failed_jobs(&self, limit: usize) -> QueueResult<Vec<StoredJob>> {
        self.store.failed(limit).await
    }

    pub async fn get(&self, id: JobId) -> QueueResult<Option<StoredJob>> {
        self.store.get(id).await
    }

    pub async fn ping(&self) -> QueueResult<()> {
        self.store.ping().await
    }
}

/// Durable, at-least-once queue of `P` payloads.
///
/// A claimed job holds a lease; if it is neither completed nor failed before
/// the lease runs out, [`JobQueue::recover_stalled`] counts that as a failed
/// attempt and sends it back through the backoff policy.
pub struct JobQueue<P> {
    control: QueueControl,
    lease_ms: u64,
    _payload: PhantomData<fn() -> P>,
}

impl<P> Clone for JobQueue<P> {
    fn clone(&self) -> Self {
        Self {
            control: self.control.clone(),
            lease_ms: self.lease_ms,
            _payload: PhantomData,
        }
    }
}

impl<P: JobPayload> JobQueue<P> {
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn QueueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            control: QueueControl::new(store, clock),
            lease_ms: DEFAULT_LEASE_MS,
            _payload: PhantomData,
        }
    }

    /// Set how long a claimed job may run before it is treated as stalled.
    pub fn with_lease_ms(mut self, lease_ms: u64) -> Self {
        self.lease_ms = lease_ms.max(1);
        self
    }

    pub fn lease_ms(&self) -> u64 {
        self.lease_ms
    }

    pub fn control(&self) -> &QueueControl {
        &self.control
    }

    pub fn name(&self) -> &str {
        self.control.name()
    }

    /// Enqueue with the default options (3 attempts, exponential backoff from 2s).
    pub async fn enqueue(&self, payload: &P) -> QueueResult<JobId> {
        self.enqueue_with(payload, JobOptions::default()).await
    }

    pub async fn enqueue_with(&self, payload: &P, options: JobOptions) -> QueueResult<JobId> {
        let now = self.control.now_ms();
        self.insert(payload, options, now).await
    }

    /// Enqueue a batch; message `i` gets an extra `i * 100ms` on top of its own delay.
    pub async fn enqueue_bulk(&self, payloads: &[P], options: JobOptions) -> QueueResult<Vec<JobId>> {
        let now = self.control.now_ms();
        let mut ids = Vec::with_capacity(payloads.len());

        for (index, payload) in payloads.iter().enumerate() {
            let stagger = BULK_STAGGER_MS.saturating_mul(index as u64);
            let staggered = options.with_delay_ms(options.delay_ms.saturating_add(stagger));
            ids.push(self.insert(payload, staggered, now).await?);
        }

        info!(queue = %self.name(), count = ids.len(), "Bulk enqueued jobs");
        Ok(ids)
    }

    async fn insert(&self, payload: &P, options: JobOptions, now: i64) -> QueueResult<JobId> {
        let kind = payload.kind();
        let job = NewJob {
            kind: kind.to_string(),
            payload: serde_json::to_value(payload)?,
            options,
            enqueued_at_ms: now,
            ready_at_ms: now.saturating_add(clamp_ms(options.delay_ms)),
        };

        let id = self.control.store.insert(job).await?;
        self.control.metrics.job_enqueued(kind);
        debug!(queue = %self.name(), job_id = id, kind, delay_ms = options.delay_ms, "Job enqueued");
        Ok(id)
    }

    pub async fn status(&self) -> QueueResult<QueueCounts> {
        self.control.status().await
    }

    pub async fn pause(&self) -> QueueResult<()> {
        self.control.pause().await
    }

    pub async fn resume(&self) -> QueueResult<()> {
        self.control.resume().await
    }

    pub async fn drain(&self) -> QueueResult<u64> {
        self.control.drain().await
    }

    pub async fn retry_failed_jobs(&self) -> QueueResult<u64> {
        self.control.retry_failed_jobs().await
    }

    pub async fn failed_jobs(&self, limit: usize) -> QueueResult<Vec<StoredJob>> {
        self.control.failed_jobs(limit).await
    }

    pub async fn get(&self, id: JobId) -> QueueResult<Option<StoredJob>> {
        self.control.get(id).await
    }

    /// Claim the next ready job, if any, leased for `lease_ms`.
    pub async fn claim_next(&self) -> QueueResult<Option<StoredJob>> {
        let now = self.control.now_ms();
        self.control
            .store
            .claim(now, now.saturating_add(clamp_ms(self.lease_ms)))
            .await
    }

    /// Settle active jobs whose lease expired as failed attempts.
    ///
    /// Each one is retried with backoff, or parked as failed once its attempts
    /// are used up. Returns how many stalled jobs were found.
    pub async fn recover_stalled(&self) -> QueueResult<usize> {
        let now = self.control.now_ms();
        let stalled = self
            .control
            .store
            .reclaim_stalled(now, now.saturating_add(clamp_ms(self.lease_ms)), RECOVERY_BATCH)
            .await?;

        for job in &stalled {
            self.control.metrics.job_stalled(&job.kind);
            let error = JobError::transient(format!(
                "Job stalled: no outcome recorded within {}ms",
                self.lease_ms
            ));
            if let Err(e) = self.record_failure(job, &error).await {
                warn!(queue = %self.name(), job_id = job.id, error = %e, "Failed to settle stalled job");
            }
        }

        if !stalled.is_empty() {
            info!(queue = %self.name(), stalled = stalled.len(), "Recovered stalled jobs");
        }
        Ok(stalled.len())
    }

    pub async fn record_success(&self, job: &StoredJob, elapsed: Duration) -> QueueResult<()> {
        self.control.store.complete(job.id, self.control.now_ms()).await?;
        self.control.metrics.job_completed(&job.kind, elapsed);
        debug!(queue = %self.name(), job_id = job.id, "Job completed");
        Ok(())
    }

    /// Apply the job's backoff policy after a failed attempt.
    ///
    /// Returns `Delayed` when another attempt was scheduled, `Failed` when the
    /// job was parked.
    pub async fn record_failure(&self, job: &StoredJob, error: &JobError) -> QueueResult<JobStatus> {
        let attempts_made = job.attempts_made.saturating_add(1);
        let now = self.control.now_ms();

        if error.is_permanent() || attempts_made >= job.max_attempts {
            self.control
                .store
                .fail(job.id, attempts_made, &error.message, now)
                .await?;
            self.control
                .metrics
                .job_failed(&job.kind, error.category.as_str());
            warn!(
                queue = %self.name(),
                job_id = job.id,
                attempts_made,
                max_attempts = job.max_attempts,
                error = %error,
                "Job failed permanently"
            );
            return Ok(JobStatus::Failed);
        }

        let delay_ms = job.backoff.delay_after_failure(attempts_made);
        let ready_at = now.saturating_add(clamp_ms(delay_ms));
        self.control
            .store
            .retry_later(job.id, attempts_made, &error.message, ready_at)
            .await?;
        self.control.metrics.job_retried(&job.kind);
        warn!(
            queue = %self.name(),
            job_id = job.id,
            attempts_made,
            max_attempts = job.max_attempts,
            delay_ms,
            error = %error,
            "Job failed, retry scheduled"
        );
        Ok(JobStatus::Delayed)
    }
}

fn clamp_ms(ms: u64) -> i64 {
    i64::try_from(ms).unwrap_or(i64::MAX)
}
