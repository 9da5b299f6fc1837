//! Processor trait and the generic worker loop.

use crate::config::WorkerConfig;
use crate::error::{JobError, QueueResult};
use crate::job::{Job, JobPayload, StoredJob};
use crate::queue::JobQueue;
use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Semaphore, watch};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

/// Trait for job processors.
///
/// Return `Ok(())` for success. A [`JobError`] sends the job back through the
/// queue's backoff machinery (transient) or straight to `failed` (permanent).
#[async_trait]
pub trait JobProcessor<P: JobPayload>: Send + Sync {
    async fn process(&self, job: &Job<P>) -> Result<(), JobError>;

    /// Get the processor name for logging.
    fn name(&self) -> &'static str;

    /// Override this to check downstream dependencies.
    async fn health_check(&self) -> Result<bool, JobError> {
        Ok(true)
    }
}

/// Pulls ready jobs from a [`JobQueue`] and runs them through a processor.
///
/// Up to `concurrency` jobs are in flight at once; each job is claimed
/// atomically so several workers may share one queue. A processor panic counts
/// as a failed attempt, and jobs abandoned by a crashed worker are picked up
/// again once their lease expires.
pub struct QueueWorker<P, H> {
    queue: JobQueue<P>,
    processor: Arc<H>,
    config: WorkerConfig,
    concurrency_semaphore: Arc<Semaphore>,
}

impl<P, H> QueueWorker<P, H>
where
    P: JobPayload,
    H: JobProcessor<P> + 'static,
{
    pub fn new(queue: JobQueue<P>, processor: H, config: WorkerConfig) -> Self {
        Self::with_arc_processor(queue, Arc::new(processor), config)
    }

    pub fn with_arc_processor(queue: JobQueue<P>, processor: Arc<H>, config: WorkerConfig) -> Self {
        let concurrency_semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));
        Self {
            queue,
            processor,
            config,
            concurrency_semaphore,
        }
    }

    pub fn queue(&self) -> &JobQueue<P> {
        &self.queue
    }

    pub fn processor(&self) -> &Arc<H> {
        &self.processor
    }

    /// Run the worker loop until `shutdown` flips to `true`.
    ///
    /// In-flight jobs are allowed to finish before this returns.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> QueueResult<()> {
        info!(
            queue = %self.queue.name(),
            processor = %self.processor.name(),
            concurrency = self.config.concurrency,
            poll_interval_ms = self.config.poll_interval_ms,
            lease_ms = self.queue.lease_ms(),
            stalled_check_interval_ms = self.config.stalled_check_interval_ms,
            "Starting queue worker"
        );

        // Pick up whatever a previous process left behind
        self.recover_stalled_jobs().await;
        let stalled_check_interval = Duration::from_millis(self.config.stalled_check_interval_ms);
        let mut last_stalled_check = tokio::time::Instant::now();

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let mut join_set: JoinSet<()> = JoinSet::new();
        let mut consecutive_errors: u32 = 0;

        loop {
            if *shutdown.borrow() {
                info!("Received shutdown signal, stopping worker");
                break;
            }

            if last_stalled_check.elapsed() >= stalled_check_interval {
                self.recover_stalled_jobs().await;
                last_stalled_check = tokio::time::Instant::now();
            }

            let mut claimed = 0usize;
            while let Ok(permit) = self.concurrency_semaphore.clone().try_acquire_owned() {
                match self.queue.claim_next().await {
                    Ok(Some(job)) => {
                        if consecutive_errors > 0 {
                            info!(consecutive_errors, "Queue store recovered");
                            consecutive_errors = 0;
                        }
                        claimed += 1;
                        let queue = self.queue.clone();
                        let processor = Arc::clone(&self.processor);
                        join_set.spawn(async move {
                            handle_job(&queue, &processor, job).await;
                            drop(permit);
                        });
                    }
                    Ok(None) => break,
                    Err(e) => {
                        consecutive_errors = consecutive_errors.saturating_add(1);
                        let backoff_ms = self.config.error_backoff_ms(consecutive_errors);
                        warn!(
                            error = %e,
                            consecutive_errors,
                            backoff_ms,
                            "Failed to claim job, backing off"
                        );
                        tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                        break;
                    }
                }
            }

            while let Some(result) = join_set.try_join_next() {
                if let Err(e) = result {
                    error!(error = %e, "Job task panicked");
                }
            }

            if claimed > 0 {
                continue;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Received shutdown signal, stopping worker");
                        break;
                    }
                }
                Some(result) = join_set.join_next(), if !join_set.is_empty() => {
                    if let Err(e) = result {
                        error!(error = %e, "Job task panicked");
                    }
                }
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }

        if !join_set.is_empty() {
            info!(in_flight = join_set.len(), "Waiting for in-flight jobs");
        }
        while let Some(result) = join_set.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Job task panicked");
            }
        }

        info!("Queue worker stopped");
        Ok(())
    }

    /// Process every job that is ready right now, one at a time.
    ///
    /// Stalled jobs are settled first. Returns the number of attempts made;
    /// jobs rescheduled into the future by their backoff are left for a later call.
    pub async fn process_ready(&self) -> QueueResult<usize> {
        self.queue.recover_stalled().await?;

        let mut processed = 0;
        while let Some(job) = self.queue.claim_next().await? {
            handle_job(&self.queue, &self.processor, job).await;
            processed += 1;
        }
        Ok(processed)
    }

    async fn recover_stalled_jobs(&self) {
        if let Err(e) = self.queue.recover_stalled().await {
            warn!(queue = %self.queue.name(), error = %e, "Stalled job sweep failed");
        }
    }
}

async fn handle_job<P, H>(queue: &JobQueue<P>, processor: &Arc<H>, stored: StoredJob)
where
    P: JobPayload,
    H: JobProcessor<P> + 'static,
{
    let started = Instant::now();
    debug!(job_id = stored.id, kind = %stored.kind, attempt = stored.attempts_made + 1, "Processing job");

    let result = match stored.decode::<P>() {
        Ok(job) => {
            let processor = Arc::clone(processor);
            // A panic comes back as a JoinError
            tokio::spawn(async move { processor.process(&job).await })
                .await
                .unwrap_or_else(|e| Err(aborted_attempt(e)))
        }
        Err(e) => Err(JobError::permanent(format!("Undecodable payload: {e}"))),
    };

    let recorded = match result {
        Ok(()) => queue.record_success(&stored, started.elapsed()).await,
        Err(err) => queue.record_failure(&stored, &err).await.map(|_| ()),
    };

    if let Err(e) = recorded {
        error!(job_id = stored.id, error = %e, "Failed to record job outcome");
    }
}

fn aborted_attempt(err: JoinError) -> JobError {
    if err.is_panic() {
        let message = panic_message(err.into_panic());
        error!(panic = %message, "Job processor panicked");
        JobError::transient(format!("Processor panicked: {message}"))
    } else {
        JobError::transient(format!("Processor task cancelled: {err}"))
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => payload
            .downcast_ref::<&'static str>()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown panic".to_string()),
    }
}
