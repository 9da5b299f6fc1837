//! The notification queue: rendered emails waiting for the worker.

use std::sync::Arc;

use job_queue::{Clock, JobId, JobOptions, JobQueue, QueueControl, QueueCounts, QueueStore, StoredJob};

use crate::error::NotificationResult;
use crate::models::{NotificationJob, OutboundEmail};

/// Typed wrapper over [`JobQueue`] for `send-email` jobs. Queue failures
/// surface as [`NotificationError::QueueUnavailable`](crate::NotificationError).
#[derive(Clone)]
pub struct NotificationQueue {
    jobs: JobQueue<NotificationJob>,
}

impl NotificationQueue {
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self {
            jobs: JobQueue::new(store),
        }
    }

    pub fn with_clock(store: Arc<dyn QueueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            jobs: JobQueue::with_clock(store, clock),
        }
    }

    /// Set how long a claimed job may run before it is retried as stalled.
    pub fn with_lease_ms(self, lease_ms: u64) -> Self {
        Self {
            jobs: self.jobs.with_lease_ms(lease_ms),
        }
    }

    /// The underlying job queue, for the worker.
    pub fn jobs(&self) -> &JobQueue<NotificationJob> {
        &self.jobs
    }

    pub fn control(&self) -> &QueueControl {
        self.jobs.control()
    }

    pub fn name(&self) -> &str {
        self.jobs.name()
    }

    /// Enqueue one message; undeliverable messages are rejected up front. Defaults: 3 attempts, exponential backoff from 2s, no delay.
    pub async fn enqueue(&self, email: OutboundEmail, options: Option<JobOptions>) -> NotificationResult<JobId> {
        email.validate()?;
        let job = NotificationJob::SendEmail(email);
        Ok(self.jobs.enqueue_with(&job, options.unwrap_or_default()).await?)
    }

    /// Enqueue a batch; message `i` is held back an extra `i * 100ms`.
    ///
    /// Nothing is enqueued if any message fails validation.
    pub async fn enqueue_bulk(
        &self,
        emails: Vec<OutboundEmail>,
        options: Option<JobOptions>,
    ) -> NotificationResult<Vec<JobId>> {
        for email in &emails {
            email.validate()?;
        }
        let jobs: Vec<NotificationJob> = emails.into_iter().map(NotificationJob::SendEmail).collect();
        Ok(self.jobs.enqueue_bulk(&jobs, options.unwrap_or_default()).await?)
    }

    pub async fn status(&self) -> NotificationResult<QueueCounts> {
        Ok(self.jobs.status().await?)
    }

    pub async fn pause(&self) -> NotificationResult<()> {
        Ok(self.jobs.pause().await?)
    }

    pub async fn resume(&self) -> NotificationResult<()> {
        Ok(self.jobs.resume().await?)
    }

    pub async fn drain(&self) -> NotificationResult<u64> {
        Ok(self.jobs.drain().await?)
    }

    pub async fn retry_failed_jobs(&self) -> NotificationResult<u64> {
        Ok(self.jobs.retry_failed_jobs().await?)
    }

    pub async fn failed_jobs(&self, limit: usize) -> NotificationResult<Vec<StoredJob>> {
        Ok(self.jobs.failed_jobs(limit).await?)
    }

    pub async fn get(&self, id: JobId) -> NotificationResult<Option<StoredJob>> {
        Ok(self.jobs.get(id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use job_queue::{BackoffPolicy, ManualClock, MemoryQueueStore};

    fn queue() -> (NotificationQueue, ManualClock) {
        let clock = ManualClock::new(1_000);
        let store = Arc::new(MemoryQueueStore::new("notifications-test"));
        (NotificationQueue::with_clock(store, Arc::new(clock.clone())), clock)
    }

    #[tokio::test]
    async fn test_enqueue_stores_rendered_payload() {
        let (queue, _) = queue();
        let email = OutboundEmail::new("a@example.com", "Hi").with_html("<p>Hi</p>");

        let id = queue.enqueue(email.clone(), None).await.unwrap();
        let job = queue.get(id).await.unwrap().unwrap();

        assert_eq!(job.kind, "send-email");
        assert_eq!(job.max_attempts, 3);
        assert_eq!(job.backoff, BackoffPolicy::exponential(2000));
        assert_eq!(job.decode::<NotificationJob>().unwrap().payload, NotificationJob::SendEmail(email));
    }

    #[tokio::test]
    async fn test_enqueue_bulk_staggers() {
        let (queue, _) = queue();
        let emails = (0..3)
            .map(|i| OutboundEmail::new(format!("t{}@example.com", i), "Notice"))
            .collect();

        let ids = queue.enqueue_bulk(emails, None).await.unwrap();
        let mut ready = Vec::new();
        for id in ids {
            ready.push(queue.get(id).await.unwrap().unwrap().ready_at_ms);
        }
        assert_eq!(ready, vec![1_000, 1_100, 1_200]);

        let counts = queue.status().await.unwrap();
        assert_eq!(counts.waiting, 1);
        assert_eq!(counts.delayed, 2);
    }

    #[tokio::test]
    async fn test_custom_options() {
        let (queue, clock) = queue();
        let options = JobOptions::default()
            .with_max_attempts(5)
            .with_backoff(BackoffPolicy::fixed(500))
            .with_delay_ms(10_000);

        let id = queue
            .enqueue(OutboundEmail::new("a@example.com", "Later"), Some(options))
            .await
            .unwrap();
        let job = queue.get(id).await.unwrap().unwrap();
        assert_eq!(job.max_attempts, 5);
        assert_eq!(job.ready_at_ms, 11_000);

        assert_eq!(queue.status().await.unwrap().delayed, 1);
        clock.advance(10_000);
        assert_eq!(queue.status().await.unwrap().waiting, 1);
    }

    #[tokio::test]
    async fn test_undeliverable_messages_never_enter_the_queue() {
        let (queue, _) = queue();

        let err = queue
            .enqueue(OutboundEmail::new(Vec::<String>::new(), "Nobody"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::NotificationError::InvalidAddress(_)));

        let batch = vec![
            OutboundEmail::new("a@example.com", "Notice"),
            OutboundEmail::new(Vec::<String>::new(), "Notice"),
        ];
        assert!(queue.enqueue_bulk(batch, None).await.is_err());
        assert_eq!(queue.status().await.unwrap(), QueueCounts::default());
    }
}
