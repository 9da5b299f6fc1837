//! Queue worker processor for notification jobs.

use async_trait::async_trait;
use job_queue::{Job, JobError, JobProcessor};
use tracing::{debug, warn};

use crate::models::NotificationJob;
use crate::transport::Transport;

/// Delivers queued, already-rendered emails through the transport.
///
/// No rendering and no business logic happen here; a failed send goes back
/// to the queue's backoff machinery.
pub struct NotificationProcessor {
    transport: Transport,
}

impl NotificationProcessor {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl JobProcessor<NotificationJob> for NotificationProcessor {
    async fn process(&self, job: &Job<NotificationJob>) -> Result<(), JobError> {
        match &job.payload {
            NotificationJob::SendEmail(email) => {
                debug!(
                    job_id = job.id,
                    attempt = job.attempts_made + 1,
                    to = %email.to,
                    "Delivering queued email"
                );

                let sent = self.transport.send(email).await.map_err(|e| {
                    warn!(job_id = job.id, error = %e, "Queued email delivery failed");
                    JobError::from(e)
                })?;

                debug!(job_id = job.id, message_id = ?sent.message_id, "Queued email delivered");
                Ok(())
            }
        }
    }

    fn name(&self) -> &'static str {
        "NotificationProcessor"
    }

    async fn health_check(&self) -> Result<bool, JobError> {
        self.transport.health_check().await.map_err(JobError::from)
    }
}
