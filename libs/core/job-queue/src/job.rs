//! Job records as they live in the queue's backing store.

use crate::backoff::BackoffPolicy;
use crate::error::QueueResult;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Queue-assigned, monotonic per queue.
pub type JobId = u64;

/// Payload types carried by a [`JobQueue`](crate::JobQueue).
///
/// The payload is serialized once at enqueue time and never rewritten by the
/// queue; retries deliver exactly the same bytes.
pub trait JobPayload: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Job kind used for dispatch and metrics labels.
    fn kind(&self) -> &'static str;
}

/// Per-job retry and scheduling options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOptions {
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
    pub delay_ms: u64,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffPolicy::default(),
            delay_ms: 0,
        }
    }
}

impl JobOptions {
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Ready to be claimed now
    Waiting,
    /// Waiting, but its ready time is still in the future. Never stored; derived.
    Delayed,
    Active,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Waiting => "waiting",
            JobStatus::Delayed => "delayed",
            JobStatus::Active => "active",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

/// A job about to be inserted; the store assigns its id.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub kind: String,
    pub payload: serde_json::Value,
    pub options: JobOptions,
    pub enqueued_at_ms: i64,
    pub ready_at_ms: i64,
}

impl NewJob {
    pub fn into_stored(self, id: JobId) -> StoredJob {
        StoredJob {
            id,
            kind: self.kind,
            payload: self.payload,
            attempts_made: 0,
            max_attempts: self.options.max_attempts,
            backoff: self.options.backoff,
            delay_ms: self.options.delay_ms,
            ready_at_ms: self.ready_at_ms,
            status: JobStatus::Waiting,
            last_error: None,
            enqueued_at_ms: self.enqueued_at_ms,
            finished_at_ms: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredJob {
    pub id: JobId,
    pub kind: String,
    pub payload: serde_json::Value,
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
    /// Delay requested at enqueue time, stagger included
    pub delay_ms: u64,
    pub ready_at_ms: i64,
    pub status: JobStatus,
    pub last_error: Option<String>,
    pub enqueued_at_ms: i64,
    pub finished_at_ms: Option<i64>,
}

impl StoredJob {
    /// Status as seen at `now_ms`, resolving waiting jobs not yet ready to `Delayed`.
    pub fn status_at(&self, now_ms: i64) -> JobStatus {
        match self.status {
            JobStatus::Waiting if self.ready_at_ms > now_ms => JobStatus::Delayed,
            other => other,
        }
    }

    pub fn attempts_remaining(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempts_made)
    }

    /// Decode the payload into its typed form.
    pub fn decode<P: JobPayload>(&self) -> QueueResult<Job<P>> {
        Ok(Job {
            id: self.id,
            payload: serde_json::from_value(self.payload.clone())?,
            attempts_made: self.attempts_made,
            max_attempts: self.max_attempts,
        })
    }
}

/// A claimed job handed to a processor.
#[derive(Debug, Clone)]
pub struct Job<P> {
    pub id: JobId,
    pub payload: P,
    /// Failed attempts before this one
    pub attempts_made: u32,
    pub max_attempts: u32,
}

/// Point-in-time job counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
    pub delayed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(ready_at_ms: i64) -> StoredJob {
        NewJob {
            kind: "send-email".to_string(),
            payload: serde_json::json!({"kind": "send-email"}),
            options: JobOptions::default(),
            enqueued_at_ms: 0,
            ready_at_ms,
        }
        .into_stored(1)
    }

    #[test]
    fn test_default_options() {
        let options = JobOptions::default();
        assert_eq!(options.max_attempts, 3);
        assert_eq!(options.backoff, BackoffPolicy::exponential(2000));
        assert_eq!(options.delay_ms, 0);
    }

    #[test]
    fn test_max_attempts_floor_is_one() {
        assert_eq!(JobOptions::default().with_max_attempts(0).max_attempts, 1);
    }

    #[test]
    fn test_status_resolves_delayed() {
        let job = stored(5_000);
        assert_eq!(job.status_at(4_999), JobStatus::Delayed);
        assert_eq!(job.status_at(5_000), JobStatus::Waiting);
        assert_eq!(job.attempts_remaining(), 3);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&JobStatus::Failed).unwrap(), "\"failed\"");
        assert_eq!(JobStatus::Delayed.as_str(), "delayed");
    }
}
