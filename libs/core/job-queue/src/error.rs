//! Queue error types and error categorization
//!
//! Processing errors are categorized to decide what happens to a failed job:
//! - **Transient**: the job goes back to the queue under its backoff policy
//! - **Permanent**: the job moves straight to `failed`, whatever attempts remain

use thiserror::Error;

/// Category of a processing failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Temporary failure - retry under the job's backoff policy
    Transient,
    /// Unrecoverable error - park the job in `failed` immediately
    Permanent,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Transient => "transient",
            ErrorCategory::Permanent => "permanent",
        }
    }
}

/// Errors raised by the queue itself (backing store, encoding, configuration)
#[derive(Error, Debug)]
pub enum QueueError {
    /// Redis connection or command error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Job id is not known to the queue
    #[error("Job {0} not found")]
    NotFound(u64),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        QueueError::Serialization(err.to_string())
    }
}

pub type QueueResult<T> = Result<T, QueueError>;

/// Failure reported by a [`JobProcessor`](crate::JobProcessor).
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct JobError {
    pub message: String,
    pub category: ErrorCategory,
}

impl JobError {
    /// Create a transient processing error
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            category: ErrorCategory::Transient,
        }
    }

    /// Create a permanent processing error
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            category: ErrorCategory::Permanent,
        }
    }

    pub fn is_permanent(&self) -> bool {
        self.category == ErrorCategory::Permanent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_error_categories() {
        let transient = JobError::transient("connection reset");
        assert_eq!(transient.category, ErrorCategory::Transient);
        assert!(!transient.is_permanent());
        assert_eq!(transient.to_string(), "connection reset");

        let permanent = JobError::permanent("unknown job kind");
        assert!(permanent.is_permanent());
        assert_eq!(permanent.category.as_str(), "permanent");
    }

    #[test]
    fn test_serde_error_converts() {
        let err = serde_json::from_str::<u32>("nope").unwrap_err();
        let queue_err: QueueError = err.into();
        assert!(matches!(queue_err, QueueError::Serialization(_)));
    }
}
