//! Error types for the notifications domain.

use core_config::ConfigError;
use job_queue::{ErrorCategory, JobError, QueueError};
use thiserror::Error;

/// Result type for notification operations.
pub type NotificationResult<T> = Result<T, NotificationError>;

/// Errors that can occur in the notifications domain.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// No stored template with this name, even after the self-heal backfill.
    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    /// Template source failed to parse or calls a helper that is not registered.
    #[error("Template '{name}' failed to compile: {message}")]
    TemplateCompile { name: String, message: String },

    /// Template parsed but rendering failed (missing partial, bad helper argument, ...).
    #[error("Template '{name}' failed to render: {message}")]
    TemplateRender { name: String, message: String },

    /// Mail provider rejected or failed the send.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Send did not finish within the configured timeout.
    #[error("Transport timed out after {0}ms")]
    TransportTimeout(u64),

    /// Queue backing store unreachable or misbehaving.
    #[error("Queue unavailable: {0}")]
    QueueUnavailable(String),

    /// Address did not parse as a mailbox, or the message has nowhere to go.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template asset bundle could not be read.
    #[error("Template assets error: {0}")]
    Assets(String),

    /// Template store error.
    #[error("Database error: {0}")]
    Database(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Context or payload (de)serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl NotificationError {
    /// Whether a queued delivery failing with this error should be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            NotificationError::Transport(_)
                | NotificationError::TransportTimeout(_)
                | NotificationError::QueueUnavailable(_)
        )
    }

    pub fn category(&self) -> ErrorCategory {
        if self.is_retryable() {
            ErrorCategory::Transient
        } else {
            ErrorCategory::Permanent
        }
    }
}

impl From<NotificationError> for JobError {
    fn from(err: NotificationError) -> Self {
        match err.category() {
            ErrorCategory::Transient => JobError::transient(err.to_string()),
            ErrorCategory::Permanent => JobError::permanent(err.to_string()),
        }
    }
}

impl From<QueueError> for NotificationError {
    fn from(err: QueueError) -> Self {
        NotificationError::QueueUnavailable(err.to_string())
    }
}

impl From<sea_orm::DbErr> for NotificationError {
    fn from(err: sea_orm::DbErr) -> Self {
        NotificationError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for NotificationError {
    fn from(err: serde_json::Error) -> Self {
        NotificationError::Serialization(err.to_string())
    }
}

impl From<ConfigError> for NotificationError {
    fn from(err: ConfigError) -> Self {
        NotificationError::Config(err.to_string())
    }
}

impl From<lettre::address::AddressError> for NotificationError {
    fn from(err: lettre::address::AddressError) -> Self {
        NotificationError::InvalidAddress(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_errors_are_transient() {
        let job_err: JobError = NotificationError::Transport("connection refused".into()).into();
        assert!(!job_err.is_permanent());
        assert!(job_err.message.contains("connection refused"));

        let job_err: JobError = NotificationError::TransportTimeout(30_000).into();
        assert!(!job_err.is_permanent());
    }

    #[test]
    fn test_address_errors_are_permanent() {
        let job_err: JobError = NotificationError::InvalidAddress("nope".into()).into();
        assert!(job_err.is_permanent());
    }

    #[test]
    fn test_queue_error_maps_to_unavailable() {
        let err: NotificationError = QueueError::Config("bad".into()).into();
        assert!(matches!(err, NotificationError::QueueUnavailable(_)));
    }
}
