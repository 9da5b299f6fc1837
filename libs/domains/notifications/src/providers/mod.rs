//! Email provider implementations.
//!
//! This module contains the `EmailProvider` trait and implementations
//! for the SMTP relay and an in-process mock.

mod mock;
mod smtp;

pub use mock::MockEmailProvider;
pub use smtp::{CaptureMailbox, SmtpProvider};

use crate::error::NotificationResult;
use crate::models::{OutboundEmail, SentEmail};
use async_trait::async_trait;

/// Trait for email sending providers.
#[async_trait]
pub trait EmailProvider: Send + Sync {
    /// Send an email. Errors are returned as-is; retrying is the queue's job.
    async fn send(&self, email: &OutboundEmail) -> NotificationResult<SentEmail>;

    /// Get the provider name for logging.
    fn name(&self) -> &'static str;

    /// Check if the provider is reachable.
    async fn health_check(&self) -> NotificationResult<bool>;
}
