//! Mock email provider for testing and local runs

use super::EmailProvider;
use crate::error::{NotificationError, NotificationResult};
use crate::models::{OutboundEmail, SentEmail};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// Mock email provider that captures sent emails
#[derive(Clone, Default)]
pub struct MockEmailProvider {
    sent_emails: Arc<Mutex<Vec<OutboundEmail>>>,
    failure_message: Arc<std::sync::Mutex<Option<String>>>,
    delay: Option<Duration>,
    attempts: Arc<AtomicUsize>,
}

impl MockEmailProvider {
    /// Create a new mock provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock provider that always fails
    pub fn failing(message: impl Into<String>) -> Self {
        let provider = Self::new();
        provider.set_failure(Some(message.into()));
        provider
    }

    /// Create a mock provider that takes `delay` per send
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Start (`Some`) or stop (`None`) failing every send.
    pub fn set_failure(&self, message: Option<String>) {
        let mut failure = self
            .failure_message
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *failure = message;
    }

    fn failure(&self) -> Option<String> {
        self.failure_message
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Get all sent emails
    pub async fn sent_emails(&self) -> Vec<OutboundEmail> {
        self.sent_emails.lock().await.clone()
    }

    /// Get the count of sent emails
    pub async fn sent_count(&self) -> usize {
        self.sent_emails.lock().await.len()
    }

    /// Sends attempted, failed ones included
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Clear all sent emails
    pub async fn clear(&self) {
        self.sent_emails.lock().await.clear();
    }

    /// Check if an email was sent to a specific address
    pub async fn was_sent_to(&self, address: &str) -> bool {
        self.sent_emails
            .lock()
            .await
            .iter()
            .any(|e| e.to.contains(address))
    }
}

#[async_trait]
impl EmailProvider for MockEmailProvider {
    async fn send(&self, email: &OutboundEmail) -> NotificationResult<SentEmail> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = self.failure() {
            return Err(NotificationError::Transport(message));
        }

        self.sent_emails.lock().await.push(email.clone());

        Ok(SentEmail {
            message_id: Some(format!("mock-{}", attempt)),
            accepted: true,
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }

    async fn health_check(&self) -> NotificationResult<bool> {
        if self.failure().is_some() {
            return Err(NotificationError::Transport("Mock health check failed".to_string()));
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_provider_sends_email() {
        let provider = MockEmailProvider::new();

        let email = OutboundEmail::new("test@example.com", "Test Subject").with_text("Test body");

        let sent = provider.send(&email).await.unwrap();
        assert_eq!(sent.message_id.as_deref(), Some("mock-1"));

        let sent = provider.sent_emails().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Test Subject");
    }

    #[tokio::test]
    async fn test_mock_provider_fails() {
        let provider = MockEmailProvider::failing("Simulated failure");

        let email = OutboundEmail::new("test@example.com", "Test Subject");

        let err = provider.send(&email).await.unwrap_err();
        assert!(err.to_string().contains("Simulated failure"));
        assert_eq!(provider.attempts(), 1);
        assert_eq!(provider.sent_count().await, 0);
        assert!(provider.health_check().await.is_err());
    }

    #[tokio::test]
    async fn test_mock_provider_recovers() {
        let provider = MockEmailProvider::failing("down");
        let email = OutboundEmail::new(vec!["a@example.com", "b@example.com"], "Hi");
        assert!(provider.send(&email).await.is_err());

        provider.set_failure(None);
        provider.send(&email).await.unwrap();

        assert!(provider.was_sent_to("b@example.com").await);
        assert!(!provider.was_sent_to("other@example.com").await);
        assert_eq!(provider.attempts(), 2);
    }
}
