//! Outbound mail transport: a provider plus a per-send timeout.

use std::sync::Arc;
use std::time::Duration;

use core_config::Environment;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::MailConfig;
use crate::error::{NotificationError, NotificationResult};
use crate::models::{OutboundEmail, SentEmail};
use crate::providers::{CaptureMailbox, EmailProvider, SmtpProvider};

/// Deliver-or-fail capability shared by immediate sends and the queue worker.
#[derive(Clone)]
pub struct Transport {
    provider: Arc<dyn EmailProvider>,
    send_timeout: Duration,
}

impl Transport {
    pub fn new(provider: Arc<dyn EmailProvider>, send_timeout: Duration) -> Self {
        Self {
            provider,
            send_timeout,
        }
    }

    /// Construct and kick off a background connectivity check.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn start(provider: Arc<dyn EmailProvider>, send_timeout: Duration) -> Self {
        let transport = Self::new(provider, send_timeout);
        transport.verify_in_background();
        transport
    }

    /// Build the SMTP transport from configuration. With `debug` set (development
    /// only) mail is rerouted to a disposable capture mailbox.
    pub fn from_config(config: &MailConfig, environment: Environment) -> NotificationResult<Self> {
        config.validate(environment)?;

        let config = if config.debug {
            let mailbox = CaptureMailbox::provision();
            info!(
                preview_url = %mailbox.preview_url,
                smtp = %format!("{}:{}", mailbox.host, mailbox.port),
                username = %mailbox.username,
                password = %mailbox.password,
                "Mail debug mode: capturing outbound mail"
            );
            mailbox.apply(config)
        } else {
            config.clone()
        };

        let provider = SmtpProvider::new(&config)?;
        Ok(Self::start(Arc::new(provider), config.send_timeout))
    }

    /// Spawn a connectivity check. Failure is logged, never returned.
    pub fn verify_in_background(&self) -> JoinHandle<()> {
        let provider = Arc::clone(&self.provider);
        tokio::spawn(async move {
            match provider.health_check().await {
                Ok(true) => info!(provider = provider.name(), "Mail transport verified"),
                Ok(false) => warn!(provider = provider.name(), "Mail transport verification failed"),
                Err(e) => warn!(provider = provider.name(), error = %e, "Mail transport unreachable"),
            }
        })
    }

    /// Send once. Undeliverable messages fail with
    /// [`NotificationError::InvalidAddress`] before reaching the provider.
    /// Provider errors propagate unchanged; a send that exceeds the timeout
    /// fails with [`NotificationError::TransportTimeout`].
    pub async fn send(&self, email: &OutboundEmail) -> NotificationResult<SentEmail> {
        email.validate()?;
        tokio::time::timeout(self.send_timeout, self.provider.send(email))
            .await
            .map_err(|_| NotificationError::TransportTimeout(self.send_timeout.as_millis() as u64))?
    }

    pub async fn health_check(&self) -> NotificationResult<bool> {
        self.provider.health_check().await
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::MockEmailProvider;

    #[tokio::test]
    async fn test_send_passes_through() {
        let provider = MockEmailProvider::new();
        let transport = Transport::new(Arc::new(provider.clone()), Duration::from_secs(1));

        transport
            .send(&OutboundEmail::new("a@example.com", "Hi"))
            .await
            .unwrap();
        assert_eq!(provider.sent_count().await, 1);
        assert_eq!(transport.provider_name(), "mock");
    }

    #[tokio::test]
    async fn test_provider_error_propagates_without_retry() {
        let provider = MockEmailProvider::failing("550 mailbox unavailable");
        let transport = Transport::new(Arc::new(provider.clone()), Duration::from_secs(1));

        let err = transport
            .send(&OutboundEmail::new("a@example.com", "Hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, NotificationError::Transport(ref m) if m.contains("550")));
        assert_eq!(provider.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_send_times_out() {
        let provider = MockEmailProvider::slow(Duration::from_secs(60));
        let transport = Transport::new(Arc::new(provider.clone()), Duration::from_secs(5));

        let err = transport
            .send(&OutboundEmail::new("a@example.com", "Hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, NotificationError::TransportTimeout(5000)));
        assert_eq!(provider.sent_count().await, 0);
    }

    #[tokio::test]
    async fn test_failed_verification_does_not_fail_startup() {
        let transport = Transport::start(
            Arc::new(MockEmailProvider::failing("connection refused")),
            Duration::from_secs(1),
        );
        transport.verify_in_background().await.unwrap();
    }

    #[tokio::test]
    async fn test_debug_mode_rejected_in_production() {
        let config = MailConfig::new("localhost", 1025, "noreply@example.com").with_debug(true);
        let result = Transport::from_config(&config, Environment::Production);
        assert!(matches!(result, Err(NotificationError::Config(_))));
    }
}
