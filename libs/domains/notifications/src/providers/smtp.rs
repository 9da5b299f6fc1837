//! SMTP email provider implementation using lettre.

use super::EmailProvider;
use crate::config::{MailConfig, SmtpSecurity};
use crate::error::{NotificationError, NotificationResult};
use crate::models::{OutboundEmail, Recipients, SentEmail};
use async_trait::async_trait;
use lettre::{
    Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Attachment, Mailbox, MultiPart, SinglePart, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use tracing::{debug, error, info};

/// Local capture sink used when `MAIL_DEBUG` is on. Works with Mailpit and
/// MailHog, which accept any credentials and show mail in a web preview.
#[derive(Debug, Clone)]
pub struct CaptureMailbox {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub preview_url: String,
}

impl CaptureMailbox {
    /// Throwaway credentials for a local sink on the default Mailpit ports.
    pub fn provision() -> Self {
        let token = uuid::Uuid::new_v4().simple().to_string();
        Self {
            host: "localhost".to_string(),
            port: 1025,
            username: format!("capture-{}", &token[..8]),
            password: token,
            preview_url: "http://localhost:8025".to_string(),
        }
    }

    /// `config` rerouted to this mailbox; sender identity is kept.
    pub fn apply(&self, config: &MailConfig) -> MailConfig {
        MailConfig {
            host: self.host.clone(),
            port: self.port,
            username: Some(self.username.clone()),
            password: Some(self.password.clone()),
            security: SmtpSecurity::None,
            ..config.clone()
        }
    }
}

enum Body {
    Single(SinglePart),
    Multi(MultiPart),
}

/// SMTP email provider.
pub struct SmtpProvider {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    host: String,
    port: u16,
}

impl SmtpProvider {
    /// Create a new SMTP provider.
    pub fn new(config: &MailConfig) -> NotificationResult<Self> {
        let from_address: Address = config.from_address.parse()?;
        Ok(Self {
            transport: Self::build_transport(config)?,
            from: Mailbox::new(Some(config.from_name.clone()), from_address),
            host: config.host.clone(),
            port: config.port,
        })
    }

    /// Build the SMTP transport based on configuration.
    fn build_transport(config: &MailConfig) -> NotificationResult<AsyncSmtpTransport<Tokio1Executor>> {
        let relay_error =
            |e: lettre::transport::smtp::Error| NotificationError::Config(format!("Failed to create SMTP relay: {}", e));

        let mut builder = match config.security {
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host).map_err(relay_error)?,
            SmtpSecurity::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host).map_err(relay_error)?
            }
            // Plain transport for local dev servers like Mailpit
            SmtpSecurity::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host),
        }
        .port(config.port)
        .timeout(Some(config.send_timeout));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(builder.build())
    }

    fn mailboxes(recipients: &Recipients) -> NotificationResult<Vec<Mailbox>> {
        recipients
            .addresses()
            .into_iter()
            .map(|address| {
                address
                    .parse::<Mailbox>()
                    .map_err(|e| NotificationError::InvalidAddress(format!("'{}': {}", address, e)))
            })
            .collect()
    }

    fn body(email: &OutboundEmail) -> Body {
        match (&email.text, &email.html) {
            (Some(text), Some(html)) => Body::Multi(MultiPart::alternative_plain_html(text.clone(), html.clone())),
            (None, Some(html)) => Body::Single(SinglePart::html(html.clone())),
            (Some(text), None) => Body::Single(SinglePart::plain(text.clone())),
            (None, None) => Body::Single(SinglePart::plain(String::new())),
        }
    }

    /// Build a lettre Message from an OutboundEmail.
    pub fn build_message(&self, email: &OutboundEmail) -> NotificationResult<Message> {
        email.validate()?;

        let mut builder = Message::builder().from(self.from.clone()).subject(email.subject.clone());

        for mailbox in Self::mailboxes(&email.to)? {
            builder = builder.to(mailbox);
        }
        if let Some(cc) = &email.cc {
            for mailbox in Self::mailboxes(cc)? {
                builder = builder.cc(mailbox);
            }
        }
        if let Some(bcc) = &email.bcc {
            for mailbox in Self::mailboxes(bcc)? {
                builder = builder.bcc(mailbox);
            }
        }
        if let Some(reply_to) = &email.reply_to {
            let mailbox: Mailbox = reply_to
                .parse()
                .map_err(|e| NotificationError::InvalidAddress(format!("reply-to '{}': {}", reply_to, e)))?;
            builder = builder.reply_to(mailbox);
        }

        let body = Self::body(email);
        let message = if email.attachments.is_empty() {
            match body {
                Body::Single(part) => builder.singlepart(part),
                Body::Multi(part) => builder.multipart(part),
            }
        } else {
            let mut mixed = match body {
                Body::Single(part) => MultiPart::mixed().singlepart(part),
                Body::Multi(part) => MultiPart::mixed().multipart(part),
            };
            for attachment in &email.attachments {
                let content_type = ContentType::parse(&attachment.content_type).map_err(|e| {
                    NotificationError::Serialization(format!(
                        "attachment '{}' has invalid content type '{}': {}",
                        attachment.filename, attachment.content_type, e
                    ))
                })?;
                mixed = mixed.singlepart(
                    Attachment::new(attachment.filename.clone()).body(attachment.content.clone(), content_type),
                );
            }
            builder.multipart(mixed)
        };

        // Envelope and header errors never go away on retry
        message.map_err(|e| NotificationError::InvalidAddress(format!("Failed to build email message: {}", e)))
    }
}

#[async_trait]
impl EmailProvider for SmtpProvider {
    async fn send(&self, email: &OutboundEmail) -> NotificationResult<SentEmail> {
        debug!(
            to = %email.to,
            subject = %email.subject,
            host = %self.host,
            port = %self.port,
            attachments = email.attachments.len(),
            "Sending email via SMTP"
        );

        let message = self.build_message(email)?;

        let response = self.transport.send(message).await.map_err(|e| {
            error!(to = %email.to, error = %e, "Failed to send email via SMTP");
            NotificationError::Transport(format!("SMTP send failed: {}", e))
        })?;

        let message_id = response.message().next().map(|s| s.to_string());

        info!(to = %email.to, message_id = ?message_id, "Email sent via SMTP");

        Ok(SentEmail {
            message_id,
            accepted: response.is_positive(),
        })
    }

    fn name(&self) -> &'static str {
        "SMTP"
    }

    async fn health_check(&self) -> NotificationResult<bool> {
        self.transport
            .test_connection()
            .await
            .map_err(|e| NotificationError::Transport(format!("SMTP health check failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Attachment as EmailAttachment;

    fn provider() -> SmtpProvider {
        let config = MailConfig::new("localhost", 1025, "noreply@example.com").with_from_name("Estate");
        SmtpProvider::new(&config).unwrap()
    }

    fn formatted(message: &Message) -> String {
        String::from_utf8(message.formatted()).unwrap()
    }

    #[tokio::test]
    async fn test_build_message_with_all_headers() {
        let email = OutboundEmail::new(vec!["a@example.com", "b@example.com"], "Lease update")
            .with_html("<p>Hello</p>")
            .with_text("Hello")
            .with_cc("manager@example.com")
            .with_reply_to("office@example.com");

        let raw = formatted(&provider().build_message(&email).unwrap());
        assert!(raw.contains("To: a@example.com, b@example.com"));
        assert!(raw.contains("Cc: manager@example.com"));
        assert!(raw.contains("Reply-To: office@example.com"));
        assert!(raw.contains("From: Estate <noreply@example.com>"));
        assert!(raw.contains("multipart/alternative"));
    }

    #[tokio::test]
    async fn test_build_message_with_attachment() {
        let email = OutboundEmail::new("tenant@example.com", "Invoice")
            .with_html("<p>Attached</p>")
            .with_attachment(EmailAttachment::pdf("invoice-7.pdf", b"%PDF".to_vec()));

        let raw = formatted(&provider().build_message(&email).unwrap());
        assert!(raw.contains("multipart/mixed"));
        assert!(raw.contains("invoice-7.pdf"));
        assert!(raw.contains("application/pdf"));
    }

    #[tokio::test]
    async fn test_invalid_recipient_is_rejected() {
        let email = OutboundEmail::new("not an address", "Hi").with_text("x");
        let err = provider().build_message(&email).unwrap_err();
        assert!(matches!(err, NotificationError::InvalidAddress(_)));
    }

    #[tokio::test]
    async fn test_empty_recipients_fail_permanently() {
        let email = OutboundEmail::new(Vec::<String>::new(), "Hi").with_text("x");
        let err = provider().build_message(&email).unwrap_err();
        assert!(matches!(err, NotificationError::InvalidAddress(_)));
        assert!(job_queue::JobError::from(err).is_permanent());
    }

    #[test]
    fn test_invalid_from_address() {
        let config = MailConfig::new("localhost", 1025, "nope");
        assert!(matches!(
            SmtpProvider::new(&config),
            Err(NotificationError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_capture_mailbox_reroutes() {
        let config = MailConfig::new("smtp.example.com", 587, "noreply@example.com")
            .with_security(SmtpSecurity::StartTls);
        let mailbox = CaptureMailbox::provision();
        let rerouted = mailbox.apply(&config);

        assert_eq!(rerouted.host, "localhost");
        assert_eq!(rerouted.port, 1025);
        assert_eq!(rerouted.security, SmtpSecurity::None);
        assert_eq!(rerouted.from_address, "noreply@example.com");
        assert_eq!(rerouted.username.as_deref(), Some(mailbox.username.as_str()));
        assert_ne!(CaptureMailbox::provision().password, mailbox.password);
    }
}
