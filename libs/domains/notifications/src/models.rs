//! Domain models for the notifications pipeline.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use job_queue::{JobId, JobPayload};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{NotificationError, NotificationResult};

/// One address or an ordered list of addresses.
///
/// Serializes untagged, so `"a@x.com"` and `["a@x.com", "b@x.com"]` are both
/// accepted on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Recipients {
    One(String),
    Many(Vec<String>),
}

impl Recipients {
    /// Addresses in their original order.
    pub fn addresses(&self) -> Vec<&str> {
        match self {
            Recipients::One(address) => vec![address.as_str()],
            Recipients::Many(addresses) => addresses.iter().map(String::as_str).collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Recipients::One(_) => 1,
            Recipients::Many(addresses) => addresses.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, address: &str) -> bool {
        self.addresses()
            .iter()
            .any(|a| a.eq_ignore_ascii_case(address))
    }
}

impl std::fmt::Display for Recipients {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.addresses().join(", "))
    }
}

impl From<&str> for Recipients {
    fn from(address: &str) -> Self {
        Recipients::One(address.to_string())
    }
}

impl From<String> for Recipients {
    fn from(address: String) -> Self {
        Recipients::One(address)
    }
}

impl From<Vec<String>> for Recipients {
    fn from(addresses: Vec<String>) -> Self {
        Recipients::Many(addresses)
    }
}

impl From<Vec<&str>> for Recipients {
    fn from(addresses: Vec<&str>) -> Self {
        Recipients::Many(addresses.into_iter().map(str::to_string).collect())
    }
}

/// File attached to an outbound email. Content is base64 on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    #[serde(with = "base64_bytes")]
    pub content: Vec<u8>,
}

impl Attachment {
    pub fn new(filename: impl Into<String>, content_type: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            content,
        }
    }

    pub fn pdf(filename: impl Into<String>, content: Vec<u8>) -> Self {
        Self::new(filename, "application/pdf", content)
    }
}

mod base64_bytes {
    use super::*;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// A fully rendered message, ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundEmail {
    pub to: Recipients,
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cc: Option<Recipients>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bcc: Option<Recipients>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl OutboundEmail {
    pub fn new(to: impl Into<Recipients>, subject: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            html: None,
            text: None,
            cc: None,
            bcc: None,
            reply_to: None,
            attachments: Vec::new(),
        }
    }

    /// Build a message from a rendered template.
    pub fn rendered(to: impl Into<Recipients>, rendered: RenderedEmail) -> Self {
        Self {
            html: Some(rendered.html),
            text: rendered.text,
            ..Self::new(to, rendered.subject)
        }
    }

    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_cc(mut self, cc: impl Into<Recipients>) -> Self {
        self.cc = Some(cc.into());
        self
    }

    pub fn with_bcc(mut self, bcc: impl Into<Recipients>) -> Self {
        self.bcc = Some(bcc.into());
        self
    }

    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }
    /// Reject messages no transport could ever deliver: no primary recipient,
    /// or a blank address anywhere in the recipient lists.
    pub fn validate(&self) -> NotificationResult<()> {
        if self.to.is_empty() {
            return Err(NotificationError::InvalidAddress("message has no recipients".to_string()));
        }

        let lists = [Some(&self.to), self.cc.as_ref(), self.bcc.as_ref()];
        if lists
            .into_iter()
            .flatten()
            .flat_map(Recipients::addresses)
            .any(|address| address.trim().is_empty())
        {
            return Err(NotificationError::InvalidAddress("blank recipient address".to_string()));
        }
        Ok(())
    }
}

/// Output of the renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Job payloads carried by the notification queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload")]
pub enum NotificationJob {
    #[serde(rename = "send-email")]
    SendEmail(OutboundEmail),
}

impl JobPayload for NotificationJob {
    fn kind(&self) -> &'static str {
        match self {
            NotificationJob::SendEmail(_) => "send-email",
        }
    }
}

/// A named email template as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    pub subject: String,
    pub html: String,
    pub text: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Content for a template upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateDraft {
    pub name: String,
    pub subject: String,
    pub html: String,
    pub text: Option<String>,
}

impl TemplateDraft {
    pub fn new(name: impl Into<String>, subject: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subject: subject.into(),
            html: html.into(),
            text: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Whether a stored template already holds exactly this content.
    pub fn matches(&self, template: &Template) -> bool {
        self.subject == template.subject && self.html == template.html && self.text == template.text
    }
}

/// What an upsert did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    Unchanged,
}

/// How a feature sender delivers its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Send through the transport now; failures are returned to the caller.
    Immediate,
    /// Hand off to the notification queue; the worker retries with backoff.
    Queued,
}

/// Provider receipt for a sent email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
    /// Provider-specific message ID for tracking.
    pub message_id: Option<String>,
    /// Whether the email was accepted for delivery.
    pub accepted: bool,
}

/// Result of a feature sender call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Sent(SentEmail),
    Queued(JobId),
}

impl Delivery {
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            Delivery::Queued(id) => Some(*id),
            Delivery::Sent(_) => None,
        }
    }
}
