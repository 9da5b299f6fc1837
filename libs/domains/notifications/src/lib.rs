//! Notifications Domain
//!
//! Templated email delivery for the property-management backend.
//!
//! # Features
//!
//! - Named templates in Postgres, seeded from a bundled asset set
//! - Cached handlebars rendering that self-heals a missing template once
//! - SMTP transport with a per-send timeout
//! - Queued delivery with retry/backoff, bulk staggering and operator controls
//! - Feature senders for onboarding, billing, leases and maintenance
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │ Feature Sender  │  ← send_x(data, DeliveryMode)
//! └────────┬────────┘
//!          │
//! ┌────────▼────────┐      ┌────────────────┐
//! │TemplateRenderer │ ───► │ TemplateStore  │ ◄── TemplateSeeder (assets)
//! └────────┬────────┘      └────────────────┘
//!          │
//!    ┌─────┴──────────────┐
//!    │ Immediate          │ Queued
//!    │           ┌────────▼─────────┐
//!    │           │NotificationQueue │  ← Redis, retry/backoff
//!    │           └────────┬─────────┘
//!    │           ┌────────▼─────────┐
//!    │           │   Queue Worker   │  ← NotificationProcessor
//!    │           └────────┬─────────┘
//! ┌──▼────────────────────▼──┐
//! │        Transport         │  ← SMTP (lettre)
//! └──────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use domain_notifications::{DeliveryMode, NotificationService, events::WelcomeEmail};
//!
//! let welcome = WelcomeEmail { to: "ada@example.com".into(), name: "Ada".into() };
//! service.send_welcome_email(&welcome, DeliveryMode::Queued).await?;
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod processor;
pub mod providers;
pub mod queue;
pub mod service;
pub mod templates;
pub mod transport;

pub use config::{MailConfig, NotificationServiceConfig, QueueConfig, SmtpSecurity};
pub use error::{NotificationError, NotificationResult};
pub use models::{
    Attachment, Delivery, DeliveryMode, NotificationJob, OutboundEmail, Recipients, RenderedEmail,
    SentEmail, Template, TemplateDraft, UpsertOutcome,
};
pub use processor::NotificationProcessor;
pub use providers::{EmailProvider, MockEmailProvider, SmtpProvider};
pub use queue::NotificationQueue;
pub use service::{NotificationService, template_names};
pub use templates::{
    BundledAssets, DirectoryAssets, EvictionPolicy, InMemoryTemplateStore, PgTemplateStore,
    TemplateRenderer, TemplateSeeder, TemplateStore,
};
pub use transport::Transport;
