//! Feature senders: typed entry points that render a template and deliver it.

use std::collections::BTreeMap;
use std::sync::Arc;

use job_queue::{JobId, JobOptions};
use serde::Serialize;
use tracing::info;

use crate::config::NotificationServiceConfig;
use crate::error::NotificationResult;
use crate::events::{
    InvoiceEmail, LeaseExpiringEmail, LeaseSignatureRequestEmail, LeaseTerminatedEmail,
    MaintenanceUpdateEmail, PasswordResetEmail, PaymentReceiptEmail, RentReminderEmail,
    WelcomeEmail,
};
use crate::models::{Attachment, Delivery, DeliveryMode, OutboundEmail, Recipients};
use crate::queue::NotificationQueue;
use crate::templates::TemplateRenderer;
use crate::transport::Transport;

/// Names of the bundled templates used by the feature senders.
pub mod template_names {
    pub const WELCOME: &str = "welcome";
    pub const PASSWORD_RESET: &str = "password-reset";
    pub const INVOICE: &str = "invoice";
    pub const PAYMENT_RECEIPT: &str = "payment-receipt";
    pub const RENT_REMINDER: &str = "rent-reminder";
    pub const LEASE_SIGNATURE_REQUEST: &str = "lease-signature-request";
    pub const LEASE_EXPIRING: &str = "lease-expiring";
    pub const LEASE_TERMINATED: &str = "lease-terminated";
    pub const MAINTENANCE_UPDATE: &str = "maintenance-update";
}

type Links = BTreeMap<&'static str, String>;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Brand<'a> {
    app_name: &'a str,
    frontend_url: &'a str,
    support_email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    company_address: Option<&'a str>,
}

/// Template context: branding, then sender data, then links. Later keys win.
#[derive(Serialize)]
struct SenderContext<'a, T: Serialize> {
    #[serde(flatten)]
    brand: Brand<'a>,
    #[serde(flatten)]
    data: &'a T,
    #[serde(flatten)]
    links: Links,
}

/// Renders notification templates and routes them to the transport or the queue.
pub struct NotificationService {
    renderer: Arc<TemplateRenderer>,
    transport: Transport,
    queue: NotificationQueue,
    config: NotificationServiceConfig,
}

impl NotificationService {
    pub fn new(
        renderer: Arc<TemplateRenderer>,
        transport: Transport,
        queue: NotificationQueue,
        config: NotificationServiceConfig,
    ) -> Self {
        Self {
            renderer,
            transport,
            queue,
            config,
        }
    }

    pub fn renderer(&self) -> &TemplateRenderer {
        &self.renderer
    }

    pub fn queue(&self) -> &NotificationQueue {
        &self.queue
    }

    fn brand(&self) -> Brand<'_> {
        Brand {
            app_name: &self.config.app_name,
            frontend_url: &self.config.frontend_url,
            support_email: &self.config.support_email,
            company_address: self.config.company_address.as_deref(),
        }
    }

    /// Hand a rendered message to the transport (`Immediate`) or the queue (`Queued`).
    pub async fn deliver(&self, email: OutboundEmail, mode: DeliveryMode) -> NotificationResult<Delivery> {
        match mode {
            DeliveryMode::Immediate => Ok(Delivery::Sent(self.transport.send(&email).await?)),
            DeliveryMode::Queued => Ok(Delivery::Queued(self.queue.enqueue(email, None).await?)),
        }
    }

    async fn render_email<T: Serialize + Sync>(
        &self,
        template: &str,
        to: &Recipients,
        data: &T,
        links: Links,
    ) -> NotificationResult<OutboundEmail> {
        let context = SenderContext {
            brand: self.brand(),
            data,
            links,
        };
        let rendered = self.renderer.compile_with(template, &context).await?;
        Ok(OutboundEmail::rendered(to.clone(), rendered))
    }

    async fn send_feature<T: Serialize + Sync>(
        &self,
        template: &'static str,
        to: &Recipients,
        data: &T,
        links: Links,
        attachments: Vec<Attachment>,
        mode: DeliveryMode,
    ) -> NotificationResult<Delivery> {
        let mut email = self.render_email(template, to, data, links).await?;
        email.attachments = attachments;

        let delivery = self.deliver(email, mode).await?;
        info!(template, to = %to, mode = ?mode, job_id = ?delivery.job_id(), "Notification dispatched");
        Ok(delivery)
    }

    /// Render any stored template with the caller's context plus branding.
    pub async fn send_template<C: Serialize + Sync>(
        &self,
        template: &str,
        to: impl Into<Recipients>,
        context: &C,
        mode: DeliveryMode,
    ) -> NotificationResult<Delivery> {
        let to = to.into();
        let email = self.render_email(template, &to, context, Links::new()).await?;
        self.deliver(email, mode).await
    }

    /// Render one message per recipient and enqueue them as a staggered batch.
    /// Nothing is enqueued if any render fails.
    pub async fn send_bulk_template<C: Serialize + Sync>(
        &self,
        template: &str,
        recipients: &[(Recipients, C)],
        options: Option<JobOptions>,
    ) -> NotificationResult<Vec<JobId>> {
        let mut emails = Vec::with_capacity(recipients.len());
        for (to, context) in recipients {
            emails.push(self.render_email(template, to, context, Links::new()).await?);
        }

        let ids = self.queue.enqueue_bulk(emails, options).await?;
        info!(template, count = ids.len(), "Bulk notifications queued");
        Ok(ids)
    }

    pub async fn send_welcome_email(&self, data: &WelcomeEmail, mode: DeliveryMode) -> NotificationResult<Delivery> {
        let links = Links::from([("loginUrl", self.config.link("/login"))]);
        self.send_feature(template_names::WELCOME, &data.to, data, links, Vec::new(), mode)
            .await
    }

    pub async fn send_password_reset(
        &self,
        data: &PasswordResetEmail,
        mode: DeliveryMode,
    ) -> NotificationResult<Delivery> {
        let reset_path = format!("/reset-password?token={}", urlencoding::encode(&data.reset_token));
        let links = Links::from([("resetUrl", self.config.link(&reset_path))]);
        self.send_feature(template_names::PASSWORD_RESET, &data.to, data, links, Vec::new(), mode)
            .await
    }

    pub async fn send_invoice(&self, data: &InvoiceEmail, mode: DeliveryMode) -> NotificationResult<Delivery> {
        let invoice_path = format!("/invoices/{}", urlencoding::encode(&data.invoice_number));
        let links = Links::from([("invoiceUrl", self.config.link(&invoice_path))]);
        let attachments = data.pdf.iter().cloned().collect();
        self.send_feature(template_names::INVOICE, &data.to, data, links, attachments, mode)
            .await
    }

    pub async fn send_payment_receipt(
        &self,
        data: &PaymentReceiptEmail,
        mode: DeliveryMode,
    ) -> NotificationResult<Delivery> {
        let links = Links::from([("paymentsUrl", self.config.link("/payments"))]);
        self.send_feature(template_names::PAYMENT_RECEIPT, &data.to, data, links, Vec::new(), mode)
            .await
    }

    pub async fn send_rent_reminder(
        &self,
        data: &RentReminderEmail,
        mode: DeliveryMode,
    ) -> NotificationResult<Delivery> {
        let links = Links::from([("paymentUrl", self.config.link("/payments/new"))]);
        self.send_feature(template_names::RENT_REMINDER, &data.to, data, links, Vec::new(), mode)
            .await
    }

    pub async fn send_lease_signature_request(
        &self,
        data: &LeaseSignatureRequestEmail,
        mode: DeliveryMode,
    ) -> NotificationResult<Delivery> {
        let sign_path = format!("/leases/{}/sign", urlencoding::encode(&data.lease_id));
        let links = Links::from([("signUrl", self.config.link(&sign_path))]);
        self.send_feature(
            template_names::LEASE_SIGNATURE_REQUEST,
            &data.to,
            data,
            links,
            Vec::new(),
            mode,
        )
        .await
    }

    pub async fn send_lease_expiring(
        &self,
        data: &LeaseExpiringEmail,
        mode: DeliveryMode,
    ) -> NotificationResult<Delivery> {
        let renew_path = format!("/leases/{}/renew", urlencoding::encode(&data.lease_id));
        let links = Links::from([("renewUrl", self.config.link(&renew_path))]);
        self.send_feature(template_names::LEASE_EXPIRING, &data.to, data, links, Vec::new(), mode)
            .await
    }

    pub async fn send_lease_terminated(
        &self,
        data: &LeaseTerminatedEmail,
        mode: DeliveryMode,
    ) -> NotificationResult<Delivery> {
        self.send_feature(
            template_names::LEASE_TERMINATED,
            &data.to,
            data,
            Links::new(),
            Vec::new(),
            mode,
        )
        .await
    }

    pub async fn send_maintenance_update(
        &self,
        data: &MaintenanceUpdateEmail,
        mode: DeliveryMode,
    ) -> NotificationResult<Delivery> {
        let request_path = format!("/maintenance/{}", urlencoding::encode(&data.request_id));
        let links = Links::from([("requestUrl", self.config.link(&request_path))]);
        self.send_feature(template_names::MAINTENANCE_UPDATE, &data.to, data, links, Vec::new(), mode)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{InvoiceLine, MaintenanceStatus, PropertyAddress};
    use crate::providers::MockEmailProvider;
    use crate::templates::{
        AssetSource, BundledAssets, EvictionPolicy, InMemoryTemplateStore, TemplateSeeder,
    };
    use chrono::{NaiveDate, TimeZone, Utc};
    use core_config::Environment;
    use job_queue::MemoryQueueStore;
    use std::time::Duration;

    struct Fixture {
        service: NotificationService,
        provider: MockEmailProvider,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryTemplateStore::new());
        let seeder = TemplateSeeder::new(store.clone(), Arc::new(BundledAssets), Environment::Development);
        seeder.backfill_all().await.unwrap();

        let partials = BundledAssets.load().unwrap().partials;
        let renderer = TemplateRenderer::new(store, &partials, EvictionPolicy::NeverEvict).unwrap();

        let provider = MockEmailProvider::new();
        let transport = Transport::new(Arc::new(provider.clone()), Duration::from_secs(5));
        let queue = NotificationQueue::new(Arc::new(MemoryQueueStore::new("service-test")));
        let config = NotificationServiceConfig {
            app_name: "Estate".into(),
            frontend_url: "https://app.example.com".into(),
            support_email: "help@example.com".into(),
            company_address: Some("1 Harbor Way".into()),
        };

        Fixture {
            service: NotificationService::new(Arc::new(renderer), transport, queue, config),
            provider,
        }
    }

    fn address() -> PropertyAddress {
        PropertyAddress {
            street: "12 Elm St".into(),
            unit: Some("Apt 4".into()),
            city: "Springfield".into(),
            state: "IL".into(),
            zip: "62704".into(),
        }
    }

    #[tokio::test]
    async fn test_welcome_email_immediate() {
        let f = fixture().await;
        let data = WelcomeEmail {
            to: "ada@example.com".into(),
            name: "ada".into(),
        };

        let delivery = f.service.send_welcome_email(&data, DeliveryMode::Immediate).await.unwrap();
        assert!(matches!(delivery, Delivery::Sent(_)));

        let sent = f.provider.sent_emails().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Welcome to Estate, Ada");
        let html = sent[0].html.as_deref().unwrap();
        assert!(html.contains("https://app.example.com/login"));
        assert!(html.contains("1 Harbor Way"));
        assert!(sent[0].text.as_deref().unwrap().contains("help@example.com"));
    }

    #[tokio::test]
    async fn test_password_reset_link_is_encoded() {
        let f = fixture().await;
        let data = PasswordResetEmail {
            to: "ada@example.com".into(),
            name: "Ada".into(),
            reset_token: "a+b/c".into(),
            expires_in_minutes: 30,
        };

        f.service.send_password_reset(&data, DeliveryMode::Immediate).await.unwrap();

        let sent = f.provider.sent_emails().await;
        let text = sent[0].text.as_deref().unwrap();
        assert!(text.contains("https://app.example.com/reset-password?token=a%2Bb%2Fc"));
        assert!(text.contains("30 minutes"));
        assert!(!text.contains("a+b/c"));
    }

    #[tokio::test]
    async fn test_invoice_queued_with_attachment() {
        let f = fixture().await;
        let data = InvoiceEmail {
            to: "tenant@example.com".into(),
            tenant_name: "sam".into(),
            invoice_number: "INV-7".into(),
            property_address: address(),
            due_date: NaiveDate::from_ymd_opt(2026, 3, 5).unwrap(),
            currency: "USD".into(),
            line_items: vec![
                InvoiceLine {
                    description: "Rent".into(),
                    amount: 1450.0,
                },
                InvoiceLine {
                    description: "Parking".into(),
                    amount: 50.0,
                },
            ],
            total: 1500.0,
            pdf: Some(Attachment::pdf("INV-7.pdf", b"%PDF".to_vec())),
        };

        let delivery = f.service.send_invoice(&data, DeliveryMode::Queued).await.unwrap();
        let id = delivery.job_id().unwrap();
        assert_eq!(f.provider.attempts(), 0);

        let job = f.service.queue().get(id).await.unwrap().unwrap();
        let payload = job.decode::<crate::models::NotificationJob>().unwrap().payload;
        let crate::models::NotificationJob::SendEmail(email) = payload;

        assert_eq!(email.subject, "Invoice INV-7: $1,500.00 due March 5, 2026");
        assert_eq!(email.attachments.len(), 1);
        let html = email.html.unwrap();
        assert!(html.contains("$1,450.00"));
        assert!(html.contains("12 Elm St, Apt 4, Springfield, IL 62704"));
        assert!(html.contains("Thursday, March 5, 2026"));
    }

    #[tokio::test]
    async fn test_rent_reminder_overdue_branch() {
        let f = fixture().await;
        let mut data = RentReminderEmail {
            to: "tenant@example.com".into(),
            tenant_name: "sam".into(),
            amount_due: 1450.0,
            currency: "USD".into(),
            due_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            days_overdue: 4,
            property_address: address(),
        };

        f.service.send_rent_reminder(&data, DeliveryMode::Immediate).await.unwrap();
        data.days_overdue = 0;
        f.service.send_rent_reminder(&data, DeliveryMode::Immediate).await.unwrap();

        let sent = f.provider.sent_emails().await;
        assert!(sent[0].subject.starts_with("Overdue: $1,450.00"));
        assert!(sent[0].html.as_deref().unwrap().contains("4 days overdue"));
        assert!(sent[1].subject.starts_with("Reminder: $1,450.00"));
    }

    #[tokio::test]
    async fn test_maintenance_update_renders_optional_fields() {
        let f = fixture().await;
        let data = MaintenanceUpdateEmail {
            to: vec!["tenant@example.com", "owner@example.com"].into(),
            recipient_name: "sam".into(),
            request_id: "42".into(),
            title: "Leaking faucet".into(),
            status: MaintenanceStatus::Scheduled,
            note: None,
            scheduled_for: Some(Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap()),
            property_address: address(),
        };

        f.service.send_maintenance_update(&data, DeliveryMode::Immediate).await.unwrap();

        let sent = f.provider.sent_emails().await;
        assert_eq!(sent[0].subject, "Maintenance #42 scheduled: Leaking faucet");
        assert_eq!(sent[0].to.len(), 2);
        let html = sent[0].html.as_deref().unwrap();
        assert!(html.contains("Scheduled for Tuesday, March 10, 2026"));
        assert!(html.contains("https://app.example.com/maintenance/42"));
    }

    #[tokio::test]
    async fn test_lease_senders_render() {
        let f = fixture().await;
        let signature = LeaseSignatureRequestEmail {
            to: "tenant@example.com".into(),
            signer_name: "sam".into(),
            landlord_name: None,
            lease_id: "L-9".into(),
            property_address: address(),
            sign_by: None,
        };
        let expiring = LeaseExpiringEmail {
            to: "tenant@example.com".into(),
            tenant_name: "sam".into(),
            lease_id: "L-9".into(),
            property_address: address(),
            end_date: NaiveDate::from_ymd_opt(2026, 6, 30).unwrap(),
            days_remaining: 21,
        };
        let terminated = LeaseTerminatedEmail {
            to: "tenant@example.com".into(),
            tenant_name: "sam".into(),
            property_address: address(),
            termination_date: NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(),
            reason: None,
            move_out_instructions: None,
        };

        f.service
            .send_lease_signature_request(&signature, DeliveryMode::Immediate)
            .await
            .unwrap();
        f.service.send_lease_expiring(&expiring, DeliveryMode::Immediate).await.unwrap();
        f.service.send_lease_terminated(&terminated, DeliveryMode::Immediate).await.unwrap();

        let sent = f.provider.sent_emails().await;
        assert!(sent[0].html.as_deref().unwrap().contains("Estate has sent you a lease"));
        assert!(sent[0].html.as_deref().unwrap().contains("/leases/L-9/sign"));
        assert!(sent[1].html.as_deref().unwrap().contains("Please let us know your plans soon."));
        assert_eq!(sent[1].subject, "Your lease ends June 30, 2026");
        assert!(sent[2].html.as_deref().unwrap().contains("We will contact you with move-out details."));
    }

    #[tokio::test]
    async fn test_payment_receipt_fallback_method() {
        let f = fixture().await;
        let data = PaymentReceiptEmail {
            to: "tenant@example.com".into(),
            tenant_name: "sam".into(),
            receipt_number: "R-1".into(),
            amount: 1450.0,
            currency: "USD".into(),
            paid_at: Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap(),
            payment_method: None,
            property_address: address(),
        };

        f.service.send_payment_receipt(&data, DeliveryMode::Immediate).await.unwrap();

        let sent = f.provider.sent_emails().await;
        assert_eq!(sent[0].subject, "Receipt R-1: $1,450.00 received");
        assert!(sent[0].html.as_deref().unwrap().contains("Online payment"));
    }

    #[tokio::test]
    async fn test_bulk_template_renders_everything_before_enqueue() {
        let f = fixture().await;
        let recipients = vec![
            (Recipients::from("a@example.com"), serde_json::json!({ "name": "a" })),
            (Recipients::from("b@example.com"), serde_json::json!({ "name": "b" })),
        ];

        let ids = f
            .service
            .send_bulk_template("welcome", &recipients, None)
            .await
            .unwrap();
        assert_eq!(ids.len(), 2);

        let err = f
            .service
            .send_bulk_template("no-such-template", &recipients, None)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::NotificationError::TemplateNotFound(_)));
        let counts = f.service.queue().status().await.unwrap();
        assert_eq!(counts.waiting + counts.delayed, 2);
    }
}
