//! Inputs for the feature senders.
//!
//! Each struct serializes (camelCase) straight into its template's context;
//! recipients and attachments are skipped.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::models::{Attachment, Recipients};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyAddress {
    pub street: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub city: String,
    pub state: String,
    pub zip: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WelcomeEmail {
    #[serde(skip)]
    pub to: Recipients,
    pub name: String,
}

/// Password resets are time-critical; send them with `DeliveryMode::Immediate`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordResetEmail {
    #[serde(skip)]
    pub to: Recipients,
    pub name: String,
    #[serde(skip)]
    pub reset_token: String,
    pub expires_in_minutes: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceLine {
    pub description: String,
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceEmail {
    #[serde(skip)]
    pub to: Recipients,
    pub tenant_name: String,
    pub invoice_number: String,
    pub property_address: PropertyAddress,
    pub due_date: NaiveDate,
    pub currency: String,
    pub line_items: Vec<InvoiceLine>,
    pub total: f64,
    /// Rendered invoice PDF, attached when present
    #[serde(skip)]
    pub pdf: Option<Attachment>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceiptEmail {
    #[serde(skip)]
    pub to: Recipients,
    pub tenant_name: String,
    pub receipt_number: String,
    pub amount: f64,
    pub currency: String,
    pub paid_at: DateTime<Utc>,
    pub payment_method: Option<String>,
    pub property_address: PropertyAddress,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RentReminderEmail {
    #[serde(skip)]
    pub to: Recipients,
    pub tenant_name: String,
    pub amount_due: f64,
    pub currency: String,
    pub due_date: NaiveDate,
    /// Zero or negative while rent is not yet late
    pub days_overdue: i64,
    pub property_address: PropertyAddress,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaseSignatureRequestEmail {
    #[serde(skip)]
    pub to: Recipients,
    pub signer_name: String,
    pub landlord_name: Option<String>,
    pub lease_id: String,
    pub property_address: PropertyAddress,
    pub sign_by: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaseExpiringEmail {
    #[serde(skip)]
    pub to: Recipients,
    pub tenant_name: String,
    pub lease_id: String,
    pub property_address: PropertyAddress,
    pub end_date: NaiveDate,
    pub days_remaining: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaseTerminatedEmail {
    #[serde(skip)]
    pub to: Recipients,
    pub tenant_name: String,
    pub property_address: PropertyAddress,
    pub termination_date: NaiveDate,
    pub reason: Option<String>,
    pub move_out_instructions: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MaintenanceStatus {
    Received,
    Scheduled,
    #[serde(rename = "in progress")]
    InProgress,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceUpdateEmail {
    #[serde(skip)]
    pub to: Recipients,
    pub recipient_name: String,
    pub request_id: String,
    pub title: String,
    pub status: MaintenanceStatus,
    pub note: Option<String>,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub property_address: PropertyAddress,
}
