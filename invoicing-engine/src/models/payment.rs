//! Payment model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::invoice::Invoice;
use super::receipt::Receipt;

/// Payment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "completed" => PaymentStatus::Completed,
            "failed" => PaymentStatus::Failed,
            "refunded" => PaymentStatus::Refunded,
            _ => PaymentStatus::Pending,
        }
    }
}

/// A payment recorded against an invoice. Immutable once `completed`,
/// except for refund/void transitions handled administratively.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub payment_id: Uuid,
    pub tenant_id: Uuid,
    pub invoice_id: Uuid,
    pub amount: Decimal,
    pub method: String,
    /// Caller-supplied idempotency key, unique per invoice.
    pub reference: String,
    pub status: String,
    pub recorded_utc: DateTime<Utc>,
}

/// Input for recording a payment.
#[derive(Debug, Clone)]
pub struct PaymentInput {
    pub amount: Decimal,
    pub method: String,
    pub reference: String,
    /// Start the payment in `pending` instead of `completed`; caller
    /// policy for cheque/large-amount flows. A pending payment counts for
    /// nothing until it is completed.
    pub pending: bool,
}

/// Result of a ledger mutation: the payment, its receipt (absent while
/// the payment is pending) and the refreshed invoice.
#[derive(Debug, Clone)]
pub struct PaymentOutcome {
    pub payment: Payment,
    pub receipt: Option<Receipt>,
    pub invoice: Invoice,
}
