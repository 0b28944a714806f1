//! Receipt model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Proof of payment. Issued exactly once per completed payment and never
/// mutated afterwards; corrections create new records.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Receipt {
    pub receipt_id: Uuid,
    pub tenant_id: Uuid,
    pub receipt_number: String,
    pub payment_id: Uuid,
    pub invoice_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub issued_utc: DateTime<Utc>,
}
