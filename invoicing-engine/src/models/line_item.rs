//! Line item model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One billable row on an invoice. `total` and `tax_amount` are computed
/// by the calculator, never taken from the caller.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LineItem {
    pub line_item_id: Uuid,
    pub invoice_id: Uuid,
    pub tenant_id: Uuid,
    pub description: String,
    pub quantity: Decimal,
    pub unit_rate: Decimal,
    /// Unit label ("hours", "pcs", ...), display only.
    pub unit: Option<String>,
    /// Per-item tax fraction; additive on top of the invoice-level rate.
    pub tax_rate: Option<Decimal>,
    pub tax_amount: Decimal,
    pub total: Decimal,
    pub sort_order: i32,
    pub created_utc: DateTime<Utc>,
}

/// Input for a line on a new invoice.
#[derive(Debug, Clone)]
pub struct CreateLineItem {
    pub description: String,
    pub quantity: Decimal,
    pub unit_rate: Decimal,
    pub unit: Option<String>,
    pub tax_rate: Option<Decimal>,
}
