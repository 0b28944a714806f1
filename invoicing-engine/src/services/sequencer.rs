//! Invoice and receipt number sequencing.
//!
//! Numbers come from a per-tenant counter advanced through a single
//! atomic storage operation. The counter is never trusted alone for
//! invoices that already exist: the most recently issued number is
//! cross-checked and its trailing sequence, when parseable, becomes a
//! floor for the advance. Collisions are still caught by the storage
//! uniqueness constraint at insert time.

use billing_core::error::AppError;
use chrono::{DateTime, Datelike, Utc};
use uuid::Uuid;

use crate::models::SequenceNamespace;
use crate::storage::InvoicingStore;

pub const SEQ_PLACEHOLDER: &str = "{SEQ}";

/// A shorter digit run is treated as part of the date, not a sequence.
const MIN_SEQ_DIGITS: usize = 3;

/// Extract the trailing run of at least three digits from an issued
/// number.
pub fn extract_trailing_seq(number: &str) -> Option<i64> {
    let digits = number
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .count();
    if digits < MIN_SEQ_DIGITS {
        return None;
    }
    // The suffix is all ASCII, so the char count is also the byte count.
    number[number.len() - digits..].parse::<i64>().ok()
}

/// Render a number template, substituting `{YYYY}`, `{MM}` and `{SEQ}`.
pub fn render_number(template: &str, now: DateTime<Utc>, seq: i64) -> String {
    template
        .replace("{YYYY}", &format!("{:04}", now.year()))
        .replace("{MM}", &format!("{:02}", now.month()))
        .replace(SEQ_PLACEHOLDER, &format!("{:04}", seq))
}

/// Allocate the next number for a tenant and namespace.
pub async fn next_number(
    store: &dyn InvoicingStore,
    tenant_id: Uuid,
    namespace: SequenceNamespace,
    default_template: &str,
    now: DateTime<Utc>,
) -> Result<String, AppError> {
    let counter = store.sequence_counter(tenant_id, namespace).await?;
    let template = counter
        .and_then(|c| c.format_template)
        .unwrap_or_else(|| default_template.to_string());

    // Without a {SEQ} placeholder there is no suffix to extract; the
    // counter alone drives sequencing.
    let floor = if template.contains(SEQ_PLACEHOLDER) {
        store
            .find_latest_number(tenant_id, namespace)
            .await?
            .as_deref()
            .and_then(extract_trailing_seq)
    } else {
        None
    };

    let seq = store.advance_sequence(tenant_id, namespace, floor).await?;
    Ok(render_number(&template, now, seq))
}
