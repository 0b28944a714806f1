//! Sequence counter model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Numbering namespaces share the sequencing discipline but never a
/// counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceNamespace {
    Invoice,
    Receipt,
}

impl SequenceNamespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            SequenceNamespace::Invoice => "invoice",
            SequenceNamespace::Receipt => "receipt",
        }
    }
}

/// Per-tenant counter state for one numbering namespace. Mutated only
/// through the store's atomic `advance_sequence`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SequenceCounter {
    pub tenant_id: Uuid,
    pub namespace: String,
    pub last_seq: i64,
    /// Overrides the configured template when present.
    pub format_template: Option<String>,
}
