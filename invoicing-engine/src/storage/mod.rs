//! Storage collaborator for the invoicing engine.
//!
//! The engine treats persistence as an injected dependency: every
//! uniqueness rule (invoice number per tenant, payment reference per
//! invoice, one receipt per payment) and the invoice version check are
//! enforced here, so both implementations give the engine the same
//! guarantees. Storage faults surface as `AppError::Storage` and are
//! propagated unchanged.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use billing_core::error::AppError;
use uuid::Uuid;

use crate::models::{
    AdditionalCharge, Invoice, LineItem, Payment, Receipt, SequenceCounter, SequenceNamespace,
};

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;

#[async_trait]
pub trait InvoicingStore: Send + Sync {
    /// Persist a new invoice with its line items and charges. Fails with
    /// `Conflict` when the invoice number is already taken for the
    /// tenant.
    async fn insert_invoice(
        &self,
        invoice: &Invoice,
        line_items: &[LineItem],
        charges: &[AdditionalCharge],
    ) -> Result<(), AppError>;

    async fn get_invoice(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, AppError>;

    /// Persist a mutated invoice. `expected_version` is the version the
    /// caller read; a concurrent update in between fails with `Conflict`.
    async fn update_invoice(
        &self,
        invoice: &Invoice,
        expected_version: i64,
    ) -> Result<(), AppError>;

    /// Most recently created number in a namespace, for sequence
    /// cross-checking.
    async fn find_latest_number(
        &self,
        tenant_id: Uuid,
        namespace: SequenceNamespace,
    ) -> Result<Option<String>, AppError>;

    async fn sequence_counter(
        &self,
        tenant_id: Uuid,
        namespace: SequenceNamespace,
    ) -> Result<Option<SequenceCounter>, AppError>;

    /// Atomic `last_seq = max(last_seq, floor) + 1` upsert; returns the
    /// new value. Concurrent calls never observe the same result.
    async fn advance_sequence(
        &self,
        tenant_id: Uuid,
        namespace: SequenceNamespace,
        floor: Option<i64>,
    ) -> Result<i64, AppError>;

    /// Fails with `Conflict` when the `(invoice_id, reference)` pair
    /// already exists.
    async fn insert_payment(&self, payment: &Payment) -> Result<(), AppError>;

    async fn update_payment(&self, payment: &Payment) -> Result<(), AppError>;

    async fn get_payment(
        &self,
        tenant_id: Uuid,
        payment_id: Uuid,
    ) -> Result<Option<Payment>, AppError>;

    /// Payments for an invoice in recording order.
    async fn payments_for_invoice(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Vec<Payment>, AppError>;

    /// Fails with `Conflict` when the payment already has a receipt.
    async fn insert_receipt(&self, receipt: &Receipt) -> Result<(), AppError>;

    async fn receipt_for_payment(
        &self,
        tenant_id: Uuid,
        payment_id: Uuid,
    ) -> Result<Option<Receipt>, AppError>;

    /// Line items in display order.
    async fn line_items_for_invoice(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Vec<LineItem>, AppError>;

    /// Additional charges in display order.
    async fn charges_for_invoice(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Vec<AdditionalCharge>, AppError>;
}
