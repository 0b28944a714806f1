//! In-memory store: the hermetic test backend. Enforces the same
//! uniqueness and version rules as the SQL schema.

use std::collections::HashMap;

use async_trait::async_trait;
use billing_core::error::AppError;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{
    AdditionalCharge, Invoice, LineItem, Payment, Receipt, SequenceCounter, SequenceNamespace,
};

use super::InvoicingStore;

#[derive(Default)]
struct State {
    invoices: HashMap<Uuid, Invoice>,
    /// Invoice ids in creation order, for latest-number lookups.
    invoice_log: Vec<Uuid>,
    line_items: HashMap<Uuid, Vec<LineItem>>,
    charges: HashMap<Uuid, Vec<AdditionalCharge>>,
    payments: HashMap<Uuid, Payment>,
    /// Payment ids in recording order.
    payment_log: Vec<Uuid>,
    receipts: Vec<Receipt>,
    counters: HashMap<(Uuid, String), SequenceCounter>,
}

#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the number format template for a tenant namespace.
    pub async fn set_format_template(
        &self,
        tenant_id: Uuid,
        namespace: SequenceNamespace,
        template: &str,
    ) {
        let mut state = self.inner.write().await;
        let counter = state
            .counters
            .entry((tenant_id, namespace.as_str().to_string()))
            .or_insert_with(|| SequenceCounter {
                tenant_id,
                namespace: namespace.as_str().to_string(),
                last_seq: 0,
                format_template: None,
            });
        counter.format_template = Some(template.to_string());
    }
}

#[async_trait]
impl InvoicingStore for InMemoryStore {
    async fn insert_invoice(
        &self,
        invoice: &Invoice,
        line_items: &[LineItem],
        charges: &[AdditionalCharge],
    ) -> Result<(), AppError> {
        let mut state = self.inner.write().await;

        if let Some(number) = &invoice.invoice_number {
            let taken = state.invoices.values().any(|existing| {
                existing.tenant_id == invoice.tenant_id
                    && existing.invoice_number.as_ref() == Some(number)
            });
            if taken {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "invoice number '{}' already exists for this tenant",
                    number
                )));
            }
        }

        state.invoices.insert(invoice.invoice_id, invoice.clone());
        state.invoice_log.push(invoice.invoice_id);
        state
            .line_items
            .insert(invoice.invoice_id, line_items.to_vec());
        state.charges.insert(invoice.invoice_id, charges.to_vec());
        Ok(())
    }

    async fn get_invoice(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, AppError> {
        let state = self.inner.read().await;
        Ok(state
            .invoices
            .get(&invoice_id)
            .filter(|invoice| invoice.tenant_id == tenant_id)
            .cloned())
    }

    async fn update_invoice(
        &self,
        invoice: &Invoice,
        expected_version: i64,
    ) -> Result<(), AppError> {
        let mut state = self.inner.write().await;
        let stored = state.invoices.get_mut(&invoice.invoice_id).ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("invoice {} not found", invoice.invoice_id))
        })?;
        if stored.version != expected_version {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "concurrent update detected for invoice {}: expected version {}, found {}",
                invoice.invoice_id,
                expected_version,
                stored.version
            )));
        }
        *stored = invoice.clone();
        Ok(())
    }

    async fn find_latest_number(
        &self,
        tenant_id: Uuid,
        namespace: SequenceNamespace,
    ) -> Result<Option<String>, AppError> {
        let state = self.inner.read().await;
        match namespace {
            SequenceNamespace::Invoice => Ok(state
                .invoice_log
                .iter()
                .rev()
                .filter_map(|id| state.invoices.get(id))
                .find(|invoice| {
                    invoice.tenant_id == tenant_id && invoice.invoice_number.is_some()
                })
                .and_then(|invoice| invoice.invoice_number.clone())),
            SequenceNamespace::Receipt => Ok(state
                .receipts
                .iter()
                .rev()
                .find(|receipt| receipt.tenant_id == tenant_id)
                .map(|receipt| receipt.receipt_number.clone())),
        }
    }

    async fn sequence_counter(
        &self,
        tenant_id: Uuid,
        namespace: SequenceNamespace,
    ) -> Result<Option<SequenceCounter>, AppError> {
        let state = self.inner.read().await;
        Ok(state
            .counters
            .get(&(tenant_id, namespace.as_str().to_string()))
            .cloned())
    }

    async fn advance_sequence(
        &self,
        tenant_id: Uuid,
        namespace: SequenceNamespace,
        floor: Option<i64>,
    ) -> Result<i64, AppError> {
        let mut state = self.inner.write().await;
        let counter = state
            .counters
            .entry((tenant_id, namespace.as_str().to_string()))
            .or_insert_with(|| SequenceCounter {
                tenant_id,
                namespace: namespace.as_str().to_string(),
                last_seq: 0,
                format_template: None,
            });
        counter.last_seq = counter.last_seq.max(floor.unwrap_or(0)) + 1;
        Ok(counter.last_seq)
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<(), AppError> {
        let mut state = self.inner.write().await;

        let duplicate = state.payments.values().any(|existing| {
            existing.invoice_id == payment.invoice_id && existing.reference == payment.reference
        });
        if duplicate {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "payment reference '{}' already recorded for invoice {}",
                payment.reference,
                payment.invoice_id
            )));
        }

        state.payments.insert(payment.payment_id, payment.clone());
        state.payment_log.push(payment.payment_id);
        Ok(())
    }

    async fn update_payment(&self, payment: &Payment) -> Result<(), AppError> {
        let mut state = self.inner.write().await;
        let stored = state.payments.get_mut(&payment.payment_id).ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("payment {} not found", payment.payment_id))
        })?;
        *stored = payment.clone();
        Ok(())
    }

    async fn get_payment(
        &self,
        tenant_id: Uuid,
        payment_id: Uuid,
    ) -> Result<Option<Payment>, AppError> {
        let state = self.inner.read().await;
        Ok(state
            .payments
            .get(&payment_id)
            .filter(|payment| payment.tenant_id == tenant_id)
            .cloned())
    }

    async fn payments_for_invoice(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Vec<Payment>, AppError> {
        let state = self.inner.read().await;
        Ok(state
            .payment_log
            .iter()
            .filter_map(|id| state.payments.get(id))
            .filter(|payment| {
                payment.tenant_id == tenant_id && payment.invoice_id == invoice_id
            })
            .cloned()
            .collect())
    }

    async fn insert_receipt(&self, receipt: &Receipt) -> Result<(), AppError> {
        let mut state = self.inner.write().await;

        let duplicate = state
            .receipts
            .iter()
            .any(|existing| existing.payment_id == receipt.payment_id);
        if duplicate {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "receipt already issued for payment {}",
                receipt.payment_id
            )));
        }

        state.receipts.push(receipt.clone());
        Ok(())
    }

    async fn receipt_for_payment(
        &self,
        tenant_id: Uuid,
        payment_id: Uuid,
    ) -> Result<Option<Receipt>, AppError> {
        let state = self.inner.read().await;
        Ok(state
            .receipts
            .iter()
            .find(|receipt| {
                receipt.tenant_id == tenant_id && receipt.payment_id == payment_id
            })
            .cloned())
    }

    async fn line_items_for_invoice(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Vec<LineItem>, AppError> {
        let state = self.inner.read().await;
        Ok(state
            .line_items
            .get(&invoice_id)
            .map(|items| {
                items
                    .iter()
                    .filter(|item| item.tenant_id == tenant_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn charges_for_invoice(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Vec<AdditionalCharge>, AppError> {
        let state = self.inner.read().await;
        let owned = state
            .invoices
            .get(&invoice_id)
            .is_some_and(|invoice| invoice.tenant_id == tenant_id);
        if !owned {
            return Ok(Vec::new());
        }
        Ok(state.charges.get(&invoice_id).cloned().unwrap_or_default())
    }
}
