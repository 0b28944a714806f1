//! Engine facade: wires the calculators, sequencer, ledger and status
//! derivation to the storage collaborator.
//!
//! Mutations serialize per invoice: an async mutex is held across the
//! read-validate-write window, and the store additionally checks the
//! invoice version on update. A version conflict is retried once with
//! fresh state, never more.

use std::collections::HashMap;
use std::sync::Arc;

use billing_core::config::EngineSettings;
use billing_core::error::AppError;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::models::{
    CreateInvoice, Invoice, InvoiceDocument, InvoiceStatus, LineItem, Payment, PaymentInput,
    PaymentOutcome, PaymentStatus, Receipt, SequenceNamespace,
};
use crate::services::metrics::{
    ERRORS_TOTAL, INVOICES_TOTAL, INVOICE_AMOUNT_TOTAL, PAYMENT_AMOUNT_TOTAL, RECEIPTS_TOTAL,
};
use crate::services::{calculator, ledger, sequencer, status};
use crate::storage::InvoicingStore;

pub struct InvoicingEngine {
    store: Arc<dyn InvoicingStore>,
    settings: EngineSettings,
    invoice_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl InvoicingEngine {
    pub fn new(store: Arc<dyn InvoicingStore>, settings: EngineSettings) -> Self {
        Self {
            store,
            settings,
            invoice_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Compute totals, assign a number and persist a new draft invoice
    /// with its line items and charges.
    #[instrument(skip(self, input), fields(tenant_id = %tenant_id))]
    pub async fn create_invoice(
        &self,
        tenant_id: Uuid,
        input: CreateInvoice,
    ) -> Result<InvoiceDocument, AppError> {
        self.create_invoice_inner(tenant_id, input)
            .await
            .map_err(track_error)
    }

    async fn create_invoice_inner(
        &self,
        tenant_id: Uuid,
        input: CreateInvoice,
    ) -> Result<InvoiceDocument, AppError> {
        if input.line_items.is_empty() {
            return Err(AppError::Validation(anyhow::anyhow!(
                "cannot create an invoice without line items"
            )));
        }
        if input.currency.trim().is_empty() {
            return Err(AppError::Validation(anyhow::anyhow!(
                "currency must not be empty"
            )));
        }

        let computed = input
            .line_items
            .iter()
            .map(calculator::compute_line)
            .collect::<Result<Vec<_>, _>>()?;
        let totals = calculator::aggregate(
            &computed,
            input.discount,
            self.settings.discount_mode,
            &input.charges,
            input.tax_rate,
        )?;

        let now = Utc::now();
        let number = sequencer::next_number(
            self.store.as_ref(),
            tenant_id,
            SequenceNamespace::Invoice,
            &self.settings.invoice_number_format,
            now,
        )
        .await?;

        let invoice_id = Uuid::new_v4();
        let invoice = Invoice {
            invoice_id,
            tenant_id,
            invoice_number: Some(number),
            status: InvoiceStatus::Draft.as_str().to_string(),
            customer_id: input.customer_id,
            currency: input.currency.clone(),
            issue_date: Some(input.issue_date.unwrap_or_else(|| now.date_naive())),
            due_date: input.due_date,
            discount: input.discount,
            tax_rate: input.tax_rate,
            subtotal: totals.subtotal,
            tax_total: totals.tax_total,
            charges_total: totals.charges_total,
            total: totals.total,
            amount_paid: Decimal::ZERO,
            amount_due: totals.total,
            version: 1,
            created_utc: now,
            sent_utc: None,
            viewed_utc: None,
            voided_utc: None,
        };

        let line_items: Vec<LineItem> = input
            .line_items
            .iter()
            .zip(computed.iter())
            .enumerate()
            .map(|(idx, (line, figures))| LineItem {
                line_item_id: Uuid::new_v4(),
                invoice_id,
                tenant_id,
                description: line.description.clone(),
                quantity: line.quantity,
                unit_rate: line.unit_rate,
                unit: line.unit.clone(),
                tax_rate: line.tax_rate,
                tax_amount: figures.tax_amount,
                total: figures.total,
                sort_order: idx as i32,
                created_utc: now,
            })
            .collect();

        self.store
            .insert_invoice(&invoice, &line_items, &input.charges)
            .await?;

        INVOICES_TOTAL.with_label_values(&["draft"]).inc();
        INVOICE_AMOUNT_TOTAL
            .with_label_values(&[invoice.currency.as_str()])
            .inc_by(totals.total.to_f64().unwrap_or(0.0));

        info!(
            invoice_id = %invoice.invoice_id,
            invoice_number = %invoice.invoice_number.as_deref().unwrap_or(""),
            total = %invoice.total,
            "Invoice created"
        );

        Ok(InvoiceDocument {
            invoice,
            line_items,
            charges: input.charges,
        })
    }

    /// Fetch an invoice with its owned rows.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, invoice_id = %invoice_id))]
    pub async fn get_invoice(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<InvoiceDocument, AppError> {
        let invoice = self.load_invoice(tenant_id, invoice_id).await?;
        let line_items = self
            .store
            .line_items_for_invoice(tenant_id, invoice_id)
            .await?;
        let charges = self.store.charges_for_invoice(tenant_id, invoice_id).await?;
        Ok(InvoiceDocument {
            invoice,
            line_items,
            charges,
        })
    }

    /// Allocate the next invoice number for a tenant without creating an
    /// invoice. Consecutive calls always return distinct numbers.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn next_invoice_number(&self, tenant_id: Uuid) -> Result<String, AppError> {
        sequencer::next_number(
            self.store.as_ref(),
            tenant_id,
            SequenceNamespace::Invoice,
            &self.settings.invoice_number_format,
            Utc::now(),
        )
        .await
    }

    /// Today's authoritative status, re-derived from the ledger cache and
    /// lifecycle flags rather than trusting the stored column.
    pub fn current_status(&self, invoice: &Invoice) -> InvoiceStatus {
        self.status_as_of(invoice, Utc::now().date_naive())
    }

    /// Status derivation against an explicit date; what schedulers use to
    /// sweep for overdue invoices.
    pub fn status_as_of(&self, invoice: &Invoice, today: NaiveDate) -> InvoiceStatus {
        status::derive_status(
            invoice.total,
            invoice.amount_due,
            invoice.due_date,
            invoice.sent_utc.is_some(),
            invoice.viewed_utc.is_some(),
            invoice.voided_utc.is_some(),
            today,
        )
    }

    /// Explicit user action: draft → sent.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, invoice_id = %invoice_id))]
    pub async fn mark_sent(&self, tenant_id: Uuid, invoice_id: Uuid) -> Result<Invoice, AppError> {
        let lock = self.invoice_lock(invoice_id).await;
        let _guard = lock.lock().await;

        let mut invoice = self.load_invoice(tenant_id, invoice_id).await?;
        if invoice.sent_utc.is_some() {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "invoice has already been sent"
            )));
        }
        if invoice.voided_utc.is_some() {
            return Err(AppError::Validation(anyhow::anyhow!(
                "cannot send a void invoice"
            )));
        }

        let now = Utc::now();
        invoice.sent_utc = Some(now);
        self.persist_refreshed(&mut invoice, now).await?;

        info!(invoice_id = %invoice.invoice_id, status = %invoice.status, "Invoice sent");
        Ok(invoice)
    }

    /// Public-access read: stamps the first view and upgrades the status
    /// cache. Never downgrades a paid invoice.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, invoice_id = %invoice_id))]
    pub async fn mark_viewed(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Invoice, AppError> {
        let lock = self.invoice_lock(invoice_id).await;
        let _guard = lock.lock().await;

        let mut invoice = self.load_invoice(tenant_id, invoice_id).await?;
        if invoice.sent_utc.is_none() {
            return Err(AppError::Validation(anyhow::anyhow!(
                "invoice has not been sent"
            )));
        }
        if invoice.viewed_utc.is_some() {
            return Ok(invoice);
        }

        let now = Utc::now();
        invoice.viewed_utc = Some(now);
        self.persist_refreshed(&mut invoice, now).await?;

        Ok(invoice)
    }

    /// Administrative void. Terminal; payment-driven transitions never
    /// leave it.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, invoice_id = %invoice_id))]
    pub async fn void_invoice(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Invoice, AppError> {
        let lock = self.invoice_lock(invoice_id).await;
        let _guard = lock.lock().await;

        let mut invoice = self.load_invoice(tenant_id, invoice_id).await?;
        if invoice.voided_utc.is_some() {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "invoice is already void"
            )));
        }

        let now = Utc::now();
        invoice.voided_utc = Some(now);
        self.persist_refreshed(&mut invoice, now).await?;

        info!(invoice_id = %invoice.invoice_id, "Invoice voided");
        Ok(invoice)
    }

    /// Record a payment against an invoice, refresh the ledger cache and
    /// issue a receipt when the payment completes.
    #[instrument(skip(self, input), fields(tenant_id = %tenant_id, invoice_id = %invoice_id))]
    pub async fn record_payment(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
        input: PaymentInput,
    ) -> Result<PaymentOutcome, AppError> {
        if input.amount <= Decimal::ZERO {
            return Err(track_error(AppError::Validation(anyhow::anyhow!(
                "payment amount must be positive"
            ))));
        }
        if billing_core::money::exceeds_money_scale(input.amount) {
            return Err(track_error(AppError::Validation(anyhow::anyhow!(
                "payment amount carries more than two decimal places"
            ))));
        }
        if input.reference.trim().is_empty() {
            return Err(track_error(AppError::Validation(anyhow::anyhow!(
                "payment reference must not be empty"
            ))));
        }

        let lock = self.invoice_lock(invoice_id).await;
        let _guard = lock.lock().await;

        self.apply_payment(tenant_id, invoice_id, &input)
            .await
            .map_err(track_error)
    }

    /// Promote a pending payment to completed, re-validating the balance
    /// at promotion time. Idempotent for already-completed payments.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, payment_id = %payment_id))]
    pub async fn complete_payment(
        &self,
        tenant_id: Uuid,
        payment_id: Uuid,
    ) -> Result<PaymentOutcome, AppError> {
        let payment = self
            .store
            .get_payment(tenant_id, payment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("payment {payment_id} not found")))?;

        let lock = self.invoice_lock(payment.invoice_id).await;
        let _guard = lock.lock().await;

        self.promote_payment(tenant_id, payment_id)
            .await
            .map_err(track_error)
    }

    async fn apply_payment(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
        input: &PaymentInput,
    ) -> Result<PaymentOutcome, AppError> {
        let invoice = self.load_invoice(tenant_id, invoice_id).await?;
        self.ensure_payable(&invoice)?;

        let payments = self
            .store
            .payments_for_invoice(tenant_id, invoice_id)
            .await?;
        let balance = ledger::balance_due(invoice.total, &payments);
        ledger::check_overpayment(input.amount, balance)?;

        let now = Utc::now();
        let payment_status = if input.pending {
            PaymentStatus::Pending
        } else {
            PaymentStatus::Completed
        };
        let payment = Payment {
            payment_id: Uuid::new_v4(),
            tenant_id,
            invoice_id,
            amount: input.amount,
            method: input.method.clone(),
            reference: input.reference.clone(),
            status: payment_status.as_str().to_string(),
            recorded_utc: now,
        };
        self.store.insert_payment(&payment).await?;

        if input.pending {
            info!(
                payment_id = %payment.payment_id,
                amount = %payment.amount,
                "Pending payment recorded"
            );
            return Ok(PaymentOutcome {
                payment,
                receipt: None,
                invoice,
            });
        }

        let mut all_payments = payments;
        all_payments.push(payment.clone());
        let invoice = self
            .settle_with_retry(tenant_id, invoice_id, invoice, all_payments, now)
            .await?;
        let receipt = self.issue_receipt(&payment, &invoice, now).await?;

        PAYMENT_AMOUNT_TOTAL
            .with_label_values(&[invoice.currency.as_str()])
            .inc_by(payment.amount.to_f64().unwrap_or(0.0));
        info!(
            payment_id = %payment.payment_id,
            amount = %payment.amount,
            balance_due = %invoice.amount_due,
            status = %invoice.status,
            "Payment recorded"
        );

        Ok(PaymentOutcome {
            payment,
            receipt: Some(receipt),
            invoice,
        })
    }

    async fn promote_payment(
        &self,
        tenant_id: Uuid,
        payment_id: Uuid,
    ) -> Result<PaymentOutcome, AppError> {
        let payment = self
            .store
            .get_payment(tenant_id, payment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("payment {payment_id} not found")))?;

        match PaymentStatus::from_string(&payment.status) {
            PaymentStatus::Completed => {
                let invoice = self.load_invoice(tenant_id, payment.invoice_id).await?;
                let receipt = self.store.receipt_for_payment(tenant_id, payment_id).await?;
                Ok(PaymentOutcome {
                    payment,
                    receipt,
                    invoice,
                })
            }
            PaymentStatus::Failed | PaymentStatus::Refunded => {
                Err(AppError::Validation(anyhow::anyhow!(
                    "cannot complete a {} payment",
                    payment.status
                )))
            }
            PaymentStatus::Pending => {
                let invoice = self.load_invoice(tenant_id, payment.invoice_id).await?;
                self.ensure_payable(&invoice)?;

                let payments = self
                    .store
                    .payments_for_invoice(tenant_id, payment.invoice_id)
                    .await?;
                let balance = ledger::balance_due(invoice.total, &payments);
                ledger::check_overpayment(payment.amount, balance)?;

                let now = Utc::now();
                let mut payment = payment;
                payment.status = PaymentStatus::Completed.as_str().to_string();
                self.store.update_payment(&payment).await?;

                let mut all_payments = payments;
                for stored in all_payments.iter_mut() {
                    if stored.payment_id == payment.payment_id {
                        stored.status = payment.status.clone();
                    }
                }
                let invoice = self
                    .settle_with_retry(tenant_id, payment.invoice_id, invoice, all_payments, now)
                    .await?;
                let receipt = self.issue_receipt(&payment, &invoice, now).await?;

                PAYMENT_AMOUNT_TOTAL
                    .with_label_values(&[invoice.currency.as_str()])
                    .inc_by(payment.amount.to_f64().unwrap_or(0.0));
                info!(
                    payment_id = %payment.payment_id,
                    balance_due = %invoice.amount_due,
                    "Pending payment completed"
                );

                Ok(PaymentOutcome {
                    payment,
                    receipt: Some(receipt),
                    invoice,
                })
            }
        }
    }

    /// Refresh the ledger cache columns and status, then persist with a
    /// version check.
    async fn settle(
        &self,
        mut invoice: Invoice,
        payments: &[Payment],
        now: DateTime<Utc>,
    ) -> Result<Invoice, AppError> {
        invoice.amount_paid = ledger::completed_total(payments);
        invoice.amount_due = invoice.total - invoice.amount_paid;
        self.persist_refreshed(&mut invoice, now).await?;
        Ok(invoice)
    }

    /// The payment row is already committed, so a version conflict on the
    /// cache refresh is retried once against fresh state instead of
    /// failing the whole operation.
    async fn settle_with_retry(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
        invoice: Invoice,
        payments: Vec<Payment>,
        now: DateTime<Utc>,
    ) -> Result<Invoice, AppError> {
        match self.settle(invoice, &payments, now).await {
            Err(AppError::Conflict(err)) => {
                warn!(error = %err, "ledger refresh conflicted, retrying once with fresh state");
                let invoice = self.load_invoice(tenant_id, invoice_id).await?;
                let payments = self
                    .store
                    .payments_for_invoice(tenant_id, invoice_id)
                    .await?;
                self.settle(invoice, &payments, now).await
            }
            other => other,
        }
    }

    /// One receipt per completed payment; returns the existing record
    /// when the payment already has one.
    async fn issue_receipt(
        &self,
        payment: &Payment,
        invoice: &Invoice,
        now: DateTime<Utc>,
    ) -> Result<Receipt, AppError> {
        if let Some(existing) = self
            .store
            .receipt_for_payment(payment.tenant_id, payment.payment_id)
            .await?
        {
            return Ok(existing);
        }

        let number = sequencer::next_number(
            self.store.as_ref(),
            payment.tenant_id,
            SequenceNamespace::Receipt,
            &self.settings.receipt_number_format,
            now,
        )
        .await?;

        let receipt = Receipt {
            receipt_id: Uuid::new_v4(),
            tenant_id: payment.tenant_id,
            receipt_number: number,
            payment_id: payment.payment_id,
            invoice_id: payment.invoice_id,
            amount: payment.amount,
            currency: invoice.currency.clone(),
            issued_utc: now,
        };
        self.store.insert_receipt(&receipt).await?;

        RECEIPTS_TOTAL
            .with_label_values(&[payment.method.as_str()])
            .inc();
        info!(
            receipt_id = %receipt.receipt_id,
            receipt_number = %receipt.receipt_number,
            "Receipt issued"
        );

        Ok(receipt)
    }

    async fn load_invoice(&self, tenant_id: Uuid, invoice_id: Uuid) -> Result<Invoice, AppError> {
        self.store
            .get_invoice(tenant_id, invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("invoice {invoice_id} not found")))
    }

    fn ensure_payable(&self, invoice: &Invoice) -> Result<(), AppError> {
        match InvoiceStatus::from_string(&invoice.status) {
            InvoiceStatus::Draft => Err(AppError::Validation(anyhow::anyhow!(
                "cannot record a payment against a draft invoice"
            ))),
            InvoiceStatus::Void => Err(AppError::Validation(anyhow::anyhow!(
                "cannot record a payment against a void invoice"
            ))),
            _ => Ok(()),
        }
    }

    /// Re-derive the status cache, bump the version and persist.
    async fn persist_refreshed(
        &self,
        invoice: &mut Invoice,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let derived = status::derive_status(
            invoice.total,
            invoice.amount_due,
            invoice.due_date,
            invoice.sent_utc.is_some(),
            invoice.viewed_utc.is_some(),
            invoice.voided_utc.is_some(),
            now.date_naive(),
        );
        invoice.status = derived.as_str().to_string();

        let expected = invoice.version;
        invoice.version += 1;
        self.store.update_invoice(invoice, expected).await?;

        INVOICES_TOTAL
            .with_label_values(&[invoice.status.as_str()])
            .inc();
        Ok(())
    }

    async fn invoice_lock(&self, invoice_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.invoice_locks.lock().await;
        locks
            .entry(invoice_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

fn track_error(err: AppError) -> AppError {
    ERRORS_TOTAL.with_label_values(&[err.kind()]).inc();
    err
}
