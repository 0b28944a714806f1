//! Postgres store.

use std::time::Duration;

use async_trait::async_trait;
use billing_core::config::DatabaseSettings;
use billing_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::models::{
    AdditionalCharge, Invoice, LineItem, Payment, Receipt, SequenceCounter, SequenceNamespace,
};
use crate::services::metrics::STORE_OP_DURATION;

use super::InvoicingStore;

/// Connection pool wrapper.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new connection pool.
    #[instrument(skip(settings))]
    pub async fn new(settings: &DatabaseSettings) -> Result<Self, AppError> {
        info!(
            max_connections = settings.max_connections,
            min_connections = settings.min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .min_connections(settings.min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(&settings.url)
            .await
            .map_err(|e| AppError::Storage(anyhow::anyhow!("failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check store health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Storage(anyhow::anyhow!("health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Storage(anyhow::anyhow!("migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl InvoicingStore for PostgresStore {
    #[instrument(skip(self, invoice, line_items, charges), fields(tenant_id = %invoice.tenant_id, invoice_id = %invoice.invoice_id))]
    async fn insert_invoice(
        &self,
        invoice: &Invoice,
        line_items: &[LineItem],
        charges: &[AdditionalCharge],
    ) -> Result<(), AppError> {
        let timer = STORE_OP_DURATION
            .with_label_values(&["insert_invoice"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::Storage(anyhow::anyhow!("failed to begin: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO invoices (
                invoice_id, tenant_id, invoice_number, status, customer_id, currency,
                issue_date, due_date, discount, tax_rate, subtotal, tax_total, charges_total,
                total, amount_paid, amount_due, version, created_utc, sent_utc, viewed_utc, voided_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21)
            "#,
        )
        .bind(invoice.invoice_id)
        .bind(invoice.tenant_id)
        .bind(&invoice.invoice_number)
        .bind(&invoice.status)
        .bind(invoice.customer_id)
        .bind(&invoice.currency)
        .bind(invoice.issue_date)
        .bind(invoice.due_date)
        .bind(invoice.discount)
        .bind(invoice.tax_rate)
        .bind(invoice.subtotal)
        .bind(invoice.tax_total)
        .bind(invoice.charges_total)
        .bind(invoice.total)
        .bind(invoice.amount_paid)
        .bind(invoice.amount_due)
        .bind(invoice.version)
        .bind(invoice.created_utc)
        .bind(invoice.sent_utc)
        .bind(invoice.viewed_utc)
        .bind(invoice.voided_utc)
        .execute(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "invoice number '{}' already exists for this tenant",
                    invoice.invoice_number.as_deref().unwrap_or("")
                ))
            }
            _ => AppError::Storage(anyhow::anyhow!("failed to insert invoice: {}", e)),
        })?;

        for item in line_items {
            sqlx::query(
                r#"
                INSERT INTO line_items (
                    line_item_id, invoice_id, tenant_id, description, quantity, unit_rate,
                    unit, tax_rate, tax_amount, total, sort_order, created_utc
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                "#,
            )
            .bind(item.line_item_id)
            .bind(item.invoice_id)
            .bind(item.tenant_id)
            .bind(&item.description)
            .bind(item.quantity)
            .bind(item.unit_rate)
            .bind(&item.unit)
            .bind(item.tax_rate)
            .bind(item.tax_amount)
            .bind(item.total)
            .bind(item.sort_order)
            .bind(item.created_utc)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::Storage(anyhow::anyhow!("failed to insert line item: {}", e)))?;
        }

        for (idx, charge) in charges.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO invoice_charges (invoice_id, tenant_id, name, amount, sort_order)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(invoice.invoice_id)
            .bind(invoice.tenant_id)
            .bind(&charge.name)
            .bind(charge.amount)
            .bind(idx as i32)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::Storage(anyhow::anyhow!("failed to insert charge: {}", e)))?;
        }

        tx.commit()
            .await
            .map_err(|e| AppError::Storage(anyhow::anyhow!("failed to commit: {}", e)))?;

        timer.observe_duration();

        info!(invoice_id = %invoice.invoice_id, "Invoice persisted");

        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, invoice_id = %invoice_id))]
    async fn get_invoice(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, AppError> {
        let timer = STORE_OP_DURATION
            .with_label_values(&["get_invoice"])
            .start_timer();

        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT invoice_id, tenant_id, invoice_number, status, customer_id, currency,
                issue_date, due_date, discount, tax_rate, subtotal, tax_total, charges_total,
                total, amount_paid, amount_due, version, created_utc, sent_utc, viewed_utc, voided_utc
            FROM invoices
            WHERE tenant_id = $1 AND invoice_id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Storage(anyhow::anyhow!("failed to get invoice: {}", e)))?;

        timer.observe_duration();

        Ok(invoice)
    }

    #[instrument(skip(self, invoice), fields(tenant_id = %invoice.tenant_id, invoice_id = %invoice.invoice_id))]
    async fn update_invoice(
        &self,
        invoice: &Invoice,
        expected_version: i64,
    ) -> Result<(), AppError> {
        let timer = STORE_OP_DURATION
            .with_label_values(&["update_invoice"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE invoices
            SET status = $3,
                issue_date = $4,
                due_date = $5,
                subtotal = $6,
                tax_total = $7,
                charges_total = $8,
                total = $9,
                amount_paid = $10,
                amount_due = $11,
                version = $12,
                sent_utc = $13,
                viewed_utc = $14,
                voided_utc = $15
            WHERE tenant_id = $1 AND invoice_id = $2 AND version = $16
            "#,
        )
        .bind(invoice.tenant_id)
        .bind(invoice.invoice_id)
        .bind(&invoice.status)
        .bind(invoice.issue_date)
        .bind(invoice.due_date)
        .bind(invoice.subtotal)
        .bind(invoice.tax_total)
        .bind(invoice.charges_total)
        .bind(invoice.total)
        .bind(invoice.amount_paid)
        .bind(invoice.amount_due)
        .bind(invoice.version)
        .bind(invoice.sent_utc)
        .bind(invoice.viewed_utc)
        .bind(invoice.voided_utc)
        .bind(expected_version)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Storage(anyhow::anyhow!("failed to update invoice: {}", e)))?;

        timer.observe_duration();

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "concurrent update detected for invoice {}",
                invoice.invoice_id
            )));
        }

        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn find_latest_number(
        &self,
        tenant_id: Uuid,
        namespace: SequenceNamespace,
    ) -> Result<Option<String>, AppError> {
        let timer = STORE_OP_DURATION
            .with_label_values(&["find_latest_number"])
            .start_timer();

        let query = match namespace {
            SequenceNamespace::Invoice => {
                r#"
                SELECT invoice_number
                FROM invoices
                WHERE tenant_id = $1 AND invoice_number IS NOT NULL
                ORDER BY created_utc DESC
                LIMIT 1
                "#
            }
            SequenceNamespace::Receipt => {
                r#"
                SELECT receipt_number
                FROM receipts
                WHERE tenant_id = $1
                ORDER BY issued_utc DESC
                LIMIT 1
                "#
            }
        };

        let number = sqlx::query_scalar::<_, String>(query)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::Storage(anyhow::anyhow!("failed to find latest number: {}", e))
            })?;

        timer.observe_duration();

        Ok(number)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn sequence_counter(
        &self,
        tenant_id: Uuid,
        namespace: SequenceNamespace,
    ) -> Result<Option<SequenceCounter>, AppError> {
        let timer = STORE_OP_DURATION
            .with_label_values(&["sequence_counter"])
            .start_timer();

        let counter = sqlx::query_as::<_, SequenceCounter>(
            r#"
            SELECT tenant_id, namespace, last_seq, format_template
            FROM sequence_counters
            WHERE tenant_id = $1 AND namespace = $2
            "#,
        )
        .bind(tenant_id)
        .bind(namespace.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Storage(anyhow::anyhow!("failed to get counter: {}", e)))?;

        timer.observe_duration();

        Ok(counter)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    async fn advance_sequence(
        &self,
        tenant_id: Uuid,
        namespace: SequenceNamespace,
        floor: Option<i64>,
    ) -> Result<i64, AppError> {
        let timer = STORE_OP_DURATION
            .with_label_values(&["advance_sequence"])
            .start_timer();

        // Single upsert so concurrent callers never observe the same
        // value.
        let next = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO sequence_counters (tenant_id, namespace, last_seq)
            VALUES ($1, $2, COALESCE($3, 0) + 1)
            ON CONFLICT (tenant_id, namespace)
            DO UPDATE SET last_seq = GREATEST(sequence_counters.last_seq, COALESCE($3, 0)) + 1
            RETURNING last_seq
            "#,
        )
        .bind(tenant_id)
        .bind(namespace.as_str())
        .bind(floor)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Storage(anyhow::anyhow!("failed to advance sequence: {}", e)))?;

        timer.observe_duration();

        Ok(next)
    }

    #[instrument(skip(self, payment), fields(tenant_id = %payment.tenant_id, invoice_id = %payment.invoice_id))]
    async fn insert_payment(&self, payment: &Payment) -> Result<(), AppError> {
        let timer = STORE_OP_DURATION
            .with_label_values(&["insert_payment"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO payments (
                payment_id, tenant_id, invoice_id, amount, method, reference, status, recorded_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(payment.payment_id)
        .bind(payment.tenant_id)
        .bind(payment.invoice_id)
        .bind(payment.amount)
        .bind(&payment.method)
        .bind(&payment.reference)
        .bind(&payment.status)
        .bind(payment.recorded_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "payment reference '{}' already recorded for invoice {}",
                    payment.reference,
                    payment.invoice_id
                ))
            }
            _ => AppError::Storage(anyhow::anyhow!("failed to insert payment: {}", e)),
        })?;

        timer.observe_duration();

        info!(payment_id = %payment.payment_id, "Payment persisted");

        Ok(())
    }

    #[instrument(skip(self, payment), fields(payment_id = %payment.payment_id))]
    async fn update_payment(&self, payment: &Payment) -> Result<(), AppError> {
        let timer = STORE_OP_DURATION
            .with_label_values(&["update_payment"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = $3
            WHERE tenant_id = $1 AND payment_id = $2
            "#,
        )
        .bind(payment.tenant_id)
        .bind(payment.payment_id)
        .bind(&payment.status)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Storage(anyhow::anyhow!("failed to update payment: {}", e)))?;

        timer.observe_duration();

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "payment {} not found",
                payment.payment_id
            )));
        }

        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, payment_id = %payment_id))]
    async fn get_payment(
        &self,
        tenant_id: Uuid,
        payment_id: Uuid,
    ) -> Result<Option<Payment>, AppError> {
        let timer = STORE_OP_DURATION
            .with_label_values(&["get_payment"])
            .start_timer();

        let payment = sqlx::query_as::<_, Payment>(
            r#"
            SELECT payment_id, tenant_id, invoice_id, amount, method, reference, status, recorded_utc
            FROM payments
            WHERE tenant_id = $1 AND payment_id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Storage(anyhow::anyhow!("failed to get payment: {}", e)))?;

        timer.observe_duration();

        Ok(payment)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, invoice_id = %invoice_id))]
    async fn payments_for_invoice(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Vec<Payment>, AppError> {
        let timer = STORE_OP_DURATION
            .with_label_values(&["payments_for_invoice"])
            .start_timer();

        let payments = sqlx::query_as::<_, Payment>(
            r#"
            SELECT payment_id, tenant_id, invoice_id, amount, method, reference, status, recorded_utc
            FROM payments
            WHERE tenant_id = $1 AND invoice_id = $2
            ORDER BY recorded_utc
            "#,
        )
        .bind(tenant_id)
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Storage(anyhow::anyhow!("failed to list payments: {}", e)))?;

        timer.observe_duration();

        Ok(payments)
    }

    #[instrument(skip(self, receipt), fields(tenant_id = %receipt.tenant_id, payment_id = %receipt.payment_id))]
    async fn insert_receipt(&self, receipt: &Receipt) -> Result<(), AppError> {
        let timer = STORE_OP_DURATION
            .with_label_values(&["insert_receipt"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO receipts (
                receipt_id, tenant_id, receipt_number, payment_id, invoice_id, amount, currency, issued_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(receipt.receipt_id)
        .bind(receipt.tenant_id)
        .bind(&receipt.receipt_number)
        .bind(receipt.payment_id)
        .bind(receipt.invoice_id)
        .bind(receipt.amount)
        .bind(&receipt.currency)
        .bind(receipt.issued_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "receipt already issued for payment {}",
                    receipt.payment_id
                ))
            }
            _ => AppError::Storage(anyhow::anyhow!("failed to insert receipt: {}", e)),
        })?;

        timer.observe_duration();

        info!(receipt_id = %receipt.receipt_id, receipt_number = %receipt.receipt_number, "Receipt persisted");

        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, payment_id = %payment_id))]
    async fn receipt_for_payment(
        &self,
        tenant_id: Uuid,
        payment_id: Uuid,
    ) -> Result<Option<Receipt>, AppError> {
        let timer = STORE_OP_DURATION
            .with_label_values(&["receipt_for_payment"])
            .start_timer();

        let receipt = sqlx::query_as::<_, Receipt>(
            r#"
            SELECT receipt_id, tenant_id, receipt_number, payment_id, invoice_id, amount, currency, issued_utc
            FROM receipts
            WHERE tenant_id = $1 AND payment_id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Storage(anyhow::anyhow!("failed to get receipt: {}", e)))?;

        timer.observe_duration();

        Ok(receipt)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, invoice_id = %invoice_id))]
    async fn line_items_for_invoice(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Vec<LineItem>, AppError> {
        let timer = STORE_OP_DURATION
            .with_label_values(&["line_items_for_invoice"])
            .start_timer();

        let items = sqlx::query_as::<_, LineItem>(
            r#"
            SELECT line_item_id, invoice_id, tenant_id, description, quantity, unit_rate,
                unit, tax_rate, tax_amount, total, sort_order, created_utc
            FROM line_items
            WHERE tenant_id = $1 AND invoice_id = $2
            ORDER BY sort_order, created_utc
            "#,
        )
        .bind(tenant_id)
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Storage(anyhow::anyhow!("failed to list line items: {}", e)))?;

        timer.observe_duration();

        Ok(items)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, invoice_id = %invoice_id))]
    async fn charges_for_invoice(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Vec<AdditionalCharge>, AppError> {
        let timer = STORE_OP_DURATION
            .with_label_values(&["charges_for_invoice"])
            .start_timer();

        let charges = sqlx::query_as::<_, AdditionalCharge>(
            r#"
            SELECT name, amount
            FROM invoice_charges
            WHERE tenant_id = $1 AND invoice_id = $2
            ORDER BY sort_order
            "#,
        )
        .bind(tenant_id)
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Storage(anyhow::anyhow!("failed to list charges: {}", e)))?;

        timer.observe_duration();

        Ok(charges)
    }
}
