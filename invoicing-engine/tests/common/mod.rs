//! Shared test harness for the invoicing engine.

#![allow(dead_code)]

use std::sync::Arc;

use billing_core::config::EngineSettings;
use chrono::Utc;
use invoicing_engine::models::{
    CreateInvoice, CreateLineItem, Invoice, InvoiceStatus, PaymentInput,
};
use invoicing_engine::storage::{InMemoryStore, InvoicingStore};
use invoicing_engine::InvoicingEngine;
use rust_decimal::Decimal;
use uuid::Uuid;

pub const TEST_TENANT_ID: Uuid = Uuid::from_u128(0x0191_2f5e_0000_7000_8000_0000_0000_0001);
pub const TEST_CUSTOMER_ID: Uuid = Uuid::from_u128(0x0191_2f5e_0000_7000_8000_0000_0000_0002);

/// Engine over a fresh in-memory store.
pub struct TestApp {
    pub engine: InvoicingEngine,
    pub store: Arc<InMemoryStore>,
}

impl TestApp {
    pub fn spawn() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let engine = InvoicingEngine::new(store.clone(), EngineSettings::default());
        Self { engine, store }
    }

    pub fn with_settings(settings: EngineSettings) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let engine = InvoicingEngine::new(store.clone(), settings);
        Self { engine, store }
    }
}

/// Helper to build a line item input.
pub fn line(quantity: Decimal, unit_rate: Decimal) -> CreateLineItem {
    CreateLineItem {
        description: "Consulting".to_string(),
        quantity,
        unit_rate,
        unit: Some("hours".to_string()),
        tax_rate: None,
    }
}

/// Helper to build a draft invoice input with no discount or charges.
pub fn draft(line_items: Vec<CreateLineItem>, tax_rate: Decimal) -> CreateInvoice {
    CreateInvoice {
        customer_id: TEST_CUSTOMER_ID,
        currency: "USD".to_string(),
        issue_date: None,
        due_date: None,
        discount: Decimal::ZERO,
        tax_rate,
        line_items,
        charges: Vec::new(),
    }
}

/// Helper to build a completed-payment input.
pub fn payment(amount: Decimal, reference: &str) -> PaymentInput {
    PaymentInput {
        amount,
        method: "card".to_string(),
        reference: reference.to_string(),
        pending: false,
    }
}

/// Helper to create and send an invoice so it can accept payments.
pub async fn sent_invoice(
    engine: &InvoicingEngine,
    line_items: Vec<CreateLineItem>,
    tax_rate: Decimal,
) -> Invoice {
    let document = engine
        .create_invoice(TEST_TENANT_ID, draft(line_items, tax_rate))
        .await
        .expect("Failed to create invoice");
    engine
        .mark_sent(TEST_TENANT_ID, document.invoice.invoice_id)
        .await
        .expect("Failed to send invoice")
}

/// Seed the store with an already-numbered invoice, bypassing the engine.
pub async fn seed_invoice_with_number(store: &InMemoryStore, invoice_number: &str) {
    let now = Utc::now();
    let invoice = Invoice {
        invoice_id: Uuid::new_v4(),
        tenant_id: TEST_TENANT_ID,
        invoice_number: Some(invoice_number.to_string()),
        status: InvoiceStatus::Draft.as_str().to_string(),
        customer_id: TEST_CUSTOMER_ID,
        currency: "USD".to_string(),
        issue_date: Some(now.date_naive()),
        due_date: None,
        discount: Decimal::ZERO,
        tax_rate: Decimal::ZERO,
        subtotal: Decimal::ZERO,
        tax_total: Decimal::ZERO,
        charges_total: Decimal::ZERO,
        total: Decimal::ZERO,
        amount_paid: Decimal::ZERO,
        amount_due: Decimal::ZERO,
        version: 1,
        created_utc: now,
        sent_utc: None,
        viewed_utc: None,
        voided_utc: None,
    };
    store
        .insert_invoice(&invoice, &[], &[])
        .await
        .expect("Failed to seed invoice");
}
