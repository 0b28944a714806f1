//! invoicing-engine: invoice financial calculation and payment
//! reconciliation.
//!
//! Turns line items into a financially correct invoice (subtotal,
//! discount, tax, additional charges), assigns sequential invoice
//! numbers, and reconciles payments against the outstanding balance
//! through the invoice status lifecycle. Storage is an injected
//! collaborator behind [`storage::InvoicingStore`].

pub mod models;
pub mod services;
pub mod storage;

pub use services::engine::InvoicingEngine;
