//! Domain models for the invoicing engine.

mod invoice;
mod line_item;
mod payment;
mod receipt;
mod sequence;

pub use invoice::{AdditionalCharge, CreateInvoice, Invoice, InvoiceDocument, InvoiceStatus};
pub use line_item::{CreateLineItem, LineItem};
pub use payment::{Payment, PaymentInput, PaymentOutcome, PaymentStatus};
pub use receipt::Receipt;
pub use sequence::{SequenceCounter, SequenceNamespace};
