//! Services module for the invoicing engine.

pub mod calculator;
pub mod engine;
pub mod ledger;
pub mod metrics;
pub mod sequencer;
pub mod status;

pub use engine::InvoicingEngine;
pub use metrics::{get_metrics, init_metrics};
