//! billing-core: Shared kernel for the invoicing engine.

pub mod config;
pub mod error;
pub mod money;
pub mod observability;

pub use rust_decimal;
pub use tracing;
