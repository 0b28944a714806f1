//! Payment ledger arithmetic.
//!
//! Balances are always re-derived from the payment list; the columns on
//! the invoice row are a cache refreshed after every mutation, never the
//! source of truth.

use billing_core::error::AppError;
use rust_decimal::Decimal;

use crate::models::{Payment, PaymentStatus};

/// Sum of completed payments. Pending, failed and refunded payments count
/// for nothing.
pub fn completed_total(payments: &[Payment]) -> Decimal {
    payments
        .iter()
        .filter(|payment| payment.status == PaymentStatus::Completed.as_str())
        .map(|payment| payment.amount)
        .sum()
}

/// Outstanding balance: invoice total minus completed payments.
pub fn balance_due(total: Decimal, payments: &[Payment]) -> Decimal {
    total - completed_total(payments)
}

/// Reject a payment that exceeds the outstanding balance. The engine
/// never silently clamps; the caller gets the computed balance back.
pub fn check_overpayment(amount: Decimal, balance_due: Decimal) -> Result<(), AppError> {
    if amount > balance_due {
        return Err(AppError::Overpayment {
            amount,
            balance_due,
        });
    }
    Ok(())
}
