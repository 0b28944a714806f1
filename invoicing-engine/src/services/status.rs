//! Invoice status derivation.
//!
//! Status is a pure function of the ledger and lifecycle flags; the
//! persisted column is a cache refreshed on every mutation and
//! re-derived on read. Precedence:
//! void > paid > partially_paid > overdue > viewed > sent > draft.

use billing_core::money;
use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::models::InvoiceStatus;

pub fn derive_status(
    total: Decimal,
    balance_due: Decimal,
    due_date: Option<NaiveDate>,
    sent: bool,
    viewed: bool,
    voided: bool,
    today: NaiveDate,
) -> InvoiceStatus {
    if voided {
        return InvoiceStatus::Void;
    }
    if !sent {
        return InvoiceStatus::Draft;
    }
    if money::is_settled(balance_due) {
        return InvoiceStatus::Paid;
    }
    // Partial payment outranks overdue: the balance keeps shrinking even
    // past the due date.
    if balance_due < total {
        return InvoiceStatus::PartiallyPaid;
    }
    if let Some(due) = due_date {
        if due < today {
            return InvoiceStatus::Overdue;
        }
    }
    if viewed {
        InvoiceStatus::Viewed
    } else {
        InvoiceStatus::Sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn draft_until_sent() {
        let status = derive_status(
            dec!(100.00),
            dec!(100.00),
            None,
            false,
            false,
            false,
            day(2026, 1, 15),
        );
        assert_eq!(status, InvoiceStatus::Draft);
    }

    #[test]
    fn viewed_upgrades_sent() {
        let today = day(2026, 1, 15);
        let sent = derive_status(dec!(100.00), dec!(100.00), None, true, false, false, today);
        assert_eq!(sent, InvoiceStatus::Sent);
        let viewed = derive_status(dec!(100.00), dec!(100.00), None, true, true, false, today);
        assert_eq!(viewed, InvoiceStatus::Viewed);
    }

    #[test]
    fn past_due_date_with_open_balance_is_overdue() {
        let status = derive_status(
            dec!(100.00),
            dec!(100.00),
            Some(day(2026, 1, 10)),
            true,
            true,
            false,
            day(2026, 1, 15),
        );
        assert_eq!(status, InvoiceStatus::Overdue);
    }

    #[test]
    fn partial_payment_outranks_overdue() {
        let status = derive_status(
            dec!(100.00),
            dec!(40.00),
            Some(day(2026, 1, 10)),
            true,
            true,
            false,
            day(2026, 1, 15),
        );
        assert_eq!(status, InvoiceStatus::PartiallyPaid);
    }

    #[test]
    fn settled_balance_is_paid_even_past_due() {
        let status = derive_status(
            dec!(100.00),
            dec!(0.00),
            Some(day(2026, 1, 10)),
            true,
            false,
            false,
            day(2026, 1, 15),
        );
        assert_eq!(status, InvoiceStatus::Paid);
    }

    #[test]
    fn residual_rounding_drift_still_counts_as_paid() {
        let status = derive_status(
            dec!(100.00),
            dec!(0.005),
            None,
            true,
            false,
            false,
            day(2026, 1, 15),
        );
        assert_eq!(status, InvoiceStatus::Paid);
    }

    #[test]
    fn void_outranks_everything() {
        let status = derive_status(
            dec!(100.00),
            dec!(0.00),
            Some(day(2026, 1, 10)),
            true,
            true,
            true,
            day(2026, 1, 15),
        );
        assert_eq!(status, InvoiceStatus::Void);
    }

    #[test]
    fn due_today_is_not_overdue() {
        let today = day(2026, 1, 15);
        let status = derive_status(
            dec!(100.00),
            dec!(100.00),
            Some(today),
            true,
            false,
            false,
            today,
        );
        assert_eq!(status, InvoiceStatus::Sent);
    }
}
