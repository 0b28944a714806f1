//! Pure money calculations: line totals and invoice aggregation.
//!
//! Rounding policy is per-line-first: every line is rounded to two
//! decimals before summation, so `subtotal` equals the sum of the visible
//! line totals exactly instead of an exact-then-round figure that can
//! disagree with what the invoice shows.

use billing_core::config::DiscountMode;
use billing_core::error::AppError;
use billing_core::money;
use rust_decimal::Decimal;

use crate::models::{AdditionalCharge, CreateLineItem};

/// Computed monetary figures for one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComputedLine {
    pub total: Decimal,
    pub tax_amount: Decimal,
}

/// Computed totals for one invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvoiceTotals {
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub tax_total: Decimal,
    pub charges_total: Decimal,
    pub total: Decimal,
}

/// Compute `quantity × unit_rate`, rounded half-up to two decimals.
pub fn line_total(quantity: Decimal, unit_rate: Decimal) -> Result<Decimal, AppError> {
    if quantity.is_sign_negative() {
        return Err(AppError::Validation(anyhow::anyhow!(
            "line quantity must not be negative"
        )));
    }
    if unit_rate.is_sign_negative() {
        return Err(AppError::Validation(anyhow::anyhow!(
            "line unit rate must not be negative"
        )));
    }
    if money::exceeds_money_scale(unit_rate) {
        return Err(AppError::Validation(anyhow::anyhow!(
            "line unit rate carries more than two decimal places"
        )));
    }

    let product = quantity.checked_mul(unit_rate).ok_or_else(|| {
        AppError::Validation(anyhow::anyhow!("line amount overflows the money range"))
    })?;

    Ok(money::round_half_up(product))
}

/// Per-item tax on a line's own total.
pub fn line_tax(total: Decimal, tax_rate: Decimal) -> Result<Decimal, AppError> {
    validate_tax_rate(tax_rate)?;
    Ok(money::round_half_up(total * tax_rate))
}

/// Compute a line's total and per-item tax from caller input.
pub fn compute_line(input: &CreateLineItem) -> Result<ComputedLine, AppError> {
    let total = line_total(input.quantity, input.unit_rate)?;
    let tax_amount = match input.tax_rate {
        Some(rate) => line_tax(total, rate)?,
        None => Decimal::ZERO,
    };
    Ok(ComputedLine { total, tax_amount })
}

/// Combine line totals with discount, additional charges and the
/// invoice-level tax rate. Discount applies before tax; the taxable base
/// never goes negative.
pub fn aggregate(
    lines: &[ComputedLine],
    discount: Decimal,
    discount_mode: DiscountMode,
    charges: &[AdditionalCharge],
    tax_rate: Decimal,
) -> Result<InvoiceTotals, AppError> {
    validate_tax_rate(tax_rate)?;
    if discount.is_sign_negative() {
        return Err(AppError::Validation(anyhow::anyhow!(
            "discount must not be negative"
        )));
    }
    match discount_mode {
        DiscountMode::Flat => {
            if money::exceeds_money_scale(discount) {
                return Err(AppError::Validation(anyhow::anyhow!(
                    "flat discount carries more than two decimal places"
                )));
            }
        }
        DiscountMode::Percent => {
            if discount > Decimal::ONE {
                return Err(AppError::Validation(anyhow::anyhow!(
                    "percent discount must be within [0, 1]"
                )));
            }
        }
    }
    for charge in charges {
        if charge.amount.is_sign_negative() {
            return Err(AppError::Validation(anyhow::anyhow!(
                "additional charge '{}' must not be negative",
                charge.name
            )));
        }
        if money::exceeds_money_scale(charge.amount) {
            return Err(AppError::Validation(anyhow::anyhow!(
                "additional charge '{}' carries more than two decimal places",
                charge.name
            )));
        }
    }

    let subtotal = money::round_half_up(lines.iter().map(|line| line.total).sum());

    let discount_amount = match discount_mode {
        DiscountMode::Flat => discount,
        DiscountMode::Percent => money::round_half_up(subtotal * discount),
    };

    let taxable_base = (subtotal - discount_amount).max(Decimal::ZERO);

    let line_tax_total: Decimal = lines.iter().map(|line| line.tax_amount).sum();
    let tax_total = money::round_half_up(taxable_base * tax_rate) + line_tax_total;

    let charges_total =
        money::round_half_up(charges.iter().map(|charge| charge.amount).sum());

    let total = money::round_half_up(taxable_base + tax_total + charges_total);

    Ok(InvoiceTotals {
        subtotal,
        discount_amount,
        tax_total,
        charges_total,
        total,
    })
}

fn validate_tax_rate(tax_rate: Decimal) -> Result<(), AppError> {
    if tax_rate.is_sign_negative() || tax_rate > Decimal::ONE {
        return Err(AppError::Validation(anyhow::anyhow!(
            "tax rate must be within [0, 1]"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn computed(totals: &[Decimal]) -> Vec<ComputedLine> {
        totals
            .iter()
            .map(|total| ComputedLine {
                total: *total,
                tax_amount: Decimal::ZERO,
            })
            .collect()
    }

    #[test]
    fn line_total_rounds_half_up() {
        assert_eq!(line_total(dec!(3), dec!(33.33)).unwrap(), dec!(99.99));
        assert_eq!(line_total(dec!(7), dec!(14.29)).unwrap(), dec!(100.03));
        // 0.5 × 0.25 = 0.125 sits on the midpoint
        assert_eq!(line_total(dec!(0.5), dec!(0.25)).unwrap(), dec!(0.13));
    }

    #[test]
    fn line_total_rejects_negative_inputs() {
        assert!(matches!(
            line_total(dec!(-1), dec!(10.00)),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            line_total(dec!(1), dec!(-10.00)),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn aggregate_matches_flat_tax_fixture() {
        let totals = aggregate(
            &computed(&[dec!(3750.00)]),
            Decimal::ZERO,
            DiscountMode::Flat,
            &[],
            dec!(0.06),
        )
        .unwrap();
        assert_eq!(totals.subtotal, dec!(3750.00));
        assert_eq!(totals.tax_total, dec!(225.00));
        assert_eq!(totals.total, dec!(3975.00));
    }

    #[test]
    fn aggregate_rounds_per_line_first() {
        let lines = vec![
            ComputedLine {
                total: line_total(dec!(3), dec!(33.33)).unwrap(),
                tax_amount: Decimal::ZERO,
            },
            ComputedLine {
                total: line_total(dec!(7), dec!(14.29)).unwrap(),
                tax_amount: Decimal::ZERO,
            },
        ];
        let totals =
            aggregate(&lines, Decimal::ZERO, DiscountMode::Flat, &[], dec!(0.08)).unwrap();
        assert_eq!(totals.subtotal, dec!(200.02));
        assert_eq!(totals.tax_total, dec!(16.00));
        assert_eq!(totals.total, dec!(216.02));
    }

    #[test]
    fn discount_applies_before_tax() {
        let totals = aggregate(
            &computed(&[dec!(100.00)]),
            dec!(20.00),
            DiscountMode::Flat,
            &[],
            dec!(0.10),
        )
        .unwrap();
        assert_eq!(totals.tax_total, dec!(8.00));
        assert_eq!(totals.total, dec!(88.00));
    }

    #[test]
    fn discount_larger_than_subtotal_floors_taxable_base_at_zero() {
        let totals = aggregate(
            &computed(&[dec!(50.00)]),
            dec!(80.00),
            DiscountMode::Flat,
            &[],
            dec!(0.10),
        )
        .unwrap();
        assert_eq!(totals.tax_total, dec!(0.00));
        assert_eq!(totals.total, dec!(0.00));
    }

    #[test]
    fn percent_discount_is_a_fraction_of_the_subtotal() {
        let totals = aggregate(
            &computed(&[dec!(200.00)]),
            dec!(0.25),
            DiscountMode::Percent,
            &[],
            dec!(0.10),
        )
        .unwrap();
        assert_eq!(totals.discount_amount, dec!(50.00));
        assert_eq!(totals.tax_total, dec!(15.00));
        assert_eq!(totals.total, dec!(165.00));
    }

    #[test]
    fn charges_are_added_after_tax() {
        let charges = vec![AdditionalCharge {
            name: "shipping".to_string(),
            amount: dec!(12.50),
        }];
        let totals = aggregate(
            &computed(&[dec!(100.00)]),
            Decimal::ZERO,
            DiscountMode::Flat,
            &charges,
            dec!(0.10),
        )
        .unwrap();
        assert_eq!(totals.charges_total, dec!(12.50));
        assert_eq!(totals.total, dec!(122.50));
    }

    #[test]
    fn per_item_tax_adds_into_the_invoice_tax_total() {
        let lines = vec![
            ComputedLine {
                total: dec!(100.00),
                tax_amount: dec!(5.00),
            },
            ComputedLine {
                total: dec!(50.00),
                tax_amount: Decimal::ZERO,
            },
        ];
        let totals =
            aggregate(&lines, Decimal::ZERO, DiscountMode::Flat, &[], dec!(0.10)).unwrap();
        assert_eq!(totals.tax_total, dec!(20.00));
        assert_eq!(totals.total, dec!(170.00));
    }

    #[test]
    fn aggregate_rejects_out_of_range_tax_rate() {
        assert!(matches!(
            aggregate(
                &computed(&[dec!(10.00)]),
                Decimal::ZERO,
                DiscountMode::Flat,
                &[],
                dec!(1.01)
            ),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            aggregate(
                &computed(&[dec!(10.00)]),
                Decimal::ZERO,
                DiscountMode::Flat,
                &[],
                dec!(-0.01)
            ),
            Err(AppError::Validation(_))
        ));
    }
}
