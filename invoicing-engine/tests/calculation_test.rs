//! Aggregation properties over the pure calculator.

use billing_core::config::DiscountMode;
use billing_core::money;
use invoicing_engine::services::calculator::{self, ComputedLine};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// A money-scale rate in [0.00, 10_000.00].
fn rate_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..1_000_000).prop_map(|cents| Decimal::new(cents, 2))
}

/// A whole-unit quantity in [0, 1_000].
fn quantity_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..1_000).prop_map(Decimal::from)
}

proptest! {
    /// With money-scale rates and whole quantities, per-line rounding is
    /// a no-op, so the subtotal equals the exact sum.
    #[test]
    fn subtotal_is_the_exact_sum_of_line_totals(
        lines in proptest::collection::vec((quantity_strategy(), rate_strategy()), 1..20)
    ) {
        let computed: Vec<ComputedLine> = lines
            .iter()
            .map(|(quantity, rate)| ComputedLine {
                total: calculator::line_total(*quantity, *rate).unwrap(),
                tax_amount: Decimal::ZERO,
            })
            .collect();

        let exact: Decimal = lines.iter().map(|(quantity, rate)| quantity * rate).sum();
        let totals = calculator::aggregate(
            &computed,
            Decimal::ZERO,
            DiscountMode::Flat,
            &[],
            Decimal::ZERO,
        )
        .unwrap();

        prop_assert_eq!(totals.subtotal, exact);
        prop_assert_eq!(totals.total, exact);
    }

    /// Aggregation is deterministic: identical inputs, identical outputs.
    #[test]
    fn aggregation_is_deterministic(
        lines in proptest::collection::vec((quantity_strategy(), rate_strategy()), 1..10),
        tax_cents in 0i64..100
    ) {
        let computed: Vec<ComputedLine> = lines
            .iter()
            .map(|(quantity, rate)| ComputedLine {
                total: calculator::line_total(*quantity, *rate).unwrap(),
                tax_amount: Decimal::ZERO,
            })
            .collect();
        let tax_rate = Decimal::new(tax_cents, 2);

        let first = calculator::aggregate(
            &computed, Decimal::ZERO, DiscountMode::Flat, &[], tax_rate,
        )
        .unwrap();
        let second = calculator::aggregate(
            &computed, Decimal::ZERO, DiscountMode::Flat, &[], tax_rate,
        )
        .unwrap();

        prop_assert_eq!(first, second);
    }

    /// For any two lines the per-line-first policy drifts at most one
    /// cent from exact-then-round, half a cent per rounded line.
    #[test]
    fn two_line_rounding_drift_is_bounded(
        q1 in 1i64..10_000, r1 in 1i64..1_000_000,
        q2 in 1i64..10_000, r2 in 1i64..1_000_000
    ) {
        // Third-decimal rates force real rounding on each line.
        let (quantity1, rate1) = (Decimal::new(q1, 1), Decimal::new(r1, 3));
        let (quantity2, rate2) = (Decimal::new(q2, 1), Decimal::new(r2, 3));

        let per_line = money::round_half_up(quantity1 * rate1)
            + money::round_half_up(quantity2 * rate2);
        let exact_once = money::round_half_up(quantity1 * rate1 + quantity2 * rate2);

        let drift = (per_line - exact_once).abs();
        prop_assert!(drift <= dec!(0.01), "drift {} exceeds a cent", drift);
    }
}

#[test]
fn canonical_fixture_uses_per_line_rounding() {
    // 3 × 33.33 = 99.99 and 7 × 14.29 = 100.03 are exact at two digits,
    // so both policies agree on 200.02; the fixtures pin the per-line
    // figure.
    let lines = [
        ComputedLine {
            total: calculator::line_total(dec!(3), dec!(33.33)).unwrap(),
            tax_amount: Decimal::ZERO,
        },
        ComputedLine {
            total: calculator::line_total(dec!(7), dec!(14.29)).unwrap(),
            tax_amount: Decimal::ZERO,
        },
    ];
    let totals =
        calculator::aggregate(&lines, Decimal::ZERO, DiscountMode::Flat, &[], dec!(0.08))
            .unwrap();
    assert_eq!(totals.subtotal, dec!(200.02));
    assert_eq!(totals.tax_total, dec!(16.00));
    assert_eq!(totals.total, dec!(216.02));
}
