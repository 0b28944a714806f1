//! Money discipline: all monetary values carry exactly two fractional
//! digits, and every arithmetic step that can change scale is followed by
//! a half-up rounding to two digits.

use rust_decimal::{Decimal, RoundingStrategy};

/// Fractional digits carried by every monetary value.
pub const MONEY_SCALE: u32 = 2;

/// Round a Decimal to two decimal places using half-up (commercial
/// rounding): 0.125 rounds to 0.13.
pub fn round_half_up(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Currency-unit epsilon absorbing residual rounding drift when deciding
/// whether a balance is settled.
pub fn epsilon() -> Decimal {
    Decimal::new(5, 3)
}

/// Whether a balance due is close enough to zero to count as paid.
pub fn is_settled(balance_due: Decimal) -> bool {
    balance_due <= epsilon()
}

/// Whether a value carries more fractional digits than money permits.
pub fn exceeds_money_scale(value: Decimal) -> bool {
    value.normalize().scale() > MONEY_SCALE
}
