//! Money helpers shared by the calculators.
//!
//! Every currency amount the engine emits passes through [`round_half_up`].
//! Amounts are `Decimal` throughout, so rounding always operates on the exact
//! decimal value rather than on a binary float.

use rust_decimal::{Decimal, RoundingStrategy};

/// Tolerance used when comparing two totals that were each rounded to cents.
pub const CENT: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Rounds a decimal value to exactly two decimal places using half-up rounding.
///
/// Values at exactly 0.005 are rounded up to 0.01 (away from zero).
///
/// # Examples
///
/// ```
/// use rust_decimal_macros::dec;
/// use payroll_core::calculations::common::round_half_up;
///
/// assert_eq!(round_half_up(dec!(123.454)), dec!(123.45));
/// assert_eq!(round_half_up(dec!(123.455)), dec!(123.46));
/// assert_eq!(round_half_up(dec!(-123.455)), dec!(-123.46)); // Away from zero
/// ```
pub fn round_half_up(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Returns the maximum of two decimal values.
///
/// ```
/// use rust_decimal_macros::dec;
/// use payroll_core::calculations::common::max;
///
/// assert_eq!(max(dec!(100.00), dec!(200.00)), dec!(200.00));
/// assert_eq!(max(dec!(-100.00), dec!(-200.00)), dec!(-100.00));
/// ```
pub fn max(
    a: Decimal,
    b: Decimal,
) -> Decimal {
    if a > b { a } else { b }
}

/// Headroom left under `cap` after `used`, never negative.
///
/// ```
/// use rust_decimal_macros::dec;
/// use payroll_core::calculations::common::remaining;
///
/// assert_eq!(remaining(dec!(176100), dec!(170000)), dec!(6100));
/// assert_eq!(remaining(dec!(176100), dec!(180000)), dec!(0));
/// ```
pub fn remaining(
    cap: Decimal,
    used: Decimal,
) -> Decimal {
    max(cap - used, Decimal::ZERO)
}
