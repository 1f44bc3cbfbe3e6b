//! Guarded arithmetic shared by the normalizer and the metrics deriver.
//!
//! Every helper returns `None` instead of dividing by zero or inventing a
//! value, and rounds half away from zero.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// `numerator / denominator * 100`, rounded to `dp` places.
/// `None` when either side is missing or the denominator is not positive.
pub fn percentage(numerator: Option<i64>, denominator: Option<i64>, dp: u32) -> Option<Decimal> {
    let scaled = Decimal::from(numerator?).checked_mul(Decimal::ONE_HUNDRED)?;
    divide(scaled, denominator?).map(|r| round_dp(r, dp))
}

/// `numerator / denominator`, rounded to `dp` places.
pub fn ratio(numerator: Option<i64>, denominator: Option<i64>, dp: u32) -> Option<Decimal> {
    divide(Decimal::from(numerator?), denominator?).map(|r| round_dp(r, dp))
}

fn divide(numerator: Decimal, denominator: i64) -> Option<Decimal> {
    if denominator <= 0 {
        return None;
    }
    numerator.checked_div(Decimal::from(denominator))
}

/// `round(total * pct / 100)` to the nearest integer.
pub fn share_of(total: Option<i64>, pct: Option<Decimal>) -> Option<i64> {
    let share = Decimal::from(total?).checked_mul(pct?)? / Decimal::ONE_HUNDRED;
    round_dp(share, 0).to_i64()
}

/// Sum of two optional counts; `None` if either is missing.
pub fn add(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    a?.checked_add(b?)
}

/// Round half away from zero, then fix the scale at `dp` so serialized
/// values always carry exactly `dp` places.
pub fn round_dp(value: Decimal, dp: u32) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(dp);
    rounded
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(mantissa: i64, scale: u32) -> Decimal {
        Decimal::new(mantissa, scale)
    }

    #[test]
    fn percentage_rounds_half_away_from_zero() {
        // 1/8 = 12.5% exactly; 1/3 = 33.333..%
        assert_eq!(percentage(Some(1), Some(8), 0), Some(dec(13, 0)));
        assert_eq!(percentage(Some(1), Some(3), 2), Some(dec(3333, 2)));
        assert_eq!(percentage(Some(2), Some(3), 2), Some(dec(6667, 2)));
        // 1/400 = 0.25% → 0.3 at 1 dp
        assert_eq!(percentage(Some(1), Some(400), 1), Some(dec(3, 1)));
    }

    #[test]
    fn percentage_is_null_on_missing_or_zero_denominator() {
        assert_eq!(percentage(Some(5), Some(0), 2), None);
        assert_eq!(percentage(None, Some(10), 2), None);
        assert_eq!(percentage(Some(5), None, 2), None);
    }

    #[test]
    fn share_of_rounds_to_nearest_integer() {
        assert_eq!(share_of(Some(1000), Some(dec(3050, 2))), Some(305));
        assert_eq!(share_of(Some(10), Some(dec(2500, 2))), Some(3)); // 2.5 → 3
        assert_eq!(share_of(Some(10), Some(dec(2499, 2))), Some(2));
        assert_eq!(share_of(None, Some(dec(10, 0))), None);
        assert_eq!(share_of(Some(10), None), None);
    }

    #[test]
    fn rounded_values_keep_fixed_places() {
        assert_eq!(percentage(Some(300), Some(1000), 2).unwrap().to_string(), "30.00");
        assert_eq!(percentage(Some(3), Some(5), 1).unwrap().to_string(), "60.0");
        assert_eq!(ratio(Some(9), Some(3), 2).unwrap().to_string(), "3.00");
    }

    #[test]
    fn add_propagates_null() {
        assert_eq!(add(Some(1), Some(2)), Some(3));
        assert_eq!(add(Some(1), None), None);
    }
}
