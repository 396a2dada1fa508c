//! Fixed-point scaling helpers.
//!
//! The venue speaks in integer amounts scaled by each asset's `decimals`.
//! Strategies reason in display units. All conversions go through this module
//! and never round up, so a derived amount can not exceed the balance it came
//! from.

use crate::error::{CoreError, Result};
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

/// Largest supported asset precision.
pub const MAX_DECIMALS: u32 = 27;

/// `10^decimals` as a `Decimal`.
///
/// # Errors
/// Returns `CoreError::InvalidAmount` if `decimals` exceeds [`MAX_DECIMALS`].
pub fn pow10(decimals: u32) -> Result<Decimal> {
    if decimals > MAX_DECIMALS {
        return Err(CoreError::InvalidAmount(format!(
            "decimals {decimals} exceeds {MAX_DECIMALS}"
        )));
    }
    let mut value = Decimal::ONE;
    for _ in 0..decimals {
        value *= Decimal::TEN;
    }
    Ok(value)
}

/// Scaled integer amount to display units.
pub fn to_display(scaled: Decimal, decimals: u32) -> Result<Decimal> {
    Ok(scaled / pow10(decimals)?)
}

/// Display amount to a scaled integer, floored.
pub fn to_scaled_floor(display: Decimal, decimals: u32) -> Result<Decimal> {
    Ok((display * pow10(decimals)?).floor())
}

/// Floor a display amount to `places` fractional digits.
#[inline]
pub fn floor_to_places(value: Decimal, places: u32) -> Decimal {
    value.round_dp_with_strategy(places, RoundingStrategy::ToNegativeInfinity)
}

/// Scale a display price up by `decimals` and drop every digit beyond
/// `max_precision` significant fractional digits.
///
/// The result is an integer multiple of `10^(decimals - max_precision)`.
pub fn truncate_to_precision(display: Decimal, decimals: u32, max_precision: u32) -> Result<Decimal> {
    let scaled = display * pow10(decimals)?;
    let step = pow10(decimals.saturating_sub(max_precision))?;
    Ok((scaled / step).floor() * step)
}

/// Parse a venue amount string (integer or decimal text). Empty means zero.
pub fn parse_amount(raw: &str) -> Result<Decimal> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Decimal::ZERO);
    }
    Decimal::from_str(trimmed).map_err(|e| CoreError::InvalidAmount(format!("{raw:?}: {e}")))
}

/// Render a scaled integer amount for the wire (no fractional part).
pub fn format_scaled(value: Decimal) -> String {
    value.trunc().normalize().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_pow10() {
        assert_eq!(pow10(0).unwrap(), dec!(1));
        assert_eq!(pow10(9).unwrap(), dec!(1000000000));
        assert!(pow10(40).is_err());
    }

    #[test]
    fn test_display_and_back() {
        assert_eq!(to_display(dec!(1500000), 6).unwrap(), dec!(1.5));
        assert_eq!(to_scaled_floor(dec!(1.2345678), 6).unwrap(), dec!(1234567));
    }

    #[test]
    fn test_floor_to_places_never_rounds_up() {
        assert_eq!(floor_to_places(dec!(66.59999), 3), dec!(66.599));
        assert_eq!(floor_to_places(dec!(0.0009), 3), dec!(0.000));
    }

    #[test]
    fn test_truncate_to_precision() {
        // 1.5015 with 6 decimals and 3 digits of precision -> 1.501
        assert_eq!(
            truncate_to_precision(dec!(1.5015), 6, 3).unwrap(),
            dec!(1501000)
        );
        // precision wider than decimals leaves the integer as-is
        assert_eq!(
            truncate_to_precision(dec!(1.5015), 6, 9).unwrap(),
            dec!(1501500)
        );
    }

    #[test]
    fn test_parse_and_format() {
        assert_eq!(parse_amount("").unwrap(), Decimal::ZERO);
        assert_eq!(parse_amount(" 42 ").unwrap(), dec!(42));
        assert!(parse_amount("4x2").is_err());
        assert_eq!(format_scaled(dec!(1501000.000)), "1501000");
    }
}
