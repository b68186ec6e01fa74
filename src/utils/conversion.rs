//! Decimal conversion utilities.
//!
//! Every amount that flows through the tracker (burns, swap volume, pool
//! balances, holder amounts) is kept as a [`BigDecimal`] so that additive
//! accumulation over an unbounded event stream never loses precision.

use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_traits::Zero;
use std::str::FromStr;

// ============================================
// Parsing
// ============================================

/// Parse a decimal string (e.g. a `uiAmountString` from RPC) into a BigDecimal.
///
/// Returns None for empty or malformed input.
pub fn parse_decimal(value: &str) -> Option<BigDecimal> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    BigDecimal::from_str(trimmed).ok()
}

/// Convert a raw integer amount (base units) to its decimal-adjusted value.
///
/// Uses the decimals as the BigDecimal scale, so the conversion is exact.
///
/// # Example
/// ```ignore
/// let supply = ui_amount_from_raw("1000000000", 6); // Some(1000)
/// ```
pub fn ui_amount_from_raw(raw: &str, decimals: u8) -> Option<BigDecimal> {
    let int = BigInt::from_str(raw.trim()).ok()?;
    Some(BigDecimal::new(int, decimals as i64))
}

// ============================================
// Ratios
// ============================================

/// numerator / denominator, or zero when the denominator is zero.
pub fn ratio_or_zero(numerator: &BigDecimal, denominator: &BigDecimal) -> BigDecimal {
    if denominator.is_zero() {
        return BigDecimal::zero();
    }
    numerator / denominator
}

/// Share of `part` in `whole` expressed in percent (0-100).
pub fn percentage(part: &BigDecimal, whole: &BigDecimal) -> BigDecimal {
    ratio_or_zero(part, whole) * BigDecimal::from(100)
}
