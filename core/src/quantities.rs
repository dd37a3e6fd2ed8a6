//! Bounds for stock, prescribed and dispensed quantities.
//!
//! Quantities are persisted as `NUMERIC(14,3)`: at most three decimal places
//! and an absolute value below 10^11. Anything accepted here is stored
//! without rounding or overflow.

use crate::error::{DispensaryError, Result};
use rust_decimal::Decimal;

/// Decimal places a quantity may carry.
pub const MAX_SCALE: u32 = 3;

/// Exclusive upper bound on a quantity's absolute value (10^11).
pub const MAX_MAGNITUDE: i64 = 100_000_000_000;

fn check_bounds(field: &str, quantity: Decimal) -> Result<Decimal> {
    if quantity.normalize().scale() > MAX_SCALE {
        return Err(DispensaryError::validation(format!(
            "{field} must have at most {MAX_SCALE} decimal places, got {quantity}"
        )));
    }
    if quantity.abs() >= Decimal::from(MAX_MAGNITUDE) {
        return Err(DispensaryError::validation(format!(
            "{field} must be below {MAX_MAGNITUDE}, got {quantity}"
        )));
    }
    Ok(quantity)
}

/// Accept a quantity that is greater than zero and within bounds.
///
/// # Errors
///
/// Returns [`DispensaryError::Validation`] naming `field` otherwise.
pub fn positive(field: &str, quantity: Decimal) -> Result<Decimal> {
    if quantity <= Decimal::ZERO {
        return Err(DispensaryError::validation(format!(
            "{field} must be greater than zero"
        )));
    }
    check_bounds(field, quantity)
}

/// Accept a quantity that is zero or more and within bounds.
///
/// # Errors
///
/// Returns [`DispensaryError::Validation`] naming `field` otherwise.
pub fn non_negative(field: &str, quantity: Decimal) -> Result<Decimal> {
    if quantity < Decimal::ZERO {
        return Err(DispensaryError::validation(format!(
            "{field} must not be negative"
        )));
    }
    check_bounds(field, quantity)
}

/// `a + b` without panicking on overflow.
///
/// # Errors
///
/// Returns [`DispensaryError::Validation`] naming `field` when the sum does
/// not fit in a [`Decimal`].
pub fn add(field: &str, a: Decimal, b: Decimal) -> Result<Decimal> {
    a.checked_add(b)
        .ok_or_else(|| DispensaryError::validation(format!("{field} overflowed")))
}
