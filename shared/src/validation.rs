//! Validation utilities for the farm stock ledger
//!
//! Pure checks on caller input. Nothing here touches storage.

use chrono::NaiveDate;
use rust_decimal::Decimal;

/// Minimum length of an operator-supplied batch number
pub const DEFAULT_BATCH_NUMBER_MIN_LEN: usize = 3;

/// Minimum length of an adjustment justification
pub const DEFAULT_REASON_MIN_LEN: usize = 10;

// ============================================================================
// Quantity and Cost Validations
// ============================================================================

/// Largest quantity a batch, line or item balance may hold (`NUMERIC(14, 3)`)
pub const MAX_QUANTITY: Decimal = Decimal::from_parts(276_447_231, 23_283, 0, false, 3);

/// Decimal places kept for quantities
pub const QUANTITY_SCALE: u32 = 3;

/// Largest unit cost (`NUMERIC(14, 4)`)
pub const MAX_UNIT_COST: Decimal = Decimal::from_parts(276_447_231, 23_283, 0, false, 4);

/// Decimal places kept for unit costs
pub const UNIT_COST_SCALE: u32 = 4;

/// Largest quantity times unit cost on one ledger row (`NUMERIC(18, 4)`)
pub const MAX_EXTENDED_COST: Decimal =
    Decimal::from_parts(2_808_348_671, 232_830_643, 0, false, 4);

/// Significant decimal places, ignoring trailing zeros
fn decimal_places(value: Decimal) -> u32 {
    value.normalize().scale()
}

/// Validate that a stock quantity is strictly positive and storable
pub fn validate_quantity(quantity: Decimal) -> Result<(), &'static str> {
    if quantity <= Decimal::ZERO {
        return Err("Quantity must be greater than 0");
    }
    if quantity > MAX_QUANTITY {
        return Err("Quantity exceeds the largest storable amount");
    }
    if decimal_places(quantity) > QUANTITY_SCALE {
        return Err("Quantity allows at most 3 decimal places");
    }
    Ok(())
}

/// Validate that a unit cost is strictly positive and storable
pub fn validate_unit_cost(cost: Decimal) -> Result<(), &'static str> {
    if cost <= Decimal::ZERO {
        return Err("Unit cost must be greater than 0");
    }
    if cost > MAX_UNIT_COST {
        return Err("Unit cost exceeds the largest storable amount");
    }
    if decimal_places(cost) > UNIT_COST_SCALE {
        return Err("Unit cost allows at most 4 decimal places");
    }
    Ok(())
}

/// Quantity times unit cost, when it fits on a ledger row
pub fn extended_cost(quantity: Decimal, unit_cost: Decimal) -> Result<Decimal, &'static str> {
    quantity
        .checked_mul(unit_cost)
        .filter(|cost| *cost <= MAX_EXTENDED_COST)
        .ok_or("Quantity times unit cost exceeds the largest storable amount")
}

/// Item balance after adding `quantity`, when it stays storable
pub fn checked_balance(current: Decimal, quantity: Decimal) -> Result<Decimal, &'static str> {
    current
        .checked_add(quantity)
        .filter(|balance| *balance <= MAX_QUANTITY)
        .ok_or("Stock on hand would exceed the largest storable amount")
}

/// Validate reorder threshold and minimum stock level
///
/// Both must be non-negative and the critical tier must not sit above the
/// low tier.
pub fn validate_stock_levels(
    reorder_threshold: Decimal,
    minimum_stock_level: Decimal,
) -> Result<(), &'static str> {
    if reorder_threshold < Decimal::ZERO {
        return Err("Reorder threshold cannot be negative");
    }
    if minimum_stock_level < Decimal::ZERO {
        return Err("Minimum stock level cannot be negative");
    }
    if reorder_threshold > MAX_QUANTITY {
        return Err("Reorder threshold exceeds the largest storable amount");
    }
    if decimal_places(reorder_threshold) > QUANTITY_SCALE
        || decimal_places(minimum_stock_level) > QUANTITY_SCALE
    {
        return Err("Stock levels allow at most 3 decimal places");
    }
    if minimum_stock_level > reorder_threshold {
        return Err("Minimum stock level cannot exceed the reorder threshold");
    }
    Ok(())
}

// ============================================================================
// Text Validations
// ============================================================================

/// Validate a batch/lot number
pub fn validate_batch_number(batch_number: &str, min_len: usize) -> Result<(), &'static str> {
    let trimmed = batch_number.trim();
    if trimmed.is_empty() {
        return Err("Batch number is required");
    }
    if trimmed.chars().count() < min_len {
        return Err("Batch number is too short");
    }
    if trimmed.chars().count() > 64 {
        return Err("Batch number must be at most 64 characters");
    }
    Ok(())
}

/// Validate the justification for a stock adjustment
pub fn validate_adjustment_reason(reason: &str, min_len: usize) -> Result<(), &'static str> {
    let trimmed = reason.trim();
    if trimmed.is_empty() {
        return Err("Reason is required");
    }
    if trimmed.chars().count() < min_len {
        return Err("Reason is too short");
    }
    Ok(())
}

/// Validate the module/purpose reference of a deduction
pub fn validate_module_reference(module: &str) -> Result<(), &'static str> {
    let trimmed = module.trim();
    if trimmed.is_empty() {
        return Err("Module or purpose is required");
    }
    if trimmed.chars().count() > 100 {
        return Err("Module or purpose must be at most 100 characters");
    }
    Ok(())
}

/// Module references are compared case-insensitively
pub fn normalize_module_reference(module: &str) -> String {
    module.trim().to_lowercase()
}

// ============================================================================
// Date Validations
// ============================================================================

/// Expiry, when present, cannot precede the purchase date
pub fn validate_expiry(
    purchase_date: NaiveDate,
    expiry: Option<NaiveDate>,
) -> Result<(), &'static str> {
    match expiry {
        Some(expiry) if expiry < purchase_date => {
            Err("Expiry date cannot be before the purchase date")
        }
        _ => Ok(()),
    }
}

/// Adjustments cannot be back-filled into the future
pub fn validate_not_future(date: NaiveDate, today: NaiveDate) -> Result<(), &'static str> {
    if date > today {
        return Err("Date cannot be in the future");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_quantity_must_be_positive() {
        assert!(validate_quantity(Decimal::ONE).is_ok());
        assert!(validate_quantity(Decimal::ZERO).is_err());
        assert!(validate_quantity(Decimal::NEGATIVE_ONE).is_err());
    }

    #[test]
    fn test_storage_limits() {
        assert_eq!(MAX_QUANTITY.to_string(), "99999999999.999");
        assert_eq!(MAX_UNIT_COST.to_string(), "9999999999.9999");
        assert_eq!(MAX_EXTENDED_COST.to_string(), "99999999999999.9999");
    }

    #[test]
    fn test_quantity_upper_bound() {
        assert!(validate_quantity(MAX_QUANTITY).is_ok());
        assert!(validate_quantity(MAX_QUANTITY + Decimal::new(1, 3)).is_err());
        let huge: Decimal = "70000000000000000000000000000".parse().unwrap();
        assert!(validate_quantity(huge).is_err());
        assert!(validate_unit_cost(huge).is_err());
    }

    #[test]
    fn test_decimal_places() {
        assert!(validate_quantity("1.250".parse().unwrap()).is_ok());
        assert!(validate_quantity("1.2500000".parse().unwrap()).is_ok());
        assert!(validate_quantity("0.0005".parse().unwrap()).is_err());
        assert!(validate_unit_cost("5.1234".parse().unwrap()).is_ok());
        assert!(validate_unit_cost("5.123456789".parse().unwrap()).is_err());
        assert!(validate_stock_levels("20".parse().unwrap(), "0.0001".parse().unwrap()).is_err());
    }

    #[test]
    fn test_extended_cost_and_balance() {
        assert_eq!(
            extended_cost(Decimal::from(10), Decimal::new(25, 1)),
            Ok(Decimal::from(25))
        );
        assert!(extended_cost(MAX_QUANTITY, MAX_UNIT_COST).is_err());
        assert_eq!(
            checked_balance(Decimal::from(5), Decimal::from(3)),
            Ok(Decimal::from(8))
        );
        assert!(checked_balance(MAX_QUANTITY, Decimal::new(1, 3)).is_err());
    }

    #[test]
    fn test_stock_levels() {
        assert!(validate_stock_levels(Decimal::from(20), Decimal::from(5)).is_ok());
        assert!(validate_stock_levels(Decimal::from(20), Decimal::from(20)).is_ok());
        assert!(validate_stock_levels(Decimal::from(5), Decimal::from(20)).is_err());
        assert!(validate_stock_levels(Decimal::from(-1), Decimal::ZERO).is_err());
    }

    #[test]
    fn test_batch_number_length() {
        assert!(validate_batch_number("B-1", 3).is_ok());
        assert!(validate_batch_number("  B1  ", 3).is_err());
        assert!(validate_batch_number("", 3).is_err());
    }

    #[test]
    fn test_adjustment_reason_length() {
        assert!(validate_adjustment_reason("Bags torn in transit", 10).is_ok());
        assert!(validate_adjustment_reason("spilled", 10).is_err());
        assert!(validate_adjustment_reason("          ", 10).is_err());
    }

    #[test]
    fn test_expiry_before_purchase() {
        let purchase = date(2025, 1, 10);
        assert!(validate_expiry(purchase, Some(date(2025, 1, 9))).is_err());
        assert!(validate_expiry(purchase, Some(date(2025, 1, 10))).is_ok());
        assert!(validate_expiry(purchase, None).is_ok());
    }

    #[test]
    fn test_module_reference_normalization() {
        assert_eq!(normalize_module_reference("  BioFloc "), "biofloc");
        assert!(validate_module_reference("   ").is_err());
    }

    proptest! {
        #[test]
        fn prop_positive_quantities_pass(n in 1i64..=1_000_000i64) {
            prop_assert!(validate_quantity(Decimal::new(n, 2)).is_ok());
        }

        #[test]
        fn prop_non_positive_quantities_fail(n in -1_000_000i64..=0i64) {
            prop_assert!(validate_quantity(Decimal::new(n, 2)).is_err());
        }
    }
}
