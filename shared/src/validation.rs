//! Validation utilities for the Retail POS & Inventory Platform

use rust_decimal::Decimal;

// ============================================================================
// Quantity & money validations
// ============================================================================

/// Validate that a movement/line quantity is strictly positive.
pub fn validate_quantity(quantity: i32) -> Result<(), &'static str> {
    if quantity <= 0 {
        return Err("Quantity must be positive");
    }
    Ok(())
}

/// Validate a tax rate is a sane fraction (0..=1).
pub fn validate_tax_rate(rate: Decimal) -> Result<(), &'static str> {
    if rate < Decimal::ZERO || rate > Decimal::ONE {
        return Err("Tax rate must be between 0 and 1");
    }
    Ok(())
}

// ============================================================================
// Code & reference validations
// ============================================================================

/// Validate a transaction code prefix (2-5 uppercase alphanumeric).
pub fn validate_code_prefix(prefix: &str) -> Result<(), &'static str> {
    if prefix.len() < 2 || prefix.len() > 5 {
        return Err("Code prefix must be 2-5 characters");
    }
    if !prefix
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    {
        return Err("Code prefix must be uppercase alphanumeric only");
    }
    Ok(())
}

/// Validate a free-text note/motive is present and not absurdly long.
pub fn validate_note(note: &str, max_len: usize) -> Result<(), &'static str> {
    if note.trim().is_empty() {
        return Err("Text cannot be empty");
    }
    if note.len() > max_len {
        return Err("Text too long");
    }
    Ok(())
}

/// Reject duplicate product references within one request's lines.
pub fn validate_unique_products(product_ids: &[uuid::Uuid]) -> Result<(), &'static str> {
    let mut seen = std::collections::HashSet::new();
    for id in product_ids {
        if !seen.insert(id) {
            return Err("Duplicate product in request lines");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use uuid::Uuid;

    #[test]
    fn quantity_must_be_positive() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-3).is_err());
    }

    #[test]
    fn tax_rate_bounds() {
        assert!(validate_tax_rate(Decimal::from_str("0.07").unwrap()).is_ok());
        assert!(validate_tax_rate(Decimal::ZERO).is_ok());
        assert!(validate_tax_rate(Decimal::ONE).is_ok());
        assert!(validate_tax_rate(Decimal::from_str("1.01").unwrap()).is_err());
        assert!(validate_tax_rate(Decimal::from_str("-0.01").unwrap()).is_err());
    }

    #[test]
    fn code_prefix_format() {
        assert!(validate_code_prefix("POS").is_ok());
        assert!(validate_code_prefix("RO").is_ok());
        assert!(validate_code_prefix("p").is_err());
        assert!(validate_code_prefix("pos").is_err());
        assert!(validate_code_prefix("TOOLONG").is_err());
    }

    #[test]
    fn duplicate_products_rejected() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert!(validate_unique_products(&[a, b]).is_ok());
        assert!(validate_unique_products(&[a, b, a]).is_err());
    }

    #[test]
    fn notes_must_have_content() {
        assert!(validate_note("damaged box", 500).is_ok());
        assert!(validate_note("   ", 500).is_err());
        assert!(validate_note(&"x".repeat(501), 500).is_err());
    }
}
