//! Input validation shared by every ledger operation
//!
//! These checks run before any row is locked or written.

use std::collections::HashSet;

use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{LedgerError, LedgerResult};

/// Longest accepted name for materials, products and recipes
pub const MAX_NAME_LEN: usize = 120;

/// Longest accepted free-text note on movements and orders
pub const MAX_NOTE_LEN: usize = 250;

/// Decimal places kept for stored quantities
pub const QUANTITY_SCALE: u32 = 3;

/// Round a quantity to the scale it is stored with
pub fn round_quantity(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(QUANTITY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Quantities, yields and multipliers must be strictly positive
pub fn validate_positive(field: &str, value: Decimal) -> LedgerResult<()> {
    if value <= Decimal::ZERO {
        return Err(LedgerError::validation(field, "must be greater than zero"));
    }
    Ok(())
}

/// Thresholds may be zero but never negative
pub fn validate_non_negative(field: &str, value: Decimal) -> LedgerResult<()> {
    if value < Decimal::ZERO {
        return Err(LedgerError::validation(field, "cannot be negative"));
    }
    Ok(())
}

/// Trim a name and check it is present and not too long
pub fn validate_name(field: &str, name: &str) -> LedgerResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(LedgerError::validation(field, "is required"));
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(LedgerError::validation(
            field,
            format!("must be at most {MAX_NAME_LEN} characters"),
        ));
    }
    Ok(trimmed.to_string())
}

/// Trim an optional note; absent notes become empty strings
pub fn validate_note(note: Option<&str>) -> LedgerResult<String> {
    let note = note.map(str::trim).unwrap_or_default();
    if note.chars().count() > MAX_NOTE_LEN {
        return Err(LedgerError::validation(
            "note",
            format!("must be at most {MAX_NOTE_LEN} characters"),
        ));
    }
    Ok(note.to_string())
}

/// Shelf life in whole days, zero allowed
pub fn validate_shelf_life(days: i32) -> LedgerResult<()> {
    if days < 0 {
        return Err(LedgerError::validation("shelf_life_days", "cannot be negative"));
    }
    Ok(())
}

/// Reject the first id that appears twice
pub fn ensure_distinct(
    field: &'static str,
    ids: impl IntoIterator<Item = i64>,
) -> LedgerResult<()> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(LedgerError::DuplicateLine { field, id });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_positive() {
        assert!(validate_positive("quantity", Decimal::new(1, 3)).is_ok());
        assert!(validate_positive("quantity", Decimal::ZERO).is_err());
        assert!(validate_positive("quantity", Decimal::from(-2)).is_err());
    }

    #[test]
    fn test_validate_non_negative() {
        assert!(validate_non_negative("reorder_threshold", Decimal::ZERO).is_ok());
        assert!(validate_non_negative("reorder_threshold", Decimal::from(-1)).is_err());
    }

    #[test]
    fn test_validate_name_trims() {
        assert_eq!(validate_name("name", "  Sugar ").unwrap(), "Sugar");
        assert!(validate_name("name", "   ").is_err());
        assert!(validate_name("name", &"x".repeat(MAX_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn test_validate_note() {
        assert_eq!(validate_note(None).unwrap(), "");
        assert_eq!(validate_note(Some(" damp sack ")).unwrap(), "damp sack");
        assert!(validate_note(Some(&"n".repeat(MAX_NOTE_LEN + 1))).is_err());
    }

    #[test]
    fn test_ensure_distinct() {
        assert!(ensure_distinct("material", [1, 2, 3]).is_ok());
        assert_eq!(
            ensure_distinct("material", [1, 2, 1]),
            Err(LedgerError::DuplicateLine {
                field: "material",
                id: 1
            })
        );
    }
}
