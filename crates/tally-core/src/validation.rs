//! # Validation Module
//!
//! Input checks run before any mutation. A request that fails here leaves
//! no trace in the database.
//!
//! ```text
//! HTTP DTO ──► serde (types) ──► THIS MODULE (rules) ──► service (state)
//!                                                        └─► SQLite constraints
//! ```

use crate::error::ValidationError;
use crate::{MAX_DOCUMENT_LINES, MAX_NOTE_LEN};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a document number (purchase order number, receipt number).
///
/// ```rust
/// use tally_core::validation::validate_document_number;
///
/// assert!(validate_document_number("po number", "PO-2026-0001").is_ok());
/// assert!(validate_document_number("po number", "  ").is_err());
/// assert!(validate_document_number("po number", "PO 1").is_err());
/// ```
pub fn validate_document_number(field: &str, number: &str) -> ValidationResult<()> {
    let number = number.trim();
    if number.is_empty() {
        return Err(ValidationError::required(field));
    }
    if number.len() > 64 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 64,
        });
    }
    if !number
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '/')
    {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must contain only letters, numbers, '-', '_' and '/'".to_string(),
        });
    }
    Ok(())
}

/// Validates a referenced id: non-empty after trimming.
pub fn validate_reference(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::required(field));
    }
    Ok(())
}

/// Validates free text (reasons, notes). Empty is allowed.
pub fn validate_note(field: &str, text: &str) -> ValidationResult<()> {
    if text.len() > MAX_NOTE_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_NOTE_LEN,
        });
    }
    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Ordered, sold or refunded quantity: strictly positive.
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::must_be_positive("quantity"));
    }
    Ok(())
}

/// Unit cost in cents. Zero is allowed (free samples).
pub fn validate_unit_cost(cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: "unit cost".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }
    Ok(())
}

// =============================================================================
// Collection Validators
// =============================================================================

/// A document must have at least one line and at most
/// [`MAX_DOCUMENT_LINES`].
pub fn validate_line_count(field: &str, count: usize) -> ValidationResult<()> {
    if count == 0 {
        return Err(ValidationError::required(field));
    }
    if count > MAX_DOCUMENT_LINES {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 1,
            max: MAX_DOCUMENT_LINES as i64,
        });
    }
    Ok(())
}

/// Rejects duplicated values (batch ids within one order, barcodes within
/// one refund request).
pub fn validate_distinct<'a, I>(field: &str, values: I) -> ValidationResult<()>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = std::collections::HashSet::new();
    for value in values {
        if !seen.insert(value) {
            return Err(ValidationError::inconsistent(
                field,
                format!("'{}' appears more than once", value),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-4).is_err());
    }

    #[test]
    fn test_validate_unit_cost() {
        assert!(validate_unit_cost(0).is_ok());
        assert!(validate_unit_cost(1099).is_ok());
        assert!(validate_unit_cost(-1).is_err());
    }

    #[test]
    fn test_validate_line_count() {
        assert!(validate_line_count("items", 1).is_ok());
        assert!(validate_line_count("items", 0).is_err());
        assert!(validate_line_count("items", MAX_DOCUMENT_LINES + 1).is_err());
    }

    #[test]
    fn test_validate_distinct() {
        assert!(validate_distinct("batch_id", ["A", "B"]).is_ok());
        let err = validate_distinct("batch_id", ["A", "B", "A"]).unwrap_err();
        assert_eq!(err.to_string(), "batch_id is inconsistent: 'A' appears more than once");
    }

    #[test]
    fn test_validate_note() {
        assert!(validate_note("reason", "").is_ok());
        assert!(validate_note("reason", &"x".repeat(MAX_NOTE_LEN + 1)).is_err());
    }
}
