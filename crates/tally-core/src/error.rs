//! # Error Types
//!
//! Domain-specific error types for tally-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tally-core errors (this file)                                         │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  tally-db errors (separate crate)                                      │
//! │  ├── DbError          - Database operation failures                    │
//! │  └── ServiceError     - Six-way taxonomy seen by callers               │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → ServiceError → ApiError           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations raised by the pure reconciliation rules.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A referenced entity does not exist (or is not part of the document
    /// being operated on, e.g. a barcode absent from the original receipt).
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Not enough sellable quantity to complete a sale.
    #[error("Insufficient stock for {product}: available {available}, requested {requested}")]
    InsufficientStock {
        product: String,
        available: i64,
        requested: i64,
    },

    /// The entity's current state forbids the operation.
    ///
    /// ## When This Occurs
    /// - Confirming a purchase order that is already RECEIVED
    /// - Cancelling a purchase order after receipt
    /// - Deactivating a lot that is not active
    #[error("{entity} {id} is {state}, cannot {operation}")]
    InvalidState {
        entity: String,
        id: String,
        state: String,
        operation: String,
    },

    /// A refund asks for more than what is still refundable on a line.
    #[error("Cannot refund {requested} of {item}: only {remaining} remaining")]
    RefundExceedsRemaining {
        item: String,
        requested: i64,
        remaining: i64,
    },

    /// A purchase return found no FAILED/PARTIAL line left to return.
    #[error("Purchase order {0} has nothing left to return")]
    NothingToReturn(String),

    /// A refund found no receipt quantity left to refund.
    #[error("Receipt {0} has nothing left to refund")]
    NothingToRefund(String),

    /// A QC summary was requested while every line is still PENDING.
    #[error("Purchase order {0}: nothing adjudicated yet")]
    NothingAdjudicated(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates a NotFound error.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates an InvalidState error.
    pub fn invalid_state(
        entity: impl Into<String>,
        id: impl Into<String>,
        state: impl std::fmt::Debug,
        operation: impl Into<String>,
    ) -> Self {
        CoreError::InvalidState {
            entity: entity.into(),
            id: id.into(),
            state: format!("{:?}", state),
            operation: operation.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any mutation; a request failing validation leaves no trace.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid UUID, malformed batch id).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Values that must agree with each other do not.
    #[error("{field} is inconsistent: {reason}")]
    Inconsistent { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

impl ValidationError {
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required {
            field: field.into(),
        }
    }

    pub fn must_be_positive(field: impl Into<String>) -> Self {
        ValidationError::MustBePositive {
            field: field.into(),
        }
    }

    pub fn inconsistent(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::Inconsistent {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
