//! # Service Errors
//!
//! The taxonomy every caller of a service sees.
//!
//! ```text
//! ┌──────────────────────────────┬─────────────────┐
//! │ source                        │ ServiceError    │
//! ├──────────────────────────────┼─────────────────┤
//! │ AuthError::Unauthenticated    │ Unauthenticated │
//! │ AuthError::Unauthorized       │ Unauthorized    │
//! │ CoreError::NotFound           │ NotFound        │
//! │ DbError::NotFound             │ NotFound        │
//! │ CoreError::InvalidState etc.  │ Conflict        │
//! │ DbError::UniqueViolation      │ Conflict        │
//! │ ValidationError               │ Validation      │
//! │ CoreError::NothingAdjudicated │ Validation      │
//! │ DbError::ForeignKeyViolation  │ Validation      │
//! │ anything else                 │ Internal        │
//! └──────────────────────────────┴─────────────────┘
//! ```

use thiserror::Error;
use tracing::error;

use crate::error::DbError;
use tally_core::{AuthError, CoreError, ValidationError};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Internal(String),
}

impl ServiceError {
    pub fn not_found(entity: &str, id: &str) -> Self {
        ServiceError::NotFound(format!("{} not found: {}", entity, id))
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ServiceError::Conflict(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation(message.into())
    }
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Unauthenticated(_) => ServiceError::Unauthenticated(err.to_string()),
            AuthError::Unauthorized { .. } => ServiceError::Unauthorized(err.to_string()),
        }
    }
}

impl From<CoreError> for ServiceError {
    fn from(err: CoreError) -> Self {
        let message = err.to_string();
        match err {
            CoreError::NotFound { .. } => ServiceError::NotFound(message),
            CoreError::InsufficientStock { .. }
            | CoreError::InvalidState { .. }
            | CoreError::RefundExceedsRemaining { .. }
            | CoreError::NothingToReturn(_)
            | CoreError::NothingToRefund(_) => ServiceError::Conflict(message),
            CoreError::NothingAdjudicated(_) => ServiceError::Validation(message),
            CoreError::Validation(inner) => ServiceError::Validation(inner.to_string()),
        }
    }
}

impl From<ValidationError> for ServiceError {
    fn from(err: ValidationError) -> Self {
        ServiceError::Validation(err.to_string())
    }
}

impl From<DbError> for ServiceError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { .. } => ServiceError::NotFound(err.to_string()),
            DbError::UniqueViolation { .. } => ServiceError::Conflict(err.to_string()),
            DbError::ForeignKeyViolation { .. } => ServiceError::Validation(err.to_string()),
            other => {
                error!(error = %other, "Persistence failure");
                ServiceError::Internal(other.to_string())
            }
        }
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        DbError::from(err).into()
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::Role;

    #[test]
    fn test_core_errors_map_to_taxonomy() {
        let conflict: ServiceError = CoreError::invalid_state("Lot", "L1", "Closed", "deactivate").into();
        assert!(matches!(conflict, ServiceError::Conflict(_)));

        let nothing: ServiceError = CoreError::NothingAdjudicated("PO-1".to_string()).into();
        assert!(matches!(nothing, ServiceError::Validation(ref m) if m.contains("nothing adjudicated yet")));

        let missing: ServiceError = CoreError::not_found("Lot", "L1").into();
        assert!(matches!(missing, ServiceError::NotFound(_)));
    }

    #[test]
    fn test_auth_and_db_errors() {
        let denied: ServiceError = AuthError::Unauthorized {
            role: Role::Cashier,
            operation: "confirm purchase order".to_string(),
        }
        .into();
        assert!(matches!(denied, ServiceError::Unauthorized(_)));

        let dup: ServiceError = DbError::duplicate("purchase_orders.po_number", "PO-1").into();
        assert!(matches!(dup, ServiceError::Conflict(_)));

        let internal: ServiceError = DbError::PoolExhausted.into();
        assert!(matches!(internal, ServiceError::Internal(_)));
    }
}
