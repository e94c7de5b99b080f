//! # Identity
//!
//! The engine does not authenticate anyone. An external collaborator turns a
//! bearer credential into a [`Principal`]; the engine only checks the role
//! against the operation being attempted.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Manager,
    Inspector,
    Cashier,
}

/// Who is performing an operation. `user_id` is stamped into audit fields
/// and ledger rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Principal {
    pub user_id: String,
    pub role: Role,
}

/// Role sets per operation family.
pub mod roles {
    use super::Role;

    pub const PURCHASING: &[Role] = &[Role::Admin, Role::Manager];
    pub const QUALITY: &[Role] = &[Role::Admin, Role::Manager, Role::Inspector];
    pub const SALES: &[Role] = &[Role::Admin, Role::Manager, Role::Cashier];
    pub const STOCK_CONTROL: &[Role] = &[Role::Admin, Role::Manager];
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Role {role:?} is not allowed to {operation}")]
    Unauthorized { role: Role, operation: String },
}

impl Principal {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Principal {
            user_id: user_id.into(),
            role,
        }
    }

    /// Fails with `Unauthorized` unless the principal's role is in `allowed`.
    pub fn require(&self, allowed: &[Role], operation: &str) -> Result<(), AuthError> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(AuthError::Unauthorized {
                role: self.role,
                operation: operation.to_string(),
            })
        }
    }
}

/// Capability that resolves a bearer credential into a principal.
pub trait IdentityProvider: Send + Sync {
    fn principal(&self, token: &str) -> Result<Principal, AuthError>;
}
