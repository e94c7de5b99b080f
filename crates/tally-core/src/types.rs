//! # Catalog Types
//!
//! The catalog entities the reconciliation engine reads but never manages.
//! Product, supplier and warehouse CRUD belong to other parts of the
//! platform; here they only supply codes, prices and thresholds.
//!
//! ## Dual-Key Identity Pattern
//! Every entity has:
//! - `id`: UUID v4 - immutable, used for database relations
//! - Business code: (product code, supplier code, warehouse code) - feeds
//!   batch identifiers and receipts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::money::Money;

/// Generates a new entity id.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Product
// =============================================================================

/// A product that can be purchased, received and sold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    pub id: String,

    /// External product code; its tail feeds the batch identifier.
    pub code: String,

    /// Barcode scanned at the till.
    pub barcode: String,

    pub name: String,

    /// Shelf price in cents.
    pub price_cents: i64,

    /// Standard cost in cents, used when a sale is not backed by a lot cost.
    pub cost_cents: i64,

    /// Stock at or below this quantity is reported as LOW.
    pub low_stock_threshold: i64,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Product {
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }
}

// =============================================================================
// Supplier / Warehouse
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Supplier {
    pub id: String,
    /// Short code, e.g. "ACME". Upper-cased into batch identifiers.
    pub code: String,
    pub name: String,
}

/// A stock location. Purchase orders are delivered to one warehouse and
/// sales are rung up against one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Warehouse {
    pub id: String,
    pub code: String,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_id_is_uuid() {
        let id = new_id();
        assert!(Uuid::parse_str(&id).is_ok());
        assert_ne!(id, new_id());
    }
}
