//! # Transaction Ledger
//!
//! Append-only record of every quantity movement. Rows are never updated
//! or deleted.
//!
//! ## Idempotency
//! A lot contributes at most one RESTOCK and at most one RETURN row. The
//! database backs this with a partial unique index; rows without a lot
//! (sales, refunds) are unconstrained.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::lot::StockEffect;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Restock,
    Return,
    Sale,
    Adjustment,
    LotDeactivate,
}

impl TransactionKind {
    /// Kinds limited to one row per lot.
    pub fn is_once_per_lot(&self) -> bool {
        matches!(self, TransactionKind::Restock | TransactionKind::Return)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Restock => "RESTOCK",
            TransactionKind::Return => "RETURN",
            TransactionKind::Sale => "SALE",
            TransactionKind::Adjustment => "ADJUSTMENT",
            TransactionKind::LotDeactivate => "LOT_DEACTIVATE",
        }
    }
}

/// A persisted ledger row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockTransaction {
    pub id: String,
    pub kind: TransactionKind,
    /// Signed quantity delta: positive into stock, negative out.
    pub quantity: i64,
    pub stock_id: Option<String>,
    pub lot_id: Option<String>,
    pub product_id: String,
    pub warehouse_id: String,
    pub actor_id: String,
    pub note: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// A ledger row about to be appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStockTransaction {
    pub kind: TransactionKind,
    pub quantity: i64,
    pub lot_id: Option<String>,
    pub product_id: String,
    pub warehouse_id: String,
    pub actor_id: String,
    pub note: Option<String>,
}

impl NewStockTransaction {
    /// Builds the ledger row for a lot transition effect, if it has one.
    pub fn for_effect(
        effect: StockEffect,
        lot_id: &str,
        product_id: &str,
        warehouse_id: &str,
        actor_id: &str,
        note: Option<String>,
    ) -> Option<Self> {
        let (kind, quantity) = match effect {
            StockEffect::None => return None,
            StockEffect::Restock(q) => (TransactionKind::Restock, q),
            StockEffect::Withdraw(q) => (TransactionKind::Return, -q),
            StockEffect::Deactivate(q) => (TransactionKind::LotDeactivate, -q),
        };
        Some(NewStockTransaction {
            kind,
            quantity,
            lot_id: Some(lot_id.to_string()),
            product_id: product_id.to_string(),
            warehouse_id: warehouse_id.to_string(),
            actor_id: actor_id.to_string(),
            note,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_once_per_lot_kinds() {
        assert!(TransactionKind::Restock.is_once_per_lot());
        assert!(TransactionKind::Return.is_once_per_lot());
        assert!(!TransactionKind::Sale.is_once_per_lot());
        assert!(!TransactionKind::LotDeactivate.is_once_per_lot());
    }

    #[test]
    fn test_effect_signs() {
        let row = |e| NewStockTransaction::for_effect(e, "lot", "p", "w", "u", None);
        assert_eq!(row(StockEffect::None), None);

        let restock = row(StockEffect::Restock(60)).unwrap();
        assert_eq!((restock.kind, restock.quantity), (TransactionKind::Restock, 60));

        let withdraw = row(StockEffect::Withdraw(25)).unwrap();
        assert_eq!((withdraw.kind, withdraw.quantity), (TransactionKind::Return, -25));

        let off = row(StockEffect::Deactivate(5)).unwrap();
        assert_eq!((off.kind, off.quantity), (TransactionKind::LotDeactivate, -5));
        assert_eq!(off.lot_id.as_deref(), Some("lot"));

        // a sold-out write-off still leaves its row
        let empty = row(StockEffect::Deactivate(0)).unwrap();
        assert_eq!((empty.kind, empty.quantity), (TransactionKind::LotDeactivate, 0));
    }

    #[test]
    fn test_kind_text_matches_serde() {
        let json = serde_json::to_string(&TransactionKind::LotDeactivate).unwrap();
        assert_eq!(json, format!("\"{}\"", TransactionKind::LotDeactivate.as_str()));
    }
}
