//! # Stock Aggregate
//!
//! On-hand quantity per (product, warehouse), derived from lots. The
//! aggregate is never adjusted by deltas: it is recomputed from the lots that
//! are currently sellable.
//!
//! ```text
//! lots of (product, warehouse)            Stock
//! ───────────────────────────────         ───────────────────────
//! READY_FOR_SALE  remaining 40   ─┐
//! READY_FOR_SALE  remaining 25   ─┼──►    total 65
//! PENDING_QC      received  100   │       status READY_FOR_SALE
//! CLOSED          remaining 0     │       (threshold 10)
//! REJECTED        remaining 0    ─┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::lot::StockLot;

/// Quantity-driven availability of a product (or of a single lot).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockStatus {
    ReadyForSale,
    Low,
    SoldOut,
}

impl StockStatus {
    /// `0 → SOLD_OUT`, `0 < q <= threshold → LOW`, otherwise READY_FOR_SALE.
    pub fn derive(quantity: i64, threshold: i64) -> Self {
        if quantity <= 0 {
            StockStatus::SoldOut
        } else if quantity <= threshold {
            StockStatus::Low
        } else {
            StockStatus::ReadyForSale
        }
    }
}

/// Aggregate on-hand stock for one (product, warehouse).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Stock {
    pub id: String,
    pub product_id: String,
    pub warehouse_id: String,
    pub total_quantity: i64,
    pub status: StockStatus,
    #[ts(as = "Option<String>")]
    pub last_restocked: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// Sums the remaining quantity of the lots that count toward on-hand stock.
pub fn aggregate<'a, I>(lots: I) -> i64
where
    I: IntoIterator<Item = &'a StockLot>,
{
    lots.into_iter()
        .filter(|lot| lot.state.is_active())
        .map(|lot| lot.remaining_quantity)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lot::tests::lot_fixture;
    use crate::lot::LotState;

    #[test]
    fn test_derive_status() {
        assert_eq!(StockStatus::derive(0, 10), StockStatus::SoldOut);
        assert_eq!(StockStatus::derive(-3, 10), StockStatus::SoldOut);
        assert_eq!(StockStatus::derive(1, 10), StockStatus::Low);
        assert_eq!(StockStatus::derive(10, 10), StockStatus::Low);
        assert_eq!(StockStatus::derive(11, 10), StockStatus::ReadyForSale);
        assert_eq!(StockStatus::derive(5, 0), StockStatus::ReadyForSale);
    }

    #[test]
    fn test_aggregate_counts_only_sellable_lots() {
        let mut ready_a = lot_fixture(100);
        ready_a.state = LotState::ReadyForSale;
        ready_a.remaining_quantity = 40;

        let mut ready_b = lot_fixture(30);
        ready_b.state = LotState::ReadyForSale;
        ready_b.remaining_quantity = 25;

        let pending = lot_fixture(100);

        let mut closed = lot_fixture(20);
        closed.state = LotState::Closed;
        closed.remaining_quantity = 20;

        assert_eq!(aggregate(&[ready_a, ready_b, pending, closed]), 65);
    }
}
