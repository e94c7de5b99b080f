//! # Lot Lifecycle Manager
//!
//! Applies the transitions planned by `tally_core::lot` and carries out
//! their side effects in the same transaction:
//!
//! ```text
//! plan (pure) ──► update lot row ──► recompute stock ──► ledger row
//!                                    (if counted set     (if the plan has
//!                                     changed)            a stock effect)
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::repository::{LedgerRepository, LotRepository};
use crate::service::error::{ServiceError, ServiceResult};
use crate::service::ledger::Ledger;
use crate::service::stock::StockAggregator;
use tally_core::auth::roles;
use tally_core::{
    LotTransition, NewStockTransaction, Principal, Stock, StockEffect, StockLot, StockTransaction,
};

// =============================================================================
// Connection-level component
// =============================================================================

pub struct LotManager<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> LotManager<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        LotManager { conn }
    }

    /// Persists `transition` on `lot` (updated in place) and performs its
    /// stock and ledger effects. Returns the recomputed stock when the
    /// aggregate was touched.
    pub async fn apply(
        &mut self,
        lot: &mut StockLot,
        transition: &LotTransition,
        actor: &str,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> ServiceResult<Option<Stock>> {
        let was_active = lot.is_active();
        let before = lot.state;
        lot.apply(transition, actor, reason, now);

        LotRepository::new(&mut *self.conn).update_lifecycle(lot).await?;
        debug!(
            lot_id = %lot.id,
            batch_id = %lot.batch_id,
            from = ?before,
            to = ?lot.state,
            effect = ?transition.effect,
            "Lot transition applied"
        );

        if transition.effect == StockEffect::None && was_active == lot.is_active() {
            return Ok(None);
        }

        let stock = StockAggregator::new(&mut *self.conn)
            .recompute(&lot.product_id, &lot.warehouse_id, now)
            .await?;

        if let Some(row) = NewStockTransaction::for_effect(
            transition.effect,
            &lot.id,
            &lot.product_id,
            &lot.warehouse_id,
            actor,
            reason.map(str::to_string),
        ) {
            Ledger::new(&mut *self.conn)
                .record(&row, Some(&stock.id), now)
                .await?;
        }

        Ok(Some(stock))
    }
}

// =============================================================================
// Pool-level service
// =============================================================================

#[derive(Debug, Clone)]
pub struct LotService {
    pool: SqlitePool,
}

impl LotService {
    pub fn new(pool: SqlitePool) -> Self {
        LotService { pool }
    }

    pub async fn get(&self, lot_id: &str) -> ServiceResult<StockLot> {
        let mut conn = self.pool.acquire().await?;
        LotRepository::new(&mut conn)
            .get(lot_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Lot", lot_id))
    }

    pub async fn by_batch(&self, batch_id: &str) -> ServiceResult<StockLot> {
        let mut conn = self.pool.acquire().await?;
        LotRepository::new(&mut conn)
            .by_batch(batch_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Lot", batch_id))
    }

    pub async fn for_order(&self, purchase_order_id: &str) -> ServiceResult<Vec<StockLot>> {
        let mut conn = self.pool.acquire().await?;
        Ok(LotRepository::new(&mut conn).for_order(purchase_order_id).await?)
    }

    pub async fn history(&self, lot_id: &str) -> ServiceResult<Vec<StockTransaction>> {
        let mut conn = self.pool.acquire().await?;
        Ok(LedgerRepository::new(&mut conn).for_lot(lot_id).await?)
    }

    /// Writes off an active lot (damage found after QC). The lot is closed,
    /// its remaining quantity leaves stock with one LOT_DEACTIVATE row, even
    /// when that quantity is zero.
    pub async fn deactivate(&self, principal: &Principal, lot_id: &str, reason: &str) -> ServiceResult<StockLot> {
        principal.require(roles::STOCK_CONTROL, "deactivate lot")?;
        tally_core::validation::validate_note("reason", reason)?;

        let mut tx = self.pool.begin().await?;
        let mut lot = LotRepository::new(&mut tx)
            .get(lot_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Lot", lot_id))?;

        let transition = lot.plan_deactivation()?;
        let written_off = lot.remaining_quantity;
        LotManager::new(&mut tx)
            .apply(&mut lot, &transition, &principal.user_id, Some(reason), chrono::Utc::now())
            .await?;
        tx.commit().await?;

        info!(lot_id, batch_id = %lot.batch_id, written_off, actor = %principal.user_id, "Lot deactivated");
        Ok(lot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fixture;
    use tally_core::sale::{NewSale, SaleLineInput};
    use tally_core::{LotState, PaymentMethod, QcStatus, StockStatus, TransactionKind};

    #[tokio::test]
    async fn test_deactivate_writes_off_remaining() {
        let fx = fixture().await;
        let (_, lots) = fx.receive("PO-3001", &[(&fx.product_a, 12, 75)]).await;
        fx.adjudicate(&lots[0], QcStatus::Passed, 12, 0).await;

        let lot = fx
            .db
            .lots()
            .deactivate(&fx.manager, &lots[0].id, "Water damage")
            .await
            .unwrap();
        assert_eq!(lot.state, LotState::Closed);
        assert_eq!(lot.remaining_quantity, 0);
        assert_eq!(lot.close_reason.as_deref(), Some("Water damage"));

        let history = fx.db.lots().history(&lots[0].id).await.unwrap();
        let off: Vec<_> = history
            .iter()
            .filter(|t| t.kind == TransactionKind::LotDeactivate)
            .collect();
        assert_eq!(off.len(), 1);
        assert_eq!(off[0].quantity, -12);

        let stock = fx.db.stock().get(&fx.product_a.id, &fx.warehouse.id).await.unwrap();
        assert_eq!((stock.total_quantity, stock.status), (0, StockStatus::SoldOut));
        fx.assert_conserved(&fx.product_a).await;
    }

    #[tokio::test]
    async fn test_deactivate_sold_out_lot_records_zero_row() {
        let fx = fixture().await;
        let (_, lots) = fx.receive("PO-3004", &[(&fx.product_a, 3, 75)]).await;
        fx.adjudicate(&lots[0], QcStatus::Passed, 3, 0).await;
        fx.db
            .sales()
            .record_sale(
                &fx.cashier,
                NewSale {
                    warehouse_id: fx.warehouse.id.clone(),
                    method: PaymentMethod::Cash,
                    lines: vec![SaleLineInput {
                        barcode: Some("A".to_string()),
                        product_id: None,
                        quantity: 3,
                        unit_price_cents: None,
                    }],
                },
            )
            .await
            .unwrap();

        let lot = fx
            .db
            .lots()
            .deactivate(&fx.manager, &lots[0].id, "Recalled")
            .await
            .unwrap();
        assert_eq!(lot.state, LotState::Closed);

        let history = fx.db.lots().history(&lots[0].id).await.unwrap();
        let off: Vec<_> = history
            .iter()
            .filter(|t| t.kind == TransactionKind::LotDeactivate)
            .collect();
        assert_eq!(off.len(), 1);
        assert_eq!(off[0].quantity, 0);
        assert_eq!(fx.stock_total(&fx.product_a).await, 0);
        fx.assert_conserved(&fx.product_a).await;
    }

    #[tokio::test]
    async fn test_deactivate_requires_active_lot() {
        let fx = fixture().await;
        let (_, lots) = fx.receive("PO-3002", &[(&fx.product_a, 12, 75)]).await;
        let service = fx.db.lots();

        let pending = service.deactivate(&fx.manager, &lots[0].id, "broken").await.unwrap_err();
        assert!(matches!(pending, ServiceError::Conflict(_)));

        fx.adjudicate(&lots[0], QcStatus::Passed, 12, 0).await;
        service.deactivate(&fx.manager, &lots[0].id, "broken").await.unwrap();
        let closed = service.deactivate(&fx.manager, &lots[0].id, "broken").await.unwrap_err();
        assert!(matches!(closed, ServiceError::Conflict(_)));

        let missing = service.deactivate(&fx.manager, "no-such-lot", "broken").await.unwrap_err();
        assert!(matches!(missing, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_inspector_cannot_deactivate() {
        let fx = fixture().await;
        let (_, lots) = fx.receive("PO-3003", &[(&fx.product_a, 12, 75)]).await;
        fx.adjudicate(&lots[0], QcStatus::Passed, 12, 0).await;

        let err = fx
            .db
            .lots()
            .deactivate(&fx.inspector, &lots[0].id, "broken")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
        assert_eq!(fx.stock_total(&fx.product_a).await, 12);
    }
}
