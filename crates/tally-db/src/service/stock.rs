//! # Stock Aggregator
//!
//! The single writer of `stocks.total_quantity`. Callers never pass a
//! delta: the aggregate is recomputed from the READY_FOR_SALE lots.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::repository::{CatalogRepository, LedgerRepository, LotRepository, StockRepository};
use crate::service::error::{ServiceError, ServiceResult};
use tally_core::auth::roles;
use tally_core::stock::aggregate;
use tally_core::{Principal, Stock, StockStatus, StockTransaction};

// =============================================================================
// Connection-level component
// =============================================================================

pub struct StockAggregator<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> StockAggregator<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        StockAggregator { conn }
    }

    /// Recomputes and stores the aggregate for (product, warehouse).
    pub async fn recompute(
        &mut self,
        product_id: &str,
        warehouse_id: &str,
        now: DateTime<Utc>,
    ) -> ServiceResult<Stock> {
        let product = CatalogRepository::new(&mut *self.conn)
            .product(product_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Product", product_id))?;

        let lots = LotRepository::new(&mut *self.conn)
            .sellable(product_id, warehouse_id)
            .await?;
        let total = aggregate(&lots);
        let status = StockStatus::derive(total, product.low_stock_threshold);

        let stock = StockRepository::new(&mut *self.conn)
            .upsert(product_id, warehouse_id, total, status, now)
            .await?;

        debug!(
            product_id,
            warehouse_id,
            lots = lots.len(),
            total,
            status = ?status,
            "Stock recomputed"
        );
        Ok(stock)
    }
}

// =============================================================================
// Pool-level service
// =============================================================================

#[derive(Debug, Clone)]
pub struct StockService {
    pool: SqlitePool,
}

impl StockService {
    pub fn new(pool: SqlitePool) -> Self {
        StockService { pool }
    }

    /// Current aggregate. A product never stocked in the warehouse reads as
    /// zero, SOLD_OUT.
    pub async fn get(&self, product_id: &str, warehouse_id: &str) -> ServiceResult<Stock> {
        let mut conn = self.pool.acquire().await?;

        if let Some(stock) = StockRepository::new(&mut conn).get(product_id, warehouse_id).await? {
            return Ok(stock);
        }
        CatalogRepository::new(&mut conn)
            .product(product_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Product", product_id))?;

        let now = Utc::now();
        Ok(Stock {
            id: String::new(),
            product_id: product_id.to_string(),
            warehouse_id: warehouse_id.to_string(),
            total_quantity: 0,
            status: StockStatus::SoldOut,
            last_restocked: None,
            updated_at: now,
        })
    }

    /// Forces a recompute, e.g. after a manual data repair.
    pub async fn recompute(&self, principal: &Principal, product_id: &str, warehouse_id: &str) -> ServiceResult<Stock> {
        principal.require(roles::STOCK_CONTROL, "recompute stock")?;

        let mut tx = self.pool.begin().await?;
        let stock = StockAggregator::new(&mut tx)
            .recompute(product_id, warehouse_id, Utc::now())
            .await?;
        tx.commit().await?;

        info!(product_id, warehouse_id, total = stock.total_quantity, "Stock recomputed on request");
        Ok(stock)
    }

    /// Ledger rows for (product, warehouse), oldest first.
    pub async fn ledger(&self, product_id: &str, warehouse_id: &str) -> ServiceResult<Vec<StockTransaction>> {
        let mut conn = self.pool.acquire().await?;
        let rows = LedgerRepository::new(&mut conn)
            .for_product(product_id, warehouse_id)
            .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fixture;
    use tally_core::QcStatus;

    #[tokio::test]
    async fn test_unstocked_product_reads_sold_out() {
        let fx = fixture().await;
        let stock = fx.db.stock().get(&fx.product_b.id, &fx.warehouse.id).await.unwrap();
        assert_eq!(stock.total_quantity, 0);
        assert_eq!(stock.status, StockStatus::SoldOut);
        assert!(stock.last_restocked.is_none());

        let err = fx.db.stock().get("no-such-product", &fx.warehouse.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_status_follows_threshold() {
        let fx = fixture().await;
        let (_, lots) = fx
            .receive("PO-4001", &[(&fx.product_a, 4, 75), (&fx.product_a, 10, 75)])
            .await;

        fx.adjudicate(&lots[0], QcStatus::Passed, 4, 0).await;
        let low = fx.db.stock().get(&fx.product_a.id, &fx.warehouse.id).await.unwrap();
        assert_eq!((low.total_quantity, low.status), (4, StockStatus::Low));
        assert!(low.last_restocked.is_some());

        fx.adjudicate(&lots[1], QcStatus::Passed, 10, 0).await;
        let ready = fx.db.stock().get(&fx.product_a.id, &fx.warehouse.id).await.unwrap();
        assert_eq!((ready.total_quantity, ready.status), (14, StockStatus::ReadyForSale));

        let ledger = fx.db.stock().ledger(&fx.product_a.id, &fx.warehouse.id).await.unwrap();
        assert_eq!(ledger.len(), 2);
    }

    #[tokio::test]
    async fn test_recompute_requires_stock_control() {
        let fx = fixture().await;
        let service = fx.db.stock();

        let err = service
            .recompute(&fx.cashier, &fx.product_a.id, &fx.warehouse.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));

        let stock = service
            .recompute(&fx.manager, &fx.product_a.id, &fx.warehouse.id)
            .await
            .unwrap();
        assert_eq!(stock.total_quantity, 0);
    }
}
