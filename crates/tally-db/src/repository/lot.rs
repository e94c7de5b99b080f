//! # Lot Repository
//!
//! Stock lots and the per-triple batch counters.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::DbResult;
use tally_core::batch::BatchKey;
use tally_core::StockLot;

const LOT_COLUMNS: &str = r#"
    id, batch_id, purchase_order_id, purchase_order_item_id, product_id,
    supplier_id, warehouse_id, quantity_received, remaining_quantity,
    failed_quantity, unit_cost_cents, expiry_date, state, qc_status,
    stocked_at, closed_by, closed_at, close_reason, created_at, updated_at
"#;

pub struct LotRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> LotRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        LotRepository { conn }
    }

    // -------------------------------------------------------------------------
    // Lots
    // -------------------------------------------------------------------------

    pub async fn get(&mut self, id: &str) -> DbResult<Option<StockLot>> {
        self.fetch_one_where("id = ?1", id).await
    }

    pub async fn by_batch(&mut self, batch_id: &str) -> DbResult<Option<StockLot>> {
        self.fetch_one_where("batch_id = ?1", batch_id).await
    }

    pub async fn by_item(&mut self, purchase_order_item_id: &str) -> DbResult<Option<StockLot>> {
        self.fetch_one_where("purchase_order_item_id = ?1", purchase_order_item_id)
            .await
    }

    async fn fetch_one_where(&mut self, predicate: &str, value: &str) -> DbResult<Option<StockLot>> {
        let sql = format!("SELECT {} FROM stock_lots WHERE {}", LOT_COLUMNS, predicate);
        let lot = sqlx::query_as::<_, StockLot>(&sql)
            .bind(value)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(lot)
    }

    pub async fn for_order(&mut self, purchase_order_id: &str) -> DbResult<Vec<StockLot>> {
        let sql = format!(
            "SELECT {} FROM stock_lots WHERE purchase_order_id = ?1 ORDER BY created_at, batch_id",
            LOT_COLUMNS
        );
        let lots = sqlx::query_as::<_, StockLot>(&sql)
            .bind(purchase_order_id)
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(lots)
    }

    /// READY_FOR_SALE lots of one product in one warehouse.
    pub async fn sellable(&mut self, product_id: &str, warehouse_id: &str) -> DbResult<Vec<StockLot>> {
        let sql = format!(
            r#"
            SELECT {} FROM stock_lots
            WHERE product_id = ?1 AND warehouse_id = ?2 AND state = 'READY_FOR_SALE'
            ORDER BY created_at, batch_id
            "#,
            LOT_COLUMNS
        );
        let lots = sqlx::query_as::<_, StockLot>(&sql)
            .bind(product_id)
            .bind(warehouse_id)
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(lots)
    }

    pub async fn insert(&mut self, lot: &StockLot) -> DbResult<()> {
        debug!(id = %lot.id, batch_id = %lot.batch_id, "Inserting lot");

        sqlx::query(
            r#"
            INSERT INTO stock_lots (
                id, batch_id, purchase_order_id, purchase_order_item_id, product_id,
                supplier_id, warehouse_id, quantity_received, remaining_quantity,
                failed_quantity, unit_cost_cents, expiry_date, state, qc_status,
                stocked_at, closed_by, closed_at, close_reason, created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20
            )
            "#,
        )
        .bind(&lot.id)
        .bind(&lot.batch_id)
        .bind(&lot.purchase_order_id)
        .bind(&lot.purchase_order_item_id)
        .bind(&lot.product_id)
        .bind(&lot.supplier_id)
        .bind(&lot.warehouse_id)
        .bind(lot.quantity_received)
        .bind(lot.remaining_quantity)
        .bind(lot.failed_quantity)
        .bind(lot.unit_cost_cents)
        .bind(lot.expiry_date)
        .bind(lot.state)
        .bind(lot.qc_status)
        .bind(lot.stocked_at)
        .bind(&lot.closed_by)
        .bind(lot.closed_at)
        .bind(&lot.close_reason)
        .bind(lot.created_at)
        .bind(lot.updated_at)
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    /// Writes the lifecycle columns of an already applied transition.
    pub async fn update_lifecycle(&mut self, lot: &StockLot) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE stock_lots
            SET state = ?2, qc_status = ?3, remaining_quantity = ?4, failed_quantity = ?5,
                stocked_at = ?6, closed_by = ?7, closed_at = ?8, close_reason = ?9,
                updated_at = ?10
            WHERE id = ?1
            "#,
        )
        .bind(&lot.id)
        .bind(lot.state)
        .bind(lot.qc_status)
        .bind(lot.remaining_quantity)
        .bind(lot.failed_quantity)
        .bind(lot.stocked_at)
        .bind(&lot.closed_by)
        .bind(lot.closed_at)
        .bind(&lot.close_reason)
        .bind(lot.updated_at)
        .execute(&mut *self.conn)
        .await?;
        Ok(())
    }

    /// Adds `delta` to a sellable lot's remaining quantity. Returns false
    /// when the lot is not READY_FOR_SALE or would go negative.
    pub async fn adjust_remaining(&mut self, id: &str, delta: i64, now: DateTime<Utc>) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE stock_lots
            SET remaining_quantity = remaining_quantity + ?2, updated_at = ?3
            WHERE id = ?1 AND state = 'READY_FOR_SALE' AND remaining_quantity + ?2 >= 0
            "#,
        )
        .bind(id)
        .bind(delta)
        .bind(now)
        .execute(&mut *self.conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    // -------------------------------------------------------------------------
    // Batch counters
    // -------------------------------------------------------------------------

    pub async fn has_batch_counter(&mut self, key: &BatchKey) -> DbResult<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM batch_sequences WHERE warehouse = ?1 AND supplier = ?2 AND product = ?3",
        )
        .bind(&key.warehouse)
        .bind(&key.supplier)
        .bind(&key.product)
        .fetch_one(&mut *self.conn)
        .await?;
        Ok(count > 0)
    }

    /// Batch ids of any date for `key`, from lots and order lines.
    pub async fn batch_ids_for(&mut self, key: &BatchKey) -> DbResult<Vec<String>> {
        let pattern = format!("%-{}-{}-{}-%", key.warehouse, key.supplier, key.product);
        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT batch_id FROM stock_lots WHERE batch_id LIKE ?1
            UNION
            SELECT batch_id FROM purchase_order_items
            WHERE batch_id IS NOT NULL AND batch_id LIKE ?1
            "#,
        )
        .bind(pattern)
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(ids)
    }

    /// Advances the triple's counter in one statement and returns the new
    /// value. `seed` is the starting point when the counter does not exist.
    pub async fn next_batch_sequence(&mut self, key: &BatchKey, seed: i64) -> DbResult<i64> {
        let next: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO batch_sequences (warehouse, supplier, product, last_seq)
            VALUES (?1, ?2, ?3, ?4 + 1)
            ON CONFLICT (warehouse, supplier, product)
            DO UPDATE SET last_seq = last_seq + 1
            RETURNING last_seq
            "#,
        )
        .bind(&key.warehouse)
        .bind(&key.supplier)
        .bind(&key.product)
        .bind(seed)
        .fetch_one(&mut *self.conn)
        .await?;
        Ok(next)
    }
}
