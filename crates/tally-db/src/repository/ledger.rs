//! # Ledger Repository
//!
//! Append and read. There is no update or delete.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::DbResult;
use tally_core::{new_id, NewStockTransaction, StockTransaction, TransactionKind};

const TX_COLUMNS: &str = r#"
    id, kind, quantity, stock_id, lot_id, product_id, warehouse_id,
    actor_id, note, created_at
"#;

pub struct LedgerRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> LedgerRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        LedgerRepository { conn }
    }

    pub async fn exists_for_lot(&mut self, lot_id: &str, kind: TransactionKind) -> DbResult<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stock_transactions WHERE lot_id = ?1 AND kind = ?2")
            .bind(lot_id)
            .bind(kind)
            .fetch_one(&mut *self.conn)
            .await?;
        Ok(count > 0)
    }

    /// Appends a row. `INSERT OR IGNORE` lets the once-per-lot index reject a
    /// duplicate RESTOCK/RETURN silently; returns whether a row was written.
    pub async fn append(
        &mut self,
        row: &NewStockTransaction,
        stock_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> DbResult<Option<String>> {
        let id = new_id();
        debug!(id = %id, kind = row.kind.as_str(), quantity = row.quantity, lot_id = ?row.lot_id, "Appending ledger row");

        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO stock_transactions (
                id, kind, quantity, stock_id, lot_id, product_id, warehouse_id,
                actor_id, note, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&id)
        .bind(row.kind)
        .bind(row.quantity)
        .bind(stock_id)
        .bind(&row.lot_id)
        .bind(&row.product_id)
        .bind(&row.warehouse_id)
        .bind(&row.actor_id)
        .bind(&row.note)
        .bind(now)
        .execute(&mut *self.conn)
        .await?;

        Ok((result.rows_affected() == 1).then_some(id))
    }

    pub async fn for_lot(&mut self, lot_id: &str) -> DbResult<Vec<StockTransaction>> {
        let sql = format!(
            "SELECT {} FROM stock_transactions WHERE lot_id = ?1 ORDER BY created_at, rowid",
            TX_COLUMNS
        );
        let rows = sqlx::query_as::<_, StockTransaction>(&sql)
            .bind(lot_id)
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(rows)
    }

    pub async fn for_product(&mut self, product_id: &str, warehouse_id: &str) -> DbResult<Vec<StockTransaction>> {
        let sql = format!(
            r#"
            SELECT {} FROM stock_transactions
            WHERE product_id = ?1 AND warehouse_id = ?2
            ORDER BY created_at, rowid
            "#,
            TX_COLUMNS
        );
        let rows = sqlx::query_as::<_, StockTransaction>(&sql)
            .bind(product_id)
            .bind(warehouse_id)
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(rows)
    }

    /// Net quantity the ledger says is on hand for (product, warehouse).
    pub async fn net_quantity(&mut self, product_id: &str, warehouse_id: &str) -> DbResult<i64> {
        let net: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(quantity), 0) FROM stock_transactions WHERE product_id = ?1 AND warehouse_id = ?2",
        )
        .bind(product_id)
        .bind(warehouse_id)
        .fetch_one(&mut *self.conn)
        .await?;
        Ok(net)
    }
}
