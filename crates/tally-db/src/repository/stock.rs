//! # Stock Repository
//!
//! One row per (product, warehouse). Only the stock aggregator service
//! writes here.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::error::DbResult;
use tally_core::{new_id, Stock, StockStatus};

const STOCK_COLUMNS: &str =
    "id, product_id, warehouse_id, total_quantity, status, last_restocked, updated_at";

pub struct StockRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> StockRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        StockRepository { conn }
    }

    pub async fn get(&mut self, product_id: &str, warehouse_id: &str) -> DbResult<Option<Stock>> {
        let sql = format!(
            "SELECT {} FROM stocks WHERE product_id = ?1 AND warehouse_id = ?2",
            STOCK_COLUMNS
        );
        let stock = sqlx::query_as::<_, Stock>(&sql)
            .bind(product_id)
            .bind(warehouse_id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(stock)
    }

    /// Creates or overwrites the aggregate row.
    pub async fn upsert(
        &mut self,
        product_id: &str,
        warehouse_id: &str,
        total_quantity: i64,
        status: StockStatus,
        now: DateTime<Utc>,
    ) -> DbResult<Stock> {
        let sql = format!(
            r#"
            INSERT INTO stocks (
                id, product_id, warehouse_id, total_quantity, status, last_restocked, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
            ON CONFLICT (product_id, warehouse_id) DO UPDATE SET
                total_quantity = excluded.total_quantity,
                status = excluded.status,
                last_restocked = excluded.last_restocked,
                updated_at = excluded.updated_at
            RETURNING {}
            "#,
            STOCK_COLUMNS
        );
        let stock = sqlx::query_as::<_, Stock>(&sql)
            .bind(new_id())
            .bind(product_id)
            .bind(warehouse_id)
            .bind(total_quantity)
            .bind(status)
            .bind(now)
            .fetch_one(&mut *self.conn)
            .await?;
        Ok(stock)
    }
}
