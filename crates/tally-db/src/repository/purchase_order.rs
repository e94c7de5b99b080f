//! # Purchase Order Repository
//!
//! Orders, their ordered lines and the return history.
//!
//! Status changes that race (submit, confirm, cancel) are conditional
//! updates: `UPDATE ... WHERE status = <expected>`. A caller that sees zero
//! rows affected lost the race and must report a conflict.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::DbResult;
use tally_core::purchase::PoTotals;
use tally_core::{PoStatus, PurchaseOrder, PurchaseOrderItem, QcStatus, ReturnHistoryEntry};

const ORDER_COLUMNS: &str = r#"
    id, po_number, supplier_id, warehouse_id, status, qc_status,
    total_amount_cents, total_returned_cents, total_after_return_cents,
    notes, created_by, created_at, received_by, received_at, updated_at
"#;

const ITEM_COLUMNS: &str = r#"
    id, purchase_order_id, line_no, product_id, quantity, unit_cost_cents,
    line_total_cents, batch_id, expiry_date, qc_status, returned_quantity,
    returned_at
"#;

pub struct PurchaseOrderRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> PurchaseOrderRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        PurchaseOrderRepository { conn }
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    pub async fn get(&mut self, id: &str) -> DbResult<Option<PurchaseOrder>> {
        let sql = format!("SELECT {} FROM purchase_orders WHERE id = ?1", ORDER_COLUMNS);
        let order = sqlx::query_as::<_, PurchaseOrder>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(order)
    }

    pub async fn number_exists(&mut self, po_number: &str) -> DbResult<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM purchase_orders WHERE po_number = ?1")
            .bind(po_number)
            .fetch_one(&mut *self.conn)
            .await?;
        Ok(count > 0)
    }

    /// Returns the first of `batch_ids` already used by any order line or
    /// lot.
    pub async fn first_taken_batch_id(&mut self, batch_ids: &[&str]) -> DbResult<Option<String>> {
        for batch_id in batch_ids {
            let count: i64 = sqlx::query_scalar(
                r#"
                SELECT (SELECT COUNT(*) FROM purchase_order_items WHERE batch_id = ?1)
                     + (SELECT COUNT(*) FROM stock_lots WHERE batch_id = ?1)
                "#,
            )
            .bind(*batch_id)
            .fetch_one(&mut *self.conn)
            .await?;
            if count > 0 {
                return Ok(Some(batch_id.to_string()));
            }
        }
        Ok(None)
    }

    /// Lines in order.
    pub async fn items(&mut self, purchase_order_id: &str) -> DbResult<Vec<PurchaseOrderItem>> {
        let sql = format!(
            "SELECT {} FROM purchase_order_items WHERE purchase_order_id = ?1 ORDER BY line_no",
            ITEM_COLUMNS
        );
        let items = sqlx::query_as::<_, PurchaseOrderItem>(&sql)
            .bind(purchase_order_id)
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(items)
    }

    pub async fn item(&mut self, item_id: &str) -> DbResult<Option<PurchaseOrderItem>> {
        let sql = format!("SELECT {} FROM purchase_order_items WHERE id = ?1", ITEM_COLUMNS);
        let item = sqlx::query_as::<_, PurchaseOrderItem>(&sql)
            .bind(item_id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(item)
    }

    pub async fn history(&mut self, purchase_order_id: &str) -> DbResult<Vec<ReturnHistoryEntry>> {
        let history = sqlx::query_as::<_, ReturnHistoryEntry>(
            r#"
            SELECT id, purchase_order_id, item_id, product_id, batch_id,
                   quantity, value_cents, reason, returned_by, returned_at
            FROM purchase_return_history
            WHERE purchase_order_id = ?1
            ORDER BY returned_at, id
            "#,
        )
        .bind(purchase_order_id)
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(history)
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    pub async fn insert(&mut self, order: &PurchaseOrder) -> DbResult<()> {
        debug!(id = %order.id, po_number = %order.po_number, "Inserting purchase order");

        sqlx::query(
            r#"
            INSERT INTO purchase_orders (
                id, po_number, supplier_id, warehouse_id, status, qc_status,
                total_amount_cents, total_returned_cents, total_after_return_cents,
                notes, created_by, created_at, received_by, received_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            "#,
        )
        .bind(&order.id)
        .bind(&order.po_number)
        .bind(&order.supplier_id)
        .bind(&order.warehouse_id)
        .bind(order.status)
        .bind(order.qc_status)
        .bind(order.total_amount_cents)
        .bind(order.total_returned_cents)
        .bind(order.total_after_return_cents)
        .bind(&order.notes)
        .bind(&order.created_by)
        .bind(order.created_at)
        .bind(&order.received_by)
        .bind(order.received_at)
        .bind(order.updated_at)
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    pub async fn insert_item(&mut self, item: &PurchaseOrderItem) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO purchase_order_items (
                id, purchase_order_id, line_no, product_id, quantity, unit_cost_cents,
                line_total_cents, batch_id, expiry_date, qc_status, returned_quantity,
                returned_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&item.id)
        .bind(&item.purchase_order_id)
        .bind(item.line_no)
        .bind(&item.product_id)
        .bind(item.quantity)
        .bind(item.unit_cost_cents)
        .bind(item.line_total_cents)
        .bind(&item.batch_id)
        .bind(item.expiry_date)
        .bind(item.qc_status)
        .bind(item.returned_quantity)
        .bind(item.returned_at)
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    /// Moves `id` from `from` to `to`. Returns false when the order was not in
    /// `from` (someone else moved it first).
    pub async fn transition(
        &mut self,
        id: &str,
        from: PoStatus,
        to: PoStatus,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE purchase_orders SET status = ?3, updated_at = ?4 WHERE id = ?1 AND status = ?2",
        )
        .bind(id)
        .bind(from)
        .bind(to)
        .bind(now)
        .execute(&mut *self.conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// PENDING → RECEIVED, stamping the receiver. Returns false when the
    /// order was not PENDING.
    pub async fn mark_received(&mut self, id: &str, actor: &str, now: DateTime<Utc>) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE purchase_orders
            SET status = 'RECEIVED', received_by = ?2, received_at = ?3, updated_at = ?3
            WHERE id = ?1 AND status = 'PENDING'
            "#,
        )
        .bind(id)
        .bind(actor)
        .bind(now)
        .execute(&mut *self.conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn set_rollup(
        &mut self,
        id: &str,
        status: PoStatus,
        qc_status: QcStatus,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        sqlx::query("UPDATE purchase_orders SET status = ?2, qc_status = ?3, updated_at = ?4 WHERE id = ?1")
            .bind(id)
            .bind(status)
            .bind(qc_status)
            .bind(now)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    pub async fn set_totals(&mut self, id: &str, totals: &PoTotals, now: DateTime<Utc>) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE purchase_orders
            SET total_amount_cents = ?2, total_returned_cents = ?3,
                total_after_return_cents = ?4, updated_at = ?5
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(totals.total.cents())
        .bind(totals.returned.cents())
        .bind(totals.after_return.cents())
        .bind(now)
        .execute(&mut *self.conn)
        .await?;
        Ok(())
    }

    pub async fn set_item_batch(&mut self, item_id: &str, batch_id: &str) -> DbResult<()> {
        sqlx::query("UPDATE purchase_order_items SET batch_id = ?2 WHERE id = ?1")
            .bind(item_id)
            .bind(batch_id)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    /// Copies a lot's QC outcome onto its line. `returned_quantity` is the
    /// failed quantity flagged for return.
    pub async fn set_item_qc(&mut self, item_id: &str, qc_status: QcStatus, returned_quantity: i64) -> DbResult<()> {
        sqlx::query("UPDATE purchase_order_items SET qc_status = ?2, returned_quantity = ?3 WHERE id = ?1")
            .bind(item_id)
            .bind(qc_status)
            .bind(returned_quantity)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    pub async fn mark_item_returned(&mut self, item_id: &str, now: DateTime<Utc>) -> DbResult<()> {
        sqlx::query("UPDATE purchase_order_items SET returned_at = ?2 WHERE id = ?1 AND returned_at IS NULL")
            .bind(item_id)
            .bind(now)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    pub async fn insert_history(&mut self, entry: &ReturnHistoryEntry) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO purchase_return_history (
                id, purchase_order_id, item_id, product_id, batch_id,
                quantity, value_cents, reason, returned_by, returned_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.purchase_order_id)
        .bind(&entry.item_id)
        .bind(&entry.product_id)
        .bind(&entry.batch_id)
        .bind(entry.quantity)
        .bind(entry.value_cents)
        .bind(&entry.reason)
        .bind(&entry.returned_by)
        .bind(entry.returned_at)
        .execute(&mut *self.conn)
        .await?;
        Ok(())
    }
}
