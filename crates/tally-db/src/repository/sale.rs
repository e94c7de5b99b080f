//! # Sale Repository
//!
//! Payments, receipts, receipt lines and the lot allocations behind them.
//!
//! ## Document Links
//! ```text
//! ┌──────────┐  payment_id   ┌──────────┐   receipt_id   ┌──────────────┐
//! │ receipts │──────────────►│ payments │                │ receipt_lines│
//! │          │◄──────────────│          │                │              │
//! └────┬─────┘  receipt_id   └──────────┘                └──────┬───────┘
//!      │ original_receipt_id (refunds)                         │ original_line_id
//!      ▼                                                       ▼ (refunds)
//!   SALE receipt                                      sale_allocations ──► stock_lots
//! ```

use std::collections::HashMap;

use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::DbResult;
use tally_core::{Payment, Receipt, ReceiptLine, SaleAllocation};

const RECEIPT_COLUMNS: &str = r#"
    id, receipt_number, kind, payment_id, warehouse_id, total_price_cents,
    profit_cents, original_receipt_id, reason, created_by, created_at
"#;

const LINE_COLUMNS: &str = r#"
    id, receipt_id, line_no, product_id, barcode, product_name, quantity,
    unit_price_cents, subtotal_cents, profit_cents, original_line_id
"#;

pub struct SaleRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> SaleRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        SaleRepository { conn }
    }

    // -------------------------------------------------------------------------
    // Payments
    // -------------------------------------------------------------------------

    pub async fn insert_payment(&mut self, payment: &Payment) -> DbResult<()> {
        debug!(id = %payment.id, kind = ?payment.kind, amount_cents = payment.amount_cents, "Inserting payment");

        sqlx::query(
            r#"
            INSERT INTO payments (id, kind, method, amount_cents, receipt_id, created_by, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&payment.id)
        .bind(payment.kind)
        .bind(payment.method)
        .bind(payment.amount_cents)
        .bind(&payment.receipt_id)
        .bind(&payment.created_by)
        .bind(payment.created_at)
        .execute(&mut *self.conn)
        .await?;
        Ok(())
    }

    pub async fn link_payment(&mut self, payment_id: &str, receipt_id: &str) -> DbResult<()> {
        sqlx::query("UPDATE payments SET receipt_id = ?2 WHERE id = ?1")
            .bind(payment_id)
            .bind(receipt_id)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    pub async fn payment(&mut self, id: &str) -> DbResult<Option<Payment>> {
        let payment = sqlx::query_as::<_, Payment>(
            "SELECT id, kind, method, amount_cents, receipt_id, created_by, created_at FROM payments WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&mut *self.conn)
        .await?;
        Ok(payment)
    }

    // -------------------------------------------------------------------------
    // Receipts
    // -------------------------------------------------------------------------

    pub async fn insert_receipt(&mut self, receipt: &Receipt) -> DbResult<()> {
        debug!(id = %receipt.id, number = %receipt.receipt_number, kind = ?receipt.kind, "Inserting receipt");

        sqlx::query(
            r#"
            INSERT INTO receipts (
                id, receipt_number, kind, payment_id, warehouse_id, total_price_cents,
                profit_cents, original_receipt_id, reason, created_by, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&receipt.id)
        .bind(&receipt.receipt_number)
        .bind(receipt.kind)
        .bind(&receipt.payment_id)
        .bind(&receipt.warehouse_id)
        .bind(receipt.total_price_cents)
        .bind(receipt.profit_cents)
        .bind(&receipt.original_receipt_id)
        .bind(&receipt.reason)
        .bind(&receipt.created_by)
        .bind(receipt.created_at)
        .execute(&mut *self.conn)
        .await?;
        Ok(())
    }

    pub async fn insert_line(&mut self, line: &ReceiptLine) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO receipt_lines (
                id, receipt_id, line_no, product_id, barcode, product_name, quantity,
                unit_price_cents, subtotal_cents, profit_cents, original_line_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&line.id)
        .bind(&line.receipt_id)
        .bind(line.line_no)
        .bind(&line.product_id)
        .bind(&line.barcode)
        .bind(&line.product_name)
        .bind(line.quantity)
        .bind(line.unit_price_cents)
        .bind(line.subtotal_cents)
        .bind(line.profit_cents)
        .bind(&line.original_line_id)
        .execute(&mut *self.conn)
        .await?;
        Ok(())
    }

    /// Finds a receipt by id, receipt number or the id of its payment.
    pub async fn resolve_receipt(&mut self, reference: &str) -> DbResult<Option<Receipt>> {
        let sql = format!(
            r#"
            SELECT {} FROM receipts
            WHERE id = ?1 OR receipt_number = ?1 OR payment_id = ?1
            LIMIT 1
            "#,
            RECEIPT_COLUMNS
        );
        let receipt = sqlx::query_as::<_, Receipt>(&sql)
            .bind(reference)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(receipt)
    }

    pub async fn lines(&mut self, receipt_id: &str) -> DbResult<Vec<ReceiptLine>> {
        let sql = format!(
            "SELECT {} FROM receipt_lines WHERE receipt_id = ?1 ORDER BY line_no",
            LINE_COLUMNS
        );
        let lines = sqlx::query_as::<_, ReceiptLine>(&sql)
            .bind(receipt_id)
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(lines)
    }

    /// Refund receipts issued against `receipt_id`, oldest first.
    pub async fn refunds_of(&mut self, receipt_id: &str) -> DbResult<Vec<Receipt>> {
        let sql = format!(
            "SELECT {} FROM receipts WHERE original_receipt_id = ?1 ORDER BY created_at, rowid",
            RECEIPT_COLUMNS
        );
        let receipts = sqlx::query_as::<_, Receipt>(&sql)
            .bind(receipt_id)
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(receipts)
    }

    /// Sale line id → quantity already refunded.
    pub async fn refunded_quantities(&mut self, receipt_id: &str) -> DbResult<HashMap<String, i64>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT rl.original_line_id, SUM(rl.quantity)
            FROM receipt_lines rl
            JOIN receipts r ON r.id = rl.receipt_id
            WHERE r.original_receipt_id = ?1 AND rl.original_line_id IS NOT NULL
            GROUP BY rl.original_line_id
            "#,
        )
        .bind(receipt_id)
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(rows.into_iter().collect())
    }

    // -------------------------------------------------------------------------
    // Allocations
    // -------------------------------------------------------------------------

    pub async fn insert_allocation(&mut self, allocation: &SaleAllocation) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sale_allocations (
                id, receipt_line_id, lot_id, allocation_no, quantity,
                restored_quantity, unit_cost_cents
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&allocation.id)
        .bind(&allocation.receipt_line_id)
        .bind(&allocation.lot_id)
        .bind(allocation.allocation_no)
        .bind(allocation.quantity)
        .bind(allocation.restored_quantity)
        .bind(allocation.unit_cost_cents)
        .execute(&mut *self.conn)
        .await?;
        Ok(())
    }

    pub async fn allocations(&mut self, receipt_line_id: &str) -> DbResult<Vec<SaleAllocation>> {
        let allocations = sqlx::query_as::<_, SaleAllocation>(
            r#"
            SELECT id, receipt_line_id, lot_id, allocation_no, quantity,
                   restored_quantity, unit_cost_cents
            FROM sale_allocations
            WHERE receipt_line_id = ?1
            ORDER BY allocation_no
            "#,
        )
        .bind(receipt_line_id)
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(allocations)
    }

    /// Records `quantity` more as restored. Returns false if that would
    /// exceed what the allocation consumed.
    pub async fn add_restored(&mut self, allocation_id: &str, quantity: i64) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE sale_allocations
            SET restored_quantity = restored_quantity + ?2
            WHERE id = ?1 AND restored_quantity + ?2 <= quantity
            "#,
        )
        .bind(allocation_id)
        .bind(quantity)
        .execute(&mut *self.conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
