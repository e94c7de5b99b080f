//! # QC Record Repository
//!
//! Inspection records are insert-only. Deleting one is allowed and never
//! touches lot or stock state.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::{DbError, DbResult};
use tally_core::{QcStatus, QualityControlRecord};

/// Row shape: attachments live in a JSON text column.
#[derive(Debug, sqlx::FromRow)]
struct QcRecordRow {
    id: String,
    batch_id: String,
    purchase_order_id: Option<String>,
    product_id: String,
    supplier_id: String,
    warehouse_id: String,
    verdict: QcStatus,
    total_quantity: i64,
    passed_quantity: i64,
    failed_quantity: i64,
    attachments: String,
    inspector_id: String,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<QcRecordRow> for QualityControlRecord {
    type Error = DbError;

    fn try_from(row: QcRecordRow) -> Result<Self, Self::Error> {
        let attachments: Vec<String> =
            serde_json::from_str(&row.attachments).map_err(|e| DbError::CorruptColumn {
                column: "quality_control_records.attachments".to_string(),
                reason: e.to_string(),
            })?;
        Ok(QualityControlRecord {
            id: row.id,
            batch_id: row.batch_id,
            purchase_order_id: row.purchase_order_id,
            product_id: row.product_id,
            supplier_id: row.supplier_id,
            warehouse_id: row.warehouse_id,
            verdict: row.verdict,
            total_quantity: row.total_quantity,
            passed_quantity: row.passed_quantity,
            failed_quantity: row.failed_quantity,
            attachments,
            inspector_id: row.inspector_id,
            notes: row.notes,
            created_at: row.created_at,
        })
    }
}

const QC_COLUMNS: &str = r#"
    id, batch_id, purchase_order_id, product_id, supplier_id, warehouse_id,
    verdict, total_quantity, passed_quantity, failed_quantity, attachments,
    inspector_id, notes, created_at
"#;

pub struct QcRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> QcRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        QcRepository { conn }
    }

    pub async fn insert(&mut self, record: &QualityControlRecord) -> DbResult<()> {
        debug!(id = %record.id, batch_id = %record.batch_id, verdict = ?record.verdict, "Inserting QC record");

        let attachments = serde_json::to_string(&record.attachments)?;
        sqlx::query(
            r#"
            INSERT INTO quality_control_records (
                id, batch_id, purchase_order_id, product_id, supplier_id, warehouse_id,
                verdict, total_quantity, passed_quantity, failed_quantity, attachments,
                inspector_id, notes, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
        )
        .bind(&record.id)
        .bind(&record.batch_id)
        .bind(&record.purchase_order_id)
        .bind(&record.product_id)
        .bind(&record.supplier_id)
        .bind(&record.warehouse_id)
        .bind(record.verdict)
        .bind(record.total_quantity)
        .bind(record.passed_quantity)
        .bind(record.failed_quantity)
        .bind(attachments)
        .bind(&record.inspector_id)
        .bind(&record.notes)
        .bind(record.created_at)
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    pub async fn get(&mut self, id: &str) -> DbResult<Option<QualityControlRecord>> {
        let sql = format!("SELECT {} FROM quality_control_records WHERE id = ?1", QC_COLUMNS);
        let row = sqlx::query_as::<_, QcRecordRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;
        row.map(QualityControlRecord::try_from).transpose()
    }

    /// All inspections of a batch, oldest first.
    pub async fn for_batch(&mut self, batch_id: &str) -> DbResult<Vec<QualityControlRecord>> {
        let sql = format!(
            "SELECT {} FROM quality_control_records WHERE batch_id = ?1 ORDER BY created_at, rowid",
            QC_COLUMNS
        );
        let rows = sqlx::query_as::<_, QcRecordRow>(&sql)
            .bind(batch_id)
            .fetch_all(&mut *self.conn)
            .await?;
        rows.into_iter().map(QualityControlRecord::try_from).collect()
    }

    /// The most recent inspection of a batch.
    pub async fn latest_for_batch(&mut self, batch_id: &str) -> DbResult<Option<QualityControlRecord>> {
        let sql = format!(
            r#"
            SELECT {} FROM quality_control_records
            WHERE batch_id = ?1
            ORDER BY created_at DESC, rowid DESC
            LIMIT 1
            "#,
            QC_COLUMNS
        );
        let row = sqlx::query_as::<_, QcRecordRow>(&sql)
            .bind(batch_id)
            .fetch_optional(&mut *self.conn)
            .await?;
        row.map(QualityControlRecord::try_from).transpose()
    }

    /// Returns false when no such record existed.
    pub async fn delete(&mut self, id: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM quality_control_records WHERE id = ?1")
            .bind(id)
            .execute(&mut *self.conn)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}
