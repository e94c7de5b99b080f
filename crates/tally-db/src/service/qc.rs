//! # QC Adjudication Service
//!
//! Records inspections and pushes their verdicts through the lot, the
//! order line and the order rollup.
//!
//! ## Adjudication Flow
//! ```text
//! NewQcRecord
//!   │ validate shape, ids vs lot, quantities vs received   (nothing written yet)
//!   ▼
//! INSERT quality_control_records            immutable
//!   ▼
//! LotManager::apply(plan_verdict)            lot + stock + ledger
//!   ▼
//! copy lot QC status onto the order line     returned_quantity = failed
//!   ▼
//! apply_rollup(order)                        status, verdict, totals
//! ```

use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::repository::{LotRepository, PurchaseOrderRepository, QcRepository};
use crate::service::error::{ServiceError, ServiceResult};
use crate::service::lot::LotManager;
use crate::service::purchase_order::apply_rollup;
use tally_core::auth::roles;
use tally_core::{
    qc, LotState, LotTransition, NewQcRecord, Principal, PurchaseOrder, QcQuantities, QcStatus,
    QualityControlRecord, Stock, StockLot, ValidationError,
};

/// Everything an adjudication changed.
#[derive(Debug, Clone, Serialize)]
pub struct QcOutcome {
    pub record: QualityControlRecord,
    pub lot: StockLot,
    pub order: PurchaseOrder,
    /// Present when the verdict moved quantity in or out of stock.
    pub stock: Option<Stock>,
}

/// QC status and flagged return quantity a line should carry for `lot`.
fn line_qc(lot: &StockLot) -> (QcStatus, i64) {
    let flagged = if lot.qc_status.is_returnable() {
        lot.failed_quantity
    } else {
        0
    };
    (lot.qc_status, flagged)
}

#[derive(Debug, Clone)]
pub struct QcService {
    pool: SqlitePool,
}

impl QcService {
    pub fn new(pool: SqlitePool) -> Self {
        QcService { pool }
    }

    /// Records an inspection of one batch and applies its verdict.
    pub async fn adjudicate(&self, principal: &Principal, input: NewQcRecord) -> ServiceResult<QcOutcome> {
        principal.require(roles::QUALITY, "adjudicate QC")?;
        input.validate()?;
        debug!(batch_id = %input.batch_id, verdict = ?input.verdict, "Adjudicating batch");

        let mut tx = self.pool.begin().await?;
        let mut lot = LotRepository::new(&mut tx)
            .by_batch(&input.batch_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Lot", &input.batch_id))?;

        for (field, given, expected) in [
            ("product_id", &input.product_id, &lot.product_id),
            ("supplier_id", &input.supplier_id, &lot.supplier_id),
            ("warehouse_id", &input.warehouse_id, &lot.warehouse_id),
        ] {
            if given != expected {
                return Err(ValidationError::inconsistent(
                    field,
                    format!("batch {} belongs to {}, not {}", lot.batch_id, expected, given),
                )
                .into());
            }
        }
        input.quantities().validate(input.verdict, lot.quantity_received)?;
        let transition = lot.plan_verdict(input.verdict, input.passed_quantity)?;

        let record = input.into_record(&principal.user_id, Some(lot.purchase_order_id.clone()));
        QcRepository::new(&mut tx).insert(&record).await?;

        let now = Utc::now();
        let stock = LotManager::new(&mut tx)
            .apply(&mut lot, &transition, &principal.user_id, None, now)
            .await?;

        let (status, flagged) = line_qc(&lot);
        PurchaseOrderRepository::new(&mut tx)
            .set_item_qc(&lot.purchase_order_item_id, status, flagged)
            .await?;
        let order = apply_rollup(&mut tx, &lot.purchase_order_id, now).await?;
        tx.commit().await?;

        info!(
            batch_id = %lot.batch_id,
            verdict = ?record.verdict,
            lot_state = ?lot.state,
            po_number = %order.po_number,
            po_status = ?order.status,
            inspector = %principal.user_id,
            "QC verdict applied"
        );
        Ok(QcOutcome {
            record,
            lot,
            order,
            stock,
        })
    }

    /// Re-applies the latest inspection of every line and rolls the order
    /// up. Lines without a lot or whose record no longer fits are skipped.
    /// Fails without writing anything when no line has been adjudicated.
    pub async fn summarize(&self, principal: &Principal, order_id: &str) -> ServiceResult<PurchaseOrder> {
        principal.require(roles::QUALITY, "summarize QC")?;

        let mut tx = self.pool.begin().await?;
        let order = PurchaseOrderRepository::new(&mut tx)
            .get(order_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Purchase order", order_id))?;
        order.ensure_received("summarize QC")?;

        let now = Utc::now();
        let items = PurchaseOrderRepository::new(&mut tx).items(order_id).await?;
        let mut statuses = Vec::with_capacity(items.len());
        let mut skipped = 0usize;

        for item in &items {
            let Some(mut lot) = LotRepository::new(&mut tx).by_item(&item.id).await? else {
                warn!(po_number = %order.po_number, line_no = item.line_no, "No lot for line, skipping");
                statuses.push(item.qc_status);
                skipped += 1;
                continue;
            };

            let latest = QcRepository::new(&mut tx).latest_for_batch(&lot.batch_id).await?;
            let reapply = !lot.is_stocked() && lot.state != LotState::Closed;
            if let (Some(record), true) = (&latest, reapply) {
                match replan(record, &lot) {
                    Ok(transition) => {
                        LotManager::new(&mut tx)
                            .apply(&mut lot, &transition, &principal.user_id, None, now)
                            .await?;
                    }
                    Err(err) => {
                        warn!(batch_id = %lot.batch_id, error = %err, "QC record no longer applies, skipping");
                        skipped += 1;
                    }
                }
            }

            let (status, flagged) = line_qc(&lot);
            if status != item.qc_status || flagged != item.returned_quantity {
                PurchaseOrderRepository::new(&mut tx)
                    .set_item_qc(&item.id, status, flagged)
                    .await?;
            }
            statuses.push(status);
        }

        qc::summarize(&order.po_number, &statuses)?;
        let order = apply_rollup(&mut tx, order_id, now).await?;
        tx.commit().await?;

        info!(
            po_number = %order.po_number,
            verdict = ?order.qc_status,
            status = ?order.status,
            skipped,
            "QC summary recomputed"
        );
        Ok(order)
    }

    /// Removes a record. The lot, stock and ledger keep what it caused.
    pub async fn delete_record(&self, principal: &Principal, record_id: &str) -> ServiceResult<()> {
        principal.require(roles::QUALITY, "delete QC record")?;

        let mut conn = self.pool.acquire().await?;
        if !QcRepository::new(&mut conn).delete(record_id).await? {
            return Err(ServiceError::not_found("QC record", record_id));
        }
        info!(record_id, actor = %principal.user_id, "QC record deleted");
        Ok(())
    }

    pub async fn records_for_batch(&self, batch_id: &str) -> ServiceResult<Vec<QualityControlRecord>> {
        let mut conn = self.pool.acquire().await?;
        Ok(QcRepository::new(&mut conn).for_batch(batch_id).await?)
    }
}

/// Re-checks a stored record against the lot and plans its verdict again.
fn replan(record: &QualityControlRecord, lot: &StockLot) -> ServiceResult<LotTransition> {
    QcQuantities {
        total: record.total_quantity,
        passed: record.passed_quantity,
        failed: record.failed_quantity,
    }
    .validate(record.verdict, lot.quantity_received)?;
    Ok(lot.plan_verdict(record.verdict, record.passed_quantity)?)
}
