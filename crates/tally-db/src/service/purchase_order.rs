//! # Purchase Order Orchestrator
//!
//! Creates, submits, confirms, cancels and returns purchase orders.
//!
//! ## Confirmation
//! ```text
//! confirm(po)
//!   │
//!   ├─ UPDATE ... SET status='RECEIVED' WHERE status='PENDING'
//!   │      └─ 0 rows ──► Conflict (already confirmed / cancelled)
//!   │
//!   ├─ for each line (line_no order)
//!   │      ├─ batch id supplied? keep it : BatchSequencer::next
//!   │      └─ INSERT lot (PENDING_QC, nothing counted)
//!   │
//!   └─ commit (all lots or none)
//! ```
//!
//! Once received, the order's status is only ever written by
//! [`apply_rollup`].

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use crate::repository::{CatalogRepository, LotRepository, PurchaseOrderRepository};
use crate::service::batch::BatchSequencer;
use crate::service::error::{ServiceError, ServiceResult};
use crate::service::lot::LotManager;
use tally_core::auth::roles;
use tally_core::purchase::{line_total, rollup_status, totals, NewPurchaseOrder};
use tally_core::{
    new_id, qc, CoreError, LotState, PoStatus, Principal, PurchaseOrder, PurchaseOrderDetail,
    PurchaseOrderItem, QcStatus, ReturnHistoryEntry, StockLot, ValidationError,
};

// =============================================================================
// Rollup
// =============================================================================

/// Re-derives a received order's QC verdict, status and totals from its
/// lines and return history. Orders not yet received are returned as is.
pub(crate) async fn apply_rollup(
    conn: &mut SqliteConnection,
    order_id: &str,
    now: DateTime<Utc>,
) -> ServiceResult<PurchaseOrder> {
    let mut repo = PurchaseOrderRepository::new(conn);
    let mut order = repo
        .get(order_id)
        .await?
        .ok_or_else(|| ServiceError::not_found("Purchase order", order_id))?;
    if !order.status.is_received() {
        return Ok(order);
    }

    let items = repo.items(order_id).await?;
    let history = repo.history(order_id).await?;
    let statuses: Vec<QcStatus> = items.iter().map(|i| i.qc_status).collect();
    let verdict = qc::rollup(&statuses);
    let status = rollup_status(verdict, &items);
    let sums = totals(&items, &history);

    repo.set_rollup(order_id, status, verdict, now).await?;
    repo.set_totals(order_id, &sums, now).await?;

    if order.status != status || order.qc_status != verdict {
        debug!(
            po_number = %order.po_number,
            from = ?order.status,
            to = ?status,
            verdict = ?verdict,
            "Purchase order rolled up"
        );
    }

    order.status = status;
    order.qc_status = verdict;
    order.total_amount_cents = sums.total.cents();
    order.total_returned_cents = sums.returned.cents();
    order.total_after_return_cents = sums.after_return.cents();
    order.updated_at = now;
    Ok(order)
}

pub(crate) async fn load_detail(conn: &mut SqliteConnection, order_id: &str) -> ServiceResult<PurchaseOrderDetail> {
    let mut repo = PurchaseOrderRepository::new(conn);
    let order = repo
        .get(order_id)
        .await?
        .ok_or_else(|| ServiceError::not_found("Purchase order", order_id))?;
    let items = repo.items(order_id).await?;
    let return_history = repo.history(order_id).await?;
    Ok(PurchaseOrderDetail {
        order,
        items,
        return_history,
    })
}

// =============================================================================
// Service
// =============================================================================

#[derive(Debug, Clone)]
pub struct PurchaseOrderService {
    pool: SqlitePool,
}

impl PurchaseOrderService {
    pub fn new(pool: SqlitePool) -> Self {
        PurchaseOrderService { pool }
    }

    pub async fn get(&self, order_id: &str) -> ServiceResult<PurchaseOrderDetail> {
        let mut conn = self.pool.acquire().await?;
        load_detail(&mut conn, order_id).await
    }

    /// Creates an order in DRAFT, or PENDING when `input.submit` is set.
    pub async fn create(&self, principal: &Principal, input: NewPurchaseOrder) -> ServiceResult<PurchaseOrderDetail> {
        principal.require(roles::PURCHASING, "create purchase order")?;
        input.validate()?;
        debug!(po_number = %input.po_number, lines = input.items.len(), "Creating purchase order");

        let mut tx = self.pool.begin().await?;

        {
            let mut catalog = CatalogRepository::new(&mut tx);
            if catalog.supplier(&input.supplier_id).await?.is_none() {
                return Err(unknown("supplier", &input.supplier_id));
            }
            if catalog.warehouse(&input.warehouse_id).await?.is_none() {
                return Err(unknown("warehouse", &input.warehouse_id));
            }
            for item in &input.items {
                if catalog.product(&item.product_id).await?.is_none() {
                    return Err(unknown("product", &item.product_id));
                }
            }
        }

        let mut repo = PurchaseOrderRepository::new(&mut tx);
        if repo.number_exists(&input.po_number).await? {
            return Err(ServiceError::conflict(format!(
                "Purchase order number already exists: {}",
                input.po_number
            )));
        }
        let supplied: Vec<&str> = input.items.iter().filter_map(|i| i.batch_id.as_deref()).collect();
        if let Some(taken) = repo.first_taken_batch_id(&supplied).await? {
            return Err(ServiceError::conflict(format!("Batch id already in use: {}", taken)));
        }

        let now = Utc::now();
        let total = input.total();
        let order = PurchaseOrder {
            id: new_id(),
            po_number: input.po_number.clone(),
            supplier_id: input.supplier_id.clone(),
            warehouse_id: input.warehouse_id.clone(),
            status: input.initial_status(),
            qc_status: QcStatus::Pending,
            total_amount_cents: total.cents(),
            total_returned_cents: 0,
            total_after_return_cents: total.cents(),
            notes: input.notes.clone(),
            created_by: principal.user_id.clone(),
            created_at: now,
            received_by: None,
            received_at: None,
            updated_at: now,
        };
        repo.insert(&order).await?;

        for (idx, item) in input.items.iter().enumerate() {
            repo.insert_item(&PurchaseOrderItem {
                id: new_id(),
                purchase_order_id: order.id.clone(),
                line_no: idx as i64 + 1,
                product_id: item.product_id.clone(),
                quantity: item.quantity,
                unit_cost_cents: item.unit_cost_cents,
                line_total_cents: line_total(item.quantity, item.unit_cost_cents).cents(),
                batch_id: item.batch_id.clone(),
                expiry_date: item.expiry_date,
                qc_status: QcStatus::Pending,
                returned_quantity: 0,
                returned_at: None,
            })
            .await?;
        }

        let detail = load_detail(&mut tx, &order.id).await?;
        tx.commit().await?;

        info!(
            po_id = %order.id,
            po_number = %order.po_number,
            status = ?order.status,
            total_cents = order.total_amount_cents,
            "Purchase order created"
        );
        Ok(detail)
    }

    /// DRAFT → PENDING.
    pub async fn submit(&self, principal: &Principal, order_id: &str) -> ServiceResult<PurchaseOrder> {
        principal.require(roles::PURCHASING, "submit purchase order")?;

        let mut tx = self.pool.begin().await?;
        let order = self.load(&mut tx, order_id).await?;
        order.ensure_can_submit()?;

        let now = Utc::now();
        if !PurchaseOrderRepository::new(&mut tx)
            .transition(order_id, PoStatus::Draft, PoStatus::Pending, now)
            .await?
        {
            return Err(lost_race(&order, "submit"));
        }
        let order = self.load(&mut tx, order_id).await?;
        tx.commit().await?;

        info!(po_number = %order.po_number, "Purchase order submitted");
        Ok(order)
    }

    /// PENDING → RECEIVED, creating one PENDING_QC lot per line.
    pub async fn confirm(&self, principal: &Principal, order_id: &str) -> ServiceResult<PurchaseOrderDetail> {
        principal.require(roles::PURCHASING, "confirm purchase order")?;

        let mut tx = self.pool.begin().await?;
        let order = self.load(&mut tx, order_id).await?;
        order.ensure_can_confirm()?;

        let now = Utc::now();
        if !PurchaseOrderRepository::new(&mut tx)
            .mark_received(order_id, &principal.user_id, now)
            .await?
        {
            return Err(lost_race(&order, "confirm"));
        }

        let (supplier, warehouse) = {
            let mut catalog = CatalogRepository::new(&mut tx);
            let supplier = catalog
                .supplier(&order.supplier_id)
                .await?
                .ok_or_else(|| unknown("supplier", &order.supplier_id))?;
            let warehouse = catalog
                .warehouse(&order.warehouse_id)
                .await?
                .ok_or_else(|| unknown("warehouse", &order.warehouse_id))?;
            (supplier, warehouse)
        };

        let items = PurchaseOrderRepository::new(&mut tx).items(order_id).await?;
        for item in &items {
            let batch_id = match &item.batch_id {
                Some(batch_id) => batch_id.clone(),
                None => {
                    let product = CatalogRepository::new(&mut tx)
                        .product(&item.product_id)
                        .await?
                        .ok_or_else(|| unknown("product", &item.product_id))?;
                    let batch_id = BatchSequencer::new(&mut tx)
                        .next(&warehouse, &supplier, &product, now.date_naive())
                        .await?;
                    PurchaseOrderRepository::new(&mut tx)
                        .set_item_batch(&item.id, &batch_id)
                        .await?;
                    batch_id
                }
            };

            let lot = StockLot {
                id: new_id(),
                batch_id,
                purchase_order_id: order.id.clone(),
                purchase_order_item_id: item.id.clone(),
                product_id: item.product_id.clone(),
                supplier_id: order.supplier_id.clone(),
                warehouse_id: order.warehouse_id.clone(),
                quantity_received: item.quantity,
                remaining_quantity: 0,
                failed_quantity: 0,
                unit_cost_cents: item.unit_cost_cents,
                expiry_date: item.expiry_date,
                state: LotState::PendingQc,
                qc_status: QcStatus::Pending,
                stocked_at: None,
                closed_by: None,
                closed_at: None,
                close_reason: None,
                created_at: now,
                updated_at: now,
            };
            LotRepository::new(&mut tx).insert(&lot).await?;
            debug!(po_number = %order.po_number, line_no = item.line_no, batch_id = %lot.batch_id, "Lot created");
        }

        let detail = load_detail(&mut tx, order_id).await?;
        tx.commit().await?;

        info!(
            po_number = %order.po_number,
            lots = items.len(),
            actor = %principal.user_id,
            "Purchase order received"
        );
        Ok(detail)
    }

    /// DRAFT/PENDING → CANCELLED. Nothing else changes.
    pub async fn cancel(&self, principal: &Principal, order_id: &str) -> ServiceResult<PurchaseOrder> {
        principal.require(roles::PURCHASING, "cancel purchase order")?;

        let mut tx = self.pool.begin().await?;
        let order = self.load(&mut tx, order_id).await?;
        order.ensure_can_cancel()?;

        if !PurchaseOrderRepository::new(&mut tx)
            .transition(order_id, order.status, PoStatus::Cancelled, Utc::now())
            .await?
        {
            return Err(lost_race(&order, "cancel"));
        }
        let cancelled = self.load(&mut tx, order_id).await?;
        tx.commit().await?;

        info!(po_number = %cancelled.po_number, from = ?order.status, "Purchase order cancelled");
        Ok(cancelled)
    }

    /// Sends every line still awaiting return back to the supplier. Lines
    /// whose lot was closed meanwhile are skipped and stay pending.
    pub async fn return_order(
        &self,
        principal: &Principal,
        order_id: &str,
        reason: &str,
    ) -> ServiceResult<PurchaseOrderDetail> {
        self.return_lines(principal, order_id, None, reason).await
    }

    /// Sends one line back to the supplier.
    pub async fn return_item(
        &self,
        principal: &Principal,
        order_id: &str,
        item_id: &str,
        reason: &str,
    ) -> ServiceResult<PurchaseOrderDetail> {
        self.return_lines(principal, order_id, Some(item_id), reason).await
    }

    async fn return_lines(
        &self,
        principal: &Principal,
        order_id: &str,
        only: Option<&str>,
        reason: &str,
    ) -> ServiceResult<PurchaseOrderDetail> {
        principal.require(roles::PURCHASING, "return to supplier")?;
        tally_core::validation::validate_note("reason", reason)?;

        let mut tx = self.pool.begin().await?;
        let order = self.load(&mut tx, order_id).await?;
        order.ensure_can_return()?;

        let items = PurchaseOrderRepository::new(&mut tx).items(order_id).await?;
        let lines: Vec<&PurchaseOrderItem> = match only {
            Some(item_id) => {
                let item = items
                    .iter()
                    .find(|i| i.id == item_id)
                    .ok_or_else(|| ServiceError::not_found("Purchase order item", item_id))?;
                if !item.is_pending_return() {
                    return Err(ServiceError::conflict(format!(
                        "Line {} of purchase order {} has nothing awaiting return",
                        item.line_no, order.po_number
                    )));
                }
                vec![item]
            }
            None => items.iter().filter(|i| i.is_pending_return()).collect(),
        };
        if lines.is_empty() {
            return Err(CoreError::NothingToReturn(order.po_number.clone()).into());
        }

        let now = Utc::now();
        let mut returned_value = 0;
        let mut returned = 0;
        let mut skipped = 0;
        for item in &lines {
            let planned = match LotRepository::new(&mut tx).by_item(&item.id).await? {
                Some(lot) => match lot.plan_purchase_return() {
                    Ok(transition) => Ok((lot, transition)),
                    Err(err) => Err(ServiceError::from(err)),
                },
                None => Err(ServiceError::not_found("Lot for purchase order item", &item.id)),
            };
            // a single-line return fails loudly; a whole-order return skips
            // lines whose lot can no longer go back
            let (mut lot, transition) = match (planned, only) {
                (Ok(planned), _) => planned,
                (Err(err), Some(_)) => return Err(err),
                (Err(err), None) => {
                    warn!(
                        po_number = %order.po_number,
                        line_no = item.line_no,
                        error = %err,
                        "Line skipped by purchase return"
                    );
                    skipped += 1;
                    continue;
                }
            };
            LotManager::new(&mut tx)
                .apply(&mut lot, &transition, &principal.user_id, Some(reason), now)
                .await?;

            let value = item.return_value();
            let mut repo = PurchaseOrderRepository::new(&mut tx);
            repo.mark_item_returned(&item.id, now).await?;
            repo.insert_history(&ReturnHistoryEntry {
                id: new_id(),
                purchase_order_id: order.id.clone(),
                item_id: item.id.clone(),
                product_id: item.product_id.clone(),
                batch_id: Some(lot.batch_id.clone()),
                quantity: item.returned_quantity,
                value_cents: value.cents(),
                reason: reason.to_string(),
                returned_by: principal.user_id.clone(),
                returned_at: now,
            })
            .await?;
            returned_value += value.cents();
            returned += 1;
        }
        if returned == 0 {
            return Err(CoreError::NothingToReturn(order.po_number.clone()).into());
        }

        let rolled = apply_rollup(&mut tx, order_id, now).await?;
        let detail = load_detail(&mut tx, order_id).await?;
        tx.commit().await?;

        info!(
            po_number = %order.po_number,
            lines = returned,
            skipped,
            value_cents = returned_value,
            status = ?rolled.status,
            actor = %principal.user_id,
            "Purchase return recorded"
        );
        Ok(detail)
    }

    async fn load(&self, conn: &mut SqliteConnection, order_id: &str) -> ServiceResult<PurchaseOrder> {
        PurchaseOrderRepository::new(conn)
            .get(order_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Purchase order", order_id))
    }
}

fn unknown(entity: &str, id: &str) -> ServiceError {
    ValidationError::inconsistent(format!("{}_id", entity), format!("unknown {} {}", entity, id)).into()
}

fn lost_race(order: &PurchaseOrder, operation: &str) -> ServiceError {
    ServiceError::conflict(format!(
        "Purchase order {} changed state before it could {}",
        order.po_number, operation
    ))
}
