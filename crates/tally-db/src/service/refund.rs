//! # Return/Refund Coordinator
//!
//! Reverses all or part of a sale in one transaction.
//!
//! ## Flow
//! ```text
//! sale ref (receipt id | receipt number | payment id)
//!   │
//!   ▼
//! plan_refund ── quantities ≤ sold - refunded, else Conflict
//!   │             amounts pro-rated cumulatively, negated
//!   ▼
//! per refunded line
//!   ├─ plan_restore (latest allocation first)
//!   ├─ lot.remaining += q      lot closed since? newest READY_FOR_SALE lot
//!   ├─ StockAggregator::recompute
//!   └─ one RETURN ledger row (no lot reference)
//!   │
//!   ▼
//! REFUND payment ──► refund receipt ──► lines ──► link payment ──► commit
//! ```
//!
//! Any failure drops the transaction: a refund is all or nothing.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::repository::{LotRepository, SaleRepository};
use crate::service::error::{ServiceError, ServiceResult};
use crate::service::ledger::Ledger;
use crate::service::stock::StockAggregator;
use tally_core::auth::roles;
use tally_core::refund::{plan_refund, plan_restore, RefundRequest};
use tally_core::sale::{receipt_number, ReceiptDetail};
use tally_core::{
    new_id, NewStockTransaction, Payment, PaymentKind, PaymentMethod, Principal, Receipt,
    ReceiptKind, ReceiptLine, TransactionKind, ValidationError,
};

#[derive(Debug, Clone)]
pub struct RefundService {
    pool: SqlitePool,
}

impl RefundService {
    pub fn new(pool: SqlitePool) -> Self {
        RefundService { pool }
    }

    pub async fn refund(&self, principal: &Principal, request: RefundRequest) -> ServiceResult<ReceiptDetail> {
        principal.require(roles::SALES, "refund sale")?;
        request.validate()?;

        let mut tx = self.pool.begin().await?;
        let (original, sale_lines, refunded, original_payment) = {
            let mut repo = SaleRepository::new(&mut tx);
            let original = repo
                .resolve_receipt(&request.sale_ref)
                .await?
                .ok_or_else(|| ServiceError::not_found("Receipt", &request.sale_ref))?;
            if original.kind != ReceiptKind::Sale {
                return Err(ValidationError::inconsistent(
                    "sale reference",
                    format!("{} is a refund receipt", original.receipt_number),
                )
                .into());
            }
            let lines = repo.lines(&original.id).await?;
            let refunded = repo.refunded_quantities(&original.id).await?;
            let payment = match &original.payment_id {
                Some(id) => repo.payment(id).await?,
                None => None,
            };
            (original, lines, refunded, payment)
        };

        let plan = plan_refund(
            &original.receipt_number,
            &sale_lines,
            &refunded,
            request.lines.as_deref(),
        )?;
        debug!(receipt_number = %original.receipt_number, lines = plan.lines.len(), "Refund planned");

        let now = Utc::now();
        let refund_id = new_id();
        let payment_id = new_id();

        for line in &plan.lines {
            let allocations = SaleRepository::new(&mut tx).allocations(&line.original_line_id).await?;
            for restore in plan_restore(&allocations, line.quantity)? {
                let mut lots = LotRepository::new(&mut tx);
                if !lots.adjust_remaining(&restore.lot_id, restore.quantity, now).await? {
                    // the drawn lot was closed since the sale; newest sellable lot takes it
                    let fallback = lots.sellable(&line.product_id, &original.warehouse_id).await?.pop();
                    let restored = match &fallback {
                        Some(lot) => lots.adjust_remaining(&lot.id, restore.quantity, now).await?,
                        None => false,
                    };
                    if !restored {
                        return Err(ServiceError::conflict(format!(
                            "Lot {} consumed by {} is no longer sellable and no other lot can take the quantity back",
                            restore.lot_id, original.receipt_number
                        )));
                    }
                    warn!(
                        lot_id = %restore.lot_id,
                        into = ?fallback.as_ref().map(|l| l.batch_id.as_str()),
                        quantity = restore.quantity,
                        "Refund restored into another lot"
                    );
                }
                if !SaleRepository::new(&mut tx)
                    .add_restored(&restore.allocation_id, restore.quantity)
                    .await?
                {
                    return Err(ServiceError::conflict(format!(
                        "Allocation {} was already restored",
                        restore.allocation_id
                    )));
                }
            }

            let stock = StockAggregator::new(&mut tx)
                .recompute(&line.product_id, &original.warehouse_id, now)
                .await?;
            let row = NewStockTransaction {
                kind: TransactionKind::Return,
                quantity: line.quantity,
                lot_id: None,
                product_id: line.product_id.clone(),
                warehouse_id: original.warehouse_id.clone(),
                actor_id: principal.user_id.clone(),
                note: Some(request.reason.clone()),
            };
            Ledger::new(&mut tx).record(&row, Some(&stock.id), now).await?;
        }

        let total = plan.total();
        let profit = plan.profit();
        let method = request
            .method
            .or(original_payment.as_ref().map(|p| p.method))
            .unwrap_or(PaymentMethod::Cash);

        let mut payment = Payment {
            id: payment_id.clone(),
            kind: PaymentKind::Refund,
            method,
            amount_cents: total.cents(),
            receipt_id: None,
            created_by: principal.user_id.clone(),
            created_at: now,
        };
        let receipt = Receipt {
            id: refund_id.clone(),
            receipt_number: receipt_number(ReceiptKind::Refund, now, &refund_id),
            kind: ReceiptKind::Refund,
            payment_id: Some(payment_id.clone()),
            warehouse_id: original.warehouse_id.clone(),
            total_price_cents: total.cents(),
            profit_cents: profit.cents(),
            original_receipt_id: Some(original.id.clone()),
            reason: Some(request.reason.clone()),
            created_by: principal.user_id.clone(),
            created_at: now,
        };
        let lines: Vec<ReceiptLine> = plan
            .lines
            .iter()
            .enumerate()
            .map(|(idx, line)| ReceiptLine {
                id: new_id(),
                receipt_id: refund_id.clone(),
                line_no: idx as i64 + 1,
                product_id: line.product_id.clone(),
                barcode: line.barcode.clone(),
                product_name: line.product_name.clone(),
                quantity: line.quantity,
                unit_price_cents: line.unit_price_cents,
                subtotal_cents: line.subtotal.cents(),
                profit_cents: line.profit.cents(),
                original_line_id: Some(line.original_line_id.clone()),
            })
            .collect();

        let mut repo = SaleRepository::new(&mut tx);
        repo.insert_payment(&payment).await?;
        repo.insert_receipt(&receipt).await?;
        for line in &lines {
            repo.insert_line(line).await?;
        }
        repo.link_payment(&payment_id, &refund_id).await?;
        payment.receipt_id = Some(refund_id);

        tx.commit().await?;

        info!(
            refund_number = %receipt.receipt_number,
            original = %original.receipt_number,
            total_cents = receipt.total_price_cents,
            profit_cents = receipt.profit_cents,
            lines = lines.len(),
            actor = %principal.user_id,
            "Refund recorded"
        );
        Ok(ReceiptDetail {
            receipt,
            lines,
            payment: Some(payment),
        })
    }
}
