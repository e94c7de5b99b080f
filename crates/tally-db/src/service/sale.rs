//! # Sale Service
//!
//! Rings up a sale against READY_FOR_SALE lots.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  for each line                                                          │
//! │    product by barcode / id                                              │
//! │    plan_allocation (FIFO: earliest expiry, then oldest lot)             │
//! │    lot.remaining -= draw        (guarded: READY_FOR_SALE, never < 0)    │
//! │    StockAggregator::recompute                                           │
//! │    one SALE ledger row per draw                                         │
//! │                                                                         │
//! │  payment ──► receipt ──► lines ──► allocations ──► link payment         │
//! │  commit                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Line profit is the subtotal minus the cost of the lots actually drawn.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::repository::{CatalogRepository, LotRepository, SaleRepository};
use crate::service::error::{ServiceError, ServiceResult};
use crate::service::ledger::Ledger;
use crate::service::stock::StockAggregator;
use tally_core::auth::roles;
use tally_core::sale::{plan_allocation, receipt_number, NewSale, ReceiptDetail};
use tally_core::{
    new_id, Money, NewStockTransaction, Payment, PaymentKind, Principal, Receipt, ReceiptKind,
    ReceiptLine, SaleAllocation, TransactionKind, ValidationError,
};

#[derive(Debug, Clone)]
pub struct SaleService {
    pool: SqlitePool,
}

impl SaleService {
    pub fn new(pool: SqlitePool) -> Self {
        SaleService { pool }
    }

    pub async fn record_sale(&self, principal: &Principal, input: NewSale) -> ServiceResult<ReceiptDetail> {
        principal.require(roles::SALES, "record sale")?;
        input.validate()?;

        let mut tx = self.pool.begin().await?;
        if CatalogRepository::new(&mut tx).warehouse(&input.warehouse_id).await?.is_none() {
            return Err(ValidationError::inconsistent(
                "warehouse_id",
                format!("unknown warehouse {}", input.warehouse_id),
            )
            .into());
        }

        let now = Utc::now();
        let receipt_id = new_id();
        let payment_id = new_id();
        let number = receipt_number(ReceiptKind::Sale, now, &receipt_id);
        debug!(receipt_number = %number, lines = input.lines.len(), "Recording sale");

        let mut lines = Vec::with_capacity(input.lines.len());
        let mut allocations = Vec::new();

        for (idx, requested) in input.lines.iter().enumerate() {
            let key = requested
                .barcode
                .as_deref()
                .or(requested.product_id.as_deref())
                .unwrap_or_default();
            let product = CatalogRepository::new(&mut tx)
                .product_by_barcode_or_id(key)
                .await?
                .ok_or_else(|| {
                    ServiceError::from(ValidationError::inconsistent("product", format!("unknown product {}", key)))
                })?;

            let lots = LotRepository::new(&mut tx)
                .sellable(&product.id, &input.warehouse_id)
                .await?;
            let draws = plan_allocation(&product.barcode, &lots, requested.quantity)?;

            let line_id = new_id();
            let mut cost = Money::zero();
            for (draw_no, draw) in draws.iter().enumerate() {
                if !LotRepository::new(&mut tx)
                    .adjust_remaining(&draw.lot_id, -draw.quantity, now)
                    .await?
                {
                    return Err(ServiceError::conflict(format!(
                        "Lot {} changed while selling {}",
                        draw.lot_id, product.barcode
                    )));
                }
                cost += Money::from_cents(draw.unit_cost_cents).multiply_quantity(draw.quantity);
                allocations.push(SaleAllocation {
                    id: new_id(),
                    receipt_line_id: line_id.clone(),
                    lot_id: draw.lot_id.clone(),
                    allocation_no: draw_no as i64 + 1,
                    quantity: draw.quantity,
                    restored_quantity: 0,
                    unit_cost_cents: draw.unit_cost_cents,
                });
            }

            let stock = StockAggregator::new(&mut tx)
                .recompute(&product.id, &input.warehouse_id, now)
                .await?;
            for draw in &draws {
                let row = NewStockTransaction {
                    kind: TransactionKind::Sale,
                    quantity: -draw.quantity,
                    lot_id: Some(draw.lot_id.clone()),
                    product_id: product.id.clone(),
                    warehouse_id: input.warehouse_id.clone(),
                    actor_id: principal.user_id.clone(),
                    note: Some(number.clone()),
                };
                Ledger::new(&mut tx).record(&row, Some(&stock.id), now).await?;
            }

            let unit_price = requested.unit_price_cents.unwrap_or(product.price_cents);
            let subtotal = Money::from_cents(unit_price).multiply_quantity(requested.quantity);
            lines.push(ReceiptLine {
                id: line_id,
                receipt_id: receipt_id.clone(),
                line_no: idx as i64 + 1,
                product_id: product.id.clone(),
                barcode: product.barcode.clone(),
                product_name: product.name.clone(),
                quantity: requested.quantity,
                unit_price_cents: unit_price,
                subtotal_cents: subtotal.cents(),
                profit_cents: (subtotal - cost).cents(),
                original_line_id: None,
            });
        }

        let total: i64 = lines.iter().map(|l| l.subtotal_cents).sum();
        let profit: i64 = lines.iter().map(|l| l.profit_cents).sum();

        let mut payment = Payment {
            id: payment_id.clone(),
            kind: PaymentKind::Sale,
            method: input.method,
            amount_cents: total,
            receipt_id: None,
            created_by: principal.user_id.clone(),
            created_at: now,
        };
        let receipt = Receipt {
            id: receipt_id.clone(),
            receipt_number: number,
            kind: ReceiptKind::Sale,
            payment_id: Some(payment_id.clone()),
            warehouse_id: input.warehouse_id.clone(),
            total_price_cents: total,
            profit_cents: profit,
            original_receipt_id: None,
            reason: None,
            created_by: principal.user_id.clone(),
            created_at: now,
        };

        let mut repo = SaleRepository::new(&mut tx);
        repo.insert_payment(&payment).await?;
        repo.insert_receipt(&receipt).await?;
        for line in &lines {
            repo.insert_line(line).await?;
        }
        for allocation in &allocations {
            repo.insert_allocation(allocation).await?;
        }
        repo.link_payment(&payment_id, &receipt_id).await?;
        payment.receipt_id = Some(receipt_id);

        tx.commit().await?;

        info!(
            receipt_number = %receipt.receipt_number,
            total_cents = total,
            profit_cents = profit,
            lines = lines.len(),
            cashier = %principal.user_id,
            "Sale recorded"
        );
        Ok(ReceiptDetail {
            receipt,
            lines,
            payment: Some(payment),
        })
    }

    /// A receipt by id, number or payment id, with its lines and payment.
    pub async fn receipt(&self, reference: &str) -> ServiceResult<ReceiptDetail> {
        let mut conn = self.pool.acquire().await?;
        let mut repo = SaleRepository::new(&mut conn);
        let receipt = repo
            .resolve_receipt(reference)
            .await?
            .ok_or_else(|| ServiceError::not_found("Receipt", reference))?;
        let lines = repo.lines(&receipt.id).await?;
        let payment = match &receipt.payment_id {
            Some(id) => repo.payment(id).await?,
            None => None,
        };
        Ok(ReceiptDetail {
            receipt,
            lines,
            payment,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{fixture, Fixture};
    use tally_core::sale::SaleLineInput;
    use tally_core::{PaymentMethod, QcStatus, StockStatus};

    fn sale(fx: &Fixture, lines: &[(&str, i64)]) -> NewSale {
        NewSale {
            warehouse_id: fx.warehouse.id.clone(),
            method: PaymentMethod::Card,
            lines: lines
                .iter()
                .map(|(barcode, quantity)| SaleLineInput {
                    barcode: Some(barcode.to_string()),
                    product_id: None,
                    quantity: *quantity,
                    unit_price_cents: None,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_sale_draws_fifo_and_books_profit() {
        let fx = fixture().await;
        let (_, lots) = fx
            .receive("PO-5001", &[(&fx.product_a, 10, 60), (&fx.product_a, 10, 80)])
            .await;
        fx.adjudicate(&lots[0], QcStatus::Passed, 10, 0).await;
        fx.adjudicate(&lots[1], QcStatus::Passed, 10, 0).await;

        let detail = fx
            .db
            .sales()
            .record_sale(&fx.cashier, sale(&fx, &[("A", 15)]))
            .await
            .unwrap();

        // 10 @ 60 from the older lot, 5 @ 80 from the newer one
        assert_eq!(detail.receipt.total_price_cents, 1500);
        assert_eq!(detail.receipt.profit_cents, 1500 - (10 * 60 + 5 * 80));
        assert!(detail.receipt.receipt_number.starts_with("RCP-"));
        assert_eq!(detail.lines.len(), 1);
        assert_eq!(detail.lines[0].barcode, "A");

        let payment = detail.payment.unwrap();
        assert_eq!(payment.amount_cents, 1500);
        assert_eq!(payment.receipt_id.as_deref(), Some(detail.receipt.id.as_str()));

        assert_eq!(fx.db.lots().get(&lots[0].id).await.unwrap().remaining_quantity, 0);
        assert_eq!(fx.db.lots().get(&lots[1].id).await.unwrap().remaining_quantity, 5);

        let stock = fx.db.stock().get(&fx.product_a.id, &fx.warehouse.id).await.unwrap();
        assert_eq!((stock.total_quantity, stock.status), (5, StockStatus::Low));
        fx.assert_conserved(&fx.product_a).await;

        let stored = fx.db.sales().receipt(&detail.receipt.receipt_number).await.unwrap();
        assert_eq!(stored.receipt.id, detail.receipt.id);
        assert_eq!(stored.lines.len(), 1);
    }

    #[tokio::test]
    async fn test_insufficient_stock_conflicts() {
        let fx = fixture().await;
        let (_, lots) = fx.receive("PO-5002", &[(&fx.product_a, 3, 75)]).await;
        fx.adjudicate(&lots[0], QcStatus::Passed, 3, 0).await;

        let err = fx
            .db
            .sales()
            .record_sale(&fx.cashier, sale(&fx, &[("A", 4)]))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
        assert_eq!(fx.stock_total(&fx.product_a).await, 3);
    }

    #[tokio::test]
    async fn test_pending_lots_are_not_sellable() {
        let fx = fixture().await;
        fx.receive("PO-5003", &[(&fx.product_a, 3, 75)]).await;

        let err = fx
            .db
            .sales()
            .record_sale(&fx.cashier, sale(&fx, &[("A", 1)]))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_unknown_barcode_is_rejected() {
        let fx = fixture().await;
        let err = fx
            .db
            .sales()
            .record_sale(&fx.cashier, sale(&fx, &[("ZZZ", 1)]))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let denied = fx
            .db
            .sales()
            .record_sale(&fx.inspector, sale(&fx, &[("A", 1)]))
            .await
            .unwrap_err();
        assert!(matches!(denied, ServiceError::Unauthorized(_)));
    }
}
