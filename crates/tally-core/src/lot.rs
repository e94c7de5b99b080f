//! # Lot Lifecycle
//!
//! A lot is the quantity of one product received on one purchase order line
//! under one batch identifier. Its lifecycle is a single state value; the
//! old "active / temporary / stocked / closed" flag soup is derived from it.
//!
//! ## State Machine
//! ```text
//!                      ┌──────── PASSED / PARTIAL ────────┐
//!                      │                                  ▼
//!   ┌────────────┐     │                          ┌────────────────┐
//!   │ PENDING_QC │─────┤                          │ READY_FOR_SALE │──┐
//!   └────────────┘     │                          └───────┬────────┘  │
//!                      │                                  │ FAILED    │ deactivate
//!                      │                                  │ (re-QC)   │
//!                      │                                  ▼           │
//!                      │     ┌──────────────────────────────┐        │
//!                      └────►│  REJECTED_AWAITING_RETURN    │        │
//!                    FAILED  └──────────────┬───────────────┘        │
//!                                           │ purchase return        │
//!                                           ▼                        │
//!                                      ┌────────┐                    │
//!                                      │ CLOSED │◄───────────────────┘
//!                                      └────────┘
//! ```
//!
//! Every planning function here is pure: it looks at a lot and returns what
//! should happen to it. The persistence layer applies the plan, writes the
//! ledger row and asks the stock aggregator to recompute.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::qc::QcStatus;
use crate::stock::StockStatus;

/// Lifecycle state of a lot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LotState {
    /// Received, waiting for inspection. Not counted.
    PendingQc,
    /// Passed (fully or partially) and counted toward on-hand stock.
    ReadyForSale,
    /// Failed inspection, waiting to go back to the supplier. Not counted.
    RejectedAwaitingReturn,
    /// Returned or deactivated. Terminal.
    Closed,
}

impl LotState {
    /// Counted toward on-hand stock.
    #[inline]
    pub fn is_active(&self) -> bool {
        matches!(self, LotState::ReadyForSale)
    }

    /// Not yet finalized.
    #[inline]
    pub fn is_temporary(&self) -> bool {
        matches!(self, LotState::PendingQc | LotState::RejectedAwaitingReturn)
    }
}

/// One batch of one product received under one purchase order line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockLot {
    pub id: String,
    pub batch_id: String,
    pub purchase_order_id: String,
    pub purchase_order_item_id: String,
    pub product_id: String,
    pub supplier_id: String,
    pub warehouse_id: String,
    pub quantity_received: i64,
    /// Sellable quantity left. Zero unless READY_FOR_SALE.
    pub remaining_quantity: i64,
    /// Quantity rejected by QC.
    pub failed_quantity: i64,
    pub unit_cost_cents: i64,
    #[ts(as = "Option<String>")]
    pub expiry_date: Option<NaiveDate>,
    pub state: LotState,
    pub qc_status: QcStatus,
    /// Set exactly once, when passed quantity was merged into stock.
    #[ts(as = "Option<String>")]
    pub stocked_at: Option<DateTime<Utc>>,
    pub closed_by: Option<String>,
    #[ts(as = "Option<String>")]
    pub closed_at: Option<DateTime<Utc>>,
    pub close_reason: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// What a transition does to the stock aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockEffect {
    /// No quantity enters or leaves stock.
    None,
    /// Passed quantity merged into stock (one RESTOCK row).
    Restock(i64),
    /// Previously counted quantity withdrawn after re-adjudication (one
    /// RETURN row).
    Withdraw(i64),
    /// Remaining quantity written off by manual deactivation (one
    /// LOT_DEACTIVATE row).
    Deactivate(i64),
}

/// Planned result of a lot transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LotTransition {
    pub state: LotState,
    pub qc_status: QcStatus,
    pub remaining_quantity: i64,
    pub failed_quantity: i64,
    pub effect: StockEffect,
    /// The transition merges quantity for the first time; `stocked_at` must
    /// be stamped.
    pub stocks: bool,
    /// The transition closes the lot; `closed_by/closed_at` must be stamped.
    pub closes: bool,
}

impl StockLot {
    #[inline]
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    #[inline]
    pub fn is_temporary(&self) -> bool {
        self.state.is_temporary()
    }

    #[inline]
    pub fn is_stocked(&self) -> bool {
        self.stocked_at.is_some()
    }

    /// Sale availability of this lot alone; `None` when it is not sellable.
    pub fn sale_status(&self, threshold: i64) -> Option<StockStatus> {
        self.is_active()
            .then(|| StockStatus::derive(self.remaining_quantity, threshold))
    }

    fn unchanged(&self, qc_status: QcStatus) -> LotTransition {
        LotTransition {
            state: self.state,
            qc_status,
            remaining_quantity: self.remaining_quantity,
            failed_quantity: self.failed_quantity,
            effect: StockEffect::None,
            stocks: false,
            closes: false,
        }
    }

    /// Plans the application of a QC verdict.
    ///
    /// `passed` is only read for PARTIAL verdicts.
    ///
    /// ## Stocked Guard
    /// A lot whose quantity was already merged is never merged again. A
    /// repeated PASSED/PARTIAL verdict only updates the QC status; a FAILED
    /// verdict withdraws what is still counted. Once withdrawn, the lot
    /// cannot be passed again.
    pub fn plan_verdict(&self, verdict: QcStatus, passed: i64) -> CoreResult<LotTransition> {
        if self.state == LotState::Closed {
            return Err(CoreError::invalid_state("Lot", &self.batch_id, self.state, "adjudicate"));
        }

        if verdict == QcStatus::Pending {
            let qc = if self.state == LotState::PendingQc {
                QcStatus::Pending
            } else {
                self.qc_status
            };
            return Ok(self.unchanged(qc));
        }

        if self.is_stocked() {
            return match (verdict, self.state) {
                (QcStatus::Failed, LotState::ReadyForSale) => Ok(LotTransition {
                    state: LotState::RejectedAwaitingReturn,
                    qc_status: QcStatus::Failed,
                    remaining_quantity: 0,
                    failed_quantity: self.quantity_received,
                    effect: if self.remaining_quantity > 0 {
                        StockEffect::Withdraw(self.remaining_quantity)
                    } else {
                        StockEffect::None
                    },
                    stocks: false,
                    closes: false,
                }),
                (QcStatus::Failed, _) => Ok(self.unchanged(QcStatus::Failed)),
                // withdrawn stock only leaves through a purchase return
                (_, LotState::RejectedAwaitingReturn) => Err(CoreError::invalid_state(
                    "Lot",
                    &self.batch_id,
                    self.state,
                    "re-admit withdrawn lot",
                )),
                _ => Ok(self.unchanged(verdict)),
            };
        }

        let received = self.quantity_received;
        let transition = match verdict {
            QcStatus::Passed => LotTransition {
                state: LotState::ReadyForSale,
                qc_status: QcStatus::Passed,
                remaining_quantity: received,
                failed_quantity: 0,
                effect: StockEffect::Restock(received),
                stocks: true,
                closes: false,
            },
            QcStatus::Partial => {
                if passed <= 0 || passed >= received {
                    return Err(ValidationError::OutOfRange {
                        field: "passed quantity".to_string(),
                        min: 1,
                        max: received - 1,
                    }
                    .into());
                }
                LotTransition {
                    state: LotState::ReadyForSale,
                    qc_status: QcStatus::Partial,
                    remaining_quantity: passed,
                    failed_quantity: received - passed,
                    effect: StockEffect::Restock(passed),
                    stocks: true,
                    closes: false,
                }
            }
            QcStatus::Failed => LotTransition {
                state: LotState::RejectedAwaitingReturn,
                qc_status: QcStatus::Failed,
                remaining_quantity: 0,
                failed_quantity: received,
                effect: StockEffect::None,
                stocks: false,
                closes: false,
            },
            QcStatus::Pending => self.unchanged(QcStatus::Pending),
        };
        Ok(transition)
    }

    /// Plans the purchase return of this lot's rejected quantity.
    ///
    /// FAILED and PARTIAL lots are both closed. Whatever a PARTIAL lot still
    /// counts toward stock is withdrawn with it.
    pub fn plan_purchase_return(&self) -> CoreResult<LotTransition> {
        match (self.qc_status, self.state) {
            (_, LotState::Closed) | (_, LotState::PendingQc) => Err(CoreError::invalid_state(
                "Lot",
                &self.batch_id,
                self.state,
                "return to supplier",
            )),
            (QcStatus::Failed, _) => Ok(LotTransition {
                state: LotState::Closed,
                qc_status: QcStatus::Failed,
                remaining_quantity: 0,
                failed_quantity: self.failed_quantity,
                effect: StockEffect::None,
                stocks: false,
                closes: true,
            }),
            (QcStatus::Partial, _) => Ok(LotTransition {
                state: LotState::Closed,
                qc_status: QcStatus::Partial,
                remaining_quantity: 0,
                failed_quantity: self.failed_quantity,
                effect: if self.remaining_quantity > 0 {
                    StockEffect::Withdraw(self.remaining_quantity)
                } else {
                    StockEffect::None
                },
                stocks: false,
                closes: true,
            }),
            (qc, _) => Err(CoreError::invalid_state(
                "Lot",
                &self.batch_id,
                qc,
                "return to supplier",
            )),
        }
    }

    /// Plans a manual write-off of damaged stock found after QC.
    ///
    /// A sold-out lot still gets its (zero) LOT_DEACTIVATE ledger row.
    pub fn plan_deactivation(&self) -> CoreResult<LotTransition> {
        if !self.is_active() {
            return Err(CoreError::invalid_state("Lot", &self.batch_id, self.state, "deactivate"));
        }
        Ok(LotTransition {
            state: LotState::Closed,
            qc_status: self.qc_status,
            remaining_quantity: 0,
            failed_quantity: self.failed_quantity,
            effect: StockEffect::Deactivate(self.remaining_quantity),
            stocks: false,
            closes: true,
        })
    }

    /// Applies a planned transition in memory, stamping audit fields.
    pub fn apply(&mut self, transition: &LotTransition, actor: &str, reason: Option<&str>, now: DateTime<Utc>) {
        self.state = transition.state;
        self.qc_status = transition.qc_status;
        self.remaining_quantity = transition.remaining_quantity;
        self.failed_quantity = transition.failed_quantity;
        if transition.stocks && self.stocked_at.is_none() {
            self.stocked_at = Some(now);
        }
        if transition.closes {
            self.closed_by = Some(actor.to_string());
            self.closed_at = Some(now);
            self.close_reason = reason.map(str::to_string);
        }
        self.updated_at = now;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn lot_fixture(received: i64) -> StockLot {
        let now = Utc::now();
        StockLot {
            id: "lot-1".to_string(),
            batch_id: "LOT-20261016-WH-SP-00001-0001".to_string(),
            purchase_order_id: "po-1".to_string(),
            purchase_order_item_id: "item-1".to_string(),
            product_id: "prod-1".to_string(),
            supplier_id: "sup-1".to_string(),
            warehouse_id: "wh-1".to_string(),
            quantity_received: received,
            remaining_quantity: 0,
            failed_quantity: 0,
            unit_cost_cents: 100,
            expiry_date: None,
            state: LotState::PendingQc,
            qc_status: QcStatus::Pending,
            stocked_at: None,
            closed_by: None,
            closed_at: None,
            close_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn applied(lot: &mut StockLot, t: &LotTransition) {
        lot.apply(t, "user-1", None, Utc::now());
    }

    #[test]
    fn test_pass_merges_full_quantity() {
        let lot = lot_fixture(100);
        let t = lot.plan_verdict(QcStatus::Passed, 0).unwrap();
        assert_eq!(t.state, LotState::ReadyForSale);
        assert_eq!(t.remaining_quantity, 100);
        assert_eq!(t.effect, StockEffect::Restock(100));
        assert!(t.stocks);
    }

    #[test]
    fn test_partial_splits_quantity() {
        let lot = lot_fixture(100);
        let t = lot.plan_verdict(QcStatus::Partial, 60).unwrap();
        assert_eq!(t.remaining_quantity, 60);
        assert_eq!(t.failed_quantity, 40);
        assert_eq!(t.effect, StockEffect::Restock(60));

        assert!(lot.plan_verdict(QcStatus::Partial, 0).is_err());
        assert!(lot.plan_verdict(QcStatus::Partial, 100).is_err());
    }

    #[test]
    fn test_fail_is_not_counted() {
        let mut lot = lot_fixture(50);
        let t = lot.plan_verdict(QcStatus::Failed, 0).unwrap();
        assert_eq!(t.effect, StockEffect::None);
        applied(&mut lot, &t);
        assert_eq!(lot.state, LotState::RejectedAwaitingReturn);
        assert!(!lot.is_active());
        assert!(lot.is_temporary());
        assert!(!lot.is_stocked());
    }

    #[test]
    fn test_stocked_lot_is_never_restocked() {
        let mut lot = lot_fixture(100);
        let first = lot.plan_verdict(QcStatus::Passed, 0).unwrap();
        applied(&mut lot, &first);
        assert!(lot.is_stocked());

        let again = lot.plan_verdict(QcStatus::Passed, 0).unwrap();
        assert_eq!(again.effect, StockEffect::None);
        assert!(!again.stocks);

        let partial = lot.plan_verdict(QcStatus::Partial, 10).unwrap();
        assert_eq!(partial.effect, StockEffect::None);
        assert_eq!(partial.qc_status, QcStatus::Partial);
        assert_eq!(partial.remaining_quantity, 100);
    }

    #[test]
    fn test_refail_withdraws_counted_quantity() {
        let mut lot = lot_fixture(100);
        let first = lot.plan_verdict(QcStatus::Passed, 0).unwrap();
        applied(&mut lot, &first);
        lot.remaining_quantity = 70; // 30 sold meanwhile

        let t = lot.plan_verdict(QcStatus::Failed, 0).unwrap();
        assert_eq!(t.effect, StockEffect::Withdraw(70));
        applied(&mut lot, &t);
        assert_eq!(lot.state, LotState::RejectedAwaitingReturn);

        // a second FAILED does nothing more
        let t = lot.plan_verdict(QcStatus::Failed, 0).unwrap();
        assert_eq!(t.effect, StockEffect::None);
    }

    #[test]
    fn test_withdrawn_lot_cannot_be_readmitted() {
        let mut lot = lot_fixture(10);
        let t = lot.plan_verdict(QcStatus::Passed, 0).unwrap();
        applied(&mut lot, &t);
        let t = lot.plan_verdict(QcStatus::Failed, 0).unwrap();
        applied(&mut lot, &t);
        assert_eq!(lot.state, LotState::RejectedAwaitingReturn);

        assert!(matches!(
            lot.plan_verdict(QcStatus::Passed, 0),
            Err(CoreError::InvalidState { .. })
        ));
        assert!(lot.plan_verdict(QcStatus::Partial, 5).is_err());
        assert_eq!(lot.plan_verdict(QcStatus::Pending, 0).unwrap().qc_status, QcStatus::Failed);
        assert!(lot.plan_purchase_return().unwrap().closes);
    }

    #[test]
    fn test_purchase_return() {
        let mut failed = lot_fixture(10);
        let t = failed.plan_verdict(QcStatus::Failed, 0).unwrap();
        applied(&mut failed, &t);
        let r = failed.plan_purchase_return().unwrap();
        assert!(r.closes);
        assert_eq!(r.state, LotState::Closed);
        failed.apply(&r, "user-2", Some("damaged"), Utc::now());
        assert_eq!(failed.closed_by.as_deref(), Some("user-2"));
        assert!(failed.plan_purchase_return().is_err());

        let mut partial = lot_fixture(10);
        let t = partial.plan_verdict(QcStatus::Partial, 7).unwrap();
        applied(&mut partial, &t);
        partial.remaining_quantity = 5; // 2 sold meanwhile
        let r = partial.plan_purchase_return().unwrap();
        assert_eq!(r.state, LotState::Closed);
        assert_eq!(r.qc_status, QcStatus::Partial);
        assert_eq!(r.remaining_quantity, 0);
        assert_eq!(r.failed_quantity, 3);
        assert_eq!(r.effect, StockEffect::Withdraw(5));
        assert!(r.closes);
        partial.apply(&r, "user-2", Some("short shelf life"), Utc::now());
        assert!(!partial.is_active());
        assert!(partial.closed_at.is_some());
        assert!(partial.plan_purchase_return().is_err());

        let mut passed = lot_fixture(10);
        let t = passed.plan_verdict(QcStatus::Passed, 0).unwrap();
        applied(&mut passed, &t);
        assert!(passed.plan_purchase_return().is_err());
        assert!(lot_fixture(10).plan_purchase_return().is_err());
    }

    #[test]
    fn test_deactivation_guard() {
        let mut lot = lot_fixture(20);
        assert!(lot.plan_deactivation().is_err());

        let t = lot.plan_verdict(QcStatus::Passed, 0).unwrap();
        applied(&mut lot, &t);
        let d = lot.plan_deactivation().unwrap();
        assert_eq!(d.effect, StockEffect::Deactivate(20));
        applied(&mut lot, &d);
        assert_eq!(lot.state, LotState::Closed);
        assert!(matches!(
            lot.plan_deactivation(),
            Err(CoreError::InvalidState { .. })
        ));
        assert!(lot.plan_verdict(QcStatus::Passed, 0).is_err());

        let mut sold_out = lot_fixture(20);
        let t = sold_out.plan_verdict(QcStatus::Passed, 0).unwrap();
        applied(&mut sold_out, &t);
        sold_out.remaining_quantity = 0;
        let d = sold_out.plan_deactivation().unwrap();
        assert_eq!(d.effect, StockEffect::Deactivate(0));
        assert!(d.closes);
    }

    #[test]
    fn test_sale_status() {
        let mut lot = lot_fixture(20);
        assert_eq!(lot.sale_status(5), None);
        let t = lot.plan_verdict(QcStatus::Passed, 0).unwrap();
        applied(&mut lot, &t);
        assert_eq!(lot.sale_status(5), Some(StockStatus::ReadyForSale));
        lot.remaining_quantity = 3;
        assert_eq!(lot.sale_status(5), Some(StockStatus::Low));
        lot.remaining_quantity = 0;
        assert_eq!(lot.sale_status(5), Some(StockStatus::SoldOut));
    }
}
