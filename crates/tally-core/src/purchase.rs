//! # Purchase Orders
//!
//! Purchase order documents and the one status rollup every path uses.
//!
//! ## Lifecycle
//! ```text
//!  DRAFT ──submit──► PENDING ──confirm──► RECEIVED ──QC──► PASSED
//!    │                  │                                  AWAITING_RETURN ─┐
//!    └──cancel──────────┴──► CANCELLED                     PARTIAL ─────────┤ return
//!                                                                           ▼
//!                                                     PARTIALLY_RETURNED / RETURNED
//! ```
//!
//! After confirmation the status is never set by hand: [`rollup_status`]
//! derives it from the rolled-up QC verdict and which returnable lines have
//! gone back to the supplier.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::qc::QcStatus;
use crate::validation::{
    validate_distinct, validate_document_number, validate_line_count, validate_note,
    validate_quantity, validate_reference, validate_unit_cost,
};

// =============================================================================
// Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PoStatus {
    Draft,
    Pending,
    Received,
    Passed,
    AwaitingReturn,
    Partial,
    Returned,
    PartiallyReturned,
    Cancelled,
}

impl PoStatus {
    /// Lots exist and the status follows the QC rollup.
    pub fn is_received(&self) -> bool {
        !matches!(self, PoStatus::Draft | PoStatus::Pending | PoStatus::Cancelled)
    }

    pub fn can_cancel(&self) -> bool {
        matches!(self, PoStatus::Draft | PoStatus::Pending)
    }

    pub fn can_return(&self) -> bool {
        matches!(
            self,
            PoStatus::AwaitingReturn | PoStatus::Partial | PoStatus::PartiallyReturned
        )
    }
}

// =============================================================================
// Documents
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PurchaseOrder {
    pub id: String,
    pub po_number: String,
    pub supplier_id: String,
    pub warehouse_id: String,
    pub status: PoStatus,
    /// Rollup of the line QC statuses.
    pub qc_status: QcStatus,
    pub total_amount_cents: i64,
    pub total_returned_cents: i64,
    pub total_after_return_cents: i64,
    pub notes: Option<String>,
    pub created_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    pub received_by: Option<String>,
    #[ts(as = "Option<String>")]
    pub received_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PurchaseOrderItem {
    pub id: String,
    pub purchase_order_id: String,
    pub line_no: i64,
    pub product_id: String,
    pub quantity: i64,
    pub unit_cost_cents: i64,
    pub line_total_cents: i64,
    /// Assigned at creation when supplied, otherwise at confirmation.
    pub batch_id: Option<String>,
    #[ts(as = "Option<String>")]
    pub expiry_date: Option<NaiveDate>,
    pub qc_status: QcStatus,
    /// Failed quantity flagged for return to the supplier.
    pub returned_quantity: i64,
    #[ts(as = "Option<String>")]
    pub returned_at: Option<DateTime<Utc>>,
}

impl PurchaseOrderItem {
    /// QC rejected some of this line and it has not gone back yet.
    pub fn is_pending_return(&self) -> bool {
        self.qc_status.is_returnable() && self.returned_at.is_none() && self.returned_quantity > 0
    }

    /// Value of the flagged quantity at this line's unit cost.
    pub fn return_value(&self) -> Money {
        Money::from_cents(self.unit_cost_cents).multiply_quantity(self.returned_quantity)
    }
}

/// One line sent back to the supplier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ReturnHistoryEntry {
    pub id: String,
    pub purchase_order_id: String,
    pub item_id: String,
    pub product_id: String,
    pub batch_id: Option<String>,
    pub quantity: i64,
    pub value_cents: i64,
    pub reason: String,
    pub returned_by: String,
    #[ts(as = "String")]
    pub returned_at: DateTime<Utc>,
}

/// An order with its lines and return history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PurchaseOrderDetail {
    #[serde(flatten)]
    pub order: PurchaseOrder,
    pub items: Vec<PurchaseOrderItem>,
    pub return_history: Vec<ReturnHistoryEntry>,
}

// =============================================================================
// Input
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct NewPurchaseOrderItem {
    pub product_id: String,
    pub quantity: i64,
    pub unit_cost_cents: i64,
    #[serde(default)]
    pub batch_id: Option<String>,
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub expiry_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct NewPurchaseOrder {
    pub po_number: String,
    pub supplier_id: String,
    pub warehouse_id: String,
    /// Create directly in PENDING instead of DRAFT.
    #[serde(default)]
    pub submit: bool,
    #[serde(default)]
    pub notes: Option<String>,
    pub items: Vec<NewPurchaseOrderItem>,
}

impl NewPurchaseOrder {
    /// Shape checks that need no database. Catalog references and
    /// uniqueness are checked by the service.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_document_number("po number", &self.po_number)?;
        validate_reference("supplier_id", &self.supplier_id)?;
        validate_reference("warehouse_id", &self.warehouse_id)?;
        if let Some(notes) = &self.notes {
            validate_note("notes", notes)?;
        }
        validate_line_count("items", self.items.len())?;
        for item in &self.items {
            validate_reference("product_id", &item.product_id)?;
            validate_quantity(item.quantity)?;
            validate_unit_cost(item.unit_cost_cents)?;
            if let Some(batch) = &item.batch_id {
                validate_reference("batch_id", batch)?;
            }
        }
        validate_distinct(
            "batch_id",
            self.items.iter().filter_map(|i| i.batch_id.as_deref()),
        )?;
        Ok(())
    }

    pub fn total(&self) -> Money {
        self.items
            .iter()
            .map(|i| line_total(i.quantity, i.unit_cost_cents))
            .sum()
    }

    pub fn initial_status(&self) -> PoStatus {
        if self.submit {
            PoStatus::Pending
        } else {
            PoStatus::Draft
        }
    }
}

#[inline]
pub fn line_total(quantity: i64, unit_cost_cents: i64) -> Money {
    Money::from_cents(unit_cost_cents).multiply_quantity(quantity)
}

// =============================================================================
// Rollup
// =============================================================================

/// Derives a received order's status from its QC verdict and lines.
///
/// | verdict | returnable lines returned | status |
/// |---|---|---|
/// | PENDING | any | RECEIVED |
/// | PASSED / FAILED / PARTIAL | none | PASSED / AWAITING_RETURN / PARTIAL |
/// | any adjudicated | some | PARTIALLY_RETURNED |
/// | any adjudicated | all | RETURNED |
pub fn rollup_status(verdict: QcStatus, items: &[PurchaseOrderItem]) -> PoStatus {
    if verdict == QcStatus::Pending {
        return PoStatus::Received;
    }
    let returnable: Vec<&PurchaseOrderItem> = items
        .iter()
        .filter(|i| i.qc_status.is_returnable() && i.returned_quantity > 0)
        .collect();
    let returned = returnable.iter().filter(|i| i.returned_at.is_some()).count();

    if returned == 0 {
        match verdict {
            QcStatus::Passed => PoStatus::Passed,
            QcStatus::Failed => PoStatus::AwaitingReturn,
            _ => PoStatus::Partial,
        }
    } else if returned < returnable.len() {
        PoStatus::PartiallyReturned
    } else {
        PoStatus::Returned
    }
}

/// Order totals after returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoTotals {
    pub total: Money,
    pub returned: Money,
    pub after_return: Money,
}

pub fn totals(items: &[PurchaseOrderItem], history: &[ReturnHistoryEntry]) -> PoTotals {
    let total: Money = items
        .iter()
        .map(|i| Money::from_cents(i.line_total_cents))
        .sum();
    let returned: Money = history
        .iter()
        .map(|h| Money::from_cents(h.value_cents))
        .sum();
    PoTotals {
        total,
        returned,
        after_return: total - returned,
    }
}

// =============================================================================
// Guards
// =============================================================================

impl PurchaseOrder {
    fn guard(&self, allowed: bool, operation: &str) -> CoreResult<()> {
        if allowed {
            Ok(())
        } else {
            Err(CoreError::invalid_state(
                "Purchase order",
                &self.po_number,
                self.status,
                operation,
            ))
        }
    }

    pub fn ensure_can_submit(&self) -> CoreResult<()> {
        self.guard(self.status == PoStatus::Draft, "submit")
    }

    pub fn ensure_can_confirm(&self) -> CoreResult<()> {
        self.guard(self.status == PoStatus::Pending, "confirm")
    }

    pub fn ensure_can_cancel(&self) -> CoreResult<()> {
        self.guard(self.status.can_cancel(), "cancel")
    }

    pub fn ensure_can_return(&self) -> CoreResult<()> {
        self.guard(self.status.can_return(), "return to supplier")
    }

    pub fn ensure_received(&self, operation: &str) -> CoreResult<()> {
        self.guard(self.status.is_received(), operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(qc: QcStatus, returned: bool) -> PurchaseOrderItem {
        PurchaseOrderItem {
            id: crate::types::new_id(),
            purchase_order_id: "po-1".to_string(),
            line_no: 1,
            product_id: "p-1".to_string(),
            quantity: 10,
            unit_cost_cents: 150,
            line_total_cents: 1500,
            batch_id: None,
            expiry_date: None,
            qc_status: qc,
            returned_quantity: if qc.is_returnable() { 4 } else { 0 },
            returned_at: returned.then(Utc::now),
        }
    }

    fn order(status: PoStatus) -> PurchaseOrder {
        let now = Utc::now();
        PurchaseOrder {
            id: "po-1".to_string(),
            po_number: "PO-1".to_string(),
            supplier_id: "s".to_string(),
            warehouse_id: "w".to_string(),
            status,
            qc_status: QcStatus::Pending,
            total_amount_cents: 0,
            total_returned_cents: 0,
            total_after_return_cents: 0,
            notes: None,
            created_by: "u".to_string(),
            created_at: now,
            received_by: None,
            received_at: None,
            updated_at: now,
        }
    }

    #[test]
    fn test_rollup_status() {
        use QcStatus::*;
        let pending = [item(Pending, false)];
        assert_eq!(rollup_status(Pending, &pending), PoStatus::Received);

        let passed = [item(Passed, false), item(Passed, false)];
        assert_eq!(rollup_status(Passed, &passed), PoStatus::Passed);

        let failed = [item(Failed, false), item(Failed, false)];
        assert_eq!(rollup_status(Failed, &failed), PoStatus::AwaitingReturn);

        let mixed = [item(Passed, false), item(Partial, false)];
        assert_eq!(rollup_status(Partial, &mixed), PoStatus::Partial);

        let some = [item(Failed, true), item(Partial, false), item(Passed, false)];
        assert_eq!(rollup_status(Partial, &some), PoStatus::PartiallyReturned);

        let all = [item(Failed, true), item(Partial, true), item(Passed, false)];
        assert_eq!(rollup_status(Partial, &all), PoStatus::Returned);
    }

    #[test]
    fn test_guards() {
        assert!(order(PoStatus::Draft).ensure_can_cancel().is_ok());
        assert!(order(PoStatus::Pending).ensure_can_cancel().is_ok());
        for status in [PoStatus::Received, PoStatus::Passed, PoStatus::Returned] {
            assert!(matches!(
                order(status).ensure_can_cancel(),
                Err(CoreError::InvalidState { .. })
            ));
        }
        assert!(order(PoStatus::Pending).ensure_can_confirm().is_ok());
        assert!(order(PoStatus::Received).ensure_can_confirm().is_err());
        assert!(order(PoStatus::Draft).ensure_can_submit().is_ok());
        assert!(order(PoStatus::Partial).ensure_can_return().is_ok());
        assert!(order(PoStatus::Passed).ensure_can_return().is_err());
    }

    #[test]
    fn test_totals() {
        let items = [item(QcStatus::Failed, true), item(QcStatus::Passed, false)];
        let history = [ReturnHistoryEntry {
            id: "h".to_string(),
            purchase_order_id: "po-1".to_string(),
            item_id: items[0].id.clone(),
            product_id: "p-1".to_string(),
            batch_id: None,
            quantity: 4,
            value_cents: items[0].return_value().cents(),
            reason: "damaged".to_string(),
            returned_by: "u".to_string(),
            returned_at: Utc::now(),
        }];
        let t = totals(&items, &history);
        assert_eq!(t.total.cents(), 3000);
        assert_eq!(t.returned.cents(), 600);
        assert_eq!(t.after_return.cents(), 2400);
    }

    #[test]
    fn test_new_order_validation() {
        let mut input = NewPurchaseOrder {
            po_number: "PO-2026-01".to_string(),
            supplier_id: "s".to_string(),
            warehouse_id: "w".to_string(),
            submit: true,
            notes: None,
            items: vec![NewPurchaseOrderItem {
                product_id: "p".to_string(),
                quantity: 3,
                unit_cost_cents: 200,
                batch_id: Some("B1".to_string()),
                expiry_date: None,
            }],
        };
        assert!(input.validate().is_ok());
        assert_eq!(input.total().cents(), 600);
        assert_eq!(input.initial_status(), PoStatus::Pending);

        input.items.push(input.items[0].clone());
        assert!(input.validate().is_err(), "duplicate batch id");

        input.items[1].batch_id = None;
        input.items[1].quantity = 0;
        assert!(input.validate().is_err());

        input.items.clear();
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_input_is_camel_case() {
        let json = r#"{"poNumber":"PO-9","supplierId":"s","warehouseId":"w",
            "items":[{"productId":"p","quantity":1,"unitCostCents":5}]}"#;
        let input: NewPurchaseOrder = serde_json::from_str(json).unwrap();
        assert!(!input.submit);
        assert_eq!(input.initial_status(), PoStatus::Draft);
    }
}
