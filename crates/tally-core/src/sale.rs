//! # Sales, Payments and Receipts
//!
//! The sale side exists so refunds have something to reverse: a sale
//! consumes lot quantity (FIFO by expiry), records a payment and a receipt,
//! and remembers which lots each receipt line drew from.
//!
//! ## Signs
//! Sale documents carry positive amounts. Refund documents mirror them with
//! negative amounts so that summing every receipt of a day gives net sales.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::lot::StockLot;
use crate::validation::{validate_line_count, validate_quantity, validate_reference};

// =============================================================================
// Payment
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentKind {
    Sale,
    Refund,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cash,
    Card,
    Transfer,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Payment {
    pub id: String,
    pub kind: PaymentKind,
    pub method: PaymentMethod,
    /// Signed: negative for refunds.
    pub amount_cents: i64,
    pub receipt_id: Option<String>,
    pub created_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Receipt
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReceiptKind {
    Sale,
    Refund,
}

impl ReceiptKind {
    fn prefix(&self) -> &'static str {
        match self {
            ReceiptKind::Sale => "RCP",
            ReceiptKind::Refund => "RFD",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Receipt {
    pub id: String,
    pub receipt_number: String,
    pub kind: ReceiptKind,
    pub payment_id: Option<String>,
    pub warehouse_id: String,
    pub total_price_cents: i64,
    pub profit_cents: i64,
    /// Set on refund receipts.
    pub original_receipt_id: Option<String>,
    pub reason: Option<String>,
    pub created_by: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ReceiptLine {
    pub id: String,
    pub receipt_id: String,
    pub line_no: i64,
    pub product_id: String,
    pub barcode: String,
    pub product_name: String,
    /// Always positive; the sign lives on the amounts.
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub subtotal_cents: i64,
    pub profit_cents: i64,
    /// Set on refund lines: the sale line being reversed.
    pub original_line_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReceiptDetail {
    #[serde(flatten)]
    pub receipt: Receipt,
    pub lines: Vec<ReceiptLine>,
    pub payment: Option<Payment>,
}

/// Human-facing receipt number, e.g. `RCP-20261016-3F2A9C1B`.
pub fn receipt_number(kind: ReceiptKind, now: DateTime<Utc>, id: &str) -> String {
    let tail: String = id
        .chars()
        .filter(|c| c.is_ascii_hexdigit())
        .take(8)
        .collect::<String>()
        .to_ascii_uppercase();
    format!("{}-{}-{}", kind.prefix(), now.format("%Y%m%d"), tail)
}

// =============================================================================
// Allocation
// =============================================================================

/// The lot quantity one sale line consumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleAllocation {
    pub id: String,
    pub receipt_line_id: String,
    pub lot_id: String,
    /// Consumption order within the line, starting at 1.
    pub allocation_no: i64,
    pub quantity: i64,
    /// Quantity already put back by refunds.
    pub restored_quantity: i64,
    pub unit_cost_cents: i64,
}

impl SaleAllocation {
    #[inline]
    pub fn restorable(&self) -> i64 {
        self.quantity - self.restored_quantity
    }
}

/// A planned draw on one lot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LotDraw {
    pub lot_id: String,
    pub quantity: i64,
    pub unit_cost_cents: i64,
}

/// Plans a FIFO draw of `quantity` from sellable lots: earliest expiry first
/// (lots without expiry last), then oldest.
pub fn plan_allocation(product: &str, lots: &[StockLot], quantity: i64) -> CoreResult<Vec<LotDraw>> {
    let mut sellable: Vec<&StockLot> = lots
        .iter()
        .filter(|l| l.is_active() && l.remaining_quantity > 0)
        .collect();
    let available: i64 = sellable.iter().map(|l| l.remaining_quantity).sum();
    if available < quantity {
        return Err(CoreError::InsufficientStock {
            product: product.to_string(),
            available,
            requested: quantity,
        });
    }

    sellable.sort_by_key(|l| (expiry_key(l.expiry_date), l.created_at));

    let mut left = quantity;
    let mut draws = Vec::new();
    for lot in sellable {
        if left == 0 {
            break;
        }
        let take = left.min(lot.remaining_quantity);
        draws.push(LotDraw {
            lot_id: lot.id.clone(),
            quantity: take,
            unit_cost_cents: lot.unit_cost_cents,
        });
        left -= take;
    }
    Ok(draws)
}

fn expiry_key(expiry: Option<NaiveDate>) -> NaiveDate {
    expiry.unwrap_or(NaiveDate::MAX)
}

// =============================================================================
// Input
// =============================================================================

/// A line is identified by barcode or product id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SaleLineInput {
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(default)]
    pub product_id: Option<String>,
    pub quantity: i64,
    /// Overrides the shelf price.
    #[serde(default)]
    pub unit_price_cents: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct NewSale {
    pub warehouse_id: String,
    pub method: PaymentMethod,
    pub lines: Vec<SaleLineInput>,
}

impl NewSale {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_reference("warehouse_id", &self.warehouse_id)?;
        validate_line_count("lines", self.lines.len())?;
        for line in &self.lines {
            if line.barcode.is_none() && line.product_id.is_none() {
                return Err(ValidationError::required("barcode or product_id"));
            }
            validate_quantity(line.quantity)?;
            if matches!(line.unit_price_cents, Some(p) if p < 0) {
                return Err(ValidationError::OutOfRange {
                    field: "unit price".to_string(),
                    min: 0,
                    max: i64::MAX,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lot::tests::lot_fixture;
    use crate::lot::LotState;
    use chrono::Duration;

    fn sellable(id: &str, remaining: i64, expiry: Option<NaiveDate>, age_days: i64) -> StockLot {
        let mut lot = lot_fixture(remaining);
        lot.id = id.to_string();
        lot.state = LotState::ReadyForSale;
        lot.remaining_quantity = remaining;
        lot.expiry_date = expiry;
        lot.created_at = Utc::now() - Duration::days(age_days);
        lot
    }

    #[test]
    fn test_fifo_by_expiry_then_age() {
        let d = |m, day| NaiveDate::from_ymd_opt(2027, m, day).unwrap();
        let lots = [
            sellable("no-expiry-old", 10, None, 30),
            sellable("late", 5, Some(d(6, 1)), 1),
            sellable("early", 3, Some(d(1, 1)), 2),
            sellable("late-older", 4, Some(d(6, 1)), 5),
        ];
        let draws = plan_allocation("A", &lots, 10).unwrap();
        let order: Vec<(&str, i64)> = draws.iter().map(|d| (d.lot_id.as_str(), d.quantity)).collect();
        assert_eq!(order, vec![("early", 3), ("late-older", 4), ("late", 3)]);
    }

    #[test]
    fn test_inactive_lots_are_not_drawn() {
        let mut closed = sellable("closed", 50, None, 1);
        closed.state = LotState::Closed;
        let lots = [closed, sellable("ok", 2, None, 1)];
        let err = plan_allocation("A", &lots, 3).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InsufficientStock { available: 2, requested: 3, .. }
        ));
    }

    #[test]
    fn test_receipt_number() {
        let now = Utc::now();
        let n = receipt_number(ReceiptKind::Refund, now, "3f2a9c1b-0000-4000-8000-000000000000");
        assert_eq!(n, format!("RFD-{}-3F2A9C1B", now.format("%Y%m%d")));
    }

    #[test]
    fn test_new_sale_validation() {
        let mut sale = NewSale {
            warehouse_id: "w".to_string(),
            method: PaymentMethod::Cash,
            lines: vec![SaleLineInput {
                barcode: Some("A".to_string()),
                product_id: None,
                quantity: 2,
                unit_price_cents: None,
            }],
        };
        assert!(sale.validate().is_ok());
        sale.lines[0].barcode = None;
        assert!(sale.validate().is_err());
    }
}
