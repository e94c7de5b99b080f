//! # Refund Planning
//!
//! Works out what a refund gives back before anything is written: which sale
//! lines, how much of each, the negated subtotal and profit, and which lot
//! allocations the quantity flows back into.
//!
//! ## Pro-rating
//! Partial refunds are pro-rated in integer cents *cumulatively*: the n-th
//! refund of a line is `prorate(already + q) - prorate(already)`. The parts
//! of a line refunded in several steps therefore always sum to exactly the
//! line's subtotal, and a single full-line refund negates it exactly.
//!
//! ```text
//! sale line: qty 3, subtotal 1000
//!   refund 1 ─► -(333 - 0)    = -333
//!   refund 1 ─► -(667 - 333)  = -334
//!   refund 1 ─► -(1000 - 667) = -333      Σ = -1000
//! ```

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::sale::{PaymentMethod, ReceiptLine, SaleAllocation};
use crate::validation::{validate_note, validate_quantity, validate_reference};

// =============================================================================
// Request
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct RefundLineRequest {
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(default)]
    pub product_id: Option<String>,
    pub quantity: i64,
}

impl RefundLineRequest {
    fn key(&self) -> &str {
        self.barcode
            .as_deref()
            .or(self.product_id.as_deref())
            .unwrap_or_default()
    }

    fn matches(&self, line: &ReceiptLine) -> bool {
        match (&self.barcode, &self.product_id) {
            (Some(barcode), _) => &line.barcode == barcode,
            (None, Some(product)) => &line.product_id == product,
            (None, None) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct RefundRequest {
    /// Receipt id, receipt number or payment id of the original sale.
    pub sale_ref: String,
    pub reason: String,
    /// Absent means everything still refundable.
    #[serde(default)]
    pub lines: Option<Vec<RefundLineRequest>>,
    /// Defaults to the original payment's method.
    #[serde(default)]
    pub method: Option<PaymentMethod>,
}

impl RefundRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_reference("sale reference", &self.sale_ref)?;
        validate_note("reason", &self.reason)?;
        if let Some(lines) = &self.lines {
            if lines.is_empty() {
                return Err(ValidationError::required("lines"));
            }
            for line in lines {
                if line.barcode.is_none() && line.product_id.is_none() {
                    return Err(ValidationError::required("barcode or product_id"));
                }
                validate_quantity(line.quantity)?;
            }
        }
        Ok(())
    }
}

// =============================================================================
// Plan
// =============================================================================

/// One refund receipt line, amounts already negated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundLinePlan {
    pub original_line_id: String,
    pub product_id: String,
    pub barcode: String,
    pub product_name: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub subtotal: Money,
    pub profit: Money,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundPlan {
    pub lines: Vec<RefundLinePlan>,
}

impl RefundPlan {
    /// Negative refund total.
    pub fn total(&self) -> Money {
        self.lines.iter().map(|l| l.subtotal).sum()
    }

    /// Negative refunded profit.
    pub fn profit(&self) -> Money {
        self.lines.iter().map(|l| l.profit).sum()
    }
}

/// Plans a refund of `requested` lines (or everything left) of a sale.
///
/// `refunded` maps sale line id to the quantity earlier refunds already
/// gave back.
pub fn plan_refund(
    receipt_number: &str,
    sale_lines: &[ReceiptLine],
    refunded: &HashMap<String, i64>,
    requested: Option<&[RefundLineRequest]>,
) -> CoreResult<RefundPlan> {
    let remaining = |line: &ReceiptLine| line.quantity - refunded.get(&line.id).copied().unwrap_or(0);

    // sale line index -> quantity to refund now
    let mut take: BTreeMap<usize, i64> = BTreeMap::new();

    match requested {
        None => {
            for (idx, line) in sale_lines.iter().enumerate() {
                let left = remaining(line);
                if left > 0 {
                    take.insert(idx, left);
                }
            }
        }
        Some(requests) => {
            for request in requests {
                let matching: Vec<usize> = sale_lines
                    .iter()
                    .enumerate()
                    .filter(|(_, line)| request.matches(line))
                    .map(|(idx, _)| idx)
                    .collect();
                if matching.is_empty() {
                    return Err(CoreError::not_found(
                        format!("Line on receipt {}", receipt_number),
                        request.key(),
                    ));
                }

                let available: i64 = matching
                    .iter()
                    .map(|idx| remaining(&sale_lines[*idx]) - take.get(idx).copied().unwrap_or(0))
                    .sum();
                if request.quantity > available {
                    return Err(CoreError::RefundExceedsRemaining {
                        item: request.key().to_string(),
                        requested: request.quantity,
                        remaining: available,
                    });
                }

                let mut left = request.quantity;
                for idx in matching {
                    if left == 0 {
                        break;
                    }
                    let planned = take.entry(idx).or_insert(0);
                    let free = remaining(&sale_lines[idx]) - *planned;
                    let now = left.min(free);
                    *planned += now;
                    left -= now;
                }
            }
        }
    }

    take.retain(|_, q| *q > 0);
    if take.is_empty() {
        return Err(CoreError::NothingToRefund(receipt_number.to_string()));
    }

    let lines = take
        .into_iter()
        .map(|(idx, quantity)| {
            let line = &sale_lines[idx];
            let already = refunded.get(&line.id).copied().unwrap_or(0);
            let share = |amount: i64| {
                let amount = Money::from_cents(amount);
                amount.prorate(already + quantity, line.quantity) - amount.prorate(already, line.quantity)
            };
            RefundLinePlan {
                original_line_id: line.id.clone(),
                product_id: line.product_id.clone(),
                barcode: line.barcode.clone(),
                product_name: line.product_name.clone(),
                quantity,
                unit_price_cents: line.unit_price_cents,
                subtotal: -share(line.subtotal_cents),
                profit: -share(line.profit_cents),
            }
        })
        .collect();

    Ok(RefundPlan { lines })
}

/// A planned put-back into one allocation's lot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Restore {
    pub allocation_id: String,
    pub lot_id: String,
    pub quantity: i64,
}

/// Spreads `quantity` back over a sale line's allocations, most recent
/// draw first.
pub fn plan_restore(allocations: &[SaleAllocation], quantity: i64) -> CoreResult<Vec<Restore>> {
    let mut ordered: Vec<&SaleAllocation> = allocations.iter().filter(|a| a.restorable() > 0).collect();
    ordered.sort_by_key(|a| std::cmp::Reverse(a.allocation_no));

    let restorable: i64 = ordered.iter().map(|a| a.restorable()).sum();
    if restorable < quantity {
        let item = allocations
            .first()
            .map(|a| a.receipt_line_id.clone())
            .unwrap_or_default();
        return Err(CoreError::RefundExceedsRemaining {
            item,
            requested: quantity,
            remaining: restorable,
        });
    }

    let mut left = quantity;
    let mut restores = Vec::new();
    for allocation in ordered {
        if left == 0 {
            break;
        }
        let now = left.min(allocation.restorable());
        restores.push(Restore {
            allocation_id: allocation.id.clone(),
            lot_id: allocation.lot_id.clone(),
            quantity: now,
        });
        left -= now;
    }
    Ok(restores)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(id: &str, barcode: &str, qty: i64, subtotal: i64, profit: i64) -> ReceiptLine {
        ReceiptLine {
            id: id.to_string(),
            receipt_id: "r-1".to_string(),
            line_no: 1,
            product_id: format!("prod-{}", barcode),
            barcode: barcode.to_string(),
            product_name: barcode.to_string(),
            quantity: qty,
            unit_price_cents: subtotal / qty,
            subtotal_cents: subtotal,
            profit_cents: profit,
            original_line_id: None,
        }
    }

    fn req(barcode: &str, quantity: i64) -> RefundLineRequest {
        RefundLineRequest {
            barcode: Some(barcode.to_string()),
            product_id: None,
            quantity,
        }
    }

    #[test]
    fn test_full_line_refund_negates_exactly() {
        let lines = [line("l1", "A", 2, 200, 50), line("l2", "B", 1, 99, 10)];
        let plan = plan_refund("RCP-1", &lines, &HashMap::new(), Some(&[req("A", 2)])).unwrap();
        assert_eq!(plan.lines.len(), 1);
        assert_eq!(plan.total().cents(), -200);
        assert_eq!(plan.profit().cents(), -50);
        assert_eq!(plan.lines[0].original_line_id, "l1");
    }

    #[test]
    fn test_everything_left_when_no_lines_given() {
        let lines = [line("l1", "A", 2, 200, 50), line("l2", "B", 1, 99, 10)];
        let refunded = HashMap::from([("l1".to_string(), 1)]);
        let plan = plan_refund("RCP-1", &lines, &refunded, None).unwrap();
        assert_eq!(plan.lines.len(), 2);
        assert_eq!(plan.lines[0].quantity, 1);
        assert_eq!(plan.total().cents(), -(100 + 99));
    }

    #[test]
    fn test_cumulative_prorate_sums_to_line() {
        let lines = [line("l1", "A", 3, 1000, 100)];
        let mut refunded = HashMap::new();
        let mut total = 0;
        let mut profit = 0;
        for _ in 0..3 {
            let plan = plan_refund("RCP-1", &lines, &refunded, Some(&[req("A", 1)])).unwrap();
            total += plan.total().cents();
            profit += plan.profit().cents();
            *refunded.entry("l1".to_string()).or_insert(0) += 1;
        }
        assert_eq!(total, -1000);
        assert_eq!(profit, -100);
    }

    #[test]
    fn test_over_refund_is_rejected() {
        let lines = [line("l1", "A", 2, 200, 50)];
        let refunded = HashMap::from([("l1".to_string(), 1)]);
        let err = plan_refund("RCP-1", &lines, &refunded, Some(&[req("A", 2)])).unwrap_err();
        assert!(matches!(
            err,
            CoreError::RefundExceedsRemaining { requested: 2, remaining: 1, .. }
        ));

        let twice = [req("A", 1), req("A", 1)];
        assert!(plan_refund("RCP-1", &lines, &refunded, Some(&twice)).is_err());
    }

    #[test]
    fn test_unknown_barcode_and_exhausted_receipt() {
        let lines = [line("l1", "A", 1, 100, 10)];
        let err = plan_refund("RCP-1", &lines, &HashMap::new(), Some(&[req("Z", 1)])).unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));

        let refunded = HashMap::from([("l1".to_string(), 1)]);
        let err = plan_refund("RCP-1", &lines, &refunded, None).unwrap_err();
        assert!(matches!(err, CoreError::NothingToRefund(_)));
    }

    #[test]
    fn test_restore_latest_allocation_first() {
        let alloc = |id: &str, no, qty, restored| SaleAllocation {
            id: id.to_string(),
            receipt_line_id: "l1".to_string(),
            lot_id: format!("lot-{}", id),
            allocation_no: no,
            quantity: qty,
            restored_quantity: restored,
            unit_cost_cents: 50,
        };
        let allocations = [alloc("a", 1, 3, 0), alloc("b", 2, 2, 1)];
        let restores = plan_restore(&allocations, 3).unwrap();
        let got: Vec<(&str, i64)> = restores
            .iter()
            .map(|r| (r.allocation_id.as_str(), r.quantity))
            .collect();
        assert_eq!(got, vec![("b", 1), ("a", 2)]);

        assert!(plan_restore(&allocations, 5).is_err());
    }
}
