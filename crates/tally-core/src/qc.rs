//! # Quality Control
//!
//! QC verdicts, inspection records and the rollup of line verdicts into a
//! purchase order verdict.
//!
//! ## Rollup Rule
//! ```text
//! line verdicts                        PO verdict
//! ─────────────────────────────────    ──────────
//! all PASSED                           PASSED
//! all FAILED                           FAILED
//! some PENDING, no FAILED/PARTIAL      PENDING
//! some PENDING, some FAILED/PARTIAL    PARTIAL
//! any other mix                        PARTIAL
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::validation::{validate_note, validate_reference};

/// Inspection outcome for a batch, a PO line or a whole PO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QcStatus {
    Pending,
    Passed,
    Failed,
    Partial,
}

impl Default for QcStatus {
    fn default() -> Self {
        QcStatus::Pending
    }
}

impl QcStatus {
    /// FAILED and PARTIAL lots carry rejected quantity that goes back to the
    /// supplier.
    pub fn is_returnable(&self) -> bool {
        matches!(self, QcStatus::Failed | QcStatus::Partial)
    }
}

/// Quantities reported by an inspector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct QcQuantities {
    pub total: i64,
    pub passed: i64,
    pub failed: i64,
}

impl QcQuantities {
    /// Validates the quantities against the verdict and the lot's received
    /// quantity.
    pub fn validate(&self, verdict: QcStatus, received: i64) -> Result<(), ValidationError> {
        if self.total <= 0 {
            return Err(ValidationError::must_be_positive("total quantity"));
        }
        if self.passed < 0 || self.failed < 0 {
            return Err(ValidationError::OutOfRange {
                field: "passed/failed quantity".to_string(),
                min: 0,
                max: self.total,
            });
        }
        if self.passed + self.failed != self.total {
            return Err(ValidationError::inconsistent(
                "quantities",
                format!(
                    "passed {} + failed {} must equal total {}",
                    self.passed, self.failed, self.total
                ),
            ));
        }
        if self.total != received {
            return Err(ValidationError::inconsistent(
                "total quantity",
                format!("lot received {}, inspection reports {}", received, self.total),
            ));
        }
        match verdict {
            QcStatus::Passed if self.failed != 0 => Err(ValidationError::inconsistent(
                "verdict",
                "PASSED cannot have failed quantity",
            )),
            QcStatus::Failed if self.passed != 0 => Err(ValidationError::inconsistent(
                "verdict",
                "FAILED cannot have passed quantity",
            )),
            QcStatus::Partial if self.passed == 0 || self.failed == 0 => {
                Err(ValidationError::inconsistent(
                    "verdict",
                    "PARTIAL needs both passed and failed quantity",
                ))
            }
            _ => Ok(()),
        }
    }
}

/// One inspection of one batch. Never updated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct QualityControlRecord {
    pub id: String,
    pub batch_id: String,
    pub purchase_order_id: Option<String>,
    pub product_id: String,
    pub supplier_id: String,
    pub warehouse_id: String,
    pub verdict: QcStatus,
    pub total_quantity: i64,
    pub passed_quantity: i64,
    pub failed_quantity: i64,
    /// Photo / document references, stored elsewhere.
    pub attachments: Vec<String>,
    pub inspector_id: String,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// An inspector's report on one batch. The inspector is the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct NewQcRecord {
    pub batch_id: String,
    pub product_id: String,
    pub supplier_id: String,
    pub warehouse_id: String,
    pub verdict: QcStatus,
    pub total_quantity: i64,
    pub passed_quantity: i64,
    pub failed_quantity: i64,
    #[serde(default)]
    pub attachments: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewQcRecord {
    pub fn quantities(&self) -> QcQuantities {
        QcQuantities {
            total: self.total_quantity,
            passed: self.passed_quantity,
            failed: self.failed_quantity,
        }
    }

    /// Shape checks; quantities are checked against the lot later.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_reference("batch_id", &self.batch_id)?;
        validate_reference("product_id", &self.product_id)?;
        validate_reference("supplier_id", &self.supplier_id)?;
        validate_reference("warehouse_id", &self.warehouse_id)?;
        if let Some(notes) = &self.notes {
            validate_note("notes", notes)?;
        }
        if self.attachments.iter().any(|a| a.trim().is_empty()) {
            return Err(ValidationError::required("attachment url"));
        }
        Ok(())
    }

    /// Builds the immutable record for `inspector_id`.
    pub fn into_record(self, inspector_id: &str, purchase_order_id: Option<String>) -> QualityControlRecord {
        QualityControlRecord {
            id: crate::types::new_id(),
            batch_id: self.batch_id,
            purchase_order_id,
            product_id: self.product_id,
            supplier_id: self.supplier_id,
            warehouse_id: self.warehouse_id,
            verdict: self.verdict,
            total_quantity: self.total_quantity,
            passed_quantity: self.passed_quantity,
            failed_quantity: self.failed_quantity,
            attachments: self.attachments,
            inspector_id: inspector_id.to_string(),
            notes: self.notes,
            created_at: Utc::now(),
        }
    }
}

/// Rolls line verdicts up into a PO verdict.
///
/// An empty slice counts as all PENDING.
pub fn rollup(statuses: &[QcStatus]) -> QcStatus {
    let count = |s: QcStatus| statuses.iter().filter(|x| **x == s).count();
    let pending = count(QcStatus::Pending);
    let passed = count(QcStatus::Passed);
    let failed = count(QcStatus::Failed);
    let partial = count(QcStatus::Partial);

    if statuses.is_empty() || pending == statuses.len() {
        return QcStatus::Pending;
    }
    if pending > 0 {
        return if failed + partial > 0 {
            QcStatus::Partial
        } else {
            QcStatus::Pending
        };
    }
    if passed == statuses.len() {
        QcStatus::Passed
    } else if failed == statuses.len() {
        QcStatus::Failed
    } else {
        QcStatus::Partial
    }
}

/// Explicit summary request: like [`rollup`] but refuses to report when
/// nothing has been adjudicated.
pub fn summarize(po_number: &str, statuses: &[QcStatus]) -> CoreResult<QcStatus> {
    if statuses.iter().all(|s| *s == QcStatus::Pending) {
        return Err(CoreError::NothingAdjudicated(po_number.to_string()));
    }
    Ok(rollup(statuses))
}

#[cfg(test)]
mod tests {
    use super::QcStatus::*;
    use super::*;

    #[test]
    fn test_rollup_table() {
        assert_eq!(rollup(&[Passed, Passed, Passed]), Passed);
        assert_eq!(rollup(&[Passed, Failed, Pending]), Partial);
        assert_eq!(rollup(&[Failed, Failed, Failed]), Failed);
        assert_eq!(rollup(&[Passed, Pending]), Pending);
        assert_eq!(rollup(&[Failed, Pending]), Partial);
        assert_eq!(rollup(&[Partial, Partial]), Partial);
        assert_eq!(rollup(&[Passed, Failed]), Partial);
        assert_eq!(rollup(&[Pending, Pending]), Pending);
        assert_eq!(rollup(&[]), Pending);
    }

    #[test]
    fn test_summarize_rejects_nothing_adjudicated() {
        let err = summarize("PO-7", &[Pending, Pending]).unwrap_err();
        assert!(matches!(err, CoreError::NothingAdjudicated(ref n) if n == "PO-7"));
        assert_eq!(summarize("PO-7", &[Passed, Pending]).unwrap(), Pending);
    }

    #[test]
    fn test_quantities_validation() {
        let ok = QcQuantities { total: 100, passed: 60, failed: 40 };
        assert!(ok.validate(Partial, 100).is_ok());
        assert!(ok.validate(Passed, 100).is_err());
        assert!(ok.validate(Partial, 90).is_err());

        let bad_sum = QcQuantities { total: 100, passed: 60, failed: 30 };
        assert!(bad_sum.validate(Partial, 100).is_err());

        let all_pass = QcQuantities { total: 10, passed: 10, failed: 0 };
        assert!(all_pass.validate(Passed, 10).is_ok());
        assert!(all_pass.validate(Partial, 10).is_err());

        let zero = QcQuantities { total: 0, passed: 0, failed: 0 };
        assert!(zero.validate(Pending, 0).is_err());
    }
}
