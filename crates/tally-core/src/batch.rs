//! # Batch Identifiers
//!
//! Lot identifiers of the form:
//!
//! ```text
//! LOT-20261016-WH01-ACME-00042-0007
//!     └──date──┘ └WH┘ └SP┘ └PRD5┘ └SEQ┘
//! ```
//!
//! The sequence belongs to the (warehouse, supplier, product) triple and
//! ignores the date: the first lot of a triple received tomorrow continues
//! from today's last sequence. Allocation of the next sequence is the
//! persistence layer's job (an atomic counter); this module only formats
//! and parses.

use chrono::NaiveDate;

use crate::error::ValidationError;

pub const BATCH_PREFIX: &str = "LOT";

/// Width of the product suffix.
pub const PRODUCT_SUFFIX_LEN: usize = 5;

/// Minimum width of the sequence (wider sequences are never truncated).
pub const SEQUENCE_WIDTH: usize = 4;

/// Stable five character suffix derived from a product's external code.
///
/// Keeps alphanumerics only, upper-cases, takes the last five and
/// left-pads with `0`.
///
/// ```rust
/// use tally_core::batch::product_suffix;
///
/// assert_eq!(product_suffix("sku-cola-330"), "LA330");
/// assert_eq!(product_suffix("42"), "00042");
/// ```
pub fn product_suffix(product_code: &str) -> String {
    let cleaned: Vec<char> = product_code
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    let start = cleaned.len().saturating_sub(PRODUCT_SUFFIX_LEN);
    let tail: String = cleaned[start..].iter().collect();
    format!("{:0>width$}", tail, width = PRODUCT_SUFFIX_LEN)
}

fn normalize_code(code: &str) -> String {
    code.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// The date-independent part of a batch identifier, used as the counter key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BatchKey {
    pub warehouse: String,
    pub supplier: String,
    pub product: String,
}

impl BatchKey {
    pub fn new(warehouse_code: &str, supplier_code: &str, product_code: &str) -> Result<Self, ValidationError> {
        let warehouse = normalize_code(warehouse_code);
        let supplier = normalize_code(supplier_code);
        if warehouse.is_empty() {
            return Err(ValidationError::required("warehouse code"));
        }
        if supplier.is_empty() {
            return Err(ValidationError::required("supplier code"));
        }
        if normalize_code(product_code).is_empty() {
            return Err(ValidationError::required("product code"));
        }
        Ok(BatchKey {
            warehouse,
            supplier,
            product: product_suffix(product_code),
        })
    }

    /// Formats the full identifier for `date` and `sequence`.
    pub fn format(&self, date: NaiveDate, sequence: i64) -> String {
        format!(
            "{}-{}-{}-{}-{}-{:0width$}",
            BATCH_PREFIX,
            date.format("%Y%m%d"),
            self.warehouse,
            self.supplier,
            self.product,
            sequence,
            width = SEQUENCE_WIDTH
        )
    }
}

/// A parsed batch identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedBatchId {
    pub date: NaiveDate,
    pub key: BatchKey,
    pub sequence: i64,
}

/// Parses an identifier produced by [`BatchKey::format`].
pub fn parse_batch_id(batch_id: &str) -> Result<ParsedBatchId, ValidationError> {
    let invalid = |reason: &str| ValidationError::InvalidFormat {
        field: "batch_id".to_string(),
        reason: reason.to_string(),
    };

    let parts: Vec<&str> = batch_id.split('-').collect();
    if parts.len() != 6 || parts[0] != BATCH_PREFIX {
        return Err(invalid("expected LOT-<date>-<WH>-<SP>-<PRODUCT5>-<SEQ>"));
    }
    let date = NaiveDate::parse_from_str(parts[1], "%Y%m%d").map_err(|_| invalid("bad date"))?;
    if parts[4].len() != PRODUCT_SUFFIX_LEN {
        return Err(invalid("product suffix must be 5 characters"));
    }
    if parts[5].len() < SEQUENCE_WIDTH || !parts[5].chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid("sequence must be at least 4 digits"));
    }
    let sequence = parts[5].parse::<i64>().map_err(|_| invalid("sequence overflow"))?;

    Ok(ParsedBatchId {
        date,
        key: BatchKey {
            warehouse: parts[2].to_string(),
            supplier: parts[3].to_string(),
            product: parts[4].to_string(),
        },
        sequence,
    })
}

/// Highest sequence among `existing` identifiers that belong to `key`,
/// whatever their date. Identifiers that do not parse are ignored.
///
/// Used once to seed a triple's counter from lots that predate it.
pub fn highest_sequence<'a, I>(key: &BatchKey, existing: I) -> i64
where
    I: IntoIterator<Item = &'a str>,
{
    existing
        .into_iter()
        .filter_map(|id| parse_batch_id(id).ok())
        .filter(|parsed| &parsed.key == key)
        .map(|parsed| parsed.sequence)
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_format() {
        let key = BatchKey::new("wh01", "acme", "P-00042").unwrap();
        assert_eq!(
            key.format(date(2026, 10, 16), 7),
            "LOT-20261016-WH01-ACME-00042-0007"
        );
    }

    #[test]
    fn test_wide_sequence_is_not_truncated() {
        let key = BatchKey::new("WH", "SP", "ABCDEFG").unwrap();
        assert_eq!(
            key.format(date(2026, 1, 2), 12345),
            "LOT-20260102-WH-SP-CDEFG-12345"
        );
    }

    #[test]
    fn test_parse_roundtrip_of_formatted_id() {
        let key = BatchKey::new("WH01", "ACME", "COLA330").unwrap();
        let parsed = parse_batch_id(&key.format(date(2026, 3, 1), 12)).unwrap();
        assert_eq!(parsed.key, key);
        assert_eq!(parsed.sequence, 12);
        assert_eq!(parsed.date, date(2026, 3, 1));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_batch_id("").is_err());
        assert!(parse_batch_id("LOT-2026-WH-SP-ABCDE-0001").is_err());
        assert!(parse_batch_id("BATCH-20260301-WH-SP-ABCDE-0001").is_err());
        assert!(parse_batch_id("LOT-20260301-WH-SP-ABC-0001").is_err());
        assert!(parse_batch_id("LOT-20260301-WH-SP-ABCDE-01").is_err());
    }

    #[test]
    fn test_highest_sequence_ignores_date_and_other_triples() {
        let key = BatchKey::new("WH01", "ACME", "00042").unwrap();
        let existing = [
            "LOT-20260101-WH01-ACME-00042-0003",
            "LOT-20260215-WH01-ACME-00042-0009",
            "LOT-20260301-WH01-OTHER-00042-0050",
            "LOT-20260301-WH02-ACME-00042-0070",
            "not-a-batch",
        ];
        assert_eq!(highest_sequence(&key, existing), 9);
    }

    #[test]
    fn test_missing_codes_rejected() {
        assert!(BatchKey::new("", "ACME", "X").is_err());
        assert!(BatchKey::new("WH", "--", "X").is_err());
        assert!(BatchKey::new("WH", "SP", "").is_err());
    }
}
