//! # Ledger
//!
//! Appends stock transactions, enforcing once-per-lot kinds twice: a read
//! first (the common case, no write attempted) and the partial unique index
//! behind `INSERT OR IGNORE` (the race).

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::debug;

use crate::repository::LedgerRepository;
use crate::service::error::ServiceResult;
use tally_core::NewStockTransaction;

pub struct Ledger<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> Ledger<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Ledger { conn }
    }

    /// Appends `row`. Returns the new row id, or `None` when a once-per-lot
    /// row for the same lot already exists.
    pub async fn record(
        &mut self,
        row: &NewStockTransaction,
        stock_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> ServiceResult<Option<String>> {
        let mut repo = LedgerRepository::new(&mut *self.conn);

        if let (true, Some(lot_id)) = (row.kind.is_once_per_lot(), row.lot_id.as_deref()) {
            if repo.exists_for_lot(lot_id, row.kind).await? {
                debug!(lot_id, kind = row.kind.as_str(), "Ledger row already present, skipping");
                return Ok(None);
            }
        }

        let id = repo.append(row, stock_id, now).await?;
        if id.is_none() {
            debug!(lot_id = ?row.lot_id, kind = row.kind.as_str(), "Ledger insert ignored by unique index");
        }
        Ok(id)
    }
}
