//! # Batch Sequencer
//!
//! Hands out batch identifiers inside the caller's transaction.
//!
//! ```text
//! BatchKey (WH, SP, PRODUCT5)
//!      │
//!      ├─ counter row exists? ──no──► seed = highest sequence among
//!      │                               existing ids of the triple
//!      ▼
//! INSERT .. ON CONFLICT DO UPDATE SET last_seq = last_seq + 1 RETURNING
//!      │
//!      ▼
//! LOT-<today>-WH-SP-PRODUCT5-<seq>   (skipped if a manual id already took it)
//! ```

use chrono::NaiveDate;
use sqlx::SqliteConnection;
use tracing::debug;

use crate::repository::{LotRepository, PurchaseOrderRepository};
use crate::service::error::ServiceResult;
use tally_core::batch::{highest_sequence, BatchKey};
use tally_core::{Product, Supplier, Warehouse};

pub struct BatchSequencer<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> BatchSequencer<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        BatchSequencer { conn }
    }

    /// Next free batch id for the triple, dated `date`.
    pub async fn next(
        &mut self,
        warehouse: &Warehouse,
        supplier: &Supplier,
        product: &Product,
        date: NaiveDate,
    ) -> ServiceResult<String> {
        let key = BatchKey::new(&warehouse.code, &supplier.code, &product.code)?;

        let seed = {
            let mut lots = LotRepository::new(&mut *self.conn);
            if lots.has_batch_counter(&key).await? {
                0
            } else {
                let existing = lots.batch_ids_for(&key).await?;
                highest_sequence(&key, existing.iter().map(String::as_str))
            }
        };

        loop {
            let sequence = LotRepository::new(&mut *self.conn)
                .next_batch_sequence(&key, seed)
                .await?;
            let batch_id = key.format(date, sequence);

            let taken = PurchaseOrderRepository::new(&mut *self.conn)
                .first_taken_batch_id(&[batch_id.as_str()])
                .await?;
            if taken.is_none() {
                debug!(batch_id = %batch_id, sequence, "Allocated batch id");
                return Ok(batch_id);
            }
            debug!(batch_id = %batch_id, "Batch id already used, advancing");
        }
    }
}
