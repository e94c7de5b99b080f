//! # Repository Module
//!
//! Thin SQL access per table family. Repositories borrow a connection
//! rather than owning a pool, so a service can run several of them inside
//! one transaction:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  let mut tx = pool.begin().await?;                                      │
//! │                                                                         │
//! │  LotRepository::new(&mut tx).update(&lot).await?;      ─┐               │
//! │  LedgerRepository::new(&mut tx).append(&row).await?;    ├─ same tx      │
//! │  StockRepository::new(&mut tx).upsert(&stock).await?;  ─┘               │
//! │                                                                         │
//! │  tx.commit().await?;          (dropping tx instead rolls back)          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Repositories hold no rules. They never decide a state; they store what
//! the services (via `tally-core`) planned.
//!
//! ## Available Repositories
//!
//! - [`CatalogRepository`] - Products, suppliers, warehouses (read/insert)
//! - [`PurchaseOrderRepository`] - Orders, lines, return history
//! - [`LotRepository`] - Stock lots and batch counters
//! - [`QcRepository`] - Quality control records
//! - [`StockRepository`] - Stock aggregate rows
//! - [`LedgerRepository`] - Stock transactions
//! - [`SaleRepository`] - Payments, receipts, allocations

pub mod catalog;
pub mod ledger;
pub mod lot;
pub mod purchase_order;
pub mod qc;
pub mod sale;
pub mod stock;

pub use catalog::CatalogRepository;
pub use ledger::LedgerRepository;
pub use lot::LotRepository;
pub use purchase_order::PurchaseOrderRepository;
pub use qc::QcRepository;
pub use sale::SaleRepository;
pub use stock::StockRepository;
