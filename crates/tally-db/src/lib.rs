//! # tally-db: Database Layer and Services
//!
//! SQLite storage for the inbound-inventory engine and every operation that
//! changes it. Each public operation runs in exactly one sqlx transaction.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally POS Data Flow                              │
//! │                                                                         │
//! │  HTTP handler (POST /qc)                                                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     tally-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐   ┌────────────────┐   ┌───────────────┐   │   │
//! │  │   │   Services    │   │  Components    │   │ Repositories  │   │   │
//! │  │   │ (service/*)   │──►│ LotManager     │──►│ (repository/*)│   │   │
//! │  │   │ QcService     │   │ StockAggregator│   │ LotRepository │   │   │
//! │  │   │ RefundService │   │ Ledger         │   │ SaleRepository│   │   │
//! │  │   │ ...           │   │ BatchSequencer │   │ ...           │   │   │
//! │  │   └───────────────┘   └────────────────┘   └───────────────┘   │   │
//! │  │          │ pool.begin() ... commit()                            │   │
//! │  └──────────┼──────────────────────────────────────────────────────┘   │
//! │             ▼                                                           │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - SQL access per table family
//! - [`service`] - Transactional operations and their building blocks
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tally_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/tally.db")).await?;
//!
//! let detail = db.purchase_orders().confirm(&principal, &po_id).await?;
//! let outcome = db.qc().adjudicate(&principal, report).await?;
//! let stock = db.stock().get(&product_id, &warehouse_id).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod service;

#[cfg(test)]
pub(crate) mod test_support;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use service::{
    CatalogService, LotService, PurchaseOrderService, QcOutcome, QcService, RefundService,
    SaleService, ServiceError, ServiceResult, StockService,
};
