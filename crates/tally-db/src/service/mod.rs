//! # Services
//!
//! Every public operation of the reconciliation engine lives here. Each one
//! checks the caller's role, validates its input, then runs in exactly one
//! transaction.
//!
//! ## Layers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Pool-level services (public, one tx per call)                          │
//! │    PurchaseOrderService  QcService  LotService  StockService            │
//! │    SaleService  RefundService  CatalogService                           │
//! │                     │                                                   │
//! │                     ▼  borrow the open transaction                      │
//! │  Connection-level components (crate-internal building blocks)           │
//! │    BatchSequencer  LotManager  StockAggregator  Ledger                  │
//! │                     │                                                   │
//! │                     ▼                                                   │
//! │  Repositories (SQL only)                                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The components take `&mut SqliteConnection` and never open their own
//! transaction, so one operation composes them freely and commits once.

pub mod batch;
pub mod catalog;
pub mod error;
pub mod ledger;
pub mod lot;
pub mod purchase_order;
pub mod qc;
pub mod refund;
pub mod sale;
pub mod stock;

pub use batch::BatchSequencer;
pub use catalog::CatalogService;
pub use error::{ServiceError, ServiceResult};
pub use ledger::Ledger;
pub use lot::{LotManager, LotService};
pub use purchase_order::PurchaseOrderService;
pub use qc::{QcOutcome, QcService};
pub use refund::RefundService;
pub use sale::SaleService;
pub use stock::{StockAggregator, StockService};
