//! # tally-core: Pure Reconciliation Rules for Tally POS
//!
//! This crate holds the rules that keep purchase orders, lots, stock and the
//! ledger consistent, as pure functions with zero I/O dependencies. Every
//! transition is planned here and applied by `tally-db`.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally POS Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    tally-api (axum)                             │   │
//! │  │    bearer token ──► Principal ──► handler ──► JSON envelope     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    tally-db (services)                          │   │
//! │  │    one sqlx transaction per operation, repositories, ledger    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ plans                                  │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tally-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   batch   lot   qc   stock   ledger   purchase   sale   refund  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`batch`] - Batch identifier format and parsing
//! - [`lot`] - Lot lifecycle state machine
//! - [`qc`] - QC verdicts and the per-order rollup
//! - [`stock`] - Stock aggregate derivation
//! - [`ledger`] - Ledger row kinds
//! - [`purchase`] - Purchase orders and their status rollup
//! - [`sale`] - Payments, receipts, FIFO allocation
//! - [`refund`] - Refund planning with cumulative pro-rating
//! - [`auth`] - Principals and role checks
//! - [`money`] - Integer-cent money
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use tally_core::qc::{rollup, QcStatus};
//! use tally_core::purchase::{rollup_status, PoStatus};
//!
//! let verdict = rollup(&[QcStatus::Passed, QcStatus::Failed]);
//! assert_eq!(verdict, QcStatus::Partial);
//! assert_eq!(rollup_status(QcStatus::Pending, &[]), PoStatus::Received);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod auth;
pub mod batch;
pub mod error;
pub mod ledger;
pub mod lot;
pub mod money;
pub mod purchase;
pub mod qc;
pub mod refund;
pub mod sale;
pub mod stock;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use auth::{AuthError, IdentityProvider, Principal, Role};
pub use error::{CoreError, CoreResult, ValidationError};
pub use ledger::{NewStockTransaction, StockTransaction, TransactionKind};
pub use lot::{LotState, LotTransition, StockEffect, StockLot};
pub use money::Money;
pub use purchase::{PoStatus, PurchaseOrder, PurchaseOrderDetail, PurchaseOrderItem, ReturnHistoryEntry};
pub use qc::{NewQcRecord, QcQuantities, QcStatus, QualityControlRecord};
pub use sale::{Payment, PaymentKind, PaymentMethod, Receipt, ReceiptKind, ReceiptLine, SaleAllocation};
pub use stock::{Stock, StockStatus};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum lines on one purchase order, sale or refund.
pub const MAX_DOCUMENT_LINES: usize = 500;

/// Maximum length of reasons and notes.
pub const MAX_NOTE_LEN: usize = 1000;
