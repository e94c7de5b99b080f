//! # Tally API
//!
//! HTTP front for the inbound-inventory engine.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                             Tally API                                   │
//! │                                                                         │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────────┐│
//! │  │ Purchase Orders│  │ Quality Control│  │ Sales & Refunds            ││
//! │  │                │  │                │  │                            ││
//! │  │ • create       │  │ • adjudicate   │  │ • record sale              ││
//! │  │ • submit       │  │ • qc-summary   │  │ • refund                   ││
//! │  │ • confirm      │  │ • delete record│  │                            ││
//! │  │ • cancel       │  │                │  │ Lots & Stock               ││
//! │  │ • return       │  │                │  │ • deactivate • get stock   ││
//! │  └────────────────┘  └────────────────┘  └────────────────────────────┘│
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  Caller extractor: Authorization: Bearer <jwt> -> Principal      │  │
//! │  │  tally-db services: one transaction per request                  │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration
//! Environment variables:
//! - `HTTP_PORT` - listen port (default: 8080)
//! - `DATABASE_PATH` - SQLite file (default: ./tally.db)
//! - `DB_MAX_CONNECTIONS` - pool size (default: 5)
//! - `JWT_SECRET` - HS256 secret for bearer tokens (required)
//! - `JWT_ISSUER` - expected `iss` claim (optional)
//! - `LOG_FORMAT` - `pretty` or `json` (default: pretty)
//! - `RUST_LOG` - tracing filter (default: info)

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use tally_core::IdentityProvider;
use tally_db::Database;

// Re-exports
pub use config::ApiConfig;
pub use error::{ApiError, ApiResponse};
pub use routes::router;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub identity: Arc<dyn IdentityProvider>,
}
