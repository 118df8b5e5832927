//! Payment Detection & Reconciliation Engine
//!
//! Detects and reconciles cryptocurrency payments made against invoices whose deposit addresses
//! are shared across many invoices, so a payment can only be attributed by amount, not by
//! address. The engine is source-agnostic: deposit feeds and transaction verifiers are traits,
//! with HTTP implementations living in their own crates.
//!
//! The library is divided into three main sections:
//! 1. Database management and control ([`mod@sqlite`]). SQLite is the supported backend. You
//!    should never need to access the database directly; use the engine APIs instead. The
//!    exception is the data types used in the database, defined in the public `db_types` module.
//! 2. The engine public API ([`mod@rec_api`]): the amount-based matcher, the rate-lock resolver,
//!    the invoice lifecycle manager, the reconciliation engine and the polling orchestrator.
//!    Backends need to implement the traits in [`mod@traits`] to drive these flows.
//! 3. An event hook system ([`mod@events`]). Events are emitted after a successful state
//!    transition (a payment is detected or confirmed, an invoice settles short or over, an
//!    invoice expires). A simple actor framework lets collaborators subscribe; delivery is
//!    at-least-once and fire-and-forget, so a failing subscriber never rolls back a settlement.

pub mod db_types;
pub mod events;
pub mod helpers;
mod rec_api;
#[cfg(feature = "sqlite")]
mod sqlite;
pub mod traits;

pub use rec_api::{
    find_match,
    LifecycleApi,
    PollerConfig,
    PollingOrchestrator,
    PollingStatistics,
    QuotedRateResolver,
    RateResolver,
    ReconciliationApi,
    ResolvedAmount,
    VerificationError,
    VerificationResult,
};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use traits::{
    AdapterError,
    DepositSource,
    InvoiceManagement,
    ReconciliationDatabase,
    ReconciliationError,
    Settlement,
    TxVerifier,
};
