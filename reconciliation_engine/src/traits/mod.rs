//! # Interface contracts of the reconciliation engine.
//!
//! This module defines the behaviour that backends and deposit feeds need to expose in order to
//! drive the engine.
//!
//! * [`ReconciliationDatabase`] defines the write-side behaviour for persistence backends: the
//!   idempotent payment insert, the transactional settlement, the expiry/overdue sweeps and the
//!   polling audit log.
//! * [`InvoiceManagement`] provides the read-side queries for invoices, payments and the audit
//!   trail, plus the invoice insertion entry point used by the external invoicing workflow.
//! * [`DepositSource`] and [`TxVerifier`] are the two consumed deposit feeds: the exchange
//!   deposit-history API and the blockchain explorer fallback. HTTP implementations live
//!   outside this crate; the engine only sees these traits.

mod data_objects;
mod deposit_source;
mod invoice_management;
mod reconciliation_database;

pub use data_objects::{PaymentConfirmation, Settlement};
pub use deposit_source::{AdapterError, DepositSource, TxVerifier};
pub use invoice_management::InvoiceManagement;
pub use reconciliation_database::{ReconciliationDatabase, ReconciliationError};
