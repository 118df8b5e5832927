use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    db_types::{
        Invoice,
        InvoiceId,
        InvoiceStatus,
        NewPaymentTransaction,
        NewPollingEvent,
        PaymentStatus,
        PaymentTransaction,
    },
    traits::{
        data_objects::{PaymentConfirmation, Settlement},
        AdapterError,
        InvoiceManagement,
    },
};

/// This trait defines the highest level of behaviour for backends supporting the reconciliation
/// engine.
///
/// This behaviour includes:
/// * Idempotent creation of payment transactions from matched deposits, with the system-wide
///   `(tx_hash, network)` dedup invariant enforced at the storage layer.
/// * Guarded invoice status transitions.
/// * The transactional settlement recompute that turns confirmed payments into an invoice
///   outcome.
/// * The expiry and overdue sweeps, and the append-only polling audit log.
#[allow(async_fn_in_trait)]
pub trait ReconciliationDatabase: Clone + InvoiceManagement {
    /// The URL of the database
    fn url(&self) -> &str;

    /// True if a payment with this `(tx_hash, network)` exists anywhere in the system,
    /// regardless of which invoice it is linked to.
    async fn payment_exists(&self, tx_hash: &str, network: &str) -> Result<bool, ReconciliationError>;

    /// Stores a new payment transaction. Returns [`ReconciliationError::PaymentAlreadyExists`]
    /// when the `(tx_hash, network)` pair is already linked, which callers racing a concurrent
    /// poll cycle treat as a no-op.
    async fn insert_payment(&self, payment: NewPaymentTransaction)
        -> Result<PaymentTransaction, ReconciliationError>;

    /// All payments still short of their confirmation threshold (Pending or Detected), oldest
    /// first.
    async fn fetch_unconfirmed_payments(&self) -> Result<Vec<PaymentTransaction>, ReconciliationError>;

    /// Records a fresh confirmation count for the payment. Counts are monotonic; a lower count
    /// than the stored one is ignored in favour of the stored value.
    async fn update_payment_confirmations(
        &self,
        payment_id: i64,
        confirmations: i64,
        status: PaymentStatus,
    ) -> Result<PaymentTransaction, ReconciliationError>;

    /// Applies a status transition to the invoice, guarded by
    /// [`InvoiceStatus::can_transition`]. A transition to the current status is a no-op and
    /// returns the invoice unchanged.
    async fn update_invoice_status(
        &self,
        invoice_id: &InvoiceId,
        status: InvoiceStatus,
    ) -> Result<Invoice, ReconciliationError>;

    /// In a single atomic transaction: promotes the triggering payment to Confirmed (when
    /// given), sums all confirmed payments for the invoice, classifies the total against the
    /// tolerance band and persists the resulting status (setting `paid_at` on first entry into
    /// Paid/Overpaid).
    ///
    /// The recompute runs from scratch on every call, so repeated invocations with unchanged
    /// confirmed payments return the same settlement, and late-arriving payments reclassify the
    /// invoice correctly.
    async fn settle_invoice(
        &self,
        invoice_id: &InvoiceId,
        confirm_payment: Option<PaymentConfirmation>,
    ) -> Result<Settlement, ReconciliationError>;

    /// Transitions the invoice from Sent to Expired, if and only if it is still Sent. Returns
    /// `None` when no transition happened, so repeated calls after expiry are no-ops.
    async fn expire_invoice(&self, invoice_id: &InvoiceId) -> Result<Option<Invoice>, ReconciliationError>;

    /// Flags all Sent/PartiallyPaid invoices whose due date lies at or before `now` as Overdue.
    /// Returns the invoices that were flagged.
    async fn mark_overdue_invoices(&self, now: DateTime<Utc>) -> Result<Vec<Invoice>, ReconciliationError>;

    /// Appends a row to the polling audit log.
    async fn log_polling_event(&self, event: NewPollingEvent) -> Result<(), ReconciliationError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), ReconciliationError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum ReconciliationError {
    #[error("We have an internal database engine error (configuration/uptime etc.): {0}")]
    DatabaseError(String),
    #[error("The requested invoice {0} does not exist")]
    InvoiceNotFound(InvoiceId),
    #[error("Cannot insert payment, since it already exists with tx hash {0}")]
    PaymentAlreadyExists(String),
    #[error("The requested payment does not exist for tx hash {0}")]
    PaymentNotFound(String),
    #[error("The requested payment (internal id {0}) does not exist")]
    PaymentIdNotFound(i64),
    #[error("Illegal invoice status change from {from} to {to}")]
    InvalidStatusTransition { from: InvoiceStatus, to: InvoiceStatus },
    #[error("Malformed stored data: {0}")]
    DataError(String),
    #[error("{0}")]
    AdapterError(#[from] AdapterError),
}

impl From<sqlx::Error> for ReconciliationError {
    fn from(e: sqlx::Error) -> Self {
        ReconciliationError::DatabaseError(e.to_string())
    }
}
