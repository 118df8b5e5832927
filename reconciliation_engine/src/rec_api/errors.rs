use cpr_common::CoinAmount;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    db_types::{InvoiceId, PaymentTransaction},
    traits::{AdapterError, ReconciliationError, Settlement},
};

/// Manual verification fails closed: every variant here is returned before anything has been
/// written, with the single exception of `Backend` errors raised by the final insert/settle,
/// which roll back their own transaction.
#[derive(Debug, Clone, Error)]
pub enum VerificationError {
    #[error("The requested invoice {0} does not exist")]
    InvoiceNotFound(InvoiceId),
    #[error("Transaction {0} was found neither on the exchange nor on chain")]
    TransactionNotFound(String),
    #[error("Transaction {0} is already linked to an invoice")]
    DuplicateTransaction(String),
    #[error("The transaction pays {actual}, not the invoice's deposit address {expected}")]
    AddressMismatch { expected: String, actual: String },
    #[error("Amount {received} lies outside the tolerance band [{lower}, {upper}] for invoice {invoice_id}")]
    AmountOutOfTolerance { invoice_id: InvoiceId, received: CoinAmount, lower: CoinAmount, upper: CoinAmount },
    #[error("The deposit source failed: {0}")]
    Adapter(#[from] AdapterError),
    #[error("{0}")]
    Backend(#[from] ReconciliationError),
}

/// The outcome of a successful manual verification: the payment that was created and the
/// settlement it triggered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    pub payment: PaymentTransaction,
    pub settlement: Settlement,
}
