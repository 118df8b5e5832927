use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db_types::{Deposit, TxDetails};

/// Failures raised by a deposit feed. These are transient from the engine's point of view: the
/// orchestrator logs them and retries on the next cycle, and they never become invoice-state
/// changes.
#[derive(Debug, Clone, Error)]
pub enum AdapterError {
    #[error("The deposit source could not be reached: {0}")]
    Unreachable(String),
    #[error("The deposit source returned a malformed response: {0}")]
    MalformedResponse(String),
    #[error("The deposit source rejected the request: {0}")]
    Rejected(String),
}

/// A feed of incoming deposits for the shared receiving wallet, typically an exchange
/// deposit-history API.
#[allow(async_fn_in_trait)]
pub trait DepositSource {
    /// All deposits for the given currency on the given network since `since`, in the order the
    /// source returns them. That order is the matcher's tie-break, so implementations must not
    /// re-sort.
    async fn deposits(
        &self,
        currency: &str,
        network: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Deposit>, AdapterError>;

    /// The confirmation threshold the source applies before it considers a deposit final.
    async fn required_confirmations(&self, currency: &str, network: &str) -> Result<i64, AdapterError>;
}

/// Direct blockchain lookup, used when the exchange feed cannot see a transaction (manual
/// verification) or is unavailable (confirmation refresh fallback).
#[allow(async_fn_in_trait)]
pub trait TxVerifier {
    /// Returns `None` when the transaction is unknown to the chain; that is an answer, not an
    /// error.
    async fn verify_transaction(
        &self,
        tx_hash: &str,
        currency: &str,
        network: &str,
    ) -> Result<Option<TxDetails>, AdapterError>;
}
