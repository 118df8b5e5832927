use chrono::{DateTime, Utc};
use cpr_common::CoinAmount;
use deposit_clients::{DepositClientError, DepositRecord, ExchangeApi, ExplorerApi, TxRecord};
use reconciliation_engine::{
    db_types::{Deposit, TxDetails},
    AdapterError,
    DepositSource,
    TxVerifier,
};

/// The exchange deposit-history API as the engine's primary deposit feed.
#[derive(Clone)]
pub struct ExchangeDepositSource {
    api: ExchangeApi,
}

impl ExchangeDepositSource {
    pub fn new(api: ExchangeApi) -> Self {
        Self { api }
    }
}

impl DepositSource for ExchangeDepositSource {
    async fn deposits(
        &self,
        currency: &str,
        network: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Deposit>, AdapterError> {
        let records = self.api.get_deposits(currency, network, since).await.map_err(adapter_error)?;
        records.into_iter().map(into_deposit).collect()
    }

    async fn required_confirmations(&self, currency: &str, network: &str) -> Result<i64, AdapterError> {
        self.api.get_required_confirmations(currency, network).await.map_err(adapter_error)
    }
}

/// The blockchain explorer as the engine's verification fallback.
#[derive(Clone)]
pub struct ExplorerTxVerifier {
    api: ExplorerApi,
}

impl ExplorerTxVerifier {
    pub fn new(api: ExplorerApi) -> Self {
        Self { api }
    }
}

impl TxVerifier for ExplorerTxVerifier {
    async fn verify_transaction(
        &self,
        tx_hash: &str,
        currency: &str,
        network: &str,
    ) -> Result<Option<TxDetails>, AdapterError> {
        let record = self.api.get_transaction(tx_hash, currency, network).await.map_err(adapter_error)?;
        record.map(into_tx_details).transpose()
    }
}

fn into_deposit(record: DepositRecord) -> Result<Deposit, AdapterError> {
    let amount = record
        .amount
        .parse::<CoinAmount>()
        .map_err(|e| AdapterError::MalformedResponse(format!("deposit {}: {e}", record.tx_id)))?;
    Ok(Deposit {
        tx_hash: record.tx_id,
        amount,
        currency: record.currency,
        network: record.network,
        confirmations: record.confirmations,
        timestamp: record.timestamp,
    })
}

fn into_tx_details(record: TxRecord) -> Result<TxDetails, AdapterError> {
    let amount = record
        .amount
        .parse::<CoinAmount>()
        .map_err(|e| AdapterError::MalformedResponse(format!("tx {}: {e}", record.tx_hash)))?;
    Ok(TxDetails {
        tx_hash: record.tx_hash,
        amount,
        to_address: record.to_address,
        confirmations: record.confirmations,
        timestamp: record.timestamp,
    })
}

fn adapter_error(e: DepositClientError) -> AdapterError {
    match e {
        DepositClientError::QueryError { status, message } => AdapterError::Rejected(format!("{status}: {message}")),
        DepositClientError::JsonError(msg) => AdapterError::MalformedResponse(msg),
        e => AdapterError::Unreachable(e.to_string()),
    }
}
