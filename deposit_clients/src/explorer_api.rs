use std::sync::Arc;

use log::*;
use reqwest::Client;

use crate::{config::ExplorerConfig, data_objects::TxRecord, DepositClientError};

/// Client for the blockchain explorer API. The fallback path when the exchange feed cannot see
/// a transaction, and the only path for manual verification of transactions sent outside the
/// exchange's visibility.
#[derive(Clone)]
pub struct ExplorerApi {
    config: ExplorerConfig,
    client: Arc<Client>,
}

impl ExplorerApi {
    pub fn new(config: ExplorerConfig) -> Result<Self, DepositClientError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DepositClientError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/api/v1{path}", self.config.base_url)
    }

    /// Looks the transaction up on chain. An unknown transaction is `Ok(None)`: absence is an
    /// answer, not an error.
    pub async fn get_transaction(
        &self,
        tx_hash: &str,
        currency: &str,
        network: &str,
    ) -> Result<Option<TxRecord>, DepositClientError> {
        let url = self.url(&format!("/tx/{tx_hash}"));
        trace!("Sending REST query: {url}");
        let response = self
            .client
            .get(url)
            .query(&[("currency", currency), ("network", network)])
            .send()
            .await
            .map_err(|e| DepositClientError::ResponseError(e.to_string()))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            debug!("Transaction {tx_hash} is not known to the explorer");
            return Ok(None);
        }
        if response.status().is_success() {
            let tx = response.json::<TxRecord>().await.map_err(|e| DepositClientError::JsonError(e.to_string()))?;
            debug!("Transaction {tx_hash} found with {} confirmation(s)", tx.confirmations);
            Ok(Some(tx))
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.map_err(|e| DepositClientError::ResponseError(e.to_string()))?;
            Err(DepositClientError::QueryError { status, message })
        }
    }
}
