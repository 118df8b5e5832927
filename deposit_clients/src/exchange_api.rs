use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
    Method,
};
use serde::{de::DeserializeOwned, Deserialize};

use crate::{
    config::ExchangeConfig,
    data_objects::{ConfirmationRequirement, DepositRecord},
    DepositClientError,
};

/// Client for the exchange deposit-history API. Deposits land on a shared custodial address,
/// so this feed is the primary source of candidate deposits for matching.
#[derive(Clone)]
pub struct ExchangeApi {
    config: ExchangeConfig,
    client: Arc<Client>,
}

impl ExchangeApi {
    pub fn new(config: ExchangeConfig) -> Result<Self, DepositClientError> {
        let mut headers = HeaderMap::with_capacity(2);
        let val = HeaderValue::from_str(config.api_key.reveal().as_str())
            .map_err(|e| DepositClientError::Initialization(e.to_string()))?;
        headers.insert("X-Api-Key", val);
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| DepositClientError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    pub async fn rest_query<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, DepositClientError> {
        let url = self.url(path);
        trace!("Sending REST query: {url}");
        let mut req = self.client.request(method, url);
        if !params.is_empty() {
            req = req.query(params);
        }
        let response = req.send().await.map_err(|e| DepositClientError::ResponseError(e.to_string()))?;
        if response.status().is_success() {
            trace!("REST query successful. {}", response.status());
            response.json::<T>().await.map_err(|e| DepositClientError::JsonError(e.to_string()))
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.map_err(|e| DepositClientError::ResponseError(e.to_string()))?;
            Err(DepositClientError::QueryError { status, message })
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/api/v1{path}", self.config.base_url)
    }

    /// All deposits for the currency/network since the given instant, in the order the
    /// exchange returns them.
    pub async fn get_deposits(
        &self,
        currency: &str,
        network: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<DepositRecord>, DepositClientError> {
        #[derive(Deserialize)]
        struct DepositsResponse {
            deposits: Vec<DepositRecord>,
        }
        let since = since.to_rfc3339_opts(SecondsFormat::Secs, true);
        debug!("Fetching {currency}/{network} deposits since {since}");
        let params = [("currency", currency), ("network", network), ("since", since.as_str())];
        let result = self.rest_query::<DepositsResponse>(Method::GET, "/deposits", &params).await?;
        debug!("Fetched {} {currency}/{network} deposit(s)", result.deposits.len());
        Ok(result.deposits)
    }

    /// The number of confirmations the exchange requires before it treats a deposit as final.
    pub async fn get_required_confirmations(
        &self,
        currency: &str,
        network: &str,
    ) -> Result<i64, DepositClientError> {
        let params = [("currency", currency), ("network", network)];
        let result =
            self.rest_query::<ConfirmationRequirement>(Method::GET, "/deposits/confirmations", &params).await?;
        Ok(result.required_confirmations)
    }
}
