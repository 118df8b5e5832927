use std::time::Duration;

use cpr_common::Secret;
use log::*;

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Default)]
pub struct ExchangeConfig {
    /// Base url of the exchange API, e.g. "https://api.exchange.example.com".
    pub base_url: String,
    pub api_key: Secret<String>,
    pub timeout: Duration,
}

impl ExchangeConfig {
    pub fn new_from_env_or_default() -> Self {
        let base_url = std::env::var("CPR_EXCHANGE_API_URL").unwrap_or_else(|_| {
            warn!("CPR_EXCHANGE_API_URL not set, using (probably useless) default");
            "https://api.exchange.example.com".to_string()
        });
        let api_key = Secret::new(std::env::var("CPR_EXCHANGE_API_KEY").unwrap_or_else(|_| {
            warn!("CPR_EXCHANGE_API_KEY not set, using (probably useless) default");
            "xch_00000000000000".to_string()
        }));
        Self { base_url, api_key, timeout: http_timeout() }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExplorerConfig {
    /// Base url of the blockchain explorer API, e.g. "https://explorer.example.com".
    pub base_url: String,
    pub timeout: Duration,
}

impl ExplorerConfig {
    pub fn new_from_env_or_default() -> Self {
        let base_url = std::env::var("CPR_EXPLORER_API_URL").unwrap_or_else(|_| {
            warn!("CPR_EXPLORER_API_URL not set, using (probably useless) default");
            "https://explorer.example.com".to_string()
        });
        Self { base_url, timeout: http_timeout() }
    }
}

fn http_timeout() -> Duration {
    std::env::var("CPR_HTTP_TIMEOUT_SECS")
        .ok()
        .and_then(|s| {
            s.parse::<u64>()
                .map_err(|e| warn!("Invalid configuration value for CPR_HTTP_TIMEOUT_SECS. {e}"))
                .ok()
        })
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_HTTP_TIMEOUT)
}
