use std::{env, time::Duration};

use cpr_common::parse_boolean_flag;
use deposit_clients::{ExchangeConfig, ExplorerConfig};
use log::*;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_OVERDUE_CHECK_INTERVAL: Duration = Duration::from_secs(3600);
const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;
const DEFAULT_MAX_DB_CONNECTIONS: u32 = 25;
const DEFAULT_RATE_EXPIRED_TOLERANCE_MULTIPLIER: i64 = 5;

#[derive(Clone, Debug)]
pub struct DaemonConfig {
    pub database_url: String,
    /// Cadence of the deposit polling loop.
    pub poll_interval: Duration,
    /// Cadence of the overdue sweep. Independent of the polling loop.
    pub overdue_check_interval: Duration,
    pub event_buffer_size: usize,
    pub max_db_connections: u32,
    /// How much the matching tolerance widens for invoices whose rate lock has lapsed.
    pub rate_expired_tolerance_multiplier: i64,
    /// If true, the overdue sweep is not started. Useful when another instance owns it.
    pub disable_overdue_worker: bool,
    pub exchange: ExchangeConfig,
    pub explorer: ExplorerConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            database_url: String::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            overdue_check_interval: DEFAULT_OVERDUE_CHECK_INTERVAL,
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
            max_db_connections: DEFAULT_MAX_DB_CONNECTIONS,
            rate_expired_tolerance_multiplier: DEFAULT_RATE_EXPIRED_TOLERANCE_MULTIPLIER,
            disable_overdue_worker: false,
            exchange: ExchangeConfig::default(),
            explorer: ExplorerConfig::default(),
        }
    }
}

impl DaemonConfig {
    pub fn from_env_or_default() -> Self {
        let database_url = env::var("CPR_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ CPR_DATABASE_URL is not set. Please set it to the URL for the reconciliation database.");
            String::default()
        });
        let poll_interval = duration_from_env("CPR_POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL);
        let overdue_check_interval =
            duration_from_env("CPR_OVERDUE_CHECK_INTERVAL_SECS", DEFAULT_OVERDUE_CHECK_INTERVAL);
        let event_buffer_size = env::var("CPR_EVENT_BUFFER_SIZE")
            .ok()
            .and_then(|s| {
                s.parse::<usize>()
                    .map_err(|e| warn!("🪛️ Invalid configuration value for CPR_EVENT_BUFFER_SIZE. {e}"))
                    .ok()
            })
            .unwrap_or(DEFAULT_EVENT_BUFFER_SIZE);
        let max_db_connections = env::var("CPR_MAX_DB_CONNECTIONS")
            .ok()
            .and_then(|s| {
                s.parse::<u32>()
                    .map_err(|e| warn!("🪛️ Invalid configuration value for CPR_MAX_DB_CONNECTIONS. {e}"))
                    .ok()
            })
            .unwrap_or(DEFAULT_MAX_DB_CONNECTIONS);
        let rate_expired_tolerance_multiplier = env::var("CPR_RATE_EXPIRED_TOLERANCE_MULTIPLIER")
            .ok()
            .and_then(|s| {
                s.parse::<i64>()
                    .map_err(|e| warn!("🪛️ Invalid configuration value for CPR_RATE_EXPIRED_TOLERANCE_MULTIPLIER. {e}"))
                    .ok()
            })
            .unwrap_or(DEFAULT_RATE_EXPIRED_TOLERANCE_MULTIPLIER);
        let disable_overdue_worker = parse_boolean_flag(env::var("CPR_DISABLE_OVERDUE_WORKER").ok(), false);
        Self {
            database_url,
            poll_interval,
            overdue_check_interval,
            event_buffer_size,
            max_db_connections,
            rate_expired_tolerance_multiplier,
            disable_overdue_worker,
            exchange: ExchangeConfig::new_from_env_or_default(),
            explorer: ExplorerConfig::new_from_env_or_default(),
        }
    }
}

fn duration_from_env(var: &str, default: Duration) -> Duration {
    env::var(var)
        .map_err(|_| info!("🪛️ {var} is not set. Using the default value of {} seconds.", default.as_secs()))
        .and_then(|s| {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e| warn!("🪛️ Invalid configuration value for {var}. {e}"))
        })
        .ok()
        .unwrap_or(default)
}
