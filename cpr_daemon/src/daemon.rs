use deposit_clients::{ExchangeApi, ExplorerApi};
use log::*;
use reconciliation_engine::{
    events::EventHandlers,
    PollerConfig,
    PollingOrchestrator,
    SqliteDatabase,
};

use crate::{
    config::DaemonConfig,
    errors::DaemonError,
    hooks::notification_hooks,
    integrations::{ExchangeDepositSource, ExplorerTxVerifier},
    workers::start_overdue_worker,
};

/// Wires everything together and runs until SIGINT. Shutdown is graceful: the polling worker
/// finishes its in-flight cycle before the daemon exits.
pub async fn run_daemon(config: DaemonConfig) -> Result<(), DaemonError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, config.max_db_connections)
        .await
        .map_err(|e| DaemonError::InitializeError(e.to_string()))?;
    let handlers = EventHandlers::new(config.event_buffer_size, notification_hooks());
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let exchange =
        ExchangeApi::new(config.exchange.clone()).map_err(|e| DaemonError::InitializeError(e.to_string()))?;
    let explorer =
        ExplorerApi::new(config.explorer.clone()).map_err(|e| DaemonError::InitializeError(e.to_string()))?;
    let source = ExchangeDepositSource::new(exchange);
    let verifier = ExplorerTxVerifier::new(explorer);

    let poller_config = PollerConfig {
        poll_interval: config.poll_interval,
        rate_expired_tolerance_multiplier: config.rate_expired_tolerance_multiplier,
    };
    let poller = PollingOrchestrator::new(db.clone(), source, verifier, producers.clone(), poller_config);
    let polling_worker = {
        let poller = poller.clone();
        tokio::spawn(async move { poller.run().await })
    };
    let overdue_worker = if config.disable_overdue_worker {
        info!("🕰️ Overdue sweep disabled by configuration");
        None
    } else {
        Some(start_overdue_worker(db, producers, config.overdue_check_interval))
    };

    tokio::signal::ctrl_c().await?;
    info!("🛑️ Shutdown signal received; finishing the in-flight poll cycle");
    poller.stop();
    if let Err(e) = polling_worker.await {
        warn!("🛑️ Polling worker did not shut down cleanly: {e}");
    }
    if let Some(worker) = overdue_worker {
        worker.abort();
    }

    let stats = poller.statistics();
    info!(
        "⏱️ Final statistics: {} poll cycles, {} payments detected, {} confirmed, {} errors",
        stats.total_polls, stats.payments_detected, stats.payments_confirmed, stats.errors
    );
    Ok(())
}
