use std::time::Duration;

use chrono::Utc;
use log::*;
use reconciliation_engine::{db_types::Invoice, events::EventProducers, LifecycleApi, SqliteDatabase};
use tokio::task::JoinHandle;

/// Starts the overdue sweep worker. Do not await the returned JoinHandle, as it will run
/// indefinitely.
pub fn start_overdue_worker(
    db: SqliteDatabase,
    producers: EventProducers,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        let api = LifecycleApi::new(db, producers);
        info!("🕰️ Overdue invoice worker started");
        loop {
            timer.tick().await;
            match api.check_overdue(Utc::now()).await {
                Ok(flagged) if flagged.is_empty() => debug!("🕰️ No invoices fell overdue"),
                Ok(flagged) => {
                    info!("🕰️ {} invoice(s) flagged overdue: {}", flagged.len(), invoice_list(&flagged));
                },
                Err(e) => {
                    error!("🕰️ Error running the overdue sweep: {e}");
                },
            }
        }
    })
}

fn invoice_list(invoices: &[Invoice]) -> String {
    invoices
        .iter()
        .map(|i| format!("[{}] due: {}", i.invoice_id, i.due_date.map(|d| d.to_rfc3339()).unwrap_or_default()))
        .collect::<Vec<String>>()
        .join(", ")
}
