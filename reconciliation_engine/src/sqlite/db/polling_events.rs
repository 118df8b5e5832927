use sqlx::SqliteConnection;

use crate::{
    db_types::{InvoiceId, NewPollingEvent, PollingEvent},
    traits::ReconciliationError,
};

/// Appends one audit row. The log is insert-only; there are no update or delete paths.
pub async fn insert(event: NewPollingEvent, conn: &mut SqliteConnection) -> Result<(), ReconciliationError> {
    sqlx::query("INSERT INTO polling_events (invoice_id, outcome, detail) VALUES ($1, $2, $3)")
        .bind(event.invoice_id)
        .bind(event.outcome.to_string())
        .bind(event.detail)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn fetch_for_invoice(
    invoice_id: &InvoiceId,
    conn: &mut SqliteConnection,
) -> Result<Vec<PollingEvent>, sqlx::Error> {
    let events = sqlx::query_as("SELECT * FROM polling_events WHERE invoice_id = $1 ORDER BY id ASC")
        .bind(invoice_id.as_str())
        .fetch_all(conn)
        .await?;
    Ok(events)
}
