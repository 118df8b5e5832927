use chrono::{DateTime, Utc};
use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{Invoice, InvoiceId, InvoiceStatus, NewInvoice},
    traits::ReconciliationError,
};

/// Inserts the invoice, returning `false` in the second element if it already existed.
pub async fn idempotent_insert(
    invoice: NewInvoice,
    conn: &mut SqliteConnection,
) -> Result<(Invoice, bool), ReconciliationError> {
    let inserted = match fetch_invoice(&invoice.invoice_id, conn).await? {
        Some(invoice) => (invoice, false),
        None => {
            let invoice = insert_invoice(invoice, conn).await?;
            debug!("🗃️ Invoice [{}] inserted with id {}", invoice.invoice_id, invoice.id);
            (invoice, true)
        },
    };
    Ok(inserted)
}

async fn insert_invoice(invoice: NewInvoice, conn: &mut SqliteConnection) -> Result<Invoice, ReconciliationError> {
    let invoice = sqlx::query_as(
        r#"
            INSERT INTO invoices (
                invoice_id,
                currency,
                network,
                expected_amount,
                deposit_address,
                issue_date,
                expiration_hours,
                due_date,
                rate_lock_expiry,
                payment_tolerance_bps
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *;
        "#,
    )
    .bind(invoice.invoice_id)
    .bind(invoice.currency)
    .bind(invoice.network)
    .bind(invoice.expected_amount.value())
    .bind(invoice.deposit_address)
    .bind(invoice.issue_date)
    .bind(invoice.expiration_hours)
    .bind(invoice.due_date)
    .bind(invoice.rate_lock_expiry)
    .bind(invoice.payment_tolerance_bps)
    .fetch_one(conn)
    .await?;
    Ok(invoice)
}

pub async fn fetch_invoice(
    invoice_id: &InvoiceId,
    conn: &mut SqliteConnection,
) -> Result<Option<Invoice>, sqlx::Error> {
    let invoice = sqlx::query_as("SELECT * FROM invoices WHERE invoice_id = $1")
        .bind(invoice_id.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(invoice)
}

/// All invoices the polling loop still visits, oldest first.
pub async fn fetch_pending_invoices(conn: &mut SqliteConnection) -> Result<Vec<Invoice>, sqlx::Error> {
    let invoices = sqlx::query_as(
        "SELECT * FROM invoices WHERE status IN ('Sent', 'PartiallyPaid', 'Overdue') ORDER BY created_at ASC, id ASC",
    )
    .fetch_all(conn)
    .await?;
    Ok(invoices)
}

/// Writes the new status unconditionally. Transition guards belong to the caller; when
/// `set_paid_at` is true, `paid_at` is stamped only if it has never been set.
pub(crate) async fn update_status(
    invoice_id: &InvoiceId,
    status: InvoiceStatus,
    set_paid_at: bool,
    conn: &mut SqliteConnection,
) -> Result<Invoice, ReconciliationError> {
    let result: Option<Invoice> = sqlx::query_as(
        r#"
            UPDATE invoices SET
                status = $1,
                updated_at = CURRENT_TIMESTAMP,
                paid_at = CASE WHEN $2 AND paid_at IS NULL THEN CURRENT_TIMESTAMP ELSE paid_at END
            WHERE invoice_id = $3 RETURNING *
        "#,
    )
    .bind(status.to_string())
    .bind(set_paid_at)
    .bind(invoice_id.as_str())
    .fetch_optional(conn)
    .await?;
    result.ok_or(ReconciliationError::InvoiceNotFound(invoice_id.clone()))
}

/// Sent -> Expired, guarded in SQL so that repeated calls after expiry are no-ops.
pub(crate) async fn expire_if_sent(
    invoice_id: &InvoiceId,
    conn: &mut SqliteConnection,
) -> Result<Option<Invoice>, ReconciliationError> {
    let expired = sqlx::query_as(
        "UPDATE invoices SET status = 'Expired', updated_at = CURRENT_TIMESTAMP \
         WHERE invoice_id = $1 AND status = 'Sent' RETURNING *",
    )
    .bind(invoice_id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(expired)
}

/// Flags every unpaid invoice whose due date has passed. Informational; flagged invoices keep
/// being polled.
pub(crate) async fn mark_overdue(
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Invoice>, ReconciliationError> {
    let rows = sqlx::query_as(
        "UPDATE invoices SET status = 'Overdue', updated_at = CURRENT_TIMESTAMP \
         WHERE status IN ('Sent', 'PartiallyPaid') AND due_date IS NOT NULL AND due_date <= $1 RETURNING *",
    )
    .bind(now)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}
