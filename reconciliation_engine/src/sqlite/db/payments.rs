use cpr_common::CoinAmount;
use sqlx::SqliteConnection;

use crate::{
    db_types::{InvoiceId, NewPaymentTransaction, PaymentStatus, PaymentTransaction},
    traits::ReconciliationError,
};

/// Inserts the payment, relying on the UNIQUE (tx_hash, network) constraint to enforce the
/// system-wide dedup invariant. A duplicate maps to `PaymentAlreadyExists`.
pub async fn idempotent_insert(
    payment: NewPaymentTransaction,
    conn: &mut SqliteConnection,
) -> Result<PaymentTransaction, ReconciliationError> {
    let tx_hash = payment.tx_hash.clone();
    let payment = sqlx::query_as(
        r#"
            INSERT INTO payment_transactions (
                invoice_id,
                tx_hash,
                amount_received,
                currency,
                network,
                confirmations,
                required_confirmations,
                status,
                is_manual_verification,
                verified_by
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *;
        "#,
    )
    .bind(payment.invoice_id)
    .bind(payment.tx_hash)
    .bind(payment.amount_received.value())
    .bind(payment.currency)
    .bind(payment.network)
    .bind(payment.confirmations)
    .bind(payment.required_confirmations)
    .bind(payment.status.to_string())
    .bind(payment.is_manual_verification)
    .bind(payment.verified_by)
    .fetch_one(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(err) if err.is_unique_violation() => {
            ReconciliationError::PaymentAlreadyExists(tx_hash)
        },
        _ => ReconciliationError::from(e),
    })?;
    Ok(payment)
}

pub async fn exists(tx_hash: &str, network: &str, conn: &mut SqliteConnection) -> Result<bool, ReconciliationError> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM payment_transactions WHERE tx_hash = $1 AND network = $2")
            .bind(tx_hash)
            .bind(network)
            .fetch_one(conn)
            .await?;
    Ok(count > 0)
}

pub async fn fetch_payment(
    tx_hash: &str,
    network: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentTransaction>, ReconciliationError> {
    let payment = sqlx::query_as("SELECT * FROM payment_transactions WHERE tx_hash = $1 AND network = $2")
        .bind(tx_hash)
        .bind(network)
        .fetch_optional(conn)
        .await?;
    Ok(payment)
}

pub async fn fetch_for_invoice(
    invoice_id: &InvoiceId,
    conn: &mut SqliteConnection,
) -> Result<Vec<PaymentTransaction>, sqlx::Error> {
    let payments = sqlx::query_as(
        "SELECT * FROM payment_transactions WHERE invoice_id = $1 ORDER BY created_at ASC, id ASC",
    )
    .bind(invoice_id.as_str())
    .fetch_all(conn)
    .await?;
    Ok(payments)
}

/// Payments still short of their confirmation threshold, for the confirmation sweep.
pub async fn fetch_unconfirmed(conn: &mut SqliteConnection) -> Result<Vec<PaymentTransaction>, sqlx::Error> {
    let payments = sqlx::query_as(
        "SELECT * FROM payment_transactions WHERE status IN ('Pending', 'Detected') ORDER BY created_at ASC, id ASC",
    )
    .fetch_all(conn)
    .await?;
    Ok(payments)
}

/// Records a fresh confirmation count. Counts are monotonic: MAX() keeps the stored value when
/// the source briefly reports a lower one.
pub async fn update_confirmations(
    payment_id: i64,
    confirmations: i64,
    status: PaymentStatus,
    conn: &mut SqliteConnection,
) -> Result<PaymentTransaction, ReconciliationError> {
    let payment = sqlx::query_as(
        "UPDATE payment_transactions SET confirmations = MAX(confirmations, $1), status = $2, \
         updated_at = CURRENT_TIMESTAMP WHERE id = $3 RETURNING *",
    )
    .bind(confirmations)
    .bind(status.to_string())
    .bind(payment_id)
    .fetch_optional(conn)
    .await?
    .ok_or(ReconciliationError::PaymentIdNotFound(payment_id))?;
    Ok(payment)
}

/// The confirmed total for the invoice, in atoms.
pub(crate) async fn sum_confirmed(
    invoice_id: &InvoiceId,
    conn: &mut SqliteConnection,
) -> Result<CoinAmount, ReconciliationError> {
    let total: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount_received), 0) FROM payment_transactions \
         WHERE invoice_id = $1 AND status = 'Confirmed'",
    )
    .bind(invoice_id.as_str())
    .fetch_one(conn)
    .await?;
    Ok(CoinAmount::from(total))
}
