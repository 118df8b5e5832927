//! `SqliteDatabase` is a concrete implementation of a reconciliation engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the
//! [`crate::traits`] module.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqlitePool;

use super::db::{db_url, invoices, new_pool, payments, polling_events};
use crate::{
    db_types::{
        Invoice,
        InvoiceId,
        InvoiceStatus,
        NewInvoice,
        NewPaymentTransaction,
        NewPollingEvent,
        PaymentStatus,
        PaymentTransaction,
        PollingEvent,
    },
    traits::{InvoiceManagement, PaymentConfirmation, ReconciliationDatabase, ReconciliationError, Settlement},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new connection pool using the `CPR_DATABASE_URL` environment variable.
    pub async fn new(max_connections: u32) -> Result<Self, ReconciliationError> {
        let url = db_url();
        Self::new_with_url(&url, max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, ReconciliationError> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl InvoiceManagement for SqliteDatabase {
    async fn insert_invoice(&self, invoice: NewInvoice) -> Result<Invoice, ReconciliationError> {
        let mut conn = self.pool.acquire().await?;
        let (invoice, inserted) = invoices::idempotent_insert(invoice, &mut conn).await?;
        if !inserted {
            debug!("🗃️ Invoice [{}] already existed; returning the stored record", invoice.invoice_id);
        }
        Ok(invoice)
    }

    async fn fetch_invoice(&self, invoice_id: &InvoiceId) -> Result<Option<Invoice>, ReconciliationError> {
        let mut conn = self.pool.acquire().await?;
        let invoice = invoices::fetch_invoice(invoice_id, &mut conn).await?;
        Ok(invoice)
    }

    async fn fetch_pending_invoices(&self) -> Result<Vec<Invoice>, ReconciliationError> {
        let mut conn = self.pool.acquire().await?;
        let invoices = invoices::fetch_pending_invoices(&mut conn).await?;
        Ok(invoices)
    }

    async fn fetch_payments_for_invoice(
        &self,
        invoice_id: &InvoiceId,
    ) -> Result<Vec<PaymentTransaction>, ReconciliationError> {
        let mut conn = self.pool.acquire().await?;
        let payments = payments::fetch_for_invoice(invoice_id, &mut conn).await?;
        Ok(payments)
    }

    async fn fetch_payment_by_tx_hash(
        &self,
        tx_hash: &str,
        network: &str,
    ) -> Result<Option<PaymentTransaction>, ReconciliationError> {
        let mut conn = self.pool.acquire().await?;
        payments::fetch_payment(tx_hash, network, &mut conn).await
    }

    async fn fetch_polling_events(&self, invoice_id: &InvoiceId) -> Result<Vec<PollingEvent>, ReconciliationError> {
        let mut conn = self.pool.acquire().await?;
        let events = polling_events::fetch_for_invoice(invoice_id, &mut conn).await?;
        Ok(events)
    }
}

impl ReconciliationDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn payment_exists(&self, tx_hash: &str, network: &str) -> Result<bool, ReconciliationError> {
        let mut conn = self.pool.acquire().await?;
        payments::exists(tx_hash, network, &mut conn).await
    }

    async fn insert_payment(
        &self,
        payment: NewPaymentTransaction,
    ) -> Result<PaymentTransaction, ReconciliationError> {
        let mut conn = self.pool.acquire().await?;
        let payment = payments::idempotent_insert(payment, &mut conn).await?;
        debug!(
            "🗃️ Payment [{}] of {} linked to invoice {} as {}",
            payment.tx_hash, payment.amount_received, payment.invoice_id, payment.status
        );
        Ok(payment)
    }

    async fn fetch_unconfirmed_payments(&self) -> Result<Vec<PaymentTransaction>, ReconciliationError> {
        let mut conn = self.pool.acquire().await?;
        let payments = payments::fetch_unconfirmed(&mut conn).await?;
        Ok(payments)
    }

    async fn update_payment_confirmations(
        &self,
        payment_id: i64,
        confirmations: i64,
        status: PaymentStatus,
    ) -> Result<PaymentTransaction, ReconciliationError> {
        let mut conn = self.pool.acquire().await?;
        payments::update_confirmations(payment_id, confirmations, status, &mut conn).await
    }

    async fn update_invoice_status(
        &self,
        invoice_id: &InvoiceId,
        status: InvoiceStatus,
    ) -> Result<Invoice, ReconciliationError> {
        let mut tx = self.pool.begin().await?;
        let invoice = invoices::fetch_invoice(invoice_id, &mut tx)
            .await?
            .ok_or_else(|| ReconciliationError::InvoiceNotFound(invoice_id.clone()))?;
        if invoice.status == status {
            tx.commit().await?;
            return Ok(invoice);
        }
        if !invoice.status.can_transition(status) {
            return Err(ReconciliationError::InvalidStatusTransition { from: invoice.status, to: status });
        }
        let updated = invoices::update_status(invoice_id, status, false, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Invoice {} moved from {} to {}", invoice_id, invoice.status, status);
        Ok(updated)
    }

    /// The settlement recompute. Everything happens in one transaction: the triggering payment
    /// promotion (if any), the confirmed-total sum, the classification, and the status write.
    /// An error anywhere rolls the whole thing back.
    async fn settle_invoice(
        &self,
        invoice_id: &InvoiceId,
        confirm_payment: Option<PaymentConfirmation>,
    ) -> Result<Settlement, ReconciliationError> {
        let mut tx = self.pool.begin().await?;
        if let Some(confirmation) = confirm_payment {
            let payment = payments::update_confirmations(
                confirmation.payment_id,
                confirmation.confirmations,
                PaymentStatus::Confirmed,
                &mut tx,
            )
            .await?;
            trace!("🗃️ Payment [{}] marked Confirmed, triggering settlement", payment.tx_hash);
        }
        let invoice = invoices::fetch_invoice(invoice_id, &mut tx)
            .await?
            .ok_or_else(|| ReconciliationError::InvoiceNotFound(invoice_id.clone()))?;
        let total = payments::sum_confirmed(invoice_id, &mut tx).await?;
        let settlement = Settlement::evaluate(&invoice, total);
        if settlement.transitioned() {
            if !invoice.status.can_transition(settlement.new_status) {
                return Err(ReconciliationError::InvalidStatusTransition {
                    from: invoice.status,
                    to: settlement.new_status,
                });
            }
            let entering_settled = matches!(settlement.new_status, InvoiceStatus::Paid | InvoiceStatus::Overpaid);
            invoices::update_status(invoice_id, settlement.new_status, entering_settled, &mut tx).await?;
        }
        tx.commit().await?;
        debug!(
            "🗃️ Invoice {} settled: {} of {} confirmed, status {} -> {}",
            invoice_id, settlement.total_confirmed, settlement.expected, settlement.previous_status, settlement.new_status
        );
        Ok(settlement)
    }

    async fn expire_invoice(&self, invoice_id: &InvoiceId) -> Result<Option<Invoice>, ReconciliationError> {
        let mut conn = self.pool.acquire().await?;
        invoices::expire_if_sent(invoice_id, &mut conn).await
    }

    async fn mark_overdue_invoices(&self, now: DateTime<Utc>) -> Result<Vec<Invoice>, ReconciliationError> {
        let mut conn = self.pool.acquire().await?;
        invoices::mark_overdue(now, &mut conn).await
    }

    async fn log_polling_event(&self, event: NewPollingEvent) -> Result<(), ReconciliationError> {
        let mut conn = self.pool.acquire().await?;
        polling_events::insert(event, &mut conn).await
    }

    async fn close(&mut self) -> Result<(), ReconciliationError> {
        self.pool.close().await;
        Ok(())
    }
}
