//! The invoice lifecycle manager.
//!
//! Owns the non-settlement transitions of the invoice state machine: expiration, the overdue
//! sweep, and the move into `PartiallyPaid` when a deposit is first matched. Settlement
//! transitions belong to [`crate::rec_api::reconciliation`].

use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;

use crate::{
    db_types::{Invoice, InvoiceStatus},
    events::{EventProducers, InvoiceExpiredEvent},
    traits::{ReconciliationDatabase, ReconciliationError},
};

#[derive(Clone)]
pub struct LifecycleApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for LifecycleApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LifecycleApi")
    }
}

impl<B> LifecycleApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> LifecycleApi<B>
where B: ReconciliationDatabase
{
    /// Expires the invoice when its expiration window has passed, and reports whether a
    /// transition happened so that the caller can skip the deposit check for this cycle.
    ///
    /// Only `Sent` invoices expire: once a deposit has been matched the invoice must settle,
    /// not vanish. Idempotent, both here and in the guarded SQL underneath.
    pub async fn check_expiration(&self, invoice: &Invoice, now: DateTime<Utc>) -> Result<bool, ReconciliationError> {
        if invoice.status != InvoiceStatus::Sent || !invoice.is_past_expiry(now) {
            return Ok(false);
        }
        match self.db.expire_invoice(&invoice.invoice_id).await? {
            Some(expired) => {
                info!("🕰️ Invoice {} expired ({} hours after issue)", expired.invoice_id, expired.expiration_hours);
                self.call_invoice_expired_hook(expired).await;
                Ok(true)
            },
            // Another path transitioned the invoice between our read and the guarded update.
            None => Ok(false),
        }
    }

    /// Flags every unpaid invoice whose due date has passed as Overdue. Runs on its own
    /// cadence, independent of the polling loop; flagged invoices keep being polled.
    pub async fn check_overdue(&self, now: DateTime<Utc>) -> Result<Vec<Invoice>, ReconciliationError> {
        let flagged = self.db.mark_overdue_invoices(now).await?;
        if !flagged.is_empty() {
            info!("🕰️ {} invoice(s) flagged as overdue", flagged.len());
        }
        Ok(flagged)
    }

    /// Moves a Sent or Overdue invoice to PartiallyPaid when its first deposit is matched.
    /// Any other status is left untouched.
    pub async fn mark_partially_paid(&self, invoice: &Invoice) -> Result<Invoice, ReconciliationError> {
        match invoice.status {
            InvoiceStatus::Sent | InvoiceStatus::Overdue => {
                self.db.update_invoice_status(&invoice.invoice_id, InvoiceStatus::PartiallyPaid).await
            },
            _ => Ok(invoice.clone()),
        }
    }

    async fn call_invoice_expired_hook(&self, invoice: Invoice) {
        for emitter in &self.producers.invoice_expired_producer {
            debug!("🕰️ Notifying invoice-expired hook subscribers");
            emitter.publish_event(InvoiceExpiredEvent::new(invoice.clone())).await;
        }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}
