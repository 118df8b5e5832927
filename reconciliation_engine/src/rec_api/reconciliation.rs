//! The reconciliation engine.
//!
//! Turns the set of confirmed payments for an invoice into a definitive settlement outcome.
//! The recompute always runs from scratch over the full confirmed set, which makes repeated
//! triggering naturally idempotent and lets a late-arriving deposit reclassify an invoice that
//! had already settled.

use std::{collections::HashMap, fmt::Debug, sync::Arc};

use log::*;
use tokio::sync::Mutex;

use crate::{
    db_types::{InvoiceId, InvoiceStatus},
    events::{EventProducers, OverpaymentEvent, PartialPaymentEvent},
    traits::{PaymentConfirmation, ReconciliationDatabase, ReconciliationError, Settlement},
};

/// Per-invoice async locks. Both the polling worker and the request-driven manual verification
/// path reconcile through the same registry, so no two settlement recomputes for one invoice
/// ever run concurrently.
#[derive(Clone, Default)]
pub struct InvoiceLocks {
    locks: Arc<std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl InvoiceLocks {
    pub fn lock_for(&self, invoice_id: &InvoiceId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(invoice_id.as_str().to_string()).or_default().clone()
    }
}

#[derive(Clone)]
pub struct ReconciliationApi<B> {
    db: B,
    producers: EventProducers,
    locks: InvoiceLocks,
}

impl<B> Debug for ReconciliationApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReconciliationApi")
    }
}

impl<B> ReconciliationApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers, locks: InvoiceLocks::default() }
    }
}

impl<B> ReconciliationApi<B>
where B: ReconciliationDatabase
{
    /// Recomputes and persists the settlement outcome for the invoice, optionally promoting the
    /// triggering payment to Confirmed in the same transaction.
    ///
    /// Settlement events (partial payment, overpayment) are emitted only after the transaction
    /// has committed; a failing subscriber never rolls a settlement back.
    pub async fn reconcile(
        &self,
        invoice_id: &InvoiceId,
        confirm_payment: Option<PaymentConfirmation>,
    ) -> Result<Settlement, ReconciliationError> {
        let lock = self.locks.lock_for(invoice_id);
        let _guard = lock.lock().await;
        let settlement = self.db.settle_invoice(invoice_id, confirm_payment).await?;
        self.log_settlement(&settlement);
        self.call_settlement_hooks(&settlement).await;
        Ok(settlement)
    }

    fn log_settlement(&self, settlement: &Settlement) {
        match settlement.new_status {
            InvoiceStatus::Partial => {
                let shortfall = settlement.shortfall.unwrap_or_default();
                let bps = settlement.shortfall_bps().unwrap_or_default();
                warn!(
                    "🔄️ Invoice {} settled short: {} of {} confirmed, shortfall {shortfall} ({}.{:02}%)",
                    settlement.invoice_id,
                    settlement.total_confirmed,
                    settlement.expected,
                    bps / 100,
                    bps % 100,
                );
            },
            InvoiceStatus::Overpaid => {
                let over = settlement.overpayment.unwrap_or_default();
                warn!(
                    "🔄️ Invoice {} overpaid by {over}: {} against {}. Queued for a manual refund decision.",
                    settlement.invoice_id, settlement.total_confirmed, settlement.expected,
                );
            },
            InvoiceStatus::Paid if settlement.transitioned() => {
                info!(
                    "🔄️ Invoice {} paid in full: {} confirmed against {}",
                    settlement.invoice_id, settlement.total_confirmed, settlement.expected
                );
            },
            _ => {},
        }
    }

    async fn call_settlement_hooks(&self, settlement: &Settlement) {
        if !settlement.transitioned() {
            return;
        }
        match settlement.new_status {
            InvoiceStatus::Partial => {
                for emitter in &self.producers.partial_payment_producer {
                    debug!("🔄️ Notifying partial-payment hook subscribers");
                    emitter.publish_event(PartialPaymentEvent::new(settlement.clone())).await;
                }
            },
            InvoiceStatus::Overpaid => {
                for emitter in &self.producers.overpayment_producer {
                    debug!("🔄️ Notifying overpayment hook subscribers");
                    emitter.publish_event(OverpaymentEvent::new(settlement.clone())).await;
                }
            },
            _ => {},
        }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}
