//! Default event subscribers.
//!
//! The notification collaborator (email, webhooks) is external to this system; these hooks log
//! each event so that every state transition leaves a trace even without a downstream
//! integration. Delivery is at-least-once and fire-and-forget: a failing subscriber is logged
//! and never rolls back the transition that produced the event.

use log::*;
use reconciliation_engine::events::EventHooks;

pub fn notification_hooks() -> EventHooks {
    let mut hooks = EventHooks::default();
    hooks.on_payment_detected(|ev| {
        Box::pin(async move {
            info!(
                "📣️ Payment detected: tx {} of {} {} against invoice {}",
                ev.payment.tx_hash, ev.payment.amount_received, ev.payment.currency, ev.invoice.invoice_id
            );
        })
    });
    hooks.on_payment_confirmed(|ev| {
        Box::pin(async move {
            info!(
                "📣️ Payment confirmed: tx {} for invoice {} ({} confirmations)",
                ev.payment.tx_hash, ev.invoice.invoice_id, ev.payment.confirmations
            );
        })
    });
    hooks.on_partial_payment(|ev| {
        Box::pin(async move {
            let s = &ev.settlement;
            warn!(
                "📣️ Invoice {} settled short: {} of {} confirmed (shortfall {})",
                s.invoice_id,
                s.total_confirmed,
                s.expected,
                s.shortfall.unwrap_or_default()
            );
        })
    });
    hooks.on_overpayment(|ev| {
        Box::pin(async move {
            let s = &ev.settlement;
            warn!(
                "📣️ Invoice {} overpaid by {}; queued for a manual refund decision",
                s.invoice_id,
                s.overpayment.unwrap_or_default()
            );
        })
    });
    hooks.on_invoice_expired(|ev| {
        Box::pin(async move {
            info!("📣️ Invoice {} expired without payment", ev.invoice.invoice_id);
        })
    });
    hooks
}
