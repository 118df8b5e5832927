//! The polling orchestrator.
//!
//! A single long-lived worker drives the whole detection pipeline on a fixed interval: load
//! pending invoices, expire the stale ones, match fresh deposits, and sweep unconfirmed
//! payments towards their confirmation thresholds. The orchestrator keeps no durable state of
//! its own; everything lives in the invoice and payment tables, so a restart resumes cleanly.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use log::*;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use crate::{
    db_types::{
        Deposit,
        Invoice,
        InvoiceId,
        InvoiceStatus,
        NewPaymentTransaction,
        NewPollingEvent,
        PaymentStatus,
        PaymentTransaction,
        PollOutcome,
    },
    events::{EventProducers, PaymentConfirmedEvent, PaymentDetectedEvent},
    helpers::default_required_confirmations,
    rec_api::{
        errors::{VerificationError, VerificationResult},
        lifecycle::LifecycleApi,
        matcher::find_match,
        rate_resolver::{QuotedRateResolver, RateResolver, ResolvedAmount},
        reconciliation::ReconciliationApi,
    },
    traits::{DepositSource, PaymentConfirmation, ReconciliationDatabase, ReconciliationError, TxVerifier},
};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
/// How much the matching tolerance widens once an invoice's rate lock has lapsed and the
/// quoted amount is known to be stale.
const DEFAULT_RATE_EXPIRED_TOLERANCE_MULTIPLIER: i64 = 5;

#[derive(Debug, Clone, Copy)]
pub struct PollerConfig {
    pub poll_interval: Duration,
    pub rate_expired_tolerance_multiplier: i64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            rate_expired_tolerance_multiplier: DEFAULT_RATE_EXPIRED_TOLERANCE_MULTIPLIER,
        }
    }
}

/// Running counters for the orchestrator. Best effort: relaxed atomics, never part of any
/// transaction.
#[derive(Default)]
struct PollerState {
    total_polls: AtomicU64,
    payments_detected: AtomicU64,
    payments_confirmed: AtomicU64,
    errors: AtomicU64,
    last_poll_time: std::sync::Mutex<Option<DateTime<Utc>>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingStatistics {
    pub total_polls: u64,
    pub payments_detected: u64,
    pub payments_confirmed: u64,
    pub errors: u64,
    pub last_poll_time: Option<DateTime<Utc>>,
}

impl PollerState {
    fn snapshot(&self) -> PollingStatistics {
        PollingStatistics {
            total_polls: self.total_polls.load(Ordering::Relaxed),
            payments_detected: self.payments_detected.load(Ordering::Relaxed),
            payments_confirmed: self.payments_confirmed.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            last_poll_time: *self.last_poll_time.lock().unwrap_or_else(|e| e.into_inner()),
        }
    }
}

#[derive(Clone)]
pub struct PollingOrchestrator<B, S, V> {
    db: B,
    source: S,
    verifier: V,
    resolver: Arc<dyn RateResolver + Send + Sync>,
    lifecycle: LifecycleApi<B>,
    reconciliation: ReconciliationApi<B>,
    producers: EventProducers,
    config: PollerConfig,
    state: Arc<PollerState>,
    shutdown: Arc<Notify>,
}

impl<B, S, V> PollingOrchestrator<B, S, V>
where
    B: ReconciliationDatabase,
    S: DepositSource,
    V: TxVerifier,
{
    pub fn new(db: B, source: S, verifier: V, producers: EventProducers, config: PollerConfig) -> Self {
        let lifecycle = LifecycleApi::new(db.clone(), producers.clone());
        let reconciliation = ReconciliationApi::new(db.clone(), producers.clone());
        Self {
            db,
            source,
            verifier,
            resolver: Arc::new(QuotedRateResolver),
            lifecycle,
            reconciliation,
            config,
            state: Arc::new(PollerState::default()),
            shutdown: Arc::new(Notify::new()),
            producers,
        }
    }

    /// Swaps in a different expected-amount strategy, e.g. a live-rate recompute.
    pub fn with_rate_resolver(mut self, resolver: Arc<dyn RateResolver + Send + Sync>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn statistics(&self) -> PollingStatistics {
        self.state.snapshot()
    }

    /// The worker loop. Runs one poll cycle plus one confirmation sweep per interval until
    /// [`Self::stop`] is called; the in-flight cycle always completes before the loop exits.
    /// Spawn this on the runtime and keep the orchestrator around to stop it.
    pub async fn run(&self) {
        let mut timer = tokio::time::interval(self.config.poll_interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!("⏱️ Payment polling worker started (interval: {:?})", self.config.poll_interval);
        loop {
            tokio::select! {
                _ = timer.tick() => {
                    if let Err(e) = self.tick().await {
                        self.state.errors.fetch_add(1, Ordering::Relaxed);
                        error!("⏱️ Poll cycle failed: {e}");
                    }
                    if let Err(e) = self.refresh_confirmations().await {
                        self.state.errors.fetch_add(1, Ordering::Relaxed);
                        error!("⏱️ Confirmation sweep failed: {e}");
                    }
                },
                _ = self.shutdown.notified() => break,
            }
        }
        info!("⏱️ Payment polling worker stopped");
    }

    /// Asks the worker loop to exit after the cycle currently in flight.
    pub fn stop(&self) {
        debug!("⏱️ Shutdown requested for the polling worker");
        self.shutdown.notify_one();
    }

    /// One poll cycle. Every per-invoice failure is isolated, counted and logged to the audit
    /// trail; a single bad invoice never aborts the batch.
    pub async fn tick(&self) -> Result<(), ReconciliationError> {
        let pending = self.db.fetch_pending_invoices().await?;
        self.state.total_polls.fetch_add(1, Ordering::Relaxed);
        let now = Utc::now();
        debug!("⏱️ Poll cycle over {} pending invoice(s)", pending.len());
        for invoice in &pending {
            let event = match self.poll_invoice(invoice, now).await {
                Ok((outcome, detail)) => {
                    NewPollingEvent { invoice_id: invoice.invoice_id.clone(), outcome, detail }
                },
                Err(e) => {
                    self.state.errors.fetch_add(1, Ordering::Relaxed);
                    error!("⏱️ Error while polling invoice {}: {e}", invoice.invoice_id);
                    NewPollingEvent::error(invoice.invoice_id.clone(), e.to_string())
                },
            };
            if let Err(e) = self.db.log_polling_event(event).await {
                self.state.errors.fetch_add(1, Ordering::Relaxed);
                error!("⏱️ Could not log the polling event for invoice {}: {e}", invoice.invoice_id);
            }
        }
        *self.state.last_poll_time.lock().unwrap_or_else(|e| e.into_inner()) = Some(now);
        Ok(())
    }

    async fn poll_invoice(
        &self,
        invoice: &Invoice,
        now: DateTime<Utc>,
    ) -> Result<(PollOutcome, Option<String>), ReconciliationError> {
        if self.lifecycle.check_expiration(invoice, now).await? {
            let detail = format!("expired {} hours after issue", invoice.expiration_hours);
            return Ok((PollOutcome::Expired, Some(detail)));
        }
        let resolved = self.resolver.resolve(invoice, now);
        let tolerance_bps = self.effective_tolerance(invoice, &resolved);
        let candidates = self.source.deposits(&invoice.currency, &invoice.network, invoice.issue_date).await?;
        let existing = self.db.fetch_payments_for_invoice(&invoice.invoice_id).await?;
        let deposit = match find_match(invoice, resolved.amount, tolerance_bps, &candidates, &existing) {
            Some(deposit) => deposit.clone(),
            None => return Ok((PollOutcome::NoPayment, None)),
        };
        // System-wide dedup: the same (tx_hash, network) may satisfy the band for several
        // invoices sharing the address, but it pays at most one of them.
        if self.db.payment_exists(&deposit.tx_hash, &deposit.network).await? {
            let detail = format!("deposit {} is already linked to another invoice", deposit.tx_hash);
            return Ok((PollOutcome::NoPayment, Some(detail)));
        }
        self.create_payment(invoice, &deposit).await
    }

    async fn create_payment(
        &self,
        invoice: &Invoice,
        deposit: &Deposit,
    ) -> Result<(PollOutcome, Option<String>), ReconciliationError> {
        let required = match self.source.required_confirmations(&invoice.currency, &invoice.network).await {
            Ok(n) => n,
            Err(e) => {
                let fallback = default_required_confirmations(&invoice.network);
                warn!(
                    "⏱️ Could not fetch the confirmation threshold for {}/{} ({e}); using the built-in {fallback}",
                    invoice.currency, invoice.network
                );
                fallback
            },
        };
        let new_payment = NewPaymentTransaction::from_deposit(invoice, deposit, required);
        let payment = match self.db.insert_payment(new_payment).await {
            Err(ReconciliationError::PaymentAlreadyExists(tx_hash)) => {
                // A concurrent path linked the deposit between our dedup check and the insert.
                debug!("⏱️ Deposit {tx_hash} was linked concurrently; nothing to do");
                let detail = format!("deposit {tx_hash} is already linked to another invoice");
                return Ok((PollOutcome::NoPayment, Some(detail)));
            },
            other => other?,
        };
        self.state.payments_detected.fetch_add(1, Ordering::Relaxed);
        info!(
            "⏱️💰️ Deposit {} of {} {} matched invoice {}",
            payment.tx_hash, payment.amount_received, payment.currency, invoice.invoice_id
        );
        let invoice = self.lifecycle.mark_partially_paid(invoice).await?;
        self.call_payment_detected_hook(&invoice, &payment).await;
        if payment.status == PaymentStatus::Confirmed {
            self.state.payments_confirmed.fetch_add(1, Ordering::Relaxed);
            self.call_payment_confirmed_hook(&invoice, &payment).await;
            let settlement = self.reconciliation.reconcile(&invoice.invoice_id, None).await?;
            let outcome = match settlement.new_status {
                InvoiceStatus::Partial => PollOutcome::PartialPayment,
                InvoiceStatus::Overpaid => PollOutcome::Overpayment,
                _ => PollOutcome::PaymentDetected,
            };
            return Ok((outcome, Some(format!("tx {} confirmed on arrival", payment.tx_hash))));
        }
        let detail =
            format!("tx {} detected, awaiting {} confirmation(s)", payment.tx_hash, payment.required_confirmations);
        Ok((PollOutcome::PaymentDetected, Some(detail)))
    }

    /// Sweeps Pending/Detected payments, re-queries their confirmation counts and promotes the
    /// ones that reached their threshold. Each promotion triggers a settlement recompute.
    pub async fn refresh_confirmations(&self) -> Result<usize, ReconciliationError> {
        let unconfirmed = self.db.fetch_unconfirmed_payments().await?;
        let mut promoted = 0;
        for payment in &unconfirmed {
            match self.refresh_payment(payment).await {
                Ok(true) => promoted += 1,
                Ok(false) => {},
                Err(e) => {
                    self.state.errors.fetch_add(1, Ordering::Relaxed);
                    warn!("⏱️ Could not refresh confirmations for {}: {e}", payment.tx_hash);
                },
            }
        }
        if promoted > 0 {
            info!("⏱️ {promoted} payment(s) reached their confirmation threshold");
        }
        Ok(promoted)
    }

    async fn refresh_payment(&self, payment: &PaymentTransaction) -> Result<bool, ReconciliationError> {
        let invoice = self
            .db
            .fetch_invoice(&payment.invoice_id)
            .await?
            .ok_or_else(|| ReconciliationError::InvoiceNotFound(payment.invoice_id.clone()))?;
        let reported = self.current_confirmations(&invoice, payment).await?;
        // Counts are monotonic; a source briefly reporting fewer confirmations is ignored.
        let confirmations = reported.max(payment.confirmations);
        let status = PaymentStatus::for_confirmations(confirmations, payment.required_confirmations);
        if status == PaymentStatus::Confirmed {
            let confirmation = PaymentConfirmation::new(payment.id, confirmations);
            let settlement = self.reconciliation.reconcile(&payment.invoice_id, Some(confirmation)).await?;
            self.state.payments_confirmed.fetch_add(1, Ordering::Relaxed);
            info!("⏱️✅️ Payment {} confirmed with {confirmations} confirmation(s)", payment.tx_hash);
            if let Some(updated) = self.db.fetch_payment_by_tx_hash(&payment.tx_hash, &payment.network).await? {
                self.call_payment_confirmed_hook(&invoice, &updated).await;
            }
            trace!(
                "⏱️ Settlement after confirming {}: {} -> {}",
                payment.tx_hash,
                settlement.previous_status,
                settlement.new_status
            );
            return Ok(true);
        }
        if confirmations != payment.confirmations || status != payment.status {
            self.db.update_payment_confirmations(payment.id, confirmations, status).await?;
            trace!("⏱️ Payment {} now at {confirmations}/{} confirmations", payment.tx_hash, payment.required_confirmations);
        }
        Ok(false)
    }

    /// The freshest confirmation count for the payment: the exchange feed first, then the
    /// explorer. When neither source can see the transaction, the stored count stands.
    async fn current_confirmations(
        &self,
        invoice: &Invoice,
        payment: &PaymentTransaction,
    ) -> Result<i64, ReconciliationError> {
        let from_exchange = match self.source.deposits(&payment.currency, &payment.network, invoice.issue_date).await
        {
            Ok(deposits) => deposits.into_iter().find(|d| d.tx_hash == payment.tx_hash).map(|d| d.confirmations),
            Err(e) => {
                warn!("⏱️ Exchange feed unavailable for {}; falling back to the explorer: {e}", payment.tx_hash);
                None
            },
        };
        match from_exchange {
            Some(count) => Ok(count),
            None => {
                let tx = self.verifier.verify_transaction(&payment.tx_hash, &payment.currency, &payment.network).await?;
                Ok(tx.map(|t| t.confirmations).unwrap_or(payment.confirmations))
            },
        }
    }

    /// Operator override, bypassing the polling cadence. The exchange feed is consulted first,
    /// then the explorer; address and amount are validated before anything is written, and any
    /// validation failure returns an error with no side effects.
    pub async fn manual_verify(
        &self,
        invoice_id: &InvoiceId,
        tx_hash: &str,
        operator: &str,
    ) -> Result<VerificationResult, VerificationError> {
        let invoice = self
            .db
            .fetch_invoice(invoice_id)
            .await
            .map_err(VerificationError::Backend)?
            .ok_or_else(|| VerificationError::InvoiceNotFound(invoice_id.clone()))?;
        if self.db.payment_exists(tx_hash, &invoice.network).await.map_err(VerificationError::Backend)? {
            return Err(VerificationError::DuplicateTransaction(tx_hash.to_string()));
        }
        let (amount, confirmations, to_address) = self.locate_transaction(&invoice, tx_hash).await?;
        if let Some(address) = &to_address {
            if !address.eq_ignore_ascii_case(&invoice.deposit_address) {
                return Err(VerificationError::AddressMismatch {
                    expected: invoice.deposit_address.clone(),
                    actual: address.clone(),
                });
            }
        }
        let now = Utc::now();
        let resolved = self.resolver.resolve(&invoice, now);
        let tolerance_bps = self.effective_tolerance(&invoice, &resolved);
        if !amount.within_tolerance(resolved.amount, tolerance_bps) {
            let (lower, upper) = resolved.amount.tolerance_band(tolerance_bps);
            return Err(VerificationError::AmountOutOfTolerance {
                invoice_id: invoice_id.clone(),
                received: amount,
                lower,
                upper,
            });
        }
        let new_payment = NewPaymentTransaction::manual(&invoice, tx_hash, amount, confirmations, operator);
        let payment = self.db.insert_payment(new_payment).await.map_err(|e| match e {
            ReconciliationError::PaymentAlreadyExists(tx) => VerificationError::DuplicateTransaction(tx),
            e => VerificationError::Backend(e),
        })?;
        info!("🛠️ Operator {operator} manually verified tx {tx_hash} against invoice {invoice_id}");
        let invoice = self.lifecycle.mark_partially_paid(&invoice).await.map_err(VerificationError::Backend)?;
        self.call_payment_detected_hook(&invoice, &payment).await;
        self.state.payments_detected.fetch_add(1, Ordering::Relaxed);
        self.state.payments_confirmed.fetch_add(1, Ordering::Relaxed);
        self.call_payment_confirmed_hook(&invoice, &payment).await;
        let settlement =
            self.reconciliation.reconcile(invoice_id, None).await.map_err(VerificationError::Backend)?;
        Ok(VerificationResult { payment, settlement })
    }

    /// Finds the transaction for manual verification: the exchange deposit feed first, then the
    /// explorer. The explorer path also yields the receiving address for the address check.
    async fn locate_transaction(
        &self,
        invoice: &Invoice,
        tx_hash: &str,
    ) -> Result<(cpr_common::CoinAmount, i64, Option<String>), VerificationError> {
        match self.source.deposits(&invoice.currency, &invoice.network, invoice.issue_date).await {
            Ok(deposits) => {
                if let Some(deposit) = deposits.into_iter().find(|d| d.tx_hash == tx_hash) {
                    return Ok((deposit.amount, deposit.confirmations, None));
                }
            },
            Err(e) => {
                warn!("🛠️ Exchange feed unavailable during manual verification of {tx_hash}: {e}");
            },
        }
        let tx = self
            .verifier
            .verify_transaction(tx_hash, &invoice.currency, &invoice.network)
            .await?
            .ok_or_else(|| VerificationError::TransactionNotFound(tx_hash.to_string()))?;
        Ok((tx.amount, tx.confirmations, Some(tx.to_address)))
    }

    fn effective_tolerance(&self, invoice: &Invoice, resolved: &ResolvedAmount) -> i64 {
        let base = invoice.tolerance_bps();
        if resolved.rate_lock_expired {
            base * self.config.rate_expired_tolerance_multiplier
        } else {
            base
        }
    }

    async fn call_payment_detected_hook(&self, invoice: &Invoice, payment: &PaymentTransaction) {
        for emitter in &self.producers.payment_detected_producer {
            debug!("⏱️ Notifying payment-detected hook subscribers");
            emitter.publish_event(PaymentDetectedEvent::new(invoice.clone(), payment.clone())).await;
        }
    }

    async fn call_payment_confirmed_hook(&self, invoice: &Invoice, payment: &PaymentTransaction) {
        for emitter in &self.producers.payment_confirmed_producer {
            debug!("⏱️ Notifying payment-confirmed hook subscribers");
            emitter.publish_event(PaymentConfirmedEvent::new(invoice.clone(), payment.clone())).await;
        }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}
