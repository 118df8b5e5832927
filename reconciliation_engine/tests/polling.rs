//! Orchestrator-level tests: the polling cycle, confirmation sweep, manual verification and
//! failure isolation, run against a real SQLite backend with in-memory deposit feeds.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use chrono::{Duration, Utc};
use reconciliation_engine::{
    db_types::{InvoiceStatus, PaymentStatus, PollOutcome, TxDetails},
    events::{EventHandlers, EventHooks, EventProducers},
    InvoiceManagement,
    PollerConfig,
    PollingOrchestrator,
    SqliteDatabase,
    VerificationError,
};
use support::{
    amount,
    deposit,
    mocks::{MockDepositSource, MockTxVerifier},
    prepare_env::{prepare_test_env, random_db_path},
    stale_invoice,
    usdt_invoice,
};

mod support;

type TestPoller = PollingOrchestrator<SqliteDatabase, MockDepositSource, MockTxVerifier>;

async fn new_poller(required_confirmations: i64) -> (SqliteDatabase, MockDepositSource, MockTxVerifier, TestPoller) {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    let source = MockDepositSource::with_required_confirmations(required_confirmations);
    let verifier = MockTxVerifier::default();
    let poller = PollingOrchestrator::new(
        db.clone(),
        source.clone(),
        verifier.clone(),
        EventProducers::default(),
        PollerConfig::default(),
    );
    (db, source, verifier, poller)
}

#[tokio::test]
async fn a_matched_deposit_becomes_a_payment_and_the_invoice_partially_paid() {
    let (db, source, _verifier, poller) = new_poller(19).await;
    let invoice = db.insert_invoice(usdt_invoice("INV-1", "100")).await.unwrap();
    source.push(deposit("tx-1", "100.05", 1));

    poller.tick().await.unwrap();

    let invoice = db.fetch_invoice(&invoice.invoice_id).await.unwrap().unwrap();
    assert_eq!(invoice.status, InvoiceStatus::PartiallyPaid);
    let payments = db.fetch_payments_for_invoice(&invoice.invoice_id).await.unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].status, PaymentStatus::Detected);
    assert_eq!(payments[0].amount_received, amount("100.05"));
    assert_eq!(payments[0].required_confirmations, 19);
    let events = db.fetch_polling_events(&invoice.invoice_id).await.unwrap();
    assert_eq!(events.last().unwrap().outcome, PollOutcome::PaymentDetected);

    let stats = poller.statistics();
    assert_eq!(stats.total_polls, 1);
    assert_eq!(stats.payments_detected, 1);
    assert!(stats.last_poll_time.is_some());
}

#[tokio::test]
async fn repeated_ticks_never_duplicate_a_payment() {
    let (db, source, _verifier, poller) = new_poller(19).await;
    let invoice = db.insert_invoice(usdt_invoice("INV-2", "100")).await.unwrap();
    source.push(deposit("tx-2", "100", 1));

    for _ in 0..3 {
        poller.tick().await.unwrap();
    }

    let payments = db.fetch_payments_for_invoice(&invoice.invoice_id).await.unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(poller.statistics().payments_detected, 1);
}

#[tokio::test]
async fn a_deposit_pays_at_most_one_of_the_invoices_sharing_the_address() {
    let (db, source, _verifier, poller) = new_poller(1).await;
    let first = db.insert_invoice(usdt_invoice("INV-A", "100")).await.unwrap();
    let second = db.insert_invoice(usdt_invoice("INV-B", "100")).await.unwrap();
    source.push(deposit("tx-shared", "100", 1));

    poller.tick().await.unwrap();

    let first = db.fetch_invoice(&first.invoice_id).await.unwrap().unwrap();
    let second = db.fetch_invoice(&second.invoice_id).await.unwrap().unwrap();
    assert_eq!(first.status, InvoiceStatus::Paid);
    assert_eq!(second.status, InvoiceStatus::Sent);
    assert_eq!(db.fetch_payments_for_invoice(&second.invoice_id).await.unwrap().len(), 0);
    let events = db.fetch_polling_events(&second.invoice_id).await.unwrap();
    assert_eq!(events[0].outcome, PollOutcome::NoPayment);
    assert!(events[0].detail.as_deref().unwrap_or_default().contains("already linked"));
}

#[tokio::test]
async fn amounts_disambiguate_invoices_on_the_shared_address() {
    let (db, source, _verifier, poller) = new_poller(1).await;
    let small = db.insert_invoice(usdt_invoice("INV-SMALL", "100")).await.unwrap();
    let large = db.insert_invoice(usdt_invoice("INV-LARGE", "250")).await.unwrap();
    source.push(deposit("tx-large", "250", 1));
    source.push(deposit("tx-small", "100", 1));

    poller.tick().await.unwrap();

    let small_payments = db.fetch_payments_for_invoice(&small.invoice_id).await.unwrap();
    let large_payments = db.fetch_payments_for_invoice(&large.invoice_id).await.unwrap();
    assert_eq!(small_payments.len(), 1);
    assert_eq!(small_payments[0].tx_hash, "tx-small");
    assert_eq!(large_payments.len(), 1);
    assert_eq!(large_payments[0].tx_hash, "tx-large");
}

#[tokio::test]
async fn confirmations_accrue_until_the_threshold_settles_the_invoice() {
    let (db, source, _verifier, poller) = new_poller(19).await;
    let invoice = db.insert_invoice(usdt_invoice("INV-3", "100")).await.unwrap();
    source.push(deposit("tx-3", "100", 1));
    poller.tick().await.unwrap();

    source.set_confirmations("tx-3", 15);
    assert_eq!(poller.refresh_confirmations().await.unwrap(), 0);
    let payments = db.fetch_payments_for_invoice(&invoice.invoice_id).await.unwrap();
    assert_eq!(payments[0].confirmations, 15);
    assert_eq!(payments[0].status, PaymentStatus::Detected);

    source.set_confirmations("tx-3", 19);
    assert_eq!(poller.refresh_confirmations().await.unwrap(), 1);
    let invoice = db.fetch_invoice(&invoice.invoice_id).await.unwrap().unwrap();
    assert_eq!(invoice.status, InvoiceStatus::Paid);
    assert!(invoice.paid_at.is_some());
    let payments = db.fetch_payments_for_invoice(&invoice.invoice_id).await.unwrap();
    assert_eq!(payments[0].status, PaymentStatus::Confirmed);
    assert_eq!(poller.statistics().payments_confirmed, 1);
}

#[tokio::test]
async fn an_expired_invoice_is_never_checked_for_deposits() {
    let (db, source, _verifier, poller) = new_poller(1).await;
    let invoice = db.insert_invoice(stale_invoice("INV-OLD", "100", 25, 24)).await.unwrap();
    // A perfectly matching deposit exists, but expiration wins.
    source.push(deposit("tx-late", "100", 1));

    poller.tick().await.unwrap();

    let invoice = db.fetch_invoice(&invoice.invoice_id).await.unwrap().unwrap();
    assert_eq!(invoice.status, InvoiceStatus::Expired);
    assert!(db.fetch_payments_for_invoice(&invoice.invoice_id).await.unwrap().is_empty());
    let events = db.fetch_polling_events(&invoice.invoice_id).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].outcome, PollOutcome::Expired);

    // Terminal for polling: the next tick does not touch it at all.
    poller.tick().await.unwrap();
    let events = db.fetch_polling_events(&invoice.invoice_id).await.unwrap();
    assert_eq!(events.len(), 1);
}

#[tokio::test]
async fn one_failing_invoice_never_aborts_the_batch() {
    let (db, source, _verifier, poller) = new_poller(1).await;
    let a = db.insert_invoice(usdt_invoice("INV-ERR-A", "100")).await.unwrap();
    let b = db.insert_invoice(usdt_invoice("INV-ERR-B", "200")).await.unwrap();
    source.set_offline(true);

    poller.tick().await.unwrap();

    for invoice_id in [&a.invoice_id, &b.invoice_id] {
        let events = db.fetch_polling_events(invoice_id).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].outcome, PollOutcome::Error);
        let invoice = db.fetch_invoice(invoice_id).await.unwrap().unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Sent);
    }
    assert_eq!(poller.statistics().errors, 2);

    // The feed comes back; the next cycle picks the deposits up as if nothing happened.
    source.set_offline(false);
    source.push(deposit("tx-recover", "100", 1));
    poller.tick().await.unwrap();
    let a = db.fetch_invoice(&a.invoice_id).await.unwrap().unwrap();
    assert_eq!(a.status, InvoiceStatus::Paid);
}

#[tokio::test]
async fn a_lapsed_rate_lock_widens_matching_but_not_settlement() {
    let (db, source, _verifier, poller) = new_poller(1).await;
    let invoice = usdt_invoice("INV-RATE", "100").with_rate_lock_expiry(Utc::now() - Duration::seconds(1));
    let invoice = db.insert_invoice(invoice).await.unwrap();
    // 99.6 is outside the 0.1% stablecoin band but inside the 5x-widened matching band.
    source.push(deposit("tx-stale-rate", "99.6", 1));

    poller.tick().await.unwrap();

    let invoice = db.fetch_invoice(&invoice.invoice_id).await.unwrap().unwrap();
    assert_eq!(invoice.status, InvoiceStatus::Partial);
    let events = db.fetch_polling_events(&invoice.invoice_id).await.unwrap();
    assert_eq!(events.last().unwrap().outcome, PollOutcome::PartialPayment);
}

#[tokio::test]
async fn a_second_full_deposit_overpays_the_invoice() {
    let (db, source, _verifier, poller) = new_poller(1).await;
    let invoice = db.insert_invoice(usdt_invoice("INV-DOUBLE", "100")).await.unwrap();
    source.push(deposit("tx-pay-1", "100", 1));
    poller.tick().await.unwrap();
    assert_eq!(db.fetch_invoice(&invoice.invoice_id).await.unwrap().unwrap().status, InvoiceStatus::Paid);

    // The customer pays the same invoice twice.
    source.push(deposit("tx-pay-2", "100.02", 1));
    poller.tick().await.unwrap();

    let invoice = db.fetch_invoice(&invoice.invoice_id).await.unwrap().unwrap();
    assert_eq!(invoice.status, InvoiceStatus::Overpaid);
    let events = db.fetch_polling_events(&invoice.invoice_id).await.unwrap();
    assert_eq!(events.last().unwrap().outcome, PollOutcome::Overpayment);
}

#[tokio::test]
async fn manual_verification_via_the_explorer_settles_the_invoice() {
    let (db, _source, verifier, poller) = new_poller(1).await;
    let invoice = db.insert_invoice(usdt_invoice("INV-MAN", "100")).await.unwrap();
    verifier.insert(TxDetails {
        tx_hash: "tx-manual".to_string(),
        amount: amount("100"),
        to_address: "TSharedWallet1".to_string(),
        confirmations: 3,
        timestamp: Utc::now(),
    });

    let result = poller.manual_verify(&invoice.invoice_id, "tx-manual", "ops@example.com").await.unwrap();
    assert!(result.payment.is_manual_verification);
    assert_eq!(result.payment.verified_by.as_deref(), Some("ops@example.com"));
    assert_eq!(result.payment.status, PaymentStatus::Confirmed);
    assert_eq!(result.settlement.new_status, InvoiceStatus::Paid);
    let invoice = db.fetch_invoice(&invoice.invoice_id).await.unwrap().unwrap();
    assert_eq!(invoice.status, InvoiceStatus::Paid);

    // Verifying the same transaction again is rejected by the dedup invariant.
    let err = poller.manual_verify(&invoice.invoice_id, "tx-manual", "ops@example.com").await.unwrap_err();
    assert!(matches!(err, VerificationError::DuplicateTransaction(_)));
}

#[tokio::test]
async fn manual_verification_prefers_the_exchange_feed() {
    let (db, source, _verifier, poller) = new_poller(2).await;
    let invoice = db.insert_invoice(usdt_invoice("INV-MAN-X", "100")).await.unwrap();
    // Known to the exchange, unknown to the explorer.
    source.push(deposit("tx-on-exchange", "100.01", 5));

    let result = poller.manual_verify(&invoice.invoice_id, "tx-on-exchange", "ops").await.unwrap();
    assert_eq!(result.payment.amount_received, amount("100.01"));
    assert_eq!(result.payment.confirmations, 5);
    assert_eq!(result.settlement.new_status, InvoiceStatus::Paid);
}

#[tokio::test]
async fn manual_verification_fails_closed() {
    let (db, _source, verifier, poller) = new_poller(1).await;
    let invoice = db.insert_invoice(usdt_invoice("INV-CLOSED", "100")).await.unwrap();

    // Unknown everywhere.
    let err = poller.manual_verify(&invoice.invoice_id, "tx-ghost", "ops").await.unwrap_err();
    assert!(matches!(err, VerificationError::TransactionNotFound(_)));

    // Wrong receiving address.
    verifier.insert(TxDetails {
        tx_hash: "tx-wrong-addr".to_string(),
        amount: amount("100"),
        to_address: "TSomeoneElse".to_string(),
        confirmations: 3,
        timestamp: Utc::now(),
    });
    let err = poller.manual_verify(&invoice.invoice_id, "tx-wrong-addr", "ops").await.unwrap_err();
    assert!(matches!(err, VerificationError::AddressMismatch { .. }));

    // Amount outside the tolerance band.
    verifier.insert(TxDetails {
        tx_hash: "tx-wrong-amount".to_string(),
        amount: amount("150"),
        to_address: "TSharedWallet1".to_string(),
        confirmations: 3,
        timestamp: Utc::now(),
    });
    let err = poller.manual_verify(&invoice.invoice_id, "tx-wrong-amount", "ops").await.unwrap_err();
    assert!(matches!(err, VerificationError::AmountOutOfTolerance { .. }));

    // Nothing was written and the invoice is untouched.
    assert!(db.fetch_payments_for_invoice(&invoice.invoice_id).await.unwrap().is_empty());
    let invoice = db.fetch_invoice(&invoice.invoice_id).await.unwrap().unwrap();
    assert_eq!(invoice.status, InvoiceStatus::Sent);

    // An unknown invoice is rejected outright.
    let err = poller.manual_verify(&support::invoice_id("INV-NOPE"), "tx-ghost", "ops").await.unwrap_err();
    assert!(matches!(err, VerificationError::InvoiceNotFound(_)));
}

#[tokio::test]
async fn detection_events_reach_subscribed_hooks() {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    let detected = Arc::new(AtomicU64::new(0));
    let mut hooks = EventHooks::default();
    let counter = detected.clone();
    hooks.on_payment_detected(move |_ev| {
        let counter = counter.clone();
        Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    });
    let handlers = EventHandlers::new(10, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let source = MockDepositSource::with_required_confirmations(19);
    let poller = PollingOrchestrator::new(
        db.clone(),
        source.clone(),
        MockTxVerifier::default(),
        producers,
        PollerConfig::default(),
    );
    db.insert_invoice(usdt_invoice("INV-HOOK", "100")).await.unwrap();
    source.push(deposit("tx-hook", "100", 1));

    poller.tick().await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    assert_eq!(detected.load(Ordering::SeqCst), 1);
}
