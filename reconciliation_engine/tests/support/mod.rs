pub mod mocks;
pub mod prepare_env;

use chrono::{Duration, Utc};
use cpr_common::CoinAmount;
use reconciliation_engine::db_types::{Deposit, InvoiceId, NewInvoice};

pub fn invoice_id(s: &str) -> InvoiceId {
    InvoiceId(s.to_string())
}

pub fn amount(s: &str) -> CoinAmount {
    s.parse().expect("Not a valid amount")
}

/// A fresh USDT/TRC20 invoice against the shared test wallet.
pub fn usdt_invoice(id: &str, expected: &str) -> NewInvoice {
    NewInvoice::new(invoice_id(id), "USDT", "TRC20", amount(expected), "TSharedWallet1")
}

/// An invoice whose expiration window already lies in the past.
pub fn stale_invoice(id: &str, expected: &str, hours_old: i64, expiration_hours: i64) -> NewInvoice {
    usdt_invoice(id, expected)
        .with_issue_date(Utc::now() - Duration::hours(hours_old))
        .with_expiration_hours(expiration_hours)
}

pub fn deposit(tx_hash: &str, amount_str: &str, confirmations: i64) -> Deposit {
    Deposit {
        tx_hash: tx_hash.to_string(),
        amount: amount(amount_str),
        currency: "USDT".to_string(),
        network: "TRC20".to_string(),
        confirmations,
        timestamp: Utc::now(),
    }
}

