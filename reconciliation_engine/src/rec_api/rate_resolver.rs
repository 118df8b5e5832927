//! Rate-lock aware expected-amount resolution.
//!
//! The crypto amount quoted at invoice creation stays valid for the rate-lock window
//! (typically 15 minutes). Past the window the amount should be requoted from a live feed;
//! until one is integrated, the shipped resolver keeps the quoted amount and flags the expiry
//! so that callers widen their matching tolerance. A live-feed implementation slots in behind
//! the same trait.

use chrono::{DateTime, Utc};
use cpr_common::CoinAmount;
use log::debug;

use crate::db_types::Invoice;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedAmount {
    pub amount: CoinAmount,
    /// True when the rate lock had lapsed and the amount is a stale quote. Callers widen the
    /// matching tolerance in this case.
    pub rate_lock_expired: bool,
}

pub trait RateResolver {
    fn resolve(&self, invoice: &Invoice, now: DateTime<Utc>) -> ResolvedAmount;
}

/// The default resolver: the quoted amount is authoritative inside the lock window, and kept
/// (flagged) outside it.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuotedRateResolver;

impl RateResolver for QuotedRateResolver {
    fn resolve(&self, invoice: &Invoice, now: DateTime<Utc>) -> ResolvedAmount {
        match invoice.rate_lock_expiry {
            Some(expiry) if now > expiry => {
                debug!(
                    "🪙️ Rate lock on invoice {} lapsed at {expiry}; keeping the quoted amount {}",
                    invoice.invoice_id, invoice.expected_amount
                );
                ResolvedAmount { amount: invoice.expected_amount, rate_lock_expired: true }
            },
            _ => ResolvedAmount { amount: invoice.expected_amount, rate_lock_expired: false },
        }
    }
}
