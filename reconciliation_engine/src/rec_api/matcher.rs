//! Amount-based deposit matching.
//!
//! Deposit addresses are shared across invoices, so the amount is the only signal linking a
//! deposit to an invoice. A candidate matches when its amount falls inside the invoice's
//! tolerance band and its `(tx_hash, network)` is not already linked.

use cpr_common::CoinAmount;
use log::trace;

use crate::db_types::{Deposit, Invoice, PaymentTransaction};

/// Finds the first candidate deposit that pays the invoice.
///
/// Candidates must already be filtered to the invoice's network and arrive in source order;
/// when several unlinked deposits satisfy the band simultaneously, the first one returned by
/// the source wins. That tie-break is deliberate, and callers must tolerate it.
///
/// This is a pure function: the caller runs the system-wide dedup check and persists the match.
/// Returning `None` means nothing qualified, which is not an error.
pub fn find_match<'a>(
    invoice: &Invoice,
    expected: CoinAmount,
    tolerance_bps: i64,
    candidates: &'a [Deposit],
    existing: &[PaymentTransaction],
) -> Option<&'a Deposit> {
    candidates.iter().find(|deposit| {
        if !deposit.currency.eq_ignore_ascii_case(&invoice.currency) {
            return false;
        }
        if existing.iter().any(|p| p.tx_hash == deposit.tx_hash && p.network == deposit.network) {
            trace!("🧮️ Deposit {} is already linked to invoice {}", deposit.tx_hash, invoice.invoice_id);
            return false;
        }
        deposit.amount.within_tolerance(expected, tolerance_bps)
    })
}

#[cfg(test)]
mod test {
    use chrono::Utc;

    use super::*;
    use crate::db_types::{InvoiceStatus, NewInvoice, NewPaymentTransaction, PaymentStatus, PaymentTransaction};

    fn invoice(expected: &str) -> Invoice {
        let now = Utc::now();
        let new = NewInvoice::new("INV-7".parse().unwrap(), "USDT", "TRC20", expected.parse().unwrap(), "TShared1");
        Invoice {
            id: 7,
            invoice_id: new.invoice_id,
            currency: new.currency,
            network: new.network,
            expected_amount: new.expected_amount,
            deposit_address: new.deposit_address,
            issue_date: now,
            expiration_hours: 24,
            due_date: None,
            rate_lock_expiry: None,
            payment_tolerance_bps: None,
            status: InvoiceStatus::Sent,
            created_at: now,
            updated_at: now,
            paid_at: None,
        }
    }

    fn deposit(tx_hash: &str, amount: &str) -> Deposit {
        Deposit {
            tx_hash: tx_hash.to_string(),
            amount: amount.parse().unwrap(),
            currency: "USDT".to_string(),
            network: "TRC20".to_string(),
            confirmations: 1,
            timestamp: Utc::now(),
        }
    }

    fn linked(invoice: &Invoice, deposit: &Deposit) -> PaymentTransaction {
        let new = NewPaymentTransaction::from_deposit(invoice, deposit, 19);
        PaymentTransaction {
            id: 1,
            invoice_id: new.invoice_id,
            tx_hash: new.tx_hash,
            amount_received: new.amount_received,
            currency: new.currency,
            network: new.network,
            confirmations: new.confirmations,
            required_confirmations: new.required_confirmations,
            status: PaymentStatus::Detected,
            is_manual_verification: false,
            verified_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn matches_amount_within_band() {
        let inv = invoice("100");
        let candidates = vec![deposit("tx-a", "250"), deposit("tx-b", "100.05"), deposit("tx-c", "99.95")];
        let expected = inv.expected_amount;
        let hit = find_match(&inv, expected, 10, &candidates, &[]).unwrap();
        assert_eq!(hit.tx_hash, "tx-b");
    }

    #[test]
    fn first_in_source_order_wins_ties() {
        let inv = invoice("100");
        let candidates = vec![deposit("tx-1", "100.01"), deposit("tx-2", "100")];
        let hit = find_match(&inv, inv.expected_amount, 10, &candidates, &[]).unwrap();
        assert_eq!(hit.tx_hash, "tx-1");
    }

    #[test]
    fn skips_deposits_already_linked_to_the_invoice() {
        let inv = invoice("100");
        let candidates = vec![deposit("tx-1", "100"), deposit("tx-2", "100.02")];
        let existing = vec![linked(&inv, &candidates[0])];
        let hit = find_match(&inv, inv.expected_amount, 10, &candidates, &existing).unwrap();
        assert_eq!(hit.tx_hash, "tx-2");
    }

    #[test]
    fn band_edges_are_accepted() {
        let inv = invoice("100");
        let low = vec![deposit("tx-low", "99.9")];
        let high = vec![deposit("tx-high", "100.1")];
        assert!(find_match(&inv, inv.expected_amount, 10, &low, &[]).is_some());
        assert!(find_match(&inv, inv.expected_amount, 10, &high, &[]).is_some());
        let outside = vec![deposit("tx-out", "100.11")];
        assert!(find_match(&inv, inv.expected_amount, 10, &outside, &[]).is_none());
    }

    #[test]
    fn no_candidates_is_no_match() {
        let inv = invoice("100");
        assert!(find_match(&inv, inv.expected_amount, 10, &[], &[]).is_none());
    }

    #[test]
    fn currency_mismatch_is_skipped() {
        let inv = invoice("100");
        let mut d = deposit("tx-eth", "100");
        d.currency = "ETH".to_string();
        assert!(find_match(&inv, inv.expected_amount, 10, &[d], &[]).is_none());
    }

    #[test]
    fn widened_tolerance_accepts_more() {
        let inv = invoice("100");
        let candidates = vec![deposit("tx-w", "100.4")];
        assert!(find_match(&inv, inv.expected_amount, 10, &candidates, &[]).is_none());
        // 5x widening after a rate-lock expiry: 50 bps on 100 reaches 100.5
        assert!(find_match(&inv, inv.expected_amount, 50, &candidates, &[]).is_some());
    }
}
