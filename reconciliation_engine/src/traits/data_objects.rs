use cpr_common::CoinAmount;
use serde::{Deserialize, Serialize};

use crate::db_types::{Invoice, InvoiceId, InvoiceStatus};

/// A confirmation-count promotion applied together with a settlement recompute, so that the
/// payment update and the resulting invoice status land in the same transaction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PaymentConfirmation {
    pub payment_id: i64,
    pub confirmations: i64,
}

impl PaymentConfirmation {
    pub fn new(payment_id: i64, confirmations: i64) -> Self {
        Self { payment_id, confirmations }
    }
}

/// The outcome of a settlement recompute over an invoice's confirmed payments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settlement {
    pub invoice_id: InvoiceId,
    pub previous_status: InvoiceStatus,
    pub new_status: InvoiceStatus,
    pub expected: CoinAmount,
    pub total_confirmed: CoinAmount,
    pub lower_bound: CoinAmount,
    pub upper_bound: CoinAmount,
    pub tolerance_bps: i64,
    /// Set when the total fell short of the band. Measured against the expected amount.
    pub shortfall: Option<CoinAmount>,
    /// Set when the total reached or exceeded the top of the band. Queued for a manual refund
    /// decision, never refunded automatically.
    pub overpayment: Option<CoinAmount>,
}

impl Settlement {
    /// Classifies a confirmed total against the invoice's tolerance band.
    ///
    /// The band is `expected ± expected·tol`. A total below the band is Partial and a total at
    /// or above the top of the band is Overpaid; the bottom edge itself still counts as Paid.
    /// A zero total leaves the status untouched (nothing has confirmed yet).
    pub fn evaluate(invoice: &Invoice, total_confirmed: CoinAmount) -> Self {
        let tolerance_bps = invoice.tolerance_bps();
        let expected = invoice.expected_amount;
        let (lower_bound, upper_bound) = expected.tolerance_band(tolerance_bps);
        let new_status = if total_confirmed.is_zero() {
            invoice.status
        } else if total_confirmed < lower_bound {
            InvoiceStatus::Partial
        } else if total_confirmed >= upper_bound {
            InvoiceStatus::Overpaid
        } else {
            InvoiceStatus::Paid
        };
        let shortfall = (new_status == InvoiceStatus::Partial).then(|| expected - total_confirmed);
        let overpayment = (new_status == InvoiceStatus::Overpaid).then(|| total_confirmed - expected);
        Self {
            invoice_id: invoice.invoice_id.clone(),
            previous_status: invoice.status,
            new_status,
            expected,
            total_confirmed,
            lower_bound,
            upper_bound,
            tolerance_bps,
            shortfall,
            overpayment,
        }
    }

    pub fn transitioned(&self) -> bool {
        self.previous_status != self.new_status
    }

    /// The shortfall as a fraction of the expected amount, in basis points.
    pub fn shortfall_bps(&self) -> Option<i64> {
        self.shortfall.map(|s| {
            if self.expected.is_zero() {
                0
            } else {
                ((s.value() as i128 * 10_000) / self.expected.value() as i128) as i64
            }
        })
    }
}
