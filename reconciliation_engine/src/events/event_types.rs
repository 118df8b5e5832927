use serde::{Deserialize, Serialize};

use crate::{
    db_types::{Invoice, PaymentTransaction},
    traits::Settlement,
};

/// A deposit has been matched to an invoice and a payment transaction was created for it.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentDetectedEvent {
    pub invoice: Invoice,
    pub payment: PaymentTransaction,
}

impl PaymentDetectedEvent {
    pub fn new(invoice: Invoice, payment: PaymentTransaction) -> Self {
        Self { invoice, payment }
    }
}

/// A payment reached its confirmation threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentConfirmedEvent {
    pub invoice: Invoice,
    pub payment: PaymentTransaction,
}

impl PaymentConfirmedEvent {
    pub fn new(invoice: Invoice, payment: PaymentTransaction) -> Self {
        Self { invoice, payment }
    }
}

/// Settlement found the confirmed total short of the tolerance band.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialPaymentEvent {
    pub settlement: Settlement,
}

impl PartialPaymentEvent {
    pub fn new(settlement: Settlement) -> Self {
        Self { settlement }
    }
}

/// Settlement found the confirmed total over the tolerance band. The overpayment in the
/// settlement is the amount queued for a manual refund decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverpaymentEvent {
    pub settlement: Settlement,
}

impl OverpaymentEvent {
    pub fn new(settlement: Settlement) -> Self {
        Self { settlement }
    }
}

/// An invoice passed its expiration window without a matched deposit.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceExpiredEvent {
    pub invoice: Invoice,
}

impl InvoiceExpiredEvent {
    pub fn new(invoice: Invoice) -> Self {
        Self { invoice }
    }
}
