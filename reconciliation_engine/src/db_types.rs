use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Duration, Utc};
use cpr_common::CoinAmount;
use log::error;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

use crate::helpers::default_tolerance_bps;

#[derive(Debug, Clone, Error)]
#[error("Invalid status: {0}")]
pub struct ConversionError(String);

//--------------------------------------      InvoiceId       --------------------------------------------------------
/// The externally assigned invoice reference, e.g. "INV-2024-0042".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct InvoiceId(pub String);

impl FromStr for InvoiceId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for InvoiceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for InvoiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl InvoiceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------    InvoiceStatus     --------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum InvoiceStatus {
    /// The invoice has been issued and no deposits have been matched against it.
    Sent,
    /// At least one deposit has been matched, but the invoice has not settled yet.
    PartiallyPaid,
    /// Settlement found the confirmed total short of the tolerance band.
    Partial,
    /// The confirmed total lies within the tolerance band.
    Paid,
    /// The confirmed total exceeds the tolerance band. The excess is queued for a manual
    /// refund decision; no refund is ever executed automatically.
    Overpaid,
    /// The invoice passed its expiration window without any matched deposit.
    Expired,
    /// The due date has passed without full payment. Informational; payment processing
    /// continues.
    Overdue,
}

impl InvoiceStatus {
    /// The transition table enforced on every status write. `Expired` and the settlement
    /// outcomes are terminal for automatic polling, but late confirmations may still move a
    /// settled invoice between settlement outcomes (recompute-from-scratch reconciliation).
    pub fn can_transition(self, to: InvoiceStatus) -> bool {
        use InvoiceStatus::*;
        matches!(
            (self, to),
            (Sent, PartiallyPaid | Expired | Overdue)
                | (Overdue, PartiallyPaid | Partial | Paid | Overpaid)
                | (PartiallyPaid, Partial | Paid | Overpaid | Overdue)
                | (Partial, Paid | Overpaid)
                | (Paid, Overpaid)
        )
    }

    /// True for statuses the polling loop still visits.
    pub fn is_pending(self) -> bool {
        matches!(self, InvoiceStatus::Sent | InvoiceStatus::PartiallyPaid | InvoiceStatus::Overdue)
    }
}

impl Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvoiceStatus::Sent => write!(f, "Sent"),
            InvoiceStatus::PartiallyPaid => write!(f, "PartiallyPaid"),
            InvoiceStatus::Partial => write!(f, "Partial"),
            InvoiceStatus::Paid => write!(f, "Paid"),
            InvoiceStatus::Overpaid => write!(f, "Overpaid"),
            InvoiceStatus::Expired => write!(f, "Expired"),
            InvoiceStatus::Overdue => write!(f, "Overdue"),
        }
    }
}

impl FromStr for InvoiceStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Sent" => Ok(Self::Sent),
            "PartiallyPaid" => Ok(Self::PartiallyPaid),
            "Partial" => Ok(Self::Partial),
            "Paid" => Ok(Self::Paid),
            "Overpaid" => Ok(Self::Overpaid),
            "Expired" => Ok(Self::Expired),
            "Overdue" => Ok(Self::Overdue),
            s => Err(ConversionError(format!("Invalid invoice status: {s}"))),
        }
    }
}

impl From<String> for InvoiceStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid invoice status: {value}. But this conversion cannot fail. Defaulting to Sent");
            InvoiceStatus::Sent
        })
    }
}

//--------------------------------------       Invoice        --------------------------------------------------------
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Invoice {
    pub id: i64,
    pub invoice_id: InvoiceId,
    pub currency: String,
    pub network: String,
    pub expected_amount: CoinAmount,
    /// The receiving address. Shared across invoices, so it identifies the wallet, never the
    /// invoice.
    pub deposit_address: String,
    pub issue_date: DateTime<Utc>,
    pub expiration_hours: i64,
    pub due_date: Option<DateTime<Utc>>,
    /// While `now` is at or before this instant, the quoted `expected_amount` is authoritative.
    pub rate_lock_expiry: Option<DateTime<Utc>>,
    /// Per-invoice override of the currency-class matching tolerance, in basis points.
    pub payment_tolerance_bps: Option<i64>,
    pub status: InvoiceStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl Invoice {
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.issue_date + Duration::hours(self.expiration_hours)
    }

    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }

    /// The matching tolerance for this invoice: the per-invoice override if set, otherwise the
    /// currency-class default (stablecoins are tight, everything else gets a volatility buffer).
    pub fn tolerance_bps(&self) -> i64 {
        self.payment_tolerance_bps.unwrap_or_else(|| default_tolerance_bps(&self.currency))
    }
}

//--------------------------------------      NewInvoice      --------------------------------------------------------
/// Invoices are created by the external invoicing workflow; the engine only transitions them.
#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub invoice_id: InvoiceId,
    pub currency: String,
    pub network: String,
    pub expected_amount: CoinAmount,
    pub deposit_address: String,
    pub issue_date: DateTime<Utc>,
    pub expiration_hours: i64,
    pub due_date: Option<DateTime<Utc>>,
    pub rate_lock_expiry: Option<DateTime<Utc>>,
    pub payment_tolerance_bps: Option<i64>,
}

impl NewInvoice {
    pub fn new(invoice_id: InvoiceId, currency: &str, network: &str, expected_amount: CoinAmount, address: &str) -> Self {
        Self {
            invoice_id,
            currency: currency.to_string(),
            network: network.to_string(),
            expected_amount,
            deposit_address: address.to_string(),
            issue_date: Utc::now(),
            expiration_hours: 24,
            due_date: None,
            rate_lock_expiry: None,
            payment_tolerance_bps: None,
        }
    }

    pub fn with_issue_date(mut self, issue_date: DateTime<Utc>) -> Self {
        self.issue_date = issue_date;
        self
    }

    pub fn with_expiration_hours(mut self, hours: i64) -> Self {
        self.expiration_hours = hours;
        self
    }

    pub fn with_due_date(mut self, due_date: DateTime<Utc>) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn with_rate_lock_expiry(mut self, expiry: DateTime<Utc>) -> Self {
        self.rate_lock_expiry = Some(expiry);
        self
    }

    pub fn with_tolerance_bps(mut self, bps: i64) -> Self {
        self.payment_tolerance_bps = Some(bps);
        self
    }
}

//--------------------------------------    PaymentStatus     --------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PaymentStatus {
    /// Matched, zero confirmations seen yet.
    Pending,
    /// Matched, confirmations accruing below the required threshold.
    Detected,
    /// At or past the required confirmation threshold. Only confirmation-count corrections may
    /// touch the record after this point.
    Confirmed,
}

impl PaymentStatus {
    pub fn for_confirmations(confirmations: i64, required: i64) -> Self {
        if confirmations >= required {
            Self::Confirmed
        } else if confirmations > 0 {
            Self::Detected
        } else {
            Self::Pending
        }
    }
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "Pending"),
            PaymentStatus::Detected => write!(f, "Detected"),
            PaymentStatus::Confirmed => write!(f, "Confirmed"),
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Detected" => Ok(Self::Detected),
            "Confirmed" => Ok(Self::Confirmed),
            s => Err(ConversionError(format!("Invalid payment status: {s}"))),
        }
    }
}

impl From<String> for PaymentStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid payment status: {value}. But this conversion cannot fail. Defaulting to Pending");
            PaymentStatus::Pending
        })
    }
}

//-------------------------------------- PaymentTransaction   --------------------------------------------------------
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub id: i64,
    pub invoice_id: InvoiceId,
    pub tx_hash: String,
    pub amount_received: CoinAmount,
    pub currency: String,
    pub network: String,
    pub confirmations: i64,
    pub required_confirmations: i64,
    pub status: PaymentStatus,
    pub is_manual_verification: bool,
    pub verified_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//-------------------------------------- NewPaymentTransaction ------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewPaymentTransaction {
    pub invoice_id: InvoiceId,
    pub tx_hash: String,
    pub amount_received: CoinAmount,
    pub currency: String,
    pub network: String,
    pub confirmations: i64,
    pub required_confirmations: i64,
    pub status: PaymentStatus,
    pub is_manual_verification: bool,
    pub verified_by: Option<String>,
}

impl NewPaymentTransaction {
    /// A payment created by the automatic polling path from a matched deposit.
    pub fn from_deposit(invoice: &Invoice, deposit: &Deposit, required_confirmations: i64) -> Self {
        Self {
            invoice_id: invoice.invoice_id.clone(),
            tx_hash: deposit.tx_hash.clone(),
            amount_received: deposit.amount,
            currency: deposit.currency.clone(),
            network: deposit.network.clone(),
            confirmations: deposit.confirmations,
            required_confirmations,
            status: PaymentStatus::for_confirmations(deposit.confirmations, required_confirmations),
            is_manual_verification: false,
            verified_by: None,
        }
    }

    /// A payment created by an operator override. Always inserted as `Confirmed`.
    pub fn manual(
        invoice: &Invoice,
        tx_hash: &str,
        amount: CoinAmount,
        confirmations: i64,
        operator: &str,
    ) -> Self {
        Self {
            invoice_id: invoice.invoice_id.clone(),
            tx_hash: tx_hash.to_string(),
            amount_received: amount,
            currency: invoice.currency.clone(),
            network: invoice.network.clone(),
            confirmations,
            required_confirmations: confirmations.max(1),
            status: PaymentStatus::Confirmed,
            is_manual_verification: true,
            verified_by: Some(operator.to_string()),
        }
    }
}

//--------------------------------------       Deposit        --------------------------------------------------------
/// A normalised deposit record as returned by a deposit source, before any matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    pub tx_hash: String,
    pub amount: CoinAmount,
    pub currency: String,
    pub network: String,
    pub confirmations: i64,
    pub timestamp: DateTime<Utc>,
}

//--------------------------------------      TxDetails       --------------------------------------------------------
/// A transaction as reported by the blockchain explorer fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxDetails {
    pub tx_hash: String,
    pub amount: CoinAmount,
    pub to_address: String,
    pub confirmations: i64,
    pub timestamp: DateTime<Utc>,
}

//--------------------------------------     PollOutcome      --------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PollOutcome {
    NoPayment,
    PaymentDetected,
    PartialPayment,
    Overpayment,
    Expired,
    Error,
}

impl Display for PollOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PollOutcome::NoPayment => write!(f, "NoPayment"),
            PollOutcome::PaymentDetected => write!(f, "PaymentDetected"),
            PollOutcome::PartialPayment => write!(f, "PartialPayment"),
            PollOutcome::Overpayment => write!(f, "Overpayment"),
            PollOutcome::Expired => write!(f, "Expired"),
            PollOutcome::Error => write!(f, "Error"),
        }
    }
}

impl FromStr for PollOutcome {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NoPayment" => Ok(Self::NoPayment),
            "PaymentDetected" => Ok(Self::PaymentDetected),
            "PartialPayment" => Ok(Self::PartialPayment),
            "Overpayment" => Ok(Self::Overpayment),
            "Expired" => Ok(Self::Expired),
            "Error" => Ok(Self::Error),
            s => Err(ConversionError(format!("Invalid poll outcome: {s}"))),
        }
    }
}

impl From<String> for PollOutcome {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid poll outcome: {value}. But this conversion cannot fail. Defaulting to Error");
            PollOutcome::Error
        })
    }
}

//--------------------------------------    PollingEvent      --------------------------------------------------------
/// One audit row per poll cycle per invoice. Append-only; the answer to "why wasn't this
/// invoice paid" lives here.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PollingEvent {
    pub id: i64,
    pub invoice_id: InvoiceId,
    pub outcome: PollOutcome,
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPollingEvent {
    pub invoice_id: InvoiceId,
    pub outcome: PollOutcome,
    pub detail: Option<String>,
}

impl NewPollingEvent {
    pub fn new(invoice_id: InvoiceId, outcome: PollOutcome) -> Self {
        Self { invoice_id, outcome, detail: None }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn error(invoice_id: InvoiceId, detail: impl Into<String>) -> Self {
        Self { invoice_id, outcome: PollOutcome::Error, detail: Some(detail.into()) }
    }
}
