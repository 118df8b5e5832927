use crate::{
    db_types::{Invoice, InvoiceId, NewInvoice, PaymentTransaction, PollingEvent},
    traits::ReconciliationError,
};

/// Read-side queries over invoices, payments and the polling audit trail, plus the insertion
/// entry point used by the external invoicing workflow.
#[allow(async_fn_in_trait)]
pub trait InvoiceManagement: Clone {
    /// Stores a freshly issued invoice. Idempotent: inserting an `invoice_id` that already
    /// exists returns the stored record unchanged.
    async fn insert_invoice(&self, invoice: NewInvoice) -> Result<Invoice, ReconciliationError>;

    async fn fetch_invoice(&self, invoice_id: &InvoiceId) -> Result<Option<Invoice>, ReconciliationError>;

    /// All invoices the polling loop still visits (Sent, PartiallyPaid, Overdue), oldest first.
    async fn fetch_pending_invoices(&self) -> Result<Vec<Invoice>, ReconciliationError>;

    /// The full payment history for the invoice, oldest first.
    async fn fetch_payments_for_invoice(
        &self,
        invoice_id: &InvoiceId,
    ) -> Result<Vec<PaymentTransaction>, ReconciliationError>;

    async fn fetch_payment_by_tx_hash(
        &self,
        tx_hash: &str,
        network: &str,
    ) -> Result<Option<PaymentTransaction>, ReconciliationError>;

    /// The audit trail for the invoice, in insertion order.
    async fn fetch_polling_events(&self, invoice_id: &InvoiceId) -> Result<Vec<PollingEvent>, ReconciliationError>;
}
