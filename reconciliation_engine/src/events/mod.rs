mod channel;
mod event_types;
mod hooks;

pub use channel::{EventHandler, EventProducer, Handler};
pub use event_types::{
    InvoiceExpiredEvent,
    OverpaymentEvent,
    PartialPaymentEvent,
    PaymentConfirmedEvent,
    PaymentDetectedEvent,
};
pub use hooks::{EventHandlers, EventHooks, EventProducers};
