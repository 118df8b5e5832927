use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{
    EventHandler,
    EventProducer,
    Handler,
    InvoiceExpiredEvent,
    OverpaymentEvent,
    PartialPaymentEvent,
    PaymentConfirmedEvent,
    PaymentDetectedEvent,
};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub payment_detected_producer: Vec<EventProducer<PaymentDetectedEvent>>,
    pub payment_confirmed_producer: Vec<EventProducer<PaymentConfirmedEvent>>,
    pub partial_payment_producer: Vec<EventProducer<PartialPaymentEvent>>,
    pub overpayment_producer: Vec<EventProducer<OverpaymentEvent>>,
    pub invoice_expired_producer: Vec<EventProducer<InvoiceExpiredEvent>>,
}

pub struct EventHandlers {
    pub on_payment_detected: Option<EventHandler<PaymentDetectedEvent>>,
    pub on_payment_confirmed: Option<EventHandler<PaymentConfirmedEvent>>,
    pub on_partial_payment: Option<EventHandler<PartialPaymentEvent>>,
    pub on_overpayment: Option<EventHandler<OverpaymentEvent>>,
    pub on_invoice_expired: Option<EventHandler<InvoiceExpiredEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_payment_detected = hooks.on_payment_detected.map(|f| EventHandler::new(buffer_size, f));
        let on_payment_confirmed = hooks.on_payment_confirmed.map(|f| EventHandler::new(buffer_size, f));
        let on_partial_payment = hooks.on_partial_payment.map(|f| EventHandler::new(buffer_size, f));
        let on_overpayment = hooks.on_overpayment.map(|f| EventHandler::new(buffer_size, f));
        let on_invoice_expired = hooks.on_invoice_expired.map(|f| EventHandler::new(buffer_size, f));
        Self { on_payment_detected, on_payment_confirmed, on_partial_payment, on_overpayment, on_invoice_expired }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_payment_detected {
            result.payment_detected_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_payment_confirmed {
            result.payment_confirmed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_partial_payment {
            result.partial_payment_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_overpayment {
            result.overpayment_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_invoice_expired {
            result.invoice_expired_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_payment_detected {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_payment_confirmed {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_partial_payment {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_overpayment {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_invoice_expired {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_payment_detected: Option<Handler<PaymentDetectedEvent>>,
    pub on_payment_confirmed: Option<Handler<PaymentConfirmedEvent>>,
    pub on_partial_payment: Option<Handler<PartialPaymentEvent>>,
    pub on_overpayment: Option<Handler<OverpaymentEvent>>,
    pub on_invoice_expired: Option<Handler<InvoiceExpiredEvent>>,
}

impl EventHooks {
    pub fn on_payment_detected<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PaymentDetectedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_payment_detected = Some(Arc::new(f));
        self
    }

    pub fn on_payment_confirmed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PaymentConfirmedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_payment_confirmed = Some(Arc::new(f));
        self
    }

    pub fn on_partial_payment<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PartialPaymentEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_partial_payment = Some(Arc::new(f));
        self
    }

    pub fn on_overpayment<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OverpaymentEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_overpayment = Some(Arc::new(f));
        self
    }

    pub fn on_invoice_expired<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(InvoiceExpiredEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_invoice_expired = Some(Arc::new(f));
        self
    }
}
