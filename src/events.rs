use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::types::{
    ApplicationOrigin, BillingPeriod, InvoiceId, InvoiceStatus, MeterId, PaymentId, PaymentMethod,
    ReadingId, ResidentId,
};

/// all events emitted by the billing engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // reading events
    ReadingUpserted {
        meter_id: MeterId,
        reading_id: ReadingId,
        period: BillingPeriod,
        consumption: Decimal,
        amount_total: Money,
        replaced_existing: bool,
    },
    ReadingRemoved {
        meter_id: MeterId,
        reading_id: ReadingId,
        period: BillingPeriod,
    },
    ReadingChainRecomputed {
        meter_id: MeterId,
        readings_affected: usize,
    },

    // invoice events
    InvoiceRecomputed {
        invoice_id: InvoiceId,
        old_total: Money,
        new_total: Money,
    },
    InvoiceIssued {
        invoice_id: InvoiceId,
        number: String,
        timestamp: DateTime<Utc>,
    },
    InvoiceCanceled {
        invoice_id: InvoiceId,
        voided_total: Money,
        timestamp: DateTime<Utc>,
    },
    InvoiceReissued {
        invoice_id: InvoiceId,
        number: String,
        timestamp: DateTime<Utc>,
    },
    InvoiceStatusChanged {
        invoice_id: InvoiceId,
        old_status: InvoiceStatus,
        new_status: InvoiceStatus,
    },

    // payment events
    PaymentRecorded {
        payment_id: PaymentId,
        resident_id: ResidentId,
        amount: Money,
        method: PaymentMethod,
        timestamp: DateTime<Utc>,
    },
    PaymentApplied {
        payment_id: PaymentId,
        invoice_id: InvoiceId,
        amount: Money,
        origin: ApplicationOrigin,
    },
    PaymentReallocated {
        payment_id: PaymentId,
        released: Money,
        applied: Money,
    },
    AdvanceTransferred {
        resident_id: ResidentId,
        amount: Money,
        invoices_funded: usize,
        synthetic_payment_id: PaymentId,
        timestamp: DateTime<Utc>,
    },
}

/// event store for collecting events during operations
#[derive(Debug, Default)]
pub struct EventStore {
    events: Vec<Event>,
}

impl EventStore {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
        }
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
