pub mod allocation;
pub mod decimal;
pub mod engine;
pub mod errors;
pub mod events;
pub mod invoicing;
pub mod metering;
pub mod payment;
pub mod pricing;
pub mod store;
pub mod tariff;
pub mod types;

// re-export key types
pub use decimal::{Money, Rate};
pub use engine::BillingEngine;
pub use errors::{BillingError, ErrorKind, Result};
pub use events::{Event, EventStore};
pub use allocation::{
    AdvanceAllocator, AdvancePool, AllocationOutcome, FifoAllocator, InvoiceCandidate,
    ManualAllocation, ManualAllocator, PaymentCapacity,
};
pub use invoicing::{
    Invoice, InvoiceAggregator, InvoiceLifecycle, InvoiceLine, InvoiceView,
};
pub use metering::{ConsumptionResolver, MeterReading, ResidentMeter, UpsertPlan};
pub use payment::{Payment, PaymentApplication};
pub use pricing::{PriceBreakdown, StepCharge, StepPricer};
pub use store::{BillingStore, Resident};
pub use tariff::{StepRange, Tariff, TariffStep};
pub use types::{
    AllocationScope, ApplicationOrigin, BillingPeriod, CustomerCategory, InvoiceId,
    InvoiceStatus, MeterCategory, MeterId, PaymentId, PaymentMethod, ReadingId, ResidentId,
    TariffId,
};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
