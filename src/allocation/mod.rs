pub mod advance;
pub mod fifo;
pub mod manual;

use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::types::{BillingPeriod, InvoiceId};

pub use advance::{AdvanceAllocator, AdvancePool, AdvanceTransferPlan, FundingDraw, PaymentCapacity};
pub use fifo::FifoAllocator;
pub use manual::{ManualAllocation, ManualAllocator};

/// open invoice summary fed to the allocators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceCandidate {
    pub invoice_id: InvoiceId,
    pub period: BillingPeriod,
    /// total minus already-applied
    pub remaining: Money,
}

/// one planned application of funds to an invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedApplication {
    pub invoice_id: InvoiceId,
    pub amount: Money,
}

/// result of an allocation run, reported back to the caller
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AllocationOutcome {
    pub invoices_affected: usize,
    pub amount_applied: Money,
}

impl AllocationOutcome {
    pub const NONE: AllocationOutcome = AllocationOutcome {
        invoices_affected: 0,
        amount_applied: Money::ZERO,
    };
}
