use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// unique identifier for a tariff
pub type TariffId = Uuid;
/// unique identifier for a resident
pub type ResidentId = Uuid;
/// unique identifier for a resident group sharing a pooled advance
pub type GroupId = Uuid;
/// unique identifier for a resident meter
pub type MeterId = Uuid;
/// unique identifier for a meter reading
pub type ReadingId = Uuid;
/// unique identifier for an invoice
pub type InvoiceId = Uuid;
/// unique identifier for an invoice line
pub type LineId = Uuid;
/// unique identifier for a payment
pub type PaymentId = Uuid;
/// unique identifier for a payment application
pub type ApplicationId = Uuid;

/// meter / service category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MeterCategory {
    Electric,
    Gas,
    Water,
    Sewerage,
    FixedService,
    Rent,
    Construction,
}

impl MeterCategory {
    /// fixed-price categories bill one unit per opted-in month
    pub fn is_fixed_price(&self) -> bool {
        matches!(self, MeterCategory::FixedService | MeterCategory::Rent)
    }

    /// construction tariffs price by date-range membership
    pub fn is_date_priced(&self) -> bool {
        matches!(self, MeterCategory::Construction)
    }

    /// cumulative categories derive consumption from a reading chain
    pub fn is_cumulative(&self) -> bool {
        !self.is_fixed_price() && !self.is_date_priced()
    }
}

/// customer category a tariff applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CustomerCategory {
    Household,
    Commercial,
}

/// payment method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    Cash,
    Card,
    Transfer,
    Online,
    /// bookkeeping record of an advance transfer, never a source of funds
    Advance,
}

/// invoice status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceStatus {
    /// created, not yet numbered
    Draft,
    /// numbered and awaiting payment
    Issued,
    /// partially covered by applications
    Partial,
    /// applications equal the total
    Paid,
    /// applications exceed the total
    Overpaid,
    /// terminal, amounts zeroed, excluded from recomputation
    Canceled,
}

impl InvoiceStatus {
    /// open invoices are candidates for payment allocation
    pub fn is_open(&self) -> bool {
        matches!(self, InvoiceStatus::Issued | InvoiceStatus::Partial)
    }
}

/// origin tag distinguishing direct applications from advance transfers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplicationOrigin {
    Direct,
    AdvanceTransfer,
}

/// billing month, ordered oldest first for fifo allocation
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct BillingPeriod {
    pub year: i32,
    pub month: u32,
}

impl BillingPeriod {
    /// synthetic period of opening-balance invoices, outside normal billing
    pub const OPENING: BillingPeriod = BillingPeriod { year: 0, month: 0 };

    pub fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }

    /// normal periods have a calendar month; the opening period does not
    pub fn is_normal(&self) -> bool {
        (1..=12).contains(&self.month) && self.year > 0
    }

    pub fn is_opening(&self) -> bool {
        *self == Self::OPENING
    }

    /// first calendar day of the period; readings strictly before this
    /// date belong to earlier periods
    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }
}

impl fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.year, self.month)
    }
}

/// candidate restriction for payment allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllocationScope {
    /// only invoices of the given billing period
    CurrentPeriod(BillingPeriod),
    /// every open invoice, oldest period first
    AllOpen,
}

impl AllocationScope {
    pub fn admits(&self, period: BillingPeriod) -> bool {
        match self {
            AllocationScope::CurrentPeriod(p) => *p == period,
            AllocationScope::AllOpen => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_ordering_is_fifo() {
        let jan = BillingPeriod::new(2025, 1);
        let feb = BillingPeriod::new(2025, 2);
        let dec_prev = BillingPeriod::new(2024, 12);
        assert!(dec_prev < jan);
        assert!(jan < feb);
        assert!(BillingPeriod::OPENING < dec_prev);
    }

    #[test]
    fn test_opening_period_is_not_normal() {
        assert!(!BillingPeriod::OPENING.is_normal());
        assert!(BillingPeriod::OPENING.is_opening());
        assert!(BillingPeriod::new(2025, 3).is_normal());
        assert!(!BillingPeriod::new(2025, 13).is_normal());
    }

    #[test]
    fn test_category_pricing_modes() {
        assert!(MeterCategory::Electric.is_cumulative());
        assert!(MeterCategory::Rent.is_fixed_price());
        assert!(MeterCategory::FixedService.is_fixed_price());
        assert!(MeterCategory::Construction.is_date_priced());
        assert!(!MeterCategory::Construction.is_cumulative());
    }

    #[test]
    fn test_scope_admits() {
        let jan = BillingPeriod::new(2025, 1);
        let feb = BillingPeriod::new(2025, 2);
        assert!(AllocationScope::AllOpen.admits(jan));
        assert!(AllocationScope::CurrentPeriod(jan).admits(jan));
        assert!(!AllocationScope::CurrentPeriod(jan).admits(feb));
    }
}
