use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::decimal::Money;
use crate::types::{BillingPeriod, InvoiceStatus};

/// error classification driving caller behavior: validation and state errors
/// reject with no mutation, conflicts are retryable, internal errors abort
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    State,
    Internal,
}

#[derive(Error, Debug)]
pub enum BillingError {
    #[error("invalid tariff steps: {message}")]
    InvalidTariffSteps {
        message: String,
    },

    #[error("negative consumption on meter {meter_id}: baseline {baseline}, new value {value}")]
    NegativeConsumption {
        meter_id: Uuid,
        baseline: Decimal,
        value: Decimal,
    },

    #[error("allocation to invoice {invoice_id} exceeds remaining capacity: capacity {capacity}, requested {requested}")]
    OverAllocation {
        invoice_id: Uuid,
        capacity: Money,
        requested: Money,
    },

    #[error("allocations exceed payment total: total {total}, allocated {allocated}")]
    AllocationExceedsPayment {
        total: Money,
        allocated: Money,
    },

    #[error("insufficient advance funds: available {available}, requested {requested}")]
    InsufficientAdvance {
        available: Money,
        requested: Money,
    },

    #[error("invoice {invoice_id} does not belong to resident {resident_id}")]
    ResidentMismatch {
        invoice_id: Uuid,
        resident_id: Uuid,
    },

    #[error("invalid amount: {amount}")]
    InvalidAmount {
        amount: Money,
    },

    #[error("invalid billing period: {period}")]
    InvalidPeriod {
        period: BillingPeriod,
    },

    #[error("non-canceled invoice already exists for resident {resident_id} in period {period}")]
    DuplicateInvoice {
        resident_id: Uuid,
        period: BillingPeriod,
    },

    #[error("invoice number already taken: {number}")]
    DuplicateInvoiceNumber {
        number: String,
    },

    #[error("invalid status transition: current {current:?}, requested {requested:?}")]
    InvalidStatusTransition {
        current: InvoiceStatus,
        requested: InvoiceStatus,
    },

    #[error("canceled invoice {invoice_id} is frozen")]
    CanceledInvoiceFrozen {
        invoice_id: Uuid,
    },

    #[error("tariff {tariff_id} is referenced by billing history and cannot change shape")]
    TariffShapeFrozen {
        tariff_id: Uuid,
    },

    #[error("meter {meter_id} has reading history and cannot be deleted")]
    MeterHasHistory {
        meter_id: Uuid,
    },

    #[error("tariff not found: {tariff_id}")]
    TariffNotFound {
        tariff_id: Uuid,
    },

    #[error("meter not found: {meter_id}")]
    MeterNotFound {
        meter_id: Uuid,
    },

    #[error("reading not found for meter {meter_id} in period {period}")]
    ReadingNotFound {
        meter_id: Uuid,
        period: BillingPeriod,
    },

    #[error("invoice not found: {invoice_id}")]
    InvoiceNotFound {
        invoice_id: Uuid,
    },

    #[error("payment not found: {payment_id}")]
    PaymentNotFound {
        payment_id: Uuid,
    },

    #[error("resident not found: {resident_id}")]
    ResidentNotFound {
        resident_id: Uuid,
    },

    #[error("no tariff step covers the billing date for tariff {tariff_id}")]
    NoStepForDate {
        tariff_id: Uuid,
    },

    #[error("consumption {consumption} exceeds the bounded last step of tariff {tariff_id}")]
    StepCoverageGap {
        tariff_id: Uuid,
        consumption: Decimal,
    },
}

impl BillingError {
    /// classification per the error taxonomy
    pub fn kind(&self) -> ErrorKind {
        use BillingError::*;
        match self {
            InvalidTariffSteps { .. }
            | NegativeConsumption { .. }
            | OverAllocation { .. }
            | AllocationExceedsPayment { .. }
            | InsufficientAdvance { .. }
            | ResidentMismatch { .. }
            | InvalidAmount { .. }
            | InvalidPeriod { .. }
            | NoStepForDate { .. } => ErrorKind::Validation,

            DuplicateInvoice { .. } | DuplicateInvoiceNumber { .. } => ErrorKind::Conflict,

            TariffNotFound { .. }
            | MeterNotFound { .. }
            | ReadingNotFound { .. }
            | InvoiceNotFound { .. }
            | PaymentNotFound { .. }
            | ResidentNotFound { .. } => ErrorKind::NotFound,

            InvalidStatusTransition { .. }
            | CanceledInvoiceFrozen { .. }
            | TariffShapeFrozen { .. }
            | MeterHasHistory { .. } => ErrorKind::State,

            StepCoverageGap { .. } => ErrorKind::Internal,
        }
    }

    /// stable machine-readable reason code
    pub fn code(&self) -> &'static str {
        use BillingError::*;
        match self {
            InvalidTariffSteps { .. } => "tariff_steps_invalid",
            NegativeConsumption { .. } => "consumption_negative",
            OverAllocation { .. } => "allocation_over_capacity",
            AllocationExceedsPayment { .. } => "allocation_over_payment",
            InsufficientAdvance { .. } => "advance_insufficient",
            ResidentMismatch { .. } => "resident_mismatch",
            InvalidAmount { .. } => "amount_invalid",
            InvalidPeriod { .. } => "period_invalid",
            DuplicateInvoice { .. } => "invoice_duplicate",
            DuplicateInvoiceNumber { .. } => "invoice_number_taken",
            InvalidStatusTransition { .. } => "status_transition_invalid",
            CanceledInvoiceFrozen { .. } => "invoice_canceled_frozen",
            TariffShapeFrozen { .. } => "tariff_shape_frozen",
            MeterHasHistory { .. } => "meter_has_history",
            TariffNotFound { .. } => "tariff_not_found",
            MeterNotFound { .. } => "meter_not_found",
            ReadingNotFound { .. } => "reading_not_found",
            InvoiceNotFound { .. } => "invoice_not_found",
            PaymentNotFound { .. } => "payment_not_found",
            ResidentNotFound { .. } => "resident_not_found",
            NoStepForDate { .. } => "tariff_no_step_for_date",
            StepCoverageGap { .. } => "tariff_step_coverage_gap",
        }
    }

    /// conflicts are safe to retry after backoff
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }
}

pub type Result<T> = std::result::Result<T, BillingError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    #[test]
    fn test_kind_classification() {
        let err = BillingError::NegativeConsumption {
            meter_id: Uuid::new_v4(),
            baseline: dec!(120),
            value: dec!(100),
        };
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(!err.is_retryable());

        let err = BillingError::DuplicateInvoiceNumber {
            number: "2025-03/000001".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.is_retryable());

        let err = BillingError::StepCoverageGap {
            tariff_id: Uuid::new_v4(),
            consumption: dec!(1000),
        };
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_codes_are_stable() {
        let err = BillingError::InsufficientAdvance {
            available: Money::from_major(10),
            requested: Money::from_major(50),
        };
        assert_eq!(err.code(), "advance_insufficient");
    }
}
