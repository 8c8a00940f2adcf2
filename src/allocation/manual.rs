use std::collections::HashMap;

use crate::decimal::Money;
use crate::errors::{BillingError, Result};
use crate::types::InvoiceId;

/// operator-supplied target allocation for one invoice
#[derive(Debug, Clone, PartialEq)]
pub struct ManualAllocation {
    pub invoice_id: InvoiceId,
    pub amount: Money,
}

/// validates explicit per-invoice amounts for one payment before its
/// applications are replaced wholesale
pub struct ManualAllocator;

impl ManualAllocator {
    /// `capacity` maps each allowed invoice to its remaining-to-pay plus
    /// whatever this same payment already contributed to it, so repeated
    /// submissions cannot double-count; violation leaves nothing written
    pub fn validate(
        payment_total: Money,
        requested: &[ManualAllocation],
        capacity: &HashMap<InvoiceId, Money>,
    ) -> Result<()> {
        let mut allocated = Money::ZERO;
        let mut per_invoice: HashMap<InvoiceId, Money> = HashMap::new();

        for allocation in requested {
            if allocation.amount.is_negative() {
                return Err(BillingError::InvalidAmount {
                    amount: allocation.amount,
                });
            }
            allocated += allocation.amount;
            *per_invoice.entry(allocation.invoice_id).or_insert(Money::ZERO) += allocation.amount;
        }

        if allocated > payment_total {
            return Err(BillingError::AllocationExceedsPayment {
                total: payment_total,
                allocated,
            });
        }

        for (invoice_id, amount) in per_invoice {
            let cap = capacity
                .get(&invoice_id)
                .copied()
                .ok_or(BillingError::InvoiceNotFound { invoice_id })?;
            if amount > cap {
                return Err(BillingError::OverAllocation {
                    invoice_id,
                    capacity: cap,
                    requested: amount,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn money(s: &str) -> Money {
        Money::from_str_exact(s).unwrap()
    }

    fn setup() -> (InvoiceId, InvoiceId, HashMap<InvoiceId, Money>) {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut capacity = HashMap::new();
        capacity.insert(a, money("50.00"));
        capacity.insert(b, money("80.00"));
        (a, b, capacity)
    }

    #[test]
    fn test_valid_allocation_passes() {
        let (a, b, capacity) = setup();
        let requested = vec![
            ManualAllocation { invoice_id: a, amount: money("50.00") },
            ManualAllocation { invoice_id: b, amount: money("30.00") },
        ];
        assert!(ManualAllocator::validate(money("100.00"), &requested, &capacity).is_ok());
    }

    #[test]
    fn test_sum_above_payment_total_rejected() {
        let (a, b, capacity) = setup();
        let requested = vec![
            ManualAllocation { invoice_id: a, amount: money("50.00") },
            ManualAllocation { invoice_id: b, amount: money("60.00") },
        ];
        let err = ManualAllocator::validate(money("100.00"), &requested, &capacity).unwrap_err();
        assert_eq!(err.code(), "allocation_over_payment");
    }

    #[test]
    fn test_per_invoice_capacity_enforced() {
        let (a, _, capacity) = setup();
        let requested = vec![ManualAllocation { invoice_id: a, amount: money("50.01") }];
        let err = ManualAllocator::validate(money("100.00"), &requested, &capacity).unwrap_err();
        assert_eq!(err.code(), "allocation_over_capacity");
    }

    #[test]
    fn test_duplicate_invoice_entries_are_aggregated() {
        let (a, _, capacity) = setup();
        let requested = vec![
            ManualAllocation { invoice_id: a, amount: money("30.00") },
            ManualAllocation { invoice_id: a, amount: money("30.00") },
        ];
        let err = ManualAllocator::validate(money("100.00"), &requested, &capacity).unwrap_err();
        assert_eq!(err.code(), "allocation_over_capacity");
    }

    #[test]
    fn test_unknown_invoice_rejected() {
        let (_, _, capacity) = setup();
        let requested = vec![ManualAllocation { invoice_id: Uuid::new_v4(), amount: money("10.00") }];
        assert!(ManualAllocator::validate(money("100.00"), &requested, &capacity).is_err());
    }

    #[test]
    fn test_negative_amount_rejected() {
        let (a, _, capacity) = setup();
        let requested = vec![ManualAllocation { invoice_id: a, amount: money("-1.00") }];
        let err = ManualAllocator::validate(money("100.00"), &requested, &capacity).unwrap_err();
        assert_eq!(err.code(), "amount_invalid");
    }
}
