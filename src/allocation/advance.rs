use chrono::{DateTime, Utc};

use crate::decimal::Money;
use crate::errors::{BillingError, Result};
use crate::payment::Payment;
use crate::types::{InvoiceId, PaymentId};

use super::{FifoAllocator, InvoiceCandidate};

/// derived advance balance; computed, never stored
pub struct AdvancePool;

impl AdvancePool {
    /// sum of unapplied leftovers across the resident set's non-advance
    /// payments, floored at zero so a data inconsistency never surfaces as
    /// negative available funds
    pub fn balance<'a>(payments: impl Iterator<Item = &'a Payment>) -> Money {
        payments
            .map(|p| p.leftover())
            .sum::<Money>()
            .max(Money::ZERO)
    }
}

/// leftover capacity of one historical payment, the funding side of an
/// advance transfer
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentCapacity {
    pub payment_id: PaymentId,
    pub received_at: DateTime<Utc>,
    pub leftover: Money,
}

impl PaymentCapacity {
    pub fn of(payment: &Payment) -> Self {
        Self {
            payment_id: payment.id,
            received_at: payment.received_at,
            leftover: payment.leftover(),
        }
    }
}

/// one funding draw: an amount taken from a payment's leftover and applied
/// to an invoice
#[derive(Debug, Clone, PartialEq)]
pub struct FundingDraw {
    pub payment_id: PaymentId,
    pub invoice_id: InvoiceId,
    pub amount: Money,
}

/// planned advance transfer
#[derive(Debug, Clone, PartialEq)]
pub struct AdvanceTransferPlan {
    pub draws: Vec<FundingDraw>,
    pub amount_applied: Money,
    pub invoices_funded: usize,
}

impl AdvanceTransferPlan {
    pub fn is_empty(&self) -> bool {
        self.draws.is_empty()
    }
}

/// plans advance transfers against real historical payments' leftover
/// capacity
pub struct AdvanceAllocator;

impl AdvanceAllocator {
    /// fifo walk over the open invoices, funded from the oldest payments
    /// first; `requested` above the computed pool rejects with no plan
    pub fn plan(
        requested: Option<Money>,
        mut capacities: Vec<PaymentCapacity>,
        candidates: Vec<InvoiceCandidate>,
    ) -> Result<AdvanceTransferPlan> {
        let pool = capacities
            .iter()
            .map(|c| c.leftover)
            .sum::<Money>()
            .max(Money::ZERO);

        let budget = match requested {
            Some(requested) => {
                if requested.is_negative() || requested.is_zero() {
                    return Err(BillingError::InvalidAmount { amount: requested });
                }
                if requested > pool {
                    return Err(BillingError::InsufficientAdvance {
                        available: pool,
                        requested,
                    });
                }
                requested
            }
            None => pool,
        };

        let planned = FifoAllocator::plan(budget, candidates);

        // oldest payments fund first; id breaks receive-time ties
        capacities.sort_by_key(|c| (c.received_at, c.payment_id));
        capacities.retain(|c| c.leftover.is_positive());

        let mut draws = Vec::new();
        let mut amount_applied = Money::ZERO;
        let mut invoices_funded = 0usize;
        let mut capacity_idx = 0usize;

        for application in planned {
            let mut needed = application.amount;
            invoices_funded += 1;
            while needed.is_positive() && capacity_idx < capacities.len() {
                let capacity = &mut capacities[capacity_idx];
                let draw = needed.min(capacity.leftover);
                if draw.is_positive() {
                    draws.push(FundingDraw {
                        payment_id: capacity.payment_id,
                        invoice_id: application.invoice_id,
                        amount: draw,
                    });
                    capacity.leftover -= draw;
                    needed -= draw;
                    amount_applied += draw;
                }
                if !capacity.leftover.is_positive() {
                    capacity_idx += 1;
                }
            }
            if needed.is_positive() {
                // capacities exhausted before the fifo plan; the plan was
                // bounded by the pool, so this is unreachable
                break;
            }
        }

        Ok(AdvanceTransferPlan {
            draws,
            amount_applied,
            invoices_funded,
        })
    }
}
