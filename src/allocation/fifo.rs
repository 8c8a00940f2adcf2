use crate::decimal::Money;

use super::{InvoiceCandidate, PlannedApplication};

/// fifo-by-period allocation planner
pub struct FifoAllocator;

impl FifoAllocator {
    /// walk the candidates oldest period first and plan applications until
    /// the source is exhausted; explicit sort key (period, invoice_id) so
    /// the order never depends on storage iteration
    pub fn plan(source_leftover: Money, mut candidates: Vec<InvoiceCandidate>) -> Vec<PlannedApplication> {
        candidates.sort_by_key(|c| (c.period, c.invoice_id));

        let mut remaining = source_leftover;
        let mut planned = Vec::new();
        for candidate in candidates {
            if !remaining.is_positive() {
                break;
            }
            let take = remaining.min(candidate.remaining.max(Money::ZERO));
            if !take.is_positive() {
                continue;
            }
            planned.push(PlannedApplication {
                invoice_id: candidate.invoice_id,
                amount: take,
            });
            remaining -= take;
        }
        planned
    }
}
