use crate::decimal::Money;

use super::Invoice;

/// tolerance below which a stored total is left alone on read
pub const DRIFT_TOLERANCE: Money = Money::CENT;

/// keeps invoice header amounts consistent with the lines
pub struct InvoiceAggregator;

impl InvoiceAggregator {
    /// rewrite the header sums from the current lines; called after any
    /// line mutation; canceled invoices are frozen
    pub fn recompute(invoice: &mut Invoice) {
        if invoice.is_canceled() {
            return;
        }
        invoice.amount_net = invoice.lines.iter().map(|l| l.amount_net).sum();
        invoice.amount_vat = invoice.lines.iter().map(|l| l.amount_vat).sum();
        invoice.amount_total = invoice.lines.iter().map(|l| l.amount_total).sum();
    }

    /// defensive self-heal on read: rewrite only when the stored total has
    /// drifted beyond the tolerance from the freshly summed lines
    pub fn heal_drift(invoice: &mut Invoice) -> bool {
        if invoice.is_canceled() {
            return false;
        }
        let summed: Money = invoice.lines.iter().map(|l| l.amount_total).sum();
        if invoice.amount_total.within_tolerance(summed, DRIFT_TOLERANCE) {
            return false;
        }
        Self::recompute(invoice);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoicing::InvoiceLine;
    use crate::types::{BillingPeriod, InvoiceStatus};
    use uuid::Uuid;

    fn money(s: &str) -> Money {
        Money::from_str_exact(s).unwrap()
    }

    fn line(net: &str, vat: &str) -> InvoiceLine {
        InvoiceLine {
            id: Uuid::new_v4(),
            reading_id: None,
            description: "test".to_string(),
            amount_net: money(net),
            amount_vat: money(vat),
            amount_total: money(net) + money(vat),
        }
    }

    fn invoice_with_lines() -> Invoice {
        let mut invoice = Invoice::draft(Uuid::new_v4(), BillingPeriod::new(2025, 3));
        invoice.lines.push(line("10.00", "2.00"));
        invoice.lines.push(line("33.33", "6.67"));
        invoice
    }

    #[test]
    fn test_recompute_matches_line_sums() {
        let mut invoice = invoice_with_lines();
        InvoiceAggregator::recompute(&mut invoice);
        assert_eq!(invoice.amount_net, money("43.33"));
        assert_eq!(invoice.amount_vat, money("8.67"));
        assert_eq!(invoice.amount_total, money("52.00"));
    }

    #[test]
    fn test_heal_ignores_drift_within_tolerance() {
        let mut invoice = invoice_with_lines();
        InvoiceAggregator::recompute(&mut invoice);
        invoice.amount_total = invoice.amount_total + Money::CENT;
        assert!(!InvoiceAggregator::heal_drift(&mut invoice));
        assert_eq!(invoice.amount_total, money("52.01"));
    }

    #[test]
    fn test_heal_corrects_real_drift() {
        let mut invoice = invoice_with_lines();
        InvoiceAggregator::recompute(&mut invoice);
        invoice.amount_total = money("60.00");
        assert!(InvoiceAggregator::heal_drift(&mut invoice));
        assert_eq!(invoice.amount_total, money("52.00"));
    }

    #[test]
    fn test_canceled_invoice_is_frozen() {
        let mut invoice = invoice_with_lines();
        invoice.status = InvoiceStatus::Canceled;
        invoice.amount_total = Money::ZERO;
        assert!(!InvoiceAggregator::heal_drift(&mut invoice));
        InvoiceAggregator::recompute(&mut invoice);
        assert_eq!(invoice.amount_total, Money::ZERO);
    }
}
