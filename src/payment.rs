use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Money;
use crate::types::{ApplicationId, ApplicationOrigin, InvoiceId, PaymentId, PaymentMethod, ResidentId};

/// amount of one payment applied to one invoice; repeated (payment, invoice)
/// pairs are allowed so every advance action leaves its own audit row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentApplication {
    pub id: ApplicationId,
    pub invoice_id: InvoiceId,
    pub amount: Money,
    pub origin: ApplicationOrigin,
}

impl PaymentApplication {
    pub fn new(invoice_id: InvoiceId, amount: Money, origin: ApplicationOrigin) -> Self {
        Self {
            id: Uuid::new_v4(),
            invoice_id,
            amount,
            origin,
        }
    }
}

/// incoming payment with its applications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub resident_id: ResidentId,
    pub received_at: DateTime<Utc>,
    pub amount_total: Money,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub comment: Option<String>,
    pub applications: Vec<PaymentApplication>,
}

impl Payment {
    pub fn new(
        resident_id: ResidentId,
        amount_total: Money,
        method: PaymentMethod,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            resident_id,
            received_at,
            amount_total,
            method,
            reference: None,
            comment: None,
            applications: Vec::new(),
        }
    }

    /// sum of this payment's applications
    pub fn applied_total(&self) -> Money {
        self.applications.iter().map(|a| a.amount).sum()
    }

    /// unapplied remainder; an advance-method payment is a bookkeeping
    /// record and its leftover is zero regardless of stored applications
    pub fn leftover(&self) -> Money {
        if self.method == PaymentMethod::Advance {
            return Money::ZERO;
        }
        self.amount_total - self.applied_total()
    }

    /// amount this payment already contributed to one invoice
    pub fn applied_to(&self, invoice_id: InvoiceId) -> Money {
        self.applications
            .iter()
            .filter(|a| a.invoice_id == invoice_id)
            .map(|a| a.amount)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn money(s: &str) -> Money {
        Money::from_str_exact(s).unwrap()
    }

    #[test]
    fn test_leftover_derivation() {
        let invoice = Uuid::new_v4();
        let mut payment = Payment::new(Uuid::new_v4(), money("100.00"), PaymentMethod::Cash, Utc::now());
        assert_eq!(payment.leftover(), money("100.00"));

        payment
            .applications
            .push(PaymentApplication::new(invoice, money("30.00"), ApplicationOrigin::Direct));
        payment
            .applications
            .push(PaymentApplication::new(invoice, money("20.00"), ApplicationOrigin::AdvanceTransfer));
        assert_eq!(payment.applied_total(), money("50.00"));
        assert_eq!(payment.leftover(), money("50.00"));
        assert_eq!(payment.applied_to(invoice), money("50.00"));
        assert_eq!(payment.applied_to(Uuid::new_v4()), Money::ZERO);
    }

    #[test]
    fn test_advance_payment_leftover_is_pinned_to_zero() {
        let mut payment =
            Payment::new(Uuid::new_v4(), money("80.00"), PaymentMethod::Advance, Utc::now());
        assert_eq!(payment.leftover(), Money::ZERO);

        // even inconsistent stored applications cannot make it a fund source
        payment.applications.push(PaymentApplication::new(
            Uuid::new_v4(),
            money("10.00"),
            ApplicationOrigin::AdvanceTransfer,
        ));
        assert_eq!(payment.leftover(), Money::ZERO);
    }
}
