pub mod aggregate;
pub mod lifecycle;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Money;
use crate::metering::MeterReading;
use crate::types::{BillingPeriod, InvoiceId, InvoiceStatus, LineId, ReadingId, ResidentId};

pub use aggregate::InvoiceAggregator;
pub use lifecycle::{InvoiceLifecycle, OPENING_NUMBER_PREFIX};

/// invoice line; opening-debt lines carry no reading reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub id: LineId,
    pub reading_id: Option<ReadingId>,
    pub description: String,
    pub amount_net: Money,
    pub amount_vat: Money,
    pub amount_total: Money,
}

impl InvoiceLine {
    pub fn from_reading(reading: &MeterReading, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            reading_id: Some(reading.id),
            description: description.into(),
            amount_net: reading.amount_net,
            amount_vat: reading.amount_vat,
            amount_total: reading.amount_total,
        }
    }
}

/// invoice aggregate owning its lines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub resident_id: ResidentId,
    /// assigned at issuance only
    pub number: Option<String>,
    pub status: InvoiceStatus,
    pub due_date: Option<NaiveDate>,
    pub period: BillingPeriod,
    pub amount_net: Money,
    pub amount_vat: Money,
    pub amount_total: Money,
    /// append-only audit trail
    pub notes: Vec<String>,
    pub lines: Vec<InvoiceLine>,
}

impl Invoice {
    pub fn draft(resident_id: ResidentId, period: BillingPeriod) -> Self {
        Self {
            id: Uuid::new_v4(),
            resident_id,
            number: None,
            status: InvoiceStatus::Draft,
            due_date: None,
            period,
            amount_net: Money::ZERO,
            amount_vat: Money::ZERO,
            amount_total: Money::ZERO,
            notes: Vec::new(),
            lines: Vec::new(),
        }
    }

    /// pseudo-invoice carrying pre-system legacy debt; synthetic period,
    /// reserved number pattern, no reading references
    pub fn opening_balance(resident_id: ResidentId, amount: Money) -> Self {
        let mut invoice = Self::draft(resident_id, BillingPeriod::OPENING);
        invoice.lines.push(InvoiceLine {
            id: Uuid::new_v4(),
            reading_id: None,
            description: "opening balance".to_string(),
            amount_net: amount,
            amount_vat: Money::ZERO,
            amount_total: amount,
        });
        aggregate::InvoiceAggregator::recompute(&mut invoice);
        invoice
    }

    pub fn is_opening(&self) -> bool {
        self.period.is_opening()
    }

    pub fn is_canceled(&self) -> bool {
        self.status == InvoiceStatus::Canceled
    }

    /// update the line produced by a reading, inserting it if missing
    pub fn upsert_line_for_reading(&mut self, reading: &MeterReading, description: &str) {
        match self
            .lines
            .iter_mut()
            .find(|l| l.reading_id == Some(reading.id))
        {
            Some(line) => {
                line.description = description.to_string();
                line.amount_net = reading.amount_net;
                line.amount_vat = reading.amount_vat;
                line.amount_total = reading.amount_total;
            }
            None => self.lines.push(InvoiceLine::from_reading(reading, description)),
        }
    }

    /// drop the line produced by a reading, if any
    pub fn remove_line_for_reading(&mut self, reading_id: ReadingId) -> bool {
        let before = self.lines.len();
        self.lines.retain(|l| l.reading_id != Some(reading_id));
        self.lines.len() != before
    }
}

/// serializable invoice view for external callers
#[derive(Debug, Serialize, Deserialize)]
pub struct InvoiceView {
    pub id: InvoiceId,
    pub resident_id: ResidentId,
    pub number: Option<String>,
    pub status: InvoiceStatus,
    pub period: String,
    pub due_date: Option<NaiveDate>,
    pub amount_net: Money,
    pub amount_vat: Money,
    pub amount_total: Money,
    pub paid_total: Money,
    pub remaining_due: Money,
    pub lines: Vec<InvoiceLine>,
    pub notes: Vec<String>,
}

impl InvoiceView {
    pub fn from_invoice(invoice: &Invoice, paid_total: Money) -> Self {
        Self {
            id: invoice.id,
            resident_id: invoice.resident_id,
            number: invoice.number.clone(),
            status: invoice.status,
            period: invoice.period.to_string(),
            due_date: invoice.due_date,
            amount_net: invoice.amount_net,
            amount_vat: invoice.amount_vat,
            amount_total: invoice.amount_total,
            paid_total,
            remaining_due: (invoice.amount_total - paid_total).max(Money::ZERO),
            lines: invoice.lines.clone(),
            notes: invoice.notes.clone(),
        }
    }

    /// convert to pretty-printed json string
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn money(s: &str) -> Money {
        Money::from_str_exact(s).unwrap()
    }

    fn reading(total: &str) -> MeterReading {
        let net = money(total);
        MeterReading {
            id: Uuid::new_v4(),
            meter_id: Uuid::new_v4(),
            period: BillingPeriod::new(2025, 3),
            value: dec!(100),
            consumption: dec!(10),
            tariff_id: Uuid::new_v4(),
            amount_net: net,
            amount_vat: Money::ZERO,
            amount_total: net,
            note: None,
        }
    }

    #[test]
    fn test_line_upsert_updates_in_place() {
        let mut invoice = Invoice::draft(Uuid::new_v4(), BillingPeriod::new(2025, 3));
        let mut r = reading("10.00");
        invoice.upsert_line_for_reading(&r, "water");
        assert_eq!(invoice.lines.len(), 1);

        r.amount_net = money("15.00");
        r.amount_total = money("15.00");
        invoice.upsert_line_for_reading(&r, "water");
        assert_eq!(invoice.lines.len(), 1);
        assert_eq!(invoice.lines[0].amount_total, money("15.00"));
    }

    #[test]
    fn test_remove_line_for_reading() {
        let mut invoice = Invoice::draft(Uuid::new_v4(), BillingPeriod::new(2025, 3));
        let r = reading("10.00");
        invoice.upsert_line_for_reading(&r, "water");
        assert!(invoice.remove_line_for_reading(r.id));
        assert!(invoice.lines.is_empty());
        assert!(!invoice.remove_line_for_reading(r.id));
    }

    #[test]
    fn test_opening_balance_shape() {
        let invoice = Invoice::opening_balance(Uuid::new_v4(), money("310.50"));
        assert!(invoice.is_opening());
        assert_eq!(invoice.amount_total, money("310.50"));
        assert_eq!(invoice.amount_vat, Money::ZERO);
        assert!(invoice.lines[0].reading_id.is_none());
    }

    #[test]
    fn test_view_serializes() {
        let invoice = Invoice::opening_balance(Uuid::new_v4(), money("50.00"));
        let view = InvoiceView::from_invoice(&invoice, money("20.00"));
        assert_eq!(view.remaining_due, money("30.00"));
        assert!(view.to_json_pretty().unwrap().contains("opening balance"));
    }
}
