use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Money;
use crate::errors::{BillingError, Result};
use crate::allocation::InvoiceCandidate;
use crate::invoicing::{Invoice, OPENING_NUMBER_PREFIX};
use crate::metering::{MeterReading, ResidentMeter};
use crate::payment::Payment;
use crate::tariff::Tariff;
use crate::types::{
    AllocationScope, BillingPeriod, GroupId, InvoiceId, MeterId, PaymentId, ReadingId, ResidentId,
    TariffId,
};

/// resident record; `group_id` links residents sharing a pooled advance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resident {
    pub id: ResidentId,
    pub name: String,
    pub group_id: Option<GroupId>,
}

impl Resident {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            group_id: None,
        }
    }
}

/// in-memory relational state: the engine's tables
///
/// rows carrying billing history (meters with readings, invoices, payments)
/// refuse hard deletion; dependent rows (tariff steps, invoice lines) live
/// inside their parent and go with it
#[derive(Debug, Default)]
pub struct BillingStore {
    residents: HashMap<ResidentId, Resident>,
    tariffs: HashMap<TariffId, Tariff>,
    meters: HashMap<MeterId, ResidentMeter>,
    readings: HashMap<ReadingId, MeterReading>,
    invoices: HashMap<InvoiceId, Invoice>,
    payments: HashMap<PaymentId, Payment>,
}

impl BillingStore {
    pub fn new() -> Self {
        Self::default()
    }

    // residents

    pub fn insert_resident(&mut self, resident: Resident) {
        self.residents.insert(resident.id, resident);
    }

    pub fn resident(&self, id: ResidentId) -> Result<&Resident> {
        self.residents
            .get(&id)
            .ok_or(BillingError::ResidentNotFound { resident_id: id })
    }

    /// put every listed resident into one advance-sharing group
    pub fn set_group(&mut self, group_id: GroupId, members: &[ResidentId]) -> Result<()> {
        for id in members {
            self.resident(*id)?;
        }
        for id in members {
            if let Some(resident) = self.residents.get_mut(id) {
                resident.group_id = Some(group_id);
            }
        }
        Ok(())
    }

    /// the resident set sharing the pooled advance; a lone resident is its
    /// own set
    pub fn group_members(&self, resident_id: ResidentId) -> Result<Vec<ResidentId>> {
        let resident = self.resident(resident_id)?;
        Ok(match resident.group_id {
            Some(group) => {
                let mut members: Vec<ResidentId> = self
                    .residents
                    .values()
                    .filter(|r| r.group_id == Some(group))
                    .map(|r| r.id)
                    .collect();
                members.sort();
                members
            }
            None => vec![resident_id],
        })
    }

    // tariffs

    /// validate and save; steps are fully replaced, and a tariff referenced
    /// by billing history cannot change its category
    pub fn save_tariff(&mut self, tariff: Tariff) -> Result<()> {
        tariff.validate()?;
        if let Some(existing) = self.tariffs.get(&tariff.id) {
            if existing.meter_category != tariff.meter_category && self.tariff_referenced(tariff.id)
            {
                return Err(BillingError::TariffShapeFrozen {
                    tariff_id: tariff.id,
                });
            }
        }
        self.tariffs.insert(tariff.id, tariff);
        Ok(())
    }

    pub fn tariff(&self, id: TariffId) -> Result<&Tariff> {
        self.tariffs
            .get(&id)
            .ok_or(BillingError::TariffNotFound { tariff_id: id })
    }

    pub fn tariffs(&self) -> &HashMap<TariffId, Tariff> {
        &self.tariffs
    }

    fn tariff_referenced(&self, id: TariffId) -> bool {
        self.readings.values().any(|r| r.tariff_id == id)
    }

    // meters

    pub fn insert_meter(&mut self, meter: ResidentMeter) -> Result<()> {
        self.resident(meter.resident_id)?;
        self.tariff(meter.tariff_id)?;
        self.meters.insert(meter.id, meter);
        Ok(())
    }

    pub fn meter(&self, id: MeterId) -> Result<&ResidentMeter> {
        self.meters
            .get(&id)
            .ok_or(BillingError::MeterNotFound { meter_id: id })
    }

    pub fn meter_mut(&mut self, id: MeterId) -> Result<&mut ResidentMeter> {
        self.meters
            .get_mut(&id)
            .ok_or(BillingError::MeterNotFound { meter_id: id })
    }

    /// hard deletion is restricted once reading history exists; deactivate
    /// instead
    pub fn remove_meter(&mut self, id: MeterId) -> Result<()> {
        self.meter(id)?;
        if self.readings.values().any(|r| r.meter_id == id) {
            return Err(BillingError::MeterHasHistory { meter_id: id });
        }
        self.meters.remove(&id);
        Ok(())
    }

    // readings

    pub fn reading(&self, id: ReadingId) -> Option<&MeterReading> {
        self.readings.get(&id)
    }

    /// readings of one meter in chronological order
    pub fn readings_of_meter(&self, meter_id: MeterId) -> Vec<MeterReading> {
        let mut rows: Vec<MeterReading> = self
            .readings
            .values()
            .filter(|r| r.meter_id == meter_id)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.period);
        rows
    }

    pub fn upsert_reading_row(&mut self, reading: MeterReading) {
        self.readings.insert(reading.id, reading);
    }

    pub fn remove_reading_row(&mut self, id: ReadingId) -> Option<MeterReading> {
        self.readings.remove(&id)
    }

    // invoices

    /// at most one non-canceled invoice per (resident, period); the opening
    /// pseudo-invoice is exempt
    pub fn insert_invoice(&mut self, invoice: Invoice) -> Result<()> {
        self.resident(invoice.resident_id)?;
        if !invoice.period.is_opening()
            && self
                .active_invoice_for(invoice.resident_id, invoice.period)
                .is_some()
        {
            return Err(BillingError::DuplicateInvoice {
                resident_id: invoice.resident_id,
                period: invoice.period,
            });
        }
        self.invoices.insert(invoice.id, invoice);
        Ok(())
    }

    pub fn invoice(&self, id: InvoiceId) -> Result<&Invoice> {
        self.invoices
            .get(&id)
            .ok_or(BillingError::InvoiceNotFound { invoice_id: id })
    }

    pub fn invoice_mut(&mut self, id: InvoiceId) -> Result<&mut Invoice> {
        self.invoices
            .get_mut(&id)
            .ok_or(BillingError::InvoiceNotFound { invoice_id: id })
    }

    /// empty drafts may be dropped; anything else is history
    pub fn remove_empty_draft(&mut self, id: InvoiceId) {
        if let Some(invoice) = self.invoices.get(&id) {
            if invoice.status == crate::types::InvoiceStatus::Draft && invoice.lines.is_empty() {
                self.invoices.remove(&id);
            }
        }
    }

    pub fn active_invoice_for(&self, resident_id: ResidentId, period: BillingPeriod) -> Option<&Invoice> {
        self.invoices
            .values()
            .find(|i| i.resident_id == resident_id && i.period == period && !i.is_canceled())
    }

    pub fn draft_ids_for_period(&self, period: BillingPeriod) -> Vec<InvoiceId> {
        let mut ids: Vec<InvoiceId> = self
            .invoices
            .values()
            .filter(|i| i.period == period && i.status == crate::types::InvoiceStatus::Draft)
            .map(|i| i.id)
            .collect();
        ids.sort();
        ids
    }

    /// open invoices of the resident set, as allocation candidates
    pub fn open_candidates(
        &self,
        residents: &[ResidentId],
        scope: AllocationScope,
    ) -> Vec<InvoiceCandidate> {
        self.invoices
            .values()
            .filter(|i| {
                residents.contains(&i.resident_id)
                    && i.status.is_open()
                    && scope.admits(i.period)
            })
            .map(|i| InvoiceCandidate {
                invoice_id: i.id,
                period: i.period,
                remaining: (i.amount_total - self.applied_to_invoice(i.id)).max(Money::ZERO),
            })
            .collect()
    }

    /// applied-payment total of one invoice, summed from the application
    /// rows rather than cached
    pub fn applied_to_invoice(&self, invoice_id: InvoiceId) -> Money {
        self.payments
            .values()
            .flat_map(|p| p.applications.iter())
            .filter(|a| a.invoice_id == invoice_id)
            .map(|a| a.amount)
            .sum()
    }

    /// next number sequence for the (year, month) scope
    pub fn next_sequence(&self, period: BillingPeriod) -> u32 {
        let prefix = if period.is_opening() {
            OPENING_NUMBER_PREFIX.to_string()
        } else {
            format!("{}-{:02}/", period.year, period.month)
        };
        self.invoices
            .values()
            .filter_map(|i| i.number.as_deref())
            .filter_map(|n| n.strip_prefix(&prefix))
            .filter_map(|tail| tail.parse::<u32>().ok())
            .max()
            .unwrap_or(0)
            + 1
    }

    /// numbers are unique across all scopes
    pub fn number_taken(&self, number: &str) -> bool {
        self.invoices
            .values()
            .any(|i| i.number.as_deref() == Some(number))
    }

    // payments

    pub fn insert_payment(&mut self, payment: Payment) -> Result<()> {
        self.resident(payment.resident_id)?;
        self.payments.insert(payment.id, payment);
        Ok(())
    }

    pub fn payment(&self, id: PaymentId) -> Result<&Payment> {
        self.payments
            .get(&id)
            .ok_or(BillingError::PaymentNotFound { payment_id: id })
    }

    pub fn payment_mut(&mut self, id: PaymentId) -> Result<&mut Payment> {
        self.payments
            .get_mut(&id)
            .ok_or(BillingError::PaymentNotFound { payment_id: id })
    }

    /// payments of the resident set, oldest first
    pub fn payments_of(&self, residents: &[ResidentId]) -> Vec<&Payment> {
        let mut rows: Vec<&Payment> = self
            .payments
            .values()
            .filter(|p| residents.contains(&p.resident_id))
            .collect();
        rows.sort_by_key(|p| (p.received_at, p.id));
        rows
    }

    /// gross outstanding debt of one resident, not reduced by the shared
    /// advance pool
    pub fn resident_debt(&self, resident_id: ResidentId) -> Money {
        self.invoices
            .values()
            .filter(|i| i.resident_id == resident_id && !i.is_canceled())
            .map(|i| (i.amount_total - self.applied_to_invoice(i.id)).max(Money::ZERO))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::Rate;
    use crate::tariff::TariffStep;
    use crate::types::{CustomerCategory, InvoiceStatus, MeterCategory};
    use rust_decimal_macros::dec;

    fn money(s: &str) -> Money {
        Money::from_str_exact(s).unwrap()
    }

    fn store_with_resident() -> (BillingStore, ResidentId) {
        let mut store = BillingStore::new();
        let resident = Resident::new("unit 12");
        let id = resident.id;
        store.insert_resident(resident);
        (store, id)
    }

    fn water_tariff() -> Tariff {
        Tariff::new(
            "water",
            MeterCategory::Water,
            CustomerCategory::Household,
            Rate::from_percentage(20),
            vec![TariffStep::quantity(dec!(0), None, money("1.00"))],
        )
    }

    #[test]
    fn test_duplicate_invoice_per_period_rejected() {
        let (mut store, resident) = store_with_resident();
        let period = BillingPeriod::new(2025, 3);
        store.insert_invoice(Invoice::draft(resident, period)).unwrap();
        let err = store.insert_invoice(Invoice::draft(resident, period)).unwrap_err();
        assert_eq!(err.code(), "invoice_duplicate");
    }

    #[test]
    fn test_canceled_invoice_frees_the_period() {
        let (mut store, resident) = store_with_resident();
        let period = BillingPeriod::new(2025, 3);
        let mut first = Invoice::draft(resident, period);
        first.status = InvoiceStatus::Canceled;
        store.invoices.insert(first.id, first);
        assert!(store.insert_invoice(Invoice::draft(resident, period)).is_ok());
    }

    #[test]
    fn test_opening_invoices_are_exempt_from_the_period_rule() {
        let (mut store, resident) = store_with_resident();
        store
            .insert_invoice(Invoice::opening_balance(resident, money("100.00")))
            .unwrap();
        assert!(store
            .insert_invoice(Invoice::opening_balance(resident, money("50.00")))
            .is_ok());
    }

    #[test]
    fn test_next_sequence_scoped_to_period() {
        let (mut store, resident) = store_with_resident();
        let march = BillingPeriod::new(2025, 3);
        let april = BillingPeriod::new(2025, 4);

        let mut invoice = Invoice::draft(resident, march);
        invoice.number = Some("2025-03/000007".to_string());
        store.invoices.insert(invoice.id, invoice);

        assert_eq!(store.next_sequence(march), 8);
        assert_eq!(store.next_sequence(april), 1);
        assert!(store.number_taken("2025-03/000007"));
        assert!(!store.number_taken("2025-03/000008"));
    }

    #[test]
    fn test_meter_with_history_cannot_be_removed() {
        let (mut store, resident) = store_with_resident();
        let tariff = water_tariff();
        let tariff_id = tariff.id;
        store.save_tariff(tariff).unwrap();
        let meter = ResidentMeter::new(resident, MeterCategory::Water, tariff_id, dec!(0));
        let meter_id = meter.id;
        store.insert_meter(meter).unwrap();

        store.upsert_reading_row(MeterReading {
            id: Uuid::new_v4(),
            meter_id,
            period: BillingPeriod::new(2025, 3),
            value: dec!(10),
            consumption: dec!(10),
            tariff_id,
            amount_net: money("10.00"),
            amount_vat: money("2.00"),
            amount_total: money("12.00"),
            note: None,
        });

        let err = store.remove_meter(meter_id).unwrap_err();
        assert_eq!(err.code(), "meter_has_history");
    }

    #[test]
    fn test_tariff_category_frozen_once_referenced() {
        let (mut store, resident) = store_with_resident();
        let tariff = water_tariff();
        let tariff_id = tariff.id;
        store.save_tariff(tariff.clone()).unwrap();
        let meter = ResidentMeter::new(resident, MeterCategory::Water, tariff_id, dec!(0));
        let meter_id = meter.id;
        store.insert_meter(meter).unwrap();
        store.upsert_reading_row(MeterReading {
            id: Uuid::new_v4(),
            meter_id,
            period: BillingPeriod::new(2025, 3),
            value: dec!(10),
            consumption: dec!(10),
            tariff_id,
            amount_net: money("10.00"),
            amount_vat: money("2.00"),
            amount_total: money("12.00"),
            note: None,
        });

        // full step replacement stays allowed
        let mut repriced = tariff.clone();
        repriced.steps = vec![TariffStep::quantity(dec!(0), None, money("2.00"))];
        assert!(store.save_tariff(repriced).is_ok());

        // category change is frozen
        let mut reshaped = tariff;
        reshaped.meter_category = MeterCategory::Gas;
        let err = store.save_tariff(reshaped).unwrap_err();
        assert_eq!(err.code(), "tariff_shape_frozen");
    }

    #[test]
    fn test_group_members_defaults_to_self() {
        let (mut store, resident) = store_with_resident();
        assert_eq!(store.group_members(resident).unwrap(), vec![resident]);

        let other = Resident::new("unit 13");
        let other_id = other.id;
        store.insert_resident(other);
        let group = Uuid::new_v4();
        store.set_group(group, &[resident, other_id]).unwrap();
        assert_eq!(store.group_members(resident).unwrap().len(), 2);
    }
}
