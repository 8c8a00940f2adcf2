use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::NaiveDate;
use dashmap::DashMap;
use hourglass_rs::SafeTimeProvider;
use rust_decimal::Decimal;
use tracing::{debug, info};
use uuid::Uuid;

use crate::allocation::{
    AdvanceAllocator, AdvancePool, AllocationOutcome, FifoAllocator, ManualAllocation,
    ManualAllocator, PaymentCapacity, PlannedApplication,
};
use crate::decimal::Money;
use crate::errors::{BillingError, Result};
use crate::events::{Event, EventStore};
use crate::invoicing::{Invoice, InvoiceAggregator, InvoiceLifecycle, InvoiceView};
use crate::metering::{ConsumptionResolver, MeterReading, ResidentMeter, UpsertPlan};
use crate::payment::{Payment, PaymentApplication};
use crate::pricing::{PriceBreakdown, StepPricer};
use crate::store::{BillingStore, Resident};
use crate::tariff::Tariff;
use crate::types::{
    AllocationScope, ApplicationOrigin, BillingPeriod, GroupId, InvoiceId, MeterCategory, MeterId,
    PaymentId, PaymentMethod, ResidentId, TariffId,
};

/// billing & payment reconciliation engine
///
/// every operation is atomic: it plans and validates against the store,
/// then applies all derived writes inside one write-lock section. advance
/// operations additionally hold an exclusive per-resident-group lock so the
/// pool read and the application writes cannot interleave with a concurrent
/// transfer; the same unit of money must never fund two invoice lines.
pub struct BillingEngine {
    store: RwLock<BillingStore>,
    group_locks: DashMap<Uuid, Arc<Mutex<()>>>,
    events: Mutex<EventStore>,
}

impl Default for BillingEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl BillingEngine {
    pub fn new() -> Self {
        Self {
            store: RwLock::new(BillingStore::new()),
            group_locks: DashMap::new(),
            events: Mutex::new(EventStore::new()),
        }
    }

    fn store_read(&self) -> RwLockReadGuard<'_, BillingStore> {
        self.store.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn store_write(&self) -> RwLockWriteGuard<'_, BillingStore> {
        self.store.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: Event) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .emit(event);
    }

    /// drain the events collected since the last call
    pub fn take_events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take_events()
    }

    fn group_lock(&self, key: Uuid) -> Arc<Mutex<()>> {
        self.group_locks.entry(key).or_default().clone()
    }

    // registration

    pub fn register_resident(&self, name: &str) -> ResidentId {
        let resident = Resident::new(name);
        let id = resident.id;
        self.store_write().insert_resident(resident);
        id
    }

    /// link residents into one advance-sharing group
    pub fn link_residents(&self, members: &[ResidentId]) -> Result<GroupId> {
        let group_id = Uuid::new_v4();
        self.store_write().set_group(group_id, members)?;
        Ok(group_id)
    }

    pub fn save_tariff(&self, tariff: Tariff) -> Result<TariffId> {
        let id = tariff.id;
        self.store_write().save_tariff(tariff)?;
        Ok(id)
    }

    pub fn register_meter(
        &self,
        resident_id: ResidentId,
        category: MeterCategory,
        tariff_id: TariffId,
        initial_reading: Decimal,
    ) -> Result<MeterId> {
        let meter = ResidentMeter::new(resident_id, category, tariff_id, initial_reading);
        let id = meter.id;
        self.store_write().insert_meter(meter)?;
        Ok(id)
    }

    /// soft deactivation; meters with reading history cannot be deleted
    pub fn deactivate_meter(&self, meter_id: MeterId) -> Result<()> {
        self.store_write().meter_mut(meter_id)?.active = false;
        Ok(())
    }

    pub fn remove_meter(&self, meter_id: MeterId) -> Result<()> {
        self.store_write().remove_meter(meter_id)
    }

    // pricing

    /// price a consumption quantity against a saved tariff
    pub fn price(
        &self,
        tariff_id: TariffId,
        consumption: Decimal,
        billing_date: NaiveDate,
    ) -> Result<PriceBreakdown> {
        let store = self.store_read();
        StepPricer::price(store.tariff(tariff_id)?, consumption, billing_date)
    }

    // readings

    /// record or correct the reading for (meter, period); returns `None`
    /// when a fixed-price toggle-off removed the reading instead
    pub fn upsert_reading(
        &self,
        meter_id: MeterId,
        period: BillingPeriod,
        value: Decimal,
        note: Option<String>,
    ) -> Result<Option<MeterReading>> {
        if !period.is_normal() {
            return Err(BillingError::InvalidPeriod { period });
        }
        let mut store = self.store_write();
        let meter = store.meter(meter_id)?.clone();
        let existing = store.readings_of_meter(meter_id);
        let plan =
            ConsumptionResolver::plan_upsert(&meter, &existing, period, value, note, store.tariffs())?;

        match plan {
            UpsertPlan::Noop => Ok(None),
            UpsertPlan::RemoveExisting { reading_id } => {
                self.drop_reading(&mut store, &meter, reading_id)?;
                Ok(None)
            }
            UpsertPlan::Apply {
                reading,
                replaced_existing,
                chain,
            } => {
                debug!(
                    meter = %meter_id,
                    period = %period,
                    consumption = %reading.consumption,
                    "upserting reading"
                );
                store.upsert_reading_row(reading.clone());
                self.sync_invoice_line(&mut store, &meter, &reading)?;

                let chain_len = chain.len();
                for downstream in chain {
                    store.upsert_reading_row(downstream.clone());
                    self.sync_invoice_line(&mut store, &meter, &downstream)?;
                }
                if chain_len > 0 {
                    self.emit(Event::ReadingChainRecomputed {
                        meter_id,
                        readings_affected: chain_len,
                    });
                }
                self.emit(Event::ReadingUpserted {
                    meter_id,
                    reading_id: reading.id,
                    period,
                    consumption: reading.consumption,
                    amount_total: reading.amount_total,
                    replaced_existing,
                });
                Ok(Some(reading))
            }
        }
    }

    /// remove the (meter, period) reading and its invoice line, re-deriving
    /// downstream consumption
    pub fn remove_reading(&self, meter_id: MeterId, period: BillingPeriod) -> Result<()> {
        let mut store = self.store_write();
        let meter = store.meter(meter_id)?.clone();
        let existing = store.readings_of_meter(meter_id);
        let (reading_id, chain) =
            ConsumptionResolver::plan_remove(&meter, &existing, period, store.tariffs())?;

        let chain_len = chain.len();
        for downstream in chain {
            store.upsert_reading_row(downstream.clone());
            self.sync_invoice_line(&mut store, &meter, &downstream)?;
        }
        self.drop_reading(&mut store, &meter, reading_id)?;
        if chain_len > 0 {
            self.emit(Event::ReadingChainRecomputed {
                meter_id,
                readings_affected: chain_len,
            });
        }
        Ok(())
    }

    /// remove a reading row together with its invoice line
    fn drop_reading(
        &self,
        store: &mut BillingStore,
        meter: &ResidentMeter,
        reading_id: Uuid,
    ) -> Result<()> {
        let Some(removed) = store.remove_reading_row(reading_id) else {
            return Ok(());
        };
        if let Some(invoice_id) = store
            .active_invoice_for(meter.resident_id, removed.period)
            .map(|i| i.id)
        {
            let paid = store.applied_to_invoice(invoice_id);
            let invoice = store.invoice_mut(invoice_id)?;
            invoice.remove_line_for_reading(removed.id);
            InvoiceAggregator::recompute(invoice);
            if let Some((old_status, new_status)) = InvoiceLifecycle::refresh_status(invoice, paid) {
                self.emit(Event::InvoiceStatusChanged {
                    invoice_id,
                    old_status,
                    new_status,
                });
            }
            store.remove_empty_draft(invoice_id);
        }
        self.emit(Event::ReadingRemoved {
            meter_id: meter.id,
            reading_id: removed.id,
            period: removed.period,
        });
        Ok(())
    }

    /// upsert the invoice line a reading produced and rebalance the invoice
    fn sync_invoice_line(
        &self,
        store: &mut BillingStore,
        meter: &ResidentMeter,
        reading: &MeterReading,
    ) -> Result<()> {
        let invoice_id = match store.active_invoice_for(meter.resident_id, reading.period) {
            Some(invoice) => invoice.id,
            None => {
                let invoice = Invoice::draft(meter.resident_id, reading.period);
                let id = invoice.id;
                store.insert_invoice(invoice)?;
                id
            }
        };
        let description = format!("{} {}", category_label(meter.category), reading.period);
        let paid = store.applied_to_invoice(invoice_id);
        let invoice = store.invoice_mut(invoice_id)?;
        invoice.upsert_line_for_reading(reading, &description);
        InvoiceAggregator::recompute(invoice);
        if let Some((old_status, new_status)) = InvoiceLifecycle::refresh_status(invoice, paid) {
            self.emit(Event::InvoiceStatusChanged {
                invoice_id,
                old_status,
                new_status,
            });
        }
        Ok(())
    }

    // invoice lifecycle

    /// issue a draft invoice, assigning its number and due date
    pub fn issue(
        &self,
        invoice_id: InvoiceId,
        number_override: Option<String>,
        due_date: Option<NaiveDate>,
        time_provider: &SafeTimeProvider,
    ) -> Result<Invoice> {
        let mut store = self.store_write();
        let number = self.issue_locked(&mut store, invoice_id, number_override, due_date, time_provider)?;
        info!(invoice = %invoice_id, number = %number, "invoice issued");
        Ok(store.invoice(invoice_id)?.clone())
    }

    fn issue_locked(
        &self,
        store: &mut BillingStore,
        invoice_id: InvoiceId,
        number_override: Option<String>,
        due_date: Option<NaiveDate>,
        time_provider: &SafeTimeProvider,
    ) -> Result<String> {
        let period = store.invoice(invoice_id)?.period;
        let number = match number_override {
            Some(number) => {
                if store.number_taken(&number) {
                    return Err(BillingError::DuplicateInvoiceNumber { number });
                }
                number
            }
            None => InvoiceLifecycle::format_number(period, store.next_sequence(period)),
        };
        let now = time_provider.now();
        let invoice = store.invoice_mut(invoice_id)?;
        InvoiceLifecycle::issue(invoice, number.clone(), due_date, now)?;
        self.emit(Event::InvoiceIssued {
            invoice_id,
            number: number.clone(),
            timestamp: now,
        });
        Ok(number)
    }

    /// bulk-issue every draft of the period; each invoice is its own atomic
    /// unit and the caller receives the count that succeeded
    pub fn issue_period(&self, period: BillingPeriod, time_provider: &SafeTimeProvider) -> usize {
        let mut store = self.store_write();
        let drafts = store.draft_ids_for_period(period);
        let mut issued = 0;
        for invoice_id in drafts {
            if self
                .issue_locked(&mut store, invoice_id, None, None, time_provider)
                .is_ok()
            {
                issued += 1;
            }
        }
        info!(period = %period, issued, "bulk issue finished");
        issued
    }

    /// cancel a draft or issued invoice; amounts are zeroed, the event is
    /// preserved in the audit notes
    pub fn cancel(&self, invoice_id: InvoiceId, time_provider: &SafeTimeProvider) -> Result<()> {
        let mut store = self.store_write();
        let now = time_provider.now();
        let invoice = store.invoice_mut(invoice_id)?;
        let voided_total = InvoiceLifecycle::cancel(invoice, now)?;
        self.emit(Event::InvoiceCanceled {
            invoice_id,
            voided_total,
            timestamp: now,
        });
        info!(invoice = %invoice_id, voided = %voided_total, "invoice canceled");
        Ok(())
    }

    /// reissue a canceled invoice, blocked while another non-canceled
    /// invoice occupies the same (resident, period)
    pub fn reissue(&self, invoice_id: InvoiceId, time_provider: &SafeTimeProvider) -> Result<Invoice> {
        let mut store = self.store_write();
        let (resident_id, period) = {
            let invoice = store.invoice(invoice_id)?;
            (invoice.resident_id, invoice.period)
        };
        if !period.is_opening() && store.active_invoice_for(resident_id, period).is_some() {
            return Err(BillingError::DuplicateInvoice {
                resident_id,
                period,
            });
        }
        let number = InvoiceLifecycle::format_number(period, store.next_sequence(period));
        let now = time_provider.now();
        let paid = store.applied_to_invoice(invoice_id);
        let invoice = store.invoice_mut(invoice_id)?;
        InvoiceLifecycle::reissue(invoice, number.clone(), now)?;
        InvoiceLifecycle::refresh_status(invoice, paid);
        self.emit(Event::InvoiceReissued {
            invoice_id,
            number,
            timestamp: now,
        });
        Ok(store.invoice(invoice_id)?.clone())
    }

    /// record pre-system legacy debt as an issued opening pseudo-invoice
    pub fn record_opening_balance(
        &self,
        resident_id: ResidentId,
        amount: Money,
        time_provider: &SafeTimeProvider,
    ) -> Result<Invoice> {
        if !amount.is_positive() {
            return Err(BillingError::InvalidAmount { amount });
        }
        let mut store = self.store_write();
        let invoice = Invoice::opening_balance(resident_id, amount);
        let invoice_id = invoice.id;
        store.insert_invoice(invoice)?;
        self.issue_locked(&mut store, invoice_id, None, None, time_provider)?;
        Ok(store.invoice(invoice_id)?.clone())
    }

    /// self-healing read: correct header totals that drifted from the lines
    /// beyond the tolerance, then refresh the status
    pub fn recompute_invoice(&self, invoice_id: InvoiceId) -> Result<Invoice> {
        let mut store = self.store_write();
        let paid = store.applied_to_invoice(invoice_id);
        let invoice = store.invoice_mut(invoice_id)?;
        let old_total = invoice.amount_total;
        if InvoiceAggregator::heal_drift(invoice) {
            let new_total = invoice.amount_total;
            self.emit(Event::InvoiceRecomputed {
                invoice_id,
                old_total,
                new_total,
            });
            debug!(invoice = %invoice_id, %old_total, %new_total, "healed total drift");
        }
        if let Some((old_status, new_status)) = InvoiceLifecycle::refresh_status(invoice, paid) {
            self.emit(Event::InvoiceStatusChanged {
                invoice_id,
                old_status,
                new_status,
            });
        }
        Ok(invoice.clone())
    }

    pub fn invoice(&self, invoice_id: InvoiceId) -> Result<Invoice> {
        Ok(self.store_read().invoice(invoice_id)?.clone())
    }

    /// serializable invoice view with derived paid/remaining amounts
    pub fn snapshot(&self, invoice_id: InvoiceId) -> Result<InvoiceView> {
        let store = self.store_read();
        let invoice = store.invoice(invoice_id)?;
        Ok(InvoiceView::from_invoice(invoice, store.applied_to_invoice(invoice_id)))
    }

    // payments

    /// record an incoming payment; with a scope it is immediately applied
    /// fifo across the resident's open invoices, without one the funds sit
    /// in the advance pool
    pub fn record_payment(
        &self,
        resident_id: ResidentId,
        amount: Money,
        method: PaymentMethod,
        reference: Option<String>,
        scope: Option<AllocationScope>,
        time_provider: &SafeTimeProvider,
    ) -> Result<(PaymentId, AllocationOutcome)> {
        if !amount.is_positive() {
            return Err(BillingError::InvalidAmount { amount });
        }
        let mut store = self.store_write();
        store.resident(resident_id)?;

        let now = time_provider.now();
        let mut payment = Payment::new(resident_id, amount, method, now);
        payment.reference = reference;
        let payment_id = payment.id;
        store.insert_payment(payment)?;
        self.emit(Event::PaymentRecorded {
            payment_id,
            resident_id,
            amount,
            method,
            timestamp: now,
        });
        info!(resident = %resident_id, %amount, ?method, "payment recorded");

        let outcome = match scope {
            // advance-method rows are bookkeeping only and never fund
            Some(scope) if method != PaymentMethod::Advance => {
                let candidates = store.open_candidates(&[resident_id], scope);
                let planned = FifoAllocator::plan(amount, candidates);
                self.materialize(&mut store, payment_id, &planned, ApplicationOrigin::Direct)?
            }
            _ => AllocationOutcome::NONE,
        };
        Ok((payment_id, outcome))
    }

    fn materialize(
        &self,
        store: &mut BillingStore,
        payment_id: PaymentId,
        planned: &[PlannedApplication],
        origin: ApplicationOrigin,
    ) -> Result<AllocationOutcome> {
        let mut amount_applied = Money::ZERO;
        for application in planned {
            store
                .payment_mut(payment_id)?
                .applications
                .push(PaymentApplication::new(application.invoice_id, application.amount, origin));
            self.emit(Event::PaymentApplied {
                payment_id,
                invoice_id: application.invoice_id,
                amount: application.amount,
                origin,
            });
            self.refresh_invoice_status(store, application.invoice_id)?;
            amount_applied += application.amount;
        }
        Ok(AllocationOutcome {
            invoices_affected: planned.len(),
            amount_applied,
        })
    }

    fn refresh_invoice_status(&self, store: &mut BillingStore, invoice_id: InvoiceId) -> Result<()> {
        let paid = store.applied_to_invoice(invoice_id);
        let invoice = store.invoice_mut(invoice_id)?;
        if let Some((old_status, new_status)) = InvoiceLifecycle::refresh_status(invoice, paid) {
            self.emit(Event::InvoiceStatusChanged {
                invoice_id,
                old_status,
                new_status,
            });
        }
        Ok(())
    }

    /// manual re-allocation: replace one payment's applications with
    /// explicit per-invoice amounts; any violation leaves nothing written
    pub fn apply_payment(&self, payment_id: PaymentId, allocations: &[ManualAllocation]) -> Result<()> {
        let mut store = self.store_write();
        let payment = store.payment(payment_id)?.clone();

        let mut capacity = std::collections::HashMap::new();
        for allocation in allocations {
            let invoice = store.invoice(allocation.invoice_id)?;
            if invoice.resident_id != payment.resident_id {
                return Err(BillingError::ResidentMismatch {
                    invoice_id: invoice.id,
                    resident_id: payment.resident_id,
                });
            }
            if invoice.is_canceled() {
                return Err(BillingError::CanceledInvoiceFrozen {
                    invoice_id: invoice.id,
                });
            }
            // remaining-to-pay plus this payment's own prior contribution,
            // so repeated submissions cannot double-count
            let applied_all = store.applied_to_invoice(invoice.id);
            let cap = (invoice.amount_total - applied_all).max(Money::ZERO)
                + payment.applied_to(invoice.id);
            capacity.insert(invoice.id, cap);
        }
        ManualAllocator::validate(payment.amount_total, allocations, &capacity)?;

        let mut touched: BTreeSet<InvoiceId> =
            payment.applications.iter().map(|a| a.invoice_id).collect();
        let released = payment.applied_total();

        let row = store.payment_mut(payment_id)?;
        row.applications.clear();
        let mut applied = Money::ZERO;
        for allocation in allocations {
            if !allocation.amount.is_positive() {
                continue;
            }
            row.applications.push(PaymentApplication::new(
                allocation.invoice_id,
                allocation.amount,
                ApplicationOrigin::Direct,
            ));
            applied += allocation.amount;
            touched.insert(allocation.invoice_id);
        }
        self.emit(Event::PaymentReallocated {
            payment_id,
            released,
            applied,
        });
        for invoice_id in touched {
            self.refresh_invoice_status(&mut store, invoice_id)?;
        }
        Ok(())
    }

    // advance

    /// display-only pool balance; reads lock-free with respect to the group
    /// lock
    pub fn advance_balance(&self, resident_id: ResidentId) -> Result<Money> {
        let store = self.store_read();
        let members = store.group_members(resident_id)?;
        Ok(AdvancePool::balance(store.payments_of(&members).into_iter()))
    }

    /// gross outstanding debt of one resident, not reduced by the pool
    pub fn resident_debt(&self, resident_id: ResidentId) -> Result<Money> {
        let store = self.store_read();
        store.resident(resident_id)?;
        Ok(store.resident_debt(resident_id))
    }

    /// group-level debt, net of the shared advance pool
    pub fn group_debt_net(&self, resident_id: ResidentId) -> Result<Money> {
        let store = self.store_read();
        let members = store.group_members(resident_id)?;
        let gross: Money = members.iter().map(|m| store.resident_debt(*m)).sum();
        let pool = AdvancePool::balance(store.payments_of(&members).into_iter());
        Ok((gross - pool).max(Money::ZERO))
    }

    /// transfer the pooled advance onto open invoices: a fifo walk funded
    /// from historical payments' leftover capacity, oldest payments first,
    /// closed by a synthetic advance-method payment for operator visibility
    ///
    /// holds the resident-group lock across the pool read and the writes so
    /// two concurrent transfers cannot spend the same leftover twice
    pub fn auto_apply_advance(
        &self,
        resident_id: ResidentId,
        requested: Option<Money>,
        scope: Option<AllocationScope>,
        time_provider: &SafeTimeProvider,
    ) -> Result<AllocationOutcome> {
        let group_key = {
            let store = self.store_read();
            let resident = store.resident(resident_id)?;
            resident.group_id.unwrap_or(resident_id)
        };
        let lock = self.group_lock(group_key);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut store = self.store_write();
        let members = store.group_members(resident_id)?;
        let capacities: Vec<PaymentCapacity> = store
            .payments_of(&members)
            .into_iter()
            .filter(|p| p.method != PaymentMethod::Advance)
            .map(PaymentCapacity::of)
            .collect();
        let candidates = store.open_candidates(&members, scope.unwrap_or(AllocationScope::AllOpen));

        let plan = AdvanceAllocator::plan(requested, capacities, candidates)?;
        if plan.is_empty() {
            return Ok(AllocationOutcome::NONE);
        }

        for draw in &plan.draws {
            store
                .payment_mut(draw.payment_id)?
                .applications
                .push(PaymentApplication::new(
                    draw.invoice_id,
                    draw.amount,
                    ApplicationOrigin::AdvanceTransfer,
                ));
            self.emit(Event::PaymentApplied {
                payment_id: draw.payment_id,
                invoice_id: draw.invoice_id,
                amount: draw.amount,
                origin: ApplicationOrigin::AdvanceTransfer,
            });
        }
        let funded: BTreeSet<InvoiceId> = plan.draws.iter().map(|d| d.invoice_id).collect();
        for invoice_id in funded {
            self.refresh_invoice_status(&mut store, invoice_id)?;
        }

        let now = time_provider.now();
        let mut synthetic =
            Payment::new(resident_id, plan.amount_applied, PaymentMethod::Advance, now);
        synthetic.comment = Some("advance transfer".to_string());
        let synthetic_payment_id = synthetic.id;
        store.insert_payment(synthetic)?;

        self.emit(Event::AdvanceTransferred {
            resident_id,
            amount: plan.amount_applied,
            invoices_funded: plan.invoices_funded,
            synthetic_payment_id,
            timestamp: now,
        });
        info!(
            resident = %resident_id,
            amount = %plan.amount_applied,
            invoices = plan.invoices_funded,
            "advance transferred"
        );
        Ok(AllocationOutcome {
            invoices_affected: plan.invoices_funded,
            amount_applied: plan.amount_applied,
        })
    }

    pub fn payment(&self, payment_id: PaymentId) -> Result<Payment> {
        Ok(self.store_read().payment(payment_id)?.clone())
    }
}

fn category_label(category: MeterCategory) -> &'static str {
    match category {
        MeterCategory::Electric => "electricity",
        MeterCategory::Gas => "gas",
        MeterCategory::Water => "water",
        MeterCategory::Sewerage => "sewerage",
        MeterCategory::FixedService => "service fee",
        MeterCategory::Rent => "rent",
        MeterCategory::Construction => "construction fee",
    }
}
