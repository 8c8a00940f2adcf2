use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::decimal::Money;
use crate::errors::{BillingError, Result};
use crate::pricing::StepPricer;
use crate::tariff::Tariff;
use crate::types::{BillingPeriod, MeterCategory, MeterId, ReadingId, ResidentId, TariffId};

/// meter attached to a resident
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResidentMeter {
    pub id: MeterId,
    pub resident_id: ResidentId,
    pub category: MeterCategory,
    pub tariff_id: TariffId,
    /// baseline used when no prior reading exists
    pub initial_reading: Decimal,
    pub active: bool,
}

impl ResidentMeter {
    pub fn new(
        resident_id: ResidentId,
        category: MeterCategory,
        tariff_id: TariffId,
        initial_reading: Decimal,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            resident_id,
            category,
            tariff_id,
            initial_reading,
            active: true,
        }
    }
}

/// one reading per meter per billing month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterReading {
    pub id: ReadingId,
    pub meter_id: MeterId,
    pub period: BillingPeriod,
    pub value: Decimal,
    pub consumption: Decimal,
    /// tariff captured at billing time; history never re-prices on tariff
    /// update
    pub tariff_id: TariffId,
    pub amount_net: Money,
    pub amount_vat: Money,
    pub amount_total: Money,
    pub note: Option<String>,
}

/// what an upsert will do, computed without mutating anything
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertPlan {
    /// write the reading (new row or in-place update) and the recomputed
    /// downstream chain
    Apply {
        reading: MeterReading,
        replaced_existing: bool,
        chain: Vec<MeterReading>,
    },
    /// fixed-price toggle off: drop the existing reading and its line
    RemoveExisting {
        reading_id: ReadingId,
    },
    /// fixed-price zero with nothing recorded
    Noop,
}

/// derives consumption and amounts for reading upserts
pub struct ConsumptionResolver;

impl ConsumptionResolver {
    /// plan an upsert of `value` for (meter, period)
    ///
    /// `existing` holds every reading of the meter; `tariffs` must contain
    /// the meter's tariff and the tariff of every downstream reading
    pub fn plan_upsert(
        meter: &ResidentMeter,
        existing: &[MeterReading],
        period: BillingPeriod,
        value: Decimal,
        note: Option<String>,
        tariffs: &HashMap<TariffId, Tariff>,
    ) -> Result<UpsertPlan> {
        let current = existing.iter().find(|r| r.period == period);

        if meter.category.is_fixed_price() && value.is_zero() {
            // a month opted out is removed entirely, not zeroed
            return Ok(match current {
                Some(r) => UpsertPlan::RemoveExisting { reading_id: r.id },
                None => UpsertPlan::Noop,
            });
        }

        let tariff = tariffs
            .get(&meter.tariff_id)
            .ok_or(BillingError::TariffNotFound {
                tariff_id: meter.tariff_id,
            })?;

        let consumption = Self::derive_consumption(meter, existing, period, value)?;
        let breakdown = StepPricer::price(tariff, consumption, period.first_day())?;

        let reading = MeterReading {
            id: current.map(|r| r.id).unwrap_or_else(Uuid::new_v4),
            meter_id: meter.id,
            period,
            value,
            consumption,
            tariff_id: tariff.id,
            amount_net: breakdown.net,
            amount_vat: breakdown.vat,
            amount_total: breakdown.total,
            note,
        };

        let chain = if meter.category.is_cumulative() {
            Self::recompute_chain(meter, existing, period, reading.value, tariffs)?
        } else {
            Vec::new()
        };

        Ok(UpsertPlan::Apply {
            reading,
            replaced_existing: current.is_some(),
            chain,
        })
    }

    /// plan removal of the (meter, period) reading; downstream readings are
    /// re-derived against the chain with the removed row gone
    pub fn plan_remove(
        meter: &ResidentMeter,
        existing: &[MeterReading],
        period: BillingPeriod,
        tariffs: &HashMap<TariffId, Tariff>,
    ) -> Result<(ReadingId, Vec<MeterReading>)> {
        let target = existing
            .iter()
            .find(|r| r.period == period)
            .ok_or(BillingError::ReadingNotFound {
                meter_id: meter.id,
                period,
            })?;

        let chain = if meter.category.is_cumulative() {
            let remaining: Vec<MeterReading> = existing
                .iter()
                .filter(|r| r.id != target.id)
                .cloned()
                .collect();
            let start = Self::baseline(meter, &remaining, period);
            Self::recompute_chain(meter, &remaining, period, start, tariffs)?
        } else {
            Vec::new()
        };
        Ok((target.id, chain))
    }

    /// consumption for the target period: cumulative categories subtract the
    /// baseline, fixed-price categories bill one unit, construction bills
    /// the entered quantity
    fn derive_consumption(
        meter: &ResidentMeter,
        existing: &[MeterReading],
        period: BillingPeriod,
        value: Decimal,
    ) -> Result<Decimal> {
        if meter.category.is_fixed_price() {
            return Ok(Decimal::ONE);
        }
        if meter.category.is_date_priced() {
            if value.is_sign_negative() {
                return Err(BillingError::InvalidAmount {
                    amount: Money::from_decimal(value),
                });
            }
            return Ok(value);
        }

        let baseline = Self::baseline(meter, existing, period);
        let consumption = value - baseline;
        // a negative result is a data-entry error, never silently zeroed
        if consumption.is_sign_negative() {
            return Err(BillingError::NegativeConsumption {
                meter_id: meter.id,
                baseline,
                value,
            });
        }
        Ok(consumption)
    }

    /// the most recent reading dated strictly before the first day of
    /// `period`, falling back to the meter's initial reading
    fn baseline(meter: &ResidentMeter, existing: &[MeterReading], period: BillingPeriod) -> Decimal {
        existing
            .iter()
            .filter(|r| r.period < period)
            .max_by_key(|r| r.period)
            .map(|r| r.value)
            .unwrap_or(meter.initial_reading)
    }

    /// forward-chain recompute: reading[n].consumption depends on
    /// reading[n-1].value, so an edit in the past re-derives every later
    /// reading against the corrected chain
    fn recompute_chain(
        meter: &ResidentMeter,
        existing: &[MeterReading],
        after: BillingPeriod,
        start_value: Decimal,
        tariffs: &HashMap<TariffId, Tariff>,
    ) -> Result<Vec<MeterReading>> {
        let mut downstream: Vec<&MeterReading> = existing
            .iter()
            .filter(|r| r.period > after)
            .collect();
        downstream.sort_by_key(|r| r.period);

        let mut prev_value = start_value;
        let mut updates = Vec::new();
        for reading in downstream {
            let consumption = reading.value - prev_value;
            if consumption.is_sign_negative() {
                return Err(BillingError::NegativeConsumption {
                    meter_id: meter.id,
                    baseline: prev_value,
                    value: reading.value,
                });
            }
            prev_value = reading.value;

            if consumption == reading.consumption {
                continue;
            }
            let tariff = tariffs
                .get(&reading.tariff_id)
                .ok_or(BillingError::TariffNotFound {
                    tariff_id: reading.tariff_id,
                })?;
            let breakdown = StepPricer::price(tariff, consumption, reading.period.first_day())?;
            let mut updated = reading.clone();
            updated.consumption = consumption;
            updated.amount_net = breakdown.net;
            updated.amount_vat = breakdown.vat;
            updated.amount_total = breakdown.total;
            updates.push(updated);
        }
        Ok(updates)
    }
}
