use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::errors::{BillingError, Result};
use crate::tariff::{StepRange, Tariff};

/// charge attributed to a single tariff step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepCharge {
    pub quantity: Decimal,
    pub unit_price: Money,
    pub amount: Money,
}

/// priced amounts with the per-step audit trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub net: Money,
    pub vat: Money,
    pub total: Money,
    pub steps: Vec<StepCharge>,
}

impl PriceBreakdown {
    fn from_charges(tariff: &Tariff, steps: Vec<StepCharge>) -> Self {
        let net: Money = steps.iter().map(|s| s.amount).sum();
        let vat = net.vat(tariff.vat);
        Self {
            net,
            vat,
            total: net + vat,
            steps,
        }
    }
}

/// tiered tariff pricer
pub struct StepPricer;

impl StepPricer {
    /// price a billing event, dispatching on the tariff's category
    pub fn price(tariff: &Tariff, consumption: Decimal, billing_date: NaiveDate) -> Result<PriceBreakdown> {
        if tariff.meter_category.is_fixed_price() {
            Self::price_fixed(tariff)
        } else if tariff.meter_category.is_date_priced() {
            Self::price_dated(tariff, billing_date, consumption)
        } else {
            Self::price_quantity(tariff, consumption)
        }
    }

    /// walk the steps in ascending order, consuming each band until the
    /// quantity is exhausted
    pub fn price_quantity(tariff: &Tariff, consumption: Decimal) -> Result<PriceBreakdown> {
        if consumption.is_sign_negative() {
            return Err(BillingError::InvalidAmount {
                amount: Money::from_decimal(consumption),
            });
        }

        let mut remaining = consumption;
        let mut charges = Vec::new();
        for step in &tariff.steps {
            if remaining.is_zero() {
                break;
            }
            let StepRange::Quantity { from, to } = &step.range else {
                return Err(BillingError::InvalidTariffSteps {
                    message: "date-range step on a metered tariff".to_string(),
                });
            };
            let portion = match to {
                Some(to) => remaining.min(*to - *from),
                None => remaining,
            };
            charges.push(StepCharge {
                quantity: portion,
                unit_price: step.unit_price,
                amount: step.unit_price * portion,
            });
            remaining -= portion;
        }

        // unreachable for a validated tariff: the schema guarantees the last
        // step is unbounded, so fail loudly instead of truncating
        if !remaining.is_zero() {
            return Err(BillingError::StepCoverageGap {
                tariff_id: tariff.id,
                consumption,
            });
        }

        Ok(PriceBreakdown::from_charges(tariff, charges))
    }

    /// construction pricing: the unit price is selected by date-range
    /// membership of the billing event
    pub fn price_dated(tariff: &Tariff, date: NaiveDate, quantity: Decimal) -> Result<PriceBreakdown> {
        if quantity.is_sign_negative() {
            return Err(BillingError::InvalidAmount {
                amount: Money::from_decimal(quantity),
            });
        }
        let step = tariff
            .step_for_date(date)
            .ok_or(BillingError::NoStepForDate { tariff_id: tariff.id })?;
        let charge = StepCharge {
            quantity,
            unit_price: step.unit_price,
            amount: step.unit_price * quantity,
        };
        Ok(PriceBreakdown::from_charges(tariff, vec![charge]))
    }

    /// fixed-price categories bill one unit for the month
    pub fn price_fixed(tariff: &Tariff) -> Result<PriceBreakdown> {
        let step = tariff.steps.first().ok_or(BillingError::InvalidTariffSteps {
            message: "fixed-price tariff has no step".to_string(),
        })?;
        let charge = StepCharge {
            quantity: Decimal::ONE,
            unit_price: step.unit_price,
            amount: step.unit_price,
        };
        Ok(PriceBreakdown::from_charges(tariff, vec![charge]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::Rate;
    use crate::tariff::TariffStep;
    use crate::types::{CustomerCategory, MeterCategory};
    use rust_decimal_macros::dec;

    fn money(s: &str) -> Money {
        Money::from_str_exact(s).unwrap()
    }

    fn tiered_tariff() -> Tariff {
        Tariff::new(
            "household electric",
            MeterCategory::Electric,
            CustomerCategory::Household,
            Rate::from_percentage(20),
            vec![
                TariffStep::quantity(dec!(0), Some(dec!(100)), money("0.10")),
                TariffStep::quantity(dec!(100), Some(dec!(500)), money("0.15")),
                TariffStep::quantity(dec!(500), None, money("0.20")),
            ],
        )
    }

    #[test]
    fn test_tiered_pricing_spans_three_steps() {
        // 100 * 0.10 + 400 * 0.15 + 150 * 0.20 = 10 + 60 + 30 = 100.00
        let breakdown = StepPricer::price_quantity(&tiered_tariff(), dec!(650)).unwrap();
        assert_eq!(breakdown.net, money("100.00"));
        assert_eq!(breakdown.vat, money("20.00"));
        assert_eq!(breakdown.total, money("120.00"));
        assert_eq!(breakdown.steps.len(), 3);
        assert_eq!(breakdown.steps[0].amount, money("10.00"));
        assert_eq!(breakdown.steps[1].amount, money("60.00"));
        assert_eq!(breakdown.steps[2].amount, money("30.00"));
    }

    #[test]
    fn test_consumption_within_first_step() {
        let breakdown = StepPricer::price_quantity(&tiered_tariff(), dec!(42)).unwrap();
        assert_eq!(breakdown.net, money("4.20"));
        assert_eq!(breakdown.steps.len(), 1);
    }

    #[test]
    fn test_zero_consumption_prices_to_zero() {
        let breakdown = StepPricer::price_quantity(&tiered_tariff(), dec!(0)).unwrap();
        assert_eq!(breakdown.total, Money::ZERO);
        assert!(breakdown.steps.is_empty());
    }

    #[test]
    fn test_step_boundary_stays_in_lower_band() {
        let breakdown = StepPricer::price_quantity(&tiered_tariff(), dec!(100)).unwrap();
        assert_eq!(breakdown.net, money("10.00"));
        assert_eq!(breakdown.steps.len(), 1);
    }

    #[test]
    fn test_negative_consumption_rejected() {
        assert!(StepPricer::price_quantity(&tiered_tariff(), dec!(-5)).is_err());
    }

    #[test]
    fn test_bounded_last_step_fails_loudly() {
        // bypasses save-time validation to exercise the defensive check
        let mut tariff = tiered_tariff();
        tariff.steps[2] = TariffStep::quantity(dec!(500), Some(dec!(600)), money("0.20"));
        let err = StepPricer::price_quantity(&tariff, dec!(650)).unwrap_err();
        assert_eq!(err.code(), "tariff_step_coverage_gap");
    }

    #[test]
    fn test_fixed_price_is_one_unit() {
        let tariff = Tariff::fixed(
            "rent",
            MeterCategory::Rent,
            CustomerCategory::Household,
            Rate::from_percentage(20),
            money("250.00"),
        );
        let breakdown = StepPricer::price_fixed(&tariff).unwrap();
        assert_eq!(breakdown.net, money("250.00"));
        assert_eq!(breakdown.vat, money("50.00"));
        assert_eq!(breakdown.steps[0].quantity, Decimal::ONE);
    }

    #[test]
    fn test_dated_pricing_selects_by_membership() {
        let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).unwrap();
        let tariff = Tariff::new(
            "construction fee",
            MeterCategory::Construction,
            CustomerCategory::Household,
            Rate::from_percentage(0),
            vec![
                TariffStep::dated(d(2024, 1, 1), d(2025, 1, 1), money("5.00")),
                TariffStep::dated(d(2025, 1, 1), d(2026, 1, 1), money("7.00")),
            ],
        );

        let breakdown = StepPricer::price_dated(&tariff, d(2025, 3, 1), dec!(2)).unwrap();
        assert_eq!(breakdown.net, money("14.00"));
        assert_eq!(breakdown.vat, Money::ZERO);

        let err = StepPricer::price_dated(&tariff, d(2027, 1, 1), dec!(1)).unwrap_err();
        assert_eq!(err.code(), "tariff_no_step_for_date");
    }

    #[test]
    fn test_vat_rounds_half_up_per_invoice_line() {
        let tariff = Tariff::new(
            "gas",
            MeterCategory::Gas,
            CustomerCategory::Household,
            Rate::from_percentage(9),
            vec![TariffStep::quantity(dec!(0), None, money("0.50"))],
        );
        // net 16.50, vat 1.485 -> 1.49 half-up
        let breakdown = StepPricer::price_quantity(&tariff, dec!(33)).unwrap();
        assert_eq!(breakdown.net, money("16.50"));
        assert_eq!(breakdown.vat, money("1.49"));
        assert_eq!(breakdown.total, money("17.99"));
    }
}
