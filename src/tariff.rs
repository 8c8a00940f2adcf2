use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::{Money, Rate};
use crate::errors::{BillingError, Result};
use crate::types::{CustomerCategory, MeterCategory, TariffId};

/// priced sub-range of a tariff: a consumption band for metered categories,
/// a date window for construction tariffs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StepRange {
    /// half-open consumption band [from, to); `to = None` is open-ended
    Quantity {
        from: Decimal,
        to: Option<Decimal>,
    },
    /// half-open date window [from, to)
    Dates {
        from: NaiveDate,
        to: NaiveDate,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TariffStep {
    pub range: StepRange,
    pub unit_price: Money,
}

impl TariffStep {
    pub fn quantity(from: Decimal, to: Option<Decimal>, unit_price: Money) -> Self {
        Self {
            range: StepRange::Quantity { from, to },
            unit_price,
        }
    }

    pub fn dated(from: NaiveDate, to: NaiveDate, unit_price: Money) -> Self {
        Self {
            range: StepRange::Dates { from, to },
            unit_price,
        }
    }
}

/// tariff with its ordered steps; steps are fully replaced on update,
/// never patched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tariff {
    pub id: TariffId,
    pub name: String,
    pub meter_category: MeterCategory,
    pub customer_category: CustomerCategory,
    pub vat: Rate,
    pub active: bool,
    pub steps: Vec<TariffStep>,
}

impl Tariff {
    pub fn new(
        name: impl Into<String>,
        meter_category: MeterCategory,
        customer_category: CustomerCategory,
        vat: Rate,
        steps: Vec<TariffStep>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            meter_category,
            customer_category,
            vat,
            active: true,
            steps,
        }
    }

    /// fixed-price tariff: one open-ended step carrying the monthly charge
    pub fn fixed(
        name: impl Into<String>,
        meter_category: MeterCategory,
        customer_category: CustomerCategory,
        vat: Rate,
        monthly_price: Money,
    ) -> Self {
        Self::new(
            name,
            meter_category,
            customer_category,
            vat,
            vec![TariffStep::quantity(Decimal::ZERO, None, monthly_price)],
        )
    }

    /// validate the step partition; rejected at save time, never at pricing
    /// time
    pub fn validate(&self) -> Result<()> {
        if !self.vat.is_valid_vat() {
            return Err(BillingError::InvalidTariffSteps {
                message: format!("vat percent out of range: {}", self.vat),
            });
        }
        if self.steps.is_empty() {
            return Err(BillingError::InvalidTariffSteps {
                message: "tariff has no steps".to_string(),
            });
        }
        if self.meter_category.is_date_priced() {
            self.validate_date_steps()
        } else if self.meter_category.is_fixed_price() {
            self.validate_fixed_steps()
        } else {
            self.validate_quantity_steps()
        }
    }

    /// numeric steps must partition [0, inf) contiguously, with exactly the
    /// last step open-ended
    fn validate_quantity_steps(&self) -> Result<()> {
        let mut expected_from = Decimal::ZERO;
        let last = self.steps.len() - 1;
        for (i, step) in self.steps.iter().enumerate() {
            let StepRange::Quantity { from, to } = &step.range else {
                return Err(BillingError::InvalidTariffSteps {
                    message: "date-range step on a metered tariff".to_string(),
                });
            };
            if *from != expected_from {
                return Err(BillingError::InvalidTariffSteps {
                    message: format!("step {} starts at {}, expected {}", i, from, expected_from),
                });
            }
            match to {
                Some(to) => {
                    if i == last {
                        return Err(BillingError::InvalidTariffSteps {
                            message: "last step must be open-ended".to_string(),
                        });
                    }
                    if *to <= *from {
                        return Err(BillingError::InvalidTariffSteps {
                            message: format!("step {} is empty or inverted", i),
                        });
                    }
                    expected_from = *to;
                }
                None => {
                    if i != last {
                        return Err(BillingError::InvalidTariffSteps {
                            message: format!("step {} is open-ended but not last", i),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// fixed-price categories carry exactly one open-ended step
    fn validate_fixed_steps(&self) -> Result<()> {
        if self.steps.len() != 1 {
            return Err(BillingError::InvalidTariffSteps {
                message: "fixed-price tariff must have exactly one step".to_string(),
            });
        }
        match &self.steps[0].range {
            StepRange::Quantity { from, to: None } if from.is_zero() => Ok(()),
            _ => Err(BillingError::InvalidTariffSteps {
                message: "fixed-price step must be [0, unbounded)".to_string(),
            }),
        }
    }

    /// construction steps must be contiguous, non-overlapping date windows
    fn validate_date_steps(&self) -> Result<()> {
        let mut prev_to: Option<NaiveDate> = None;
        for (i, step) in self.steps.iter().enumerate() {
            let StepRange::Dates { from, to } = &step.range else {
                return Err(BillingError::InvalidTariffSteps {
                    message: "quantity step on a construction tariff".to_string(),
                });
            };
            if to <= from {
                return Err(BillingError::InvalidTariffSteps {
                    message: format!("date step {} is empty or inverted", i),
                });
            }
            if let Some(prev) = prev_to {
                if *from != prev {
                    return Err(BillingError::InvalidTariffSteps {
                        message: format!("date step {} is not contiguous with its predecessor", i),
                    });
                }
            }
            prev_to = Some(*to);
        }
        Ok(())
    }

    /// the single step whose date window contains `date`; overlap is
    /// impossible for a validated tariff
    pub fn step_for_date(&self, date: NaiveDate) -> Option<&TariffStep> {
        self.steps.iter().find(|step| match &step.range {
            StepRange::Dates { from, to } => *from <= date && date < *to,
            StepRange::Quantity { .. } => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn tiered_tariff() -> Tariff {
        Tariff::new(
            "household electric",
            MeterCategory::Electric,
            CustomerCategory::Household,
            Rate::from_percentage(20),
            vec![
                TariffStep::quantity(dec!(0), Some(dec!(100)), Money::from_str_exact("0.10").unwrap()),
                TariffStep::quantity(dec!(100), Some(dec!(500)), Money::from_str_exact("0.15").unwrap()),
                TariffStep::quantity(dec!(500), None, Money::from_str_exact("0.20").unwrap()),
            ],
        )
    }

    #[test]
    fn test_valid_tiered_partition() {
        assert!(tiered_tariff().validate().is_ok());
    }

    #[test]
    fn test_gap_rejected() {
        let mut tariff = tiered_tariff();
        tariff.steps[1] = TariffStep::quantity(dec!(150), Some(dec!(500)), Money::ONE);
        assert!(tariff.validate().is_err());
    }

    #[test]
    fn test_overlap_rejected() {
        let mut tariff = tiered_tariff();
        tariff.steps[1] = TariffStep::quantity(dec!(50), Some(dec!(500)), Money::ONE);
        assert!(tariff.validate().is_err());
    }

    #[test]
    fn test_bounded_last_step_rejected() {
        let mut tariff = tiered_tariff();
        tariff.steps[2] = TariffStep::quantity(dec!(500), Some(dec!(1000)), Money::ONE);
        assert!(tariff.validate().is_err());
    }

    #[test]
    fn test_open_ended_middle_step_rejected() {
        let mut tariff = tiered_tariff();
        tariff.steps[1] = TariffStep::quantity(dec!(100), None, Money::ONE);
        assert!(tariff.validate().is_err());
    }

    #[test]
    fn test_first_step_must_start_at_zero() {
        let mut tariff = tiered_tariff();
        tariff.steps[0] = TariffStep::quantity(dec!(10), Some(dec!(100)), Money::ONE);
        assert!(tariff.validate().is_err());
    }

    #[test]
    fn test_fixed_tariff_shape() {
        let tariff = Tariff::fixed(
            "stair cleaning",
            MeterCategory::FixedService,
            CustomerCategory::Household,
            Rate::from_percentage(20),
            Money::from_major(12),
        );
        assert!(tariff.validate().is_ok());

        let mut bad = tariff.clone();
        bad.steps.push(TariffStep::quantity(dec!(0), None, Money::ONE));
        assert!(bad.validate().is_err());
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_construction_date_windows() {
        let tariff = Tariff::new(
            "construction fee",
            MeterCategory::Construction,
            CustomerCategory::Household,
            Rate::from_percentage(20),
            vec![
                TariffStep::dated(date(2024, 1, 1), date(2025, 1, 1), Money::from_major(5)),
                TariffStep::dated(date(2025, 1, 1), date(2026, 1, 1), Money::from_major(7)),
            ],
        );
        assert!(tariff.validate().is_ok());
        assert_eq!(
            tariff.step_for_date(date(2024, 6, 15)).unwrap().unit_price,
            Money::from_major(5)
        );
        // upper bound is exclusive
        assert_eq!(
            tariff.step_for_date(date(2025, 1, 1)).unwrap().unit_price,
            Money::from_major(7)
        );
        assert!(tariff.step_for_date(date(2026, 1, 1)).is_none());
    }

    #[test]
    fn test_overlapping_date_windows_rejected() {
        let tariff = Tariff::new(
            "construction fee",
            MeterCategory::Construction,
            CustomerCategory::Household,
            Rate::from_percentage(20),
            vec![
                TariffStep::dated(date(2024, 1, 1), date(2025, 6, 1), Money::from_major(5)),
                TariffStep::dated(date(2025, 1, 1), date(2026, 1, 1), Money::from_major(7)),
            ],
        );
        assert!(tariff.validate().is_err());
    }
}
