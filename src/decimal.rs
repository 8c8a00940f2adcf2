use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Div, Mul, Sub, SubAssign};
use std::str::FromStr;

/// monetary rounding: half-up to 2 decimal places
const MONEY_DP: u32 = 2;
const MONEY_ROUNDING: RoundingStrategy = RoundingStrategy::MidpointAwayFromZero;

/// Money type with 2 decimal places, rounded half-up on every operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);
    pub const ONE: Money = Money(Decimal::ONE);
    /// one cent, the smallest representable amount and the drift tolerance
    pub const CENT: Money = Money(Decimal::from_parts(1, 0, 0, false, 2));

    /// create from decimal
    pub fn from_decimal(d: Decimal) -> Self {
        Money(d.round_dp_with_strategy(MONEY_DP, MONEY_ROUNDING))
    }

    /// create from string with exact parsing
    pub fn from_str_exact(s: &str) -> Result<Self, rust_decimal::Error> {
        Ok(Self::from_decimal(Decimal::from_str(s)?))
    }

    /// create from whole currency units
    pub fn from_major(amount: i64) -> Self {
        Money(Decimal::from(amount))
    }

    /// create from cents
    pub fn from_minor(amount: i64) -> Self {
        Money(Decimal::new(amount, MONEY_DP))
    }

    /// get underlying decimal
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// check if zero
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// check if strictly positive
    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    /// check if strictly negative
    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// absolute value
    pub fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// minimum of two values
    pub fn min(self, other: Self) -> Self {
        Money(self.0.min(other.0))
    }

    /// maximum of two values
    pub fn max(self, other: Self) -> Self {
        Money(self.0.max(other.0))
    }

    /// vat portion at the given percent rate, rounded half-up
    pub fn vat(&self, rate: Rate) -> Self {
        Self::from_decimal(self.0 * rate.as_percentage() / Decimal::from(100))
    }

    /// difference from another amount stays within the drift tolerance
    pub fn within_tolerance(&self, other: Money, tolerance: Money) -> bool {
        (*self - other).abs() <= tolerance
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl FromStr for Money {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Money::from_str_exact(s)
    }
}

impl From<Decimal> for Money {
    fn from(d: Decimal) -> Self {
        Money::from_decimal(d)
    }
}

impl From<i32> for Money {
    fn from(i: i32) -> Self {
        Money::from_major(i as i64)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, other: Money) -> Money {
        Money::from_decimal(self.0 + other.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, other: Money) {
        *self = *self + other;
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, other: Money) -> Money {
        Money::from_decimal(self.0 - other.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, other: Money) {
        *self = *self - other;
    }
}

impl Mul<Decimal> for Money {
    type Output = Money;

    fn mul(self, other: Decimal) -> Money {
        Money::from_decimal(self.0 * other)
    }
}

impl Div<Decimal> for Money {
    type Output = Money;

    fn div(self, other: Decimal) -> Money {
        Money::from_decimal(self.0 / other)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

/// rate type for vat percentages, stored as a percent in [0, 100]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Rate(Decimal);

impl Rate {
    pub const ZERO: Rate = Rate(Decimal::ZERO);

    /// create from a whole percent value (e.g., 21 for 21%)
    pub fn from_percentage(p: u32) -> Self {
        Rate(Decimal::from(p))
    }

    /// create from a decimal percent value (e.g., 9.5 for 9.5%)
    pub fn from_percent_decimal(d: Decimal) -> Self {
        Rate(d)
    }

    /// get as percent value
    pub fn as_percentage(&self) -> Decimal {
        self.0
    }

    /// get as a fraction (e.g., 0.21 for 21%)
    pub fn as_fraction(&self) -> Decimal {
        self.0 / Decimal::from(100)
    }

    /// valid vat rates lie in [0, 100]
    pub fn is_valid_vat(&self) -> bool {
        self.0 >= Decimal::ZERO && self.0 <= Decimal::from(100)
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_money_rounds_half_up() {
        // banker's rounding would give 0.12, half-up must give 0.13
        let m = Money::from_decimal(dec!(0.125));
        assert_eq!(m.to_string(), "0.13");

        let m = Money::from_str_exact("2.345").unwrap();
        assert_eq!(m.to_string(), "2.35");
    }

    #[test]
    fn test_minor_units() {
        assert_eq!(Money::from_minor(1), Money::CENT);
        assert_eq!(Money::from_minor(12_345), Money::from_str_exact("123.45").unwrap());
    }

    #[test]
    fn test_vat_calculation() {
        let net = Money::from_major(100);
        assert_eq!(net.vat(Rate::from_percentage(21)), Money::from_major(21));

        // 33.33 * 20% = 6.666 -> 6.67 half-up
        let net = Money::from_str_exact("33.33").unwrap();
        assert_eq!(net.vat(Rate::from_percentage(20)), Money::from_str_exact("6.67").unwrap());
    }

    #[test]
    fn test_tolerance() {
        let a = Money::from_str_exact("100.00").unwrap();
        let b = Money::from_str_exact("100.01").unwrap();
        let c = Money::from_str_exact("100.02").unwrap();
        assert!(a.within_tolerance(b, Money::CENT));
        assert!(!a.within_tolerance(c, Money::CENT));
    }

    #[test]
    fn test_sum() {
        let total: Money = [Money::from_major(10), Money::from_minor(50), Money::from_major(2)]
            .into_iter()
            .sum();
        assert_eq!(total, Money::from_str_exact("12.50").unwrap());
    }

    #[test]
    fn test_vat_rate_bounds() {
        assert!(Rate::from_percentage(0).is_valid_vat());
        assert!(Rate::from_percentage(100).is_valid_vat());
        assert!(!Rate::from_percent_decimal(dec!(100.5)).is_valid_vat());
        assert!(!Rate::from_percent_decimal(dec!(-1)).is_valid_vat());
    }
}
