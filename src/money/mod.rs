//! Fixed-point money.
//!
//! Order settlement math runs on integer paise so that repeated
//! splitting and recombination cannot drift. `Decimal` appears only at
//! the entity and API boundary; conversions round half-up at two
//! decimal places. Rounding inside a split is centralized in
//! [`proration`].

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

pub mod proration;

/// A non-negative-by-convention amount of money in paise.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_minor(paise: i64) -> Self {
        Money(paise)
    }

    pub const fn minor(self) -> i64 {
        self.0
    }

    /// Converts a decimal rupee amount, rounding half-up to the paisa.
    pub fn from_decimal(amount: Decimal) -> Self {
        let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        Money(
            (rounded * Decimal::ONE_HUNDRED)
                .to_i64()
                .expect("money amount out of i64 paise range"),
        )
    }

    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, 2)
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// `self / denominator` as a split ratio. Callers pass the result to
    /// [`proration::allocate`]; a zero denominator yields 0.0.
    pub fn ratio_of(self, denominator: Money) -> f64 {
        if denominator.0 == 0 {
            0.0
        } else {
            self.0 as f64 / denominator.0 as f64
        }
    }

    /// GST due on this amount at an integer percent rate, rounded
    /// half-up to the paisa.
    pub fn gst(self, rate_percent: i32) -> Money {
        let raw = self.0 as i128 * rate_percent as i128;
        Money(((raw + 50) / 100) as i64)
    }

    /// Splits a GST amount into (CGST, SGST) halves. CGST takes the odd
    /// paisa so the halves always recombine exactly.
    pub fn half_split(self) -> (Money, Money) {
        let sgst = Money(self.0 / 2);
        (self - sgst, sgst)
    }

    pub fn min(self, other: Money) -> Money {
        Money(self.0.min(other.0))
    }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Money) {
        self.0 -= rhs.0;
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        Money(iter.map(|m| m.0).sum())
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn decimal_round_trip() {
        assert_eq!(Money::from_decimal(dec!(100.01)).minor(), 10001);
        assert_eq!(Money::from_minor(10001).to_decimal(), dec!(100.01));
        assert_eq!(Money::from_decimal(dec!(0)).minor(), 0);
    }

    #[test]
    fn from_decimal_rounds_half_up() {
        assert_eq!(Money::from_decimal(dec!(1.005)).minor(), 101);
        assert_eq!(Money::from_decimal(dec!(1.004)).minor(), 100);
        assert_eq!(Money::from_decimal(dec!(1.0049)).minor(), 100);
    }

    #[test]
    fn gst_rounds_half_up() {
        // 12% of ₹10,000 = ₹1,200
        assert_eq!(Money::from_minor(1_000_000).gst(12), Money::from_minor(120_000));
        // 12% of ₹0.04 = ₹0.0048 -> 0 paise; 12% of ₹0.05 = 0.6 paise -> 1
        assert_eq!(Money::from_minor(4).gst(12), Money::ZERO);
        assert_eq!(Money::from_minor(5).gst(12), Money::from_minor(1));
    }

    #[test]
    fn half_split_recombines() {
        let gst = Money::from_minor(1201);
        let (cgst, sgst) = gst.half_split();
        assert_eq!(cgst, Money::from_minor(601));
        assert_eq!(sgst, Money::from_minor(600));
        assert_eq!(cgst + sgst, gst);
    }

    #[test]
    fn ratio_of_zero_denominator() {
        assert_eq!(Money::from_minor(500).ratio_of(Money::ZERO), 0.0);
        assert_eq!(Money::from_minor(400).ratio_of(Money::from_minor(1000)), 0.4);
    }
}
