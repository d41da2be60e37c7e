//! Exact-decimal quantities.
//!
//! Every number the engine stores or compares is a [`Quantity`]: a 96-bit
//! fixed-point decimal (28 significant digits) tagged with its units. Binary
//! floating point never appears in decision logic; arithmetic that can leave
//! the decimal's range surfaces as [`EngineError::NumericOverflow`].

use crate::{EngineError, Units};
use core::fmt;
use rust_decimal::{Decimal, RoundingStrategy};

/// Checked decimal multiply.
#[inline]
pub fn dec_mul(a: Decimal, b: Decimal) -> Result<Decimal, EngineError> {
    a.checked_mul(b).ok_or(EngineError::NumericOverflow)
}

/// Checked decimal add.
#[inline]
pub fn dec_add(a: Decimal, b: Decimal) -> Result<Decimal, EngineError> {
    a.checked_add(b).ok_or(EngineError::NumericOverflow)
}

/// Checked decimal subtract.
#[inline]
pub fn dec_sub(a: Decimal, b: Decimal) -> Result<Decimal, EngineError> {
    a.checked_sub(b).ok_or(EngineError::NumericOverflow)
}

/// Checked decimal divide. Callers guard zero denominators; a `None` from
/// the underlying divide is reported as overflow.
#[inline]
pub fn dec_div(a: Decimal, b: Decimal) -> Result<Decimal, EngineError> {
    a.checked_div(b).ok_or(EngineError::NumericOverflow)
}

/// Converts a percentage to its fraction (`5 % -> 0.05`).
#[inline]
pub fn pct_to_fraction(pct: Decimal) -> Result<Decimal, EngineError> {
    dec_div(pct, Decimal::ONE_HUNDRED)
}

/// A decimal amount tagged with its units.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Quantity {
    amount: Decimal,
    units: Units,
}

impl Quantity {
    /// Creates a quantity.
    #[inline]
    pub const fn new(amount: Decimal, units: Units) -> Self {
        Self { amount, units }
    }

    /// Zero in the given units.
    #[inline]
    pub const fn zero(units: Units) -> Self {
        Self {
            amount: Decimal::ZERO,
            units,
        }
    }

    /// The numeric amount.
    #[inline]
    pub const fn amount(&self) -> Decimal {
        self.amount
    }

    /// The units tag.
    #[inline]
    pub const fn units(&self) -> Units {
        self.units
    }

    /// True when the amount is exactly zero.
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    /// True when the amount is below zero.
    #[inline]
    pub fn is_negative(&self) -> bool {
        self.amount.is_sign_negative() && !self.amount.is_zero()
    }

    /// Same units, different amount.
    #[inline]
    pub const fn with_amount(&self, amount: Decimal) -> Self {
        Self {
            amount,
            units: self.units,
        }
    }

    /// Adds another quantity carrying identical units.
    pub fn checked_add(&self, other: &Quantity) -> Result<Quantity, EngineError> {
        self.require_same_units(other)?;
        Ok(self.with_amount(dec_add(self.amount, other.amount)?))
    }

    /// Subtracts another quantity carrying identical units.
    pub fn checked_sub(&self, other: &Quantity) -> Result<Quantity, EngineError> {
        self.require_same_units(other)?;
        Ok(self.with_amount(dec_sub(self.amount, other.amount)?))
    }

    /// Scales the amount by a dimensionless factor.
    pub fn scale(&self, factor: Decimal) -> Result<Quantity, EngineError> {
        Ok(self.with_amount(dec_mul(self.amount, factor)?))
    }

    /// Re-expresses the quantity in another unit of the same family.
    ///
    /// This covers the context-free conversions (kg <-> mt, tCO2e <-> kgCO2e,
    /// kg/unit <-> mt/unit, tCO2e/mt <-> kgCO2e/kg, ...). Cross-family
    /// conversions need engine context and live in the unit converter.
    pub fn rescale(&self, to: Units) -> Result<Quantity, EngineError> {
        if self.units == to {
            return Ok(*self);
        }
        if self.units.family() != to.family() {
            return Err(EngineError::UnitMismatch {
                from: self.units.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }
        let canonical = dec_mul(self.amount, self.units.factor_to_canonical())?;
        let amount = dec_div(canonical, to.factor_to_canonical())?;
        Ok(Quantity::new(amount, to))
    }

    /// Clamps a negative amount to zero. Returns the clamped quantity and
    /// whether clamping occurred.
    pub fn clamp_non_negative(&self) -> (Quantity, bool) {
        if self.is_negative() {
            (self.with_amount(Decimal::ZERO), true)
        } else {
            (*self, false)
        }
    }

    /// Rounds to `dp` decimal places, half away from zero.
    pub fn rounded(&self, dp: u32) -> Quantity {
        self.with_amount(
            self.amount
                .round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero),
        )
    }

    fn require_same_units(&self, other: &Quantity) -> Result<(), EngineError> {
        if self.units == other.units {
            Ok(())
        } else {
            Err(EngineError::UnitMismatch {
                from: other.units.as_str().to_string(),
                to: self.units.as_str().to_string(),
            })
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount.normalize(), self.units)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PercentBasis;
    use rust_decimal_macros::dec;

    #[test]
    fn add_requires_identical_units() {
        let kg = Quantity::new(dec!(5), Units::Kilograms);
        let mt = Quantity::new(dec!(1), Units::MetricTons);
        assert!(kg.checked_add(&mt).is_err());
        assert_eq!(
            kg.checked_add(&kg).unwrap(),
            Quantity::new(dec!(10), Units::Kilograms)
        );
    }

    #[test]
    fn volume_rescale_round_trips_exactly() {
        let kg = Quantity::new(dec!(123.456), Units::Kilograms);
        let mt = kg.rescale(Units::MetricTons).unwrap();
        assert_eq!(mt.amount(), dec!(0.123456));
        assert_eq!(mt.rescale(Units::Kilograms).unwrap(), kg);
    }

    #[test]
    fn intensity_aliases_are_numerically_equal() {
        let per_mt = Quantity::new(dec!(1430), Units::TonsCo2ePerTon);
        let per_kg = per_mt.rescale(Units::KilogramsCo2ePerKilogram).unwrap();
        assert_eq!(per_kg.amount(), dec!(1430));
    }

    #[test]
    fn cross_family_rescale_fails() {
        let kg = Quantity::new(dec!(1), Units::Kilograms);
        assert!(matches!(
            kg.rescale(Units::EquipmentUnits),
            Err(EngineError::UnitMismatch { .. })
        ));
        assert!(kg
            .rescale(Units::Percent(PercentBasis::Unspecified))
            .is_err());
    }

    #[test]
    fn clamp_reports_whether_it_fired() {
        let neg = Quantity::new(dec!(-3), Units::Kilograms);
        let (clamped, fired) = neg.clamp_non_negative();
        assert!(fired);
        assert!(clamped.is_zero());
        let pos = Quantity::new(dec!(3), Units::Kilograms);
        assert_eq!(pos.clamp_non_negative(), (pos, false));
    }

    #[test]
    fn rounding_is_half_away_from_zero() {
        let q = Quantity::new(dec!(2.5), Units::Kilograms);
        assert_eq!(q.rounded(0).amount(), dec!(3));
        let q = Quantity::new(dec!(-2.5), Units::Kilograms);
        assert_eq!(q.rounded(0).amount(), dec!(-3));
    }

    #[test]
    fn display_strips_trailing_zeros() {
        let q = Quantity::new(dec!(25.000), Units::MetricTons);
        assert_eq!(q.to_string(), "25 mt");
    }
}
