//! Unit vocabulary for engine quantities.
//!
//! The engine works with a closed set of unit tokens (`kg`, `mt`, `units`,
//! `tCO2e`, `kwh`, `%`, `years`, and the `/`-composed intensities such as
//! `kg/unit` or `tCO2e/mt`). Every token maps to one [`Units`] variant;
//! unknown tokens are rejected at the boundary rather than carried around as
//! strings.

use crate::EngineError;
use core::fmt;
use rust_decimal::Decimal;

/// What a bare `%` is measured against.
///
/// The basis is supplied by the operation when the script leaves it implicit:
/// `set`/`change` resolve an unspecified percent against the current year,
/// `cap`/`floor` against the prior-year captured base.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PercentBasis {
    /// No explicit basis; the consuming operation picks its default.
    #[default]
    Unspecified,
    /// Percent of the current year's value (`% current`).
    CurrentYear,
    /// Percent of the value captured at the start of the year (`% prior year`).
    PriorYear,
}

/// Dimensional family of a unit, used to pick conversion paths.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum UnitFamily {
    /// Substance mass (`kg`, `mt`).
    Volume,
    /// Equipment counts (`units`).
    Population,
    /// CO2-equivalent mass (`tCO2e`, `kgCO2e`).
    Emissions,
    /// Electrical energy (`kwh`).
    Energy,
    /// Dimensionless percentage (`%`).
    Ratio,
    /// Calendar time (`years`).
    Time,
    /// Annual hazard rate (`years^-1`).
    Hazard,
    /// Mass per equipment unit (`kg/unit`, `mt/unit`).
    Charge,
    /// CO2-equivalent per substance mass (`tCO2e/mt`, `kgCO2e/kg`, `tCO2e/kg`).
    EmissionsIntensity,
    /// CO2-equivalent per equipment unit (`tCO2e/unit`, `kgCO2e/unit`).
    EmissionsPerUnit,
    /// Energy per equipment unit (`kwh/unit`).
    EnergyIntensity,
}

/// A unit token from the engine's closed vocabulary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Units {
    /// `kg`
    Kilograms,
    /// `mt` (metric tons)
    MetricTons,
    /// `units` (equipment count)
    EquipmentUnits,
    /// `tCO2e`
    TonsCo2e,
    /// `kgCO2e`
    KilogramsCo2e,
    /// `kwh`
    KilowattHours,
    /// `%`, optionally qualified with a basis
    Percent(PercentBasis),
    /// `years`
    Years,
    /// `years^-1`
    PerYear,
    /// `kg/unit`
    KilogramsPerUnit,
    /// `mt/unit`
    MetricTonsPerUnit,
    /// `tCO2e/mt`
    TonsCo2ePerTon,
    /// `kgCO2e/kg` (numerically identical to `tCO2e/mt`)
    KilogramsCo2ePerKilogram,
    /// `tCO2e/kg`
    TonsCo2ePerKilogram,
    /// `tCO2e/unit`
    TonsCo2ePerUnit,
    /// `kgCO2e/unit`
    KilogramsCo2ePerUnit,
    /// `kwh/unit`
    KilowattHoursPerUnit,
}

impl Units {
    /// Parses a unit token.
    ///
    /// Matching is case-insensitive and ignores interior whitespace, so
    /// `"% prior year"`, `"%prioryear"`, and `"% Prior Year"` are the same
    /// token.
    pub fn parse(token: &str) -> Result<Self, EngineError> {
        let mut normalized = String::with_capacity(token.len());
        for ch in token.chars() {
            if !ch.is_whitespace() {
                normalized.extend(ch.to_lowercase());
            }
        }
        let unit = match normalized.as_str() {
            "kg" => Self::Kilograms,
            "mt" => Self::MetricTons,
            "unit" | "units" => Self::EquipmentUnits,
            "tco2e" => Self::TonsCo2e,
            "kgco2e" => Self::KilogramsCo2e,
            "kwh" => Self::KilowattHours,
            "%" => Self::Percent(PercentBasis::Unspecified),
            "%current" | "%currentyear" => Self::Percent(PercentBasis::CurrentYear),
            "%prior" | "%prioryear" => Self::Percent(PercentBasis::PriorYear),
            "year" | "years" => Self::Years,
            "years^-1" | "year^-1" | "1/years" | "1/year" => Self::PerYear,
            "kg/unit" => Self::KilogramsPerUnit,
            "mt/unit" => Self::MetricTonsPerUnit,
            "tco2e/mt" => Self::TonsCo2ePerTon,
            "kgco2e/kg" => Self::KilogramsCo2ePerKilogram,
            "tco2e/kg" => Self::TonsCo2ePerKilogram,
            "tco2e/unit" => Self::TonsCo2ePerUnit,
            "kgco2e/unit" => Self::KilogramsCo2ePerUnit,
            "kwh/unit" => Self::KilowattHoursPerUnit,
            _ => {
                return Err(EngineError::UnitMismatch {
                    from: token.to_string(),
                    to: "a known unit token".to_string(),
                })
            }
        };
        Ok(unit)
    }

    /// Canonical rendering of the token.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Kilograms => "kg",
            Self::MetricTons => "mt",
            Self::EquipmentUnits => "units",
            Self::TonsCo2e => "tCO2e",
            Self::KilogramsCo2e => "kgCO2e",
            Self::KilowattHours => "kwh",
            Self::Percent(PercentBasis::Unspecified) => "%",
            Self::Percent(PercentBasis::CurrentYear) => "% current",
            Self::Percent(PercentBasis::PriorYear) => "% prior year",
            Self::Years => "years",
            Self::PerYear => "years^-1",
            Self::KilogramsPerUnit => "kg/unit",
            Self::MetricTonsPerUnit => "mt/unit",
            Self::TonsCo2ePerTon => "tCO2e/mt",
            Self::KilogramsCo2ePerKilogram => "kgCO2e/kg",
            Self::TonsCo2ePerKilogram => "tCO2e/kg",
            Self::TonsCo2ePerUnit => "tCO2e/unit",
            Self::KilogramsCo2ePerUnit => "kgCO2e/unit",
            Self::KilowattHoursPerUnit => "kwh/unit",
        }
    }

    /// Dimensional family the unit belongs to.
    pub const fn family(&self) -> UnitFamily {
        match self {
            Self::Kilograms | Self::MetricTons => UnitFamily::Volume,
            Self::EquipmentUnits => UnitFamily::Population,
            Self::TonsCo2e | Self::KilogramsCo2e => UnitFamily::Emissions,
            Self::KilowattHours => UnitFamily::Energy,
            Self::Percent(_) => UnitFamily::Ratio,
            Self::Years => UnitFamily::Time,
            Self::PerYear => UnitFamily::Hazard,
            Self::KilogramsPerUnit | Self::MetricTonsPerUnit => UnitFamily::Charge,
            Self::TonsCo2ePerTon | Self::KilogramsCo2ePerKilogram | Self::TonsCo2ePerKilogram => {
                UnitFamily::EmissionsIntensity
            }
            Self::TonsCo2ePerUnit | Self::KilogramsCo2ePerUnit => UnitFamily::EmissionsPerUnit,
            Self::KilowattHoursPerUnit => UnitFamily::EnergyIntensity,
        }
    }

    /// True for `%` with any basis.
    pub const fn is_percent(&self) -> bool {
        matches!(self, Self::Percent(_))
    }

    /// Basis qualifier of a percent token, if this is one.
    pub const fn percent_basis(&self) -> Option<PercentBasis> {
        match self {
            Self::Percent(basis) => Some(*basis),
            _ => None,
        }
    }

    /// The canonical unit of this unit's family, against which
    /// [`Units::factor_to_canonical`] is expressed.
    pub const fn family_canonical(&self) -> Units {
        match self.family() {
            UnitFamily::Volume => Self::Kilograms,
            UnitFamily::Population => Self::EquipmentUnits,
            UnitFamily::Emissions => Self::TonsCo2e,
            UnitFamily::Energy => Self::KilowattHours,
            UnitFamily::Ratio => Self::Percent(PercentBasis::Unspecified),
            UnitFamily::Time => Self::Years,
            UnitFamily::Hazard => Self::PerYear,
            UnitFamily::Charge => Self::KilogramsPerUnit,
            UnitFamily::EmissionsIntensity => Self::TonsCo2ePerTon,
            UnitFamily::EmissionsPerUnit => Self::TonsCo2ePerUnit,
            UnitFamily::EnergyIntensity => Self::KilowattHoursPerUnit,
        }
    }

    /// Multiplier taking an amount in this unit to the family canonical unit.
    ///
    /// Percent bases all scale 1:1; the basis is a semantic qualifier, not a
    /// magnitude.
    pub fn factor_to_canonical(&self) -> Decimal {
        match self {
            Self::MetricTons | Self::MetricTonsPerUnit | Self::TonsCo2ePerKilogram => {
                Decimal::ONE_THOUSAND
            }
            Self::KilogramsCo2e | Self::KilogramsCo2ePerUnit => {
                Decimal::new(1, 3) // 0.001
            }
            _ => Decimal::ONE,
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("kg", Units::Kilograms)]
    #[case("MT", Units::MetricTons)]
    #[case("units", Units::EquipmentUnits)]
    #[case("unit", Units::EquipmentUnits)]
    #[case("tCO2e", Units::TonsCo2e)]
    #[case("kgCO2e", Units::KilogramsCo2e)]
    #[case("%", Units::Percent(PercentBasis::Unspecified))]
    #[case("% current", Units::Percent(PercentBasis::CurrentYear))]
    #[case("% prior year", Units::Percent(PercentBasis::PriorYear))]
    #[case("years^-1", Units::PerYear)]
    #[case("kg / unit", Units::KilogramsPerUnit)]
    #[case("tCO2e/mt", Units::TonsCo2ePerTon)]
    #[case("kwh/unit", Units::KilowattHoursPerUnit)]
    fn parses_known_tokens(#[case] token: &str, #[case] expected: Units) {
        assert_eq!(Units::parse(token).unwrap(), expected);
    }

    #[test]
    fn rejects_unknown_token() {
        assert!(matches!(
            Units::parse("furlongs"),
            Err(EngineError::UnitMismatch { .. })
        ));
    }

    #[test]
    fn display_round_trips() {
        for units in [
            Units::Kilograms,
            Units::MetricTons,
            Units::EquipmentUnits,
            Units::TonsCo2e,
            Units::Percent(PercentBasis::PriorYear),
            Units::KilogramsPerUnit,
            Units::TonsCo2ePerTon,
            Units::KilowattHoursPerUnit,
        ] {
            assert_eq!(Units::parse(units.as_str()).unwrap(), units);
        }
    }

    #[test]
    fn families_are_consistent_with_canonicals() {
        for units in [
            Units::MetricTons,
            Units::KilogramsCo2e,
            Units::MetricTonsPerUnit,
            Units::KilogramsCo2ePerKilogram,
        ] {
            assert_eq!(units.family(), units.family_canonical().family());
        }
    }
}
