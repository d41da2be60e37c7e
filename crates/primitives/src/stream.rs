//! The canonical stream table.
//!
//! A stream is a named yearly flow or stock tracked per (application,
//! substance). Three of them (`sales`, `recycle`, `induction`) are derived:
//! they are never stored and always summed from their components on read.

use crate::{EngineError, PercentBasis, Units};
use core::fmt;

/// Identifier of a stream in the per-substance store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StreamKind {
    /// Virgin domestic manufacture, kg.
    Domestic,
    /// Virgin imports, kg.
    Import,
    /// Exports, kg. Excluded from `sales` per treaty attribution.
    Export,
    /// Derived: `domestic + import + recycle`, kg.
    Sales,
    /// Recycled material recovered while servicing equipment, kg.
    RecycleRecharge,
    /// Recycled material recovered at end of life, kg.
    RecycleEol,
    /// Derived: `recycleRecharge + recycleEol`, kg.
    Recycle,
    /// Induced demand attributable to recharge-stage recycling, kg.
    InductionRecharge,
    /// Induced demand attributable to EOL-stage recycling, kg.
    InductionEol,
    /// Derived: `inductionRecharge + inductionEol`, kg.
    Induction,
    /// In-service equipment population, units.
    Equipment,
    /// Previous year's in-service population, units.
    PriorEquipment,
    /// Units created this year.
    NewEquipment,
    /// Units retired this year.
    Retired,
    /// Units retired in the previous year.
    PriorRetired,
    /// Annual leak emissions at recharge, tCO2e.
    RechargeEmissions,
    /// Annual leak emissions at end of life, tCO2e.
    EolEmissions,
    /// Recharge mass added on top of a unit-specified sale, kg.
    ImplicitRecharge,
    /// Weighted average age of in-service units, years.
    Age,
    /// `domestic` expressed as tCO2e via the substance GWP.
    DomesticConsumption,
    /// `import` expressed as tCO2e via the substance GWP.
    ImportConsumption,
    /// `export` expressed as tCO2e via the substance GWP.
    ExportConsumption,
    /// `recycle` expressed as tCO2e via the substance GWP.
    RecycleConsumption,
}

impl StreamKind {
    /// Parses a stream name from the canonical table.
    pub fn parse(name: &str) -> Result<Self, EngineError> {
        let kind = match name {
            "domestic" => Self::Domestic,
            "import" => Self::Import,
            "export" => Self::Export,
            "sales" => Self::Sales,
            "recycleRecharge" => Self::RecycleRecharge,
            "recycleEol" => Self::RecycleEol,
            "recycle" => Self::Recycle,
            "inductionRecharge" => Self::InductionRecharge,
            "inductionEol" => Self::InductionEol,
            "induction" => Self::Induction,
            "equipment" => Self::Equipment,
            "priorEquipment" => Self::PriorEquipment,
            "newEquipment" => Self::NewEquipment,
            "retired" => Self::Retired,
            "priorRetired" => Self::PriorRetired,
            "rechargeEmissions" => Self::RechargeEmissions,
            "eolEmissions" => Self::EolEmissions,
            "implicitRecharge" => Self::ImplicitRecharge,
            "age" => Self::Age,
            "domesticConsumption" => Self::DomesticConsumption,
            "importConsumption" => Self::ImportConsumption,
            "exportConsumption" => Self::ExportConsumption,
            "recycleConsumption" => Self::RecycleConsumption,
            _ => {
                return Err(EngineError::UnknownStream {
                    name: name.to_string(),
                })
            }
        };
        Ok(kind)
    }

    /// Canonical name of the stream.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Domestic => "domestic",
            Self::Import => "import",
            Self::Export => "export",
            Self::Sales => "sales",
            Self::RecycleRecharge => "recycleRecharge",
            Self::RecycleEol => "recycleEol",
            Self::Recycle => "recycle",
            Self::InductionRecharge => "inductionRecharge",
            Self::InductionEol => "inductionEol",
            Self::Induction => "induction",
            Self::Equipment => "equipment",
            Self::PriorEquipment => "priorEquipment",
            Self::NewEquipment => "newEquipment",
            Self::Retired => "retired",
            Self::PriorRetired => "priorRetired",
            Self::RechargeEmissions => "rechargeEmissions",
            Self::EolEmissions => "eolEmissions",
            Self::ImplicitRecharge => "implicitRecharge",
            Self::Age => "age",
            Self::DomesticConsumption => "domesticConsumption",
            Self::ImportConsumption => "importConsumption",
            Self::ExportConsumption => "exportConsumption",
            Self::RecycleConsumption => "recycleConsumption",
        }
    }

    /// The units the stream is stored (or summed) in.
    pub const fn canonical_units(&self) -> Units {
        match self {
            Self::Domestic
            | Self::Import
            | Self::Export
            | Self::Sales
            | Self::RecycleRecharge
            | Self::RecycleEol
            | Self::Recycle
            | Self::InductionRecharge
            | Self::InductionEol
            | Self::Induction
            | Self::ImplicitRecharge => Units::Kilograms,
            Self::Equipment
            | Self::PriorEquipment
            | Self::NewEquipment
            | Self::Retired
            | Self::PriorRetired => Units::EquipmentUnits,
            Self::RechargeEmissions
            | Self::EolEmissions
            | Self::DomesticConsumption
            | Self::ImportConsumption
            | Self::ExportConsumption
            | Self::RecycleConsumption => Units::TonsCo2e,
            Self::Age => Units::Years,
        }
    }

    /// True for streams that are summed from components on read and never
    /// stored directly.
    pub const fn is_derived(&self) -> bool {
        matches!(self, Self::Sales | Self::Recycle | Self::Induction)
    }

    /// True for streams that must be `enable`d before a non-zero write.
    pub const fn requires_enable(&self) -> bool {
        matches!(self, Self::Domestic | Self::Import | Self::Export)
    }

    /// True for the virgin sales substreams that a distribution splits
    /// mass across.
    pub const fn is_sales_substream(&self) -> bool {
        matches!(self, Self::Domestic | Self::Import | Self::Export)
    }

    /// True for streams user operations (`set`, `change`, `cap`, `floor`)
    /// may target. The consumption and bookkeeping streams are maintained by
    /// the recalc pipeline only.
    pub const fn is_user_settable(&self) -> bool {
        matches!(
            self,
            Self::Domestic
                | Self::Import
                | Self::Export
                | Self::Sales
                | Self::Equipment
                | Self::PriorEquipment
        )
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default percent basis an operation applies to an unqualified `%` on this
/// stream-touching operation class.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PercentDefault {
    /// `set` / `change`: percent of the current year's value.
    OfCurrent,
    /// `cap` / `floor`: percent of the prior-year captured base.
    OfPrior,
}

impl PercentDefault {
    /// Resolves an unspecified basis to this default.
    pub const fn resolve(&self, basis: PercentBasis) -> PercentBasis {
        match basis {
            PercentBasis::Unspecified => match self {
                Self::OfCurrent => PercentBasis::CurrentYear,
                Self::OfPrior => PercentBasis::PriorYear,
            },
            explicit => explicit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        let all = [
            StreamKind::Domestic,
            StreamKind::Import,
            StreamKind::Export,
            StreamKind::Sales,
            StreamKind::RecycleRecharge,
            StreamKind::RecycleEol,
            StreamKind::Recycle,
            StreamKind::InductionRecharge,
            StreamKind::InductionEol,
            StreamKind::Induction,
            StreamKind::Equipment,
            StreamKind::PriorEquipment,
            StreamKind::NewEquipment,
            StreamKind::Retired,
            StreamKind::PriorRetired,
            StreamKind::RechargeEmissions,
            StreamKind::EolEmissions,
            StreamKind::ImplicitRecharge,
            StreamKind::Age,
            StreamKind::DomesticConsumption,
            StreamKind::ImportConsumption,
            StreamKind::ExportConsumption,
            StreamKind::RecycleConsumption,
        ];
        for kind in all {
            assert_eq!(StreamKind::parse(kind.as_str()).unwrap(), kind);
        }
    }

    #[test]
    fn unknown_name_is_rejected() {
        assert!(matches!(
            StreamKind::parse("bank"),
            Err(EngineError::UnknownStream { .. })
        ));
    }

    #[test]
    fn derived_streams_are_not_enableable() {
        for kind in [StreamKind::Sales, StreamKind::Recycle, StreamKind::Induction] {
            assert!(kind.is_derived());
            assert!(!kind.requires_enable());
        }
    }

    #[test]
    fn percent_defaults_resolve_only_unspecified() {
        assert_eq!(
            PercentDefault::OfPrior.resolve(PercentBasis::Unspecified),
            PercentBasis::PriorYear
        );
        assert_eq!(
            PercentDefault::OfPrior.resolve(PercentBasis::CurrentYear),
            PercentBasis::CurrentYear
        );
    }
}
