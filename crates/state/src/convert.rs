//! Context-dependent unit conversion.
//!
//! Conversions inside one dimensional family are fixed rescales; crossing
//! families (mass to equipment units, mass to tCO2e, units to kwh) needs
//! substance context. That context comes through [`ConverterStateGetter`],
//! resolved against the current scope, unless an [`OverridingStateGetter`]
//! pins an explicit amortized unit volume (used when a sales stream's own
//! initial charge must drive the conversion).

use primitives::{
    dec_div, dec_mul, Decimal, EngineError, Quantity, UnitFamily, Units,
};

/// Substance context a conversion may need.
pub trait ConverterStateGetter {
    /// GHG intensity, tCO2e/mt. Zero when unspecified.
    fn ghg_intensity(&self) -> Quantity;
    /// Energy intensity, kwh/unit, if specified.
    fn energy_intensity(&self) -> Option<Quantity>;
    /// Mass placed per equipment unit, kg/unit, amortized across the
    /// substance's sales substreams.
    fn amortized_unit_volume(&self) -> Quantity;
    /// Current in-service population, units.
    fn population(&self) -> Quantity;
}

/// Wraps a getter, overriding the amortized unit volume.
#[derive(Debug)]
pub struct OverridingStateGetter<'a, G: ?Sized> {
    inner: &'a G,
    amortized_unit_volume: Option<Quantity>,
}

impl<'a, G: ConverterStateGetter + ?Sized> OverridingStateGetter<'a, G> {
    /// Overrides the amortized unit volume with an explicit charge.
    pub fn with_unit_volume(inner: &'a G, charge: Quantity) -> Self {
        Self {
            inner,
            amortized_unit_volume: Some(charge),
        }
    }
}

impl<G: ConverterStateGetter + ?Sized> ConverterStateGetter for OverridingStateGetter<'_, G> {
    fn ghg_intensity(&self) -> Quantity {
        self.inner.ghg_intensity()
    }

    fn energy_intensity(&self) -> Option<Quantity> {
        self.inner.energy_intensity()
    }

    fn amortized_unit_volume(&self) -> Quantity {
        self.amortized_unit_volume
            .unwrap_or_else(|| self.inner.amortized_unit_volume())
    }

    fn population(&self) -> Quantity {
        self.inner.population()
    }
}

fn mismatch(value: &Quantity, to: Units) -> EngineError {
    EngineError::UnitMismatch {
        from: value.units().as_str().to_string(),
        to: to.as_str().to_string(),
    }
}

/// Converts a quantity to the requested units, pulling context from the
/// getter where the dimensional families differ.
pub fn convert<G: ConverterStateGetter + ?Sized>(
    value: &Quantity,
    to: Units,
    getter: &G,
) -> Result<Quantity, EngineError> {
    use UnitFamily::*;

    if value.units() == to {
        return Ok(*value);
    }
    let from_family = value.units().family();
    let to_family = to.family();
    if from_family == to_family {
        // Percent bases rescale 1:1; everything else by fixed factor.
        return value.rescale(to);
    }

    match (from_family, to_family) {
        (Volume, Emissions) => {
            let mt = value.rescale(Units::MetricTons)?;
            let tons = dec_mul(mt.amount(), getter.ghg_intensity().amount())?;
            Quantity::new(tons, Units::TonsCo2e).rescale(to)
        }
        (Emissions, Volume) => {
            let ghg = getter.ghg_intensity().amount();
            if ghg.is_zero() {
                return Err(mismatch(value, to));
            }
            let tons = value.rescale(Units::TonsCo2e)?;
            let mt = dec_div(tons.amount(), ghg)?;
            Quantity::new(mt, Units::MetricTons).rescale(to)
        }
        (Volume, Population) => {
            let charge = getter.amortized_unit_volume().amount();
            if charge.is_zero() {
                return Err(mismatch(value, to));
            }
            let kg = value.rescale(Units::Kilograms)?;
            Ok(Quantity::new(
                dec_div(kg.amount(), charge)?,
                Units::EquipmentUnits,
            ))
        }
        (Population, Volume) => {
            let charge = getter.amortized_unit_volume().amount();
            if charge.is_zero() {
                return Err(mismatch(value, to));
            }
            let kg = dec_mul(value.amount(), charge)?;
            Quantity::new(kg, Units::Kilograms).rescale(to)
        }
        (Population, Energy) => {
            let intensity = getter
                .energy_intensity()
                .map(|q| q.amount())
                .unwrap_or(Decimal::ZERO);
            Ok(Quantity::new(
                dec_mul(value.amount(), intensity)?,
                Units::KilowattHours,
            ))
        }
        (Volume, Energy) => {
            let units = convert(value, Units::EquipmentUnits, getter)?;
            convert(&units, to, getter)
        }
        (Emissions, Population) | (Population, Emissions) => {
            let kg = convert(value, Units::Kilograms, getter)?;
            convert(&kg, to, getter)
        }
        (Hazard, Ratio) => Ok(Quantity::new(
            dec_mul(value.amount(), Decimal::ONE_HUNDRED)?,
            to,
        )),
        (Ratio, Hazard) => Ok(Quantity::new(
            dec_div(value.amount(), Decimal::ONE_HUNDRED)?,
            to,
        )),
        _ => Err(mismatch(value, to)),
    }
}

/// Normalizes a GHG intensity specification to tCO2e/mt.
///
/// Per-mass intensities rescale directly; per-unit intensities divide by the
/// amortized charge (kg/unit), which must be non-zero.
pub fn normalize_ghg_intensity<G: ConverterStateGetter + ?Sized>(
    value: &Quantity,
    getter: &G,
) -> Result<Quantity, EngineError> {
    match value.units().family() {
        UnitFamily::EmissionsIntensity => value.rescale(Units::TonsCo2ePerTon),
        UnitFamily::EmissionsPerUnit => {
            let charge = getter.amortized_unit_volume().amount();
            if charge.is_zero() {
                return Err(mismatch(value, Units::TonsCo2ePerTon));
            }
            let per_unit = value.rescale(Units::TonsCo2ePerUnit)?;
            // tCO2e/unit over kg/unit gives tCO2e/kg; scale to per-mt.
            let per_kg = dec_div(per_unit.amount(), charge)?;
            Ok(Quantity::new(
                dec_mul(per_kg, Decimal::ONE_THOUSAND)?,
                Units::TonsCo2ePerTon,
            ))
        }
        _ => Err(mismatch(value, Units::TonsCo2ePerTon)),
    }
}
