//! Per-year result extraction.

use crate::recalc::recharge_demand_view;
use primitives::{
    dec_div, dec_mul, dec_sub, Decimal, EngineError, Quantity, StreamKind, SubstanceId, Units,
};
use state::{SimulationState, SubstanceState};

/// The per-(application, substance, year) record the engine emits.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EngineResult {
    /// Application (sector) name.
    pub application: String,
    /// Substance name.
    pub substance: String,
    /// Simulated year.
    pub year: i32,
    /// Scenario the engine instance is running.
    pub scenario: String,
    /// Monte-Carlo trial number.
    pub trial: u64,
    /// Virgin domestic manufacture, kg.
    pub domestic: Quantity,
    /// Virgin imports, kg.
    pub import: Quantity,
    /// Exports, kg.
    pub export: Quantity,
    /// Recycled secondary supply, kg.
    pub recycle: Quantity,
    /// `domestic` in tCO2e.
    pub domestic_consumption: Quantity,
    /// `import` in tCO2e.
    pub import_consumption: Quantity,
    /// `export` in tCO2e.
    pub export_consumption: Quantity,
    /// `recycle` in tCO2e.
    pub recycle_consumption: Quantity,
    /// In-service equipment, units.
    pub population: Quantity,
    /// Units created this year.
    pub population_new: Quantity,
    /// Leak emissions at recharge, tCO2e.
    pub recharge_emissions: Quantity,
    /// Leak emissions at end of life, tCO2e.
    pub eol_emissions: Quantity,
    /// Energy used by the in-service population, kwh.
    pub energy_consumption: Quantity,
    /// Substance held in in-service equipment, kg.
    pub bank_kg: Quantity,
    /// The bank in tCO2e.
    pub bank_tco2e: Quantity,
    /// Bank change versus the previous year, kg.
    pub bank_change_kg: Quantity,
    /// Bank change versus the previous year, tCO2e.
    pub bank_change_tco2e: Quantity,
    /// Import attribution split between new-equipment charge and servicing.
    pub trade: TradeSupplement,
}

/// How much of this year's imports correspond to the initial charge of
/// imported equipment rather than servicing of in-country equipment.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TradeSupplement {
    /// Import mass attributable to initial charge, kg.
    pub value: Quantity,
    /// The same in tCO2e via the substance GWP.
    pub consumption: Quantity,
    /// The same in units via the import initial charge.
    pub new_population: Quantity,
}

fn kg_to_tons(kg: Decimal, ghg: Decimal) -> Result<Decimal, EngineError> {
    dec_mul(dec_div(kg, Decimal::ONE_THOUSAND)?, ghg)
}

/// Extracts the current year's record for one substance.
pub fn extract(
    state: &SimulationState,
    key: &SubstanceId,
    scenario: &str,
    trial: u64,
) -> Result<EngineResult, EngineError> {
    let entry = state.substance(key)?;
    let ghg = entry.params.ghg_intensity().amount();

    let stream = |kind: StreamKind| entry.streams.get(kind);

    let equipment = entry.streams.amount(StreamKind::Equipment);
    let prior_equipment = entry.streams.amount(StreamKind::PriorEquipment);
    let energy = match entry.params.energy_intensity() {
        Some(intensity) => dec_mul(equipment, intensity.amount())?,
        None => Decimal::ZERO,
    };

    let charge = entry.amortized_charge()?;
    let bank_kg = dec_mul(equipment, charge)?;
    let bank_tons = kg_to_tons(bank_kg, ghg)?;
    let prior_bank_kg = dec_mul(prior_equipment, charge)?;
    let prior_bank_tons = kg_to_tons(prior_bank_kg, ghg)?;

    Ok(EngineResult {
        application: key.application().to_string(),
        substance: key.substance().to_string(),
        year: state.current_year(),
        scenario: scenario.to_string(),
        trial,
        domestic: stream(StreamKind::Domestic),
        import: stream(StreamKind::Import),
        export: stream(StreamKind::Export),
        recycle: stream(StreamKind::Recycle),
        domestic_consumption: stream(StreamKind::DomesticConsumption),
        import_consumption: stream(StreamKind::ImportConsumption),
        export_consumption: stream(StreamKind::ExportConsumption),
        recycle_consumption: stream(StreamKind::RecycleConsumption),
        population: stream(StreamKind::Equipment),
        population_new: stream(StreamKind::NewEquipment),
        recharge_emissions: stream(StreamKind::RechargeEmissions),
        eol_emissions: stream(StreamKind::EolEmissions),
        energy_consumption: Quantity::new(energy, Units::KilowattHours),
        bank_kg: Quantity::new(bank_kg, Units::Kilograms),
        bank_tco2e: Quantity::new(bank_tons, Units::TonsCo2e),
        bank_change_kg: Quantity::new(dec_sub(bank_kg, prior_bank_kg)?, Units::Kilograms),
        bank_change_tco2e: Quantity::new(dec_sub(bank_tons, prior_bank_tons)?, Units::TonsCo2e),
        trade: trade_supplement(entry, ghg)?,
    })
}

/// Splits this year's imports between initial charge of imported equipment
/// and servicing of the in-country bank.
///
/// Virgin recharge demand is total recharge net of recharge-stage recycling;
/// imports cover their sales share of it, and the remainder of the import
/// mass is attributed to initial charge.
fn trade_supplement(entry: &SubstanceState, ghg: Decimal) -> Result<TradeSupplement, EngineError> {
    let domestic = entry.streams.amount(StreamKind::Domestic);
    let import = entry.streams.amount(StreamKind::Import);
    let recharge_total = recharge_demand_view(entry)?;
    let recycled_recharge = entry.streams.amount(StreamKind::RecycleRecharge);
    let virgin_recharge = dec_sub(recharge_total, recycled_recharge)?.max(Decimal::ZERO);

    let supply = domestic + import;
    let import_share = if supply.is_zero() {
        Decimal::ZERO
    } else {
        dec_div(import, supply)?
    };
    let servicing = dec_mul(import_share, virgin_recharge)?;
    let for_charge = dec_sub(import, servicing)?.max(Decimal::ZERO);

    let import_charge = entry
        .params
        .initial_charge(StreamKind::Import)?
        .amount();
    let units = if import_charge.is_zero() {
        Decimal::ZERO
    } else {
        dec_div(for_charge, import_charge)?
    };

    Ok(TradeSupplement {
        value: Quantity::new(for_charge, Units::Kilograms),
        consumption: Quantity::new(kg_to_tons(for_charge, ghg)?, Units::TonsCo2e),
        new_population: Quantity::new(units, Units::EquipmentUnits),
    })
}
