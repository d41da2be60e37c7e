//! The recompute strategies.
//!
//! Every function here recomputes its streams absolutely from the
//! parameterization's accumulated rates and captured bases, so running a
//! step twice in a row leaves the state unchanged. Quantities that must not
//! compound across reruns (displaced virgin mass) go through an
//! applied-amount accumulator and only their delta touches the streams.

use primitives::{
    dec_add, dec_div, dec_mul, dec_sub, pct_to_fraction, Decimal, EngineError, StreamKind, Units,
};
use state::{AssumeMode, RecoveryStage, SalesDistribution, SubstanceState};

/// Which direction a sales recompute runs in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SalesDrive {
    /// Refresh only substreams the user specified in equipment units:
    /// stored kg = intent units x charge + the substream's share of recharge
    /// demand. Volume-specified substreams are left untouched.
    UnitIntent,
    /// Derive every enabled substream from the current new-equipment count
    /// plus recharge demand. Used when the user sets the population itself.
    FromPopulation,
}

/// Recharge demand for the year: serviced units and kg, from the
/// accumulated rate against the captured base population.
pub(crate) fn recharge_demand(entry: &mut SubstanceState) -> Result<(Decimal, Decimal), EngineError> {
    let prior = entry.streams.amount(StreamKind::PriorEquipment);
    let base = entry.params.recharge_base_population(prior);
    let rate = pct_to_fraction(entry.params.recharge_rate())?;
    let serviced = dec_mul(base, rate)?.max(Decimal::ZERO);
    entry.params.set_applied_recharge_units(serviced);
    let kg = dec_mul(serviced, entry.params.recharge_intensity().amount())?;
    Ok((serviced, kg))
}

/// Recharge demand without capturing a base, for read-only consumers.
pub(crate) fn recharge_demand_view(entry: &SubstanceState) -> Result<Decimal, EngineError> {
    let prior = entry.streams.amount(StreamKind::PriorEquipment);
    let base = entry.params.recharge_base_population_view(prior);
    let rate = pct_to_fraction(entry.params.recharge_rate())?;
    let serviced = dec_mul(base, rate)?.max(Decimal::ZERO);
    dec_mul(serviced, entry.params.recharge_intensity().amount())
}

/// Retired units from the hazard rate against the captured base.
pub(crate) fn compute_retirement(entry: &mut SubstanceState) -> Result<Decimal, EngineError> {
    let prior = entry.streams.amount(StreamKind::PriorEquipment);
    let base = entry.params.retirement_base_population(prior);
    let rate = pct_to_fraction(entry.params.retirement_rate())?;
    let ceiling = base.max(Decimal::ZERO);
    let retired = dec_mul(base, rate)?.clamp(Decimal::ZERO, ceiling);
    entry.streams.set(StreamKind::Retired, retired)?;
    entry.params.set_applied_retirement_units(retired);
    entry.params.set_retire_calculated_this_step(true);
    Ok(retired)
}

/// Subtracts the stage's displaced virgin mass from `domestic`/`import`
/// pro-rata, applying only the change since the last recompute.
fn apply_displacement(
    entry: &mut SubstanceState,
    stage: RecoveryStage,
    displaced: Decimal,
) -> Result<(), EngineError> {
    let delta = dec_sub(displaced, entry.params.applied_displacement(stage))?;
    entry.params.set_applied_displacement(stage, displaced);
    if delta.is_zero() {
        return Ok(());
    }
    let domestic = entry.streams.amount(StreamKind::Domestic);
    let import = entry.streams.amount(StreamKind::Import);
    let total = dec_add(domestic, import)?;
    if total.is_zero() {
        return Ok(());
    }
    let from_domestic = dec_mul(delta, dec_div(domestic, total)?)?;
    let from_import = dec_sub(delta, from_domestic)?;
    entry.streams.set(
        StreamKind::Domestic,
        dec_sub(domestic, from_domestic)?.max(Decimal::ZERO),
    )?;
    entry.streams.set(
        StreamKind::Import,
        dec_sub(import, from_import)?.max(Decimal::ZERO),
    )?;
    Ok(())
}

/// EOL recycling: capture from retired mass, reuse through yield, induce or
/// displace, and leak the uncaptured remainder.
pub(crate) fn eol_recycling(entry: &mut SubstanceState) -> Result<(), EngineError> {
    let retired = entry.streams.amount(StreamKind::Retired);
    let charge = entry.amortized_charge()?;
    let available = dec_mul(retired, charge)?;
    let recovery = pct_to_fraction(entry.params.recovery_rate(RecoveryStage::Eol))?;
    let captured = dec_mul(available, recovery)?.clamp(Decimal::ZERO, available.max(Decimal::ZERO));
    let reuse = pct_to_fraction(entry.params.yield_rate(RecoveryStage::Eol))?;
    let recycled = dec_mul(captured, reuse)?;
    entry.streams.set(StreamKind::RecycleEol, recycled)?;
    let induction = pct_to_fraction(entry.params.induction_rate(RecoveryStage::Eol))?;
    let induced = dec_mul(recycled, induction)?;
    entry.streams.set(StreamKind::InductionEol, induced)?;
    apply_displacement(entry, RecoveryStage::Eol, dec_sub(recycled, induced)?)?;
    entry.params.set_recycling_calculated_this_step(true);
    eol_emissions(entry)
}

/// Recharge-stage recycling against the year's recharge demand.
pub(crate) fn recharge_recycling(
    entry: &mut SubstanceState,
    recharge_kg: Decimal,
) -> Result<(), EngineError> {
    let recovery = pct_to_fraction(entry.params.recovery_rate(RecoveryStage::Recharge))?;
    let captured =
        dec_mul(recharge_kg, recovery)?.clamp(Decimal::ZERO, recharge_kg.max(Decimal::ZERO));
    let reuse = pct_to_fraction(entry.params.yield_rate(RecoveryStage::Recharge))?;
    let recycled = dec_mul(captured, reuse)?;
    entry.streams.set(StreamKind::RecycleRecharge, recycled)?;
    let induction = pct_to_fraction(entry.params.induction_rate(RecoveryStage::Recharge))?;
    let induced = dec_mul(recycled, induction)?;
    entry.streams.set(StreamKind::InductionRecharge, induced)?;
    apply_displacement(entry, RecoveryStage::Recharge, dec_sub(recycled, induced)?)
}

/// Restores the population identity
/// `equipment = priorEquipment + newEquipment - retired`, with
/// replacement-backed retirement leaving the population intact.
pub(crate) fn equipment_identity(entry: &mut SubstanceState) -> Result<(), EngineError> {
    let prior = entry.streams.amount(StreamKind::PriorEquipment);
    let fresh = entry.streams.amount(StreamKind::NewEquipment);
    let mut equipment = dec_add(prior, fresh)?;
    if !entry.params.has_replacement() {
        equipment = dec_sub(equipment, entry.streams.amount(StreamKind::Retired))?;
    }
    entry
        .streams
        .set(StreamKind::Equipment, equipment.max(Decimal::ZERO))
}

fn recharge_emissions_for(entry: &mut SubstanceState, recharge_kg: Decimal) -> Result<(), EngineError> {
    let ghg = entry.params.ghg_intensity().amount();
    let tons = dec_mul(dec_div(recharge_kg, Decimal::ONE_THOUSAND)?, ghg)?;
    entry.streams.set(StreamKind::RechargeEmissions, tons)
}

/// Population change from supply: new equipment from sales mass net of
/// recharge demand, then the population identity and recharge emissions.
pub(crate) fn population_change(entry: &mut SubstanceState) -> Result<(), EngineError> {
    if !entry.params.retire_calculated_this_step() {
        compute_retirement(entry)?;
        eol_recycling(entry)?;
    }
    let (_, recharge_kg) = recharge_demand(entry)?;
    recharge_recycling(entry, recharge_kg)?;

    let supply = entry.streams.amount(StreamKind::Sales);
    let mut new_mass = dec_sub(supply, recharge_kg)?;
    if new_mass.is_sign_negative() && !new_mass.is_zero() {
        tracing::warn!(
            supply = %supply,
            recharge = %recharge_kg,
            "sales below recharge demand; clamping new-equipment mass to zero"
        );
        new_mass = Decimal::ZERO;
    }
    let charge = entry.amortized_charge()?;
    let new_units = if charge.is_zero() {
        Decimal::ZERO
    } else {
        dec_div(new_mass, charge)?
    };
    entry.streams.set(StreamKind::NewEquipment, new_units)?;
    equipment_identity(entry)?;
    recharge_emissions_for(entry, recharge_kg)
}

/// Sales from the population trajectory, per [`SalesDrive`].
pub(crate) fn sales(entry: &mut SubstanceState, drive: SalesDrive) -> Result<(), EngineError> {
    let (_, recharge_kg) = recharge_demand(entry)?;
    let dist = SalesDistribution::for_substance(&entry.streams, &entry.params, false);
    match drive {
        SalesDrive::UnitIntent => {
            let mut implicit_total = Decimal::ZERO;
            let mut any_intent = false;
            for stream in [StreamKind::Domestic, StreamKind::Import, StreamKind::Export] {
                let Some(intent) = entry.params.last_specified(stream) else {
                    continue;
                };
                if intent.units() != Units::EquipmentUnits {
                    continue;
                }
                any_intent = true;
                let charge = entry.params.initial_charge(stream)?.amount();
                if charge.is_zero() {
                    return Err(EngineError::UnitMismatch {
                        from: Units::EquipmentUnits.as_str().to_string(),
                        to: format!("kg (initial charge of {stream} is zero)"),
                    });
                }
                let implicit = dec_mul(recharge_kg, dist.fraction(stream))?;
                let stored = dec_add(dec_mul(intent.amount(), charge)?, implicit)?;
                entry.streams.set(stream, stored)?;
                implicit_total = dec_add(implicit_total, implicit)?;
            }
            if any_intent {
                entry
                    .streams
                    .set(StreamKind::ImplicitRecharge, implicit_total)?;
            } else if entry.params.assume_mode() == AssumeMode::OnlyRecharge {
                // No baseline carries over in this mode; when the virgin
                // streams cannot cover servicing, recharge demand alone
                // rebuilds them.
                let virgin = dec_add(
                    entry.streams.amount(StreamKind::Domestic),
                    entry.streams.amount(StreamKind::Import),
                )?;
                if virgin < recharge_kg {
                    let mut implicit_total = Decimal::ZERO;
                    for stream in [StreamKind::Domestic, StreamKind::Import] {
                        if !entry.params.is_enabled(stream) {
                            continue;
                        }
                        let implicit = dec_mul(recharge_kg, dist.fraction(stream))?;
                        entry.streams.set(stream, implicit)?;
                        implicit_total = dec_add(implicit_total, implicit)?;
                    }
                    entry
                        .streams
                        .set(StreamKind::ImplicitRecharge, implicit_total)?;
                }
            }
        }
        SalesDrive::FromPopulation => {
            let new_units = entry.streams.amount(StreamKind::NewEquipment);
            let mut implicit_total = Decimal::ZERO;
            for stream in [StreamKind::Domestic, StreamKind::Import] {
                if !entry.params.is_enabled(stream) {
                    continue;
                }
                let share = dist.fraction(stream);
                let charge = entry.params.initial_charge(stream)?.amount();
                let implicit = dec_mul(recharge_kg, share)?;
                let unit_mass = dec_mul(dec_mul(new_units, share)?, charge)?;
                entry.streams.set(stream, dec_add(unit_mass, implicit)?)?;
                implicit_total = dec_add(implicit_total, implicit)?;
            }
            entry
                .streams
                .set(StreamKind::ImplicitRecharge, implicit_total)?;
        }
    }
    recharge_recycling(entry, recharge_kg)
}

/// Consumption streams in tCO2e from the kg streams and the GWP.
pub(crate) fn consumption(entry: &mut SubstanceState) -> Result<(), EngineError> {
    let ghg = entry.params.ghg_intensity().amount();
    let pairs = [
        (StreamKind::Domestic, StreamKind::DomesticConsumption),
        (StreamKind::Import, StreamKind::ImportConsumption),
        (StreamKind::Export, StreamKind::ExportConsumption),
        (StreamKind::Recycle, StreamKind::RecycleConsumption),
    ];
    for (source, target) in pairs {
        let kg = entry.streams.amount(source);
        let tons = dec_mul(dec_div(kg, Decimal::ONE_THOUSAND)?, ghg)?;
        entry.streams.set(target, tons)?;
    }
    Ok(())
}

/// Retirement plus everything downstream of it: EOL recycling, the
/// population identity, and EOL emissions.
pub(crate) fn retire(entry: &mut SubstanceState) -> Result<(), EngineError> {
    compute_retirement(entry)?;
    eol_recycling(entry)?;
    equipment_identity(entry)
}

/// Refreshes recharge emissions after a GWP change.
pub(crate) fn recharge_emissions(entry: &mut SubstanceState) -> Result<(), EngineError> {
    let (_, recharge_kg) = recharge_demand(entry)?;
    recharge_emissions_for(entry, recharge_kg)
}

/// Refreshes EOL emissions: retired mass not captured by recovery leaks.
pub(crate) fn eol_emissions(entry: &mut SubstanceState) -> Result<(), EngineError> {
    let retired = entry.streams.amount(StreamKind::Retired);
    let charge = entry.amortized_charge()?;
    let available = dec_mul(retired, charge)?;
    let recovery = pct_to_fraction(entry.params.recovery_rate(RecoveryStage::Eol))?;
    let captured = dec_mul(available, recovery)?.clamp(Decimal::ZERO, available.max(Decimal::ZERO));
    let leaked = dec_sub(available, captured)?;
    let ghg = entry.params.ghg_intensity().amount();
    let tons = dec_mul(dec_div(leaked, Decimal::ONE_THOUSAND)?, ghg)?;
    entry.streams.set(StreamKind::EolEmissions, tons)
}
