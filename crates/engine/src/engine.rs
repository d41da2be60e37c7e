//! The single-threaded engine facade.
//!
//! One [`Engine`] owns one simulation's state and executes the parser's
//! operations in order. Each operation validates, writes, and then runs the
//! recalc chain for the stream class it touched, so the state is mutually
//! consistent before the next operation begins. Cross-substance operations
//! temporarily swap the current scope to the destination so its GWP and
//! initial charges drive the displaced write; the swap restores on every
//! exit path.

use crate::{
    recalc::{RecalcKit, RecalcPlan, RecalcStep, SalesDrive},
    results::{self, EngineResult},
    scope::Scope,
    YearMatcher,
};
use primitives::{
    dec_add, dec_div, dec_mul, dec_sub, pct_to_fraction, Decimal, EngineError, PercentBasis,
    PercentDefault, Quantity, StreamKind, SubstanceId, UnitFamily, Units,
};
use state::{
    convert, AssumeMode, RecoveryStage, SalesDistribution, SimulationState, StateUpdate,
};

/// Where a cap/floor displaces the mass it removes or demands.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DisplaceTarget {
    /// Another stream of the same substance.
    Stream(StreamKind),
    /// The same stream of another substance in the same application.
    Substance(String),
}

/// How displaced mass translates onto the target.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DisplacementKind {
    /// Infer from the limit's units: equipment units displace by units,
    /// anything else by volume.
    #[default]
    Equivalent,
    /// The same kg amount moves to the target.
    ByVolume,
    /// The displaced units convert through the source's initial charge to
    /// units, then through the destination's initial charge back to kg.
    ByUnits,
}

const SET_VOLUME: &[RecalcStep] = &[RecalcStep::PopulationChange, RecalcStep::Consumption];
const SET_UNITS: &[RecalcStep] = &[
    RecalcStep::Sales(SalesDrive::UnitIntent),
    RecalcStep::PopulationChange,
    RecalcStep::Consumption,
];
const SET_POPULATION: &[RecalcStep] = &[
    RecalcStep::Sales(SalesDrive::FromPopulation),
    RecalcStep::Consumption,
];
const RECYCLE_CHAIN: &[RecalcStep] = &[
    RecalcStep::Retire,
    RecalcStep::Sales(SalesDrive::UnitIntent),
    RecalcStep::PopulationChange,
    RecalcStep::Consumption,
];
const GHG_CHAIN: &[RecalcStep] = &[
    RecalcStep::Consumption,
    RecalcStep::RechargeEmissions,
    RecalcStep::EolEmissions,
];

/// The simulation engine: a single-threaded, non-reentrant orchestrator of
/// one scenario trial.
#[derive(Clone, Debug)]
pub struct Engine {
    state: SimulationState,
    scope: Scope,
    scenario: String,
    trial: u64,
}

impl Engine {
    /// An engine spanning an inclusive year range.
    pub fn new(start_year: i32, end_year: i32) -> Self {
        Self {
            state: SimulationState::new(start_year, end_year),
            scope: Scope::new(),
            scenario: String::from("default"),
            trial: 0,
        }
    }

    /// Names the scenario and trial this instance is running.
    pub fn set_scenario(&mut self, name: impl Into<String>, trial: u64) {
        self.scenario = name.into();
        self.trial = trial;
    }

    /// The underlying state, for read-only inspection.
    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    /// The year currently being simulated.
    pub fn current_year(&self) -> i32 {
        self.state.current_year()
    }

    /// The current scope.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    // --- scope navigation -------------------------------------------------

    /// Enters a stanza.
    pub fn set_stanza(&mut self, name: &str) {
        self.scope.enter_stanza(name);
    }

    /// Enters an application.
    pub fn set_application(&mut self, name: &str) {
        self.scope.enter_application(name);
    }

    /// Enters a substance. With `check_valid` the pair must already be
    /// registered; otherwise it is created with zeroed streams.
    pub fn set_substance(&mut self, name: &str, check_valid: bool) -> Result<(), EngineError> {
        let application = self
            .scope
            .application()
            .ok_or_else(|| EngineError::MissingScope {
                operation: "substance".to_string(),
            })?
            .to_string();
        let key = SubstanceId::new(application, name);
        if check_valid {
            if !self.state.contains(&key) {
                return Err(EngineError::UnknownSubstance {
                    application: key.application().to_string(),
                    substance: key.substance().to_string(),
                });
            }
        } else {
            self.state.ensure_substance(&key);
        }
        self.scope.enter_substance(name);
        Ok(())
    }

    // --- variables --------------------------------------------------------

    /// Defines or assigns a scope variable.
    pub fn set_variable(&mut self, name: &str, value: Quantity) -> Result<(), EngineError> {
        self.scope.set_variable(name, value)
    }

    /// Reads a scope variable, including the reserved year counters.
    pub fn variable(&self, name: &str) -> Result<Quantity, EngineError> {
        self.scope
            .variable(name, self.state.years_elapsed(), self.state.current_year())
    }

    // --- parameter operations ---------------------------------------------

    /// Marks a sales stream writable from this year on.
    pub fn enable(&mut self, stream: StreamKind, years: YearMatcher) -> Result<(), EngineError> {
        if !self.applies(&years) {
            return Ok(());
        }
        let key = self.current_key("enable")?;
        self.state
            .substance_mut(&key)?
            .params
            .mark_stream_enabled(stream)
    }

    /// Sets the GHG intensity (tCO2e/mt, kgCO2e/kg, or per-unit variants) or
    /// the energy intensity (kwh/unit), depending on the value's units.
    pub fn equals(&mut self, value: Quantity, years: YearMatcher) -> Result<(), EngineError> {
        if !self.applies(&years) {
            return Ok(());
        }
        let key = self.current_key("equals")?;
        match value.units().family() {
            UnitFamily::EmissionsIntensity | UnitFamily::EmissionsPerUnit => {
                let entry = self.state.substance(&key)?;
                let normalized = convert::normalize_ghg_intensity(&value, &entry.view())?;
                self.state
                    .substance_mut(&key)?
                    .params
                    .set_ghg_intensity(normalized)?;
                self.run_plan(&key, GHG_CHAIN)
            }
            UnitFamily::EnergyIntensity => self
                .state
                .substance_mut(&key)?
                .params
                .set_energy_intensity(value),
            _ => Err(EngineError::UnitMismatch {
                from: value.units().as_str().to_string(),
                to: "a GHG or energy intensity".to_string(),
            }),
        }
    }

    /// Sets a sales stream's initial charge (kg/unit or mt/unit).
    pub fn set_initial_charge(
        &mut self,
        value: Quantity,
        stream: StreamKind,
        years: YearMatcher,
    ) -> Result<(), EngineError> {
        if !self.applies(&years) {
            return Ok(());
        }
        let key = self.current_key("initial charge")?;
        self.state
            .substance_mut(&key)?
            .params
            .set_initial_charge(stream, value)?;
        self.run_plan(&key, SET_UNITS)
    }

    /// Accumulates a recharge command: `volume` percent of the prior
    /// population serviced at `intensity` kg/unit.
    pub fn recharge(
        &mut self,
        volume: Quantity,
        intensity: Quantity,
        years: YearMatcher,
    ) -> Result<(), EngineError> {
        if !self.applies(&years) {
            return Ok(());
        }
        let key = self.current_key("recharge")?;
        let rate = rate_as_percent(&volume)?;
        if rate.is_zero() {
            return Ok(());
        }
        self.state
            .substance_mut(&key)?
            .params
            .accumulate_recharge(rate, intensity)?;
        self.run_plan(&key, SET_UNITS)
    }

    /// Sets the retirement rate; `with_replacement` keeps the population
    /// whole by assuming retired units are replaced.
    pub fn retire(
        &mut self,
        rate: Quantity,
        with_replacement: bool,
        years: YearMatcher,
    ) -> Result<(), EngineError> {
        if !self.applies(&years) {
            return Ok(());
        }
        let key = self.current_key("retire")?;
        let rate = rate_as_percent(&rate)?;
        {
            let params = &mut self.state.substance_mut(&key)?.params;
            params.set_retirement_rate(rate);
            if with_replacement {
                params.set_has_replacement(true);
            }
        }
        self.run_plan(&key, &[RecalcStep::Retire])?;
        if self.state.substance(&key)?.params.any_unit_sales_intent() {
            self.run_plan(&key, SET_UNITS)?;
        }
        self.run_plan(&key, &[RecalcStep::Consumption])
    }

    /// Accumulates recovery and yield rates for a recycling stage.
    pub fn recycle(
        &mut self,
        recovery: Quantity,
        reuse_yield: Quantity,
        stage: RecoveryStage,
        years: YearMatcher,
    ) -> Result<(), EngineError> {
        if !self.applies(&years) {
            return Ok(());
        }
        let key = self.current_key("recycle")?;
        {
            let params = &mut self.state.substance_mut(&key)?.params;
            params.add_recovery_rate(rate_as_percent(&recovery)?, stage)?;
            params.set_yield_rate(rate_as_percent(&reuse_yield)?, stage)?;
        }
        self.run_plan(&key, RECYCLE_CHAIN)
    }

    /// Sets the induction rate for a stage (0 % to 100 %).
    pub fn set_induction_rate(
        &mut self,
        rate: Quantity,
        stage: RecoveryStage,
    ) -> Result<(), EngineError> {
        let key = self.current_key("induction rate")?;
        self.state
            .substance_mut(&key)?
            .params
            .set_induction_rate(rate_as_percent(&rate)?, stage)?;
        self.run_plan(&key, RECYCLE_CHAIN)
    }

    /// Sets the carry-over mode for the substance in scope.
    pub fn set_assume(&mut self, mode: AssumeMode, years: YearMatcher) -> Result<(), EngineError> {
        if !self.applies(&years) {
            return Ok(());
        }
        let key = self.current_key("assume")?;
        self.state.substance_mut(&key)?.params.set_assume_mode(mode);
        Ok(())
    }

    // --- stream writes ----------------------------------------------------

    /// User-visible stream write. Equipment routes through the population
    /// utility, sales streams split or net per their units, and the recalc
    /// chain for the stream class runs afterwards.
    pub fn set_stream(
        &mut self,
        stream: StreamKind,
        value: Quantity,
        years: YearMatcher,
    ) -> Result<(), EngineError> {
        if !self.applies(&years) {
            return Ok(());
        }
        let key = self.current_key("set")?;
        let value = self.resolve_percent(&key, stream, value, PercentDefault::OfCurrent)?;
        self.set_stream_resolved(&key, stream, value)
    }

    /// Applies a delta to a stream. Percent deltas resolve against the
    /// last-specified value when one exists (compounding growth), else the
    /// current value; absolute deltas add in their own units.
    pub fn change_stream(
        &mut self,
        stream: StreamKind,
        delta: Quantity,
        years: YearMatcher,
    ) -> Result<(), EngineError> {
        if !self.applies(&years) {
            return Ok(());
        }
        if !stream.is_user_settable() {
            return Err(EngineError::UnknownStream {
                name: stream.as_str().to_string(),
            });
        }
        let key = self.current_key("change")?;
        let target = self.change_target(&key, stream, &delta)?;
        self.set_stream_resolved(&key, stream, target)
    }

    /// Upper-bounds a stream, optionally displacing the removed mass.
    pub fn cap(
        &mut self,
        stream: StreamKind,
        amount: Quantity,
        years: YearMatcher,
        displace: Option<DisplaceTarget>,
        kind: DisplacementKind,
    ) -> Result<(), EngineError> {
        self.limit_stream(stream, amount, years, displace, kind, Bound::Upper)
    }

    /// Lower-bounds a stream, optionally pulling the added mass from the
    /// displacement target.
    pub fn floor(
        &mut self,
        stream: StreamKind,
        amount: Quantity,
        years: YearMatcher,
        displace: Option<DisplaceTarget>,
        kind: DisplacementKind,
    ) -> Result<(), EngineError> {
        self.limit_stream(stream, amount, years, displace, kind, Bound::Lower)
    }

    /// Moves mass from the substance in scope to a sibling substance.
    /// Percent amounts resolve against the current stream value; unit-based
    /// amounts convert through the source charge out and the destination
    /// charge in.
    pub fn replace(
        &mut self,
        amount: Quantity,
        stream: StreamKind,
        destination: &str,
        years: YearMatcher,
    ) -> Result<(), EngineError> {
        if !self.applies(&years) {
            return Ok(());
        }
        let key = self.current_key("replace")?;
        if key.substance() == destination {
            return Err(EngineError::SelfReplacement {
                substance: destination.to_string(),
            });
        }
        let dest_key = key.sibling(destination);
        if !self.state.contains(&dest_key) {
            return Err(EngineError::UnknownSubstance {
                application: dest_key.application().to_string(),
                substance: dest_key.substance().to_string(),
            });
        }

        let amount = self.resolve_percent(&key, stream, amount, PercentDefault::OfCurrent)?;
        let by_units = amount.units() == Units::EquipmentUnits;
        let source_kg = if by_units {
            let charge = self.sales_charge(&key, stream)?;
            dec_mul(amount.amount(), charge)?
        } else {
            self.convert_in_scope(&key, &amount, stream.canonical_units())?
                .amount()
        };
        if source_kg.is_zero() {
            return Ok(());
        }
        let dest_kg = if by_units {
            let charge = self.sales_charge(&dest_key, stream)?;
            dec_mul(amount.amount(), charge)?
        } else {
            source_kg
        };

        let current = self.state.stream(&key, stream)?.amount();
        self.write_stream_amount(&key, stream, dec_sub(current, source_kg)?, false)?;
        self.run_plan(&key, SET_VOLUME)?;

        self.with_destination(&dest_key, |engine, dest| {
            let current = engine.state.stream(dest, stream)?.amount();
            engine.write_stream_amount(dest, stream, dec_add(current, dest_kg)?, true)?;
            engine.run_plan(dest, SET_VOLUME)
        })
    }

    // --- year boundary and output ----------------------------------------

    /// Advances to the next year, running the transition bookkeeping.
    pub fn increment_year(&mut self) -> Result<(), EngineError> {
        self.state.advance_year()
    }

    /// Extracts the current year's record for every registered substance,
    /// in registration order.
    pub fn get_results(&self) -> Result<Vec<EngineResult>, EngineError> {
        self.state
            .iter()
            .map(|(key, _)| results::extract(&self.state, key, &self.scenario, self.trial))
            .collect()
    }

    // --- internals --------------------------------------------------------

    fn applies(&self, years: &YearMatcher) -> bool {
        years.matches(self.state.current_year())
    }

    fn current_key(&self, operation: &str) -> Result<SubstanceId, EngineError> {
        self.scope
            .substance_id()
            .ok_or_else(|| EngineError::MissingScope {
                operation: operation.to_string(),
            })
    }

    fn run_plan(&mut self, key: &SubstanceId, steps: &[RecalcStep]) -> Result<(), EngineError> {
        let plan = RecalcPlan::of(steps);
        let mut kit = RecalcKit::new(&mut self.state, key);
        plan.execute(&mut kit)
    }

    /// Converts a value in the context of one substance, optionally pinning
    /// a specific sales stream's initial charge.
    fn convert_in_scope(
        &self,
        key: &SubstanceId,
        value: &Quantity,
        to: Units,
    ) -> Result<Quantity, EngineError> {
        let entry = self.state.substance(key)?;
        convert::convert(value, to, &entry.view())
    }

    /// The kg/unit charge conversions through a sales stream use: the
    /// stream's own initial charge, or the amortized charge for `sales`.
    fn sales_charge(&self, key: &SubstanceId, stream: StreamKind) -> Result<Decimal, EngineError> {
        let entry = self.state.substance(key)?;
        let charge = match stream {
            StreamKind::Sales => entry.amortized_charge()?,
            other if other.is_sales_substream() => entry.params.initial_charge(other)?.amount(),
            other => {
                return Err(EngineError::UnknownStream {
                    name: format!("{other} (no unit charge)"),
                })
            }
        };
        if charge.is_zero() {
            return Err(EngineError::UnitMismatch {
                from: Units::EquipmentUnits.as_str().to_string(),
                to: format!("kg (initial charge of {stream} is zero)"),
            });
        }
        Ok(charge)
    }

    /// Resolves a percent value to an absolute quantity in the stream's
    /// canonical units. Non-percent values pass through.
    fn resolve_percent(
        &self,
        key: &SubstanceId,
        stream: StreamKind,
        value: Quantity,
        default: PercentDefault,
    ) -> Result<Quantity, EngineError> {
        let Some(basis) = value.units().percent_basis() else {
            return Ok(value);
        };
        let basis = default.resolve(basis);
        let entry = self.state.substance(key)?;
        let basis_amount = match basis {
            PercentBasis::CurrentYear => entry.streams.amount(stream),
            PercentBasis::PriorYear => match stream {
                StreamKind::Equipment => entry.streams.amount(StreamKind::PriorEquipment),
                StreamKind::PriorEquipment => entry.streams.amount(StreamKind::PriorEquipment),
                other => entry.params.year_start().amount(other).unwrap_or(Decimal::ZERO),
            },
            PercentBasis::Unspecified => unreachable!("resolved above"),
        };
        let amount = dec_mul(basis_amount, pct_to_fraction(value.amount())?)?;
        Ok(Quantity::new(amount, stream.canonical_units()))
    }

    /// Shared tail of `set`/`change` once percents are resolved.
    fn set_stream_resolved(
        &mut self,
        key: &SubstanceId,
        stream: StreamKind,
        value: Quantity,
    ) -> Result<(), EngineError> {
        if !stream.is_user_settable() {
            return Err(EngineError::UnknownStream {
                name: stream.as_str().to_string(),
            });
        }
        match stream {
            StreamKind::Equipment => {
                self.set_equipment_target(key, value)?;
                self.run_plan(key, SET_POPULATION)
            }
            StreamKind::PriorEquipment => {
                let converted = self.convert_in_scope(key, &value, Units::EquipmentUnits)?;
                let mut update = StateUpdate::new(key.clone(), stream, converted);
                update.invalidates_prior_equipment = true;
                self.state.update(update)?;
                self.state
                    .substance_mut(key)?
                    .params
                    .set_last_specified(stream, value);
                self.run_plan(key, SET_UNITS)
            }
            _ if value.units() == Units::EquipmentUnits && stream != StreamKind::Sales => {
                // Unit-based sales intent: the recalc derives stored kg as
                // units x charge plus the recharge share on top.
                let entry = self.state.substance(key)?;
                if !value.is_zero() && !entry.params.is_enabled(stream) {
                    return Err(EngineError::StreamNotEnabled { stream });
                }
                self.sales_charge(key, stream)?;
                let params = &mut self.state.substance_mut(key)?.params;
                params.set_last_specified(stream, value);
                params.set_sales_intent_freshly_set(true);
                self.run_plan(key, SET_UNITS)
            }
            _ => {
                let original = value;
                let value = if value.units() == Units::EquipmentUnits {
                    // `sales` in units converts through the amortized
                    // charge, recharge on top.
                    let charge = self.sales_charge(key, stream)?;
                    let entry = self.state.substance(key)?;
                    let recharge = crate::recalc::recharge_demand_view(entry)?;
                    let kg = dec_add(dec_mul(value.amount(), charge)?, recharge)?;
                    Quantity::new(kg, Units::Kilograms)
                } else {
                    value
                };
                let mut update = StateUpdate::new(key.clone(), stream, value);
                update.subtract_recycling =
                    matches!(stream, StreamKind::Domestic | StreamKind::Import);
                self.state.set_stream_checked(update)?;
                self.state
                    .substance_mut(key)?
                    .params
                    .set_last_specified(stream, original);
                self.run_plan(key, SET_VOLUME)
            }
        }
    }

    /// Sets the population to a target, adjusting new equipment (or, when
    /// shrinking below attrition, retirement) to keep the identity intact.
    fn set_equipment_target(
        &mut self,
        key: &SubstanceId,
        value: Quantity,
    ) -> Result<(), EngineError> {
        let target = self
            .convert_in_scope(key, &value, Units::EquipmentUnits)?
            .amount()
            .max(Decimal::ZERO);
        let entry = self.state.substance_mut(key)?;
        let prior = entry.streams.amount(StreamKind::PriorEquipment);
        let retired = entry.streams.amount(StreamKind::Retired);
        let mut fresh = dec_add(dec_sub(target, prior)?, retired)?;
        let mut retired_total = retired;
        if fresh.is_sign_negative() {
            retired_total = dec_sub(retired, fresh)?;
            fresh = Decimal::ZERO;
        }
        entry.streams.set(StreamKind::NewEquipment, fresh)?;
        entry.streams.set(StreamKind::Retired, retired_total)?;
        entry.streams.set(StreamKind::Equipment, target)?;
        entry
            .params
            .set_last_specified(StreamKind::Equipment, value);
        Ok(())
    }

    /// Target value for a `change`: last-specified basis when present (so
    /// growth compounds in the user's units), else the current value.
    fn change_target(
        &self,
        key: &SubstanceId,
        stream: StreamKind,
        delta: &Quantity,
    ) -> Result<Quantity, EngineError> {
        let entry = self.state.substance(key)?;
        if delta.units().is_percent() {
            let basis = match entry.params.last_specified(stream) {
                Some(intent) => intent,
                None => entry.streams.get(stream),
            };
            let grow = dec_mul(basis.amount(), pct_to_fraction(delta.amount())?)?;
            return Ok(basis.with_amount(dec_add(basis.amount(), grow)?));
        }
        match entry.params.last_specified(stream) {
            Some(intent) if intent.units() == delta.units() => intent.checked_add(delta),
            _ => {
                let current = entry.streams.get(stream);
                if delta.units() == current.units() {
                    current.checked_add(delta)
                } else if delta.units() == Units::EquipmentUnits && stream.is_sales_substream() {
                    // Adding units to a volume-carried stream re-expresses
                    // the current mass as units first.
                    let charge = self.sales_charge(key, stream)?;
                    let current_units = dec_div(current.amount(), charge)?;
                    Ok(Quantity::new(
                        dec_add(current_units, delta.amount())?,
                        Units::EquipmentUnits,
                    ))
                } else {
                    let converted = self.convert_in_scope(key, delta, current.units())?;
                    current.checked_add(&converted)
                }
            }
        }
    }

    fn limit_stream(
        &mut self,
        stream: StreamKind,
        amount: Quantity,
        years: YearMatcher,
        displace: Option<DisplaceTarget>,
        kind: DisplacementKind,
        bound: Bound,
    ) -> Result<(), EngineError> {
        if !self.applies(&years) {
            return Ok(());
        }
        if !stream.is_user_settable() {
            return Err(EngineError::UnknownStream {
                name: stream.as_str().to_string(),
            });
        }
        let key = self.current_key(bound.verb())?;

        // Validate the displacement target before any mutation.
        if let Some(target) = &displace {
            match target {
                DisplaceTarget::Stream(target_stream) if *target_stream == stream => {
                    return Err(EngineError::SelfDisplacement { stream });
                }
                DisplaceTarget::Stream(target_stream) => {
                    if !target_stream.is_user_settable() {
                        return Err(EngineError::UnknownStream {
                            name: target_stream.as_str().to_string(),
                        });
                    }
                }
                DisplaceTarget::Substance(name) => {
                    if key.substance() == name.as_str() {
                        return Err(EngineError::SelfReplacement {
                            substance: name.clone(),
                        });
                    }
                    let dest = key.sibling(name.clone());
                    if !self.state.contains(&dest) {
                        return Err(EngineError::UnknownSubstance {
                            application: dest.application().to_string(),
                            substance: dest.substance().to_string(),
                        });
                    }
                }
            }
        }

        let current = self.state.stream(&key, stream)?.amount();
        let limit = self.resolve_limit(&key, stream, &amount)?;
        let exceeded = match bound {
            Bound::Upper => dec_sub(current, limit)?,
            Bound::Lower => dec_sub(limit, current)?,
        };
        if exceeded.is_sign_negative() || exceeded.is_zero() {
            return Ok(());
        }

        self.write_stream_amount(&key, stream, limit, false)?;
        match stream {
            StreamKind::Equipment => self.run_plan(&key, SET_POPULATION)?,
            _ => self.run_plan(&key, SET_VOLUME)?,
        }

        let Some(target) = displace else {
            return Ok(());
        };
        let by_units = match kind {
            DisplacementKind::ByUnits => true,
            DisplacementKind::ByVolume => false,
            DisplacementKind::Equivalent => amount.units() == Units::EquipmentUnits,
        };
        // The mass removed by a cap lands on the target; a floor pulls the
        // added mass out of it.
        let signed = match bound {
            Bound::Upper => exceeded,
            Bound::Lower => -exceeded,
        };
        match target {
            DisplaceTarget::Stream(target_stream) => {
                let delta = if by_units && stream != StreamKind::Equipment {
                    let units = dec_div(signed, self.sales_charge(&key, stream)?)?;
                    dec_mul(units, self.sales_charge(&key, target_stream)?)?
                } else {
                    signed
                };
                let current = self.state.stream(&key, target_stream)?.amount();
                self.write_stream_amount(&key, target_stream, dec_add(current, delta)?, true)?;
                self.run_plan(&key, SET_VOLUME)
            }
            DisplaceTarget::Substance(name) => {
                let dest_key = key.sibling(name);
                let delta = if by_units && stream != StreamKind::Equipment {
                    let units = dec_div(signed, self.sales_charge(&key, stream)?)?;
                    dec_mul(units, self.sales_charge(&dest_key, stream)?)?
                } else {
                    signed
                };
                self.with_destination(&dest_key, |engine, dest| {
                    let current = engine.state.stream(dest, stream)?.amount();
                    engine.write_stream_amount(dest, stream, dec_add(current, delta)?, true)?;
                    match stream {
                        StreamKind::Equipment => engine.run_plan(dest, SET_POPULATION),
                        _ => engine.run_plan(dest, SET_VOLUME),
                    }
                })
            }
        }
    }

    /// A cap/floor limit in the stream's canonical units. Unit-based limits
    /// on sales streams mean "this many new units": the kg limit carries the
    /// stream's recharge share on top, mirroring unit-based sets.
    fn resolve_limit(
        &self,
        key: &SubstanceId,
        stream: StreamKind,
        amount: &Quantity,
    ) -> Result<Decimal, EngineError> {
        if amount.units().is_percent() {
            return Ok(self
                .resolve_percent(key, stream, *amount, PercentDefault::OfPrior)?
                .amount());
        }
        if amount.units() == Units::EquipmentUnits && stream != StreamKind::Equipment {
            let charge = self.sales_charge(key, stream)?;
            let entry = self.state.substance(key)?;
            let recharge = crate::recalc::recharge_demand_view(entry)?;
            let dist = SalesDistribution::for_substance(&entry.streams, &entry.params, false);
            let share = match stream {
                StreamKind::Sales => dec_add(dist.domestic, dist.import)?,
                other => dist.fraction(other),
            };
            let unit_mass = dec_mul(amount.amount(), charge)?;
            return dec_add(unit_mass, dec_mul(recharge, share)?);
        }
        Ok(self
            .convert_in_scope(key, amount, stream.canonical_units())?
            .amount())
    }

    /// Writes an absolute amount to a stream through the state's branch
    /// table, without touching last-specified memory.
    fn write_stream_amount(
        &mut self,
        key: &SubstanceId,
        stream: StreamKind,
        amount: Decimal,
        negative_allowed: bool,
    ) -> Result<(), EngineError> {
        if stream == StreamKind::Equipment {
            return self.set_equipment_target(
                key,
                Quantity::new(amount.max(Decimal::ZERO), Units::EquipmentUnits),
            );
        }
        let mut update = StateUpdate::new(
            key.clone(),
            stream,
            Quantity::new(amount, stream.canonical_units()),
        );
        update.negative_allowed = negative_allowed;
        self.state.update(update)
    }

    /// Runs a closure against a destination substance with the scope
    /// temporarily swapped there, restoring it on every exit path.
    fn with_destination<T>(
        &mut self,
        dest: &SubstanceId,
        f: impl FnOnce(&mut Self, &SubstanceId) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let mut dest_scope = self.scope.clone();
        dest_scope.enter_application(dest.application());
        dest_scope.enter_substance(dest.substance());
        let saved = core::mem::replace(&mut self.scope, dest_scope);
        let mut guard = ScopeRestore {
            engine: self,
            saved: Some(saved),
        };
        f(&mut *guard.engine, dest)
    }
}

/// Restores the engine scope when dropped, including on unwind.
struct ScopeRestore<'a> {
    engine: &'a mut Engine,
    saved: Option<Scope>,
}

impl Drop for ScopeRestore<'_> {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            self.engine.scope = saved;
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Bound {
    Upper,
    Lower,
}

impl Bound {
    fn verb(&self) -> &'static str {
        match self {
            Self::Upper => "cap",
            Self::Lower => "floor",
        }
    }
}

/// A rate argument in `%` or `years^-1`, as percent.
fn rate_as_percent(rate: &Quantity) -> Result<Decimal, EngineError> {
    match rate.units() {
        Units::Percent(_) => Ok(rate.amount()),
        Units::PerYear => dec_mul(rate.amount(), Decimal::ONE_HUNDRED),
        other => Err(EngineError::UnitMismatch {
            from: other.as_str().to_string(),
            to: "%".to_string(),
        }),
    }
}
