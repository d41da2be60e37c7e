//! Per-substance configuration and stepwise state.
//!
//! One [`Parameterization`] exists per (application, substance). It is not
//! time-keyed: commands mutate it through a year, and
//! [`Parameterization::reset_state_at_timestep`] clears the per-step flags
//! and cumulative bases at the year boundary while rates, charges, and
//! intensities persist.

use bitflags::bitflags;
use primitives::{
    dec_add, dec_div, dec_mul, Decimal, EngineError, Quantity, StreamKind, Units,
};
use std::collections::HashMap;

/// Tolerance below which a priorEquipment edit does not trigger base
/// rescaling, in equipment units.
const PRIOR_EQUIPMENT_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 4); // 1e-4

bitflags! {
    /// Which sales streams may receive non-zero user writes.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    #[cfg_attr(feature = "serde", serde(transparent))]
    pub struct EnabledStreams: u8 {
        /// `domestic` may be written.
        const DOMESTIC = 0b001;
        /// `import` may be written.
        const IMPORT = 0b010;
        /// `export` may be written.
        const EXPORT = 0b100;
    }
}

/// Stage at which recovered material is captured.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RecoveryStage {
    /// Capture from retired equipment.
    Eol,
    /// Capture while servicing in-service equipment.
    Recharge,
}

/// How sales carry over when no fresh input arrives for a year.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AssumeMode {
    /// Last year's sales remain next year's baseline.
    #[default]
    Continued,
    /// Only recharge demand drives sales; no baseline carries forward.
    OnlyRecharge,
}

/// Stream values captured at the start of the year, the basis for
/// `% prior year` caps and floors. Amounts in kg.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct YearStartSnapshot {
    /// `domestic` at year start.
    pub domestic: Decimal,
    /// `import` at year start.
    pub import: Decimal,
    /// `export` at year start.
    pub export: Decimal,
    /// Combined `sales` at year start.
    pub sales: Decimal,
}

impl YearStartSnapshot {
    /// The captured basis for a stream, if it has one.
    pub fn amount(&self, kind: StreamKind) -> Option<Decimal> {
        match kind {
            StreamKind::Domestic => Some(self.domestic),
            StreamKind::Import => Some(self.import),
            StreamKind::Export => Some(self.export),
            StreamKind::Sales => Some(self.sales),
            _ => None,
        }
    }
}

/// Per-substance configuration plus the cumulative bases and flags that keep
/// repeated recalcs within a year idempotent.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Parameterization {
    initial_charge_domestic: Quantity,
    initial_charge_import: Quantity,
    initial_charge_export: Quantity,
    ghg_intensity: Quantity,
    energy_intensity: Option<Quantity>,
    recharge_rate: Decimal,
    recharge_intensity: Quantity,
    recharge_set: bool,
    retirement_rate: Decimal,
    recovery_eol: Decimal,
    recovery_eol_set: bool,
    recovery_recharge: Decimal,
    recovery_recharge_set: bool,
    yield_eol: Decimal,
    yield_eol_set: bool,
    yield_recharge: Decimal,
    yield_recharge_set: bool,
    induction_eol: Decimal,
    induction_recharge: Decimal,
    has_replacement: bool,
    assume_mode: AssumeMode,
    enabled: EnabledStreams,
    last_specified: HashMap<StreamKind, Quantity>,
    sales_user_specified: bool,
    recharge_base_population: Option<Decimal>,
    applied_recharge_units: Decimal,
    retirement_base_population: Option<Decimal>,
    applied_retirement_units: Decimal,
    applied_eol_displacement: Decimal,
    applied_recharge_displacement: Decimal,
    recycling_calculated_this_step: bool,
    retire_calculated_this_step: bool,
    sales_intent_freshly_set: bool,
    year_start: YearStartSnapshot,
}

impl Default for Parameterization {
    fn default() -> Self {
        Self {
            initial_charge_domestic: Quantity::zero(Units::KilogramsPerUnit),
            initial_charge_import: Quantity::zero(Units::KilogramsPerUnit),
            initial_charge_export: Quantity::zero(Units::KilogramsPerUnit),
            ghg_intensity: Quantity::zero(Units::TonsCo2ePerTon),
            energy_intensity: None,
            recharge_rate: Decimal::ZERO,
            recharge_intensity: Quantity::zero(Units::KilogramsPerUnit),
            recharge_set: false,
            retirement_rate: Decimal::ZERO,
            recovery_eol: Decimal::ZERO,
            recovery_eol_set: false,
            recovery_recharge: Decimal::ZERO,
            recovery_recharge_set: false,
            yield_eol: Decimal::ONE_HUNDRED,
            yield_eol_set: false,
            yield_recharge: Decimal::ONE_HUNDRED,
            yield_recharge_set: false,
            induction_eol: Decimal::ONE_HUNDRED,
            induction_recharge: Decimal::ONE_HUNDRED,
            has_replacement: false,
            assume_mode: AssumeMode::Continued,
            enabled: EnabledStreams::empty(),
            last_specified: HashMap::new(),
            sales_user_specified: false,
            recharge_base_population: None,
            applied_recharge_units: Decimal::ZERO,
            retirement_base_population: None,
            applied_retirement_units: Decimal::ZERO,
            applied_eol_displacement: Decimal::ZERO,
            applied_recharge_displacement: Decimal::ZERO,
            recycling_calculated_this_step: false,
            retire_calculated_this_step: false,
            sales_intent_freshly_set: false,
            year_start: YearStartSnapshot::default(),
        }
    }
}

impl Parameterization {
    /// A fresh parameterization: zero charges and rates, 100 % yield,
    /// 100 % induction, sales carried over, nothing enabled.
    pub fn new() -> Self {
        Self::default()
    }

    // --- initial charges -------------------------------------------------

    /// Initial charge of a sales stream, kg/unit.
    pub fn initial_charge(&self, stream: StreamKind) -> Result<Quantity, EngineError> {
        match stream {
            StreamKind::Domestic => Ok(self.initial_charge_domestic),
            StreamKind::Import => Ok(self.initial_charge_import),
            StreamKind::Export => Ok(self.initial_charge_export),
            other => Err(EngineError::UnknownStream {
                name: format!("{other} (no initial charge)"),
            }),
        }
    }

    /// Sets the initial charge of a sales stream. Accepts `kg/unit` or
    /// `mt/unit`; stored normalized to `kg/unit`.
    pub fn set_initial_charge(
        &mut self,
        stream: StreamKind,
        charge: Quantity,
    ) -> Result<(), EngineError> {
        let normalized = charge.rescale(Units::KilogramsPerUnit)?;
        let slot = match stream {
            StreamKind::Domestic => &mut self.initial_charge_domestic,
            StreamKind::Import => &mut self.initial_charge_import,
            StreamKind::Export => &mut self.initial_charge_export,
            other => {
                return Err(EngineError::UnknownStream {
                    name: format!("{other} (no initial charge)"),
                })
            }
        };
        *slot = normalized;
        Ok(())
    }

    // --- intensities -----------------------------------------------------

    /// GHG intensity (GWP), tCO2e/mt. Zero when never specified.
    #[inline]
    pub fn ghg_intensity(&self) -> Quantity {
        self.ghg_intensity
    }

    /// Sets the GHG intensity; stored normalized to tCO2e/mt.
    pub fn set_ghg_intensity(&mut self, intensity: Quantity) -> Result<(), EngineError> {
        self.ghg_intensity = intensity.rescale(Units::TonsCo2ePerTon)?;
        Ok(())
    }

    /// Energy intensity, kwh/unit, if specified.
    #[inline]
    pub fn energy_intensity(&self) -> Option<Quantity> {
        self.energy_intensity
    }

    /// Sets the energy intensity.
    pub fn set_energy_intensity(&mut self, intensity: Quantity) -> Result<(), EngineError> {
        self.energy_intensity = Some(intensity.rescale(Units::KilowattHoursPerUnit)?);
        Ok(())
    }

    // --- recharge --------------------------------------------------------

    /// Accumulates a recharge command. Rates add; intensities merge as the
    /// average weighted by absolute rate, so corrective negative rate
    /// adjustments still combine.
    pub fn accumulate_recharge(
        &mut self,
        rate_pct: Decimal,
        intensity: Quantity,
    ) -> Result<(), EngineError> {
        let intensity = intensity.rescale(Units::KilogramsPerUnit)?;
        if !self.recharge_set {
            self.recharge_rate = rate_pct;
            self.recharge_intensity = intensity;
            self.recharge_set = true;
            return Ok(());
        }
        let prior_weight = self.recharge_rate.abs();
        let new_weight = rate_pct.abs();
        let total_weight = dec_add(prior_weight, new_weight)?;
        if !total_weight.is_zero() {
            let weighted = dec_add(
                dec_mul(prior_weight, self.recharge_intensity.amount())?,
                dec_mul(new_weight, intensity.amount())?,
            )?;
            self.recharge_intensity = self
                .recharge_intensity
                .with_amount(dec_div(weighted, total_weight)?);
        } else {
            self.recharge_intensity = intensity;
        }
        self.recharge_rate = dec_add(self.recharge_rate, rate_pct)?;
        Ok(())
    }

    /// Recharge rate, percent of prior population serviced per year.
    #[inline]
    pub fn recharge_rate(&self) -> Decimal {
        self.recharge_rate
    }

    /// Recharge intensity, kg/unit serviced.
    #[inline]
    pub fn recharge_intensity(&self) -> Quantity {
        self.recharge_intensity
    }

    // --- retirement ------------------------------------------------------

    /// Sets the annual retirement (hazard) rate in percent. Repeated
    /// commands within a year replace the rate.
    #[inline]
    pub fn set_retirement_rate(&mut self, rate_pct: Decimal) {
        self.retirement_rate = rate_pct;
    }

    /// Retirement rate, percent per year.
    #[inline]
    pub fn retirement_rate(&self) -> Decimal {
        self.retirement_rate
    }

    /// Whether retirement implies automatic unit replacement this year.
    #[inline]
    pub fn has_replacement(&self) -> bool {
        self.has_replacement
    }

    /// Marks retirement as replacement-backed for the year.
    #[inline]
    pub fn set_has_replacement(&mut self, value: bool) {
        self.has_replacement = value;
    }

    // --- recycling -------------------------------------------------------

    /// Adds a recovery rate for a stage. Rates combine additively within a
    /// year; the first command of a new year replaces the carried value.
    pub fn add_recovery_rate(
        &mut self,
        rate_pct: Decimal,
        stage: RecoveryStage,
    ) -> Result<(), EngineError> {
        let (slot, set) = match stage {
            RecoveryStage::Eol => (&mut self.recovery_eol, &mut self.recovery_eol_set),
            RecoveryStage::Recharge => {
                (&mut self.recovery_recharge, &mut self.recovery_recharge_set)
            }
        };
        if *set {
            *slot = dec_add(*slot, rate_pct)?;
        } else {
            *slot = rate_pct;
            *set = true;
        }
        Ok(())
    }

    /// Recovery rate for a stage, percent.
    pub fn recovery_rate(&self, stage: RecoveryStage) -> Decimal {
        match stage {
            RecoveryStage::Eol => self.recovery_eol,
            RecoveryStage::Recharge => self.recovery_recharge,
        }
    }

    /// Sets the reuse yield for a stage, percent of recovered material that
    /// becomes secondary supply. A second command in the same year averages
    /// with the prior non-zero value (simple mean; an acknowledged modeling
    /// approximation when no per-command recovery weight is available).
    pub fn set_yield_rate(&mut self, rate_pct: Decimal, stage: RecoveryStage) -> Result<(), EngineError> {
        let (slot, set) = match stage {
            RecoveryStage::Eol => (&mut self.yield_eol, &mut self.yield_eol_set),
            RecoveryStage::Recharge => (&mut self.yield_recharge, &mut self.yield_recharge_set),
        };
        if *set && !slot.is_zero() && *slot != rate_pct {
            tracing::warn!(
                prior = %slot,
                incoming = %rate_pct,
                "merging yield rates as a simple mean"
            );
            *slot = dec_div(dec_add(*slot, rate_pct)?, Decimal::TWO)?;
        } else {
            *slot = rate_pct;
            *set = true;
        }
        Ok(())
    }

    /// Reuse yield for a stage, percent.
    pub fn yield_rate(&self, stage: RecoveryStage) -> Decimal {
        match stage {
            RecoveryStage::Eol => self.yield_eol,
            RecoveryStage::Recharge => self.yield_recharge,
        }
    }

    /// Sets the induction rate for a stage: the share of recycled mass that
    /// adds to total demand instead of displacing virgin supply. Valid range
    /// 0 % to 100 %, default 100 %.
    pub fn set_induction_rate(
        &mut self,
        rate_pct: Decimal,
        stage: RecoveryStage,
    ) -> Result<(), EngineError> {
        if rate_pct < Decimal::ZERO || rate_pct > Decimal::ONE_HUNDRED {
            return Err(EngineError::InvalidInductionRate { rate: rate_pct });
        }
        match stage {
            RecoveryStage::Eol => self.induction_eol = rate_pct,
            RecoveryStage::Recharge => self.induction_recharge = rate_pct,
        }
        Ok(())
    }

    /// Induction rate for a stage, percent.
    pub fn induction_rate(&self, stage: RecoveryStage) -> Decimal {
        match stage {
            RecoveryStage::Eol => self.induction_eol,
            RecoveryStage::Recharge => self.induction_recharge,
        }
    }

    // --- assume mode -----------------------------------------------------

    /// How sales carry over when no fresh input arrives.
    #[inline]
    pub fn assume_mode(&self) -> AssumeMode {
        self.assume_mode
    }

    /// Sets the carry-over mode.
    #[inline]
    pub fn set_assume_mode(&mut self, mode: AssumeMode) {
        self.assume_mode = mode;
    }

    // --- enabled streams -------------------------------------------------

    /// Marks a sales stream as writable. Sticky once set.
    pub fn mark_stream_enabled(&mut self, stream: StreamKind) -> Result<(), EngineError> {
        self.enabled |= Self::enable_bit(stream)?;
        Ok(())
    }

    /// Whether a stream accepts non-zero user writes. Streams outside the
    /// enable set are always writable.
    pub fn is_enabled(&self, stream: StreamKind) -> bool {
        match Self::enable_bit(stream) {
            Ok(bit) => self.enabled.contains(bit),
            Err(_) => true,
        }
    }

    /// Whether any of `domestic`/`import`/`export` is enabled.
    #[inline]
    pub fn has_any_sales_enabled(&self) -> bool {
        !self.enabled.is_empty()
    }

    fn enable_bit(stream: StreamKind) -> Result<EnabledStreams, EngineError> {
        match stream {
            StreamKind::Domestic => Ok(EnabledStreams::DOMESTIC),
            StreamKind::Import => Ok(EnabledStreams::IMPORT),
            StreamKind::Export => Ok(EnabledStreams::EXPORT),
            other => Err(EngineError::UnknownStream {
                name: format!("{other} (not enableable)"),
            }),
        }
    }

    // --- last-specified memory -------------------------------------------

    /// Remembers the user's value for a stream in its original units.
    pub fn set_last_specified(&mut self, stream: StreamKind, value: Quantity) {
        self.last_specified.insert(stream, value);
        if stream.is_sales_substream() || stream == StreamKind::Sales {
            self.sales_user_specified = true;
        }
    }

    /// The user's last value for a stream, in the units they used.
    pub fn last_specified(&self, stream: StreamKind) -> Option<Quantity> {
        self.last_specified.get(&stream).copied()
    }

    /// Whether `set`/`change` ever touched a sales stream of this substance.
    #[inline]
    pub fn sales_user_specified(&self) -> bool {
        self.sales_user_specified
    }

    /// Whether any sales substream was last specified in equipment units.
    pub fn any_unit_sales_intent(&self) -> bool {
        [StreamKind::Domestic, StreamKind::Import, StreamKind::Export]
            .into_iter()
            .filter_map(|kind| self.last_specified(kind))
            .any(|value| value.units() == Units::EquipmentUnits)
    }

    // --- cumulative bases ------------------------------------------------

    /// The recharge base population, captured from `prior` on first use in
    /// the year.
    pub fn recharge_base_population(&mut self, prior: Decimal) -> Decimal {
        *self.recharge_base_population.get_or_insert(prior)
    }

    /// Records the serviced-unit total applied against the recharge base.
    #[inline]
    pub fn set_applied_recharge_units(&mut self, units: Decimal) {
        self.applied_recharge_units = units;
    }

    /// The recharge base without capturing it: the stored base if one was
    /// taken this year, else `prior`. For read-only consumers such as the
    /// result serializer.
    pub fn recharge_base_population_view(&self, prior: Decimal) -> Decimal {
        self.recharge_base_population.unwrap_or(prior)
    }

    /// The retirement base population, captured from `prior` on first use in
    /// the year.
    pub fn retirement_base_population(&mut self, prior: Decimal) -> Decimal {
        *self.retirement_base_population.get_or_insert(prior)
    }

    /// The retirement base without capturing it.
    pub fn retirement_base_population_view(&self, prior: Decimal) -> Decimal {
        self.retirement_base_population.unwrap_or(prior)
    }

    /// Records the retired-unit total applied against the retirement base.
    #[inline]
    pub fn set_applied_retirement_units(&mut self, units: Decimal) {
        self.applied_retirement_units = units;
    }

    /// Whether retirement has been computed since the last command.
    #[inline]
    pub fn retire_calculated_this_step(&self) -> bool {
        self.retire_calculated_this_step
    }

    /// Marks retirement as computed for this step.
    #[inline]
    pub fn set_retire_calculated_this_step(&mut self, value: bool) {
        self.retire_calculated_this_step = value;
    }

    /// Whether recycling has been computed since the last command.
    #[inline]
    pub fn recycling_calculated_this_step(&self) -> bool {
        self.recycling_calculated_this_step
    }

    /// Marks recycling as computed for this step.
    #[inline]
    pub fn set_recycling_calculated_this_step(&mut self, value: bool) {
        self.recycling_calculated_this_step = value;
    }

    /// Displaced virgin mass already subtracted for a stage this year, kg.
    /// Keeps repeated recalcs from compounding the subtraction: each
    /// recompute applies only the delta against this accumulator.
    pub fn applied_displacement(&self, stage: RecoveryStage) -> Decimal {
        match stage {
            RecoveryStage::Eol => self.applied_eol_displacement,
            RecoveryStage::Recharge => self.applied_recharge_displacement,
        }
    }

    /// Records the displaced virgin mass applied for a stage.
    pub fn set_applied_displacement(&mut self, stage: RecoveryStage, amount: Decimal) {
        match stage {
            RecoveryStage::Eol => self.applied_eol_displacement = amount,
            RecoveryStage::Recharge => self.applied_recharge_displacement = amount,
        }
    }

    /// Whether a unit-based sales intent was set by the current command.
    #[inline]
    pub fn sales_intent_freshly_set(&self) -> bool {
        self.sales_intent_freshly_set
    }

    /// Marks a unit-based sales intent as freshly set.
    #[inline]
    pub fn set_sales_intent_freshly_set(&mut self, value: bool) {
        self.sales_intent_freshly_set = value;
    }

    /// Rescales retirement and recharge bases after a priorEquipment edit so
    /// that captured bases stay consistent with the new magnitude. Edits
    /// within tolerance are ignored; a zero old value resets the applied
    /// amounts instead of dividing.
    pub fn rescale_bases(&mut self, old_prior: Decimal, new_prior: Decimal) -> Result<(), EngineError> {
        if (new_prior - old_prior).abs() <= PRIOR_EQUIPMENT_TOLERANCE {
            return Ok(());
        }
        if self.recharge_base_population.is_none() && self.retirement_base_population.is_none() {
            return Ok(());
        }
        if old_prior.is_zero() {
            if self.recharge_base_population.is_some() {
                self.recharge_base_population = Some(new_prior);
                self.applied_recharge_units = Decimal::ZERO;
            }
            if self.retirement_base_population.is_some() {
                self.retirement_base_population = Some(new_prior);
                self.applied_retirement_units = Decimal::ZERO;
            }
            return Ok(());
        }
        let ratio = dec_div(new_prior, old_prior)?;
        if let Some(base) = self.recharge_base_population {
            self.recharge_base_population = Some(dec_mul(base, ratio)?);
            self.applied_recharge_units = dec_mul(self.applied_recharge_units, ratio)?;
        }
        if let Some(base) = self.retirement_base_population {
            self.retirement_base_population = Some(dec_mul(base, ratio)?);
            self.applied_retirement_units = dec_mul(self.applied_retirement_units, ratio)?;
        }
        Ok(())
    }

    // --- year boundary ---------------------------------------------------

    /// Clears per-step flags and cumulative bases at the year transition.
    /// Rates, charges, intensities, enabled streams, and last-specified
    /// memory persist; accumulators re-arm so the first command of the new
    /// year replaces rather than accumulates.
    pub fn reset_state_at_timestep(&mut self) {
        self.recharge_set = false;
        self.recovery_eol_set = false;
        self.recovery_recharge_set = false;
        self.yield_eol_set = false;
        self.yield_recharge_set = false;
        self.has_replacement = false;
        self.recharge_base_population = None;
        self.applied_recharge_units = Decimal::ZERO;
        self.retirement_base_population = None;
        self.applied_retirement_units = Decimal::ZERO;
        self.applied_eol_displacement = Decimal::ZERO;
        self.applied_recharge_displacement = Decimal::ZERO;
        self.recycling_calculated_this_step = false;
        self.retire_calculated_this_step = false;
        self.sales_intent_freshly_set = false;
    }

    /// Captures the year-start stream snapshot used as the `% prior year`
    /// basis.
    pub fn capture_year_start(&mut self, domestic: Decimal, import: Decimal, export: Decimal, sales: Decimal) {
        self.year_start = YearStartSnapshot {
            domestic,
            import,
            export,
            sales,
        };
    }

    /// The captured year-start snapshot.
    #[inline]
    pub fn year_start(&self) -> &YearStartSnapshot {
        &self.year_start
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn recharge_rates_add_and_intensities_weight_average() {
        let mut params = Parameterization::new();
        params
            .accumulate_recharge(dec!(10), Quantity::new(dec!(0.2), Units::KilogramsPerUnit))
            .unwrap();
        params
            .accumulate_recharge(dec!(30), Quantity::new(dec!(0.4), Units::KilogramsPerUnit))
            .unwrap();
        assert_eq!(params.recharge_rate(), dec!(40));
        // (10*0.2 + 30*0.4) / 40 = 0.35
        assert_eq!(params.recharge_intensity().amount(), dec!(0.35));
    }

    #[test]
    fn recharge_accumulation_is_commutative() {
        let mut a = Parameterization::new();
        let mut b = Parameterization::new();
        let first = (dec!(10), Quantity::new(dec!(0.15), Units::KilogramsPerUnit));
        let second = (dec!(-4), Quantity::new(dec!(0.3), Units::KilogramsPerUnit));
        a.accumulate_recharge(first.0, first.1).unwrap();
        a.accumulate_recharge(second.0, second.1).unwrap();
        b.accumulate_recharge(second.0, second.1).unwrap();
        b.accumulate_recharge(first.0, first.1).unwrap();
        assert_eq!(a.recharge_rate(), b.recharge_rate());
        assert_eq!(a.recharge_intensity(), b.recharge_intensity());
    }

    #[test]
    fn negative_rate_adjustments_merge_by_absolute_weight() {
        let mut params = Parameterization::new();
        params
            .accumulate_recharge(dec!(10), Quantity::new(dec!(0.2), Units::KilogramsPerUnit))
            .unwrap();
        params
            .accumulate_recharge(dec!(-10), Quantity::new(dec!(0.4), Units::KilogramsPerUnit))
            .unwrap();
        assert_eq!(params.recharge_rate(), dec!(0));
        assert_eq!(params.recharge_intensity().amount(), dec!(0.3));
    }

    #[test]
    fn recovery_is_additive_within_a_year() {
        let mut params = Parameterization::new();
        params.add_recovery_rate(dec!(10), RecoveryStage::Eol).unwrap();
        params.add_recovery_rate(dec!(15), RecoveryStage::Eol).unwrap();
        assert_eq!(params.recovery_rate(RecoveryStage::Eol), dec!(25));
        // A new year re-arms the accumulator: the next command replaces.
        params.reset_state_at_timestep();
        params.add_recovery_rate(dec!(5), RecoveryStage::Eol).unwrap();
        assert_eq!(params.recovery_rate(RecoveryStage::Eol), dec!(5));
    }

    #[test]
    fn yield_merge_averages_with_prior() {
        let mut params = Parameterization::new();
        params.set_yield_rate(dec!(80), RecoveryStage::Eol).unwrap();
        params.set_yield_rate(dec!(90), RecoveryStage::Eol).unwrap();
        assert_eq!(params.yield_rate(RecoveryStage::Eol), dec!(85));
        assert_eq!(params.yield_rate(RecoveryStage::Recharge), dec!(100));
    }

    #[test]
    fn induction_rate_is_range_checked() {
        let mut params = Parameterization::new();
        assert!(params
            .set_induction_rate(dec!(101), RecoveryStage::Eol)
            .is_err());
        assert!(params
            .set_induction_rate(dec!(-1), RecoveryStage::Recharge)
            .is_err());
        params.set_induction_rate(dec!(40), RecoveryStage::Eol).unwrap();
        assert_eq!(params.induction_rate(RecoveryStage::Eol), dec!(40));
    }

    #[test]
    fn enable_is_sticky_and_scoped_to_sales_streams() {
        let mut params = Parameterization::new();
        assert!(!params.is_enabled(StreamKind::Domestic));
        assert!(params.is_enabled(StreamKind::Equipment));
        params.mark_stream_enabled(StreamKind::Domestic).unwrap();
        assert!(params.is_enabled(StreamKind::Domestic));
        assert!(params.mark_stream_enabled(StreamKind::Equipment).is_err());
        params.reset_state_at_timestep();
        assert!(params.is_enabled(StreamKind::Domestic));
    }

    #[test]
    fn base_rescaling_scales_base_and_applied_together() {
        let mut params = Parameterization::new();
        let base = params.retirement_base_population(dec!(1000));
        assert_eq!(base, dec!(1000));
        params.set_applied_retirement_units(dec!(50));
        params.rescale_bases(dec!(1000), dec!(2000)).unwrap();
        assert_eq!(params.retirement_base_population(dec!(999)), dec!(2000));
        assert_eq!(params.applied_retirement_units, dec!(100));
    }

    #[test]
    fn base_rescaling_from_zero_resets_applied() {
        let mut params = Parameterization::new();
        let _ = params.recharge_base_population(Decimal::ZERO);
        params.set_applied_recharge_units(dec!(5));
        params.rescale_bases(Decimal::ZERO, dec!(500)).unwrap();
        assert_eq!(params.recharge_base_population(dec!(1)), dec!(500));
        assert_eq!(params.applied_recharge_units, Decimal::ZERO);
    }

    #[test]
    fn base_rescaling_ignores_edits_within_tolerance() {
        let mut params = Parameterization::new();
        let _ = params.retirement_base_population(dec!(100));
        params.rescale_bases(dec!(100), dec!(100.00005)).unwrap();
        assert_eq!(params.retirement_base_population(dec!(0)), dec!(100));
    }

    #[test]
    fn reset_clears_bases_but_keeps_configuration() {
        let mut params = Parameterization::new();
        params
            .accumulate_recharge(dec!(10), Quantity::new(dec!(0.15), Units::KilogramsPerUnit))
            .unwrap();
        params.set_retirement_rate(dec!(5));
        params.mark_stream_enabled(StreamKind::Domestic).unwrap();
        let _ = params.recharge_base_population(dec!(1000));
        params.reset_state_at_timestep();
        assert_eq!(params.recharge_rate(), dec!(10));
        assert_eq!(params.retirement_rate(), dec!(5));
        assert!(params.is_enabled(StreamKind::Domestic));
        // Base re-captures from the new prior population.
        assert_eq!(params.recharge_base_population(dec!(2000)), dec!(2000));
    }
}
