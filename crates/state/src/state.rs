//! The keyed simulation state.

use crate::{
    convert::{self, ConverterStateGetter, OverridingStateGetter},
    Parameterization, SalesDistribution, StateUpdate, StreamBank,
};
use indexmap::IndexMap;
use primitives::{
    dec_div, dec_mul, dec_sub, Decimal, EngineError, Quantity, StreamKind, SubstanceId,
    UnitFamily, Units,
};

/// One substance's streams and parameterization.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SubstanceState {
    /// Stored stream values.
    pub streams: StreamBank,
    /// Configuration and stepwise state.
    pub params: Parameterization,
}

impl SubstanceState {
    /// Mass per equipment unit amortized across the enabled sales
    /// substreams, kg/unit.
    ///
    /// Weighted by each substream's current kg when any mass is present;
    /// otherwise the plain mean of the non-zero charges. Exports are
    /// excluded: exported units never join the domestic population.
    pub fn amortized_charge(&self) -> Result<Decimal, EngineError> {
        let pairs = [
            (
                self.streams.amount(StreamKind::Domestic),
                self.params
                    .initial_charge(StreamKind::Domestic)?
                    .amount(),
            ),
            (
                self.streams.amount(StreamKind::Import),
                self.params.initial_charge(StreamKind::Import)?.amount(),
            ),
        ];
        let mass: Decimal = pairs.iter().map(|(kg, _)| *kg).sum();
        if !mass.is_zero() {
            let mut weighted = Decimal::ZERO;
            for (kg, charge) in pairs {
                weighted += dec_mul(kg, charge)?;
            }
            return dec_div(weighted, mass);
        }
        let non_zero: Vec<Decimal> = pairs
            .iter()
            .map(|(_, charge)| *charge)
            .filter(|charge| !charge.is_zero())
            .collect();
        if non_zero.is_empty() {
            return Ok(Decimal::ZERO);
        }
        let sum: Decimal = non_zero.iter().sum();
        dec_div(sum, Decimal::from(non_zero.len() as u32))
    }

    /// A converter context view over this substance.
    pub fn view(&self) -> SubstanceView<'_> {
        SubstanceView { state: self }
    }
}

/// Converter context resolved against one substance.
#[derive(Debug)]
pub struct SubstanceView<'a> {
    state: &'a SubstanceState,
}

impl ConverterStateGetter for SubstanceView<'_> {
    fn ghg_intensity(&self) -> Quantity {
        self.state.params.ghg_intensity()
    }

    fn energy_intensity(&self) -> Option<Quantity> {
        self.state.params.energy_intensity()
    }

    fn amortized_unit_volume(&self) -> Quantity {
        let charge = self.state.amortized_charge().unwrap_or(Decimal::ZERO);
        Quantity::new(charge, Units::KilogramsPerUnit)
    }

    fn population(&self) -> Quantity {
        self.state.streams.get(StreamKind::Equipment)
    }
}

/// The store of every substance's streams plus the year counters.
///
/// One instance per engine; mutated through [`SimulationState::update`] and
/// read through [`SimulationState::stream`]. Iteration order is insertion
/// order, keeping transitions and result extraction reproducible.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SimulationState {
    substances: IndexMap<SubstanceId, SubstanceState>,
    current_year: i32,
    start_year: i32,
    end_year: i32,
}

impl SimulationState {
    /// A state positioned at `start_year` with no substances.
    pub fn new(start_year: i32, end_year: i32) -> Self {
        Self {
            substances: IndexMap::new(),
            current_year: start_year,
            start_year,
            end_year,
        }
    }

    /// The year currently being simulated.
    #[inline]
    pub fn current_year(&self) -> i32 {
        self.current_year
    }

    /// The first simulated year.
    #[inline]
    pub fn start_year(&self) -> i32 {
        self.start_year
    }

    /// The last simulated year.
    #[inline]
    pub fn end_year(&self) -> i32 {
        self.end_year
    }

    /// Years since the start year.
    #[inline]
    pub fn years_elapsed(&self) -> i32 {
        self.current_year - self.start_year
    }

    pub(crate) fn bump_year(&mut self) -> Result<(), EngineError> {
        if self.current_year >= self.end_year {
            return Err(EngineError::RangeExhausted {
                year: self.current_year,
                end_year: self.end_year,
            });
        }
        self.current_year += 1;
        Ok(())
    }

    /// Creates the substance with zeroed streams if it does not exist.
    /// Idempotent.
    pub fn ensure_substance(&mut self, key: &SubstanceId) {
        self.substances.entry(key.clone()).or_default();
    }

    /// Whether the substance has been registered.
    pub fn contains(&self, key: &SubstanceId) -> bool {
        self.substances.contains_key(key)
    }

    /// The substance's state.
    pub fn substance(&self, key: &SubstanceId) -> Result<&SubstanceState, EngineError> {
        self.substances
            .get(key)
            .ok_or_else(|| EngineError::UnknownSubstance {
                application: key.application().to_string(),
                substance: key.substance().to_string(),
            })
    }

    /// The substance's state, mutably.
    pub fn substance_mut(&mut self, key: &SubstanceId) -> Result<&mut SubstanceState, EngineError> {
        self.substances
            .get_mut(key)
            .ok_or_else(|| EngineError::UnknownSubstance {
                application: key.application().to_string(),
                substance: key.substance().to_string(),
            })
    }

    /// Reads a stream in its canonical units; derived streams are summed.
    pub fn stream(&self, key: &SubstanceId, kind: StreamKind) -> Result<Quantity, EngineError> {
        Ok(self.substance(key)?.streams.get(kind))
    }

    /// Iterates substances in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&SubstanceId, &SubstanceState)> {
        self.substances.iter()
    }

    /// Iterates substances mutably in insertion order.
    pub(crate) fn iter_mut(
        &mut self,
    ) -> impl Iterator<Item = (&SubstanceId, &mut SubstanceState)> {
        self.substances.iter_mut()
    }

    /// Substance keys registered for an application.
    pub fn substances_in(&self, application: &str) -> Vec<SubstanceId> {
        self.substances
            .keys()
            .filter(|key| key.application() == application)
            .cloned()
            .collect()
    }

    /// The user-facing write path: rejects non-zero writes to sales streams
    /// that were never enabled, then applies the update.
    pub fn set_stream_checked(&mut self, update: StateUpdate) -> Result<(), EngineError> {
        let entry = self.substance(&update.key)?;
        let non_zero = !update.value.is_zero();
        if non_zero {
            let blocked = match update.stream {
                kind if kind.requires_enable() => !entry.params.is_enabled(kind),
                StreamKind::Sales => !entry.params.has_any_sales_enabled(),
                _ => false,
            };
            if blocked {
                return Err(EngineError::StreamNotEnabled {
                    stream: update.stream,
                });
            }
        }
        self.update(update)
    }

    /// The single mutation entry-point for stream writes.
    ///
    /// Branches per the stream and flags: `sales` splits its virgin portion
    /// across the distribution, `recycle` splits proportionally into its
    /// stage components, `domestic`/`import` optionally net out recycled
    /// supply, and `priorEquipment` edits rescale captured bases.
    pub fn update(&mut self, update: StateUpdate) -> Result<(), EngineError> {
        let StateUpdate {
            key,
            stream,
            value,
            subtract_recycling,
            distribution,
            invalidates_prior_equipment,
            negative_allowed,
        } = update;

        let entry = self.substance_mut(&key)?;
        let amount = normalize_for_stream(entry, stream, &value)?;

        match stream {
            StreamKind::Sales => {
                let dist = distribution.unwrap_or_else(|| {
                    SalesDistribution::for_substance(&entry.streams, &entry.params, false)
                });
                let recycle = entry.streams.amount(StreamKind::Recycle);
                let virgin = clamp_write(
                    StreamKind::Sales,
                    dec_sub(amount, recycle)?,
                    negative_allowed,
                );
                let domestic = dec_mul(virgin, dist.domestic)?;
                let import = dec_mul(virgin, dist.import)?;
                entry.streams.set(StreamKind::Domestic, domestic)?;
                entry.streams.set(StreamKind::Import, import)?;
            }
            StreamKind::Recycle => {
                let recharge = entry.streams.amount(StreamKind::RecycleRecharge);
                let eol = entry.streams.amount(StreamKind::RecycleEol);
                let total = recharge + eol;
                let amount = clamp_write(stream, amount, negative_allowed);
                let (to_recharge, to_eol) = if total.is_zero() {
                    let half = dec_div(amount, Decimal::TWO)?;
                    (half, dec_sub(amount, half)?)
                } else {
                    let to_recharge = dec_mul(amount, dec_div(recharge, total)?)?;
                    (to_recharge, dec_sub(amount, to_recharge)?)
                };
                entry.streams.set(StreamKind::RecycleRecharge, to_recharge)?;
                entry.streams.set(StreamKind::RecycleEol, to_eol)?;
            }
            StreamKind::Domestic | StreamKind::Import if subtract_recycling => {
                let dist = distribution.unwrap_or_else(|| {
                    SalesDistribution::for_substance(&entry.streams, &entry.params, false)
                });
                let recycle = entry.streams.amount(StreamKind::Recycle);
                let share = dec_mul(recycle, dist.fraction(stream))?;
                let netted = dec_sub(amount, share)?;
                let stored = clamp_write(stream, netted, negative_allowed);
                entry.streams.set(stream, stored)?;
            }
            StreamKind::PriorEquipment => {
                let old = entry.streams.amount(StreamKind::PriorEquipment);
                let stored = clamp_write(stream, amount, negative_allowed);
                entry.streams.set(stream, stored)?;
                if invalidates_prior_equipment {
                    entry.params.rescale_bases(old, stored)?;
                }
            }
            _ => {
                let stored = clamp_write(stream, amount, negative_allowed);
                entry.streams.set(stream, stored)?;
            }
        }
        Ok(())
    }
}

/// Clamps a negative write to zero unless the caller allows it, warning
/// through the structured sink.
fn clamp_write(stream: StreamKind, amount: Decimal, negative_allowed: bool) -> Decimal {
    if negative_allowed || amount.is_sign_positive() || amount.is_zero() {
        amount
    } else {
        tracing::warn!(stream = %stream, amount = %amount, "negative stream value clamped to zero");
        Decimal::ZERO
    }
}

/// Converts an incoming value to the stream's canonical units.
///
/// Unit-based writes to sales streams convert through the stream's own
/// initial charge (pinned via an overriding getter); emissions-based writes
/// to volume streams divide by the GWP. Percent values never reach this
/// layer; operations resolve them first.
fn normalize_for_stream(
    entry: &SubstanceState,
    stream: StreamKind,
    value: &Quantity,
) -> Result<Decimal, EngineError> {
    let canonical = stream.canonical_units();
    if value.units() == canonical {
        return Ok(value.amount());
    }
    if value.units().is_percent() {
        return Err(EngineError::UnitMismatch {
            from: value.units().as_str().to_string(),
            to: canonical.as_str().to_string(),
        });
    }
    let view = entry.view();
    if value.units().family() == UnitFamily::Population
        && canonical.family() == UnitFamily::Volume
        && (stream.is_sales_substream() || stream == StreamKind::Sales)
    {
        let charge = match stream {
            StreamKind::Sales => view.amortized_unit_volume(),
            substream => entry.params.initial_charge(substream)?,
        };
        if charge.amount().is_zero() {
            return Err(EngineError::UnitMismatch {
                from: value.units().as_str().to_string(),
                to: format!("{canonical} (initial charge of {stream} is zero)"),
            });
        }
        let pinned = OverridingStateGetter::with_unit_volume(&view, charge);
        return Ok(convert::convert(value, canonical, &pinned)?.amount());
    }
    Ok(convert::convert(value, canonical, &view)?.amount())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn key() -> SubstanceId {
        SubstanceId::new("Domestic Refrigeration", "HFC-134a")
    }

    fn state_with_substance() -> SimulationState {
        let mut state = SimulationState::new(2025, 2035);
        state.ensure_substance(&key());
        state
    }

    #[test]
    fn ensure_is_idempotent() {
        let mut state = state_with_substance();
        state
            .substance_mut(&key())
            .unwrap()
            .streams
            .set(StreamKind::Domestic, dec!(10))
            .unwrap();
        state.ensure_substance(&key());
        assert_eq!(
            state.stream(&key(), StreamKind::Domestic).unwrap().amount(),
            dec!(10)
        );
    }

    #[test]
    fn unknown_substance_reads_fail() {
        let state = SimulationState::new(2025, 2030);
        assert!(matches!(
            state.stream(&key(), StreamKind::Domestic),
            Err(EngineError::UnknownSubstance { .. })
        ));
    }

    #[test]
    fn direct_write_bypasses_recycling_netting() {
        let mut state = state_with_substance();
        state
            .substance_mut(&key())
            .unwrap()
            .streams
            .set(StreamKind::RecycleEol, dec!(5))
            .unwrap();
        let update = StateUpdate::new(
            key(),
            StreamKind::Domestic,
            Quantity::new(dec!(100), Units::Kilograms),
        );
        state.update(update).unwrap();
        assert_eq!(
            state.stream(&key(), StreamKind::Domestic).unwrap().amount(),
            dec!(100)
        );
    }

    #[test]
    fn netted_write_subtracts_the_pro_rata_recycle_share() {
        let mut state = state_with_substance();
        {
            let entry = state.substance_mut(&key()).unwrap();
            entry.params.mark_stream_enabled(StreamKind::Domestic).unwrap();
            entry.streams.set(StreamKind::RecycleEol, dec!(5)).unwrap();
        }
        let mut update = StateUpdate::new(
            key(),
            StreamKind::Domestic,
            Quantity::new(dec!(100), Units::Kilograms),
        );
        update.subtract_recycling = true;
        state.update(update).unwrap();
        // Only domestic is enabled, so it carries the whole recycle share.
        assert_eq!(
            state.stream(&key(), StreamKind::Domestic).unwrap().amount(),
            dec!(95)
        );
    }

    #[test]
    fn sales_write_splits_virgin_mass_by_distribution() {
        let mut state = state_with_substance();
        {
            let entry = state.substance_mut(&key()).unwrap();
            entry.params.mark_stream_enabled(StreamKind::Domestic).unwrap();
            entry.params.mark_stream_enabled(StreamKind::Import).unwrap();
            entry.streams.set(StreamKind::Domestic, dec!(30)).unwrap();
            entry.streams.set(StreamKind::Import, dec!(10)).unwrap();
            entry.streams.set(StreamKind::RecycleEol, dec!(20)).unwrap();
        }
        let update = StateUpdate::new(
            key(),
            StreamKind::Sales,
            Quantity::new(dec!(120), Units::Kilograms),
        );
        state.update(update).unwrap();
        // Virgin = 120 - 20 recycled; split 75/25.
        assert_eq!(
            state.stream(&key(), StreamKind::Domestic).unwrap().amount(),
            dec!(75)
        );
        assert_eq!(
            state.stream(&key(), StreamKind::Import).unwrap().amount(),
            dec!(25)
        );
        assert_eq!(
            state.stream(&key(), StreamKind::Sales).unwrap().amount(),
            dec!(120)
        );
    }

    #[test]
    fn recycle_write_splits_fifty_fifty_when_empty() {
        let mut state = state_with_substance();
        let update = StateUpdate::new(
            key(),
            StreamKind::Recycle,
            Quantity::new(dec!(10), Units::Kilograms),
        );
        state.update(update).unwrap();
        assert_eq!(
            state
                .stream(&key(), StreamKind::RecycleRecharge)
                .unwrap()
                .amount(),
            dec!(5)
        );
        assert_eq!(
            state.stream(&key(), StreamKind::RecycleEol).unwrap().amount(),
            dec!(5)
        );
    }

    #[test]
    fn recycle_write_splits_proportionally_when_present() {
        let mut state = state_with_substance();
        {
            let entry = state.substance_mut(&key()).unwrap();
            entry.streams.set(StreamKind::RecycleRecharge, dec!(3)).unwrap();
            entry.streams.set(StreamKind::RecycleEol, dec!(1)).unwrap();
        }
        let update = StateUpdate::new(
            key(),
            StreamKind::Recycle,
            Quantity::new(dec!(8), Units::Kilograms),
        );
        state.update(update).unwrap();
        assert_eq!(
            state
                .stream(&key(), StreamKind::RecycleRecharge)
                .unwrap()
                .amount(),
            dec!(6)
        );
        assert_eq!(
            state.stream(&key(), StreamKind::RecycleEol).unwrap().amount(),
            dec!(2)
        );
    }

    #[test]
    fn unit_based_sales_write_requires_initial_charge() {
        let mut state = state_with_substance();
        let update = StateUpdate::new(
            key(),
            StreamKind::Domestic,
            Quantity::new(dec!(100), Units::EquipmentUnits),
        );
        assert!(matches!(
            state.update(update),
            Err(EngineError::UnitMismatch { .. })
        ));

        state
            .substance_mut(&key())
            .unwrap()
            .params
            .set_initial_charge(
                StreamKind::Domestic,
                Quantity::new(dec!(0.15), Units::KilogramsPerUnit),
            )
            .unwrap();
        let update = StateUpdate::new(
            key(),
            StreamKind::Domestic,
            Quantity::new(dec!(100), Units::EquipmentUnits),
        );
        state.update(update).unwrap();
        assert_eq!(
            state.stream(&key(), StreamKind::Domestic).unwrap().amount(),
            dec!(15)
        );
    }

    #[test]
    fn enable_gate_blocks_only_non_zero_writes() {
        let mut state = state_with_substance();
        let zero = StateUpdate::new(
            key(),
            StreamKind::Import,
            Quantity::new(dec!(0), Units::Kilograms),
        );
        state.set_stream_checked(zero).unwrap();

        let non_zero = StateUpdate::new(
            key(),
            StreamKind::Import,
            Quantity::new(dec!(5), Units::Kilograms),
        );
        assert!(matches!(
            state.set_stream_checked(non_zero.clone()),
            Err(EngineError::StreamNotEnabled { .. })
        ));

        state
            .substance_mut(&key())
            .unwrap()
            .params
            .mark_stream_enabled(StreamKind::Import)
            .unwrap();
        state.set_stream_checked(non_zero).unwrap();
        assert_eq!(
            state.stream(&key(), StreamKind::Import).unwrap().amount(),
            dec!(5)
        );
    }

    #[test]
    fn prior_equipment_edit_rescales_bases() {
        let mut state = state_with_substance();
        {
            let entry = state.substance_mut(&key()).unwrap();
            entry.streams.set(StreamKind::PriorEquipment, dec!(1000)).unwrap();
            let _ = entry.params.retirement_base_population(dec!(1000));
            entry.params.set_applied_retirement_units(dec!(50));
        }
        let mut update = StateUpdate::new(
            key(),
            StreamKind::PriorEquipment,
            Quantity::new(dec!(2000), Units::EquipmentUnits),
        );
        update.invalidates_prior_equipment = true;
        state.update(update).unwrap();
        let entry = state.substance_mut(&key()).unwrap();
        assert_eq!(entry.params.retirement_base_population(dec!(0)), dec!(2000));
    }

    #[test]
    fn negative_user_writes_clamp_to_zero() {
        let mut state = state_with_substance();
        let update = StateUpdate::new(
            key(),
            StreamKind::Domestic,
            Quantity::new(dec!(-10), Units::Kilograms),
        );
        state.update(update).unwrap();
        assert!(state
            .stream(&key(), StreamKind::Domestic)
            .unwrap()
            .is_zero());
    }
}
