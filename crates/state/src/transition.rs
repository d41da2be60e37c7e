//! End-of-year bookkeeping.
//!
//! `advance_year` runs exactly once between the last command of year N and
//! the first command of year N+1, in a fixed order: the year counter, the
//! prior rolls and age update, the parameterization reset, the recycling
//! redistribution back to virgin sales, the induction subtraction, and the
//! zeroing of the per-year recycling streams.

use crate::{AssumeMode, SalesDistribution, SimulationState};
use primitives::{dec_add, dec_div, dec_mul, dec_sub, Decimal, EngineError, StreamKind};

impl SimulationState {
    /// Advances to the next year. Fails with
    /// [`EngineError::RangeExhausted`] past the configured end year.
    pub fn advance_year(&mut self) -> Result<(), EngineError> {
        self.bump_year()?;

        for (_, entry) in self.iter_mut() {
            let bank = &mut entry.streams;
            let params = &mut entry.params;

            // Age is the mean of survivors aged one year and this year's
            // additions at age one, weighted by their populations. Uses the
            // pre-roll prior so "additions" means net growth over last year.
            let old_prior = bank.amount(StreamKind::PriorEquipment);
            let equipment = bank.amount(StreamKind::Equipment);
            let added = dec_sub(equipment, old_prior)?.max(Decimal::ZERO);
            let weight = dec_add(old_prior, added)?;
            if !weight.is_zero() {
                let aged = dec_add(bank.amount(StreamKind::Age), Decimal::ONE)?;
                let mix = dec_add(dec_mul(old_prior, aged)?, added)?;
                bank.set(StreamKind::Age, dec_div(mix, weight)?)?;
            }

            // Roll stocks; the per-year flow counters restart so the
            // equipment identity holds before any command runs.
            bank.set(StreamKind::PriorEquipment, equipment)?;
            bank.set(StreamKind::PriorRetired, bank.amount(StreamKind::Retired))?;
            bank.set(StreamKind::Retired, Decimal::ZERO)?;
            bank.set(StreamKind::NewEquipment, Decimal::ZERO)?;
            bank.set(StreamKind::ImplicitRecharge, Decimal::ZERO)?;

            params.reset_state_at_timestep();

            let recycle = bank.amount(StreamKind::Recycle);
            let carries_sales = params.assume_mode() == AssumeMode::Continued;

            // Recycled supply folds back into the virgin baseline so a
            // later stop of recycling does not leave next year's carry-over
            // short of the user's intended material availability.
            if carries_sales
                && !recycle.is_zero()
                && params.has_any_sales_enabled()
                && params.sales_user_specified()
            {
                let dist = SalesDistribution::for_substance(bank, params, false);
                bank.add(StreamKind::Domestic, dec_mul(recycle, dist.domestic)?)?;
                bank.add(StreamKind::Import, dec_mul(recycle, dist.import)?)?;
            }

            // Induced demand must not compound across years; take it back
            // out of the virgin streams pro-rata, flooring at zero.
            let induction = bank.amount(StreamKind::Induction);
            if !induction.is_zero() {
                let domestic = bank.amount(StreamKind::Domestic);
                let import = bank.amount(StreamKind::Import);
                let total = dec_add(domestic, import)?;
                if !total.is_zero() {
                    let from_domestic = dec_mul(induction, dec_div(domestic, total)?)?;
                    let from_import = dec_sub(induction, from_domestic)?;
                    bank.set(
                        StreamKind::Domestic,
                        dec_sub(domestic, from_domestic)?.max(Decimal::ZERO),
                    )?;
                    bank.set(
                        StreamKind::Import,
                        dec_sub(import, from_import)?.max(Decimal::ZERO),
                    )?;
                }
            }

            bank.set(StreamKind::RecycleRecharge, Decimal::ZERO)?;
            bank.set(StreamKind::RecycleEol, Decimal::ZERO)?;
            bank.set(StreamKind::InductionRecharge, Decimal::ZERO)?;
            bank.set(StreamKind::InductionEol, Decimal::ZERO)?;

            if !carries_sales {
                bank.set(StreamKind::Domestic, Decimal::ZERO)?;
                bank.set(StreamKind::Import, Decimal::ZERO)?;
                bank.set(StreamKind::Export, Decimal::ZERO)?;
            }

            params.capture_year_start(
                bank.amount(StreamKind::Domestic),
                bank.amount(StreamKind::Import),
                bank.amount(StreamKind::Export),
                bank.amount(StreamKind::Sales),
            );
        }
        Ok(())
    }
}
