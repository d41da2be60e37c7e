//! The typed operation stream the parser feeds the engine.
//!
//! Every operation arrives with its primitive inputs already evaluated; no
//! expressions or probabilistic draws reach this layer. Operations execute
//! in the order supplied, and a failed operation aborts without leaving
//! partial state behind.

use crate::{DisplaceTarget, DisplacementKind, Engine, YearMatcher};
use primitives::{EngineError, Quantity, StreamKind};
use state::{AssumeMode, RecoveryStage};

/// One evaluated script operation.
#[derive(Clone, Debug, PartialEq)]
pub enum Operation {
    /// Enter a stanza.
    SetStanza(String),
    /// Enter an application.
    SetApplication(String),
    /// Enter a substance, optionally requiring it to already exist.
    SetSubstance {
        /// Substance name.
        name: String,
        /// Error on unknown (application, substance) instead of creating it.
        check_valid: bool,
    },
    /// Mark a sales stream writable.
    Enable {
        /// The stream to enable.
        stream: StreamKind,
        /// Years the enablement applies to.
        years: YearMatcher,
    },
    /// Set the GHG or energy intensity, by units.
    Equals {
        /// The intensity value.
        value: Quantity,
        /// Years the setting applies to.
        years: YearMatcher,
    },
    /// Set a sales stream's initial charge.
    InitialCharge {
        /// Charge per unit.
        value: Quantity,
        /// The sales stream charged.
        stream: StreamKind,
        /// Years the setting applies to.
        years: YearMatcher,
    },
    /// Accumulate recharge servicing.
    Recharge {
        /// Percent of the prior population serviced.
        volume: Quantity,
        /// Mass added per serviced unit.
        intensity: Quantity,
        /// Years the servicing applies to.
        years: YearMatcher,
    },
    /// Set the retirement rate.
    Retire {
        /// Annual hazard rate.
        rate: Quantity,
        /// Retired units are replaced without population loss.
        with_replacement: bool,
        /// Years the rate applies to.
        years: YearMatcher,
    },
    /// Accumulate recovery and yield for a recycling stage.
    Recycle {
        /// Percent of available mass captured.
        recovery: Quantity,
        /// Percent of captured mass reusable.
        reuse_yield: Quantity,
        /// The capture stage.
        stage: RecoveryStage,
        /// Years the program applies to.
        years: YearMatcher,
    },
    /// Set a stage's induction rate.
    SetInduction {
        /// Share of recycled mass that adds to demand.
        rate: Quantity,
        /// The capture stage.
        stage: RecoveryStage,
    },
    /// Set how sales carry over without fresh input.
    SetAssume {
        /// The carry-over mode.
        mode: AssumeMode,
        /// Years the mode applies to.
        years: YearMatcher,
    },
    /// Write a stream.
    Set {
        /// The stream to write.
        stream: StreamKind,
        /// The value, in any convertible units or percent.
        value: Quantity,
        /// Years the write applies to.
        years: YearMatcher,
    },
    /// Apply a delta to a stream.
    Change {
        /// The stream to adjust.
        stream: StreamKind,
        /// Signed delta, absolute or percent.
        delta: Quantity,
        /// Years the adjustment applies to.
        years: YearMatcher,
    },
    /// Upper-bound a stream, optionally displacing the excess.
    Cap {
        /// The stream to limit.
        stream: StreamKind,
        /// The bound.
        amount: Quantity,
        /// Years the bound applies to.
        years: YearMatcher,
        /// Where the removed mass goes.
        displace: Option<DisplaceTarget>,
        /// How the displaced mass converts.
        kind: DisplacementKind,
    },
    /// Lower-bound a stream, optionally pulling from the target.
    Floor {
        /// The stream to limit.
        stream: StreamKind,
        /// The bound.
        amount: Quantity,
        /// Years the bound applies to.
        years: YearMatcher,
        /// Where the added mass comes from.
        displace: Option<DisplaceTarget>,
        /// How the displaced mass converts.
        kind: DisplacementKind,
    },
    /// Move mass to a sibling substance.
    Replace {
        /// How much moves.
        amount: Quantity,
        /// The stream it moves on.
        stream: StreamKind,
        /// The receiving substance.
        destination: String,
        /// Years the replacement applies to.
        years: YearMatcher,
    },
    /// Advance to the next simulated year.
    IncrementYear,
}

impl Engine {
    /// Executes one operation.
    pub fn execute(&mut self, op: &Operation) -> Result<(), EngineError> {
        match op {
            Operation::SetStanza(name) => {
                self.set_stanza(name);
                Ok(())
            }
            Operation::SetApplication(name) => {
                self.set_application(name);
                Ok(())
            }
            Operation::SetSubstance { name, check_valid } => {
                self.set_substance(name, *check_valid)
            }
            Operation::Enable { stream, years } => self.enable(*stream, *years),
            Operation::Equals { value, years } => self.equals(*value, *years),
            Operation::InitialCharge {
                value,
                stream,
                years,
            } => self.set_initial_charge(*value, *stream, *years),
            Operation::Recharge {
                volume,
                intensity,
                years,
            } => self.recharge(*volume, *intensity, *years),
            Operation::Retire {
                rate,
                with_replacement,
                years,
            } => self.retire(*rate, *with_replacement, *years),
            Operation::Recycle {
                recovery,
                reuse_yield,
                stage,
                years,
            } => self.recycle(*recovery, *reuse_yield, *stage, *years),
            Operation::SetInduction { rate, stage } => self.set_induction_rate(*rate, *stage),
            Operation::SetAssume { mode, years } => self.set_assume(*mode, *years),
            Operation::Set {
                stream,
                value,
                years,
            } => self.set_stream(*stream, *value, *years),
            Operation::Change {
                stream,
                delta,
                years,
            } => self.change_stream(*stream, *delta, *years),
            Operation::Cap {
                stream,
                amount,
                years,
                displace,
                kind,
            } => self.cap(*stream, *amount, *years, displace.clone(), *kind),
            Operation::Floor {
                stream,
                amount,
                years,
                displace,
                kind,
            } => self.floor(*stream, *amount, *years, displace.clone(), *kind),
            Operation::Replace {
                amount,
                stream,
                destination,
                years,
            } => self.replace(*amount, *stream, destination, *years),
            Operation::IncrementYear => self.increment_year(),
        }
    }

    /// Executes a sequence of operations, stopping at the first error.
    pub fn execute_all<'a>(
        &mut self,
        ops: impl IntoIterator<Item = &'a Operation>,
    ) -> Result<(), EngineError> {
        for op in ops {
            self.execute(op)?;
        }
        Ok(())
    }
}
