//! The recalc pipeline.
//!
//! Each user operation triggers a fixed chain of recompute steps that keeps
//! sales, population, consumption, and emissions mutually consistent. Steps
//! are idempotent; plans re-run them freely after every command. With the
//! `optimize-recalcs` feature, a plan stops early once a step leaves the
//! stream bank untouched, since the remaining tail would recompute identical
//! values. Behavior is the same either way.

mod kit;
mod steps;

pub use kit::RecalcKit;
pub use steps::SalesDrive;

pub(crate) use steps::recharge_demand_view;

use primitives::EngineError;

/// One recompute strategy in a plan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecalcStep {
    /// Derive new equipment and the population identity from sales supply.
    PopulationChange,
    /// Derive virgin sales from the population trajectory.
    Sales(SalesDrive),
    /// Refresh the tCO2e consumption streams.
    Consumption,
    /// Recompute retirement, EOL recycling, and EOL emissions.
    Retire,
    /// Refresh recharge emissions.
    RechargeEmissions,
    /// Refresh EOL emissions.
    EolEmissions,
}

impl RecalcStep {
    /// Whether an unchanged outcome from this step proves the remaining
    /// tail redundant. True only for the upstream recomputes; the refresh
    /// steps (consumption, emissions) may change even when their
    /// predecessor did not, so they never gate.
    #[cfg(feature = "optimize-recalcs")]
    fn gates_tail(&self) -> bool {
        matches!(
            self,
            Self::PopulationChange | Self::Sales(_) | Self::Retire
        )
    }

    fn run(&self, kit: &mut RecalcKit<'_>) -> Result<(), EngineError> {
        let entry = kit.entry()?;
        match self {
            Self::PopulationChange => steps::population_change(entry),
            Self::Sales(drive) => steps::sales(entry, *drive),
            Self::Consumption => steps::consumption(entry),
            Self::Retire => steps::retire(entry),
            Self::RechargeEmissions => steps::recharge_emissions(entry),
            Self::EolEmissions => steps::eol_emissions(entry),
        }
    }
}

/// An ordered chain of recalc steps.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecalcPlan {
    steps: Vec<RecalcStep>,
}

impl RecalcPlan {
    /// A plan over the given steps, run in order.
    pub fn of(steps: &[RecalcStep]) -> Self {
        Self {
            steps: steps.to_vec(),
        }
    }

    /// The steps in execution order.
    pub fn steps(&self) -> &[RecalcStep] {
        &self.steps
    }

    /// Runs the plan against one substance.
    pub fn execute(&self, kit: &mut RecalcKit<'_>) -> Result<(), EngineError> {
        for step in &self.steps {
            #[cfg(feature = "optimize-recalcs")]
            let before = if step.gates_tail() {
                Some(kit.entry()?.streams.clone())
            } else {
                None
            };

            step.run(kit)?;

            #[cfg(feature = "optimize-recalcs")]
            if let Some(before) = before {
                if kit.entry()?.streams == before {
                    break;
                }
            }
        }
        Ok(())
    }
}
