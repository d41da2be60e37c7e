//! The bundle a recalc borrows for one operation.

use primitives::{EngineError, SubstanceId};
use state::{SimulationState, SubstanceState};

/// Borrowed handles a recalc plan runs against. Assembled per operation and
/// never stored; strategies reach the state only through it.
#[derive(Debug)]
pub struct RecalcKit<'a> {
    /// The simulation state being recomputed.
    pub state: &'a mut SimulationState,
    /// The substance the recalc applies to.
    pub key: &'a SubstanceId,
}

impl<'a> RecalcKit<'a> {
    /// Binds a state and substance for one operation.
    pub fn new(state: &'a mut SimulationState, key: &'a SubstanceId) -> Self {
        Self { state, key }
    }

    pub(crate) fn entry(&mut self) -> Result<&mut SubstanceState, EngineError> {
        self.state.substance_mut(self.key)
    }
}
