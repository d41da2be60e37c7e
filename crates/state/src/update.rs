//! The single mutation input for stream writes.

use crate::SalesDistribution;
use primitives::{Quantity, StreamKind, SubstanceId};

/// Inputs to [`SimulationState::update`](crate::SimulationState::update).
///
/// Plain data with defaulted optional fields; construct with
/// [`StateUpdate::new`] and override what the call needs.
#[derive(Clone, Debug, PartialEq)]
pub struct StateUpdate {
    /// Substance the write targets.
    pub key: SubstanceId,
    /// Stream the write targets.
    pub stream: StreamKind,
    /// The value to write, in any convertible units.
    pub value: Quantity,
    /// For `domestic`/`import`: net out the substream's pro-rata share of
    /// recycled supply before storing.
    pub subtract_recycling: bool,
    /// Pre-computed split for `sales` writes; built from current state when
    /// absent.
    pub distribution: Option<SalesDistribution>,
    /// For `priorEquipment`: rescale captured retirement/recharge bases to
    /// the new magnitude.
    pub invalidates_prior_equipment: bool,
    /// Internal displacement paths may drive a stream below zero; user
    /// writes clamp at zero with a warning.
    pub negative_allowed: bool,
}

impl StateUpdate {
    /// A direct write with every optional behavior off.
    pub fn new(key: SubstanceId, stream: StreamKind, value: Quantity) -> Self {
        Self {
            key,
            stream,
            value,
            subtract_recycling: false,
            distribution: None,
            invalidates_prior_equipment: false,
            negative_allowed: false,
        }
    }
}
