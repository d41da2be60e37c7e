//! Per-substance stream storage.

use primitives::{dec_add, Decimal, EngineError, Quantity, StreamKind};

/// The stored streams of one substance.
///
/// Amounts are kept as bare decimals in each stream's canonical units
/// (kg for flows, units for populations, tCO2e for emissions, years for
/// age). The derived streams `sales`, `recycle`, and `induction` have no
/// field here; [`StreamBank::get`] sums them from their components so the
/// `sales = domestic + import + recycle` identity holds by construction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StreamBank {
    domestic: Decimal,
    import: Decimal,
    export: Decimal,
    recycle_recharge: Decimal,
    recycle_eol: Decimal,
    induction_recharge: Decimal,
    induction_eol: Decimal,
    equipment: Decimal,
    prior_equipment: Decimal,
    new_equipment: Decimal,
    retired: Decimal,
    prior_retired: Decimal,
    recharge_emissions: Decimal,
    eol_emissions: Decimal,
    implicit_recharge: Decimal,
    age: Decimal,
    domestic_consumption: Decimal,
    import_consumption: Decimal,
    export_consumption: Decimal,
    recycle_consumption: Decimal,
}

impl StreamBank {
    /// A bank with every stream zero-initialized.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw amount of a stream in its canonical units. Derived streams are
    /// summed from their components.
    pub fn amount(&self, kind: StreamKind) -> Decimal {
        match kind {
            StreamKind::Domestic => self.domestic,
            StreamKind::Import => self.import,
            StreamKind::Export => self.export,
            StreamKind::Sales => self.domestic + self.import + self.recycle_total(),
            StreamKind::RecycleRecharge => self.recycle_recharge,
            StreamKind::RecycleEol => self.recycle_eol,
            StreamKind::Recycle => self.recycle_total(),
            StreamKind::InductionRecharge => self.induction_recharge,
            StreamKind::InductionEol => self.induction_eol,
            StreamKind::Induction => self.induction_recharge + self.induction_eol,
            StreamKind::Equipment => self.equipment,
            StreamKind::PriorEquipment => self.prior_equipment,
            StreamKind::NewEquipment => self.new_equipment,
            StreamKind::Retired => self.retired,
            StreamKind::PriorRetired => self.prior_retired,
            StreamKind::RechargeEmissions => self.recharge_emissions,
            StreamKind::EolEmissions => self.eol_emissions,
            StreamKind::ImplicitRecharge => self.implicit_recharge,
            StreamKind::Age => self.age,
            StreamKind::DomesticConsumption => self.domestic_consumption,
            StreamKind::ImportConsumption => self.import_consumption,
            StreamKind::ExportConsumption => self.export_consumption,
            StreamKind::RecycleConsumption => self.recycle_consumption,
        }
    }

    /// A stream as a [`Quantity`] in its canonical units.
    pub fn get(&self, kind: StreamKind) -> Quantity {
        Quantity::new(self.amount(kind), kind.canonical_units())
    }

    /// Overwrites a stored stream. Derived streams cannot be written here;
    /// callers split them into components first.
    pub fn set(&mut self, kind: StreamKind, amount: Decimal) -> Result<(), EngineError> {
        let slot = match kind {
            StreamKind::Domestic => &mut self.domestic,
            StreamKind::Import => &mut self.import,
            StreamKind::Export => &mut self.export,
            StreamKind::RecycleRecharge => &mut self.recycle_recharge,
            StreamKind::RecycleEol => &mut self.recycle_eol,
            StreamKind::InductionRecharge => &mut self.induction_recharge,
            StreamKind::InductionEol => &mut self.induction_eol,
            StreamKind::Equipment => &mut self.equipment,
            StreamKind::PriorEquipment => &mut self.prior_equipment,
            StreamKind::NewEquipment => &mut self.new_equipment,
            StreamKind::Retired => &mut self.retired,
            StreamKind::PriorRetired => &mut self.prior_retired,
            StreamKind::RechargeEmissions => &mut self.recharge_emissions,
            StreamKind::EolEmissions => &mut self.eol_emissions,
            StreamKind::ImplicitRecharge => &mut self.implicit_recharge,
            StreamKind::Age => &mut self.age,
            StreamKind::DomesticConsumption => &mut self.domestic_consumption,
            StreamKind::ImportConsumption => &mut self.import_consumption,
            StreamKind::ExportConsumption => &mut self.export_consumption,
            StreamKind::RecycleConsumption => &mut self.recycle_consumption,
            StreamKind::Sales | StreamKind::Recycle | StreamKind::Induction => {
                return Err(EngineError::UnknownStream {
                    name: format!("{kind} (derived; write its components)"),
                })
            }
        };
        *slot = amount;
        Ok(())
    }

    /// Adds to a stored stream.
    pub fn add(&mut self, kind: StreamKind, delta: Decimal) -> Result<(), EngineError> {
        let current = self.amount(kind);
        self.set(kind, dec_add(current, delta)?)
    }

    #[inline]
    fn recycle_total(&self) -> Decimal {
        self.recycle_recharge + self.recycle_eol
    }
}
