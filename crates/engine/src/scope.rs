//! The engine's current location in the script.
//!
//! A scope is the (stanza, application, substance) triple the parser has
//! navigated into, plus the user-defined variables visible there. Two
//! reserved variables are computed from the engine year and refuse writes.

use primitives::{Decimal, EngineError, Quantity, SubstanceId, Units};
use std::collections::HashMap;

/// Reserved variable: years since the simulation start.
pub const YEARS_ELAPSED: &str = "yearsElapsed";
/// Reserved variable: the current calendar year.
pub const YEAR_ABSOLUTE: &str = "yearAbsolute";

/// Current stanza/application/substance position and variable namespace.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Scope {
    stanza: Option<String>,
    application: Option<String>,
    substance: Option<String>,
    variables: HashMap<String, Quantity>,
}

impl Scope {
    /// An empty scope outside any stanza.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enters a stanza, leaving any application and substance.
    pub fn enter_stanza(&mut self, name: impl Into<String>) {
        self.stanza = Some(name.into());
        self.application = None;
        self.substance = None;
    }

    /// Enters an application, leaving any substance.
    pub fn enter_application(&mut self, name: impl Into<String>) {
        self.application = Some(name.into());
        self.substance = None;
    }

    /// Enters a substance within the current application.
    pub fn enter_substance(&mut self, name: impl Into<String>) {
        self.substance = Some(name.into());
    }

    /// The current stanza, if any.
    pub fn stanza(&self) -> Option<&str> {
        self.stanza.as_deref()
    }

    /// The current application, if any.
    pub fn application(&self) -> Option<&str> {
        self.application.as_deref()
    }

    /// The current substance, if any.
    pub fn substance(&self) -> Option<&str> {
        self.substance.as_deref()
    }

    /// The substance key the scope points at, if both levels are set.
    pub fn substance_id(&self) -> Option<SubstanceId> {
        match (&self.application, &self.substance) {
            (Some(app), Some(sub)) => Some(SubstanceId::new(app.clone(), sub.clone())),
            _ => None,
        }
    }

    /// Defines or assigns a variable. Reserved names are rejected.
    pub fn set_variable(
        &mut self,
        name: impl Into<String>,
        value: Quantity,
    ) -> Result<(), EngineError> {
        let name = name.into();
        if name == YEARS_ELAPSED || name == YEAR_ABSOLUTE {
            return Err(EngineError::ReservedVariable { name });
        }
        self.variables.insert(name, value);
        Ok(())
    }

    /// Reads a variable. The reserved names resolve from the supplied year
    /// counters; unknown names are reported as an unknown stream to keep the
    /// error set closed.
    pub fn variable(
        &self,
        name: &str,
        years_elapsed: i32,
        year_absolute: i32,
    ) -> Result<Quantity, EngineError> {
        match name {
            YEARS_ELAPSED => Ok(Quantity::new(Decimal::from(years_elapsed), Units::Years)),
            YEAR_ABSOLUTE => Ok(Quantity::new(Decimal::from(year_absolute), Units::Years)),
            other => {
                self.variables
                    .get(other)
                    .copied()
                    .ok_or_else(|| EngineError::UnknownStream {
                        name: format!("variable {other}"),
                    })
            }
        }
    }
}
