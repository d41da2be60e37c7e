//! Substance identity.

use core::fmt;

/// Key of a substance within the simulation: the (application, substance)
/// pair. Cross-substance operations reach other substances in the same
/// application.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SubstanceId {
    application: String,
    substance: String,
}

impl SubstanceId {
    /// Creates a key from an application and substance name.
    pub fn new(application: impl Into<String>, substance: impl Into<String>) -> Self {
        Self {
            application: application.into(),
            substance: substance.into(),
        }
    }

    /// The application (sector) name.
    #[inline]
    pub fn application(&self) -> &str {
        &self.application
    }

    /// The substance name.
    #[inline]
    pub fn substance(&self) -> &str {
        &self.substance
    }

    /// A key for a different substance in the same application.
    pub fn sibling(&self, substance: impl Into<String>) -> Self {
        Self {
            application: self.application.clone(),
            substance: substance.into(),
        }
    }
}

impl fmt::Display for SubstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}", self.application, self.substance)
    }
}
