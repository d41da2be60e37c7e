//! Engine error kinds.

use crate::StreamKind;
use core::fmt;
use rust_decimal::Decimal;

/// Failure modes of the simulation engine.
///
/// Every error aborts the user operation that raised it before any state
/// mutation becomes visible.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EngineError {
    /// Scope switched with `check_valid` to an unregistered pair.
    UnknownSubstance {
        /// Application named by the scope switch.
        application: String,
        /// Substance named by the scope switch.
        substance: String,
    },
    /// Non-zero write to a sales stream that was never `enable`d.
    StreamNotEnabled {
        /// The stream the write targeted.
        stream: StreamKind,
    },
    /// Stream name absent from the canonical table, or a stream that user
    /// operations may not write to.
    UnknownStream {
        /// The offending name.
        name: String,
    },
    /// No conversion path between the units, or the conversion requires
    /// context (GWP, initial charge, population) that is zero or missing.
    UnitMismatch {
        /// Source units or token.
        from: String,
        /// Requested target.
        to: String,
    },
    /// Attempt to define or assign `yearsElapsed` / `yearAbsolute`.
    ReservedVariable {
        /// The reserved name.
        name: String,
    },
    /// A `replace` names the substance currently in scope as its destination.
    SelfReplacement {
        /// The substance named twice.
        substance: String,
    },
    /// A cap/floor displacement names the stream being limited as its target.
    SelfDisplacement {
        /// The stream named twice.
        stream: StreamKind,
    },
    /// Induction rate outside `[0 %, 100 %]`.
    InvalidInductionRate {
        /// The rejected rate, in percent.
        rate: Decimal,
    },
    /// `increment_year` called past the configured end year.
    RangeExhausted {
        /// The current year.
        year: i32,
        /// The configured end year.
        end_year: i32,
    },
    /// Decimal arithmetic exceeded the numeric type's range.
    NumericOverflow,
    /// An operation that requires an application/substance scope ran before
    /// the scope was established.
    MissingScope {
        /// The operation that needed the scope.
        operation: String,
    },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownSubstance {
                application,
                substance,
            } => {
                write!(f, "unknown substance: {substance} in {application}")
            }
            Self::StreamNotEnabled { stream } => {
                write!(f, "stream not enabled: {stream}")
            }
            Self::UnknownStream { name } => write!(f, "unknown stream: {name}"),
            Self::UnitMismatch { from, to } => {
                write!(f, "cannot convert {from} to {to}")
            }
            Self::ReservedVariable { name } => {
                write!(f, "variable {name} is reserved and read-only")
            }
            Self::SelfReplacement { substance } => {
                write!(f, "cannot replace {substance} with itself")
            }
            Self::SelfDisplacement { stream } => {
                write!(f, "cannot displace {stream} into itself")
            }
            Self::InvalidInductionRate { rate } => {
                write!(f, "induction rate {rate} % outside 0 % to 100 %")
            }
            Self::RangeExhausted { year, end_year } => {
                write!(f, "year {year} is already at the end year {end_year}")
            }
            Self::NumericOverflow => f.write_str("numeric overflow"),
            Self::MissingScope { operation } => {
                write!(f, "{operation} requires an application and substance scope")
            }
        }
    }
}

impl std::error::Error for EngineError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_single_line() {
        let errors = [
            EngineError::UnknownSubstance {
                application: "Domestic Refrigeration".to_string(),
                substance: "HFC-134a".to_string(),
            },
            EngineError::StreamNotEnabled {
                stream: StreamKind::Import,
            },
            EngineError::RangeExhausted {
                year: 2035,
                end_year: 2035,
            },
            EngineError::NumericOverflow,
        ];
        for err in errors {
            let rendered = err.to_string();
            assert!(!rendered.contains('\n'), "multi-line: {rendered}");
            assert!(!rendered.is_empty());
        }
    }
}
