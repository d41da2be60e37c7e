//! Substance state for the Kigali simulation engine: stream storage,
//! per-substance parameterization, sales distribution, unit conversion, and
//! year-transition bookkeeping.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod convert;
pub mod distribution;
pub mod parameterization;
pub mod state;
pub mod streams;
pub mod transition;
pub mod update;

pub use convert::{ConverterStateGetter, OverridingStateGetter};
pub use distribution::SalesDistribution;
pub use parameterization::{
    AssumeMode, EnabledStreams, Parameterization, RecoveryStage, YearStartSnapshot,
};
pub use state::{SimulationState, SubstanceState, SubstanceView};
pub use streams::StreamBank;
pub use update::StateUpdate;
