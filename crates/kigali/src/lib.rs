//! Kigali Sim engine core.
//!
//! A yearly, scope-aware stock-and-flow evaluator for controlled substances
//! (HFC refrigerants and their substitutes) under the Montreal Protocol and
//! the Kigali Amendment. A script interpreter feeds the [`Engine`] a stream
//! of evaluated [`Operation`]s; the engine keeps sales, equipment
//! populations, consumption, and emissions mutually consistent and emits a
//! per-(application, substance, year) [`EngineResult`] record.
//!
//! The engine is single-threaded and owns all of its state; scenario
//! parallelism comes from running independent instances. Logging is opt-in:
//! warnings go to the `tracing` subscriber the embedder installs.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod wire;

pub use engine::{
    DisplaceTarget, DisplacementKind, Engine, EngineResult, Operation, Scope, TradeSupplement,
    YearMatcher,
};
pub use primitives::{
    Decimal, EngineError, PercentBasis, Quantity, StreamKind, SubstanceId, UnitFamily, Units,
};
pub use state::{
    AssumeMode, Parameterization, RecoveryStage, SalesDistribution, SimulationState, StreamBank,
};
