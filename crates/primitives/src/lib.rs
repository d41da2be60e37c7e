//! Unit-aware numeric primitives shared across the Kigali simulation engine.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod error;
pub mod id;
pub mod stream;
pub mod units;
pub mod value;

pub use error::EngineError;
pub use id::SubstanceId;
pub use stream::{PercentDefault, StreamKind};
pub use units::{PercentBasis, UnitFamily, Units};
pub use value::{dec_add, dec_div, dec_mul, dec_sub, pct_to_fraction, Quantity};

// Re-exported so downstream crates agree on one decimal type.
pub use rust_decimal::Decimal;
