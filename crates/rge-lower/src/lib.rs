#![deny(missing_docs)]
#![doc = "Lowers a symbolic model description into a registry plus a loop-gated system of slot-indexed beta-function expressions."]

/// Resolution of conjugate coupling names.
pub mod conjugate;
/// Lowering of beta-function expressions.
pub mod lower;
/// Serialisable model description.
pub mod model;

pub use conjugate::{is_conjugate_name, resolve_conjugate};
pub use lower::{
    lower_model, Argument, BetaFunction, BetaTerm, LoopNormalization, LoweredModel, LoweringReport,
    OmittedTerm,
};
pub use model::{CouplingSpec, InitialValue, ModelSpec, GAUGE_SYMBOL};
