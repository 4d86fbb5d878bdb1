#![deny(missing_docs)]
#![doc = "Bidirectional BDF integration of lowered beta-function systems, complex promotion of state slots and reconstruction of matrix couplings."]

/// Variable-order BDF integrator on complex states.
pub mod bdf;
/// Solver configuration.
pub mod config;
/// Numeric right-hand side of a lowered model.
pub mod derivative;
/// Canonical hashing helpers for solutions.
pub mod hash;
/// Rebuilding matrix couplings from element series.
pub mod reconstruct;
/// Initial-conditions dump.
pub mod report;
/// Serde helpers for JSON artefacts.
#[path = "serde.rs"]
pub mod serde_io;
/// Solver facade.
pub mod solver;
/// Merged solution types.
pub mod trajectory;

pub use bdf::{Bdf, BdfSettings};
pub use config::{Resolution, ScaleVariable, SolverConfig};
pub use derivative::BetaSystem;
pub use hash::{hash_initial_conditions, hash_solution};
pub use reconstruct::reconstruct_matrix;
pub use report::{InitialConditions, InitialEntry, InitialValueLine, KindSection};
pub use solver::RgeSolver;
pub use trajectory::{
    Direction, IntegrationFailure, MatrixTrajectory, MatrixValue, ReconstructionFailure, Solution,
    SolverPhase, Trajectory,
};
