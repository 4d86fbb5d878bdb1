use std::fmt;

use nalgebra::DMatrix;
use num_complex::Complex64;
use rge_core::{CouplingKind, ErrorInfo, RgeError, Value};
use serde::{Deserialize, Serialize};

/// Direction of a sweep away from the initial scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Towards `tmax`.
    Upward,
    /// Towards `tmin`.
    Downward,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Upward => f.write_str("upward"),
            Direction::Downward => f.write_str("downward"),
        }
    }
}

/// Lifecycle of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverPhase {
    /// No solve in progress.
    #[default]
    Idle,
    /// Integrating towards `tmax`.
    RunningUpward,
    /// Integrating towards `tmin`.
    RunningDownward,
    /// Both sweeps done and merged.
    Merged,
}

/// A sweep that stopped before reaching its end of the range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationFailure {
    /// Sweep that failed.
    pub direction: Direction,
    /// Scale of the last accepted state.
    pub reached: f64,
    /// End of the range the sweep was heading for.
    pub target: f64,
    /// Cause reported by the integrator.
    pub reason: RgeError,
}

impl IntegrationFailure {
    /// Converts the failure into an error carrying its scales.
    pub fn to_error(&self) -> RgeError {
        let info = self.reason.info();
        RgeError::Integration(
            ErrorInfo::new(info.code.clone(), info.message.clone())
                .with_context("direction", self.direction)
                .with_context("reached", self.reached)
                .with_context("target", self.target),
        )
    }
}

/// Series of one scalar slot over the scale grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    /// Scalar coupling or element name.
    pub name: String,
    /// Category.
    pub kind: CouplingKind,
    /// Flat slot.
    pub position: usize,
    /// Owning coupling name (itself for scalars).
    pub parent: String,
    /// Whether the slot ended the run complex.
    pub is_complex: bool,
    /// Scale at which the slot was promoted during the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promoted_at: Option<f64>,
    /// One value per scale.
    pub values: Vec<Value>,
}

/// One sample of a matrix coupling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatrixValue {
    /// All elements real.
    Real(DMatrix<f64>),
    /// At least one element complex.
    Complex(DMatrix<Complex64>),
}

impl MatrixValue {
    /// Entry at `(row, col)`, widened to complex.
    pub fn get(&self, row: usize, col: usize) -> Option<Complex64> {
        match self {
            MatrixValue::Real(m) => m.get((row, col)).map(|re| Complex64::new(*re, 0.0)),
            MatrixValue::Complex(m) => m.get((row, col)).copied(),
        }
    }

    /// `(rows, cols)`.
    pub fn dims(&self) -> (usize, usize) {
        match self {
            MatrixValue::Real(m) => m.shape(),
            MatrixValue::Complex(m) => m.shape(),
        }
    }
}

/// Series of a matrix coupling rebuilt from its elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixTrajectory {
    /// Coupling name.
    pub name: String,
    /// Category.
    pub kind: CouplingKind,
    /// Rows.
    pub rows: usize,
    /// Columns.
    pub cols: usize,
    /// Whether any element is complex.
    pub is_complex: bool,
    /// One matrix per scale.
    pub values: Vec<MatrixValue>,
}

/// Matrix coupling whose series could not be rebuilt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconstructionFailure {
    /// Coupling name.
    pub coupling: String,
    /// Cause.
    pub error: RgeError,
}

/// Merged result of a solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    /// Strictly increasing scale grid.
    pub scales: Vec<f64>,
    /// One series per scalar slot, in position order.
    pub trajectories: Vec<Trajectory>,
    /// Rebuilt matrix couplings.
    pub matrices: Vec<MatrixTrajectory>,
    /// Sweeps that ran.
    pub phases: Vec<Direction>,
    /// Sweeps that stopped early.
    pub failures: Vec<IntegrationFailure>,
    /// Matrix couplings that could not be rebuilt.
    pub reconstruction_errors: Vec<ReconstructionFailure>,
    /// SHA-256 of the scale grid and trajectories.
    pub run_hash: String,
}

impl Solution {
    /// Number of samples.
    pub fn len(&self) -> usize {
        self.scales.len()
    }

    /// Whether the grid is empty.
    pub fn is_empty(&self) -> bool {
        self.scales.is_empty()
    }

    /// Series of the scalar coupling or element called `name`.
    pub fn trajectory(&self, name: &str) -> Option<&Trajectory> {
        self.trajectories.iter().find(|trajectory| trajectory.name == name)
    }

    /// Rebuilt series of the matrix coupling called `name`.
    pub fn matrix(&self, name: &str) -> Option<&MatrixTrajectory> {
        self.matrices.iter().find(|matrix| matrix.name == name)
    }

    /// `(scale, value)` pairs of the slot called `name`.
    pub fn series(&self, name: &str) -> Option<Vec<(f64, Value)>> {
        self.trajectory(name).map(|trajectory| {
            self.scales
                .iter()
                .copied()
                .zip(trajectory.values.iter().copied())
                .collect()
        })
    }

    /// Slots promoted to complex during the run, with the promotion scale.
    pub fn promotions(&self) -> Vec<(&str, f64)> {
        self.trajectories
            .iter()
            .filter_map(|trajectory| trajectory.promoted_at.map(|t| (trajectory.name.as_str(), t)))
            .collect()
    }

    /// Whether both sweeps reached the ends of the range.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Errors with the first integration failure, if any.
    pub fn ensure_complete(&self) -> Result<(), RgeError> {
        match self.failures.first() {
            Some(failure) => Err(failure.to_error()),
            None => Ok(()),
        }
    }
}
