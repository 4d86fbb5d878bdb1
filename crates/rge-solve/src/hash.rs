use rge_core::{ErrorInfo, RgeError};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::report::InitialConditions;
use crate::trajectory::{Solution, Trajectory};

fn hash_json<T: Serialize>(value: &T) -> Result<String, RgeError> {
    let json = serde_json::to_vec(value)
        .map_err(|err| RgeError::Serde(ErrorInfo::new("serialize", err.to_string())))?;
    let mut hasher = Sha256::new();
    hasher.update(json);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Canonical hash of a scale grid and its trajectories.
pub fn hash_trajectories(scales: &[f64], trajectories: &[Trajectory]) -> Result<String, RgeError> {
    #[derive(Serialize)]
    struct Payload<'a> {
        scales: &'a [f64],
        trajectories: &'a [Trajectory],
    }

    hash_json(&Payload { scales, trajectories })
}

/// Recomputes the run hash of a solution.
pub fn hash_solution(solution: &Solution) -> Result<String, RgeError> {
    hash_trajectories(&solution.scales, &solution.trajectories)
}

/// Canonical hash of an initial-conditions dump.
pub fn hash_initial_conditions(conditions: &InitialConditions) -> Result<String, RgeError> {
    hash_json(conditions)
}
