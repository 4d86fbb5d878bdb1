use rge_core::{ErrorInfo, RgeError};
use rge_lower::ModelSpec;

use crate::config::SolverConfig;
use crate::report::InitialConditions;
use crate::trajectory::Solution;

fn map_err(err: serde_json::Error, code: &str) -> RgeError {
    RgeError::Serde(ErrorInfo::new(code, err.to_string()))
}

/// Serialises a solution to JSON.
pub fn solution_to_json(solution: &Solution) -> Result<String, RgeError> {
    serde_json::to_string_pretty(solution).map_err(|err| map_err(err, "solution-serialize"))
}

/// Deserialises a solution from JSON.
pub fn solution_from_json(json: &str) -> Result<Solution, RgeError> {
    serde_json::from_str(json).map_err(|err| map_err(err, "solution-deserialize"))
}

/// Serialises an initial-conditions dump to JSON.
pub fn initial_conditions_to_json(conditions: &InitialConditions) -> Result<String, RgeError> {
    serde_json::to_string_pretty(conditions).map_err(|err| map_err(err, "initial-conditions-serialize"))
}

/// Deserialises an initial-conditions dump from JSON.
pub fn initial_conditions_from_json(json: &str) -> Result<InitialConditions, RgeError> {
    serde_json::from_str(json).map_err(|err| map_err(err, "initial-conditions-deserialize"))
}

/// Serialises a model description to JSON.
pub fn model_to_json(model: &ModelSpec) -> Result<String, RgeError> {
    serde_json::to_string_pretty(model).map_err(|err| map_err(err, "model-serialize"))
}

/// Deserialises a model description from JSON.
pub fn model_from_json(json: &str) -> Result<ModelSpec, RgeError> {
    serde_json::from_str(json).map_err(|err| map_err(err, "model-deserialize"))
}

/// Serialises a solver configuration to JSON.
pub fn config_to_json(config: &SolverConfig) -> Result<String, RgeError> {
    serde_json::to_string_pretty(config).map_err(|err| map_err(err, "config-serialize"))
}

/// Deserialises a solver configuration from JSON.
pub fn config_from_json(json: &str) -> Result<SolverConfig, RgeError> {
    serde_json::from_str(json).map_err(|err| map_err(err, "config-deserialize"))
}
