use rge_core::{ErrorInfo, RgeError};
use serde::{Deserialize, Serialize};

fn config_error(code: &str, message: impl Into<String>) -> RgeError {
    RgeError::configuration(code, message)
}

/// How the output grid spacing is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Fixed output step in the scale variable.
    Step(f64),
    /// Number of points spanning `[tmin, tmax]`.
    Points(usize),
}

impl Default for Resolution {
    fn default() -> Self {
        Resolution::Step(0.1)
    }
}

/// Variable the scale `t` is measured in.
///
/// Beta functions are derivatives with respect to `ln(mu)`; with `Log10`
/// the scale is `log10(mu)` and every derivative is multiplied by `ln(10)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleVariable {
    /// `t = log10(mu)`.
    #[default]
    Log10,
    /// `t = ln(mu)`.
    Ln,
}

impl ScaleVariable {
    /// Factor converting `d/dln(mu)` into `d/dt`.
    pub fn factor(&self) -> f64 {
        match self {
            ScaleVariable::Log10 => std::f64::consts::LN_10,
            ScaleVariable::Ln => 1.0,
        }
    }
}

/// Integration range, output grid and tolerances of a solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Scale at which the initial values hold.
    #[serde(default)]
    pub initial_scale: f64,
    /// Lower end of the range.
    #[serde(default)]
    pub tmin: f64,
    /// Upper end of the range.
    #[serde(default = "default_tmax")]
    pub tmax: f64,
    /// Output grid spacing.
    #[serde(default)]
    pub resolution: Resolution,
    /// Relative tolerance of the step controller.
    #[serde(default = "default_rtol")]
    pub rtol: f64,
    /// Absolute tolerance of the step controller.
    #[serde(default = "default_atol")]
    pub atol: f64,
    /// Highest BDF order used, between 1 and 5.
    #[serde(default = "default_max_order")]
    pub max_order: usize,
    /// Number of times the output step may be halved.
    #[serde(default = "default_max_halvings")]
    pub max_halvings: u32,
    /// Imaginary magnitude above which a slot becomes complex.
    #[serde(default = "default_complex_tolerance")]
    pub complex_tolerance: f64,
    /// Variable the scale is measured in.
    #[serde(default)]
    pub scale_variable: ScaleVariable,
}

fn default_tmax() -> f64 {
    20.0
}

fn default_rtol() -> f64 {
    1e-6
}

fn default_atol() -> f64 {
    1e-12
}

fn default_max_order() -> usize {
    5
}

fn default_max_halvings() -> u32 {
    24
}

fn default_complex_tolerance() -> f64 {
    1e-10
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            initial_scale: 0.0,
            tmin: 0.0,
            tmax: default_tmax(),
            resolution: Resolution::default(),
            rtol: default_rtol(),
            atol: default_atol(),
            max_order: default_max_order(),
            max_halvings: default_max_halvings(),
            complex_tolerance: default_complex_tolerance(),
            scale_variable: ScaleVariable::default(),
        }
    }
}

impl SolverConfig {
    /// Configuration over `[tmin, tmax]` starting from `initial_scale`.
    pub fn range(initial_scale: f64, tmin: f64, tmax: f64) -> Self {
        Self {
            initial_scale,
            tmin,
            tmax,
            ..Self::default()
        }
    }

    /// Sets a fixed output step.
    pub fn with_step(mut self, step: f64) -> Self {
        self.resolution = Resolution::Step(step);
        self
    }

    /// Sets the number of output points over the range.
    pub fn with_points(mut self, points: usize) -> Self {
        self.resolution = Resolution::Points(points);
        self
    }

    /// Output step implied by the resolution.
    pub fn step(&self) -> Result<f64, RgeError> {
        let step = match self.resolution {
            Resolution::Step(step) => step,
            Resolution::Points(points) if points >= 2 => (self.tmax - self.tmin) / (points - 1) as f64,
            Resolution::Points(points) => {
                return Err(config_error("points", "at least two output points are required")
                    .with_context("points", points))
            }
        };
        if !(step.is_finite() && step > 0.0) {
            return Err(config_error("step", "the output step must be finite and positive")
                .with_context("step", step));
        }
        Ok(step)
    }

    /// Checks the range, grid and tolerances.
    pub fn validate(&self) -> Result<(), RgeError> {
        for (name, value) in [
            ("initial_scale", self.initial_scale),
            ("tmin", self.tmin),
            ("tmax", self.tmax),
        ] {
            if !value.is_finite() {
                return Err(config_error("non-finite-scale", "scales must be finite").with_context(name, value));
            }
        }
        if self.tmin >= self.tmax {
            return Err(config_error("empty-range", "tmin must be below tmax")
                .with_context("tmin", self.tmin)
                .with_context("tmax", self.tmax));
        }
        if self.initial_scale < self.tmin || self.initial_scale > self.tmax {
            return Err(RgeError::Configuration(
                ErrorInfo::new("initial-scale", "the initial scale lies outside [tmin, tmax]")
                    .with_context("initial_scale", self.initial_scale)
                    .with_context("tmin", self.tmin)
                    .with_context("tmax", self.tmax),
            ));
        }
        self.step()?;
        if !(self.rtol > 0.0 && self.atol > 0.0) {
            return Err(config_error("tolerance", "rtol and atol must be positive")
                .with_context("rtol", self.rtol)
                .with_context("atol", self.atol));
        }
        if !(1..=5).contains(&self.max_order) {
            return Err(config_error("max-order", "the BDF order must lie between 1 and 5")
                .with_context("max_order", self.max_order));
        }
        if self.max_halvings > 40 {
            return Err(config_error("max-halvings", "at most 40 step halvings are supported")
                .with_context("max_halvings", self.max_halvings));
        }
        if !(self.complex_tolerance >= 0.0) {
            return Err(config_error("complex-tolerance", "the complex tolerance must be non-negative"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn points_resolution_spans_the_range() {
        let config = SolverConfig::range(0.0, 2.0, 4.0).with_points(5);
        assert_eq!(config.step().unwrap(), 0.5);
    }

    #[test]
    fn initial_scale_must_be_in_range() {
        let err = SolverConfig::range(5.0, 0.0, 4.0).validate().unwrap_err();
        assert_eq!(err.info().code, "initial-scale");
        assert!(err.is_fatal());
    }

    #[test]
    fn zero_step_is_rejected() {
        let err = SolverConfig::default().with_step(0.0).validate().unwrap_err();
        assert_eq!(err.info().code, "step");
        let err = SolverConfig::default().with_points(1).validate().unwrap_err();
        assert_eq!(err.info().code, "points");
    }

    #[test]
    fn serde_defaults_fill_missing_fields() {
        let config: SolverConfig = serde_json::from_str(r#"{"tmax": 10.0, "resolution": {"points": 11}}"#).unwrap();
        assert_eq!(config.tmax, 10.0);
        assert_eq!(config.step().unwrap(), 1.0);
        assert_eq!(config.rtol, 1e-6);
        assert_eq!(config.scale_variable, ScaleVariable::Log10);
    }
}
