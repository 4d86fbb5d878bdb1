use std::collections::BTreeMap;

use rge_core::{Complex64, CouplingKind, ErrorInfo, RgeError, Shape};
use rge_expr::Quantity;
use serde::{Deserialize, Serialize};

/// Symbol standing for the gauge-fixing parameter in beta functions.
pub const GAUGE_SYMBOL: &str = "xiGauge";

/// Already-derived description of a model: declarations, beta-function
/// expressions per kind and loop order, and the loop caps to honour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Model name, used as prefix in the initial-conditions dump.
    pub name: String,
    /// Coupling declarations, conjugate and substituted names included.
    #[serde(default)]
    pub couplings: Vec<CouplingSpec>,
    /// Beta-function expressions: kind, then 1-based loop order, then target.
    #[serde(default)]
    pub rges: BTreeMap<CouplingKind, BTreeMap<u32, BTreeMap<String, String>>>,
    /// Maximum loop order requested per kind.
    #[serde(default)]
    pub loops: BTreeMap<CouplingKind, u32>,
    /// Constant every term is divided by.
    #[serde(default = "default_beta_factor")]
    pub beta_factor: String,
    /// Power of `4*pi` suppressing loop order `n`, as an expression in `n`.
    #[serde(default = "default_beta_exponent")]
    pub beta_exponent: String,
    /// Dependent couplings, inlined wherever they appear.
    #[serde(default)]
    pub substitutions: BTreeMap<String, String>,
    /// Named numeric constants.
    #[serde(default)]
    pub parameters: BTreeMap<String, f64>,
    /// Symbols standing for the number of fermion generations.
    #[serde(default)]
    pub generation_symbols: Vec<String>,
    /// Value bound to every generation symbol.
    #[serde(default = "default_generations")]
    pub generations: f64,
    /// Gauge-fixing parameter; Landau gauge when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gauge_fixing: Option<f64>,
}

fn default_beta_factor() -> String {
    "1".to_string()
}

fn default_beta_exponent() -> String {
    "2*n".to_string()
}

fn default_generations() -> f64 {
    3.0
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self {
            name: "Model".to_string(),
            couplings: Vec::new(),
            rges: BTreeMap::new(),
            loops: BTreeMap::new(),
            beta_factor: default_beta_factor(),
            beta_exponent: default_beta_exponent(),
            substitutions: BTreeMap::new(),
            parameters: BTreeMap::new(),
            generation_symbols: Vec::new(),
            generations: default_generations(),
            gauge_fixing: None,
        }
    }
}

impl ModelSpec {
    /// Creates an empty model.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Parses a model from YAML.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, RgeError> {
        serde_yaml::from_str(yaml)
            .map_err(|err| RgeError::Serde(ErrorInfo::new("model-yaml", err.to_string())))
    }

    /// Parses a model from JSON.
    pub fn from_json_str(json: &str) -> Result<Self, RgeError> {
        serde_json::from_str(json)
            .map_err(|err| RgeError::Serde(ErrorInfo::new("model-json", err.to_string())))
    }

    /// Adds a coupling declaration.
    pub fn with_coupling(mut self, coupling: CouplingSpec) -> Self {
        self.couplings.push(coupling);
        self
    }

    /// Adds the `loop_order` contribution to the beta function of `target`.
    pub fn with_rge(
        mut self,
        kind: CouplingKind,
        loop_order: u32,
        target: impl Into<String>,
        expression: impl Into<String>,
    ) -> Self {
        self.rges
            .entry(kind)
            .or_default()
            .entry(loop_order)
            .or_default()
            .insert(target.into(), expression.into());
        self
    }

    /// Sets the loop cap of `kind`.
    pub fn with_loops(mut self, kind: CouplingKind, loops: u32) -> Self {
        self.loops.insert(kind, loops);
        self
    }

    /// Declares `name` as a dependent coupling.
    pub fn with_substitution(mut self, name: impl Into<String>, expression: impl Into<String>) -> Self {
        self.substitutions.insert(name.into(), expression.into());
        self
    }

    /// Binds a numeric parameter.
    pub fn with_parameter(mut self, name: impl Into<String>, value: f64) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }
}

/// Declaration of one coupling in a [`ModelSpec`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouplingSpec {
    /// Coupling name.
    pub name: String,
    /// Coupling category.
    pub kind: CouplingKind,
    /// Scalar or matrix shape.
    #[serde(default)]
    pub shape: Shape,
    /// Initial value; zeros when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial: Option<InitialValue>,
    /// Optional LaTeX label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latex: Option<String>,
    /// Whether the coupling is complex from the start.
    #[serde(default)]
    pub complex: bool,
}

impl CouplingSpec {
    /// Scalar coupling declaration.
    pub fn scalar(name: impl Into<String>, kind: CouplingKind) -> Self {
        Self {
            name: name.into(),
            kind,
            shape: Shape::Scalar,
            initial: None,
            latex: None,
            complex: false,
        }
    }

    /// Matrix coupling declaration.
    pub fn matrix(name: impl Into<String>, kind: CouplingKind, rows: usize, cols: usize) -> Self {
        Self {
            shape: Shape::matrix(rows, cols),
            ..Self::scalar(name, kind)
        }
    }

    /// Sets the initial value.
    pub fn with_initial(mut self, initial: InitialValue) -> Self {
        self.initial = Some(initial);
        self
    }
}

/// Initial value as written in a model file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InitialValue {
    /// Real scalar.
    Real(f64),
    /// Complex scalar.
    Complex {
        /// Real part.
        re: f64,
        /// Imaginary part.
        im: f64,
    },
    /// Real matrix given row by row.
    Matrix(Vec<Vec<f64>>),
}

impl InitialValue {
    /// Converts to a numeric value.
    pub fn to_quantity(&self) -> Result<Quantity, RgeError> {
        match self {
            InitialValue::Real(value) => Ok(Quantity::real(*value)),
            InitialValue::Complex { re, im } => Ok(Quantity::Scalar(Complex64::new(*re, *im))),
            InitialValue::Matrix(rows) => Quantity::from_real_rows(rows),
        }
    }
}
