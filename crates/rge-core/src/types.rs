use std::fmt;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

/// Category of a running coupling.
///
/// The declaration order of the variants is the canonical ordering used when
/// kinds are stored in sorted maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CouplingKind {
    /// Gauge couplings.
    GaugeCouplings,
    /// Yukawa couplings.
    Yukawas,
    /// Scalar quartic couplings.
    QuarticTerms,
    /// Scalar trilinear couplings.
    TrilinearTerms,
    /// Scalar mass terms.
    ScalarMasses,
    /// Fermion mass terms.
    FermionMasses,
    /// Vacuum-expectation values.
    Vevs,
}

impl CouplingKind {
    /// Every kind in canonical order.
    pub const ALL: [CouplingKind; 7] = [
        CouplingKind::GaugeCouplings,
        CouplingKind::Yukawas,
        CouplingKind::QuarticTerms,
        CouplingKind::TrilinearTerms,
        CouplingKind::ScalarMasses,
        CouplingKind::FermionMasses,
        CouplingKind::Vevs,
    ];

    /// Identifier used in model files and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            CouplingKind::GaugeCouplings => "GaugeCouplings",
            CouplingKind::Yukawas => "Yukawas",
            CouplingKind::QuarticTerms => "QuarticTerms",
            CouplingKind::TrilinearTerms => "TrilinearTerms",
            CouplingKind::ScalarMasses => "ScalarMasses",
            CouplingKind::FermionMasses => "FermionMasses",
            CouplingKind::Vevs => "Vevs",
        }
    }

    /// Human readable label used as a section header.
    pub fn label(&self) -> &'static str {
        match self {
            CouplingKind::GaugeCouplings => "Gauge Couplings",
            CouplingKind::Yukawas => "Yukawa Couplings",
            CouplingKind::QuarticTerms => "Quartic Couplings",
            CouplingKind::TrilinearTerms => "Trilinear Couplings",
            CouplingKind::ScalarMasses => "Scalar Mass Couplings",
            CouplingKind::FermionMasses => "Fermion Mass Couplings",
            CouplingKind::Vevs => "Vacuum-expectation Values",
        }
    }
}

impl fmt::Display for CouplingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape of a coupling: a single number or a fixed two dimensional matrix.
///
/// Serialises as `"scalar"` or `{ matrix: { rows, cols } }`. Deserialisation
/// also accepts a bare `{ rows, cols }` map or a `[rows, cols]` pair, so model
/// files need no YAML tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(from = "ShapeRepr", into = "ShapeRepr")]
pub enum Shape {
    /// A single scalar slot.
    #[default]
    Scalar,
    /// A `rows x cols` matrix stored row-major.
    Matrix {
        /// Number of rows.
        rows: usize,
        /// Number of columns.
        cols: usize,
    },
}

impl Shape {
    /// Convenience constructor for a matrix shape.
    pub fn matrix(rows: usize, cols: usize) -> Self {
        Shape::Matrix { rows, cols }
    }

    /// Number of scalar slots occupied in the flat state vector.
    pub fn element_count(&self) -> usize {
        match self {
            Shape::Scalar => 1,
            Shape::Matrix { rows, cols } => rows * cols,
        }
    }

    /// Whether the shape is a matrix.
    pub fn is_matrix(&self) -> bool {
        matches!(self, Shape::Matrix { .. })
    }

    /// Returns `(rows, cols)` with scalars reported as `(1, 1)`.
    pub fn dims(&self) -> (usize, usize) {
        match self {
            Shape::Scalar => (1, 1),
            Shape::Matrix { rows, cols } => (*rows, *cols),
        }
    }

    /// Shape of the transposed quantity.
    pub fn transposed(&self) -> Self {
        match self {
            Shape::Scalar => Shape::Scalar,
            Shape::Matrix { rows, cols } => Shape::Matrix {
                rows: *cols,
                cols: *rows,
            },
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ScalarTag {
    Scalar,
}

#[derive(Serialize, Deserialize)]
struct Dims {
    rows: usize,
    cols: usize,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ShapeRepr {
    Scalar(ScalarTag),
    Matrix { matrix: Dims },
    Dims(Dims),
    Pair([usize; 2]),
}

impl From<ShapeRepr> for Shape {
    fn from(repr: ShapeRepr) -> Self {
        match repr {
            ShapeRepr::Scalar(ScalarTag::Scalar) => Shape::Scalar,
            ShapeRepr::Matrix {
                matrix: Dims { rows, cols },
            }
            | ShapeRepr::Dims(Dims { rows, cols })
            | ShapeRepr::Pair([rows, cols]) => Shape::Matrix { rows, cols },
        }
    }
}

impl From<Shape> for ShapeRepr {
    fn from(shape: Shape) -> Self {
        match shape {
            Shape::Scalar => ShapeRepr::Scalar(ScalarTag::Scalar),
            Shape::Matrix { rows, cols } => ShapeRepr::Matrix {
                matrix: Dims { rows, cols },
            },
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Scalar => write!(f, "()"),
            Shape::Matrix { rows, cols } => write!(f, "({rows},{cols})"),
        }
    }
}

/// A stored sample of a scalar slot, typed by the slot's complex flag.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    /// Real-valued sample.
    Real(f64),
    /// Complex-valued sample.
    Complex(Complex64),
}

impl Value {
    /// Types a raw integrator value according to the slot's complex flag.
    ///
    /// Real slots drop the imaginary part on purpose: a slot stays real until
    /// its imaginary part exceeds the complex tolerance, and anything below
    /// that is integrator noise.
    pub fn typed(raw: Complex64, complex: bool) -> Self {
        if complex {
            Value::Complex(raw)
        } else {
            Value::Real(raw.re)
        }
    }

    /// Widens the value to a complex number.
    pub fn to_complex(&self) -> Complex64 {
        match self {
            Value::Real(re) => Complex64::new(*re, 0.0),
            Value::Complex(z) => *z,
        }
    }

    /// Real part of the value.
    pub fn re(&self) -> f64 {
        match self {
            Value::Real(re) => *re,
            Value::Complex(z) => z.re,
        }
    }

    /// Imaginary part of the value (zero for real samples).
    pub fn im(&self) -> f64 {
        match self {
            Value::Real(_) => 0.0,
            Value::Complex(z) => z.im,
        }
    }

    /// Whether the sample is stored as a complex number.
    pub fn is_complex(&self) -> bool {
        matches!(self, Value::Complex(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Real(re) => write!(f, "{re}"),
            Value::Complex(z) => write!(f, "{}", format_complex(*z)),
        }
    }
}

/// Formats a complex number compactly, omitting a zero imaginary part.
pub fn format_complex(z: Complex64) -> String {
    if z.im == 0.0 {
        format!("{}", z.re)
    } else if z.re == 0.0 {
        format!("{}j", z.im)
    } else if z.im < 0.0 {
        format!("({}-{}j)", z.re, -z.im)
    } else {
        format!("({}+{}j)", z.re, z.im)
    }
}
