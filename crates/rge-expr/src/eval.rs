use std::collections::BTreeMap;
use std::f64::consts::PI;

use nalgebra::DMatrix;
use num_complex::Complex64;
use rge_core::{format_complex, ErrorInfo, RgeError, Shape};
use serde::{Deserialize, Serialize};

use crate::expr::{Expr, Func};
use crate::shape::integer_exponent;

fn eval_error(code: &str, message: impl Into<String>) -> RgeError {
    RgeError::Expression(ErrorInfo::new(code, message))
}

fn zero() -> Complex64 {
    Complex64::new(0.0, 0.0)
}

/// Numeric value of an expression: a complex scalar or a complex matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quantity {
    /// Complex scalar.
    Scalar(Complex64),
    /// Complex matrix.
    Matrix(DMatrix<Complex64>),
}

impl Quantity {
    /// Real scalar.
    pub fn real(value: f64) -> Self {
        Quantity::Scalar(Complex64::new(value, 0.0))
    }

    /// Zero-filled value of the given shape.
    pub fn zeros(shape: Shape) -> Self {
        match shape {
            Shape::Scalar => Quantity::Scalar(zero()),
            Shape::Matrix { rows, cols } => Quantity::Matrix(DMatrix::from_element(rows, cols, zero())),
        }
    }

    /// Builds a matrix from row-major entries.
    pub fn from_row_major(rows: usize, cols: usize, entries: &[Complex64]) -> Result<Self, RgeError> {
        if entries.len() != rows * cols {
            return Err(RgeError::ShapeMismatch(
                ErrorInfo::new("element-count", "row-major data does not fill the matrix")
                    .with_context("expected", rows * cols)
                    .with_context("actual", entries.len()),
            ));
        }
        Ok(Quantity::Matrix(DMatrix::from_row_slice(rows, cols, entries)))
    }

    /// Builds a matrix from real row-major entries.
    pub fn from_real_rows(rows: &[Vec<f64>]) -> Result<Self, RgeError> {
        let nrows = rows.len();
        let ncols = rows.first().map(Vec::len).unwrap_or(0);
        if rows.iter().any(|row| row.len() != ncols) {
            return Err(RgeError::shape_mismatch("ragged-rows", "matrix rows have different lengths"));
        }
        let entries: Vec<Complex64> = rows
            .iter()
            .flat_map(|row| row.iter().map(|value| Complex64::new(*value, 0.0)))
            .collect();
        Quantity::from_row_major(nrows, ncols, &entries)
    }

    /// Shape of the value.
    pub fn shape(&self) -> Shape {
        match self {
            Quantity::Scalar(_) => Shape::Scalar,
            Quantity::Matrix(m) => Shape::Matrix {
                rows: m.nrows(),
                cols: m.ncols(),
            },
        }
    }

    /// Entries in row-major order (a single entry for scalars).
    pub fn row_major(&self) -> Vec<Complex64> {
        match self {
            Quantity::Scalar(z) => vec![*z],
            Quantity::Matrix(m) => {
                let mut out = Vec::with_capacity(m.len());
                for row in 0..m.nrows() {
                    for col in 0..m.ncols() {
                        out.push(m[(row, col)]);
                    }
                }
                out
            }
        }
    }

    /// Scalar payload, if the value is a scalar.
    pub fn as_scalar(&self) -> Option<Complex64> {
        match self {
            Quantity::Scalar(z) => Some(*z),
            Quantity::Matrix(_) => None,
        }
    }

    /// Whether every entry is finite.
    pub fn is_finite(&self) -> bool {
        match self {
            Quantity::Scalar(z) => z.re.is_finite() && z.im.is_finite(),
            Quantity::Matrix(m) => m.iter().all(|z| z.re.is_finite() && z.im.is_finite()),
        }
    }

    fn map(&self, f: impl Fn(Complex64) -> Complex64) -> Quantity {
        match self {
            Quantity::Scalar(z) => Quantity::Scalar(f(*z)),
            Quantity::Matrix(m) => Quantity::Matrix(m.map(f)),
        }
    }

    /// Sum of two values of identical shape.
    pub fn add(&self, rhs: &Quantity) -> Result<Quantity, RgeError> {
        match (self, rhs) {
            (Quantity::Scalar(a), Quantity::Scalar(b)) => Ok(Quantity::Scalar(a + b)),
            (Quantity::Matrix(a), Quantity::Matrix(b)) if a.shape() == b.shape() => {
                Ok(Quantity::Matrix(a + b))
            }
            _ => Err(RgeError::shape_mismatch("sum", "cannot add values of different shapes")
                .with_context("lhs", self.shape())
                .with_context("rhs", rhs.shape())),
        }
    }

    /// Product, with matrix multiplication between matrices.
    pub fn mul(&self, rhs: &Quantity) -> Result<Quantity, RgeError> {
        match (self, rhs) {
            (Quantity::Scalar(a), Quantity::Scalar(b)) => Ok(Quantity::Scalar(a * b)),
            (Quantity::Scalar(a), Quantity::Matrix(m)) | (Quantity::Matrix(m), Quantity::Scalar(a)) => {
                let a = *a;
                Ok(Quantity::Matrix(m.map(|z| z * a)))
            }
            (Quantity::Matrix(a), Quantity::Matrix(b)) => {
                if a.ncols() != b.nrows() {
                    return Err(RgeError::shape_mismatch(
                        "product",
                        "inner dimensions of a matrix product differ",
                    )
                    .with_context("lhs", self.shape())
                    .with_context("rhs", rhs.shape()));
                }
                Ok(Quantity::Matrix(a * b))
            }
        }
    }

    fn pow(&self, exponent: &Quantity, literal: Option<i32>) -> Result<Quantity, RgeError> {
        let exp = exponent
            .as_scalar()
            .ok_or_else(|| RgeError::shape_mismatch("power", "exponent must be a scalar"))?;
        match self {
            Quantity::Scalar(base) => {
                let value = if let Some(n) = literal {
                    base.powi(n)
                } else if exp.im == 0.0 {
                    base.powf(exp.re)
                } else {
                    base.powc(exp)
                };
                Ok(Quantity::Scalar(value))
            }
            Quantity::Matrix(m) => {
                let n = match literal {
                    Some(n) if n >= 0 && m.is_square() => n,
                    _ => {
                        return Err(RgeError::shape_mismatch(
                            "power",
                            "matrix powers need a square base and a non-negative integer exponent",
                        ))
                    }
                };
                let mut acc = DMatrix::identity(m.nrows(), m.ncols());
                for _ in 0..n {
                    acc = &acc * m;
                }
                Ok(Quantity::Matrix(acc))
            }
        }
    }

    fn apply(&self, func: Func) -> Result<Quantity, RgeError> {
        match func {
            Func::Conj => Ok(self.map(|z| z.conj())),
            Func::Abs => Ok(self.map(|z| Complex64::new(z.norm(), 0.0))),
            Func::Adjoint => Ok(match self {
                Quantity::Scalar(z) => Quantity::Scalar(z.conj()),
                Quantity::Matrix(m) => Quantity::Matrix(m.adjoint()),
            }),
            Func::Transpose => Ok(match self {
                Quantity::Scalar(z) => Quantity::Scalar(*z),
                Quantity::Matrix(m) => Quantity::Matrix(m.transpose()),
            }),
            Func::Trace => match self {
                Quantity::Scalar(z) => Ok(Quantity::Scalar(*z)),
                Quantity::Matrix(m) if m.is_square() => Ok(Quantity::Scalar(m.trace())),
                Quantity::Matrix(_) => Err(RgeError::shape_mismatch(
                    "trace",
                    "trace of a non-square matrix",
                )
                .with_context("shape", self.shape())),
            },
            Func::Sqrt => match self {
                Quantity::Scalar(z) => Ok(Quantity::Scalar(z.sqrt())),
                Quantity::Matrix(_) => Err(RgeError::shape_mismatch("sqrt", "square root of a matrix")),
            },
        }
    }
}

impl std::fmt::Display for Quantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Quantity::Scalar(z) => f.write_str(&format_complex(*z)),
            Quantity::Matrix(m) => {
                f.write_str("[")?;
                for row in 0..m.nrows() {
                    if row > 0 {
                        f.write_str(", ")?;
                    }
                    f.write_str("[")?;
                    for col in 0..m.ncols() {
                        if col > 0 {
                            f.write_str(", ")?;
                        }
                        f.write_str(&format_complex(m[(row, col)]))?;
                    }
                    f.write_str("]")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Source of symbol values during evaluation.
pub trait Bindings<S> {
    /// Value bound to `symbol`, if any.
    fn lookup(&self, symbol: &S) -> Option<&Quantity>;
}

impl Bindings<usize> for [Quantity] {
    fn lookup(&self, symbol: &usize) -> Option<&Quantity> {
        self.get(*symbol)
    }
}

impl Bindings<usize> for Vec<Quantity> {
    fn lookup(&self, symbol: &usize) -> Option<&Quantity> {
        self.get(*symbol)
    }
}

impl Bindings<String> for BTreeMap<String, Quantity> {
    fn lookup(&self, symbol: &String) -> Option<&Quantity> {
        self.get(symbol)
    }
}

/// Evaluates an expression numerically.
pub fn evaluate<S, B>(expr: &Expr<S>, bindings: &B) -> Result<Quantity, RgeError>
where
    S: std::fmt::Debug,
    B: Bindings<S> + ?Sized,
{
    match expr {
        Expr::Num(value) => Ok(Quantity::real(*value)),
        Expr::Imag => Ok(Quantity::Scalar(Complex64::new(0.0, 1.0))),
        Expr::Pi => Ok(Quantity::real(PI)),
        Expr::Sym(symbol) => bindings.lookup(symbol).cloned().ok_or_else(|| {
            RgeError::Expression(
                ErrorInfo::new("unbound-symbol", "no value bound to symbol")
                    .with_context("symbol", format!("{symbol:?}")),
            )
        }),
        Expr::Add(terms) => {
            let mut iter = terms.iter();
            let mut acc = match iter.next() {
                Some(first) => evaluate(first, bindings)?,
                None => return Ok(Quantity::real(0.0)),
            };
            for term in iter {
                acc = acc.add(&evaluate(term, bindings)?)?;
            }
            Ok(acc)
        }
        Expr::Mul(factors) => {
            let mut acc = Quantity::real(1.0);
            for factor in factors {
                acc = acc.mul(&evaluate(factor, bindings)?)?;
            }
            Ok(acc)
        }
        Expr::Pow(base, exp) => {
            let base_value = evaluate(base, bindings)?;
            let exp_value = evaluate(exp, bindings)?;
            base_value.pow(&exp_value, integer_exponent(exp))
        }
        Expr::Call(func, arg) => evaluate(arg, bindings)?.apply(*func),
    }
}

/// Bindings with no symbols, for constant expressions.
pub struct Unbound;

impl<S> Bindings<S> for Unbound {
    fn lookup(&self, _symbol: &S) -> Option<&Quantity> {
        None
    }
}

/// Evaluates a symbol-free expression to a real number.
pub fn evaluate_real_constant<S: std::fmt::Debug>(expr: &Expr<S>) -> Result<f64, RgeError> {
    if !expr.is_constant() {
        return Err(eval_error("not-constant", "expression references symbols"));
    }
    match evaluate(expr, &Unbound)? {
        Quantity::Scalar(z) if z.im.abs() <= f64::EPSILON * z.re.abs().max(1.0) => Ok(z.re),
        other => Err(eval_error("not-real", "constant does not evaluate to a real number")
            .with_context("value", other)),
    }
}
