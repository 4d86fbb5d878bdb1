use rge_core::{ErrorInfo, RgeError, Shape};

use crate::expr::{Expr, Func};

fn mismatch(code: &str, message: impl Into<String>) -> RgeError {
    RgeError::ShapeMismatch(ErrorInfo::new(code, message))
}

/// Integer exponent of a literal, if the exponent is one.
pub(crate) fn integer_exponent<S>(exp: &Expr<S>) -> Option<i32> {
    let value = exp.as_num()?;
    if value.fract() == 0.0 && value.abs() <= f64::from(i32::MAX) {
        Some(value as i32)
    } else {
        None
    }
}

/// Infers the shape an expression evaluates to.
///
/// `shape_of` reports the shape of every symbol; an unknown symbol is an
/// expression error. Sums require identical shapes, products require
/// matching inner dimensions and matrix powers need a non-negative integer
/// literal exponent on a square matrix.
pub fn infer_shape<S: std::fmt::Debug>(
    expr: &Expr<S>,
    shape_of: &impl Fn(&S) -> Option<Shape>,
) -> Result<Shape, RgeError> {
    match expr {
        Expr::Num(_) | Expr::Imag | Expr::Pi => Ok(Shape::Scalar),
        Expr::Sym(symbol) => shape_of(symbol).ok_or_else(|| {
            RgeError::Expression(
                ErrorInfo::new("unknown-symbol", "symbol has no known shape")
                    .with_context("symbol", format!("{symbol:?}")),
            )
        }),
        Expr::Add(terms) => {
            let mut shape: Option<Shape> = None;
            for term in terms {
                let next = infer_shape(term, shape_of)?;
                match shape {
                    None => shape = Some(next),
                    Some(current) if current == next => {}
                    Some(current) => {
                        return Err(mismatch("sum", "terms of a sum have different shapes")
                            .with_context("lhs", current)
                            .with_context("rhs", next))
                    }
                }
            }
            Ok(shape.unwrap_or(Shape::Scalar))
        }
        Expr::Mul(factors) => {
            let mut shape = Shape::Scalar;
            for factor in factors {
                let next = infer_shape(factor, shape_of)?;
                shape = match (shape, next) {
                    (Shape::Scalar, other) | (other, Shape::Scalar) => other,
                    (
                        Shape::Matrix { rows, cols: inner },
                        Shape::Matrix {
                            rows: inner_rhs,
                            cols,
                        },
                    ) => {
                        if inner != inner_rhs {
                            return Err(mismatch(
                                "product",
                                "inner dimensions of a matrix product differ",
                            )
                            .with_context("lhs", shape)
                            .with_context("rhs", next));
                        }
                        Shape::Matrix { rows, cols }
                    }
                };
            }
            Ok(shape)
        }
        Expr::Pow(base, exp) => {
            let exp_shape = infer_shape(exp, shape_of)?;
            if exp_shape != Shape::Scalar {
                return Err(mismatch("power", "exponent must be a scalar"));
            }
            match infer_shape(base, shape_of)? {
                Shape::Scalar => Ok(Shape::Scalar),
                Shape::Matrix { rows, cols } => match integer_exponent(exp) {
                    Some(n) if n >= 0 && rows == cols => Ok(Shape::Matrix { rows, cols }),
                    _ => Err(mismatch(
                        "power",
                        "matrix powers need a square base and a non-negative integer exponent",
                    )
                    .with_context("base", Shape::Matrix { rows, cols })),
                },
            }
        }
        Expr::Call(func, arg) => {
            let inner = infer_shape(arg, shape_of)?;
            match func {
                Func::Conj | Func::Abs => Ok(inner),
                Func::Adjoint | Func::Transpose => Ok(inner.transposed()),
                Func::Trace => match inner {
                    Shape::Scalar => Ok(Shape::Scalar),
                    Shape::Matrix { rows, cols } if rows == cols => Ok(Shape::Scalar),
                    other => Err(mismatch("trace", "trace of a non-square matrix")
                        .with_context("shape", other)),
                },
                Func::Sqrt => match inner {
                    Shape::Scalar => Ok(Shape::Scalar),
                    other => Err(mismatch("sqrt", "square root of a matrix")
                        .with_context("shape", other)),
                },
            }
        }
    }
}
