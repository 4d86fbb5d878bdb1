#![deny(missing_docs)]
#![doc = "Symbolic beta-function expressions: parsing, shape inference, abs-squared normalisation and numeric evaluation over complex scalars and matrices."]

/// Numeric evaluation of expressions.
pub mod eval;
/// Expression tree and builders.
pub mod expr;
/// Abs-squared normalisation of conjugate pairs.
pub mod normalize;
/// Textual expression parser.
pub mod parse;
/// Shape inference.
pub mod shape;

pub use eval::{evaluate, evaluate_real_constant, Bindings, Quantity, Unbound};
pub use expr::{Expr, Func};
pub use normalize::abs_squared;
pub use parse::parse;
pub use shape::infer_shape;
