use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

/// Unary functions understood by the evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Func {
    /// Element-wise complex conjugate.
    Conj,
    /// Conjugate transpose.
    Adjoint,
    /// Transpose.
    Transpose,
    /// Matrix trace.
    Trace,
    /// Element-wise modulus.
    Abs,
    /// Principal square root of a scalar.
    Sqrt,
}

impl Func {
    /// Name used when printing and parsing.
    pub fn name(&self) -> &'static str {
        match self {
            Func::Conj => "conj",
            Func::Adjoint => "adjoint",
            Func::Transpose => "transpose",
            Func::Trace => "tr",
            Func::Abs => "abs",
            Func::Sqrt => "sqrt",
        }
    }

    /// Resolves a function name, accepting the common aliases.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "conj" | "conjugate" => Some(Func::Conj),
            "adjoint" | "Adj" | "adj" => Some(Func::Adjoint),
            "transpose" | "Transpose" => Some(Func::Transpose),
            "tr" | "trace" | "Trace" => Some(Func::Trace),
            "abs" | "Abs" => Some(Func::Abs),
            "sqrt" | "Sqrt" => Some(Func::Sqrt),
            _ => None,
        }
    }
}

/// Symbolic expression over symbols of type `S`.
///
/// Parsed model expressions use `S = String`; lowered beta functions replace
/// every symbol with the index of its argument slot (`S = usize`).
/// Products keep their factor order since matrix factors do not commute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr<S = String> {
    /// Real literal.
    Num(f64),
    /// The imaginary unit.
    Imag,
    /// The constant pi.
    Pi,
    /// Reference to a named quantity.
    Sym(S),
    /// Sum of terms.
    Add(Vec<Expr<S>>),
    /// Ordered product of factors.
    Mul(Vec<Expr<S>>),
    /// Base raised to an exponent.
    Pow(Box<Expr<S>>, Box<Expr<S>>),
    /// Function application.
    Call(Func, Box<Expr<S>>),
}

impl<S> Expr<S> {
    /// Symbol reference.
    pub fn sym(symbol: impl Into<S>) -> Self {
        Expr::Sym(symbol.into())
    }

    /// Real literal.
    pub fn num(value: f64) -> Self {
        Expr::Num(value)
    }

    /// `self ** exponent` for an integer exponent.
    pub fn powi(self, exponent: i32) -> Self {
        Expr::Pow(Box::new(self), Box::new(Expr::Num(f64::from(exponent))))
    }

    /// `self ** exponent`.
    pub fn pow(self, exponent: Expr<S>) -> Self {
        Expr::Pow(Box::new(self), Box::new(exponent))
    }

    /// Applies `func` to the expression.
    pub fn call(self, func: Func) -> Self {
        Expr::Call(func, Box::new(self))
    }

    /// Complex conjugate.
    pub fn conj(self) -> Self {
        self.call(Func::Conj)
    }

    /// Conjugate transpose.
    pub fn adjoint(self) -> Self {
        self.call(Func::Adjoint)
    }

    /// Transpose.
    pub fn transpose(self) -> Self {
        self.call(Func::Transpose)
    }

    /// Trace.
    pub fn trace(self) -> Self {
        self.call(Func::Trace)
    }

    /// Modulus.
    pub fn abs(self) -> Self {
        self.call(Func::Abs)
    }

    /// Returns the literal value when the expression is a plain number.
    pub fn as_num(&self) -> Option<f64> {
        match self {
            Expr::Num(value) => Some(*value),
            _ => None,
        }
    }

    /// Whether the expression is free of symbols.
    pub fn is_constant(&self) -> bool {
        let mut constant = true;
        self.visit(&mut |node| {
            if matches!(node, Expr::Sym(_)) {
                constant = false;
            }
        });
        constant
    }

    /// Whether any node applies `func`.
    pub fn contains_call(&self, func: Func) -> bool {
        let mut found = false;
        self.visit(&mut |node| {
            if let Expr::Call(f, _) = node {
                if *f == func {
                    found = true;
                }
            }
        });
        found
    }

    /// Pre-order traversal over every node.
    pub fn visit<'a>(&'a self, f: &mut impl FnMut(&'a Expr<S>)) {
        f(self);
        match self {
            Expr::Num(_) | Expr::Imag | Expr::Pi | Expr::Sym(_) => {}
            Expr::Add(items) | Expr::Mul(items) => {
                for item in items {
                    item.visit(f);
                }
            }
            Expr::Pow(base, exp) => {
                base.visit(f);
                exp.visit(f);
            }
            Expr::Call(_, arg) => arg.visit(f),
        }
    }

    /// Rebuilds the tree, replacing every symbol by the expression returned
    /// from `f`.
    pub fn try_map_symbols<T, E>(
        &self,
        f: &mut impl FnMut(&S) -> Result<Expr<T>, E>,
    ) -> Result<Expr<T>, E> {
        Ok(match self {
            Expr::Num(value) => Expr::Num(*value),
            Expr::Imag => Expr::Imag,
            Expr::Pi => Expr::Pi,
            Expr::Sym(symbol) => f(symbol)?,
            Expr::Add(items) => Expr::Add(
                items
                    .iter()
                    .map(|item| item.try_map_symbols(f))
                    .collect::<Result<_, _>>()?,
            ),
            Expr::Mul(items) => Expr::Mul(
                items
                    .iter()
                    .map(|item| item.try_map_symbols(f))
                    .collect::<Result<_, _>>()?,
            ),
            Expr::Pow(base, exp) => Expr::Pow(
                Box::new(base.try_map_symbols(f)?),
                Box::new(exp.try_map_symbols(f)?),
            ),
            Expr::Call(func, arg) => Expr::Call(*func, Box::new(arg.try_map_symbols(f)?)),
        })
    }
}

impl<S: PartialEq> Expr<S> {
    /// Distinct symbols in order of first appearance.
    pub fn symbols(&self) -> Vec<&S> {
        let mut seen: Vec<&S> = Vec::new();
        self.visit(&mut |node| {
            if let Expr::Sym(symbol) = node {
                if !seen.contains(&symbol) {
                    seen.push(symbol);
                }
            }
        });
        seen
    }

    /// Whether `symbol` occurs anywhere in the tree.
    pub fn contains_symbol(&self, symbol: &S) -> bool {
        let mut found = false;
        self.visit(&mut |node| {
            if let Expr::Sym(candidate) = node {
                if candidate == symbol {
                    found = true;
                }
            }
        });
        found
    }
}

impl<S> Add for Expr<S> {
    type Output = Expr<S>;

    fn add(self, rhs: Expr<S>) -> Expr<S> {
        let mut terms = match self {
            Expr::Add(terms) => terms,
            other => vec![other],
        };
        match rhs {
            Expr::Add(more) => terms.extend(more),
            other => terms.push(other),
        }
        Expr::Add(terms)
    }
}

impl<S> Mul for Expr<S> {
    type Output = Expr<S>;

    fn mul(self, rhs: Expr<S>) -> Expr<S> {
        let mut factors = match self {
            Expr::Mul(factors) => factors,
            other => vec![other],
        };
        match rhs {
            Expr::Mul(more) => factors.extend(more),
            other => factors.push(other),
        }
        Expr::Mul(factors)
    }
}

impl<S> Neg for Expr<S> {
    type Output = Expr<S>;

    fn neg(self) -> Expr<S> {
        match self {
            Expr::Num(value) => Expr::Num(-value),
            other => Expr::Num(-1.0) * other,
        }
    }
}

impl<S> Sub for Expr<S> {
    type Output = Expr<S>;

    fn sub(self, rhs: Expr<S>) -> Expr<S> {
        self + (-rhs)
    }
}

impl<S> Div for Expr<S> {
    type Output = Expr<S>;

    fn div(self, rhs: Expr<S>) -> Expr<S> {
        self * rhs.powi(-1)
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

fn needs_parens_in_product<S>(expr: &Expr<S>, idx: usize) -> bool {
    match expr {
        Expr::Add(_) => true,
        Expr::Num(value) => *value < 0.0 && idx > 0,
        _ => false,
    }
}

fn is_atom<S>(expr: &Expr<S>) -> bool {
    match expr {
        Expr::Num(value) => *value >= 0.0,
        Expr::Imag | Expr::Pi | Expr::Sym(_) | Expr::Call(..) => true,
        _ => false,
    }
}

impl<S: fmt::Display> fmt::Display for Expr<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Num(value) => f.write_str(&format_number(*value)),
            Expr::Imag => f.write_str("I"),
            Expr::Pi => f.write_str("pi"),
            Expr::Sym(symbol) => write!(f, "{symbol}"),
            Expr::Add(terms) => {
                if terms.is_empty() {
                    return f.write_str("0");
                }
                for (idx, term) in terms.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(" + ")?;
                    }
                    if matches!(term, Expr::Add(_)) {
                        write!(f, "({term})")?;
                    } else {
                        write!(f, "{term}")?;
                    }
                }
                Ok(())
            }
            Expr::Mul(factors) => {
                if factors.is_empty() {
                    return f.write_str("1");
                }
                for (idx, factor) in factors.iter().enumerate() {
                    if idx > 0 {
                        f.write_str("*")?;
                    }
                    if needs_parens_in_product(factor, idx) {
                        write!(f, "({factor})")?;
                    } else {
                        write!(f, "{factor}")?;
                    }
                }
                Ok(())
            }
            Expr::Pow(base, exp) => {
                if is_atom(base) {
                    write!(f, "{base}")?;
                } else {
                    write!(f, "({base})")?;
                }
                f.write_str("**")?;
                if is_atom(exp) {
                    write!(f, "{exp}")
                } else {
                    write!(f, "({exp})")
                }
            }
            Expr::Call(func, arg) => write!(f, "{}({arg})", func.name()),
        }
    }
}
