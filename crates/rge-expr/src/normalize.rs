use rge_core::Shape;

use crate::expr::{Expr, Func};
use crate::shape::{infer_shape, integer_exponent};

const MAX_EXPANDED_POWER: i32 = 32;

/// Rewrites every product holding both a scalar factor `x` and `conj(x)`
/// into `abs(x)**(2m)`, where `m` is the matched multiplicity.
///
/// Real/imaginary cross terms of `x*conj(x)` cancel algebraically but not
/// numerically, so the rewrite keeps real flows exactly real. Matrix factors
/// never pair since they do not commute. Double conjugates are collapsed on
/// the way.
pub fn abs_squared<S>(expr: &Expr<S>, shape_of: &impl Fn(&S) -> Option<Shape>) -> Expr<S>
where
    S: Clone + PartialEq + std::fmt::Debug,
{
    let is_scalar = |factor: &Expr<S>| matches!(infer_shape(factor, shape_of), Ok(Shape::Scalar));
    normalize(expr, &is_scalar)
}

fn normalize<S: Clone + PartialEq>(expr: &Expr<S>, is_scalar: &impl Fn(&Expr<S>) -> bool) -> Expr<S> {
    match expr {
        Expr::Num(_) | Expr::Imag | Expr::Pi | Expr::Sym(_) => expr.clone(),
        Expr::Add(terms) => Expr::Add(terms.iter().map(|term| normalize(term, is_scalar)).collect()),
        Expr::Pow(base, exp) => Expr::Pow(
            Box::new(normalize(base, is_scalar)),
            Box::new(normalize(exp, is_scalar)),
        ),
        Expr::Call(Func::Conj, arg) => match normalize(arg, is_scalar) {
            Expr::Call(Func::Conj, inner) => *inner,
            other => other.conj(),
        },
        Expr::Call(func, arg) => normalize(arg, is_scalar).call(*func),
        Expr::Mul(factors) => {
            let mut current: Vec<Expr<S>> = factors.iter().map(|f| normalize(f, is_scalar)).collect();
            while let Some(next) = pair_conjugates(&current, is_scalar) {
                current = next;
            }
            match current.len() {
                0 => Expr::Num(1.0),
                1 => current.remove(0),
                _ => Expr::Mul(current),
            }
        }
    }
}

fn expand_factors<S: Clone>(factors: &[Expr<S>], out: &mut Vec<Expr<S>>) {
    for factor in factors {
        match factor {
            Expr::Mul(inner) => expand_factors(inner, out),
            Expr::Pow(base, exp) => match integer_exponent(exp) {
                Some(n) if n > 0 && n <= MAX_EXPANDED_POWER => {
                    for _ in 0..n {
                        out.push((**base).clone());
                    }
                }
                _ => out.push(factor.clone()),
            },
            other => out.push(other.clone()),
        }
    }
}

fn is_pairable<S>(factor: &Expr<S>) -> bool {
    !matches!(
        factor,
        Expr::Num(_) | Expr::Imag | Expr::Pi | Expr::Call(Func::Conj, _) | Expr::Call(Func::Abs, _)
    )
}

/// One pairing pass over a product; `None` when nothing pairs.
fn pair_conjugates<S: Clone + PartialEq>(
    factors: &[Expr<S>],
    is_scalar: &impl Fn(&Expr<S>) -> bool,
) -> Option<Vec<Expr<S>>> {
    let mut expanded = Vec::new();
    expand_factors(factors, &mut expanded);

    let mut pairs: Vec<(Expr<S>, usize)> = Vec::new();
    for factor in &expanded {
        if !is_pairable(factor) || pairs.iter().any(|(seen, _)| seen == factor) || !is_scalar(factor) {
            continue;
        }
        let conjugate = factor.clone().conj();
        let count = expanded.iter().filter(|f| *f == factor).count();
        let conj_count = expanded.iter().filter(|f| **f == conjugate).count();
        let matched = count.min(conj_count);
        if matched > 0 {
            pairs.push((factor.clone(), matched));
        }
    }
    if pairs.is_empty() {
        return None;
    }

    for (factor, matched) in &pairs {
        let conjugate = factor.clone().conj();
        for target in [factor, &conjugate] {
            let mut remaining = *matched;
            expanded.retain(|f| {
                if remaining > 0 && f == target {
                    remaining -= 1;
                    false
                } else {
                    true
                }
            });
        }
    }

    let mut rebuilt: Vec<Expr<S>> = pairs
        .into_iter()
        .map(|(factor, matched)| factor.abs().powi(2 * matched as i32))
        .collect();
    rebuilt.extend(regroup(expanded));
    Some(rebuilt)
}

/// Collapses runs of identical neighbouring factors back into powers.
fn regroup<S: Clone + PartialEq>(factors: Vec<Expr<S>>) -> Vec<Expr<S>> {
    let mut out: Vec<(Expr<S>, i32)> = Vec::new();
    for factor in factors {
        match out.last_mut() {
            Some((last, count)) if *last == factor => *count += 1,
            _ => out.push((factor, 1)),
        }
    }
    out.into_iter()
        .map(|(factor, count)| if count == 1 { factor } else { factor.powi(count) })
        .collect()
}
