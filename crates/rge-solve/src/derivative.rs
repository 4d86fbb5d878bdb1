use std::collections::BTreeMap;

use num_complex::Complex64;
use rge_core::{CouplingKind, ErrorInfo, RgeError};
use rge_expr::Quantity;
use rge_lower::LoweredModel;

use crate::config::ScaleVariable;

/// Numeric right-hand side `dy/dt` of a lowered model.
///
/// Term `n` of a beta function contributes only while `loops[kind] >= n`,
/// scaled by `kappa(n) / beta_factor` and the scale-variable factor.
pub struct BetaSystem<'a> {
    model: &'a LoweredModel,
    loops: &'a BTreeMap<CouplingKind, u32>,
    gauge: f64,
    factors: Vec<Vec<f64>>,
}

impl<'a> BetaSystem<'a> {
    /// Precomputes the per-term factors.
    pub fn new(
        model: &'a LoweredModel,
        loops: &'a BTreeMap<CouplingKind, u32>,
        gauge: f64,
        scale_variable: ScaleVariable,
    ) -> Result<Self, RgeError> {
        let mut factors = Vec::with_capacity(model.system.len());
        for beta in &model.system {
            let mut per_term = Vec::with_capacity(beta.terms.len());
            for term in &beta.terms {
                let factor = model.normalization.factor(term.loop_order).ok_or_else(|| {
                    RgeError::Configuration(
                        ErrorInfo::new("loop-normalization", "no normalisation for a loop order")
                            .with_context("loop", term.loop_order)
                            .with_context("beta", &beta.name),
                    )
                })?;
                per_term.push(factor * scale_variable.factor());
            }
            factors.push(per_term);
        }
        Ok(Self {
            model,
            loops,
            gauge,
            factors,
        })
    }

    /// Length of the state vector.
    pub fn dimension(&self) -> usize {
        self.model.registry.total_elements()
    }

    /// Evaluates `dy/dt` at `y`. The system is autonomous, so `t` only
    /// labels diagnostics.
    pub fn derivative(&self, t: f64, y: &[Complex64]) -> Result<Vec<Complex64>, RgeError> {
        let registry = &self.model.registry;
        let values = registry.unflatten(y)?;
        let mut dy = vec![Complex64::new(0.0, 0.0); y.len()];
        for (beta, factors) in self.model.system.iter().zip(&self.factors) {
            let cap = self.loops.get(&beta.kind).copied().unwrap_or(0);
            let mut total: Option<Quantity> = None;
            for (term, factor) in beta.terms.iter().zip(factors) {
                if term.loop_order > cap {
                    continue;
                }
                let arguments = beta.bind(&values, term.loop_order, self.gauge)?;
                let value = term
                    .evaluate(&arguments)
                    .map_err(|err| err.with_context("beta", &beta.name).with_context("scale", t))?
                    .mul(&Quantity::real(*factor))?;
                total = Some(match total {
                    Some(acc) => acc.add(&value)?,
                    None => value,
                });
            }
            let (Some(total), Some(coupling)) = (total, registry.get(beta.target)) else {
                continue;
            };
            for (slot, value) in dy[coupling.slots()].iter_mut().zip(total.row_major()) {
                *slot = value;
            }
        }
        Ok(dy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rge_lower::{lower_model, CouplingSpec, InitialValue, ModelSpec};

    fn model() -> LoweredModel {
        let spec = ModelSpec::new("Toy")
            .with_coupling(CouplingSpec::scalar("g1", CouplingKind::GaugeCouplings).with_initial(InitialValue::Real(0.5)))
            .with_coupling(CouplingSpec::scalar("lambda", CouplingKind::QuarticTerms))
            .with_rge(CouplingKind::GaugeCouplings, 1, "g1", "g1**3")
            .with_rge(CouplingKind::GaugeCouplings, 2, "g1", "g1**5")
            .with_rge(CouplingKind::QuarticTerms, 1, "lambda", "g1**4")
            .with_loops(CouplingKind::GaugeCouplings, 2)
            .with_loops(CouplingKind::QuarticTerms, 1);
        lower_model(&spec).unwrap()
    }

    #[test]
    fn terms_are_gated_by_the_loop_cap() {
        let model = model();
        let kappa = 1.0 / (16.0 * std::f64::consts::PI.powi(2));
        let y = [Complex64::new(0.5, 0.0), Complex64::new(0.0, 0.0)];

        let mut loops = model.loops.clone();
        let system = BetaSystem::new(&model, &loops, 0.0, ScaleVariable::Ln).unwrap();
        let dy = system.derivative(0.0, &y).unwrap();
        let expected = kappa * 0.5f64.powi(3) + kappa * kappa * 0.5f64.powi(5);
        assert!((dy[0].re - expected).abs() < 1e-15);
        assert!((dy[1].re - kappa * 0.0625).abs() < 1e-15);

        loops.insert(CouplingKind::GaugeCouplings, 1);
        loops.insert(CouplingKind::QuarticTerms, 0);
        let system = BetaSystem::new(&model, &loops, 0.0, ScaleVariable::Log10).unwrap();
        let dy = system.derivative(0.0, &y).unwrap();
        assert!((dy[0].re - std::f64::consts::LN_10 * kappa * 0.125).abs() < 1e-15);
        assert_eq!(dy[1], Complex64::new(0.0, 0.0));
        assert_eq!(system.dimension(), 2);
    }

    #[test]
    fn state_length_is_checked() {
        let model = model();
        let system = BetaSystem::new(&model, &model.loops, 0.0, ScaleVariable::Ln).unwrap();
        let err = system.derivative(0.0, &[Complex64::new(0.5, 0.0)]).unwrap_err();
        assert!(matches!(err, RgeError::ShapeMismatch(_)));
    }
}
