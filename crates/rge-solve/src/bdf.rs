use std::collections::VecDeque;

use nalgebra::{DMatrix, DVector, Dyn, LU};
use num_complex::Complex64;
use rge_core::{ErrorInfo, RgeError};

const MAX_NEWTON_ITERATIONS: usize = 4;
const GROWTH_THRESHOLD: f64 = 0.1;

const BDF1: [f64; 1] = [1.0];
const BDF2: [f64; 2] = [4.0 / 3.0, -1.0 / 3.0];
const BDF3: [f64; 3] = [18.0 / 11.0, -9.0 / 11.0, 2.0 / 11.0];
const BDF4: [f64; 4] = [48.0 / 25.0, -36.0 / 25.0, 16.0 / 25.0, -3.0 / 25.0];
const BDF5: [f64; 5] = [
    300.0 / 137.0,
    -300.0 / 137.0,
    200.0 / 137.0,
    -75.0 / 137.0,
    12.0 / 137.0,
];

/// `(alpha, beta)` with `y[n+1] = sum_j alpha[j] * y[n-j] + beta * h * f(t[n+1], y[n+1])`.
fn coefficients(order: usize) -> (&'static [f64], f64) {
    match order {
        1 => (&BDF1, 1.0),
        2 => (&BDF2, 2.0 / 3.0),
        3 => (&BDF3, 6.0 / 11.0),
        4 => (&BDF4, 12.0 / 25.0),
        _ => (&BDF5, 60.0 / 137.0),
    }
}

fn binomial(n: usize, k: usize) -> f64 {
    (0..k).fold(1.0, |acc, i| acc * (n - i) as f64 / (i + 1) as f64)
}

fn all_finite(values: &[Complex64]) -> bool {
    values.iter().all(|z| z.re.is_finite() && z.im.is_finite())
}

fn integration_error(code: &str, message: impl Into<String>) -> RgeError {
    RgeError::Integration(ErrorInfo::new(code, message))
}

/// Step-controller settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BdfSettings {
    /// Relative tolerance.
    pub rtol: f64,
    /// Absolute tolerance.
    pub atol: f64,
    /// Highest order, 1 to 5.
    pub max_order: usize,
    /// Maximum number of halvings of the output step.
    pub max_halvings: u32,
}

/// Variable-order BDF integrator on a complex state.
///
/// Steps are the output interval divided by a power of two, so every output
/// point is hit exactly. Rejected steps halve the step and restart at order
/// one; smooth stretches double it again. Newton iterations reuse a
/// finite-difference Jacobian of the real `2N` system until they stop
/// converging.
pub struct Bdf {
    settings: BdfSettings,
    origin: f64,
    interval: f64,
    intervals_done: u64,
    progress: u64,
    level: u32,
    history: VecDeque<Vec<Complex64>>,
    order: usize,
    steps_at_level: usize,
    jacobian: Option<DMatrix<f64>>,
    jacobian_fresh: bool,
    factorization: Option<(f64, LU<f64, Dyn, Dyn>)>,
    newton_tol: f64,
    evaluations: usize,
}

impl Bdf {
    /// Starts at `(origin, y0)` with the signed output interval `interval`.
    pub fn new(origin: f64, y0: Vec<Complex64>, interval: f64, settings: BdfSettings) -> Self {
        let newton_tol = (10.0 * f64::EPSILON / settings.rtol).max(0.03f64.min(settings.rtol.sqrt()));
        let mut history = VecDeque::new();
        history.push_front(y0);
        Self {
            settings: BdfSettings {
                max_order: settings.max_order.clamp(1, 5),
                max_halvings: settings.max_halvings.min(40),
                ..settings
            },
            origin,
            interval,
            intervals_done: 0,
            progress: 0,
            level: 0,
            history,
            order: 1,
            steps_at_level: 0,
            jacobian: None,
            jacobian_fresh: false,
            factorization: None,
            newton_tol,
            evaluations: 0,
        }
    }

    fn units_per_interval(&self) -> u64 {
        1u64 << self.settings.max_halvings
    }

    fn units_per_step(&self) -> u64 {
        1u64 << (self.settings.max_halvings - self.level)
    }

    fn time_at(&self, progress: u64) -> f64 {
        let fraction = progress as f64 / self.units_per_interval() as f64;
        self.origin + self.interval * (self.intervals_done as f64 + fraction)
    }

    /// Scale of the last accepted state.
    pub fn time(&self) -> f64 {
        self.time_at(self.progress)
    }

    /// Last accepted state.
    pub fn state(&self) -> &[Complex64] {
        &self.history[0]
    }

    /// Number of derivative evaluations so far.
    pub fn evaluations(&self) -> usize {
        self.evaluations
    }

    /// Current order.
    pub fn order(&self) -> usize {
        self.order
    }

    /// Integrates to the next output point and returns the state there.
    pub fn advance<F>(&mut self, rhs: &mut F) -> Result<Vec<Complex64>, RgeError>
    where
        F: FnMut(f64, &[Complex64]) -> Result<Vec<Complex64>, RgeError>,
    {
        while self.progress < self.units_per_interval() {
            self.step(rhs)?;
        }
        self.intervals_done += 1;
        self.progress = 0;
        Ok(self.history[0].clone())
    }

    fn evaluate<F>(&mut self, rhs: &mut F, t: f64, y: &[Complex64]) -> Result<Vec<Complex64>, RgeError>
    where
        F: FnMut(f64, &[Complex64]) -> Result<Vec<Complex64>, RgeError>,
    {
        self.evaluations += 1;
        rhs(t, y).map_err(|err| {
            RgeError::Integration(
                ErrorInfo::new("evaluation", "beta functions could not be evaluated")
                    .with_context("scale", t)
                    .with_context("source", err),
            )
        })
    }

    fn step<F>(&mut self, rhs: &mut F) -> Result<(), RgeError>
    where
        F: FnMut(f64, &[Complex64]) -> Result<Vec<Complex64>, RgeError>,
    {
        loop {
            let t = self.time();
            let t_new = self.time_at(self.progress + self.units_per_step());
            let h = t_new - t;
            if let Some((y_new, error)) = self.try_step(rhs, t, t_new, h)? {
                self.accept(y_new, error);
                return Ok(());
            }
            self.halve(t, h)?;
        }
    }

    fn halve(&mut self, t: f64, h: f64) -> Result<(), RgeError> {
        if self.level >= self.settings.max_halvings {
            return Err(integration_error("step-underflow", "step size fell below the smallest allowed fraction")
                .with_context("scale", t)
                .with_context("step", h));
        }
        self.level += 1;
        self.history.truncate(1);
        self.order = 1;
        self.steps_at_level = 0;
        Ok(())
    }

    fn accept(&mut self, y_new: Vec<Complex64>, error: f64) {
        self.history.push_front(y_new);
        self.history.truncate(2 * self.settings.max_order + 2);
        self.progress += self.units_per_step();
        self.steps_at_level += 1;
        self.jacobian_fresh = false;
        self.order = (self.order + 1).min(self.settings.max_order);

        let aligned = self.progress % (2 * self.units_per_step()) == 0;
        if self.level > 0 && aligned && error < GROWTH_THRESHOLD && self.steps_at_level > self.order {
            self.level -= 1;
            self.steps_at_level = 0;
            self.history = self.history.iter().step_by(2).cloned().collect();
            self.order = self.order.min(self.history.len());
        }
    }

    fn weights(&self, a: &[Complex64], b: &[Complex64]) -> Vec<f64> {
        a.iter()
            .zip(b)
            .map(|(x, y)| self.settings.atol + self.settings.rtol * x.norm().max(y.norm()))
            .collect()
    }

    fn predict<F>(&mut self, rhs: &mut F, t: f64, h: f64, order: usize) -> Result<Option<Vec<Complex64>>, RgeError>
    where
        F: FnMut(f64, &[Complex64]) -> Result<Vec<Complex64>, RgeError>,
    {
        if self.history.len() == 1 {
            let y = self.history[0].clone();
            let f = self.evaluate(rhs, t, &y)?;
            if !all_finite(&f) {
                return Ok(None);
            }
            return Ok(Some(y.iter().zip(&f).map(|(y, f)| y + f * h).collect()));
        }
        let points = (order + 1).min(self.history.len());
        let mut predicted = vec![Complex64::new(0.0, 0.0); self.history[0].len()];
        for j in 0..points {
            let sign = if j % 2 == 0 { 1.0 } else { -1.0 };
            let weight = sign * binomial(points, j + 1);
            for (acc, value) in predicted.iter_mut().zip(&self.history[j]) {
                *acc += value * weight;
            }
        }
        Ok(Some(predicted))
    }

    fn try_step<F>(
        &mut self,
        rhs: &mut F,
        t: f64,
        t_new: f64,
        h: f64,
    ) -> Result<Option<(Vec<Complex64>, f64)>, RgeError>
    where
        F: FnMut(f64, &[Complex64]) -> Result<Vec<Complex64>, RgeError>,
    {
        let order = self.order.min(self.history.len());
        let Some(predicted) = self.predict(rhs, t, h, order)? else {
            return Ok(None);
        };
        if !all_finite(&predicted) {
            return Ok(None);
        }

        let (alpha, beta) = coefficients(order);
        let mut psi = vec![Complex64::new(0.0, 0.0); predicted.len()];
        for (coefficient, past) in alpha.iter().zip(&self.history) {
            for (acc, value) in psi.iter_mut().zip(past) {
                *acc += value * *coefficient;
            }
        }
        let bh = beta * h;

        for _ in 0..2 {
            if self.jacobian.is_none() && !self.refresh_jacobian(rhs, t_new, &predicted)? {
                return Ok(None);
            }
            if let Some(corrected) = self.newton(rhs, t_new, &predicted, &psi, bh)? {
                let weights = self.weights(&corrected, &self.history[0]);
                let difference: Vec<Complex64> = corrected.iter().zip(&predicted).map(|(a, b)| a - b).collect();
                let error = weighted_norm(&difference, &weights) / (order + 1) as f64;
                if error <= 1.0 {
                    return Ok(Some((corrected, error)));
                }
                return Ok(None);
            }
            if self.jacobian_fresh {
                return Ok(None);
            }
            self.jacobian = None;
        }
        Ok(None)
    }

    /// Finite-difference Jacobian of the real `2N` system at `(t, y)`.
    fn refresh_jacobian<F>(&mut self, rhs: &mut F, t: f64, y: &[Complex64]) -> Result<bool, RgeError>
    where
        F: FnMut(f64, &[Complex64]) -> Result<Vec<Complex64>, RgeError>,
    {
        let n = y.len();
        let f0 = self.evaluate(rhs, t, y)?;
        if !all_finite(&f0) {
            return Ok(false);
        }
        let mut jacobian = DMatrix::zeros(2 * n, 2 * n);
        let mut perturbed = y.to_vec();
        for i in 0..n {
            for part in 0..2 {
                let delta = f64::EPSILON.sqrt() * y[i].norm().max(1e-6);
                perturbed[i] = if part == 0 {
                    y[i] + Complex64::new(delta, 0.0)
                } else {
                    y[i] + Complex64::new(0.0, delta)
                };
                let f = self.evaluate(rhs, t, &perturbed)?;
                perturbed[i] = y[i];
                if !all_finite(&f) {
                    return Ok(false);
                }
                for j in 0..n {
                    let derivative = (f[j] - f0[j]) / delta;
                    jacobian[(2 * j, 2 * i + part)] = derivative.re;
                    jacobian[(2 * j + 1, 2 * i + part)] = derivative.im;
                }
            }
        }
        self.jacobian = Some(jacobian);
        self.jacobian_fresh = true;
        self.factorization = None;
        Ok(true)
    }

    fn factorize(&mut self, bh: f64) {
        if matches!(&self.factorization, Some((cached, _)) if *cached == bh) {
            return;
        }
        if let Some(jacobian) = &self.jacobian {
            let dim = jacobian.nrows();
            let iteration = DMatrix::<f64>::identity(dim, dim) - jacobian.scale(bh);
            self.factorization = Some((bh, iteration.lu()));
        }
    }

    fn newton<F>(
        &mut self,
        rhs: &mut F,
        t: f64,
        predicted: &[Complex64],
        psi: &[Complex64],
        bh: f64,
    ) -> Result<Option<Vec<Complex64>>, RgeError>
    where
        F: FnMut(f64, &[Complex64]) -> Result<Vec<Complex64>, RgeError>,
    {
        self.factorize(bh);
        let weights = self.weights(predicted, predicted);
        let mut y = predicted.to_vec();
        for _ in 0..MAX_NEWTON_ITERATIONS {
            let f = self.evaluate(rhs, t, &y)?;
            if !all_finite(&f) {
                return Ok(None);
            }
            let mut residual = DVector::zeros(2 * y.len());
            for (j, ((value, past), slope)) in y.iter().zip(psi).zip(&f).enumerate() {
                let g = value - past - slope * bh;
                residual[2 * j] = -g.re;
                residual[2 * j + 1] = -g.im;
            }
            let Some((_, lu)) = &self.factorization else {
                return Ok(None);
            };
            let Some(delta) = lu.solve(&residual) else {
                return Ok(None);
            };
            let step: Vec<Complex64> = (0..y.len())
                .map(|j| Complex64::new(delta[2 * j], delta[2 * j + 1]))
                .collect();
            for (value, change) in y.iter_mut().zip(&step) {
                *value += change;
            }
            if !all_finite(&y) {
                return Ok(None);
            }
            if weighted_norm(&step, &weights) <= self.newton_tol {
                return Ok(Some(y));
            }
        }
        Ok(None)
    }
}

/// Root-mean-square of `values[i] / weights[i]`.
fn weighted_norm(values: &[Complex64], weights: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let sum: f64 = values
        .iter()
        .zip(weights)
        .map(|(value, weight)| value.norm_sqr() / (weight * weight))
        .sum();
    (sum / values.len() as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> BdfSettings {
        BdfSettings {
            rtol: 1e-8,
            atol: 1e-12,
            max_order: 5,
            max_halvings: 24,
        }
    }

    #[test]
    fn extrapolation_weights_match_finite_differences() {
        assert_eq!(binomial(3, 1), 3.0);
        assert_eq!(binomial(3, 2), 3.0);
        assert_eq!(binomial(5, 5), 1.0);
    }

    #[test]
    fn coefficients_sum_to_one() {
        for order in 1..=5 {
            let (alpha, _) = coefficients(order);
            let sum: f64 = alpha.iter().sum();
            assert!((sum - 1.0).abs() < 1e-12, "order {order}");
        }
    }

    #[test]
    fn integrates_exponential_decay() {
        let mut rhs = |_t: f64, y: &[Complex64]| Ok(y.iter().map(|y| -y).collect::<Vec<_>>());
        let mut bdf = Bdf::new(0.0, vec![Complex64::new(1.0, 0.0)], 0.5, settings());
        let mut t: f64 = 0.0;
        for _ in 0..4 {
            let y = bdf.advance(&mut rhs).unwrap();
            t += 0.5;
            assert!((y[0].re - (-t).exp()).abs() < 1e-5, "t={t} y={}", y[0]);
        }
        assert!((bdf.time() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn integrates_backwards_and_rotates_in_the_complex_plane() {
        let mut rhs = |_t: f64, y: &[Complex64]| Ok(y.iter().map(|y| y * Complex64::new(0.0, 1.0)).collect::<Vec<_>>());
        let mut bdf = Bdf::new(1.0, vec![Complex64::new(1.0, 0.0)], -0.25, settings());
        let y = bdf.advance(&mut rhs).unwrap();
        let expected = Complex64::new(0.0, -0.25).exp();
        assert!((y[0] - expected).norm() < 1e-5);
        assert!((bdf.time() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn non_finite_derivatives_exhaust_the_halvings() {
        let mut rhs = |_t: f64, y: &[Complex64]| Ok(y.iter().map(|y| y.inv()).collect::<Vec<_>>());
        let mut bdf = Bdf::new(0.0, vec![Complex64::new(0.0, 0.0)], 0.1, settings());
        let err = bdf.advance(&mut rhs).unwrap_err();
        assert!(matches!(err, RgeError::Integration(_)));
        assert_eq!(err.info().code, "step-underflow");
        assert_eq!(bdf.time(), 0.0);
    }

    #[test]
    fn evaluation_errors_stop_immediately() {
        let mut rhs = |_t: f64, _y: &[Complex64]| -> Result<Vec<Complex64>, RgeError> {
            Err(RgeError::expression("boom", "broken"))
        };
        let mut bdf = Bdf::new(0.0, vec![Complex64::new(1.0, 0.0)], 0.1, settings());
        let err = bdf.advance(&mut rhs).unwrap_err();
        assert_eq!(err.info().code, "evaluation");
        assert_eq!(bdf.evaluations(), 1);
    }
}
