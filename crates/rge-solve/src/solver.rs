use std::collections::BTreeMap;
use std::time::Instant;

use num_complex::Complex64;
use rge_core::{CouplingKind, RgeError, Value};
use rge_expr::Quantity;
use rge_lower::{lower_model, LoweredModel, LoweringReport, ModelSpec};
use rge_registry::CouplingRegistry;
use tracing::{debug, info, warn};

use crate::bdf::{Bdf, BdfSettings};
use crate::config::SolverConfig;
use crate::derivative::BetaSystem;
use crate::hash::hash_trajectories;
use crate::reconstruct::reconstruct_matrix;
use crate::report::InitialConditions;
use crate::trajectory::{
    Direction, IntegrationFailure, ReconstructionFailure, Solution, SolverPhase, Trajectory,
};

fn solver_error(code: &str, message: impl Into<String>) -> RgeError {
    RgeError::configuration(code, message)
}

/// Monotone complex flags of the flat slots during a run.
struct ComplexTracker {
    flags: Vec<bool>,
    promoted_at: Vec<Option<f64>>,
    tolerance: f64,
}

impl ComplexTracker {
    fn new(initial: &[bool], tolerance: f64) -> Self {
        Self {
            flags: initial.to_vec(),
            promoted_at: vec![None; initial.len()],
            tolerance,
        }
    }

    fn observe(&mut self, t: f64, y: &[Complex64]) {
        for ((flag, promoted), z) in self.flags.iter_mut().zip(&mut self.promoted_at).zip(y) {
            if !*flag && z.im.abs() > self.tolerance {
                *flag = true;
                *promoted = Some(t);
            }
        }
    }
}

/// Where a sweep starts and where it must stop.
#[derive(Debug, Clone, Copy)]
struct Span {
    direction: Direction,
    origin: f64,
    bound: f64,
    step: f64,
}

/// Samples of one sweep, ordered away from the initial scale.
struct Sweep {
    samples: Vec<(f64, Vec<Complex64>)>,
    failure: Option<IntegrationFailure>,
}

fn sweep(
    system: &BetaSystem<'_>,
    span: Span,
    y0: Vec<Complex64>,
    settings: BdfSettings,
    tracker: &mut ComplexTracker,
) -> Sweep {
    let Span {
        direction,
        origin,
        bound,
        step,
    } = span;
    let interval = match direction {
        Direction::Upward => step,
        Direction::Downward => -step,
    };
    let within = |t: f64| match direction {
        Direction::Upward => t < bound + step / 2.0,
        Direction::Downward => t > bound - step / 2.0,
    };
    let mut rhs = |t: f64, y: &[Complex64]| system.derivative(t, y);
    let mut bdf = Bdf::new(origin, y0, interval, settings);
    let mut samples = Vec::new();
    let mut k = 1u64;
    loop {
        let t = origin + interval * k as f64;
        if !within(t) {
            break;
        }
        match bdf.advance(&mut rhs) {
            Ok(y) => {
                tracker.observe(t, &y);
                samples.push((t, y));
            }
            Err(reason) => {
                let failure = IntegrationFailure {
                    direction,
                    reached: bdf.time(),
                    target: bound,
                    reason,
                };
                warn!(
                    direction = %direction,
                    reached = failure.reached,
                    bound,
                    error = %failure.reason,
                    "integration stopped early"
                );
                return Sweep {
                    samples,
                    failure: Some(failure),
                };
            }
        }
        k += 1;
    }
    debug!(
        direction = %direction,
        samples = samples.len(),
        evaluations = bdf.evaluations(),
        "sweep finished"
    );
    Sweep {
        samples,
        failure: None,
    }
}

/// Solver facade owning a lowered model, its run settings and the last
/// solution.
#[derive(Debug, Clone)]
pub struct RgeSolver {
    model: LoweredModel,
    config: SolverConfig,
    loops: BTreeMap<CouplingKind, u32>,
    gauge: f64,
    phase: SolverPhase,
    solution: Option<Solution>,
}

impl RgeSolver {
    /// Lowers `spec` and prepares a solver; configuration errors surface here.
    pub fn new(spec: &ModelSpec, config: SolverConfig) -> Result<Self, RgeError> {
        config.validate()?;
        Self::from_lowered(lower_model(spec)?, config)
    }

    /// Wraps an already lowered model.
    pub fn from_lowered(model: LoweredModel, config: SolverConfig) -> Result<Self, RgeError> {
        config.validate()?;
        Ok(Self {
            loops: model.loops.clone(),
            gauge: model.gauge_fixing,
            model,
            config,
            phase: SolverPhase::Idle,
            solution: None,
        })
    }

    fn invalidate(&mut self) {
        self.solution = None;
        self.phase = SolverPhase::Idle;
    }

    /// Replaces the run configuration.
    pub fn set_config(&mut self, config: SolverConfig) -> Result<(), RgeError> {
        config.validate()?;
        self.config = config;
        self.invalidate();
        Ok(())
    }

    /// Sets the initial value of a coupling.
    ///
    /// Slots whose imaginary part exceeds the complex tolerance become complex.
    pub fn set_initial_value(&mut self, name: &str, value: Quantity) -> Result<(), RgeError> {
        let registry = &mut self.model.registry;
        registry.set_initial_value(name, value.clone())?;
        let slots = registry
            .by_name(name)
            .map(|coupling| coupling.slots())
            .unwrap_or(0..0);
        for (slot, z) in slots.zip(value.row_major()) {
            if z.im.abs() > self.config.complex_tolerance {
                registry.mark_complex(slot)?;
            }
        }
        self.invalidate();
        Ok(())
    }

    /// Sets the loop order at which couplings of `kind` run; 0 freezes them.
    pub fn set_loops(&mut self, kind: CouplingKind, order: u32) {
        self.loops.insert(kind, order);
        self.invalidate();
    }

    /// Sets the same loop order for every kind present in the model.
    pub fn set_all_loops(&mut self, order: u32) {
        for kind in self.model.registry.kinds() {
            self.loops.insert(kind, order);
        }
        self.invalidate();
    }

    /// Binds the gauge parameter.
    pub fn fix_gauge(&mut self, xi: f64) -> Result<(), RgeError> {
        if !xi.is_finite() {
            return Err(solver_error("gauge", "the gauge parameter must be finite").with_context("xi", xi));
        }
        self.gauge = xi;
        self.invalidate();
        Ok(())
    }

    /// Loop cap per kind.
    pub fn loops(&self) -> &BTreeMap<CouplingKind, u32> {
        &self.loops
    }

    /// Current gauge parameter.
    pub fn gauge(&self) -> f64 {
        self.gauge
    }

    /// Run configuration.
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Lowered model.
    pub fn model(&self) -> &LoweredModel {
        &self.model
    }

    /// Coupling registry.
    pub fn registry(&self) -> &CouplingRegistry {
        &self.model.registry
    }

    /// Warnings and omissions from lowering.
    pub fn lowering_report(&self) -> &LoweringReport {
        &self.model.report
    }

    /// Lifecycle state.
    pub fn phase(&self) -> SolverPhase {
        self.phase
    }

    /// Last solution, if any.
    pub fn solution(&self) -> Option<&Solution> {
        self.solution.as_ref()
    }

    /// Values of every coupling of `kind` in a flat state vector.
    pub fn extract_couplings(
        &self,
        flat: &[Complex64],
        kind: CouplingKind,
    ) -> Result<Vec<(String, Quantity)>, RgeError> {
        self.model.registry.extract_couplings(flat, kind)
    }

    /// Running scheme and initial values.
    pub fn initial_conditions(&self) -> InitialConditions {
        InitialConditions::collect(&self.model.name, &self.loops, &self.model.registry)
    }

    /// Integrates upward to `tmax`, then downward to `tmin`, and merges the
    /// two sweeps on one increasing grid.
    ///
    /// Integration failures do not fail the call: the partial samples are
    /// kept and the failure is listed in [`Solution::failures`].
    pub fn solve(&mut self) -> Result<&Solution, RgeError> {
        self.invalidate();
        self.config.validate()?;
        let step = self.config.step()?;
        let started = Instant::now();
        let t0 = self.config.initial_scale;
        let settings = BdfSettings {
            rtol: self.config.rtol,
            atol: self.config.atol,
            max_order: self.config.max_order,
            max_halvings: self.config.max_halvings,
        };

        let system = BetaSystem::new(&self.model, &self.loops, self.gauge, self.config.scale_variable)?;
        let y0 = self.model.registry.flatten();
        let mut tracker = ComplexTracker::new(self.model.registry.complex_slots(), self.config.complex_tolerance);
        tracker.observe(t0, &y0);

        let mut phases = Vec::new();
        let mut failures = Vec::new();

        self.phase = SolverPhase::RunningUpward;
        let mut up = Sweep {
            samples: Vec::new(),
            failure: None,
        };
        if t0 < self.config.tmax {
            phases.push(Direction::Upward);
            let span = Span {
                direction: Direction::Upward,
                origin: t0,
                bound: self.config.tmax,
                step,
            };
            up = sweep(&system, span, y0.clone(), settings, &mut tracker);
            failures.extend(up.failure.take());
        }

        let mut down = Sweep {
            samples: Vec::new(),
            failure: None,
        };
        if t0 > self.config.tmin {
            self.phase = SolverPhase::RunningDownward;
            phases.push(Direction::Downward);
            let span = Span {
                direction: Direction::Downward,
                origin: t0,
                bound: self.config.tmin,
                step,
            };
            down = sweep(&system, span, y0.clone(), settings, &mut tracker);
            failures.extend(down.failure.take());
        }

        let samples: Vec<(f64, Vec<Complex64>)> = down
            .samples
            .into_iter()
            .rev()
            .chain(std::iter::once((t0, y0)))
            .chain(up.samples)
            .collect();
        let scales: Vec<f64> = samples.iter().map(|(t, _)| *t).collect();

        let registry = &self.model.registry;
        let trajectories: Vec<Trajectory> = registry
            .flat_couplings()
            .into_iter()
            .map(|slot| {
                let is_complex = tracker.flags[slot.position];
                Trajectory {
                    parent: registry
                        .get(slot.parent)
                        .map(|coupling| coupling.name.clone())
                        .unwrap_or_else(|| slot.name.clone()),
                    kind: slot.kind,
                    position: slot.position,
                    is_complex,
                    promoted_at: tracker.promoted_at[slot.position],
                    values: samples
                        .iter()
                        .map(|(_, y)| Value::typed(y[slot.position], is_complex))
                        .collect(),
                    name: slot.name,
                }
            })
            .collect();

        let mut matrices = Vec::new();
        let mut reconstruction_errors = Vec::new();
        for coupling in registry.couplings().iter().filter(|coupling| coupling.is_matrix()) {
            let (rows, cols) = coupling.shape.dims();
            let elements: Vec<&Trajectory> = coupling
                .slots()
                .filter_map(|slot| trajectories.get(slot))
                .collect();
            match reconstruct_matrix(&coupling.name, coupling.kind, rows, cols, &elements) {
                Ok(matrix) => matrices.push(matrix),
                Err(error) => {
                    warn!(coupling = %coupling.name, error = %error, "matrix reconstruction failed");
                    reconstruction_errors.push(ReconstructionFailure {
                        coupling: coupling.name.clone(),
                        error,
                    });
                }
            }
        }

        for (position, flag) in tracker.flags.iter().enumerate() {
            if *flag && self.model.registry.mark_complex(position)? {
                debug!(position, "slot promoted to complex");
            }
        }

        let run_hash = hash_trajectories(&scales, &trajectories)?;
        let solution = Solution {
            scales,
            trajectories,
            matrices,
            phases,
            failures,
            reconstruction_errors,
            run_hash,
        };
        self.phase = SolverPhase::Merged;
        info!(
            model = %self.model.name,
            samples = solution.len(),
            failures = solution.failures.len(),
            promotions = solution.promotions().len(),
            elapsed_ms = started.elapsed().as_secs_f64() * 1e3,
            "solve finished"
        );
        Ok(self.solution.insert(solution))
    }
}
