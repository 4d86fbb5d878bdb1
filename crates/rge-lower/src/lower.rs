use std::collections::{BTreeMap, BTreeSet};
use std::f64::consts::PI;

use rge_core::{CouplingKind, ErrorInfo, RgeError, Shape};
use rge_expr::{abs_squared, evaluate, evaluate_real_constant, infer_shape, parse, Expr, Quantity};
use rge_registry::{CouplingId, CouplingRegistry, Declaration};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::conjugate::{is_conjugate_name, resolve_conjugate};
use crate::model::{ModelSpec, GAUGE_SYMBOL};

fn lower_error(code: &str, message: impl Into<String>) -> RgeError {
    RgeError::configuration(code, message)
}

/// One argument of a lowered beta function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Argument {
    /// The loop order being evaluated; always argument 0.
    LoopOrder,
    /// Current value of a coupling.
    Coupling(CouplingId),
    /// The gauge-fixing parameter.
    GaugeParameter,
}

/// Contribution of a single loop order to a beta function.
#[derive(Debug, Clone, PartialEq)]
pub struct BetaTerm {
    /// 1-based loop order.
    pub loop_order: u32,
    /// Normalised expression over coupling names.
    pub symbolic: Expr,
    /// Same expression with symbols replaced by argument indices.
    pub compiled: Expr<usize>,
}

impl BetaTerm {
    /// Evaluates the term against bound arguments.
    pub fn evaluate(&self, arguments: &[Quantity]) -> Result<Quantity, RgeError> {
        evaluate(&self.compiled, arguments)
    }
}

/// Lowered beta function of one coupling.
#[derive(Debug, Clone, PartialEq)]
pub struct BetaFunction {
    /// Kind of the target coupling.
    pub kind: CouplingKind,
    /// Target coupling.
    pub target: CouplingId,
    /// Target name.
    pub name: String,
    /// Target shape; every term evaluates to it.
    pub shape: Shape,
    /// Arguments shared by every term, loop order first.
    pub signature: Vec<Argument>,
    /// One term per loop order, ascending.
    pub terms: Vec<BetaTerm>,
}

impl BetaFunction {
    /// Binds the signature to per-coupling values.
    pub fn bind(&self, couplings: &[Quantity], loop_order: u32, gauge: f64) -> Result<Vec<Quantity>, RgeError> {
        self.signature
            .iter()
            .map(|argument| match argument {
                Argument::LoopOrder => Ok(Quantity::real(f64::from(loop_order))),
                Argument::GaugeParameter => Ok(Quantity::real(gauge)),
                Argument::Coupling(id) => couplings.get(id.index()).cloned().ok_or_else(|| {
                    RgeError::ShapeMismatch(
                        ErrorInfo::new("missing-argument", "no value for a coupling argument")
                            .with_context("beta", &self.name)
                            .with_context("coupling", id),
                    )
                }),
            })
            .collect()
    }

    /// Whether the gauge parameter is an argument.
    pub fn is_gauge_dependent(&self) -> bool {
        self.signature.contains(&Argument::GaugeParameter)
    }
}

/// Loop-order suppression `kappa(n) / beta_factor`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopNormalization {
    /// Constant every term is divided by.
    pub beta_factor: f64,
    /// Exponent of `4*pi` per loop order.
    pub exponents: BTreeMap<u32, f64>,
}

impl LoopNormalization {
    /// `(4*pi)^(-exponent(n))`, when loop order `n` is known.
    pub fn kappa(&self, loop_order: u32) -> Option<f64> {
        self.exponents
            .get(&loop_order)
            .map(|exponent| (4.0 * PI).powf(-exponent))
    }

    /// Full factor applied to the loop order `n` term.
    pub fn factor(&self, loop_order: u32) -> Option<f64> {
        self.kappa(loop_order).map(|kappa| kappa / self.beta_factor)
    }
}

/// A term dropped because one of its symbols could not be resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OmittedTerm {
    /// Kind of the target.
    pub kind: CouplingKind,
    /// Loop order of the term.
    pub loop_order: u32,
    /// Target coupling.
    pub target: String,
    /// Symbol that failed to resolve.
    pub symbol: String,
}

/// Non-fatal findings of a lowering pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoweringReport {
    /// Warnings, ambiguous conjugates among them.
    pub warnings: Vec<RgeError>,
    /// Terms left out of the system.
    pub omitted_terms: Vec<OmittedTerm>,
    /// Targets skipped because they are conjugates or substituted.
    pub skipped_targets: Vec<String>,
}

/// Result of lowering a [`ModelSpec`].
#[derive(Debug, Clone)]
pub struct LoweredModel {
    /// Model name.
    pub name: String,
    /// Frozen registry of independent couplings.
    pub registry: CouplingRegistry,
    /// Beta functions in target declaration order.
    pub system: Vec<BetaFunction>,
    /// Loop-order normalisation.
    pub normalization: LoopNormalization,
    /// Requested loop cap per kind.
    pub loops: BTreeMap<CouplingKind, u32>,
    /// Value bound to the gauge parameter.
    pub gauge_fixing: f64,
    /// Warnings and omissions.
    pub report: LoweringReport,
}

impl LoweredModel {
    /// Beta function of the coupling called `name`.
    pub fn beta_function(&self, name: &str) -> Option<&BetaFunction> {
        self.system.iter().find(|beta| beta.name == name)
    }

    /// Whether any beta function depends on the gauge parameter.
    pub fn is_gauge_dependent(&self) -> bool {
        self.system.iter().any(BetaFunction::is_gauge_dependent)
    }
}

enum Unresolved {
    Omit(String, RgeError),
    Fatal(RgeError),
}

struct Resolver<'a> {
    spec: &'a ModelSpec,
    registry: &'a CouplingRegistry,
    substitutions: BTreeMap<String, Expr>,
    conjugates: BTreeSet<String>,
}

impl Resolver<'_> {
    fn candidates(&self) -> impl Iterator<Item = &str> {
        self.registry
            .couplings()
            .iter()
            .map(|coupling| coupling.name.as_str())
            .chain(self.substitutions.keys().map(String::as_str))
    }

    fn inline(&self, expr: &Expr, stack: &mut Vec<String>) -> Result<Expr, Unresolved> {
        expr.try_map_symbols(&mut |symbol: &String| self.resolve(symbol, stack))
    }

    fn resolve(&self, symbol: &str, stack: &mut Vec<String>) -> Result<Expr, Unresolved> {
        if let Some(value) = self.spec.parameters.get(symbol) {
            return Ok(Expr::Num(*value));
        }
        if self.spec.generation_symbols.iter().any(|g| g == symbol) {
            return Ok(Expr::Num(self.spec.generations));
        }
        if symbol == GAUGE_SYMBOL || self.registry.id_of(symbol).is_some() {
            return Ok(Expr::sym(symbol));
        }
        if let Some(expr) = self.substitutions.get(symbol) {
            if stack.iter().any(|seen| seen == symbol) {
                return Err(Unresolved::Fatal(
                    lower_error("substitution-cycle", "substitutions refer to each other in a cycle")
                        .with_context("symbol", symbol)
                        .with_context("chain", stack.join(" -> ")),
                ));
            }
            stack.push(symbol.to_string());
            let inlined = self.inline(expr, stack);
            stack.pop();
            return inlined;
        }
        if self.conjugates.contains(symbol) || is_conjugate_name(symbol) {
            let canonical = resolve_conjugate(symbol, self.candidates())
                .map_err(|err| Unresolved::Omit(symbol.to_string(), err))?
                .to_string();
            return Ok(self.resolve(&canonical, stack)?.conj());
        }
        Err(Unresolved::Fatal(
            lower_error("undeclared-symbol", "beta function references an undeclared symbol")
                .with_context("symbol", symbol),
        ))
    }
}

/// Builds the registry and the lowered beta-function system of a model.
///
/// Configuration and expression problems are fatal. Conjugate names that
/// cannot be resolved only drop the affected terms and are listed in the
/// report.
pub fn lower_model(spec: &ModelSpec) -> Result<LoweredModel, RgeError> {
    let mut registry = CouplingRegistry::new();
    let mut conjugates = BTreeSet::new();
    for coupling in &spec.couplings {
        if is_conjugate_name(&coupling.name) {
            conjugates.insert(coupling.name.clone());
            continue;
        }
        if spec.substitutions.contains_key(&coupling.name) {
            continue;
        }
        let mut declaration = Declaration {
            name: coupling.name.clone(),
            kind: coupling.kind,
            shape: coupling.shape,
            initial: None,
            latex: coupling.latex.clone(),
            complex: coupling.complex,
        };
        if let Some(initial) = &coupling.initial {
            declaration = declaration.with_initial(initial.to_quantity()?);
        }
        registry.declare(declaration)?;
    }

    let mut substitutions = BTreeMap::new();
    for (name, source) in &spec.substitutions {
        let expr = parse(source).map_err(|err| err.with_context("substitution", name))?;
        substitutions.insert(name.clone(), expr);
    }

    let (drafts, loop_orders, report) = collect_terms(spec, &registry, substitutions, conjugates)?;

    let mut system = Vec::with_capacity(drafts.len());
    for (id, terms) in drafts {
        let Some(coupling) = registry.get(id) else {
            continue;
        };
        let signature = build_signature(&registry, &terms);
        let mut lowered = Vec::with_capacity(terms.len());
        for (loop_order, symbolic) in terms {
            let compiled = compile(&registry, &signature, &symbolic)?;
            let shape = infer_shape(&compiled, &|index: &usize| {
                argument_shape(&registry, signature.get(*index).copied()?)
            })
            .map_err(|err| {
                RgeError::Configuration(
                    err.info()
                        .clone()
                        .with_context("target", &coupling.name)
                        .with_context("loop", loop_order),
                )
            })?;
            if shape != coupling.shape {
                return Err(RgeError::Configuration(
                    ErrorInfo::new("term-shape", "beta-function term does not have the shape of its coupling")
                        .with_context("target", &coupling.name)
                        .with_context("loop", loop_order)
                        .with_context("expected", coupling.shape)
                        .with_context("actual", shape),
                ));
            }
            lowered.push(BetaTerm {
                loop_order,
                symbolic,
                compiled,
            });
        }
        system.push(BetaFunction {
            kind: coupling.kind,
            target: id,
            name: coupling.name.clone(),
            shape: coupling.shape,
            signature,
            terms: lowered,
        });
    }

    let normalization = loop_normalization(spec, &loop_orders)?;
    registry.freeze();

    let gauge_dependent = system.iter().any(BetaFunction::is_gauge_dependent);
    let gauge_fixing = match spec.gauge_fixing {
        Some(xi) => xi,
        None => {
            if gauge_dependent || registry.of_kind(CouplingKind::Vevs).next().is_some() {
                warn!(model = %spec.name, "no gauge fixing given, using the Landau gauge");
            }
            0.0
        }
    };

    debug!(
        model = %spec.name,
        couplings = registry.len(),
        slots = registry.total_elements(),
        beta_functions = system.len(),
        omitted = report.omitted_terms.len(),
        "lowered model"
    );

    Ok(LoweredModel {
        name: spec.name.clone(),
        registry,
        system,
        normalization,
        loops: spec.loops.clone(),
        gauge_fixing,
        report,
    })
}

type Drafts = BTreeMap<CouplingId, Vec<(u32, Expr)>>;

/// Parses, inlines and normalises every term, grouped by target.
fn collect_terms(
    spec: &ModelSpec,
    registry: &CouplingRegistry,
    substitutions: BTreeMap<String, Expr>,
    conjugates: BTreeSet<String>,
) -> Result<(Drafts, BTreeSet<u32>, LoweringReport), RgeError> {
    let resolver = Resolver {
        spec,
        registry,
        substitutions,
        conjugates,
    };
    let shape_of = |name: &String| {
        if name == GAUGE_SYMBOL {
            Some(Shape::Scalar)
        } else {
            registry.by_name(name).map(|coupling| coupling.shape)
        }
    };

    let mut report = LoweringReport::default();
    let mut drafts: Drafts = BTreeMap::new();
    let mut loop_orders = BTreeSet::new();

    for (kind, per_loop) in &spec.rges {
        if !spec.loops.contains_key(kind) {
            return Err(lower_error("missing-loop-order", "no loop order requested for a kind with beta functions")
                .with_context("kind", kind));
        }
        for (loop_order, targets) in per_loop {
            if *loop_order == 0 {
                return Err(lower_error("loop-order", "loop orders start at 1").with_context("kind", kind));
            }
            loop_orders.insert(*loop_order);
            for (target, source) in targets {
                if resolver.conjugates.contains(target)
                    || is_conjugate_name(target)
                    || resolver.substitutions.contains_key(target)
                {
                    if !report.skipped_targets.contains(target) {
                        debug!(coupling = %target, "skipping dependent beta function");
                        report.skipped_targets.push(target.clone());
                    }
                    continue;
                }
                let coupling = registry.by_name(target).ok_or_else(|| {
                    lower_error("undeclared-target", "beta function given for an undeclared coupling")
                        .with_context("target", target)
                })?;
                if coupling.kind != *kind {
                    return Err(RgeError::Configuration(
                        ErrorInfo::new("kind-mismatch", "beta function listed under the wrong kind")
                            .with_context("target", target)
                            .with_context("declared", coupling.kind)
                            .with_context("listed", kind),
                    ));
                }
                let parsed = parse(source).map_err(|err| {
                    err.with_context("target", target)
                        .with_context("loop", loop_order)
                })?;
                let inlined = match resolver.inline(&parsed, &mut Vec::new()) {
                    Ok(expr) => expr,
                    Err(Unresolved::Omit(symbol, err)) => {
                        warn!(
                            coupling = %target,
                            loop_order = *loop_order,
                            symbol = %symbol,
                            error = %err,
                            "omitting beta-function term"
                        );
                        report.omitted_terms.push(OmittedTerm {
                            kind: *kind,
                            loop_order: *loop_order,
                            target: target.clone(),
                            symbol,
                        });
                        report.warnings.push(err);
                        continue;
                    }
                    Err(Unresolved::Fatal(err)) => {
                        return Err(err.with_context("target", target).with_context("loop", loop_order))
                    }
                };
                drafts
                    .entry(coupling.id)
                    .or_default()
                    .push((*loop_order, abs_squared(&inlined, &shape_of)));
            }
        }
    }
    Ok((drafts, loop_orders, report))
}

fn build_signature(registry: &CouplingRegistry, terms: &[(u32, Expr)]) -> Vec<Argument> {
    let mut signature = vec![Argument::LoopOrder];
    let mut gauge = false;
    for (_, term) in terms {
        for symbol in term.symbols() {
            if symbol == GAUGE_SYMBOL {
                gauge = true;
                continue;
            }
            if let Some(id) = registry.id_of(symbol) {
                let argument = Argument::Coupling(id);
                if !signature.contains(&argument) {
                    signature.push(argument);
                }
            }
        }
    }
    if gauge {
        signature.push(Argument::GaugeParameter);
    }
    signature
}

fn compile(registry: &CouplingRegistry, signature: &[Argument], expr: &Expr) -> Result<Expr<usize>, RgeError> {
    expr.try_map_symbols(&mut |symbol: &String| {
        let argument = if symbol == GAUGE_SYMBOL {
            Argument::GaugeParameter
        } else {
            let id = registry
                .id_of(symbol)
                .ok_or_else(|| lower_error("undeclared-symbol", "symbol is not a coupling").with_context("symbol", symbol))?;
            Argument::Coupling(id)
        };
        signature
            .iter()
            .position(|candidate| *candidate == argument)
            .map(Expr::Sym)
            .ok_or_else(|| lower_error("unbound-argument", "symbol missing from the signature").with_context("symbol", symbol))
    })
}

fn argument_shape(registry: &CouplingRegistry, argument: Argument) -> Option<Shape> {
    match argument {
        Argument::LoopOrder | Argument::GaugeParameter => Some(Shape::Scalar),
        Argument::Coupling(id) => registry.get(id).map(|coupling| coupling.shape),
    }
}

fn loop_normalization(spec: &ModelSpec, loop_orders: &BTreeSet<u32>) -> Result<LoopNormalization, RgeError> {
    let bind_parameters = |source: &str, what: &str, n: Option<u32>| -> Result<f64, RgeError> {
        let expr = parse(source).map_err(|err| err.with_context("field", what))?;
        let bound: Expr<String> = expr.try_map_symbols(&mut |symbol: &String| {
            if let (Some(n), "n") = (n, symbol.as_str()) {
                return Ok(Expr::Num(f64::from(n)));
            }
            spec.parameters
                .get(symbol)
                .map(|value| Expr::Num(*value))
                .ok_or_else(|| {
                    lower_error("normalization-symbol", "unknown symbol in loop normalisation")
                        .with_context("field", what)
                        .with_context("symbol", symbol)
                })
        })?;
        evaluate_real_constant(&bound).map_err(|err| err.with_context("field", what))
    };

    let beta_factor = bind_parameters(&spec.beta_factor, "beta_factor", None)?;
    if beta_factor == 0.0 || !beta_factor.is_finite() {
        return Err(lower_error("beta-factor", "beta factor must be finite and non-zero")
            .with_context("beta_factor", &spec.beta_factor));
    }
    let mut exponents = BTreeMap::new();
    for n in loop_orders {
        exponents.insert(*n, bind_parameters(&spec.beta_exponent, "beta_exponent", Some(*n))?);
    }
    Ok(LoopNormalization {
        beta_factor,
        exponents,
    })
}
