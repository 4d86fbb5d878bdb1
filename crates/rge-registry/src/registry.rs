use std::collections::BTreeMap;

use num_complex::Complex64;
use rge_core::{CouplingKind, ErrorInfo, RgeError, Shape};
use rge_expr::Quantity;

use crate::coupling::{Coupling, CouplingId, Declaration, ElementCoupling, FlatSlot};

fn registry_error(code: &str, message: impl Into<String>) -> RgeError {
    RgeError::configuration(code, message)
}

fn length_mismatch(expected: usize, actual: usize) -> RgeError {
    RgeError::ShapeMismatch(
        ErrorInfo::new("flat-length", "flat vector length does not match the registry")
            .with_context("expected", expected)
            .with_context("actual", actual),
    )
}

/// Owns every coupling of one model and the layout of the flat state vector.
///
/// Positions are assigned in declaration order and never move. Once the
/// registry is frozen only initial values and complex flags may change.
#[derive(Debug, Clone, Default)]
pub struct CouplingRegistry {
    couplings: Vec<Coupling>,
    index: BTreeMap<String, CouplingId>,
    complex_slots: Vec<bool>,
    frozen: bool,
}

impl CouplingRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a coupling at the next free position.
    pub fn declare(&mut self, declaration: Declaration) -> Result<CouplingId, RgeError> {
        if self.frozen {
            return Err(registry_error("registry-frozen", "couplings cannot be declared after lowering")
                .with_context("name", &declaration.name));
        }
        if declaration.name.is_empty() {
            return Err(registry_error("empty-name", "coupling names must not be empty"));
        }
        if self.index.contains_key(&declaration.name) {
            return Err(RgeError::Configuration(
                ErrorInfo::new("duplicate-name", "coupling declared twice")
                    .with_context("name", &declaration.name),
            ));
        }
        if declaration.shape.element_count() == 0 {
            return Err(registry_error("empty-matrix", "matrix couplings need at least one element")
                .with_context("name", &declaration.name)
                .with_context("shape", declaration.shape));
        }
        let initial = match declaration.initial {
            Some(value) => {
                check_shape(&declaration.name, declaration.shape, &value)?;
                value
            }
            None => Quantity::zeros(declaration.shape),
        };

        let id = CouplingId(self.couplings.len());
        let position = self.complex_slots.len();
        let count = declaration.shape.element_count();
        self.complex_slots
            .extend(std::iter::repeat(declaration.complex).take(count));
        self.index.insert(declaration.name.clone(), id);
        self.couplings.push(Coupling {
            id,
            name: declaration.name,
            kind: declaration.kind,
            shape: declaration.shape,
            position,
            initial,
            latex: declaration.latex,
            elements: Default::default(),
        });
        Ok(id)
    }

    /// Forbids further declarations.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Whether [`CouplingRegistry::freeze`] has been called.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Number of declared couplings.
    pub fn len(&self) -> usize {
        self.couplings.len()
    }

    /// Whether no coupling has been declared.
    pub fn is_empty(&self) -> bool {
        self.couplings.is_empty()
    }

    /// Length of the flat state vector.
    pub fn total_elements(&self) -> usize {
        self.complex_slots.len()
    }

    /// Every coupling in declaration order.
    pub fn couplings(&self) -> &[Coupling] {
        &self.couplings
    }

    /// Coupling behind a handle.
    pub fn get(&self, id: CouplingId) -> Option<&Coupling> {
        self.couplings.get(id.0)
    }

    /// Handle of the coupling called `name`.
    pub fn id_of(&self, name: &str) -> Option<CouplingId> {
        self.index.get(name).copied()
    }

    /// Coupling called `name`.
    pub fn by_name(&self, name: &str) -> Option<&Coupling> {
        self.id_of(name).and_then(|id| self.get(id))
    }

    /// Names of every declared coupling, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.index.keys().map(String::as_str)
    }

    /// Couplings of `kind` in declaration order.
    pub fn of_kind(&self, kind: CouplingKind) -> impl Iterator<Item = &Coupling> {
        self.couplings.iter().filter(move |c| c.kind == kind)
    }

    /// Kinds with at least one coupling, in canonical order.
    pub fn kinds(&self) -> Vec<CouplingKind> {
        CouplingKind::ALL
            .into_iter()
            .filter(|kind| self.couplings.iter().any(|c| c.kind == *kind))
            .collect()
    }

    fn coupling(&self, id: CouplingId) -> Result<&Coupling, RgeError> {
        self.get(id)
            .ok_or_else(|| registry_error("unknown-coupling", "no coupling with this handle").with_context("id", id))
    }

    /// Replaces the initial value of `name`; the shape must match.
    pub fn set_initial_value(&mut self, name: &str, value: Quantity) -> Result<(), RgeError> {
        let id = self
            .id_of(name)
            .ok_or_else(|| registry_error("unknown-coupling", "no coupling with this name").with_context("name", name))?;
        let coupling = &mut self.couplings[id.0];
        check_shape(name, coupling.shape, &value)?;
        coupling.initial = value;
        Ok(())
    }

    /// Element couplings of a matrix coupling, built on first request.
    ///
    /// Scalar couplings have no elements.
    pub fn elements_of(&self, id: CouplingId) -> Result<&[ElementCoupling], RgeError> {
        let coupling = self.coupling(id)?;
        Ok(coupling
            .elements
            .get_or_init(|| coupling.build_elements())
            .as_slice())
    }

    /// Every scalar slot in position order.
    pub fn flat_couplings(&self) -> Vec<FlatSlot> {
        let mut slots = Vec::with_capacity(self.total_elements());
        for coupling in &self.couplings {
            if coupling.is_matrix() {
                let elements = coupling.elements.get_or_init(|| coupling.build_elements());
                slots.extend(elements.iter().map(|element| FlatSlot {
                    name: element.name.clone(),
                    kind: element.kind,
                    parent: element.parent,
                    position: element.position,
                    element: Some((element.row, element.col)),
                }));
            } else {
                slots.push(FlatSlot {
                    name: coupling.name.clone(),
                    kind: coupling.kind,
                    parent: coupling.id,
                    position: coupling.position,
                    element: None,
                });
            }
        }
        slots
    }

    /// Flat vector of the initial values.
    pub fn flatten(&self) -> Vec<Complex64> {
        let mut flat = Vec::with_capacity(self.total_elements());
        for coupling in &self.couplings {
            flat.extend(coupling.initial.row_major());
        }
        flat
    }

    /// Flattens one value per coupling, in declaration order.
    pub fn flatten_values(&self, values: &[Quantity]) -> Result<Vec<Complex64>, RgeError> {
        if values.len() != self.couplings.len() {
            return Err(RgeError::ShapeMismatch(
                ErrorInfo::new("value-count", "one value per coupling is required")
                    .with_context("expected", self.couplings.len())
                    .with_context("actual", values.len()),
            ));
        }
        let mut flat = Vec::with_capacity(self.total_elements());
        for (coupling, value) in self.couplings.iter().zip(values) {
            check_shape(&coupling.name, coupling.shape, value)?;
            flat.extend(value.row_major());
        }
        Ok(flat)
    }

    /// Splits a flat vector into one value per coupling.
    pub fn unflatten(&self, flat: &[Complex64]) -> Result<Vec<Quantity>, RgeError> {
        if flat.len() != self.total_elements() {
            return Err(length_mismatch(self.total_elements(), flat.len()));
        }
        self.couplings
            .iter()
            .map(|coupling| read_value(coupling, flat))
            .collect()
    }

    /// Values of every coupling of `kind`, in declaration order.
    pub fn extract_couplings(
        &self,
        flat: &[Complex64],
        kind: CouplingKind,
    ) -> Result<Vec<(String, Quantity)>, RgeError> {
        if flat.len() != self.total_elements() {
            return Err(length_mismatch(self.total_elements(), flat.len()));
        }
        self.of_kind(kind)
            .map(|coupling| Ok((coupling.name.clone(), read_value(coupling, flat)?)))
            .collect()
    }

    /// Promotes a slot to complex. Returns `true` when the flag changed.
    pub fn mark_complex(&mut self, position: usize) -> Result<bool, RgeError> {
        let total = self.total_elements();
        let slot = self.complex_slots.get_mut(position).ok_or_else(|| {
            registry_error("slot-out-of-range", "no slot at this position")
                .with_context("position", position)
                .with_context("total", total)
        })?;
        let changed = !*slot;
        *slot = true;
        Ok(changed)
    }

    /// Whether the slot at `position` is complex.
    pub fn is_slot_complex(&self, position: usize) -> bool {
        self.complex_slots.get(position).copied().unwrap_or(false)
    }

    /// Whether any slot of the coupling is complex.
    pub fn is_complex(&self, id: CouplingId) -> bool {
        self.get(id)
            .map(|coupling| coupling.slots().any(|slot| self.is_slot_complex(slot)))
            .unwrap_or(false)
    }

    /// Complex flags of every slot in position order.
    pub fn complex_slots(&self) -> &[bool] {
        &self.complex_slots
    }
}

fn check_shape(name: &str, expected: Shape, value: &Quantity) -> Result<(), RgeError> {
    if value.shape() == expected {
        return Ok(());
    }
    Err(RgeError::ShapeMismatch(
        ErrorInfo::new("value-shape", "value shape does not match the coupling")
            .with_context("name", name)
            .with_context("expected", expected)
            .with_context("actual", value.shape()),
    ))
}

fn read_value(coupling: &Coupling, flat: &[Complex64]) -> Result<Quantity, RgeError> {
    let slots = &flat[coupling.slots()];
    match coupling.shape {
        Shape::Scalar => Ok(Quantity::Scalar(slots[0])),
        Shape::Matrix { rows, cols } => Quantity::from_row_major(rows, cols, slots),
    }
}
