use std::fmt;
use std::sync::OnceLock;

use rge_core::{CouplingKind, Shape};
use rge_expr::Quantity;
use serde::{Deserialize, Serialize};

/// Stable handle of a declared coupling, equal to its declaration index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CouplingId(pub usize);

impl CouplingId {
    /// Declaration index backing the handle.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for CouplingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Request to add a coupling to a registry.
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    /// Unique coupling name.
    pub name: String,
    /// Coupling category.
    pub kind: CouplingKind,
    /// Scalar or matrix shape.
    pub shape: Shape,
    /// Initial value; zeros when absent.
    pub initial: Option<Quantity>,
    /// Optional LaTeX label.
    pub latex: Option<String>,
    /// Declares the coupling complex from the start.
    pub complex: bool,
}

impl Declaration {
    /// Declaration of a scalar coupling.
    pub fn scalar(name: impl Into<String>, kind: CouplingKind) -> Self {
        Self {
            name: name.into(),
            kind,
            shape: Shape::Scalar,
            initial: None,
            latex: None,
            complex: false,
        }
    }

    /// Declaration of a `rows x cols` matrix coupling.
    pub fn matrix(name: impl Into<String>, kind: CouplingKind, rows: usize, cols: usize) -> Self {
        Self {
            shape: Shape::matrix(rows, cols),
            ..Self::scalar(name, kind)
        }
    }

    /// Sets the initial value.
    pub fn with_initial(mut self, initial: Quantity) -> Self {
        self.initial = Some(initial);
        self
    }

    /// Sets a real scalar initial value.
    pub fn with_real(self, value: f64) -> Self {
        self.with_initial(Quantity::real(value))
    }

    /// Sets the LaTeX label.
    pub fn with_latex(mut self, latex: impl Into<String>) -> Self {
        self.latex = Some(latex.into());
        self
    }

    /// Marks every slot of the coupling complex.
    pub fn with_complex(mut self, complex: bool) -> Self {
        self.complex = complex;
        self
    }
}

/// A declared coupling and its place in the flat state vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coupling {
    /// Handle of the coupling.
    pub id: CouplingId,
    /// Unique name.
    pub name: String,
    /// Category.
    pub kind: CouplingKind,
    /// Scalar or matrix shape.
    pub shape: Shape,
    /// Offset of the first slot in the flat vector.
    pub position: usize,
    /// Initial value, scalar or matrix matching `shape`.
    pub initial: Quantity,
    /// Optional LaTeX label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latex: Option<String>,
    #[serde(skip)]
    pub(crate) elements: OnceLock<Vec<ElementCoupling>>,
}

impl Coupling {
    /// Number of scalar slots the coupling occupies.
    pub fn element_count(&self) -> usize {
        self.shape.element_count()
    }

    /// Flat slot range `position..position + element_count`.
    pub fn slots(&self) -> std::ops::Range<usize> {
        self.position..self.position + self.element_count()
    }

    /// Whether the coupling is matrix valued.
    pub fn is_matrix(&self) -> bool {
        self.shape.is_matrix()
    }

    pub(crate) fn build_elements(&self) -> Vec<ElementCoupling> {
        let Shape::Matrix { rows, cols } = self.shape else {
            return Vec::new();
        };
        let mut elements = Vec::with_capacity(rows * cols);
        for row in 0..rows {
            for col in 0..cols {
                elements.push(ElementCoupling {
                    name: element_name(&self.name, row, col),
                    kind: self.kind,
                    parent: self.id,
                    row,
                    col,
                    position: self.position + row * cols + col,
                });
            }
        }
        elements
    }
}

/// Scalar element of a matrix coupling with its own flat slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementCoupling {
    /// Name `<parent>_{<row><col>}` with 1-based indices.
    pub name: String,
    /// Category inherited from the parent.
    pub kind: CouplingKind,
    /// Parent matrix coupling.
    pub parent: CouplingId,
    /// Zero-based row.
    pub row: usize,
    /// Zero-based column.
    pub col: usize,
    /// Flat slot of the element.
    pub position: usize,
}

/// Name of the `(row, col)` element (zero-based) of a matrix coupling.
pub fn element_name(parent: &str, row: usize, col: usize) -> String {
    format!("{parent}_{{{}{}}}", row + 1, col + 1)
}

/// One scalar slot of the flat vector, as seen by the integrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatSlot {
    /// Scalar coupling name or element name.
    pub name: String,
    /// Category.
    pub kind: CouplingKind,
    /// Owning coupling.
    pub parent: CouplingId,
    /// Flat position.
    pub position: usize,
    /// Zero-based `(row, col)` for matrix elements.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element: Option<(usize, usize)>,
}
