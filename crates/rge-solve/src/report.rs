use std::collections::BTreeMap;
use std::fmt;

use rge_core::{CouplingKind, Value};
use rge_registry::CouplingRegistry;
use serde::{Deserialize, Serialize};

/// Initial value of one coupling as shown in the dump.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialEntry {
    /// Scalar coupling.
    Scalar(Value),
    /// Matrix coupling, one vector per row.
    Matrix(Vec<Vec<Value>>),
}

/// Named initial value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialValueLine {
    /// Coupling name.
    pub name: String,
    /// Value at the initial scale.
    pub value: InitialEntry,
}

/// Couplings of one kind, in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KindSection {
    /// Kind of every coupling in the section.
    pub kind: CouplingKind,
    /// Entries.
    pub couplings: Vec<InitialValueLine>,
}

/// Running scheme and initial values of a solver, ready to be edited and
/// fed back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialConditions {
    /// Model name used as the prefix of every line.
    pub model: String,
    /// Loop cap per kind.
    pub loops: BTreeMap<CouplingKind, u32>,
    /// Initial values grouped by kind.
    pub sections: Vec<KindSection>,
}

impl InitialConditions {
    /// Collects the running scheme and the registry's initial values.
    pub fn collect(model: &str, loops: &BTreeMap<CouplingKind, u32>, registry: &CouplingRegistry) -> Self {
        let sections = registry
            .kinds()
            .into_iter()
            .map(|kind| KindSection {
                kind,
                couplings: registry
                    .of_kind(kind)
                    .map(|coupling| {
                        let entries: Vec<Value> = coupling
                            .initial
                            .row_major()
                            .into_iter()
                            .zip(coupling.slots())
                            .map(|(z, slot)| Value::typed(z, registry.is_slot_complex(slot)))
                            .collect();
                        let value = if coupling.is_matrix() {
                            let (_, cols) = coupling.shape.dims();
                            InitialEntry::Matrix(entries.chunks(cols.max(1)).map(<[Value]>::to_vec).collect())
                        } else {
                            InitialEntry::Scalar(entries.first().copied().unwrap_or(Value::Real(0.0)))
                        };
                        InitialValueLine {
                            name: coupling.name.clone(),
                            value,
                        }
                    })
                    .collect(),
            })
            .collect();
        Self {
            model: model.to_string(),
            loops: loops.clone(),
            sections,
        }
    }
}

fn join_values(values: &[Value]) -> String {
    values.iter().map(Value::to_string).collect::<Vec<_>>().join(", ")
}

impl fmt::Display for InitialConditions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\n# Running scheme :\n\n")?;
        let prefix = format!("{}.loops = ", self.model);
        let pad = " ".repeat(prefix.len() + 1);
        let loops = self
            .loops
            .iter()
            .map(|(kind, order)| format!("'{}': {}", kind.as_str(), order))
            .collect::<Vec<_>>()
            .join(&format!(",\n{pad}"));
        writeln!(f, "{prefix}{{{loops}}}")?;

        for section in &self.sections {
            write!(f, "\n# {}\n\n", section.kind.label())?;
            for line in &section.couplings {
                let prefix = format!("{}.{}.initialValue = ", self.model, line.name);
                match &line.value {
                    InitialEntry::Scalar(value) => writeln!(f, "{prefix}{value}")?,
                    InitialEntry::Matrix(rows) => {
                        let pad = " ".repeat(prefix.len() + 1);
                        let body = rows
                            .iter()
                            .map(|row| format!("[{}]", join_values(row)))
                            .collect::<Vec<_>>()
                            .join(&format!(",\n{pad}"));
                        writeln!(f, "{prefix}[{body}]")?;
                    }
                }
            }
        }
        Ok(())
    }
}
