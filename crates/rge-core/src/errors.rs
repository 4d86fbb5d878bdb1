//! Structured error types shared across the RGE crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to every [`RgeError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Contextual key value pairs (coupling names, scales, sizes).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Optional hint that may help the caller resolve the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Creates a new error payload with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Adds a context entry to the payload.
    pub fn with_context(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.context.insert(key.into(), value.to_string());
        self
    }

    /// Sets a human readable hint for remediation.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Canonical error type for the RGE engine.
///
/// Families follow the propagation policy of the solver: configuration and
/// expression errors abort before any numeric work, ambiguous conjugates are
/// downgraded to warnings, integration failures travel alongside partial
/// results and shape mismatches only affect the coupling being rebuilt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum RgeError {
    /// Invalid model, registry or solver configuration.
    #[error("configuration error: {0}")]
    Configuration(ErrorInfo),
    /// A conjugate coupling name could not be matched to a unique coupling.
    #[error("ambiguous conjugate: {0}")]
    AmbiguousConjugate(ErrorInfo),
    /// The step integrator stopped before reaching the requested scale.
    #[error("integration failure: {0}")]
    Integration(ErrorInfo),
    /// Element counts or matrix dimensions do not agree.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(ErrorInfo),
    /// Parsing or numeric evaluation of a symbolic expression failed.
    #[error("expression error: {0}")]
    Expression(ErrorInfo),
    /// Serialization and schema errors.
    #[error("serde error: {0}")]
    Serde(ErrorInfo),
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)?;
        if !self.context.is_empty() {
            write!(f, " | context: [")?;
            for (idx, (key, value)) in self.context.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            write!(f, "]")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " | hint: {hint}")?;
        }
        Ok(())
    }
}

impl RgeError {
    /// Shorthand for a [`RgeError::Configuration`] error.
    pub fn configuration(code: &str, message: impl Into<String>) -> Self {
        RgeError::Configuration(ErrorInfo::new(code, message))
    }

    /// Shorthand for a [`RgeError::ShapeMismatch`] error.
    pub fn shape_mismatch(code: &str, message: impl Into<String>) -> Self {
        RgeError::ShapeMismatch(ErrorInfo::new(code, message))
    }

    /// Shorthand for a [`RgeError::Expression`] error.
    pub fn expression(code: &str, message: impl Into<String>) -> Self {
        RgeError::Expression(ErrorInfo::new(code, message))
    }

    /// Returns a reference to the payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            RgeError::Configuration(info)
            | RgeError::AmbiguousConjugate(info)
            | RgeError::Integration(info)
            | RgeError::ShapeMismatch(info)
            | RgeError::Expression(info)
            | RgeError::Serde(info) => info,
        }
    }

    /// Returns a copy of the error with an extra context entry.
    pub fn with_context(self, key: impl Into<String>, value: impl ToString) -> Self {
        match self {
            RgeError::Configuration(info) => RgeError::Configuration(info.with_context(key, value)),
            RgeError::AmbiguousConjugate(info) => {
                RgeError::AmbiguousConjugate(info.with_context(key, value))
            }
            RgeError::Integration(info) => RgeError::Integration(info.with_context(key, value)),
            RgeError::ShapeMismatch(info) => RgeError::ShapeMismatch(info.with_context(key, value)),
            RgeError::Expression(info) => RgeError::Expression(info.with_context(key, value)),
            RgeError::Serde(info) => RgeError::Serde(info.with_context(key, value)),
        }
    }

    /// Whether the error must abort the run before any integration.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RgeError::Configuration(_) | RgeError::Expression(_))
    }
}
