#![deny(missing_docs)]
#![doc = "Core types shared by the RGE solver crates: coupling kinds, shapes, tagged sample values and the canonical error."]

pub mod errors;
mod types;

pub use errors::{ErrorInfo, RgeError};
pub use num_complex::Complex64;
pub use types::{format_complex, CouplingKind, Shape, Value};
