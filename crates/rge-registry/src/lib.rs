#![deny(missing_docs)]
#![doc = "Coupling registry: declares scalar and matrix couplings, assigns contiguous slots in one flat complex state vector and tracks which slots have become complex."]

/// Coupling declarations, handles and element couplings.
pub mod coupling;
/// The registry itself.
pub mod registry;

pub use coupling::{element_name, Coupling, CouplingId, Declaration, ElementCoupling, FlatSlot};
pub use registry::CouplingRegistry;
