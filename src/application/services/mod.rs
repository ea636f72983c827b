//! Application services
//!
//! Concrete service implementations that orchestrate domain logic.
//! Services depend on the store traits (NodeStore, InspectionStore)
//! but are themselves concrete structs, not traits.

mod inspector;
mod mutator;
mod queries;
mod repair;

pub use inspector::ConsistencyInspector;
pub use mutator::TreeMutator;
pub use queries::TreeQueries;
pub use repair::{RepairEngine, RepairOutcome};
