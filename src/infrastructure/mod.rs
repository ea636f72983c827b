//! Infrastructure layer: store implementations and DI container
//!
//! This layer implements the store traits and wires up services.

pub mod di;
pub mod error;
pub mod memory;
pub mod sqlite;
pub mod traits;

pub use di::ServiceContainer;
pub use error::{InfraError, InfraResult};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{InspectionStore, NodeStore};
