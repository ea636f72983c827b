//! Application layer: services and use cases
//!
//! This layer orchestrates domain logic and depends on the store traits.

pub mod cursor;
pub mod error;
pub mod services;
pub mod transaction;

pub use cursor::NodeCursor;
pub use error::{ApplicationError, ApplicationResult};
pub use transaction::in_transaction;
