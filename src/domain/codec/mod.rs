//! Streaming token codec used by repair and large-group inspection

mod forest;
pub mod nested_string;
pub mod token;

pub use nested_string::{NestedString, DEFAULT_CHUNK_SIZE};
pub use token::{LeftRight, Sign, Slot, Token};
