//! Nested-set forests stored as flat rows
//!
//! Layers, innermost first: `domain` (model, codec, arena), `infrastructure`
//! (stores, DI container), `application` (mutation, inspection and repair
//! services) and `cli`.

pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod exitcode;
pub mod infrastructure;
pub mod util;
