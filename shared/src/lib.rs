//! Shared types and models for the lot ledger
//!
//! This crate holds the pure ledger logic: entities, signed stock arithmetic,
//! production planning and FEFO allocation. It performs no I/O and is used by
//! the backend services and by the WASM bindings.

pub mod error;
pub mod models;
pub mod types;
pub mod validation;

pub use error::*;
pub use models::*;
pub use types::*;
pub use validation::*;
