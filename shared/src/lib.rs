//! Shared types and models for the farm stock ledger
//!
//! This crate contains the canonical entity types used by the ledger engine
//! and by the modules that call into it (inventory screens, farm modules).

pub mod models;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
