//! Shared types and models for the Retail POS & Inventory Platform
//!
//! This crate contains the pure domain layer shared between the backend
//! and other components of the system: entity models, state machines,
//! and the calculators behind stock, sale, and alert rules. It has no
//! I/O dependencies, so every business rule in here is testable in
//! isolation.

pub mod models;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
