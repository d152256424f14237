//! Database models for the Retail POS & Inventory Platform
//!
//! Re-exports models from the shared crate; backend-specific row types
//! live next to the services that read them.

pub use shared::models::*;
