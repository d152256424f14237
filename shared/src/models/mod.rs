//! Domain models for the Retail POS & Inventory Platform

pub mod alert;
pub mod product;
pub mod replenishment;
pub mod returns;
pub mod sale;
pub mod stock;

pub use alert::*;
pub use product::*;
pub use replenishment::*;
pub use returns::*;
pub use sale::*;
pub use stock::*;
