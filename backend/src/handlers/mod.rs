//! HTTP handlers for the retail POS backend

pub mod alert;
pub mod health;
pub mod product;
pub mod replenishment;
pub mod returns;
pub mod sale;
pub mod stock;

pub use alert::*;
pub use health::*;
pub use product::*;
pub use replenishment::*;
pub use returns::*;
pub use sale::*;
pub use stock::*;
