//! Business logic services for the retail POS backend

pub mod alert;
pub mod catalog;
pub mod ledger;
pub mod replenishment;
pub mod returns;
pub mod sale;

pub use alert::StockAlertService;
pub use catalog::CatalogService;
pub use ledger::StockLedgerService;
pub use replenishment::ReplenishmentService;
pub use returns::ReturnService;
pub use sale::SaleService;
