//! Product catalog models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A sellable product.
///
/// `quantity` is the authoritative on-hand count and is only ever
/// mutated through the stock ledger; it can never go negative.
/// Inactive products stay resolvable for historical movements and
/// sales but cannot be sold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub sku: String,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub min_stock: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Whether the product has at least `quantity` units available.
    pub fn has_stock(&self, quantity: i32) -> bool {
        self.quantity >= quantity
    }
}
