//! Stock ledger models
//!
//! The ledger is an append-only log of quantity changes. Every entry
//! records the quantity before and after, so replaying a product's
//! ordered history from a known starting point reproduces its current
//! on-hand quantity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kinds of stock movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    /// Supplier receipt or sale void restoration
    Inbound,
    /// Sale debit
    Outbound,
    /// Administrator stock-take correction (sets an explicit target)
    Adjustment,
    /// Customer return credit
    ReturnCredit,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Inbound => "inbound",
            MovementKind::Outbound => "outbound",
            MovementKind::Adjustment => "adjustment",
            MovementKind::ReturnCredit => "return_credit",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "inbound" => Some(MovementKind::Inbound),
            "outbound" => Some(MovementKind::Outbound),
            "adjustment" => Some(MovementKind::Adjustment),
            "return_credit" => Some(MovementKind::ReturnCredit),
            _ => None,
        }
    }
}

/// One immutable ledger entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: Uuid,
    pub product_id: Uuid,
    pub kind: MovementKind,
    pub delta: i32,
    pub quantity_before: i32,
    pub quantity_after: i32,
    pub user_id: Uuid,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of checking a movement against the current quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementCheck {
    /// The movement is valid and results in this quantity.
    Ok { quantity_after: i32 },
    /// The delta is zero (or an adjustment to the current quantity).
    ZeroDelta,
    /// An outbound movement would drive the quantity negative.
    InsufficientStock { available: i32, requested: i32 },
    /// A non-outbound movement would drive the quantity negative.
    NegativeResult { quantity_after: i32 },
    /// The delta would push the quantity past the representable range.
    Overflow,
}

/// Validate a signed delta against the current quantity.
///
/// This is the single quantity rule behind every ledger write: the
/// resulting quantity must be ≥ 0 and the delta must be non-zero.
/// Outbound shortfalls are distinguished so callers can surface
/// "insufficient stock" instead of a generic quantity error.
pub fn check_movement(quantity_before: i32, kind: MovementKind, delta: i32) -> MovementCheck {
    if delta == 0 {
        return MovementCheck::ZeroDelta;
    }
    let Some(quantity_after) = quantity_before.checked_add(delta) else {
        return MovementCheck::Overflow;
    };
    if quantity_after < 0 {
        if kind == MovementKind::Outbound {
            return MovementCheck::InsufficientStock {
                available: quantity_before,
                requested: -delta,
            };
        }
        return MovementCheck::NegativeResult { quantity_after };
    }
    MovementCheck::Ok { quantity_after }
}

/// Replay an ordered movement history from a starting quantity.
///
/// Returns `None` if any step breaks the before/after chain, which
/// would mean the ledger was tampered with or recorded out of order.
pub fn replay_movements(starting_quantity: i32, movements: &[StockMovement]) -> Option<i32> {
    let mut quantity = starting_quantity;
    for movement in movements {
        if movement.quantity_before != quantity {
            return None;
        }
        if movement.quantity_before.checked_add(movement.delta) != Some(movement.quantity_after) {
            return None;
        }
        quantity = movement.quantity_after;
    }
    Some(quantity)
}
