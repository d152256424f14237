//! Supplier replenishment models and lifecycle rules
//!
//! Replenishment orders follow
//! `Pending -> Approved -> Ordered -> PartiallyReceived* -> Completed`,
//! with `Cancelled` reachable from any non-terminal state. Stock is
//! credited on each receipt, so an order line can produce several
//! ledger entries before the order completes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Replenishment order lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplenishmentState {
    Pending,
    Approved,
    Ordered,
    PartiallyReceived,
    Completed,
    Cancelled,
}

impl ReplenishmentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplenishmentState::Pending => "pending",
            ReplenishmentState::Approved => "approved",
            ReplenishmentState::Ordered => "ordered",
            ReplenishmentState::PartiallyReceived => "partially_received",
            ReplenishmentState::Completed => "completed",
            ReplenishmentState::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ReplenishmentState::Pending),
            "approved" => Some(ReplenishmentState::Approved),
            "ordered" => Some(ReplenishmentState::Ordered),
            "partially_received" => Some(ReplenishmentState::PartiallyReceived),
            "completed" => Some(ReplenishmentState::Completed),
            "cancelled" => Some(ReplenishmentState::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReplenishmentState::Completed | ReplenishmentState::Cancelled
        )
    }

    /// Central transition table; receiving more goods while already
    /// `PartiallyReceived` is a self-transition.
    pub fn can_transition(&self, to: ReplenishmentState) -> bool {
        use ReplenishmentState::*;
        if to == Cancelled {
            return !self.is_terminal();
        }
        matches!(
            (self, to),
            (Pending, Approved)
                | (Approved, Ordered)
                | (Ordered, PartiallyReceived)
                | (Ordered, Completed)
                | (PartiallyReceived, PartiallyReceived)
                | (PartiallyReceived, Completed)
        )
    }

    /// Whether supplier receipts may be recorded in this state.
    pub fn accepts_receipts(&self) -> bool {
        matches!(
            self,
            ReplenishmentState::Ordered | ReplenishmentState::PartiallyReceived
        )
    }
}

/// Order priority, used for the urgent-orders view
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Priority::Low),
            "normal" => Some(Priority::Normal),
            "high" => Some(Priority::High),
            "urgent" => Some(Priority::Urgent),
            _ => None,
        }
    }
}

/// A supplier restocking order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplenishmentOrder {
    pub id: Uuid,
    pub code: String,
    pub supplier_id: Uuid,
    pub requested_by: Uuid,
    pub priority: Priority,
    pub state: ReplenishmentState,
    pub closed_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One line of a replenishment order, tracking requested vs. received
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplenishmentItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub quantity_requested: i32,
    pub quantity_received: i32,
}

impl ReplenishmentItem {
    pub fn outstanding(&self) -> i32 {
        (self.quantity_requested - self.quantity_received).max(0)
    }
}

/// An order completes naturally once every line is fully received.
pub fn is_fully_received(items: &[ReplenishmentItem]) -> bool {
    items
        .iter()
        .all(|item| item.quantity_received >= item.quantity_requested)
}
