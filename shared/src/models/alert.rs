//! Stock alert models and urgency bands

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kinds of stock alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    LowStock,
    OutOfStock,
    Reorder,
    Excess,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::LowStock => "low_stock",
            AlertKind::OutOfStock => "out_of_stock",
            AlertKind::Reorder => "reorder",
            AlertKind::Excess => "excess",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "low_stock" => Some(AlertKind::LowStock),
            "out_of_stock" => Some(AlertKind::OutOfStock),
            "reorder" => Some(AlertKind::Reorder),
            "excess" => Some(AlertKind::Excess),
            _ => None,
        }
    }
}

/// Alert urgency, ordered `Low < Medium < High < Critical`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
    Critical,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Low => "low",
            Urgency::Medium => "medium",
            Urgency::High => "high",
            Urgency::Critical => "critical",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Urgency::Low),
            "medium" => Some(Urgency::Medium),
            "high" => Some(Urgency::High),
            "critical" => Some(Urgency::Critical),
            _ => None,
        }
    }

    /// Numeric rank used in SQL ordering (higher is more urgent).
    pub fn rank(&self) -> i16 {
        match self {
            Urgency::Low => 1,
            Urgency::Medium => 2,
            Urgency::High => 3,
            Urgency::Critical => 4,
        }
    }
}

/// A threshold alert raised by the alerting engine.
///
/// At most one unread alert exists per (product, kind) pair; re-raising
/// while one is unread is a no-op.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockAlert {
    pub id: Uuid,
    pub product_id: Uuid,
    pub kind: AlertKind,
    pub urgency: Urgency,
    pub is_read: bool,
    pub read_by: Option<Uuid>,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Classify a post-movement stock level against the product threshold.
///
/// Returns the alert to ensure, or `None` when the level is healthy.
/// `critical_band` is the configured number of units above zero that
/// still counts as critical.
pub fn evaluate_level(
    quantity: i32,
    min_stock: i32,
    critical_band: i32,
) -> Option<(AlertKind, Urgency)> {
    if quantity == 0 {
        return Some((AlertKind::OutOfStock, Urgency::Critical));
    }
    if quantity <= min_stock {
        let urgency = if quantity <= critical_band {
            Urgency::Critical
        } else if quantity <= (min_stock + 1) / 2 {
            Urgency::High
        } else {
            Urgency::Medium
        };
        return Some((AlertKind::LowStock, urgency));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urgency_ordering_and_ranks() {
        assert!(Urgency::Low < Urgency::Medium);
        assert!(Urgency::Medium < Urgency::High);
        assert!(Urgency::High < Urgency::Critical);
        assert_eq!(Urgency::Critical.rank(), 4);
    }

    #[test]
    fn zero_stock_is_critical_out_of_stock() {
        assert_eq!(
            evaluate_level(0, 3, 2),
            Some((AlertKind::OutOfStock, Urgency::Critical))
        );
    }

    #[test]
    fn low_stock_bands() {
        // Inside the critical band above zero
        assert_eq!(
            evaluate_level(2, 10, 2),
            Some((AlertKind::LowStock, Urgency::Critical))
        );
        // At or below half the threshold
        assert_eq!(
            evaluate_level(5, 10, 2),
            Some((AlertKind::LowStock, Urgency::High))
        );
        // Below threshold but comfortably so
        assert_eq!(
            evaluate_level(9, 10, 2),
            Some((AlertKind::LowStock, Urgency::Medium))
        );
    }

    #[test]
    fn healthy_level_raises_nothing() {
        assert_eq!(evaluate_level(11, 10, 2), None);
        assert_eq!(evaluate_level(100, 3, 2), None);
    }

    #[test]
    fn threshold_boundary_is_inclusive() {
        assert!(evaluate_level(10, 10, 2).is_some());
        assert!(evaluate_level(11, 10, 2).is_none());
    }
}
