//! Customer return models and lifecycle rules
//!
//! A return references a prior sale and moves through
//! `Pending -> Approved -> Completed`, or `Pending -> Rejected`.
//! Rejection is only possible from `Pending`; an approved return must
//! be completed. Stock is credited back on completion only.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Return lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnState {
    Pending,
    Approved,
    Rejected,
    Completed,
}

impl ReturnState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReturnState::Pending => "pending",
            ReturnState::Approved => "approved",
            ReturnState::Rejected => "rejected",
            ReturnState::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ReturnState::Pending),
            "approved" => Some(ReturnState::Approved),
            "rejected" => Some(ReturnState::Rejected),
            "completed" => Some(ReturnState::Completed),
            _ => None,
        }
    }

    /// Central transition table; callers must not re-derive validity.
    pub fn can_transition(&self, to: ReturnState) -> bool {
        matches!(
            (self, to),
            (ReturnState::Pending, ReturnState::Approved)
                | (ReturnState::Pending, ReturnState::Rejected)
                | (ReturnState::Approved, ReturnState::Completed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ReturnState::Rejected | ReturnState::Completed)
    }

    /// States whose line quantities count against the returnable limit.
    pub fn counts_against_sold(&self) -> bool {
        matches!(self, ReturnState::Approved | ReturnState::Completed)
    }
}

/// A customer return request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnRequest {
    pub id: Uuid,
    pub sale_id: Uuid,
    pub requested_by: Uuid,
    pub motive: String,
    pub state: ReturnState,
    pub refund_total: Option<Decimal>,
    pub resolution_note: Option<String>,
    pub resolved_by: Option<Uuid>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// One line of a return request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnItem {
    pub id: Uuid,
    pub return_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub motive: Option<String>,
}

/// Deadline for requesting a return against a sale.
pub fn return_deadline(sale_created_at: DateTime<Utc>, window_days: i64) -> DateTime<Utc> {
    sale_created_at + Duration::days(window_days)
}

/// Whether the return window for a sale is still open at `now`.
pub fn within_return_window(
    sale_created_at: DateTime<Utc>,
    now: DateTime<Utc>,
    window_days: i64,
) -> bool {
    now <= return_deadline(sale_created_at, window_days)
}

/// Whole days left in the return window, clamped at zero.
pub fn window_remaining_days(
    sale_created_at: DateTime<Utc>,
    now: DateTime<Utc>,
    window_days: i64,
) -> i64 {
    let deadline = return_deadline(sale_created_at, window_days);
    (deadline - now).num_days().max(0)
}

/// How many units of a sale line are still returnable given what was
/// sold and what prior approved/completed returns already claimed.
pub fn returnable_quantity(sold: i32, already_returned: i32) -> i32 {
    (sold - already_returned).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn transition_table_matches_lifecycle() {
        use ReturnState::*;

        assert!(Pending.can_transition(Approved));
        assert!(Pending.can_transition(Rejected));
        assert!(Approved.can_transition(Completed));

        // No rejection after approval, no skipping approval
        assert!(!Approved.can_transition(Rejected));
        assert!(!Pending.can_transition(Completed));

        // Terminal states go nowhere
        for to in [Pending, Approved, Rejected, Completed] {
            assert!(!Rejected.can_transition(to));
            assert!(!Completed.can_transition(to));
        }
    }

    #[test]
    fn only_approved_and_completed_count_against_sold() {
        assert!(ReturnState::Approved.counts_against_sold());
        assert!(ReturnState::Completed.counts_against_sold());
        assert!(!ReturnState::Pending.counts_against_sold());
        assert!(!ReturnState::Rejected.counts_against_sold());
    }

    #[test]
    fn window_closes_after_thirty_days() {
        let sold = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap();
        let day_30 = sold + Duration::days(30);
        let day_31 = sold + Duration::days(31);

        assert!(within_return_window(sold, day_30, 30));
        assert!(!within_return_window(sold, day_31, 30));
        assert_eq!(window_remaining_days(sold, day_31, 30), 0);
        assert_eq!(window_remaining_days(sold, sold + Duration::days(10), 30), 20);
    }

    #[test]
    fn returnable_quantity_never_goes_negative() {
        assert_eq!(returnable_quantity(5, 3), 2);
        assert_eq!(returnable_quantity(5, 5), 0);
        assert_eq!(returnable_quantity(5, 7), 0);
    }
}
