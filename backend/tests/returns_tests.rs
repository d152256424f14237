//! Return workflow tests
//!
//! Tests for the return lifecycle and quantity caps including:
//! - Returnable limit: sold minus prior approved/completed returns
//! - Return window: inclusive deadline measured in days from the sale
//! - Lifecycle: pending -> approved -> completed, or pending -> rejected

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use shared::{
    return_deadline, returnable_quantity, window_remaining_days, within_return_window, ReturnState,
};

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    /// A second return can only claim what the first left over
    #[test]
    fn test_second_return_capped_by_first() {
        // Sold 5, an approved return already took 3
        assert_eq!(returnable_quantity(5, 3), 2);
        // A request for 2 fits, a request for 3 would not
        assert!(2 <= returnable_quantity(5, 3));
        assert!(3 > returnable_quantity(5, 3));
    }

    /// A fully returned line has nothing left to return
    #[test]
    fn test_fully_returned_line() {
        assert_eq!(returnable_quantity(4, 4), 0);
    }

    /// Over-claimed history clamps to zero instead of going negative
    #[test]
    fn test_returnable_clamps_at_zero() {
        assert_eq!(returnable_quantity(4, 6), 0);
    }

    /// Pending returns do not count against the limit
    #[test]
    fn test_only_approved_and_completed_count() {
        assert!(!ReturnState::Pending.counts_against_sold());
        assert!(!ReturnState::Rejected.counts_against_sold());
        assert!(ReturnState::Approved.counts_against_sold());
        assert!(ReturnState::Completed.counts_against_sold());
    }

    /// The deadline day itself is still inside the window
    #[test]
    fn test_window_deadline_is_inclusive() {
        let sold = Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap();

        assert!(within_return_window(sold, sold + Duration::days(30), 30));
        assert!(!within_return_window(
            sold,
            sold + Duration::days(30) + Duration::seconds(1),
            30
        ));
        assert_eq!(return_deadline(sold, 30), sold + Duration::days(30));
    }

    /// Remaining days count down and clamp at zero
    #[test]
    fn test_remaining_days() {
        let sold = Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap();

        assert_eq!(window_remaining_days(sold, sold, 30), 30);
        assert_eq!(window_remaining_days(sold, sold + Duration::days(12), 30), 18);
        assert_eq!(window_remaining_days(sold, sold + Duration::days(45), 30), 0);
    }

    /// Rejection is only reachable from pending
    #[test]
    fn test_rejection_only_from_pending() {
        assert!(ReturnState::Pending.can_transition(ReturnState::Rejected));
        assert!(!ReturnState::Approved.can_transition(ReturnState::Rejected));
        assert!(!ReturnState::Completed.can_transition(ReturnState::Rejected));
    }

    /// Completion requires prior approval
    #[test]
    fn test_completion_requires_approval() {
        assert!(!ReturnState::Pending.can_transition(ReturnState::Completed));
        assert!(ReturnState::Approved.can_transition(ReturnState::Completed));
    }

    /// Terminal states accept no further transitions
    #[test]
    fn test_terminal_states_are_final() {
        for target in [
            ReturnState::Pending,
            ReturnState::Approved,
            ReturnState::Rejected,
            ReturnState::Completed,
        ] {
            assert!(!ReturnState::Rejected.can_transition(target));
            assert!(!ReturnState::Completed.can_transition(target));
        }
        assert!(ReturnState::Rejected.is_terminal());
        assert!(ReturnState::Completed.is_terminal());
        assert!(!ReturnState::Pending.is_terminal());
        assert!(!ReturnState::Approved.is_terminal());
    }
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// The returnable limit never exceeds what was sold and never goes
    /// negative
    #[test]
    fn prop_returnable_limit_bounds(sold in 0..1_000i32, returned in 0..2_000i32) {
        let limit = returnable_quantity(sold, returned);
        prop_assert!(limit >= 0);
        prop_assert!(limit <= sold);
    }

    /// A sequence of returns within the limit never exceeds the sold
    /// quantity in total
    #[test]
    fn prop_sequential_returns_never_exceed_sold(
        sold in 1..100i32,
        requests in prop::collection::vec(1..50i32, 1..10),
    ) {
        let mut already = 0;
        for request in requests {
            let limit = returnable_quantity(sold, already);
            if request <= limit {
                already += request;
            }
        }
        prop_assert!(already <= sold);
    }

    /// The window verdict agrees with the remaining-days counter
    #[test]
    fn prop_window_and_remaining_days_agree(days_after in 0..90i64) {
        let sold = Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap();
        let now = sold + Duration::days(days_after);

        let open = within_return_window(sold, now, 30);
        let remaining = window_remaining_days(sold, now, 30);

        prop_assert_eq!(open, days_after <= 30);
        if remaining > 0 {
            prop_assert!(open);
        }
    }
}
