//! Stock ledger tests
//!
//! Tests for the quantity rule and ledger replay including:
//! - Non-negative stock: no accepted movement drives a quantity below zero
//! - Replay accuracy: an ordered history reproduces the current quantity
//! - Adjustment deltas: stock-take corrections resolve to signed deltas

use proptest::prelude::*;
use shared::{check_movement, replay_movements, MovementCheck, MovementKind, StockMovement};

fn movement(kind: MovementKind, before: i32, delta: i32) -> StockMovement {
    StockMovement {
        id: uuid::Uuid::new_v4(),
        product_id: uuid::Uuid::new_v4(),
        kind,
        delta,
        quantity_before: before,
        quantity_after: before + delta,
        user_id: uuid::Uuid::new_v4(),
        note: None,
        created_at: chrono::Utc::now(),
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    /// Inbound movements always increase the quantity
    #[test]
    fn test_inbound_increases_quantity() {
        assert_eq!(
            check_movement(10, MovementKind::Inbound, 5),
            MovementCheck::Ok { quantity_after: 15 }
        );
    }

    /// An outbound for exactly the available quantity reaches zero
    #[test]
    fn test_outbound_to_exactly_zero_is_accepted() {
        assert_eq!(
            check_movement(5, MovementKind::Outbound, -5),
            MovementCheck::Ok { quantity_after: 0 }
        );
    }

    /// An outbound past the available quantity reports what was available
    #[test]
    fn test_oversell_reports_available_and_requested() {
        assert_eq!(
            check_movement(2, MovementKind::Outbound, -3),
            MovementCheck::InsufficientStock {
                available: 2,
                requested: 3
            }
        );
    }

    /// Zero deltas are rejected before touching the ledger
    #[test]
    fn test_zero_delta_is_rejected() {
        assert_eq!(
            check_movement(10, MovementKind::Adjustment, 0),
            MovementCheck::ZeroDelta
        );
    }

    /// A negative adjustment can go down to zero but never below
    #[test]
    fn test_adjustment_cannot_go_negative() {
        assert_eq!(
            check_movement(4, MovementKind::Adjustment, -4),
            MovementCheck::Ok { quantity_after: 0 }
        );
        assert_eq!(
            check_movement(4, MovementKind::Adjustment, -5),
            MovementCheck::NegativeResult { quantity_after: -1 }
        );
    }

    /// A stock-take to a target quantity resolves to a signed delta
    #[test]
    fn test_stock_take_delta_resolution() {
        // Counted 7 with 10 on the books: delta is -3
        let counted = 7;
        let on_books = 10;
        let delta = counted - on_books;
        assert_eq!(
            check_movement(on_books, MovementKind::Adjustment, delta),
            MovementCheck::Ok { quantity_after: 7 }
        );
    }

    /// Deltas past the i32 range surface as a rejection, not a panic
    #[test]
    fn test_huge_inbound_delta_is_rejected() {
        assert_eq!(
            check_movement(5, MovementKind::Inbound, i32::MAX),
            MovementCheck::Overflow
        );
        assert_eq!(
            check_movement(i32::MAX, MovementKind::ReturnCredit, 1),
            MovementCheck::Overflow
        );
    }

    /// Replaying an intact history reproduces the final quantity
    #[test]
    fn test_replay_reproduces_current_quantity() {
        let history = vec![
            movement(MovementKind::Inbound, 0, 20),
            movement(MovementKind::Outbound, 20, -6),
            movement(MovementKind::ReturnCredit, 14, 2),
            movement(MovementKind::Adjustment, 16, -1),
        ];

        assert_eq!(replay_movements(0, &history), Some(15));
    }

    /// A broken before/after chain fails the replay
    #[test]
    fn test_replay_detects_broken_chain() {
        let mut history = vec![
            movement(MovementKind::Inbound, 0, 10),
            movement(MovementKind::Outbound, 10, -3),
        ];
        // Tamper with the recorded starting point of the second entry
        history[1].quantity_before = 9;

        assert_eq!(replay_movements(0, &history), None);
    }

    /// Replay from the wrong starting quantity fails immediately
    #[test]
    fn test_replay_requires_matching_start() {
        let history = vec![movement(MovementKind::Inbound, 5, 10)];
        assert_eq!(replay_movements(0, &history), None);
        assert_eq!(replay_movements(5, &history), Some(15));
    }

    /// An empty history replays to the starting quantity
    #[test]
    fn test_replay_empty_history() {
        assert_eq!(replay_movements(12, &[]), Some(12));
    }
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Every accepted movement lands on a non-negative quantity
    #[test]
    fn prop_accepted_movements_never_go_negative(
        before in 0..10_000i32,
        delta in -10_000..10_000i32,
    ) {
        for kind in [
            MovementKind::Inbound,
            MovementKind::Outbound,
            MovementKind::Adjustment,
            MovementKind::ReturnCredit,
        ] {
            if let MovementCheck::Ok { quantity_after } = check_movement(before, kind, delta) {
                prop_assert!(quantity_after >= 0);
                prop_assert_eq!(quantity_after, before + delta);
            }
        }
    }

    /// A history built from accepted movements always replays cleanly
    #[test]
    fn prop_replay_matches_running_quantity(
        start in 0..1_000i32,
        deltas in prop::collection::vec(-50..50i32, 0..30),
    ) {
        let mut quantity = start;
        let mut history = Vec::new();
        for delta in deltas {
            if let MovementCheck::Ok { quantity_after } =
                check_movement(quantity, MovementKind::Adjustment, delta)
            {
                history.push(movement(MovementKind::Adjustment, quantity, delta));
                quantity = quantity_after;
            }
        }

        prop_assert_eq!(replay_movements(start, &history), Some(quantity));
    }

    /// The quantity rule never panics anywhere in the i32 range
    #[test]
    fn prop_check_is_total_over_i32(
        before in 0..=i32::MAX,
        delta in any::<i32>(),
    ) {
        for kind in [
            MovementKind::Inbound,
            MovementKind::Outbound,
            MovementKind::Adjustment,
            MovementKind::ReturnCredit,
        ] {
            if let MovementCheck::Ok { quantity_after } = check_movement(before, kind, delta) {
                prop_assert!(quantity_after >= 0);
            }
        }
    }

    /// Oversells are always rejected, never silently clamped
    #[test]
    fn prop_oversell_always_rejected(
        available in 0..1_000i32,
        extra in 1..1_000i32,
    ) {
        let requested = available + extra;
        prop_assert_eq!(
            check_movement(available, MovementKind::Outbound, -requested),
            MovementCheck::InsufficientStock { available, requested }
        );
    }
}
