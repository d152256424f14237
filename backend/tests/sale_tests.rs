//! Sale transaction tests
//!
//! Tests for sale totals and the void lifecycle including:
//! - Deterministic totals: the same cart always produces the same total
//! - Totals reconciliation: subtotal + tax = total, lines sum to subtotal
//! - Void window: inclusive deadline, no voiding after it passes
//! - Lifecycle: paid -> voided is the only legal transition

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{compute_totals, line_subtotal, within_void_window, SaleState};
use std::str::FromStr;

// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    /// A known cart produces known totals at 7% tax
    #[test]
    fn test_totals_for_known_cart() {
        // 2 x 12.50 + 3 x 7.00 + 1 x 2.01 = 48.01
        let lines = vec![(2, dec("12.50")), (3, dec("7.00")), (1, dec("2.01"))];
        let totals = compute_totals(&lines, dec("0.07"));

        assert_eq!(totals.subtotal, dec("48.01"));
        assert_eq!(totals.tax, dec("3.36"));
        assert_eq!(totals.total, dec("51.37"));
    }

    /// Line subtotals sum to the cart subtotal
    #[test]
    fn test_lines_sum_to_subtotal() {
        let lines = vec![(4, dec("1.99")), (2, dec("15.00"))];
        let totals = compute_totals(&lines, dec("0.07"));

        let summed: Decimal = lines
            .iter()
            .map(|(quantity, price)| line_subtotal(*quantity, *price))
            .sum();
        assert_eq!(summed, totals.subtotal);
    }

    /// A zero tax rate yields total equal to subtotal
    #[test]
    fn test_zero_tax_rate() {
        let totals = compute_totals(&[(5, dec("10.00"))], Decimal::ZERO);
        assert_eq!(totals.subtotal, dec("50.00"));
        assert_eq!(totals.tax, Decimal::ZERO);
        assert_eq!(totals.total, dec("50.00"));
    }

    /// Tax is rounded to 2 decimal places
    #[test]
    fn test_tax_rounding() {
        // 3 x 3.33 = 9.99; 7% of 9.99 = 0.6993 -> 0.70
        let totals = compute_totals(&[(3, dec("3.33"))], dec("0.07"));
        assert_eq!(totals.tax, dec("0.70"));
        assert_eq!(totals.total, dec("10.69"));
    }

    /// The void window deadline itself is still inside the window
    #[test]
    fn test_void_window_deadline_is_inclusive() {
        let sold = Utc.with_ymd_and_hms(2026, 3, 10, 14, 0, 0).unwrap();

        assert!(within_void_window(sold, sold, 24));
        assert!(within_void_window(sold, sold + Duration::hours(24), 24));
        assert!(!within_void_window(
            sold,
            sold + Duration::hours(24) + Duration::seconds(1),
            24
        ));
    }

    /// Voiding is allowed one minute after the sale
    #[test]
    fn test_void_shortly_after_sale() {
        let sold = Utc.with_ymd_and_hms(2026, 3, 10, 14, 0, 0).unwrap();
        assert!(within_void_window(sold, sold + Duration::minutes(1), 24));
    }

    /// The only legal transition is paid -> voided
    #[test]
    fn test_sale_lifecycle() {
        assert!(SaleState::Paid.can_transition(SaleState::Voided));
        assert!(!SaleState::Voided.can_transition(SaleState::Paid));
        assert!(!SaleState::Voided.can_transition(SaleState::Voided));
        assert!(!SaleState::Paid.can_transition(SaleState::Paid));
    }

    /// Sale states round-trip through their storage strings
    #[test]
    fn test_sale_state_round_trip() {
        for state in [SaleState::Paid, SaleState::Voided] {
            assert_eq!(SaleState::from_str(state.as_str()), Some(state));
        }
        assert_eq!(SaleState::from_str("refunded"), None);
    }
}

// ============================================================================
// Property Tests
// ============================================================================

fn price_strategy() -> impl Strategy<Value = Decimal> {
    // Prices between 0.01 and 500.00 with 2 decimal places
    (1..50_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// The same cart always produces the same totals
    #[test]
    fn prop_totals_are_deterministic(
        lines in prop::collection::vec((1..20i32, price_strategy()), 1..10),
        rate_pct in 0..25u32,
    ) {
        let rate = Decimal::new(rate_pct as i64, 2);
        let a = compute_totals(&lines, rate);
        let b = compute_totals(&lines, rate);
        prop_assert_eq!(a, b);
    }

    /// Subtotal plus tax always equals total
    #[test]
    fn prop_totals_reconcile(
        lines in prop::collection::vec((1..20i32, price_strategy()), 1..10),
        rate_pct in 0..25u32,
    ) {
        let rate = Decimal::new(rate_pct as i64, 2);
        let totals = compute_totals(&lines, rate);

        prop_assert_eq!(totals.subtotal + totals.tax, totals.total);
        prop_assert!(totals.tax >= Decimal::ZERO);

        let summed: Decimal = lines
            .iter()
            .map(|(quantity, price)| line_subtotal(*quantity, *price))
            .sum();
        prop_assert_eq!(summed, totals.subtotal);
    }

    /// The window verdict flips exactly once as time advances
    #[test]
    fn prop_void_window_is_monotonic(hours_after in 0..96i64) {
        let sold = Utc.with_ymd_and_hms(2026, 3, 10, 14, 0, 0).unwrap();
        let now = sold + Duration::hours(hours_after);
        prop_assert_eq!(within_void_window(sold, now, 24), hours_after <= 24);
    }
}
