//! Sale models and lifecycle rules

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sale lifecycle state
///
/// The only legal transition is `Paid -> Voided`; a voided sale is
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaleState {
    Paid,
    Voided,
}

impl SaleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleState::Paid => "paid",
            SaleState::Voided => "voided",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "paid" => Some(SaleState::Paid),
            "voided" => Some(SaleState::Voided),
            _ => None,
        }
    }

    pub fn can_transition(&self, to: SaleState) -> bool {
        matches!((self, to), (SaleState::Paid, SaleState::Voided))
    }
}

/// A point-of-sale transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sale {
    pub id: Uuid,
    pub code: String,
    pub client_id: Uuid,
    pub user_id: Uuid,
    pub payment_method_id: Uuid,
    pub state: SaleState,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub void_reason: Option<String>,
    pub voided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// One line of a sale; unit price is snapshotted from the product at
/// sale time so later price changes do not rewrite history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleItem {
    pub id: Uuid,
    pub sale_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
}

/// Computed sale totals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleTotals {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

/// Compute deterministic sale totals from (quantity, unit_price) lines.
///
/// Tax is `tax_rate × subtotal`, rounded to 2 decimal places with
/// banker's rounding, so the same cart always produces the same total.
pub fn compute_totals(lines: &[(i32, Decimal)], tax_rate: Decimal) -> SaleTotals {
    let subtotal: Decimal = lines
        .iter()
        .map(|(quantity, unit_price)| Decimal::from(*quantity) * unit_price)
        .sum();
    let tax = (subtotal * tax_rate).round_dp(2);
    SaleTotals {
        subtotal,
        tax,
        total: subtotal + tax,
    }
}

/// Line subtotal for a single sale item.
pub fn line_subtotal(quantity: i32, unit_price: Decimal) -> Decimal {
    Decimal::from(quantity) * unit_price
}

/// Whether a sale created at `created_at` may still be voided at `now`.
pub fn within_void_window(
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
    window_hours: i64,
) -> bool {
    now - created_at <= Duration::hours(window_hours)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn paid_can_only_become_voided() {
        assert!(SaleState::Paid.can_transition(SaleState::Voided));
        assert!(!SaleState::Paid.can_transition(SaleState::Paid));
        assert!(!SaleState::Voided.can_transition(SaleState::Paid));
        assert!(!SaleState::Voided.can_transition(SaleState::Voided));
    }

    #[test]
    fn totals_reconcile_with_line_subtotals() {
        let lines = vec![(2, dec("19.90")), (1, dec("5.25")), (3, dec("0.99"))];
        let totals = compute_totals(&lines, dec("0.07"));

        let expected_subtotal: Decimal = lines.iter().map(|(q, p)| line_subtotal(*q, *p)).sum();
        assert_eq!(totals.subtotal, expected_subtotal);
        assert_eq!(totals.subtotal, dec("48.02"));
        assert_eq!(totals.tax, dec("3.36"));
        assert_eq!(totals.total, totals.subtotal + totals.tax);
    }

    #[test]
    fn zero_tax_rate_means_total_equals_subtotal() {
        let totals = compute_totals(&[(4, dec("10.00"))], Decimal::ZERO);
        assert_eq!(totals.tax, Decimal::ZERO);
        assert_eq!(totals.total, dec("40.00"));
    }

    #[test]
    fn void_window_is_inclusive_at_the_boundary() {
        let created = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap();
        let at_limit = created + Duration::hours(24);
        let past_limit = at_limit + Duration::seconds(1);

        assert!(within_void_window(created, at_limit, 24));
        assert!(!within_void_window(created, past_limit, 24));
    }
}
