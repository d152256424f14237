//! Stock alerting service
//!
//! Observes post-movement stock levels and raises threshold alerts,
//! keeping at most one unread alert per (product, kind) pair so a
//! product hovering around its threshold does not spam notifications.
//! Alerts are never closed automatically; marking one read is an
//! explicit user action.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, FromRow};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use shared::{
    evaluate_level, AlertKind, PaginatedResponse, Pagination, PaginationMeta, StockAlert, Urgency,
};

/// Stock alerting service
#[derive(Clone)]
pub struct StockAlertService {
    db: PgPool,
    config: Arc<Config>,
}

/// Search filters for alerts
#[derive(Debug, Default, Deserialize)]
pub struct AlertFilter {
    pub product_id: Option<Uuid>,
    pub kind: Option<AlertKind>,
    pub urgency: Option<Urgency>,
    pub is_read: Option<bool>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// Unread alert count for one urgency level
#[derive(Debug, Clone, Serialize)]
pub struct UrgencyCount {
    pub urgency: Urgency,
    pub count: i64,
}

/// Database row for a stock alert
#[derive(Debug, FromRow)]
struct AlertRow {
    id: Uuid,
    product_id: Uuid,
    kind: String,
    urgency: String,
    is_read: bool,
    read_by: Option<Uuid>,
    read_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl AlertRow {
    fn into_alert(self) -> AppResult<StockAlert> {
        let kind = AlertKind::from_str(&self.kind)
            .ok_or_else(|| anyhow::anyhow!("unknown alert kind: {}", self.kind))?;
        let urgency = Urgency::from_str(&self.urgency)
            .ok_or_else(|| anyhow::anyhow!("unknown alert urgency: {}", self.urgency))?;
        Ok(StockAlert {
            id: self.id,
            product_id: self.product_id,
            kind,
            urgency,
            is_read: self.is_read,
            read_by: self.read_by,
            read_at: self.read_at,
            created_at: self.created_at,
        })
    }
}

const ALERT_COLUMNS: &str =
    "id, product_id, kind, urgency, is_read, read_by, read_at, created_at";

/// SQL expression ranking urgency text for ordering (higher first).
const URGENCY_RANK: &str = "CASE urgency \
     WHEN 'critical' THEN 4 WHEN 'high' THEN 3 WHEN 'medium' THEN 2 ELSE 1 END";

impl StockAlertService {
    /// Create a new StockAlertService instance
    pub fn new(db: PgPool, config: Arc<Config>) -> Self {
        Self { db, config }
    }

    /// Evaluate a post-movement stock level against the product's
    /// threshold, ensuring exactly one unread alert per (product, kind).
    ///
    /// Raising the same alert again while one is unread is a no-op.
    /// Healthy levels raise nothing and do not close existing alerts.
    pub async fn evaluate(
        &self,
        product_id: Uuid,
        quantity: i32,
        min_stock: i32,
    ) -> AppResult<Option<StockAlert>> {
        let Some((kind, urgency)) =
            evaluate_level(quantity, min_stock, self.config.alerts.critical_band)
        else {
            return Ok(None);
        };

        let mut tx = self.db.begin().await?;

        let already_unread = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM stock_alerts
                WHERE product_id = $1 AND kind = $2 AND is_read = false
            )
            "#,
        )
        .bind(product_id)
        .bind(kind.as_str())
        .fetch_one(&mut *tx)
        .await?;

        if already_unread {
            tx.commit().await?;
            return Ok(None);
        }

        // The partial unique index on unread (product_id, kind) is the
        // backstop against a concurrent evaluation racing this insert.
        let row = sqlx::query_as::<_, AlertRow>(&format!(
            r#"
            INSERT INTO stock_alerts (id, product_id, kind, urgency)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT DO NOTHING
            RETURNING {ALERT_COLUMNS}
            "#,
        ))
        .bind(Uuid::new_v4())
        .bind(product_id)
        .bind(kind.as_str())
        .bind(urgency.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        tx.commit().await?;

        match row {
            Some(row) => {
                debug!(
                    product_id = %product_id,
                    kind = kind.as_str(),
                    urgency = urgency.as_str(),
                    quantity,
                    "Raised stock alert"
                );
                Ok(Some(row.into_alert()?))
            }
            None => Ok(None),
        }
    }

    /// Mark an alert read, recording who resolved it and when.
    pub async fn mark_read(&self, alert_id: Uuid, user_id: Uuid) -> AppResult<StockAlert> {
        let row = sqlx::query_as::<_, AlertRow>(&format!(
            r#"
            UPDATE stock_alerts
            SET is_read = true, read_by = $2, read_at = NOW()
            WHERE id = $1 AND is_read = false
            RETURNING {ALERT_COLUMNS}
            "#,
        ))
        .bind(alert_id)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Unread alert {}", alert_id)))?;

        row.into_alert()
    }

    /// Unread alerts, most urgent first, oldest first within a level.
    pub async fn unread(&self, pagination: Pagination) -> AppResult<PaginatedResponse<StockAlert>> {
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM stock_alerts WHERE is_read = false",
        )
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, AlertRow>(&format!(
            r#"
            SELECT {ALERT_COLUMNS}
            FROM stock_alerts
            WHERE is_read = false
            ORDER BY {URGENCY_RANK} DESC, created_at ASC
            LIMIT $1 OFFSET $2
            "#,
        ))
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let data = rows
            .into_iter()
            .map(AlertRow::into_alert)
            .collect::<AppResult<Vec<_>>>()?;

        Ok(PaginatedResponse {
            pagination: PaginationMeta::new(&pagination, total),
            data,
        })
    }

    /// All unread critical alerts, oldest first.
    pub async fn critical(&self) -> AppResult<Vec<StockAlert>> {
        let rows = sqlx::query_as::<_, AlertRow>(&format!(
            r#"
            SELECT {ALERT_COLUMNS}
            FROM stock_alerts
            WHERE is_read = false AND urgency = 'critical'
            ORDER BY created_at ASC
            "#,
        ))
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(AlertRow::into_alert).collect()
    }

    /// Unread alert counts grouped by urgency.
    pub async fn counts_by_urgency(&self) -> AppResult<Vec<UrgencyCount>> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT urgency, COUNT(*)
            FROM stock_alerts
            WHERE is_read = false
            GROUP BY urgency
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        let mut counts: Vec<UrgencyCount> = rows
            .into_iter()
            .map(|(urgency, count)| -> AppResult<UrgencyCount> {
                let urgency = Urgency::from_str(&urgency)
                    .ok_or_else(|| anyhow::anyhow!("unknown alert urgency: {}", urgency))?;
                Ok(UrgencyCount { urgency, count })
            })
            .collect::<AppResult<_>>()?;

        counts.sort_by(|a, b| b.urgency.cmp(&a.urgency));
        Ok(counts)
    }

    /// Paged alert search by product/kind/urgency/read-state/date range.
    pub async fn search(
        &self,
        filter: AlertFilter,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<StockAlert>> {
        let kind = filter.kind.map(|k| k.as_str().to_string());
        let urgency = filter.urgency.map(|u| u.as_str().to_string());

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM stock_alerts
            WHERE ($1::uuid IS NULL OR product_id = $1)
              AND ($2::varchar IS NULL OR kind = $2)
              AND ($3::varchar IS NULL OR urgency = $3)
              AND ($4::boolean IS NULL OR is_read = $4)
              AND ($5::timestamptz IS NULL OR created_at >= $5)
              AND ($6::timestamptz IS NULL OR created_at <= $6)
            "#,
        )
        .bind(filter.product_id)
        .bind(&kind)
        .bind(&urgency)
        .bind(filter.is_read)
        .bind(filter.from)
        .bind(filter.to)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, AlertRow>(&format!(
            r#"
            SELECT {ALERT_COLUMNS}
            FROM stock_alerts
            WHERE ($1::uuid IS NULL OR product_id = $1)
              AND ($2::varchar IS NULL OR kind = $2)
              AND ($3::varchar IS NULL OR urgency = $3)
              AND ($4::boolean IS NULL OR is_read = $4)
              AND ($5::timestamptz IS NULL OR created_at >= $5)
              AND ($6::timestamptz IS NULL OR created_at <= $6)
            ORDER BY {URGENCY_RANK} DESC, created_at DESC
            LIMIT $7 OFFSET $8
            "#,
        ))
        .bind(filter.product_id)
        .bind(&kind)
        .bind(&urgency)
        .bind(filter.is_read)
        .bind(filter.from)
        .bind(filter.to)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let data = rows
            .into_iter()
            .map(AlertRow::into_alert)
            .collect::<AppResult<Vec<_>>>()?;

        Ok(PaginatedResponse {
            pagination: PaginationMeta::new(&pagination, total),
            data,
        })
    }
}
