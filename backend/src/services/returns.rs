//! Return workflow
//!
//! Customer returns reference a prior sale and walk
//! `pending -> approved -> completed` (or `pending -> rejected`).
//! Quantities are capped per sale line at sold minus what earlier
//! approved/completed returns already claimed, and the whole workflow
//! is gated on a configurable window after the sale. Stock is credited
//! back on completion only.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::services::ledger::{MovementChange, StockLedgerService};
use shared::{
    return_deadline, returnable_quantity, validate_note, validate_quantity,
    validate_unique_products, window_remaining_days, within_return_window, Clock, MovementKind,
    PaginatedResponse, Pagination, PaginationMeta, ReturnItem, ReturnRequest, ReturnState,
};

/// Upper bound for free-text motives and resolution notes.
const MAX_TEXT_LEN: usize = 500;

/// Return workflow service
#[derive(Clone)]
pub struct ReturnService {
    db: PgPool,
    config: Arc<Config>,
    clock: Clock,
}

/// One requested return line
#[derive(Debug, Deserialize)]
pub struct ReturnLineInput {
    pub product_id: Uuid,
    pub quantity: i32,
    pub motive: Option<String>,
}

/// Input for opening a return request
#[derive(Debug, Deserialize)]
pub struct CreateReturnInput {
    pub sale_id: Uuid,
    pub motive: String,
    pub lines: Vec<ReturnLineInput>,
}

/// Input for rejecting a return
#[derive(Debug, Deserialize)]
pub struct RejectReturnInput {
    pub reason: String,
}

/// Search filters for returns
#[derive(Debug, Default, Deserialize)]
pub struct ReturnFilter {
    pub sale_id: Option<Uuid>,
    pub requested_by: Option<Uuid>,
    pub state: Option<ReturnState>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// A return request with its line items
#[derive(Debug, Clone, Serialize)]
pub struct ReturnWithItems {
    #[serde(flatten)]
    pub request: ReturnRequest,
    pub items: Vec<ReturnItem>,
}

/// Snapshot of a sale's return window
#[derive(Debug, Clone, Serialize)]
pub struct ReturnWindowStatus {
    pub sale_id: Uuid,
    pub open: bool,
    pub deadline: DateTime<Utc>,
    pub remaining_days: i64,
}

/// Read-only quantity check against the returnable limit
#[derive(Debug, Clone, Serialize)]
pub struct QuantityCheck {
    pub valid: bool,
    pub returnable: i32,
}

/// Return counts grouped by motive
#[derive(Debug, Clone, Serialize)]
pub struct MotiveBreakdown {
    pub motive: String,
    pub count: i64,
    pub quantity: i64,
}

/// Returned quantity grouped by product
#[derive(Debug, Clone, Serialize)]
pub struct ProductBreakdown {
    pub product_id: Uuid,
    pub quantity: i64,
}

/// Aggregated return analytics for a period
#[derive(Debug, Clone, Serialize)]
pub struct ReturnAnalytics {
    pub by_motive: Vec<MotiveBreakdown>,
    pub by_product: Vec<ProductBreakdown>,
}

/// Database row for a return request
#[derive(Debug, FromRow)]
struct ReturnRow {
    id: Uuid,
    sale_id: Uuid,
    requested_by: Uuid,
    motive: String,
    state: String,
    refund_total: Option<Decimal>,
    resolution_note: Option<String>,
    resolved_by: Option<Uuid>,
    resolved_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl ReturnRow {
    fn into_request(self) -> AppResult<ReturnRequest> {
        let state = ReturnState::from_str(&self.state)
            .ok_or_else(|| anyhow::anyhow!("unknown return state: {}", self.state))?;
        Ok(ReturnRequest {
            id: self.id,
            sale_id: self.sale_id,
            requested_by: self.requested_by,
            motive: self.motive,
            state,
            refund_total: self.refund_total,
            resolution_note: self.resolution_note,
            resolved_by: self.resolved_by,
            resolved_at: self.resolved_at,
            completed_at: self.completed_at,
            created_at: self.created_at,
        })
    }
}

/// Database row for a return item
#[derive(Debug, FromRow)]
struct ReturnItemRow {
    id: Uuid,
    return_id: Uuid,
    product_id: Uuid,
    quantity: i32,
    motive: Option<String>,
}

impl From<ReturnItemRow> for ReturnItem {
    fn from(row: ReturnItemRow) -> Self {
        ReturnItem {
            id: row.id,
            return_id: row.return_id,
            product_id: row.product_id,
            quantity: row.quantity,
            motive: row.motive,
        }
    }
}

const RETURN_COLUMNS: &str = "id, sale_id, requested_by, motive, state, refund_total, \
     resolution_note, resolved_by, resolved_at, completed_at, created_at";

impl ReturnService {
    /// Create a new ReturnService instance
    pub fn new(db: PgPool, config: Arc<Config>) -> Self {
        Self {
            db,
            config,
            clock: Clock::System,
        }
    }

    /// Same service with a pinned clock, for window tests.
    pub fn with_clock(db: PgPool, config: Arc<Config>, clock: Clock) -> Self {
        Self { db, config, clock }
    }

    fn ledger(&self) -> StockLedgerService {
        StockLedgerService::new(self.db.clone(), self.config.clone())
    }

    /// Open a return request in `pending`. Validates the window against
    /// the sale date and every line against its returnable limit.
    pub async fn create(
        &self,
        user_id: Uuid,
        input: CreateReturnInput,
    ) -> AppResult<ReturnWithItems> {
        if input.lines.is_empty() {
            return Err(AppError::Validation {
                field: "lines".to_string(),
                message: "A return needs at least one line".to_string(),
            });
        }
        validate_note(&input.motive, MAX_TEXT_LEN).map_err(|msg| AppError::Validation {
            field: "motive".to_string(),
            message: msg.to_string(),
        })?;
        let product_ids: Vec<Uuid> = input.lines.iter().map(|l| l.product_id).collect();
        validate_unique_products(&product_ids).map_err(|msg| AppError::Validation {
            field: "lines".to_string(),
            message: msg.to_string(),
        })?;
        for line in &input.lines {
            validate_quantity(line.quantity).map_err(|_| AppError::InvalidQuantity {
                entity: format!("product {}", line.product_id),
                requested: line.quantity,
                limit: 0,
            })?;
        }

        let mut tx = self.db.begin().await?;

        let sale_created_at = sqlx::query_scalar::<_, DateTime<Utc>>(
            "SELECT created_at FROM sales WHERE id = $1 AND state = 'paid'",
        )
        .bind(input.sale_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Paid sale {}", input.sale_id)))?;

        let window_days = self.config.returns.window_days;
        let now = self.clock.now();
        if !within_return_window(sale_created_at, now, window_days) {
            return Err(AppError::OutOfWindow {
                rule: "return window".to_string(),
                deadline: return_deadline(sale_created_at, window_days),
            });
        }

        for line in &input.lines {
            self.check_line_in_tx(&mut tx, input.sale_id, line.product_id, line.quantity)
                .await?;
        }

        let row = sqlx::query_as::<_, ReturnRow>(&format!(
            r#"
            INSERT INTO returns (id, sale_id, requested_by, motive, state, created_at)
            VALUES ($1, $2, $3, $4, 'pending', $5)
            RETURNING {RETURN_COLUMNS}
            "#,
        ))
        .bind(Uuid::new_v4())
        .bind(input.sale_id)
        .bind(user_id)
        .bind(input.motive.trim())
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let mut items = Vec::with_capacity(input.lines.len());
        for line in &input.lines {
            let item = sqlx::query_as::<_, ReturnItemRow>(
                r#"
                INSERT INTO return_items (id, return_id, product_id, quantity, motive)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id, return_id, product_id, quantity, motive
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(row.id)
            .bind(line.product_id)
            .bind(line.quantity)
            .bind(line.motive.as_deref().map(str::trim))
            .fetch_one(&mut *tx)
            .await?;
            items.push(item.into());
        }

        tx.commit().await?;

        debug!(return_id = %row.id, sale_id = %input.sale_id, "Opened return request");
        Ok(ReturnWithItems {
            request: row.into_request()?,
            items,
        })
    }

    /// Approve a pending return. Quantities are re-validated inside the
    /// transaction so two overlapping approvals cannot both claim the
    /// last returnable unit.
    pub async fn approve(&self, return_id: Uuid, user_id: Uuid) -> AppResult<ReturnWithItems> {
        let mut tx = self.db.begin().await?;

        let row = self
            .lock_in_state(&mut tx, return_id, ReturnState::Approved)
            .await?;

        // Overlapping approvals against the same sale hold locks on
        // different return rows; the shared lock lives on the sale row.
        // Without it both transactions would sum returnable quantities
        // that exclude each other's uncommitted approval.
        sqlx::query("SELECT id FROM sales WHERE id = $1 FOR UPDATE")
            .bind(row.sale_id)
            .execute(&mut *tx)
            .await?;

        let items = self.items_in_tx(&mut tx, return_id).await?;
        for item in &items {
            self.check_line_in_tx(&mut tx, row.sale_id, item.product_id, item.quantity)
                .await?;
        }

        let updated = sqlx::query_as::<_, ReturnRow>(&format!(
            r#"
            UPDATE returns
            SET state = 'approved', resolved_by = $2, resolved_at = $3
            WHERE id = $1
            RETURNING {RETURN_COLUMNS}
            "#,
        ))
        .bind(return_id)
        .bind(user_id)
        .bind(self.clock.now())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(return_id = %return_id, "Approved return");
        Ok(ReturnWithItems {
            request: updated.into_request()?,
            items,
        })
    }

    /// Reject a pending return with a mandatory reason.
    pub async fn reject(
        &self,
        return_id: Uuid,
        user_id: Uuid,
        input: RejectReturnInput,
    ) -> AppResult<ReturnWithItems> {
        validate_note(&input.reason, MAX_TEXT_LEN).map_err(|msg| AppError::Validation {
            field: "reason".to_string(),
            message: msg.to_string(),
        })?;
        let reason = input.reason.trim();

        let mut tx = self.db.begin().await?;

        self.lock_in_state(&mut tx, return_id, ReturnState::Rejected)
            .await?;

        let updated = sqlx::query_as::<_, ReturnRow>(&format!(
            r#"
            UPDATE returns
            SET state = 'rejected', resolution_note = $2, resolved_by = $3, resolved_at = $4
            WHERE id = $1
            RETURNING {RETURN_COLUMNS}
            "#,
        ))
        .bind(return_id)
        .bind(reason)
        .bind(user_id)
        .bind(self.clock.now())
        .fetch_one(&mut *tx)
        .await?;

        let items = self.items_in_tx(&mut tx, return_id).await?;
        tx.commit().await?;

        debug!(return_id = %return_id, "Rejected return");
        Ok(ReturnWithItems {
            request: updated.into_request()?,
            items,
        })
    }

    /// Complete an approved return: credit stock back for every line,
    /// price the refund from the original sale items, and close the
    /// request — all in one transaction.
    pub async fn complete(&self, return_id: Uuid, user_id: Uuid) -> AppResult<ReturnWithItems> {
        let mut tx = self.db.begin().await?;

        let row = self
            .lock_in_state(&mut tx, return_id, ReturnState::Completed)
            .await?;

        let items = self.items_in_tx(&mut tx, return_id).await?;
        let ledger = self.ledger();
        let note = format!("return:{}", return_id);

        let mut refund_total = Decimal::ZERO;
        let mut levels = Vec::with_capacity(items.len());
        for item in &items {
            let unit_price = sqlx::query_scalar::<_, Decimal>(
                "SELECT unit_price FROM sale_items WHERE sale_id = $1 AND product_id = $2",
            )
            .bind(row.sale_id)
            .bind(item.product_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "return {} line {} has no matching sale line",
                    return_id,
                    item.product_id
                )
            })?;
            refund_total += unit_price * Decimal::from(item.quantity);

            let (movement, level) = ledger
                .apply_in_tx(
                    &mut tx,
                    item.product_id,
                    MovementKind::ReturnCredit,
                    MovementChange::Delta(item.quantity),
                    user_id,
                    Some(&note),
                )
                .await?;
            levels.push((item.product_id, movement.quantity_after, level.min_stock));
        }

        let updated = sqlx::query_as::<_, ReturnRow>(&format!(
            r#"
            UPDATE returns
            SET state = 'completed', refund_total = $2, completed_at = $3
            WHERE id = $1
            RETURNING {RETURN_COLUMNS}
            "#,
        ))
        .bind(return_id)
        .bind(refund_total)
        .bind(self.clock.now())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        let ledger = self.ledger();
        for (product_id, quantity_after, min_stock) in levels {
            ledger
                .evaluate_alerts(product_id, quantity_after, min_stock)
                .await;
        }

        debug!(return_id = %return_id, refund = %refund_total, "Completed return");
        Ok(ReturnWithItems {
            request: updated.into_request()?,
            items,
        })
    }

    /// Get a return request with its items.
    pub async fn get(&self, return_id: Uuid) -> AppResult<ReturnWithItems> {
        let row = sqlx::query_as::<_, ReturnRow>(&format!(
            "SELECT {RETURN_COLUMNS} FROM returns WHERE id = $1",
        ))
        .bind(return_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Return {}", return_id)))?;

        let items = self.items(return_id).await?;
        Ok(ReturnWithItems {
            request: row.into_request()?,
            items,
        })
    }

    /// All returns ever opened against a sale, oldest first.
    pub async fn list_by_sale(&self, sale_id: Uuid) -> AppResult<Vec<ReturnRequest>> {
        let rows = sqlx::query_as::<_, ReturnRow>(&format!(
            "SELECT {RETURN_COLUMNS} FROM returns WHERE sale_id = $1 ORDER BY created_at ASC",
        ))
        .bind(sale_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(ReturnRow::into_request).collect()
    }

    /// Paged return search by sale/requester/state/date range.
    pub async fn search(
        &self,
        filter: ReturnFilter,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<ReturnRequest>> {
        let state = filter.state.map(|s| s.as_str().to_string());

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM returns
            WHERE ($1::uuid IS NULL OR sale_id = $1)
              AND ($2::uuid IS NULL OR requested_by = $2)
              AND ($3::varchar IS NULL OR state = $3)
              AND ($4::timestamptz IS NULL OR created_at >= $4)
              AND ($5::timestamptz IS NULL OR created_at <= $5)
            "#,
        )
        .bind(filter.sale_id)
        .bind(filter.requested_by)
        .bind(&state)
        .bind(filter.from)
        .bind(filter.to)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, ReturnRow>(&format!(
            r#"
            SELECT {RETURN_COLUMNS}
            FROM returns
            WHERE ($1::uuid IS NULL OR sale_id = $1)
              AND ($2::uuid IS NULL OR requested_by = $2)
              AND ($3::varchar IS NULL OR state = $3)
              AND ($4::timestamptz IS NULL OR created_at >= $4)
              AND ($5::timestamptz IS NULL OR created_at <= $5)
            ORDER BY created_at DESC
            LIMIT $6 OFFSET $7
            "#,
        ))
        .bind(filter.sale_id)
        .bind(filter.requested_by)
        .bind(&state)
        .bind(filter.from)
        .bind(filter.to)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let data = rows
            .into_iter()
            .map(ReturnRow::into_request)
            .collect::<AppResult<Vec<_>>>()?;

        Ok(PaginatedResponse {
            pagination: PaginationMeta::new(&pagination, total),
            data,
        })
    }

    /// Return-window snapshot for a sale.
    pub async fn window_check(&self, sale_id: Uuid) -> AppResult<ReturnWindowStatus> {
        let sale_created_at = sqlx::query_scalar::<_, DateTime<Utc>>(
            "SELECT created_at FROM sales WHERE id = $1",
        )
        .bind(sale_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Sale {}", sale_id)))?;

        let window_days = self.config.returns.window_days;
        let now = self.clock.now();
        Ok(ReturnWindowStatus {
            sale_id,
            open: within_return_window(sale_created_at, now, window_days),
            deadline: return_deadline(sale_created_at, window_days),
            remaining_days: window_remaining_days(sale_created_at, now, window_days),
        })
    }

    /// Read-only check of a quantity against the returnable limit for
    /// one sale line.
    pub async fn check_quantity(
        &self,
        sale_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> AppResult<QuantityCheck> {
        let sold = sqlx::query_scalar::<_, i32>(
            "SELECT quantity FROM sale_items WHERE sale_id = $1 AND product_id = $2",
        )
        .bind(sale_id)
        .bind(product_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("Sale {} has no line for product {}", sale_id, product_id))
        })?;

        let already = self.already_returned(sale_id, product_id).await?;
        let returnable = returnable_quantity(sold, already);
        Ok(QuantityCheck {
            valid: quantity > 0 && quantity <= returnable,
            returnable,
        })
    }

    /// Aggregated motive and product breakdowns over approved and
    /// completed returns in a period.
    pub async fn analytics(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> AppResult<ReturnAnalytics> {
        let by_motive = sqlx::query_as::<_, (String, i64, i64)>(
            r#"
            SELECT r.motive, COUNT(DISTINCT r.id), COALESCE(SUM(ri.quantity), 0)
            FROM returns r
            JOIN return_items ri ON ri.return_id = r.id
            WHERE r.state IN ('approved', 'completed')
              AND ($1::timestamptz IS NULL OR r.created_at >= $1)
              AND ($2::timestamptz IS NULL OR r.created_at <= $2)
            GROUP BY r.motive
            ORDER BY COUNT(DISTINCT r.id) DESC
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.db)
        .await?
        .into_iter()
        .map(|(motive, count, quantity)| MotiveBreakdown {
            motive,
            count,
            quantity,
        })
        .collect();

        let by_product = sqlx::query_as::<_, (Uuid, i64)>(
            r#"
            SELECT ri.product_id, COALESCE(SUM(ri.quantity), 0)
            FROM returns r
            JOIN return_items ri ON ri.return_id = r.id
            WHERE r.state IN ('approved', 'completed')
              AND ($1::timestamptz IS NULL OR r.created_at >= $1)
              AND ($2::timestamptz IS NULL OR r.created_at <= $2)
            GROUP BY ri.product_id
            ORDER BY SUM(ri.quantity) DESC
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.db)
        .await?
        .into_iter()
        .map(|(product_id, quantity)| ProductBreakdown {
            product_id,
            quantity,
        })
        .collect();

        Ok(ReturnAnalytics {
            by_motive,
            by_product,
        })
    }

    /// Lock a return row and verify the transition to `target` is legal.
    async fn lock_in_state(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        return_id: Uuid,
        target: ReturnState,
    ) -> AppResult<ReturnRow> {
        let row = sqlx::query_as::<_, ReturnRow>(&format!(
            "SELECT {RETURN_COLUMNS} FROM returns WHERE id = $1 FOR UPDATE",
        ))
        .bind(return_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Return {}", return_id)))?;

        let state = ReturnState::from_str(&row.state)
            .ok_or_else(|| anyhow::anyhow!("unknown return state: {}", row.state))?;
        if !state.can_transition(target) {
            return Err(AppError::IllegalTransition {
                entity: "Return".to_string(),
                id: return_id,
                from: state.as_str().to_string(),
                attempted: target.as_str().to_string(),
            });
        }
        Ok(row)
    }

    /// Validate one line against sold-minus-already-returned, inside
    /// the caller's transaction.
    async fn check_line_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        sale_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> AppResult<()> {
        let sold = sqlx::query_scalar::<_, i32>(
            "SELECT quantity FROM sale_items WHERE sale_id = $1 AND product_id = $2",
        )
        .bind(sale_id)
        .bind(product_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| AppError::Validation {
            field: "product_id".to_string(),
            message: format!("Product {} is not part of sale {}", product_id, sale_id),
        })?;

        let already = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COALESCE(SUM(ri.quantity), 0)
            FROM return_items ri
            JOIN returns r ON r.id = ri.return_id
            WHERE r.sale_id = $1 AND ri.product_id = $2
              AND r.state IN ('approved', 'completed')
            "#,
        )
        .bind(sale_id)
        .bind(product_id)
        .fetch_one(&mut **tx)
        .await?;

        let returnable = returnable_quantity(sold, already as i32);
        if quantity > returnable {
            return Err(AppError::InvalidQuantity {
                entity: format!("product {}", product_id),
                requested: quantity,
                limit: returnable,
            });
        }
        Ok(())
    }

    async fn already_returned(&self, sale_id: Uuid, product_id: Uuid) -> AppResult<i32> {
        let sum = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COALESCE(SUM(ri.quantity), 0)
            FROM return_items ri
            JOIN returns r ON r.id = ri.return_id
            WHERE r.sale_id = $1 AND ri.product_id = $2
              AND r.state IN ('approved', 'completed')
            "#,
        )
        .bind(sale_id)
        .bind(product_id)
        .fetch_one(&self.db)
        .await?;
        Ok(sum as i32)
    }

    async fn items(&self, return_id: Uuid) -> AppResult<Vec<ReturnItem>> {
        let rows = sqlx::query_as::<_, ReturnItemRow>(
            r#"
            SELECT id, return_id, product_id, quantity, motive
            FROM return_items
            WHERE return_id = $1
            ORDER BY id
            "#,
        )
        .bind(return_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(ReturnItem::from).collect())
    }

    async fn items_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        return_id: Uuid,
    ) -> AppResult<Vec<ReturnItem>> {
        let rows = sqlx::query_as::<_, ReturnItemRow>(
            r#"
            SELECT id, return_id, product_id, quantity, motive
            FROM return_items
            WHERE return_id = $1
            ORDER BY id
            "#,
        )
        .bind(return_id)
        .fetch_all(&mut **tx)
        .await?;

        Ok(rows.into_iter().map(ReturnItem::from).collect())
    }
}
