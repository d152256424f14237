//! Replenishment workflow
//!
//! Supplier restocking orders walk
//! `pending -> approved -> ordered -> partially_received* -> completed`,
//! with `cancelled` reachable from any non-terminal state. Each receipt
//! credits stock through the ledger and a line can never receive more
//! than was requested; the order completes on its own once every line
//! is fully received, or early via an explicit close with a reason.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::services::ledger::{MovementChange, StockLedgerService};
use shared::{
    is_fully_received, validate_note, validate_quantity, validate_unique_products, Clock,
    MovementKind, PaginatedResponse, Pagination, PaginationMeta, Priority, ReplenishmentItem,
    ReplenishmentOrder, ReplenishmentState,
};

/// Retries for order-code collisions.
const MAX_CODE_RETRIES: u32 = 3;

/// Upper bound for free-text close reasons.
const MAX_REASON_LEN: usize = 500;

/// Replenishment workflow service
#[derive(Clone)]
pub struct ReplenishmentService {
    db: PgPool,
    config: Arc<Config>,
    clock: Clock,
}

/// One requested order line
#[derive(Debug, Deserialize)]
pub struct ReplenishmentLineInput {
    pub product_id: Uuid,
    pub quantity: i32,
}

/// Input for creating a replenishment order
#[derive(Debug, Deserialize)]
pub struct CreateReplenishmentInput {
    pub supplier_id: Uuid,
    pub priority: Priority,
    pub lines: Vec<ReplenishmentLineInput>,
}

/// One received line of a supplier delivery
#[derive(Debug, Deserialize)]
pub struct ReceiptLineInput {
    pub product_id: Uuid,
    pub quantity: i32,
}

/// Input for recording a supplier delivery
#[derive(Debug, Deserialize)]
pub struct ReceiveInput {
    pub lines: Vec<ReceiptLineInput>,
}

/// Input for closing a short-delivered order early
#[derive(Debug, Deserialize)]
pub struct CloseReplenishmentInput {
    pub reason: String,
}

/// Search filters for replenishment orders
#[derive(Debug, Default, Deserialize)]
pub struct ReplenishmentFilter {
    pub supplier_id: Option<Uuid>,
    pub state: Option<ReplenishmentState>,
    pub priority: Option<Priority>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// An order with its line items
#[derive(Debug, Clone, Serialize)]
pub struct ReplenishmentWithItems {
    #[serde(flatten)]
    pub order: ReplenishmentOrder,
    pub items: Vec<ReplenishmentItem>,
}

/// Database row for a replenishment order
#[derive(Debug, FromRow)]
struct OrderRow {
    id: Uuid,
    code: String,
    supplier_id: Uuid,
    requested_by: Uuid,
    priority: String,
    state: String,
    closed_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self) -> AppResult<ReplenishmentOrder> {
        let state = ReplenishmentState::from_str(&self.state)
            .ok_or_else(|| anyhow::anyhow!("unknown replenishment state: {}", self.state))?;
        let priority = Priority::from_str(&self.priority)
            .ok_or_else(|| anyhow::anyhow!("unknown priority: {}", self.priority))?;
        Ok(ReplenishmentOrder {
            id: self.id,
            code: self.code,
            supplier_id: self.supplier_id,
            requested_by: self.requested_by,
            priority,
            state,
            closed_reason: self.closed_reason,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Database row for an order item
#[derive(Debug, FromRow)]
struct ItemRow {
    id: Uuid,
    order_id: Uuid,
    product_id: Uuid,
    quantity_requested: i32,
    quantity_received: i32,
}

impl From<ItemRow> for ReplenishmentItem {
    fn from(row: ItemRow) -> Self {
        ReplenishmentItem {
            id: row.id,
            order_id: row.order_id,
            product_id: row.product_id,
            quantity_requested: row.quantity_requested,
            quantity_received: row.quantity_received,
        }
    }
}

const ORDER_COLUMNS: &str = "id, code, supplier_id, requested_by, priority, state, \
     closed_reason, created_at, updated_at";

const ITEM_COLUMNS: &str = "id, order_id, product_id, quantity_requested, quantity_received";

impl ReplenishmentService {
    /// Create a new ReplenishmentService instance
    pub fn new(db: PgPool, config: Arc<Config>) -> Self {
        Self {
            db,
            config,
            clock: Clock::System,
        }
    }

    /// Same service with a pinned clock, for deterministic codes.
    pub fn with_clock(db: PgPool, config: Arc<Config>, clock: Clock) -> Self {
        Self { db, config, clock }
    }

    fn ledger(&self) -> StockLedgerService {
        StockLedgerService::new(self.db.clone(), self.config.clone())
    }

    /// Create a pending order against an active supplier.
    pub async fn create(
        &self,
        user_id: Uuid,
        input: CreateReplenishmentInput,
    ) -> AppResult<ReplenishmentWithItems> {
        if input.lines.is_empty() {
            return Err(AppError::Validation {
                field: "lines".to_string(),
                message: "A replenishment order needs at least one line".to_string(),
            });
        }
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

        let is_active = sqlx::query_scalar::<_, bool>(
            "SELECT is_active FROM suppliers WHERE id = $1",
        )
        .bind(input.supplier_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Supplier {}", input.supplier_id)))?;
        if !is_active {
            return Err(AppError::Validation {
                field: "supplier_id".to_string(),
                message: format!("Supplier {} is inactive", input.supplier_id),
            });
        }

        for line in &input.lines {
            let exists = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)",
            )
            .bind(line.product_id)
            .fetch_one(&self.db)
            .await?;
            if !exists {
                return Err(AppError::NotFound(format!("Product {}", line.product_id)));
            }
        }

        let mut attempt = 0;
        loop {
            let mut tx = self.db.begin().await?;
            match self.create_in_tx(&mut tx, user_id, &input, attempt).await {
                Ok(result) => {
                    tx.commit().await?;
                    debug!(code = %result.order.code, "Created replenishment order");
                    return Ok(result);
                }
                Err(err) if err.is_unique_violation() && attempt < MAX_CODE_RETRIES => {
                    tx.rollback().await.ok();
                    attempt += 1;
                }
                Err(err) if err.is_unique_violation() => {
                    return Err(AppError::DuplicateEntry("replenishment code".to_string()));
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn create_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
        input: &CreateReplenishmentInput,
        attempt: u32,
    ) -> AppResult<ReplenishmentWithItems> {
        // Count and date component share one clock reading, so a pinned
        // clock cannot drift out of the day its codes are counted in.
        let now = self.clock.now();
        let today: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM replenishment_orders WHERE created_at >= date_trunc('day', $1::timestamptz)",
        )
        .bind(now)
        .fetch_one(&mut **tx)
        .await?;
        let code = format!(
            "RO-{}-{:04}",
            now.format("%Y%m%d"),
            today + 1 + attempt as i64
        );
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            INSERT INTO replenishment_orders (id, code, supplier_id, requested_by, priority, state, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, 'pending', $6, $6)
            RETURNING {ORDER_COLUMNS}
            "#,
        ))
        .bind(Uuid::new_v4())
        .bind(&code)
        .bind(input.supplier_id)
        .bind(user_id)
        .bind(input.priority.as_str())
        .bind(now)
        .fetch_one(&mut **tx)
        .await?;

        let mut items = Vec::with_capacity(input.lines.len());
        for line in &input.lines {
            let item = sqlx::query_as::<_, ItemRow>(&format!(
                r#"
                INSERT INTO replenishment_order_items (id, order_id, product_id, quantity_requested, quantity_received)
                VALUES ($1, $2, $3, $4, 0)
                RETURNING {ITEM_COLUMNS}
                "#,
            ))
            .bind(Uuid::new_v4())
            .bind(row.id)
            .bind(line.product_id)
            .bind(line.quantity)
            .fetch_one(&mut **tx)
            .await?;
            items.push(item.into());
        }

        Ok(ReplenishmentWithItems {
            order: row.into_order()?,
            items,
        })
    }

    /// Approve a pending order.
    pub async fn approve(&self, order_id: Uuid, _user_id: Uuid) -> AppResult<ReplenishmentWithItems> {
        self.transition(order_id, ReplenishmentState::Approved, None)
            .await
    }

    /// Mark an approved order as placed with the supplier.
    pub async fn mark_ordered(
        &self,
        order_id: Uuid,
        _user_id: Uuid,
    ) -> AppResult<ReplenishmentWithItems> {
        self.transition(order_id, ReplenishmentState::Ordered, None)
            .await
    }

    /// Cancel a non-terminal order.
    pub async fn cancel(&self, order_id: Uuid, _user_id: Uuid) -> AppResult<ReplenishmentWithItems> {
        self.transition(order_id, ReplenishmentState::Cancelled, None)
            .await
    }

    /// Record a supplier delivery: credit each received line through
    /// the ledger, cap every line at its outstanding quantity, and let
    /// the order complete on its own when everything has arrived.
    pub async fn receive(
        &self,
        order_id: Uuid,
        user_id: Uuid,
        input: ReceiveInput,
    ) -> AppResult<ReplenishmentWithItems> {
        if input.lines.is_empty() {
            return Err(AppError::Validation {
                field: "lines".to_string(),
                message: "A receipt needs at least one line".to_string(),
            });
        }
        let product_ids: Vec<Uuid> = input.lines.iter().map(|l| l.product_id).collect();
        validate_unique_products(&product_ids).map_err(|msg| AppError::Validation {
            field: "lines".to_string(),
            message: msg.to_string(),
        })?;

        let mut tx = self.db.begin().await?;

        let row = self.lock_order(&mut tx, order_id).await?;
        let state = ReplenishmentState::from_str(&row.state)
            .ok_or_else(|| anyhow::anyhow!("unknown replenishment state: {}", row.state))?;
        if !state.accepts_receipts() {
            return Err(AppError::IllegalTransition {
                entity: "Replenishment order".to_string(),
                id: order_id,
                from: state.as_str().to_string(),
                attempted: ReplenishmentState::PartiallyReceived.as_str().to_string(),
            });
        }

        let mut items = self.items_in_tx(&mut tx, order_id).await?;
        let ledger = self.ledger();
        let note = format!("replenishment:{}", row.code);

        let mut levels = Vec::with_capacity(input.lines.len());
        for line in &input.lines {
            let item = items
                .iter_mut()
                .find(|item| item.product_id == line.product_id)
                .ok_or_else(|| AppError::Validation {
                    field: "product_id".to_string(),
                    message: format!(
                        "Product {} is not part of order {}",
                        line.product_id, row.code
                    ),
                })?;

            let outstanding = item.outstanding();
            if line.quantity <= 0 || line.quantity > outstanding {
                return Err(AppError::InvalidQuantity {
                    entity: format!("product {}", line.product_id),
                    requested: line.quantity,
                    limit: outstanding,
                });
            }

            item.quantity_received += line.quantity;
            sqlx::query(
                "UPDATE replenishment_order_items SET quantity_received = $2 WHERE id = $1",
            )
            .bind(item.id)
            .bind(item.quantity_received)
            .execute(&mut *tx)
            .await?;

            let (movement, level) = ledger
                .apply_in_tx(
                    &mut tx,
                    line.product_id,
                    MovementKind::Inbound,
                    MovementChange::Delta(line.quantity),
                    user_id,
                    Some(&note),
                )
                .await?;
            levels.push((line.product_id, movement.quantity_after, level.min_stock));
        }

        let next_state = if is_fully_received(&items) {
            ReplenishmentState::Completed
        } else {
            ReplenishmentState::PartiallyReceived
        };
        if !state.can_transition(next_state) {
            return Err(AppError::IllegalTransition {
                entity: "Replenishment order".to_string(),
                id: order_id,
                from: state.as_str().to_string(),
                attempted: next_state.as_str().to_string(),
            });
        }

        let updated = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            UPDATE replenishment_orders
            SET state = $2, updated_at = $3
            WHERE id = $1
            RETURNING {ORDER_COLUMNS}
            "#,
        ))
        .bind(order_id)
        .bind(next_state.as_str())
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

        debug!(code = %updated.code, state = %updated.state, "Recorded supplier delivery");
        Ok(ReplenishmentWithItems {
            order: updated.into_order()?,
            items,
        })
    }

    /// Close a short-delivered order early. Only a partially received
    /// order can be closed this way, and the reason is recorded.
    pub async fn close(
        &self,
        order_id: Uuid,
        _user_id: Uuid,
        input: CloseReplenishmentInput,
    ) -> AppResult<ReplenishmentWithItems> {
        validate_note(&input.reason, MAX_REASON_LEN).map_err(|msg| AppError::Validation {
            field: "reason".to_string(),
            message: msg.to_string(),
        })?;
        let reason = input.reason.trim();

        let mut tx = self.db.begin().await?;

        let row = self.lock_order(&mut tx, order_id).await?;
        let state = ReplenishmentState::from_str(&row.state)
            .ok_or_else(|| anyhow::anyhow!("unknown replenishment state: {}", row.state))?;
        if state != ReplenishmentState::PartiallyReceived {
            return Err(AppError::IllegalTransition {
                entity: "Replenishment order".to_string(),
                id: order_id,
                from: state.as_str().to_string(),
                attempted: ReplenishmentState::Completed.as_str().to_string(),
            });
        }

        let updated = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            UPDATE replenishment_orders
            SET state = 'completed', closed_reason = $2, updated_at = $3
            WHERE id = $1
            RETURNING {ORDER_COLUMNS}
            "#,
        ))
        .bind(order_id)
        .bind(reason)
        .bind(self.clock.now())
        .fetch_one(&mut *tx)
        .await?;

        let items = self.items_in_tx(&mut tx, order_id).await?;
        tx.commit().await?;

        debug!(code = %updated.code, "Closed short-delivered order");
        Ok(ReplenishmentWithItems {
            order: updated.into_order()?,
            items,
        })
    }

    /// Get an order with its items.
    pub async fn get(&self, order_id: Uuid) -> AppResult<ReplenishmentWithItems> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM replenishment_orders WHERE id = $1",
        ))
        .bind(order_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Replenishment order {}", order_id)))?;

        let items = self.items(order_id).await?;
        Ok(ReplenishmentWithItems {
            order: row.into_order()?,
            items,
        })
    }

    /// Paged order search by supplier/state/priority/date range.
    pub async fn search(
        &self,
        filter: ReplenishmentFilter,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<ReplenishmentOrder>> {
        let state = filter.state.map(|s| s.as_str().to_string());
        let priority = filter.priority.map(|p| p.as_str().to_string());

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM replenishment_orders
            WHERE ($1::uuid IS NULL OR supplier_id = $1)
              AND ($2::varchar IS NULL OR state = $2)
              AND ($3::varchar IS NULL OR priority = $3)
              AND ($4::timestamptz IS NULL OR created_at >= $4)
              AND ($5::timestamptz IS NULL OR created_at <= $5)
            "#,
        )
        .bind(filter.supplier_id)
        .bind(&state)
        .bind(&priority)
        .bind(filter.from)
        .bind(filter.to)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            SELECT {ORDER_COLUMNS}
            FROM replenishment_orders
            WHERE ($1::uuid IS NULL OR supplier_id = $1)
              AND ($2::varchar IS NULL OR state = $2)
              AND ($3::varchar IS NULL OR priority = $3)
              AND ($4::timestamptz IS NULL OR created_at >= $4)
              AND ($5::timestamptz IS NULL OR created_at <= $5)
            ORDER BY created_at DESC
            LIMIT $6 OFFSET $7
            "#,
        ))
        .bind(filter.supplier_id)
        .bind(&state)
        .bind(&priority)
        .bind(filter.from)
        .bind(filter.to)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let data = rows
            .into_iter()
            .map(OrderRow::into_order)
            .collect::<AppResult<Vec<_>>>()?;

        Ok(PaginatedResponse {
            pagination: PaginationMeta::new(&pagination, total),
            data,
        })
    }

    /// Orders still waiting on supplier goods, oldest first.
    pub async fn pending_receipt(&self) -> AppResult<Vec<ReplenishmentOrder>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            SELECT {ORDER_COLUMNS}
            FROM replenishment_orders
            WHERE state IN ('ordered', 'partially_received')
            ORDER BY created_at ASC
            "#,
        ))
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(OrderRow::into_order).collect()
    }

    /// Open high/urgent-priority orders, most urgent first.
    pub async fn urgent(&self) -> AppResult<Vec<ReplenishmentOrder>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            SELECT {ORDER_COLUMNS}
            FROM replenishment_orders
            WHERE priority IN ('high', 'urgent')
              AND state NOT IN ('completed', 'cancelled')
            ORDER BY CASE priority WHEN 'urgent' THEN 2 ELSE 1 END DESC, created_at ASC
            "#,
        ))
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(OrderRow::into_order).collect()
    }

    /// Shared path for the plain state transitions.
    async fn transition(
        &self,
        order_id: Uuid,
        target: ReplenishmentState,
        closed_reason: Option<&str>,
    ) -> AppResult<ReplenishmentWithItems> {
        let mut tx = self.db.begin().await?;

        let row = self.lock_order(&mut tx, order_id).await?;
        let state = ReplenishmentState::from_str(&row.state)
            .ok_or_else(|| anyhow::anyhow!("unknown replenishment state: {}", row.state))?;
        if !state.can_transition(target) {
            return Err(AppError::IllegalTransition {
                entity: "Replenishment order".to_string(),
                id: order_id,
                from: state.as_str().to_string(),
                attempted: target.as_str().to_string(),
            });
        }

        let updated = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            UPDATE replenishment_orders
            SET state = $2, closed_reason = COALESCE($3, closed_reason), updated_at = $4
            WHERE id = $1
            RETURNING {ORDER_COLUMNS}
            "#,
        ))
        .bind(order_id)
        .bind(target.as_str())
        .bind(closed_reason)
        .bind(self.clock.now())
        .fetch_one(&mut *tx)
        .await?;

        let items = self.items_in_tx(&mut tx, order_id).await?;
        tx.commit().await?;

        debug!(code = %updated.code, state = %updated.state, "Replenishment transition");
        Ok(ReplenishmentWithItems {
            order: updated.into_order()?,
            items,
        })
    }

    async fn lock_order(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order_id: Uuid,
    ) -> AppResult<OrderRow> {
        sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM replenishment_orders WHERE id = $1 FOR UPDATE",
        ))
        .bind(order_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Replenishment order {}", order_id)))
    }

    async fn items(&self, order_id: Uuid) -> AppResult<Vec<ReplenishmentItem>> {
        let rows = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM replenishment_order_items WHERE order_id = $1 ORDER BY id",
        ))
        .bind(order_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(ReplenishmentItem::from).collect())
    }

    async fn items_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order_id: Uuid,
    ) -> AppResult<Vec<ReplenishmentItem>> {
        let rows = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM replenishment_order_items WHERE order_id = $1 ORDER BY id",
        ))
        .bind(order_id)
        .fetch_all(&mut **tx)
        .await?;

        Ok(rows.into_iter().map(ReplenishmentItem::from).collect())
    }
}
