//! Stock ledger service
//!
//! The ledger owns the authoritative on-hand quantity per product and
//! records every change as an immutable movement entry. `apply_in_tx`
//! is the single choke point through which sales, returns, and
//! replenishment receipts mutate stock: it locks the product row,
//! validates the delta, writes the new quantity, and appends the
//! movement in one atomic unit.

use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::services::alert::StockAlertService;
use shared::{
    check_movement, validate_quantity, MovementCheck, MovementKind, PaginatedResponse, Pagination,
    PaginationMeta, StockMovement,
};

/// Bounded retries for deadlock/serialization failures before the
/// conflict is surfaced to the caller.
const MAX_LOCK_RETRIES: u32 = 3;

/// Stock ledger service
#[derive(Clone)]
pub struct StockLedgerService {
    db: PgPool,
    config: Arc<Config>,
}

/// How a movement changes the quantity: a signed delta, or an explicit
/// target for administrator stock-take adjustments. The ledger turns a
/// target into the equivalent delta so the invariant check is uniform.
#[derive(Debug, Clone, Copy)]
pub enum MovementChange {
    Delta(i32),
    SetTo(i32),
}

/// Input for recording a manual movement through the HTTP surface
#[derive(Debug, Deserialize)]
pub struct RecordMovementInput {
    pub product_id: Uuid,
    pub kind: MovementKind,
    /// Positive magnitude for inbound/outbound/return-credit movements
    pub quantity: Option<i32>,
    /// Explicit target quantity, adjustments only
    pub target_quantity: Option<i32>,
    pub note: Option<String>,
}

/// Search filters for the movement audit trail
#[derive(Debug, Default, Deserialize)]
pub struct MovementFilter {
    pub product_id: Option<Uuid>,
    pub kind: Option<MovementKind>,
    pub user_id: Option<Uuid>,
    pub from: Option<chrono::DateTime<chrono::Utc>>,
    pub to: Option<chrono::DateTime<chrono::Utc>>,
}

/// Product fields read under the row lock; shared with the sale
/// manager so one locked read serves both the debit and the price
/// snapshot.
#[derive(Debug, Clone)]
pub(crate) struct ProductLevel {
    pub unit_price: Decimal,
    pub min_stock: i32,
    pub is_active: bool,
}

/// Database row for a ledger entry
#[derive(Debug, sqlx::FromRow)]
struct MovementRow {
    id: Uuid,
    product_id: Uuid,
    kind: String,
    delta: i32,
    quantity_before: i32,
    quantity_after: i32,
    user_id: Uuid,
    note: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl MovementRow {
    fn into_movement(self) -> AppResult<StockMovement> {
        let kind = MovementKind::from_str(&self.kind)
            .ok_or_else(|| anyhow::anyhow!("unknown movement kind in ledger: {}", self.kind))?;
        Ok(StockMovement {
            id: self.id,
            product_id: self.product_id,
            kind,
            delta: self.delta,
            quantity_before: self.quantity_before,
            quantity_after: self.quantity_after,
            user_id: self.user_id,
            note: self.note,
            created_at: self.created_at,
        })
    }
}

const MOVEMENT_COLUMNS: &str =
    "id, product_id, kind, delta, quantity_before, quantity_after, user_id, note, created_at";

impl StockLedgerService {
    /// Create a new StockLedgerService instance
    pub fn new(db: PgPool, config: Arc<Config>) -> Self {
        Self { db, config }
    }

    /// Record a manual movement (supplier receipt, stock-take
    /// adjustment) from request input.
    pub async fn record_movement(
        &self,
        user_id: Uuid,
        input: RecordMovementInput,
    ) -> AppResult<StockMovement> {
        let change = match input.kind {
            MovementKind::Adjustment => {
                let target = input.target_quantity.ok_or_else(|| AppError::Validation {
                    field: "target_quantity".to_string(),
                    message: "Adjustments set an explicit target quantity".to_string(),
                })?;
                if target < 0 {
                    return Err(AppError::InvalidQuantity {
                        entity: format!("product {}", input.product_id),
                        requested: target,
                        limit: 0,
                    });
                }
                MovementChange::SetTo(target)
            }
            kind => {
                let quantity = input.quantity.ok_or_else(|| AppError::Validation {
                    field: "quantity".to_string(),
                    message: "Movement quantity is required".to_string(),
                })?;
                validate_quantity(quantity).map_err(|_| AppError::InvalidQuantity {
                    entity: format!("product {}", input.product_id),
                    requested: quantity,
                    limit: 0,
                })?;
                let signed = if kind == MovementKind::Outbound {
                    -quantity
                } else {
                    quantity
                };
                MovementChange::Delta(signed)
            }
        };

        self.apply_movement(
            input.product_id,
            input.kind,
            change,
            user_id,
            input.note.as_deref(),
        )
        .await
    }

    /// Apply a movement in its own transaction.
    ///
    /// Lock conflicts are retried a bounded number of times; once
    /// retries are exhausted the caller sees `ConcurrencyConflict`.
    /// After a successful commit the alerting engine is invoked with
    /// the post-movement level; an alerting failure is logged and never
    /// rolls back the stock change.
    pub async fn apply_movement(
        &self,
        product_id: Uuid,
        kind: MovementKind,
        change: MovementChange,
        user_id: Uuid,
        note: Option<&str>,
    ) -> AppResult<StockMovement> {
        let mut attempt = 0;
        loop {
            let mut tx = self.db.begin().await?;
            match self
                .apply_in_tx(&mut tx, product_id, kind, change, user_id, note)
                .await
            {
                Ok((movement, level)) => {
                    tx.commit().await?;
                    self.evaluate_alerts(product_id, movement.quantity_after, level.min_stock)
                        .await;
                    return Ok(movement);
                }
                Err(err) if err.is_lock_conflict() => {
                    tx.rollback().await.ok();
                    attempt += 1;
                    if attempt > MAX_LOCK_RETRIES {
                        return Err(AppError::ConcurrencyConflict {
                            entity: format!("product {}", product_id),
                        });
                    }
                    debug!(product_id = %product_id, attempt, "Retrying movement after lock conflict");
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Apply a movement inside a caller-owned transaction.
    ///
    /// Used directly by the sale manager and the workflows so that
    /// multi-line operations commit or roll back as one unit. Reads the
    /// product under `FOR UPDATE`, so concurrent movements on the same
    /// product serialize here.
    pub(crate) async fn apply_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        product_id: Uuid,
        kind: MovementKind,
        change: MovementChange,
        user_id: Uuid,
        note: Option<&str>,
    ) -> AppResult<(StockMovement, ProductLevel)> {
        let row = sqlx::query_as::<_, (i32, i32, Decimal, bool)>(
            "SELECT quantity, min_stock, unit_price, is_active FROM products WHERE id = $1 FOR UPDATE",
        )
        .bind(product_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Product {}", product_id)))?;

        let (quantity_before, min_stock, unit_price, is_active) = row;

        let delta = match change {
            MovementChange::Delta(delta) => delta,
            MovementChange::SetTo(target) => target - quantity_before,
        };

        let quantity_after = match check_movement(quantity_before, kind, delta) {
            MovementCheck::Ok { quantity_after } => quantity_after,
            MovementCheck::ZeroDelta => {
                return Err(AppError::InvalidQuantity {
                    entity: format!("product {}", product_id),
                    requested: 0,
                    limit: 0,
                });
            }
            MovementCheck::InsufficientStock {
                available,
                requested,
            } => {
                return Err(AppError::InsufficientStock {
                    product_id,
                    requested,
                    available,
                });
            }
            MovementCheck::NegativeResult { .. } => {
                return Err(AppError::InvalidQuantity {
                    entity: format!("product {}", product_id),
                    requested: delta,
                    limit: quantity_before,
                });
            }
            MovementCheck::Overflow => {
                return Err(AppError::InvalidQuantity {
                    entity: format!("product {}", product_id),
                    requested: delta,
                    limit: i32::MAX - quantity_before,
                });
            }
        };

        sqlx::query("UPDATE products SET quantity = $2, updated_at = NOW() WHERE id = $1")
            .bind(product_id)
            .bind(quantity_after)
            .execute(&mut **tx)
            .await?;

        let row = sqlx::query_as::<_, MovementRow>(&format!(
            r#"
            INSERT INTO stock_movements (id, product_id, kind, delta, quantity_before, quantity_after, user_id, note)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {MOVEMENT_COLUMNS}
            "#,
        ))
        .bind(Uuid::new_v4())
        .bind(product_id)
        .bind(kind.as_str())
        .bind(delta)
        .bind(quantity_before)
        .bind(quantity_after)
        .bind(user_id)
        .bind(note)
        .fetch_one(&mut **tx)
        .await?;

        debug!(
            product_id = %product_id,
            kind = kind.as_str(),
            delta,
            quantity_after,
            "Recorded stock movement"
        );

        Ok((
            row.into_movement()?,
            ProductLevel {
                unit_price,
                min_stock,
                is_active,
            },
        ))
    }

    /// Invoke the alerting engine for a post-movement level. Side
    /// effect only: failures are logged, never propagated.
    pub(crate) async fn evaluate_alerts(&self, product_id: Uuid, quantity: i32, min_stock: i32) {
        let alerts = StockAlertService::new(self.db.clone(), self.config.clone());
        if let Err(err) = alerts.evaluate(product_id, quantity, min_stock).await {
            warn!(product_id = %product_id, error = %err, "Stock alert evaluation failed");
        }
    }

    /// Full audit trail for a product, ordered by time ascending.
    pub async fn product_history(&self, product_id: Uuid) -> AppResult<Vec<StockMovement>> {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)")
                .bind(product_id)
                .fetch_one(&self.db)
                .await?;
        if !exists {
            return Err(AppError::NotFound(format!("Product {}", product_id)));
        }

        let rows = sqlx::query_as::<_, MovementRow>(&format!(
            r#"
            SELECT {MOVEMENT_COLUMNS}
            FROM stock_movements
            WHERE product_id = $1
            ORDER BY created_at ASC
            "#,
        ))
        .bind(product_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(MovementRow::into_movement).collect()
    }

    /// Paged movement search filtered by product/kind/actor/date range.
    pub async fn search_movements(
        &self,
        filter: MovementFilter,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<StockMovement>> {
        let kind = filter.kind.map(|k| k.as_str().to_string());

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM stock_movements
            WHERE ($1::uuid IS NULL OR product_id = $1)
              AND ($2::varchar IS NULL OR kind = $2)
              AND ($3::uuid IS NULL OR user_id = $3)
              AND ($4::timestamptz IS NULL OR created_at >= $4)
              AND ($5::timestamptz IS NULL OR created_at <= $5)
            "#,
        )
        .bind(filter.product_id)
        .bind(&kind)
        .bind(filter.user_id)
        .bind(filter.from)
        .bind(filter.to)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, MovementRow>(&format!(
            r#"
            SELECT {MOVEMENT_COLUMNS}
            FROM stock_movements
            WHERE ($1::uuid IS NULL OR product_id = $1)
              AND ($2::varchar IS NULL OR kind = $2)
              AND ($3::uuid IS NULL OR user_id = $3)
              AND ($4::timestamptz IS NULL OR created_at >= $4)
              AND ($5::timestamptz IS NULL OR created_at <= $5)
            ORDER BY created_at DESC
            LIMIT $6 OFFSET $7
            "#,
        ))
        .bind(filter.product_id)
        .bind(&kind)
        .bind(filter.user_id)
        .bind(filter.from)
        .bind(filter.to)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let data = rows
            .into_iter()
            .map(MovementRow::into_movement)
            .collect::<AppResult<Vec<_>>>()?;

        Ok(PaginatedResponse {
            pagination: PaginationMeta::new(&pagination, total),
            data,
        })
    }
}
