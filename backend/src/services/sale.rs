//! Sale transaction manager
//!
//! Registers point-of-sale transactions (debiting stock through the
//! ledger, one transaction per sale so multi-line carts are
//! all-or-nothing) and handles time-boxed voiding, which credits the
//! stock back. The only legal lifecycle is `paid -> voided`.

use chrono::{DateTime, Duration, Utc};
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
    compute_totals, line_subtotal, validate_note, validate_quantity, validate_unique_products,
    within_void_window, Clock, MovementKind, PaginatedResponse, Pagination, PaginationMeta, Sale,
    SaleItem, SaleState,
};

/// Upper bound for free-text void reasons.
const MAX_REASON_LEN: usize = 500;

/// Retries for sale-code collisions and row-lock conflicts.
const MAX_REGISTER_RETRIES: u32 = 3;

/// Sale transaction manager
#[derive(Clone)]
pub struct SaleService {
    db: PgPool,
    config: Arc<Config>,
    clock: Clock,
}

/// One requested sale line
#[derive(Debug, Deserialize)]
pub struct SaleLineInput {
    pub product_id: Uuid,
    pub quantity: i32,
}

/// Input for registering a sale
#[derive(Debug, Deserialize)]
pub struct RegisterSaleInput {
    pub client_id: Uuid,
    pub payment_method_id: Uuid,
    pub lines: Vec<SaleLineInput>,
}

/// Input for voiding a sale
#[derive(Debug, Deserialize)]
pub struct VoidSaleInput {
    pub reason: String,
}

/// Search filters for sales
#[derive(Debug, Default, Deserialize)]
pub struct SaleFilter {
    pub code: Option<String>,
    pub client_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub state: Option<SaleState>,
    pub payment_method_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// A sale with its line items
#[derive(Debug, Clone, Serialize)]
pub struct SaleWithItems {
    #[serde(flatten)]
    pub sale: Sale,
    pub items: Vec<SaleItem>,
}

/// Whether a sale may currently be voided (pure check, no side effects)
#[derive(Debug, Clone, Serialize)]
pub struct CanVoidResponse {
    pub can_void: bool,
    pub deadline: DateTime<Utc>,
}

/// Aggregate totals for a period
#[derive(Debug, Clone, Serialize)]
pub struct SalesSummary {
    pub count: i64,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

/// Database row for a sale
#[derive(Debug, FromRow)]
struct SaleRow {
    id: Uuid,
    code: String,
    client_id: Uuid,
    user_id: Uuid,
    payment_method_id: Uuid,
    state: String,
    subtotal: Decimal,
    tax: Decimal,
    total: Decimal,
    void_reason: Option<String>,
    voided_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl SaleRow {
    fn into_sale(self) -> AppResult<Sale> {
        let state = SaleState::from_str(&self.state)
            .ok_or_else(|| anyhow::anyhow!("unknown sale state: {}", self.state))?;
        Ok(Sale {
            id: self.id,
            code: self.code,
            client_id: self.client_id,
            user_id: self.user_id,
            payment_method_id: self.payment_method_id,
            state,
            subtotal: self.subtotal,
            tax: self.tax,
            total: self.total,
            void_reason: self.void_reason,
            voided_at: self.voided_at,
            created_at: self.created_at,
        })
    }
}

/// Database row for a sale item
#[derive(Debug, FromRow)]
struct SaleItemRow {
    id: Uuid,
    sale_id: Uuid,
    product_id: Uuid,
    quantity: i32,
    unit_price: Decimal,
    subtotal: Decimal,
}

impl From<SaleItemRow> for SaleItem {
    fn from(row: SaleItemRow) -> Self {
        SaleItem {
            id: row.id,
            sale_id: row.sale_id,
            product_id: row.product_id,
            quantity: row.quantity,
            unit_price: row.unit_price,
            subtotal: row.subtotal,
        }
    }
}

const SALE_COLUMNS: &str = "id, code, client_id, user_id, payment_method_id, state, \
     subtotal, tax, total, void_reason, voided_at, created_at";

impl SaleService {
    /// Create a new SaleService instance
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

    /// Register a sale: validate the cart, debit every line through the
    /// ledger, and persist the sale with deterministic totals — all in
    /// one database transaction, so a failing line rolls back every
    /// debit before it.
    pub async fn register_sale(
        &self,
        user_id: Uuid,
        input: RegisterSaleInput,
    ) -> AppResult<SaleWithItems> {
        if input.lines.is_empty() {
            return Err(AppError::Validation {
                field: "lines".to_string(),
                message: "A sale needs at least one line".to_string(),
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

        self.check_reference("clients", "Client", input.client_id)
            .await?;
        self.check_reference("payment_methods", "Payment method", input.payment_method_id)
            .await?;

        let mut attempt = 0;
        loop {
            let mut tx = self.db.begin().await?;
            match self
                .register_in_tx(&mut tx, user_id, &input, attempt)
                .await
            {
                Ok((sale, items, levels)) => {
                    tx.commit().await?;
                    let ledger = self.ledger();
                    for (product_id, quantity_after, min_stock) in levels {
                        ledger
                            .evaluate_alerts(product_id, quantity_after, min_stock)
                            .await;
                    }
                    debug!(code = %sale.code, total = %sale.total, "Registered sale");
                    return Ok(SaleWithItems { sale, items });
                }
                Err(err)
                    if (err.is_unique_violation() || err.is_lock_conflict())
                        && attempt < MAX_REGISTER_RETRIES =>
                {
                    tx.rollback().await.ok();
                    attempt += 1;
                }
                Err(err) if err.is_unique_violation() => {
                    return Err(AppError::DuplicateEntry("sale code".to_string()));
                }
                Err(err) if err.is_lock_conflict() => {
                    return Err(AppError::ConcurrencyConflict {
                        entity: "sale registration".to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn register_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
        input: &RegisterSaleInput,
        attempt: u32,
    ) -> AppResult<(Sale, Vec<SaleItem>, Vec<(Uuid, i32, i32)>)> {
        let code = self.next_sale_code(tx, attempt).await?;
        let ledger = self.ledger();
        let note = format!("sale:{}", code);

        // Debit each line through the ledger; the row lock taken there
        // is also how two concurrent sales of the last unit serialize.
        let mut priced_lines: Vec<(i32, Decimal)> = Vec::with_capacity(input.lines.len());
        let mut levels: Vec<(Uuid, i32, i32)> = Vec::with_capacity(input.lines.len());
        for line in &input.lines {
            let (movement, level) = ledger
                .apply_in_tx(
                    tx,
                    line.product_id,
                    MovementKind::Outbound,
                    MovementChange::Delta(-line.quantity),
                    user_id,
                    Some(&note),
                )
                .await?;
            if !level.is_active {
                return Err(AppError::Validation {
                    field: "product_id".to_string(),
                    message: format!("Product {} is inactive and cannot be sold", line.product_id),
                });
            }
            priced_lines.push((line.quantity, level.unit_price));
            levels.push((line.product_id, movement.quantity_after, level.min_stock));
        }

        let totals = compute_totals(&priced_lines, self.config.sales.tax_rate);

        let sale_row = sqlx::query_as::<_, SaleRow>(&format!(
            r#"
            INSERT INTO sales (id, code, client_id, user_id, payment_method_id, state, subtotal, tax, total, created_at)
            VALUES ($1, $2, $3, $4, $5, 'paid', $6, $7, $8, $9)
            RETURNING {SALE_COLUMNS}
            "#,
        ))
        .bind(Uuid::new_v4())
        .bind(&code)
        .bind(input.client_id)
        .bind(user_id)
        .bind(input.payment_method_id)
        .bind(totals.subtotal)
        .bind(totals.tax)
        .bind(totals.total)
        .bind(self.clock.now())
        .fetch_one(&mut **tx)
        .await?;

        let mut items = Vec::with_capacity(input.lines.len());
        for (line, (quantity, unit_price)) in input.lines.iter().zip(&priced_lines) {
            let item_row = sqlx::query_as::<_, SaleItemRow>(
                r#"
                INSERT INTO sale_items (id, sale_id, product_id, quantity, unit_price, subtotal)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING id, sale_id, product_id, quantity, unit_price, subtotal
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(sale_row.id)
            .bind(line.product_id)
            .bind(quantity)
            .bind(unit_price)
            .bind(line_subtotal(*quantity, *unit_price))
            .fetch_one(&mut **tx)
            .await?;
            items.push(item_row.into());
        }

        Ok((sale_row.into_sale()?, items, levels))
    }

    /// Void a sale within the configured window, crediting every line
    /// back through the ledger in the same transaction.
    pub async fn void_sale(
        &self,
        sale_id: Uuid,
        user_id: Uuid,
        input: VoidSaleInput,
    ) -> AppResult<SaleWithItems> {
        validate_note(&input.reason, MAX_REASON_LEN).map_err(|msg| AppError::Validation {
            field: "reason".to_string(),
            message: msg.to_string(),
        })?;
        let reason = input.reason.trim();

        let mut tx = self.db.begin().await?;

        let sale_row = sqlx::query_as::<_, SaleRow>(&format!(
            "SELECT {SALE_COLUMNS} FROM sales WHERE id = $1 FOR UPDATE",
        ))
        .bind(sale_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Sale {}", sale_id)))?;

        let state = SaleState::from_str(&sale_row.state)
            .ok_or_else(|| anyhow::anyhow!("unknown sale state: {}", sale_row.state))?;
        if !state.can_transition(SaleState::Voided) {
            return Err(AppError::IllegalTransition {
                entity: "Sale".to_string(),
                id: sale_id,
                from: state.as_str().to_string(),
                attempted: SaleState::Voided.as_str().to_string(),
            });
        }

        let window_hours = self.config.sales.void_window_hours;
        let now = self.clock.now();
        if !within_void_window(sale_row.created_at, now, window_hours) {
            return Err(AppError::OutOfWindow {
                rule: "sale void window".to_string(),
                deadline: sale_row.created_at + Duration::hours(window_hours),
            });
        }

        let voided_row = sqlx::query_as::<_, SaleRow>(&format!(
            r#"
            UPDATE sales
            SET state = 'voided', void_reason = $2, voided_at = $3
            WHERE id = $1
            RETURNING {SALE_COLUMNS}
            "#,
        ))
        .bind(sale_id)
        .bind(reason)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let items = self.items_in_tx(&mut tx, sale_id).await?;

        // Restore stock for every line in the same transaction.
        let ledger = self.ledger();
        let note = format!("void:{}: {}", voided_row.code, reason);
        let mut levels = Vec::with_capacity(items.len());
        for item in &items {
            let (movement, level) = ledger
                .apply_in_tx(
                    &mut tx,
                    item.product_id,
                    MovementKind::Inbound,
                    MovementChange::Delta(item.quantity),
                    user_id,
                    Some(&note),
                )
                .await?;
            levels.push((item.product_id, movement.quantity_after, level.min_stock));
        }

        tx.commit().await?;

        let ledger = self.ledger();
        for (product_id, quantity_after, min_stock) in levels {
            ledger
                .evaluate_alerts(product_id, quantity_after, min_stock)
                .await;
        }

        debug!(code = %voided_row.code, "Voided sale");
        Ok(SaleWithItems {
            sale: voided_row.into_sale()?,
            items,
        })
    }

    /// Pure predicate mirroring the void checks; no side effects.
    pub async fn can_void(&self, sale_id: Uuid) -> AppResult<CanVoidResponse> {
        let row = sqlx::query_as::<_, (String, DateTime<Utc>)>(
            "SELECT state, created_at FROM sales WHERE id = $1",
        )
        .bind(sale_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Sale {}", sale_id)))?;

        let window_hours = self.config.sales.void_window_hours;
        let state = SaleState::from_str(&row.0)
            .ok_or_else(|| anyhow::anyhow!("unknown sale state: {}", row.0))?;
        let can_void = state.can_transition(SaleState::Voided)
            && within_void_window(row.1, self.clock.now(), window_hours);

        Ok(CanVoidResponse {
            can_void,
            deadline: row.1 + Duration::hours(window_hours),
        })
    }

    /// Get a sale with its items by ID.
    pub async fn get_sale(&self, sale_id: Uuid) -> AppResult<SaleWithItems> {
        let row = sqlx::query_as::<_, SaleRow>(&format!(
            "SELECT {SALE_COLUMNS} FROM sales WHERE id = $1",
        ))
        .bind(sale_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Sale {}", sale_id)))?;

        let items = self.items(sale_id).await?;
        Ok(SaleWithItems {
            sale: row.into_sale()?,
            items,
        })
    }

    /// Get a sale with its items by its human-readable code.
    pub async fn get_by_code(&self, code: &str) -> AppResult<SaleWithItems> {
        let row = sqlx::query_as::<_, SaleRow>(&format!(
            "SELECT {SALE_COLUMNS} FROM sales WHERE code = $1",
        ))
        .bind(code)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Sale {}", code)))?;

        let sale = row.into_sale()?;
        let items = self.items(sale.id).await?;
        Ok(SaleWithItems { sale, items })
    }

    /// Paged sale search by code/client/user/state/method/date range.
    pub async fn search(
        &self,
        filter: SaleFilter,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<Sale>> {
        let state = filter.state.map(|s| s.as_str().to_string());

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM sales
            WHERE ($1::varchar IS NULL OR code = $1)
              AND ($2::uuid IS NULL OR client_id = $2)
              AND ($3::uuid IS NULL OR user_id = $3)
              AND ($4::varchar IS NULL OR state = $4)
              AND ($5::uuid IS NULL OR payment_method_id = $5)
              AND ($6::timestamptz IS NULL OR created_at >= $6)
              AND ($7::timestamptz IS NULL OR created_at <= $7)
            "#,
        )
        .bind(&filter.code)
        .bind(filter.client_id)
        .bind(filter.user_id)
        .bind(&state)
        .bind(filter.payment_method_id)
        .bind(filter.from)
        .bind(filter.to)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, SaleRow>(&format!(
            r#"
            SELECT {SALE_COLUMNS}
            FROM sales
            WHERE ($1::varchar IS NULL OR code = $1)
              AND ($2::uuid IS NULL OR client_id = $2)
              AND ($3::uuid IS NULL OR user_id = $3)
              AND ($4::varchar IS NULL OR state = $4)
              AND ($5::uuid IS NULL OR payment_method_id = $5)
              AND ($6::timestamptz IS NULL OR created_at >= $6)
              AND ($7::timestamptz IS NULL OR created_at <= $7)
            ORDER BY created_at DESC
            LIMIT $8 OFFSET $9
            "#,
        ))
        .bind(&filter.code)
        .bind(filter.client_id)
        .bind(filter.user_id)
        .bind(&state)
        .bind(filter.payment_method_id)
        .bind(filter.from)
        .bind(filter.to)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        let data = rows
            .into_iter()
            .map(SaleRow::into_sale)
            .collect::<AppResult<Vec<_>>>()?;

        Ok(PaginatedResponse {
            pagination: PaginationMeta::new(&pagination, total),
            data,
        })
    }

    /// Count and revenue totals for paid sales in a period.
    pub async fn summary(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> AppResult<SalesSummary> {
        let row = sqlx::query_as::<_, (i64, Decimal, Decimal, Decimal)>(
            r#"
            SELECT COUNT(*),
                   COALESCE(SUM(subtotal), 0),
                   COALESCE(SUM(tax), 0),
                   COALESCE(SUM(total), 0)
            FROM sales
            WHERE state = 'paid'
              AND ($1::timestamptz IS NULL OR created_at >= $1)
              AND ($2::timestamptz IS NULL OR created_at <= $2)
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_one(&self.db)
        .await?;

        Ok(SalesSummary {
            count: row.0,
            subtotal: row.1,
            tax: row.2,
            total: row.3,
        })
    }

    async fn items(&self, sale_id: Uuid) -> AppResult<Vec<SaleItem>> {
        let rows = sqlx::query_as::<_, SaleItemRow>(
            r#"
            SELECT id, sale_id, product_id, quantity, unit_price, subtotal
            FROM sale_items
            WHERE sale_id = $1
            ORDER BY id
            "#,
        )
        .bind(sale_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(SaleItem::from).collect())
    }

    async fn items_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        sale_id: Uuid,
    ) -> AppResult<Vec<SaleItem>> {
        let rows = sqlx::query_as::<_, SaleItemRow>(
            r#"
            SELECT id, sale_id, product_id, quantity, unit_price, subtotal
            FROM sale_items
            WHERE sale_id = $1
            ORDER BY id
            "#,
        )
        .bind(sale_id)
        .fetch_all(&mut **tx)
        .await?;

        Ok(rows.into_iter().map(SaleItem::from).collect())
    }

    /// Next human-readable sale code: `{prefix}-{YYYYMMDD}-{NNNN}`.
    /// Collisions are caught by the unique index and retried with a
    /// bumped sequence.
    async fn next_sale_code(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        attempt: u32,
    ) -> AppResult<String> {
        // The count window and the date component must come from the
        // same clock, or a pinned clock would collide with live rows.
        let now = self.clock.now();
        let today: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sales WHERE created_at >= date_trunc('day', $1::timestamptz)",
        )
        .bind(now)
        .fetch_one(&mut **tx)
        .await?;

        let seq = today + 1 + attempt as i64;
        Ok(format!(
            "{}-{}-{:04}",
            self.config.sales.code_prefix,
            now.format("%Y%m%d"),
            seq
        ))
    }

    /// Ensure a referenced master-data row exists and is active.
    async fn check_reference(&self, table: &str, entity: &str, id: Uuid) -> AppResult<()> {
        let is_active = sqlx::query_scalar::<_, bool>(&format!(
            "SELECT is_active FROM {} WHERE id = $1",
            table
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{} {}", entity, id)))?;

        if !is_active {
            return Err(AppError::Validation {
                field: entity.to_lowercase().replace(' ', "_"),
                message: format!("{} {} is inactive", entity, id),
            });
        }
        Ok(())
    }
}
