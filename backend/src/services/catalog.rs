//! Product read surface
//!
//! Thin catalog queries; stock levels on products are owned by the
//! ledger and never written from here.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use shared::{PaginatedResponse, Pagination, PaginationMeta, Product};

/// Product read service
#[derive(Clone)]
pub struct CatalogService {
    db: PgPool,
}

/// Search filters for the product list
#[derive(Debug, Default, Deserialize)]
pub struct ProductFilter {
    /// Matches against SKU or name, case-insensitive.
    pub q: Option<String>,
    pub is_active: Option<bool>,
    /// Only products at or below their minimum stock level.
    pub below_min: Option<bool>,
}

#[derive(Debug, FromRow)]
struct ProductRow {
    id: Uuid,
    sku: String,
    name: String,
    unit_price: Decimal,
    quantity: i32,
    min_stock: i32,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            sku: row.sku,
            name: row.name,
            unit_price: row.unit_price,
            quantity: row.quantity,
            min_stock: row.min_stock,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const PRODUCT_COLUMNS: &str =
    "id, sku, name, unit_price, quantity, min_stock, is_active, created_at, updated_at";

impl CatalogService {
    /// Create a new CatalogService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Get a product by ID.
    pub async fn get_product(&self, product_id: Uuid) -> AppResult<Product> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1",
        ))
        .bind(product_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Product {}", product_id)))?;

        Ok(row.into())
    }

    /// Paged product list with optional text / active / below-minimum
    /// filters.
    pub async fn list_products(
        &self,
        filter: ProductFilter,
        pagination: Pagination,
    ) -> AppResult<PaginatedResponse<Product>> {
        let pattern = filter.q.as_ref().map(|q| format!("%{}%", q.trim()));

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM products
            WHERE ($1::varchar IS NULL OR sku ILIKE $1 OR name ILIKE $1)
              AND ($2::boolean IS NULL OR is_active = $2)
              AND ($3::boolean IS NOT TRUE OR quantity <= min_stock)
            "#,
        )
        .bind(&pattern)
        .bind(filter.is_active)
        .bind(filter.below_min)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            r#"
            SELECT {PRODUCT_COLUMNS}
            FROM products
            WHERE ($1::varchar IS NULL OR sku ILIKE $1 OR name ILIKE $1)
              AND ($2::boolean IS NULL OR is_active = $2)
              AND ($3::boolean IS NOT TRUE OR quantity <= min_stock)
            ORDER BY name ASC
            LIMIT $4 OFFSET $5
            "#,
        ))
        .bind(&pattern)
        .bind(filter.is_active)
        .bind(filter.below_min)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        Ok(PaginatedResponse {
            pagination: PaginationMeta::new(&pagination, total),
            data: rows.into_iter().map(Product::from).collect(),
        })
    }
}
