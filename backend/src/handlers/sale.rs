//! HTTP handlers for sale endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::sale::{
    CanVoidResponse, RegisterSaleInput, SaleFilter, SaleService, SaleWithItems, SalesSummary,
    VoidSaleInput,
};
use crate::AppState;
use shared::{PaginatedResponse, Pagination, Sale};

#[derive(Debug, Default, Deserialize)]
pub struct PeriodQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// Register a sale
pub async fn register_sale(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<RegisterSaleInput>,
) -> AppResult<Json<SaleWithItems>> {
    let service = SaleService::new(state.db, state.config);
    let sale = service.register_sale(current_user.0.user_id, input).await?;
    Ok(Json(sale))
}

/// Get a sale with its items
pub async fn get_sale(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(sale_id): Path<Uuid>,
) -> AppResult<Json<SaleWithItems>> {
    let service = SaleService::new(state.db, state.config);
    let sale = service.get_sale(sale_id).await?;
    Ok(Json(sale))
}

/// Get a sale by its human-readable code
pub async fn get_sale_by_code(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(code): Path<String>,
) -> AppResult<Json<SaleWithItems>> {
    let service = SaleService::new(state.db, state.config);
    let sale = service.get_by_code(&code).await?;
    Ok(Json(sale))
}

/// Void a sale within the configured window
pub async fn void_sale(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(sale_id): Path<Uuid>,
    Json(input): Json<VoidSaleInput>,
) -> AppResult<Json<SaleWithItems>> {
    let service = SaleService::new(state.db, state.config);
    let sale = service
        .void_sale(sale_id, current_user.0.user_id, input)
        .await?;
    Ok(Json(sale))
}

/// Check whether a sale may currently be voided
pub async fn can_void_sale(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(sale_id): Path<Uuid>,
) -> AppResult<Json<CanVoidResponse>> {
    let service = SaleService::new(state.db, state.config);
    let response = service.can_void(sale_id).await?;
    Ok(Json(response))
}

/// Search sales
pub async fn search_sales(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Query(filter): Query<SaleFilter>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<PaginatedResponse<Sale>>> {
    let service = SaleService::new(state.db, state.config);
    let page = service.search(filter, pagination).await?;
    Ok(Json(page))
}

/// Revenue summary for paid sales in a period
pub async fn sales_summary(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Query(period): Query<PeriodQuery>,
) -> AppResult<Json<SalesSummary>> {
    let service = SaleService::new(state.db, state.config);
    let summary = service.summary(period.from, period.to).await?;
    Ok(Json(summary))
}
