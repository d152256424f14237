//! HTTP handlers for return workflow endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::handlers::sale::PeriodQuery;
use crate::middleware::CurrentUser;
use crate::services::returns::{
    CreateReturnInput, QuantityCheck, RejectReturnInput, ReturnAnalytics, ReturnFilter,
    ReturnService, ReturnWindowStatus, ReturnWithItems,
};
use crate::AppState;
use shared::{PaginatedResponse, Pagination, ReturnRequest};

#[derive(Debug, Deserialize)]
pub struct QuantityQuery {
    pub sale_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
}

/// Open a return request against a sale
pub async fn create_return(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateReturnInput>,
) -> AppResult<Json<ReturnWithItems>> {
    let service = ReturnService::new(state.db, state.config);
    let request = service.create(current_user.0.user_id, input).await?;
    Ok(Json(request))
}

/// Get a return request with its items
pub async fn get_return(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(return_id): Path<Uuid>,
) -> AppResult<Json<ReturnWithItems>> {
    let service = ReturnService::new(state.db, state.config);
    let request = service.get(return_id).await?;
    Ok(Json(request))
}

/// Approve a pending return
pub async fn approve_return(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(return_id): Path<Uuid>,
) -> AppResult<Json<ReturnWithItems>> {
    let service = ReturnService::new(state.db, state.config);
    let request = service.approve(return_id, current_user.0.user_id).await?;
    Ok(Json(request))
}

/// Reject a pending return with a reason
pub async fn reject_return(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(return_id): Path<Uuid>,
    Json(input): Json<RejectReturnInput>,
) -> AppResult<Json<ReturnWithItems>> {
    let service = ReturnService::new(state.db, state.config);
    let request = service
        .reject(return_id, current_user.0.user_id, input)
        .await?;
    Ok(Json(request))
}

/// Complete an approved return, crediting stock back
pub async fn complete_return(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(return_id): Path<Uuid>,
) -> AppResult<Json<ReturnWithItems>> {
    let service = ReturnService::new(state.db, state.config);
    let request = service.complete(return_id, current_user.0.user_id).await?;
    Ok(Json(request))
}

/// All returns opened against a sale
pub async fn list_sale_returns(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(sale_id): Path<Uuid>,
) -> AppResult<Json<Vec<ReturnRequest>>> {
    let service = ReturnService::new(state.db, state.config);
    let returns = service.list_by_sale(sale_id).await?;
    Ok(Json(returns))
}

/// Search returns
pub async fn search_returns(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Query(filter): Query<ReturnFilter>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<PaginatedResponse<ReturnRequest>>> {
    let service = ReturnService::new(state.db, state.config);
    let page = service.search(filter, pagination).await?;
    Ok(Json(page))
}

/// Return-window snapshot for a sale
pub async fn return_window(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(sale_id): Path<Uuid>,
) -> AppResult<Json<ReturnWindowStatus>> {
    let service = ReturnService::new(state.db, state.config);
    let status = service.window_check(sale_id).await?;
    Ok(Json(status))
}

/// Check a quantity against the returnable limit for one sale line
pub async fn check_return_quantity(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Query(query): Query<QuantityQuery>,
) -> AppResult<Json<QuantityCheck>> {
    let service = ReturnService::new(state.db, state.config);
    let check = service
        .check_quantity(query.sale_id, query.product_id, query.quantity)
        .await?;
    Ok(Json(check))
}

/// Aggregated return analytics for a period
pub async fn return_analytics(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Query(period): Query<PeriodQuery>,
) -> AppResult<Json<ReturnAnalytics>> {
    let service = ReturnService::new(state.db, state.config);
    let analytics = service.analytics(period.from, period.to).await?;
    Ok(Json(analytics))
}
