//! HTTP handlers for replenishment workflow endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::replenishment::{
    CloseReplenishmentInput, CreateReplenishmentInput, ReceiveInput, ReplenishmentFilter,
    ReplenishmentService, ReplenishmentWithItems,
};
use crate::AppState;
use shared::{PaginatedResponse, Pagination, ReplenishmentOrder};

/// Create a replenishment order
pub async fn create_replenishment(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateReplenishmentInput>,
) -> AppResult<Json<ReplenishmentWithItems>> {
    let service = ReplenishmentService::new(state.db, state.config);
    let order = service.create(current_user.0.user_id, input).await?;
    Ok(Json(order))
}

/// Get an order with its items
pub async fn get_replenishment(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<ReplenishmentWithItems>> {
    let service = ReplenishmentService::new(state.db, state.config);
    let order = service.get(order_id).await?;
    Ok(Json(order))
}

/// Approve a pending order
pub async fn approve_replenishment(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<ReplenishmentWithItems>> {
    let service = ReplenishmentService::new(state.db, state.config);
    let order = service.approve(order_id, current_user.0.user_id).await?;
    Ok(Json(order))
}

/// Mark an approved order as placed with the supplier
pub async fn mark_replenishment_ordered(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<ReplenishmentWithItems>> {
    let service = ReplenishmentService::new(state.db, state.config);
    let order = service.mark_ordered(order_id, current_user.0.user_id).await?;
    Ok(Json(order))
}

/// Record a supplier delivery against an order
pub async fn receive_replenishment(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
    Json(input): Json<ReceiveInput>,
) -> AppResult<Json<ReplenishmentWithItems>> {
    let service = ReplenishmentService::new(state.db, state.config);
    let order = service
        .receive(order_id, current_user.0.user_id, input)
        .await?;
    Ok(Json(order))
}

/// Close a short-delivered order early with a reason
pub async fn close_replenishment(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
    Json(input): Json<CloseReplenishmentInput>,
) -> AppResult<Json<ReplenishmentWithItems>> {
    let service = ReplenishmentService::new(state.db, state.config);
    let order = service
        .close(order_id, current_user.0.user_id, input)
        .await?;
    Ok(Json(order))
}

/// Cancel a non-terminal order
pub async fn cancel_replenishment(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<ReplenishmentWithItems>> {
    let service = ReplenishmentService::new(state.db, state.config);
    let order = service.cancel(order_id, current_user.0.user_id).await?;
    Ok(Json(order))
}

/// Search replenishment orders
pub async fn search_replenishments(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Query(filter): Query<ReplenishmentFilter>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<PaginatedResponse<ReplenishmentOrder>>> {
    let service = ReplenishmentService::new(state.db, state.config);
    let page = service.search(filter, pagination).await?;
    Ok(Json(page))
}

/// Orders still waiting on supplier goods
pub async fn pending_receipt_orders(
    State(state): State<AppState>,
    _current_user: CurrentUser,
) -> AppResult<Json<Vec<ReplenishmentOrder>>> {
    let service = ReplenishmentService::new(state.db, state.config);
    let orders = service.pending_receipt().await?;
    Ok(Json(orders))
}

/// Open high-priority orders
pub async fn urgent_orders(
    State(state): State<AppState>,
    _current_user: CurrentUser,
) -> AppResult<Json<Vec<ReplenishmentOrder>>> {
    let service = ReplenishmentService::new(state.db, state.config);
    let orders = service.urgent().await?;
    Ok(Json(orders))
}
