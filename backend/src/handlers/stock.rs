//! HTTP handlers for stock ledger endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::ledger::{MovementFilter, RecordMovementInput, StockLedgerService};
use crate::AppState;
use shared::{PaginatedResponse, Pagination, StockMovement};

/// Record a stock movement
pub async fn record_movement(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<RecordMovementInput>,
) -> AppResult<Json<StockMovement>> {
    let service = StockLedgerService::new(state.db, state.config);
    let movement = service
        .record_movement(current_user.0.user_id, input)
        .await?;
    Ok(Json(movement))
}

/// Get the full movement history of a product, oldest first
pub async fn get_product_movements(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(product_id): Path<Uuid>,
) -> AppResult<Json<Vec<StockMovement>>> {
    let service = StockLedgerService::new(state.db, state.config);
    let movements = service.product_history(product_id).await?;
    Ok(Json(movements))
}

/// Search movements across products
pub async fn search_movements(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Query(filter): Query<MovementFilter>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<PaginatedResponse<StockMovement>>> {
    let service = StockLedgerService::new(state.db, state.config);
    let page = service.search_movements(filter, pagination).await?;
    Ok(Json(page))
}
