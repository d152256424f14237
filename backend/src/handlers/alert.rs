//! HTTP handlers for stock alert endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::alert::{AlertFilter, StockAlertService, UrgencyCount};
use crate::AppState;
use shared::{PaginatedResponse, Pagination, StockAlert};

/// Unread alerts, most urgent first
pub async fn list_unread_alerts(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<PaginatedResponse<StockAlert>>> {
    let service = StockAlertService::new(state.db, state.config);
    let page = service.unread(pagination).await?;
    Ok(Json(page))
}

/// Unread critical alerts
pub async fn list_critical_alerts(
    State(state): State<AppState>,
    _current_user: CurrentUser,
) -> AppResult<Json<Vec<StockAlert>>> {
    let service = StockAlertService::new(state.db, state.config);
    let alerts = service.critical().await?;
    Ok(Json(alerts))
}

/// Unread alert counts grouped by urgency
pub async fn alert_summary(
    State(state): State<AppState>,
    _current_user: CurrentUser,
) -> AppResult<Json<Vec<UrgencyCount>>> {
    let service = StockAlertService::new(state.db, state.config);
    let counts = service.counts_by_urgency().await?;
    Ok(Json(counts))
}

/// Search alerts
pub async fn search_alerts(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Query(filter): Query<AlertFilter>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<PaginatedResponse<StockAlert>>> {
    let service = StockAlertService::new(state.db, state.config);
    let page = service.search(filter, pagination).await?;
    Ok(Json(page))
}

/// Acknowledge an unread alert
pub async fn mark_alert_read(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(alert_id): Path<Uuid>,
) -> AppResult<Json<StockAlert>> {
    let service = StockAlertService::new(state.db, state.config);
    let alert = service.mark_read(alert_id, current_user.0.user_id).await?;
    Ok(Json(alert))
}
