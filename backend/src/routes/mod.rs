//! Route definitions for the retail POS backend

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        // Protected routes - product catalog
        .nest("/products", product_routes())
        // Protected routes - stock ledger
        .nest("/stock", stock_routes())
        // Protected routes - sales
        .nest("/sales", sale_routes())
        // Protected routes - returns
        .nest("/returns", return_routes())
        // Protected routes - replenishment
        .nest("/replenishment", replenishment_routes())
        // Protected routes - stock alerts
        .nest("/alerts", alert_routes())
}

fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_products))
        .route("/:product_id", get(handlers::get_product))
        .route_layer(middleware::from_fn(auth_middleware))
}

fn stock_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/movements",
            get(handlers::search_movements).post(handlers::record_movement),
        )
        .route(
            "/products/:product_id/movements",
            get(handlers::get_product_movements),
        )
        .route_layer(middleware::from_fn(auth_middleware))
}

fn sale_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::search_sales).post(handlers::register_sale))
        .route("/summary", get(handlers::sales_summary))
        .route("/code/:code", get(handlers::get_sale_by_code))
        .route("/:sale_id", get(handlers::get_sale))
        .route("/:sale_id/void", post(handlers::void_sale))
        .route("/:sale_id/can-void", get(handlers::can_void_sale))
        .route_layer(middleware::from_fn(auth_middleware))
}

fn return_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::search_returns).post(handlers::create_return))
        .route("/validate", get(handlers::check_return_quantity))
        .route("/analytics", get(handlers::return_analytics))
        .route("/sale/:sale_id", get(handlers::list_sale_returns))
        .route("/window/:sale_id", get(handlers::return_window))
        .route("/:return_id", get(handlers::get_return))
        .route("/:return_id/approve", post(handlers::approve_return))
        .route("/:return_id/reject", post(handlers::reject_return))
        .route("/:return_id/complete", post(handlers::complete_return))
        .route_layer(middleware::from_fn(auth_middleware))
}

fn replenishment_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::search_replenishments).post(handlers::create_replenishment),
        )
        .route("/pending-receipt", get(handlers::pending_receipt_orders))
        .route("/urgent", get(handlers::urgent_orders))
        .route("/:order_id", get(handlers::get_replenishment))
        .route("/:order_id/approve", post(handlers::approve_replenishment))
        .route("/:order_id/order", post(handlers::mark_replenishment_ordered))
        .route("/:order_id/receive", post(handlers::receive_replenishment))
        .route("/:order_id/close", post(handlers::close_replenishment))
        .route("/:order_id/cancel", post(handlers::cancel_replenishment))
        .route_layer(middleware::from_fn(auth_middleware))
}

fn alert_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::search_alerts))
        .route("/unread", get(handlers::list_unread_alerts))
        .route("/critical", get(handlers::list_critical_alerts))
        .route("/counts", get(handlers::alert_summary))
        .route("/:alert_id/read", post(handlers::mark_alert_read))
        .route_layer(middleware::from_fn(auth_middleware))
}
