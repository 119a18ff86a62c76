use crate::commands;
use crate::middleware::auth::require_admin;
use crate::state::AppState;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};

pub fn router() -> Router<AppState> {
    let admin = Router::new()
        .route("/api/admin/orders", get(commands::orders::get_active_orders))
        .route(
            "/api/admin/orders/history",
            get(commands::orders::get_order_history),
        )
        .route(
            "/api/admin/orders/status",
            post(commands::orders::update_order_status_axum),
        )
        .route(
            "/api/admin/dashboard/stats",
            get(commands::dashboard::get_dashboard_stats),
        )
        .route_layer(middleware::from_fn(require_admin));

    Router::new()
        .route("/api/orders/create", post(commands::orders::create_order_axum))
        .route("/api/orders/mine", get(commands::orders::get_my_orders))
        .route("/api/orders/:id", get(commands::orders::get_order))
        .merge(admin)
}
