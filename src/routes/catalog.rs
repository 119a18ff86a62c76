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
        .route(
            "/api/admin/products",
            get(commands::catalog::get_products_admin).post(commands::catalog::create_product),
        )
        .route(
            "/api/admin/products/:id",
            post(commands::catalog::update_product),
        )
        .route(
            "/api/admin/products/:id/toggle",
            post(commands::catalog::toggle_product_availability),
        )
        .route(
            "/api/admin/products/:id/delete",
            post(commands::catalog::delete_product),
        )
        .route(
            "/api/admin/categories",
            post(commands::catalog::create_category),
        )
        .route(
            "/api/admin/categories/:id/delete",
            post(commands::catalog::delete_category),
        )
        .route_layer(middleware::from_fn(require_admin));

    Router::new()
        .route("/api/categories", get(commands::catalog::get_categories))
        .route(
            "/api/products",
            get(commands::catalog::get_storefront_products),
        )
        .route("/api/products/:id", get(commands::catalog::get_product))
        .merge(admin)
}
