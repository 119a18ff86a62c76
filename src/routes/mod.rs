use crate::state::AppState;
use axum::Router;

pub mod auth;
pub mod catalog;
pub mod orders;

pub fn create_router() -> Router<AppState> {
    Router::new()
        .merge(auth::router())
        .merge(catalog::router())
        .merge(orders::router())
}
