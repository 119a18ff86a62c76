use crate::commands;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/auth/check-role",
            post(commands::auth::check_user_role),
        )
        .route("/api/auth/login", post(commands::auth::login))
        .route("/api/auth/logout", post(commands::auth::logout))
        .route("/api/auth/check", get(commands::auth::check_auth_status))
}
