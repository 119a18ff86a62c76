use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FornadaError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Bcrypt error: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),

    #[error("Token error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Upload error: {0}")]
    Multipart(#[from] MultipartError),
}

pub type FornadaResult<T> = Result<T, FornadaError>;

impl IntoResponse for FornadaError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            FornadaError::Database(ref e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "A storage error occurred. Please try again.".to_string(),
                )
            }
            FornadaError::Auth(msg) => (StatusCode::UNAUTHORIZED, msg),
            FornadaError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            FornadaError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            FornadaError::Multipart(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            FornadaError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred.".to_string(),
                )
            }
            FornadaError::Io(ref e) => {
                tracing::error!("IO error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "A file system error occurred.".to_string(),
                )
            }
            other => {
                tracing::error!("Unhandled error: {:?}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An unknown error occurred.".to_string(),
                )
            }
        };

        let body = Json(json!({
            "success": false,
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
