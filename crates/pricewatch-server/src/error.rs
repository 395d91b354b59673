use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use pricewatch_core::error::AppError;

use crate::dto::ErrorResponse;

/// Handler error, rendered as a JSON `{error, message}` body.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    App(#[from] AppError),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            ApiError::App(err) => match err {
                AppError::UnknownSource(_) => (StatusCode::BAD_REQUEST, "unknown_source"),
                AppError::SerializationError(_) => {
                    (StatusCode::BAD_REQUEST, "serialization_error")
                }
                AppError::DatabaseError(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "database_error")
                }
                AppError::ConfigError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
                AppError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            },
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let body = ErrorResponse {
            error: error_type.to_string(),
            message: self.to_string(),
        };

        (status, axum::Json(body)).into_response()
    }
}
