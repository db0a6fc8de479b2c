//! Mapping from store errors to HTTP responses

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::Error;

/// Error body: `{status: "error", category, message}`
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub category: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    Store(Error),
    Internal(String),
}

impl ApiError {
    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::Internal(message.into())
    }

    fn status_and_category(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Store(Error::NotFound { .. }) => (StatusCode::NOT_FOUND, "OBJECT_NOT_FOUND"),
            ApiError::Store(Error::Validation(_)) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            ApiError::Store(Error::Conflict(_)) => (StatusCode::CONFLICT, "CONFLICT"),
            ApiError::Store(_) | ApiError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError::Store(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, category) = self.status_and_category();
        let message = match self {
            ApiError::Store(err) => err.to_string(),
            ApiError::Internal(message) => message,
        };
        if status.is_server_error() {
            tracing::error!(%message, "request failed");
        }

        let body = ErrorResponse {
            status: "error",
            category,
            message,
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
