use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::error::AppError;
use serde::Serialize;
use thiserror::Error;

/// HTTP-facing error taxonomy, a 1:1 mapping of `common::AppError`'s kinds onto the status
/// codes §7 assigns them.
#[derive(Error, Debug, Serialize, Clone)]
pub enum ApiError {
    #[error("Bad input: {0}")]
    BadInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Store unavailable: {0}")]
    Store(String),

    #[error("Internal server error")]
    Internal(String),
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::BadInput(msg) => Self::BadInput(msg),
            AppError::NotFound(msg) => Self::NotFound(msg),
            AppError::Conflict(msg) => Self::Conflict(msg),
            AppError::Upstream(msg) => Self::Upstream(msg),
            AppError::Timeout(msg) => Self::Timeout(msg),
            AppError::Store(msg) => Self::Store(msg),
            AppError::OpenAI(e) => {
                tracing::error!(error = %e, "openai call failed");
                Self::Upstream(e.to_string())
            }
            AppError::Database(e) => {
                tracing::error!(error = %e, "store call failed");
                Self::Store("database unavailable".to_string())
            }
            AppError::LlmParsing(msg) => {
                tracing::error!(%msg, "llm returned unparseable output");
                Self::Upstream(msg)
            }
            AppError::Join(e) => {
                tracing::error!(error = %e, "internal task join failed");
                Self::Internal("internal server error".to_string())
            }
            AppError::Internal(msg) => {
                tracing::error!(%msg, "internal error");
                Self::Internal("internal server error".to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::BadInput(m) => (StatusCode::BAD_REQUEST, m.clone()),
            Self::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            Self::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
            Self::Upstream(m) => (StatusCode::BAD_GATEWAY, m.clone()),
            Self::Timeout(m) => (StatusCode::REQUEST_TIMEOUT, m.clone()),
            Self::Store(m) => (StatusCode::SERVICE_UNAVAILABLE, m.clone()),
            Self::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".to_string(),
            ),
        };

        (
            status,
            Json(ErrorResponse {
                error: message,
                status: "error".to_string(),
            }),
        )
            .into_response()
    }
}

#[derive(Serialize, Debug)]
struct ErrorResponse {
    error: String,
    status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_every_app_error_kind_to_its_http_status() {
        assert_eq!(
            ApiError::from(AppError::BadInput("x".into()))
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(AppError::NotFound("x".into()))
                .into_response()
                .status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(AppError::Conflict("x".into()))
                .into_response()
                .status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(AppError::Upstream("x".into()))
                .into_response()
                .status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::from(AppError::Timeout("x".into()))
                .into_response()
                .status(),
            StatusCode::REQUEST_TIMEOUT
        );
        assert_eq!(
            ApiError::from(AppError::Store("x".into()))
                .into_response()
                .status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::from(AppError::Internal("x".into()))
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_error_body_never_leaks_the_underlying_message() {
        let err = ApiError::from(AppError::Internal("db password incorrect".into()));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
