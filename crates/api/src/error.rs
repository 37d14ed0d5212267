//! Error-to-status mapping for the HTTP surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use sentinel_common::SentinelError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
    pub timestamp: chrono::DateTime<Utc>,
}

pub struct ApiError(pub SentinelError);

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl From<SentinelError> for ApiError {
    fn from(err: SentinelError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self.0 {
            SentinelError::InvalidInput(m) => {
                (StatusCode::BAD_REQUEST, "invalid_input", m.clone())
            }
            SentinelError::NotFound(m) => (StatusCode::NOT_FOUND, "not_found", m.clone()),
            SentinelError::Unauthorized(m) => {
                (StatusCode::UNAUTHORIZED, "unauthorized", m.clone())
            }
            SentinelError::Conflict(m) => (StatusCode::CONFLICT, "conflict", m.clone()),
            SentinelError::RateLimitExhausted | SentinelError::Upstream(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "upstream_unavailable",
                self.0.to_string(),
            ),
            // Anything else is opaque: log the detail under a correlation
            // id and keep it out of the response body.
            other => {
                let correlation_id = Uuid::new_v4();
                tracing::error!(%correlation_id, error = %other, "unhandled API error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    format!("internal error ({correlation_id})"),
                )
            }
        };

        (
            status,
            Json(ErrorBody {
                error: message,
                code: code.to_string(),
                timestamp: Utc::now(),
            }),
        )
            .into_response()
    }
}
