//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use dispatch::DispatchError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed path, query, or body.
    BadRequest(String),
    /// Missing or unreadable caller identity.
    Unauthorized(String),
    /// The caller's role may not use this route.
    Forbidden(String),
    /// Error returned by a dispatch operation.
    Dispatch(DispatchError),
}

impl ApiError {
    /// The HTTP status this error is reported with.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Dispatch(err) => dispatch_status(err),
        }
    }
}

fn dispatch_status(err: &DispatchError) -> StatusCode {
    match err {
        DispatchError::NotFound { .. } => StatusCode::NOT_FOUND,
        DispatchError::Conflict(_) => StatusCode::CONFLICT,
        DispatchError::Invalid(_) => StatusCode::BAD_REQUEST,
        DispatchError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        DispatchError::Forbidden(_) => StatusCode::FORBIDDEN,
        DispatchError::Precondition(_) => StatusCode::PRECONDITION_FAILED,
        DispatchError::NoJob => StatusCode::NO_CONTENT,
        DispatchError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        metrics::counter!("api_errors_total", "status" => status.as_u16().to_string()).increment(1);

        let message = match self {
            // 204 carries no body.
            ApiError::Dispatch(DispatchError::NoJob) => return status.into_response(),
            ApiError::Dispatch(DispatchError::Internal(msg)) => {
                tracing::error!(error = %msg, "internal server error");
                "internal server error".to_string()
            }
            ApiError::Dispatch(err) => err.to_string(),
            ApiError::BadRequest(msg) | ApiError::Unauthorized(msg) | ApiError::Forbidden(msg) => {
                msg
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        ApiError::Dispatch(err)
    }
}
