use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use thiserror::Error;

use msgbridge_gateway::GatewayError;

/// Errors that can occur standing up or running the server itself, as
/// opposed to [`GatewayError`]s raised while handling a request.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Wraps a [`GatewayError`] with the operation name, for the failure
/// envelope's `error_context.operation` field.
pub struct ApiError {
    pub operation: &'static str,
    pub source: GatewayError,
}

impl ApiError {
    #[must_use]
    pub fn new(operation: &'static str, source: GatewayError) -> Self {
        Self { operation, source }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.source.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let mut details = serde_json::json!({});
        if let Some(retry_after) = self.source.retry_after() {
            details = serde_json::json!({ "retry_after": retry_after });
        }

        let body = serde_json::json!({
            "status": "failed",
            "message": self.source.to_string(),
            "error_code": self.source.code(),
            "retry_after": self.source.retry_after(),
            "error_context": {
                "timestamp": Utc::now(),
                "operation": self.operation,
                "details": details,
            },
        });

        (status, Json(body)).into_response()
    }
}
