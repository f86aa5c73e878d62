use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use personal_rag::RagError;
use serde_json::json;
use tracing::error;

/// A [`RagError`] rendered as an HTTP response.
///
/// The body is `{"detail": "...", "error": "<kind>"}`.
#[derive(Debug)]
pub struct ApiError(pub RagError);

impl From<RagError> for ApiError {
    fn from(err: RagError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            e if e.is_not_ready() => (StatusCode::BAD_REQUEST, "not_ready"),
            e if e.is_timeout() => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            RagError::Provider { .. } => (StatusCode::BAD_GATEWAY, "embedding_error"),
            RagError::Generation { .. } => (StatusCode::BAD_GATEWAY, "generation_error"),
            RagError::Load { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "load_error"),
            RagError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = self.parts();
        let detail = match &self.0 {
            e if e.is_not_ready() => RagError::NotReady.to_string(),
            e => e.to_string(),
        };
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self.0, "request failed");
        }
        (status, Json(json!({ "detail": detail, "error": kind }))).into_response()
    }
}
