//! API error types with HTTP status code mapping.
//!
//! [`ApiError`] is the unified error type of the bulk endpoint. It implements
//! `axum::response::IntoResponse` to produce a structured JSON error body with
//! the status code the failure calls for.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use bulkapi_core::BulkError;

/// Structured error detail in API responses.
#[derive(Debug, Clone, Serialize)]
pub struct ApiErrorDetail {
    /// Machine-readable error code (e.g., "PAYLOAD_TOO_LARGE").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Optional structured details (e.g., the offending operation index).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// API errors with HTTP status code mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Invalid request (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Sub-request refused by server re-authentication (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Batch larger than the configured limit (413).
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    /// An operation target is malformed or not bulk-eligible (422).
    #[error("invalid target: {message}")]
    InvalidTarget { index: usize, message: String },

    /// Internal server error (500).
    #[error("internal error: {0}")]
    InternalError(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::InvalidTarget { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match self {
            ApiError::BadRequest(msg) => ApiErrorDetail {
                code: "BAD_REQUEST".to_string(),
                message: msg,
                details: None,
            },
            ApiError::Unauthorized(msg) => ApiErrorDetail {
                code: "UNAUTHORIZED".to_string(),
                message: msg,
                details: None,
            },
            ApiError::PayloadTooLarge(msg) => ApiErrorDetail {
                code: "PAYLOAD_TOO_LARGE".to_string(),
                message: msg,
                details: None,
            },
            ApiError::InvalidTarget { index, message } => ApiErrorDetail {
                code: "INVALID_TARGET".to_string(),
                message,
                details: Some(serde_json::json!({ "operation": index })),
            },
            ApiError::InternalError(msg) => ApiErrorDetail {
                code: "INTERNAL_ERROR".to_string(),
                message: msg,
                details: None,
            },
        };

        let body = serde_json::json!({
            "success": false,
            "error": detail,
        });

        (status, axum::Json(body)).into_response()
    }
}

impl From<BulkError> for ApiError {
    fn from(err: BulkError) -> Self {
        match &err {
            BulkError::OverLimit { .. } => ApiError::PayloadTooLarge(err.to_string()),
            BulkError::InvalidTarget { index, .. } => ApiError::InvalidTarget {
                index: *index,
                message: err.to_string(),
            },
            BulkError::Unauthorized(msg) => ApiError::Unauthorized(msg.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bulk_errors_map_to_documented_status_codes() {
        let over: ApiError = BulkError::OverLimit {
            count: 101,
            max: 100,
        }
        .into();
        assert_eq!(over.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let invalid: ApiError = BulkError::invalid_target(2, "/bulk", "self").into();
        assert_eq!(invalid.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let unauthorized: ApiError = BulkError::Unauthorized("re-auth".to_string()).into();
        assert_eq!(unauthorized.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn error_body_uses_the_standard_envelope() {
        let response = ApiError::from(BulkError::invalid_target(4, "/x", "not eligible"))
            .into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], "INVALID_TARGET");
        assert_eq!(json["error"]["details"]["operation"], 4);
        assert!(json["error"]["message"]
            .as_str()
            .unwrap()
            .contains("invalid URL(/x)"));
    }
}
