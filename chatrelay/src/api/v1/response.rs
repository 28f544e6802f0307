//! # V1 response envelope
//!
//! Every JSON endpoint answers with an [`ApiResponse<T>`]:
//!
//! ```json
//! { "data": { ... } }                                      // success
//! { "error": { "code": "not_found", "message": "..." } }  // failure
//! ```
//!
//! The chat endpoint streams SSE on success and only uses the envelope for
//! failures detected before the stream starts.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// Machine-readable error code, serialized in snake_case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// HTTP 400.
    InvalidRequest,
    /// HTTP 401.
    Unauthorized,
    /// HTTP 404.
    NotFound,
    /// The upstream chat API failed. HTTP 502.
    UpstreamError,
    /// The conversation store is unavailable. HTTP 503.
    Unavailable,
    /// HTTP 500. Details are logged, never returned.
    InternalError,
}

impl ErrorCode {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::UpstreamError => StatusCode::BAD_GATEWAY,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ApiError {
    pub code: ErrorCode,
    /// Safe to show to end users.
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,

    #[serde(skip)]
    status: StatusCode,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
            status: StatusCode::OK,
        }
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        let status = code.status();
        Self {
            data: None,
            error: Some(ApiError {
                code,
                message: message.into(),
            }),
            status,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = self.status;
        match serde_json::to_value(&self) {
            Ok(body) => (status, Json(body)).into_response(),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize v1 response");
                let body = serde_json::json!({
                    "error": {
                        "code": "internal_error",
                        "message": "An internal error occurred"
                    }
                });
                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            }
        }
    }
}

impl<T: Serialize> From<RelayError> for ApiResponse<T> {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::NotFound(msg) => ApiResponse::error(ErrorCode::NotFound, msg),
            RelayError::Validation(msg) => ApiResponse::error(ErrorCode::InvalidRequest, msg),
            RelayError::Json(e) => {
                ApiResponse::error(ErrorCode::InvalidRequest, format!("Invalid JSON: {e}"))
            }
            RelayError::UrlParse(e) => {
                ApiResponse::error(ErrorCode::InvalidRequest, format!("Invalid URL: {e}"))
            }
            ref upstream @ (RelayError::Upstream(_)
            | RelayError::UpstreamProtocol(_)
            | RelayError::Http(_)) => {
                tracing::warn!(error = %upstream, "Upstream error mapped to v1 response");
                ApiResponse::error(ErrorCode::UpstreamError, "The chat service is unavailable")
            }
            ref persistence @ RelayError::Persistence(_) => {
                tracing::error!(error = %persistence, "Persistence error mapped to v1 response");
                ApiResponse::error(ErrorCode::Unavailable, "Conversation storage is unavailable")
            }
            ref internal @ (RelayError::Database(_)
            | RelayError::Io(_)
            | RelayError::Configuration(_)
            | RelayError::Internal(_)) => {
                tracing::error!(error = %internal, "Internal error mapped to v1 response");
                ApiResponse::error(ErrorCode::InternalError, "An internal error occurred")
            }
        }
    }
}
