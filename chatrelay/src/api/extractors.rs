use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, FromRequestParts};
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};

use crate::api::v1::response::{ApiResponse, ErrorCode};
use crate::error::RelayError;

/// Header carrying the end-user identity, set by the authenticating gateway.
pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(JsonBodyError))]
pub struct AppJson<T>(pub T);

/// Body rejection rendered in the v1 envelope.
pub struct JsonBodyError(RelayError);

impl From<JsonRejection> for JsonBodyError {
    fn from(rejection: JsonRejection) -> Self {
        Self(map_json_rejection(rejection))
    }
}

impl IntoResponse for JsonBodyError {
    fn into_response(self) -> Response {
        ApiResponse::<()>::from(self.0).into_response()
    }
}

fn map_json_rejection(rejection: JsonRejection) -> RelayError {
    match rejection {
        JsonRejection::JsonDataError(err) => {
            let message = err.body_text();
            if let Some(field) = extract_missing_field(&message) {
                RelayError::Validation(format!("Missing required field: {field}"))
            } else {
                RelayError::Validation(format!("Invalid JSON: {message}"))
            }
        }
        JsonRejection::JsonSyntaxError(err) => {
            RelayError::Validation(format!("JSON syntax error: {}", err.body_text()))
        }
        JsonRejection::MissingJsonContentType(_) => {
            RelayError::Validation("Missing `Content-Type: application/json` header".to_string())
        }
        JsonRejection::BytesRejection(_) => {
            RelayError::Internal("Failed to read request body".to_string())
        }
        _ => RelayError::Validation(rejection.body_text()),
    }
}

fn extract_missing_field(message: &str) -> Option<&str> {
    let prefix = "missing field `";
    let start = message.find(prefix)? + prefix.len();
    let remaining = message.get(start..)?;
    let end = remaining.find('`')?;
    remaining.get(..end)
}

/// Caller identity from [`USER_ID_HEADER`].
#[derive(Debug, Clone)]
pub struct UserId(pub String);

impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = ApiResponse<()>;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty());

        match user_id {
            Some(id) => Ok(Self(id.to_string())),
            None => Err(ApiResponse::error(
                ErrorCode::Unauthorized,
                format!("Missing {USER_ID_HEADER} header"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_field_is_extracted_from_serde_message() {
        assert_eq!(
            extract_missing_field("Failed to deserialize: missing field `message` at line 1"),
            Some("message")
        );
        assert_eq!(extract_missing_field("invalid type: integer"), None);
    }
}
