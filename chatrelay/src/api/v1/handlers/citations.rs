//! v1 citation cache handlers.

use axum::extract::{Path, State};

use crate::api::extractors::{AppJson, UserId};
use crate::api::v1::dto::{
    CitationsResponse, ClearCitationsResponse, WriteCitationsRequest, WriteCitationsResponse,
};
use crate::api::v1::response::{ApiError, ApiResponse, ErrorCode};
use crate::api::AppState;
use crate::citations::MessageKey;
use crate::db::ConversationStore;
use crate::error::{RelayError, Result};

async fn ensure_owned(state: &AppState, conversation_id: &str, user_id: &str) -> Result<()> {
    if state.db.is_owned_by_user(conversation_id, user_id).await? {
        Ok(())
    } else {
        Err(RelayError::NotFound(format!(
            "Conversation {conversation_id} not found"
        )))
    }
}

/// `GET /api/v1/conversations/{conversationId}/citations`
#[utoipa::path(
    get,
    path = "/api/v1/conversations/{conversationId}/citations",
    tag = "citations",
    operation_id = "citations.get",
    params(
        ("conversationId" = String, Path, description = "Conversation ID"),
        ("X-User-Id" = String, Header, description = "End-user identity"),
    ),
    responses(
        (status = 200, description = "Cached citations by message key", body = CitationsResponse),
        (status = 404, description = "Conversation not found", body = ApiError),
    )
)]
pub async fn get_citations(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(conversation_id): Path<String>,
) -> ApiResponse<CitationsResponse> {
    if let Err(e) = ensure_owned(&state, &conversation_id, &user_id).await {
        return e.into();
    }

    let citations = state.citations.read(&conversation_id);
    ApiResponse::success(CitationsResponse {
        conversation_id,
        citations,
    })
}

/// `PUT /api/v1/conversations/{conversationId}/citations/{ordinal}`
#[utoipa::path(
    put,
    path = "/api/v1/conversations/{conversationId}/citations/{ordinal}",
    tag = "citations",
    operation_id = "citations.write",
    request_body = WriteCitationsRequest,
    params(
        ("conversationId" = String, Path, description = "Conversation ID"),
        ("ordinal" = u32, Path, description = "1-based assistant message ordinal"),
        ("X-User-Id" = String, Header, description = "End-user identity"),
    ),
    responses(
        (status = 200, description = "Write result", body = WriteCitationsResponse),
        (status = 400, description = "Invalid ordinal", body = ApiError),
        (status = 404, description = "Conversation not found", body = ApiError),
    )
)]
pub async fn put_citations(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path((conversation_id, ordinal)): Path<(String, u32)>,
    AppJson(req): AppJson<WriteCitationsRequest>,
) -> ApiResponse<WriteCitationsResponse> {
    if ordinal == 0 {
        return ApiResponse::error(ErrorCode::InvalidRequest, "Ordinal must be at least 1");
    }
    if let Err(e) = ensure_owned(&state, &conversation_id, &user_id).await {
        return e.into();
    }

    let key = MessageKey::assistant(ordinal);
    match state.citations.write(&conversation_id, key.clone(), &req.citations) {
        Ok(result) => ApiResponse::success(WriteCitationsResponse {
            conversation_id,
            message_key: key.to_string(),
            result,
        }),
        Err(e) => e.into(),
    }
}

/// `DELETE /api/v1/conversations/{conversationId}/citations`
#[utoipa::path(
    delete,
    path = "/api/v1/conversations/{conversationId}/citations",
    tag = "citations",
    operation_id = "citations.clear",
    params(
        ("conversationId" = String, Path, description = "Conversation ID"),
        ("X-User-Id" = String, Header, description = "End-user identity"),
    ),
    responses(
        (status = 200, description = "Slot cleared", body = ClearCitationsResponse),
        (status = 404, description = "Conversation not found", body = ApiError),
    )
)]
pub async fn delete_citations(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(conversation_id): Path<String>,
) -> ApiResponse<ClearCitationsResponse> {
    if let Err(e) = ensure_owned(&state, &conversation_id, &user_id).await {
        return e.into();
    }

    state.citations.clear(&conversation_id);
    ApiResponse::success(ClearCitationsResponse {
        conversation_id,
        cleared: true,
    })
}
