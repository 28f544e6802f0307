//! v1 chat handler: one streamed turn per request.

use std::convert::Infallible;

use axum::extract::State;
use axum::http::HeaderValue;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};

use crate::api::extractors::{AppJson, UserId};
use crate::api::v1::dto::ChatRequest;
use crate::api::v1::response::{ApiError, ApiResponse};
use crate::api::AppState;
use crate::services::ChatTurn;

pub const CONVERSATION_ID_HEADER: &str = "x-conversation-id";

/// `POST /api/v1/chat`
#[utoipa::path(
    post,
    path = "/api/v1/chat",
    tag = "chat",
    operation_id = "chat.send",
    request_body = ChatRequest,
    params(("X-User-Id" = String, Header, description = "End-user identity")),
    responses(
        (status = 200, description = "SSE stream of message, agent_message, message_end and error frames, ending with [DONE]",
            content_type = "text/event-stream", body = String,
            headers(("X-Conversation-ID" = String, description = "Conversation the turn belongs to"))),
        (status = 400, description = "Empty message", body = ApiError),
        (status = 404, description = "Conversation not found", body = ApiError),
    )
)]
pub async fn chat(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    AppJson(req): AppJson<ChatRequest>,
) -> Response {
    let ChatTurn {
        conversation_id,
        mut frames,
        task,
    } = match state.chat.start(req.into_turn(user_id)).await {
        Ok(turn) => turn,
        Err(e) => return ApiResponse::<()>::from(e).into_response(),
    };
    // The controller tracks the turn; it persists even if the client leaves.
    drop(task);

    let stream = async_stream::stream! {
        while let Some(frame) = frames.recv().await {
            yield Ok::<Event, Infallible>(Event::from(frame));
        }
    };

    let mut response = Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response();
    match HeaderValue::from_str(&conversation_id) {
        Ok(value) => {
            response.headers_mut().insert(CONVERSATION_ID_HEADER, value);
        }
        Err(e) => {
            tracing::warn!(conversation_id = %conversation_id, error = %e, "Conversation id is not a valid header value");
        }
    }
    response
}
