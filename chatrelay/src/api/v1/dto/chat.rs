//! Chat request DTOs for the v1 API.

use serde::Deserialize;

use crate::services::ChatTurnRequest;

/// Request body for `POST /api/v1/chat`.
#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// The user's message.
    pub message: String,
    /// Existing conversation to continue. A new one is created when absent.
    #[serde(default)]
    pub conversation_id: Option<String>,
    /// Knowledge base to answer from. Defaults to the conversation's.
    #[serde(default)]
    pub knowledge_base_id: Option<String>,
    /// Model to answer with. Defaults to the conversation's.
    #[serde(default)]
    pub model_id: Option<String>,
}

impl ChatRequest {
    pub fn into_turn(self, user_id: String) -> ChatTurnRequest {
        ChatTurnRequest {
            user_id,
            message: self.message,
            conversation_id: self.conversation_id,
            knowledge_base_id: self.knowledge_base_id,
            model_id: self.model_id,
        }
    }
}
