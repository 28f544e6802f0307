//! Citation cache DTOs for the v1 API.

use serde::{Deserialize, Serialize};

use crate::citations::{CitationMap, WriteOutcome};
use crate::models::CitationRecord;

/// Cached citations of one conversation, keyed by message key (`a:<ordinal>`
/// for current entries, a bare message index for legacy ones).
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CitationsResponse {
    pub conversation_id: String,
    #[schema(value_type = Object)]
    pub citations: CitationMap,
}

/// Request body for `PUT /api/v1/conversations/{conversationId}/citations/{ordinal}`.
#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
pub struct WriteCitationsRequest {
    pub citations: Vec<CitationRecord>,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WriteCitationsResponse {
    pub conversation_id: String,
    pub message_key: String,
    pub result: WriteOutcome,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClearCitationsResponse {
    pub conversation_id: String,
    pub cleared: bool,
}
