use axum::response::sse::Event;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::models::CitationRecord;

use super::event::FragmentKind;

const DONE: &str = "[DONE]";

/// One event written to the client-facing stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DownstreamFrame {
    Message {
        answer: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        metadata: Option<Map<String, Value>>,
    },
    AgentMessage {
        answer: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        metadata: Option<Map<String, Value>>,
    },
    MessageEnd {
        metadata: FrameMetadata,
    },
    Error {
        error: String,
    },
    /// Final `[DONE]` marker.
    #[serde(skip)]
    Done,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameMetadata {
    pub retriever_resources: Vec<CitationRecord>,
    /// Upstream `message_end` metadata other than the resources.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DownstreamFrame {
    pub fn message(answer: impl Into<String>) -> Self {
        Self::fragment(FragmentKind::Message, answer, None)
    }

    /// Content fragment tagged with the upstream event it came from.
    pub fn fragment(
        kind: FragmentKind,
        answer: impl Into<String>,
        metadata: Option<Map<String, Value>>,
    ) -> Self {
        let answer = answer.into();
        match kind {
            FragmentKind::Message => Self::Message { answer, metadata },
            FragmentKind::AgentMessage => Self::AgentMessage { answer, metadata },
        }
    }

    pub fn message_end(citations: Vec<CitationRecord>) -> Self {
        Self::message_end_with(citations, Map::new())
    }

    pub fn message_end_with(citations: Vec<CitationRecord>, extra: Map<String, Value>) -> Self {
        Self::MessageEnd {
            metadata: FrameMetadata {
                retriever_resources: citations,
                extra,
            },
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self::Error {
            error: error.into(),
        }
    }

    /// Payload of the SSE `data:` field.
    pub fn data(&self) -> String {
        match self {
            Self::Done => DONE.to_string(),
            frame => serde_json::to_string(frame).unwrap_or_else(|e| {
                tracing::error!(error = %e, "Failed to encode downstream frame");
                r#"{"event":"error","error":"encoding failure"}"#.to_string()
            }),
        }
    }
}

impl From<DownstreamFrame> for Event {
    fn from(frame: DownstreamFrame) -> Self {
        Event::default().data(frame.data())
    }
}
