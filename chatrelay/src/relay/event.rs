use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::models::{CitationRecord, RetrieverResource};

/// JSON body of one upstream `data:` line.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpstreamPayload {
    pub event: String,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub metadata: Option<UpstreamMetadata>,
    /// Error description on `error` events.
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<Value>,
}

/// Kept loosely typed so one odd resource cannot make the whole frame
/// undecodable.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpstreamMetadata {
    #[serde(default, deserialize_with = "null_as_default")]
    pub retriever_resources: Vec<Value>,
    /// Everything else the upstream attached (`usage`, annotations, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Reads an explicit `null` as the type's default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Which answer event a content fragment arrived on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FragmentKind {
    #[default]
    Message,
    AgentMessage,
}

/// Upstream event tags the relay acts on. Everything else (workflow and
/// node progress, pings, file events) is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamEventKind {
    Message,
    AgentMessage,
    MessageEnd,
    Error,
    Other,
}

impl UpstreamEventKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "message" => Self::Message,
            "agent_message" => Self::AgentMessage,
            "message_end" => Self::MessageEnd,
            "error" => Self::Error,
            _ => Self::Other,
        }
    }
}

impl UpstreamPayload {
    pub fn kind(&self) -> UpstreamEventKind {
        UpstreamEventKind::from_tag(&self.event)
    }

    /// Takes the attached metadata, split into citation records and the
    /// remaining keys.
    pub fn take_metadata(&mut self) -> (Vec<CitationRecord>, Map<String, Value>) {
        let Some(metadata) = self.metadata.take() else {
            return (Vec::new(), Map::new());
        };
        let records = metadata
            .retriever_resources
            .into_iter()
            .filter_map(|raw| match serde_json::from_value::<RetrieverResource>(raw) {
                Ok(resource) => Some(CitationRecord::from(resource)),
                Err(e) => {
                    tracing::warn!(error = %e, "Dropping malformed retriever resource");
                    None
                }
            })
            .collect();
        (records, metadata.extra)
    }

    pub fn error_detail(&self) -> String {
        let code = self.code.as_ref().map(|code| match code {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });
        match (&self.message, code) {
            (Some(message), Some(code)) => format!("{message} ({code})"),
            (Some(message), None) => message.clone(),
            (None, Some(code)) => code,
            (None, None) => "upstream reported an error".to_string(),
        }
    }
}

/// Decoded upstream event, consumed in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    ContentDelta {
        text: String,
        kind: FragmentKind,
        /// Non-citation metadata the fragment carried, if any.
        metadata: Option<Map<String, Value>>,
    },
    CitationBatch { records: Vec<CitationRecord> },
    /// Non-citation `message_end` metadata, emitted before the terminal.
    EndMetadata { metadata: Map<String, Value> },
    Terminal,
    Error { message: String },
}
