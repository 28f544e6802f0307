use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use super::key::MessageKey;
use super::storage::SlotStorage;
use super::CitationMap;
use crate::models::CitationRecord;

/// Global slot of the old cache format: one JSON object for every
/// conversation, `{conversationId: {messageIndex: [citation, ..]}}`, with
/// citations stored as full objects.
pub const LEGACY_SLOT_KEY: &str = "chat_message_citations";

/// Full citation object as the old format stored it. Everything is optional
/// because nothing validated it on the way in.
#[derive(Debug, Default, Deserialize)]
struct LegacyCitation {
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    document_name: Option<String>,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    dataset_id: Option<String>,
    #[serde(default)]
    document_id: Option<String>,
    #[serde(default)]
    segment_id: Option<String>,
    #[serde(default)]
    position: Option<u32>,
}

impl From<LegacyCitation> for CitationRecord {
    fn from(old: LegacyCitation) -> Self {
        Self {
            source: old.source.unwrap_or_default(),
            content: old.content.unwrap_or_default(),
            document_name: old.document_name,
            score: old.score,
            dataset_id: old.dataset_id,
            document_id: old.document_id,
            segment_id: old.segment_id,
            position: old.position,
        }
    }
}

/// Read-only view over the legacy global citation slot.
///
/// Nothing here writes: the legacy slot ages out through its own expiry.
#[derive(Clone)]
pub struct LegacyCacheAdapter {
    storage: Arc<dyn SlotStorage>,
}

impl LegacyCacheAdapter {
    pub fn new(storage: Arc<dyn SlotStorage>) -> Self {
        Self { storage }
    }

    /// This conversation's slice of the legacy blob. Absent or corrupt data
    /// yields an empty map.
    pub fn read(&self, conversation_id: &str) -> CitationMap {
        match self.storage.get(LEGACY_SLOT_KEY) {
            Some(raw) => decode_slice(&raw, conversation_id),
            None => CitationMap::new(),
        }
    }
}

pub(crate) fn decode_slice(raw: &str, conversation_id: &str) -> CitationMap {
    let mut blob: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, "Legacy citation slot is not valid JSON, ignoring");
            return CitationMap::new();
        }
    };

    let Some(slice) = blob.get_mut(conversation_id).map(Value::take) else {
        return CitationMap::new();
    };

    match serde_json::from_value::<BTreeMap<MessageKey, Vec<LegacyCitation>>>(slice) {
        Ok(messages) => messages
            .into_iter()
            .filter(|(_, citations)| !citations.is_empty())
            .map(|(key, citations)| {
                (key, citations.into_iter().map(CitationRecord::from).collect())
            })
            .collect(),
        Err(e) => {
            tracing::warn!(
                conversation_id,
                error = %e,
                "Legacy citation entry has an unexpected shape, ignoring"
            );
            CitationMap::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::citations::MemorySlotStorage;
    use chrono::{Duration, Utc};
    use pretty_assertions::assert_eq;

    fn adapter_with(raw: &str) -> LegacyCacheAdapter {
        let storage = Arc::new(MemorySlotStorage::new(4));
        storage.set(LEGACY_SLOT_KEY, raw.to_string(), Utc::now() + Duration::days(7));
        LegacyCacheAdapter::new(storage)
    }

    #[test]
    fn returns_only_the_requested_conversation() {
        let adapter = adapter_with(
            r#"{
                "conv-1": {"1": [{"source": "a.pdf", "content": "alpha", "score": 0.9, "position": 1}]},
                "conv-2": {"a:1": [{"source": "b.pdf", "content": "beta"}]}
            }"#,
        );

        let slice = adapter.read("conv-1");
        assert_eq!(slice.len(), 1);
        let records = &slice[&MessageKey::from("1")];
        assert_eq!(records[0].source, "a.pdf");
        assert_eq!(records[0].score, Some(0.9));
        assert_eq!(records[0].position, Some(1));
    }

    #[test]
    fn assistant_keys_in_legacy_blob_are_recognised() {
        let adapter = adapter_with(r#"{"c": {"a:3": [{"source": "s", "content": "x"}]}}"#);
        assert!(adapter.read("c").contains_key(&MessageKey::assistant(3)));
    }

    #[test]
    fn missing_fields_default_to_empty_strings() {
        let adapter = adapter_with(r#"{"c": {"0": [{"document_name": "d.pdf"}]}}"#);
        let slice = adapter.read("c");
        let record = &slice[&MessageKey::from("0")][0];
        assert_eq!(record.source, "");
        assert_eq!(record.content, "");
        assert_eq!(record.document_name.as_deref(), Some("d.pdf"));
    }

    #[test]
    fn corrupt_or_absent_blob_reads_as_empty() {
        assert!(adapter_with("{not json").read("c").is_empty());
        assert!(adapter_with(r#"{"c": "nope"}"#).read("c").is_empty());
        assert!(adapter_with(r#"{"other": {}}"#).read("c").is_empty());
        assert!(adapter_with("[]").read("c").is_empty());

        let empty = LegacyCacheAdapter::new(Arc::new(MemorySlotStorage::new(1)));
        assert!(empty.read("c").is_empty());
    }
}
