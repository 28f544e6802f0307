use serde::{Deserialize, Serialize};

const UNKNOWN_SOURCE: &str = "unknown source";

/// One retrieval hit attached to an assistant answer.
///
/// `source` and `content` are always present. Every other field is optional
/// and omitted from the wire form when unset.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CitationRecord {
    pub source: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment_id: Option<String>,
    /// Retrieval rank.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
}

impl CitationRecord {
    pub fn new(source: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            content: content.into(),
            ..Self::default()
        }
    }

    /// Two citations describe the same retrieval hit when their content
    /// matches or they share a non-empty segment id.
    pub fn is_duplicate_of(&self, other: &CitationRecord) -> bool {
        if self.content == other.content {
            return true;
        }
        matches!(
            (&self.segment_id, &other.segment_id),
            (Some(a), Some(b)) if !a.is_empty() && a == b
        )
    }
}

/// Keeps the first occurrence of each retrieval hit, preserving order.
pub fn dedupe_citations(citations: Vec<CitationRecord>) -> Vec<CitationRecord> {
    let mut unique: Vec<CitationRecord> = Vec::with_capacity(citations.len());
    for citation in citations {
        if !unique.iter().any(|kept| kept.is_duplicate_of(&citation)) {
            unique.push(citation);
        }
    }
    unique
}

/// Retrieval resource as reported in the upstream `message_end` metadata.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetrieverResource {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub document_name: Option<String>,
    #[serde(default)]
    pub dataset_name: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub dataset_id: Option<String>,
    #[serde(default)]
    pub document_id: Option<String>,
    #[serde(default)]
    pub segment_id: Option<String>,
    #[serde(default)]
    pub position: Option<u32>,
}

impl From<RetrieverResource> for CitationRecord {
    fn from(resource: RetrieverResource) -> Self {
        let source = resource
            .source
            .clone()
            .or_else(|| resource.document_name.clone())
            .or(resource.dataset_name)
            .unwrap_or_else(|| UNKNOWN_SOURCE.to_string());

        Self {
            source,
            content: resource.content.unwrap_or_default(),
            document_name: resource.document_name,
            score: resource.score,
            dataset_id: resource.dataset_id,
            document_id: resource.document_id,
            segment_id: resource.segment_id,
            position: resource.position,
        }
    }
}
