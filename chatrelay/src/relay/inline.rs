//! Extraction of `<Citations ...>body</Citations>` tags embedded in answer text.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::models::CitationRecord;

const OPEN_TAG: &str = "<Citations";
const WRAPPED_SOURCE: &str = "knowledge base";
const WRAPPED_DOCUMENT: &str = "knowledge base document";
const UNKNOWN_SOURCE: &str = "unknown source";

static COMPLETE_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<Citations[^>]*>(.*?)</Citations>").expect("valid citation tag regex")
});

static NAMED_SNIPPET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^:]+):(.+)$").expect("valid snippet regex"));

/// Streaming parser that strips citation tags out of answer fragments.
///
/// A tag may be split over several fragments. Text from an opened but not yet
/// closed tag, or a trailing `<Cit...` that could still become one, is held
/// back until a later fragment completes it or [`flush`](Self::flush) is
/// called.
#[derive(Debug, Default)]
pub struct InlineCitationParser {
    held: String,
}

#[derive(Debug, Default, PartialEq)]
pub struct ParsedFragment {
    /// Text safe to forward, tags removed.
    pub text: String,
    pub citations: Vec<CitationRecord>,
}

impl InlineCitationParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process(&mut self, fragment: &str) -> ParsedFragment {
        self.held.push_str(fragment);
        let buffered = std::mem::take(&mut self.held);

        let mut citations = Vec::new();
        let cleaned = COMPLETE_TAG.replace_all(&buffered, |caps: &regex::Captures<'_>| {
            match parse_tag_body(&caps[1]) {
                Some(record) => citations.push(record),
                None => tracing::debug!(body_len = caps[1].len(), "Unparseable inline citation tag"),
            }
            ""
        });

        let split = hold_from(&cleaned);
        self.held = cleaned[split..].to_string();
        ParsedFragment {
            text: cleaned[..split].to_string(),
            citations,
        }
    }

    /// Releases held text verbatim, e.g. a tag the upstream never closed.
    pub fn flush(&mut self) -> String {
        std::mem::take(&mut self.held)
    }

    pub fn is_holding(&self) -> bool {
        !self.held.is_empty()
    }
}

/// Byte offset from which `text` must be held back.
fn hold_from(text: &str) -> usize {
    if let Some(open) = text.find(OPEN_TAG) {
        return open;
    }
    match text.rfind('<') {
        Some(lt) if OPEN_TAG.starts_with(&text[lt..]) => lt,
        _ => text.len(),
    }
}

#[derive(Debug, Deserialize)]
struct InlineCitation {
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    data: Option<String>,
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

/// Decodes one tag body into a record, or `None` if it has no usable shape.
pub fn parse_tag_body(body: &str) -> Option<CitationRecord> {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => {
            let succeeded = map.get("success").is_some_and(is_truthy);
            let wrapped = map
                .get("data")
                .filter(|data| succeeded && is_truthy(data))
                .map(|data| wrapped_record(data, map.get("message")));
            wrapped.or_else(|| direct_record(Value::Object(map)))
        }
        Ok(_) => None,
        Err(_) => named_snippet(body),
    }
}

fn wrapped_record(data: &Value, message: Option<&Value>) -> CitationRecord {
    let document_name = message
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .unwrap_or(WRAPPED_DOCUMENT);
    CitationRecord {
        source: WRAPPED_SOURCE.to_string(),
        content: value_text(data),
        document_name: Some(document_name.to_string()),
        score: Some(1.0),
        position: Some(0),
        ..CitationRecord::default()
    }
}

fn direct_record(value: Value) -> Option<CitationRecord> {
    let citation: InlineCitation = serde_json::from_value(value)
        .map_err(|e| tracing::debug!(error = %e, "Inline citation object has unexpected field types"))
        .ok()?;

    let source = citation
        .source
        .filter(|s| !s.is_empty())
        .or_else(|| citation.document_name.clone().filter(|s| !s.is_empty()))
        .unwrap_or_else(|| UNKNOWN_SOURCE.to_string());
    let content = citation
        .content
        .filter(|s| !s.is_empty())
        .or(citation.data)
        .unwrap_or_default();

    Some(CitationRecord {
        source,
        content,
        document_name: citation.document_name,
        score: citation.score,
        dataset_id: citation.dataset_id,
        document_id: citation.document_id,
        segment_id: citation.segment_id,
        position: citation.position,
    })
}

/// `document name:content` plain text.
fn named_snippet(body: &str) -> Option<CitationRecord> {
    let caps = NAMED_SNIPPET.captures(body)?;
    let name = caps[1].trim();
    let content = caps[2].trim();
    Some(CitationRecord {
        source: name.to_string(),
        content: content.to_string(),
        document_name: Some(name.to_string()),
        score: Some(0.0),
        position: Some(0),
        ..CitationRecord::default()
    })
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn strips_complete_tag_in_one_fragment() {
        let mut parser = InlineCitationParser::new();
        let parsed = parser.process(
            r#"Leave is 20 days.<Citations>{"source":"hr.pdf","content":"20 days","segment_id":"s1"}</Citations> Done."#,
        );
        assert_eq!(parsed.text, "Leave is 20 days. Done.");
        assert_eq!(parsed.citations.len(), 1);
        assert_eq!(parsed.citations[0].source, "hr.pdf");
        assert_eq!(parsed.citations[0].segment_id.as_deref(), Some("s1"));
        assert!(!parser.is_holding());
    }

    #[test]
    fn holds_tag_split_across_fragments() {
        let mut parser = InlineCitationParser::new();

        let first = parser.process("Answer <Cit");
        assert_eq!(first.text, "Answer ");
        assert!(parser.is_holding());

        let second = parser.process(r#"ations id="1">{"content":"x","#);
        assert_eq!(second.text, "");

        let third = parser.process(r#""document_name":"d.pdf"}</Citations>tail"#);
        assert_eq!(third.text, "tail");
        assert_eq!(third.citations[0].source, "d.pdf");
        assert_eq!(third.citations[0].content, "x");
        assert!(!parser.is_holding());
    }

    #[test]
    fn lone_angle_bracket_that_cannot_start_a_tag_is_forwarded() {
        let mut parser = InlineCitationParser::new();
        assert_eq!(parser.process("a <b").text, "a <b");
        assert_eq!(parser.process("x <").text, "x ");
        assert_eq!(parser.process(" y").text, "< y");
    }

    #[test]
    fn flush_releases_unclosed_tag() {
        let mut parser = InlineCitationParser::new();
        assert_eq!(parser.process("text <Citations>{\"a\"").text, "text ");
        assert_eq!(parser.flush(), "<Citations>{\"a\"");
        assert_eq!(parser.flush(), "");
    }

    #[test]
    fn wrapped_success_body() {
        let record =
            parse_tag_body(r#"{"success":true,"data":"policy text","message":"Policy.docx"}"#)
                .unwrap();
        assert_eq!(record.source, WRAPPED_SOURCE);
        assert_eq!(record.content, "policy text");
        assert_eq!(record.document_name.as_deref(), Some("Policy.docx"));
        assert_eq!(record.score, Some(1.0));
        assert_eq!(record.position, Some(0));
    }

    #[test]
    fn wrapped_body_without_message_gets_default_document_name() {
        let record = parse_tag_body(r#"{"success":true,"data":"text"}"#).unwrap();
        assert_eq!(record.document_name.as_deref(), Some(WRAPPED_DOCUMENT));
    }

    #[test]
    fn failed_wrapper_falls_back_to_direct_shape() {
        let record = parse_tag_body(r#"{"success":false,"data":"raw"}"#).unwrap();
        assert_eq!(record.source, UNKNOWN_SOURCE);
        assert_eq!(record.content, "raw");
    }

    #[test]
    fn plain_text_name_and_content() {
        let record = parse_tag_body("Handbook: staff get 20 days").unwrap();
        assert_eq!(record.source, "Handbook");
        assert_eq!(record.content, "staff get 20 days");
        assert_eq!(record.score, Some(0.0));
    }

    #[test]
    fn unusable_bodies_are_dropped() {
        assert!(parse_tag_body("no separator here").is_none());
        assert!(parse_tag_body("[1,2,3]").is_none());
        assert!(parse_tag_body(r#""just a string""#).is_none());
        assert!(parse_tag_body(r#"{"position":"first"}"#).is_none());
    }

    #[test]
    fn unparseable_tag_is_still_removed_from_text() {
        let mut parser = InlineCitationParser::new();
        let parsed = parser.process("a<Citations>???</Citations>b");
        assert_eq!(parsed.text, "ab");
        assert!(parsed.citations.is_empty());
    }
}
