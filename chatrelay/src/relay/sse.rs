//! Line framing for the upstream `text/event-stream` body.

use crate::error::{RelayError, Result};

use super::event::UpstreamPayload;

const DATA_PREFIX: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

/// Longest upstream line accepted before it is dropped as malformed.
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// Splits a chunked byte stream into complete lines.
///
/// Bytes after the last `\n` are carried over to the next [`push`](Self::push).
/// Splitting happens on raw bytes, so a multi-byte character cut across two
/// chunks is reassembled before decoding. A line longer than the cap is
/// discarded up to its newline and counted in [`oversized_lines`](Self::oversized_lines).
#[derive(Debug)]
pub struct LineDecoder {
    carry: Vec<u8>,
    max_line_bytes: usize,
    /// Skipping the rest of an oversized line.
    discarding: bool,
    oversized: usize,
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::with_max_line_bytes(DEFAULT_MAX_LINE_BYTES)
    }
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line_bytes(max_line_bytes: usize) -> Self {
        Self {
            carry: Vec::new(),
            max_line_bytes,
            discarding: false,
            oversized: 0,
        }
    }

    pub fn oversized_lines(&self) -> usize {
        self.oversized
    }

    pub fn push(&mut self, mut chunk: &[u8]) -> Vec<String> {
        if self.discarding {
            match chunk.iter().position(|b| *b == b'\n') {
                Some(newline) => {
                    self.discarding = false;
                    chunk = &chunk[newline + 1..];
                }
                None => return Vec::new(),
            }
        }

        self.carry.extend_from_slice(chunk);
        let lines = match self.carry.iter().rposition(|b| *b == b'\n') {
            Some(last_newline) => {
                let rest = self.carry.split_off(last_newline + 1);
                let mut complete = std::mem::replace(&mut self.carry, rest);
                complete.pop();
                complete
                    .split(|b| *b == b'\n')
                    .filter(|line| self.accept(line.len()))
                    .map(decode_line)
                    .collect()
            }
            None => Vec::new(),
        };

        if self.carry.len() > self.max_line_bytes {
            self.carry.clear();
            self.discarding = true;
            self.reject(self.max_line_bytes + 1);
        }
        lines
    }

    /// Returns the unterminated tail, if any, and empties the buffer.
    pub fn finish(&mut self) -> Option<String> {
        if self.carry.is_empty() {
            return None;
        }
        let tail = std::mem::take(&mut self.carry);
        Some(decode_line(&tail))
    }

    fn accept(&mut self, len: usize) -> bool {
        if len <= self.max_line_bytes {
            return true;
        }
        self.reject(len);
        false
    }

    fn reject(&mut self, len: usize) {
        self.oversized += 1;
        tracing::warn!(
            line_len = len,
            max_line_bytes = self.max_line_bytes,
            "Dropping oversized upstream line"
        );
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

/// One meaningful upstream line.
#[derive(Debug)]
pub enum SseLine {
    Payload(Box<UpstreamPayload>),
    /// The `[DONE]` sentinel.
    Done,
}

/// Classifies one line. Blank lines, `:` comments and non-data fields
/// (`event:`, `id:`, `retry:`) yield `Ok(None)`; a data line whose body is
/// not a valid payload is an [`RelayError::UpstreamProtocol`] error.
pub fn parse_line(line: &str) -> Result<Option<SseLine>> {
    if line.trim().is_empty() || line.starts_with(':') {
        return Ok(None);
    }
    let Some(data) = line.strip_prefix(DATA_PREFIX) else {
        return Ok(None);
    };

    let data = data.strip_prefix(' ').unwrap_or(data);
    if data.trim() == DONE_SENTINEL {
        return Ok(Some(SseLine::Done));
    }

    serde_json::from_str::<UpstreamPayload>(data)
        .map(|payload| Some(SseLine::Payload(Box::new(payload))))
        .map_err(|e| RelayError::UpstreamProtocol(format!("undecodable data line: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_partial_line_until_newline_arrives() {
        let mut decoder = LineDecoder::new();
        assert!(decoder.push(b"data: {\"event\":").is_empty());
        let lines = decoder.push(b"\"message\"}\r\n\ndata: tail");
        assert_eq!(lines, vec![r#"data: {"event":"message"}"#.to_string(), String::new()]);
        assert_eq!(decoder.finish().as_deref(), Some("data: tail"));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn reassembles_multibyte_characters_split_across_chunks() {
        let text = "data: 年假\n".as_bytes();
        let mut decoder = LineDecoder::new();
        assert!(decoder.push(&text[..8]).is_empty());
        assert_eq!(decoder.push(&text[8..]), vec!["data: 年假".to_string()]);
    }

    #[test]
    fn oversized_lines_are_dropped_and_counted() {
        let mut decoder = LineDecoder::with_max_line_bytes(8);

        // Complete in one chunk.
        assert_eq!(
            decoder.push(b"data: 0123456789\nshort\n"),
            vec!["short".to_string()]
        );
        assert_eq!(decoder.oversized_lines(), 1);

        // Grows past the cap across chunks before its newline arrives.
        assert!(decoder.push(b"data: 01").is_empty());
        assert!(decoder.push(b"23456789").is_empty());
        assert!(decoder.push(b"abcdef").is_empty());
        assert_eq!(decoder.push(b"xyz\nok\n"), vec!["ok".to_string()]);
        assert_eq!(decoder.oversized_lines(), 2);
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn ignores_blank_comment_and_non_data_lines() {
        for line in ["", "   ", ": ping", "event: message", "id: 7"] {
            assert!(parse_line(line).unwrap().is_none(), "{line:?}");
        }
    }

    #[test]
    fn recognises_done_sentinel_with_or_without_space() {
        assert!(matches!(parse_line("data: [DONE]"), Ok(Some(SseLine::Done))));
        assert!(matches!(parse_line("data:[DONE]"), Ok(Some(SseLine::Done))));
    }

    #[test]
    fn decodes_payload_lines() {
        let line = r#"data: {"event":"message","answer":"Hi","conversation_id":"up-1"}"#;
        let Some(SseLine::Payload(payload)) = parse_line(line).unwrap() else {
            panic!("expected a payload");
        };
        assert_eq!(payload.event, "message");
        assert_eq!(payload.answer.as_deref(), Some("Hi"));
        assert_eq!(payload.conversation_id.as_deref(), Some("up-1"));
    }

    #[test]
    fn malformed_data_line_is_a_protocol_error() {
        let err = parse_line("data: {not json").unwrap_err();
        assert!(matches!(err, RelayError::UpstreamProtocol(_)));
    }
}
