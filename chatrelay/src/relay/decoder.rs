use crate::models::{dedupe_citations, CitationRecord};

use super::event::{FragmentKind, StreamEvent, UpstreamEventKind, UpstreamPayload};
use super::inline::InlineCitationParser;
use super::sse::{parse_line, LineDecoder, SseLine};

/// Turns raw upstream bytes into [`StreamEvent`]s for one turn.
///
/// Content is emitted as soon as it arrives. Citations, whether from
/// `retriever_resources` or inline tags, are buffered and emitted once as a
/// single deduplicated batch right before [`StreamEvent::Terminal`]. After a
/// terminal or error event, further input is ignored.
#[derive(Debug, Default)]
pub struct UpstreamDecoder {
    lines: LineDecoder,
    inline: InlineCitationParser,
    resources: Vec<CitationRecord>,
    inline_citations: Vec<CitationRecord>,
    last_kind: FragmentKind,
    upstream_conversation_id: Option<String>,
    malformed_lines: usize,
    finished: bool,
}

impl UpstreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoder whose upstream lines may be at most `max_line_bytes` long.
    pub fn with_max_line_bytes(max_line_bytes: usize) -> Self {
        Self {
            lines: LineDecoder::with_max_line_bytes(max_line_bytes),
            ..Self::default()
        }
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        for line in self.lines.push(chunk) {
            if self.finished {
                break;
            }
            self.handle_line(&line, &mut events);
        }
        events
    }

    /// Processes an unterminated final line left when the byte stream closes.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if let Some(line) = self.lines.finish() {
            if !self.finished {
                self.handle_line(&line, &mut events);
            }
        }
        events
    }

    /// First non-empty upstream session id seen on this stream.
    pub fn upstream_conversation_id(&self) -> Option<&str> {
        self.upstream_conversation_id.as_deref()
    }

    /// Undecodable lines plus lines dropped for exceeding the length cap.
    pub fn malformed_lines(&self) -> usize {
        self.malformed_lines + self.lines.oversized_lines()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn handle_line(&mut self, line: &str, events: &mut Vec<StreamEvent>) {
        match parse_line(line) {
            Ok(None) => {}
            Ok(Some(SseLine::Done)) => self.terminate(events),
            Ok(Some(SseLine::Payload(payload))) => self.handle_payload(*payload, events),
            Err(e) => {
                self.malformed_lines += 1;
                tracing::warn!(error = %e, line_len = line.len(), "Dropping malformed upstream line");
            }
        }
    }

    fn handle_payload(&mut self, mut payload: UpstreamPayload, events: &mut Vec<StreamEvent>) {
        if self.upstream_conversation_id.is_none() {
            if let Some(id) = payload.conversation_id.take().filter(|id| !id.is_empty()) {
                self.upstream_conversation_id = Some(id);
            }
        }

        match payload.kind() {
            kind @ (UpstreamEventKind::Message | UpstreamEventKind::AgentMessage) => {
                let kind = if kind == UpstreamEventKind::AgentMessage {
                    FragmentKind::AgentMessage
                } else {
                    FragmentKind::Message
                };
                self.last_kind = kind;

                let (records, extra) = payload.take_metadata();
                self.resources.extend(records);
                let metadata = (!extra.is_empty()).then_some(extra);
                if let Some(answer) = payload.answer.as_deref().filter(|a| !a.is_empty()) {
                    let parsed = self.inline.process(answer);
                    self.inline_citations.extend(parsed.citations);
                    if !parsed.text.is_empty() {
                        events.push(StreamEvent::ContentDelta {
                            text: parsed.text,
                            kind,
                            metadata,
                        });
                    }
                }
            }
            UpstreamEventKind::MessageEnd => {
                let (records, extra) = payload.take_metadata();
                self.resources.extend(records);
                if !extra.is_empty() {
                    events.push(StreamEvent::EndMetadata { metadata: extra });
                }
                self.terminate(events);
            }
            UpstreamEventKind::Error => {
                self.finished = true;
                events.push(StreamEvent::Error {
                    message: payload.error_detail(),
                });
            }
            UpstreamEventKind::Other => {
                tracing::trace!(event = %payload.event, "Ignoring upstream event");
            }
        }
    }

    fn terminate(&mut self, events: &mut Vec<StreamEvent>) {
        let held = self.inline.flush();
        if !held.is_empty() {
            events.push(StreamEvent::ContentDelta {
                text: held,
                kind: self.last_kind,
                metadata: None,
            });
        }

        let mut citations = std::mem::take(&mut self.resources);
        citations.append(&mut self.inline_citations);
        let citations = dedupe_citations(citations);
        if !citations.is_empty() {
            events.push(StreamEvent::CitationBatch { records: citations });
        }

        events.push(StreamEvent::Terminal);
        self.finished = true;
    }
}
