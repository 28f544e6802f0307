use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde_json::{Map, Value};
use tokio::sync::mpsc::{self, error::SendTimeoutError};

use crate::config::RelayConfig;
use crate::db::ConversationStore;
use crate::error::{RelayError, Result};
use crate::models::{ChatRole, CitationRecord};

use super::decoder::UpstreamDecoder;
use super::event::StreamEvent;
use super::frame::DownstreamFrame;

/// Assistant reply persisted and shown when a turn fails.
pub fn fallback_message(detail: &str) -> String {
    format!("An error occurred while processing your request: {detail}. Please try again later.")
}

/// Client-facing side of a turn.
///
/// Once a send fails or times out the client is considered gone and later
/// frames are discarded, while the relay keeps draining upstream.
pub struct Downstream {
    tx: mpsc::Sender<DownstreamFrame>,
    send_timeout: Duration,
    closed: bool,
}

impl Downstream {
    pub fn new(tx: mpsc::Sender<DownstreamFrame>, send_timeout: Duration) -> Self {
        Self {
            tx,
            send_timeout,
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub async fn send(&mut self, frame: DownstreamFrame) {
        if self.closed {
            return;
        }
        match self.tx.send_timeout(frame, self.send_timeout).await {
            Ok(()) => {}
            Err(SendTimeoutError::Closed(_)) => {
                self.closed = true;
                tracing::info!("Client disconnected, draining upstream to finish the turn");
            }
            Err(SendTimeoutError::Timeout(_)) => {
                self.closed = true;
                tracing::warn!(
                    timeout_ms = self.send_timeout.as_millis() as u64,
                    "Client stopped reading, draining upstream to finish the turn"
                );
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnStatus {
    Completed,
    /// Upstream failed; the fallback reply was persisted instead.
    Failed { reason: String },
}

/// What one relayed turn produced.
#[derive(Debug, Clone)]
pub struct RelayOutcome {
    pub message_id: String,
    /// Persisted assistant content: the streamed answer, or the fallback.
    pub content: String,
    /// Empty on failure.
    pub citations: Vec<CitationRecord>,
    pub upstream_conversation_id: Option<String>,
    pub status: TurnStatus,
    pub client_disconnected: bool,
}

impl RelayOutcome {
    pub fn is_completed(&self) -> bool {
        self.status == TurnStatus::Completed
    }
}

enum Ending {
    Terminal,
    Failed(String),
}

#[derive(Default)]
struct TurnState {
    answer: String,
    citations: Vec<CitationRecord>,
    end_metadata: Map<String, Value>,
}

/// Proxies one upstream answer stream to the client and persists the reply.
///
/// Every turn ends with exactly one assistant message appended to the
/// [`ConversationStore`]: the concatenated answer on a clean terminal, the
/// [`fallback_message`] otherwise.
#[derive(Clone)]
pub struct StreamRelay {
    store: Arc<dyn ConversationStore>,
    send_timeout: Duration,
}

impl StreamRelay {
    pub fn new(store: Arc<dyn ConversationStore>, config: &RelayConfig) -> Self {
        Self {
            store,
            send_timeout: Duration::from_millis(config.send_timeout_ms),
        }
    }

    pub fn downstream(&self, tx: mpsc::Sender<DownstreamFrame>) -> Downstream {
        Downstream::new(tx, self.send_timeout)
    }

    pub async fn relay<S, E>(
        &self,
        conversation_id: &str,
        upstream: S,
        mut downstream: Downstream,
    ) -> Result<RelayOutcome>
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Send,
        E: Display + Send,
    {
        let mut upstream = Box::pin(upstream);
        let mut decoder = UpstreamDecoder::new();
        let mut state = TurnState::default();

        let ending = loop {
            let (events, closed) = match upstream.next().await {
                Some(Ok(chunk)) => (decoder.push(&chunk), false),
                Some(Err(e)) => break Ending::Failed(format!("upstream stream failed: {e}")),
                None => (decoder.finish(), true),
            };
            if let Some(ending) = forward(events, &mut state, &mut downstream).await {
                break ending;
            }
            if closed {
                break Ending::Failed(
                    "upstream closed the stream before the answer completed".to_string(),
                );
            }
        };
        drop(upstream);

        if decoder.malformed_lines() > 0 {
            tracing::warn!(
                conversation_id,
                malformed = decoder.malformed_lines(),
                "Upstream stream contained undecodable lines"
            );
        }

        let upstream_conversation_id = decoder.upstream_conversation_id().map(str::to_string);
        self.finish(conversation_id, ending, state, upstream_conversation_id, downstream)
            .await
    }

    /// Ends a turn whose upstream request could not even be opened.
    pub async fn relay_failure(
        &self,
        conversation_id: &str,
        reason: &str,
        downstream: Downstream,
    ) -> Result<RelayOutcome> {
        self.finish(
            conversation_id,
            Ending::Failed(reason.to_string()),
            TurnState::default(),
            None,
            downstream,
        )
        .await
    }

    async fn finish(
        &self,
        conversation_id: &str,
        ending: Ending,
        state: TurnState,
        upstream_conversation_id: Option<String>,
        mut downstream: Downstream,
    ) -> Result<RelayOutcome> {
        let (content, citations, status) = match ending {
            Ending::Terminal => {
                downstream
                    .send(DownstreamFrame::message_end_with(
                        state.citations.clone(),
                        state.end_metadata,
                    ))
                    .await;
                (state.answer, state.citations, TurnStatus::Completed)
            }
            Ending::Failed(reason) => {
                tracing::warn!(conversation_id, reason = %reason, "Chat turn failed, using fallback reply");
                let fallback = fallback_message(&reason);
                downstream.send(DownstreamFrame::error(fallback.clone())).await;
                downstream.send(DownstreamFrame::message(fallback.clone())).await;
                (fallback, Vec::new(), TurnStatus::Failed { reason })
            }
        };

        let persisted = self
            .store
            .append_message(conversation_id, ChatRole::Assistant, &content)
            .await;

        let message_id = match persisted {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(conversation_id, error = %e, "Failed to persist assistant reply");
                downstream
                    .send(DownstreamFrame::error("The reply could not be saved."))
                    .await;
                downstream.send(DownstreamFrame::Done).await;
                return Err(RelayError::Persistence(e.to_string()));
            }
        };
        downstream.send(DownstreamFrame::Done).await;

        tracing::info!(
            conversation_id,
            message_id = %message_id,
            content_len = content.len(),
            citations = citations.len(),
            completed = matches!(status, TurnStatus::Completed),
            "Chat turn persisted"
        );

        Ok(RelayOutcome {
            message_id,
            content,
            citations,
            upstream_conversation_id,
            status,
            client_disconnected: downstream.is_closed(),
        })
    }
}

/// Applies decoded events in order. Returns how the turn ended, if it did.
async fn forward(
    events: Vec<StreamEvent>,
    state: &mut TurnState,
    downstream: &mut Downstream,
) -> Option<Ending> {
    for event in events {
        match event {
            StreamEvent::ContentDelta {
                text,
                kind,
                metadata,
            } => {
                state.answer.push_str(&text);
                downstream
                    .send(DownstreamFrame::fragment(kind, text, metadata))
                    .await;
            }
            StreamEvent::CitationBatch { records } => state.citations = records,
            StreamEvent::EndMetadata { metadata } => state.end_metadata = metadata,
            StreamEvent::Terminal => return Some(Ending::Terminal),
            StreamEvent::Error { message } => return Some(Ending::Failed(message)),
        }
    }
    None
}
