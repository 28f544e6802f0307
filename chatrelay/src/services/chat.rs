use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;

use crate::citations::{CitationCache, MessageKey, WriteOutcome};
use crate::config::RelayConfig;
use crate::db::ConversationStore;
use crate::error::{RelayError, Result};
use crate::models::{conversation_title, ChatRole, Conversation, NewConversation};
use crate::relay::{DownstreamFrame, RelayOutcome, StreamRelay};
use crate::upstream::{ChatUpstream, UpstreamRequest};

/// Inbound chat turn as received from the client.
#[derive(Debug, Clone, Default)]
pub struct ChatTurnRequest {
    pub user_id: String,
    pub message: String,
    pub conversation_id: Option<String>,
    pub knowledge_base_id: Option<String>,
    pub model_id: Option<String>,
}

/// A started turn. Frames arrive on `frames` while `task` drives the relay.
pub struct ChatTurn {
    pub conversation_id: String,
    pub frames: mpsc::Receiver<DownstreamFrame>,
    /// Completes once the reply is persisted. Dropping it leaves the turn
    /// running under the controller's tracker.
    pub task: JoinHandle<Result<RelayOutcome>>,
}

/// Orchestrates one chat request from validation to the cached citations.
#[derive(Clone)]
pub struct ChatTurnController {
    store: Arc<dyn ConversationStore>,
    upstream: Arc<dyn ChatUpstream>,
    citations: Arc<CitationCache>,
    relay: StreamRelay,
    channel_capacity: usize,
    turns: TaskTracker,
}

impl ChatTurnController {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        upstream: Arc<dyn ChatUpstream>,
        citations: Arc<CitationCache>,
        config: &RelayConfig,
    ) -> Self {
        Self {
            relay: StreamRelay::new(store.clone(), config),
            store,
            upstream,
            citations,
            channel_capacity: config.channel_capacity.max(1),
            turns: TaskTracker::new(),
        }
    }

    /// Closes the turn tracker and waits for every in-flight turn to persist
    /// its reply.
    pub async fn drain(&self) {
        self.turns.close();
        if !self.turns.is_empty() {
            tracing::info!(in_flight = self.turns.len(), "Waiting for in-flight chat turns...");
        }
        self.turns.wait().await;
    }

    /// Validates the request, resolves the conversation and stores the user
    /// message, then relays the upstream answer on a background task.
    ///
    /// Errors returned here happen before any frame is produced.
    pub async fn start(&self, request: ChatTurnRequest) -> Result<ChatTurn> {
        if request.message.trim().is_empty() {
            return Err(RelayError::Validation("Message cannot be empty".to_string()));
        }
        if request.user_id.trim().is_empty() {
            return Err(RelayError::Validation("User id cannot be empty".to_string()));
        }

        let conversation = self.resolve_conversation(&request).await?;
        let knowledge_base_id = non_empty(request.knowledge_base_id)
            .or_else(|| conversation.knowledge_base_id.clone());
        let model_id = non_empty(request.model_id).or_else(|| conversation.model_id.clone());

        self.store
            .append_message(&conversation.id, ChatRole::User, &request.message)
            .await?;

        tracing::info!(
            conversation_id = %conversation.id,
            knowledge_base = knowledge_base_id.as_deref().unwrap_or("default"),
            continuing = conversation.upstream_conversation_id.is_some(),
            "Starting chat turn"
        );

        let upstream_request = UpstreamRequest {
            query: request.message,
            user: request.user_id,
            knowledge_base_id,
            model_id,
            conversation_id: conversation.upstream_conversation_id.clone(),
        };

        let (tx, frames) = mpsc::channel(self.channel_capacity);
        let controller = self.clone();
        let conversation_id = conversation.id.clone();
        let task = self.turns.spawn(async move {
            controller
                .run_turn(conversation, upstream_request, tx)
                .await
        });

        Ok(ChatTurn {
            conversation_id,
            frames,
            task,
        })
    }

    async fn resolve_conversation(&self, request: &ChatTurnRequest) -> Result<Conversation> {
        let Some(id) = request.conversation_id.as_deref().filter(|id| !id.is_empty()) else {
            return self
                .store
                .create_conversation(&NewConversation {
                    user_id: request.user_id.clone(),
                    title: conversation_title(&request.message),
                    knowledge_base_id: non_empty(request.knowledge_base_id.clone()),
                    model_id: non_empty(request.model_id.clone()),
                })
                .await;
        };

        let not_found = || RelayError::NotFound(format!("Conversation {id} not found"));
        if !self.store.is_owned_by_user(id, &request.user_id).await? {
            return Err(not_found());
        }
        self.store.get_conversation(id).await?.ok_or_else(not_found)
    }

    async fn run_turn(
        self,
        conversation: Conversation,
        request: UpstreamRequest,
        tx: mpsc::Sender<DownstreamFrame>,
    ) -> Result<RelayOutcome> {
        let downstream = self.relay.downstream(tx);
        let relayed = match self.upstream.open_stream(request).await {
            Ok(stream) => self.relay.relay(&conversation.id, stream, downstream).await,
            Err(e) => {
                tracing::warn!(conversation_id = %conversation.id, error = %e, "Failed to open upstream stream");
                self.relay
                    .relay_failure(&conversation.id, &e.to_string(), downstream)
                    .await
            }
        };

        let outcome = match relayed {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(conversation_id = %conversation.id, error = %e, "Chat turn failed");
                return Err(e);
            }
        };

        if outcome.is_completed() {
            self.record_upstream_session(&conversation, outcome.upstream_conversation_id.as_deref())
                .await;
            if !outcome.citations.is_empty() {
                self.cache_citations(&conversation.id, &outcome).await;
            }
        }

        Ok(outcome)
    }

    async fn record_upstream_session(&self, conversation: &Conversation, seen: Option<&str>) {
        let Some(seen) = seen else {
            return;
        };
        if conversation.upstream_conversation_id.as_deref() == Some(seen) {
            return;
        }
        if let Err(e) = self
            .store
            .set_upstream_conversation_id(&conversation.id, seen)
            .await
        {
            tracing::warn!(conversation_id = %conversation.id, error = %e, "Failed to record upstream conversation id");
        }
    }

    async fn cache_citations(&self, conversation_id: &str, outcome: &RelayOutcome) {
        let ordinal = match self
            .store
            .count_messages(conversation_id, ChatRole::Assistant)
            .await
        {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(conversation_id, error = %e, "Could not resolve assistant ordinal, citations not cached");
                return;
            }
        };

        match self
            .citations
            .write(conversation_id, MessageKey::assistant(ordinal), &outcome.citations)
        {
            Ok(WriteOutcome::Cleared) => {
                tracing::warn!(conversation_id, ordinal, "Citations exceed the cache budget on their own, slot cleared")
            }
            Ok(result) => tracing::debug!(conversation_id, ordinal, ?result, "Citations cached"),
            Err(e) => tracing::warn!(conversation_id, error = %e, "Failed to cache citations"),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
