use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ChatRole, Conversation, NewConversation};

/// Conversation and transcript persistence used by the chat relay.
///
/// Every call is a fallible remote operation from the relay's point of view.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create_conversation(&self, new: &NewConversation) -> Result<Conversation>;
    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>>;
    async fn is_owned_by_user(&self, conversation_id: &str, user_id: &str) -> Result<bool>;

    /// Appends a message and returns its id.
    async fn append_message(
        &self,
        conversation_id: &str,
        role: ChatRole,
        content: &str,
    ) -> Result<String>;

    async fn count_messages(&self, conversation_id: &str, role: ChatRole) -> Result<u32>;

    async fn set_upstream_conversation_id(
        &self,
        conversation_id: &str,
        upstream_id: &str,
    ) -> Result<()>;
}

/// A complete database backend: the conversation store plus lifecycle
/// operations.
#[async_trait]
pub trait DatabaseBackend: ConversationStore {
    /// Sync with remote (e.g. Turso replication). No-op for local-only backends.
    async fn sync(&self) -> Result<()>;

    async fn ping(&self) -> Result<()>;
}
