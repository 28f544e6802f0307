use async_trait::async_trait;

use crate::db::connection::Database;
use crate::db::repository::{ConversationRepository, MessageRepository};
use crate::db::traits::{ConversationStore, DatabaseBackend};
use crate::error::{RelayError, Result};
use crate::models::{ChatRole, Conversation, NewConversation};

pub struct LibSqlBackend {
    db: Database,
}

impl LibSqlBackend {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ConversationStore for LibSqlBackend {
    async fn create_conversation(&self, new: &NewConversation) -> Result<Conversation> {
        let conn = self.db.connect().await?;
        ConversationRepository::create(&conn, new).await
    }

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        let conn = self.db.connect().await?;
        ConversationRepository::get_by_id(&conn, id).await
    }

    async fn is_owned_by_user(&self, conversation_id: &str, user_id: &str) -> Result<bool> {
        let conn = self.db.connect().await?;
        ConversationRepository::is_owned_by(&conn, conversation_id, user_id).await
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        role: ChatRole,
        content: &str,
    ) -> Result<String> {
        let conn = self.db.connect().await?;
        let message = MessageRepository::append(&conn, conversation_id, role, content).await?;
        Ok(message.id)
    }

    async fn count_messages(&self, conversation_id: &str, role: ChatRole) -> Result<u32> {
        let conn = self.db.connect().await?;
        MessageRepository::count_by_role(&conn, conversation_id, role).await
    }

    async fn set_upstream_conversation_id(
        &self,
        conversation_id: &str,
        upstream_id: &str,
    ) -> Result<()> {
        let conn = self.db.connect().await?;
        if ConversationRepository::set_upstream_id(&conn, conversation_id, upstream_id).await? {
            Ok(())
        } else {
            Err(RelayError::NotFound(format!(
                "Conversation {conversation_id} not found"
            )))
        }
    }
}

#[async_trait]
impl DatabaseBackend for LibSqlBackend {
    async fn sync(&self) -> Result<()> {
        self.db.sync().await
    }

    async fn ping(&self) -> Result<()> {
        self.db.ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use tempfile::TempDir;

    async fn backend() -> (LibSqlBackend, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("file:{}", dir.path().join("store.db").display());
        let db = Database::new(&DatabaseConfig::local(url)).await.unwrap();
        (LibSqlBackend::new(db), dir)
    }

    #[tokio::test]
    async fn full_turn_bookkeeping() {
        let (store, _dir) = backend().await;
        let conversation = store
            .create_conversation(&NewConversation {
                user_id: "u1".to_string(),
                title: "Title".to_string(),
                knowledge_base_id: None,
                model_id: Some("gpt".to_string()),
            })
            .await
            .unwrap();

        assert!(store.is_owned_by_user(&conversation.id, "u1").await.unwrap());
        store
            .append_message(&conversation.id, ChatRole::User, "q")
            .await
            .unwrap();
        let id = store
            .append_message(&conversation.id, ChatRole::Assistant, "a")
            .await
            .unwrap();
        assert!(!id.is_empty());
        assert_eq!(
            store
                .count_messages(&conversation.id, ChatRole::Assistant)
                .await
                .unwrap(),
            1
        );

        store
            .set_upstream_conversation_id(&conversation.id, "up-9")
            .await
            .unwrap();
        assert_eq!(
            store
                .get_conversation(&conversation.id)
                .await
                .unwrap()
                .unwrap()
                .upstream_conversation_id
                .as_deref(),
            Some("up-9")
        );
        store.ping().await.unwrap();
    }

    #[tokio::test]
    async fn setting_upstream_id_on_unknown_conversation_is_not_found() {
        let (store, _dir) = backend().await;
        let err = store
            .set_upstream_conversation_id("missing", "up")
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::NotFound(_)));
    }
}
