use chrono::Utc;
use libsql::{params, Connection};
use nanoid::nanoid;

use super::conversations::ConversationRepository;
use crate::error::{RelayError, Result};
use crate::models::{ChatRole, StoredMessage};

pub struct MessageRepository;

impl MessageRepository {
    pub async fn append(
        conn: &Connection,
        conversation_id: &str,
        role: ChatRole,
        content: &str,
    ) -> Result<StoredMessage> {
        let message = StoredMessage {
            id: nanoid!(),
            conversation_id: conversation_id.to_string(),
            role,
            content: content.to_string(),
            created_at: Utc::now(),
        };

        let tx = conn.transaction().await?;
        tx.execute(
            r#"
            INSERT INTO messages (id, conversation_id, role, content, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                message.id.clone(),
                conversation_id,
                role.as_str(),
                content,
                message.created_at.to_rfc3339(),
            ],
        )
        .await?;

        if !ConversationRepository::touch(&tx, conversation_id).await? {
            tx.rollback().await?;
            return Err(RelayError::NotFound(format!(
                "Conversation {conversation_id} not found"
            )));
        }
        tx.commit().await?;

        Ok(message)
    }

    pub async fn count_by_role(
        conn: &Connection,
        conversation_id: &str,
        role: ChatRole,
    ) -> Result<u32> {
        let mut rows = conn
            .query(
                "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1 AND role = ?2",
                params![conversation_id, role.as_str()],
            )
            .await?;
        let count = match rows.next().await? {
            Some(row) => row.get::<i64>(0)?,
            None => 0,
        };
        u32::try_from(count).map_err(|_| RelayError::Internal(format!("message count {count}")))
    }
}
