use chrono::{DateTime, Utc};
use libsql::{params, Connection};
use nanoid::nanoid;

use crate::error::Result;
use crate::models::{Conversation, NewConversation};

pub struct ConversationRepository;

impl ConversationRepository {
    pub async fn create(conn: &Connection, new: &NewConversation) -> Result<Conversation> {
        let now = Utc::now();
        let conversation = Conversation {
            id: nanoid!(),
            user_id: new.user_id.clone(),
            title: new.title.clone(),
            knowledge_base_id: new.knowledge_base_id.clone(),
            model_id: new.model_id.clone(),
            upstream_conversation_id: None,
            created_at: now,
            updated_at: now,
        };

        conn.execute(
            r#"
            INSERT INTO conversations (
                id, user_id, title, knowledge_base_id, model_id,
                upstream_conversation_id, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, ?6)
            "#,
            params![
                conversation.id.clone(),
                conversation.user_id.clone(),
                conversation.title.clone(),
                conversation.knowledge_base_id.clone(),
                conversation.model_id.clone(),
                now.to_rfc3339(),
            ],
        )
        .await?;

        Ok(conversation)
    }

    pub async fn get_by_id(conn: &Connection, id: &str) -> Result<Option<Conversation>> {
        let mut rows = conn
            .query(
                r#"
                SELECT id, user_id, title, knowledge_base_id, model_id,
                       upstream_conversation_id, created_at, updated_at
                FROM conversations
                WHERE id = ?1
                "#,
                params![id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::row_to_conversation(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn is_owned_by(conn: &Connection, id: &str, user_id: &str) -> Result<bool> {
        let mut rows = conn
            .query(
                "SELECT 1 FROM conversations WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
            )
            .await?;
        Ok(rows.next().await?.is_some())
    }

    /// Returns false when the conversation does not exist.
    pub async fn set_upstream_id(conn: &Connection, id: &str, upstream_id: &str) -> Result<bool> {
        let affected = conn
            .execute(
                r#"
                UPDATE conversations
                SET upstream_conversation_id = ?2, updated_at = ?3
                WHERE id = ?1
                "#,
                params![id, upstream_id, Utc::now().to_rfc3339()],
            )
            .await?;
        Ok(affected > 0)
    }

    /// Returns false when the conversation does not exist.
    pub async fn touch(conn: &Connection, id: &str) -> Result<bool> {
        let affected = conn
            .execute(
                "UPDATE conversations SET updated_at = ?2 WHERE id = ?1",
                params![id, Utc::now().to_rfc3339()],
            )
            .await?;
        Ok(affected > 0)
    }

    fn row_to_conversation(row: &libsql::Row) -> Result<Conversation> {
        Ok(Conversation {
            id: row.get(0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            knowledge_base_id: row.get(3)?,
            model_id: row.get(4)?,
            upstream_conversation_id: row.get(5)?,
            created_at: parse_timestamp(&row.get::<String>(6)?),
            updated_at: parse_timestamp(&row.get::<String>(7)?),
        })
    }
}

pub(crate) fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
