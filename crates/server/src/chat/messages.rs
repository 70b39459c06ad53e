//! Messages
//!
//! Sending a message also advances the conversation's `last_message_id`,
//! which drives list previews and activity ordering.

use crate::chat::conversations::{member_ids, membership};
use crate::core::db::{begin_write, now_millis};
use crate::core::error::{Error, Result};
use crate::core::feed::{ChangeFeed, Topic};
use crate::core::models::{Message, MessageKind, User};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

/// A message as rendered in a conversation view
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MessageView {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub message: Message,
    pub sender_name: String,
    pub sender_image: String,
    #[sqlx(skip)]
    pub is_current_user: bool,
}

pub struct MessageManager {
    pool: SqlitePool,
    feed: ChangeFeed,
}

impl MessageManager {
    pub fn new(pool: SqlitePool, feed: ChangeFeed) -> Self {
        Self { pool, feed }
    }

    pub async fn send(
        &self,
        user: &User,
        conversation_id: &str,
        kind: MessageKind,
        content: &str,
    ) -> Result<Message> {
        let content = match kind {
            MessageKind::Text => content.trim(),
            _ => content,
        };
        if content.is_empty() {
            return Err(Error::app("Message can't be empty"));
        }

        let mut tx = begin_write(&self.pool).await?;

        if membership(&mut *tx, &user.id, conversation_id).await?.is_none() {
            return Err(Error::app("You are not a member of this conversation"));
        }

        let message = Message {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            sender_id: user.id.clone(),
            kind,
            content: content.to_string(),
            created_at: now_millis(),
        };

        sqlx::query(
            "INSERT INTO messages (id, conversation_id, sender_id, kind, content, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&message.id)
        .bind(&message.conversation_id)
        .bind(&message.sender_id)
        .bind(message.kind)
        .bind(&message.content)
        .bind(message.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE conversations SET last_message_id = ? WHERE id = ?")
            .bind(&message.id)
            .bind(conversation_id)
            .execute(&mut *tx)
            .await?;

        let audience = member_ids(&mut *tx, conversation_id).await?;
        tx.commit().await?;

        info!(
            "[Messages] {} sent {:?} message to {}",
            user.id, message.kind, conversation_id
        );
        self.feed.publish(
            audience.clone(),
            Topic::Messages(conversation_id.to_string()),
        );
        self.feed.publish(audience, Topic::Conversations);

        Ok(message)
    }

    /// Messages in a conversation, newest first
    pub async fn list(&self, user: &User, conversation_id: &str) -> Result<Vec<MessageView>> {
        if membership(&self.pool, &user.id, conversation_id)
            .await?
            .is_none()
        {
            return Err(Error::app("You are not a member of this conversation"));
        }

        let mut views = sqlx::query_as::<_, MessageView>(
            r#"
            SELECT m.id, m.conversation_id, m.sender_id, m.kind, m.content, m.created_at,
                   u.username AS sender_name, u.image_url AS sender_image
            FROM messages m
            JOIN users u ON u.id = m.sender_id
            WHERE m.conversation_id = ?
            ORDER BY m.created_at DESC, m.rowid DESC
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        for view in &mut views {
            view.is_current_user = view.message.sender_id == user.id;
        }

        Ok(views)
    }
}
