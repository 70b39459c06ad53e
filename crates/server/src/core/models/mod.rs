//! Stored records
//!
//! Row types map one-to-one onto the tables created in [`crate::core::db`].
//! Timestamps are Unix milliseconds.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Local profile of an identity-provider user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: String,
    /// The identity provider's user id
    pub external_id: String,
    pub username: String,
    pub image_url: String,
    pub email: String,
    pub created_at: i64,
}

/// Pending friend request. Accepting or denying deletes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct FriendRequest {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub created_at: i64,
}

/// Established friendship. The pair is unordered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Friend {
    pub id: String,
    pub user1: String,
    pub user2: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Conversation {
    pub id: String,
    pub is_group: bool,
    pub name: Option<String>,
    pub last_message_id: Option<String>,
    pub created_at: i64,
}

/// Links a user to a conversation and carries their read position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ConversationMember {
    pub id: String,
    pub conversation_id: String,
    pub member_id: String,
    pub last_seen_message_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Image,
    File,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub kind: MessageKind,
    pub content: String,
    pub created_at: i64,
}

impl Message {
    /// One-line preview for conversation lists.
    pub fn preview(&self) -> String {
        match self.kind {
            MessageKind::Text => self.content.clone(),
            _ => "[Non-text]".to_string(),
        }
    }
}
