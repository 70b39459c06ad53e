//! Conversation listing, direct messages and group creation
//!
//! `ConversationManager` owns every write to `conversations` and
//! `conversation_members`. Single-conversation operations live in
//! [`crate::chat::conversation`].

use crate::chat::friends::friendship;
use crate::core::db::{begin_write, now_millis};
use crate::core::error::{Error, Result};
use crate::core::feed::{ChangeFeed, Topic};
use crate::core::models::{Conversation, ConversationMember, Message, User};
use serde::Serialize;
use sqlx::{Executor, Sqlite, SqlitePool};
use std::collections::BTreeSet;
use tracing::info;
use uuid::Uuid;

/// Preview of the newest message in a conversation
#[derive(Debug, Clone, Serialize)]
pub struct LastMessage {
    pub content: String,
    pub sender: String,
    pub created_at: i64,
}

/// One row of the caller's conversation list
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub conversation: Conversation,
    /// The peer, for direct messages only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub other_member: Option<User>,
    pub last_message: Option<LastMessage>,
    pub unseen_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DmStart {
    pub conversation_id: String,
    pub created: bool,
}

pub struct ConversationManager {
    pub(crate) pool: SqlitePool,
    pub(crate) feed: ChangeFeed,
}

impl ConversationManager {
    pub fn new(pool: SqlitePool, feed: ChangeFeed) -> Self {
        Self { pool, feed }
    }

    /// Every conversation the user belongs to, most recently active first
    pub async fn list(&self, user: &User) -> Result<Vec<ConversationSummary>> {
        let memberships = sqlx::query_as::<_, ConversationMember>(
            "SELECT id, conversation_id, member_id, last_seen_message_id
             FROM conversation_members WHERE member_id = ?",
        )
        .bind(&user.id)
        .fetch_all(&self.pool)
        .await?;

        let mut summaries = Vec::with_capacity(memberships.len());
        for membership in memberships {
            let conversation = get_conversation(&self.pool, &membership.conversation_id)
                .await?
                .ok_or_else(|| Error::NotFound {
                    entity: "Conversation",
                    id: membership.conversation_id.clone(),
                })?;

            let last_message = match &conversation.last_message_id {
                Some(id) => last_message_details(&self.pool, id).await?,
                None => None,
            };

            let unseen_count = unseen_count(
                &self.pool,
                &conversation.id,
                &user.id,
                membership.last_seen_message_id.as_deref(),
            )
            .await?;

            let other_member = if conversation.is_group {
                None
            } else {
                other_members(&self.pool, &conversation.id, &user.id)
                    .await?
                    .into_iter()
                    .next()
                    .map(|(user, _)| user)
            };

            summaries.push(ConversationSummary {
                conversation,
                other_member,
                last_message,
                unseen_count,
            });
        }

        summaries.sort_by_key(|s| {
            std::cmp::Reverse(
                s.last_message
                    .as_ref()
                    .map(|m| m.created_at)
                    .unwrap_or(s.conversation.created_at),
            )
        });

        Ok(summaries)
    }

    /// Open (or reuse) the direct-message conversation with a friend
    pub async fn start_dm(&self, user: &User, friend_id: &str) -> Result<DmStart> {
        let mut tx = begin_write(&self.pool).await?;

        if friendship(&mut *tx, &user.id, friend_id).await?.is_none() {
            return Err(Error::app("You are not friends with this user"));
        }

        if let Some(conversation_id) = find_dm(&mut *tx, &user.id, friend_id).await? {
            info!("[Conversations] Found existing DM {}", conversation_id);
            return Ok(DmStart {
                conversation_id,
                created: false,
            });
        }

        let conversation_id = insert_conversation(&mut *tx, false, None).await?;
        insert_membership(&mut *tx, &conversation_id, &user.id).await?;
        insert_membership(&mut *tx, &conversation_id, friend_id).await?;
        tx.commit().await?;

        info!(
            "[Conversations] Created DM {} between {} and {}",
            conversation_id, user.id, friend_id
        );
        self.feed.publish(
            vec![user.id.clone(), friend_id.to_string()],
            Topic::Conversations,
        );

        Ok(DmStart {
            conversation_id,
            created: true,
        })
    }

    /// Create a group with the caller and `members`; returns its id
    pub async fn create_group(
        &self,
        user: &User,
        name: &str,
        members: &[String],
    ) -> Result<String> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::app("Group name can't be empty"));
        }

        let members: BTreeSet<&str> = members
            .iter()
            .map(String::as_str)
            .filter(|id| *id != user.id)
            .collect();
        if members.is_empty() {
            return Err(Error::app("Select at least one member"));
        }

        let mut tx = begin_write(&self.pool).await?;

        for member_id in &members {
            let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE id = ?")
                .bind(member_id)
                .fetch_optional(&mut *tx)
                .await?;
            if exists.is_none() {
                return Err(Error::app("Invalid member id"));
            }
        }

        let conversation_id = insert_conversation(&mut *tx, true, Some(name)).await?;
        for member_id in members.iter().copied().chain(std::iter::once(user.id.as_str())) {
            insert_membership(&mut *tx, &conversation_id, member_id).await?;
        }
        tx.commit().await?;

        info!(
            "[Conversations] Group '{}' ({}) created with {} member(s)",
            name,
            conversation_id,
            members.len() + 1
        );

        let mut audience: Vec<String> = members.into_iter().map(str::to_string).collect();
        audience.push(user.id.clone());
        self.feed.publish(audience, Topic::Conversations);

        Ok(conversation_id)
    }
}

pub(crate) async fn get_conversation<'e, E>(exec: E, id: &str) -> Result<Option<Conversation>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let conversation = sqlx::query_as::<_, Conversation>(
        "SELECT id, is_group, name, last_message_id, created_at FROM conversations WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(exec)
    .await?;
    Ok(conversation)
}

pub(crate) async fn membership<'e, E>(
    exec: E,
    member_id: &str,
    conversation_id: &str,
) -> Result<Option<ConversationMember>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let member = sqlx::query_as::<_, ConversationMember>(
        "SELECT id, conversation_id, member_id, last_seen_message_id
         FROM conversation_members WHERE member_id = ? AND conversation_id = ?",
    )
    .bind(member_id)
    .bind(conversation_id)
    .fetch_optional(exec)
    .await?;
    Ok(member)
}

pub(crate) async fn member_ids<'e, E>(exec: E, conversation_id: &str) -> Result<Vec<String>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT member_id FROM conversation_members WHERE conversation_id = ?")
            .bind(conversation_id)
            .fetch_all(exec)
            .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Users in a conversation other than `user_id`, with their read position
pub(crate) async fn other_members<'e, E>(
    exec: E,
    conversation_id: &str,
    user_id: &str,
) -> Result<Vec<(User, Option<String>)>>
where
    E: Executor<'e, Database = Sqlite>,
{
    #[derive(sqlx::FromRow)]
    struct Row {
        #[sqlx(flatten)]
        user: User,
        last_seen_message_id: Option<String>,
    }

    let rows = sqlx::query_as::<_, Row>(
        r#"
        SELECT u.id, u.external_id, u.username, u.image_url, u.email, u.created_at,
               m.last_seen_message_id
        FROM conversation_members m
        JOIN users u ON u.id = m.member_id
        WHERE m.conversation_id = ? AND m.member_id != ?
        ORDER BY u.username
        "#,
    )
    .bind(conversation_id)
    .bind(user_id)
    .fetch_all(exec)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| (r.user, r.last_seen_message_id))
        .collect())
}

/// The non-group conversation both users belong to, if any
pub(crate) async fn find_dm<'e, E>(exec: E, user_a: &str, user_b: &str) -> Result<Option<String>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row: Option<(String,)> = sqlx::query_as(
        r#"
        SELECT c.id
        FROM conversations c
        JOIN conversation_members ma ON ma.conversation_id = c.id AND ma.member_id = ?
        JOIN conversation_members mb ON mb.conversation_id = c.id AND mb.member_id = ?
        WHERE c.is_group = 0
        ORDER BY c.created_at
        LIMIT 1
        "#,
    )
    .bind(user_a)
    .bind(user_b)
    .fetch_optional(exec)
    .await?;
    Ok(row.map(|(id,)| id))
}

/// Delete a conversation with its messages and memberships.
/// Returns `(deleted_messages, deleted_memberships)`.
pub(crate) async fn delete_cascade(
    conn: &mut sqlx::SqliteConnection,
    conversation_id: &str,
) -> Result<(u64, u64)> {
    let messages = sqlx::query("DELETE FROM messages WHERE conversation_id = ?")
        .bind(conversation_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    let memberships = sqlx::query("DELETE FROM conversation_members WHERE conversation_id = ?")
        .bind(conversation_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    sqlx::query("DELETE FROM conversations WHERE id = ?")
        .bind(conversation_id)
        .execute(&mut *conn)
        .await?;

    Ok((messages, memberships))
}

async fn insert_conversation(
    conn: &mut sqlx::SqliteConnection,
    is_group: bool,
    name: Option<&str>,
) -> Result<String> {
    let id = Uuid::new_v4().to_string();
    sqlx::query("INSERT INTO conversations (id, is_group, name, created_at) VALUES (?, ?, ?, ?)")
        .bind(&id)
        .bind(is_group)
        .bind(name)
        .bind(now_millis())
        .execute(&mut *conn)
        .await?;
    Ok(id)
}

async fn insert_membership(
    conn: &mut sqlx::SqliteConnection,
    conversation_id: &str,
    member_id: &str,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO conversation_members (id, conversation_id, member_id) VALUES (?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(conversation_id)
    .bind(member_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn last_message_details<'e, E>(exec: E, message_id: &str) -> Result<Option<LastMessage>>
where
    E: Executor<'e, Database = Sqlite>,
{
    #[derive(sqlx::FromRow)]
    struct Row {
        #[sqlx(flatten)]
        message: Message,
        sender_name: String,
    }

    let row = sqlx::query_as::<_, Row>(
        r#"
        SELECT m.id, m.conversation_id, m.sender_id, m.kind, m.content, m.created_at,
               u.username AS sender_name
        FROM messages m
        JOIN users u ON u.id = m.sender_id
        WHERE m.id = ?
        "#,
    )
    .bind(message_id)
    .fetch_optional(exec)
    .await?;

    Ok(row.map(|r| LastMessage {
        content: r.message.preview(),
        sender: r.sender_name,
        created_at: r.message.created_at,
    }))
}

/// Messages from others that are newer than the member's last-seen message.
///
/// A missing or dangling pointer counts every message from others.
pub(crate) async fn unseen_count(
    pool: &SqlitePool,
    conversation_id: &str,
    user_id: &str,
    last_seen_message_id: Option<&str>,
) -> Result<i64> {
    let seen_at: Option<(i64, i64)> = match last_seen_message_id {
        Some(id) => {
            sqlx::query_as("SELECT created_at, rowid FROM messages WHERE id = ?")
                .bind(id)
                .fetch_optional(pool)
                .await?
        }
        None => None,
    };
    let (seen_time, seen_row) = seen_at.unwrap_or((-1, -1));

    // rowid breaks ties between messages created in the same millisecond
    let (count,): (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*) FROM messages
        WHERE conversation_id = ?1
          AND sender_id != ?2
          AND (created_at > ?3 OR (created_at = ?3 AND rowid > ?4))
        "#,
    )
    .bind(conversation_id)
    .bind(user_id)
    .bind(seen_time)
    .bind(seen_row)
    .fetch_one(pool)
    .await?;

    Ok(count)
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::chat::friends::FriendManager;
    use crate::core::db::Database;
    use crate::core::feed::ChangeFeed;
    use crate::core::models::User;
    use crate::core::users::UserDirectory;

    pub async fn user(db: &Database, name: &str) -> User {
        UserDirectory::new(db.pool().clone())
            .upsert(
                &format!("ext_{}", name),
                name,
                "",
                &format!("{}@example.com", name),
            )
            .await
            .unwrap()
    }

    pub async fn befriend(db: &Database, a: &User, b: &User) {
        let friends = FriendManager::new(db.pool().clone(), ChangeFeed::default());
        let request = friends.send_request(a, &b.email).await.unwrap();
        friends.accept(b, &request.id).await.unwrap();
    }
}
