//! Friend Requests & Friends
//!
//! Requests are addressed by email and live until the receiver accepts or
//! denies them. Accepting records an unordered friendship; conversations are
//! opened separately through `start_dm`.

use crate::chat::conversations::{delete_cascade, find_dm};
use crate::core::db::{begin_write, now_millis};
use crate::core::error::{Error, Result};
use crate::core::feed::{ChangeFeed, Topic};
use crate::core::models::{Friend, FriendRequest, User};
use crate::core::users::by_email;
use serde::Serialize;
use sqlx::{Executor, Sqlite, SqlitePool};
use tracing::{info, warn};
use uuid::Uuid;

/// Incoming request together with who sent it
#[derive(Debug, Clone, Serialize)]
pub struct IncomingRequest {
    pub request: FriendRequest,
    pub sender: User,
}

/// Friend manager handles all friend-related operations
pub struct FriendManager {
    pool: SqlitePool,
    feed: ChangeFeed,
}

impl FriendManager {
    pub fn new(pool: SqlitePool, feed: ChangeFeed) -> Self {
        Self { pool, feed }
    }

    /// Send a friend request to the user registered under `email`
    pub async fn send_request(&self, user: &User, email: &str) -> Result<FriendRequest> {
        let email = email.trim();
        let mut tx = begin_write(&self.pool).await?;

        let receiver_id = by_email(&mut *tx, email)
            .await?
            .map(|receiver| receiver.id)
            .ok_or_else(|| Error::app("User could not be found"))?;

        if receiver_id == user.id {
            return Err(Error::app("Can't send a request to yourself"));
        }

        if pending_request(&mut *tx, &user.id, &receiver_id).await?.is_some() {
            return Err(Error::app("Request already sent"));
        }

        if pending_request(&mut *tx, &receiver_id, &user.id).await?.is_some() {
            return Err(Error::app("This user has already sent you a request"));
        }

        if friendship(&mut *tx, &user.id, &receiver_id).await?.is_some() {
            return Err(Error::app("You are already friends with this user"));
        }

        let request = FriendRequest {
            id: Uuid::new_v4().to_string(),
            sender_id: user.id.clone(),
            receiver_id,
            created_at: now_millis(),
        };

        sqlx::query(
            "INSERT INTO friend_requests (id, sender_id, receiver_id, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&request.id)
        .bind(&request.sender_id)
        .bind(&request.receiver_id)
        .bind(request.created_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        info!("[Friends] Request sent: {} -> {}", user.username, email);
        self.feed
            .publish(vec![request.receiver_id.clone()], Topic::Requests);

        Ok(request)
    }

    /// Pending requests addressed to the user, newest first
    pub async fn incoming_requests(&self, user: &User) -> Result<Vec<IncomingRequest>> {
        #[derive(sqlx::FromRow)]
        struct Row {
            request_id: String,
            request_created_at: i64,
            #[sqlx(flatten)]
            sender: User,
        }

        let rows = sqlx::query_as::<_, Row>(
            r#"
            SELECT
                fr.id AS request_id, fr.created_at AS request_created_at,
                u.id, u.external_id, u.username, u.image_url, u.email, u.created_at
            FROM friend_requests fr
            JOIN users u ON fr.sender_id = u.id
            WHERE fr.receiver_id = ?
            ORDER BY fr.created_at DESC
            "#,
        )
        .bind(&user.id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| IncomingRequest {
                request: FriendRequest {
                    id: row.request_id,
                    sender_id: row.sender.id.clone(),
                    receiver_id: user.id.clone(),
                    created_at: row.request_created_at,
                },
                sender: row.sender,
            })
            .collect())
    }

    pub async fn request_count(&self, user: &User) -> Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM friend_requests WHERE receiver_id = ?")
                .bind(&user.id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    /// Accept a request addressed to `user`, creating the friendship
    pub async fn accept(&self, user: &User, request_id: &str) -> Result<Friend> {
        let mut tx = begin_write(&self.pool).await?;
        let request = addressed_request(&mut *tx, user, request_id, "accepting").await?;

        let friend = match friendship(&mut *tx, &request.sender_id, &user.id).await? {
            Some(existing) => existing,
            None => {
                let friend = Friend {
                    id: Uuid::new_v4().to_string(),
                    user1: user.id.clone(),
                    user2: request.sender_id.clone(),
                    created_at: now_millis(),
                };
                sqlx::query(
                    "INSERT INTO friends (id, user1, user2, created_at) VALUES (?, ?, ?, ?)",
                )
                .bind(&friend.id)
                .bind(&friend.user1)
                .bind(&friend.user2)
                .bind(friend.created_at)
                .execute(&mut *tx)
                .await?;
                friend
            }
        };

        sqlx::query("DELETE FROM friend_requests WHERE id = ?")
            .bind(request_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!("[Friends] Request {} accepted", request_id);
        let both = vec![user.id.clone(), request.sender_id.clone()];
        self.feed.publish(both, Topic::Friends);
        self.feed.publish(vec![user.id.clone()], Topic::Requests);

        Ok(friend)
    }

    /// Deny (delete) a request addressed to `user`
    pub async fn deny(&self, user: &User, request_id: &str) -> Result<()> {
        let mut tx = begin_write(&self.pool).await?;
        addressed_request(&mut *tx, user, request_id, "denying").await?;

        sqlx::query("DELETE FROM friend_requests WHERE id = ?")
            .bind(request_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!("[Friends] Request {} denied", request_id);
        self.feed.publish(vec![user.id.clone()], Topic::Requests);

        Ok(())
    }

    /// The user's friends, by username
    pub async fn list_friends(&self, user: &User) -> Result<Vec<User>> {
        let friends = sqlx::query_as::<_, User>(
            r#"
            SELECT u.id, u.external_id, u.username, u.image_url, u.email, u.created_at
            FROM friends f
            JOIN users u ON u.id = CASE WHEN f.user1 = ?1 THEN f.user2 ELSE f.user1 END
            WHERE f.user1 = ?1 OR f.user2 = ?1
            ORDER BY u.username
            "#,
        )
        .bind(&user.id)
        .fetch_all(&self.pool)
        .await?;
        Ok(friends)
    }

    /// Unfriend, tearing down the direct-message conversation if there is one
    pub async fn remove_friend(&self, user: &User, friend_id: &str) -> Result<()> {
        let mut tx = begin_write(&self.pool).await?;

        let removed = sqlx::query(
            "DELETE FROM friends WHERE (user1 = ?1 AND user2 = ?2) OR (user1 = ?2 AND user2 = ?1)",
        )
        .bind(&user.id)
        .bind(friend_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if removed == 0 {
            return Err(Error::app("You are not friends with this user"));
        }

        if let Some(conversation_id) = find_dm(&mut *tx, &user.id, friend_id).await? {
            let (messages, _) = delete_cascade(&mut *tx, &conversation_id).await?;
            info!(
                "[Friends] Removed DM {} with {} message(s)",
                conversation_id, messages
            );
        }
        tx.commit().await?;

        info!("[Friends] Contact removed: {} <-> {}", user.id, friend_id);
        let both = vec![user.id.clone(), friend_id.to_string()];
        self.feed.publish(both.clone(), Topic::Friends);
        self.feed.publish(both, Topic::Conversations);

        Ok(())
    }
}

/// Friendship between two users, in either column order
pub(crate) async fn friendship<'e, E>(exec: E, user_a: &str, user_b: &str) -> Result<Option<Friend>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let friend = sqlx::query_as::<_, Friend>(
        r#"
        SELECT id, user1, user2, created_at FROM friends
        WHERE (user1 = ?1 AND user2 = ?2) OR (user1 = ?2 AND user2 = ?1)
        LIMIT 1
        "#,
    )
    .bind(user_a)
    .bind(user_b)
    .fetch_optional(exec)
    .await?;
    Ok(friend)
}

async fn pending_request<'e, E>(
    exec: E,
    sender_id: &str,
    receiver_id: &str,
) -> Result<Option<FriendRequest>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let request = sqlx::query_as::<_, FriendRequest>(
        "SELECT id, sender_id, receiver_id, created_at FROM friend_requests
         WHERE sender_id = ? AND receiver_id = ?",
    )
    .bind(sender_id)
    .bind(receiver_id)
    .fetch_optional(exec)
    .await?;
    Ok(request)
}

/// Load a request and make sure `user` is its receiver
async fn addressed_request(
    conn: &mut sqlx::SqliteConnection,
    user: &User,
    request_id: &str,
    action: &str,
) -> Result<FriendRequest> {
    let request = sqlx::query_as::<_, FriendRequest>(
        "SELECT id, sender_id, receiver_id, created_at FROM friend_requests WHERE id = ?",
    )
    .bind(request_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| Error::NotFound {
        entity: "Request",
        id: request_id.to_string(),
    })?;

    if request.receiver_id != user.id {
        warn!(
            "[Friends] {} tried {} request {} addressed to someone else",
            user.id, action, request_id
        );
        return Err(Error::app(format!(
            "There was an error {} this request",
            action
        )));
    }

    Ok(request)
}
