//! SQLite storage
//!
//! One pool for the whole server. Every table lives in the same file so that a
//! mutation touching conversations, memberships and messages can commit in a
//! single transaction.

use crate::core::error::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

const DEFAULT_POOL_SIZE: u32 = 16;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        external_id TEXT UNIQUE NOT NULL,
        username TEXT NOT NULL,
        image_url TEXT NOT NULL DEFAULT '',
        email TEXT NOT NULL DEFAULT '',
        created_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS users_by_email ON users(email)",
    r#"
    CREATE TABLE IF NOT EXISTS friend_requests (
        id TEXT PRIMARY KEY,
        sender_id TEXT NOT NULL,
        receiver_id TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        FOREIGN KEY (sender_id) REFERENCES users(id),
        FOREIGN KEY (receiver_id) REFERENCES users(id),
        UNIQUE(sender_id, receiver_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS friend_requests_by_receiver ON friend_requests(receiver_id)",
    r#"
    CREATE TABLE IF NOT EXISTS friends (
        id TEXT PRIMARY KEY,
        user1 TEXT NOT NULL,
        user2 TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        FOREIGN KEY (user1) REFERENCES users(id),
        FOREIGN KEY (user2) REFERENCES users(id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS friends_by_user1 ON friends(user1)",
    "CREATE INDEX IF NOT EXISTS friends_by_user2 ON friends(user2)",
    // last_message_id is a soft pointer: it may dangle after deletes
    r#"
    CREATE TABLE IF NOT EXISTS conversations (
        id TEXT PRIMARY KEY,
        is_group INTEGER NOT NULL,
        name TEXT,
        last_message_id TEXT,
        created_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS conversation_members (
        id TEXT PRIMARY KEY,
        conversation_id TEXT NOT NULL,
        member_id TEXT NOT NULL,
        last_seen_message_id TEXT,
        FOREIGN KEY (conversation_id) REFERENCES conversations(id),
        FOREIGN KEY (member_id) REFERENCES users(id),
        UNIQUE(member_id, conversation_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS conversation_members_by_conversation ON conversation_members(conversation_id)",
    r#"
    CREATE TABLE IF NOT EXISTS messages (
        id TEXT PRIMARY KEY,
        conversation_id TEXT NOT NULL,
        sender_id TEXT NOT NULL,
        kind TEXT NOT NULL,
        content TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        FOREIGN KEY (conversation_id) REFERENCES conversations(id),
        FOREIGN KEY (sender_id) REFERENCES users(id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS messages_by_conversation ON messages(conversation_id, created_at)",
];

/// Database connection wrapper.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect to a SQLite database, creating the file if needed.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(DEFAULT_POOL_SIZE)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await?;

        info!("[Db] Connected to {} (pool size: {})", url, DEFAULT_POOL_SIZE);

        Ok(Self { pool })
    }

    /// Create tables and indexes if they don't exist yet
    pub async fn init_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("[Db] Schema ready");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Start a transaction that takes the write lock up front.
///
/// Every mutation reads before it writes; under a deferred `BEGIN` the
/// upgrade fails with `SQLITE_BUSY` rather than waiting on the busy timeout.
pub async fn begin_write(pool: &SqlitePool) -> Result<Transaction<'static, Sqlite>> {
    Ok(pool.begin_with("BEGIN IMMEDIATE").await?)
}

/// Milliseconds since the Unix epoch, the unit of every `created_at` column.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use tempfile::TempDir;

    /// File-backed database in a temp dir; keep the `TempDir` alive.
    pub async fn test_db() -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite://{}", dir.path().join("test.sqlite").display());
        let db = Database::connect(&url).await.unwrap();
        db.init_schema().await.unwrap();
        (dir, db)
    }
}

#[cfg(test)]
mod tests {
    use super::testing::test_db;

    #[tokio::test]
    async fn test_init_schema_is_idempotent() {
        let (_dir, db) = test_db().await;
        db.init_schema().await.unwrap();

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
        )
        .fetch_all(db.pool())
        .await
        .unwrap();
        let names: Vec<_> = tables.into_iter().map(|(n,)| n).collect();
        for expected in [
            "conversation_members",
            "conversations",
            "friend_requests",
            "friends",
            "messages",
            "users",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing {}", expected);
        }
    }
}
