//! User Directory
//!
//! Local copies of identity-provider profiles. Rows are written only by the
//! provider webhook and are looked up by external id on every request.

use crate::core::ctx::Ctx;
use crate::core::db::now_millis;
use crate::core::error::{Error, Result};
use crate::core::models::User;
use sqlx::{Executor, Sqlite, SqlitePool};
use tracing::info;
use uuid::Uuid;

const USER_COLUMNS: &str = "id, external_id, username, image_url, email, created_at";

pub struct UserDirectory {
    pool: SqlitePool,
}

impl UserDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a profile, or refresh the existing one with the same external id
    pub async fn upsert(
        &self,
        external_id: &str,
        username: &str,
        image_url: &str,
        email: &str,
    ) -> Result<User> {
        sqlx::query(
            r#"
            INSERT INTO users (id, external_id, username, image_url, email, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(external_id) DO UPDATE SET
                username = excluded.username,
                image_url = excluded.image_url,
                email = excluded.email
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(external_id)
        .bind(username)
        .bind(image_url)
        .bind(email)
        .bind(now_millis())
        .execute(&self.pool)
        .await?;

        info!("[Users] Upserted {} ({})", username, external_id);

        self.by_external_id(external_id)
            .await?
            .ok_or(Error::UserNotFound)
    }

    pub async fn by_external_id(&self, external_id: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE external_id = ?",
            USER_COLUMNS
        ))
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    /// Resolve the caller's profile
    pub async fn current(&self, ctx: &Ctx) -> Result<User> {
        self.by_external_id(ctx.subject())
            .await?
            .ok_or(Error::UserNotFound)
    }
}

/// Profile registered under `email`
pub(crate) async fn by_email<'e, E>(exec: E, email: &str) -> Result<Option<User>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {} FROM users WHERE email = ?",
        USER_COLUMNS
    ))
    .bind(email)
    .fetch_optional(exec)
    .await?;
    Ok(user)
}
