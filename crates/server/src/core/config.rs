//! Chat server configuration

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::chat::conversations::ConversationManager;
use crate::chat::friends::FriendManager;
use crate::chat::messages::MessageManager;
use crate::core::auth::IdentityVerifier;
use crate::core::db::Database;
use crate::core::feed::ChangeFeed;
use crate::core::users::UserDirectory;

/// Configuration for the Parley server
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to
    pub bind_addr: SocketAddr,
    /// sqlx SQLite connection URL
    pub database_url: String,
    /// HS256 secret shared with the identity provider's JWT template
    pub jwt_secret: String,
    /// Expected `iss` claim, if the provider sets one
    pub jwt_issuer: Option<String>,
    /// svix signing secret for the identity-provider webhook (`whsec_...`)
    pub webhook_secret: String,
    /// Heartbeat interval for `/subscribe` streams, in seconds
    pub heartbeat_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3001)),
            database_url: "sqlite://parley_data/parley.sqlite".to_string(),
            jwt_secret: String::new(),
            jwt_issuer: None,
            webhook_secret: String::new(),
            heartbeat_secs: 30,
        }
    }
}

impl ServerConfig {
    /// Build config from the environment (after loading `.env`, if any)
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        let bind_addr = match std::env::var("PARLEY_BIND_ADDR") {
            Ok(addr) => addr
                .parse()
                .with_context(|| format!("Invalid PARLEY_BIND_ADDR: {}", addr))?,
            Err(_) => defaults.bind_addr,
        };

        let jwt_secret =
            std::env::var("PARLEY_JWT_SECRET").context("PARLEY_JWT_SECRET must be set")?;

        let webhook_secret = std::env::var("CLERK_WEBHOOK_SECRET").unwrap_or_default();

        Ok(Self {
            bind_addr,
            database_url: std::env::var("PARLEY_DATABASE_URL").unwrap_or(defaults.database_url),
            jwt_secret,
            jwt_issuer: std::env::var("PARLEY_JWT_ISSUER").ok(),
            webhook_secret,
            heartbeat_secs: std::env::var("PARLEY_HEARTBEAT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.heartbeat_secs),
        })
    }

    /// Path of the database file, when the URL points at one
    pub fn database_path(&self) -> Option<PathBuf> {
        let path = self
            .database_url
            .strip_prefix("sqlite://")
            .or_else(|| self.database_url.strip_prefix("sqlite:"))?;
        let path = path.split('?').next().unwrap_or(path);
        if path.is_empty() || path.starts_with(":memory:") {
            return None;
        }
        Some(PathBuf::from(path))
    }

    /// Ensure the database directory exists
    pub async fn ensure_dirs(&self) -> Result<()> {
        if let Some(parent) = self.database_path().as_deref().and_then(|p| p.parent()) {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        Ok(())
    }
}

/// App state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub identity: Arc<IdentityVerifier>,
    pub users: Arc<UserDirectory>,
    pub friends: Arc<FriendManager>,
    pub conversations: Arc<ConversationManager>,
    pub messages: Arc<MessageManager>,
    pub feed: ChangeFeed,
}

impl AppState {
    /// Wire every manager onto one database and change feed
    pub fn new(config: ServerConfig, db: &Database) -> Self {
        let feed = ChangeFeed::default();
        let pool = db.pool().clone();

        Self {
            identity: Arc::new(IdentityVerifier::new(
                &config.jwt_secret,
                config.jwt_issuer.as_deref(),
            )),
            users: Arc::new(UserDirectory::new(pool.clone())),
            friends: Arc::new(FriendManager::new(pool.clone(), feed.clone())),
            conversations: Arc::new(ConversationManager::new(pool.clone(), feed.clone())),
            messages: Arc::new(MessageManager::new(pool, feed.clone())),
            feed,
            config,
        }
    }
}
