//! Parley Chat Server Library
//!
//! Conversations, direct messages, groups, and friend requests over HTTP,
//! backed by SQLite.

pub mod chat;
pub mod core;

use axum::{middleware, Router};
use tracing::{info, warn};

use crate::core::auth::middleware::mw_require_auth;
use crate::core::db::Database;
use crate::core::logging;
use crate::core::{AppState, ServerConfig};

/// Build the full HTTP application for a given state
///
/// Only chat routes sit behind the auth middleware; the webhook authenticates
/// by signature.
pub fn app(state: AppState) -> Router {
    let chat = crate::chat::router()
        .layer(middleware::from_fn_with_state(state.clone(), mw_require_auth));

    Router::new()
        .merge(crate::core::router())
        .merge(chat)
        .with_state(state)
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

pub async fn run() -> anyhow::Result<()> {
    logging::init();

    info!("=== Parley Server ===");

    let config = ServerConfig::from_env()?;
    config.ensure_dirs().await?;
    info!("Database: {}", config.database_url);

    let db = Database::connect(&config.database_url).await?;
    db.init_schema().await?;
    info!("Database schema ready");

    if config.webhook_secret.is_empty() {
        warn!("CLERK_WEBHOOK_SECRET is not set; webhook deliveries will be rejected");
    }

    let addr = config.bind_addr;
    let state = AppState::new(config, &db);
    let app = app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    db.close().await;
    Ok(())
}
