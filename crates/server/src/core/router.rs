//! Core Router
//!
//! Handles shared infrastructure routes: health and the identity-provider webhook.

use crate::core::webhook;
use crate::core::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/clerk-user-webhook", post(webhook::clerk_user_webhook))
}

async fn health_check() -> &'static str {
    "OK - Parley Server"
}
