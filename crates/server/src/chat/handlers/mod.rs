//! Chat Handlers and Router
//!
//! Orchestrates conversation, messaging, and friend system routes.

use crate::core::AppState;
use axum::{
    routing::{delete, get, post},
    Router,
};

pub mod conversation;
pub mod conversations;
pub mod friends;
pub mod messages;
pub mod subscribe;

pub fn router() -> Router<AppState> {
    Router::new()
        // Live invalidation stream
        .route("/subscribe", get(subscribe::subscribe))
        // Conversation list
        .route("/conversations", get(conversations::list_conversations))
        .route("/conversations/dm", post(conversations::start_dm))
        .route("/conversations/group", post(conversations::create_group))
        // Single conversation
        .route("/conversation/group", post(conversations::create_group))
        .route(
            "/conversation/{id}",
            get(conversation::get_conversation).delete(conversation::delete_group),
        )
        .route("/conversation/{id}/leave", post(conversation::leave_group))
        .route("/conversation/{id}/read", post(conversation::mark_read))
        .route(
            "/conversation/{id}/messages",
            get(messages::list_messages).post(messages::send_message),
        )
        // Friends system
        .route("/friends", get(friends::list_friends))
        .route("/friends/{friend_id}", delete(friends::remove_friend))
        .route(
            "/requests",
            get(friends::list_requests).post(friends::send_request),
        )
        .route("/requests/count", get(friends::request_count))
        .route("/requests/{id}/accept", post(friends::accept_request))
        .route("/requests/{id}/deny", post(friends::deny_request))
}
