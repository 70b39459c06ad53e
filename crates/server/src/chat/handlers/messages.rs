use crate::chat::messages::MessageView;
use crate::core::config::AppState;
use crate::core::ctx::Ctx;
use crate::core::error::Result;
use crate::core::models::{Message, MessageKind};
use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default = "default_kind")]
    pub kind: MessageKind,
    pub content: String,
}

fn default_kind() -> MessageKind {
    MessageKind::Text
}

/// GET /conversation/{id}/messages
pub async fn list_messages(
    Path(conversation_id): Path<String>,
    State(state): State<AppState>,
    ctx: Ctx,
) -> Result<Json<Vec<MessageView>>> {
    let user = state.users.current(&ctx).await?;
    let messages = state.messages.list(&user, &conversation_id).await?;
    Ok(Json(messages))
}

/// POST /conversation/{id}/messages
pub async fn send_message(
    Path(conversation_id): Path<String>,
    State(state): State<AppState>,
    ctx: Ctx,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<Message>> {
    info!("POST /conversation/{}/messages", conversation_id);

    let user = state.users.current(&ctx).await?;
    let message = state
        .messages
        .send(&user, &conversation_id, req.kind, &req.content)
        .await?;
    Ok(Json(message))
}
