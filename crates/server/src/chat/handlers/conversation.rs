//! Single-conversation handlers

use crate::chat::conversation::{ConversationDetail, GroupDeletion, LeaveOutcome};
use crate::core::config::AppState;
use crate::core::ctx::Ctx;
use crate::core::error::Result;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct MarkReadRequest {
    pub message_id: String,
}

/// GET /conversation/{id} - JSON `null` when missing or not a member
pub async fn get_conversation(
    Path(conversation_id): Path<String>,
    State(state): State<AppState>,
    ctx: Ctx,
) -> Result<Json<Option<ConversationDetail>>> {
    let user = state.users.current(&ctx).await?;
    let detail = state.conversations.get(&user, &conversation_id).await?;
    Ok(Json(detail))
}

/// DELETE /conversation/{id}
pub async fn delete_group(
    Path(conversation_id): Path<String>,
    State(state): State<AppState>,
    ctx: Ctx,
) -> Result<Json<GroupDeletion>> {
    info!("DELETE /conversation/{}", conversation_id);

    let user = state.users.current(&ctx).await?;
    let deletion = state
        .conversations
        .delete_group(&user, &conversation_id)
        .await?;
    Ok(Json(deletion))
}

/// POST /conversation/{id}/leave
pub async fn leave_group(
    Path(conversation_id): Path<String>,
    State(state): State<AppState>,
    ctx: Ctx,
) -> Result<Json<LeaveOutcome>> {
    info!("POST /conversation/{}/leave", conversation_id);

    let user = state.users.current(&ctx).await?;
    let outcome = state
        .conversations
        .leave_group(&user, &conversation_id)
        .await?;
    Ok(Json(outcome))
}

/// POST /conversation/{id}/read
pub async fn mark_read(
    Path(conversation_id): Path<String>,
    State(state): State<AppState>,
    ctx: Ctx,
    Json(req): Json<MarkReadRequest>,
) -> Result<StatusCode> {
    let user = state.users.current(&ctx).await?;
    state
        .conversations
        .mark_read(&user, &conversation_id, &req.message_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
