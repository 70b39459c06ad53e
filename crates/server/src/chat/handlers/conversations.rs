//! Conversation list & creation handlers

use crate::chat::conversations::{ConversationSummary, DmStart};
use crate::core::config::AppState;
use crate::core::ctx::{Ctx, MaybeCtx};
use crate::core::error::Result;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct StartDmRequest {
    pub friend_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    #[serde(default)]
    pub members: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateGroupResponse {
    pub conversation_id: String,
}

/// GET /conversations - anonymous callers get an empty list
pub async fn list_conversations(
    State(state): State<AppState>,
    MaybeCtx(ctx): MaybeCtx,
) -> Result<Json<Vec<ConversationSummary>>> {
    let Some(ctx) = ctx else {
        return Ok(Json(Vec::new()));
    };

    let user = state.users.current(&ctx).await?;
    let conversations = state.conversations.list(&user).await?;
    Ok(Json(conversations))
}

/// POST /conversations/dm
pub async fn start_dm(
    State(state): State<AppState>,
    ctx: Ctx,
    Json(req): Json<StartDmRequest>,
) -> Result<Json<DmStart>> {
    info!("POST /conversations/dm - {}", req.friend_id);

    let user = state.users.current(&ctx).await?;
    let started = state.conversations.start_dm(&user, &req.friend_id).await?;
    Ok(Json(started))
}

/// POST /conversations/group and POST /conversation/group
pub async fn create_group(
    State(state): State<AppState>,
    ctx: Ctx,
    Json(req): Json<CreateGroupRequest>,
) -> Result<Json<CreateGroupResponse>> {
    info!("POST create group '{}' ({} members)", req.name, req.members.len());

    let user = state.users.current(&ctx).await?;
    let conversation_id = state
        .conversations
        .create_group(&user, &req.name, &req.members)
        .await?;
    Ok(Json(CreateGroupResponse { conversation_id }))
}
