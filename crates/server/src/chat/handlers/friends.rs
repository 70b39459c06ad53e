//! Friend Request Handlers

use crate::chat::friends::IncomingRequest;
use crate::core::config::AppState;
use crate::core::ctx::Ctx;
use crate::core::error::Result;
use crate::core::models::{Friend, FriendRequest, User};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Request to send friend request
#[derive(Debug, Deserialize)]
pub struct SendFriendRequest {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct RequestCount {
    pub count: i64,
}

/// GET /friends
pub async fn list_friends(
    State(state): State<AppState>,
    ctx: Ctx,
) -> Result<Json<Vec<User>>> {
    let user = state.users.current(&ctx).await?;
    let friends = state.friends.list_friends(&user).await?;
    Ok(Json(friends))
}

/// DELETE /friends/{friend_id}
pub async fn remove_friend(
    Path(friend_id): Path<String>,
    State(state): State<AppState>,
    ctx: Ctx,
) -> Result<StatusCode> {
    info!("DELETE /friends/{}", friend_id);

    let user = state.users.current(&ctx).await?;
    state.friends.remove_friend(&user, &friend_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /requests - pending requests addressed to the caller
pub async fn list_requests(
    State(state): State<AppState>,
    ctx: Ctx,
) -> Result<Json<Vec<IncomingRequest>>> {
    let user = state.users.current(&ctx).await?;
    let requests = state.friends.incoming_requests(&user).await?;
    Ok(Json(requests))
}

/// GET /requests/count
pub async fn request_count(
    State(state): State<AppState>,
    ctx: Ctx,
) -> Result<Json<RequestCount>> {
    let user = state.users.current(&ctx).await?;
    let count = state.friends.request_count(&user).await?;
    Ok(Json(RequestCount { count }))
}

/// POST /requests - Send a friend request
pub async fn send_request(
    State(state): State<AppState>,
    ctx: Ctx,
    Json(req): Json<SendFriendRequest>,
) -> Result<Json<FriendRequest>> {
    info!("POST /requests - to {}", req.email);

    let user = state.users.current(&ctx).await?;
    let request = state.friends.send_request(&user, &req.email).await?;
    Ok(Json(request))
}

/// POST /requests/{id}/accept
pub async fn accept_request(
    Path(request_id): Path<String>,
    State(state): State<AppState>,
    ctx: Ctx,
) -> Result<Json<Friend>> {
    info!("POST /requests/{}/accept", request_id);

    let user = state.users.current(&ctx).await?;
    let friend = state.friends.accept(&user, &request_id).await?;
    Ok(Json(friend))
}

/// POST /requests/{id}/deny
pub async fn deny_request(
    Path(request_id): Path<String>,
    State(state): State<AppState>,
    ctx: Ctx,
) -> Result<StatusCode> {
    info!("POST /requests/{}/deny", request_id);

    let user = state.users.current(&ctx).await?;
    state.friends.deny(&user, &request_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
