//! Change Subscription Handler
//!
//! Streams invalidation events for the caller. Clients re-run the matching
//! query when an event arrives.
//!
//! # Wire Format
//!
//! ```text
//! event: messages
//! data: {"topic":"messages","id":"3f0c..."}
//!
//! : heartbeat
//!
//! ```
//!
//! A `resync` event means the server dropped events for this stream and the
//! client should refetch everything it shows.

use crate::core::config::AppState;
use crate::core::ctx::Ctx;
use crate::core::error::{Error, Result};
use crate::core::feed::Topic;
use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::Response,
};
use bytes::Bytes;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

fn format_event(topic: &Topic) -> Bytes {
    let data = serde_json::to_string(topic).unwrap_or_default();
    Bytes::from(format!("event: {}\ndata: {}\n\n", topic.event_name(), data))
}

/// GET /subscribe
pub async fn subscribe(State(state): State<AppState>, ctx: Ctx) -> Result<Response> {
    let user = state.users.current(&ctx).await?;
    let heartbeat = state.config.heartbeat_secs.max(1);
    let mut rx = state.feed.subscribe();

    info!("[Subscribe] Stream opened for {}", user.id);

    let stream = async_stream::stream! {
        let mut heartbeat_interval = tokio::time::interval(Duration::from_secs(heartbeat));
        // The first tick fires immediately.
        heartbeat_interval.tick().await;

        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Ok(change) => {
                        if change.concerns(&user.id) {
                            debug!("[Subscribe] {} <- {:?}", user.id, change.topic);
                            yield Ok::<_, Infallible>(format_event(&change.topic));
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("[Subscribe] {} lagged, {} change(s) dropped", user.id, skipped);
                        yield Ok::<_, Infallible>(Bytes::from_static(b"event: resync\ndata: {}\n\n"));
                    }
                    Err(RecvError::Closed) => break,
                },

                _ = heartbeat_interval.tick() => {
                    yield Ok::<_, Infallible>(Bytes::from_static(b": heartbeat\n\n"));
                }
            }
        }
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(stream))
        .map_err(|e| Error::Internal(format!("Failed to build stream response: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::conversations::testing::user;
    use crate::core::config::ServerConfig;
    use crate::core::db::testing::test_db;
    use futures::StreamExt;

    #[test]
    fn test_event_frame() {
        let frame = format_event(&Topic::Messages("c1".to_string()));
        assert_eq!(
            frame,
            Bytes::from("event: messages\ndata: {\"topic\":\"messages\",\"id\":\"c1\"}\n\n")
        );

        let frame = format_event(&Topic::Friends);
        assert_eq!(
            frame,
            Bytes::from("event: friends\ndata: {\"topic\":\"friends\"}\n\n")
        );
    }

    #[tokio::test]
    async fn test_stream_only_carries_own_changes() {
        let (_dir, db) = test_db().await;
        let alice = user(&db, "alice").await;
        let config = ServerConfig {
            jwt_secret: "secret".to_string(),
            ..ServerConfig::default()
        };
        let state = AppState::new(config, &db);

        let response = subscribe(State(state.clone()), Ctx::new(alice.external_id.clone()))
            .await
            .unwrap();
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/event-stream"
        );
        let mut body = response.into_body().into_data_stream();

        state.feed.publish(vec!["someone-else".to_string()], Topic::Friends);
        state.feed.publish(vec![alice.id.clone()], Topic::Requests);

        let frame = body.next().await.unwrap().unwrap();
        assert_eq!(frame, format_event(&Topic::Requests));
    }
}
