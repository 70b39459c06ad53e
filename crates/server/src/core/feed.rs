//! Change feed
//!
//! Managers publish a [`Change`] after each committed mutation, addressed to
//! the users whose views it invalidates. Subscribers re-fetch on receipt.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

const CHANNEL_CAPACITY: usize = 256;

/// Which query a change invalidates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "topic", content = "id", rename_all = "snake_case")]
pub enum Topic {
    Conversations,
    Conversation(String),
    Messages(String),
    Friends,
    Requests,
}

impl Topic {
    pub fn event_name(&self) -> &'static str {
        match self {
            Topic::Conversations => "conversations",
            Topic::Conversation(_) => "conversation",
            Topic::Messages(_) => "messages",
            Topic::Friends => "friends",
            Topic::Requests => "requests",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Change {
    /// User ids that should hear about it
    pub audience: Vec<String>,
    pub topic: Topic,
}

impl Change {
    pub fn concerns(&self, user_id: &str) -> bool {
        self.audience.iter().any(|id| id == user_id)
    }
}

#[derive(Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<Change>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }
}

impl ChangeFeed {
    pub fn publish(&self, audience: Vec<String>, topic: Topic) {
        if audience.is_empty() {
            return;
        }
        debug!("[Feed] {:?} -> {} user(s)", topic, audience.len());
        // No subscribers is fine.
        let _ = self.tx.send(Change { audience, topic });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Change> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let feed = ChangeFeed::default();
        let mut rx = feed.subscribe();

        feed.publish(vec!["alice".into()], Topic::Messages("c1".into()));

        let change = rx.recv().await.unwrap();
        assert!(change.concerns("alice"));
        assert!(!change.concerns("bob"));
        assert_eq!(change.topic.event_name(), "messages");
    }

    #[test]
    fn test_publish_without_subscribers() {
        let feed = ChangeFeed::default();
        feed.publish(vec!["alice".into()], Topic::Friends);
    }

    #[test]
    fn test_topic_serializes_with_id() {
        let json = serde_json::to_value(Topic::Conversation("c9".into())).unwrap();
        assert_eq!(json, serde_json::json!({"topic": "conversation", "id": "c9"}));
    }
}
