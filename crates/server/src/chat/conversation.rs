//! Single-conversation operations: detail, group lifecycle, read state

use crate::chat::conversations::{
    delete_cascade, get_conversation, member_ids, membership, other_members,
    ConversationManager,
};
use crate::core::db::begin_write;
use crate::core::error::{Error, Result};
use crate::core::feed::Topic;
use crate::core::models::{Conversation, User};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct DirectPeer {
    #[serde(flatten)]
    pub user: User,
    pub last_seen_message_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemberSummary {
    pub id: String,
    pub username: String,
    pub image_url: String,
}

/// Conversation with its other participants resolved
#[derive(Debug, Clone, Serialize)]
pub struct ConversationDetail {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub other_member: Option<DirectPeer>,
    pub other_members: Option<Vec<MemberSummary>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupDeletion {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_messages: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_memberships: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LeaveOutcome {
    AlreadyDeleted,
    NotMember,
    Left,
    LeftAndDeleted { deleted_messages: u64 },
}

impl ConversationManager {
    /// Detail view, or `None` when the conversation is gone or the caller
    /// is not a member
    pub async fn get(&self, user: &User, id: &str) -> Result<Option<ConversationDetail>> {
        let Some(conversation) = get_conversation(&self.pool, id).await? else {
            return Ok(None);
        };

        if membership(&self.pool, &user.id, id).await?.is_none() {
            return Ok(None);
        }

        let others = other_members(&self.pool, id, &user.id).await?;

        if conversation.is_group {
            let other_members = others
                .into_iter()
                .map(|(member, _)| MemberSummary {
                    id: member.id,
                    username: member.username,
                    image_url: member.image_url,
                })
                .collect();
            return Ok(Some(ConversationDetail {
                conversation,
                other_member: None,
                other_members: Some(other_members),
            }));
        }

        let Some((peer, last_seen_message_id)) = others.into_iter().next() else {
            return Ok(None);
        };

        Ok(Some(ConversationDetail {
            conversation,
            other_member: Some(DirectPeer {
                user: peer,
                last_seen_message_id,
            }),
            other_members: None,
        }))
    }

    /// Delete a group with all of its memberships and messages
    pub async fn delete_group(&self, user: &User, conversation_id: &str) -> Result<GroupDeletion> {
        let mut tx = begin_write(&self.pool).await?;

        let Some(conversation) = get_conversation(&mut *tx, conversation_id).await? else {
            info!("[Conversation] {} already deleted", conversation_id);
            return Ok(GroupDeletion {
                success: true,
                message: "Conversation already deleted".to_string(),
                deleted_messages: None,
                deleted_memberships: None,
            });
        };

        if !conversation.is_group {
            return Err(Error::app("This is not a group conversation"));
        }

        if membership(&mut *tx, &user.id, conversation_id).await?.is_none() {
            warn!(
                "[Conversation] {} tried to delete group {} without membership",
                user.id, conversation_id
            );
            return Err(Error::app("You are not a member of this group"));
        }

        let audience = member_ids(&mut *tx, conversation_id).await?;
        let (deleted_messages, deleted_memberships) =
            delete_cascade(&mut *tx, conversation_id).await?;
        tx.commit().await?;

        info!(
            "[Conversation] Group {} deleted ({} messages, {} memberships)",
            conversation_id, deleted_messages, deleted_memberships
        );
        self.feed.publish(audience.clone(), Topic::Conversations);
        self.feed
            .publish(audience, Topic::Conversation(conversation_id.to_string()));

        Ok(GroupDeletion {
            success: true,
            message: "Group deleted successfully".to_string(),
            deleted_messages: Some(deleted_messages),
            deleted_memberships: Some(deleted_memberships),
        })
    }

    /// Remove the caller from a group; the last one out deletes it
    pub async fn leave_group(&self, user: &User, conversation_id: &str) -> Result<LeaveOutcome> {
        let mut tx = begin_write(&self.pool).await?;

        let Some(conversation) = get_conversation(&mut *tx, conversation_id).await? else {
            info!("[Conversation] Leave on missing conversation {}", conversation_id);
            return Ok(LeaveOutcome::AlreadyDeleted);
        };

        if !conversation.is_group {
            return Err(Error::app("This is not a group conversation"));
        }

        let Some(own) = membership(&mut *tx, &user.id, conversation_id).await? else {
            info!("[Conversation] {} already left {}", user.id, conversation_id);
            return Ok(LeaveOutcome::NotMember);
        };

        let audience = member_ids(&mut *tx, conversation_id).await?;

        sqlx::query("DELETE FROM conversation_members WHERE id = ?")
            .bind(&own.id)
            .execute(&mut *tx)
            .await?;

        let outcome = if audience.len() == 1 {
            let (deleted_messages, _) = delete_cascade(&mut *tx, conversation_id).await?;
            info!(
                "[Conversation] Last member left, group {} deleted",
                conversation_id
            );
            LeaveOutcome::LeftAndDeleted { deleted_messages }
        } else {
            LeaveOutcome::Left
        };
        tx.commit().await?;

        info!("[Conversation] {} left group {}", user.id, conversation_id);
        self.feed.publish(audience.clone(), Topic::Conversations);
        self.feed
            .publish(audience, Topic::Conversation(conversation_id.to_string()));

        Ok(outcome)
    }

    /// Move the caller's last-seen pointer
    pub async fn mark_read(
        &self,
        user: &User,
        conversation_id: &str,
        message_id: &str,
    ) -> Result<()> {
        let mut tx = begin_write(&self.pool).await?;

        let Some(own) = membership(&mut *tx, &user.id, conversation_id).await? else {
            return Err(Error::app("You are not a member of this conversation"));
        };

        let message: Option<(String,)> =
            sqlx::query_as("SELECT conversation_id FROM messages WHERE id = ?")
                .bind(message_id)
                .fetch_optional(&mut *tx)
                .await?;

        let last_seen = match message {
            Some((owner,)) if owner != conversation_id => {
                return Err(Error::app("Message does not belong to this conversation"));
            }
            Some(_) => Some(message_id),
            None => None,
        };

        sqlx::query("UPDATE conversation_members SET last_seen_message_id = ? WHERE id = ?")
            .bind(last_seen)
            .bind(&own.id)
            .execute(&mut *tx)
            .await?;

        let audience = member_ids(&mut *tx, conversation_id).await?;
        tx.commit().await?;

        self.feed.publish(vec![user.id.clone()], Topic::Conversations);
        self.feed
            .publish(audience, Topic::Conversation(conversation_id.to_string()));

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::conversations::testing::{befriend, user};
    use crate::chat::messages::MessageManager;
    use crate::core::db::testing::test_db;
    use crate::core::feed::ChangeFeed;
    use crate::core::models::MessageKind;

    async fn message_count(db: &crate::core::db::Database, conversation_id: &str) -> i64 {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages WHERE conversation_id = ?")
            .bind(conversation_id)
            .fetch_one(db.pool())
            .await
            .unwrap();
        n
    }

    #[tokio::test]
    async fn test_get_returns_none_for_non_member_and_missing() {
        let (_dir, db) = test_db().await;
        let alice = user(&db, "alice").await;
        let bob = user(&db, "bob").await;
        let eve = user(&db, "eve").await;
        befriend(&db, &alice, &bob).await;

        let manager = ConversationManager::new(db.pool().clone(), ChangeFeed::default());
        let dm = manager.start_dm(&alice, &bob.id).await.unwrap();

        assert!(manager.get(&eve, &dm.conversation_id).await.unwrap().is_none());
        assert!(manager.get(&alice, "no-such-id").await.unwrap().is_none());

        let detail = manager.get(&alice, &dm.conversation_id).await.unwrap().unwrap();
        assert_eq!(detail.other_member.unwrap().user.id, bob.id);
        assert!(detail.other_members.is_none());
    }

    #[tokio::test]
    async fn test_get_group_lists_other_members() {
        let (_dir, db) = test_db().await;
        let alice = user(&db, "alice").await;
        let bob = user(&db, "bob").await;
        let carol = user(&db, "carol").await;

        let manager = ConversationManager::new(db.pool().clone(), ChangeFeed::default());
        let group = manager
            .create_group(&alice, "crew", &[bob.id.clone(), carol.id.clone()])
            .await
            .unwrap();

        let detail = manager.get(&alice, &group).await.unwrap().unwrap();
        assert!(detail.other_member.is_none());

        // Conversation fields sit at the top level next to the members.
        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["id"], group.as_str());
        assert_eq!(json["name"], "crew");
        assert!(json.get("conversation").is_none());
        assert!(json["other_member"].is_null());

        let names: Vec<_> = detail
            .other_members
            .unwrap()
            .into_iter()
            .map(|m| m.username)
            .collect();
        assert_eq!(names, vec!["bob", "carol"]);
    }

    #[tokio::test]
    async fn test_delete_group_cascades_and_is_idempotent() {
        let (_dir, db) = test_db().await;
        let alice = user(&db, "alice").await;
        let bob = user(&db, "bob").await;

        let feed = ChangeFeed::default();
        let manager = ConversationManager::new(db.pool().clone(), feed.clone());
        let messages = MessageManager::new(db.pool().clone(), feed);
        let group = manager
            .create_group(&alice, "crew", &[bob.id.clone()])
            .await
            .unwrap();
        messages.send(&bob, &group, MessageKind::Text, "hey").await.unwrap();

        let first = manager.delete_group(&alice, &group).await.unwrap();
        assert!(first.success);
        assert_eq!(first.deleted_messages, Some(1));
        assert_eq!(first.deleted_memberships, Some(2));
        assert_eq!(message_count(&db, &group).await, 0);

        let again = manager.delete_group(&alice, &group).await.unwrap();
        assert!(again.success);
        assert_eq!(again.message, "Conversation already deleted");
    }

    #[tokio::test]
    async fn test_delete_group_checks_kind_and_membership() {
        let (_dir, db) = test_db().await;
        let alice = user(&db, "alice").await;
        let bob = user(&db, "bob").await;
        let eve = user(&db, "eve").await;
        befriend(&db, &alice, &bob).await;

        let manager = ConversationManager::new(db.pool().clone(), ChangeFeed::default());
        let dm = manager.start_dm(&alice, &bob.id).await.unwrap();
        let err = manager.delete_group(&alice, &dm.conversation_id).await.unwrap_err();
        assert!(matches!(err, Error::App(msg) if msg == "This is not a group conversation"));

        let group = manager
            .create_group(&alice, "crew", &[bob.id.clone()])
            .await
            .unwrap();
        let err = manager.delete_group(&eve, &group).await.unwrap_err();
        assert!(matches!(err, Error::App(msg) if msg == "You are not a member of this group"));
    }

    #[tokio::test]
    async fn test_leave_rejects_direct_messages() {
        let (_dir, db) = test_db().await;
        let alice = user(&db, "alice").await;
        let bob = user(&db, "bob").await;
        befriend(&db, &alice, &bob).await;

        let manager = ConversationManager::new(db.pool().clone(), ChangeFeed::default());
        let dm = manager.start_dm(&alice, &bob.id).await.unwrap();

        let err = manager.leave_group(&alice, &dm.conversation_id).await.unwrap_err();
        assert!(matches!(err, Error::App(msg) if msg == "This is not a group conversation"));

        // Both memberships survive.
        let members = member_ids(db.pool(), &dm.conversation_id).await.unwrap();
        assert_eq!(members.len(), 2);
    }

    #[tokio::test]
    async fn test_last_member_leaving_deletes_group() {
        let (_dir, db) = test_db().await;
        let alice = user(&db, "alice").await;
        let bob = user(&db, "bob").await;

        let feed = ChangeFeed::default();
        let manager = ConversationManager::new(db.pool().clone(), feed.clone());
        let messages = MessageManager::new(db.pool().clone(), feed);
        let group = manager
            .create_group(&alice, "crew", &[bob.id.clone()])
            .await
            .unwrap();
        messages.send(&alice, &group, MessageKind::Text, "one").await.unwrap();
        messages.send(&bob, &group, MessageKind::Text, "two").await.unwrap();

        assert_eq!(
            manager.leave_group(&bob, &group).await.unwrap(),
            LeaveOutcome::Left
        );
        assert_eq!(
            manager.leave_group(&bob, &group).await.unwrap(),
            LeaveOutcome::NotMember
        );
        assert!(manager.get(&alice, &group).await.unwrap().is_some());

        assert_eq!(
            manager.leave_group(&alice, &group).await.unwrap(),
            LeaveOutcome::LeftAndDeleted { deleted_messages: 2 }
        );
        assert!(get_conversation(db.pool(), &group).await.unwrap().is_none());
        assert_eq!(message_count(&db, &group).await, 0);

        assert_eq!(
            manager.leave_group(&alice, &group).await.unwrap(),
            LeaveOutcome::AlreadyDeleted
        );
    }

    #[tokio::test]
    async fn test_mark_read_moves_pointer() {
        let (_dir, db) = test_db().await;
        let alice = user(&db, "alice").await;
        let bob = user(&db, "bob").await;
        let eve = user(&db, "eve").await;
        befriend(&db, &alice, &bob).await;

        let feed = ChangeFeed::default();
        let manager = ConversationManager::new(db.pool().clone(), feed.clone());
        let messages = MessageManager::new(db.pool().clone(), feed);
        let dm = manager.start_dm(&alice, &bob.id).await.unwrap();
        let cid = dm.conversation_id.as_str();
        let msg = messages.send(&alice, cid, MessageKind::Text, "hello").await.unwrap();

        assert_eq!(manager.list(&bob).await.unwrap()[0].unseen_count, 1);
        manager.mark_read(&bob, cid, &msg.id).await.unwrap();
        assert_eq!(manager.list(&bob).await.unwrap()[0].unseen_count, 0);

        // Alice sees Bob's read position on the DM detail.
        let detail = manager.get(&alice, cid).await.unwrap().unwrap();
        assert_eq!(
            detail.other_member.unwrap().last_seen_message_id.as_deref(),
            Some(msg.id.as_str())
        );

        let err = manager.mark_read(&eve, cid, &msg.id).await.unwrap_err();
        assert!(matches!(err, Error::App(_)));
    }

    #[tokio::test]
    async fn test_mark_read_rejects_foreign_message() {
        let (_dir, db) = test_db().await;
        let alice = user(&db, "alice").await;
        let bob = user(&db, "bob").await;

        let feed = ChangeFeed::default();
        let manager = ConversationManager::new(db.pool().clone(), feed.clone());
        let messages = MessageManager::new(db.pool().clone(), feed);
        let one = manager.create_group(&alice, "one", &[bob.id.clone()]).await.unwrap();
        let two = manager.create_group(&alice, "two", &[bob.id.clone()]).await.unwrap();
        let msg = messages.send(&alice, &two, MessageKind::Text, "x").await.unwrap();

        let err = manager.mark_read(&bob, &one, &msg.id).await.unwrap_err();
        assert!(matches!(err, Error::App(_)));

        // Unknown message clears the pointer rather than failing.
        manager.mark_read(&bob, &one, "unknown").await.unwrap();
    }
}
