//! Persistent store seam.
//!
//! The fan-out core only issues create/read/update calls against the store;
//! schema ownership lives elsewhere. [`MemoryStore`] is the in-process
//! implementation used by the server binary and the tests.

use crate::channel::{validate_channel_name, Channel, User};
use crate::ids::{ChannelId, MessageId, UserId};
use crate::message::{Conversation, EnrichedMessage, Message, NewMessage};
use async_trait::async_trait;
use parley_protocol::{Party, ProfileProjection};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The referenced record does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Some channel members do not exist.
    #[error("Invalid members: {0:?}")]
    InvalidMembers(Vec<UserId>),

    /// The store could not be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The write was rejected.
    #[error("Write rejected: {0}")]
    Rejected(String),
}

impl StoreError {
    fn user(id: &UserId) -> Self {
        StoreError::NotFound {
            kind: "user",
            id: id.0.clone(),
        }
    }

    fn channel(id: &ChannelId) -> Self {
        StoreError::NotFound {
            kind: "channel",
            id: id.0.clone(),
        }
    }

    fn message(id: &MessageId) -> Self {
        StoreError::NotFound {
            kind: "message",
            id: id.0.clone(),
        }
    }

    /// Whether this is a missing-record error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Result of [`PersistentStore::create_channel_message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelWrite {
    /// The persisted message.
    pub message_id: MessageId,
    /// `false` if the channel does not exist. The message is still persisted.
    pub appended: bool,
}

/// Durable record of users, channels and messages.
#[async_trait]
pub trait PersistentStore: Send + Sync {
    /// Persist a new message and return its id.
    async fn create_message(&self, message: NewMessage) -> Result<MessageId, StoreError>;

    /// Read a message back joined with its parties' profiles.
    async fn get_message_with_profiles(&self, id: &MessageId)
        -> Result<EnrichedMessage, StoreError>;

    /// Append a message reference to a channel.
    async fn append_message_to_channel(
        &self,
        channel_id: &ChannelId,
        message_id: &MessageId,
    ) -> Result<(), StoreError>;

    /// Refresh a channel's updated timestamp.
    async fn touch_channel(&self, channel_id: &ChannelId) -> Result<(), StoreError>;

    /// Fetch a channel.
    async fn get_channel(&self, channel_id: &ChannelId) -> Result<Channel, StoreError>;

    /// Fetch a user's profile projection.
    async fn get_user_profile(&self, user_id: &UserId) -> Result<ProfileProjection, StoreError>;

    /// All direct messages between two users, in either direction, oldest first.
    async fn direct_history(&self, a: &UserId, b: &UserId) -> Result<Vec<Message>, StoreError>;

    /// All messages referenced by a channel, oldest first.
    async fn channel_history(&self, channel_id: &ChannelId) -> Result<Vec<Message>, StoreError>;

    /// Channels where the user is a member or the admin, most recently active first.
    async fn user_channels(&self, user_id: &UserId) -> Result<Vec<Channel>, StoreError>;

    /// Remove a message that was never handed to a caller.
    async fn discard_message(&self, id: &MessageId) -> Result<(), StoreError>;

    /// Persist a channel message, append it to the channel and refresh the
    /// channel's updated timestamp as one unit.
    ///
    /// A missing channel is not an error: the message stays persisted and
    /// [`ChannelWrite::appended`] is `false`. On any other failure nothing
    /// stays persisted. The default body composes the single-step calls and
    /// discards the message if a later step fails; stores that can write
    /// all three at once should override it.
    async fn create_channel_message(
        &self,
        channel_id: &ChannelId,
        message: NewMessage,
    ) -> Result<ChannelWrite, StoreError> {
        let message_id = self.create_message(message).await?;

        // Touch first so a failed append never leaves a dangling reference.
        let result = match self.touch_channel(channel_id).await {
            Ok(()) => self.append_message_to_channel(channel_id, &message_id).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => Ok(ChannelWrite {
                message_id,
                appended: true,
            }),
            Err(e) if e.is_not_found() => Ok(ChannelWrite {
                message_id,
                appended: false,
            }),
            Err(e) => {
                if let Err(rollback) = self.discard_message(&message_id).await {
                    warn!(message = %message_id, error = %rollback, "Failed to discard partially written message");
                }
                Err(e)
            }
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    users: HashMap<UserId, User>,
    channels: HashMap<ChannelId, Channel>,
    messages: HashMap<MessageId, Message>,
    last_timestamp: u64,
}

impl Inner {
    /// Wall clock in milliseconds, forced strictly increasing so timestamps
    /// give a total order.
    fn next_timestamp(&mut self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        self.last_timestamp = now.max(self.last_timestamp + 1);
        self.last_timestamp
    }

    fn insert_message(&mut self, message: NewMessage) -> (MessageId, u64) {
        let timestamp = self.next_timestamp();
        let id = MessageId::generate();
        self.messages.insert(
            id.clone(),
            Message {
                id: id.clone(),
                sender: message.sender,
                conversation: message.conversation,
                body: message.body,
                timestamp,
            },
        );
        (id, timestamp)
    }

    fn party(&self, id: &UserId) -> Party {
        self.users
            .get(id)
            .map(|user| Party::Profile(user.profile()))
            .unwrap_or_else(|| Party::Id(id.0.clone()))
    }
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a user.
    pub async fn create_user(&self, user: User) {
        debug!(user = %user.id, "Storing user");
        self.inner.write().await.users.insert(user.id.clone(), user);
    }

    /// Create a channel administered by `admin`.
    ///
    /// # Errors
    ///
    /// Fails if the name is invalid, the admin does not exist, or any member
    /// does not exist.
    pub async fn create_channel(
        &self,
        name: &str,
        members: Vec<UserId>,
        admin: &UserId,
    ) -> Result<Channel, StoreError> {
        validate_channel_name(name).map_err(|e| StoreError::Rejected(e.to_string()))?;

        let mut inner = self.inner.write().await;
        if !inner.users.contains_key(admin) {
            return Err(StoreError::user(admin));
        }

        let missing: Vec<UserId> = members
            .iter()
            .filter(|m| !inner.users.contains_key(*m))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(StoreError::InvalidMembers(missing));
        }

        let mut unique = Vec::with_capacity(members.len());
        for member in members {
            if !unique.contains(&member) {
                unique.push(member);
            }
        }

        let now = inner.next_timestamp();
        let channel = Channel {
            id: ChannelId::generate(),
            name: name.to_string(),
            members: unique,
            admin: admin.clone(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        inner.channels.insert(channel.id.clone(), channel.clone());

        debug!(channel = %channel.id, admin = %admin, "Channel created");
        Ok(channel)
    }

    /// Add a member to a channel. Adding an existing member only refreshes
    /// the updated timestamp.
    ///
    /// # Errors
    ///
    /// Fails if the channel or the user does not exist.
    pub async fn add_channel_member(
        &self,
        channel_id: &ChannelId,
        user_id: &UserId,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.users.contains_key(user_id) {
            return Err(StoreError::user(user_id));
        }
        let now = inner.next_timestamp();
        let channel = inner
            .channels
            .get_mut(channel_id)
            .ok_or_else(|| StoreError::channel(channel_id))?;

        if !channel.members.contains(user_id) {
            channel.members.push(user_id.clone());
        }
        channel.updated_at = now;
        Ok(())
    }

    /// Remove a member from a channel.
    ///
    /// # Errors
    ///
    /// Fails if the channel does not exist.
    pub async fn remove_channel_member(
        &self,
        channel_id: &ChannelId,
        user_id: &UserId,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let now = inner.next_timestamp();
        let channel = inner
            .channels
            .get_mut(channel_id)
            .ok_or_else(|| StoreError::channel(channel_id))?;

        channel.members.retain(|m| m != user_id);
        channel.updated_at = now;
        Ok(())
    }

    /// Delete a channel. Its messages stay persisted.
    pub async fn delete_channel(&self, channel_id: &ChannelId) -> Option<Channel> {
        self.inner.write().await.channels.remove(channel_id)
    }

    /// Number of persisted messages.
    pub async fn message_count(&self) -> usize {
        self.inner.read().await.messages.len()
    }
}

#[async_trait]
impl PersistentStore for MemoryStore {
    async fn create_message(&self, message: NewMessage) -> Result<MessageId, StoreError> {
        let (id, _) = self.inner.write().await.insert_message(message);
        Ok(id)
    }

    async fn get_message_with_profiles(
        &self,
        id: &MessageId,
    ) -> Result<EnrichedMessage, StoreError> {
        let inner = self.inner.read().await;
        let message = inner
            .messages
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::message(id))?;

        let sender = inner.party(&message.sender);
        let recipient = match &message.conversation {
            Conversation::Direct { recipient } => Some(inner.party(recipient)),
            Conversation::Channel { .. } => None,
        };

        Ok(EnrichedMessage {
            message,
            sender,
            recipient,
        })
    }

    async fn append_message_to_channel(
        &self,
        channel_id: &ChannelId,
        message_id: &MessageId,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.messages.contains_key(message_id) {
            return Err(StoreError::message(message_id));
        }
        let channel = inner
            .channels
            .get_mut(channel_id)
            .ok_or_else(|| StoreError::channel(channel_id))?;
        channel.messages.push(message_id.clone());
        Ok(())
    }

    async fn touch_channel(&self, channel_id: &ChannelId) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let now = inner.next_timestamp();
        let channel = inner
            .channels
            .get_mut(channel_id)
            .ok_or_else(|| StoreError::channel(channel_id))?;
        channel.updated_at = now;
        Ok(())
    }

    async fn get_channel(&self, channel_id: &ChannelId) -> Result<Channel, StoreError> {
        self.inner
            .read()
            .await
            .channels
            .get(channel_id)
            .cloned()
            .ok_or_else(|| StoreError::channel(channel_id))
    }

    async fn get_user_profile(&self, user_id: &UserId) -> Result<ProfileProjection, StoreError> {
        self.inner
            .read()
            .await
            .users
            .get(user_id)
            .map(User::profile)
            .ok_or_else(|| StoreError::user(user_id))
    }

    async fn direct_history(&self, a: &UserId, b: &UserId) -> Result<Vec<Message>, StoreError> {
        let inner = self.inner.read().await;
        let mut messages: Vec<Message> = inner
            .messages
            .values()
            .filter(|m| m.is_between(a, b))
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.timestamp);
        Ok(messages)
    }

    async fn channel_history(&self, channel_id: &ChannelId) -> Result<Vec<Message>, StoreError> {
        let inner = self.inner.read().await;
        let channel = inner
            .channels
            .get(channel_id)
            .ok_or_else(|| StoreError::channel(channel_id))?;

        let mut messages: Vec<Message> = channel
            .messages
            .iter()
            .filter_map(|id| inner.messages.get(id).cloned())
            .collect();
        messages.sort_by_key(|m| m.timestamp);
        Ok(messages)
    }

    async fn user_channels(&self, user_id: &UserId) -> Result<Vec<Channel>, StoreError> {
        let inner = self.inner.read().await;
        let mut channels: Vec<Channel> = inner
            .channels
            .values()
            .filter(|c| c.includes(user_id))
            .cloned()
            .collect();
        channels.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(channels)
    }

    async fn discard_message(&self, id: &MessageId) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.messages.remove(id).is_none() {
            return Err(StoreError::message(id));
        }
        for channel in inner.channels.values_mut() {
            channel.messages.retain(|m| m != id);
        }
        debug!(message = %id, "Message discarded");
        Ok(())
    }

    async fn create_channel_message(
        &self,
        channel_id: &ChannelId,
        message: NewMessage,
    ) -> Result<ChannelWrite, StoreError> {
        let mut inner = self.inner.write().await;
        let (message_id, timestamp) = inner.insert_message(message);

        let appended = match inner.channels.get_mut(channel_id) {
            Some(channel) => {
                channel.messages.push(message_id.clone());
                channel.updated_at = timestamp;
                true
            }
            None => false,
        };

        Ok(ChannelWrite {
            message_id,
            appended,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageBody;

    async fn store_with_users(ids: &[&str]) -> MemoryStore {
        let store = MemoryStore::new();
        for id in ids {
            store
                .create_user(User::new(*id, format!("{id}@example.com")))
                .await;
        }
        store
    }

    fn text(sender: &str, conversation: Conversation, content: &str) -> NewMessage {
        NewMessage {
            sender: sender.into(),
            conversation,
            body: MessageBody::Text {
                content: content.into(),
            },
        }
    }

    fn to(recipient: &str) -> Conversation {
        Conversation::Direct {
            recipient: recipient.into(),
        }
    }

    #[tokio::test]
    async fn test_create_channel_validates_members() {
        let store = store_with_users(&["u1", "u2"]).await;

        let result = store
            .create_channel("general", vec!["u2".into(), "ghost".into()], &"u1".into())
            .await;
        assert_eq!(result, Err(StoreError::InvalidMembers(vec!["ghost".into()])));

        let result = store
            .create_channel("general", vec!["u2".into()], &"nobody".into())
            .await;
        assert!(result.unwrap_err().is_not_found());

        let channel = store
            .create_channel("general", vec!["u2".into(), "u2".into()], &"u1".into())
            .await
            .unwrap();
        assert_eq!(channel.members, vec![UserId::from("u2")]);
        assert_eq!(channel.created_at, channel.updated_at);
    }

    #[tokio::test]
    async fn test_direct_history_both_directions_ascending() {
        let store = store_with_users(&["u1", "u2", "u3"]).await;

        store.create_message(text("u1", to("u2"), "one")).await.unwrap();
        store.create_message(text("u3", to("u1"), "other")).await.unwrap();
        store.create_message(text("u2", to("u1"), "two")).await.unwrap();

        let history = store
            .direct_history(&"u2".into(), &"u1".into())
            .await
            .unwrap();
        let contents: Vec<_> = history.iter().filter_map(|m| m.body.content()).collect();
        assert_eq!(contents, vec!["one", "two"]);
        assert!(history[0].timestamp < history[1].timestamp);
    }

    #[tokio::test]
    async fn test_enriched_message_uses_profiles_when_known() {
        let store = store_with_users(&["u1"]).await;
        let id = store
            .create_message(text("u1", to("ghost"), "hello"))
            .await
            .unwrap();

        let enriched = store.get_message_with_profiles(&id).await.unwrap();
        assert!(matches!(enriched.sender, Party::Profile(ref p) if p.email == "u1@example.com"));
        assert_eq!(enriched.recipient, Some(Party::Id("ghost".into())));
    }

    #[tokio::test]
    async fn test_append_and_touch_channel() {
        let store = store_with_users(&["u1"]).await;
        let channel = store.create_channel("ops", vec![], &"u1".into()).await.unwrap();

        let id = store
            .create_message(text(
                "u1",
                Conversation::Channel {
                    channel_id: channel.id.clone(),
                },
                "deploying",
            ))
            .await
            .unwrap();
        store.append_message_to_channel(&channel.id, &id).await.unwrap();
        store.touch_channel(&channel.id).await.unwrap();

        let updated = store.get_channel(&channel.id).await.unwrap();
        assert_eq!(updated.messages, vec![id]);
        assert!(updated.updated_at > channel.updated_at);

        let history = store.channel_history(&channel.id).await.unwrap();
        assert_eq!(history.len(), 1);

        let missing = store
            .append_message_to_channel(&"nope".into(), &updated.messages[0])
            .await;
        assert!(missing.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_create_channel_message_in_one_step() {
        let store = store_with_users(&["u1"]).await;
        let channel = store.create_channel("ops", vec![], &"u1".into()).await.unwrap();
        let in_channel = Conversation::Channel {
            channel_id: channel.id.clone(),
        };

        let write = store
            .create_channel_message(&channel.id, text("u1", in_channel.clone(), "deploying"))
            .await
            .unwrap();
        assert!(write.appended);

        let updated = store.get_channel(&channel.id).await.unwrap();
        assert_eq!(updated.messages, vec![write.message_id.clone()]);
        assert!(updated.updated_at > channel.updated_at);

        let orphan = store
            .create_channel_message(&"gone".into(), text("u1", in_channel, "hello?"))
            .await
            .unwrap();
        assert!(!orphan.appended);
        assert_eq!(store.message_count().await, 2);
    }

    #[tokio::test]
    async fn test_discard_message_drops_channel_reference() {
        let store = store_with_users(&["u1"]).await;
        let channel = store.create_channel("ops", vec![], &"u1".into()).await.unwrap();
        let write = store
            .create_channel_message(
                &channel.id,
                text(
                    "u1",
                    Conversation::Channel {
                        channel_id: channel.id.clone(),
                    },
                    "oops",
                ),
            )
            .await
            .unwrap();

        store.discard_message(&write.message_id).await.unwrap();
        assert_eq!(store.message_count().await, 0);
        assert!(store.get_channel(&channel.id).await.unwrap().messages.is_empty());
        assert!(store
            .discard_message(&write.message_id)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_user_channels_most_recent_first() {
        let store = store_with_users(&["u1", "u2"]).await;
        let older = store.create_channel("older", vec!["u2".into()], &"u1".into()).await.unwrap();
        let newer = store.create_channel("newer", vec![], &"u2".into()).await.unwrap();
        let _ = store.create_channel("solo", vec![], &"u1".into()).await.unwrap();

        store.touch_channel(&older.id).await.unwrap();

        let channels = store.user_channels(&"u2".into()).await.unwrap();
        let ids: Vec<_> = channels.iter().map(|c| c.id.clone()).collect();
        assert_eq!(ids, vec![older.id, newer.id]);
    }

    #[tokio::test]
    async fn test_membership_changes_refresh_updated_at() {
        let store = store_with_users(&["u1", "u2"]).await;
        let channel = store.create_channel("ops", vec![], &"u1".into()).await.unwrap();

        store.add_channel_member(&channel.id, &"u2".into()).await.unwrap();
        let added = store.get_channel(&channel.id).await.unwrap();
        assert_eq!(added.members, vec![UserId::from("u2")]);
        assert!(added.updated_at > channel.updated_at);

        store.remove_channel_member(&channel.id, &"u2".into()).await.unwrap();
        let removed = store.get_channel(&channel.id).await.unwrap();
        assert!(removed.members.is_empty());
        assert!(removed.updated_at > added.updated_at);
    }
}
